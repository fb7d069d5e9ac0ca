//! Upstream data access.
//!
//! - strict CSV retrieval with bounded retry (`fetch`)
//! - per-symbol daily close history (`yahoo`)
//! - TTL'd JSON cache in front of the history provider (`cache`)

pub mod cache;
pub mod fetch;
pub mod yahoo;

pub use cache::{CacheLookup, HistoryCache, HistoryOrigin, load_history};
pub use fetch::{CsvSource, FetchError, HttpCsvSource, fetch_csv};
pub use yahoo::{HistoryProvider, HistoryRow, YahooHistory};
