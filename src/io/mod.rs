//! Input/output helpers.
//!
//! - source list parsing (`sources`)
//! - CSV ingest + calendar normalization (`ingest`)
//! - outer-join of per-symbol series into one table (`merge`)
//! - CSV table exports and the output sink (`export`)

pub mod export;
pub mod ingest;
pub mod merge;
pub mod sources;

pub use export::*;
pub use ingest::*;
pub use merge::*;
pub use sources::*;
