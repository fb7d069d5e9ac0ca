//! `hk20-sentiment` library crate.
//!
//! The binary (`hk20`) is a thin wrapper around this library so that:
//!
//! - the scoring and fusion core is testable without spawning processes
//! - fetch, ingest and output stages can be swapped behind traits in tests
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fusion;
pub mod io;
pub mod math;
pub mod plot;
pub mod report;
