//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the five fused factors (`Factor`)
//! - raw and derived series (`Series`, `NormalizedSeries`, `CompositeSeries`)
//! - weight configuration (`WeightSet`) and run configuration (`PipelineConfig`)
//! - the output table shape (`WideTable`)

pub mod types;

pub use types::*;
