//! Numeric transforms applied to individual series.

pub mod rank;

pub use rank::*;
