//! Composite scoring.
//!
//! - normalize a configured weight set into a convex combination (`weights`)
//! - fuse normalized factor scores into one composite per date (`aggregate`)

pub mod aggregate;
pub mod weights;

pub use aggregate::*;
pub use weights::*;
