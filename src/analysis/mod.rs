//! Statistical analyses run on a cleaned series.
//!
//! Submodules:
//! - `stats`: descriptive statistics shared across the crate.
//! - `anomaly`: per-point anomaly scores and flags.
//! - `isolation`: isolation forest scores used by `anomaly`.
//! - `trend`: windowed least-squares slopes with confidence intervals.

pub mod anomaly;
pub mod isolation;
pub mod stats;
pub mod trend;
