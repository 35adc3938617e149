//! The two processing stages.

pub mod rate_transposer;
pub mod stretch;

use std::ops::RangeInclusive;

/// Rate and tempo ratios the stages accept. Values outside are ignored, which
/// keeps the work and the output produced per input frame bounded
pub const RATIO_RANGE: RangeInclusive<f64> = 1e-3..=1e3;

pub use rate_transposer::RateTransposer;
pub use stretch::{Stretch, StretchSettings, DEFAULT_OVERLAP_MS, DEFAULT_SAMPLE_RATE};
