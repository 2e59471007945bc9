// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free implementations of the indicators that make up an
// indicator frame.  Per-bar indicators return a vector aligned 1:1 with their
// input where `None` marks positions that are still inside the warm-up period.
// Indicators that can refuse an input altogether return `Result`.
//
// `frame` joins the individual series on bar time and is the only place that
// decides what a failed indicator means for the consumer.

pub mod adx;
pub mod atr;
pub mod bollinger;
pub mod candle;
pub mod frame;
pub mod keltner;
pub mod levels;
pub mod ma;
pub mod psar;
pub mod rsi;
pub mod vwap;

pub use frame::{assemble_frame, Column, IndicatorFrame, IndicatorParams};
pub use levels::{support_resistance_levels, LevelParams};

use crate::types::Bar;

/// Close prices of `bars`, oldest first.
pub fn closes(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}

/// Volumes of `bars` as floats, oldest first.
pub fn volumes(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.volume as f64).collect()
}

/// `Some(x)` when `x` is finite.
pub(crate) fn finite(x: f64) -> Option<f64> {
    x.is_finite().then_some(x)
}
