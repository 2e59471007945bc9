// =============================================================================
// Keltner Channel
// =============================================================================
//
//   middle = SMA(close, period)
//   upper  = middle + multiplier * ATR(period)
//   lower  = middle - multiplier * ATR(period)
//
// ATR here is the plain rolling-mean ATR from `atr.rs`.

use super::atr::average_true_range;
use super::closes;
use super::ma::sma;
use crate::types::Bar;

#[derive(Debug, Clone)]
pub struct KeltnerSeries {
    pub middle: Vec<Option<f64>>,
    pub upper: Vec<Option<f64>>,
    pub lower: Vec<Option<f64>>,
}

/// Keltner Channel aligned with `bars`; `None` until both SMA and ATR are
/// defined.
pub fn calculate_keltner(bars: &[Bar], period: usize, multiplier: f64) -> KeltnerSeries {
    let middle = sma(&closes(bars), period);
    let atr = average_true_range(bars, period);

    let (upper, lower) = middle
        .iter()
        .zip(&atr)
        .map(|(m, a)| match (m, a) {
            (Some(m), Some(a)) => (Some(m + multiplier * a), Some(m - multiplier * a)),
            _ => (None, None),
        })
        .unzip();

    KeltnerSeries {
        middle,
        upper,
        lower,
    }
}
