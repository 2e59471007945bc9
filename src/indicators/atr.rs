// =============================================================================
// Average True Range (ATR) — plain rolling mean
// =============================================================================
//
// True Range (TR) for each bar:
//   TR = max(H - L, |H - prevClose|, |L - prevClose|)
// The first bar has no previous close, so its TR is simply H - L.
//
// This ATR is the simple rolling mean of TR over `period` bars and is what the
// Keltner Channel uses for its width.  ADX keeps its own Wilder-smoothed ATR
// (see `adx.rs`); the two are deliberately distinct series.
// =============================================================================

use super::ma::sma;
use crate::types::Bar;

/// True Range of every bar, aligned with `bars`.
pub fn true_range(bars: &[Bar]) -> Vec<f64> {
    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            let hl = bar.high - bar.low;
            match i.checked_sub(1).map(|p| bars[p].close) {
                Some(prev_close) => hl
                    .max((bar.high - prev_close).abs())
                    .max((bar.low - prev_close).abs()),
                None => hl,
            }
        })
        .collect()
}

/// Rolling mean of True Range over `period` bars, aligned with `bars`.
///
/// # Returns
/// `None` for the first `period - 1` positions, for every position when
/// `period` is zero, and wherever the window contains a non-finite TR.
pub fn average_true_range(bars: &[Bar], period: usize) -> Vec<Option<f64>> {
    sma(&true_range(bars), period)
}
