// =============================================================================
// Relative Strength Index (RSI) — Wilder's Smoothing
// =============================================================================
//
// Step 1 — Compute bar-over-bar changes of close.
// Step 2 — Split into gains (positive change) and losses (magnitude of the
//          negative change).
// Step 3 — Seed average gain / average loss with the mean of the first
//          `period` gains / losses, then apply Wilder's running average:
//            avg = (prev_avg * (period - 1) + current) / period
// Step 4 — RS  = avg_gain / avg_loss
//          RSI = 100 - 100 / (1 + RS)
//
// The series is aligned with the input closes.  Every position that is not
// numerically defined (warm-up, or a series no longer than `period`) carries
// the neutral default of 50.
// =============================================================================

/// Neutral RSI reported wherever the oscillator is undefined.
pub const RSI_DEFAULT: f64 = 50.0;

/// Compute the RSI series for `closes`, aligned 1:1 with the input.
///
/// # Edge cases
/// - `period == 0` or `closes.len() <= period` => every value is 50
/// - The first defined value sits at index `period`
/// - Only gains (avg loss 0) => 100; no movement at all => 50
pub fn calculate_rsi(closes: &[f64], period: usize) -> Vec<f64> {
    let n = closes.len();
    let mut out = vec![RSI_DEFAULT; n];
    if period == 0 || n <= period {
        return out;
    }

    // Index i holds the change from close[i-1] to close[i]; index 0 has none.
    let mut gains = vec![0.0; n];
    let mut losses = vec![0.0; n];
    for i in 1..n {
        let delta = closes[i] - closes[i - 1];
        if delta > 0.0 {
            gains[i] = delta;
        } else {
            losses[i] = -delta;
        }
    }

    let period_f = period as f64;
    let mut avg_gain = gains[1..=period].iter().sum::<f64>() / period_f;
    let mut avg_loss = losses[1..=period].iter().sum::<f64>() / period_f;
    out[period] = rsi_from_averages(avg_gain, avg_loss).unwrap_or(RSI_DEFAULT);

    for i in period + 1..n {
        avg_gain = (avg_gain * (period_f - 1.0) + gains[i]) / period_f;
        avg_loss = (avg_loss * (period_f - 1.0) + losses[i]) / period_f;
        out[i] = rsi_from_averages(avg_gain, avg_loss).unwrap_or(RSI_DEFAULT);
    }

    out
}

// =============================================================================
// Internal helpers
// =============================================================================

/// Convert average gain / average loss into an RSI value in [0, 100].
///
/// Returns `None` when the ratio is undefined (no movement at all) or the
/// result is non-finite.
fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    if avg_loss == 0.0 && avg_gain == 0.0 {
        return None;
    }

    let rsi = if avg_loss == 0.0 {
        100.0
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    };

    rsi.is_finite().then_some(rsi)
}
