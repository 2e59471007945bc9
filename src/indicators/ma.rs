// =============================================================================
// Moving Averages — SMA and EMA
// =============================================================================
//
// SMA is the plain trailing mean over `period` values.
//
// EMA gives more weight to recent values:
//   k      = 2 / (period + 1)
//   EMA_0  = x_0
//   EMA_t  = x_t * k + EMA_{t-1} * (1 - k)
//
// The recursion is the "unadjusted" form: it is seeded by the first value
// and carries no bias correction, so EMA is defined from the very first bar.
// =============================================================================

use super::finite;

/// Trailing simple moving average aligned with `values`.
///
/// Positions `0..period-1` are `None` (warm-up).  A window containing a
/// non-finite value yields `None` for that position only.
///
/// # Edge cases
/// - `period == 0` => every position is `None`
/// - `values.len() < period` => every position is `None`
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }

    let divisor = period as f64;
    for end in period..=values.len() {
        let window = &values[end - period..end];
        out[end - 1] = finite(window.iter().sum::<f64>() / divisor);
    }
    out
}

/// Exponential moving average aligned with `values`, seeded by `values[0]`.
///
/// Once a non-finite value enters the recursion every later position is
/// `None`; downstream consumers should not trust a broken series.
pub fn ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(values.len());
    if period == 0 {
        out.resize(values.len(), None);
        return out;
    }

    let k = 2.0 / (period as f64 + 1.0);
    let mut prev: Option<f64> = None;
    for &x in values {
        let next = match prev {
            None if out.is_empty() => finite(x),
            None => None,
            Some(p) => finite(x * k + p * (1.0 - k)),
        };
        out.push(next);
        prev = next;
    }
    out
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn ascending(n: usize) -> Vec<f64> {
        (1..=n).map(|i| i as f64).collect()
    }

    // ---- sma --------------------------------------------------------------

    #[test]
    fn sma_period_zero() {
        assert!(sma(&[1.0, 2.0, 3.0], 0).iter().all(Option::is_none));
    }

    #[test]
    fn sma_warm_up_then_mean() {
        let out = sma(&ascending(5), 3);
        assert_eq!(out.len(), 5);
        assert!(out[0].is_none() && out[1].is_none());
        assert_eq!(out[2], Some(2.0));
        assert_eq!(out[3], Some(3.0));
        assert_eq!(out[4], Some(4.0));
    }

    #[test]
    fn sma_insufficient_data() {
        assert!(sma(&[1.0, 2.0], 5).iter().all(Option::is_none));
    }

    // ---- ema --------------------------------------------------------------

    #[test]
    fn ema_empty_input() {
        assert!(ema(&[], 5).is_empty());
    }

    #[test]
    fn ema_seeded_by_first_value() {
        let out = ema(&[10.0, 20.0], 3);
        // k = 0.5
        assert_eq!(out[0], Some(10.0));
        assert!((out[1].unwrap() - 15.0).abs() < 1e-12);
    }

    #[test]
    fn ema_known_values() {
        let closes = ascending(10);
        let out = ema(&closes, 5);
        let k = 2.0 / 6.0;
        let mut expected = closes[0];
        for (i, &c) in closes.iter().enumerate().skip(1) {
            expected = c * k + expected * (1.0 - k);
            assert!((out[i].unwrap() - expected).abs() < 1e-10);
        }
    }

    #[test]
    fn ema_stops_after_nan() {
        let out = ema(&[1.0, 2.0, f64::NAN, 5.0], 3);
        assert!(out[0].is_some() && out[1].is_some());
        assert!(out[2].is_none() && out[3].is_none());
    }

    #[test]
    fn ema_flat_series_is_flat() {
        let out = ema(&[100.0; 30], 10);
        assert!(out.iter().all(|v| (v.unwrap() - 100.0).abs() < 1e-12));
    }
}
