// =============================================================================
// Average Directional Index (ADX) and Directional Movement Index (DMI)
// =============================================================================
//
// Calculation pipeline:
//   1. True Range per bar (first bar: H - L).
//   2. ATR = Wilder smoothing of TR in exponential form:
//        s_0 = x_0,  s_t = s_{t-1} * (1 - 1/N) + x_t * (1/N)
//   3. +DM = H - prevH  if it exceeds prevL - L and is positive, else 0
//      -DM = prevL - L  if it exceeds H - prevH and is positive, else 0
//      (the first bar has no predecessor and contributes 0 to both)
//   4. DMI+ = smooth(+DM) / ATR * 100,  DMI- = smooth(-DM) / ATR * 100
//   5. DX   = |DMI+ - DMI-| / (DMI+ + DMI-) * 100
//   6. ADX  = Wilder smoothing of DX
//
// Undefined values (zero ATR, DMI+ + DMI- == 0 before the first defined DX)
// are reported as 100 in the published columns.
// =============================================================================

use super::atr::true_range;
use super::finite;
use crate::types::Bar;

/// Value published for ADX / DMI positions that are numerically undefined.
pub const ADX_FILL: f64 = 100.0;

/// ADX/DMI output aligned with the input bars.
#[derive(Debug, Clone)]
pub struct AdxSeries {
    pub adx: Vec<f64>,
    pub dmi_plus: Vec<f64>,
    pub dmi_minus: Vec<f64>,
    /// Raw DX before smoothing; `None` exactly where DMI+ + DMI- is 0 or
    /// either line is undefined.
    pub dx: Vec<Option<f64>>,
}

/// Compute ADX, DMI+ and DMI- for `bars` with Wilder period `period`.
///
/// Returns all-fill series when `period` is zero.
pub fn calculate_adx(bars: &[Bar], period: usize) -> AdxSeries {
    let n = bars.len();
    if period == 0 {
        return AdxSeries {
            adx: vec![ADX_FILL; n],
            dmi_plus: vec![ADX_FILL; n],
            dmi_minus: vec![ADX_FILL; n],
            dx: vec![None; n],
        };
    }

    // ------------------------------------------------------------------
    // Steps 1-3: TR and directional movement per bar
    // ------------------------------------------------------------------
    let tr: Vec<Option<f64>> = true_range(bars).into_iter().map(finite).collect();
    let mut plus_dm = vec![Some(0.0); n];
    let mut minus_dm = vec![Some(0.0); n];
    for i in 1..n {
        let up_move = bars[i].high - bars[i - 1].high;
        let down_move = bars[i - 1].low - bars[i].low;

        plus_dm[i] = Some(if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        });
        minus_dm[i] = Some(if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        });
    }

    let atr = wilder_smooth(&tr, period);
    let smooth_plus = wilder_smooth(&plus_dm, period);
    let smooth_minus = wilder_smooth(&minus_dm, period);

    // ------------------------------------------------------------------
    // Steps 4-5: DMI lines and DX
    // ------------------------------------------------------------------
    let directional = |smoothed: Option<f64>, atr: Option<f64>| -> Option<f64> {
        match (smoothed, atr) {
            (Some(s), Some(a)) if a != 0.0 => finite(s / a * 100.0),
            _ => None,
        }
    };
    let dmi_plus: Vec<Option<f64>> = (0..n).map(|i| directional(smooth_plus[i], atr[i])).collect();
    let dmi_minus: Vec<Option<f64>> = (0..n).map(|i| directional(smooth_minus[i], atr[i])).collect();

    let dx: Vec<Option<f64>> = dmi_plus
        .iter()
        .zip(&dmi_minus)
        .map(|(p, m)| match (p, m) {
            (Some(p), Some(m)) if p + m != 0.0 => finite((p - m).abs() / (p + m) * 100.0),
            _ => None,
        })
        .collect();

    // ------------------------------------------------------------------
    // Step 6: ADX
    // ------------------------------------------------------------------
    let adx = wilder_smooth(&dx, period);

    let fill = |v: Vec<Option<f64>>| -> Vec<f64> {
        v.into_iter().map(|x| x.unwrap_or(ADX_FILL)).collect()
    };

    AdxSeries {
        adx: fill(adx),
        dmi_plus: fill(dmi_plus),
        dmi_minus: fill(dmi_minus),
        dx,
    }
}

// =============================================================================
// Internal helpers
// =============================================================================

/// Wilder smoothing in exponential form (`alpha = 1 / period`).
///
/// The recursion is seeded by the first defined value.  Undefined inputs do
/// not update the state; their position repeats the last smoothed value (or
/// stays `None` before the seed).
pub(crate) fn wilder_smooth(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let alpha = 1.0 / period as f64;
    let mut state: Option<f64> = None;
    values
        .iter()
        .map(|v| {
            if let Some(x) = v {
                state = Some(match state {
                    Some(prev) => prev * (1.0 - alpha) + x * alpha,
                    None => *x,
                });
            }
            state
        })
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn candle(i: i64, open: f64, high: f64, low: f64, close: f64) -> Bar {
        let start = NaiveDate::from_ymd_opt(2025, 1, 2)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        Bar {
            time: start + chrono::Duration::minutes(i),
            open,
            high,
            low,
            close,
            volume: 1,
        }
    }

    fn wave(n: i64) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let base = 50.0 + (i as f64 * 0.3).sin() * 10.0;
                candle(i, base - 0.5, base + 1.0, base - 1.0, base + 0.5)
            })
            .collect()
    }

    #[test]
    fn wilder_smooth_seeds_with_first_value() {
        let out = wilder_smooth(&[None, Some(10.0), Some(20.0), None], 2);
        assert_eq!(out, vec![None, Some(10.0), Some(15.0), Some(15.0)]);
    }

    #[test]
    fn adx_period_zero_fills() {
        let series = calculate_adx(&wave(10), 0);
        assert!(series.adx.iter().all(|&v| v == ADX_FILL));
    }

    #[test]
    fn adx_strong_uptrend() {
        let candles: Vec<Bar> = (0..60)
            .map(|i| {
                let base = 100.0 + i as f64 * 2.0;
                candle(i, base, base + 1.5, base - 0.5, base + 1.0)
            })
            .collect();
        let series = calculate_adx(&candles, 14);
        let adx = *series.adx.last().unwrap();
        assert!(adx > 25.0, "expected ADX > 25 for strong trend, got {adx}");
        assert!(series.dmi_plus.last().unwrap() > series.dmi_minus.last().unwrap());
    }

    #[test]
    fn adx_flat_market_has_undefined_dx() {
        // Identical candles: no directional movement, DMI+ + DMI- == 0.
        let candles: Vec<Bar> = (0..40).map(|i| candle(i, 100.0, 101.0, 99.0, 100.0)).collect();
        let series = calculate_adx(&candles, 14);
        assert!(series.dx.iter().all(Option::is_none));
        assert!(series.adx.iter().all(|&v| v == ADX_FILL));
        assert!(series.dmi_plus.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn adx_and_dmi_bounded() {
        let series = calculate_adx(&wave(120), 14);
        for i in 14..120 {
            for (name, v) in [
                ("ADX", series.adx[i]),
                ("DMIP", series.dmi_plus[i]),
                ("DMIM", series.dmi_minus[i]),
            ] {
                assert!((0.0..=100.0).contains(&v), "{name} {v} out of [0,100] at {i}");
            }
        }
    }

    #[test]
    fn dx_undefined_only_when_dmi_sum_is_zero() {
        let series = calculate_adx(&wave(120), 14);
        for i in 0..120 {
            let sum = series.dmi_plus[i] + series.dmi_minus[i];
            assert_eq!(series.dx[i].is_none(), sum == 0.0, "mismatch at {i}");
        }
    }
}
