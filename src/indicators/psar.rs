// =============================================================================
// Parabolic SAR — stop-and-reverse trend level
// =============================================================================
//
// The series starts in an up-trend with SAR at the first low and the extreme
// point (EP) at the first high.  On every later bar:
//
//   SAR_t = SAR_{t-1} + AF * (EP - SAR_{t-1})
//
// In an up-trend SAR may not rise above the previous two lows; in a
// down-trend it may not fall below the previous two highs.  When price
// penetrates SAR the trend reverses: SAR jumps to the old EP, EP resets to the
// current extreme and AF restarts.  A new extreme in the trend's direction
// advances AF by `step`, capped at `max`.
//
// A level below price reads as bullish.

use serde::{Deserialize, Serialize};

use crate::types::Bar;

/// Acceleration-factor schedule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PsarParams {
    #[serde(default = "default_start")]
    pub start: f64,
    #[serde(default = "default_step")]
    pub step: f64,
    #[serde(default = "default_max")]
    pub max: f64,
}

fn default_start() -> f64 {
    0.02
}

fn default_step() -> f64 {
    0.02
}

fn default_max() -> f64 {
    0.2
}

impl Default for PsarParams {
    fn default() -> Self {
        Self {
            start: default_start(),
            step: default_step(),
            max: default_max(),
        }
    }
}

/// Compute the Parabolic SAR level of every bar.
pub fn calculate_psar(bars: &[Bar], params: PsarParams) -> Vec<f64> {
    let Some(first) = bars.first() else {
        return Vec::new();
    };

    let mut out = Vec::with_capacity(bars.len());
    let mut bullish = true;
    let mut sar = first.low;
    let mut ep = first.high;
    let mut af = params.start;
    out.push(sar);

    for i in 1..bars.len() {
        let bar = &bars[i];
        let prev = &bars[i - 1];
        let prev2 = if i >= 2 { &bars[i - 2] } else { prev };

        sar += af * (ep - sar);

        if bullish {
            sar = sar.min(prev.low).min(prev2.low);
            if bar.low < sar {
                bullish = false;
                sar = ep;
                ep = bar.low;
                af = params.start;
            } else if bar.high > ep {
                ep = bar.high;
                af = (af + params.step).min(params.max);
            }
        } else {
            sar = sar.max(prev.high).max(prev2.high);
            if bar.high > sar {
                bullish = true;
                sar = ep;
                ep = bar.high;
                af = params.start;
            } else if bar.low < ep {
                ep = bar.low;
                af = (af + params.step).min(params.max);
            }
        }

        out.push(sar);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn series(prices: &[(f64, f64)]) -> Vec<Bar> {
        let start = NaiveDate::from_ymd_opt(2025, 1, 2)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        prices
            .iter()
            .enumerate()
            .map(|(i, &(high, low))| Bar {
                time: start + chrono::Duration::minutes(i as i64),
                open: (high + low) / 2.0,
                high,
                low,
                close: (high + low) / 2.0,
                volume: 1,
            })
            .collect()
    }

    #[test]
    fn empty_input() {
        assert!(calculate_psar(&[], PsarParams::default()).is_empty());
    }

    #[test]
    fn first_step_moves_toward_extreme() {
        let bars = series(&[(10.0, 9.0), (11.0, 10.0)]);
        let sar = calculate_psar(&bars, PsarParams::default());
        assert_eq!(sar[0], 9.0);
        // 9 + 0.02 * (10 - 9) = 9.02, capped by previous low 9.0
        assert_eq!(sar[1], 9.0);
    }

    #[test]
    fn rising_market_stays_below_lows() {
        let prices: Vec<(f64, f64)> = (0..40).map(|i| (101.0 + i as f64, 99.0 + i as f64)).collect();
        let bars = series(&prices);
        let sar = calculate_psar(&bars, PsarParams::default());
        for (b, s) in bars.iter().zip(&sar).skip(1) {
            assert!(*s < b.low, "SAR {s} not below low {}", b.low);
        }
    }

    #[test]
    fn reverses_above_price_in_a_selloff() {
        let mut prices: Vec<(f64, f64)> = (0..20).map(|i| (101.0 + i as f64, 99.0 + i as f64)).collect();
        prices.extend((0..20).map(|i| (115.0 - 3.0 * i as f64, 112.0 - 3.0 * i as f64)));
        let bars = series(&prices);
        let sar = calculate_psar(&bars, PsarParams::default());
        let last = bars.len() - 1;
        assert!(sar[last] > bars[last].high);
    }
}
