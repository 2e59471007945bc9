// =============================================================================
// Volume Weighted Average Price (VWAP) — intraday, daily reset
// =============================================================================
//
//   typical = (H + L + C) / 3
//   VWAP_t  = Σ(typical · volume) / Σ(volume)
//
// Both running sums restart at every calendar-day boundary of the bar time.
// VWAP is meaningless for daily-or-coarser series; those are refused.

use chrono::Duration;

use super::finite;
use crate::error::IndicatorError;
use crate::types::Bar;

/// Compute the session VWAP for intraday `bars`.
///
/// # Errors
/// `NotApplicable` when the spacing of the first two bars is one day or more.
///
/// Positions where the day's cumulative volume is still zero are `None`.
pub fn calculate_vwap(bars: &[Bar]) -> Result<Vec<Option<f64>>, IndicatorError> {
    if let [first, second, ..] = bars {
        if second.time - first.time >= Duration::days(1) {
            return Err(IndicatorError::NotApplicable {
                indicator: "VWAP",
                reason: "bar spacing is daily or coarser".into(),
            });
        }
    }

    let mut out = Vec::with_capacity(bars.len());
    let mut day = None;
    let mut cum_volume = 0.0;
    let mut cum_value = 0.0;

    for bar in bars {
        let date = bar.time.date();
        if day != Some(date) {
            day = Some(date);
            cum_volume = 0.0;
            cum_value = 0.0;
        }
        let volume = bar.volume as f64;
        cum_volume += volume;
        cum_value += bar.typical_price() * volume;

        out.push(if cum_volume > 0.0 {
            finite(cum_value / cum_volume)
        } else {
            None
        });
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 8, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn bar(time: NaiveDateTime, high: f64, low: f64, close: f64, volume: u64) -> Bar {
        Bar {
            time,
            open: close,
            high,
            low,
            close,
            volume,
        }
    }

    #[test]
    fn cumulative_within_a_day() {
        let bars = vec![
            bar(at(4, 9, 30), 12.0, 9.0, 9.0, 100),   // tp 10
            bar(at(4, 9, 31), 22.0, 19.0, 19.0, 300), // tp 20
        ];
        let vwap = calculate_vwap(&bars).unwrap();
        assert_eq!(vwap[0], Some(10.0));
        assert!((vwap[1].unwrap() - (10.0 * 100.0 + 20.0 * 300.0) / 400.0).abs() < 1e-12);
    }

    #[test]
    fn resets_at_day_boundary() {
        // Two single-bar days with different typical price and volume.
        let bars = vec![
            bar(at(4, 15, 59), 12.0, 9.0, 9.0, 5000), // tp 10
            bar(at(5, 9, 30), 33.0, 27.0, 30.0, 10),  // tp 30
        ];
        let vwap = calculate_vwap(&bars).unwrap();
        assert_eq!(vwap[0], Some(10.0));
        assert!((vwap[1].unwrap() - 30.0).abs() < 1e-12);
    }

    #[test]
    fn zero_volume_is_undefined_until_volume_trades() {
        let bars = vec![
            bar(at(4, 9, 30), 12.0, 9.0, 9.0, 0),
            bar(at(4, 9, 31), 12.0, 9.0, 9.0, 50),
        ];
        let vwap = calculate_vwap(&bars).unwrap();
        assert_eq!(vwap[0], None);
        assert_eq!(vwap[1], Some(10.0));
    }

    #[test]
    fn refuses_daily_series() {
        let bars = vec![
            bar(at(4, 0, 0), 12.0, 9.0, 9.0, 100),
            bar(at(5, 0, 0), 12.0, 9.0, 9.0, 100),
        ];
        assert!(matches!(
            calculate_vwap(&bars),
            Err(IndicatorError::NotApplicable { .. })
        ));
    }

    #[test]
    fn empty_and_single_bar() {
        assert!(calculate_vwap(&[]).unwrap().is_empty());
        let one = vec![bar(at(4, 9, 30), 12.0, 9.0, 9.0, 1)];
        assert_eq!(calculate_vwap(&one).unwrap(), vec![Some(10.0)]);
    }
}
