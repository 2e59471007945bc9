// =============================================================================
// Raw source bars and their conversion into `Bar`
// =============================================================================
//
// Sources hand over bars with a textual date:
//   - `YYYYMMDD`                 daily-or-coarser bars, midnight
//   - integer epoch seconds      intraday bars, UTC
//   - `YYYY-MM-DD HH:MM:SS`      replay files
//   - `YYYY-MM-DD`               replay files, midnight
//   - RFC 3339                   replay files, wall clock as written

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::BarError;
use crate::types::Bar;

/// A bar as delivered by a data source, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBar {
    #[serde(alias = "time")]
    pub date: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Parse a source date in any of the accepted layouts.
pub fn parse_bar_time(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if s.bytes().all(|b| b.is_ascii_digit()) {
        if s.len() == 8 {
            if let Ok(date) = NaiveDate::parse_from_str(s, "%Y%m%d") {
                return date.and_hms_opt(0, 0, 0);
            }
        }
        let secs: i64 = s.parse().ok()?;
        return DateTime::from_timestamp(secs, 0).map(|dt| dt.naive_utc());
    }

    if let Ok(t) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(t);
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.naive_local())
}

impl TryFrom<RawBar> for Bar {
    type Error = BarError;

    fn try_from(raw: RawBar) -> Result<Self, Self::Error> {
        let time = parse_bar_time(&raw.date).ok_or_else(|| BarError::InvalidDate(raw.date.clone()))?;

        if ![raw.open, raw.high, raw.low, raw.close]
            .iter()
            .all(|p| p.is_finite())
        {
            return Err(BarError::NonFinitePrice(raw.date));
        }
        if !raw.volume.is_finite() || raw.volume < 0.0 {
            return Err(BarError::InvalidVolume {
                date: raw.date,
                volume: raw.volume,
            });
        }

        let bar = Bar {
            time,
            open: raw.open,
            high: raw.high,
            low: raw.low,
            close: raw.close,
            volume: raw.volume.round() as u64,
        };
        if !bar.is_well_formed() {
            return Err(BarError::InvalidRange(raw.date));
        }
        Ok(bar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(date: &str, o: f64, h: f64, l: f64, c: f64, v: f64) -> RawBar {
        RawBar {
            date: date.into(),
            open: o,
            high: h,
            low: l,
            close: c,
            volume: v,
        }
    }

    #[test]
    fn calendar_date_is_midnight() {
        let t = parse_bar_time("20250117").unwrap();
        assert_eq!(t.to_string(), "2025-01-17 00:00:00");
    }

    #[test]
    fn epoch_seconds_are_utc() {
        let t = parse_bar_time("1700000000").unwrap();
        assert_eq!(t.to_string(), "2023-11-14 22:13:20");
    }

    #[test]
    fn replay_layouts() {
        assert_eq!(
            parse_bar_time("2025-01-17 09:30:00").unwrap().to_string(),
            "2025-01-17 09:30:00"
        );
        assert_eq!(
            parse_bar_time("2025-01-17").unwrap().to_string(),
            "2025-01-17 00:00:00"
        );
        assert_eq!(
            parse_bar_time("2025-01-17T09:30:00-05:00").unwrap().to_string(),
            "2025-01-17 09:30:00"
        );
        assert!(parse_bar_time("yesterday").is_none());
        assert!(parse_bar_time("").is_none());
    }

    #[test]
    fn converts_valid_bar() {
        let bar = Bar::try_from(raw("20250117", 10.0, 11.0, 9.0, 10.5, 1200.4)).unwrap();
        assert_eq!(bar.volume, 1200);
        assert_eq!(bar.close, 10.5);
    }

    #[test]
    fn rejects_malformed_bars() {
        assert!(matches!(
            Bar::try_from(raw("bad", 10.0, 11.0, 9.0, 10.5, 1.0)),
            Err(BarError::InvalidDate(_))
        ));
        assert!(matches!(
            Bar::try_from(raw("20250117", f64::NAN, 11.0, 9.0, 10.5, 1.0)),
            Err(BarError::NonFinitePrice(_))
        ));
        assert!(matches!(
            Bar::try_from(raw("20250117", 10.0, 11.0, 9.0, 10.5, -1.0)),
            Err(BarError::InvalidVolume { .. })
        ));
        assert!(matches!(
            Bar::try_from(raw("20250117", 12.0, 11.0, 9.0, 10.5, 1.0)),
            Err(BarError::InvalidRange(_))
        ));
    }
}
