// =============================================================================
// Query / filter layer over recorded setups
// =============================================================================

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};

use super::recorder::{FieldValue, SetupRecord};
use crate::types::{Direction, SignalKind, Timeframe};

/// Ticker selector value meaning "no ticker restriction".
pub const ALL_TICKERS: &str = "ALL TICKERS";

/// Features of the annotated bar shown by the dashboard.
pub const T0_COLUMNS: [&str; 17] = [
    "BB_PC",
    "RSI",
    "CANDLE_TYPE",
    "DMIP",
    "DMIM",
    "ADX",
    "DMIP_RISING",
    "DMIM_RISING",
    "ADX_RISING",
    "EMA_RISING",
    "SMA_RISING",
    "EMA_OVER_SMA",
    "VOL_SMA_RISING",
    "VOL_MULTIPLE",
    "RSI_RISING",
    "PSAR_BULL",
    "INSIDE_CANDLE",
];

/// Features of the bar before the annotated one.
pub const T1_COLUMNS: [&str; 6] = ["pBB_PC", "pRSI", "pCANDLE_TYPE", "pDMIP", "pDMIM", "pADX"];

fn default_from() -> NaiveDate {
    NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or(NaiveDate::MIN)
}

fn default_to() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 12, 31).unwrap_or(NaiveDate::MAX)
}

/// Record selection.  `None` fields do not restrict; the date range is
/// inclusive on the bar date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupFilter {
    #[serde(default)]
    pub direction: Option<Direction>,
    #[serde(default, rename = "type")]
    pub kind: Option<SignalKind>,
    #[serde(default)]
    pub strategy: Option<String>,
    #[serde(default)]
    pub ticker: Option<String>,
    #[serde(default)]
    pub timeframe: Option<Timeframe>,
    #[serde(default = "default_from")]
    pub from: NaiveDate,
    #[serde(default = "default_to")]
    pub to: NaiveDate,
}

impl Default for SetupFilter {
    fn default() -> Self {
        Self {
            direction: None,
            kind: None,
            strategy: None,
            ticker: None,
            timeframe: None,
            from: default_from(),
            to: default_to(),
        }
    }
}

impl SetupFilter {
    /// Restrict to `ticker`; [`ALL_TICKERS`] clears the restriction.
    pub fn with_ticker(mut self, ticker: &str) -> Self {
        let ticker = ticker.trim();
        self.ticker = (!ticker.eq_ignore_ascii_case(ALL_TICKERS)).then(|| ticker.to_uppercase());
        self
    }

    pub fn matches(&self, record: &SetupRecord) -> bool {
        let text = |field: &str| record.get(field).and_then(FieldValue::as_str);

        if let Some(direction) = self.direction {
            if text("direction") != Some(direction.to_string().as_str()) {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if text("type") != Some(kind.to_string().as_str()) {
                return false;
            }
        }
        if let Some(strategy) = &self.strategy {
            if text("strategy") != Some(strategy.as_str()) {
                return false;
            }
        }
        if let Some(ticker) = &self.ticker {
            if !text("ticker").is_some_and(|t| t.eq_ignore_ascii_case(ticker)) {
                return false;
            }
        }
        if let Some(timeframe) = self.timeframe {
            if text("timeframe") != Some(timeframe.as_str()) {
                return false;
            }
        }

        match record_date(record) {
            Some(date) => self.from <= date && date <= self.to,
            None => false,
        }
    }

    pub fn apply<'a>(&self, records: &'a [SetupRecord]) -> Vec<&'a SetupRecord> {
        records.iter().filter(|r| self.matches(r)).collect()
    }
}

/// Calendar date of the annotated bar.
pub fn record_date(record: &SetupRecord) -> Option<NaiveDate> {
    let millis = record.get("time")?.as_i64()?;
    DateTime::from_timestamp_millis(millis).map(|dt| dt.naive_utc().date())
}

/// Sorted distinct non-null values of `field`, rendered as text.
pub fn distinct_values<'a>(
    records: impl IntoIterator<Item = &'a SetupRecord>,
    field: &str,
) -> Vec<String> {
    let set: BTreeSet<String> = records
        .into_iter()
        .filter_map(|r| r.get(field))
        .filter(|v| !v.is_null())
        .map(ToString::to_string)
        .collect();
    set.into_iter().collect()
}

/// Count, mean and range of a numeric column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnSummary {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

/// Summary over the numeric values of `field`; booleans count as 0/1.
/// `None` when no record has a numeric value.
pub fn column_summary<'a>(
    records: impl IntoIterator<Item = &'a SetupRecord>,
    field: &str,
) -> Option<ColumnSummary> {
    let values: Vec<f64> = records
        .into_iter()
        .filter_map(|r| match r.get(field)? {
            FieldValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            other => other.as_f64(),
        })
        .collect();
    if values.is_empty() {
        return None;
    }
    Some(ColumnSummary {
        count: values.len(),
        mean: values.iter().sum::<f64>() / values.len() as f64,
        min: values.iter().copied().fold(f64::INFINITY, f64::min),
        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    })
}

/// Occurrences of every distinct value of a categorical column.
pub fn value_counts<'a>(
    records: impl IntoIterator<Item = &'a SetupRecord>,
    field: &str,
) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for value in records.into_iter().filter_map(|r| r.get(field)) {
        if !value.is_null() {
            *counts.entry(value.to_string()).or_insert(0) += 1;
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::indicators::{assemble_frame, IndicatorParams};
    use crate::setup::recorder::{build_setup_record, SetupContext};
    use crate::types::Bar;

    fn record(fields: &[(&str, FieldValue)]) -> SetupRecord {
        let map: BTreeMap<String, FieldValue> =
            fields.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        serde_json::from_value(serde_json::to_value(map).unwrap()).unwrap()
    }

    fn setup(ticker: &str, direction: &str, date_ms: i64, rsi: f64, candle: i64) -> SetupRecord {
        record(&[
            ("ticker", FieldValue::Text(ticker.into())),
            ("strategy", FieldValue::Text("breakout".into())),
            ("timeframe", FieldValue::Text("5 mins".into())),
            ("type", FieldValue::Text("trade".into())),
            ("direction", FieldValue::Text(direction.into())),
            ("time", FieldValue::Int(date_ms)),
            ("RSI", FieldValue::Float(rsi)),
            ("CANDLE_TYPE", FieldValue::Int(candle)),
            ("PSAR_BULL", FieldValue::Bool(rsi > 50.0)),
        ])
    }

    // 2024-01-15 and 2025-03-10, midday UTC
    const JAN_2024: i64 = 1_705_320_000_000;
    const MAR_2025: i64 = 1_741_608_000_000;

    fn sample() -> Vec<SetupRecord> {
        vec![
            setup("AAPL", "long", JAN_2024, 60.0, 15),
            setup("MSFT", "short", JAN_2024, 40.0, 51),
            setup("AAPL", "long", MAR_2025, 70.0, 15),
        ]
    }

    #[test]
    fn default_filter_selects_everything() {
        let records = sample();
        assert_eq!(SetupFilter::default().apply(&records).len(), 3);
    }

    #[test]
    fn filters_combine() {
        let records = sample();
        let filter = SetupFilter {
            direction: Some(Direction::Long),
            timeframe: Some(Timeframe::Mins5),
            ..SetupFilter::default()
        }
        .with_ticker("aapl");
        assert_eq!(filter.apply(&records).len(), 2);

        let filter = SetupFilter {
            from: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            ..SetupFilter::default()
        };
        assert_eq!(filter.apply(&records).len(), 1);

        let filter = SetupFilter {
            kind: Some(SignalKind::Signal),
            ..SetupFilter::default()
        };
        assert!(filter.apply(&records).is_empty());
    }

    #[test]
    fn all_tickers_clears_restriction() {
        let filter = SetupFilter::default().with_ticker("AAPL").with_ticker(ALL_TICKERS);
        assert_eq!(filter.ticker, None);
        assert_eq!(filter.apply(&sample()).len(), 3);
    }

    #[test]
    fn date_range_is_inclusive() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let filter = SetupFilter {
            from: day,
            to: day,
            ..SetupFilter::default()
        };
        assert_eq!(filter.apply(&sample()).len(), 2);
    }

    #[test]
    fn distinct_and_counts() {
        let records = sample();
        assert_eq!(distinct_values(&records, "ticker"), vec!["AAPL", "MSFT"]);
        let counts = value_counts(&records, "CANDLE_TYPE");
        assert_eq!(counts.get("15"), Some(&2));
        assert_eq!(counts.get("51"), Some(&1));
    }

    #[test]
    fn summary_of_numeric_and_bool_columns() {
        let records = sample();
        let rsi = column_summary(&records, "RSI").unwrap();
        assert_eq!(rsi.count, 3);
        assert!((rsi.mean - 170.0 / 3.0).abs() < 1e-12);
        assert_eq!(rsi.min, 40.0);
        assert_eq!(rsi.max, 70.0);

        let bull = column_summary(&records, "PSAR_BULL").unwrap();
        assert!((bull.mean - 2.0 / 3.0).abs() < 1e-12);
        assert!(column_summary(&records, "NOPE").is_none());
    }

    #[test]
    fn canonical_columns_exist_in_recorded_setups() {
        let start = NaiveDate::from_ymd_opt(2025, 4, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        let bars: Vec<Bar> = (0..60)
            .map(|i| {
                let c = 30.0 + (i as f64 * 0.5).sin();
                Bar {
                    time: start + Duration::minutes(i),
                    open: c - 0.1,
                    high: c + 0.3,
                    low: c - 0.3,
                    close: c,
                    volume: 800 + i as u64,
                }
            })
            .collect();
        let frame = assemble_frame(&bars, &IndicatorParams::default());
        let context = SetupContext {
            ticker: "SPY".into(),
            strategy: "breakout".into(),
            timeframe: Timeframe::Min1,
            kind: SignalKind::Trade,
            direction: Direction::Long,
        };
        let record = build_setup_record(&frame, start + Duration::minutes(45), &context).unwrap();

        for column in T0_COLUMNS.iter().chain(T1_COLUMNS.iter()) {
            assert!(record.get(column).is_some(), "{column} not recorded");
        }
    }
}
