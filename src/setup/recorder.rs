// =============================================================================
// Setup Recorder — point-in-time feature vectors from an indicator frame
// =============================================================================
//
// Recording a setup:
//   1. Find the frame row nearest to the annotated timestamp (ties go to the
//      earlier row, out-of-range timestamps clamp to the first/last row).
//   2. Join the preceding row as the "prior" bar.
//   3. Derive comparison features (gap, change, rising flags, ratios, candle
//      relationships).
//   4. Append the flat record to the store.
//
// A feature that cannot be derived because a column is missing or there is
// no prior bar is written as an explicit null.  A non-finite gap or change
// aborts the whole record.
// =============================================================================

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::store::SetupStore;
use crate::error::SetupError;
use crate::indicators::candle::candle_type;
use crate::indicators::{Column, IndicatorFrame};
use crate::types::{Bar, Direction, SignalKind, Timeframe};

// ---------------------------------------------------------------------------
// Record values
// ---------------------------------------------------------------------------

/// One value of a setup record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Null,
}

impl FieldValue {
    /// Float value, or `Null` when `x` is not finite.
    pub fn float(x: f64) -> Self {
        if x.is_finite() {
            Self::Float(x)
        } else {
            Self::Null
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Numeric view of `Int` and `Float` values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<Option<f64>> for FieldValue {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Self::Null, Self::float)
    }
}

impl From<Option<bool>> for FieldValue {
    fn from(value: Option<bool>) -> Self {
        value.map_or(Self::Null, Self::Bool)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
            Self::Null => Ok(()),
        }
    }
}

/// Flat, immutable mapping of feature name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SetupRecord(BTreeMap<String, FieldValue>);

impl SetupRecord {
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.0.get(field)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn insert(&mut self, field: impl Into<String>, value: impl Into<FieldValue>) {
        self.0.insert(field.into(), value.into());
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// What the user tagged, besides the bar itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupContext {
    pub ticker: String,
    pub strategy: String,
    pub timeframe: Timeframe,
    #[serde(rename = "type", default)]
    pub kind: SignalKind,
    #[serde(default)]
    pub direction: Direction,
}

/// Columns with a `<NAME>_RISING` flag.
const RISING_COLUMNS: [Column; 9] = [
    Column::Ema,
    Column::Sma,
    Column::Adx,
    Column::DmiPlus,
    Column::DmiMinus,
    Column::Rsi,
    Column::Atr,
    Column::BbPercent,
    Column::VolSma,
];

/// `(feature, column)` pairs for `CLOSE_OVER_<column>`.
const CLOSE_OVER: [(&str, Column); 3] = [
    ("CLOSE_OVER_EMA", Column::Ema),
    ("CLOSE_OVER_SMA", Column::Sma),
    ("CLOSE_OVER_VWAP", Column::Vwap),
];

// ---------------------------------------------------------------------------
// Lookup
// ---------------------------------------------------------------------------

/// Index of the entry of `times` (ascending) nearest to `ts`.
///
/// # Edge cases
/// - empty `times` => `None`
/// - `ts` before the first / after the last entry => first / last index
/// - equidistant between two entries => the earlier one
pub fn nearest_bar_index(times: &[NaiveDateTime], ts: NaiveDateTime) -> Option<usize> {
    if times.is_empty() {
        return None;
    }
    let idx = times.partition_point(|t| *t < ts);
    if idx == 0 {
        return Some(0);
    }
    if idx == times.len() {
        return Some(times.len() - 1);
    }
    let left = ts - times[idx - 1];
    let right = times[idx] - ts;
    Some(if left <= right { idx - 1 } else { idx })
}

// ---------------------------------------------------------------------------
// Feature derivation
// ---------------------------------------------------------------------------

fn percent_change(from: f64, to: f64, feature: &'static str) -> Result<f64, SetupError> {
    let pc = (to / from - 1.0) * 100.0;
    if pc.is_finite() {
        Ok(pc)
    } else {
        Err(SetupError::NonFinite { feature })
    }
}

fn bar_fields(record: &mut SetupRecord, prefix: &str, bar: &Bar, frame: &IndicatorFrame, row: usize) {
    record.insert(format!("{prefix}time"), bar.time.and_utc().timestamp_millis());
    record.insert(format!("{prefix}open"), FieldValue::float(bar.open));
    record.insert(format!("{prefix}high"), FieldValue::float(bar.high));
    record.insert(format!("{prefix}low"), FieldValue::float(bar.low));
    record.insert(format!("{prefix}close"), FieldValue::float(bar.close));
    record.insert(
        format!("{prefix}volume"),
        i64::try_from(bar.volume).map_or(FieldValue::Null, FieldValue::Int),
    );
    for column in Column::ALL {
        record.insert(format!("{prefix}{column}"), frame.value(row, column));
    }
}

fn volume_multiple(bar: &Bar, vol_sma: Option<f64>) -> FieldValue {
    match vol_sma {
        Some(avg) if avg != 0.0 => FieldValue::float(bar.volume as f64 / avg),
        _ => FieldValue::Null,
    }
}

fn compare(a: Option<f64>, b: Option<f64>) -> Option<bool> {
    Some(a? > b?)
}

/// Build the record for the bar of `frame` nearest to `timestamp`.
pub fn build_setup_record(
    frame: &IndicatorFrame,
    timestamp: NaiveDateTime,
    context: &SetupContext,
) -> Result<SetupRecord, SetupError> {
    let times: Vec<NaiveDateTime> = frame.bars().iter().map(|b| b.time).collect();
    let row = nearest_bar_index(&times, timestamp).ok_or(SetupError::EmptyFrame)?;
    let bar = frame.bar(row).ok_or(SetupError::EmptyFrame)?;
    let prior_row = row.checked_sub(1);
    let prior = prior_row.and_then(|r| frame.bar(r));

    let mut record = SetupRecord::default();

    // Context
    record.insert("ticker", context.ticker.trim().to_uppercase());
    record.insert("strategy", context.strategy.clone());
    record.insert("timeframe", context.timeframe.as_str().to_string());
    record.insert("type", context.kind.to_string());
    record.insert("direction", context.direction.to_string());

    // Current and prior rows
    bar_fields(&mut record, "", bar, frame, row);
    match (prior, prior_row) {
        (Some(p), Some(r)) => bar_fields(&mut record, "p", p, frame, r),
        _ => {
            let names = ["time", "open", "high", "low", "close", "volume"];
            for name in names.into_iter().chain(Column::ALL.iter().map(Column::name)) {
                record.insert(format!("p{name}"), FieldValue::Null);
            }
        }
    }

    let now = |c: Column| frame.value(row, c);
    let before = |c: Column| prior_row.and_then(|r| frame.value(r, c));

    // Gap and change
    let gap = prior
        .map(|p| percent_change(p.close, bar.open, "GAP_PC"))
        .transpose()?;
    record.insert("GAP_PC", gap);
    record.insert(
        "CHANGE_PC",
        FieldValue::Float(percent_change(bar.open, bar.close, "CHANGE_PC")?),
    );
    let prior_change = prior
        .map(|p| percent_change(p.open, p.close, "pCHANGE_PC"))
        .transpose()?;
    record.insert("pCHANGE_PC", prior_change);

    // Rising flags
    for column in RISING_COLUMNS {
        record.insert(format!("{column}_RISING"), compare(now(column), before(column)));
    }

    // Volume
    record.insert("VOL_MULTIPLE", volume_multiple(bar, now(Column::VolSma)));
    record.insert(
        "pVOL_MULTIPLE",
        prior.map_or(FieldValue::Null, |p| volume_multiple(p, before(Column::VolSma))),
    );

    // Relative position flags
    for (feature, column) in CLOSE_OVER {
        record.insert(feature, compare(Some(bar.close), now(column)));
    }
    record.insert("EMA_OVER_SMA", compare(now(Column::Ema), now(Column::Sma)));
    record.insert("BB_OVER_KC", compare(now(Column::BbUpper1), now(Column::KcUpper)));
    record.insert("PSAR_BULL", compare(Some(bar.low), now(Column::Psar)));

    // Candle shape and relationship to the prior candle
    record.insert("CANDLE_TYPE", i64::from(candle_type(bar)));
    record.insert(
        "pCANDLE_TYPE",
        prior.map_or(FieldValue::Null, |p| FieldValue::Int(i64::from(candle_type(p)))),
    );
    record.insert(
        "INSIDE_CANDLE",
        prior.map(|p| bar.high <= p.high && bar.low >= p.low),
    );
    record.insert(
        "OUTSIDE_CANDLE",
        prior.map(|p| bar.high > p.high && bar.low < p.low),
    );

    debug!(
        row,
        time = %bar.time,
        fields = record.len(),
        missing = frame.missing_columns().len(),
        "setup record built"
    );
    Ok(record)
}

// ---------------------------------------------------------------------------
// Recorder
// ---------------------------------------------------------------------------

/// Builds records and appends them to a [`SetupStore`].
pub struct SetupRecorder {
    store: SetupStore,
}

impl SetupRecorder {
    pub fn new(store: SetupStore) -> Self {
        Self { store }
    }

    /// Record the setup at `timestamp`.
    ///
    /// A derivation error leaves the store untouched.  A persistence error
    /// is returned after the record was added in memory; the next successful
    /// append rewrites the files in full.
    pub fn record(
        &mut self,
        frame: &IndicatorFrame,
        timestamp: NaiveDateTime,
        context: &SetupContext,
    ) -> Result<SetupRecord, SetupError> {
        let record = match build_setup_record(frame, timestamp, context) {
            Ok(record) => record,
            Err(e) => {
                warn!(ticker = %context.ticker, time = %timestamp, error = %e, "setup not recorded");
                return Err(e);
            }
        };

        self.store.append(record.clone())?;
        info!(
            ticker = %context.ticker,
            strategy = %context.strategy,
            direction = %context.direction,
            time = %timestamp,
            total = self.store.len(),
            "setup recorded"
        );
        Ok(record)
    }

    pub fn store(&self) -> &SetupStore {
        &self.store
    }
}
