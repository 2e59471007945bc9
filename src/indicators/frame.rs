// =============================================================================
// Indicator frame assembly
// =============================================================================
//
// 1. Trim the series to its trailing window.
// 2. Run every indicator independently over the window.  Each one yields a
//    `DerivedSeries` keyed by bar time; a failing indicator yields a
//    time-only placeholder and its columns are recorded as missing.
// 3. Left-join every derived series onto the base bars by `time`.
// 4. Drop every row where any present column is undefined.
//
// The result is a fresh, immutable frame.  Assembly itself never fails.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::adx::calculate_adx;
use super::atr::average_true_range;
use super::bollinger::calculate_bollinger;
use super::keltner::calculate_keltner;
use super::levels::{support_resistance_levels, LevelParams};
use super::ma::{ema, sma};
use super::psar::{calculate_psar, PsarParams};
use super::rsi::calculate_rsi;
use super::vwap::calculate_vwap;
use super::{closes, finite, volumes};
use crate::error::IndicatorError;
use crate::types::Bar;

// ---------------------------------------------------------------------------
// Columns
// ---------------------------------------------------------------------------

/// Derived columns published in a frame, in consumer-contract order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Column {
    #[serde(rename = "VWAP")]
    Vwap,
    #[serde(rename = "EMA")]
    Ema,
    #[serde(rename = "SMA")]
    Sma,
    #[serde(rename = "BB_PC")]
    BbPercent,
    #[serde(rename = "BB_UPPER1")]
    BbUpper1,
    #[serde(rename = "BB_UPPER2")]
    BbUpper2,
    #[serde(rename = "BB_LOWER1")]
    BbLower1,
    #[serde(rename = "BB_LOWER2")]
    BbLower2,
    #[serde(rename = "ADX")]
    Adx,
    #[serde(rename = "DMIP")]
    DmiPlus,
    #[serde(rename = "DMIM")]
    DmiMinus,
    #[serde(rename = "RSI")]
    Rsi,
    #[serde(rename = "ATR")]
    Atr,
    #[serde(rename = "KC_UPPER")]
    KcUpper,
    #[serde(rename = "KC_LOWER")]
    KcLower,
    #[serde(rename = "PSAR")]
    Psar,
    #[serde(rename = "VOL_SMA")]
    VolSma,
}

impl Column {
    pub const ALL: [Column; 17] = [
        Column::Vwap,
        Column::Ema,
        Column::Sma,
        Column::BbPercent,
        Column::BbUpper1,
        Column::BbUpper2,
        Column::BbLower1,
        Column::BbLower2,
        Column::Adx,
        Column::DmiPlus,
        Column::DmiMinus,
        Column::Rsi,
        Column::Atr,
        Column::KcUpper,
        Column::KcLower,
        Column::Psar,
        Column::VolSma,
    ];

    /// Column name as written to frames and setup records.
    pub fn name(&self) -> &'static str {
        match self {
            Column::Vwap => "VWAP",
            Column::Ema => "EMA",
            Column::Sma => "SMA",
            Column::BbPercent => "BB_PC",
            Column::BbUpper1 => "BB_UPPER1",
            Column::BbUpper2 => "BB_UPPER2",
            Column::BbLower1 => "BB_LOWER1",
            Column::BbLower2 => "BB_LOWER2",
            Column::Adx => "ADX",
            Column::DmiPlus => "DMIP",
            Column::DmiMinus => "DMIM",
            Column::Rsi => "RSI",
            Column::Atr => "ATR",
            Column::KcUpper => "KC_UPPER",
            Column::KcLower => "KC_LOWER",
            Column::Psar => "PSAR",
            Column::VolSma => "VOL_SMA",
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Periods and multipliers of every indicator in the frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorParams {
    /// Trailing bars kept before computing anything.
    #[serde(default = "default_window")]
    pub window: usize,
    #[serde(default = "default_ema_period")]
    pub ema_period: usize,
    #[serde(default = "default_sma_period")]
    pub sma_period: usize,
    #[serde(default = "default_bb_period")]
    pub bb_period: usize,
    /// One or two standard-deviation multipliers (bands 1 and 2).
    #[serde(default = "default_bb_multipliers")]
    pub bb_multipliers: Vec<f64>,
    #[serde(default = "default_wilder_period")]
    pub rsi_period: usize,
    #[serde(default = "default_wilder_period")]
    pub adx_period: usize,
    #[serde(default = "default_wilder_period")]
    pub atr_period: usize,
    #[serde(default = "default_keltner_period")]
    pub keltner_period: usize,
    #[serde(default = "default_keltner_multiplier")]
    pub keltner_multiplier: f64,
    #[serde(default = "default_vol_sma_period")]
    pub vol_sma_period: usize,
    #[serde(default)]
    pub psar: PsarParams,
    #[serde(default)]
    pub levels: LevelParams,
}

fn default_window() -> usize {
    520
}

fn default_ema_period() -> usize {
    10
}

fn default_sma_period() -> usize {
    20
}

fn default_bb_period() -> usize {
    20
}

fn default_bb_multipliers() -> Vec<f64> {
    vec![2.0, 3.0]
}

fn default_wilder_period() -> usize {
    14
}

fn default_keltner_period() -> usize {
    20
}

fn default_keltner_multiplier() -> f64 {
    2.0
}

fn default_vol_sma_period() -> usize {
    20
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            window: default_window(),
            ema_period: default_ema_period(),
            sma_period: default_sma_period(),
            bb_period: default_bb_period(),
            bb_multipliers: default_bb_multipliers(),
            rsi_period: default_wilder_period(),
            adx_period: default_wilder_period(),
            atr_period: default_wilder_period(),
            keltner_period: default_keltner_period(),
            keltner_multiplier: default_keltner_multiplier(),
            vol_sma_period: default_vol_sma_period(),
            psar: PsarParams::default(),
            levels: LevelParams::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Derived series
// ---------------------------------------------------------------------------

type ColumnSet = Vec<(Column, Vec<Option<f64>>)>;

/// Output of one indicator keyed by bar time.  A placeholder carries the
/// times only.
#[derive(Debug, Clone)]
struct DerivedSeries {
    time: Vec<NaiveDateTime>,
    columns: ColumnSet,
}

impl DerivedSeries {
    fn new(bars: &[Bar], columns: ColumnSet) -> Self {
        Self {
            time: bars.iter().map(|b| b.time).collect(),
            columns,
        }
    }

    fn placeholder(bars: &[Bar]) -> Self {
        Self::new(bars, Vec::new())
    }
}

struct IndicatorSpec {
    name: &'static str,
    columns: &'static [Column],
    compute: fn(&[Bar], &IndicatorParams) -> Result<ColumnSet, IndicatorError>,
}

const INDICATORS: &[IndicatorSpec] = &[
    IndicatorSpec {
        name: "VWAP",
        columns: &[Column::Vwap],
        compute: compute_vwap,
    },
    IndicatorSpec {
        name: "EMA",
        columns: &[Column::Ema],
        compute: compute_ema,
    },
    IndicatorSpec {
        name: "SMA",
        columns: &[Column::Sma],
        compute: compute_sma,
    },
    IndicatorSpec {
        name: "BollingerBands",
        columns: &[
            Column::BbPercent,
            Column::BbUpper1,
            Column::BbUpper2,
            Column::BbLower1,
            Column::BbLower2,
        ],
        compute: compute_bollinger,
    },
    IndicatorSpec {
        name: "ADX",
        columns: &[Column::Adx, Column::DmiPlus, Column::DmiMinus],
        compute: compute_adx,
    },
    IndicatorSpec {
        name: "RSI",
        columns: &[Column::Rsi],
        compute: compute_rsi,
    },
    IndicatorSpec {
        name: "ATR",
        columns: &[Column::Atr],
        compute: compute_atr,
    },
    IndicatorSpec {
        name: "KeltnerChannel",
        columns: &[Column::KcUpper, Column::KcLower],
        compute: compute_keltner,
    },
    IndicatorSpec {
        name: "PSAR",
        columns: &[Column::Psar],
        compute: compute_psar,
    },
    IndicatorSpec {
        name: "VolumeSMA",
        columns: &[Column::VolSma],
        compute: compute_volume_sma,
    },
];

fn defined(values: Vec<f64>) -> Vec<Option<f64>> {
    values.into_iter().map(finite).collect()
}

/// Rolling windows of length 0 are rejected so the indicator degrades to a
/// missing column instead of an all-undefined one.
fn require_period(indicator: &'static str, period: usize) -> Result<(), IndicatorError> {
    if period == 0 {
        return Err(IndicatorError::InvalidParameter {
            indicator,
            reason: "period must be at least 1".to_string(),
        });
    }
    Ok(())
}

fn compute_vwap(bars: &[Bar], _: &IndicatorParams) -> Result<ColumnSet, IndicatorError> {
    Ok(vec![(Column::Vwap, calculate_vwap(bars)?)])
}

fn compute_ema(bars: &[Bar], params: &IndicatorParams) -> Result<ColumnSet, IndicatorError> {
    require_period("EMA", params.ema_period)?;
    Ok(vec![(Column::Ema, ema(&closes(bars), params.ema_period))])
}

fn compute_sma(bars: &[Bar], params: &IndicatorParams) -> Result<ColumnSet, IndicatorError> {
    require_period("SMA", params.sma_period)?;
    Ok(vec![(Column::Sma, sma(&closes(bars), params.sma_period))])
}

fn compute_bollinger(bars: &[Bar], params: &IndicatorParams) -> Result<ColumnSet, IndicatorError> {
    if params.bb_multipliers.len() > 2 {
        return Err(IndicatorError::InvalidParameter {
            indicator: "BollingerBands",
            reason: format!(
                "at most two multipliers are published, got {}",
                params.bb_multipliers.len()
            ),
        });
    }

    let bb = calculate_bollinger(&closes(bars), params.bb_period, &params.bb_multipliers)?;
    let mut columns = vec![(Column::BbPercent, defined(bb.percent_b))];
    let slots = [
        (Column::BbUpper1, Column::BbLower1),
        (Column::BbUpper2, Column::BbLower2),
    ];
    for (band, (upper, lower)) in bb.bands.into_iter().zip(slots) {
        columns.push((upper, defined(band.upper)));
        columns.push((lower, defined(band.lower)));
    }
    Ok(columns)
}

fn compute_adx(bars: &[Bar], params: &IndicatorParams) -> Result<ColumnSet, IndicatorError> {
    require_period("ADX", params.adx_period)?;
    let adx = calculate_adx(bars, params.adx_period);
    Ok(vec![
        (Column::Adx, defined(adx.adx)),
        (Column::DmiPlus, defined(adx.dmi_plus)),
        (Column::DmiMinus, defined(adx.dmi_minus)),
    ])
}

fn compute_rsi(bars: &[Bar], params: &IndicatorParams) -> Result<ColumnSet, IndicatorError> {
    require_period("RSI", params.rsi_period)?;
    Ok(vec![(
        Column::Rsi,
        defined(calculate_rsi(&closes(bars), params.rsi_period)),
    )])
}

fn compute_atr(bars: &[Bar], params: &IndicatorParams) -> Result<ColumnSet, IndicatorError> {
    require_period("ATR", params.atr_period)?;
    Ok(vec![(Column::Atr, average_true_range(bars, params.atr_period))])
}

fn compute_keltner(bars: &[Bar], params: &IndicatorParams) -> Result<ColumnSet, IndicatorError> {
    require_period("KeltnerChannel", params.keltner_period)?;
    let kc = calculate_keltner(bars, params.keltner_period, params.keltner_multiplier);
    Ok(vec![(Column::KcUpper, kc.upper), (Column::KcLower, kc.lower)])
}

fn compute_psar(bars: &[Bar], params: &IndicatorParams) -> Result<ColumnSet, IndicatorError> {
    Ok(vec![(Column::Psar, defined(calculate_psar(bars, params.psar)))])
}

fn compute_volume_sma(bars: &[Bar], params: &IndicatorParams) -> Result<ColumnSet, IndicatorError> {
    require_period("VolumeSMA", params.vol_sma_period)?;
    Ok(vec![(
        Column::VolSma,
        sma(&volumes(bars), params.vol_sma_period),
    )])
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// Bars of a trailing window with every derived column aligned row by row.
///
/// Only rows where every present column is defined are kept.  Columns of
/// indicators that failed are absent and listed by [`missing_columns`].
///
/// [`missing_columns`]: IndicatorFrame::missing_columns
#[derive(Debug, Clone, Default)]
pub struct IndicatorFrame {
    bars: Vec<Bar>,
    columns: BTreeMap<Column, Vec<f64>>,
    missing: Vec<Column>,
    levels: Vec<f64>,
}

impl IndicatorFrame {
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn bar(&self, row: usize) -> Option<&Bar> {
        self.bars.get(row)
    }

    /// Value of `column` at `row`; `None` when the column is missing or the
    /// row is out of range.
    pub fn value(&self, row: usize, column: Column) -> Option<f64> {
        self.columns.get(&column)?.get(row).copied()
    }

    pub fn column(&self, column: Column) -> Option<&[f64]> {
        self.columns.get(&column).map(Vec::as_slice)
    }

    pub fn has_column(&self, column: Column) -> bool {
        self.columns.contains_key(&column)
    }

    /// Columns that could not be computed for this frame.
    pub fn missing_columns(&self) -> &[Column] {
        &self.missing
    }

    /// Support/resistance prices detected over the trimmed window.
    pub fn levels(&self) -> &[f64] {
        &self.levels
    }

    pub fn last_time(&self) -> Option<NaiveDateTime> {
        self.bars.last().map(|b| b.time)
    }
}

/// Build an indicator frame from `bars` (oldest first).
pub fn assemble_frame(bars: &[Bar], params: &IndicatorParams) -> IndicatorFrame {
    let start = bars.len().saturating_sub(params.window);
    let window = &bars[start..];

    let mut missing = Vec::new();
    let mut derived = Vec::with_capacity(INDICATORS.len());
    for spec in INDICATORS {
        match (spec.compute)(window, params) {
            Ok(columns) => {
                missing.extend(
                    spec.columns
                        .iter()
                        .filter(|c| !columns.iter().any(|(have, _)| have == *c))
                        .copied(),
                );
                derived.push(DerivedSeries::new(window, columns));
            }
            Err(e) => {
                warn!(indicator = spec.name, error = %e, "indicator failed, columns omitted");
                missing.extend_from_slice(spec.columns);
                derived.push(DerivedSeries::placeholder(window));
            }
        }
    }

    // Left join on time.
    let mut joined: BTreeMap<Column, Vec<Option<f64>>> = BTreeMap::new();
    for series in &derived {
        let index: HashMap<NaiveDateTime, usize> = series
            .time
            .iter()
            .enumerate()
            .map(|(i, t)| (*t, i))
            .collect();
        for (column, values) in &series.columns {
            let aligned = window
                .iter()
                .map(|bar| index.get(&bar.time).and_then(|&i| values.get(i).copied().flatten()))
                .collect();
            joined.insert(*column, aligned);
        }
    }

    let keep: Vec<usize> = (0..window.len())
        .filter(|&row| joined.values().all(|values| values[row].is_some()))
        .collect();

    let columns: BTreeMap<Column, Vec<f64>> = joined
        .into_iter()
        .map(|(column, values)| {
            let kept = keep.iter().filter_map(|&row| values[row]).collect();
            (column, kept)
        })
        .collect();
    let frame_bars: Vec<Bar> = keep.iter().map(|&row| window[row]).collect();

    missing.sort();
    let levels = support_resistance_levels(window, &params.levels);

    debug!(
        window = window.len(),
        rows = frame_bars.len(),
        missing = missing.len(),
        "indicator frame assembled"
    );

    IndicatorFrame {
        bars: frame_bars,
        columns,
        missing,
        levels,
    }
}
