// =============================================================================
// Shared types used across the EdgeMiner core
// =============================================================================

use std::str::FromStr;

use chrono::{Duration, Months, NaiveDateTime};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Bar
// ---------------------------------------------------------------------------

/// A single OHLCV observation for a fixed time interval.
///
/// `time` is the exchange-local wall clock at bar open; calendar-day
/// boundaries (VWAP resets) are derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub time: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Bar {
    /// `(high + low + close) / 3`
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// Finite prices and `low <= min(open, close) <= max(open, close) <= high`.
    pub fn is_well_formed(&self) -> bool {
        let prices = [self.open, self.high, self.low, self.close];
        if prices.iter().any(|p| !p.is_finite()) {
            return false;
        }
        self.low <= self.open.min(self.close) && self.open.max(self.close) <= self.high
    }
}

// ---------------------------------------------------------------------------
// Timeframe
// ---------------------------------------------------------------------------

/// Bar size of a series. Serialised with the broker's textual names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1 min")]
    Min1,
    #[serde(rename = "2 mins")]
    Mins2,
    #[serde(rename = "3 mins")]
    Mins3,
    #[serde(rename = "5 mins")]
    Mins5,
    #[serde(rename = "10 mins")]
    Mins10,
    #[serde(rename = "15 mins")]
    Mins15,
    #[serde(rename = "20 mins")]
    Mins20,
    #[serde(rename = "30 mins")]
    Mins30,
    #[serde(rename = "1 hour")]
    Hour1,
    #[serde(rename = "2 hours")]
    Hours2,
    #[serde(rename = "3 hours")]
    Hours3,
    #[serde(rename = "4 hours")]
    Hours4,
    #[serde(rename = "1 day")]
    Day1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 13] = [
        Self::Min1,
        Self::Mins2,
        Self::Mins3,
        Self::Mins5,
        Self::Mins10,
        Self::Mins15,
        Self::Mins20,
        Self::Mins30,
        Self::Hour1,
        Self::Hours2,
        Self::Hours3,
        Self::Hours4,
        Self::Day1,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Min1 => "1 min",
            Self::Mins2 => "2 mins",
            Self::Mins3 => "3 mins",
            Self::Mins5 => "5 mins",
            Self::Mins10 => "10 mins",
            Self::Mins15 => "15 mins",
            Self::Mins20 => "20 mins",
            Self::Mins30 => "30 mins",
            Self::Hour1 => "1 hour",
            Self::Hours2 => "2 hours",
            Self::Hours3 => "3 hours",
            Self::Hours4 => "4 hours",
            Self::Day1 => "1 day",
        }
    }

    /// Name without whitespace, used in file names (`5mins`, `1day`).
    pub fn slug(&self) -> String {
        self.as_str().replace(' ', "")
    }

    /// How much history is requested by default for this bar size.
    pub fn default_lookback(&self) -> Lookback {
        let (amount, unit) = match self {
            Self::Min1 | Self::Mins2 | Self::Mins3 | Self::Mins5 => (1, LookbackUnit::Days),
            Self::Mins10 | Self::Mins15 => (1, LookbackUnit::Weeks),
            Self::Mins20 | Self::Mins30 => (1, LookbackUnit::Months),
            Self::Hour1 | Self::Hours2 => (3, LookbackUnit::Months),
            Self::Hours3 | Self::Hours4 => (6, LookbackUnit::Months),
            Self::Day1 => (5, LookbackUnit::Years),
        };
        Lookback { amount, unit }
    }
}

impl Default for Timeframe {
    fn default() -> Self {
        Self::Min1
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|tf| tf.as_str() == wanted || tf.slug() == wanted)
            .ok_or_else(|| anyhow::anyhow!("unknown timeframe: {s:?}"))
    }
}

// ---------------------------------------------------------------------------
// Lookback
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookbackUnit {
    Seconds,
    Days,
    Weeks,
    Months,
    Years,
}

/// Amount of history to request, e.g. `2 D` or `6 M`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lookback {
    pub amount: u32,
    pub unit: LookbackUnit,
}

impl Lookback {
    /// First instant covered by this lookback when the window ends at `as_of`.
    ///
    /// Returns `None` if the subtraction leaves chrono's representable range.
    pub fn start_from(&self, as_of: NaiveDateTime) -> Option<NaiveDateTime> {
        let amount = i64::from(self.amount);
        match self.unit {
            LookbackUnit::Seconds => as_of.checked_sub_signed(Duration::seconds(amount)),
            LookbackUnit::Days => as_of.checked_sub_signed(Duration::days(amount)),
            LookbackUnit::Weeks => as_of.checked_sub_signed(Duration::weeks(amount)),
            LookbackUnit::Months => as_of.checked_sub_months(Months::new(self.amount)),
            LookbackUnit::Years => as_of.checked_sub_months(Months::new(self.amount.checked_mul(12)?)),
        }
    }
}

impl std::fmt::Display for Lookback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let unit = match self.unit {
            LookbackUnit::Seconds => "S",
            LookbackUnit::Days => "D",
            LookbackUnit::Weeks => "W",
            LookbackUnit::Months => "M",
            LookbackUnit::Years => "Y",
        };
        write!(f, "{} {}", self.amount, unit)
    }
}

impl FromStr for Lookback {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let amount = parts
            .next()
            .ok_or_else(|| anyhow::anyhow!("empty lookback"))?
            .parse::<u32>()
            .map_err(|e| anyhow::anyhow!("invalid lookback amount in {s:?}: {e}"))?;
        let unit = match parts.next().map(str::to_uppercase).as_deref() {
            Some("S") => LookbackUnit::Seconds,
            Some("D") => LookbackUnit::Days,
            Some("W") => LookbackUnit::Weeks,
            Some("M") => LookbackUnit::Months,
            Some("Y") => LookbackUnit::Years,
            other => anyhow::bail!("invalid lookback unit {other:?} in {s:?}"),
        };
        if parts.next().is_some() {
            anyhow::bail!("trailing characters in lookback {s:?}");
        }
        Ok(Self { amount, unit })
    }
}

// ---------------------------------------------------------------------------
// Series key
// ---------------------------------------------------------------------------

/// Identifies one bar series: `(symbol, timeframe)`.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SeriesKey {
    pub symbol: String,
    pub timeframe: Timeframe,
}

impl SeriesKey {
    /// Symbols are normalised to upper case so `aapl` and `AAPL` share a key.
    pub fn new(symbol: &str, timeframe: Timeframe) -> Self {
        Self {
            symbol: symbol.trim().to_uppercase(),
            timeframe,
        }
    }
}

impl std::fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.symbol, self.timeframe)
    }
}

// ---------------------------------------------------------------------------
// Setup context enums
// ---------------------------------------------------------------------------

/// Trade direction of an annotated setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Default for Direction {
    fn default() -> Self {
        Self::Long
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "long"),
            Self::Short => write!(f, "short"),
        }
    }
}

/// Whether an annotation marks a signal or an actual trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Signal,
    Trade,
}

impl Default for SignalKind {
    fn default() -> Self {
        Self::Signal
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Signal => write!(f, "signal"),
            Self::Trade => write!(f, "trade"),
        }
    }
}
