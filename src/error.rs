// =============================================================================
// Typed errors for bars, the indicator pipeline and the setup store
// =============================================================================

use thiserror::Error;

/// Failure of a single indicator. Assembly isolates these per indicator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndicatorError {
    #[error("{indicator}: need more than {needed} bars, got {got}")]
    InsufficientData {
        indicator: &'static str,
        needed: usize,
        got: usize,
    },

    #[error("{indicator}: invalid parameter: {reason}")]
    InvalidParameter {
        indicator: &'static str,
        reason: String,
    },

    #[error("{indicator}: not applicable: {reason}")]
    NotApplicable {
        indicator: &'static str,
        reason: String,
    },
}

/// Reason a raw source bar was rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BarError {
    #[error("unrecognised bar date {0:?}")]
    InvalidDate(String),

    #[error("non-finite price in bar at {0}")]
    NonFinitePrice(String),

    #[error("invalid volume {volume} in bar at {date}")]
    InvalidVolume { date: String, volume: f64 },

    #[error("OHLC out of order in bar at {0}")]
    InvalidRange(String),
}

/// Failure while reading or rewriting the persisted setup table.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Failure while building or appending one setup record.
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("indicator frame is empty, no bar to annotate")]
    EmptyFrame,

    #[error("feature {feature} is not finite")]
    NonFinite { feature: &'static str },

    #[error("failed to persist setups: {0}")]
    Store(#[from] StoreError),
}
