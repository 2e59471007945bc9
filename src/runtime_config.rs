// =============================================================================
// Runtime Configuration — session settings with atomic save
// =============================================================================
//
// Every tunable lives here: which series to open, where replay data and the
// setup store live, which source error codes are benign, indicator
// parameters, and the annotations to record once the series has loaded.
//
// All fields carry `#[serde(default)]` so that adding new fields never breaks
// loading an older config file.  Saving uses tmp + rename.
//
// =============================================================================

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::indicators::IndicatorParams;
use crate::reconcile::{DEFAULT_BENIGN_CODES, DEFAULT_MAX_BARS};
use crate::setup::SetupContext;
use crate::source::SeriesRequest;
use crate::types::{Lookback, Timeframe};

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_symbol() -> String {
    "SPY".to_string()
}

fn default_timeframe() -> Timeframe {
    Timeframe::Mins5
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_setups_json() -> PathBuf {
    PathBuf::from("setups.json")
}

fn default_setups_csv() -> Option<PathBuf> {
    Some(PathBuf::from("setups.csv"))
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_benign_error_codes() -> Vec<i32> {
    DEFAULT_BENIGN_CODES.to_vec()
}

fn default_max_bars() -> usize {
    DEFAULT_MAX_BARS
}

// =============================================================================
// Annotation
// =============================================================================

/// A setup to record at startup: the bar time plus what the user tagged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub time: NaiveDateTime,
    #[serde(flatten)]
    pub context: SetupContext,
}

// =============================================================================
// RuntimeConfig
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_symbol")]
    pub symbol: String,

    #[serde(default = "default_timeframe")]
    pub timeframe: Timeframe,

    /// End of the historical window.  `None` means the newest available bar.
    #[serde(default)]
    pub as_of: Option<NaiveDateTime>,

    /// Lookback override such as `"2 D"`.  `None` uses the timeframe default.
    #[serde(default)]
    pub lookback: Option<String>,

    /// Directory holding `<SYMBOL>_<timeframe>.csv` replay files.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Bars at the end of each file replayed as live updates.
    #[serde(default)]
    pub replay_live_bars: usize,

    #[serde(default = "default_setups_json")]
    pub setups_json: PathBuf,

    #[serde(default = "default_setups_csv")]
    pub setups_csv: Option<PathBuf>,

    /// Default tracing directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Source error codes that are logged but never shown to the user.
    #[serde(default = "default_benign_error_codes")]
    pub benign_error_codes: Vec<i32>,

    /// Bars retained per series.
    #[serde(default = "default_max_bars")]
    pub max_bars: usize,

    #[serde(default)]
    pub indicators: IndicatorParams,

    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            timeframe: default_timeframe(),
            as_of: None,
            lookback: None,
            data_dir: default_data_dir(),
            replay_live_bars: 0,
            setups_json: default_setups_json(),
            setups_csv: default_setups_csv(),
            log_level: default_log_level(),
            benign_error_codes: default_benign_error_codes(),
            max_bars: default_max_bars(),
            indicators: IndicatorParams::default(),
            annotations: Vec::new(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbol = %config.symbol,
            timeframe = %config.timeframe,
            annotations = config.annotations.len(),
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the configuration to `path` (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }

    /// Apply `EDGEMINER_SYMBOL`, `EDGEMINER_TIMEFRAME` and
    /// `EDGEMINER_DATA_DIR` from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(symbol) = lookup("EDGEMINER_SYMBOL").filter(|s| !s.trim().is_empty()) {
            self.symbol = symbol.trim().to_uppercase();
        }
        if let Some(timeframe) = lookup("EDGEMINER_TIMEFRAME") {
            self.timeframe = timeframe
                .parse()
                .with_context(|| format!("invalid EDGEMINER_TIMEFRAME {timeframe:?}"))?;
        }
        if let Some(dir) = lookup("EDGEMINER_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    /// Effective lookback: the override when set, else the timeframe default.
    pub fn lookback(&self) -> Result<Lookback> {
        match &self.lookback {
            Some(text) => text.parse().with_context(|| format!("invalid lookback {text:?}")),
            None => Ok(self.timeframe.default_lookback()),
        }
    }

    /// The series request described by this configuration.
    pub fn series_request(&self) -> Result<SeriesRequest> {
        let mut request = SeriesRequest::new(&self.symbol, self.timeframe, self.as_of);
        request.lookback = self.lookback()?;
        if request.key.symbol.is_empty() {
            warn!("empty symbol in runtime config");
            anyhow::bail!("symbol must not be empty");
        }
        Ok(request)
    }
}
