// =============================================================================
// Data source boundary
// =============================================================================
//
// A `DataSource` receives series requests and answers through a `SourceSink`
// from whatever thread it runs on.  The sink only pushes onto the
// reconciler's input queue; all state lives in the reconciler.
//
// `ReplaySource` serves bars from CSV files laid out as
//   <data_dir>/<SYMBOL>_<timeframe-slug>.csv   (time,open,high,low,close,volume)
// on a dedicated thread per request.

use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::market_data::{parse_bar_time, RawBar, RequestId};
use crate::reconcile::ReconcilerInput;
use crate::types::{Lookback, SeriesKey, Timeframe};

/// Source error code for "no data available for the request".
pub const NO_DATA_CODE: i32 = 162;

// ---------------------------------------------------------------------------
// Requests and callbacks
// ---------------------------------------------------------------------------

/// One historical-plus-live series request.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesRequest {
    pub key: SeriesKey,
    pub lookback: Lookback,
    /// End of the requested window; `None` means "up to now".
    pub as_of: Option<NaiveDateTime>,
}

impl SeriesRequest {
    /// Request with the timeframe's default lookback.
    pub fn new(symbol: &str, timeframe: Timeframe, as_of: Option<NaiveDateTime>) -> Self {
        Self {
            key: SeriesKey::new(symbol, timeframe),
            lookback: timeframe.default_lookback(),
            as_of,
        }
    }
}

/// Callback delivered by a source.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    /// Bar of the initial historical batch.
    Bar { id: RequestId, bar: RawBar },
    /// Live update of the tail bar, or a new bar after the batch.
    BarUpdate { id: RequestId, bar: RawBar },
    /// The historical batch for `id` is complete.
    SeriesComplete { id: RequestId },
    Error {
        id: Option<RequestId>,
        code: i32,
        message: String,
    },
}

/// Handle sources use to report back.  Cheap to clone, usable from any
/// thread.
#[derive(Debug, Clone)]
pub struct SourceSink {
    tx: mpsc::UnboundedSender<ReconcilerInput>,
}

impl SourceSink {
    pub fn new(tx: mpsc::UnboundedSender<ReconcilerInput>) -> Self {
        Self { tx }
    }

    pub fn on_bar(&self, id: RequestId, bar: RawBar) {
        self.push(SourceEvent::Bar { id, bar });
    }

    pub fn on_bar_update(&self, id: RequestId, bar: RawBar) {
        self.push(SourceEvent::BarUpdate { id, bar });
    }

    pub fn on_series_complete(&self, id: RequestId) {
        self.push(SourceEvent::SeriesComplete { id });
    }

    pub fn on_error(&self, id: Option<RequestId>, code: i32, message: impl Into<String>) {
        self.push(SourceEvent::Error {
            id,
            code,
            message: message.into(),
        });
    }

    fn push(&self, event: SourceEvent) {
        if self.tx.send(ReconcilerInput::Source(event)).is_err() {
            debug!("reconciler input closed, source event dropped");
        }
    }
}

/// Provider of bar series.
pub trait DataSource: Send {
    /// Attach the sink callbacks are delivered to.
    fn start(&mut self, sink: SourceSink) -> Result<()>;

    /// Begin delivering the series for `request` under identifier `id`.
    fn request_series(&mut self, id: RequestId, request: &SeriesRequest) -> Result<()>;

    /// Stop delivering and release resources.
    fn close(&mut self);
}

// ---------------------------------------------------------------------------
// CSV replay source
// ---------------------------------------------------------------------------

pub struct ReplaySource {
    data_dir: PathBuf,
    /// Trailing bars delivered as live updates after the batch completes.
    live_bars: usize,
    sink: Option<SourceSink>,
    workers: Vec<JoinHandle<()>>,
}

impl ReplaySource {
    pub fn new(data_dir: impl Into<PathBuf>, live_bars: usize) -> Self {
        Self {
            data_dir: data_dir.into(),
            live_bars,
            sink: None,
            workers: Vec::new(),
        }
    }

    /// Join replay threads that have already returned.
    fn reap_finished(&mut self) {
        let (done, running): (Vec<_>, Vec<_>) =
            self.workers.drain(..).partition(JoinHandle::is_finished);
        self.workers = running;
        for handle in done {
            if handle.join().is_err() {
                warn!("replay thread panicked");
            }
        }
    }

    /// File holding the bars of `key`.
    pub fn series_path(&self, key: &SeriesKey) -> PathBuf {
        self.data_dir
            .join(format!("{}_{}.csv", key.symbol, key.timeframe.slug()))
    }
}

impl DataSource for ReplaySource {
    fn start(&mut self, sink: SourceSink) -> Result<()> {
        if !self.data_dir.is_dir() {
            warn!(dir = %self.data_dir.display(), "replay data directory does not exist");
        }
        info!(dir = %self.data_dir.display(), "replay source started");
        self.sink = Some(sink);
        Ok(())
    }

    fn request_series(&mut self, id: RequestId, request: &SeriesRequest) -> Result<()> {
        let sink = self
            .sink
            .clone()
            .context("replay source used before start()")?;
        self.reap_finished();
        let path = self.series_path(&request.key);
        let request = request.clone();
        let live_bars = self.live_bars;

        let handle = std::thread::Builder::new()
            .name(format!("replay-{id}"))
            .spawn(move || replay_series(&sink, id, &request, &path, live_bars))
            .context("failed to spawn replay thread")?;
        self.workers.push(handle);
        Ok(())
    }

    fn close(&mut self) {
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("replay thread panicked");
            }
        }
        self.sink = None;
        info!("replay source closed");
    }
}

fn replay_series(
    sink: &SourceSink,
    id: RequestId,
    request: &SeriesRequest,
    path: &Path,
    live_bars: usize,
) {
    if !path.exists() {
        sink.on_error(
            Some(id),
            NO_DATA_CODE,
            format!("No data for {} ({} not found)", request.key, path.display()),
        );
        return;
    }

    let bars = match read_window(path, request) {
        Ok(bars) => bars,
        Err(e) => {
            sink.on_error(Some(id), NO_DATA_CODE, format!("{e:#}"));
            return;
        }
    };

    let split = bars.len().saturating_sub(live_bars);
    info!(
        symbol = %request.key,
        id = %id,
        bars = bars.len(),
        live = bars.len() - split,
        "replaying series"
    );

    let mut bars = bars.into_iter();
    for bar in bars.by_ref().take(split) {
        sink.on_bar(id, bar);
    }
    sink.on_series_complete(id);
    for bar in bars {
        sink.on_bar_update(id, bar);
    }
}

/// Rows of `path` inside `(as_of - lookback, as_of]`.  Without an explicit
/// `as_of` the window ends at the newest row.
fn read_window(path: &Path, request: &SeriesRequest) -> Result<Vec<RawBar>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut rows: Vec<(NaiveDateTime, RawBar)> = Vec::new();
    for (line, record) in reader.deserialize::<RawBar>().enumerate() {
        match record {
            Ok(raw) => match parse_bar_time(&raw.date) {
                Some(time) => rows.push((time, raw)),
                None => warn!(file = %path.display(), line = line + 2, date = %raw.date, "unparseable bar date, row skipped"),
            },
            Err(e) => warn!(file = %path.display(), line = line + 2, error = %e, "malformed CSV row skipped"),
        }
    }

    let Some(as_of) = request.as_of.or_else(|| rows.iter().map(|(t, _)| *t).max()) else {
        return Ok(Vec::new());
    };
    let start = request.lookback.start_from(as_of);

    Ok(rows
        .into_iter()
        .filter(|(t, _)| *t <= as_of && start.map_or(true, |s| *t > s))
        .map(|(_, raw)| raw)
        .collect())
}
