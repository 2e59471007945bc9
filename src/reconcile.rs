// =============================================================================
// Reconciliation Layer — merge source callbacks into ordered bar series
// =============================================================================
//
// A single task owns the request table, every bar buffer and the data
// source.  Producers only push `ReconcilerInput` values onto its queue; the
// reconciler answers with `NotificationEvent`s for the consumer.
//
// Per key: Unrequested -> Pending (request issued) -> Live (first bar seen).
//
// Merge rules:
//   historical bar  same time as tail => replace, older => drop, else append
//   live update     same time as tail => replace silently,
//                   newer             => append and publish the series
//   batch complete  publish the series once
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::market_data::{
    BarBuffer, MergeOutcome, RawBar, RequestId, RequestTrackingTable, SeriesState,
};
use crate::notification::{NotificationEvent, NotificationSender};
use crate::source::{DataSource, SeriesRequest, SourceEvent, SourceSink};
use crate::types::{Bar, SeriesKey};

/// Source codes that are informational and never reach the consumer.
pub const DEFAULT_BENIGN_CODES: [i32; 4] = [2104, 2106, 2158, 202];

/// Bars retained per series.
pub const DEFAULT_MAX_BARS: usize = 10_000;

/// Order-cancelled code; benign but logged with its own message.
const ORDER_CANCELLED: i32 = 202;

/// Everything the reconciler task consumes.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcilerInput {
    Request(SeriesRequest),
    Source(SourceEvent),
}

pub type ReconcilerSender = mpsc::UnboundedSender<ReconcilerInput>;
pub type ReconcilerReceiver = mpsc::UnboundedReceiver<ReconcilerInput>;

pub fn reconciler_channel() -> (ReconcilerSender, ReconcilerReceiver) {
    mpsc::unbounded_channel()
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

pub struct Reconciler {
    table: RequestTrackingTable,
    buffers: HashMap<RequestId, BarBuffer>,
    source: Box<dyn DataSource>,
    notify: NotificationSender,
    benign_codes: Vec<i32>,
    max_bars: usize,
}

impl Reconciler {
    pub fn new(source: Box<dyn DataSource>, notify: NotificationSender) -> Self {
        Self {
            table: RequestTrackingTable::new(),
            buffers: HashMap::new(),
            source,
            notify,
            benign_codes: DEFAULT_BENIGN_CODES.to_vec(),
            max_bars: DEFAULT_MAX_BARS,
        }
    }

    pub fn with_benign_codes(mut self, codes: Vec<i32>) -> Self {
        self.benign_codes = codes;
        self
    }

    pub fn with_max_bars(mut self, max_bars: usize) -> Self {
        self.max_bars = max_bars;
        self
    }

    /// Attach the source to `sink` so its callbacks reach this reconciler.
    pub fn start_source(&mut self, sink: SourceSink) -> anyhow::Result<()> {
        self.source.start(sink)
    }

    pub fn handle(&mut self, input: ReconcilerInput) {
        match input {
            ReconcilerInput::Request(request) => self.request(request),
            ReconcilerInput::Source(SourceEvent::Bar { id, bar }) => self.on_bar(id, bar),
            ReconcilerInput::Source(SourceEvent::BarUpdate { id, bar }) => {
                self.on_bar_update(id, bar)
            }
            ReconcilerInput::Source(SourceEvent::SeriesComplete { id }) => {
                self.on_series_complete(id)
            }
            ReconcilerInput::Source(SourceEvent::Error { id, code, message }) => {
                self.on_error(id, code, &message)
            }
        }
    }

    /// Request a series.  A known key with bars re-publishes them; a known
    /// key still waiting for its first bar is a duplicate and is ignored.
    pub fn request(&mut self, request: SeriesRequest) {
        let (id, fresh) = self.table.get_or_allocate(&request.key);

        if !fresh {
            match self.table.state(id) {
                Some(SeriesState::Live) => {
                    debug!(symbol = %request.key, id = %id, "series already loaded, re-publishing");
                    self.publish(id);
                }
                _ => debug!(symbol = %request.key, id = %id, "duplicate request while pending, ignored"),
            }
            return;
        }

        self.buffers.insert(id, BarBuffer::new(self.max_bars));
        info!(
            symbol = %request.key,
            id = %id,
            lookback = %request.lookback,
            "requesting series"
        );
        if let Err(e) = self.source.request_series(id, &request) {
            error!(symbol = %request.key, id = %id, error = %e, "series request failed");
            self.send(NotificationEvent::error(
                None,
                format!("Request for {} failed: {e:#}", request.key),
            ));
        }
    }

    /// Bar of the initial historical batch.
    pub fn on_bar(&mut self, id: RequestId, raw: RawBar) {
        let Some(bar) = self.accept(id, raw, "historical bar") else {
            return;
        };
        if let Some(MergeOutcome::Stale) = self.merge(id, bar) {
            warn!(id = %id, time = %bar.time, "historical bar older than series tail, dropped");
        }
    }

    /// Live bar: replaces the tail in place or extends the series and
    /// publishes it.
    pub fn on_bar_update(&mut self, id: RequestId, raw: RawBar) {
        let Some(bar) = self.accept(id, raw, "bar update") else {
            return;
        };
        match self.merge(id, bar) {
            Some(MergeOutcome::Appended) => self.publish(id),
            Some(MergeOutcome::Replaced) => {
                debug!(id = %id, time = %bar.time, close = bar.close, "tail bar updated")
            }
            Some(MergeOutcome::Stale) => {
                warn!(id = %id, time = %bar.time, "bar update older than series tail, dropped")
            }
            None => {}
        }
    }

    pub fn on_series_complete(&mut self, id: RequestId) {
        let Some(key) = self.table.key_of(id) else {
            warn!(id = %id, "series complete for unknown request id");
            return;
        };
        info!(
            symbol = %key,
            id = %id,
            bars = self.buffers.get(&id).map_or(0, BarBuffer::len),
            "historical batch complete"
        );
        self.publish(id);
    }

    /// Benign codes are logged only; everything else reaches the consumer as
    /// `"<message> - (<code>)"`.
    pub fn on_error(&mut self, id: Option<RequestId>, code: i32, message: &str) {
        if self.benign_codes.contains(&code) {
            if code == ORDER_CANCELLED {
                info!(code, "order successfully cancelled");
            } else if message.contains("is OK") {
                info!(code, "{message}");
            } else {
                error!(code, "{message}");
            }
            return;
        }

        let key = id.and_then(|id| self.table.key_of(id));
        error!(
            code,
            id = ?id.map(|i| i.0),
            symbol = ?key.map(ToString::to_string),
            "{message} - ({code})"
        );
        self.send(NotificationEvent::error(Some(code), message));
    }

    /// Read-only copy of the buffered series for `key`.
    pub fn snapshot(&self, key: &SeriesKey) -> Option<Vec<Bar>> {
        let id = self.table.id_of(key)?;
        self.buffers.get(&id).map(BarBuffer::snapshot)
    }

    pub fn close(&mut self) {
        self.source.close();
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    /// Validate the id and the bar; log and return `None` otherwise.
    fn accept(&self, id: RequestId, raw: RawBar, what: &str) -> Option<Bar> {
        if self.table.key_of(id).is_none() {
            warn!(id = %id, date = %raw.date, "{what} for unknown request id");
            return None;
        }
        match Bar::try_from(raw) {
            Ok(bar) => Some(bar),
            Err(e) => {
                warn!(id = %id, error = %e, "malformed {what} dropped");
                None
            }
        }
    }

    fn merge(&mut self, id: RequestId, bar: Bar) -> Option<MergeOutcome> {
        let outcome = self.buffers.get_mut(&id)?.merge(bar);
        self.table.mark_live(id);
        Some(outcome)
    }

    fn publish(&self, id: RequestId) {
        let (Some(key), Some(buffer)) = (self.table.key_of(id), self.buffers.get(&id)) else {
            return;
        };
        self.send(NotificationEvent::SeriesUpdated {
            key: key.clone(),
            bars: Arc::new(buffer.snapshot()),
        });
    }

    fn send(&self, event: NotificationEvent) {
        if self.notify.send(event).is_err() {
            debug!("notification queue closed, event dropped");
        }
    }
}

// ---------------------------------------------------------------------------
// Task driver
// ---------------------------------------------------------------------------

/// Drain `inputs` into `reconciler` until the queue closes or shutdown is
/// signalled, then close the source.
pub async fn run_reconciler(
    mut reconciler: Reconciler,
    mut inputs: ReconcilerReceiver,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("reconciler started");
    loop {
        tokio::select! {
            input = inputs.recv() => match input {
                Some(input) => reconciler.handle(input),
                None => break,
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    reconciler.close();
    info!("reconciler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use parking_lot::Mutex;

    use crate::notification::{notification_channel, NotificationReceiver};
    use crate::types::Timeframe;

    #[derive(Clone, Default)]
    struct RecordingSource {
        requests: Arc<Mutex<Vec<(RequestId, SeriesRequest)>>>,
        fail: bool,
    }

    impl DataSource for RecordingSource {
        fn start(&mut self, _sink: SourceSink) -> anyhow::Result<()> {
            Ok(())
        }

        fn request_series(&mut self, id: RequestId, request: &SeriesRequest) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("not connected");
            }
            self.requests.lock().push((id, request.clone()));
            Ok(())
        }

        fn close(&mut self) {}
    }

    fn setup() -> (Reconciler, RecordingSource, NotificationReceiver) {
        let source = RecordingSource::default();
        let (tx, rx) = notification_channel();
        (Reconciler::new(Box::new(source.clone()), tx), source, rx)
    }

    fn raw(minute: u32, close: f64) -> RawBar {
        RawBar {
            date: format!("2025-06-02 09:{minute:02}:00"),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 10.0,
        }
    }

    fn drain(rx: &mut NotificationReceiver) -> Vec<NotificationEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    fn request() -> SeriesRequest {
        SeriesRequest::new("aapl", Timeframe::Min1, None)
    }

    #[test]
    fn first_request_allocates_and_forwards() {
        let (mut rec, source, mut rx) = setup();
        rec.request(request());
        rec.request(request());
        let requests = source.requests.lock();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0, RequestId(1));
        assert_eq!(requests[0].1.key.symbol, "AAPL");
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn loaded_series_is_republished_on_request() {
        let (mut rec, _source, mut rx) = setup();
        rec.request(request());
        rec.on_bar(RequestId(1), raw(30, 100.0));
        rec.request(request());
        let events = drain(&mut rx);
        assert!(matches!(
            &events[..],
            [NotificationEvent::SeriesUpdated { bars, .. }] if bars.len() == 1
        ));
    }

    #[test]
    fn history_then_complete_publishes_once() {
        let (mut rec, _source, mut rx) = setup();
        rec.request(request());
        for m in 30..35 {
            rec.on_bar(RequestId(1), raw(m, 100.0 + m as f64));
        }
        assert!(drain(&mut rx).is_empty());
        rec.on_series_complete(RequestId(1));
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        match &events[0] {
            NotificationEvent::SeriesUpdated { key, bars } => {
                assert_eq!(key, &SeriesKey::new("AAPL", Timeframe::Min1));
                assert_eq!(bars.len(), 5);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn complete_publishes_even_after_live_appends() {
        let (mut rec, _source, mut rx) = setup();
        rec.request(request());
        for m in 30..33 {
            rec.on_bar(RequestId(1), raw(m, 100.0));
        }
        rec.on_bar_update(RequestId(1), raw(33, 101.0));
        rec.on_series_complete(RequestId(1));

        let sizes: Vec<usize> = drain(&mut rx)
            .iter()
            .map(|event| match event {
                NotificationEvent::SeriesUpdated { bars, .. } => bars.len(),
                other => panic!("unexpected event {other:?}"),
            })
            .collect();
        assert_eq!(sizes, vec![4, 4]);
    }

    #[test]
    fn pending_series_ignores_duplicates_until_first_bar() {
        let (mut rec, _source, mut rx) = setup();
        rec.request(request());
        assert_eq!(rec.table.state(RequestId(1)), Some(SeriesState::Pending));

        // A malformed bar does not make the series live.
        let mut bad = raw(30, 100.0);
        bad.high = 50.0;
        rec.on_bar(RequestId(1), bad);
        rec.request(request());
        assert_eq!(rec.table.state(RequestId(1)), Some(SeriesState::Pending));
        assert!(drain(&mut rx).is_empty());

        rec.on_bar(RequestId(1), raw(30, 100.0));
        assert_eq!(rec.table.state(RequestId(1)), Some(SeriesState::Live));
        rec.request(request());
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[test]
    fn update_with_same_time_replaces_without_publishing() {
        let (mut rec, _source, mut rx) = setup();
        rec.request(request());
        rec.on_bar(RequestId(1), raw(30, 100.0));
        rec.on_bar(RequestId(1), raw(31, 101.0));
        rec.on_series_complete(RequestId(1));
        drain(&mut rx);

        rec.on_bar_update(RequestId(1), raw(31, 101.7));
        assert!(drain(&mut rx).is_empty());

        let bars = rec.snapshot(&request().key).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[1].close, 101.7);
    }

    #[test]
    fn update_with_new_time_appends_and_publishes() {
        let (mut rec, _source, mut rx) = setup();
        rec.request(request());
        rec.on_bar(RequestId(1), raw(30, 100.0));
        rec.on_series_complete(RequestId(1));
        drain(&mut rx);

        rec.on_bar_update(RequestId(1), raw(31, 102.0));
        let events = drain(&mut rx);
        assert!(matches!(
            &events[..],
            [NotificationEvent::SeriesUpdated { bars, .. }] if bars.len() == 2 && bars[1].close == 102.0
        ));
    }

    #[test]
    fn update_into_empty_buffer_appends() {
        let (mut rec, _source, mut rx) = setup();
        rec.request(request());
        rec.on_bar_update(RequestId(1), raw(30, 100.0));
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[test]
    fn series_never_duplicates_or_reorders() {
        let (mut rec, _source, _rx) = setup();
        rec.request(request());
        for m in [30, 31, 31, 33, 32, 33] {
            rec.on_bar(RequestId(1), raw(m, 100.0 + m as f64));
        }
        for m in [33, 34, 34, 20, 35] {
            rec.on_bar_update(RequestId(1), raw(m, 100.0 + m as f64));
        }
        let bars = rec.snapshot(&request().key).unwrap();
        assert!(bars.windows(2).all(|w| w[0].time < w[1].time));
        let minutes: Vec<u32> = bars.iter().map(|b| b.time.minute()).collect();
        assert_eq!(minutes, vec![30, 31, 33, 34, 35]);
    }

    #[test]
    fn unknown_ids_and_malformed_bars_are_ignored() {
        let (mut rec, _source, mut rx) = setup();
        rec.request(request());
        rec.on_bar(RequestId(42), raw(30, 100.0));
        rec.on_bar_update(RequestId(42), raw(30, 100.0));
        rec.on_series_complete(RequestId(42));
        let mut bad = raw(31, 100.0);
        bad.high = 50.0;
        rec.on_bar(RequestId(1), bad);
        assert!(drain(&mut rx).is_empty());
        assert_eq!(rec.snapshot(&request().key).unwrap().len(), 0);
    }

    #[test]
    fn benign_codes_stay_in_the_log() {
        let (mut rec, _source, mut rx) = setup();
        rec.on_error(None, 2104, "Market data farm connection is OK:usfarm");
        rec.on_error(None, 2158, "Sec-def data farm connection is broken");
        rec.on_error(None, 202, "Order Canceled - reason:");
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn other_codes_reach_the_consumer() {
        let (mut rec, _source, mut rx) = setup();
        rec.request(request());
        rec.on_error(Some(RequestId(1)), 162, "Historical Market Data Service error message");
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].to_string(),
            "Historical Market Data Service error message - (162)"
        );
    }

    #[test]
    fn failed_request_notifies() {
        let source = RecordingSource {
            fail: true,
            ..RecordingSource::default()
        };
        let (tx, mut rx) = notification_channel();
        let mut rec = Reconciler::new(Box::new(source), tx);
        rec.request(request());
        assert!(matches!(
            &drain(&mut rx)[..],
            [NotificationEvent::Error { code: None, .. }]
        ));
    }

    #[tokio::test]
    async fn driver_processes_queue_until_closed() {
        let (rec, _source, mut rx) = setup();
        let (in_tx, in_rx) = reconciler_channel();
        let (_stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run_reconciler(rec, in_rx, stop_rx));

        in_tx.send(ReconcilerInput::Request(request())).unwrap();
        in_tx
            .send(ReconcilerInput::Source(SourceEvent::Bar {
                id: RequestId(1),
                bar: raw(30, 100.0),
            }))
            .unwrap();
        in_tx
            .send(ReconcilerInput::Source(SourceEvent::SeriesComplete { id: RequestId(1) }))
            .unwrap();
        drop(in_tx);
        task.await.unwrap();

        assert!(matches!(
            rx.recv().await,
            Some(NotificationEvent::SeriesUpdated { .. })
        ));
    }

    #[tokio::test]
    async fn driver_stops_on_shutdown() {
        let (rec, _source, _rx) = setup();
        let (_in_tx, in_rx) = reconciler_channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run_reconciler(rec, in_rx, stop_rx));
        stop_tx.send(true).unwrap();
        task.await.unwrap();
    }
}
