// =============================================================================
// Session — consumer side of the notification queue
// =============================================================================
//
// Owns what the user is looking at: the current series key, the latest
// indicator frame and the setup recorder.  A single task drains the
// notification queue and dispatches every event through one `match`.
//
// Thread safety:
//   - parking_lot::RwLock for the current key, frame handle and message log.
//   - parking_lot::Mutex around the recorder (append + file rewrite).
//   - Readers get an `Arc<IndicatorFrame>`; frames are never mutated.
// =============================================================================

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::SetupError;
use crate::indicators::{assemble_frame, IndicatorFrame, IndicatorParams};
use crate::notification::{NotificationEvent, NotificationReceiver};
use crate::reconcile::{ReconcilerInput, ReconcilerSender};
use crate::setup::{SetupContext, SetupRecord, SetupRecorder};
use crate::source::SeriesRequest;
use crate::types::{Bar, SeriesKey};

/// Maximum number of user-visible messages retained.
const MAX_RECENT_MESSAGES: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Info,
    Warning,
    Error,
}

/// A message shown to the user.
#[derive(Debug, Clone, Serialize)]
pub struct MessageRecord {
    pub level: MessageLevel,
    pub code: Option<i32>,
    pub text: String,
    /// ISO 8601 timestamp.
    pub at: String,
}

pub struct Session {
    current: RwLock<SeriesKey>,
    params: IndicatorParams,
    frame: RwLock<Option<Arc<IndicatorFrame>>>,
    frame_version: AtomicU64,
    frame_tx: watch::Sender<u64>,
    recorder: Mutex<SetupRecorder>,
    requests: ReconcilerSender,
    messages: RwLock<VecDeque<MessageRecord>>,
}

impl Session {
    pub fn new(
        current: SeriesKey,
        params: IndicatorParams,
        recorder: SetupRecorder,
        requests: ReconcilerSender,
    ) -> Self {
        let (frame_tx, _) = watch::channel(0);
        Self {
            current: RwLock::new(current),
            params,
            frame: RwLock::new(None),
            frame_version: AtomicU64::new(0),
            frame_tx,
            recorder: Mutex::new(recorder),
            requests,
            messages: RwLock::new(VecDeque::with_capacity(MAX_RECENT_MESSAGES)),
        }
    }

    // ── Write paths ─────────────────────────────────────────────────────

    /// Make `request.key` the displayed series and ask the reconciler for it.
    pub fn request_series(&self, request: SeriesRequest) -> Result<()> {
        {
            let mut current = self.current.write();
            if *current != request.key {
                info!(from = %*current, to = %request.key, "switching series");
                *current = request.key.clone();
                *self.frame.write() = None;
            }
        }
        self.requests
            .send(ReconcilerInput::Request(request))
            .context("reconciler is not running")
    }

    /// Record a setup at `timestamp` against the latest frame.
    pub fn record_setup(
        &self,
        timestamp: NaiveDateTime,
        context: &SetupContext,
    ) -> Result<SetupRecord, SetupError> {
        let frame = self.latest_frame().ok_or(SetupError::EmptyFrame)?;
        let result = self.recorder.lock().record(&frame, timestamp, context);
        if let Err(e) = &result {
            self.push_message(MessageLevel::Error, None, e.to_string());
        }
        result
    }

    // ── Read paths ──────────────────────────────────────────────────────

    pub fn current_key(&self) -> SeriesKey {
        self.current.read().clone()
    }

    /// Shared read-only handle to the most recent frame.
    pub fn latest_frame(&self) -> Option<Arc<IndicatorFrame>> {
        self.frame.read().clone()
    }

    pub fn frame_version(&self) -> u64 {
        self.frame_version.load(Ordering::SeqCst)
    }

    /// Receiver that changes every time a new frame is published.
    pub fn subscribe_frames(&self) -> watch::Receiver<u64> {
        self.frame_tx.subscribe()
    }

    pub fn messages(&self) -> Vec<MessageRecord> {
        self.messages.read().iter().cloned().collect()
    }

    /// Copy of every recorded setup.
    pub fn setups(&self) -> Vec<SetupRecord> {
        self.recorder.lock().store().records().to_vec()
    }

    // ── Event handling ──────────────────────────────────────────────────

    pub fn handle(&self, event: NotificationEvent) {
        match event {
            NotificationEvent::Info { message } => {
                info!("{message}");
                self.push_message(MessageLevel::Info, None, message);
            }
            NotificationEvent::Warning { message } => {
                warn!("{message}");
                self.push_message(MessageLevel::Warning, None, message);
            }
            NotificationEvent::Error { code, message } => {
                let text = NotificationEvent::Error { code, message }.to_string();
                error!(code = ?code, "{text}");
                self.push_message(MessageLevel::Error, code, text);
            }
            NotificationEvent::SeriesUpdated { key, bars } => {
                if key != *self.current.read() {
                    debug!(symbol = %key, "update for a series not on display, ignored");
                    return;
                }
                self.update_frame(&key, &bars);
            }
        }
    }

    /// Drain `events` until the queue closes or shutdown is signalled.
    pub async fn run(
        self: Arc<Self>,
        mut events: NotificationReceiver,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(symbol = %self.current_key(), "session started");
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle(event),
                    None => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("session stopped");
    }

    // ── Internals ───────────────────────────────────────────────────────

    fn update_frame(&self, key: &SeriesKey, bars: &[Bar]) {
        let frame = assemble_frame(bars, &self.params);
        info!(
            symbol = %key,
            bars = bars.len(),
            rows = frame.len(),
            levels = ?frame.levels(),
            "indicator frame updated"
        );

        if !frame.missing_columns().is_empty() {
            let names: Vec<&str> = frame.missing_columns().iter().map(|c| c.name()).collect();
            self.push_message(
                MessageLevel::Warning,
                None,
                format!("{key}: indicators unavailable: {}", names.join(", ")),
            );
        }

        *self.frame.write() = Some(Arc::new(frame));
        let version = self.frame_version.fetch_add(1, Ordering::SeqCst) + 1;
        self.frame_tx.send_replace(version);
    }

    fn push_message(&self, level: MessageLevel, code: Option<i32>, text: String) {
        let mut messages = self.messages.write();
        messages.push_back(MessageRecord {
            level,
            code,
            text,
            at: Utc::now().to_rfc3339(),
        });
        while messages.len() > MAX_RECENT_MESSAGES {
            messages.pop_front();
        }
    }
}
