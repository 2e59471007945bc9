use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::types::Bar;

// ---------------------------------------------------------------------------
// Merge outcome
// ---------------------------------------------------------------------------

/// What happened to a bar offered to a [`BarBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeOutcome {
    /// The bar was newer than the tail and was pushed.
    Appended,
    /// The bar had the tail's time and overwrote it in place.
    Replaced,
    /// The bar was older than the tail and was dropped.
    Stale,
}

// ---------------------------------------------------------------------------
// BarBuffer -- ordered bar series for one request
// ---------------------------------------------------------------------------

/// Time-ordered bars of one series.  The tail bar is the one the source may
/// still be updating; an incoming bar with the same time replaces it, a newer
/// bar is appended and the oldest bars are trimmed to `max_bars`.
#[derive(Debug, Clone)]
pub struct BarBuffer {
    bars: VecDeque<Bar>,
    max_bars: usize,
}

impl BarBuffer {
    /// Create a buffer that retains at most `max_bars` bars.
    pub fn new(max_bars: usize) -> Self {
        Self {
            bars: VecDeque::new(),
            max_bars: max_bars.max(1),
        }
    }

    /// Merge `bar` into the series.
    ///
    /// * empty buffer or newer time => append, trim the oldest
    /// * same time as the tail      => replace the tail in place
    /// * older than the tail        => drop
    pub fn merge(&mut self, bar: Bar) -> MergeOutcome {
        let outcome = match self.bars.back() {
            Some(last) if bar.time == last.time => MergeOutcome::Replaced,
            Some(last) if bar.time < last.time => MergeOutcome::Stale,
            _ => MergeOutcome::Appended,
        };

        match outcome {
            MergeOutcome::Replaced => {
                if let Some(last) = self.bars.back_mut() {
                    *last = bar;
                }
            }
            MergeOutcome::Appended => {
                self.bars.push_back(bar);
                while self.bars.len() > self.max_bars {
                    self.bars.pop_front();
                }
            }
            MergeOutcome::Stale => {}
        }
        outcome
    }

    /// Copy of the series, oldest first.
    pub fn snapshot(&self) -> Vec<Bar> {
        self.bars.iter().copied().collect()
    }

    /// Most recent bar, if any.
    pub fn last(&self) -> Option<&Bar> {
        self.bars.back()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
