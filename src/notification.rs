// =============================================================================
// Notification queue between the reconciler and the consumer
// =============================================================================

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::types::{Bar, SeriesKey};

/// Everything the consumer can be told about.  Handled by a single `match`.
#[derive(Debug, Clone)]
pub enum NotificationEvent {
    Info {
        message: String,
    },
    Warning {
        message: String,
    },
    /// Source or request failure the user should see.  `code` is the
    /// source's numeric error code when it supplied one.
    Error {
        code: Option<i32>,
        message: String,
    },
    /// A full snapshot of a series after it changed.
    SeriesUpdated {
        key: SeriesKey,
        bars: Arc<Vec<Bar>>,
    },
}

impl NotificationEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self::Info {
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::Warning {
            message: message.into(),
        }
    }

    pub fn error(code: Option<i32>, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for NotificationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info { message } | Self::Warning { message } => f.write_str(message),
            Self::Error {
                code: Some(code),
                message,
            } => write!(f, "{message} - ({code})"),
            Self::Error { code: None, message } => f.write_str(message),
            Self::SeriesUpdated { key, bars } => write!(f, "{key}: {} bars", bars.len()),
        }
    }
}

pub type NotificationSender = mpsc::UnboundedSender<NotificationEvent>;
pub type NotificationReceiver = mpsc::UnboundedReceiver<NotificationEvent>;

/// Create the queue the reconciler publishes on.
pub fn notification_channel() -> (NotificationSender, NotificationReceiver) {
    mpsc::unbounded_channel()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Timeframe;

    #[test]
    fn error_text_carries_code() {
        let event = NotificationEvent::error(Some(162), "no data");
        assert_eq!(event.to_string(), "no data - (162)");
        assert_eq!(NotificationEvent::error(None, "boom").to_string(), "boom");
    }

    #[test]
    fn series_text_counts_bars() {
        let event = NotificationEvent::SeriesUpdated {
            key: SeriesKey::new("aapl", Timeframe::Mins5),
            bars: Arc::new(Vec::new()),
        };
        assert_eq!(event.to_string(), "AAPL@5 mins: 0 bars");
    }
}
