//! Session events fanned out to the front end.
//!
//! User-visible notices and assistive announcements share one bus so every
//! error path reaches both channels through [`EventBus::report`].

use shared::domain::{RecordId, ResultRecord, Theme};
use tokio::sync::broadcast;
use tracing::{info, warn};
use url::Url;

use crate::error::StagingError;

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub enum ClientEvent {
    PreviewReady {
        file_name: String,
        size_bytes: u64,
    },
    InputCleared,
    ReadinessChanged(bool),
    BusyChanged(bool),
    StepProgress {
        step: u8,
        total: u8,
        label: &'static str,
    },
    ResultReady(ResultRecord),
    Rendered {
        record_id: RecordId,
        staged_url: Url,
    },
    HistoryChanged {
        len: usize,
    },
    FeedbackCleared,
    ThemeChanged(Theme),
    Notice {
        severity: Severity,
        message: String,
    },
    Announcement(String),
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ClientEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: ClientEvent) {
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }

    pub fn notify(&self, severity: Severity, message: impl Into<String>) {
        let message = message.into();
        self.emit(ClientEvent::Notice {
            severity,
            message: message.clone(),
        });
        self.emit(ClientEvent::Announcement(message));
    }

    pub fn report(&self, err: &StagingError) {
        if err.is_validation() {
            info!(error = %err, "rejected user input");
        } else {
            warn!(error = %err, step = ?err.step(), "operation failed");
        }
        self.notify(Severity::Error, err.to_string());
    }

    /// Reports a failure that did not abort the surrounding operation.
    pub fn report_degraded(&self, err: &StagingError) {
        warn!(error = %err, "operation degraded");
        self.notify(Severity::Warning, err.to_string());
    }
}
