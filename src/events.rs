//! Typed session events and the observer trait that receives them.
//!
//! The engine never renders anything. Every user-visible outcome (files
//! added, a validation warning, upload progress, a failed upload, a finished
//! conversion) is emitted as a [`SessionEvent`] to the
//! [`SessionObserver`] configured in [`crate::config::ClientConfig`]. The
//! presentation layer decides how to show it: a terminal progress bar, a log
//! line, a desktop notification.
//!
//! [`SessionEvent::notice`] gives the default mapping onto a transient,
//! dismissible [`Notice`] with a severity, for presentation layers that only
//! want "show a message of this colour".
//!
//! # Example
//!
//! ```rust
//! use fileconv_client::{SessionEvent, SessionObserver};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct WarningCounter(AtomicUsize);
//!
//! impl SessionObserver for WarningCounter {
//!     fn on_event(&self, event: &SessionEvent) {
//!         if matches!(event, SessionEvent::ValidationFailed(_)) {
//!             self.0.fetch_add(1, Ordering::SeqCst);
//!         }
//!     }
//! }
//! ```

use crate::error::FailureKind;
use crate::output::ArtifactSummary;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Something the user should hear about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionEvent {
    /// `n` files were appended to the session.
    FilesAdded(usize),
    FileRemoved { name: String },
    FilesReordered { from: usize, to: usize },
    /// Rotation or flip of the file at `index` changed.
    TransformChanged { index: usize },
    /// Input rejected before any network call; state unchanged.
    ValidationFailed(String),
    UploadStarted { files: usize, bytes: u64 },
    /// New overall percentage. Emitted only when the value moves forward.
    UploadProgress(u8),
    UploadFailed { kind: FailureKind, message: String },
    UploadSucceeded(ArtifactSummary),
    /// An artifact was written out.
    ArtifactDelivered { name: String, path: PathBuf },
    SessionReset,
}

/// Severity of a [`Notice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A transient user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl SessionEvent {
    /// Default notification for this event, if it deserves one.
    ///
    /// Progress ticks and upload starts are not notifications; they drive a
    /// progress indicator instead.
    pub fn notice(&self) -> Option<Notice> {
        let (level, message) = match self {
            SessionEvent::FilesAdded(n) => (NoticeLevel::Info, format!("{n} file(s) added")),
            SessionEvent::FileRemoved { name } => {
                (NoticeLevel::Info, format!("{name} removed"))
            }
            SessionEvent::ValidationFailed(reason) => (NoticeLevel::Warning, reason.clone()),
            SessionEvent::UploadFailed { kind, message } => {
                (NoticeLevel::Error, format!("{kind} error: {message}"))
            }
            SessionEvent::UploadSucceeded(summary) => {
                (NoticeLevel::Success, format!("Done: {summary}"))
            }
            SessionEvent::ArtifactDelivered { name, .. } => {
                (NoticeLevel::Success, format!("{name} downloaded"))
            }
            SessionEvent::SessionReset => (NoticeLevel::Warning, "All files cleared".to_string()),
            SessionEvent::FilesReordered { .. }
            | SessionEvent::TransformChanged { .. }
            | SessionEvent::UploadStarted { .. }
            | SessionEvent::UploadProgress(_) => return None,
        };
        Some(Notice { level, message })
    }
}

/// Receives every [`SessionEvent`] a session emits.
///
/// Implementations must be `Send + Sync`: upload progress is reported from
/// inside the request body stream, which may be polled on any runtime
/// worker thread. Events for one session arrive in order.
pub trait SessionObserver: Send + Sync {
    fn on_event(&self, event: &SessionEvent) {
        let _ = event;
    }
}

/// Discards every event. The default when no observer is configured.
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}

/// Shared observer handle, as stored in [`crate::config::ClientConfig`].
pub type Observer = Arc<dyn SessionObserver>;

/// Records every event; handy in tests and for replaying a session log.
#[derive(Default)]
pub struct RecordingObserver {
    events: std::sync::Mutex<Vec<SessionEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.events
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }

    /// Only the progress values, in arrival order.
    pub fn progress_values(&self) -> Vec<u8> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::UploadProgress(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&SessionEvent) -> bool) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }
}

impl SessionObserver for RecordingObserver {
    fn on_event(&self, event: &SessionEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_observer_does_not_panic() {
        let obs = NoopObserver;
        obs.on_event(&SessionEvent::FilesAdded(3));
        obs.on_event(&SessionEvent::UploadProgress(50));
        obs.on_event(&SessionEvent::SessionReset);
    }

    #[test]
    fn recording_observer_keeps_order() {
        let rec = RecordingObserver::new();
        rec.on_event(&SessionEvent::UploadProgress(10));
        rec.on_event(&SessionEvent::FilesAdded(1));
        rec.on_event(&SessionEvent::UploadProgress(60));
        assert_eq!(rec.progress_values(), vec![10, 60]);
        assert_eq!(rec.count(|e| matches!(e, SessionEvent::FilesAdded(_))), 1);
    }

    #[test]
    fn arc_dyn_observer_works() {
        let obs: Observer = Arc::new(NoopObserver);
        obs.on_event(&SessionEvent::FilesAdded(10));
    }

    #[test]
    fn notice_levels() {
        let warn = SessionEvent::ValidationFailed("No files selected".into())
            .notice()
            .unwrap();
        assert_eq!(warn.level, NoticeLevel::Warning);

        let err = SessionEvent::UploadFailed {
            kind: FailureKind::Server,
            message: "HTTP 500".into(),
        }
        .notice()
        .unwrap();
        assert_eq!(err.level, NoticeLevel::Error);
        assert!(err.message.contains("server"));

        assert!(SessionEvent::UploadProgress(40).notice().is_none());
    }
}
