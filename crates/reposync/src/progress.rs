//! Progress reporting for scans and pushes.
//!
//! Operations report `(current, total, status)` through a [`ProgressReporter`].
//! Hosts can pass a closure, [`NoProgress`], or an [`OperationProgress`]
//! obtained from a [`SyncProgressBroadcaster`] to stream structured events.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Receives progress updates from a running operation.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, current: usize, total: usize, status: &str);
}

impl<F> ProgressReporter for F
where
    F: Fn(usize, usize, &str) + Send + Sync,
{
    fn report(&self, current: usize, total: usize, status: &str) {
        self(current, total, status)
    }
}

/// Discards all progress updates.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _current: usize, _total: usize, _status: &str) {}
}

/// Type of sync operation being performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOperationType {
    Scan,
    Push,
}

impl std::fmt::Display for SyncOperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncOperationType::Scan => write!(f, "scan"),
            SyncOperationType::Push => write!(f, "push"),
        }
    }
}

/// Phase of a sync operation, derived from its status text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    /// Reading local files.
    Reading,
    /// Resolving the branch head and base tree.
    Resolving,
    /// Uploading blobs.
    Uploading,
    /// Creating the new tree.
    CreatingTree,
    /// Creating the commit.
    Committing,
    /// Moving the branch reference.
    UpdatingRef,
    /// Operation completed successfully.
    Completed,
    /// Operation failed.
    Failed,
}

impl SyncPhase {
    /// Infers the phase from a push or scan status message.
    pub fn from_status(status: &str) -> Self {
        if status.starts_with("Reading") {
            SyncPhase::Reading
        } else if status.starts_with("Getting latest commit") {
            SyncPhase::Resolving
        } else if status.starts_with("Uploading") {
            SyncPhase::Uploading
        } else if status.starts_with("Creating tree") {
            SyncPhase::CreatingTree
        } else if status.starts_with("Creating commit") {
            SyncPhase::Committing
        } else if status.starts_with("Updating branch") {
            SyncPhase::UpdatingRef
        } else if status.starts_with("Done") {
            SyncPhase::Completed
        } else {
            SyncPhase::Uploading
        }
    }
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncPhase::Reading => write!(f, "Reading files..."),
            SyncPhase::Resolving => write!(f, "Getting latest commit..."),
            SyncPhase::Uploading => write!(f, "Uploading..."),
            SyncPhase::CreatingTree => write!(f, "Creating tree..."),
            SyncPhase::Committing => write!(f, "Creating commit..."),
            SyncPhase::UpdatingRef => write!(f, "Updating branch..."),
            SyncPhase::Completed => write!(f, "Completed"),
            SyncPhase::Failed => write!(f, "Failed"),
        }
    }
}

/// A progress event for one operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncProgressEvent {
    /// Unique identifier for this operation.
    pub operation_id: String,
    pub operation_type: SyncOperationType,
    pub phase: SyncPhase,
    /// Human-readable status message.
    pub message: String,
    pub current: usize,
    pub total: usize,
    /// Progress percentage (0-100), if determinable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    /// Error message if the operation failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl SyncProgressEvent {
    pub fn new(
        operation_id: &str,
        operation_type: SyncOperationType,
        current: usize,
        total: usize,
        message: &str,
    ) -> Self {
        let progress = if total > 0 {
            Some(((current * 100) / total).min(100) as u8)
        } else {
            None
        };

        Self {
            operation_id: operation_id.to_string(),
            operation_type,
            phase: SyncPhase::from_status(message),
            message: message.to_string(),
            current,
            total,
            progress,
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// Creates a failure event.
    pub fn failed(operation_id: &str, operation_type: SyncOperationType, error: &str) -> Self {
        let mut event = Self::new(operation_id, operation_type, 0, 0, "Operation failed");
        event.phase = SyncPhase::Failed;
        event.error = Some(error.to_string());
        event
    }
}

/// Tracks progress for a single operation and publishes it as events.
pub struct OperationProgress {
    operation_id: String,
    operation_type: SyncOperationType,
    sender: Arc<broadcast::Sender<SyncProgressEvent>>,
}

impl OperationProgress {
    pub fn new(
        operation_type: SyncOperationType,
        sender: Arc<broadcast::Sender<SyncProgressEvent>>,
    ) -> Self {
        Self {
            operation_id: Uuid::new_v4().to_string(),
            operation_type,
            sender,
        }
    }

    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    /// Broadcasts failure.
    pub fn failed(&self, error: &str) {
        let event = SyncProgressEvent::failed(&self.operation_id, self.operation_type, error);
        let _ = self.sender.send(event);
    }
}

impl ProgressReporter for OperationProgress {
    fn report(&self, current: usize, total: usize, status: &str) {
        let event = SyncProgressEvent::new(
            &self.operation_id,
            self.operation_type,
            current,
            total,
            status,
        );
        // No active receivers is fine
        let _ = self.sender.send(event);
    }
}

/// Broadcasts progress events for streaming to a UI.
#[derive(Clone)]
pub struct SyncProgressBroadcaster {
    sender: Arc<broadcast::Sender<SyncProgressEvent>>,
}

impl SyncProgressBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncProgressEvent> {
        self.sender.subscribe()
    }

    /// Creates a tracker for a new operation.
    pub fn start_operation(&self, operation_type: SyncOperationType) -> OperationProgress {
        OperationProgress::new(operation_type, Arc::clone(&self.sender))
    }
}

impl Default for SyncProgressBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_closure_reporter() {
        let seen = Mutex::new(Vec::new());
        let reporter = |current: usize, total: usize, status: &str| {
            seen.lock().unwrap().push((current, total, status.to_string()));
        };
        reporter.report(1, 2, "Uploading a.txt...");
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(1, 2, "Uploading a.txt...".to_string())]
        );
    }

    #[test]
    fn test_phase_from_status() {
        assert_eq!(
            SyncPhase::from_status("Getting latest commit..."),
            SyncPhase::Resolving
        );
        assert_eq!(
            SyncPhase::from_status("Uploading src/a.rs..."),
            SyncPhase::Uploading
        );
        assert_eq!(
            SyncPhase::from_status("Creating tree..."),
            SyncPhase::CreatingTree
        );
        assert_eq!(
            SyncPhase::from_status("Creating commit..."),
            SyncPhase::Committing
        );
        assert_eq!(
            SyncPhase::from_status("Updating branch..."),
            SyncPhase::UpdatingRef
        );
        assert_eq!(SyncPhase::from_status("Done!"), SyncPhase::Completed);
    }

    #[test]
    fn test_event_percentage() {
        let event = SyncProgressEvent::new("op", SyncOperationType::Push, 1, 4, "Uploading x...");
        assert_eq!(event.progress, Some(25));
        let event = SyncProgressEvent::new("op", SyncOperationType::Push, 0, 0, "Creating tree...");
        assert_eq!(event.progress, None);
    }

    #[test]
    fn test_broadcaster_send_receive() {
        let broadcaster = SyncProgressBroadcaster::new(10);
        let mut rx = broadcaster.subscribe();

        let progress = broadcaster.start_operation(SyncOperationType::Push);
        progress.report(2, 2, "Creating commit...");
        progress.failed("boom");

        let first = rx.try_recv().unwrap();
        assert_eq!(first.operation_id, progress.operation_id());
        assert_eq!(first.phase, SyncPhase::Committing);
        assert_eq!(first.progress, Some(100));

        let second = rx.try_recv().unwrap();
        assert_eq!(second.phase, SyncPhase::Failed);
        assert_eq!(second.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_operation_type_display() {
        assert_eq!(SyncOperationType::Push.to_string(), "push");
        assert_eq!(SyncPhase::CreatingTree.to_string(), "Creating tree...");
    }
}
