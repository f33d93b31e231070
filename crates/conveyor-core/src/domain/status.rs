//! Status tracking: lifecycle states and the per-task status record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TaskId;

/// Task lifecycle state.
///
/// Transitions are monotonic:
/// - Pending -> Processing -> Completed
/// - Pending -> Processing -> Failed
///
/// Completed and Failed are terminal and never revert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// The queryable view of one task's lifecycle.
///
/// Exactly one record exists per task: the submitter writes it once
/// (Pending), and afterwards only the worker holding the claim touches it.
/// Records expire a TTL window after their last write; an expired record is
/// indistinguishable from one that never existed. That expiry is the
/// documented contract, not data loss.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRecord {
    pub task_id: TaskId,
    pub status: TaskStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Processor execution time in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<f64>,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl StatusRecord {
    /// Fresh record for a just-submitted task.
    pub fn new(task_id: TaskId) -> Self {
        Self {
            task_id,
            status: TaskStatus::Pending,
            result: None,
            error: None,
            processing_time: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Apply an update in place. Terminal transitions stamp `completed_at`.
    pub fn apply(&mut self, update: StatusUpdate) {
        self.status = update.status;
        if let Some(result) = update.result {
            self.result = Some(result);
        }
        if let Some(error) = update.error {
            self.error = Some(error);
        }
        if let Some(seconds) = update.processing_time {
            self.processing_time = Some(seconds);
        }
        if update.status.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
    }
}

/// The write half of a status transition, as handed to the store.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub status: TaskStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub processing_time: Option<f64>,
}

impl StatusUpdate {
    pub fn pending() -> Self {
        Self {
            status: TaskStatus::Pending,
            result: None,
            error: None,
            processing_time: None,
        }
    }

    pub fn processing() -> Self {
        Self {
            status: TaskStatus::Processing,
            result: None,
            error: None,
            processing_time: None,
        }
    }

    pub fn completed(result: serde_json::Value, processing_time: f64) -> Self {
        Self {
            status: TaskStatus::Completed,
            result: Some(result),
            error: None,
            processing_time: Some(processing_time),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Failed,
            result: None,
            error: Some(error.into()),
            processing_time: None,
        }
    }

    /// Failure with the time already spent, e.g. a deadline overrun.
    pub fn failed_after(error: impl Into<String>, processing_time: f64) -> Self {
        Self {
            processing_time: Some(processing_time),
            ..Self::failed(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_and_processing_are_not_terminal() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Processing.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
    }

    #[test]
    fn statuses_serialize_lowercase() {
        let s = serde_json::to_string(&TaskStatus::Processing).unwrap();
        assert_eq!(s, "\"processing\"");
    }

    #[test]
    fn completion_stamps_result_and_time() {
        let mut record = StatusRecord::new(TaskId::generate());
        assert_eq!(record.status, TaskStatus::Pending);
        assert!(record.completed_at.is_none());

        record.apply(StatusUpdate::processing());
        assert_eq!(record.status, TaskStatus::Processing);
        assert!(record.completed_at.is_none());

        record.apply(StatusUpdate::completed(serde_json::json!({"ok": true}), 1.25));
        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(record.result, Some(serde_json::json!({"ok": true})));
        assert_eq!(record.processing_time, Some(1.25));
        assert!(record.completed_at.is_some());
    }

    #[test]
    fn failure_keeps_error_and_no_result() {
        let mut record = StatusRecord::new(TaskId::generate());
        record.apply(StatusUpdate::processing());
        record.apply(StatusUpdate::failed("boom"));

        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("boom"));
        assert!(record.result.is_none());
    }
}
