//! Task domain model.
//!
//! # Responsibility
//! - Define the persisted task record and the caller-facing draft/patch shapes.
//! - Validate user-provided fields before they reach a store.
//!
//! # Invariants
//! - `id` is stable and never reused for another task.
//! - `rank` is non-negative; `0` is the highest priority.
//! - `completed_at` is set iff `completed` is true.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

/// Stable identifier of a task.
pub type TaskId = Uuid;

/// Scope of one rank sequence. `None` is the top-level list, `Some(parent)`
/// holds the subtasks of `parent`.
pub type GroupKey = Option<TaskId>;

/// Validation failures for task fields.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskValidationError {
    #[error("task title must not be blank")]
    BlankTitle,
    #[error("task rank must be non-negative, got {0}")]
    NegativeRank(i64),
    #[error("task cannot be its own parent: {0}")]
    SelfParent(TaskId),
    #[error("completed_at must be set iff the task is completed")]
    CompletionMismatch,
}

/// Persisted task record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: Option<String>,
    /// Unix epoch milliseconds.
    pub deadline: Option<i64>,
    /// Parent task id; tasks sharing a group key share one rank sequence.
    pub group_key: GroupKey,
    pub rank: i64,
    pub completed: bool,
    pub completed_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Task {
    /// Materializes a draft at `rank` with a generated id.
    pub fn from_draft(draft: NewTask, rank: i64) -> Self {
        let now = now_epoch_ms();
        Self {
            id: Uuid::new_v4(),
            title: draft.title.trim().to_string(),
            description: draft.description,
            deadline: draft.deadline,
            group_key: draft.group_key,
            rank,
            completed: false,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the task takes part in its group's dense rank sequence.
    pub fn is_active(&self) -> bool {
        !self.completed
    }

    pub fn validate(&self) -> Result<(), TaskValidationError> {
        if self.title.trim().is_empty() {
            return Err(TaskValidationError::BlankTitle);
        }
        if self.rank < 0 {
            return Err(TaskValidationError::NegativeRank(self.rank));
        }
        if self.group_key == Some(self.id) {
            return Err(TaskValidationError::SelfParent(self.id));
        }
        if self.completed != self.completed_at.is_some() {
            return Err(TaskValidationError::CompletionMismatch);
        }
        Ok(())
    }

    /// Applies only the fields set on `patch`.
    pub fn apply_patch(&mut self, patch: &TaskPatch) {
        if let Some(title) = &patch.title {
            self.title = title.trim().to_string();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(deadline) = patch.deadline {
            self.deadline = deadline;
        }
        self.updated_at = now_epoch_ms();
    }
}

/// Caller-supplied fields for a task that does not exist yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub deadline: Option<i64>,
    pub group_key: GroupKey,
}

impl NewTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Places the draft under `parent`.
    pub fn under(mut self, parent: TaskId) -> Self {
        self.group_key = Some(parent);
        self
    }

    pub fn validate(&self) -> Result<(), TaskValidationError> {
        if self.title.trim().is_empty() {
            return Err(TaskValidationError::BlankTitle);
        }
        Ok(())
    }
}

/// Partial update of the inert task attributes.
///
/// An outer `None` leaves the field untouched; `Some(None)` clears an
/// optional field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub deadline: Option<Option<i64>>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.deadline.is_none()
    }
}

/// Current time as Unix epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}
