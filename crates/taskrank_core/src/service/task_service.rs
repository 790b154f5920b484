//! Task use-case service.
//!
//! # Responsibility
//! - Provide the create/read/update/complete/delete/move entry points used by
//!   front ends.
//! - Route every rank-affecting call through `RankMaintainer`.
//!
//! # Invariants
//! - Service APIs never write ranks directly.
//! - Detail updates (`TaskPatch`) never change rank, group or completion.

use crate::compare::placement::{PlacementError, PlacementProgress, PlacementSession};
use crate::model::task::{GroupKey, NewTask, Task, TaskId, TaskPatch, TaskValidationError};
use crate::rank::maintainer::{InsertOutcome, RankError, RankMaintainer};
use crate::repo::rank_store::{RankStore, StoreError};
use log::info;
use thiserror::Error;

/// Errors from task service operations.
#[derive(Debug, Error)]
pub enum TaskServiceError {
    #[error(transparent)]
    Validation(#[from] TaskValidationError),
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
    /// Patch with no field set.
    #[error("nothing to update for task {0}")]
    EmptyPatch(TaskId),
    #[error(transparent)]
    Rank(RankError),
    #[error(transparent)]
    Placement(PlacementError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<RankError> for TaskServiceError {
    fn from(value: RankError) -> Self {
        match value {
            RankError::NotFound(id) => Self::TaskNotFound(id),
            RankError::Validation(err) => Self::Validation(err),
            RankError::Store(err) => Self::Store(err),
            other => Self::Rank(other),
        }
    }
}

impl From<PlacementError> for TaskServiceError {
    fn from(value: PlacementError) -> Self {
        match value {
            PlacementError::Rank(err) => err.into(),
            other => Self::Placement(other),
        }
    }
}

pub type TaskServiceResult<T> = Result<T, TaskServiceError>;

/// Task service facade.
pub struct TaskService<S: RankStore> {
    maintainer: RankMaintainer<S>,
}

impl<S: RankStore> TaskService<S> {
    pub fn new(store: S) -> Self {
        Self {
            maintainer: RankMaintainer::new(store),
        }
    }

    pub fn maintainer(&self) -> &RankMaintainer<S> {
        &self.maintainer
    }

    /// Creates a task at `rank`, or at the end of its group when `None`.
    pub fn create_task(&self, draft: NewTask, rank: Option<i64>) -> TaskServiceResult<InsertOutcome> {
        Ok(self.maintainer.insert_at(draft, rank)?)
    }

    pub fn get_task(&self, id: TaskId) -> TaskServiceResult<Task> {
        self.maintainer
            .store()
            .get_task(id)?
            .ok_or(TaskServiceError::TaskNotFound(id))
    }

    /// Active tasks of `group`, highest priority first.
    pub fn list_active(&self, group: GroupKey) -> TaskServiceResult<Vec<Task>> {
        Ok(self.maintainer.within(group)?)
    }

    /// Active tasks followed by completed ones.
    pub fn list_all(&self, group: GroupKey) -> TaskServiceResult<Vec<Task>> {
        Ok(self.maintainer.store().list_group(group, true)?)
    }

    /// Applies the set fields of `patch` to the task's inert attributes.
    pub fn update_details(&self, id: TaskId, patch: &TaskPatch) -> TaskServiceResult<Task> {
        if patch.is_empty() {
            return Err(TaskServiceError::EmptyPatch(id));
        }

        let task: TaskServiceResult<Task> = self.maintainer.store().run_atomic(|tx| {
            let mut task = tx.get_task(id)?.ok_or(TaskServiceError::TaskNotFound(id))?;
            task.apply_patch(patch);
            task.validate()?;
            tx.update_task(&task)?;
            Ok(task)
        });
        let task = task?;
        info!("event=task_update module=service status=ok task_id={id}");
        Ok(task)
    }

    /// Returns `false` when the task was already completed.
    pub fn complete_task(&self, id: TaskId) -> TaskServiceResult<bool> {
        Ok(self.maintainer.complete(id)?)
    }

    pub fn reopen_task(&self, id: TaskId, rank: Option<i64>) -> TaskServiceResult<InsertOutcome> {
        Ok(self.maintainer.reopen(id, rank)?)
    }

    /// Returns `false` when no task has `id`.
    pub fn delete_task(&self, id: TaskId) -> TaskServiceResult<bool> {
        Ok(self.maintainer.delete_by_id(id)?)
    }

    /// Returns the number of siblings that shifted.
    pub fn move_task(&self, id: TaskId, rank: i64) -> TaskServiceResult<usize> {
        Ok(self.maintainer.move_to(id, rank)?)
    }

    pub fn compact_group(&self, group: GroupKey) -> TaskServiceResult<usize> {
        Ok(self.maintainer.compact_group(group)?)
    }

    /// Starts guided placement of `draft` by pairwise comparison.
    pub fn begin_placement(
        &self,
        draft: NewTask,
    ) -> TaskServiceResult<(PlacementSession<'_, S>, PlacementProgress)> {
        Ok(PlacementSession::begin(&self.maintainer, draft)?)
    }
}
