//! Transactional store contract consumed by the rank maintainer.
//!
//! # Responsibility
//! - Describe the unit-of-work API (`RankTx`) and its all-or-nothing runner
//!   (`RankStore::run_atomic`).
//! - Keep storage errors separate from ranking errors.
//!
//! # Invariants
//! - `within` returns active tasks of exactly one group ordered by
//!   `rank ASC, created_at ASC, id ASC`.
//! - When the work passed to `run_atomic` returns `Err`, nothing it wrote is
//!   observable afterwards.
//! - `run_atomic` may invoke the work more than once when the backend retries
//!   a contended transaction; only the last invocation's writes persist.

use crate::db::DbError;
use crate::model::task::{GroupKey, Task, TaskId, TaskValidationError};
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Storage-level failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite/bootstrap error.
    #[error(transparent)]
    Db(#[from] DbError),
    /// The atomic unit could not be started or committed. Safe to retry.
    #[error("storage transaction aborted after {attempts} attempt(s): {reason}")]
    Transaction { attempts: u32, reason: String },
    /// A write referenced a task that does not exist.
    #[error("task row missing during write: {0}")]
    MissingTask(TaskId),
    /// An insert named a parent that does not exist.
    #[error("parent task missing during write: {0}")]
    MissingParent(TaskId),
    /// An insert reused an existing id.
    #[error("task already exists: {0}")]
    DuplicateId(TaskId),
    #[error(transparent)]
    Validation(#[from] TaskValidationError),
    /// Connection schema is not at the expected migrated version.
    #[error("task store requires schema version {expected_version}, got {actual_version}")]
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    #[error("task store requires table `{0}`")]
    MissingRequiredTable(&'static str),
    #[error("task store requires column `{column}` in table `{table}`")]
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted data cannot be converted to a valid task.
    #[error("invalid persisted task data: {0}")]
    InvalidData(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Operations available inside one atomic unit of work.
pub trait RankTx {
    /// Lists tasks of one group: active tasks by rank, then (optionally)
    /// completed tasks by their frozen rank.
    fn list_group(&self, group: GroupKey, include_completed: bool) -> StoreResult<Vec<Task>>;
    /// Loads one task, completed or not.
    fn get_task(&self, id: TaskId) -> StoreResult<Option<Task>>;
    /// Persists a new task row.
    fn insert_task(&mut self, task: &Task) -> StoreResult<()>;
    /// Replaces the stored fields of an existing task.
    fn update_task(&mut self, task: &Task) -> StoreResult<()>;
    /// Removes a task and its subtasks. Returns `false` when absent.
    fn delete_task(&mut self, id: TaskId) -> StoreResult<bool>;
    /// Applies `(id, new_rank)` pairs as one logical step.
    fn bulk_reassign_ranks(&mut self, updates: &[(TaskId, i64)]) -> StoreResult<()>;

    /// Active tasks of `group`, highest priority first.
    fn within(&self, group: GroupKey) -> StoreResult<Vec<Task>> {
        self.list_group(group, false)
    }
}

/// Persistence backend able to run units of work atomically.
pub trait RankStore {
    /// Runs `work` inside one all-or-nothing transaction.
    ///
    /// Commits when `work` returns `Ok`, rolls back when it returns `Err`.
    fn run_atomic<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnMut(&mut dyn RankTx) -> Result<T, E>,
        E: From<StoreError>;

    fn within(&self, group: GroupKey) -> StoreResult<Vec<Task>> {
        self.run_atomic(|tx| tx.within(group))
    }

    fn list_group(&self, group: GroupKey, include_completed: bool) -> StoreResult<Vec<Task>> {
        self.run_atomic(|tx| tx.list_group(group, include_completed))
    }

    fn get_task(&self, id: TaskId) -> StoreResult<Option<Task>> {
        self.run_atomic(|tx| tx.get_task(id))
    }
}

impl<S: RankStore> RankStore for &S {
    fn run_atomic<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnMut(&mut dyn RankTx) -> Result<T, E>,
        E: From<StoreError>,
    {
        (**self).run_atomic(work)
    }
}

/// Ordering used for every rank sequence: rank, then creation time, then id.
pub fn sort_group(tasks: &mut [Task]) {
    tasks.sort_by(|left, right| {
        left.completed
            .cmp(&right.completed)
            .then(left.rank.cmp(&right.rank))
            .then(left.created_at.cmp(&right.created_at))
            .then(left.id.cmp(&right.id))
    });
}
