//! Insert/delete/move with rank shifting.
//!
//! # Responsibility
//! - Translate one ranking operation into a bounded set of rank updates.
//! - Validate caller input before any write in the unit happens.
//!
//! # Invariants
//! - Inserting at `r` moves every active sibling with `rank >= r` down by one.
//! - Deleting or completing a task at `r` moves every active sibling with
//!   `rank > r` up by one.
//! - Moving from `old` to `new` only touches siblings strictly between the
//!   two positions, plus the moved task itself.

use crate::model::task::{now_epoch_ms, GroupKey, NewTask, Task, TaskId, TaskValidationError};
use crate::repo::rank_store::{RankStore, RankTx, StoreError};
use log::{info, warn};
use thiserror::Error;

/// Ranking failures surfaced to callers.
#[derive(Debug, Error)]
pub enum RankError {
    /// Requested rank lies outside `[0, max]` for the group.
    #[error("rank {rank} is outside the valid range [0, {max}]")]
    InvalidRank { rank: i64, max: i64 },
    #[error("task not found: {0}")]
    NotFound(TaskId),
    #[error("parent task not found: {0}")]
    ParentNotFound(TaskId),
    /// Completed tasks have a frozen rank.
    #[error("task is completed, its rank is frozen: {0}")]
    TaskCompleted(TaskId),
    #[error("task is not completed: {0}")]
    TaskNotCompleted(TaskId),
    #[error(transparent)]
    Validation(#[from] TaskValidationError),
    /// The atomic unit failed; no change from it is visible.
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type RankResult<T> = Result<T, RankError>;

/// Contiguous rank interval moved by one shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftRange {
    pub old_start: i64,
    pub old_end: i64,
    pub new_start: i64,
    pub new_end: i64,
}

/// Result of an insertion: the stored task and what moved to make room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertOutcome {
    pub task: Task,
    pub shifted_count: usize,
    /// `None` when no sibling moved.
    pub shift_range: Option<ShiftRange>,
}

#[derive(Debug, Clone, Copy)]
struct RankShift {
    id: TaskId,
    old_rank: i64,
    new_rank: i64,
}

/// Applies rank-preserving mutations through a `RankStore`.
pub struct RankMaintainer<S: RankStore> {
    store: S,
}

impl<S: RankStore> RankMaintainer<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Active tasks of `group`, highest priority first.
    pub fn within(&self, group: GroupKey) -> RankResult<Vec<Task>> {
        Ok(self.store.within(group)?)
    }

    /// Inserts a new task at `target_rank` (end of the group when `None`).
    ///
    /// # Errors
    /// - `InvalidRank` when `target_rank` is outside `[0, n]`.
    /// - `ParentNotFound` when the draft's group key names a missing task.
    pub fn insert_at(&self, draft: NewTask, target_rank: Option<i64>) -> RankResult<InsertOutcome> {
        draft.validate()?;
        let group = draft.group_key;

        let result: RankResult<InsertOutcome> = self.store.run_atomic(|tx| {
            ensure_group_exists(tx, group)?;
            let active = tx.within(group)?;
            let count = active.len() as i64;
            let rank = target_rank.unwrap_or(count);
            if !(0..=count).contains(&rank) {
                return Err(RankError::InvalidRank { rank, max: count });
            }

            let shifts: Vec<RankShift> = active
                .iter()
                .filter(|task| task.rank >= rank)
                .map(|task| RankShift {
                    id: task.id,
                    old_rank: task.rank,
                    new_rank: task.rank + 1,
                })
                .collect();
            apply_shifts(tx, &shifts)?;

            let task = Task::from_draft(draft.clone(), rank);
            tx.insert_task(&task)?;
            Ok(InsertOutcome {
                task,
                shifted_count: shifts.len(),
                shift_range: shift_range(&shifts),
            })
        });

        match &result {
            Ok(outcome) => info!(
                "event=rank_insert module=rank status=ok task_id={} group={} rank={} shifted={}",
                outcome.task.id,
                group_label(group),
                outcome.task.rank,
                outcome.shifted_count
            ),
            Err(err) => log_failure("rank_insert", group_label(group), err),
        }
        result
    }

    /// Deletes a task and closes the gap it leaves.
    ///
    /// Returns `false` when no task has `id`. Subtasks are removed with it.
    pub fn delete_by_id(&self, id: TaskId) -> RankResult<bool> {
        let result: RankResult<Option<(GroupKey, usize)>> = self.store.run_atomic(|tx| {
            let Some(task) = tx.get_task(id)? else {
                return Ok(None);
            };
            tx.delete_task(id)?;

            let mut shifted = 0;
            if task.is_active() {
                let shifts = close_gap(tx, &task)?;
                apply_shifts(tx, &shifts)?;
                shifted = shifts.len();
            }
            Ok(Some((task.group_key, shifted)))
        });

        match result {
            Ok(Some((group, shifted))) => {
                info!(
                    "event=rank_delete module=rank status=ok task_id={id} group={} shifted={shifted}",
                    group_label(group)
                );
                Ok(true)
            }
            Ok(None) => {
                info!("event=rank_delete module=rank status=not_found task_id={id}");
                Ok(false)
            }
            Err(err) => {
                log_failure("rank_delete", id.to_string(), &err);
                Err(err)
            }
        }
    }

    /// Moves an active task to `new_rank` within its group.
    ///
    /// Returns the number of siblings that shifted.
    ///
    /// # Errors
    /// - `NotFound` when no task has `id`.
    /// - `TaskCompleted` when the task is completed.
    /// - `InvalidRank` when `new_rank` is outside `[0, n-1]`.
    pub fn move_to(&self, id: TaskId, new_rank: i64) -> RankResult<usize> {
        let result: RankResult<(GroupKey, usize)> = self.store.run_atomic(|tx| {
            let task = tx.get_task(id)?.ok_or(RankError::NotFound(id))?;
            if task.completed {
                return Err(RankError::TaskCompleted(id));
            }
            let active = tx.within(task.group_key)?;
            let max = active.len() as i64 - 1;
            if !(0..=max).contains(&new_rank) {
                return Err(RankError::InvalidRank {
                    rank: new_rank,
                    max,
                });
            }

            let old_rank = task.rank;
            if new_rank == old_rank {
                return Ok((task.group_key, 0));
            }

            let shifts: Vec<RankShift> = active
                .iter()
                .filter(|sibling| sibling.id != id)
                .filter_map(|sibling| {
                    let delta = if new_rank < old_rank
                        && (new_rank..old_rank).contains(&sibling.rank)
                    {
                        1
                    } else if new_rank > old_rank
                        && sibling.rank > old_rank
                        && sibling.rank <= new_rank
                    {
                        -1
                    } else {
                        return None;
                    };
                    Some(RankShift {
                        id: sibling.id,
                        old_rank: sibling.rank,
                        new_rank: sibling.rank + delta,
                    })
                })
                .collect();

            let mut updates: Vec<(TaskId, i64)> =
                shifts.iter().map(|shift| (shift.id, shift.new_rank)).collect();
            updates.push((id, new_rank));
            tx.bulk_reassign_ranks(&updates)?;
            Ok((task.group_key, shifts.len()))
        });

        match result {
            Ok((group, shifted)) => {
                info!(
                    "event=rank_move module=rank status=ok task_id={id} group={} new_rank={new_rank} shifted={shifted}",
                    group_label(group)
                );
                Ok(shifted)
            }
            Err(err) => {
                log_failure("rank_move", id.to_string(), &err);
                Err(err)
            }
        }
    }

    /// Marks a task completed and freezes its rank.
    ///
    /// Returns `false` when the task was already completed.
    pub fn complete(&self, id: TaskId) -> RankResult<bool> {
        let result: RankResult<Option<(GroupKey, usize)>> = self.store.run_atomic(|tx| {
            let mut task = tx.get_task(id)?.ok_or(RankError::NotFound(id))?;
            if task.completed {
                return Ok(None);
            }

            let shifts = close_gap(tx, &task)?;
            let now = now_epoch_ms();
            task.completed = true;
            task.completed_at = Some(now);
            task.updated_at = now;
            tx.update_task(&task)?;
            apply_shifts(tx, &shifts)?;
            Ok(Some((task.group_key, shifts.len())))
        });

        match result {
            Ok(Some((group, shifted))) => {
                info!(
                    "event=rank_complete module=rank status=ok task_id={id} group={} shifted={shifted}",
                    group_label(group)
                );
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(err) => {
                log_failure("rank_complete", id.to_string(), &err);
                Err(err)
            }
        }
    }

    /// Puts a completed task back into its group's active sequence at
    /// `target_rank` (end of the group when `None`).
    pub fn reopen(&self, id: TaskId, target_rank: Option<i64>) -> RankResult<InsertOutcome> {
        let result: RankResult<InsertOutcome> = self.store.run_atomic(|tx| {
            let mut task = tx.get_task(id)?.ok_or(RankError::NotFound(id))?;
            if !task.completed {
                return Err(RankError::TaskNotCompleted(id));
            }

            let active = tx.within(task.group_key)?;
            let count = active.len() as i64;
            let rank = target_rank.unwrap_or(count);
            if !(0..=count).contains(&rank) {
                return Err(RankError::InvalidRank { rank, max: count });
            }

            let shifts: Vec<RankShift> = active
                .iter()
                .filter(|sibling| sibling.rank >= rank)
                .map(|sibling| RankShift {
                    id: sibling.id,
                    old_rank: sibling.rank,
                    new_rank: sibling.rank + 1,
                })
                .collect();
            apply_shifts(tx, &shifts)?;

            task.completed = false;
            task.completed_at = None;
            task.rank = rank;
            task.updated_at = now_epoch_ms();
            tx.update_task(&task)?;
            Ok(InsertOutcome {
                task,
                shifted_count: shifts.len(),
                shift_range: shift_range(&shifts),
            })
        });

        match &result {
            Ok(outcome) => info!(
                "event=rank_reopen module=rank status=ok task_id={id} group={} rank={} shifted={}",
                group_label(outcome.task.group_key),
                outcome.task.rank,
                outcome.shifted_count
            ),
            Err(err) => log_failure("rank_reopen", id.to_string(), err),
        }
        result
    }

    /// Rewrites the active ranks of `group` to `0..n-1`, keeping the current
    /// order with `created_at` as the tiebreaker.
    ///
    /// Returns how many tasks changed rank.
    pub fn compact_group(&self, group: GroupKey) -> RankResult<usize> {
        let result: RankResult<usize> = self.store.run_atomic(|tx| {
            let updates: Vec<(TaskId, i64)> = tx
                .within(group)?
                .iter()
                .enumerate()
                .filter(|(index, task)| task.rank != *index as i64)
                .map(|(index, task)| (task.id, index as i64))
                .collect();
            tx.bulk_reassign_ranks(&updates)?;
            Ok(updates.len())
        });

        match &result {
            Ok(changed) if *changed > 0 => warn!(
                "event=rank_compact module=rank status=repaired group={} changed={changed}",
                group_label(group)
            ),
            Ok(_) => info!(
                "event=rank_compact module=rank status=ok group={} changed=0",
                group_label(group)
            ),
            Err(err) => log_failure("rank_compact", group_label(group), err),
        }
        result
    }
}

fn ensure_group_exists(tx: &mut dyn RankTx, group: GroupKey) -> RankResult<()> {
    if let Some(parent) = group {
        if tx.get_task(parent)?.is_none() {
            return Err(RankError::ParentNotFound(parent));
        }
    }
    Ok(())
}

/// Shifts for the active siblings ranked after `task`.
fn close_gap(tx: &mut dyn RankTx, task: &Task) -> RankResult<Vec<RankShift>> {
    Ok(tx
        .within(task.group_key)?
        .iter()
        .filter(|sibling| sibling.id != task.id && sibling.rank > task.rank)
        .map(|sibling| RankShift {
            id: sibling.id,
            old_rank: sibling.rank,
            new_rank: sibling.rank - 1,
        })
        .collect())
}

fn apply_shifts(tx: &mut dyn RankTx, shifts: &[RankShift]) -> RankResult<()> {
    let updates: Vec<(TaskId, i64)> = shifts
        .iter()
        .map(|shift| (shift.id, shift.new_rank))
        .collect();
    tx.bulk_reassign_ranks(&updates)?;
    Ok(())
}

fn shift_range(shifts: &[RankShift]) -> Option<ShiftRange> {
    let old_start = shifts.iter().map(|shift| shift.old_rank).min()?;
    let old_end = shifts.iter().map(|shift| shift.old_rank).max()?;
    let new_start = shifts.iter().map(|shift| shift.new_rank).min()?;
    let new_end = shifts.iter().map(|shift| shift.new_rank).max()?;
    Some(ShiftRange {
        old_start,
        old_end,
        new_start,
        new_end,
    })
}

fn group_label(group: GroupKey) -> String {
    group.map_or_else(|| "root".to_string(), |parent| parent.to_string())
}

fn log_failure(event: &str, subject: String, err: &RankError) {
    match err {
        RankError::Store(store_err) => log::error!(
            "event={event} module=rank status=error subject={subject} error_code=store_failed error={store_err}"
        ),
        other => warn!("event={event} module=rank status=rejected subject={subject} error={other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::{shift_range, RankShift};
    use uuid::Uuid;

    fn shift(old_rank: i64, new_rank: i64) -> RankShift {
        RankShift {
            id: Uuid::new_v4(),
            old_rank,
            new_rank,
        }
    }

    #[test]
    fn shift_range_is_none_without_shifts() {
        assert_eq!(shift_range(&[]), None);
    }

    #[test]
    fn shift_range_spans_old_and_new_positions() {
        let range = shift_range(&[shift(2, 3), shift(1, 2)]).unwrap();
        assert_eq!(range.old_start, 1);
        assert_eq!(range.old_end, 2);
        assert_eq!(range.new_start, 2);
        assert_eq!(range.new_end, 3);
    }
}
