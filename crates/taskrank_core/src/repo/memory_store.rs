//! In-memory implementation of the rank store.
//!
//! # Responsibility
//! - Serve as the embedded, dependency-free backend and as a fast store for
//!   tests of the ranking logic.
//! - Mirror the SQLite backend's observable semantics, cascade included.
//!
//! # Invariants
//! - Units of work are serialized by one mutex.
//! - A unit writes to a private copy that replaces the committed state only
//!   when the work returns `Ok`.

use crate::model::task::{now_epoch_ms, GroupKey, Task, TaskId};
use crate::repo::rank_store::{sort_group, RankStore, RankTx, StoreError, StoreResult};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

/// Mutex-guarded map of tasks keyed by id.
#[derive(Debug, Default)]
pub struct InMemoryRankStore {
    tasks: Mutex<BTreeMap<TaskId, Task>>,
}

impl InMemoryRankStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store with rows as-is, bypassing rank maintenance.
    ///
    /// Used to import data from another backend.
    pub fn from_tasks(tasks: impl IntoIterator<Item = Task>) -> Self {
        let map = tasks.into_iter().map(|task| (task.id, task)).collect();
        Self {
            tasks: Mutex::new(map),
        }
    }

    /// Returns every stored task, completed ones included, ordered by id.
    pub fn all_tasks(&self) -> StoreResult<Vec<Task>> {
        let guard = self.tasks.lock().map_err(|_| poisoned())?;
        Ok(guard.values().cloned().collect())
    }
}

impl RankStore for InMemoryRankStore {
    fn run_atomic<T, E, F>(&self, mut work: F) -> Result<T, E>
    where
        F: FnMut(&mut dyn RankTx) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut committed = self.tasks.lock().map_err(|_| poisoned())?;
        let mut unit = MemoryUnit {
            tasks: committed.clone(),
        };
        let value = work(&mut unit)?;
        *committed = unit.tasks;
        Ok(value)
    }
}

fn poisoned() -> StoreError {
    StoreError::Transaction {
        attempts: 1,
        reason: "in-memory store lock poisoned by a panicked writer".to_string(),
    }
}

struct MemoryUnit {
    tasks: BTreeMap<TaskId, Task>,
}

impl RankTx for MemoryUnit {
    fn list_group(&self, group: GroupKey, include_completed: bool) -> StoreResult<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .tasks
            .values()
            .filter(|task| task.group_key == group && (include_completed || task.is_active()))
            .cloned()
            .collect();
        sort_group(&mut tasks);
        Ok(tasks)
    }

    fn get_task(&self, id: TaskId) -> StoreResult<Option<Task>> {
        Ok(self.tasks.get(&id).cloned())
    }

    fn insert_task(&mut self, task: &Task) -> StoreResult<()> {
        task.validate()?;
        if self.tasks.contains_key(&task.id) {
            return Err(StoreError::DuplicateId(task.id));
        }
        if let Some(parent) = task.group_key {
            if !self.tasks.contains_key(&parent) {
                return Err(StoreError::MissingParent(parent));
            }
        }
        self.tasks.insert(task.id, task.clone());
        Ok(())
    }

    fn update_task(&mut self, task: &Task) -> StoreResult<()> {
        task.validate()?;
        match self.tasks.get_mut(&task.id) {
            Some(stored) => {
                *stored = task.clone();
                Ok(())
            }
            None => Err(StoreError::MissingTask(task.id)),
        }
    }

    fn delete_task(&mut self, id: TaskId) -> StoreResult<bool> {
        if self.tasks.remove(&id).is_none() {
            return Ok(false);
        }

        let mut pending = VecDeque::from([id]);
        while let Some(parent) = pending.pop_front() {
            let children: Vec<TaskId> = self
                .tasks
                .values()
                .filter(|task| task.group_key == Some(parent))
                .map(|task| task.id)
                .collect();
            for child in children {
                self.tasks.remove(&child);
                pending.push_back(child);
            }
        }
        Ok(true)
    }

    fn bulk_reassign_ranks(&mut self, updates: &[(TaskId, i64)]) -> StoreResult<()> {
        let updated_at = now_epoch_ms();
        for (id, rank) in updates {
            if *rank < 0 {
                return Err(StoreError::InvalidData(format!(
                    "negative rank {rank} assigned to task {id}"
                )));
            }
            let task = self
                .tasks
                .get_mut(id)
                .ok_or(StoreError::MissingTask(*id))?;
            task.rank = *rank;
            task.updated_at = updated_at;
        }
        Ok(())
    }
}
