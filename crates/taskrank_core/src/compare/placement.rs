//! Placement workflow: comparison engine in front of the rank maintainer.
//!
//! # Responsibility
//! - Snapshot the target group and drive the engine with caller events.
//! - Insert the candidate at the computed rank once the engine completes.
//!
//! # Invariants
//! - Storage is only written after `Complete`; cancelling never writes.
//! - At most one insertion happens per session. A repeated completion
//!   notification is rejected with `DuplicateInsertion` and never reaches
//!   storage.
//! - No transaction stays open between caller events.

use crate::compare::engine::{ComparisonEngine, ComparisonError, ComparisonState, Judgment};
use crate::model::task::{NewTask, Task, TaskId};
use crate::rank::maintainer::{InsertOutcome, RankError, RankMaintainer};
use crate::repo::rank_store::RankStore;
use log::{info, warn};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlacementError {
    #[error(transparent)]
    Comparison(#[from] ComparisonError),
    #[error(transparent)]
    Rank(#[from] RankError),
    /// The workflow already inserted its candidate.
    #[error("placement already inserted task {0}; duplicate completion suppressed")]
    DuplicateInsertion(TaskId),
    #[error("placement has not reached a final rank")]
    NotComplete,
}

/// What the caller should do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementProgress {
    /// Ask whether the candidate is more important than `probe`.
    Asking { probe: Task, step_count: u32 },
    /// Ask for an explicit rank; `suggested_rank` is the default choice.
    Placing { suggested_rank: i64 },
    Placed(InsertOutcome),
    Cancelled,
}

/// One interactive placement of a new task.
pub struct PlacementSession<'m, S: RankStore> {
    maintainer: &'m RankMaintainer<S>,
    engine: ComparisonEngine<NewTask, Task>,
    inserted: Option<InsertOutcome>,
}

impl<'m, S: RankStore> PlacementSession<'m, S> {
    /// Snapshots the draft's group and starts comparing.
    ///
    /// An empty group completes immediately and inserts at rank 0.
    pub fn begin(
        maintainer: &'m RankMaintainer<S>,
        draft: NewTask,
    ) -> Result<(Self, PlacementProgress), PlacementError> {
        draft.validate().map_err(RankError::from)?;
        let existing = maintainer.within(draft.group_key)?;
        let group_size = existing.len();

        let mut session = Self {
            maintainer,
            engine: ComparisonEngine::new(),
            inserted: None,
        };
        session.engine.start(draft, existing)?;
        info!("event=placement_begin module=compare status=ok group_size={group_size}");

        let progress = session.progress()?;
        Ok((session, progress))
    }

    pub fn answer(&mut self, judgment: Judgment) -> Result<PlacementProgress, PlacementError> {
        self.engine.answer(judgment)?;
        self.progress()
    }

    pub fn skip(&mut self) -> Result<PlacementProgress, PlacementError> {
        self.engine.skip()?;
        self.progress()
    }

    pub fn place(&mut self, rank: i64) -> Result<PlacementProgress, PlacementError> {
        self.engine.place(rank)?;
        self.progress()
    }

    pub fn cancel(&mut self) -> Result<PlacementProgress, PlacementError> {
        self.engine.cancel()?;
        info!("event=placement_cancel module=compare status=ok");
        self.progress()
    }

    /// Handles a completion notification by inserting the candidate.
    ///
    /// # Errors
    /// - `DuplicateInsertion` when the candidate was already inserted.
    /// - `NotComplete` when the engine has no final rank yet.
    pub fn notify_complete(&mut self) -> Result<InsertOutcome, PlacementError> {
        if let Some(done) = &self.inserted {
            warn!(
                "event=placement_insert module=compare status=suppressed task_id={}",
                done.task.id
            );
            return Err(PlacementError::DuplicateInsertion(done.task.id));
        }
        let final_rank = self.engine.final_rank().ok_or(PlacementError::NotComplete)?;
        let draft = self
            .engine
            .candidate()
            .cloned()
            .ok_or(PlacementError::NotComplete)?;

        let outcome = self.maintainer.insert_at(draft, Some(final_rank))?;
        self.inserted = Some(outcome.clone());
        Ok(outcome)
    }

    pub fn engine(&self) -> &ComparisonEngine<NewTask, Task> {
        &self.engine
    }

    /// The insertion made by this session, if any.
    pub fn inserted(&self) -> Option<&InsertOutcome> {
        self.inserted.as_ref()
    }

    fn progress(&mut self) -> Result<PlacementProgress, PlacementError> {
        match *self.engine.state() {
            ComparisonState::Comparing(window) => {
                let probe = usize::try_from(window.probe)
                    .ok()
                    .and_then(|index| self.engine.existing().get(index))
                    .cloned()
                    .ok_or(PlacementError::NotComplete)?;
                Ok(PlacementProgress::Asking {
                    probe,
                    step_count: window.steps,
                })
            }
            ComparisonState::Placing { suggested_rank, .. } => {
                Ok(PlacementProgress::Placing { suggested_rank })
            }
            ComparisonState::Complete { .. } => Ok(PlacementProgress::Placed(self.notify_complete()?)),
            ComparisonState::Cancelled => Ok(PlacementProgress::Cancelled),
            ComparisonState::Idle => Err(PlacementError::NotComplete),
        }
    }
}
