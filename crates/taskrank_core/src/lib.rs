//! Core domain logic for taskrank.
//! This crate is the single source of truth for rank invariants.

pub mod compare;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod rank;
pub mod repo;
pub mod service;

pub use compare::engine::{
    transition, ComparisonEngine, ComparisonError, ComparisonEvent, ComparisonSnapshot,
    ComparisonState, Judgment, SearchWindow, StateKind, MAX_COMPARISON_STEPS,
};
pub use compare::placement::{PlacementError, PlacementProgress, PlacementSession};
pub use config::{ConfigError, TaskrankConfig};
pub use logging::{default_log_level, init_logging, logging_status, LogTarget, LoggingError};
pub use model::task::{GroupKey, NewTask, Task, TaskId, TaskPatch, TaskValidationError};
pub use rank::maintainer::{InsertOutcome, RankError, RankMaintainer, RankResult, ShiftRange};
pub use repo::memory_store::InMemoryRankStore;
pub use repo::rank_store::{RankStore, RankTx, StoreError, StoreResult};
pub use repo::sqlite_store::SqliteRankStore;
pub use service::task_service::{TaskService, TaskServiceError, TaskServiceResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
