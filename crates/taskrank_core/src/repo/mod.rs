//! Rank store contracts and persistence backends.
//!
//! # Responsibility
//! - Define the transactional contract every rank mutation runs against.
//! - Provide interchangeable SQLite and in-memory implementations.
//!
//! # Invariants
//! - Multi-row rank changes only happen inside `RankStore::run_atomic`.
//! - Writes validate the task record before persistence.
//! - Reads reject invalid persisted state instead of masking it.

pub mod memory_store;
pub mod rank_store;
pub mod sqlite_store;
