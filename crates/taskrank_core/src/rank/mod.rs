//! Rank maintenance for dense, per-group priority sequences.
//!
//! # Responsibility
//! - Keep active ranks of every group equal to `0..n-1` across insert,
//!   delete, move, completion and reopening.
//!
//! # Invariants
//! - Each operation is exactly one `RankStore::run_atomic` unit.
//! - A shift only touches active tasks of the triggering task's group.
//! - Completed tasks keep the rank they had when completed.

pub mod maintainer;
