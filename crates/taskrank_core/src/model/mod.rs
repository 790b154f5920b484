//! Domain model for ranked tasks.
//!
//! # Responsibility
//! - Define the canonical task record shared by store, maintainer and CLI.
//! - Keep ranking-relevant fields explicit and everything else inert.
//!
//! # Invariants
//! - Every task is identified by a stable `TaskId`.
//! - Active tasks of one group hold ranks `0..n-1`; completed tasks keep a
//!   frozen rank outside that sequence.

pub mod task;
