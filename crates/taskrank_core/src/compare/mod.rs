//! Guided placement by pairwise comparison.
//!
//! # Responsibility
//! - Turn a sequence of "more/less important" judgments into a target rank
//!   (`engine`).
//! - Insert the candidate exactly once when a workflow completes
//!   (`placement`).
//!
//! # Invariants
//! - The engine never touches storage; only `placement` does, after
//!   `Complete`.
//! - At most `MAX_COMPARISON_STEPS` questions are asked per workflow.

pub mod engine;
pub mod placement;
