//! Binary-search comparison state machine.
//!
//! # Responsibility
//! - Own the snapshot of the group being searched and the candidate.
//! - Advance through `Idle -> Comparing -> (Placing) -> Complete` or
//!   `Cancelled` via the pure `transition` function.
//!
//! # Invariants
//! - `Complete` and `Cancelled` are terminal.
//! - Events that are not valid for the current state are rejected and leave
//!   the state unchanged.
//! - The answer that reaches `MAX_COMPARISON_STEPS` narrows the window and
//!   routes to `Placing` instead of asking again.

use log::debug;
use std::fmt::{Display, Formatter};
use thiserror::Error;

/// Upper bound on questions presented to the decision source.
pub const MAX_COMPARISON_STEPS: u32 = 10;

/// Answer to "is the candidate more important than the probe?".
///
/// There is no "equal": answering `LessImportant` for a perceived tie places
/// the candidate right after the probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Judgment {
    MoreImportant,
    LessImportant,
}

/// Input accepted by `transition`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonEvent {
    /// Begin searching a snapshot of `len` active tasks.
    Start { len: usize },
    Answer(Judgment),
    Skip,
    /// Explicit rank chosen by the caller; range checks happen at insertion.
    Place(i64),
    Cancel,
}

impl ComparisonEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Answer(_) => "answer",
            Self::Skip => "skip",
            Self::Place(_) => "place",
            Self::Cancel => "cancel",
        }
    }
}

/// Binary-search bounds over the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchWindow {
    pub low: i64,
    pub high: i64,
    /// Index of the snapshot item currently compared against.
    pub probe: i64,
    pub steps: u32,
    /// Snapshot length.
    pub len: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonState {
    Idle,
    Comparing(SearchWindow),
    /// Manual placement fallback.
    Placing {
        window: SearchWindow,
        suggested_rank: i64,
    },
    Complete {
        final_rank: i64,
        steps: u32,
    },
    Cancelled,
}

impl ComparisonState {
    pub fn kind(&self) -> StateKind {
        match self {
            Self::Idle => StateKind::Idle,
            Self::Comparing(_) => StateKind::Comparing,
            Self::Placing { .. } => StateKind::Placing,
            Self::Complete { .. } => StateKind::Complete,
            Self::Cancelled => StateKind::Cancelled,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Cancelled)
    }
}

/// Payload-free state tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    Idle,
    Comparing,
    Placing,
    Complete,
    Cancelled,
}

impl Display for StateKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Comparing => "comparing",
            Self::Placing => "placing",
            Self::Complete => "complete",
            Self::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ComparisonError {
    #[error("event `{event}` is not valid in state `{state}`")]
    InvalidEvent { state: StateKind, event: &'static str },
}

/// Computes the next state, or rejects the event.
pub fn transition(
    state: &ComparisonState,
    event: ComparisonEvent,
) -> Result<ComparisonState, ComparisonError> {
    match (*state, event) {
        (ComparisonState::Idle, ComparisonEvent::Start { len: 0 }) => {
            Ok(ComparisonState::Complete {
                final_rank: 0,
                steps: 0,
            })
        }
        (ComparisonState::Idle, ComparisonEvent::Start { len }) => {
            let len = len as i64;
            Ok(ComparisonState::Comparing(SearchWindow {
                low: 0,
                high: len - 1,
                probe: len / 2,
                steps: 0,
                len,
            }))
        }
        (ComparisonState::Comparing(window), ComparisonEvent::Answer(judgment)) => {
            Ok(narrow(window, judgment))
        }
        (ComparisonState::Comparing(window), ComparisonEvent::Skip) => {
            Ok(ComparisonState::Placing {
                window,
                suggested_rank: window.probe,
            })
        }
        (ComparisonState::Placing { window, .. }, ComparisonEvent::Place(rank)) => {
            Ok(ComparisonState::Complete {
                final_rank: rank,
                steps: window.steps,
            })
        }
        (
            ComparisonState::Comparing(_) | ComparisonState::Placing { .. },
            ComparisonEvent::Cancel,
        ) => Ok(ComparisonState::Cancelled),
        (state, event) => Err(ComparisonError::InvalidEvent {
            state: state.kind(),
            event: event.name(),
        }),
    }
}

fn narrow(window: SearchWindow, judgment: Judgment) -> ComparisonState {
    let steps = window.steps + 1;
    let next = match judgment {
        Judgment::MoreImportant => {
            if window.probe == 0 {
                return ComparisonState::Complete {
                    final_rank: 0,
                    steps,
                };
            }
            let high = window.probe - 1;
            if window.low > high {
                return ComparisonState::Complete {
                    final_rank: window.low,
                    steps,
                };
            }
            SearchWindow {
                high,
                probe: (window.low + high) / 2,
                steps,
                ..window
            }
        }
        Judgment::LessImportant => {
            if window.probe >= window.len - 1 {
                return ComparisonState::Complete {
                    final_rank: window.len,
                    steps,
                };
            }
            let low = window.probe + 1;
            if low > window.high {
                return ComparisonState::Complete {
                    final_rank: low,
                    steps,
                };
            }
            SearchWindow {
                low,
                probe: (low + window.high) / 2,
                steps,
                ..window
            }
        }
    };

    if steps >= MAX_COMPARISON_STEPS {
        ComparisonState::Placing {
            window: next,
            suggested_rank: next.probe,
        }
    } else {
        ComparisonState::Comparing(next)
    }
}

/// Read-only view of the engine for callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonSnapshot<'a, T> {
    pub state: StateKind,
    /// Item to compare against; only set while comparing.
    pub probe_item: Option<&'a T>,
    pub step_count: u32,
    pub final_rank: Option<i64>,
    /// Rank offered as the default while placing manually.
    pub suggested_rank: Option<i64>,
}

/// Comparison workflow over a candidate `C` and a ranked snapshot of `T`.
#[derive(Debug)]
pub struct ComparisonEngine<C, T> {
    candidate: Option<C>,
    existing: Vec<T>,
    state: ComparisonState,
}

impl<C, T> Default for ComparisonEngine<C, T> {
    fn default() -> Self {
        Self {
            candidate: None,
            existing: Vec::new(),
            state: ComparisonState::Idle,
        }
    }
}

impl<C, T> ComparisonEngine<C, T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a workflow. `existing_sorted` must be ordered by rank ascending.
    pub fn start(
        &mut self,
        candidate: C,
        existing_sorted: Vec<T>,
    ) -> Result<&ComparisonState, ComparisonError> {
        let next = transition(
            &self.state,
            ComparisonEvent::Start {
                len: existing_sorted.len(),
            },
        )?;
        self.candidate = Some(candidate);
        self.existing = existing_sorted;
        self.commit(next, "start");
        Ok(&self.state)
    }

    pub fn answer(&mut self, judgment: Judgment) -> Result<&ComparisonState, ComparisonError> {
        self.apply(ComparisonEvent::Answer(judgment))
    }

    pub fn skip(&mut self) -> Result<&ComparisonState, ComparisonError> {
        self.apply(ComparisonEvent::Skip)
    }

    pub fn place(&mut self, rank: i64) -> Result<&ComparisonState, ComparisonError> {
        self.apply(ComparisonEvent::Place(rank))
    }

    /// Abandons the workflow and drops candidate and snapshot.
    pub fn cancel(&mut self) -> Result<&ComparisonState, ComparisonError> {
        self.apply(ComparisonEvent::Cancel)
    }

    /// Returns the engine to `Idle`, discarding any workflow.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn state(&self) -> &ComparisonState {
        &self.state
    }

    pub fn candidate(&self) -> Option<&C> {
        self.candidate.as_ref()
    }

    pub fn existing(&self) -> &[T] {
        &self.existing
    }

    pub fn final_rank(&self) -> Option<i64> {
        match self.state {
            ComparisonState::Complete { final_rank, .. } => Some(final_rank),
            _ => None,
        }
    }

    pub fn current_state(&self) -> ComparisonSnapshot<'_, T> {
        match self.state {
            ComparisonState::Idle | ComparisonState::Cancelled => ComparisonSnapshot {
                state: self.state.kind(),
                probe_item: None,
                step_count: 0,
                final_rank: None,
                suggested_rank: None,
            },
            ComparisonState::Comparing(window) => ComparisonSnapshot {
                state: StateKind::Comparing,
                probe_item: usize::try_from(window.probe)
                    .ok()
                    .and_then(|index| self.existing.get(index)),
                step_count: window.steps,
                final_rank: None,
                suggested_rank: None,
            },
            ComparisonState::Placing {
                window,
                suggested_rank,
            } => ComparisonSnapshot {
                state: StateKind::Placing,
                probe_item: None,
                step_count: window.steps,
                final_rank: None,
                suggested_rank: Some(suggested_rank),
            },
            ComparisonState::Complete { final_rank, steps } => ComparisonSnapshot {
                state: StateKind::Complete,
                probe_item: None,
                step_count: steps,
                final_rank: Some(final_rank),
                suggested_rank: None,
            },
        }
    }

    fn apply(&mut self, event: ComparisonEvent) -> Result<&ComparisonState, ComparisonError> {
        let next = transition(&self.state, event)?;
        self.commit(next, event.name());
        Ok(&self.state)
    }

    fn commit(&mut self, next: ComparisonState, event: &'static str) {
        if next == ComparisonState::Cancelled {
            self.candidate = None;
            self.existing.clear();
        }
        debug!(
            "event=compare_transition module=compare status=ok trigger={event} from={} to={}",
            self.state.kind(),
            next.kind()
        );
        self.state = next;
    }
}
