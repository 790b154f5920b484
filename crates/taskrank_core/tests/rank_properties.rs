//! Randomised operation sequences against both stores, checked after every
//! step: dense active ranks per group, untouched sibling groups, and frozen
//! ranks on completed tasks. Also covers the comparison search bounds.

use std::collections::HashMap;

use proptest::prelude::*;
use taskrank_core::db::open_db_in_memory;
use taskrank_core::{
    ComparisonEngine, ComparisonState, GroupKey, InMemoryRankStore, Judgment, NewTask, RankError,
    RankMaintainer, RankStore, SqliteRankStore, Task, TaskId, MAX_COMPARISON_STEPS,
};

#[derive(Debug, Clone)]
enum Op {
    Insert { child: bool, rank: u16 },
    Delete { child: bool, pick: u16 },
    Move { child: bool, pick: u16, rank: u16 },
    Complete { child: bool, pick: u16 },
    Reopen { child: bool, pick: u16, rank: u16 },
}

impl Op {
    fn in_child_group(&self) -> bool {
        match self {
            Self::Insert { child, .. }
            | Self::Delete { child, .. }
            | Self::Move { child, .. }
            | Self::Complete { child, .. }
            | Self::Reopen { child, .. } => *child,
        }
    }
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (any::<bool>(), any::<u16>()).prop_map(|(child, rank)| Op::Insert { child, rank }),
        1 => (any::<bool>(), any::<u16>()).prop_map(|(child, pick)| Op::Delete { child, pick }),
        2 => (any::<bool>(), any::<u16>(), any::<u16>())
            .prop_map(|(child, pick, rank)| Op::Move { child, pick, rank }),
        1 => (any::<bool>(), any::<u16>()).prop_map(|(child, pick)| Op::Complete { child, pick }),
        1 => (any::<bool>(), any::<u16>(), any::<u16>())
            .prop_map(|(child, pick, rank)| Op::Reopen { child, pick, rank }),
    ]
}

fn arb_op_sequence() -> impl Strategy<Value = Vec<Op>> {
    proptest::collection::vec(arb_op(), 1..40)
}

type GroupSnapshot = Vec<(TaskId, i64, bool)>;

fn snapshot<S: RankStore>(maintainer: &RankMaintainer<S>, group: GroupKey) -> GroupSnapshot {
    maintainer
        .store()
        .list_group(group, true)
        .unwrap()
        .into_iter()
        .map(|task| (task.id, task.rank, task.completed))
        .collect()
}

fn pick(tasks: &[Task], pick: u16) -> Option<&Task> {
    if tasks.is_empty() {
        return None;
    }
    tasks.get(usize::from(pick) % tasks.len())
}

fn run_ops<S: RankStore>(store: S, ops: &[Op]) -> Result<(), TestCaseError> {
    let maintainer = RankMaintainer::new(store);
    let parent = maintainer
        .insert_at(NewTask::new("parent"), None)
        .unwrap()
        .task
        .id;
    let groups: [GroupKey; 2] = [None, Some(parent)];
    let mut frozen: HashMap<TaskId, i64> = HashMap::new();

    for (step, op) in ops.iter().enumerate() {
        let (group, other) = if op.in_child_group() {
            (groups[1], groups[0])
        } else {
            (groups[0], groups[1])
        };
        let before = snapshot(&maintainer, group);
        let other_before = snapshot(&maintainer, other);
        let all = maintainer.store().list_group(group, true).unwrap();
        let (completed, active): (Vec<Task>, Vec<Task>) =
            all.iter().cloned().partition(|task| task.completed);
        let n = active.len() as i64;

        match op {
            Op::Insert { rank, .. } => {
                let rank = i64::from(*rank) % (n + 2);
                let draft = NewTask {
                    title: format!("task-{step}"),
                    group_key: group,
                    ..NewTask::default()
                };
                match maintainer.insert_at(draft, Some(rank)) {
                    Ok(outcome) => {
                        prop_assert!(rank <= n);
                        prop_assert_eq!(outcome.task.rank, rank);
                        prop_assert_eq!(outcome.shifted_count as i64, n - rank);
                    }
                    Err(err) => {
                        prop_assert!(
                            matches!(err, RankError::InvalidRank { .. }),
                            "unexpected error: {}",
                            err
                        );
                        prop_assert_eq!(rank, n + 1);
                        prop_assert_eq!(snapshot(&maintainer, group), before.clone());
                    }
                }
            }
            Op::Delete { pick: index, .. } => {
                let deletable: Vec<Task> =
                    all.iter().filter(|task| task.id != parent).cloned().collect();
                if let Some(task) = pick(&deletable, *index) {
                    prop_assert!(maintainer.delete_by_id(task.id).unwrap());
                    frozen.remove(&task.id);
                }
            }
            Op::Move {
                pick: index, rank, ..
            } => {
                if let Some(task) = pick(&active, *index) {
                    let rank = i64::from(*rank) % (n + 1);
                    match maintainer.move_to(task.id, rank) {
                        Ok(shifted) => {
                            prop_assert!(rank < n);
                            prop_assert_eq!(shifted as i64, (task.rank - rank).abs());
                        }
                        Err(err) => {
                            prop_assert!(
                                matches!(err, RankError::InvalidRank { .. }),
                                "unexpected error: {}",
                                err
                            );
                            prop_assert_eq!(snapshot(&maintainer, group), before.clone());
                        }
                    }
                }
            }
            Op::Complete { pick: index, .. } => {
                if let Some(task) = pick(&active, *index) {
                    prop_assert!(maintainer.complete(task.id).unwrap());
                    frozen.insert(task.id, task.rank);
                }
            }
            Op::Reopen {
                pick: index, rank, ..
            } => {
                if let Some(task) = pick(&completed, *index) {
                    let rank = i64::from(*rank) % (n + 1);
                    let outcome = maintainer.reopen(task.id, Some(rank)).unwrap();
                    prop_assert_eq!(outcome.task.rank, rank);
                    frozen.remove(&task.id);
                }
            }
        }

        prop_assert_eq!(snapshot(&maintainer, other), other_before);
        for group in groups {
            let ranks: Vec<i64> = maintainer
                .within(group)
                .unwrap()
                .iter()
                .map(|task| task.rank)
                .collect();
            let dense: Vec<i64> = (0..ranks.len() as i64).collect();
            prop_assert_eq!(ranks, dense);
        }
        for (id, rank) in &frozen {
            let task = maintainer.store().get_task(*id).unwrap().unwrap();
            prop_assert!(task.completed);
            prop_assert_eq!(task.rank, *rank);
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn memory_store_keeps_groups_dense_and_isolated(ops in arb_op_sequence()) {
        run_ops(InMemoryRankStore::new(), &ops)?;
    }

    #[test]
    fn sqlite_store_keeps_groups_dense_and_isolated(ops in arb_op_sequence()) {
        let conn = open_db_in_memory().unwrap();
        run_ops(SqliteRankStore::try_new(&conn).unwrap(), &ops)?;
    }
}

proptest! {
    #[test]
    fn consistent_answers_find_the_true_position(n in 0usize..1024, seed in any::<u16>()) {
        let target = i64::from(seed) % (n as i64 + 1);
        let mut engine: ComparisonEngine<(), i64> = ComparisonEngine::new();
        let mut state = *engine.start((), (0..n as i64).collect()).unwrap();
        let mut asked = 0;

        while let ComparisonState::Comparing(window) = state {
            asked += 1;
            let judgment = if target <= window.probe {
                Judgment::MoreImportant
            } else {
                Judgment::LessImportant
            };
            state = *engine.answer(judgment).unwrap();
        }

        prop_assert!(asked <= MAX_COMPARISON_STEPS);
        prop_assert_eq!(state, ComparisonState::Complete { final_rank: target, steps: asked });
    }

    #[test]
    fn any_answers_stop_within_the_step_cap(
        n in 0usize..4096,
        answers in proptest::collection::vec(any::<bool>(), 10),
    ) {
        let mut engine: ComparisonEngine<(), i64> = ComparisonEngine::new();
        let mut state = *engine.start((), (0..n as i64).collect()).unwrap();

        for more in answers {
            if !matches!(state, ComparisonState::Comparing(_)) {
                break;
            }
            let judgment = if more {
                Judgment::MoreImportant
            } else {
                Judgment::LessImportant
            };
            state = *engine.answer(judgment).unwrap();
        }

        match state {
            ComparisonState::Complete { final_rank, steps } => {
                prop_assert!((0..=n as i64).contains(&final_rank));
                prop_assert!(steps <= MAX_COMPARISON_STEPS);
            }
            ComparisonState::Placing { window, suggested_rank } => {
                prop_assert_eq!(window.steps, MAX_COMPARISON_STEPS);
                prop_assert!((0..n as i64).contains(&suggested_rank));
            }
            other => prop_assert!(false, "unexpected state {:?}", other),
        }
    }
}
