//! Interactive binary-search placement over a line-based terminal.
//!
//! # Responsibility
//! - Render placement questions and read one reply per line.
//! - Translate replies into placement session events.
//!
//! # Invariants
//! - End of input cancels the session; nothing is inserted.
//! - Unrecognized replies re-ask the same question without advancing.
//! - A manual rank outside `[0, n]` is re-asked before it reaches the
//!   session, so a typo never ends the placement.

use anyhow::Result;
use std::io::{BufRead, Write};
use taskrank_core::{
    InsertOutcome, Judgment, PlacementProgress, PlacementSession, RankStore, MAX_COMPARISON_STEPS,
};

/// One parsed line of user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    More,
    Less,
    Skip,
    Cancel,
    /// Empty line; accepts the suggested rank while placing.
    Default,
    Rank(i64),
}

pub fn parse_reply(line: &str) -> Option<Reply> {
    match line.trim().to_ascii_lowercase().as_str() {
        "" => Some(Reply::Default),
        "m" | "more" => Some(Reply::More),
        "l" | "less" => Some(Reply::Less),
        "s" | "skip" => Some(Reply::Skip),
        "c" | "cancel" | "q" => Some(Reply::Cancel),
        other => other.parse().ok().map(Reply::Rank),
    }
}

/// Drives `session` to a terminal outcome.
///
/// Returns `None` when the placement was cancelled.
pub fn run_placement<S, R, W>(
    session: &mut PlacementSession<'_, S>,
    first: PlacementProgress,
    input: R,
    mut out: W,
) -> Result<Option<InsertOutcome>>
where
    S: RankStore,
    R: BufRead,
    W: Write,
{
    let mut lines = input.lines();
    let mut progress = first;

    loop {
        match &progress {
            PlacementProgress::Placed(outcome) => return Ok(Some(outcome.clone())),
            PlacementProgress::Cancelled => return Ok(None),
            PlacementProgress::Asking { probe, step_count } => write!(
                out,
                "[{}/{}] is it more (m) or less (l) important than \"{}\"? [m/l/s/c] ",
                step_count + 1,
                MAX_COMPARISON_STEPS,
                probe.title
            )?,
            PlacementProgress::Placing { suggested_rank } => write!(
                out,
                "rank for the new task [{suggested_rank}] (c to cancel): "
            )?,
        }
        out.flush()?;

        let Some(line) = lines.next().transpose()? else {
            writeln!(out)?;
            progress = session.cancel()?;
            continue;
        };

        let next = match (&progress, parse_reply(&line)) {
            (_, Some(Reply::Cancel)) => Some(session.cancel()?),
            (PlacementProgress::Asking { .. }, Some(Reply::More)) => {
                Some(session.answer(Judgment::MoreImportant)?)
            }
            (PlacementProgress::Asking { .. }, Some(Reply::Less)) => {
                Some(session.answer(Judgment::LessImportant)?)
            }
            (PlacementProgress::Asking { .. }, Some(Reply::Skip)) => Some(session.skip()?),
            (PlacementProgress::Placing { suggested_rank }, Some(Reply::Default)) => {
                Some(session.place(*suggested_rank)?)
            }
            (PlacementProgress::Placing { .. }, Some(Reply::Rank(rank))) => {
                let max = session.engine().existing().len() as i64;
                if (0..=max).contains(&rank) {
                    Some(session.place(rank)?)
                } else {
                    writeln!(out, "please enter a rank between 0 and {max}")?;
                    None
                }
            }
            (PlacementProgress::Asking { .. }, _) => {
                writeln!(out, "please answer m, l, s or c")?;
                None
            }
            _ => {
                writeln!(out, "please enter a rank number or c")?;
                None
            }
        };
        if let Some(next) = next {
            progress = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_reply, run_placement, Reply};
    use std::io::Cursor;
    use taskrank_core::{InMemoryRankStore, NewTask, PlacementSession, RankMaintainer};

    fn maintainer_with(titles: &[&str]) -> RankMaintainer<InMemoryRankStore> {
        let maintainer = RankMaintainer::new(InMemoryRankStore::new());
        for title in titles {
            maintainer.insert_at(NewTask::new(*title), None).unwrap();
        }
        maintainer
    }

    fn titles(maintainer: &RankMaintainer<InMemoryRankStore>) -> Vec<String> {
        maintainer
            .within(None)
            .unwrap()
            .into_iter()
            .map(|task| task.title)
            .collect()
    }

    fn place(maintainer: &RankMaintainer<InMemoryRankStore>, script: &str) -> (bool, String) {
        let (mut session, first) =
            PlacementSession::begin(maintainer, NewTask::new("new")).unwrap();
        let mut out = Vec::new();
        let placed = run_placement(&mut session, first, Cursor::new(script), &mut out).unwrap();
        (placed.is_some(), String::from_utf8(out).unwrap())
    }

    #[test]
    fn parse_reply_accepts_short_and_long_forms() {
        assert_eq!(parse_reply("m"), Some(Reply::More));
        assert_eq!(parse_reply(" LESS \n"), Some(Reply::Less));
        assert_eq!(parse_reply("s"), Some(Reply::Skip));
        assert_eq!(parse_reply("q"), Some(Reply::Cancel));
        assert_eq!(parse_reply(""), Some(Reply::Default));
        assert_eq!(parse_reply("3"), Some(Reply::Rank(3)));
        assert_eq!(parse_reply("maybe"), None);
    }

    #[test]
    fn answers_place_the_task() {
        let maintainer = maintainer_with(&["A", "B", "C"]);
        let (placed, transcript) = place(&maintainer, "m\nl\n");

        assert!(placed);
        assert!(transcript.contains("\"B\""));
        assert!(transcript.contains("\"A\""));
        assert_eq!(titles(&maintainer), vec!["A", "new", "B", "C"]);
    }

    #[test]
    fn unknown_reply_repeats_the_question() {
        let maintainer = maintainer_with(&["A"]);
        let (placed, transcript) = place(&maintainer, "what\nm\n");

        assert!(placed);
        assert!(transcript.contains("please answer m, l, s or c"));
        assert_eq!(titles(&maintainer), vec!["new", "A"]);
    }

    #[test]
    fn skip_then_empty_line_uses_suggested_rank() {
        let maintainer = maintainer_with(&["A", "B", "C", "D"]);
        let (placed, transcript) = place(&maintainer, "s\n\n");

        assert!(placed);
        assert!(transcript.contains("[2]"));
        assert_eq!(titles(&maintainer), vec!["A", "B", "new", "C", "D"]);
    }

    #[test]
    fn out_of_range_rank_is_asked_again() {
        let maintainer = maintainer_with(&["A", "B"]);
        let (placed, transcript) = place(&maintainer, "s\n9\n1\n");

        assert!(placed);
        assert!(transcript.contains("please enter a rank between 0 and 2"));
        assert_eq!(titles(&maintainer), vec!["A", "new", "B"]);
    }

    #[test]
    fn negative_rank_is_asked_again() {
        let maintainer = maintainer_with(&["A"]);
        let (placed, transcript) = place(&maintainer, "s\n-1\n0\n");

        assert!(placed);
        assert!(transcript.contains("please enter a rank between 0 and 1"));
        assert_eq!(titles(&maintainer), vec!["new", "A"]);
    }

    #[test]
    fn cancel_and_end_of_input_insert_nothing() {
        let maintainer = maintainer_with(&["A", "B"]);

        let (placed, _) = place(&maintainer, "c\n");
        assert!(!placed);
        let (placed, _) = place(&maintainer, "m\n");
        assert!(!placed);

        assert_eq!(titles(&maintainer), vec!["A", "B"]);
    }
}
