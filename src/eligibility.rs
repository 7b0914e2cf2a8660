//! Decides whether a candidate flag is usable by a team.
//!
//! The checks run in a fixed order: ownership, exhaustion, duplicate.
//! Ownership failures just skip to the next candidate; the other two are
//! terminal for the whole submission.

use crate::db::{Db, DbError};
use crate::models::Flag;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Decision {
    /// The flag belongs to another team, try the next candidate.
    Skip,
    /// The flag's submission counter ran out, across all teams.
    Exhausted,
    /// This team already has a score for this flag.
    AlreadySubmitted,
    Usable,
}

/// Gather the facts from the store and decide. Another team's flag is
/// skipped up front, before any query.
pub fn check(db: &Db, team: i32, flag: &Flag) -> Result<Decision, DbError> {
    if let Some(owner) = flag.teamid {
        if owner != team {
            return Ok(Decision::Skip);
        }
    }

    let submissions = match flag.counter {
        Some(counter) if counter > 0 => db.count_flag_scores(flag.id)?,
        _ => 0,
    };
    let already_submitted = db.team_has_flag(team, flag.id)?;
    Ok(decide(team, flag, submissions, already_submitted))
}

pub fn decide(team: i32, flag: &Flag, submissions: i64, already_submitted: bool) -> Decision {
    if let Some(owner) = flag.teamid {
        if owner != team {
            return Decision::Skip;
        }
    }

    if let Some(counter) = flag.counter {
        if counter > 0 && submissions >= i64::from(counter) {
            return Decision::Exhausted;
        }
    }

    if already_submitted {
        return Decision::AlreadySubmitted;
    }

    Decision::Usable
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flag(teamid: Option<i32>, counter: Option<i32>) -> Flag {
        Flag {
            id: 1,
            teamid,
            triggerid: None,
            code: None,
            flag: Some("flag{test}".to_owned()),
            value: 10,
            writeup_value: None,
            return_string: None,
            counter,
            validator: None,
            description: String::new(),
            tags: String::new(),
        }
    }

    #[test]
    fn global_flag_is_usable() {
        assert_eq!(decide(3, &flag(None, None), 0, false), Decision::Usable);
    }

    #[test]
    fn owned_flag_skipped_for_other_teams() {
        assert_eq!(decide(3, &flag(Some(4), None), 0, false), Decision::Skip);
        assert_eq!(decide(4, &flag(Some(4), None), 0, false), Decision::Usable);
    }

    #[test]
    fn counter_exhaustion() {
        // limit of 2, already submitted twice somewhere
        assert_eq!(decide(3, &flag(None, Some(2)), 2, false), Decision::Exhausted);
        assert_eq!(decide(3, &flag(None, Some(2)), 3, false), Decision::Exhausted);
        assert_eq!(decide(3, &flag(None, Some(2)), 1, false), Decision::Usable);
    }

    #[test]
    fn zero_or_absent_counter_is_unlimited() {
        assert_eq!(decide(3, &flag(None, Some(0)), 1000, false), Decision::Usable);
        assert_eq!(decide(3, &flag(None, None), 1000, false), Decision::Usable);
    }

    #[test]
    fn duplicate_submission() {
        assert_eq!(
            decide(3, &flag(None, None), 0, true),
            Decision::AlreadySubmitted
        );
    }

    #[test]
    fn exhaustion_reported_before_duplicate() {
        assert_eq!(decide(3, &flag(None, Some(1)), 1, true), Decision::Exhausted);
    }
}
