//! The submission pipeline: candidate lookup, eligibility, scoring,
//! trigger evaluation and response assembly.

use std::error::Error as StdError;
use std::time::Duration;

use crate::config::Config;
use crate::db::{Db, DbError};
use crate::eligibility::{self, Decision};
use crate::models::{Flag, NewScore, Score};
use crate::notify;
use crate::triggers;
use crate::util;

#[derive(Debug, Display)]
pub enum SubmitError {
    #[display(fmt = "Server is read-only.")]
    ReadOnly,
    #[display(fmt = "No flag provided.")]
    NoFlag,
    #[display(fmt = "No code provided.")]
    NoCode,
    #[display(fmt = "Flag isn't valid.")]
    InvalidFlag,
    #[display(fmt = "Invalid code.")]
    InvalidCode,
    #[display(fmt = "Too late, the flag has been exhausted.")]
    Exhausted,
    #[display(fmt = "The flag has already been submitted.")]
    AlreadySubmitted,
    #[display(fmt = "Unknown error with your flag, please report this.")]
    Unusable,
    #[display(fmt = "Couldn't find flagid={}", _0)]
    NoSuchFlag(i32),
    #[display(fmt = "Couldn't find scoreid={}", _0)]
    NoSuchScore(i32),
    Db(DbError),
}

impl StdError for SubmitError {}

impl From<DbError> for SubmitError {
    fn from(err: DbError) -> SubmitError {
        SubmitError::Db(err)
    }
}

impl SubmitError {
    /// Store failures get an opaque reply; everything else is an expected
    /// rejection whose message is meant for the caller.
    pub fn is_internal(&self) -> bool {
        match self {
            SubmitError::Db(_) => true,
            _ => false,
        }
    }
}

/// One entry of a submission response: the direct award first, then any
/// trigger bonuses in evaluation order.
#[derive(Clone, Debug, Serialize)]
pub struct Award {
    pub value: i32,
    #[serde(skip_serializing_if = "is_false")]
    pub trigger: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_string: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub writeup_string: Option<String>,
}

fn is_false(b: &bool) -> bool {
    !b
}

impl Award {
    pub fn direct(flag: &Flag, score: &Score) -> Award {
        Award::build(flag, score, false)
    }

    pub fn bonus(flag: &Flag, score: &Score) -> Award {
        Award::build(flag, score, true)
    }

    fn build(flag: &Flag, score: &Score, trigger: bool) -> Award {
        Award {
            value: score.value,
            trigger,
            return_string: flag.return_string.clone().filter(|s| !s.is_empty()),
            // the handle teams quote when they hand in a writeup
            writeup_string: flag
                .writeup_value
                .filter(|v| *v != 0)
                .map(|_| format!("WID{}", score.id)),
        }
    }
}

/// The read-only gate runs before any lookup or state change, for both
/// entry points.
fn read_only_guard(config: &Config) -> Result<(), SubmitError> {
    if config.scoring.read_only {
        return Err(SubmitError::ReadOnly);
    }
    Ok(())
}

/// Wire shape of a special submission response: the award list, or the
/// bare -6 legacy clients expect while the server is read-only.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SpecialReply {
    Awards(Vec<Award>),
    Sentinel(i32),
}

impl SpecialReply {
    pub fn from_result(result: Result<Vec<Award>, SubmitError>) -> Result<SpecialReply, SubmitError> {
        match result {
            Ok(awards) => Ok(SpecialReply::Awards(awards)),
            Err(SubmitError::ReadOnly) => Ok(SpecialReply::Sentinel(-6)),
            Err(err) => Err(err),
        }
    }
}

/// Plain submission: the secret is matched case-insensitively against
/// every flag that stores one.
pub fn submit(db: &Db, config: &Config, team: i32, flag: &str) -> Result<Vec<Award>, SubmitError> {
    read_only_guard(config)?;

    if flag.is_empty() {
        debug!("[team {:02}] No flag provided", team);
        return Err(SubmitError::NoFlag);
    }

    info!("[team {:02}] Submits flag: {}", team, flag);

    let candidates = db.flags_matching_secret(flag)?;
    if candidates.is_empty() {
        debug!("[team {:02}] Flag '{}' doesn't exist", team, flag);
        return Err(SubmitError::InvalidFlag);
    }

    score_candidates(db, config, team, candidates, flag, false)
}

/// Special submission: the code selects externally-validated flags and
/// the validator gets the final say on the submitted value.
pub fn submit_special(
    db: &Db,
    config: &Config,
    team: i32,
    code: &str,
    flag: &str,
) -> Result<Vec<Award>, SubmitError> {
    read_only_guard(config)?;

    if code.is_empty() {
        debug!("[team {:02}] No code provided", team);
        return Err(SubmitError::NoCode);
    }
    if flag.is_empty() {
        debug!("[team {:02}] No flag provided", team);
        return Err(SubmitError::NoFlag);
    }

    info!(
        "[team {:02}] Submits special flag for code: {} => {}",
        team, code, flag
    );

    let candidates = db.flags_matching_code(code)?;
    if candidates.is_empty() {
        debug!("[team {:02}] Code '{}' doesn't exist", team, code);
        return Err(SubmitError::InvalidCode);
    }

    score_candidates(db, config, team, candidates, flag, true)
}

/// Walk the candidates in order and score the first usable one. A failed
/// external validation moves on to the next candidate; exhaustion and
/// duplicates abort the whole submission.
fn score_candidates(
    db: &Db,
    config: &Config,
    team: i32,
    candidates: Vec<Flag>,
    submitted: &str,
    special: bool,
) -> Result<Vec<Award>, SubmitError> {
    for entry in candidates {
        match eligibility::check(db, team, &entry)? {
            Decision::Skip => continue,
            Decision::Exhausted => {
                debug!(
                    "[team {:02}] Flag '{}' has been exhausted",
                    team, submitted
                );
                return Err(SubmitError::Exhausted);
            }
            Decision::AlreadySubmitted => {
                debug!(
                    "[team {:02}] Flag '{}' was already submitted",
                    team, submitted
                );
                return Err(SubmitError::AlreadySubmitted);
            }
            Decision::Usable => {}
        }

        if special && !validate(config, &entry, team, submitted) {
            continue;
        }

        let score = match db.insert_score(&NewScore::submission(team, &entry)) {
            Ok(score) => score,
            // lost the race against a concurrent submission of the same
            // flag by the same team
            Err(DbError::DuplicateScore) => {
                debug!(
                    "[team {:02}] Flag '{}' was already submitted",
                    team, submitted
                );
                return Err(SubmitError::AlreadySubmitted);
            }
            Err(err) => return Err(err.into()),
        };

        info!(
            "[team {:02}] Scores {} points with flagid={}",
            team, score.value, score.flagid
        );

        notify::notify_score(config, team, &entry, &score);

        let mut awards = vec![Award::direct(&entry, &score)];
        awards.extend(triggers::process(db, config, team)?);

        return Ok(awards);
    }

    debug!(
        "[team {:02}] Flag '{}' exists but can't be used",
        team, submitted
    );
    Err(SubmitError::Unusable)
}

/// Run the flag's external validator with (team, code, submitted flag).
/// Exit status 0 accepts; anything else, including a timeout, rejects.
fn validate(config: &Config, flag: &Flag, team: i32, submitted: &str) -> bool {
    let validator = match &flag.validator {
        Some(validator) => validator,
        None => return false,
    };
    let code = flag.code.as_ref().map(String::as_str).unwrap_or("");

    let path = config.validator_dir.join(validator);
    let args = vec![team.to_string(), code.to_owned(), submitted.to_owned()];

    match util::run_with_timeout(&path, &args, Duration::from_secs(config.validator_timeout)) {
        Ok(status) if status.success() => true,
        Ok(status) => {
            debug!(
                "[team {:02}] Validator '{}' rejected the flag (status {:?})",
                team,
                validator,
                status.code()
            );
            false
        }
        Err(err) => {
            error!("Validator '{}' failed: {}", validator, err);
            false
        }
    }
}

/// Admin override: hand a flag to a team, at an arbitrary value if given.
/// Reuses the scoring transaction and runs the trigger pass like any
/// other score.
pub fn grant_flag(
    db: &Db,
    config: &Config,
    teamid: i32,
    flagid: i32,
    value: Option<i32>,
) -> Result<(), SubmitError> {
    if db.team_has_flag(teamid, flagid)? {
        return Err(SubmitError::AlreadySubmitted);
    }

    let flag = db
        .flag_by_id(flagid)?
        .ok_or(SubmitError::NoSuchFlag(flagid))?;

    let new_score = NewScore::with_value(teamid, flagid, value.unwrap_or(flag.value));
    let score = match db.insert_score(&new_score) {
        Ok(score) => score,
        Err(DbError::DuplicateScore) => return Err(SubmitError::AlreadySubmitted),
        Err(err) => return Err(err.into()),
    };

    info!(
        "[team {:02}] Scores {} points with flagid={} (admin)",
        teamid, score.value, score.flagid
    );

    notify::notify_score(config, teamid, &flag, &score);

    triggers::process(db, config, teamid)?;
    Ok(())
}

/// Admin override: grant the writeup bonus on an existing score.
pub fn grant_writeup(db: &Db, scoreid: i32, value: Option<i32>) -> Result<(), SubmitError> {
    let score = db
        .grant_writeup(scoreid, value)?
        .ok_or(SubmitError::NoSuchScore(scoreid))?;

    info!(
        "[team {:02}] Scores {} points with a writeup for flagid={} (admin)",
        score.teamid,
        score.writeup_value.unwrap_or(0),
        score.flagid
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn flag() -> Flag {
        Flag {
            id: 7,
            teamid: None,
            triggerid: None,
            code: None,
            flag: Some("flag{abc}".to_owned()),
            value: 50,
            writeup_value: Some(10),
            return_string: Some("well done".to_owned()),
            counter: None,
            validator: None,
            description: String::new(),
            tags: String::new(),
        }
    }

    fn score(id: i32) -> Score {
        Score {
            id,
            teamid: 3,
            flagid: 7,
            value: 50,
            writeup_value: None,
            submit_time: Utc::now().naive_utc(),
            writeup_time: None,
        }
    }

    #[test]
    fn direct_award_shape() {
        let award = Award::direct(&flag(), &score(42));
        let json = serde_json::to_value(&award).unwrap();

        assert_eq!(json["value"], 50);
        assert_eq!(json["return_string"], "well done");
        assert_eq!(json["writeup_string"], "WID42");
        // direct entries don't carry the trigger marker at all
        assert!(json.get("trigger").is_none());
    }

    #[test]
    fn bonus_award_shape() {
        let mut bonus_flag = flag();
        bonus_flag.writeup_value = None;
        bonus_flag.return_string = None;

        let award = Award::bonus(&bonus_flag, &score(43));
        let json = serde_json::to_value(&award).unwrap();

        assert_eq!(json["value"], 50);
        assert_eq!(json["trigger"], true);
        assert!(json.get("return_string").is_none());
        assert!(json.get("writeup_string").is_none());
    }

    #[test]
    fn zero_writeup_value_means_no_writeup_string() {
        let mut f = flag();
        f.writeup_value = Some(0);
        let award = Award::direct(&f, &score(1));
        assert!(award.writeup_string.is_none());
    }

    #[test]
    fn read_only_gate_runs_before_any_lookup() {
        let mut config = crate::Config::test_defaults();
        config.scoring.read_only = true;

        match read_only_guard(&config) {
            Err(SubmitError::ReadOnly) => {}
            other => panic!("expected the read-only rejection, got {:?}", other),
        }
        assert_eq!(SubmitError::ReadOnly.to_string(), "Server is read-only.");

        config.scoring.read_only = false;
        assert!(read_only_guard(&config).is_ok());
    }

    #[test]
    fn read_only_special_answers_with_the_sentinel() {
        let reply = SpecialReply::from_result(Err(SubmitError::ReadOnly)).unwrap();
        assert_eq!(serde_json::to_value(&reply).unwrap(), serde_json::json!(-6));

        // only read-only maps to the sentinel; other rejections keep
        // their error body
        assert!(SpecialReply::from_result(Err(SubmitError::NoCode)).is_err());

        let awards = vec![Award::direct(&flag(), &score(42))];
        let reply = SpecialReply::from_result(Ok(awards)).unwrap();
        let json = serde_json::to_value(&reply).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["value"], 50);
    }

    #[test]
    fn rejection_messages() {
        assert_eq!(
            SubmitError::Exhausted.to_string(),
            "Too late, the flag has been exhausted."
        );
        assert_eq!(
            SubmitError::AlreadySubmitted.to_string(),
            "The flag has already been submitted."
        );
        assert_eq!(SubmitError::NoSuchFlag(9).to_string(), "Couldn't find flagid=9");
        assert!(SubmitError::Db(DbError::DuplicateScore).is_internal());
        assert!(!SubmitError::Exhausted.is_internal());
    }
}
