//! Threshold triggers: bonus flags awarded once a team's cumulative
//! points across a trigger's source flags cross a line.

use crate::config::Config;
use crate::db::{Db, DbError};
use crate::models::NewScore;
use crate::notify;
use crate::submit::Award;

/// A bonus can itself push another trigger over its threshold, so
/// evaluation loops until a pass awards nothing. The cap only exists to
/// guarantee termination on pathological trigger graphs.
const MAX_PASSES: usize = 5;

/// Re-check every trigger the team hasn't earned yet and award any whose
/// threshold is now met. Called after every committed score.
pub fn process(db: &Db, config: &Config, team: i32) -> Result<Vec<Award>, DbError> {
    let mut awards = Vec::new();

    for _ in 0..MAX_PASSES {
        let pass = run_pass(db, config, team)?;
        if pass.is_empty() {
            break;
        }
        awards.extend(pass);
    }

    Ok(awards)
}

fn run_pass(db: &Db, config: &Config, team: i32) -> Result<Vec<Award>, DbError> {
    let mut awards = Vec::new();

    for trigger in db.all_triggers()? {
        // already earned the bonus
        if db.team_has_flag(team, trigger.flagid)? {
            continue;
        }

        let sources = db.trigger_source_flags(trigger.id)?;
        let total: i64 = sources.iter().map(|flag| i64::from(flag.value)).sum();

        let threshold = match parse_threshold(&trigger.count, total) {
            Some(threshold) => threshold,
            None => {
                error!("Invalid 'count' field for trigger: {}", trigger.id);
                continue;
            }
        };

        let source_ids: Vec<i32> = sources.iter().map(|flag| flag.id).collect();
        let team_count = db.team_score_sum(team, &source_ids)?;
        if (team_count as f64) < threshold {
            continue;
        }

        let bonus_flag = match db.flag_by_id(trigger.flagid)? {
            Some(flag) => flag,
            None => {
                error!(
                    "Trigger {} references missing flagid={}",
                    trigger.id, trigger.flagid
                );
                continue;
            }
        };

        let score = match db.insert_score(&NewScore::submission(team, &bonus_flag)) {
            Ok(score) => score,
            // a concurrent evaluation got there first, the bonus stands
            Err(DbError::DuplicateScore) => continue,
            Err(err) => return Err(err),
        };

        info!(
            "[team {:02}] Scores {} points with flagid={} (trigger)",
            team, score.value, score.flagid
        );

        // a bonus is a scoring event like any other
        notify::notify_score(config, team, &bonus_flag, &score);

        awards.push(Award::bonus(&bonus_flag, &score));
    }

    Ok(awards)
}

/// A trigger's `count` is either an absolute number of points or a
/// percentage of the source flags' total value. Anything else is a
/// misconfiguration and yields `None`.
pub fn parse_threshold(count: &str, total: i64) -> Option<f64> {
    let count = count.trim();
    if count.is_empty() {
        return None;
    }

    if count.chars().all(|c| c.is_ascii_digit()) {
        return count.parse::<i64>().ok().map(|points| points as f64);
    }

    if count.contains('%') {
        let pct = count.replace('%', "");
        let pct = pct.trim();
        if !pct.is_empty() && pct.chars().all(|c| c.is_ascii_digit()) {
            return pct
                .parse::<i64>()
                .ok()
                .map(|pct| total as f64 / 100.0 * pct as f64);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_threshold() {
        assert_eq!(parse_threshold("100", 60), Some(100.0));
        assert_eq!(parse_threshold(" 30 ", 60), Some(30.0));
    }

    #[test]
    fn percent_threshold() {
        // source flags worth 60 in total, half of that is 30
        assert_eq!(parse_threshold("50%", 60), Some(30.0));
        assert_eq!(parse_threshold("100%", 60), Some(60.0));
        assert_eq!(parse_threshold("10%", 45), Some(4.5));
    }

    #[test]
    fn misconfigured_thresholds() {
        assert_eq!(parse_threshold("", 60), None);
        assert_eq!(parse_threshold("half", 60), None);
        assert_eq!(parse_threshold("-5", 60), None);
        assert_eq!(parse_threshold("%", 60), None);
        assert_eq!(parse_threshold("1.5", 60), None);
    }

    #[test]
    fn threshold_boundary() {
        let threshold = parse_threshold("50%", 60).unwrap();
        assert!((29 as f64) < threshold);
        assert!((30 as f64) >= threshold);
    }
}
