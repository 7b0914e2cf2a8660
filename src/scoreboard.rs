//! Read-only projections over teams/flags/scores: the scoreboard, the
//! submission timeline, per-team progress and a team's own submissions.
//! Nothing in here mutates state.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::error::Error as StdError;

use chrono::NaiveDateTime;

use crate::access::AuthContext;
use crate::config::Config;
use crate::db::{Db, DbError};
use crate::models::{Flag, Score, Team};

/// How much of other teams' scores a caller gets to see.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Visibility {
    Full,
    /// Only this team's contributions count; everyone else shows zero.
    Own(i32),
    /// Hide-others with no team identity: all zeroes.
    Hidden,
}

pub fn visibility(config: &Config, viewer: &AuthContext) -> Visibility {
    if !config.scoring.hide_others {
        return Visibility::Full;
    }

    match viewer {
        AuthContext::Admin => Visibility::Full,
        AuthContext::Team(team) => Visibility::Own(*team),
        AuthContext::Guest => Visibility::Hidden,
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScoreboardEntry {
    pub teamid: i32,
    pub team_name: String,
    pub team_country: String,
    pub team_website: String,
    pub score: i64,
    pub score_flags: i64,
    pub score_writeups: i64,
}

pub fn scoreboard(
    db: &Db,
    config: &Config,
    viewer: &AuthContext,
) -> Result<Vec<ScoreboardEntry>, DbError> {
    let teams = db.all_teams()?;
    let scores = db.all_scores()?;
    Ok(build_scoreboard(
        &teams,
        &scores,
        config.scoring.writeups,
        visibility(config, viewer),
    ))
}

/// Totals per configured team, sorted by score descending with team id
/// as the tie-breaker so equal totals always list in the same order.
pub fn build_scoreboard(
    teams: &[Team],
    scores: &[Score],
    writeups: bool,
    visibility: Visibility,
) -> Vec<ScoreboardEntry> {
    let mut entries: Vec<ScoreboardEntry> = teams
        .iter()
        .filter(|team| team.is_configured())
        .map(|team| ScoreboardEntry {
            teamid: team.id,
            team_name: team.name.clone(),
            team_country: team.country.clone(),
            team_website: team.website.clone(),
            score: 0,
            score_flags: 0,
            score_writeups: 0,
        })
        .collect();

    let index: HashMap<i32, usize> = entries
        .iter()
        .enumerate()
        .map(|(i, entry)| (entry.teamid, i))
        .collect();

    for score in scores {
        let counted = match visibility {
            Visibility::Full => true,
            Visibility::Own(team) => score.teamid == team,
            Visibility::Hidden => false,
        };
        if !counted {
            continue;
        }

        let entry = match index.get(&score.teamid) {
            Some(&i) => &mut entries[i],
            None => continue,
        };

        entry.score += i64::from(score.value);
        entry.score_flags += i64::from(score.value);
        if writeups {
            if let Some(writeup) = score.writeup_value {
                entry.score += i64::from(writeup);
                entry.score_writeups += i64::from(writeup);
            }
        }
    }

    entries.sort_by(|a, b| b.score.cmp(&a.score).then(a.teamid.cmp(&b.teamid)));
    entries
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TimelineEntry {
    pub teamid: i32,
    pub submit_time: NaiveDateTime,
    pub value: i32,
}

pub fn timeline(
    db: &Db,
    config: &Config,
    viewer: &AuthContext,
) -> Result<Vec<TimelineEntry>, DbError> {
    let teams = db.all_teams()?;
    let scores = db.scores_by_submit_time()?;
    Ok(build_timeline(&teams, &scores, visibility(config, viewer)))
}

/// Chronological score feed, restricted to configured teams. Under
/// hide-others a team only sees its own rows, guests see none.
pub fn build_timeline(teams: &[Team], scores: &[Score], visibility: Visibility) -> Vec<TimelineEntry> {
    let configured: HashSet<i32> = teams
        .iter()
        .filter(|team| team.is_configured())
        .map(|team| team.id)
        .collect();

    scores
        .iter()
        .filter(|score| configured.contains(&score.teamid))
        .filter(|score| match visibility {
            Visibility::Full => true,
            Visibility::Own(team) => score.teamid == team,
            Visibility::Hidden => false,
        })
        .map(|score| TimelineEntry {
            teamid: score.teamid,
            submit_time: score.submit_time,
            value: score.value,
        })
        .collect()
}

#[derive(Debug, Display)]
pub enum ProgressError {
    #[display(fmt = "Overall progress queries are disabled.")]
    OverallDisabled,
    #[display(fmt = "Progress isn't available for the '{}' namespace.", _0)]
    DisallowedNamespace(String),
    Db(DbError),
}

impl StdError for ProgressError {}

impl From<DbError> for ProgressError {
    fn from(err: DbError) -> ProgressError {
        ProgressError::Db(err)
    }
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Progress {
    Overall(f64),
    PerTag(BTreeMap<String, f64>),
}

/// Percentage of available points the team has earned, either overall
/// (feature-gated) or per requested tag (namespace-gated).
pub fn progress(
    db: &Db,
    config: &Config,
    team: i32,
    tags: &[String],
) -> Result<Progress, ProgressError> {
    authorize_tags(config, tags)?;

    let flags = db.all_flags()?;
    let scores = db.team_scores(team)?;
    Ok(compute_progress(team, &flags, &scores, tags))
}

/// A tag-less query asks for overall progress, which is its own feature
/// flag; tagged queries are limited to the configured namespaces (the
/// part of the tag before ':').
fn authorize_tags(config: &Config, tags: &[String]) -> Result<(), ProgressError> {
    if tags.is_empty() {
        if !config.scoring.progress {
            return Err(ProgressError::OverallDisabled);
        }
        return Ok(());
    }

    for tag in tags {
        let namespace = tag.splitn(2, ':').next().unwrap_or("");
        if !config
            .scoring
            .progress_namespaces
            .iter()
            .any(|allowed| allowed == namespace)
        {
            return Err(ProgressError::DisallowedNamespace(namespace.to_owned()));
        }
    }
    Ok(())
}

pub fn compute_progress(team: i32, flags: &[Flag], scores: &[Score], tags: &[String]) -> Progress {
    let eligible: Vec<&Flag> = flags
        .iter()
        .filter(|flag| flag.teamid.map(|owner| owner == team).unwrap_or(true))
        .collect();

    if tags.is_empty() {
        return Progress::Overall(ratio(&eligible, scores));
    }

    let per_tag = tags
        .iter()
        .map(|tag| {
            let tagged: Vec<&Flag> = eligible
                .iter()
                .filter(|flag| flag.has_tag(tag))
                .cloned()
                .collect();
            (tag.clone(), ratio(&tagged, scores))
        })
        .collect();
    Progress::PerTag(per_tag)
}

fn ratio(flags: &[&Flag], scores: &[Score]) -> f64 {
    let total: i64 = flags.iter().map(|flag| i64::from(flag.value)).sum();
    if total == 0 {
        // nothing available yet, not a division error
        return 0.0;
    }

    let ids: HashSet<i32> = flags.iter().map(|flag| flag.id).collect();
    let obtained: i64 = scores
        .iter()
        .filter(|score| ids.contains(&score.flagid))
        .map(|score| i64::from(score.value))
        .sum();

    obtained as f64 * 100.0 / total as f64
}

#[derive(Clone, Debug, Serialize)]
pub struct SubmittedEntry {
    pub flagid: i32,
    pub value: i32,
    pub submit_time: NaiveDateTime,
    pub writeup_value: i32,
    pub writeup_submit_time: Option<NaiveDateTime>,
    pub writeup_string: String,
    pub return_string: Option<String>,
}

/// A team's own submissions with any hints they unlocked, sorted by
/// flag id. Writeup points only show when the feature is on.
pub fn list_submitted(db: &Db, config: &Config, team: i32) -> Result<Vec<SubmittedEntry>, DbError> {
    let flags: HashMap<i32, Flag> = db
        .all_flags()?
        .into_iter()
        .map(|flag| (flag.id, flag))
        .collect();

    let mut entries = Vec::new();
    for score in db.team_scores(team)? {
        let flag = match flags.get(&score.flagid) {
            Some(flag) => flag,
            None => {
                warn!("Score {} references missing flagid={}", score.id, score.flagid);
                continue;
            }
        };

        let writeup_string = match flag.writeup_value {
            Some(value) if value != 0 => format!("WID{}", score.id),
            _ => String::new(),
        };

        entries.push(SubmittedEntry {
            flagid: score.flagid,
            value: score.value,
            submit_time: score.submit_time,
            writeup_value: if config.scoring.writeups {
                score.writeup_value.unwrap_or(0)
            } else {
                0
            },
            writeup_submit_time: score.writeup_time,
            writeup_string,
            return_string: flag.return_string.clone(),
        });
    }

    entries.sort_by_key(|entry| entry.flagid);
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn team(id: i32, name: &str) -> Team {
        Team {
            id,
            name: name.to_owned(),
            country: "CA".to_owned(),
            website: String::new(),
            subnets: String::new(),
            notes: String::new(),
        }
    }

    fn time(secs: u32) -> NaiveDateTime {
        NaiveDate::from_ymd(2019, 5, 17).and_hms(12, 0, secs)
    }

    fn score(id: i32, teamid: i32, flagid: i32, value: i32, secs: u32) -> Score {
        Score {
            id,
            teamid,
            flagid,
            value,
            writeup_value: None,
            submit_time: time(secs),
            writeup_time: None,
        }
    }

    fn flag(id: i32, teamid: Option<i32>, value: i32, tags: &str) -> Flag {
        Flag {
            id,
            teamid,
            triggerid: None,
            code: None,
            flag: Some(format!("flag{{{}}}", id)),
            value,
            writeup_value: None,
            return_string: None,
            counter: None,
            validator: None,
            description: String::new(),
            tags: tags.to_owned(),
        }
    }

    #[test]
    fn scoreboard_ordering_and_ties() {
        let teams = vec![
            team(1, "alpha"),
            team(2, "bravo"),
            team(3, "charlie"),
            team(4, "delta"),
        ];
        let scores = vec![
            score(1, 1, 1, 50, 0),
            score(2, 2, 2, 80, 1),
            score(3, 3, 3, 80, 2),
        ];

        let board = build_scoreboard(&teams, &scores, false, Visibility::Full);
        let order: Vec<i32> = board.iter().map(|e| e.teamid).collect();
        // both 80s first (tie broken by id), then 50, then 0
        assert_eq!(order, vec![2, 3, 1, 4]);
    }

    #[test]
    fn unconfigured_teams_are_excluded() {
        let teams = vec![team(1, "alpha"), team(2, "")];
        let scores = vec![score(1, 2, 1, 100, 0)];

        let board = build_scoreboard(&teams, &scores, false, Visibility::Full);
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].teamid, 1);
    }

    #[test]
    fn writeups_only_count_when_enabled() {
        let teams = vec![team(1, "alpha")];
        let mut s = score(1, 1, 1, 50, 0);
        s.writeup_value = Some(25);
        let scores = vec![s];

        let off = build_scoreboard(&teams, &scores, false, Visibility::Full);
        assert_eq!(off[0].score, 50);
        assert_eq!(off[0].score_writeups, 0);

        let on = build_scoreboard(&teams, &scores, true, Visibility::Full);
        assert_eq!(on[0].score, 75);
        assert_eq!(on[0].score_flags, 50);
        assert_eq!(on[0].score_writeups, 25);
    }

    #[test]
    fn hide_others_for_guests() {
        let teams = vec![team(1, "alpha"), team(2, "bravo")];
        let scores = vec![score(1, 1, 1, 50, 0), score(2, 2, 2, 80, 1)];

        let board = build_scoreboard(&teams, &scores, false, Visibility::Hidden);
        assert_eq!(board.len(), 2);
        assert!(board.iter().all(|entry| entry.score == 0));
        // identity fields stay visible
        assert!(board.iter().any(|entry| entry.team_name == "alpha"));
    }

    #[test]
    fn hide_others_for_a_team() {
        let teams = vec![team(1, "alpha"), team(2, "bravo")];
        let scores = vec![score(1, 1, 1, 50, 0), score(2, 2, 2, 80, 1)];

        let board = build_scoreboard(&teams, &scores, false, Visibility::Own(1));
        let alpha = board.iter().find(|e| e.teamid == 1).unwrap();
        let bravo = board.iter().find(|e| e.teamid == 2).unwrap();
        assert_eq!(alpha.score, 50);
        assert_eq!(bravo.score, 0);
    }

    #[test]
    fn timeline_is_chronological_and_filtered() {
        let teams = vec![team(1, "alpha"), team(2, "")];
        let scores = vec![
            score(1, 1, 1, 10, 0),
            score(2, 2, 2, 20, 1),
            score(3, 1, 3, 30, 2),
        ];

        let full = build_timeline(&teams, &scores, Visibility::Full);
        // team 2 is unconfigured
        assert_eq!(full.len(), 2);
        assert!(full[0].submit_time < full[1].submit_time);

        let own = build_timeline(&teams, &scores, Visibility::Own(1));
        assert_eq!(own.len(), 2);

        let hidden = build_timeline(&teams, &scores, Visibility::Hidden);
        assert!(hidden.is_empty());
    }

    #[test]
    fn progress_zero_denominator() {
        let progress = compute_progress(1, &[], &[], &[]);
        assert_eq!(progress, Progress::Overall(0.0));
    }

    #[test]
    fn progress_counts_only_eligible_flags() {
        let flags = vec![
            flag(1, None, 50, ""),
            flag(2, Some(1), 50, ""),
            // another team's flag, not in team 1's denominator
            flag(3, Some(2), 900, ""),
        ];
        let scores = vec![score(1, 1, 1, 50, 0)];

        let progress = compute_progress(1, &flags, &scores, &[]);
        assert_eq!(progress, Progress::Overall(50.0));
    }

    #[test]
    fn progress_per_tag() {
        let flags = vec![
            flag(1, None, 40, "cat:web"),
            flag(2, None, 60, "cat:web, cat:crypto"),
            flag(3, None, 100, "cat:crypto"),
        ];
        let scores = vec![score(1, 1, 1, 40, 0), score(2, 1, 2, 60, 1)];

        let tags = vec!["cat:web".to_owned(), "cat:crypto".to_owned()];
        match compute_progress(1, &flags, &scores, &tags) {
            Progress::PerTag(map) => {
                assert_eq!(map["cat:web"], 100.0);
                assert_eq!(map["cat:crypto"], 37.5);
            }
            other => panic!("expected per-tag progress, got {:?}", other),
        }
    }

    #[test]
    fn tag_namespace_gating() {
        let mut config = crate::Config::test_defaults();
        config.scoring.progress_namespaces = vec!["cat".to_owned()];

        let web = vec!["cat:web".to_owned()];
        assert!(authorize_tags(&config, &web).is_ok());

        let other = vec!["cat:web".to_owned(), "internal:x".to_owned()];
        match authorize_tags(&config, &other) {
            Err(ProgressError::DisallowedNamespace(ns)) => assert_eq!(ns, "internal"),
            other => panic!("expected a namespace rejection, got {:?}", other),
        }
    }

    #[test]
    fn overall_progress_is_feature_gated() {
        let mut config = crate::Config::test_defaults();
        match authorize_tags(&config, &[]) {
            Err(ProgressError::OverallDisabled) => {}
            other => panic!("expected overall to be disabled, got {:?}", other),
        }

        config.scoring.progress = true;
        assert!(authorize_tags(&config, &[]).is_ok());
    }

    #[test]
    fn visibility_modes() {
        let mut config = crate::Config::test_defaults();
        assert_eq!(
            visibility(&config, &AuthContext::Guest),
            Visibility::Full
        );

        config.scoring.hide_others = true;
        assert_eq!(
            visibility(&config, &AuthContext::Guest),
            Visibility::Hidden
        );
        assert_eq!(
            visibility(&config, &AuthContext::Team(3)),
            Visibility::Own(3)
        );
        assert_eq!(visibility(&config, &AuthContext::Admin), Visibility::Full);
    }
}
