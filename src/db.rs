use std::error::Error as StdError;
use std::sync::Arc;

use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::result::DatabaseErrorKind;
use diesel::result::Error as DieselError;
use diesel::sql_types::{Nullable, Text};
use diesel_migrations::RunMigrationsError;

use crate::models::{
    Flag, NewFlag, NewScore, NewTeam, NewTrigger, Score, Team, Trigger, UpdateFlag, UpdateScore,
    UpdateTeam, UpdateTrigger,
};

embed_migrations!("migrations");

sql_function!(fn lower(x: Nullable<Text>) -> Nullable<Text>);

#[derive(Clone)]
pub struct Db(Arc<Pool<ConnectionManager<PgConnection>>>);

struct DbConn(pub PooledConnection<ConnectionManager<PgConnection>>);

/// Team profile fields a team may fill in itself, once each.
#[derive(Clone, Copy, Debug)]
pub enum ProfileField {
    Name,
    Country,
    Website,
}

impl ProfileField {
    fn name(self) -> &'static str {
        match self {
            ProfileField::Name => "name",
            ProfileField::Country => "country",
            ProfileField::Website => "website",
        }
    }
}

#[derive(Debug, Display)]
pub enum DbError {
    Pool(r2d2::Error),
    GetConn(r2d2::Error),
    Migration(RunMigrationsError),
    LookupFlags(DieselError),
    LookupScores(DieselError),
    LookupTeams(DieselError),
    LookupTriggers(DieselError),
    InsertScore(DieselError),
    Insert(DieselError),
    Update(DieselError),
    Delete(DieselError),
    #[display(fmt = "duplicate score for (team, flag)")]
    DuplicateScore,
    #[display(fmt = "the entry is still referenced")]
    StillReferenced,
    #[display(fmt = "the '{}' field has already been set", _0)]
    ProfileFieldTaken(&'static str),
}

impl StdError for DbError {}

impl Db {
    pub fn connect(database_url: impl AsRef<str>) -> Result<Self, DbError> {
        let database_url = database_url.as_ref();
        let manager = ConnectionManager::new(database_url);
        let pool = Pool::new(manager).map_err(DbError::Pool)?;
        Ok(Db(Arc::new(pool)))
    }

    fn get_conn(&self) -> Result<DbConn, DbError> {
        self.0.get().map(DbConn).map_err(DbError::GetConn)
    }

    pub fn migrate(&self) -> Result<(), DbError> {
        let conn = self.get_conn()?;
        embedded_migrations::run(&conn.0).map_err(DbError::Migration)
    }

    // Submission lookups

    /// All flags whose secret matches, case-insensitively. Flags with a
    /// NULL secret (special flags) never match here.
    pub fn flags_matching_secret(&self, secret: impl AsRef<str>) -> Result<Vec<Flag>, DbError> {
        use crate::schema::flags::dsl;
        let conn = self.get_conn()?;
        dsl::flags
            .filter(lower(dsl::flag).eq(secret.as_ref().to_lowercase()))
            .load(&conn.0)
            .map_err(DbError::LookupFlags)
    }

    /// All special flags for a code: exact code match, no stored secret,
    /// with an external validator attached.
    pub fn flags_matching_code(&self, code: impl AsRef<str>) -> Result<Vec<Flag>, DbError> {
        use crate::schema::flags::dsl;
        let conn = self.get_conn()?;
        dsl::flags
            .filter(
                dsl::code
                    .eq(code.as_ref())
                    .and(dsl::flag.is_null())
                    .and(dsl::validator.is_not_null()),
            )
            .load(&conn.0)
            .map_err(DbError::LookupFlags)
    }

    pub fn flag_by_id(&self, flagid: i32) -> Result<Option<Flag>, DbError> {
        use crate::schema::flags::dsl;
        let conn = self.get_conn()?;
        dsl::flags
            .find(flagid)
            .first(&conn.0)
            .optional()
            .map_err(DbError::LookupFlags)
    }

    /// Submissions of a flag across all teams, for exhaustion counters.
    pub fn count_flag_scores(&self, flagid: i32) -> Result<i64, DbError> {
        use crate::schema::scores::dsl;
        let conn = self.get_conn()?;
        dsl::scores
            .filter(dsl::flagid.eq(flagid))
            .count()
            .get_result(&conn.0)
            .map_err(DbError::LookupScores)
    }

    pub fn team_has_flag(&self, teamid: i32, flagid: i32) -> Result<bool, DbError> {
        use crate::schema::scores::dsl;
        use diesel::dsl::exists;
        let conn = self.get_conn()?;
        diesel::select(exists(
            dsl::scores.filter(dsl::teamid.eq(teamid).and(dsl::flagid.eq(flagid))),
        ))
        .get_result(&conn.0)
        .map_err(DbError::LookupScores)
    }

    /// The scoring transaction: insert one score row and commit it. Only
    /// a durable commit returns `Ok`. A concurrent duplicate for the same
    /// (team, flag) pair trips the unique index and comes back as
    /// `DbError::DuplicateScore`.
    pub fn insert_score(&self, new_score: &NewScore) -> Result<Score, DbError> {
        use crate::schema::scores;
        let conn = self.get_conn()?;
        diesel::insert_into(scores::table)
            .values(new_score)
            .get_result(&conn.0)
            .map_err(|err| match err {
                DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                    DbError::DuplicateScore
                }
                err => DbError::InsertScore(err),
            })
    }

    // Trigger evaluation

    pub fn all_triggers(&self) -> Result<Vec<Trigger>, DbError> {
        use crate::schema::triggers::dsl;
        let conn = self.get_conn()?;
        dsl::triggers
            .order(dsl::id.asc())
            .load(&conn.0)
            .map_err(DbError::LookupTriggers)
    }

    /// The flags whose values count toward a trigger's threshold.
    pub fn trigger_source_flags(&self, triggerid: i32) -> Result<Vec<Flag>, DbError> {
        use crate::schema::flags::dsl;
        let conn = self.get_conn()?;
        dsl::flags
            .filter(dsl::triggerid.eq(triggerid))
            .load(&conn.0)
            .map_err(DbError::LookupFlags)
    }

    /// Sum of a team's score values restricted to the given flags.
    pub fn team_score_sum(&self, teamid: i32, flag_ids: &[i32]) -> Result<i64, DbError> {
        use crate::schema::scores::dsl;
        use diesel::dsl::sum;
        let conn = self.get_conn()?;
        dsl::scores
            .filter(dsl::teamid.eq(teamid).and(dsl::flagid.eq_any(flag_ids)))
            .select(sum(dsl::value))
            .get_result::<Option<i64>>(&conn.0)
            .map(|total| total.unwrap_or(0))
            .map_err(DbError::LookupScores)
    }

    // Aggregation reads

    pub fn all_teams(&self) -> Result<Vec<Team>, DbError> {
        use crate::schema::teams::dsl;
        let conn = self.get_conn()?;
        dsl::teams
            .order(dsl::id.asc())
            .load(&conn.0)
            .map_err(DbError::LookupTeams)
    }

    pub fn all_flags(&self) -> Result<Vec<Flag>, DbError> {
        use crate::schema::flags::dsl;
        let conn = self.get_conn()?;
        dsl::flags
            .order(dsl::id.asc())
            .load(&conn.0)
            .map_err(DbError::LookupFlags)
    }

    pub fn all_scores(&self) -> Result<Vec<Score>, DbError> {
        use crate::schema::scores::dsl;
        let conn = self.get_conn()?;
        dsl::scores
            .order(dsl::id.asc())
            .load(&conn.0)
            .map_err(DbError::LookupScores)
    }

    /// All scores in submission order, oldest first.
    pub fn scores_by_submit_time(&self) -> Result<Vec<Score>, DbError> {
        use crate::schema::scores::dsl;
        let conn = self.get_conn()?;
        dsl::scores
            .order(dsl::submit_time.asc())
            .load(&conn.0)
            .map_err(DbError::LookupScores)
    }

    pub fn team_scores(&self, teamid: i32) -> Result<Vec<Score>, DbError> {
        use crate::schema::scores::dsl;
        let conn = self.get_conn()?;
        dsl::scores
            .filter(dsl::teamid.eq(teamid))
            .load(&conn.0)
            .map_err(DbError::LookupScores)
    }

    // Writeups

    /// Grant the writeup bonus on an existing score. `None` means no such
    /// score. Without an explicit value, the flag's writeup value is used.
    pub fn grant_writeup(
        &self,
        scoreid: i32,
        value: Option<i32>,
    ) -> Result<Option<Score>, DbError> {
        use crate::schema::scores::dsl;
        let conn = self.get_conn()?;

        let score: Score = match dsl::scores
            .find(scoreid)
            .first(&conn.0)
            .optional()
            .map_err(DbError::LookupScores)?
        {
            Some(score) => score,
            None => return Ok(None),
        };

        let value = match value {
            Some(value) => Some(value),
            None => self
                .flag_by_id(score.flagid)?
                .and_then(|flag| flag.writeup_value),
        };

        diesel::update(dsl::scores.find(scoreid))
            .set((
                dsl::writeup_value.eq(value),
                dsl::writeup_time.eq(chrono::Utc::now().naive_utc()),
            ))
            .get_result(&conn.0)
            .map(Some)
            .map_err(DbError::Update)
    }

    // Team self-setup

    /// Set one of the team-editable profile fields, but only while it is
    /// still empty. No overwrite of an already-set field.
    pub fn set_team_field_once(
        &self,
        teamid: i32,
        field: ProfileField,
        value: &str,
    ) -> Result<(), DbError> {
        use crate::schema::teams::dsl;
        let conn = self.get_conn()?;

        let rows = match field {
            ProfileField::Name => {
                diesel::update(dsl::teams.filter(dsl::id.eq(teamid).and(dsl::name.eq(""))))
                    .set(dsl::name.eq(value))
                    .execute(&conn.0)
            }
            ProfileField::Country => {
                diesel::update(dsl::teams.filter(dsl::id.eq(teamid).and(dsl::country.eq(""))))
                    .set(dsl::country.eq(value))
                    .execute(&conn.0)
            }
            ProfileField::Website => {
                diesel::update(dsl::teams.filter(dsl::id.eq(teamid).and(dsl::website.eq(""))))
                    .set(dsl::website.eq(value))
                    .execute(&conn.0)
            }
        }
        .map_err(DbError::Update)?;

        if rows == 0 {
            return Err(DbError::ProfileFieldTaken(field.name()));
        }
        Ok(())
    }

    // Admin CRUD. The ids are assigned by the database; callers never get
    // to pick them.

    pub fn flags_add(&self, entry: &NewFlag) -> Result<Flag, DbError> {
        use crate::schema::flags;
        let conn = self.get_conn()?;
        diesel::insert_into(flags::table)
            .values(entry)
            .get_result(&conn.0)
            .map_err(DbError::Insert)
    }

    pub fn flags_update(&self, flagid: i32, entry: &UpdateFlag) -> Result<usize, DbError> {
        use crate::schema::flags::dsl;
        let conn = self.get_conn()?;
        diesel::update(dsl::flags.find(flagid))
            .set(entry)
            .execute(&conn.0)
            .map_err(DbError::Update)
    }

    pub fn flags_delete(&self, flagid: i32) -> Result<usize, DbError> {
        use crate::schema::flags::dsl;
        let conn = self.get_conn()?;
        diesel::delete(dsl::flags.find(flagid))
            .execute(&conn.0)
            .map_err(delete_error)
    }

    pub fn teams_add(&self, entry: &NewTeam) -> Result<Team, DbError> {
        use crate::schema::teams;
        let conn = self.get_conn()?;
        diesel::insert_into(teams::table)
            .values(entry)
            .get_result(&conn.0)
            .map_err(DbError::Insert)
    }

    pub fn teams_update(&self, teamid: i32, entry: &UpdateTeam) -> Result<usize, DbError> {
        use crate::schema::teams::dsl;
        let conn = self.get_conn()?;
        diesel::update(dsl::teams.find(teamid))
            .set(entry)
            .execute(&conn.0)
            .map_err(DbError::Update)
    }

    pub fn teams_delete(&self, teamid: i32) -> Result<usize, DbError> {
        use crate::schema::teams::dsl;
        let conn = self.get_conn()?;
        diesel::delete(dsl::teams.find(teamid))
            .execute(&conn.0)
            .map_err(delete_error)
    }

    pub fn triggers_add(&self, entry: &NewTrigger) -> Result<Trigger, DbError> {
        use crate::schema::triggers;
        let conn = self.get_conn()?;
        diesel::insert_into(triggers::table)
            .values(entry)
            .get_result(&conn.0)
            .map_err(DbError::Insert)
    }

    pub fn triggers_update(&self, triggerid: i32, entry: &UpdateTrigger) -> Result<usize, DbError> {
        use crate::schema::triggers::dsl;
        let conn = self.get_conn()?;
        diesel::update(dsl::triggers.find(triggerid))
            .set(entry)
            .execute(&conn.0)
            .map_err(DbError::Update)
    }

    pub fn triggers_delete(&self, triggerid: i32) -> Result<usize, DbError> {
        use crate::schema::triggers::dsl;
        let conn = self.get_conn()?;
        diesel::delete(dsl::triggers.find(triggerid))
            .execute(&conn.0)
            .map_err(delete_error)
    }

    pub fn scores_add(&self, entry: &NewScore) -> Result<Score, DbError> {
        use crate::schema::scores;
        let conn = self.get_conn()?;
        diesel::insert_into(scores::table)
            .values(entry)
            .get_result(&conn.0)
            .map_err(|err| match err {
                DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                    DbError::DuplicateScore
                }
                err => DbError::Insert(err),
            })
    }

    pub fn scores_update(&self, scoreid: i32, entry: &UpdateScore) -> Result<usize, DbError> {
        use crate::schema::scores::dsl;
        let conn = self.get_conn()?;
        diesel::update(dsl::scores.find(scoreid))
            .set(entry)
            .execute(&conn.0)
            .map_err(DbError::Update)
    }

    pub fn scores_delete(&self, scoreid: i32) -> Result<usize, DbError> {
        use crate::schema::scores::dsl;
        let conn = self.get_conn()?;
        diesel::delete(dsl::scores.find(scoreid))
            .execute(&conn.0)
            .map_err(delete_error)
    }
}

/// Deletes are RESTRICTed by the foreign keys, so a referenced row comes
/// back as `StillReferenced` instead of a generic store failure.
fn delete_error(err: DieselError) -> DbError {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) => {
            DbError::StillReferenced
        }
        err => DbError::Delete(err),
    }
}
