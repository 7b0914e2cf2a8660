//! Admin CRUD over the four tables. Add payloads reject unknown keys
//! (including `id`, which the database assigns), updates go through the
//! per-entity changeset allowlists, and update/delete must match exactly
//! one row.

use warp::{reject::custom as reject, Filter, Rejection};

use crate::db::{Db, DbError};
use crate::models::{
    NewFlag, NewScore, NewTeam, NewTrigger, UpdateFlag, UpdateScore, UpdateTeam, UpdateTrigger,
};

use super::{auth, Error};

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct UpdateForm<T> {
    id: i32,
    entry: T,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct DeleteForm {
    id: i32,
}

fn exactly_one(rows: usize, id: i32) -> Result<impl warp::Reply, Rejection> {
    if rows == 0 {
        return Err(reject(Error::BadRequest(format!(
            "Can't find a match for id={}",
            id
        ))));
    }
    Ok::<_, Rejection>(warp::reply::json(&true))
}

fn nothing_to_update() -> Rejection {
    reject(Error::BadRequest("Nothing to update.".to_owned()))
}

fn store_error(err: DbError) -> Rejection {
    match err {
        DbError::StillReferenced => reject(Error::BadRequest(
            "The entry is still referenced and can't be deleted.".to_owned(),
        )),
        DbError::DuplicateScore => reject(Error::BadRequest(
            "That (team, flag) pair already has a score.".to_owned(),
        )),
        err => reject(Error::Db(err)),
    }
}

// Flags

pub fn list_flags() -> Resp!() {
    warp::ext::get::<Db>()
        .and(auth::admin())
        .and_then(|db: Db| {
            let flags = db.all_flags().map_err(Error::Db).map_err(reject)?;
            Ok::<_, Rejection>(warp::reply::json(&flags))
        })
        .boxed()
}

pub fn add_flag() -> Resp!() {
    warp::ext::get::<Db>()
        .and(auth::admin())
        .and(warp::body::json())
        .and_then(|db: Db, entry: NewFlag| {
            let flag = db.flags_add(&entry).map_err(store_error)?;
            info!("Added flagid={}", flag.id);
            Ok::<_, Rejection>(warp::reply::json(&flag))
        })
        .boxed()
}

pub fn update_flag() -> Resp!() {
    warp::ext::get::<Db>()
        .and(auth::admin())
        .and(warp::body::json())
        .and_then(|db: Db, form: UpdateForm<UpdateFlag>| {
            if form.entry.is_empty() {
                return Err(nothing_to_update());
            }
            let rows = db.flags_update(form.id, &form.entry).map_err(store_error)?;
            exactly_one(rows, form.id)
        })
        .boxed()
}

pub fn delete_flag() -> Resp!() {
    warp::ext::get::<Db>()
        .and(auth::admin())
        .and(warp::body::json())
        .and_then(|db: Db, form: DeleteForm| {
            let rows = db.flags_delete(form.id).map_err(store_error)?;
            exactly_one(rows, form.id)
        })
        .boxed()
}

// Teams

pub fn list_teams() -> Resp!() {
    warp::ext::get::<Db>()
        .and(auth::admin())
        .and_then(|db: Db| {
            let teams = db.all_teams().map_err(Error::Db).map_err(reject)?;
            Ok::<_, Rejection>(warp::reply::json(&teams))
        })
        .boxed()
}

pub fn add_team() -> Resp!() {
    warp::ext::get::<Db>()
        .and(auth::admin())
        .and(warp::body::json())
        .and_then(|db: Db, entry: NewTeam| {
            let team = db.teams_add(&entry).map_err(store_error)?;
            info!("Added teamid={}", team.id);
            Ok::<_, Rejection>(warp::reply::json(&team))
        })
        .boxed()
}

pub fn update_team() -> Resp!() {
    warp::ext::get::<Db>()
        .and(auth::admin())
        .and(warp::body::json())
        .and_then(|db: Db, form: UpdateForm<UpdateTeam>| {
            if form.entry.is_empty() {
                return Err(nothing_to_update());
            }
            let rows = db.teams_update(form.id, &form.entry).map_err(store_error)?;
            exactly_one(rows, form.id)
        })
        .boxed()
}

pub fn delete_team() -> Resp!() {
    warp::ext::get::<Db>()
        .and(auth::admin())
        .and(warp::body::json())
        .and_then(|db: Db, form: DeleteForm| {
            let rows = db.teams_delete(form.id).map_err(store_error)?;
            exactly_one(rows, form.id)
        })
        .boxed()
}

// Triggers

pub fn list_triggers() -> Resp!() {
    warp::ext::get::<Db>()
        .and(auth::admin())
        .and_then(|db: Db| {
            let triggers = db.all_triggers().map_err(Error::Db).map_err(reject)?;
            Ok::<_, Rejection>(warp::reply::json(&triggers))
        })
        .boxed()
}

pub fn add_trigger() -> Resp!() {
    warp::ext::get::<Db>()
        .and(auth::admin())
        .and(warp::body::json())
        .and_then(|db: Db, entry: NewTrigger| {
            let trigger = db.triggers_add(&entry).map_err(store_error)?;
            info!("Added triggerid={}", trigger.id);
            Ok::<_, Rejection>(warp::reply::json(&trigger))
        })
        .boxed()
}

pub fn update_trigger() -> Resp!() {
    warp::ext::get::<Db>()
        .and(auth::admin())
        .and(warp::body::json())
        .and_then(
            |db: Db, form: UpdateForm<UpdateTrigger>| {
                if form.entry.is_empty() {
                    return Err(nothing_to_update());
                }
                let rows = db
                    .triggers_update(form.id, &form.entry)
                    .map_err(store_error)?;
                exactly_one(rows, form.id)
            },
        )
        .boxed()
}

pub fn delete_trigger() -> Resp!() {
    warp::ext::get::<Db>()
        .and(auth::admin())
        .and(warp::body::json())
        .and_then(|db: Db, form: DeleteForm| {
            let rows = db.triggers_delete(form.id).map_err(store_error)?;
            exactly_one(rows, form.id)
        })
        .boxed()
}

// Scores. Adding one directly bypasses eligibility and triggers; that's
// what grant_flag is for.

pub fn list_scores() -> Resp!() {
    warp::ext::get::<Db>()
        .and(auth::admin())
        .and_then(|db: Db| {
            let scores = db.all_scores().map_err(Error::Db).map_err(reject)?;
            Ok::<_, Rejection>(warp::reply::json(&scores))
        })
        .boxed()
}

pub fn add_score() -> Resp!() {
    warp::ext::get::<Db>()
        .and(auth::admin())
        .and(warp::body::json())
        .and_then(|db: Db, entry: NewScore| {
            let score = db.scores_add(&entry).map_err(store_error)?;
            info!("Added scoreid={}", score.id);
            Ok::<_, Rejection>(warp::reply::json(&score))
        })
        .boxed()
}

pub fn update_score() -> Resp!() {
    warp::ext::get::<Db>()
        .and(auth::admin())
        .and(warp::body::json())
        .and_then(|db: Db, form: UpdateForm<UpdateScore>| {
            if form.entry.is_empty() {
                return Err(nothing_to_update());
            }
            let rows = db.scores_update(form.id, &form.entry).map_err(store_error)?;
            exactly_one(rows, form.id)
        })
        .boxed()
}

pub fn delete_score() -> Resp!() {
    warp::ext::get::<Db>()
        .and(auth::admin())
        .and(warp::body::json())
        .and_then(|db: Db, form: DeleteForm| {
            let rows = db.scores_delete(form.id).map_err(store_error)?;
            exactly_one(rows, form.id)
        })
        .boxed()
}
