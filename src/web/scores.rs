//! The scores endpoints: submissions, a team's own history, and the
//! admin grant operations.

use warp::{reject::custom as reject, Filter, Rejection};

use crate::config::Config;
use crate::db::Db;
use crate::scoreboard;
use crate::submit::{self, SpecialReply};

use super::{auth, Error};

#[derive(Deserialize)]
struct SubmitForm {
    flag: String,
}

#[derive(Deserialize)]
struct SubmitSpecialForm {
    code: String,
    flag: String,
}

#[derive(Deserialize)]
struct GrantFlagForm {
    teamid: i32,
    flagid: i32,
    #[serde(default)]
    value: Option<i32>,
}

#[derive(Deserialize)]
struct GrantWriteupForm {
    scoreid: i32,
    #[serde(default)]
    value: Option<i32>,
}

pub fn submit() -> Resp!() {
    warp::ext::get::<Db>()
        .and(warp::ext::get::<Config>())
        .and(auth::team())
        .and(warp::body::json())
        .and_then(
            |db: Db, config: Config, team: i32, form: SubmitForm| {
                let awards = submit::submit(&db, &config, team, &form.flag)
                    .map_err(Error::Submit)
                    .map_err(reject)?;
                Ok::<_, Rejection>(warp::reply::json(&awards))
            },
        )
        .boxed()
}

pub fn submit_special() -> Resp!() {
    warp::ext::get::<Db>()
        .and(warp::ext::get::<Config>())
        .and(auth::team())
        .and(warp::body::json())
        .and_then(
            |db: Db, config: Config, team: i32, form: SubmitSpecialForm| {
                let result = submit::submit_special(&db, &config, team, &form.code, &form.flag);
                let reply = SpecialReply::from_result(result)
                    .map_err(Error::Submit)
                    .map_err(reject)?;
                Ok::<_, Rejection>(warp::reply::json(&reply))
            },
        )
        .boxed()
}

pub fn submitted() -> Resp!() {
    warp::ext::get::<Db>()
        .and(warp::ext::get::<Config>())
        .and(auth::team())
        .and_then(|db: Db, config: Config, team: i32| {
            let entries = scoreboard::list_submitted(&db, &config, team)
                .map_err(Error::Db)
                .map_err(reject)?;
            Ok::<_, Rejection>(warp::reply::json(&entries))
        })
        .boxed()
}

pub fn grant_flag() -> Resp!() {
    warp::ext::get::<Db>()
        .and(warp::ext::get::<Config>())
        .and(auth::admin())
        .and(warp::body::json())
        .and_then(
            |db: Db, config: Config, form: GrantFlagForm| {
                submit::grant_flag(&db, &config, form.teamid, form.flagid, form.value)
                    .map_err(Error::Submit)
                    .map_err(reject)?;
                Ok::<_, Rejection>(warp::reply::json(&true))
            },
        )
        .boxed()
}

pub fn grant_writeup() -> Resp!() {
    warp::ext::get::<Db>()
        .and(auth::admin())
        .and(warp::body::json())
        .and_then(|db: Db, form: GrantWriteupForm| {
            submit::grant_writeup(&db, form.scoreid, form.value)
                .map_err(Error::Submit)
                .map_err(reject)?;
            Ok::<_, Rejection>(warp::reply::json(&true))
        })
        .boxed()
}
