//! Public read endpoints: scoreboard, timeline, progress and the
//! client-facing config subset.

use serde_json::json;
use warp::{reject::custom as reject, Filter, Rejection};

use crate::access::AuthContext;
use crate::config::Config;
use crate::db::Db;
use crate::scoreboard;

use super::{auth, Error};

pub fn scoreboard() -> Resp!() {
    warp::ext::get::<Db>()
        .and(warp::ext::get::<Config>())
        .and(auth::context())
        .and_then(
            |db: Db, config: Config, viewer: AuthContext| {
                let board = scoreboard::scoreboard(&db, &config, &viewer)
                    .map_err(Error::Db)
                    .map_err(reject)?;
                Ok::<_, Rejection>(warp::reply::json(&board))
            },
        )
        .boxed()
}

pub fn timeline() -> Resp!() {
    warp::ext::get::<Db>()
        .and(warp::ext::get::<Config>())
        .and(auth::context())
        .and_then(
            |db: Db, config: Config, viewer: AuthContext| {
                let entries = scoreboard::timeline(&db, &config, &viewer)
                    .map_err(Error::Db)
                    .map_err(reject)?;
                Ok::<_, Rejection>(warp::reply::json(&entries))
            },
        )
        .boxed()
}

#[derive(Deserialize)]
struct ProgressQuery {
    #[serde(default)]
    tags: Option<String>,
}

pub fn progress() -> Resp!() {
    warp::ext::get::<Db>()
        .and(warp::ext::get::<Config>())
        .and(auth::team())
        .and(warp::query::<ProgressQuery>())
        .and_then(
            |db: Db, config: Config, team: i32, query: ProgressQuery| {
                let tags: Vec<String> = query
                    .tags
                    .as_ref()
                    .map(|tags| {
                        tags.split(',')
                            .map(str::trim)
                            .filter(|tag| !tag.is_empty())
                            .map(str::to_owned)
                            .collect()
                    })
                    .unwrap_or_default();

                let progress = scoreboard::progress(&db, &config, team, &tags)
                    .map_err(Error::Progress)
                    .map_err(reject)?;
                Ok::<_, Rejection>(warp::reply::json(&progress))
            },
        )
        .boxed()
}

/// The few config knobs clients adjust their UI to.
pub fn server_config() -> Resp!() {
    warp::ext::get::<Config>()
        .and_then(|config: Config| {
            Ok::<_, Rejection>(warp::reply::json(&json!({
                "scores_read_only": config.scoring.read_only,
                "scores_writeups": config.scoring.writeups,
            })))
        })
        .boxed()
}
