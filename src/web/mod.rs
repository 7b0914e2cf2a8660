#[macro_use]
mod utils;

mod admin;
mod auth;
mod board;
mod scores;
mod teams;

use std::error::Error as StdError;
use std::net::SocketAddr;

use serde_json::json;
use warp::{http::StatusCode, Filter, Rejection};

use crate::config::Config;
use crate::db::{Db, DbError};
use crate::scoreboard::ProgressError;
use crate::submit::SubmitError;

use self::utils::set;

#[derive(Debug, Display)]
pub enum Error {
    #[display(fmt = "{}", _0)]
    Submit(SubmitError),
    #[display(fmt = "{}", _0)]
    Progress(ProgressError),
    #[display(fmt = "Internal server error.")]
    Db(DbError),
    #[display(fmt = "Access denied.")]
    Unauthorized,
    #[display(fmt = "{}", _0)]
    BadRequest(String),
}

impl StdError for Error {}

pub fn run(config: Config, bind_addr: SocketAddr, db: Db) {
    let ext = set(db).and(set(config));

    let routes = route_any!(
        POST("scores" / "submit") => scores::submit(),
        POST("scores" / "submit_special") => scores::submit_special(),
        GET("scores" / "submitted") => scores::submitted(),
        GET("scores" / "timeline") => board::timeline(),
        POST("scores" / "grant_flag") => scores::grant_flag(),
        POST("scores" / "grant_writeup") => scores::grant_writeup(),
        GET("scoreboard") => board::scoreboard(),
        GET("progress") => board::progress(),
        GET("config") => board::server_config(),
        POST("teams" / "self") => teams::update_self(),
        GET("flags" / "list") => admin::list_flags(),
        POST("flags" / "add") => admin::add_flag(),
        POST("flags" / "update") => admin::update_flag(),
        POST("flags" / "delete") => admin::delete_flag(),
        GET("teams" / "list") => admin::list_teams(),
        POST("teams" / "add") => admin::add_team(),
        POST("teams" / "update") => admin::update_team(),
        POST("teams" / "delete") => admin::delete_team(),
        GET("triggers" / "list") => admin::list_triggers(),
        POST("triggers" / "add") => admin::add_trigger(),
        POST("triggers" / "update") => admin::update_trigger(),
        POST("triggers" / "delete") => admin::delete_trigger(),
        GET("scores" / "list") => admin::list_scores(),
        POST("scores" / "add") => admin::add_score(),
        POST("scores" / "update") => admin::update_score(),
        POST("scores" / "delete") => admin::delete_score(),
    );

    warp::serve(ext.and(routes).recover(recover)).run(bind_addr)
}

/// Expected rejections answer with their message; store failures are
/// logged in full and answered with an opaque 500.
fn recover(err: Rejection) -> Result<impl warp::Reply, Rejection> {
    let error = match err.find_cause::<Error>() {
        Some(error) => error,
        None => return Err(err),
    };

    let status = match error {
        Error::Unauthorized => StatusCode::FORBIDDEN,
        Error::BadRequest(_) => StatusCode::BAD_REQUEST,
        Error::Submit(submit) if submit.is_internal() => {
            error!("Submission failed: {}", submit);
            StatusCode::INTERNAL_SERVER_ERROR
        }
        Error::Submit(_) => StatusCode::BAD_REQUEST,
        Error::Progress(ProgressError::Db(db)) => {
            error!("Progress query failed: {}", db);
            StatusCode::INTERNAL_SERVER_ERROR
        }
        Error::Progress(_) => StatusCode::BAD_REQUEST,
        Error::Db(db) => {
            error!("Store failure: {}", db);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
        "Internal server error.".to_owned()
    } else {
        error.to_string()
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&json!({ "error": message })),
        status,
    ))
}
