#[macro_use]
extern crate derive_more;
#[macro_use]
extern crate diesel;
#[macro_use]
extern crate diesel_migrations;
#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;

pub mod access;
pub mod db;
pub mod eligibility;
pub mod models;
pub mod notify;
pub mod schema;
pub mod scoreboard;
pub mod submit;
pub mod triggers;
pub mod util;
pub mod web;

mod config;

pub use crate::config::Config;
pub use crate::db::Db;
