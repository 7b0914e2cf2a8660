//! Request authentication filters. Every handler states its requirement
//! by composing one of these instead of re-deriving the caller identity.

use std::net::SocketAddr;

use warp::{reject::custom as reject, Filter, Rejection};

use crate::access::{self, AuthContext};
use crate::config::Config;
use crate::db::Db;

use super::Error;

/// Who is calling, derived from the peer address. Never rejects by
/// itself; handlers that accept guests use this directly.
pub fn context() -> impl Clone + Filter<Extract = (AuthContext,), Error = Rejection> {
    warp::addr::remote()
        .and(warp::ext::get::<Db>())
        .and(warp::ext::get::<Config>())
        .and_then(
            |addr: Option<SocketAddr>, db: Db, config: Config| -> Result<AuthContext, Rejection> {
                access::resolve(addr, &config, &db)
                    .map_err(Error::Db)
                    .map_err(reject)
            },
        )
}

/// Requires a team identity and extracts its id. Admins don't have one
/// and are rejected here like everyone else.
pub fn team() -> impl Clone + Filter<Extract = (i32,), Error = Rejection> {
    context()
        .and(warp::addr::remote())
        .and_then(
            |ctx: AuthContext, addr: Option<SocketAddr>| -> Result<i32, Rejection> {
                match ctx.team() {
                    Some(team) => Ok(team),
                    None => {
                        warn!("Rejected team request from {:?}", addr);
                        Err(reject(Error::Unauthorized))
                    }
                }
            },
        )
}

pub fn admin() -> impl Clone + Filter<Extract = (), Error = Rejection> {
    context()
        .and(warp::addr::remote())
        .and_then(
            |ctx: AuthContext, addr: Option<SocketAddr>| -> Result<(), Rejection> {
                if ctx.is_admin() {
                    Ok(())
                } else {
                    warn!("Rejected admin request from {:?}", addr);
                    Err(reject(Error::Unauthorized))
                }
            },
        )
        .untuple_one()
}
