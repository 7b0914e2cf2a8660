//! Source-address authentication. Admins are matched against the
//! configured subnets, teams against the subnets stored on their row,
//! anything else is a guest.

use std::net::{IpAddr, SocketAddr};

use ipnetwork::IpNetwork;

use crate::config::Config;
use crate::db::{Db, DbError};
use crate::models::Team;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AuthContext {
    Admin,
    Team(i32),
    Guest,
}

impl AuthContext {
    pub fn is_admin(&self) -> bool {
        *self == AuthContext::Admin
    }

    pub fn team(&self) -> Option<i32> {
        match self {
            AuthContext::Team(id) => Some(*id),
            _ => None,
        }
    }
}

/// Resolve a peer address. A request with no peer address (shouldn't
/// happen over TCP) is a guest.
pub fn resolve(addr: Option<SocketAddr>, config: &Config, db: &Db) -> Result<AuthContext, DbError> {
    let ip = match addr {
        Some(addr) => addr.ip(),
        None => return Ok(AuthContext::Guest),
    };

    let teams = db.all_teams()?;
    Ok(classify(ip, &config.admin_subnets, &teams))
}

/// Admin subnets win over team subnets, so an admin range overlapping a
/// team range still yields admin access.
fn classify(ip: IpAddr, admin_subnets: &[IpNetwork], teams: &[Team]) -> AuthContext {
    if admin_subnets.iter().any(|subnet| subnet.contains(ip)) {
        return AuthContext::Admin;
    }
    match_team(ip, teams)
}

fn match_team(ip: IpAddr, teams: &[Team]) -> AuthContext {
    for team in teams {
        for subnet in team.subnets.split(',') {
            let subnet = subnet.trim();
            if subnet.is_empty() {
                continue;
            }
            match subnet.parse::<IpNetwork>() {
                Ok(subnet) if subnet.contains(ip) => return AuthContext::Team(team.id),
                Ok(_) => {}
                Err(err) => {
                    warn!("Invalid subnet '{}' on team {}: {}", subnet, team.id, err);
                }
            }
        }
    }

    AuthContext::Guest
}
