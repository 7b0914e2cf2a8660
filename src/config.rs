use std::net::SocketAddr;
use std::path::PathBuf;

use ipnetwork::IpNetwork;

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ScoringConfig {
    /// Reject all submissions while set.
    #[serde(default)]
    pub read_only: bool,
    /// Count writeup points in the scoreboard and expose them to teams.
    #[serde(default)]
    pub writeups: bool,
    /// Teams only see their own points; guests see everyone at zero.
    #[serde(default)]
    pub hide_others: bool,
    /// Allow tag-less overall progress queries.
    #[serde(default)]
    pub progress: bool,
    /// Tag namespaces (the part before ':') teams may query progress for.
    #[serde(default)]
    pub progress_namespaces: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct TeamsConfig {
    /// Let a team fill in its own name/country/website, once each.
    #[serde(default)]
    pub self_update: bool,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NotifyConfig {
    /// host:port listeners receiving a JSON blob per accepted score.
    #[serde(default)]
    pub servers: Vec<String>,
    /// Executables invoked with TEAMID CODE VALUE TAGS.
    #[serde(default)]
    pub scripts: Vec<PathBuf>,
    /// Per-destination timeout in seconds.
    #[serde(default = "default_notify_timeout")]
    pub timeout: u64,
}

impl Default for NotifyConfig {
    fn default() -> NotifyConfig {
        NotifyConfig {
            servers: Vec::new(),
            scripts: Vec::new(),
            timeout: default_notify_timeout(),
        }
    }
}

fn default_notify_timeout() -> u64 {
    3
}

fn default_validator_timeout() -> u64 {
    10
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub db: String,

    /// Requests from these subnets get admin access.
    #[serde(default)]
    pub admin_subnets: Vec<IpNetwork>,

    /// Directory holding the external validators for special flags.
    #[serde(default = "default_validator_dir")]
    pub validator_dir: PathBuf,
    #[serde(default = "default_validator_timeout")]
    pub validator_timeout: u64,

    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub teams: TeamsConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

fn default_validator_dir() -> PathBuf {
    PathBuf::from("validators")
}

#[cfg(test)]
impl Config {
    pub(crate) fn test_defaults() -> Config {
        toml::from_str(
            r#"
            bind_addr = "127.0.0.1:9080"
            db = "postgres://localhost/scores"
            "#,
        )
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal() {
        let config: Config = toml::from_str(
            r#"
            bind_addr = "[::]:9080"
            db = "postgres://localhost/scores"
            "#,
        )
        .unwrap();

        assert!(!config.scoring.read_only);
        assert!(!config.scoring.hide_others);
        assert!(config.admin_subnets.is_empty());
        assert_eq!(config.notify.timeout, 3);
        assert_eq!(config.validator_timeout, 10);
    }

    #[test]
    fn parse_full() {
        let config: Config = toml::from_str(
            r#"
            bind_addr = "127.0.0.1:9080"
            db = "postgres://localhost/scores"
            admin_subnets = ["10.0.0.0/24", "fd00::/64"]
            validator_dir = "validators"
            validator_timeout = 5

            [scoring]
            read_only = true
            writeups = true
            hide_others = true
            progress = true
            progress_namespaces = ["cat"]

            [teams]
            self_update = true

            [notify]
            servers = ["[::1]:5000"]
            scripts = ["scripts/announce"]
            timeout = 1
            "#,
        )
        .unwrap();

        assert!(config.scoring.read_only);
        assert_eq!(config.admin_subnets.len(), 2);
        assert_eq!(config.scoring.progress_namespaces, vec!["cat"]);
        assert_eq!(config.notify.servers, vec!["[::1]:5000"]);
        assert_eq!(config.notify.timeout, 1);
    }
}
