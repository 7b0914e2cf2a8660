//! Fire-and-forget notifications for accepted scores: a JSON blob to
//! each configured TCP listener and a subprocess per configured script.
//! Delivery failures are logged and never affect the submission.

use std::io::Write;
use std::net::{TcpStream, ToSocketAddrs};
use std::thread;
use std::time::Duration;

use crate::config::Config;
use crate::models::{Flag, Score};
use crate::util;

#[derive(Serialize)]
struct FlagNotification<'a> {
    teamid: i32,
    code: &'a str,
    value: i32,
    tags: &'a str,
}

/// Announce a committed score. Every insert goes through here: direct
/// submissions, trigger bonuses and admin grants alike. Codeless flags
/// report an empty `code`.
pub fn notify_score(config: &Config, teamid: i32, flag: &Flag, score: &Score) {
    notify_flag(
        config,
        teamid,
        flag.code.as_ref().map(String::as_str).unwrap_or(""),
        score.value,
        &flag.tags,
    );
}

/// Spawn a thread delivering the notification so the submission response
/// doesn't wait on slow listeners.
pub fn notify_flag(config: &Config, teamid: i32, code: &str, value: i32, tags: &str) {
    if config.notify.servers.is_empty() && config.notify.scripts.is_empty() {
        return;
    }

    let notify = config.notify.clone();
    let code = code.to_owned();
    let tags = tags.to_owned();

    thread::spawn(move || {
        let payload = match serde_json::to_vec(&FlagNotification {
            teamid,
            code: &code,
            value,
            tags: &tags,
        }) {
            Ok(payload) => payload,
            Err(err) => {
                error!("Unable to serialize the notification: {}", err);
                return;
            }
        };

        let timeout = Duration::from_secs(notify.timeout);

        for server in &notify.servers {
            if let Err(err) = send_blob(server, &payload, timeout) {
                error!("Unable to reach the notify server: {} ({})", server, err);
            }
        }

        let args = vec![
            teamid.to_string(),
            code.clone(),
            value.to_string(),
            tags.clone(),
        ];
        for script in &notify.scripts {
            match util::run_with_timeout(script, &args, timeout) {
                Ok(status) if status.success() => {}
                Ok(status) => {
                    error!(
                        "Notify script {:?} exited with status {:?}",
                        script,
                        status.code()
                    );
                }
                Err(err) => {
                    error!("Notify script {:?} failed: {}", script, err);
                }
            }
        }
    });
}

fn send_blob(server: &str, payload: &[u8], timeout: Duration) -> std::io::Result<()> {
    let addr = server
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no address"))?;

    let mut stream = TcpStream::connect_timeout(&addr, timeout)?;
    stream.set_write_timeout(Some(timeout))?;
    stream.write_all(payload)?;
    stream.shutdown(std::net::Shutdown::Both)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;

    #[test]
    fn payload_shape() {
        let blob = serde_json::to_value(&FlagNotification {
            teamid: 4,
            code: "web1",
            value: 50,
            tags: "cat:web",
        })
        .unwrap();

        assert_eq!(blob["teamid"], 4);
        assert_eq!(blob["code"], "web1");
        assert_eq!(blob["value"], 50);
        assert_eq!(blob["tags"], "cat:web");
    }

    #[test]
    fn scored_flags_reach_the_listener() {
        use chrono::Utc;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let mut config = crate::Config::test_defaults();
        config.notify.servers = vec![addr.to_string()];

        // a codeless bonus flag, as awarded by a trigger or admin grant
        let flag = Flag {
            id: 9,
            teamid: None,
            triggerid: None,
            code: None,
            flag: None,
            value: 30,
            writeup_value: None,
            return_string: None,
            counter: None,
            validator: None,
            description: String::new(),
            tags: "cat:bonus".to_owned(),
        };
        let score = Score {
            id: 1,
            teamid: 7,
            flagid: 9,
            value: 30,
            writeup_value: None,
            submit_time: Utc::now().naive_utc(),
            writeup_time: None,
        };

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf).unwrap();
            buf
        });

        notify_score(&config, 7, &flag, &score);

        let received = handle.join().unwrap();
        let blob: serde_json::Value = serde_json::from_slice(&received).unwrap();
        assert_eq!(blob["teamid"], 7);
        assert_eq!(blob["code"], "");
        assert_eq!(blob["value"], 30);
        assert_eq!(blob["tags"], "cat:bonus");
    }

    #[test]
    fn delivers_to_a_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf).unwrap();
            buf
        });

        send_blob(&addr.to_string(), b"{\"teamid\":1}", Duration::from_secs(2)).unwrap();
        let received = handle.join().unwrap();
        assert_eq!(received, b"{\"teamid\":1}");
    }
}
