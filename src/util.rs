use std::error::Error as StdError;
use std::io;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Display)]
pub enum TimeoutCommandError {
    Io(io::Error),
    #[display(fmt = "command timed out after {:?}", _0)]
    TimedOut(Duration),
}

impl StdError for TimeoutCommandError {}

impl From<io::Error> for TimeoutCommandError {
    fn from(err: io::Error) -> TimeoutCommandError {
        TimeoutCommandError::Io(err)
    }
}

/// Run a child process with a deadline. The child is killed when the
/// deadline passes; its stdio is discarded either way.
pub fn run_with_timeout(
    executable: &Path,
    args: &[String],
    timeout: Duration,
) -> Result<ExitStatus, TimeoutCommandError> {
    let mut child = Command::new(executable)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;

    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            child.kill()?;
            child.wait()?;
            return Err(TimeoutCommandError::TimedOut(timeout));
        }
        thread::sleep(Duration::from_millis(50));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sh(script: &str) -> (PathBuf, Vec<String>) {
        (
            PathBuf::from("sh"),
            vec!["-c".to_owned(), script.to_owned()],
        )
    }

    #[test]
    fn captures_exit_status() {
        let (cmd, args) = sh("exit 0");
        let status = run_with_timeout(&cmd, &args, Duration::from_secs(5)).unwrap();
        assert!(status.success());

        let (cmd, args) = sh("exit 3");
        let status = run_with_timeout(&cmd, &args, Duration::from_secs(5)).unwrap();
        assert_eq!(status.code(), Some(3));
    }

    #[test]
    fn kills_on_timeout() {
        let (cmd, args) = sh("sleep 30");
        let started = Instant::now();
        let result = run_with_timeout(&cmd, &args, Duration::from_millis(200));
        assert!(started.elapsed() < Duration::from_secs(5));
        match result {
            Err(TimeoutCommandError::TimedOut(_)) => {}
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn missing_executable_is_an_io_error() {
        let result = run_with_timeout(
            Path::new("/nonexistent/validator"),
            &[],
            Duration::from_secs(1),
        );
        match result {
            Err(TimeoutCommandError::Io(_)) => {}
            other => panic!("expected io error, got {:?}", other),
        }
    }
}
