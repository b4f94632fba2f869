//! Bounded external command execution
//!
//! Used by promotion gates and SBOM generation. Output pipes are drained on
//! background threads so a chatty child cannot block on a full pipe while we
//! wait on it.
//!
//! On unix the child leads its own process group and a timeout kills the
//! whole group, so shell wrappers cannot leave workers running past the
//! deadline.

use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use wait_timeout::ChildExt;

/// Outcome of a bounded command run
#[derive(Debug)]
pub enum CommandOutcome {
    /// Child exited within the deadline
    Completed {
        status: ExitStatus,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
        elapsed: Duration,
    },
    /// Child was killed at the deadline
    TimedOut { elapsed: Duration },
}

/// Spawn `cmd` and wait at most `timeout` for it
///
/// Spawn failures (e.g. missing binary) are returned as `Err` so callers can
/// tell "could not run" apart from "ran and failed".
pub fn run_with_timeout(cmd: &mut Command, timeout: Duration) -> io::Result<CommandOutcome> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let started = Instant::now();
    let mut child = cmd.spawn()?;
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    match child.wait_timeout(timeout)? {
        Some(status) => Ok(CommandOutcome::Completed {
            status,
            stdout: join(stdout),
            stderr: join(stderr),
            elapsed: started.elapsed(),
        }),
        None => {
            kill(&mut child);
            // Drain threads are detached: an escaped descendant may still
            // hold the pipes open.
            drop(stdout);
            drop(stderr);
            Ok(CommandOutcome::TimedOut {
                elapsed: started.elapsed(),
            })
        }
    }
}

/// Last `max_chars` characters of `bytes`, lossily decoded and trimmed
pub fn tail(bytes: &[u8], max_chars: usize) -> String {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim();
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    text.chars().skip(count - max_chars).collect()
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut reader| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = reader.read_to_end(&mut buf);
            buf
        })
    })
}

fn join(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

fn kill(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let _ = killpg(Pid::from_raw(child.id() as i32), Signal::SIGKILL);
    }
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_completed_captures_output() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo out; echo err >&2; exit 3"]);

        match run_with_timeout(&mut cmd, Duration::from_secs(10)).unwrap() {
            CommandOutcome::Completed {
                status,
                stdout,
                stderr,
                ..
            } => {
                assert_eq!(status.code(), Some(3));
                assert_eq!(String::from_utf8_lossy(&stdout).trim(), "out");
                assert_eq!(String::from_utf8_lossy(&stderr).trim(), "err");
            }
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[test]
    fn test_timeout_kills_child() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "exec sleep 5"]);

        let outcome = run_with_timeout(&mut cmd, Duration::from_millis(100)).unwrap();
        match outcome {
            CommandOutcome::TimedOut { elapsed } => assert!(elapsed < Duration::from_secs(5)),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_timeout_kills_forked_children() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "sleep 6; exit 0"]);

        let outcome = run_with_timeout(&mut cmd, Duration::from_millis(300)).unwrap();
        match outcome {
            CommandOutcome::TimedOut { elapsed } => assert!(elapsed < Duration::from_secs(3)),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_timeout_returns_while_descendant_holds_pipes() {
        // Orphaned background job inherits the pipes and the process group
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "(sleep 6 &) ; sleep 6"]);

        let started = Instant::now();
        let outcome = run_with_timeout(&mut cmd, Duration::from_millis(300)).unwrap();
        assert!(matches!(outcome, CommandOutcome::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn test_missing_binary_is_err() {
        let mut cmd = Command::new("definitely-not-a-real-binary-floe");
        let err = run_with_timeout(&mut cmd, Duration::from_secs(1)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_tail() {
        assert_eq!(tail(b"  short  ", 10), "short");
        assert_eq!(tail(b"abcdefghij", 3), "hij");
    }
}
