//! Bounded child-process sessions.
//!
//! Runs one program to completion with a deadline. Stdin, stdout and stderr
//! are serviced on their own threads so a chatty child cannot deadlock on a
//! full pipe. On timeout the child is killed and its output abandoned.

use std::io::{Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug)]
pub(crate) struct SessionOutput {
    pub(crate) status: ExitStatus,
    pub(crate) stdout: String,
    pub(crate) stderr: String,
}

#[derive(Debug)]
pub(crate) enum SessionError {
    Spawn(std::io::Error),
    Wait(std::io::Error),
    TimedOut(Duration),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Spawn(e) => write!(f, "could not start session: {e}"),
            SessionError::Wait(e) => write!(f, "session wait failed: {e}"),
            SessionError::TimedOut(t) => write!(f, "no reply within {}s", t.as_secs_f32()),
        }
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

pub(crate) fn run_bounded(
    command: &mut Command,
    input: Option<Vec<u8>>,
    timeout: Duration,
) -> Result<SessionOutput, SessionError> {
    let mut child = command
        .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(SessionError::Spawn)?;

    if let (Some(mut stdin), Some(bytes)) = (child.stdin.take(), input) {
        // A child that exits without reading closes the pipe; that is its answer.
        thread::spawn(move || {
            let _ = stdin.write_all(&bytes);
        });
    }
    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait().map_err(SessionError::Wait)? {
            Some(status) => break status,
            None if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(SessionError::TimedOut(timeout));
            }
            None => thread::sleep(POLL_INTERVAL),
        }
    };

    let collect = |h: Option<thread::JoinHandle<String>>| {
        h.and_then(|h| h.join().ok()).unwrap_or_default()
    };
    Ok(SessionOutput { status, stdout: collect(stdout), stderr: collect(stderr) })
}

/// Last non-empty line of `text`, for compact diagnostics.
pub(crate) fn last_line(text: &str) -> &str {
    text.lines().rev().map(str::trim).find(|l| !l.is_empty()).unwrap_or("")
}
