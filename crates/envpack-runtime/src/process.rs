//! Streaming subprocess execution.
//!
//! [`ProcessStream`] turns a child process into an ordered sequence of
//! [`ProcessEvent`]s: stdout and stderr lines as they arrive, then exactly one
//! `Exited`. [`run_streaming`] drives a stream to completion under a
//! [`RunControl`], killing the child on timeout or cancellation.

use crate::{CancelToken, RuntimeError};
use std::collections::VecDeque;
use std::fmt;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::time::Instant;

/// How many trailing output lines are kept for error reports.
pub const OUTPUT_TAIL_LINES: usize = 20;

/// An external program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    program: String,
    args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_owned(),
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Cancellation and time bound applied to one subprocess invocation.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    pub cancel: CancelToken,
    pub timeout: Option<Duration>,
}

impl RunControl {
    pub fn new(cancel: CancelToken) -> Self {
        Self {
            cancel,
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.timeout.map(|t| Instant::now() + t)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Stdout(String),
    Stderr(String),
    /// Terminal event. `None` when the process was killed by a signal.
    Exited(Option<i32>),
}

/// A running child process viewed as a sequence of events.
pub struct ProcessStream {
    program: String,
    child: Child,
    stdout: Option<Lines<BufReader<ChildStdout>>>,
    stderr: Option<Lines<BufReader<ChildStderr>>>,
    finished: bool,
}

impl ProcessStream {
    pub fn spawn(command: &ToolCommand) -> Result<Self, RuntimeError> {
        tracing::debug!("spawning: {command}");
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RuntimeError::Spawn {
                program: command.program.clone(),
                message: e.to_string(),
            })?;

        let stdout = child.stdout.take().map(|s| BufReader::new(s).lines());
        let stderr = child.stderr.take().map(|s| BufReader::new(s).lines());
        Ok(Self {
            program: command.program.clone(),
            child,
            stdout,
            stderr,
            finished: false,
        })
    }

    /// Next output line or the exit status. Returns `None` after `Exited`.
    pub async fn next_event(&mut self) -> Option<Result<ProcessEvent, RuntimeError>> {
        if self.finished {
            return None;
        }

        enum Read {
            Out(std::io::Result<Option<String>>),
            Err(std::io::Result<Option<String>>),
        }

        loop {
            let read = match (self.stdout.as_mut(), self.stderr.as_mut()) {
                (None, None) => break,
                (Some(out), None) => Read::Out(out.next_line().await),
                (None, Some(err)) => Read::Err(err.next_line().await),
                (Some(out), Some(err)) => tokio::select! {
                    r = out.next_line() => Read::Out(r),
                    r = err.next_line() => Read::Err(r),
                },
            };
            match read {
                Read::Out(Ok(Some(line))) => return Some(Ok(ProcessEvent::Stdout(line))),
                Read::Err(Ok(Some(line))) => return Some(Ok(ProcessEvent::Stderr(line))),
                Read::Out(Ok(None)) => self.stdout = None,
                Read::Err(Ok(None)) => self.stderr = None,
                Read::Out(Err(e)) => {
                    tracing::debug!("{}: stdout read failed: {e}", self.program);
                    self.stdout = None;
                }
                Read::Err(Err(e)) => {
                    tracing::debug!("{}: stderr read failed: {e}", self.program);
                    self.stderr = None;
                }
            }
        }

        self.finished = true;
        Some(
            self.child
                .wait()
                .await
                .map(|status| ProcessEvent::Exited(status.code()))
                .map_err(RuntimeError::from),
        )
    }

    /// Kill the child and reap it. Idempotent.
    pub async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::debug!("{}: kill failed: {e}", self.program);
        }
        self.finished = true;
    }
}

/// Bounded ring of the most recent output lines.
#[derive(Debug, Clone)]
pub struct OutputTail {
    lines: VecDeque<String>,
    cap: usize,
}

impl OutputTail {
    pub fn new(cap: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(cap),
            cap,
        }
    }

    pub fn push(&mut self, line: &str) {
        if self.cap == 0 {
            return;
        }
        if self.lines.len() == self.cap {
            self.lines.pop_front();
        }
        self.lines.push_back(line.to_owned());
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines.into_iter().collect()
    }
}

/// Collected result of a successful invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Full stdout, newline-joined.
    pub stdout: String,
    pub stderr_lines: Vec<String>,
}

enum Step {
    Event(Option<Result<ProcessEvent, RuntimeError>>),
    Cancelled,
    TimedOut,
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

/// Run `command` to completion, forwarding each stdout line to `on_stdout`.
///
/// Non-zero exit fails with [`RuntimeError::Subprocess`] carrying the last
/// [`OUTPUT_TAIL_LINES`] lines of combined output. Timeout and cancellation
/// kill the child before returning.
pub async fn run_streaming(
    command: &ToolCommand,
    control: &RunControl,
    on_stdout: &(dyn Fn(&str) + Send + Sync),
) -> Result<ToolOutput, RuntimeError> {
    if control.cancel.is_cancelled() {
        return Err(RuntimeError::Cancelled(command.program.clone()));
    }

    let mut stream = ProcessStream::spawn(command)?;
    let deadline = control.deadline();
    let mut stdout = Vec::new();
    let mut stderr_lines = Vec::new();
    let mut tail = OutputTail::new(OUTPUT_TAIL_LINES);

    loop {
        let step = tokio::select! {
            ev = stream.next_event() => Step::Event(ev),
            () = control.cancel.cancelled() => Step::Cancelled,
            () = wait_deadline(deadline) => Step::TimedOut,
        };

        match step {
            Step::Cancelled => {
                tracing::warn!("cancelling {}", command.program);
                stream.kill().await;
                return Err(RuntimeError::Cancelled(command.program.clone()));
            }
            Step::TimedOut => {
                let secs = control.timeout.map_or(0, |t| t.as_secs());
                tracing::warn!("{} timed out after {secs}s, killing", command.program);
                stream.kill().await;
                return Err(RuntimeError::Timeout {
                    program: command.program.clone(),
                    secs,
                });
            }
            Step::Event(None) => {
                return Err(RuntimeError::Output(format!(
                    "{} ended without an exit status",
                    command.program
                )));
            }
            Step::Event(Some(Err(e))) => return Err(e),
            Step::Event(Some(Ok(ProcessEvent::Stdout(line)))) => {
                tracing::debug!("{}: {line}", command.program);
                on_stdout(&line);
                tail.push(&line);
                stdout.push(line);
            }
            Step::Event(Some(Ok(ProcessEvent::Stderr(line)))) => {
                tracing::debug!("{} (stderr): {line}", command.program);
                tail.push(&line);
                stderr_lines.push(line);
            }
            Step::Event(Some(Ok(ProcessEvent::Exited(code)))) => {
                if code == Some(0) {
                    return Ok(ToolOutput {
                        stdout: stdout.join("\n"),
                        stderr_lines,
                    });
                }
                return Err(RuntimeError::Subprocess {
                    program: command.program.clone(),
                    code,
                    tail: tail.into_lines(),
                });
            }
        }
    }
}

/// [`run_streaming`] without a progress sink.
pub async fn run_captured(
    command: &ToolCommand,
    control: &RunControl,
) -> Result<ToolOutput, RuntimeError> {
    run_streaming(command, control, &|_| {}).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn sh(script: &str) -> ToolCommand {
        ToolCommand::new("sh").arg("-c").arg(script)
    }

    #[test]
    fn command_display_joins_args() {
        let cmd = ToolCommand::new("conda-pack").args(["-n", "demo", "-o", "/tmp/x.tar.gz"]);
        assert_eq!(cmd.to_string(), "conda-pack -n demo -o /tmp/x.tar.gz");
        assert_eq!(cmd.program(), "conda-pack");
        assert_eq!(cmd.arguments().len(), 4);
    }

    #[test]
    fn tail_keeps_last_lines() {
        let mut tail = OutputTail::new(2);
        for l in ["a", "b", "c"] {
            tail.push(l);
        }
        assert_eq!(tail.into_lines(), vec!["b", "c"]);
    }

    #[tokio::test]
    async fn stream_yields_lines_then_exit() {
        let mut stream = ProcessStream::spawn(&sh("echo one; echo two 1>&2; echo three")).unwrap();
        let mut events = Vec::new();
        while let Some(ev) = stream.next_event().await {
            events.push(ev.unwrap());
        }
        assert_eq!(events.last(), Some(&ProcessEvent::Exited(Some(0))));
        let stdout: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ProcessEvent::Stdout(l) => Some(l.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(stdout, vec!["one", "three"]);
        assert!(events.contains(&ProcessEvent::Stderr("two".to_owned())));
        assert!(stream.next_event().await.is_none());
    }

    #[tokio::test]
    async fn run_streaming_forwards_stdout_lines() {
        let seen = Mutex::new(Vec::new());
        let out = run_streaming(
            &sh("echo Collecting; echo Packing"),
            &RunControl::default(),
            &|l| seen.lock().unwrap().push(l.to_owned()),
        )
        .await
        .unwrap();
        assert_eq!(out.stdout, "Collecting\nPacking");
        assert_eq!(*seen.lock().unwrap(), vec!["Collecting", "Packing"]);
    }

    #[tokio::test]
    async fn non_zero_exit_carries_tail() {
        let err = run_captured(
            &sh("echo progress; echo 'CondaPackError: missing files' 1>&2; exit 1"),
            &RunControl::default(),
        )
        .await
        .unwrap_err();
        match err {
            RuntimeError::Subprocess { program, code, tail } => {
                assert_eq!(program, "sh");
                assert_eq!(code, Some(1));
                assert!(tail.iter().any(|l| l.contains("CondaPackError")));
            }
            other => panic!("expected Subprocess, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn timeout_kills_child() {
        let control = RunControl::default().with_timeout(Duration::from_millis(100));
        let started = std::time::Instant::now();
        let err = run_captured(&sh("sleep 5"), &control).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Timeout { .. }), "{err}");
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn cancel_kills_child() {
        let cancel = CancelToken::new();
        let control = RunControl::new(cancel.clone());
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });
        let err = run_captured(&sh("sleep 5"), &control).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Cancelled(_)), "{err}");
    }

    #[tokio::test]
    async fn already_cancelled_does_not_spawn() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = run_captured(
            &ToolCommand::new("definitely-not-a-real-tool-xyz"),
            &RunControl::new(cancel),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RuntimeError::Cancelled(_)));
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let err = run_captured(
            &ToolCommand::new("definitely-not-a-real-tool-xyz"),
            &RunControl::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RuntimeError::Spawn { .. }), "{err}");
    }
}
