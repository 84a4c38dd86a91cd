//! Supervision of a single external command
//!
//! A [`ProcessRunner`] spawns one child, streams its stdout and stderr line
//! by line as [`BuildEvent::StepOutput`] events, and observes a shared
//! [`CancelToken`] between reads. The runner is consumed by [`ProcessRunner::run`]
//! so every command gets a fresh instance.

use crate::utils::timeout::with_optional_timeout;
use regex::Regex;
use srcforge_errors::{Error, ProcessError};
use srcforge_events::{BuildEvent, EventEmitter, EventSender};
use std::collections::HashMap;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Notify;

/// Exit code reported for a command stopped by cancellation
pub const CANCELLED_EXIT_CODE: i32 = -1;

const TOOL_MISSING_EXIT_CODE: i32 = 127;
const TIMED_OUT_EXIT_CODE: i32 = 124;

/// How long a child may take to exit after SIGTERM before it is killed
const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// Cooperative cancellation flag shared between the caller and the runner
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    flag: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation and wake any supervised command
    pub fn cancel(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Resolves once [`CancelToken::cancel`] has been called
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// How a supervised command ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandStatus {
    /// The process ran and exited on its own
    Exited,
    /// Stopped by a cancellation request
    Cancelled,
    /// The executable could not be found
    ToolMissing { tool: String, hint: Option<String> },
    /// Killed after exceeding the configured timeout
    TimedOut { seconds: u64 },
    /// The executable exists but could not be started
    LaunchFailed { message: String },
}

/// Final result of one command
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub succeeded: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub status: CommandStatus,
    pub duration: Duration,
}

impl CommandOutcome {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.status == CommandStatus::Cancelled
    }

    #[must_use]
    pub fn is_tool_missing(&self) -> bool {
        matches!(self.status, CommandStatus::ToolMissing { .. })
    }

    /// Stdout followed by stderr, the text fed to output classifiers
    #[must_use]
    pub fn combined_output(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }

    /// Stderr, or stdout when the command wrote nothing to stderr
    #[must_use]
    pub fn error_text(&self) -> &str {
        if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }
}

/// Advisory progress parsed from one line of build output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressHint {
    /// `[current/total]` as printed by ninja and CMake makefiles
    Fraction { current: u64, total: u64 },
    /// A compile step without numeric progress
    Activity(String),
}

fn fraction_regex() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\[(\d+)/(\d+)\]").ok())
        .as_ref()
}

/// Extract a progress hint from a stdout line
///
/// Returns `None` for lines that carry no progress signal.
#[must_use]
pub fn parse_progress(line: &str) -> Option<ProgressHint> {
    if let Some(caps) = fraction_regex().and_then(|re| re.captures(line)) {
        if let (Ok(current), Ok(total)) = (caps[1].parse(), caps[2].parse()) {
            return Some(ProgressHint::Fraction { current, total });
        }
    }
    if line.contains("Compiling") || line.contains(".o") {
        let activity = crate::utils::text::truncate_chars(line.trim(), 120);
        return Some(ProgressHint::Activity(activity.to_string()));
    }
    None
}

/// Installation hint for a missing build tool
fn install_hint(tool: &str) -> Option<&'static str> {
    let name = Path::new(tool)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(tool);
    match name {
        "cmake" | "ctest" => Some("Install with: sudo dnf install cmake"),
        "meson" => Some("Install with: sudo dnf install meson ninja-build"),
        "ninja" => Some("Install with: sudo dnf install ninja-build"),
        "make" => Some("Install with: sudo dnf install make"),
        "git" => Some("Install with: sudo dnf install git"),
        "gcc" | "cc" => Some("Install with: sudo dnf install gcc"),
        "g++" | "c++" => Some("Install with: sudo dnf install gcc-c++"),
        _ => None,
    }
}

enum SupervisedExit {
    Code(i32),
    Cancelled,
}

/// Runs one external command with streaming output and cancellation
pub struct ProcessRunner {
    session_id: String,
    event_sender: Option<EventSender>,
    cancel: CancelToken,
    timeout_secs: Option<u64>,
}

impl EventEmitter for ProcessRunner {
    fn event_sender(&self) -> Option<&EventSender> {
        self.event_sender.as_ref()
    }
}

impl ProcessRunner {
    #[must_use]
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            event_sender: None,
            cancel: CancelToken::new(),
            timeout_secs: None,
        }
    }

    #[must_use]
    pub fn with_event_sender(mut self, sender: Option<EventSender>) -> Self {
        self.event_sender = sender;
        self
    }

    #[must_use]
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, seconds: Option<u64>) -> Self {
        self.timeout_secs = seconds;
        self
    }

    /// Execute `argv` in `cwd`, streaming output until the process exits
    ///
    /// Launch failures, cancellation and timeouts are reported through
    /// [`CommandOutcome::status`] rather than as errors.
    ///
    /// # Errors
    ///
    /// Returns `ProcessError::EmptyCommand` for an empty argv and
    /// `ProcessError::OutputReadFailed` if the output pipes fail mid-stream.
    pub async fn run(
        self,
        argv: &[String],
        cwd: &Path,
        env: Option<&HashMap<String, String>>,
    ) -> Result<CommandOutcome, Error> {
        let Some((program, args)) = argv.split_first() else {
            return Err(ProcessError::EmptyCommand.into());
        };
        let display = argv.join(" ");
        let started = Instant::now();

        if self.cancel.is_cancelled() {
            return Ok(self.cancelled_outcome(&display, String::new(), String::new(), started));
        }

        self.emit_build(BuildEvent::CommandStarted {
            session_id: self.session_id.clone(),
            command: display.clone(),
            working_dir: cwd.to_path_buf(),
        });

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(env) = env {
            cmd.envs(env);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !program_exists(program, cwd) => {
                return Ok(self.tool_missing_outcome(program, started));
            }
            Err(e) => {
                let message = format!("Error running command: {e}");
                self.emit_debug(format!("{display}: {message}"));
                return Ok(CommandOutcome {
                    succeeded: false,
                    exit_code: TOOL_MISSING_EXIT_CODE,
                    stdout: String::new(),
                    stderr: message.clone(),
                    status: CommandStatus::LaunchFailed { message },
                    duration: started.elapsed(),
                });
            }
        };

        let mut stdout = String::new();
        let mut stderr = String::new();
        let supervised = self.supervise(&mut child, &display, &mut stdout, &mut stderr);

        let result = with_optional_timeout(supervised, self.timeout_secs, &display).await;
        if matches!(result, Err(Error::Process(ProcessError::Timeout { .. }))) {
            terminate(&mut child).await;
        }

        match result {
            Ok(SupervisedExit::Code(exit_code)) => {
                let duration = started.elapsed();
                self.emit_build(BuildEvent::CommandCompleted {
                    session_id: self.session_id.clone(),
                    command: display,
                    exit_code,
                    duration,
                });
                Ok(CommandOutcome {
                    succeeded: exit_code == 0,
                    exit_code,
                    stdout,
                    stderr,
                    status: CommandStatus::Exited,
                    duration,
                })
            }
            Ok(SupervisedExit::Cancelled) => {
                Ok(self.cancelled_outcome(&display, stdout, stderr, started))
            }
            Err(Error::Process(ProcessError::Timeout { seconds, .. })) => {
                self.emit_warning(format!("{display} timed out after {seconds} seconds"));
                stderr.push_str(&format!("\nCommand timed out after {seconds} seconds\n"));
                Ok(CommandOutcome {
                    succeeded: false,
                    exit_code: TIMED_OUT_EXIT_CODE,
                    stdout,
                    stderr,
                    status: CommandStatus::TimedOut { seconds },
                    duration: started.elapsed(),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn supervise(
        &self,
        child: &mut Child,
        display: &str,
        stdout_buf: &mut String,
        stderr_buf: &mut String,
    ) -> Result<SupervisedExit, Error> {
        let read_failed = |message: String| -> Error {
            ProcessError::OutputReadFailed {
                command: display.to_string(),
                message,
            }
            .into()
        };

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| read_failed("stdout was not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| read_failed("stderr was not captured".to_string()))?;

        let mut out_segments = BufReader::new(stdout).split(b'\n');
        let mut err_segments = BufReader::new(stderr).split(b'\n');
        let mut out_open = true;
        let mut err_open = true;

        while out_open || err_open {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    return Ok(terminate(child).await);
                }
                segment = out_segments.next_segment(), if out_open => match segment {
                    Ok(Some(bytes)) => self.handle_line(&bytes, false, stdout_buf),
                    Ok(None) => out_open = false,
                    Err(e) => return Err(read_failed(e.to_string())),
                },
                segment = err_segments.next_segment(), if err_open => match segment {
                    Ok(Some(bytes)) => self.handle_line(&bytes, true, stderr_buf),
                    Ok(None) => err_open = false,
                    Err(e) => return Err(read_failed(e.to_string())),
                },
            }
        }

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Ok(terminate(child).await),
            status = child.wait() => {
                let status = status.map_err(|e| read_failed(e.to_string()))?;
                Ok(SupervisedExit::Code(exit_code(status)))
            }
        }
    }

    fn handle_line(&self, bytes: &[u8], is_stderr: bool, buffer: &mut String) {
        let line = String::from_utf8_lossy(bytes);
        let line = line.trim_end_matches('\r');
        buffer.push_str(line);
        buffer.push('\n');

        if !is_stderr {
            if let Some(hint) = parse_progress(line) {
                let (current, total, activity) = match hint {
                    ProgressHint::Fraction { current, total } => (Some(current), Some(total), None),
                    ProgressHint::Activity(activity) => (None, None, Some(activity)),
                };
                self.emit_build(BuildEvent::Progress {
                    session_id: self.session_id.clone(),
                    current,
                    total,
                    activity,
                });
            }
        }

        self.emit_build(BuildEvent::StepOutput {
            session_id: self.session_id.clone(),
            line: line.to_string(),
            is_stderr,
        });
    }

    fn cancelled_outcome(
        &self,
        display: &str,
        stdout: String,
        mut stderr: String,
        started: Instant,
    ) -> CommandOutcome {
        self.emit_build(BuildEvent::CommandCancelled {
            session_id: self.session_id.clone(),
            command: display.to_string(),
        });
        stderr.push_str("Cancelled by user");
        CommandOutcome {
            succeeded: false,
            exit_code: CANCELLED_EXIT_CODE,
            stdout,
            stderr,
            status: CommandStatus::Cancelled,
            duration: started.elapsed(),
        }
    }

    fn tool_missing_outcome(&self, program: &str, started: Instant) -> CommandOutcome {
        let hint = install_hint(program).map(str::to_string);
        let mut stderr = format!(
            "Command not found: {program}\n\nThe required build tool is not installed.\n"
        );
        if let Some(hint) = &hint {
            stderr.push_str(hint);
            stderr.push('\n');
        }

        self.emit_build(BuildEvent::ToolMissing {
            session_id: self.session_id.clone(),
            tool: program.to_string(),
            hint: hint.clone(),
        });

        CommandOutcome {
            succeeded: false,
            exit_code: TOOL_MISSING_EXIT_CODE,
            stdout: String::new(),
            stderr,
            status: CommandStatus::ToolMissing {
                tool: program.to_string(),
                hint,
            },
            duration: started.elapsed(),
        }
    }
}

/// Hands out a fresh [`ProcessRunner`] per command with shared session wiring
#[derive(Debug, Clone)]
pub struct RunnerFactory {
    session_id: String,
    event_sender: Option<EventSender>,
    cancel: CancelToken,
    timeout_secs: Option<u64>,
}

impl RunnerFactory {
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        event_sender: Option<EventSender>,
        cancel: CancelToken,
        timeout_secs: Option<u64>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            event_sender,
            cancel,
            timeout_secs,
        }
    }

    /// Runner using the session-wide timeout
    #[must_use]
    pub fn runner(&self) -> ProcessRunner {
        ProcessRunner::new(self.session_id.clone())
            .with_event_sender(self.event_sender.clone())
            .with_cancel_token(self.cancel.clone())
            .with_timeout(self.timeout_secs)
    }

    /// Runner bounded by `seconds`, or the session timeout if that is shorter
    #[must_use]
    pub fn runner_with_timeout(&self, seconds: u64) -> ProcessRunner {
        let effective = self.timeout_secs.map_or(seconds, |session| session.min(seconds));
        self.runner().with_timeout(Some(effective))
    }

    #[must_use]
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    #[must_use]
    pub fn event_sender(&self) -> Option<&EventSender> {
        self.event_sender.as_ref()
    }
}

impl EventEmitter for RunnerFactory {
    fn event_sender(&self) -> Option<&EventSender> {
        self.event_sender.as_ref()
    }
}

/// Whether a spawn `NotFound` was caused by something other than the program
fn program_exists(program: &str, cwd: &Path) -> bool {
    if program.contains('/') {
        cwd.join(program).exists()
    } else {
        which::which(program).is_ok()
    }
}

/// Stop a child with SIGTERM, escalating to a kill after [`TERMINATE_GRACE`]
async fn terminate(child: &mut Child) -> SupervisedExit {
    if send_sigterm(child)
        && tokio::time::timeout(TERMINATE_GRACE, child.wait())
            .await
            .is_ok()
    {
        return SupervisedExit::Cancelled;
    }
    tracing::debug!(pid = ?child.id(), "child still running after SIGTERM, killing");
    // Already-exited children make start_kill fail; the wait still reaps them
    let _ = child.start_kill();
    let _ = child.wait().await;
    SupervisedExit::Cancelled
}

#[cfg(unix)]
fn send_sigterm(child: &Child) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id().and_then(|id| i32::try_from(id).ok()) else {
        return false;
    };
    kill(Pid::from_raw(pid), Signal::SIGTERM).is_ok()
}

#[cfg(not(unix))]
fn send_sigterm(_child: &Child) -> bool {
    false
}

fn exit_code(status: ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    status.code().unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|p| (*p).to_string()).collect()
    }

    #[test]
    fn test_parse_progress_fraction() {
        assert_eq!(
            parse_progress("[12/340] Building C object foo.c.o"),
            Some(ProgressHint::Fraction {
                current: 12,
                total: 340
            })
        );
    }

    #[test]
    fn test_parse_progress_activity_and_none() {
        assert!(matches!(
            parse_progress("  Compiling src/main.c"),
            Some(ProgressHint::Activity(_))
        ));
        assert_eq!(parse_progress("checking for gcc... yes"), None);
    }

    #[test]
    fn test_install_hint_by_basename() {
        assert_eq!(
            install_hint("/usr/bin/meson"),
            Some("Install with: sudo dnf install meson ninja-build")
        );
        assert_eq!(install_hint("frobnicate"), None);
    }

    #[tokio::test]
    async fn test_run_captures_output_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = srcforge_events::channel();
        let outcome = ProcessRunner::new("t")
            .with_event_sender(Some(tx))
            .run(
                &argv(&["sh", "-c", "echo out; echo err >&2; exit 3"]),
                dir.path(),
                None,
            )
            .await
            .unwrap();

        assert!(!outcome.succeeded);
        assert_eq!(outcome.exit_code, 3);
        assert_eq!(outcome.stdout, "out\n");
        assert_eq!(outcome.stderr, "err\n");
        assert_eq!(outcome.status, CommandStatus::Exited);

        let mut saw_stderr_line = false;
        while let Ok(event) = rx.try_recv() {
            if let srcforge_events::AppEvent::Build(BuildEvent::StepOutput {
                line, is_stderr, ..
            }) = event
            {
                if is_stderr && line == "err" {
                    saw_stderr_line = true;
                }
            }
        }
        assert!(saw_stderr_line);
    }

    #[tokio::test]
    async fn test_env_is_passed_to_child() {
        let dir = tempfile::tempdir().unwrap();
        let env = HashMap::from([("SRCFORGE_MARKER".to_string(), "42".to_string())]);
        let outcome = ProcessRunner::new("t")
            .run(
                &argv(&["sh", "-c", "echo $SRCFORGE_MARKER"]),
                dir.path(),
                Some(&env),
            )
            .await
            .unwrap();
        assert!(outcome.succeeded);
        assert_eq!(outcome.stdout.trim(), "42");
    }

    #[tokio::test]
    async fn test_missing_tool_is_classified() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = ProcessRunner::new("t")
            .run(&argv(&["srcforge-no-such-tool-xyz"]), dir.path(), None)
            .await
            .unwrap();
        assert!(outcome.is_tool_missing());
        assert!(outcome.stderr.starts_with("Command not found: srcforge-no-such-tool-xyz"));
    }

    #[tokio::test]
    async fn test_empty_command_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = ProcessRunner::new("t").run(&[], dir.path(), None).await;
        assert!(matches!(
            result,
            Err(Error::Process(ProcessError::EmptyCommand))
        ));
    }

    #[tokio::test]
    async fn test_cancel_in_flight_command() {
        let dir = tempfile::tempdir().unwrap();
        let token = CancelToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let outcome = ProcessRunner::new("t")
            .with_cancel_token(token)
            .run(&argv(&["sleep", "30"]), dir.path(), None)
            .await
            .unwrap();

        assert!(!outcome.succeeded);
        assert!(outcome.is_cancelled());
        assert_eq!(outcome.exit_code, CANCELLED_EXIT_CODE);
        assert!(outcome.stderr.contains("Cancelled by user"));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancel_lets_child_handle_sigterm() {
        let dir = tempfile::tempdir().unwrap();
        let token = CancelToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            // Give the shell time to install its trap
            tokio::time::sleep(Duration::from_millis(300)).await;
            canceller.cancel();
        });

        let outcome = ProcessRunner::new("t")
            .with_cancel_token(token)
            .run(
                &argv(&[
                    "sh",
                    "-c",
                    "trap 'touch stopped; exit 0' TERM; while :; do sleep 0.1; done",
                ]),
                dir.path(),
                None,
            )
            .await
            .unwrap();

        assert!(outcome.is_cancelled());
        assert_eq!(outcome.exit_code, CANCELLED_EXIT_CODE);
        assert!(dir.path().join("stopped").exists(), "TERM handler did not run");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancel_kills_child_ignoring_sigterm() {
        let dir = tempfile::tempdir().unwrap();
        let token = CancelToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let outcome = ProcessRunner::new("t")
            .with_cancel_token(token)
            .run(
                &argv(&["sh", "-c", "trap '' TERM; while :; do sleep 0.1; done"]),
                dir.path(),
                None,
            )
            .await
            .unwrap();

        assert!(outcome.is_cancelled());
        let elapsed = started.elapsed();
        assert!(elapsed >= TERMINATE_GRACE, "{elapsed:?}");
        assert!(elapsed < TERMINATE_GRACE + Duration::from_secs(10), "{elapsed:?}");
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_skips_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let token = CancelToken::new();
        token.cancel();
        let outcome = ProcessRunner::new("t")
            .with_cancel_token(token)
            .run(&argv(&["srcforge-no-such-tool-xyz"]), dir.path(), None)
            .await
            .unwrap();
        assert!(outcome.is_cancelled());
    }

    #[tokio::test]
    async fn test_timeout_kills_command() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = ProcessRunner::new("t")
            .with_timeout(Some(1))
            .run(&argv(&["sleep", "30"]), dir.path(), None)
            .await
            .unwrap();
        assert_eq!(outcome.status, CommandStatus::TimedOut { seconds: 1 });
        assert!(!outcome.succeeded);
    }
}
