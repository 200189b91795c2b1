//! Process invocations, outcomes and the execution layer.

use std::collections::BTreeMap;
use std::io::Read;
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use wait_timeout::ChildExt;

use super::adapter::{CommandLine, TestFrameworkAdapter};
use super::mutant::Mutation;

/// Maximum number of characters kept by [`truncate_preview`].
pub const PREVIEW_CHARS: usize = 2048;

/// How long output pipes may stay open once the process itself is gone.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Fully resolved description of one test process. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInvocation {
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    working_dir: PathBuf,
    timeout: Option<Duration>,
}

impl ProcessInvocation {
    fn from_command_line(
        command: CommandLine,
        working_dir: &Path,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            program: command.program,
            args: command.args,
            env: command.env,
            working_dir: working_dir.to_path_buf(),
            timeout,
        }
    }

    /// Program to execute.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Program arguments.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Extra environment variables.
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Working directory of the process.
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Time limit, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Shell-like rendering for logs.
    pub fn display_command(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.env {
            out.push_str(&format!("{key}={value} "));
        }
        out.push_str(&self.program);
        for arg in &self.args {
            out.push(' ');
            out.push_str(arg);
        }
        out
    }
}

/// What happened when a test process ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessOutcome {
    /// Exit code; `None` when the process was killed by a signal or never started.
    pub exit_code: Option<i32>,
    /// Captured stdout.
    #[serde(default)]
    pub stdout: String,
    /// Captured stderr.
    #[serde(default)]
    pub stderr: String,
    /// Wall-clock duration.
    #[serde(rename = "duration_ms", with = "duration_ms", default)]
    pub duration: Duration,
    /// Set when the execution layer killed the process for exceeding its time limit.
    #[serde(default)]
    pub timed_out: bool,
}

impl ProcessOutcome {
    /// Outcome of a process that exited with `code`.
    pub fn exited(code: i32) -> Self {
        Self {
            exit_code: Some(code),
            stdout: String::new(),
            stderr: String::new(),
            duration: Duration::ZERO,
            timed_out: false,
        }
    }

    /// Outcome of a process killed after its time limit.
    pub fn timed_out() -> Self {
        Self {
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            duration: Duration::ZERO,
            timed_out: true,
        }
    }

    /// Outcome of a process that could not be started or waited on.
    pub fn failed_to_start(message: impl Into<String>) -> Self {
        Self {
            exit_code: None,
            stdout: String::new(),
            stderr: message.into(),
            duration: Duration::ZERO,
            timed_out: false,
        }
    }

    /// Set captured output.
    pub fn with_output(mut self, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self.stderr = stderr.into();
        self
    }

    /// Set the wall-clock duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Conventional description of the exit code.
    pub fn exit_code_text(&self) -> &'static str {
        if self.timed_out {
            return "Timed out";
        }
        exit_code_text(self.exit_code)
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Conventional meaning of a process exit code (shell and POSIX signal conventions).
pub fn exit_code_text(code: Option<i32>) -> &'static str {
    let Some(code) = code else {
        return "Terminated by signal or not started";
    };
    match code {
        0 => "OK",
        1 => "General error",
        2 => "Misuse of shell builtins",
        100 => "Tests failed (nextest)",
        101 => "Tests failed (cargo)",
        126 => "Invoked command cannot execute",
        127 => "Command not found",
        128 => "Invalid exit argument",
        129 => "Hangup",
        130 => "Interrupt",
        131 => "Quit and dump core",
        132 => "Illegal instruction",
        133 => "Trace/breakpoint trap",
        134 => "Process aborted",
        135 => "Bus error",
        136 => "Floating point exception",
        137 => "Kill (terminate immediately)",
        138 => "User-defined 1",
        139 => "Segmentation violation",
        140 => "User-defined 2",
        141 => "Write to pipe with no one reading",
        142 => "Signal raised by alarm",
        143 => "Termination (request to terminate)",
        _ => "Unknown error",
    }
}

/// Keep at most [`PREVIEW_CHARS`] trailing characters of captured output.
pub fn truncate_preview(text: &str) -> String {
    let count = text.chars().count();
    if count <= PREVIEW_CHARS {
        return text.to_string();
    }
    let tail: String = text.chars().skip(count - PREVIEW_CHARS).collect();
    format!("...{tail}")
}

/// Builds process invocations for the baseline and for each mutation.
///
/// Pure: building never starts a process, and the same inputs always produce
/// the same invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessFactory {
    project_dir: PathBuf,
    mutant_timeout: Option<Duration>,
}

impl ProcessFactory {
    /// Factory running every process in `project_dir`.
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            mutant_timeout: None,
        }
    }

    /// Time limit applied to mutant invocations (never to the baseline).
    pub fn with_mutant_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.mutant_timeout = timeout;
        self
    }

    /// Invocation of the unmodified test suite.
    pub fn build_baseline(&self, adapter: &dyn TestFrameworkAdapter) -> ProcessInvocation {
        ProcessInvocation::from_command_line(adapter.baseline_command(), &self.project_dir, None)
    }

    /// Invocation testing one mutation.
    pub fn build(
        &self,
        mutation: &Mutation,
        adapter: &dyn TestFrameworkAdapter,
    ) -> ProcessInvocation {
        ProcessInvocation::from_command_line(
            adapter.mutant_command(mutation),
            &self.project_dir,
            self.mutant_timeout,
        )
    }
}

/// Execution-layer errors.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The program could not be started.
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },
    /// Waiting on or killing the process failed.
    #[error("failed to wait for `{program}`: {source}")]
    Wait {
        /// Program being waited on.
        program: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },
}

/// Runs a [`ProcessInvocation`] to completion and reports its outcome.
///
/// Implementations enforce the invocation's timeout and report expiry through
/// [`ProcessOutcome::timed_out`]. Workers call this concurrently.
pub trait ProcessExecutor: Send + Sync {
    /// Run one invocation, blocking until the process terminates.
    fn execute(&self, invocation: &ProcessInvocation) -> Result<ProcessOutcome, ExecutionError>;
}

/// Execute, turning an execution-layer error into an outcome without an exit code.
pub(crate) fn execute_or_record(
    executor: &dyn ProcessExecutor,
    invocation: &ProcessInvocation,
) -> ProcessOutcome {
    let started = Instant::now();
    match executor.execute(invocation) {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::debug!(command = %invocation.display_command(), error = %err, "process did not run");
            ProcessOutcome::failed_to_start(err.to_string()).with_duration(started.elapsed())
        }
    }
}

/// [`ProcessExecutor`] backed by `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandExecutor;

/// Output read from one pipe by a background thread.
struct Drain {
    buffer: Arc<Mutex<Vec<u8>>>,
    done: Receiver<()>,
}

impl Drain {
    fn start<R>(mut pipe: R) -> Self
    where
        R: Read + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let (finished, done) = mpsc::channel();
        let sink = Arc::clone(&buffer);
        thread::spawn(move || {
            let mut chunk = [0u8; 8192];
            loop {
                match pipe.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => sink
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .extend_from_slice(&chunk[..n]),
                }
            }
            let _ = finished.send(());
        });
        Self { buffer, done }
    }

    /// Wait for end of file, at most `limit`, and return whatever was read.
    fn finish(self, limit: Option<Duration>) -> String {
        match limit {
            Some(limit) => {
                let _ = self.done.recv_timeout(limit);
            }
            None => {
                let _ = self.done.recv();
            }
        }
        let raw = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&raw).into_owned()
    }
}

fn finish_drain(drain: Option<Drain>, limit: Option<Duration>) -> String {
    drain.map(|drain| drain.finish(limit)).unwrap_or_default()
}

/// Kill the process group led by `child`, then the child itself.
#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
        // SAFETY: the child leads its own group and has not been reaped, so `pgid` is still ours.
        unsafe {
            libc::killpg(pgid, libc::SIGKILL);
        }
    }
    let _ = child.kill();
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) {
    let _ = child.kill();
}

impl ProcessExecutor for CommandExecutor {
    fn execute(&self, invocation: &ProcessInvocation) -> Result<ProcessOutcome, ExecutionError> {
        let program = invocation.program().to_string();
        let started = Instant::now();

        let mut command = Command::new(invocation.program());
        command
            .args(invocation.args())
            .envs(invocation.env())
            .current_dir(invocation.working_dir())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // Own group, so a timeout also reaches grandchildren holding the pipes.
        #[cfg(unix)]
        command.process_group(0);
        let mut child = command.spawn().map_err(|source| ExecutionError::Spawn {
            program: program.clone(),
            source,
        })?;

        // Drain both pipes while waiting so a chatty test suite cannot fill a pipe and stall.
        let stdout = child.stdout.take().map(Drain::start);
        let stderr = child.stderr.take().map(Drain::start);
        let wait_error = |source| ExecutionError::Wait {
            program: program.clone(),
            source,
        };

        let (status, timed_out) = match invocation.timeout() {
            Some(limit) => match child.wait_timeout(limit).map_err(wait_error)? {
                Some(status) => (Some(status), false),
                None => {
                    kill_tree(&mut child);
                    child.wait().map_err(wait_error)?;
                    (None, true)
                }
            },
            None => (Some(child.wait().map_err(wait_error)?), false),
        };

        let drain_limit = if timed_out {
            Some(DRAIN_GRACE)
        } else {
            invocation
                .timeout()
                .map(|limit| limit.saturating_sub(started.elapsed()) + DRAIN_GRACE)
        };
        let stdout = finish_drain(stdout, drain_limit);
        let stderr = finish_drain(stderr, drain_limit);

        Ok(ProcessOutcome {
            exit_code: status.and_then(|status| status.code()),
            stdout,
            stderr,
            duration: started.elapsed(),
            timed_out,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::adapter::CustomCommandAdapter;

    fn adapter() -> CustomCommandAdapter {
        CustomCommandAdapter::new("run-tests", vec!["--mutant={mutation}".to_string()])
    }

    #[test]
    fn factory_is_deterministic_and_scopes_timeout_to_mutants() {
        let factory =
            ProcessFactory::new("/work/project").with_mutant_timeout(Some(Duration::from_secs(9)));
        let mutation = Mutation::new("m1", "replace < with <=").with_selector("sel-1");

        let first = factory.build(&mutation, &adapter());
        let second = factory.build(&mutation, &adapter());
        assert_eq!(first, second);
        assert_eq!(first.program(), "run-tests");
        assert_eq!(first.args(), ["--mutant=sel-1".to_string()]);
        assert_eq!(first.working_dir(), Path::new("/work/project"));
        assert_eq!(first.timeout(), Some(Duration::from_secs(9)));

        let baseline = factory.build_baseline(&adapter());
        assert_eq!(baseline.timeout(), None);
        assert!(baseline.env().is_empty());
    }

    #[test]
    fn display_command_lists_env_program_and_args() {
        let factory = ProcessFactory::new(".");
        let invocation = factory.build(&Mutation::new("m2", "label"), &adapter());
        assert_eq!(
            invocation.display_command(),
            "MUTATION_ID=m2 run-tests --mutant=m2"
        );
    }

    #[test]
    fn exit_code_text_covers_common_codes() {
        assert_eq!(exit_code_text(Some(0)), "OK");
        assert_eq!(exit_code_text(Some(127)), "Command not found");
        assert_eq!(exit_code_text(Some(42)), "Unknown error");
        assert_eq!(exit_code_text(None), "Terminated by signal or not started");
        assert_eq!(ProcessOutcome::timed_out().exit_code_text(), "Timed out");
    }

    #[test]
    fn truncate_preview_keeps_tail_on_char_boundaries() {
        let short = "all tests passed";
        assert_eq!(truncate_preview(short), short);

        let long = "é".repeat(PREVIEW_CHARS + 10);
        let preview = truncate_preview(&long);
        assert!(preview.starts_with("..."));
        assert_eq!(preview.chars().count(), PREVIEW_CHARS + 3);
    }

    #[test]
    fn outcome_serializes_duration_as_millis() {
        let outcome = ProcessOutcome::exited(1).with_duration(Duration::from_millis(1500));
        let json = serde_json::to_value(&outcome).expect("outcome should serialize");
        assert_eq!(json["duration_ms"], 1500);
        let back: ProcessOutcome = serde_json::from_value(json).expect("outcome should parse");
        assert_eq!(back, outcome);
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let factory = ProcessFactory::new(".");
        let adapter = CustomCommandAdapter::new("definitely-not-a-real-binary-4f1c", Vec::new());
        let invocation = factory.build_baseline(&adapter);
        let err = CommandExecutor
            .execute(&invocation)
            .expect_err("spawn should fail");
        assert!(matches!(err, ExecutionError::Spawn { .. }));

        let recorded = execute_or_record(&CommandExecutor, &invocation);
        assert_eq!(recorded.exit_code, None);
        assert!(!recorded.timed_out);
        assert!(recorded.stderr.contains("definitely-not-a-real-binary-4f1c"));
    }

    #[cfg(unix)]
    #[test]
    fn command_executor_captures_exit_code_and_output() {
        let adapter = CustomCommandAdapter::new(
            "sh",
            vec![
                "-c".to_string(),
                "echo out-{mutation}; echo err >&2; exit 3".to_string(),
            ],
        );
        let invocation = ProcessFactory::new(".").build(&Mutation::new("m9", ""), &adapter);

        let outcome = CommandExecutor
            .execute(&invocation)
            .expect("sh should run");
        assert_eq!(outcome.exit_code, Some(3));
        assert_eq!(outcome.stdout.trim(), "out-m9");
        assert_eq!(outcome.stderr.trim(), "err");
        assert!(!outcome.timed_out);
    }

    #[cfg(unix)]
    #[test]
    fn command_executor_passes_mutation_env() {
        let adapter = CustomCommandAdapter::new(
            "sh",
            vec!["-c".to_string(), "printf %s \"$MUTATION_ID\"".to_string()],
        );
        let invocation = ProcessFactory::new(".").build(&Mutation::new("m-env", ""), &adapter);
        let outcome = CommandExecutor
            .execute(&invocation)
            .expect("sh should run");
        assert_eq!(outcome.stdout, "m-env");
    }

    #[cfg(unix)]
    #[test]
    fn command_executor_kills_on_timeout() {
        let adapter = CustomCommandAdapter::new("sleep", vec!["5".to_string()]);
        let invocation = ProcessFactory::new(".")
            .with_mutant_timeout(Some(Duration::from_millis(100)))
            .build(&Mutation::new("slow", ""), &adapter);

        let outcome = CommandExecutor
            .execute(&invocation)
            .expect("sleep should run");
        assert!(outcome.timed_out);
        assert_eq!(outcome.exit_code, None);
        assert!(outcome.duration < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn command_executor_timeout_reaches_grandchildren() {
        // `; true` keeps sh alive as the parent of `sleep`, which inherits the output pipes.
        let adapter = CustomCommandAdapter::new(
            "sh",
            vec!["-c".to_string(), "sleep 4; true".to_string()],
        );
        let invocation = ProcessFactory::new(".")
            .with_mutant_timeout(Some(Duration::from_millis(200)))
            .build(&Mutation::new("nested", ""), &adapter);

        let started = Instant::now();
        let outcome = CommandExecutor
            .execute(&invocation)
            .expect("sh should run");
        assert!(outcome.timed_out);
        assert!(
            started.elapsed() < Duration::from_secs(2),
            "execute took {:?}",
            started.elapsed()
        );
    }
}
