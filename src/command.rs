use std::ffi::{OsStr, OsString};
use std::io::Read;
use std::os::unix::process::ExitStatusExt;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Instant;

use bstr::ByteSlice;

use crate::log::{self, LoggableIoError};
use crate::timing::{Duration, DurationUnit};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Argument(OsString);

impl serde::Serialize for Argument {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // Escape rather than replacing unknown bytes with �.
        match <[u8]>::from_os_str(&self.0) {
            Some(bytes) => serializer.serialize_str(&bytes.escape_bytes().collect::<String>()),
            None => serializer.serialize_str(&self.0.to_string_lossy()),
        }
    }
}

impl std::fmt::Display for Argument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.to_string_lossy().fmt(f)
    }
}

impl AsRef<OsStr> for Argument {
    fn as_ref(&self) -> &OsStr {
        &self.0
    }
}

impl From<&OsStr> for Argument {
    fn from(value: &OsStr) -> Self {
        Self(value.to_owned())
    }
}

impl From<OsString> for Argument {
    fn from(value: OsString) -> Self {
        Self(value)
    }
}

impl From<&str> for Argument {
    fn from(value: &str) -> Self {
        Self(value.into())
    }
}

impl From<String> for Argument {
    fn from(value: String) -> Self {
        Self(value.into())
    }
}

/// A single call to an init system's command-line tool.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Invocation {
    pub command: Argument,
    pub arguments: Vec<Argument>,
}

impl Invocation {
    pub fn new(
        command: impl Into<Argument>,
        arguments: impl IntoIterator<Item = impl Into<Argument>>,
    ) -> Self {
        Self {
            command: command.into(),
            arguments: arguments.into_iter().map(Into::into).collect(),
        }
    }
}

impl std::fmt::Display for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.command.fmt(f)?;
        for argument in &self.arguments {
            write!(f, " {}", argument)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ExitStatus {
    None,
    ExitedWithCode(u8),
    ExitedWithSignal(u8),
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(exit_status: std::process::ExitStatus) -> Self {
        match exit_status.code() {
            None => match exit_status.signal() {
                None => ExitStatus::None,
                Some(signal) => match u8::try_from(signal).ok() {
                    None => ExitStatus::None,
                    Some(signal) => ExitStatus::ExitedWithSignal(signal),
                },
            },
            Some(code) => match u8::try_from(code).ok() {
                None => ExitStatus::None,
                Some(code) => ExitStatus::ExitedWithCode(code),
            },
        }
    }
}

impl std::fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "no exit status"),
            Self::ExitedWithCode(code) => write!(f, "exit code {}", code),
            Self::ExitedWithSignal(signal) => write!(f, "signal {}", signal),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, serde::Serialize)]
#[serde(tag = "code")]
pub enum CommandError {
    #[error("could not run `{command}`: {inner}")]
    SpawnFailed {
        command: String,
        inner: LoggableIoError,
    },
    #[error("`{command}` exited with {status}")]
    ExitedAbnormally {
        command: String,
        status: ExitStatus,
        output: String,
        errors: String,
    },
    #[error("`{command}` did not finish within {timeout}")]
    TimedOut {
        command: String,
        timeout: Duration,
        output: String,
    },
}

impl CommandError {
    /// Whatever the command wrote to stdout before it failed.
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::SpawnFailed { .. } => None,
            Self::ExitedAbnormally { output, .. } | Self::TimedOut { output, .. } => {
                Some(output.as_str())
            }
        }
    }
}

/// Executes init system commands.
///
/// Returns captured stdout on success. Failures keep whatever output was
/// produced, so that status queries can still interpret it.
pub trait CommandRunner: Send + Sync {
    fn run(&self, invocation: &Invocation) -> Result<String, CommandError>;
}

/// Runs commands as child processes, killing any that exceed the timeout.
#[derive(Debug, Clone)]
pub struct SystemCommandRunner {
    timeout: Duration,
}

impl Default for SystemCommandRunner {
    fn default() -> Self {
        Self::new(Duration::COMMAND_TIMEOUT)
    }
}

impl SystemCommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl CommandRunner for SystemCommandRunner {
    fn run(&self, invocation: &Invocation) -> Result<String, CommandError> {
        let command = invocation.to_string();
        log::trace!(event = "COMMAND", invocation);
        let mut child = Command::new(&invocation.command)
            .args(&invocation.arguments)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|error| CommandError::SpawnFailed {
                command: command.clone(),
                inner: error.into(),
            })?;

        let stdout = capture(child.stdout.take());
        let stderr = capture(child.stderr.take());
        let finished = wait_for(&mut child, self.timeout);
        let output = collect(stdout);
        let errors = collect(stderr);

        match finished {
            Ok(Some(status)) if status.success() => Ok(output),
            Ok(Some(status)) => Err(CommandError::ExitedAbnormally {
                command,
                status: status.into(),
                output,
                errors,
            }),
            Ok(None) => Err(CommandError::TimedOut {
                command,
                timeout: self.timeout,
                output,
            }),
            Err(error) => Err(CommandError::SpawnFailed {
                command,
                inner: error.into(),
            }),
        }
    }
}

type Capture = Option<thread::JoinHandle<Vec<u8>>>;

// Each pipe is drained on its own thread while the child runs.
fn capture(pipe: Option<impl Read + Send + 'static>) -> Capture {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            let _ = pipe.read_to_end(&mut buffer);
            buffer
        })
    })
}

fn collect(capture: Capture) -> String {
    capture
        .and_then(|handle| handle.join().ok())
        .map(|bytes| bytes.to_str_lossy().into_owned())
        .unwrap_or_default()
}

/// Waits for the child to exit. Returns `None` if it had to be killed.
fn wait_for(
    child: &mut Child,
    timeout: Duration,
) -> std::io::Result<Option<std::process::ExitStatus>> {
    let timeout: std::time::Duration = timeout.into();
    let started = Instant::now();
    let mut delay: std::time::Duration = Duration::of(1, DurationUnit::Milliseconds).into();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if started.elapsed() >= timeout {
            kill(child);
            child.wait()?;
            return Ok(None);
        }
        thread::sleep(delay);
        delay = (delay * 2).min(Duration::QUANTUM.into());
    }
}

fn kill(child: &Child) {
    let Ok(raw_process_id) = i32::try_from(child.id()) else {
        return;
    };
    let process_id = nix::unistd::Pid::from_raw(raw_process_id);
    match nix::sys::signal::kill(process_id, nix::sys::signal::Signal::SIGKILL) {
        Ok(()) => {}
        Err(nix::errno::Errno::ESRCH) => {} // the process already exited
        Err(error) => {
            let error = std::io::Error::from_raw_os_error(error as i32);
            log::error!(event = "COMMAND", process_id = raw_process_id, error = error.log());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::prelude::OsStrExt;

    use super::*;

    #[test]
    #[ntest::timeout(2000)]
    fn test_captures_output() -> anyhow::Result<()> {
        let runner = SystemCommandRunner::default();

        let output = runner.run(&Invocation::new("echo", ["active"]))?;

        assert_eq!(output, "active\n");
        Ok(())
    }

    #[test]
    #[ntest::timeout(2000)]
    fn test_keeps_output_when_the_command_fails() {
        let runner = SystemCommandRunner::default();

        let result = runner.run(&Invocation::new(
            "sh",
            ["-c", "echo inactive; echo oops >&2; exit 3"],
        ));

        assert_eq!(
            result,
            Err(CommandError::ExitedAbnormally {
                command: "sh -c echo inactive; echo oops >&2; exit 3".to_owned(),
                status: ExitStatus::ExitedWithCode(3),
                output: "inactive\n".to_owned(),
                errors: "oops\n".to_owned(),
            })
        );
        assert_eq!(
            result.err().as_ref().and_then(CommandError::output),
            Some("inactive\n")
        );
    }

    #[test]
    #[ntest::timeout(2000)]
    fn test_reports_programs_that_cannot_be_run() {
        let runner = SystemCommandRunner::default();

        let result = runner.run(&Invocation::new(
            "/definitely/not/a/real/program",
            Vec::<String>::new(),
        ));

        match result {
            Err(error @ CommandError::SpawnFailed { .. }) => assert_eq!(error.output(), None),
            other => panic!("Expected a spawn failure, got {:?}", other),
        }
    }

    #[test]
    #[ntest::timeout(5000)]
    fn test_kills_commands_that_take_too_long() {
        let runner = SystemCommandRunner::new(Duration::of(200, DurationUnit::Milliseconds));
        let started = Instant::now();

        let result = runner.run(&Invocation::new("sleep", ["10"]));

        assert!(
            matches!(result, Err(CommandError::TimedOut { .. })),
            "Expected a timeout, got {:?}",
            result
        );
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }

    #[test]
    #[ntest::timeout(2000)]
    fn test_runs_scripts_that_report_through_their_exit_code() -> anyhow::Result<()> {
        let directory = tempfile::tempdir()?;
        let script = directory.path().join("is-active.sh");
        std::fs::write(&script, "echo \"$1\"\nexit 3\n")?;
        let runner = SystemCommandRunner::default();

        let result = runner.run(&Invocation::new(
            "sh",
            [script.as_os_str(), OsStr::new("inactive")],
        ));

        match result {
            Err(error @ CommandError::ExitedAbnormally { .. }) => {
                assert_eq!(error.output(), Some("inactive\n"));
            }
            other => panic!("Expected an abnormal exit, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_displaying_an_invocation() {
        let invocation = Invocation::new("systemctl", ["is-active", "redirectd"]);

        assert_eq!(invocation.to_string(), "systemctl is-active redirectd");
    }

    #[test]
    fn test_serializing_an_argument() -> anyhow::Result<()> {
        let argument = Argument::from(OsStr::from_bytes(b"/etc/sv/dummy\x01"));

        let serialized = serde_json::to_string(&argument)?;

        assert_eq!(serialized, "\"/etc/sv/dummy\\\\x01\"");
        Ok(())
    }
}
