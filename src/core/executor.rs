//! Child process execution for the Databricks CLI.
//!
//! Everything that spawns a process goes through [`ProcessRunner`] so command
//! handlers can be exercised with a recording double instead of a real binary.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::defaults::Defaults;
use crate::env::{EnvSnapshot, EnvVar};
use crate::error::{CommandFailedDetails, Error, Result};
use crate::utils::command::{display_command, CapturedOutput};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A fully assembled process invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
    pub current_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn envs<I>(mut self, envs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.envs.extend(envs);
        self
    }

    pub fn display(&self) -> String {
        display_command(&self.program, &self.args)
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

/// Runs external processes. Non-zero exits are errors, never silently ignored.
pub trait ProcessRunner {
    /// Run with stdout/stderr passed through to the terminal.
    fn run_streaming(&self, spec: &CommandSpec) -> Result<()>;

    /// Run and return stdout. Stderr is kept for error reporting only.
    fn run_capturing(&self, spec: &CommandSpec) -> Result<String>;
}

/// Spawns real child processes, killing any that outlive `timeout`.
#[derive(Debug, Clone, Copy)]
pub struct SystemRunner {
    timeout: Duration,
}

impl SystemRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Timeout from BRICKFLOW_BUNDLE_CLI_TIMEOUT, falling back to config.
    pub fn from_config(env: &EnvSnapshot, defaults: &Defaults) -> Result<Self> {
        let secs = match env.get(EnvVar::BundleCliTimeout) {
            Some(raw) => raw.parse::<u64>().map_err(|_| {
                Error::config_invalid_value(
                    EnvVar::BundleCliTimeout.as_str(),
                    Some(raw.to_string()),
                    "expected a whole number of seconds",
                )
            })?,
            None => defaults.bundle_cli.timeout_secs,
        };
        Ok(Self::new(Duration::from_secs(secs)))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn spawn(&self, spec: &CommandSpec, mut cmd: Command) -> Result<Child> {
        cmd.spawn()
            .map_err(|e| Error::cli_not_found(spec.program.clone(), e.to_string()))
    }

    fn wait(&self, spec: &CommandSpec, child: &mut Child) -> Result<ExitStatus> {
        let started = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => {}
                Err(e) => {
                    return Err(Error::internal_io(
                        e.to_string(),
                        Some(format!("wait for {}", spec.program)),
                    ))
                }
            }

            if started.elapsed() >= self.timeout {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::cli_command_timeout(
                    spec.display(),
                    self.timeout.as_secs(),
                ));
            }

            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(Defaults::default().bundle_cli.timeout_secs))
    }
}

impl ProcessRunner for SystemRunner {
    fn run_streaming(&self, spec: &CommandSpec) -> Result<()> {
        crate::log_status!("exec", "{}", spec.display());

        let mut cmd = spec.to_command();
        cmd.stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let mut child = self.spawn(spec, cmd)?;
        let status = self.wait(spec, &mut child)?;
        require_success(spec, status, CapturedOutput::default())
    }

    fn run_capturing(&self, spec: &CommandSpec) -> Result<String> {
        let mut cmd = spec.to_command();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = self.spawn(spec, cmd)?;
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = self.wait(spec, &mut child)?;
        let output = CapturedOutput::from_bytes(&collect(stdout), &collect(stderr));
        let stdout = output.stdout.clone();
        require_success(spec, status, output)?;
        Ok(stdout)
    }
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        buf
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

fn require_success(spec: &CommandSpec, status: ExitStatus, output: CapturedOutput) -> Result<()> {
    if status.success() {
        return Ok(());
    }
    Err(Error::cli_command_failed(CommandFailedDetails {
        command: spec.display(),
        exit_code: status.code().unwrap_or(-1),
        stdout: output.stdout.trim().to_string(),
        stderr: output.stderr.trim().to_string(),
    }))
}

/// Run `executable <subcommand> <args...>`.
///
/// With `capture_output` the trimmed stdout is returned; otherwise output
/// streams to the terminal and the result is empty.
pub fn exec_command(
    runner: &dyn ProcessRunner,
    executable: &str,
    subcommand: &str,
    args: &[String],
    capture_output: bool,
) -> Result<String> {
    exec_command_with_env(runner, executable, subcommand, args, Vec::new(), capture_output)
}

/// [`exec_command`] with extra environment variables for the child.
pub fn exec_command_with_env(
    runner: &dyn ProcessRunner,
    executable: &str,
    subcommand: &str,
    args: &[String],
    envs: Vec<(String, String)>,
    capture_output: bool,
) -> Result<String> {
    let spec = CommandSpec::new(executable)
        .args(std::iter::once(subcommand.to_string()).chain(args.iter().cloned()))
        .envs(envs);

    if capture_output {
        Ok(runner.run_capturing(&spec)?.trim_end().to_string())
    } else {
        runner.run_streaming(&spec)?;
        Ok(String::new())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::RefCell;

    /// Records every spec it is asked to run and replies with canned stdout.
    #[derive(Default)]
    pub struct RecordingRunner {
        pub calls: RefCell<Vec<CommandSpec>>,
        pub stdout: String,
        pub fail_with: Option<i32>,
    }

    impl RecordingRunner {
        pub fn replying(stdout: &str) -> Self {
            Self {
                stdout: stdout.to_string(),
                ..Default::default()
            }
        }

        pub fn failing(exit_code: i32) -> Self {
            Self {
                fail_with: Some(exit_code),
                ..Default::default()
            }
        }

        fn record(&self, spec: &CommandSpec) -> Result<()> {
            self.calls.borrow_mut().push(spec.clone());
            match self.fail_with {
                Some(exit_code) => Err(Error::cli_command_failed(CommandFailedDetails {
                    command: spec.display(),
                    exit_code,
                    stdout: String::new(),
                    stderr: String::new(),
                })),
                None => Ok(()),
            }
        }
    }

    impl ProcessRunner for RecordingRunner {
        fn run_streaming(&self, spec: &CommandSpec) -> Result<()> {
            self.record(spec)
        }

        fn run_capturing(&self, spec: &CommandSpec) -> Result<String> {
            self.record(spec)?;
            Ok(self.stdout.clone())
        }
    }
}
