//! Process management - Spawning engine processes and waiting on them

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::error::LaunchError;

/// A fully resolved invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    /// Arguments after the program, passed without any shell interpretation
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

impl CommandSpec {
    /// Full argument vector including the program itself
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.to_string_lossy().into_owned())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

/// Starts processes for the launcher
pub trait ProcessSpawner: Send + Sync {
    /// Start `command` and return immediately. OS-level start failures are reported
    /// here, never from [`ProcessHandle::join`].
    fn spawn(&self, command: &CommandSpec) -> Result<ProcessHandle, LaunchError>;
}

/// Spawns real child processes through tokio
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    /// Discard the child's stdout and stderr instead of sharing ours
    quiet: bool,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }
}

impl ProcessSpawner for ProcessRunner {
    fn spawn(&self, command: &CommandSpec) -> Result<ProcessHandle, LaunchError> {
        info!(
            "Spawning {:?} in {:?} with {} argument(s)",
            command.program,
            command.working_dir,
            command.args.len()
        );

        let mut cmd = Command::new(&command.program);
        cmd.current_dir(&command.working_dir)
            .args(&command.args)
            .stdin(Stdio::null())
            .kill_on_drop(false);

        if self.quiet {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }

        let child = cmd.spawn().map_err(|source| LaunchError::SpawnFailure {
            program: command.program.clone(),
            source,
        })?;

        let pid = child.id().unwrap_or_default();
        info!("Spawned process with PID {}", pid);

        Ok(ProcessHandle {
            pid,
            program: command.program.clone(),
            state: HandleState::Running(child),
        })
    }
}

enum HandleState {
    Running(Child),
    Exited(i32),
}

/// An awaitable child process.
///
/// [`join`](Self::join) is the only suspension point. It is cancel-safe: dropping
/// the future leaves the child running and the handle usable. Once the child has
/// exited the code is cached, so joining again returns immediately.
pub struct ProcessHandle {
    pid: u32,
    program: PathBuf,
    state: HandleState,
}

impl ProcessHandle {
    /// A handle for a process that has already finished
    pub fn completed(pid: u32, program: impl Into<PathBuf>, exit_code: i32) -> Self {
        Self {
            pid,
            program: program.into(),
            state: HandleState::Exited(exit_code),
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn program(&self) -> &PathBuf {
        &self.program
    }

    /// Exit code, if the process is known to have finished
    pub fn exit_code(&self) -> Option<i32> {
        match self.state {
            HandleState::Exited(code) => Some(code),
            HandleState::Running(_) => None,
        }
    }

    /// Wait for the process to exit and return its exit code
    pub async fn join(&mut self) -> Result<i32, LaunchError> {
        let status = match &mut self.state {
            HandleState::Exited(code) => return Ok(*code),
            HandleState::Running(child) => child.wait().await,
        };
        let status = status.map_err(|source| LaunchError::Runtime {
            pid: self.pid,
            source,
        })?;
        Ok(self.finish(status))
    }

    /// Check for exit without waiting
    pub fn try_join(&mut self) -> Result<Option<i32>, LaunchError> {
        let status = match &mut self.state {
            HandleState::Exited(code) => return Ok(Some(*code)),
            HandleState::Running(child) => child.try_wait(),
        };
        match status {
            Ok(Some(status)) => Ok(Some(self.finish(status))),
            Ok(None) => Ok(None),
            Err(source) => Err(LaunchError::Runtime {
                pid: self.pid,
                source,
            }),
        }
    }

    /// Forcefully terminate the process and reap it
    pub async fn kill(&mut self) -> Result<i32, LaunchError> {
        if let HandleState::Running(child) = &mut self.state {
            warn!("Killing process {}", self.pid);
            if let Err(source) = child.start_kill() {
                // The child may have exited on its own in the meantime
                debug!("start_kill for {} failed: {}", self.pid, source);
            }
        }
        self.join().await
    }

    fn finish(&mut self, status: ExitStatus) -> i32 {
        let code = exit_code(status);
        if status.success() {
            info!("Process {} exited successfully", self.pid);
        } else {
            warn!("Process {} exited with status: {}", self.pid, status);
        }
        self.state = HandleState::Exited(code);
        code
    }
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.pid)
            .field("program", &self.program)
            .field("exit_code", &self.exit_code())
            .finish()
    }
}

/// Exit code of a finished process; signals map to `128 + signal` on unix
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    -1
}
