//! Solver execution.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};

use crate::error::ExecutionError;

pub const STDOUT_LOG: &str = "solver.stdout.log";
pub const STDERR_LOG: &str = "solver.stderr.log";

/// How to launch the solver inside a case directory.
///
/// Without a launcher the executable is a script inside the case directory
/// (`./Allrun`). With one, the launcher program receives the script name as its
/// first argument (`sh Allrun`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolverCommand {
    pub executable: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launcher: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

impl SolverCommand {
    /// Run `executable` directly from the case directory
    pub fn case_script(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            launcher: None,
            args: Vec::new(),
        }
    }

    pub fn with_launcher(mut self, launcher: impl Into<String>) -> Self {
        self.launcher = Some(launcher.into());
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Program to spawn and its arguments.
    ///
    /// The child starts inside the case directory, so a case script is
    /// addressed as `./<executable>` whatever form `case_dir` takes.
    fn program(&self) -> (PathBuf, Vec<String>) {
        match &self.launcher {
            Some(launcher) => {
                let mut args = Vec::with_capacity(self.args.len() + 1);
                args.push(self.executable.clone());
                args.extend(self.args.iter().cloned());
                (PathBuf::from(launcher), args)
            }
            None => (Path::new(".").join(&self.executable), self.args.clone()),
        }
    }

    /// Shell-like rendering for logs
    pub fn describe(&self) -> String {
        let mut parts: Vec<&str> = self.launcher.iter().map(String::as_str).collect();
        parts.push(&self.executable);
        parts.extend(self.args.iter().map(String::as_str));
        parts.join(" ")
    }
}

/// Everything the solver wrote, plus its exit code
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: Option<i32>,
}

/// Runs one solver invocation to completion
pub trait SimulationExecutor: Send + Sync {
    fn execute(
        &self,
        case_dir: &Path,
        command: &SolverCommand,
    ) -> Result<CapturedOutput, ExecutionError>;
}

/// Spawns the solver as an OS subprocess and waits for it
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    write_logs: bool,
}

impl ProcessExecutor {
    pub fn new() -> Self {
        Self { write_logs: true }
    }

    /// Skip writing `solver.stdout.log` / `solver.stderr.log`
    pub fn without_logs(mut self) -> Self {
        self.write_logs = false;
        self
    }

    fn write_logs(&self, case_dir: &Path, output: &CapturedOutput) {
        if !self.write_logs {
            return;
        }
        for (name, content) in [(STDOUT_LOG, &output.stdout), (STDERR_LOG, &output.stderr)] {
            let path = case_dir.join(name);
            if let Err(e) = fs::write(&path, content) {
                tracing::warn!(path = %path.display(), "failed to write solver log: {e}");
            }
        }
    }
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulationExecutor for ProcessExecutor {
    fn execute(
        &self,
        case_dir: &Path,
        command: &SolverCommand,
    ) -> Result<CapturedOutput, ExecutionError> {
        let (program, args) = command.program();
        tracing::debug!(case_dir = %case_dir.display(), command = %command.describe(), "starting solver");

        let output = Command::new(&program)
            .args(&args)
            .current_dir(case_dir)
            .output()
            .map_err(|source| ExecutionError::Spawn {
                program: program.display().to_string(),
                source,
            })?;

        let captured = CapturedOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            status: output.status.code(),
        };
        self.write_logs(case_dir, &captured);

        if !output.status.success() {
            return Err(ExecutionError::NonZeroExit {
                status: captured.status,
                stderr: captured.stderr,
            });
        }
        Ok(captured)
    }
}
