//! Subprocess execution helpers
//!
//! Thin wrappers over `tokio::process::Command` used by the installer
//! and dependency steps. Commands either inherit stdio (visible in the
//! CI log) or capture stdout for parsing; a non-zero exit is always an
//! error.

use crate::error::{RbupError, RbupResult};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Options shared by the run helpers
#[derive(Debug, Default, Clone)]
pub struct RunOpts {
    /// Working directory; inherits the process cwd when unset
    pub cwd: Option<PathBuf>,
    /// Extra environment variables for the child
    pub env: Vec<(String, String)>,
    /// Suppress child stdout/stderr instead of inheriting it
    pub quiet: bool,
}

impl RunOpts {
    pub fn quiet() -> Self {
        Self {
            quiet: true,
            ..Self::default()
        }
    }

    pub fn with_env(env: Vec<(String, String)>) -> Self {
        Self {
            env,
            ..Self::default()
        }
    }
}

fn command(program: &str, args: &[&str], opts: &RunOpts) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Some(ref cwd) = opts.cwd {
        cmd.current_dir(cwd);
    }
    for (k, v) in &opts.env {
        cmd.env(k, v);
    }
    cmd
}

fn display(program: &str, args: &[&str]) -> String {
    let mut s = program.to_string();
    for arg in args {
        s.push(' ');
        s.push_str(arg);
    }
    s
}

/// Run a command to completion, failing on a non-zero exit
pub async fn run_checked(program: &str, args: &[&str], opts: &RunOpts) -> RbupResult<()> {
    let shown = display(program, args);
    debug!("Executing: {}", shown);

    let mut cmd = command(program, args, opts);
    if opts.quiet {
        cmd.stdout(Stdio::null()).stderr(Stdio::piped());
        let output = cmd
            .output()
            .await
            .map_err(|e| RbupError::command_failed(&shown, e))?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(RbupError::command_exec(shown, stderr.trim()));
    }

    let status = cmd
        .status()
        .await
        .map_err(|e| RbupError::command_failed(&shown, e))?;

    if status.success() {
        Ok(())
    } else {
        Err(RbupError::command_exec(
            shown,
            format!("exit code {}", status.code().unwrap_or(-1)),
        ))
    }
}

/// Run a command and return its trimmed stdout, failing on a non-zero
/// exit
pub async fn capture_stdout(program: &str, args: &[&str], opts: &RunOpts) -> RbupResult<String> {
    let shown = display(program, args);
    debug!("Executing: {}", shown);

    let output = command(program, args, opts)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| RbupError::command_failed(&shown, e))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(RbupError::command_exec(shown, stderr.trim()))
    }
}

/// Run a command with inherited stdio and return its exit code
///
/// For steps whose output belongs in the CI log but whose failure the
/// caller wants to classify itself.
pub async fn run_status(program: &str, args: &[&str], opts: &RunOpts) -> RbupResult<i32> {
    let shown = display(program, args);
    debug!("Executing: {}", shown);

    let status = command(program, args, opts)
        .status()
        .await
        .map_err(|e| RbupError::command_failed(&shown, e))?;

    Ok(status.code().unwrap_or(-1))
}
