//! Environment deltas
//!
//! Installers never mutate the ambient process environment. They
//! return an [`EnvDelta`] describing the variables and PATH entries
//! later build steps need, and the CLI applies it: appended to the
//! runner's `$GITHUB_ENV`/`$GITHUB_PATH` files when present, printed
//! as shell exports otherwise.

use crate::error::{RbupError, RbupResult};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Environment changes to apply in the enclosing CI process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvDelta {
    /// Variables to export
    pub vars: Vec<(String, String)>,
    /// Directories to prepend to PATH, highest priority first
    pub path_prepends: Vec<PathBuf>,
}

impl EnvDelta {
    /// Record a variable export
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.push((key.into(), value.into()));
    }

    /// Record a PATH prepend
    pub fn prepend_path(&mut self, dir: impl Into<PathBuf>) {
        self.path_prepends.push(dir.into());
    }

    /// Append another delta after this one
    pub fn merge(&mut self, other: EnvDelta) {
        self.vars.extend(other.vars);
        self.path_prepends.extend(other.path_prepends);
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty() && self.path_prepends.is_empty()
    }

    /// Apply the delta for the enclosing CI job
    ///
    /// Hosted runners expose `$GITHUB_ENV` and `$GITHUB_PATH` files
    /// that later job steps source; when absent the delta is printed
    /// as `export` lines for eval by the calling shell.
    pub fn apply(&self) -> RbupResult<()> {
        if self.is_empty() {
            return Ok(());
        }

        let env_file = std::env::var_os("GITHUB_ENV").map(PathBuf::from);
        let path_file = std::env::var_os("GITHUB_PATH").map(PathBuf::from);

        match (env_file, path_file) {
            (Some(env_file), Some(path_file)) => self.write_ci_files(&env_file, &path_file),
            _ => {
                print!("{}", self.render_exports());
                Ok(())
            }
        }
    }

    /// Write the delta into runner command files
    pub fn write_ci_files(&self, env_file: &Path, path_file: &Path) -> RbupResult<()> {
        if !self.vars.is_empty() {
            let mut f = append_to(env_file)?;
            for (k, v) in &self.vars {
                info!("Setting {}={}", k, v);
                writeln!(f, "{k}={v}")
                    .map_err(|e| RbupError::io(format!("writing {}", env_file.display()), e))?;
            }
        }

        if !self.path_prepends.is_empty() {
            let mut f = append_to(path_file)?;
            for dir in &self.path_prepends {
                info!("Adding {} to PATH", dir.display());
                writeln!(f, "{}", dir.display())
                    .map_err(|e| RbupError::io(format!("writing {}", path_file.display()), e))?;
            }
        }

        Ok(())
    }

    /// The delta as eval-able shell export lines
    pub fn render_exports(&self) -> String {
        let mut out = String::new();
        for (k, v) in &self.vars {
            out.push_str(&format!("export {k}={}\n", shell_quote(v)));
        }
        if !self.path_prepends.is_empty() {
            let joined = self
                .path_prepends
                .iter()
                .map(|p| shell_quote(&p.display().to_string()))
                .collect::<Vec<_>>()
                .join(":");
            out.push_str(&format!("export PATH={joined}:$PATH\n"));
        }
        out
    }
}

fn append_to(path: &Path) -> RbupResult<std::fs::File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| RbupError::io(format!("opening {}", path.display()), e))
}

fn shell_quote(value: &str) -> String {
    if value
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b"/.-_:+=".contains(&b))
    {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}
