//! Runtime request parsing
//!
//! A request is a single string like `3.2`, `jruby-9.4.8.0`,
//! `truffleruby`, or `head`, split into an engine and a version
//! pattern. The symbolic request `default` falls back to the project's
//! `.ruby-version` or `.tool-versions` file, and either file can also
//! be named explicitly.

use crate::catalog::version;
use crate::error::{RbupError, RbupResult};
use std::path::Path;
use tracing::info;

/// A parsed runtime request, immutable for the rest of the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeRequest {
    /// Engine name, e.g. `ruby`, `jruby`, `truffleruby`
    pub engine: String,
    /// Version pattern; may be partial, a head marker, or empty
    pub version: String,
}

impl RuntimeRequest {
    fn new(engine: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
            version: version.into(),
        }
    }
}

/// Parse a request string, reading version files from `dir` when the
/// request is symbolic
pub fn parse(input: &str, dir: &Path) -> RbupResult<RuntimeRequest> {
    let mut input = input.to_string();

    if input == "default" {
        if dir.join(".ruby-version").exists() {
            input = ".ruby-version".to_string();
        } else if dir.join(".tool-versions").exists() {
            input = ".tool-versions".to_string();
        } else {
            return Err(RbupError::VersionInputMissing {
                dir: dir.to_path_buf(),
            });
        }
    }

    if input == ".ruby-version" {
        input = read_ruby_version_file(&dir.join(".ruby-version"))?;
    } else if input == ".tool-versions" {
        input = read_tool_versions_file(&dir.join(".tool-versions"))?;
    }

    Ok(split_request(&input))
}

/// Split `engine-version` notation without touching the filesystem
pub fn split_request(input: &str) -> RuntimeRequest {
    // X.Y.Z or a bare head marker means the default engine
    if input.starts_with(|c: char| c.is_ascii_digit()) || version::is_head(input) {
        return RuntimeRequest::new("ruby", input);
    }

    // engine only: resolve to its latest stable later
    match input.split_once('-') {
        None => RuntimeRequest::new(input, ""),
        Some((engine, rest)) => RuntimeRequest::new(engine, rest),
    }
}

fn read_ruby_version_file(path: &Path) -> RbupResult<String> {
    let contents = read_trimmed(path)?;
    info!("Using {} as input from file {}", contents, path.display());
    Ok(contents)
}

fn read_tool_versions_file(path: &Path) -> RbupResult<String> {
    let contents = read_trimmed(path)?;

    let ruby_line = contents
        .lines()
        .map(str::trim)
        .find_map(|line| {
            let rest = line.strip_prefix("ruby")?;
            rest.starts_with(char::is_whitespace).then(|| rest.trim())
        })
        .filter(|rest| !rest.is_empty())
        .ok_or_else(|| RbupError::ToolVersionsNoRuby(path.to_path_buf()))?;

    info!("Using {} as input from file {}", ruby_line, path.display());
    Ok(ruby_line.to_string())
}

fn read_trimmed(path: &Path) -> RbupResult<String> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| RbupError::io(format!("reading {}", path.display()), e))?;
    Ok(contents.trim().to_string())
}
