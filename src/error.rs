//! Error types for rbup
//!
//! All modules use `RbupResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for rbup operations
pub type RbupResult<T> = Result<T, RbupError>;

/// All errors that can occur in rbup
#[derive(Error, Debug)]
pub enum RbupError {
    // Resolution errors
    #[error("Unknown engine {engine} on {platform}")]
    UnknownEngine { engine: String, platform: String },

    #[error(
        "Unknown version {version} for {engine} on {platform}\n\
         available versions for {engine} on {platform}: {}",
        .available.join(", ")
    )]
    UnknownVersion {
        engine: String,
        platform: String,
        version: String,
        available: Vec<String>,
    },

    #[error("Unsupported architecture: {architecture} ({reason})")]
    ArchitectureUnsupported {
        architecture: String,
        reason: String,
    },

    #[error("Unsupported platform: {0}. rbup supports Linux, macOS and Windows runners.")]
    UnsupportedPlatform(String),

    #[error("no runtime version given and no .ruby-version or .tool-versions file found in {}", .dir.display())]
    VersionInputMissing { dir: PathBuf },

    #[error("no ruby entry found in {}", .0.display())]
    ToolVersionsNoRuby(PathBuf),

    // Installation errors
    #[error("Failed to download {url}: {reason}")]
    DownloadFailed { url: String, reason: String },

    #[error("Failed to extract {}: {reason}", .archive.display())]
    ExtractFailed { archive: PathBuf, reason: String },

    #[error("Failed to install {engine}-{version} for {architecture} on {platform}: {source}")]
    Install {
        engine: String,
        version: String,
        platform: String,
        architecture: String,
        #[source]
        source: Box<RbupError>,
    },

    // Dependency cache errors
    #[error("Cache validation error: {0}")]
    CacheValidation(String),

    #[error("Dependency install failed: {command} exited with code {code}")]
    DependencyInstallFailed { command: String, code: i32 },

    #[error("Cannot parse bundler input: {0}")]
    BundlerInput(String),

    #[error("$BUNDLE_GEMFILE is set to {} but does not exist", .0.display())]
    GemfileMissing(PathBuf),

    // Configuration errors
    #[error("Invalid configuration at {}: {reason}", .path.display())]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {}: {source}", .path.display())]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, stderr: {stderr}")]
    CommandExecution { command: String, stderr: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RbupError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::UnknownVersion { engine, .. } => {
                Some(format!("Run: rbup versions --engine {engine}"))
            }
            Self::VersionInputMissing { .. } => {
                Some("Pass a version explicitly, e.g.: rbup install 3.3".to_string())
            }
            Self::GemfileMissing(_) => {
                Some("Unset BUNDLE_GEMFILE or point it at an existing gemfile".to_string())
            }
            _ => None,
        }
    }
}
