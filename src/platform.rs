//! Runner platform and architecture detection
//!
//! Hosted CI runners advertise their image through the `ImageOS`
//! environment variable (e.g. `ubuntu24`, `macos14`, `win22`). Download
//! URLs are keyed by the long form of that name, so detection maps one
//! to the other and falls back to a sensible default per OS family.

use crate::error::{RbupError, RbupResult};
use clap::ValueEnum;
use std::fmt;

/// Operating system family of the current runner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Linux,
    MacOs,
    Windows,
}

/// The detected runner platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    /// OS family, used for installer selection
    pub family: OsFamily,
    /// Image name as used in download URLs, e.g. `ubuntu-24.04`
    pub name: String,
}

impl Platform {
    /// Detect the current platform from the environment
    pub fn detect() -> RbupResult<Self> {
        let family = match std::env::consts::OS {
            "linux" => OsFamily::Linux,
            "macos" => OsFamily::MacOs,
            "windows" => OsFamily::Windows,
            other => return Err(RbupError::UnsupportedPlatform(other.to_string())),
        };

        let name = match std::env::var("ImageOS") {
            Ok(image) => Self::name_from_image_os(&image)
                .ok_or_else(|| RbupError::UnsupportedPlatform(image.clone()))?,
            Err(_) => Self::default_name(family).to_string(),
        };

        Ok(Self { family, name })
    }

    /// Map an `ImageOS` value to the long image name
    pub fn name_from_image_os(image: &str) -> Option<String> {
        if let Some(version) = image.strip_prefix("ubuntu") {
            return Some(format!("ubuntu-{version}.04"));
        }
        if let Some(version) = image.strip_prefix("macos") {
            return Some(format!("macos-{version}"));
        }
        if let Some(version) = image.strip_prefix("win") {
            return Some(format!("windows-20{version}"));
        }
        None
    }

    fn default_name(family: OsFamily) -> &'static str {
        match family {
            OsFamily::Linux => "ubuntu-24.04",
            OsFamily::MacOs => "macos-latest",
            OsFamily::Windows => "windows-latest",
        }
    }

    /// Whether this is a Windows runner
    pub fn is_windows(&self) -> bool {
        self.family == OsFamily::Windows
    }

    /// Whether this is a macOS runner
    pub fn is_macos(&self) -> bool {
        self.family == OsFamily::MacOs
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Requested or concrete CPU architecture
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Architecture {
    /// 64-bit build
    X64,
    /// 32-bit build (Windows only)
    X86,
    /// Let the installer pick, 64-bit preferred
    Default,
}

impl Architecture {
    /// Short name as used in cache keys and tool-cache paths
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::X64 => "x64",
            Self::X86 => "x86",
            Self::Default => "default",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
