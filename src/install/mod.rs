//! Runtime installation
//!
//! Two installer backends share one trait: [`TarballInstaller`] for the
//! prebuilt release tarballs (Linux, macOS, and non-ruby engines on
//! Windows), and [`WindowsInstaller`] for RubyInstaller builds, which
//! additionally bootstrap a C toolchain. The backend is picked once at
//! startup from the platform/engine pair.
//!
//! Installation per run is a straight line: check the tool cache, and
//! on a miss download, extract, move into place, then write the
//! completion marker. A failure at any step aborts the run; nothing is
//! ever marked complete before extraction finished.

pub mod tarball;
pub mod tool_cache;
pub mod windows;

pub use tarball::TarballInstaller;
pub use windows::WindowsInstaller;

use crate::catalog::{CatalogEntry, CatalogSet};
use crate::env::EnvDelta;
use crate::error::{RbupError, RbupResult};
use crate::platform::{Architecture, OsFamily, Platform};
use crate::ui::UiContext;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Filesystem roots an installer may place runtimes under
#[derive(Debug, Clone)]
pub struct InstallPaths {
    /// Persistent tool cache root, when the runner provides one
    pub tool_cache: Option<PathBuf>,
    /// Fallback directory for engines the tool cache does not apply to
    pub rubies_dir: PathBuf,
}

/// A runtime that is present on disk and ready to use
#[derive(Debug, Clone)]
pub struct InstalledRuntime {
    pub prefix: PathBuf,
    pub engine: String,
    pub version: String,
    pub architecture: Architecture,
    /// Environment changes later steps need; applied by the caller
    pub env: EnvDelta,
}

impl InstalledRuntime {
    /// The runtime's `bin` directory
    pub fn bin_dir(&self) -> PathBuf {
        self.prefix.join("bin")
    }
}

/// One installation backend
#[async_trait]
pub trait Installer: Send + Sync {
    /// Version catalogs this backend can install on this platform
    fn catalogs(&self) -> &CatalogSet;

    /// Ensure the resolved build is present on disk
    async fn install(&self, engine: &str, entry: &CatalogEntry) -> RbupResult<InstalledRuntime>;

    /// Backend name for logs
    fn name(&self) -> &'static str;
}

/// Pick the installation backend for this platform/engine pair
pub fn select_installer(
    platform: &Platform,
    engine: &str,
    architecture: Architecture,
    paths: InstallPaths,
    ui: UiContext,
) -> RbupResult<Box<dyn Installer>> {
    if platform.is_windows() && engine == "ruby" {
        Ok(Box::new(WindowsInstaller::new(
            platform.clone(),
            architecture,
            paths,
            ui,
        )?))
    } else {
        Ok(Box::new(TarballInstaller::new(
            platform.clone(),
            architecture,
            paths,
            ui,
        )?))
    }
}

/// The platform label used in prebuilt release file names
pub fn builder_platform(platform: &Platform) -> String {
    match platform.family {
        OsFamily::Windows => "windows-latest".to_string(),
        OsFamily::MacOs => {
            if std::env::consts::ARCH == "aarch64" {
                "macos-14-arm64".to_string()
            } else {
                "macos-latest".to_string()
            }
        }
        OsFamily::Linux => platform.name.clone(),
    }
}

/// Environment deltas to apply before installation starts
///
/// Windows runners want Ruby's temp directory and HOME normalized
/// before anything runs under MSYS2; JRuby needs a compatible JDK
/// picked from the ones the runner image ships.
pub fn pre_install_env(platform: &Platform, engine: &str) -> EnvDelta {
    let mut delta = EnvDelta::default();

    if platform.is_windows() {
        if let Ok(temp) = std::env::var("RUNNER_TEMP") {
            delta.set("TMPDIR", temp);
        }
        if let (Ok(drive), Ok(path)) = (std::env::var("HOMEDRIVE"), std::env::var("HOMEPATH")) {
            delta.set("HOME", format!("{drive}{path}"));
        }
        delta.set("MSYS2_PATH_TYPE", "inherit");
    } else if engine == "jruby" {
        let candidates: &[&str] = if platform.is_macos() {
            &["JAVA_HOME_8_X64", "JAVA_HOME_11_X64", "JAVA_HOME_11_arm64"]
        } else {
            &["JAVA_HOME_11_X64"]
        };
        if let Some(java_home) = candidates
            .iter()
            .find_map(|var| std::env::var(var).ok())
        {
            delta.set("JAVA_HOME", java_home);
        }
    }

    delta
}

/// Wrap an installation failure with the full build coordinates
pub fn install_error(
    engine: &str,
    version: &str,
    platform: &Platform,
    architecture: Architecture,
    source: RbupError,
) -> RbupError {
    RbupError::Install {
        engine: engine.to_string(),
        version: version.to_string(),
        platform: platform.name.clone(),
        architecture: architecture.as_str().to_string(),
        source: Box::new(source),
    }
}

/// Move a freshly extracted tree into its final prefix
///
/// Extraction happens under the archive's own top-level name; the
/// rename is the last step, so the prefix never exists under its final
/// name in a partially extracted state.
pub(crate) async fn move_into_place(extracted: &Path, prefix: &Path) -> RbupResult<()> {
    if extracted == prefix {
        return Ok(());
    }
    tokio::fs::rename(extracted, prefix).await.map_err(|e| {
        RbupError::io(
            format!(
                "moving {} to {}",
                extracted.display(),
                prefix.display()
            ),
            e,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linux() -> Platform {
        Platform {
            family: OsFamily::Linux,
            name: "ubuntu-24.04".to_string(),
        }
    }

    fn windows() -> Platform {
        Platform {
            family: OsFamily::Windows,
            name: "windows-2022".to_string(),
        }
    }

    fn paths() -> InstallPaths {
        InstallPaths {
            tool_cache: None,
            rubies_dir: PathBuf::from("/home/runner/.rubies"),
        }
    }

    #[test]
    fn selects_windows_backend_for_ruby_on_windows() {
        let installer = select_installer(
            &windows(),
            "ruby",
            Architecture::Default,
            paths(),
            UiContext::plain(),
        )
        .unwrap();
        assert_eq!(installer.name(), "RubyInstaller");
    }

    #[test]
    fn selects_tarball_backend_elsewhere() {
        let installer = select_installer(
            &linux(),
            "ruby",
            Architecture::X64,
            paths(),
            UiContext::plain(),
        )
        .unwrap();
        assert_eq!(installer.name(), "release tarball");

        let installer = select_installer(
            &windows(),
            "jruby",
            Architecture::X64,
            paths(),
            UiContext::plain(),
        )
        .unwrap();
        assert_eq!(installer.name(), "release tarball");
    }

    #[test]
    fn builder_platform_linux_passes_through() {
        assert_eq!(builder_platform(&linux()), "ubuntu-24.04");
    }

    #[test]
    fn builder_platform_windows_is_pinned() {
        assert_eq!(builder_platform(&windows()), "windows-latest");
    }

    #[tokio::test]
    async fn move_into_place_renames() {
        let dir = tempfile::TempDir::new().unwrap();
        let extracted = dir.path().join("ruby-3.2.4");
        std::fs::create_dir(&extracted).unwrap();

        let prefix = dir.path().join("x64");
        move_into_place(&extracted, &prefix).await.unwrap();
        assert!(prefix.is_dir());
        assert!(!extracted.exists());
    }

    #[tokio::test]
    async fn move_into_place_noop_when_equal() {
        let dir = tempfile::TempDir::new().unwrap();
        let prefix = dir.path().join("ruby-3.2.4");
        std::fs::create_dir(&prefix).unwrap();
        move_into_place(&prefix, &prefix).await.unwrap();
        assert!(prefix.is_dir());
    }
}
