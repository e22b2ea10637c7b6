//! Prebuilt release tarball installer
//!
//! Installs the `.tar.gz` builds published for Linux, macOS, and the
//! non-ruby engines on Windows. Stable `ruby` builds land in the
//! persistent tool cache when the runner has one; everything else goes
//! under the run's rubies directory.

use crate::catalog::{self, CatalogEntry, CatalogSet};
use crate::env::EnvDelta;
use crate::error::{RbupError, RbupResult};
use crate::fetch;
use crate::install::tool_cache::{self, ToolCache};
use crate::install::{builder_platform, move_into_place, InstallPaths, InstalledRuntime, Installer};
use crate::platform::{Architecture, Platform};
use crate::ui::{TaskSpinner, UiContext};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug)]
pub struct TarballInstaller {
    architecture: Architecture,
    catalogs: CatalogSet,
    paths: InstallPaths,
    ui: UiContext,
}

impl TarballInstaller {
    pub fn new(
        platform: Platform,
        architecture: Architecture,
        paths: InstallPaths,
        ui: UiContext,
    ) -> RbupResult<Self> {
        // Release tarballs are 64-bit only
        if architecture == Architecture::X86 {
            return Err(RbupError::ArchitectureUnsupported {
                architecture: architecture.to_string(),
                reason: "prebuilt release tarballs are 64-bit only".to_string(),
            });
        }

        let catalogs = catalog::tarball_catalogs(&builder_platform(&platform), Architecture::X64)?;

        Ok(Self {
            architecture: Architecture::X64,
            catalogs,
            paths,
            ui,
        })
    }

    fn rubies_prefix(&self, engine: &str, version: &str) -> PathBuf {
        self.paths.rubies_dir.join(format!("{engine}-{version}"))
    }

    async fn download_and_extract(
        &self,
        engine: &str,
        entry: &CatalogEntry,
        prefix: &Path,
        mark: bool,
    ) -> RbupResult<()> {
        let parent = prefix
            .parent()
            .ok_or_else(|| RbupError::Internal(format!("no parent for {}", prefix.display())))?;

        // A leftover partial install is stale; start clean
        match tokio::fs::remove_dir_all(prefix).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(RbupError::io(format!("removing {}", prefix.display()), e)),
        }
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| RbupError::io(format!("creating {}", parent.display()), e))?;

        let mut spinner = TaskSpinner::new(&self.ui);
        spinner.start(&format!("Downloading {engine}-{}", entry.version));
        let archive = match fetch::download(&entry.url, &self.ui).await {
            Ok(path) => path,
            Err(e) => {
                spinner.stop_error("Download failed");
                return Err(e);
            }
        };
        spinner.stop("Downloaded");

        spinner.start(&format!("Extracting {engine}-{}", entry.version));
        if let Err(e) = fetch::extract_tar_gz(&archive, parent).await {
            spinner.stop_error("Extract failed");
            return Err(e);
        }

        let extracted = parent.join(format!("{engine}-{}", entry.version));
        move_into_place(&extracted, prefix).await?;
        spinner.stop("Extracted");

        if mark {
            tool_cache::mark_complete(prefix)?;
        }
        Ok(())
    }
}

#[async_trait]
impl Installer for TarballInstaller {
    fn catalogs(&self) -> &CatalogSet {
        &self.catalogs
    }

    async fn install(&self, engine: &str, entry: &CatalogEntry) -> RbupResult<InstalledRuntime> {
        let version = &entry.version;

        let cache = if tool_cache::eligible(engine, version) {
            ToolCache::locate(self.paths.tool_cache.as_deref())
        } else {
            None
        };

        let (prefix, cached) = match &cache {
            Some(tc) => match tc.find(version, self.architecture) {
                Some(hit) => (hit, true),
                None => (tc.prefix(version, self.architecture), false),
            },
            None => (self.rubies_prefix(engine, version), false),
        };

        let mut env = EnvDelta::default();
        env.prepend_path(prefix.join("bin"));

        if cached {
            info!("Found {engine}-{version} in tool cache: {}", prefix.display());
        } else {
            self.download_and_extract(engine, entry, &prefix, cache.is_some())
                .await?;
        }

        Ok(InstalledRuntime {
            prefix,
            engine: engine.to_string(),
            version: version.clone(),
            architecture: self.architecture,
            env,
        })
    }

    fn name(&self) -> &'static str {
        "release tarball"
    }
}
