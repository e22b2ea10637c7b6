//! RubyInstaller backend for Windows runners
//!
//! Installs the `.7z` RubyInstaller builds of the `ruby` engine and
//! bootstraps whatever C toolchain that build compiles against:
//! nothing for modern MinGW rubies (the DevKit ships inside the
//! archive), the legacy RubyInstaller DevKit for rubies older than
//! 2.4, and the MSVC environment for `mswin` nightlies. All toolchain
//! setup is reported as env deltas; nothing here touches the ambient
//! environment.

use crate::catalog::{self, CatalogEntry, CatalogSet};
use crate::env::EnvDelta;
use crate::error::{RbupError, RbupResult};
use crate::fetch;
use crate::install::tool_cache::{self, ToolCache};
use crate::install::{move_into_place, InstallPaths, InstalledRuntime, Installer};
use crate::platform::{Architecture, Platform};
use crate::process::{self, RunOpts};
use crate::ui::{TaskSpinner, UiContext};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

/// Cert bundle shipped with Git for Windows; used by rubies too old to
/// carry their own
const CERT_FILE: &str = r"C:\Program Files\Git\mingw64\ssl\cert.pem";

const DEVKIT_X64_URL: &str = "https://github.com/oneclick/rubyinstaller/releases/download/devkit-4.7.2/DevKit-mingw64-64-4.7.2-20130224-1432-sfx.exe";
const DEVKIT_X86_URL: &str = "https://github.com/oneclick/rubyinstaller/releases/download/devkit-4.7.2/DevKit-mingw64-32-4.7.2-20130224-1151-sfx.exe";

/// Single Visual Studio install on the hosted windows image
const VCVARS: &str =
    r#""C:\Program Files (x86)\Microsoft Visual Studio\2019\Enterprise\VC\Auxiliary\Build\vcvars64.bat""#;

pub struct WindowsInstaller {
    platform: Platform,
    catalogs: CatalogSet,
    paths: InstallPaths,
    ui: UiContext,
    drive: String,
}

impl WindowsInstaller {
    pub fn new(
        platform: Platform,
        architecture: Architecture,
        paths: InstallPaths,
        ui: UiContext,
    ) -> RbupResult<Self> {
        let catalogs = catalog::windows_catalogs(architecture)?;
        Ok(Self {
            platform,
            catalogs,
            paths,
            ui,
            drive: workspace_drive(),
        })
    }

    fn devkit_root(&self, arch: Architecture) -> PathBuf {
        let name = if arch == Architecture::X86 {
            "DevKit"
        } else {
            "DevKit64"
        };
        PathBuf::from(format!("{}:\\{name}", self.drive))
    }

    /// Toolchain setup for MinGW-flavoured builds
    async fn setup_mingw(&self, arch: Architecture, version: &str) -> RbupResult<EnvDelta> {
        let mut delta = EnvDelta::default();
        delta.set("MAKE", "make.exe");

        if needs_legacy_devkit(version) {
            delta.set("SSL_CERT_FILE", CERT_FILE);
            self.install_devkit(arch, &mut delta).await?;
        }

        Ok(delta)
    }

    /// Install the legacy RubyInstaller DevKit (rubies 1.9.3 - 2.3)
    async fn install_devkit(&self, arch: Architecture, delta: &mut EnvDelta) -> RbupResult<()> {
        let url = if arch == Architecture::X86 {
            DEVKIT_X86_URL
        } else {
            DEVKIT_X64_URL
        };
        let root = self.devkit_root(arch);

        let archive = fetch::download(url, &self.ui).await?;
        let archive_str = archive.display().to_string();
        let out = format!("-o{}", root.display());
        process::run_checked(
            "7z",
            &["x", archive_str.as_str(), out.as_str()],
            &RunOpts::quiet(),
        )
        .await?;

        delta.set("RI_DEVKIT", root.display().to_string());
        delta.set("CC", "gcc");
        delta.set("CXX", "g++");
        delta.set("CPP", "cpp");

        let mingw_triple = if arch == Architecture::X86 {
            "i686-w64-mingw32"
        } else {
            "x86_64-w64-mingw32"
        };
        delta.prepend_path(root.join("mingw").join(mingw_triple).join("bin"));
        delta.prepend_path(root.join("mingw").join("bin"));
        delta.prepend_path(root.join("bin"));

        info!("Installed RubyInstaller DevKit under {}", root.display());
        Ok(())
    }

    /// Toolchain setup for `mswin` builds: certs plus the captured
    /// MSVC environment, so later steps run without vcvars
    async fn setup_mswin(&self) -> RbupResult<EnvDelta> {
        let mut delta = EnvDelta::default();
        delta.set("MAKE", "nmake.exe");

        // cert.pem location is hard-coded by OpenSSL msvc builds
        let certs_dir = PathBuf::from(r"C:\Program Files\Common Files\SSL\certs");
        if !certs_dir.exists() {
            std::fs::create_dir_all(&certs_dir)
                .map_err(|e| RbupError::io(format!("creating {}", certs_dir.display()), e))?;
        }
        let cert = PathBuf::from(r"C:\Program Files\Common Files\SSL\cert.pem");
        if !cert.exists() {
            std::fs::copy(CERT_FILE, &cert)
                .map_err(|e| RbupError::io(format!("copying cert to {}", cert.display()), e))?;
        }

        delta.set("VCVARS", VCVARS);

        let vcvars_and_set = format!("{VCVARS} && set");
        let set_output = process::capture_stdout(
            "cmd.exe",
            &["/c", vcvars_and_set.as_str()],
            &RunOpts::default(),
        )
        .await?;

        let current_path = std::env::var("Path").unwrap_or_default();
        delta.merge(vcvars_delta(&set_output, &current_path, &|key| {
            std::env::var(key).ok()
        }));

        Ok(delta)
    }
}

#[async_trait]
impl Installer for WindowsInstaller {
    fn catalogs(&self) -> &CatalogSet {
        &self.catalogs
    }

    async fn install(&self, engine: &str, entry: &CatalogEntry) -> RbupResult<InstalledRuntime> {
        let version = &entry.version;
        let arch = entry.architecture;

        if !entry.url.ends_with(".7z") {
            return Err(RbupError::Internal(format!(
                "URL should end in .7z: {}",
                entry.url
            )));
        }
        let base = fetch::archive_base(&entry.url);
        info!("Using {arch} build of {version} on {}", self.platform);

        // Only 64-bit stable rubies are shareable through the tool cache
        let cache = if tool_cache::eligible(engine, version) && arch == Architecture::X64 {
            ToolCache::locate(self.paths.tool_cache.as_deref())
        } else {
            None
        };

        let (prefix, cached) = match &cache {
            Some(tc) => match tc.find(version, arch) {
                Some(hit) => (hit, true),
                None => (tc.prefix(version, arch), false),
            },
            None => (PathBuf::from(format!("{}:\\{base}", self.drive)), false),
        };

        let toolchain = if version == "mswin" {
            self.setup_mswin().await?
        } else {
            self.setup_mingw(arch, version).await?
        };

        let mut env = EnvDelta::default();
        env.prepend_path(prefix.join("bin"));
        env.merge(toolchain);

        if cached {
            info!("Found {engine}-{version} in tool cache: {}", prefix.display());
        } else {
            let parent = prefix
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(format!("{}:\\", self.drive)));
            tokio::fs::create_dir_all(&parent)
                .await
                .map_err(|e| RbupError::io(format!("creating {}", parent.display()), e))?;

            let mut spinner = TaskSpinner::new(&self.ui);
            spinner.start(&format!("Downloading {engine}-{version}"));
            let archive = match fetch::download(&entry.url, &self.ui).await {
                Ok(path) => path,
                Err(e) => {
                    spinner.stop_error("Download failed");
                    return Err(e);
                }
            };
            spinner.stop("Downloaded");

            spinner.start(&format!("Extracting {engine}-{version}"));
            if let Err(e) = fetch::extract_7z(&archive, &parent, &base).await {
                spinner.stop_error("Extract failed");
                return Err(e);
            }
            move_into_place(&parent.join(&base), &prefix).await?;
            spinner.stop("Extracted");

            if cache.is_some() {
                tool_cache::mark_complete(&prefix)?;
            }
        }

        Ok(InstalledRuntime {
            prefix,
            engine: engine.to_string(),
            version: version.clone(),
            architecture: arch,
            env,
        })
    }

    fn name(&self) -> &'static str {
        "RubyInstaller"
    }
}

/// Drive the workspace lives on; installations go next to it
fn workspace_drive() -> String {
    std::env::var("GITHUB_WORKSPACE")
        .ok()
        .and_then(|w| w.chars().next())
        .unwrap_or('C')
        .to_string()
}

/// Whether this ruby compiles against the legacy RubyInstaller DevKit
/// (1.x and 2.0 - 2.3)
fn needs_legacy_devkit(version: &str) -> bool {
    let mut parts = version.split(['.', '-']);
    let major: u64 = match parts.next().and_then(|p| p.parse().ok()) {
        Some(n) => n,
        None => return false,
    };
    match major {
        0 | 1 => true,
        2 => matches!(parts.next().and_then(|p| p.parse::<u64>().ok()), Some(0..=3)),
        _ => false,
    }
}

/// Env delta from captured `vcvars && set` output
///
/// Keeps only variables vcvars changed; the Path variable is turned
/// into prepend entries by stripping the pre-existing Path suffix.
fn vcvars_delta(
    set_output: &str,
    current_path: &str,
    current: &dyn Fn(&str) -> Option<String>,
) -> EnvDelta {
    let mut delta = EnvDelta::default();

    for line in set_output.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        if key.trim().is_empty() || value.trim().is_empty() {
            continue;
        }

        if key.eq_ignore_ascii_case("Path") {
            let added = value
                .strip_suffix(current_path)
                .map(|s| s.trim_end_matches(';'))
                .unwrap_or(value);
            for entry in added.split(';').filter(|e| !e.is_empty()) {
                delta.prepend_path(entry);
            }
        } else if current(key).as_deref() != Some(value) {
            delta.set(key, value);
        }
    }

    delta
}
