//! Bundler and gem dependency management
//!
//! Detects the project's gemfile, picks a Bundler version the resolved
//! ruby can actually run, installs it, and drives `bundle install`
//! through the dependency cache protocol in [`cache`].

pub mod cache;
pub mod store;

pub use cache::{CacheReport, DependencyCache};
pub use store::{CacheStore, DirStore};

use crate::catalog::version;
use crate::error::{RbupError, RbupResult};
use crate::install::InstalledRuntime;
use crate::process::{self, RunOpts};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Relative directory bundle installs into and the cache archives
pub const BUNDLE_PATH: &str = "vendor/bundle";

/// The gemfile pair for a project
///
/// The gemfile is guaranteed to exist; the lockfile might not yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gemfiles {
    pub gemfile: PathBuf,
    pub lockfile: PathBuf,
}

/// Find the project's gemfile
///
/// `$BUNDLE_GEMFILE` wins when set and must then exist; otherwise
/// `Gemfile`, then the `gems.rb` convention. `None` means the project
/// has no bundled dependencies and both install and caching are
/// skipped.
pub fn detect_gemfile(dir: &Path) -> RbupResult<Option<Gemfiles>> {
    if let Ok(custom) = std::env::var("BUNDLE_GEMFILE") {
        let gemfile = dir.join(&custom);
        if !gemfile.exists() {
            return Err(RbupError::GemfileMissing(gemfile));
        }
        let lockfile = gemfile.with_file_name(format!(
            "{}.lock",
            gemfile.file_name().unwrap_or_default().to_string_lossy()
        ));
        return Ok(Some(Gemfiles { gemfile, lockfile }));
    }

    if dir.join("Gemfile").exists() {
        return Ok(Some(Gemfiles {
            gemfile: dir.join("Gemfile"),
            lockfile: dir.join("Gemfile.lock"),
        }));
    }

    if dir.join("gems.rb").exists() {
        return Ok(Some(Gemfiles {
            gemfile: dir.join("gems.rb"),
            lockfile: dir.join("gems.locked"),
        }));
    }

    Ok(None)
}

/// The `BUNDLED WITH` version recorded in a lockfile, if any
pub fn bundled_with(lockfile: &Path) -> Option<String> {
    let contents = std::fs::read_to_string(lockfile).ok()?;
    let mut lines = contents.lines();
    while let Some(line) = lines.next() {
        if line.trim() == "BUNDLED WITH" {
            let next = lines.next()?.trim();
            if next.starts_with(|c: char| c.is_ascii_digit()) {
                return Some(next.to_string());
            }
        }
    }
    None
}

/// Whether two leading numeric components of `v` reach `major.minor`
///
/// Head markers count as newer than everything.
fn at_least(v: &str, major: u64, minor: u64) -> bool {
    if version::is_head(v) {
        return true;
    }
    let mut parts = v.split(['.', '-']).map(|p| p.parse::<u64>());
    match (parts.next(), parts.next()) {
        (Some(Ok(maj)), Some(Ok(min))) => (maj, min) >= (major, minor),
        (Some(Ok(maj)), _) => maj >= major,
        _ => false,
    }
}

/// Whether this ruby ships Bundler 2 out of the box
fn ships_bundler2(engine: &str, ruby_version: &str) -> bool {
    match engine {
        "ruby" => at_least(ruby_version, 2, 7),
        "jruby" => at_least(ruby_version, 9, 3),
        "truffleruby" | "truffleruby+graalvm" => at_least(ruby_version, 21, 0),
        _ => false,
    }
}

/// Pick the Bundler major (or exact version) for this project and ruby
///
/// Old rubies cap the choice: Bundler 2 needs Ruby 2.4+, Ruby 2.3 has
/// a rubygems bug with it, and JRuby below 9.2 only runs Bundler 1.
pub fn select_bundler_version(
    input: &str,
    lockfile: Option<&Path>,
    engine: &str,
    ruby_version: &str,
) -> RbupResult<String> {
    let mut bundler = input.to_string();

    if bundler == "default" || bundler == "Gemfile.lock" {
        bundler = lockfile
            .and_then(bundled_with)
            .inspect(|v| info!("Using Bundler {v} from the lockfile BUNDLED WITH entry"))
            .unwrap_or_else(|| "latest".to_string());
    }

    if bundler == "latest" {
        bundler = "2".to_string();
    }

    if !bundler.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(RbupError::BundlerInput(bundler));
    }

    if engine == "ruby"
        && (ruby_version.starts_with("1.")
            || ruby_version.starts_with("2.0")
            || ruby_version.starts_with("2.1")
            || ruby_version.starts_with("2.2"))
    {
        info!("Bundler 2 requires Ruby 2.3+, using Bundler 1 on Ruby <= 2.2");
        bundler = "1".to_string();
    } else if engine == "ruby" && ruby_version.starts_with("2.3") {
        info!("Ruby 2.3 has a rubygems bug with Bundler 2, using Bundler 1");
        bundler = "1".to_string();
    } else if engine == "jruby" && (ruby_version.starts_with("1.") || !at_least(ruby_version, 9, 2))
    {
        info!("JRuby < 9.2 requires Bundler 1");
        bundler = "1".to_string();
    }

    Ok(bundler)
}

/// Install the selected Bundler into the runtime, unless the runtime
/// already ships a suitable one
pub async fn install_bundler(
    runtime: &InstalledRuntime,
    bundler_version: &str,
) -> RbupResult<()> {
    let engine = runtime.engine.as_str();
    let ruby_version = runtime.version.as_str();

    if version::is_head(ruby_version)
        && ships_bundler2(engine, ruby_version)
        && bundler_version.starts_with('2')
    {
        info!("Using Bundler 2 shipped with {engine}-{ruby_version}");
        return Ok(());
    }
    if (engine == "truffleruby" || engine == "truffleruby+graalvm")
        && !version::is_head(ruby_version)
        && bundler_version.starts_with('1')
    {
        info!("Using Bundler 1 shipped with {engine}");
        return Ok(());
    }

    let gem = runtime.bin_dir().join("gem").display().to_string();
    let requirement = format!("~> {bundler_version}");
    let mut args = vec!["install", "bundler", "-v", requirement.as_str(), "--force"];

    // JRuby 9.2 resolves against Bundler 2.3 at most
    if engine == "jruby" && ruby_version.starts_with("9.2.") {
        info!("JRuby 9.2 requires a maximum of Bundler 2.3");
        args.extend(["-v", "< 2.4"]);
    }

    if gem_is_v2_or_later(runtime).await? {
        args.push("--no-document");
    } else {
        args.extend(["--no-rdoc", "--no-ri"]);
    }

    if ruby_version.starts_with("1.8.7") {
        // Keep the patched Bundler (SSL SNI) bundled with the package
        args.push("--conservative");
    }

    process::run_checked(&gem, &args, &RunOpts::with_env(runtime_env(runtime))).await
}

/// Whether the runtime's rubygems is 2.x or newer
pub async fn gem_is_v2_or_later(runtime: &InstalledRuntime) -> RbupResult<bool> {
    let gem = runtime.bin_dir().join("gem").display().to_string();
    let output = process::capture_stdout(&gem, &["-v"], &RunOpts::quiet()).await?;
    Ok(!output.starts_with("0.") && !output.starts_with("1."))
}

/// Child process environment for gem/bundle commands: the runtime's
/// bin directory first on PATH
pub fn runtime_env(runtime: &InstalledRuntime) -> Vec<(String, String)> {
    let mut paths = vec![runtime.bin_dir()];
    if let Some(existing) = std::env::var_os("PATH") {
        paths.extend(std::env::split_paths(&existing));
    }
    let joined = std::env::join_paths(paths)
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();
    vec![("PATH".to_string(), joined)]
}

/// Write a `.gemrc` disabling gem documentation, if the home directory
/// has none yet
pub fn write_default_gemrc(home: &Path, gem_v2: bool) -> RbupResult<()> {
    let gemrc = home.join(".gemrc");
    if gemrc.exists() {
        return Ok(());
    }
    let flags = if gem_v2 {
        "--no-document"
    } else {
        "--no-rdoc --no-ri"
    };
    std::fs::write(&gemrc, format!("gem: {flags}\n"))
        .map_err(|e| RbupError::io(format!("writing {}", gemrc.display()), e))
}

/// Result of the dependency step
#[derive(Debug, Clone)]
pub struct BundleOutcome {
    /// Whether `bundle install` ran at all
    pub installed: bool,
    /// Cache round-trip report, when caching was enabled
    pub cache: Option<CacheReport>,
}

/// Configure bundler for the project and install dependencies, going
/// through the cache when a store is given
pub async fn bundle_install(
    runtime: &InstalledRuntime,
    gemfiles: &Gemfiles,
    platform: &str,
    bundler_version: &str,
    store: Option<&dyn CacheStore>,
    workdir: &Path,
) -> RbupResult<BundleOutcome> {
    let env = runtime_env(runtime);

    // Rubies shipping Bundler 2 need the version pinned for the
    // config/lock commands below when Bundler 1 was selected, at least
    // until a lockfile exists
    let mut config_env = env.clone();
    if bundler_version.starts_with('1') && ships_bundler2(&runtime.engine, &runtime.version) {
        info!("Setting BUNDLER_VERSION={bundler_version} for bundle config/lock commands");
        config_env.push(("BUNDLER_VERSION".to_string(), bundler_version.to_string()));
    }

    let opts = RunOpts {
        cwd: Some(workdir.to_path_buf()),
        env: config_env,
        quiet: false,
    };

    // An absolute path, so gems land under the workdir and not
    // relative to the gemfile's own directory
    let bundle_cache_path = workdir.join(BUNDLE_PATH).display().to_string();
    process::run_checked(
        "bundle",
        &["config", "--local", "path", bundle_cache_path.as_str()],
        &opts,
    )
    .await?;

    if gemfiles.lockfile.exists() {
        process::run_checked("bundle", &["config", "--local", "deployment", "true"], &opts)
            .await?;
    } else {
        // Generate the lockfile so the cache key can be computed from
        // it; also picks up the latest compatible gem versions
        debug!("No lockfile, running bundle lock");
        process::run_checked("bundle", &["lock"], &opts).await?;
    }

    let install_opts = RunOpts {
        cwd: Some(workdir.to_path_buf()),
        env: env.clone(),
        quiet: false,
    };

    let cache = match store {
        Some(store) => {
            let dep_cache = DependencyCache::new(store, workdir.to_path_buf(), env);
            Some(
                dep_cache
                    .ensure(runtime, platform, &gemfiles.lockfile, BUNDLE_PATH)
                    .await?,
            )
        }
        None => {
            let code =
                process::run_status("bundle", &["install", "--jobs", "4"], &install_opts).await?;
            if code != 0 {
                return Err(RbupError::DependencyInstallFailed {
                    command: "bundle install --jobs 4".to_string(),
                    code,
                });
            }
            None
        }
    };

    Ok(BundleOutcome {
        installed: true,
        cache,
    })
}
