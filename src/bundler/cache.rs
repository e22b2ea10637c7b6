//! Dependency cache protocol
//!
//! Computes a content-derived cache key, probes the store with a
//! prefix fallback, always runs the installer (which doubles as
//! verification of whatever was restored), cleans stale gems after a
//! fallback hit, and saves only when the restored key differs from the
//! computed one. Store trouble other than a validation error never
//! fails the build; the cache is an optimization.

use crate::bundler::store::{CacheStore, StoreError};
use crate::catalog::version;
use crate::error::{RbupError, RbupResult};
use crate::install::InstalledRuntime;
use crate::process::{self, RunOpts};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Version tag bumped whenever the key layout changes
const KEY_SCOPE: &str = "rbup-bundler-cache-v1";

/// The computed cache key and its fallback base
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    /// Everything except the lockfile digest
    pub base: String,
    /// Full key including the lockfile digest
    pub key: String,
}

impl CacheKey {
    /// Prefix matching any entry with the same base, any digest
    pub fn fallback_prefix(&self) -> String {
        format!("{}-", self.base)
    }
}

/// SHA-256 digest of a lockfile's contents
pub fn lockfile_digest(path: &Path) -> RbupResult<String> {
    let contents = std::fs::read(path)
        .map_err(|e| RbupError::io(format!("reading lockfile {}", path.display()), e))?;
    Ok(hex::encode(Sha256::digest(&contents)))
}

/// Build the cache key for one (platform, arch, engine, version,
/// lockfile) tuple
///
/// `revision` disambiguates head builds, whose version string alone
/// does not identify what is installed.
pub fn compute_key(
    platform: &str,
    architecture: &str,
    engine: &str,
    ruby_version: &str,
    revision: Option<&str>,
    lockfile: &Path,
) -> RbupResult<CacheKey> {
    let mut base = format!("{KEY_SCOPE}-{platform}-{architecture}-{engine}-{ruby_version}");
    if let Some(revision) = revision {
        base.push_str(&format!("-revision-{revision}"));
    }
    base.push_str(&format!("-{}", lockfile.display()));

    let key = format!("{base}-{}", lockfile_digest(lockfile)?);
    Ok(CacheKey { base, key })
}

/// What the restore step found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// The exact key was present
    Exact,
    /// A base-prefixed entry with a different digest was unpacked
    Fallback(String),
    /// Nothing usable in the store
    Miss,
}

impl RestoreOutcome {
    pub fn classify(restored: Option<&str>, key: &str) -> Self {
        match restored {
            Some(matched) if matched == key => Self::Exact,
            Some(matched) => Self::Fallback(matched.to_string()),
            None => Self::Miss,
        }
    }
}

/// Whether a save should be attempted: the store is write-once, so
/// only when the restore did not land on the exact key
pub fn should_save(outcome: &RestoreOutcome) -> bool {
    !matches!(outcome, RestoreOutcome::Exact)
}

/// Result of one dependency cache round trip
#[derive(Debug, Clone)]
pub struct CacheReport {
    pub key: String,
    pub restored_key: Option<String>,
    pub saved: bool,
}

impl CacheReport {
    /// Whether previously cached gems were reused
    pub fn reused(&self) -> bool {
        self.restored_key.is_some()
    }
}

/// Runs the cache protocol around `bundle install`
pub struct DependencyCache<'a> {
    store: &'a dyn CacheStore,
    /// Working directory for bundle commands and archive paths
    workdir: PathBuf,
    /// Environment for bundle commands (runtime PATH and friends)
    env: Vec<(String, String)>,
    /// The bundler executable; swapped out in tests
    bundle_program: String,
}

impl<'a> DependencyCache<'a> {
    pub fn new(store: &'a dyn CacheStore, workdir: PathBuf, env: Vec<(String, String)>) -> Self {
        Self {
            store,
            workdir,
            env,
            bundle_program: "bundle".to_string(),
        }
    }

    fn run_opts(&self) -> RunOpts {
        RunOpts {
            cwd: Some(self.workdir.clone()),
            env: self.env.clone(),
            quiet: false,
        }
    }

    /// Compute the key for this runtime/lockfile pair, querying the
    /// installed runtime for its revision when the version string is a
    /// moving head marker
    pub async fn cache_key(
        &self,
        runtime: &InstalledRuntime,
        platform: &str,
        lockfile: &Path,
    ) -> RbupResult<CacheKey> {
        let revision = if version::is_head(&runtime.version) && runtime.engine != "jruby" {
            Some(build_revision(runtime).await?)
        } else {
            None
        };

        compute_key(
            platform,
            runtime.architecture.as_str(),
            &runtime.engine,
            &runtime.version,
            revision.as_deref(),
            lockfile,
        )
    }

    /// Restore, install, clean, save
    pub async fn ensure(
        &self,
        runtime: &InstalledRuntime,
        platform: &str,
        lockfile: &Path,
        cache_path: &str,
    ) -> RbupResult<CacheReport> {
        let cache_key = self.cache_key(runtime, platform, lockfile).await?;
        info!("Cache key: {}", cache_key.key);

        let paths = vec![PathBuf::from(cache_path)];
        let fallbacks = vec![cache_key.fallback_prefix()];

        let restored = match self.store.restore(&paths, &cache_key.key, &fallbacks).await {
            Ok(matched) => matched,
            Err(StoreError::Validation(reason)) => {
                return Err(RbupError::CacheValidation(reason));
            }
            Err(e) => {
                warn!("There was an error restoring the cache: {e}");
                None
            }
        };

        if let Some(ref matched) = restored {
            info!("Found cache for key: {matched}");
        }

        let outcome = RestoreOutcome::classify(restored.as_deref(), &cache_key.key);

        // Always install: it fills a miss, tops up a fallback, and
        // verifies an exact hit is actually usable
        self.bundle(&["install", "--jobs", "4"]).await?;

        if let RestoreOutcome::Fallback(_) = outcome {
            // Stale lockfile match: drop gems the current lockfile no
            // longer references before the entry is archived
            self.bundle(&["clean"]).await?;
        }

        let mut saved = false;
        if should_save(&outcome) {
            info!("Saving cache");
            match self.store.save(&paths, &cache_key.key).await {
                Ok(()) => saved = true,
                Err(StoreError::Validation(reason)) => {
                    return Err(RbupError::CacheValidation(reason));
                }
                Err(StoreError::Reserved(key)) => {
                    info!("Cache entry already saved by a concurrent run: {key}");
                }
                Err(e) => warn!("There was an error saving the cache: {e}"),
            }
        }

        Ok(CacheReport {
            key: cache_key.key,
            restored_key: restored,
            saved,
        })
    }

    async fn bundle(&self, args: &[&str]) -> RbupResult<()> {
        let code = process::run_status(&self.bundle_program, args, &self.run_opts()).await?;
        if code != 0 {
            return Err(RbupError::DependencyInstallFailed {
                command: format!("bundle {}", args.join(" ")),
                code,
            });
        }
        Ok(())
    }
}

/// The installed runtime's own build revision
async fn build_revision(runtime: &InstalledRuntime) -> RbupResult<String> {
    let ruby = runtime.bin_dir().join("ruby");
    process::capture_stdout(
        &ruby.display().to_string(),
        &["-e", "print RUBY_REVISION"],
        &RunOpts::quiet(),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn lockfile(contents: &str) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Gemfile.lock");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn key_is_deterministic() {
        let (_dir, path) = lockfile("GEM\n  specs:\n");
        let a = compute_key("ubuntu-24.04", "x64", "ruby", "3.2.4", None, &path).unwrap();
        let b = compute_key("ubuntu-24.04", "x64", "ruby", "3.2.4", None, &path).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn key_changes_with_each_input() {
        let (_dir, path) = lockfile("GEM\n  specs:\n");
        let base = compute_key("ubuntu-24.04", "x64", "ruby", "3.2.4", None, &path).unwrap();

        let platform = compute_key("macos-14", "x64", "ruby", "3.2.4", None, &path).unwrap();
        let arch = compute_key("ubuntu-24.04", "x86", "ruby", "3.2.4", None, &path).unwrap();
        let engine = compute_key("ubuntu-24.04", "x64", "jruby", "3.2.4", None, &path).unwrap();
        let version = compute_key("ubuntu-24.04", "x64", "ruby", "3.3.5", None, &path).unwrap();

        for other in [platform, arch, engine, version] {
            assert_ne!(base.key, other.key);
        }
    }

    #[test]
    fn key_changes_with_lockfile_contents() {
        let (_dir, path) = lockfile("GEM\n  specs:\n    rake (13.0.6)\n");
        let a = compute_key("ubuntu-24.04", "x64", "ruby", "3.2.4", None, &path).unwrap();
        std::fs::write(&path, "GEM\n  specs:\n    rake (13.2.1)\n").unwrap();
        let b = compute_key("ubuntu-24.04", "x64", "ruby", "3.2.4", None, &path).unwrap();

        assert_ne!(a.key, b.key);
        // same base: only the digest moved, so the fallback still matches
        assert_eq!(a.base, b.base);
        assert!(b.key.starts_with(&a.fallback_prefix()));
    }

    #[test]
    fn head_revision_lands_in_base() {
        let (_dir, path) = lockfile("GEM\n");
        let key = compute_key("ubuntu-24.04", "x64", "ruby", "head", Some("deadbeef"), &path)
            .unwrap();
        assert!(key.base.contains("-revision-deadbeef"));
    }

    #[test]
    fn fallback_prefix_ends_with_dash() {
        let (_dir, path) = lockfile("GEM\n");
        let key = compute_key("ubuntu-24.04", "x64", "ruby", "3.2.4", None, &path).unwrap();
        assert_eq!(key.fallback_prefix(), format!("{}-", key.base));
        assert!(key.key.starts_with(&key.fallback_prefix()));
    }

    #[test]
    fn classify_outcomes() {
        assert_eq!(
            RestoreOutcome::classify(Some("k-1"), "k-1"),
            RestoreOutcome::Exact
        );
        assert_eq!(
            RestoreOutcome::classify(Some("k-0"), "k-1"),
            RestoreOutcome::Fallback("k-0".to_string())
        );
        assert_eq!(RestoreOutcome::classify(None, "k-1"), RestoreOutcome::Miss);
    }

    #[test]
    fn save_only_when_not_exact() {
        assert!(!should_save(&RestoreOutcome::Exact));
        assert!(should_save(&RestoreOutcome::Fallback("k".to_string())));
        assert!(should_save(&RestoreOutcome::Miss));
    }

    #[test]
    fn key_scope_versioned() {
        let (_dir, path) = lockfile("GEM\n");
        let key = compute_key("ubuntu-24.04", "x64", "ruby", "3.2.4", None, &path).unwrap();
        assert!(key.key.starts_with("rbup-bundler-cache-v1-"));
    }

    mod protocol {
        use super::*;
        use crate::bundler::store::DirStore;
        use crate::install::InstalledRuntime;
        use crate::platform::Architecture;

        /// A project directory with a lockfile, a vendor tree, and a
        /// fake `bundle` that records its invocations
        struct Project {
            dir: TempDir,
            runtime: InstalledRuntime,
        }

        impl Project {
            fn new() -> Self {
                let dir = TempDir::new().unwrap();
                std::fs::create_dir_all(dir.path().join("vendor/bundle")).unwrap();
                std::fs::write(dir.path().join("vendor/bundle/a.gem"), "gem-a").unwrap();
                std::fs::write(dir.path().join("Gemfile.lock"), "GEM\n  specs:\n").unwrap();

                let script = dir.path().join("fake-bundle");
                std::fs::write(&script, "#!/bin/sh\necho \"$@\" >> bundle-calls.log\n").unwrap();
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    std::fs::set_permissions(
                        &script,
                        std::fs::Permissions::from_mode(0o755),
                    )
                    .unwrap();
                }

                let runtime = InstalledRuntime {
                    prefix: dir.path().join("ruby"),
                    engine: "ruby".to_string(),
                    version: "3.2.4".to_string(),
                    architecture: Architecture::X64,
                    env: Default::default(),
                };
                Self { dir, runtime }
            }

            fn cache<'a>(&self, store: &'a dyn CacheStore) -> DependencyCache<'a> {
                DependencyCache {
                    store,
                    workdir: self.dir.path().to_path_buf(),
                    env: Vec::new(),
                    bundle_program: self.dir.path().join("fake-bundle").display().to_string(),
                }
            }

            fn lockfile(&self) -> PathBuf {
                self.dir.path().join("Gemfile.lock")
            }

            fn bundle_calls(&self) -> Vec<String> {
                std::fs::read_to_string(self.dir.path().join("bundle-calls.log"))
                    .unwrap_or_default()
                    .lines()
                    .map(str::to_string)
                    .collect()
            }
        }

        #[tokio::test]
        async fn miss_installs_and_saves() {
            let project = Project::new();
            let store_root = TempDir::new().unwrap();
            let store = DirStore::with_workdir(store_root.path(), project.dir.path());

            let report = project
                .cache(&store)
                .ensure(&project.runtime, "ubuntu-24.04", &project.lockfile(), "vendor/bundle")
                .await
                .unwrap();

            assert!(!report.reused());
            assert!(report.saved);
            assert_eq!(project.bundle_calls(), vec!["install --jobs 4"]);
            assert_eq!(store.entries().unwrap().len(), 1);
        }

        #[tokio::test]
        async fn second_run_is_an_exact_hit_and_never_resaves() {
            let project = Project::new();
            let store_root = TempDir::new().unwrap();
            let store = DirStore::with_workdir(store_root.path(), project.dir.path());

            let first = project
                .cache(&store)
                .ensure(&project.runtime, "ubuntu-24.04", &project.lockfile(), "vendor/bundle")
                .await
                .unwrap();
            assert!(first.saved);

            let second = project
                .cache(&store)
                .ensure(&project.runtime, "ubuntu-24.04", &project.lockfile(), "vendor/bundle")
                .await
                .unwrap();

            assert_eq!(second.restored_key.as_deref(), Some(second.key.as_str()));
            assert!(!second.saved);
            assert_eq!(store.entries().unwrap().len(), 1);
            // the install still ran, but no clean: both runs install-only
            assert_eq!(
                project.bundle_calls(),
                vec!["install --jobs 4", "install --jobs 4"]
            );
        }

        #[tokio::test]
        async fn changed_lockfile_falls_back_and_cleans_before_saving() {
            let project = Project::new();
            let store_root = TempDir::new().unwrap();
            let store = DirStore::with_workdir(store_root.path(), project.dir.path());

            project
                .cache(&store)
                .ensure(&project.runtime, "ubuntu-24.04", &project.lockfile(), "vendor/bundle")
                .await
                .unwrap();

            std::fs::write(project.lockfile(), "GEM\n  specs:\n    rake (13.2.1)\n").unwrap();
            let report = project
                .cache(&store)
                .ensure(&project.runtime, "ubuntu-24.04", &project.lockfile(), "vendor/bundle")
                .await
                .unwrap();

            // stale entry matched through the base prefix
            assert!(report.reused());
            assert_ne!(report.restored_key.as_deref(), Some(report.key.as_str()));
            assert!(report.saved);
            assert_eq!(
                project.bundle_calls(),
                vec!["install --jobs 4", "install --jobs 4", "clean"]
            );
            assert_eq!(store.entries().unwrap().len(), 2);
        }

        #[tokio::test]
        async fn store_trouble_is_a_miss_not_a_failure() {
            struct BrokenStore;

            #[async_trait::async_trait]
            impl CacheStore for BrokenStore {
                async fn restore(
                    &self,
                    _paths: &[PathBuf],
                    _key: &str,
                    _fallbacks: &[String],
                ) -> Result<Option<String>, StoreError> {
                    Err(StoreError::Other("backend unreachable".to_string()))
                }

                async fn save(&self, _paths: &[PathBuf], _key: &str) -> Result<(), StoreError> {
                    Err(StoreError::Other("backend unreachable".to_string()))
                }
            }

            let project = Project::new();
            let store = BrokenStore;

            let report = project
                .cache(&store)
                .ensure(&project.runtime, "ubuntu-24.04", &project.lockfile(), "vendor/bundle")
                .await
                .unwrap();

            assert!(!report.reused());
            assert!(!report.saved);
            // dependencies still installed
            assert_eq!(project.bundle_calls(), vec!["install --jobs 4"]);
        }

        #[tokio::test]
        async fn validation_errors_are_fatal() {
            struct PickyStore;

            #[async_trait::async_trait]
            impl CacheStore for PickyStore {
                async fn restore(
                    &self,
                    _paths: &[PathBuf],
                    _key: &str,
                    _fallbacks: &[String],
                ) -> Result<Option<String>, StoreError> {
                    Err(StoreError::Validation("bad key".to_string()))
                }

                async fn save(&self, _paths: &[PathBuf], _key: &str) -> Result<(), StoreError> {
                    Ok(())
                }
            }

            let project = Project::new();
            let store = PickyStore;

            let err = project
                .cache(&store)
                .ensure(&project.runtime, "ubuntu-24.04", &project.lockfile(), "vendor/bundle")
                .await
                .unwrap_err();
            assert!(matches!(err, RbupError::CacheValidation(_)));
        }

    }
}
