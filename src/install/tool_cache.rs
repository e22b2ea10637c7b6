//! Persistent tool cache lookups
//!
//! Hosted runners keep previously installed tools under
//! `$RUNNER_TOOL_CACHE/<name>/<version>/<arch>`. A zero-byte marker
//! file inside the prefix is the sole signal that an entry finished
//! installing; an unmarked directory is treated as absent and
//! reinstalled over.

use crate::catalog::version;
use crate::error::{RbupError, RbupResult};
use crate::platform::Architecture;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Marker file recording a finished installation
pub const COMPLETE_MARKER: &str = ".complete";

/// Tool name under which runtimes are cached
pub const TOOL_NAME: &str = "Ruby";

/// A persistent, cross-run tool cache directory
#[derive(Debug, Clone)]
pub struct ToolCache {
    root: PathBuf,
}

impl ToolCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Locate the runner's tool cache, preferring an explicit override
    pub fn locate(override_root: Option<&Path>) -> Option<Self> {
        if let Some(root) = override_root {
            return Some(Self::new(root));
        }
        std::env::var_os("RUNNER_TOOL_CACHE").map(Self::new)
    }

    /// The prefix an installation of (version, arch) lives at
    pub fn prefix(&self, version: &str, arch: Architecture) -> PathBuf {
        self.root.join(TOOL_NAME).join(version).join(arch.as_str())
    }

    /// A usable cached installation, if one is present and complete
    pub fn find(&self, version: &str, arch: Architecture) -> Option<PathBuf> {
        let prefix = self.prefix(version, arch);
        if is_complete(&prefix) {
            debug!("Tool cache hit: {}", prefix.display());
            Some(prefix)
        } else {
            debug!("Tool cache miss: {}", prefix.display());
            None
        }
    }
}

/// Whether the tool cache applies to this build at all
///
/// Only plain `ruby` releases are interchangeable enough to share
/// across runs; alternative engines and nightly builds install under
/// the run's own rubies directory instead.
pub fn eligible(engine: &str, ruby_version: &str) -> bool {
    engine == "ruby" && !version::is_head(ruby_version)
}

/// Whether `prefix` holds a finished installation
pub fn is_complete(prefix: &Path) -> bool {
    prefix.join(COMPLETE_MARKER).is_file()
}

/// Record that `prefix` finished installing
///
/// Written strictly after extraction succeeds, so a crashed run never
/// leaves a marked-but-partial entry behind.
pub fn mark_complete(prefix: &Path) -> RbupResult<()> {
    let marker = prefix.join(COMPLETE_MARKER);
    std::fs::write(&marker, [])
        .map_err(|e| RbupError::io(format!("writing {}", marker.display()), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn prefix_layout() {
        let cache = ToolCache::new("/opt/hostedtoolcache");
        assert_eq!(
            cache.prefix("3.2.4", Architecture::X64),
            PathBuf::from("/opt/hostedtoolcache/Ruby/3.2.4/x64")
        );
    }

    #[test]
    fn find_requires_marker() {
        let dir = TempDir::new().unwrap();
        let cache = ToolCache::new(dir.path());
        let prefix = cache.prefix("3.2.4", Architecture::X64);
        std::fs::create_dir_all(&prefix).unwrap();

        // present but unmarked: treated as absent
        assert!(cache.find("3.2.4", Architecture::X64).is_none());

        mark_complete(&prefix).unwrap();
        assert_eq!(cache.find("3.2.4", Architecture::X64), Some(prefix));
    }

    #[test]
    fn marker_is_zero_bytes() {
        let dir = TempDir::new().unwrap();
        mark_complete(dir.path()).unwrap();
        let meta = std::fs::metadata(dir.path().join(COMPLETE_MARKER)).unwrap();
        assert_eq!(meta.len(), 0);
    }

    #[test]
    fn eligibility() {
        assert!(eligible("ruby", "3.2.4"));
        assert!(eligible("ruby", "1.8.7-p375"));
        assert!(!eligible("ruby", "head"));
        assert!(!eligible("jruby", "9.4.8.0"));
        assert!(!eligible("truffleruby", "24.0.1"));
    }

    #[test]
    fn locate_prefers_override() {
        let cache = ToolCache::locate(Some(Path::new("/custom"))).unwrap();
        assert_eq!(
            cache.prefix("3.3.5", Architecture::X86),
            PathBuf::from("/custom/Ruby/3.3.5/x86")
        );
    }
}
