//! Static version catalogs
//!
//! Maps concrete build versions to download URLs, per engine and per
//! platform. The underlying tables are JSON files regenerated offline
//! by `scripts/` against the upstream release indexes; this module only
//! loads, orders and merges them.
//!
//! Entries are held oldest-first as an explicit property: resolution
//! scans newest-to-oldest by iterating in reverse, and tests pin the
//! order rather than trusting the storage order of the JSON.

pub mod resolve;
pub mod version;

use crate::error::RbupResult;
use crate::platform::Architecture;
use serde::Deserialize;
use std::collections::BTreeMap;

const RELEASE_INDEX_JSON: &str = include_str!("data/releases.json");
const WINDOWS_X64_JSON: &str = include_str!("data/windows-x64.json");
const WINDOWS_X86_JSON: &str = include_str!("data/windows-x86.json");

const RELEASES_URL: &str = "https://github.com/ruby/ruby-builder/releases/download/toolcache";

/// One installable build: a concrete version plus where to fetch it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub version: String,
    pub url: String,
    pub architecture: Architecture,
}

/// All known builds of one engine on one platform, ordered oldest-first
#[derive(Debug, Clone)]
pub struct VersionCatalog {
    engine: String,
    entries: Vec<CatalogEntry>,
}

impl VersionCatalog {
    /// Build a catalog from unordered entries
    ///
    /// Sorts by version precedence and drops duplicate version strings,
    /// keeping the earliest occurrence in the input.
    pub fn new(engine: impl Into<String>, mut entries: Vec<CatalogEntry>) -> Self {
        entries.sort_by(|a, b| version::compare(&a.version, &b.version));
        entries.dedup_by(|b, a| a.version == b.version);
        Self {
            engine: engine.into(),
            entries,
        }
    }

    /// Merge two architecture-specific catalogs into one combined list
    ///
    /// When both offer the same version, the entry from `preferred`
    /// wins, so the combined catalog picks architectures
    /// deterministically.
    pub fn merged(engine: impl Into<String>, preferred: Self, fallback: Self) -> Self {
        let mut entries = preferred.entries;
        entries.extend(fallback.entries);
        Self::new(engine, entries)
    }

    /// The engine these builds belong to
    pub fn engine(&self) -> &str {
        &self.engine
    }

    /// Version strings, oldest-first
    pub fn versions(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.version.as_str())
    }

    /// Entries scanned newest-to-oldest
    pub fn newest_first(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.iter().rev()
    }

    /// Exact version lookup
    pub fn find(&self, version: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.version == version)
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Catalogs for every engine available on one platform
#[derive(Debug, Clone, Default)]
pub struct CatalogSet {
    catalogs: BTreeMap<String, VersionCatalog>,
}

impl CatalogSet {
    pub fn insert(&mut self, catalog: VersionCatalog) {
        self.catalogs.insert(catalog.engine().to_string(), catalog);
    }

    /// Catalog for an engine, if the engine exists on this platform
    pub fn engine(&self, name: &str) -> Option<&VersionCatalog> {
        self.catalogs.get(name)
    }

    /// Engine names, in deterministic order
    pub fn engines(&self) -> impl Iterator<Item = &str> {
        self.catalogs.keys().map(String::as_str)
    }
}

#[derive(Deserialize)]
struct WindowsIndexEntry {
    version: String,
    url: String,
}

/// Catalogs for prebuilt release tarballs (Linux, macOS, and every
/// non-ruby engine on Windows)
///
/// The release index lists versions only; URLs follow the release
/// naming scheme for the given builder platform. Head builds live in
/// the per-engine dev-builder repositories instead.
pub fn tarball_catalogs(builder_platform: &str, architecture: Architecture) -> RbupResult<CatalogSet> {
    let index: BTreeMap<String, Vec<String>> = serde_json::from_str(RELEASE_INDEX_JSON)?;

    let mut set = CatalogSet::default();
    for (engine, versions) in index {
        let entries = versions
            .iter()
            .map(|v| CatalogEntry {
                version: v.clone(),
                url: download_url(&engine, v, builder_platform),
                architecture,
            })
            .collect();
        set.insert(VersionCatalog::new(engine, entries));
    }
    Ok(set)
}

/// Download URL for one build on one builder platform
pub fn download_url(engine: &str, version: &str, builder_platform: &str) -> String {
    if version::is_head(version) {
        format!(
            "https://github.com/ruby/{engine}-dev-builder/releases/latest/download/{engine}-{version}-{builder_platform}.tar.gz"
        )
    } else {
        format!("{RELEASES_URL}/{engine}-{version}-{builder_platform}.tar.gz")
    }
}

/// Catalogs for the Windows installer builds of the `ruby` engine
///
/// `x64` and `x86` have independent tables; `default` is their merged
/// union with 64-bit entries winning version ties.
pub fn windows_catalogs(architecture: Architecture) -> RbupResult<CatalogSet> {
    let x64 = windows_catalog(WINDOWS_X64_JSON, Architecture::X64)?;
    let x86 = windows_catalog(WINDOWS_X86_JSON, Architecture::X86)?;

    let catalog = match architecture {
        Architecture::X64 => x64,
        Architecture::X86 => x86,
        Architecture::Default => VersionCatalog::merged("ruby", x64, x86),
    };

    let mut set = CatalogSet::default();
    set.insert(catalog);
    Ok(set)
}

fn windows_catalog(json: &str, architecture: Architecture) -> RbupResult<VersionCatalog> {
    let index: BTreeMap<String, Vec<WindowsIndexEntry>> = serde_json::from_str(json)?;

    let entries = index
        .get("ruby")
        .map(|list| {
            list.iter()
                .map(|e| CatalogEntry {
                    version: e.version.clone(),
                    url: e.url.clone(),
                    architecture,
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(VersionCatalog::new("ruby", entries))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(version: &str, arch: Architecture) -> CatalogEntry {
        CatalogEntry {
            version: version.to_string(),
            url: format!("https://example.test/{version}"),
            architecture: arch,
        }
    }

    #[test]
    fn catalog_sorts_oldest_first() {
        let catalog = VersionCatalog::new(
            "ruby",
            vec![
                entry("3.2.0", Architecture::X64),
                entry("2.7.8", Architecture::X64),
                entry("3.1.6", Architecture::X64),
            ],
        );
        let versions: Vec<_> = catalog.versions().collect();
        assert_eq!(versions, vec!["2.7.8", "3.1.6", "3.2.0"]);
    }

    #[test]
    fn catalog_head_sorts_last() {
        let catalog = VersionCatalog::new(
            "ruby",
            vec![
                entry("head", Architecture::X64),
                entry("3.3.5", Architecture::X64),
            ],
        );
        let versions: Vec<_> = catalog.versions().collect();
        assert_eq!(versions, vec!["3.3.5", "head"]);
    }

    #[test]
    fn catalog_dedups_versions() {
        let catalog = VersionCatalog::new(
            "ruby",
            vec![
                entry("3.2.4", Architecture::X64),
                entry("3.2.4", Architecture::X86),
            ],
        );
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.find("3.2.4").unwrap().architecture, Architecture::X64);
    }

    #[test]
    fn merged_prefers_first_catalog() {
        let x64 = VersionCatalog::new("ruby", vec![entry("3.0.7", Architecture::X64)]);
        let x86 = VersionCatalog::new(
            "ruby",
            vec![
                entry("3.0.7", Architecture::X86),
                entry("2.6.10", Architecture::X86),
            ],
        );

        let merged = VersionCatalog::merged("ruby", x64, x86);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.find("3.0.7").unwrap().architecture, Architecture::X64);
        assert_eq!(merged.find("2.6.10").unwrap().architecture, Architecture::X86);
    }

    #[test]
    fn newest_first_reverses() {
        let catalog = VersionCatalog::new(
            "ruby",
            vec![
                entry("3.1.6", Architecture::X64),
                entry("3.3.5", Architecture::X64),
            ],
        );
        let first = catalog.newest_first().next().unwrap();
        assert_eq!(first.version, "3.3.5");
    }

    #[test]
    fn embedded_release_index_loads() {
        let set = tarball_catalogs("ubuntu-24.04", Architecture::X64).unwrap();
        let ruby = set.engine("ruby").unwrap();
        assert!(!ruby.is_empty());
        assert!(set.engine("jruby").is_some());
        assert!(set.engine("truffleruby").is_some());
        assert!(set.engine("rubinius").is_none());
    }

    #[test]
    fn release_url_scheme() {
        let url = download_url("ruby", "3.2.4", "ubuntu-24.04");
        assert_eq!(
            url,
            "https://github.com/ruby/ruby-builder/releases/download/toolcache/ruby-3.2.4-ubuntu-24.04.tar.gz"
        );
    }

    #[test]
    fn head_url_uses_dev_builder() {
        let url = download_url("truffleruby", "head", "macos-latest");
        assert!(url.contains("truffleruby-dev-builder"));
        assert!(url.contains("releases/latest/download"));
    }

    #[test]
    fn embedded_windows_index_loads() {
        let set = windows_catalogs(Architecture::Default).unwrap();
        let ruby = set.engine("ruby").unwrap();
        assert!(!ruby.is_empty());
        // merged view holds the union of both architecture tables
        assert!(ruby.find("3.3.5").is_some());
    }

    #[test]
    fn windows_x86_only_lists_x86_builds() {
        let set = windows_catalogs(Architecture::X86).unwrap();
        let ruby = set.engine("ruby").unwrap();
        assert!(ruby
            .entries()
            .iter()
            .all(|e| e.architecture == Architecture::X86));
    }
}
