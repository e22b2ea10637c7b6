//! Version pattern resolution
//!
//! Turns a possibly-partial version pattern into one concrete catalog
//! entry. An exact match always wins, including head markers. Anything
//! else is a newest-to-oldest prefix scan in two passes: stable
//! releases first (so an empty pattern lands on the latest stable),
//! then any non-head release (so `1.8` can still land on a patch-level
//! build like `1.8.7-p375`). Head builds never match a partial
//! pattern; a nightly must be asked for by name.

use crate::catalog::version;
use crate::catalog::{CatalogEntry, VersionCatalog};
use crate::error::{RbupError, RbupResult};
use tracing::debug;

/// Resolve `pattern` against `catalog`
///
/// Fails with [`RbupError::UnknownVersion`] listing every available
/// version when nothing matches. `platform` is only used in error
/// messages.
pub fn resolve<'a>(
    catalog: &'a VersionCatalog,
    pattern: &str,
    platform: &str,
) -> RbupResult<&'a CatalogEntry> {
    if let Some(entry) = catalog.find(pattern) {
        debug!("exact match for {}-{}", catalog.engine(), pattern);
        return Ok(entry);
    }

    let found = catalog
        .newest_first()
        .find(|e| version::is_stable(&e.version) && version::matches_prefix(&e.version, pattern))
        .or_else(|| {
            catalog.newest_first().find(|e| {
                !version::is_head(&e.version) && version::matches_prefix(&e.version, pattern)
            })
        });

    match found {
        Some(entry) => {
            debug!(
                "resolved {}-{:?} to {}",
                catalog.engine(),
                pattern,
                entry.version
            );
            Ok(entry)
        }
        None => Err(RbupError::UnknownVersion {
            engine: catalog.engine().to_string(),
            platform: platform.to_string(),
            version: pattern.to_string(),
            available: catalog.versions().map(str::to_string).collect(),
        }),
    }
}
