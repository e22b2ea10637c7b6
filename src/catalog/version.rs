//! Version string classification and ordering
//!
//! Ruby builds are named by dot/dash-delimited component lists
//! (`3.2.4`, `1.8.7-p375`, `9.4.8.0`) plus a handful of moving head
//! markers for nightly builds. Ordering compares component lists
//! numerically where possible; a version that is a strict prefix of
//! another sorts first, and head markers sort after every release.

use std::cmp::Ordering;

/// Markers naming nightly/unreleased builds. These never match a
/// partial version pattern, only an exact request.
pub const HEAD_MARKERS: &[&str] = &["head", "debug", "mingw", "mswin", "ucrt"];

/// Whether this version names a nightly/unreleased build
pub fn is_head(version: &str) -> bool {
    HEAD_MARKERS.contains(&version)
}

/// Whether this is a plain numeric release like `3.2.4` or `9.4.8.0`
///
/// Patch-level suffixes (`1.8.7-p375`) are releases but not stable in
/// this sense; they are only picked when nothing stable matches.
pub fn is_stable(version: &str) -> bool {
    !version.is_empty()
        && version
            .split('.')
            .all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()))
}

/// Split a version into its comparison components
fn components(version: &str) -> impl Iterator<Item = &str> {
    version.split(['.', '-'])
}

/// Total order over version strings
///
/// Component pairs compare numerically when both parse, otherwise
/// lexically, with numeric components ordering before alphanumeric
/// ones. When one version runs out of components it sorts first, so
/// `3.2` precedes `3.2.4` and `1.8.7` precedes `1.8.7-p375`.
pub fn compare(a: &str, b: &str) -> Ordering {
    let mut left = components(a);
    let mut right = components(b);

    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(m), Ok(n)) => m.cmp(&n),
                    (Ok(_), Err(_)) => Ordering::Less,
                    (Err(_), Ok(_)) => Ordering::Greater,
                    (Err(_), Err(_)) => x.cmp(y),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

/// Whether `version` starts with `pattern` as a dot-delimited component
/// prefix
///
/// `3.2` matches `3.2.4` but not `3.20.0`; the comparison is over
/// component lists, never over raw strings. An empty pattern matches
/// everything.
pub fn matches_prefix(version: &str, pattern: &str) -> bool {
    if pattern.is_empty() {
        return true;
    }
    let mut have = components(version);
    for want in components(pattern) {
        match have.next() {
            Some(part) if part == want => {}
            _ => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_markers() {
        assert!(is_head("head"));
        assert!(is_head("debug"));
        assert!(is_head("mswin"));
        assert!(!is_head("3.2.4"));
        assert!(!is_head(""));
    }

    #[test]
    fn stable_classification() {
        assert!(is_stable("3.2.4"));
        assert!(is_stable("9.4.8.0"));
        assert!(!is_stable("1.8.7-p375"));
        assert!(!is_stable("head"));
        assert!(!is_stable(""));
    }

    #[test]
    fn numeric_ordering() {
        assert_eq!(compare("3.2.4", "3.2.5"), Ordering::Less);
        assert_eq!(compare("3.2.4", "3.10.0"), Ordering::Less);
        assert_eq!(compare("9.4.8.0", "9.4.8.0"), Ordering::Equal);
        assert_eq!(compare("10.0.0", "9.9.9"), Ordering::Greater);
    }

    #[test]
    fn missing_components_sort_first() {
        assert_eq!(compare("3.2", "3.2.0"), Ordering::Less);
        assert_eq!(compare("1.8.7", "1.8.7-p375"), Ordering::Less);
    }

    #[test]
    fn head_sorts_after_releases() {
        assert_eq!(compare("3.3.5", "head"), Ordering::Less);
        assert_eq!(compare("head", "9.4.8.0"), Ordering::Greater);
    }

    #[test]
    fn prefix_is_component_aware() {
        assert!(matches_prefix("3.2.4", "3.2"));
        assert!(matches_prefix("3.2.4", "3"));
        assert!(matches_prefix("3.2.4", "3.2.4"));
        assert!(!matches_prefix("3.20.0", "3.2"));
        assert!(!matches_prefix("1.10.0", "1.1"));
    }

    #[test]
    fn prefix_empty_matches_all() {
        assert!(matches_prefix("3.2.4", ""));
        assert!(matches_prefix("head", ""));
    }

    #[test]
    fn prefix_on_patch_levels() {
        assert!(matches_prefix("1.8.7-p375", "1.8.7"));
        assert!(matches_prefix("1.8.7-p375", "1.8"));
        assert!(!matches_prefix("1.8.7-p375", "1.8.7-p3"));
    }
}
