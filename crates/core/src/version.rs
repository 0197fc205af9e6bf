//! Version ordering, pre-release classification and "latest" resolution.
//!
//! Versions are kept as opaque strings. Ordering comes from a derived key:
//! the string is split into numeric and text segments at `.`, `-`, `_`, `+`
//! and at every digit/letter boundary, so `1.10.0rc1` becomes
//! `[1, 10, 0, rc, 1]`. Segments compare as
//!
//! ```text
//! pre-release marker  <  end of version  <  other text  <  number
//! ```
//!
//! which gives the usual results: `1.0 < 1.0.1`, `1.0.0-rc1 < 1.0.0`,
//! `1.0.0-beta < 1.0.0-rc`, `1.0.0 < 1.0.0-linux`.
//!
//! Tool-specific prefixes (`v`, `go`, `stable-`) are never stripped here;
//! callers do that before handing versions over.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::{Error, Result};

/// Markers that classify a segment as pre-release, lowest first.
const PRERELEASE_MARKERS: &[&str] = &[
    "snapshot", "nightly", "canary", "dev", "a", "alpha", "b", "beta", "pre", "preview", "c",
    "rc",
];

/// Generic pre-release heuristic applied to every tool.
#[allow(clippy::unwrap_used)]
static GENERIC_PRERELEASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        (?:^|[.\-_+]|\d)(?:alpha|beta|rc|dev|nightly|preview|pre|snapshot|canary)(?:$|[.\-_+]|\d)
        | [.\-_+](?:19|20)\d{2}-?[01]\d-?[0-3]\d(?:$|[.\-_+T])
        ",
    )
    .unwrap()
});

/// A single segment of a version key.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// A recognized pre-release marker with its rank.
    PreRelease(usize, String),
    /// Any other text segment.
    Text(String),
    /// Digits with leading zeros removed.
    Number(String),
}

impl Segment {
    fn classify(raw: &str) -> Self {
        if raw.bytes().all(|b| b.is_ascii_digit()) {
            let trimmed = raw.trim_start_matches('0');
            return Self::Number(if trimmed.is_empty() { "0" } else { trimmed }.to_string());
        }
        let lower = raw.to_ascii_lowercase();
        match PRERELEASE_MARKERS.iter().position(|m| *m == lower) {
            Some(rank) => Self::PreRelease(rank, lower),
            None => Self::Text(raw.to_string()),
        }
    }

    /// Position of the segment kind relative to "end of version".
    const fn tier(&self) -> u8 {
        match self {
            Self::PreRelease(..) => 0,
            Self::Text(_) => 2,
            Self::Number(_) => 3,
        }
    }
}

const END_TIER: u8 = 1;

fn compare_segments(a: Option<&Segment>, b: Option<&Segment>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (Some(a), None) => a.tier().cmp(&END_TIER),
        (None, Some(b)) => END_TIER.cmp(&b.tier()),
        (Some(Segment::Number(x)), Some(Segment::Number(y))) => {
            x.len().cmp(&y.len()).then_with(|| x.cmp(y))
        }
        (Some(Segment::PreRelease(rx, x)), Some(Segment::PreRelease(ry, y))) => {
            rx.cmp(ry).then_with(|| x.cmp(y))
        }
        (Some(Segment::Text(x)), Some(Segment::Text(y))) => x.cmp(y),
        (Some(a), Some(b)) => a.tier().cmp(&b.tier()),
    }
}

fn segments(version: &str) -> Vec<Segment> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut current_is_digit = false;

    for ch in version.chars() {
        if matches!(ch, '.' | '-' | '_' | '+') {
            if !current.is_empty() {
                out.push(Segment::classify(&current));
                current.clear();
            }
            continue;
        }
        let is_digit = ch.is_ascii_digit();
        if !current.is_empty() && is_digit != current_is_digit {
            out.push(Segment::classify(&current));
            current.clear();
        }
        current_is_digit = is_digit;
        current.push(ch);
    }
    if !current.is_empty() {
        out.push(Segment::classify(&current));
    }
    out
}

/// Compare two version strings.
///
/// Consistent and transitive; two different strings with the same key
/// (`1.0-rc1` and `1.0.rc.1`) fall back to plain string order so the result
/// is a total order.
#[must_use]
pub fn compare(a: &str, b: &str) -> Ordering {
    let left = segments(a);
    let right = segments(b);
    let len = left.len().max(right.len());
    (0..len)
        .map(|i| compare_segments(left.get(i), right.get(i)))
        .find(|o| o.is_ne())
        .unwrap_or_else(|| a.cmp(b))
}

/// Sort versions ascending in place. The sort is stable.
pub fn sort_ascending<S: AsRef<str>>(versions: &mut [S]) {
    versions.sort_by(|a, b| compare(a.as_ref(), b.as_ref()));
}

/// Whether `version` looks like a pre-release.
///
/// Checks the generic markers and, when given, the tool's own pattern.
#[must_use]
pub fn is_prerelease(version: &str, tool_pattern: Option<&Regex>) -> bool {
    GENERIC_PRERELEASE.is_match(version) || tool_pattern.is_some_and(|re| re.is_match(version))
}

/// Drop pre-release versions.
///
/// If every version is a pre-release the input is returned unchanged, so a
/// tool that only ships pre-releases still resolves to something.
#[must_use]
pub fn filter_stable(versions: &[String], tool_pattern: Option<&Regex>) -> Vec<String> {
    let stable: Vec<String> = versions
        .iter()
        .filter(|v| !is_prerelease(v, tool_pattern))
        .cloned()
        .collect();
    if stable.is_empty() {
        versions.to_vec()
    } else {
        stable
    }
}

/// Pick the greatest version starting with `query_prefix`.
///
/// `versions` must already be sorted ascending. Stable versions win over
/// pre-releases when any match the prefix.
///
/// # Errors
///
/// [`Error::NoVersionsFound`] when `versions` is empty and
/// [`Error::NoVersionsMatching`] when the prefix excludes everything.
pub fn resolve_latest_matching(
    tool: &str,
    versions: &[String],
    query_prefix: &str,
    tool_pattern: Option<&Regex>,
) -> Result<String> {
    if versions.is_empty() {
        return Err(Error::NoVersionsFound {
            tool: tool.to_string(),
        });
    }

    let matching: Vec<String> = versions
        .iter()
        .filter(|v| v.starts_with(query_prefix))
        .cloned()
        .collect();

    let candidates = filter_stable(&matching, tool_pattern);
    candidates
        .last()
        .cloned()
        .ok_or_else(|| Error::NoVersionsMatching {
            tool: tool.to_string(),
            query: query_prefix.to_string(),
        })
}

/// Strip a tool's tag prefix, returning `None` for tags without it.
///
/// An empty prefix accepts every tag unchanged.
#[must_use]
pub fn strip_version_prefix<'a>(tag: &'a str, prefix: &str) -> Option<&'a str> {
    let version = tag.strip_prefix(prefix)?;
    if version.is_empty() { None } else { Some(version) }
}

/// Check that `version` can be used as a single path component.
///
/// # Errors
///
/// [`Error::InvalidVersion`] for empty strings, `.`, `..`, and strings
/// containing `/`, `\` or NUL.
pub fn ensure_path_component(version: &str) -> Result<()> {
    let reason = if version.is_empty() {
        "empty"
    } else if version == "." || version == ".." {
        "relative path component"
    } else if version.contains(['/', '\\', '\0']) {
        "contains a path separator or NUL"
    } else {
        return Ok(());
    };
    Err(Error::invalid_version(version, reason))
}

/// An opaque version string ordered by [`compare`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(String);

impl Version {
    /// Wrap a version string.
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    /// The version string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the generic heuristic classifies this as a pre-release.
    #[must_use]
    pub fn is_prerelease(&self) -> bool {
        is_prerelease(&self.0, None)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        compare(&self.0, &other.0)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::configuration("empty version string"));
        }
        Ok(Self(s.to_string()))
    }
}

impl AsRef<str> for Version {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Compiled version rules of a plugin.
#[derive(Debug, Clone, Default)]
pub struct VersionRules {
    /// Only versions matching this are listed.
    pub include: Option<Regex>,
    /// Tool-specific pre-release pattern.
    pub prerelease: Option<Regex>,
}

impl VersionRules {
    /// Compile the rule set from optional pattern strings.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an invalid regular expression.
    pub fn compile(include: Option<&str>, prerelease: Option<&str>) -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| Error::configuration(format!("invalid pattern '{pattern}': {e}")))
        };
        Ok(Self {
            include: include.map(compile).transpose()?,
            prerelease: prerelease.map(compile).transpose()?,
        })
    }

    /// Whether a (prefix-stripped) version passes the include filter.
    #[must_use]
    pub fn includes(&self, version: &str) -> bool {
        self.include.as_ref().is_none_or(|re| re.is_match(version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_path_component_check() {
        for good in ["1.7.1", "v2.0.0-rc1", "3.3.0+build..1"] {
            assert!(ensure_path_component(good).is_ok(), "{good}");
        }
        for bad in ["", ".", "..", "../../../victim", "/etc", "a\\b", "1.0\01"] {
            assert!(
                matches!(ensure_path_component(bad), Err(Error::InvalidVersion { .. })),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn test_numeric_ordering() {
        assert_eq!(compare("1.2.0", "1.10.0"), Ordering::Less);
        assert_eq!(compare("1.10.0", "1.2.0"), Ordering::Greater);
        assert_eq!(compare("2.0.0", "2.0.0"), Ordering::Equal);
        assert_eq!(compare("1.0", "1.0.1"), Ordering::Less);
        assert_eq!(compare("0.9.9", "1"), Ordering::Less);
    }

    #[test]
    fn test_prerelease_sorts_before_final() {
        assert_eq!(compare("1.0.0-rc1", "1.0.0"), Ordering::Less);
        assert_eq!(compare("1.0.0", "1.0.0-rc1"), Ordering::Greater);
        assert_eq!(compare("1.0.0rc1", "1.0.0"), Ordering::Less);
        assert_eq!(compare("1.0.0-beta.2", "1.0.0-rc.1"), Ordering::Less);
        assert_eq!(compare("1.0.0-alpha", "1.0.0-beta"), Ordering::Less);
        assert_eq!(compare("1.0.0-rc.1", "1.0.0-rc.2"), Ordering::Less);
        assert_eq!(compare("1.0.0-rc1", "0.9.0"), Ordering::Greater);
    }

    #[test]
    fn test_trailing_text_compares_after_numbers() {
        assert_eq!(compare("1.0.0", "1.0.0-linux"), Ordering::Less);
        assert_eq!(compare("1.0.0-apple", "1.0.0-linux"), Ordering::Less);
        assert_eq!(compare("1.0.0-linux", "1.0.1"), Ordering::Less);
    }

    #[test]
    fn test_leading_zeros_and_large_numbers() {
        assert_eq!(compare("1.01.5", "1.1.4"), Ordering::Greater);
        assert_ne!(compare("1.01", "1.1"), Ordering::Equal);
        assert_eq!(
            compare("1.99999999999999999999999", "1.100000000000000000000000"),
            Ordering::Less
        );
    }

    #[test]
    fn test_sort_ascending() {
        let mut versions = strings(&["1.10.0", "1.2.0", "1.2.0-rc1", "0.1", "1.2.1"]);
        sort_ascending(&mut versions);
        assert_eq!(
            versions,
            strings(&["0.1", "1.2.0-rc1", "1.2.0", "1.2.1", "1.10.0"])
        );
    }

    #[test]
    fn test_generic_prerelease_markers() {
        for v in [
            "1.0.0-alpha",
            "1.0.0-beta.1",
            "1.0.0rc2",
            "2.0.0-dev",
            "nightly",
            "1.2.0-nightly.3",
            "3.0.0-preview1",
            "1.0.0-20240115",
            "0.5.0-SNAPSHOT",
        ] {
            assert!(is_prerelease(v, None), "{v} should be a pre-release");
        }
        for v in ["1.0.0", "2024.01.15", "1.2.3-linux", "20.10.7", "1.0.0+build5"] {
            assert!(!is_prerelease(v, None), "{v} should be stable");
        }
    }

    #[test]
    fn test_tool_specific_prerelease_pattern() {
        // Odd minor versions are development releases for some tools.
        let odd_minor = Regex::new(r"^\d+\.\d*[13579]\.").unwrap();
        assert!(is_prerelease("1.3.0", Some(&odd_minor)));
        assert!(!is_prerelease("1.4.0", Some(&odd_minor)));
    }

    #[test]
    fn test_filter_stable_never_empties() {
        let all_pre = strings(&["1.0.0-rc1", "1.0.0-beta"]);
        assert_eq!(filter_stable(&all_pre, None), all_pre);

        let mixed = strings(&["1.0.0", "1.1.0-rc1", "1.2.0"]);
        assert_eq!(filter_stable(&mixed, None), strings(&["1.0.0", "1.2.0"]));

        assert!(filter_stable(&[], None).is_empty());
    }

    #[test]
    fn test_resolve_latest_matching() {
        let versions = strings(&["1.0.0", "1.1.0", "1.2.0-rc1", "2.0.0", "2.1.0-beta"]);
        assert_eq!(
            resolve_latest_matching("t", &versions, "", None).unwrap(),
            "2.0.0"
        );
        assert_eq!(
            resolve_latest_matching("t", &versions, "1", None).unwrap(),
            "1.1.0"
        );
        assert_eq!(
            resolve_latest_matching("t", &strings(&["3.0.0-rc1", "3.0.0-rc2"]), "3", None)
                .unwrap(),
            "3.0.0-rc2"
        );
    }

    #[test]
    fn test_resolve_latest_errors() {
        assert!(matches!(
            resolve_latest_matching("t", &[], "", None),
            Err(Error::NoVersionsFound { .. })
        ));
        assert!(matches!(
            resolve_latest_matching("t", &strings(&["1.0.0", "2.0.0"]), "9", None),
            Err(Error::NoVersionsMatching { .. })
        ));
    }

    #[test]
    fn test_strip_version_prefix() {
        assert_eq!(strip_version_prefix("v1.2.3", "v"), Some("1.2.3"));
        assert_eq!(strip_version_prefix("go1.22.0", "go"), Some("1.22.0"));
        assert_eq!(strip_version_prefix("1.2.3", "v"), None);
        assert_eq!(strip_version_prefix("1.2.3", ""), Some("1.2.3"));
        assert_eq!(strip_version_prefix("v", "v"), None);
    }

    #[test]
    fn test_version_rules() {
        let rules = VersionRules::compile(Some(r"^\d+\.\d+\.\d+$"), None).unwrap();
        assert!(rules.includes("1.2.3"));
        assert!(!rules.includes("1.2.3-rc1"));
        assert!(VersionRules::default().includes("anything"));
        assert!(matches!(
            VersionRules::compile(Some("("), None),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_version_type_ordering() {
        let mut versions: Vec<Version> = ["1.10", "1.9", "1.9-rc1"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        versions.sort();
        let sorted: Vec<&str> = versions.iter().map(Version::as_str).collect();
        assert_eq!(sorted, ["1.9-rc1", "1.9", "1.10"]);
        assert!("".parse::<Version>().is_err());
    }
}
