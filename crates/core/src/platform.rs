//! Host platform detection and per-tool platform normalization.
//!
//! Raw host tokens use the `GOOS`/`GOARCH` vocabulary (`linux`, `darwin`,
//! `amd64`, `arm64`, ...) because that is what most release naming schemes
//! start from. Each tool then remaps those tokens through its own tables.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::{Error, Result};

/// Raw OS/architecture tokens of a machine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostPlatform {
    /// Raw OS token (`linux`, `darwin`, `windows`, ...).
    pub os: String,
    /// Raw architecture token (`amd64`, `arm64`, `386`, `arm`, ...).
    pub arch: String,
}

impl HostPlatform {
    /// Create a host platform from raw tokens.
    #[must_use]
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// Detect the platform this process runs on.
    #[must_use]
    pub fn current() -> Self {
        let os = match std::env::consts::OS {
            "macos" => "darwin",
            other => other,
        };
        let arch = go_arch(std::env::consts::ARCH, cfg!(target_endian = "little"));
        Self::new(os, arch)
    }

    /// Parse from a string like `linux/amd64` or `darwin-arm64`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let (os, arch) = s.split_once('/').or_else(|| s.split_once('-'))?;
        if os.is_empty() || arch.is_empty() || arch.contains(['/', '-']) {
            return None;
        }
        Some(Self::new(os.to_lowercase(), arch.to_lowercase()))
    }
}

/// Go-style name of a Rust target architecture.
fn go_arch(rust_arch: &str, little_endian: bool) -> &str {
    match rust_arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        "powerpc64" if little_endian => "ppc64le",
        "powerpc64" => "ppc64",
        "loongarch64" => "loong64",
        other => other,
    }
}

impl fmt::Display for HostPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

/// A tool's OS and architecture names after remapping.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlatformPair {
    /// Tool-specific OS name, substituted for `{{.Platform}}`.
    pub os: String,
    /// Tool-specific architecture name, substituted for `{{.Arch}}`.
    pub arch: String,
}

impl fmt::Display for PlatformPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os, self.arch)
    }
}

/// Per-tool remap tables.
///
/// Unsupported entries are `os/arch` pairs, or a bare OS or architecture
/// token that rules out every combination containing it. They are matched
/// against the raw host tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct PlatformMap {
    /// Raw OS token → tool OS name.
    pub os: BTreeMap<String, String>,
    /// Raw architecture token → tool architecture name.
    pub arch: BTreeMap<String, String>,
    /// Platforms the tool does not publish artifacts for.
    pub unsupported: Vec<String>,
}

impl PlatformMap {
    fn is_unsupported(&self, raw_os: &str, raw_arch: &str) -> bool {
        self.unsupported.iter().any(|entry| match entry.split_once('/') {
            Some((os, arch)) => (os == "*" || os == raw_os) && (arch == "*" || arch == raw_arch),
            None => entry == raw_os || entry == raw_arch,
        })
    }
}

/// Map raw host tokens to the names a tool uses in its release files.
///
/// Tokens missing from a map pass through unchanged.
///
/// # Errors
///
/// Returns [`Error::UnsupportedPlatform`] when the map explicitly lists the
/// host as unsupported.
pub fn normalize_platform(
    tool: &str,
    raw_os: &str,
    raw_arch: &str,
    map: &PlatformMap,
) -> Result<PlatformPair> {
    if map.is_unsupported(raw_os, raw_arch) {
        return Err(Error::UnsupportedPlatform {
            tool: tool.to_string(),
            os: raw_os.to_string(),
            arch: raw_arch.to_string(),
        });
    }
    let os = map.os.get(raw_os).map_or(raw_os, String::as_str);
    let arch = map.arch.get(raw_arch).map_or(raw_arch, String::as_str);
    Ok(PlatformPair {
        os: os.to_string(),
        arch: arch.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map() -> PlatformMap {
        PlatformMap {
            os: BTreeMap::from([("darwin".into(), "macOS".into())]),
            arch: BTreeMap::from([
                ("amd64".into(), "x86_64".into()),
                ("arm64".into(), "aarch64".into()),
            ]),
            unsupported: vec!["windows".into(), "linux/386".into(), "*/s390x".into()],
        }
    }

    #[test]
    fn test_normalize_maps_and_passes_through() {
        let pair = normalize_platform("t", "darwin", "amd64", &map()).unwrap();
        assert_eq!(pair.os, "macOS");
        assert_eq!(pair.arch, "x86_64");

        let pair = normalize_platform("t", "freebsd", "riscv64", &map()).unwrap();
        assert_eq!(pair.os, "freebsd");
        assert_eq!(pair.arch, "riscv64");
        assert_eq!(pair.to_string(), "freebsd-riscv64");
    }

    #[test]
    fn test_normalize_unsupported() {
        for (os, arch) in [("windows", "amd64"), ("linux", "386"), ("darwin", "s390x")] {
            let err = normalize_platform("jq", os, arch, &map()).unwrap_err();
            assert!(matches!(err, Error::UnsupportedPlatform { .. }), "{os}/{arch}");
        }
        assert!(normalize_platform("jq", "darwin", "386", &map()).is_ok());
    }

    #[test]
    fn test_host_parse() {
        let host = HostPlatform::parse("linux/amd64").unwrap();
        assert_eq!(host, HostPlatform::new("linux", "amd64"));
        assert_eq!(
            HostPlatform::parse("Darwin-ARM64").unwrap(),
            HostPlatform::new("darwin", "arm64")
        );
        assert!(HostPlatform::parse("linux").is_none());
        assert!(HostPlatform::parse("linux/amd64/v2").is_none());
        assert!(HostPlatform::parse("/amd64").is_none());
    }

    #[test]
    fn test_go_arch_names() {
        assert_eq!(go_arch("x86_64", true), "amd64");
        assert_eq!(go_arch("powerpc64", true), "ppc64le");
        assert_eq!(go_arch("powerpc64", false), "ppc64");
        assert_eq!(go_arch("riscv64", true), "riscv64");
    }

    #[test]
    fn test_host_current_is_go_style() {
        let host = HostPlatform::current();
        assert_ne!(host.os, "macos");
        assert_ne!(host.arch, "x86_64");
        assert_ne!(host.arch, "aarch64");
        assert!(!host.to_string().is_empty());
    }

    #[test]
    fn test_platform_map_deserializes() {
        let map: PlatformMap = toml::from_str(
            r#"
            unsupported = ["windows"]
            [os]
            darwin = "apple-darwin"
            [arch]
            amd64 = "x86_64"
            "#,
        )
        .unwrap();
        assert_eq!(map.os["darwin"], "apple-darwin");
        assert_eq!(map.arch["amd64"], "x86_64");
        assert_eq!(map.unsupported, vec!["windows".to_string()]);
    }
}
