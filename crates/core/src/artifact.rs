//! Artifact descriptors and archive kind detection.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Payload format of a downloaded artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArchiveKind {
    /// gzip-compressed tarball.
    #[serde(rename = "tar.gz", alias = "tgz")]
    TarGz,
    /// xz-compressed tarball.
    #[serde(rename = "tar.xz", alias = "txz")]
    TarXz,
    /// Zip archive.
    #[serde(rename = "zip")]
    Zip,
    /// A single gzip-compressed file, no tar layer.
    #[serde(rename = "gz")]
    Gzip,
    /// An uncompressed executable.
    #[serde(rename = "raw")]
    Raw,
}

impl ArchiveKind {
    /// Detect the kind from a file name's extension.
    ///
    /// Anything unrecognised is treated as a raw binary.
    #[must_use]
    pub fn from_file_name(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Self::TarGz
        } else if lower.ends_with(".tar.xz") || lower.ends_with(".txz") {
            Self::TarXz
        } else if lower.ends_with(".zip") {
            Self::Zip
        } else if lower.ends_with(".gz") {
            Self::Gzip
        } else {
            Self::Raw
        }
    }

    /// Whether extraction can produce more than one file.
    #[must_use]
    pub const fn is_multi_file(self) -> bool {
        matches!(self, Self::TarGz | Self::TarXz | Self::Zip)
    }

    /// File name with this kind's extension removed.
    #[must_use]
    pub fn strip_extension(self, name: &str) -> &str {
        let suffixes: &[&str] = match self {
            Self::TarGz => &[".tar.gz", ".tgz"],
            Self::TarXz => &[".tar.xz", ".txz"],
            Self::Zip => &[".zip"],
            Self::Gzip => &[".gz"],
            Self::Raw => &[],
        };
        suffixes
            .iter()
            .find_map(|s| {
                let cut = name.len().checked_sub(s.len())?;
                name.get(cut..)
                    .filter(|tail| tail.eq_ignore_ascii_case(s))
                    .and_then(|_| name.get(..cut))
            })
            .unwrap_or(name)
    }
}

impl fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::TarGz => "tar.gz",
            Self::TarXz => "tar.xz",
            Self::Zip => "zip",
            Self::Gzip => "gz",
            Self::Raw => "raw",
        };
        f.write_str(s)
    }
}

/// Where to fetch one tool version for one platform.
///
/// Derived purely from configuration, version and platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    /// File name the artifact is stored under in the download directory.
    pub file_name: String,
    /// Download URL.
    pub url: String,
    /// Payload format.
    pub kind: ArchiveKind,
    /// Companion checksum file URL, when the tool publishes one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum_url: Option<String>,
}
