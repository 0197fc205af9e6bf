//! Version enumeration against a release source.

use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use toolvm_core::config::VersionSource;
use toolvm_core::ports::{ReleaseSource, RepoRef};
use toolvm_core::version::{resolve_latest_matching, sort_ascending, strip_version_prefix};
use toolvm_core::{PluginSpec, Result};
use tracing::debug;

struct Listing {
    versions: Vec<String>,
    /// Versions whose release is flagged as a pre-release.
    flagged: HashSet<String>,
}

async fn fetch_listing(
    spec: &PluginSpec,
    releases: &dyn ReleaseSource,
    cancel: &CancellationToken,
) -> Result<Listing> {
    let config = spec.config();
    let repo = RepoRef::new(&config.owner, &config.repo);
    let (names, flagged_tags): (Vec<String>, HashSet<String>) = match config.version_source {
        VersionSource::Tags => (releases.list_tags(&repo, cancel).await?, HashSet::new()),
        VersionSource::Releases => {
            let listed = releases.list_releases(&repo, cancel).await?;
            let flagged = listed
                .iter()
                .filter(|r| r.prerelease)
                .map(|r| r.tag_name.clone())
                .collect();
            (listed.into_iter().map(|r| r.tag_name).collect(), flagged)
        }
    };
    let total = names.len();

    let mut versions: Vec<String> = names
        .iter()
        .filter_map(|tag| strip_version_prefix(tag, &config.version_prefix))
        .filter(|v| spec.rules().includes(v))
        .map(str::to_string)
        .collect();
    sort_ascending(&mut versions);
    versions.dedup();
    let flagged = flagged_tags
        .iter()
        .filter_map(|tag| strip_version_prefix(tag, &config.version_prefix))
        .map(str::to_string)
        .collect();

    debug!(tool = spec.name(), %repo, total, kept = versions.len(), "Listed versions");
    Ok(Listing { versions, flagged })
}

/// Every installable version of a tool, ascending and de-duplicated.
///
/// Tags or release names lacking the tool's prefix are skipped; the
/// include filter, when configured, drops everything it does not match.
///
/// # Errors
///
/// Release source failures.
pub async fn list_versions(
    spec: &PluginSpec,
    releases: &dyn ReleaseSource,
    cancel: &CancellationToken,
) -> Result<Vec<String>> {
    Ok(fetch_listing(spec, releases, cancel).await?.versions)
}

/// Greatest stable version starting with `query_prefix`.
///
/// Releases the source flags as pre-releases lose to unflagged ones, the
/// same way pattern-detected pre-releases do.
///
/// # Errors
///
/// Release source failures, or no version matching.
pub async fn resolve_latest(
    spec: &PluginSpec,
    releases: &dyn ReleaseSource,
    cancel: &CancellationToken,
    query_prefix: &str,
) -> Result<String> {
    let Listing { versions, flagged } = fetch_listing(spec, releases, cancel).await?;
    let unflagged: Vec<String> = versions
        .iter()
        .filter(|v| v.starts_with(query_prefix) && !flagged.contains(*v))
        .cloned()
        .collect();
    let pool = if unflagged.is_empty() { &versions } else { &unflagged };
    resolve_latest_matching(
        spec.name(),
        pool,
        query_prefix,
        spec.rules().prerelease.as_ref(),
    )
}
