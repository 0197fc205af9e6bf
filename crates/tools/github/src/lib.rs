//! GitHub release source for toolvm.
//!
//! Provides:
//! - [`GitHubReleaseSource`]: tags, releases and release assets through the
//!   GitHub REST API, with transparent `Link`-header pagination
//! - [`ReqwestHttpClient`]: the production [`toolvm_core::ports::HttpClient`],
//!   with cancellation and streaming downloads

pub mod client;
pub mod link;
pub mod source;

pub use client::ReqwestHttpClient;
pub use source::{DEFAULT_API_URL, GitHubReleaseSource, PER_PAGE};
