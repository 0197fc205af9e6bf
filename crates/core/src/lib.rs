//! Core of the toolvm installation engine.
//!
//! This crate holds everything that does not touch the network or an
//! archive format:
//!
//! - [`version`]: ordering, stable filtering and prefix resolution
//! - [`platform`] and [`template`]: turning a host and version into a
//!   release file name and download URL
//! - [`config`]: declarative plugin configuration
//! - [`ports`]: the HTTP, release source, filesystem and process traits
//!   plugins are given
//! - [`plugin`]: the lifecycle contract every tool implements

pub mod artifact;
pub mod config;
pub mod error;
pub mod logging;
pub mod platform;
pub mod plugin;
pub mod ports;
pub mod template;
pub mod version;

pub use artifact::{ArchiveKind, ArtifactDescriptor};
pub use config::{PluginConfig, PluginSpec};
pub use error::{Error, Result, Stage};
pub use platform::{HostPlatform, PlatformPair};
pub use plugin::{InstallState, Plugin, PluginInfo};
pub use version::Version;
