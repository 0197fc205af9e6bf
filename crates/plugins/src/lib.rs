//! Plugin strategies and install orchestration for toolvm.
//!
//! Two [`Plugin`](toolvm_core::Plugin) implementations cover most tools:
//!
//! - [`BinaryPlugin`] downloads a prebuilt release artifact and unpacks it
//! - [`SourcePlugin`] fetches a source tree and hands it to a build hook
//!
//! Both are driven by a [`PluginSpec`](toolvm_core::PluginSpec) and a
//! [`PluginContext`] carrying the HTTP, release source, filesystem and
//! process ports. [`Installer`] sequences them over a [`PluginRegistry`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use toolvm_core::PluginConfig;
//! use toolvm_plugins::{BinaryPlugin, EngineSettings, Installer, PluginContext, PluginRegistry};
//!
//! # async fn run() -> toolvm_core::Result<()> {
//! let settings = EngineSettings::from_env()?;
//! let ctx = PluginContext::from_settings(&settings)?;
//! let jq = PluginConfig::new("jq", "jqlang", "jq")
//!     .with_version_prefix("jq-")
//!     .with_file_name_template("jq-{{.Platform}}-{{.Arch}}")
//!     .with_expected_artifacts(["bin/jq"])
//!     .compile()?;
//!
//! let mut registry = PluginRegistry::new();
//! registry.register(BinaryPlugin::new(jq, ctx));
//! let installer = Installer::from_settings(Arc::new(registry), &settings);
//! installer
//!     .install("jq", &"latest".parse()?, &CancellationToken::new())
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod binary;
pub mod checksum;
pub mod context;
pub mod default_packages;
pub mod download;
pub mod exec;
pub mod git;
pub mod hooks;
pub mod installer;
mod lifecycle;
pub mod registry;
pub mod settings;
pub mod source;
pub mod versions;

pub use binary::BinaryPlugin;
pub use context::PluginContext;
pub use exec::TokioProcessRunner;
pub use hooks::{Hook, HookContext, configure_make_hook, hook_fn};
pub use installer::{InstallOutcome, Installer, VersionQuery};
pub use registry::PluginRegistry;
pub use settings::EngineSettings;
pub use source::SourcePlugin;
