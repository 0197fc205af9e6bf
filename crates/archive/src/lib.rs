//! Traversal-safe, size-bounded archive extraction for toolvm.
//!
//! ```no_run
//! use std::path::Path;
//! use tokio_util::sync::CancellationToken;
//! use toolvm_archive::{ExtractLimits, extract};
//! use toolvm_core::ArchiveKind;
//!
//! # fn main() -> toolvm_core::Result<()> {
//! extract(
//!     ArchiveKind::TarGz,
//!     Path::new("tool-1.0.tar.gz"),
//!     Path::new("/opt/tool/1.0"),
//!     ExtractLimits::default(),
//!     &CancellationToken::new(),
//! )?;
//! # Ok(())
//! # }
//! ```

pub mod extract;
pub mod layout;
pub mod limits;
pub mod path;

pub use extract::{ExtractSummary, extract, extract_async, make_executable};
pub use layout::flatten_single_top_level_dir;
pub use limits::{ByteBudget, DEFAULT_MAX_FILE_SIZE, DEFAULT_MAX_TOTAL_SIZE, ExtractLimits};
pub use path::safe_join;
