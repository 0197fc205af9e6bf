//! Decompression ceilings.
//!
//! Every regular file is written through a [`LimitedWriter`], which refuses
//! a chunk that would push the current entry past the per-file ceiling or
//! the extraction past the cumulative ceiling. The running total lives in a
//! [`ByteBudget`] owned by one extraction call.

use std::io::{self, Read, Write};

use toolvm_core::{Error, Result};

/// Default per-file ceiling (1 GiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1 << 30;

/// Default cumulative ceiling (4 GiB).
pub const DEFAULT_MAX_TOTAL_SIZE: u64 = 4 << 30;

/// Byte ceilings for one extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractLimits {
    /// Largest single file, in bytes.
    pub max_file_size: u64,
    /// Largest sum of all written files, in bytes.
    pub max_total_size: u64,
}

impl Default for ExtractLimits {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_total_size: DEFAULT_MAX_TOTAL_SIZE,
        }
    }
}

impl ExtractLimits {
    /// Create limits.
    #[must_use]
    pub const fn new(max_file_size: u64, max_total_size: u64) -> Self {
        Self {
            max_file_size,
            max_total_size,
        }
    }

    /// Reject zero ceilings.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArchiveLimits`] if either ceiling is zero.
    pub fn validate(&self) -> Result<()> {
        if self.max_file_size == 0 {
            return Err(Error::InvalidArchiveLimits(
                "per-file limit must be greater than zero".into(),
            ));
        }
        if self.max_total_size == 0 {
            return Err(Error::InvalidArchiveLimits(
                "total limit must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Bytes written so far by one extraction.
#[derive(Debug, Default)]
pub struct ByteBudget {
    written: u64,
}

impl ByteBudget {
    /// Total bytes written.
    #[must_use]
    pub const fn written(&self) -> u64 {
        self.written
    }
}

#[derive(Debug)]
struct LimitExceeded {
    limit: u64,
    scope: &'static str,
}

impl std::fmt::Display for LimitExceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} limit of {} bytes exceeded", self.scope, self.limit)
    }
}

impl std::error::Error for LimitExceeded {}

/// A writer that enforces [`ExtractLimits`] for one entry.
pub struct LimitedWriter<'a, W> {
    inner: W,
    limits: ExtractLimits,
    budget: &'a mut ByteBudget,
    file_written: u64,
}

impl<'a, W: Write> LimitedWriter<'a, W> {
    /// Wrap `inner`, charging writes to `budget`.
    pub fn new(inner: W, limits: ExtractLimits, budget: &'a mut ByteBudget) -> Self {
        Self {
            inner,
            limits,
            budget,
            file_written: 0,
        }
    }

    /// Bytes written to this entry.
    #[must_use]
    pub const fn file_written(&self) -> u64 {
        self.file_written
    }
}

impl<W: Write> Write for LimitedWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let len = buf.len() as u64;
        if self.file_written.saturating_add(len) > self.limits.max_file_size {
            return Err(io::Error::other(LimitExceeded {
                limit: self.limits.max_file_size,
                scope: "per-file",
            }));
        }
        if self.budget.written.saturating_add(len) > self.limits.max_total_size {
            return Err(io::Error::other(LimitExceeded {
                limit: self.limits.max_total_size,
                scope: "total",
            }));
        }
        let n = self.inner.write(buf)?;
        self.file_written += n as u64;
        self.budget.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Copy `reader` into `writer` under the limits.
///
/// # Errors
///
/// [`Error::ArchiveTooLarge`] naming `entry` when a ceiling is hit,
/// otherwise the underlying I/O error.
pub fn copy_limited<R: Read + ?Sized, W: Write>(
    reader: &mut R,
    writer: W,
    entry: &str,
    limits: ExtractLimits,
    budget: &mut ByteBudget,
) -> Result<u64> {
    let mut limited = LimitedWriter::new(writer, limits, budget);
    match io::copy(reader, &mut limited) {
        Ok(n) => {
            limited.flush()?;
            Ok(n)
        }
        Err(e) => Err(match e.get_ref().and_then(|i| i.downcast_ref::<LimitExceeded>()) {
            Some(exceeded) => Error::ArchiveTooLarge {
                entry: entry.to_string(),
                limit: exceeded.limit,
                scope: exceeded.scope,
            },
            None => e.into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_limits_rejected() {
        assert!(matches!(
            ExtractLimits::new(0, 10).validate(),
            Err(Error::InvalidArchiveLimits(_))
        ));
        assert!(matches!(
            ExtractLimits::new(10, 0).validate(),
            Err(Error::InvalidArchiveLimits(_))
        ));
        assert!(ExtractLimits::default().validate().is_ok());
    }

    #[test]
    fn test_per_file_limit() {
        let mut budget = ByteBudget::default();
        let mut out = Vec::new();
        let err = copy_limited(
            &mut &[7u8; 100][..],
            &mut out,
            "big",
            ExtractLimits::new(64, 1024),
            &mut budget,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::ArchiveTooLarge { limit: 64, scope: "per-file", .. }
        ));
        assert!(out.len() <= 64);
    }

    #[test]
    fn test_total_limit_spans_entries() {
        let limits = ExtractLimits::new(64, 100);
        let mut budget = ByteBudget::default();
        copy_limited(&mut &[1u8; 60][..], Vec::new(), "a", limits, &mut budget).unwrap();
        assert_eq!(budget.written(), 60);

        let err = copy_limited(&mut &[1u8; 60][..], Vec::new(), "b", limits, &mut budget)
            .unwrap_err();
        match err {
            Error::ArchiveTooLarge { entry, scope, .. } => {
                assert_eq!(entry, "b");
                assert_eq!(scope, "total");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_exact_limit_is_allowed() {
        let mut budget = ByteBudget::default();
        let n = copy_limited(
            &mut &[0u8; 64][..],
            Vec::new(),
            "exact",
            ExtractLimits::new(64, 64),
            &mut budget,
        )
        .unwrap();
        assert_eq!(n, 64);
    }
}
