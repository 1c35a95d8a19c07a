#![forbid(unsafe_code)]
//! Error types for PocketFS.
//!
//! # Error Taxonomy
//!
//! PocketFS uses a two-layer error model:
//!
//! | Layer | Type | Crate | Purpose |
//! |-------|------|-------|---------|
//! | Parsing | `ParseError` | `pfs-types` | On-disk format violations detected during byte parsing |
//! | Runtime | `FsError` | `pfs-error` (this crate) | User-facing errors for API consumers and tooling |
//!
//! ## Mapping Policy: ParseError → FsError
//!
//! `pfs-error` is intentionally independent of `pfs-types` and `pfs-ondisk` to
//! avoid cyclic dependencies. The conversion from `ParseError` to `FsError` is
//! implemented in `pfs-core`, which depends on both crates.
//!
//! The mapping rule is uniform: any codec failure on a block of a mounted (or
//! mounting) volume becomes [`FsError::Structural`] carrying the block address
//! and the parse error's string rendering. PocketFS media are small enough that
//! a single "this block is wrong, here is why" bucket covers the full triage
//! story — there is no separate mount-format variant.
//!
//! ## std::io::ErrorKind Mapping
//!
//! Every `FsError` variant maps to exactly one [`std::io::ErrorKind`] via
//! [`FsError::to_io_kind`]. The mapping is exhaustive (no wildcard arms) so
//! adding a new variant is a compile error until its kind is assigned. The
//! `From<FsError> for std::io::Error` impl builds on this mapping and powers
//! the `std::io::Read` / `std::io::Write` adapters in `pfs-core`.
//!
//! | Variant | ErrorKind |
//! |---------|-----------|
//! | `Io` | kind of the wrapped error |
//! | `Structural` | `InvalidData` |
//! | `NotFound` | `NotFound` |
//! | `NotDirectory` | `NotADirectory` |
//! | `NotFile` | `IsADirectory` |
//! | `NotEmpty` | `DirectoryNotEmpty` |
//! | `AlreadyExists` | `AlreadyExists` |
//! | `OutOfSpace` | `StorageFull` |
//! | `InvalidArgument` | `InvalidInput` |
//! | `Eof` | `UnexpectedEof` |
//!
//! ## Design Constraints
//!
//! - `pfs-error` MUST NOT depend on `pfs-types` or `pfs-ondisk` (no cyclic deps).
//! - `FsError` is the single user-facing error type; crate-internal errors
//!   (like `ParseError`) convert into `FsError` at their crate boundaries.
//! - All string payloads in `FsError` are owned (`String`) so errors can
//!   outlive the buffers they were diagnosed from.

use thiserror::Error;

/// Unified error type for all PocketFS operations.
///
/// This is the canonical error type returned by the volume API. Internal
/// crate-specific errors (e.g., `ParseError` from `pfs-types`) are converted
/// into `FsError` at crate boundaries.
#[derive(Debug, Error)]
pub enum FsError {
    /// Operating system I/O error (wraps `std::io::Error`).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// On-disk metadata violates the format at a known block.
    ///
    /// Used when live metadata reads produce invalid data: an unknown node
    /// tag, an extend pointer outside the medium, a chain longer than the
    /// block count, or a directory slot referencing a block that is not a
    /// file or directory node. The `block` field names the offending block.
    #[error("structural error at block {block}: {detail}")]
    Structural { block: u16, detail: String },

    /// File, directory, or other named object not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A path component is not a directory.
    #[error("not a directory")]
    NotDirectory,

    /// Attempted a file operation on a directory.
    #[error("not a file")]
    NotFile,

    /// Delete on a directory that still has entries.
    #[error("directory not empty")]
    NotEmpty,

    /// Target name already exists in the directory (create, create-dir, rename).
    #[error("already exists")]
    AlreadyExists,

    /// No free block available on the medium.
    #[error("no space left on device")]
    OutOfSpace,

    /// Caller-supplied argument is invalid (bad name, bad path, bad block).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Read past the end of a file.
    #[error("end of file")]
    Eof,
}

impl FsError {
    /// Convert this error into a `std::io::ErrorKind`.
    ///
    /// The mapping is exhaustive — every variant has an explicit arm. Adding a
    /// new variant without updating this function is a compile error.
    ///
    /// Policy notes:
    /// - `Structural` → `InvalidData`: the bytes were readable but did not
    ///   decode to a valid volume structure.
    /// - `NotFile` → `IsADirectory`: the only non-file node a path can land on
    ///   is a directory.
    /// - `Eof` → `UnexpectedEof`: only byte-granular reads report end of file
    ///   as an error; buffered reads return a short count instead.
    #[must_use]
    pub fn to_io_kind(&self) -> std::io::ErrorKind {
        use std::io::ErrorKind;
        match self {
            Self::Io(err) => err.kind(),
            Self::Structural { .. } => ErrorKind::InvalidData,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::NotDirectory => ErrorKind::NotADirectory,
            Self::NotFile => ErrorKind::IsADirectory,
            Self::NotEmpty => ErrorKind::DirectoryNotEmpty,
            Self::AlreadyExists => ErrorKind::AlreadyExists,
            Self::OutOfSpace => ErrorKind::StorageFull,
            Self::InvalidArgument(_) => ErrorKind::InvalidInput,
            Self::Eof => ErrorKind::UnexpectedEof,
        }
    }
}

impl From<FsError> for std::io::Error {
    /// Unwraps `Io` errors intact; wraps everything else with the kind from
    /// [`FsError::to_io_kind`] so the original error stays in the source chain.
    fn from(err: FsError) -> Self {
        match err {
            FsError::Io(inner) => inner,
            other => Self::new(other.to_io_kind(), other),
        }
    }
}

/// Result alias using `FsError`.
pub type Result<T> = std::result::Result<T, FsError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::ErrorKind;

    #[test]
    fn kind_mapping_covers_all_variants() {
        // Verify each variant produces the expected ErrorKind.
        let cases: Vec<(FsError, ErrorKind)> = vec![
            (
                FsError::Io(std::io::Error::other("test")),
                ErrorKind::Other,
            ),
            (
                FsError::Structural {
                    block: 0,
                    detail: "test".into(),
                },
                ErrorKind::InvalidData,
            ),
            (FsError::NotFound("missing.txt".into()), ErrorKind::NotFound),
            (FsError::NotDirectory, ErrorKind::NotADirectory),
            (FsError::NotFile, ErrorKind::IsADirectory),
            (FsError::NotEmpty, ErrorKind::DirectoryNotEmpty),
            (FsError::AlreadyExists, ErrorKind::AlreadyExists),
            (FsError::OutOfSpace, ErrorKind::StorageFull),
            (
                FsError::InvalidArgument("bad name".into()),
                ErrorKind::InvalidInput,
            ),
            (FsError::Eof, ErrorKind::UnexpectedEof),
        ];

        for (error, expected_kind) in &cases {
            assert_eq!(
                error.to_io_kind(),
                *expected_kind,
                "wrong kind for {error:?}",
            );
        }
    }

    #[test]
    fn io_error_preserves_kind() {
        let raw = std::io::Error::new(ErrorKind::PermissionDenied, "locked image");
        let err = FsError::Io(raw);
        assert_eq!(err.to_io_kind(), ErrorKind::PermissionDenied);
    }

    #[test]
    fn into_io_error_unwraps_io_variant() {
        let raw = std::io::Error::new(ErrorKind::PermissionDenied, "locked image");
        let io: std::io::Error = FsError::Io(raw).into();
        assert_eq!(io.kind(), ErrorKind::PermissionDenied);
        assert_eq!(io.to_string(), "locked image");

        let io: std::io::Error = FsError::OutOfSpace.into();
        assert_eq!(io.kind(), ErrorKind::StorageFull);
        assert!(io.to_string().contains("no space left on device"));
    }

    #[test]
    fn display_formatting() {
        let err = FsError::Structural {
            block: 42,
            detail: "unknown node tag 0x17".into(),
        };
        assert_eq!(
            err.to_string(),
            "structural error at block 42: unknown node tag 0x17"
        );

        let nf = FsError::NotFound("docs".into());
        assert_eq!(nf.to_string(), "not found: docs");

        let arg = FsError::InvalidArgument("name exceeds 12 bytes".into());
        assert_eq!(arg.to_string(), "invalid argument: name exceeds 12 bytes");

        let eof = FsError::Eof;
        assert_eq!(eof.to_string(), "end of file");
    }
}
