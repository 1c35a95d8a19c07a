#![forbid(unsafe_code)]
//! PocketFS public API facade.
//!
//! Re-exports core functionality from `pfs-core` through a stable external
//! interface. This is the crate downstream consumers depend on.

pub use pfs_core::*;
