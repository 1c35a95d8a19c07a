#![forbid(unsafe_code)]
//! Shared primitive types for the PocketFS on-disk format.
//!
//! Everything on the wire is little-endian. Blocks are addressed by a
//! 16-bit number; block 0 is the superblock and block 1 the root
//! directory. In pointer and entry-slot fields the value 0 means
//! "none"/"unused" — block 0 can never be a child or an extend, so the
//! sentinel is unambiguous and decoded types model it as
//! `Option<BlockAddr>`.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// On-disk format version, stored in the superblock's `fs_type` byte.
pub const FS_VERSION: u8 = 0x01;

/// Maximum length of a file, directory, or volume name in bytes.
pub const NAME_LEN: usize = 12;

/// Path separator accepted by the resolver.
pub const PATH_SEPARATOR: char = '/';

/// Drive separator, reserved by the format and rejected in names.
pub const DRIVE_SEPARATOR: char = ':';

/// Name of the current-directory pseudo entry.
pub const CURRENT_DIR: &str = ".";

/// Name of the parent-directory pseudo entry.
pub const PARENT_DIR: &str = "..";

// ── Block addressing ────────────────────────────────────────────────────────

/// Address of a block on the medium (16-bit, at most 65536 blocks).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockAddr(pub u16);

impl BlockAddr {
    /// The superblock always lives in block 0.
    pub const SUPERBLOCK: Self = Self(0);

    /// The root directory always lives in block 1.
    pub const ROOT_DIR: Self = Self(1);

    #[must_use]
    pub fn get(self) -> u16 {
        self.0
    }

    /// Decode a pointer/entry-slot field: 0 is the "none" sentinel.
    #[must_use]
    pub fn from_wire(raw: u16) -> Option<Self> {
        if raw == 0 { None } else { Some(Self(raw)) }
    }

    /// Encode an optional pointer/entry-slot field (`None` → 0).
    #[must_use]
    pub fn to_wire(addr: Option<Self>) -> u16 {
        addr.map_or(0, Self::get)
    }
}

impl fmt::Display for BlockAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Node type tags ──────────────────────────────────────────────────────────

/// Type tag stored in the first byte of every block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum NodeTag {
    File = 0x01,
    FileExtend = 0x02,
    Directory = 0x03,
    DirExtend = 0x04,
    Empty = 0xFF,
}

impl NodeTag {
    /// Decode a raw tag byte. Returns `None` for unrecognized values.
    #[must_use]
    pub fn from_byte(raw: u8) -> Option<Self> {
        match raw {
            0x01 => Some(Self::File),
            0x02 => Some(Self::FileExtend),
            0x03 => Some(Self::Directory),
            0x04 => Some(Self::DirExtend),
            0xFF => Some(Self::Empty),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Whether this tag marks a continuation block rather than a head node.
    #[must_use]
    pub fn is_extend(self) -> bool {
        matches!(self, Self::FileExtend | Self::DirExtend)
    }
}

impl fmt::Display for NodeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::File => "file",
            Self::FileExtend => "file-extend",
            Self::Directory => "directory",
            Self::DirExtend => "directory-extend",
            Self::Empty => "empty",
        };
        f.write_str(name)
    }
}

// ── Block-size classes ──────────────────────────────────────────────────────

/// Block-size class stored in the superblock (`size = 16 << class`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum BlockSizeClass {
    B32 = 0x01,
    B64 = 0x02,
    B128 = 0x03,
    B256 = 0x04,
    B512 = 0x05,
    B1024 = 0x06,
}

impl BlockSizeClass {
    /// Decode the superblock's class byte.
    pub fn from_class_byte(raw: u8) -> Result<Self, ParseError> {
        match raw {
            0x01 => Ok(Self::B32),
            0x02 => Ok(Self::B64),
            0x03 => Ok(Self::B128),
            0x04 => Ok(Self::B256),
            0x05 => Ok(Self::B512),
            0x06 => Ok(Self::B1024),
            _ => Err(ParseError::InvalidField {
                field: "blk_size",
                reason: "not a recognized block-size class",
            }),
        }
    }

    /// Class for an exact byte size, if it is one of the enumerated sizes.
    #[must_use]
    pub fn from_bytes(bytes: usize) -> Option<Self> {
        match bytes {
            32 => Some(Self::B32),
            64 => Some(Self::B64),
            128 => Some(Self::B128),
            256 => Some(Self::B256),
            512 => Some(Self::B512),
            1024 => Some(Self::B1024),
            _ => None,
        }
    }

    #[must_use]
    pub fn class_byte(self) -> u8 {
        self as u8
    }

    /// Block size in bytes.
    #[must_use]
    pub fn bytes(self) -> usize {
        16_usize << (self as u8)
    }
}

impl fmt::Display for BlockSizeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}B", self.bytes())
    }
}

// ── Names ───────────────────────────────────────────────────────────────────

/// A fixed 12-byte name field, NUL-padded when shorter.
///
/// The wire format does not guarantee a terminator when the name fully
/// occupies the field, so equality and lookups always compare the whole
/// 12-byte array rather than scanning for NUL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeName([u8; NAME_LEN]);

impl NodeName {
    /// The all-NUL name carried by the root directory.
    pub const EMPTY: Self = Self([0; NAME_LEN]);

    /// Wrap a raw on-disk name field verbatim.
    #[must_use]
    pub fn from_raw(raw: [u8; NAME_LEN]) -> Self {
        Self(raw)
    }

    /// NUL-pad `name` into a field. Returns `None` when `name` is empty or
    /// longer than [`NAME_LEN`] bytes; byte-content policy is the caller's.
    #[must_use]
    pub fn from_bytes(name: &[u8]) -> Option<Self> {
        if name.is_empty() || name.len() > NAME_LEN {
            return None;
        }
        let mut field = [0_u8; NAME_LEN];
        field[..name.len()].copy_from_slice(name);
        Some(Self(field))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; NAME_LEN] {
        &self.0
    }

    /// The name without NUL padding.
    #[must_use]
    pub fn as_trimmed(&self) -> &[u8] {
        let end = self.0.iter().position(|b| *b == 0).unwrap_or(NAME_LEN);
        &self.0[..end]
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0[0] == 0
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(self.as_trimmed()))
    }
}

// ── Parse errors ────────────────────────────────────────────────────────────

/// On-disk format violation detected while decoding a block buffer.
///
/// Runtime code converts these into the user-facing error type at the
/// crate boundary; the codec itself stays independent of it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("insufficient data: need {needed} bytes at offset {offset}, got {actual}")]
    InsufficientData {
        needed: usize,
        offset: usize,
        actual: usize,
    },
    #[error("unknown node tag {actual:#04x}")]
    UnknownTag { actual: u8 },
    #[error("invalid field: {field} ({reason})")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
}

// ── Field readers / writers ─────────────────────────────────────────────────

#[inline]
pub fn ensure_slice(data: &[u8], offset: usize, len: usize) -> Result<&[u8], ParseError> {
    let Some(end) = offset.checked_add(len) else {
        return Err(ParseError::InvalidField {
            field: "offset",
            reason: "overflow",
        });
    };

    if end > data.len() {
        return Err(ParseError::InsufficientData {
            needed: len,
            offset,
            actual: data.len().saturating_sub(offset),
        });
    }

    Ok(&data[offset..end])
}

#[inline]
pub fn read_u8(data: &[u8], offset: usize) -> Result<u8, ParseError> {
    Ok(ensure_slice(data, offset, 1)?[0])
}

#[inline]
pub fn read_le_u16(data: &[u8], offset: usize) -> Result<u16, ParseError> {
    let bytes = ensure_slice(data, offset, 2)?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

#[inline]
pub fn read_fixed<const N: usize>(data: &[u8], offset: usize) -> Result<[u8; N], ParseError> {
    let bytes = ensure_slice(data, offset, N)?;
    let mut out = [0_u8; N];
    out.copy_from_slice(bytes);
    Ok(out)
}

#[inline]
pub fn write_u8(data: &mut [u8], offset: usize, value: u8) -> Result<(), ParseError> {
    if offset >= data.len() {
        return Err(ParseError::InsufficientData {
            needed: 1,
            offset,
            actual: 0,
        });
    }
    data[offset] = value;
    Ok(())
}

#[inline]
pub fn write_le_u16(data: &mut [u8], offset: usize, value: u16) -> Result<(), ParseError> {
    let Some(end) = offset.checked_add(2) else {
        return Err(ParseError::InvalidField {
            field: "offset",
            reason: "overflow",
        });
    };
    if end > data.len() {
        return Err(ParseError::InsufficientData {
            needed: 2,
            offset,
            actual: data.len().saturating_sub(offset),
        });
    }
    data[offset..end].copy_from_slice(&value.to_le_bytes());
    Ok(())
}
