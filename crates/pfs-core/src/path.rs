//! Path resolution and name validation.
//!
//! Paths use `/` as the separator. Absolute paths resolve from the root,
//! relative paths from the session's current directory; empty segments are
//! skipped, `.` is a no-op, and `..` follows the directory's parent field
//! (the root is its own parent).

use crate::dir::{self, EntryKind};
use crate::{FsError, Result, Volume, structural};
use pfs_block::BlockDevice;
use pfs_ondisk::Node;
use pfs_types::{BlockAddr, CURRENT_DIR, NAME_LEN, NodeName, PARENT_DIR, PATH_SEPARATOR};

/// Validate a creatable entry name and build its 12-byte field.
///
/// 1 to 12 bytes; no separator, drive separator, control bytes, or DEL;
/// the pseudo entries `.` and `..` are reserved.
pub(crate) fn validate_name(name: &str) -> Result<NodeName> {
    if name == CURRENT_DIR || name == PARENT_DIR {
        return Err(FsError::InvalidArgument(format!(
            "name {name:?} is reserved"
        )));
    }
    check_name_bytes(name)?;
    NodeName::from_bytes(name.as_bytes()).ok_or_else(|| {
        FsError::InvalidArgument(format!("name {name:?} must be 1 to {NAME_LEN} bytes"))
    })
}

/// Volume labels follow the same byte rules but may be empty.
pub(crate) fn validate_volume_name(name: &str) -> Result<NodeName> {
    check_name_bytes(name)?;
    if name.is_empty() {
        return Ok(NodeName::EMPTY);
    }
    NodeName::from_bytes(name.as_bytes()).ok_or_else(|| {
        FsError::InvalidArgument(format!(
            "volume name {name:?} must be at most {NAME_LEN} bytes"
        ))
    })
}

fn check_name_bytes(name: &str) -> Result<()> {
    for byte in name.bytes() {
        if byte < 0x20 || byte == 0x7F || byte == b'/' || byte == b':' {
            return Err(FsError::InvalidArgument(format!(
                "name {name:?} contains forbidden byte {byte:#04x}"
            )));
        }
    }
    Ok(())
}

/// Resolve `path` to a directory block.
pub(crate) fn resolve_dir<D: BlockDevice>(vol: &Volume<D>, path: &str) -> Result<BlockAddr> {
    let mut current = start_dir(vol, path);
    for segment in path.split(PATH_SEPARATOR) {
        if segment.is_empty() || segment == CURRENT_DIR {
            continue;
        }
        if segment == PARENT_DIR {
            current = parent_of(vol, current)?;
            continue;
        }
        current = lookup_dir(vol, current, segment)?;
    }
    Ok(current)
}

/// Split `path` into its parent directory (resolved) and final name.
///
/// Trailing separators are tolerated; a path with no final component
/// (empty or just `/`) and a path ending in `.` or `..` are rejected —
/// entry-level operations need a real name to act on.
pub(crate) fn resolve_parent<'p, D: BlockDevice>(
    vol: &Volume<D>,
    path: &'p str,
) -> Result<(BlockAddr, &'p str)> {
    let trimmed = path.trim_end_matches(PATH_SEPARATOR);
    if trimmed.is_empty() {
        return Err(FsError::InvalidArgument(format!(
            "path {path:?} has no final component"
        )));
    }
    let (parent, leaf) = match trimmed.rfind(PATH_SEPARATOR) {
        Some(idx) => (resolve_dir(vol, &trimmed[..=idx])?, &trimmed[idx + 1..]),
        None => (start_dir(vol, path), trimmed),
    };
    if leaf == CURRENT_DIR || leaf == PARENT_DIR {
        return Err(FsError::InvalidArgument(format!(
            "path {path:?} ends in a pseudo entry"
        )));
    }
    Ok((parent, leaf))
}

fn start_dir<D: BlockDevice>(vol: &Volume<D>, path: &str) -> BlockAddr {
    if path.starts_with(PATH_SEPARATOR) {
        vol.root()
    } else {
        vol.current_dir()
    }
}

fn parent_of<D: BlockDevice>(vol: &Volume<D>, dir: BlockAddr) -> Result<BlockAddr> {
    let buf = vol.device().read_block(dir)?;
    match Node::parse(buf.as_slice()).map_err(|err| structural(dir, err))? {
        // The root stores no parent; `..` there stays at the root.
        Node::Dir(node) => Ok(node.parent.unwrap_or(BlockAddr::ROOT_DIR)),
        other => Err(structural(
            dir,
            format!("expected a directory node, found {}", other.tag()),
        )),
    }
}

fn lookup_dir<D: BlockDevice>(
    vol: &Volume<D>,
    dir: BlockAddr,
    segment: &str,
) -> Result<BlockAddr> {
    let entry = dir::find(vol, dir, segment)?
        .ok_or_else(|| FsError::NotFound(segment.to_owned()))?;
    match entry.kind {
        EntryKind::Directory => Ok(entry.block),
        EntryKind::File => Err(FsError::NotDirectory),
    }
}
