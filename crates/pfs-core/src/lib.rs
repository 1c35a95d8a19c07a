#![forbid(unsafe_code)]
//! PocketFS volume sessions.
//!
//! [`Volume`] ties the layers together: it owns the block device, caches the
//! superblock geometry, and exposes the path-based operations — change
//! directory, list, create/remove/rename, open and create files, format and
//! mount. Path resolution lives in [`path`], the directory engine in
//! [`dir`], file handles in [`file`], and bounded chain traversal in
//! [`chain`].
//!
//! The session model is single-client and synchronous. Handles and
//! iterators borrow the volume immutably and carry their own block
//! snapshots; `change_dir` takes `&mut self` and is therefore exclusive
//! with live handles. Mutating the tree through one handle while another is
//! mid-flight can yield stale views but never memory unsafety, and the
//! crate adds no locking of its own.
//!
//! Errors follow the two-layer model: codec failures (`ParseError`) become
//! [`FsError::Structural`] with the offending block address at this crate's
//! boundary; everything else surfaces as the flat [`FsError`] taxonomy.

mod chain;
mod dir;
mod file;
mod path;

pub use dir::{DirEntry, EntryKind, ReadDir};
pub use file::{FileReader, FileWriter};

// The facade crate forwards `pfs_core::*`, so the types that appear in this
// crate's public signatures are re-exported here.
pub use pfs_block::{BlockBuf, BlockDevice, ERASE_BYTE, FileBlockDevice, MemBlockDevice};
pub use pfs_error::{FsError, Result};
pub use pfs_types::{BlockAddr, BlockSizeClass, NAME_LEN, NodeName, NodeTag};

use pfs_alloc::BlockAllocator;
use pfs_ondisk::{BlockGeometry, DirNode, Superblock};
use std::fmt;

/// Convert a failure diagnosed on a specific block into the runtime error.
pub(crate) fn structural(block: BlockAddr, detail: impl fmt::Display) -> FsError {
    FsError::Structural {
        block: block.get(),
        detail: detail.to_string(),
    }
}

/// A mounted PocketFS volume.
#[derive(Debug)]
pub struct Volume<D: BlockDevice> {
    device: D,
    superblock: Superblock,
    geometry: BlockGeometry,
    allocator: BlockAllocator,
    current_dir: BlockAddr,
}

impl<D: BlockDevice> Volume<D> {
    /// Format `device` as an empty volume and mount it.
    ///
    /// Destructive: every block is erased first. The written image is a
    /// function of the device geometry and `volume_name` alone, so
    /// formatting the same medium twice produces identical bytes.
    pub fn format(device: D, volume_name: &str) -> Result<Self> {
        let class = device_class(&device)?;
        let count = device.block_count();
        if count < Superblock::FIRST_USABLE.get() {
            return Err(FsError::InvalidArgument(format!(
                "medium of {count} blocks cannot hold a superblock and root directory"
            )));
        }
        let name = path::validate_volume_name(volume_name)?;

        for raw in 0..count {
            device.clear(BlockAddr(raw))?;
        }

        let superblock = Superblock::new(class, count, name);
        let mut block = vec![0_u8; class.bytes()];
        superblock
            .encode_into(&mut block)
            .map_err(|err| structural(BlockAddr::SUPERBLOCK, err))?;
        device.write_block(BlockAddr::SUPERBLOCK, &block)?;

        let mut block = vec![0_u8; class.bytes()];
        DirNode::new(NodeName::EMPTY, None)
            .encode_into(&mut block)
            .map_err(|err| structural(BlockAddr::ROOT_DIR, err))?;
        device.write_block(BlockAddr::ROOT_DIR, &block)?;

        tracing::debug!(
            target: "pfs::volume",
            blocks = count,
            block_size = class.bytes(),
            volume = %superblock.name,
            "volume_formatted"
        );
        Ok(Self::assemble(device, superblock))
    }

    /// Mount an already-formatted volume.
    pub fn mount(device: D) -> Result<Self> {
        let class = device_class(&device)?;
        let block = device.read_block(BlockAddr::SUPERBLOCK)?;
        let superblock = Superblock::parse_from_block(block.as_slice())
            .map_err(|err| structural(BlockAddr::SUPERBLOCK, err))?;
        superblock
            .validate(class, device.block_count())
            .map_err(|err| structural(BlockAddr::SUPERBLOCK, err))?;

        let root_tag = device.tag(BlockAddr::ROOT_DIR)?;
        if root_tag != NodeTag::Directory.as_byte() {
            return Err(structural(
                BlockAddr::ROOT_DIR,
                format!("expected a directory tag at the root block, found {root_tag:#04x}"),
            ));
        }

        tracing::debug!(
            target: "pfs::volume",
            blocks = superblock.block_count,
            block_size = superblock.block_size(),
            volume = %superblock.name,
            "volume_mounted"
        );
        Ok(Self::assemble(device, superblock))
    }

    fn assemble(device: D, superblock: Superblock) -> Self {
        let geometry = superblock.geometry();
        let allocator = BlockAllocator::new(superblock.first_block, superblock.block_count);
        Self {
            device,
            superblock,
            geometry,
            allocator,
            current_dir: BlockAddr::ROOT_DIR,
        }
    }

    // ── Operations ──────────────────────────────────────────────────────────

    /// Change the session's current directory.
    ///
    /// Takes effect only on success; a failed resolution leaves the current
    /// directory untouched.
    pub fn change_dir(&mut self, path: &str) -> Result<()> {
        let dir = path::resolve_dir(self, path)?;
        self.current_dir = dir;
        Ok(())
    }

    /// Iterate the entries of the directory at `path`.
    pub fn read_dir(&self, path: &str) -> Result<ReadDir<'_, D>> {
        let dir = path::resolve_dir(self, path)?;
        dir::read_dir(self, dir)
    }

    /// Create an empty directory at `path`.
    pub fn create_dir(&self, path: &str) -> Result<()> {
        let (dir, leaf) = path::resolve_parent(self, path)?;
        let name = path::validate_name(leaf)?;
        dir::insert(self, dir, name, EntryKind::Directory)?;
        Ok(())
    }

    /// Rename the entry at `path` to `new_name` within its directory.
    pub fn rename(&self, path: &str, new_name: &str) -> Result<()> {
        let (dir, leaf) = path::resolve_parent(self, path)?;
        let new = path::validate_name(new_name)?;
        dir::rename(self, dir, leaf, new)
    }

    /// Delete the file or empty directory at `path`.
    pub fn remove(&self, path: &str) -> Result<()> {
        let (dir, leaf) = path::resolve_parent(self, path)?;
        dir::remove(self, dir, leaf)
    }

    /// Open the file at `path` for reading from the start.
    pub fn open(&self, path: &str) -> Result<FileReader<'_, D>> {
        let (dir, leaf) = path::resolve_parent(self, path)?;
        file::open(self, dir, leaf)
    }

    /// Create the file at `path` and return a writer positioned at byte 0.
    ///
    /// Exclusive create: an existing entry of either kind under the same
    /// name is `AlreadyExists`.
    pub fn create(&self, path: &str) -> Result<FileWriter<'_, D>> {
        let (dir, leaf) = path::resolve_parent(self, path)?;
        let name = path::validate_name(leaf)?;
        file::create(self, dir, name)
    }

    // ── Accessors ───────────────────────────────────────────────────────────

    #[must_use]
    pub fn volume_name(&self) -> NodeName {
        self.superblock.name
    }

    #[must_use]
    pub fn block_size(&self) -> usize {
        self.geometry.block_size()
    }

    #[must_use]
    pub fn total_blocks(&self) -> u16 {
        self.superblock.block_count
    }

    #[must_use]
    pub fn first_block(&self) -> BlockAddr {
        self.superblock.first_block
    }

    /// Count currently free blocks (a full tag scan).
    pub fn free_blocks(&self) -> Result<u32> {
        self.allocator.free_blocks(&self.device)
    }

    #[must_use]
    pub fn current_dir(&self) -> BlockAddr {
        self.current_dir
    }

    #[must_use]
    pub fn root(&self) -> BlockAddr {
        BlockAddr::ROOT_DIR
    }

    /// Unmount, releasing the device.
    #[must_use]
    pub fn into_device(self) -> D {
        self.device
    }

    // ── Crate-internal access for the engines ───────────────────────────────

    pub(crate) fn device(&self) -> &D {
        &self.device
    }

    pub(crate) fn geometry(&self) -> BlockGeometry {
        self.geometry
    }

    pub(crate) fn allocator(&self) -> &BlockAllocator {
        &self.allocator
    }
}

fn device_class(device: &dyn BlockDevice) -> Result<BlockSizeClass> {
    BlockSizeClass::from_bytes(device.block_size()).ok_or_else(|| {
        FsError::InvalidArgument(format!(
            "device block size {} is not a recognized class",
            device.block_size()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_then_mount_preserves_identity() {
        let dev = MemBlockDevice::new(BlockSizeClass::B64, 32);
        let vol = Volume::format(dev, "fieldnotes").expect("format");
        assert_eq!(vol.volume_name().to_string(), "fieldnotes");
        assert_eq!(vol.block_size(), 64);
        assert_eq!(vol.total_blocks(), 32);
        assert_eq!(vol.first_block(), BlockAddr(2));
        assert_eq!(vol.current_dir(), vol.root());
        assert_eq!(vol.free_blocks().expect("free"), 30);

        let vol = Volume::mount(vol.into_device()).expect("mount");
        assert_eq!(vol.volume_name().to_string(), "fieldnotes");
        assert_eq!(vol.total_blocks(), 32);
    }

    #[test]
    fn empty_volume_name_is_allowed() {
        let dev = MemBlockDevice::new(BlockSizeClass::B32, 4);
        let vol = Volume::format(dev, "").expect("format");
        assert!(vol.volume_name().is_empty());
    }

    #[test]
    fn mount_rejects_unformatted_medium() {
        let dev = MemBlockDevice::new(BlockSizeClass::B64, 8);
        let err = Volume::mount(dev).expect_err("must reject");
        assert!(matches!(err, FsError::Structural { block: 0, .. }));
    }

    #[test]
    fn mount_rejects_class_mismatch() {
        let dev = MemBlockDevice::new(BlockSizeClass::B64, 16);
        let vol = Volume::format(dev, "v").expect("format");
        let image = vol.into_device();

        // Re-host the image bytes on a device that claims a different class.
        let wrong = MemBlockDevice::new(BlockSizeClass::B128, 16);
        for raw in 0..16 {
            let block = image.read_block(BlockAddr(raw)).expect("read");
            let mut grown = block.into_inner();
            grown.resize(128, 0);
            wrong.write_block(BlockAddr(raw), &grown).expect("write");
        }
        let err = Volume::mount(wrong).expect_err("must reject");
        assert!(matches!(err, FsError::Structural { block: 0, .. }));
    }

    #[test]
    fn format_requires_room_for_reserved_blocks() {
        let dev = MemBlockDevice::new(BlockSizeClass::B32, 1);
        assert!(matches!(
            Volume::format(dev, "x"),
            Err(FsError::InvalidArgument(_))
        ));
    }
}
