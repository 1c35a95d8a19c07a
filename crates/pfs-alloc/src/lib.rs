#![forbid(unsafe_code)]
//! Block allocation for PocketFS.
//!
//! The format keeps no free list and no bitmap: a block is free exactly when
//! its type tag is the empty tag, so allocation is a linear scan over the
//! device's tag bytes. Deterministic ascending order keeps images
//! reproducible and makes test expectations exact.
//!
//! Allocation only finds a block; it becomes claimed when the caller writes
//! a node into it. The single-session model means nobody else can scan in
//! between.

use pfs_block::BlockDevice;
use pfs_error::{FsError, Result};
use pfs_types::{BlockAddr, NodeTag};

/// Scanning allocator over the usable region of a volume.
///
/// Bounds come from the superblock: `first_block` is where scanning starts
/// (blocks 0 and 1 are the superblock and the root directory), `block_count`
/// is where it ends.
#[derive(Debug, Clone, Copy)]
pub struct BlockAllocator {
    first_block: BlockAddr,
    block_count: u16,
}

impl BlockAllocator {
    #[must_use]
    pub fn new(first_block: BlockAddr, block_count: u16) -> Self {
        Self {
            first_block,
            block_count,
        }
    }

    /// Find the lowest-addressed free block.
    ///
    /// The block is not marked in any way; writing a node into it is what
    /// claims it. Returns `OutOfSpace` when no tag in the usable region is
    /// the empty tag.
    pub fn allocate(&self, dev: &dyn BlockDevice) -> Result<BlockAddr> {
        for raw in self.first_block.get()..self.block_count {
            let block = BlockAddr(raw);
            if dev.tag(block)? == NodeTag::Empty.as_byte() {
                tracing::trace!(target: "pfs::alloc", block = raw, "block_allocated");
                return Ok(block);
            }
        }
        tracing::debug!(
            target: "pfs::alloc",
            first_block = self.first_block.get(),
            block_count = self.block_count,
            "allocation_failed_no_free_block"
        );
        Err(FsError::OutOfSpace)
    }

    /// Return `block` to the free pool by erasing it.
    ///
    /// The reserved blocks (superblock, root directory) and anything outside
    /// the volume are rejected rather than erased.
    pub fn release(&self, dev: &dyn BlockDevice, block: BlockAddr) -> Result<()> {
        if block <= BlockAddr::ROOT_DIR {
            return Err(FsError::InvalidArgument(format!(
                "cannot release reserved block {block}"
            )));
        }
        if block.get() >= self.block_count {
            return Err(FsError::InvalidArgument(format!(
                "cannot release block {block} outside volume of {} blocks",
                self.block_count
            )));
        }
        dev.clear(block)?;
        tracing::trace!(target: "pfs::alloc", block = block.get(), "block_released");
        Ok(())
    }

    /// Count free blocks in the usable region.
    pub fn free_blocks(&self, dev: &dyn BlockDevice) -> Result<u32> {
        let mut free = 0_u32;
        for raw in self.first_block.get()..self.block_count {
            if dev.tag(BlockAddr(raw))? == NodeTag::Empty.as_byte() {
                free += 1;
            }
        }
        Ok(free)
    }

    #[must_use]
    pub fn first_block(&self) -> BlockAddr {
        self.first_block
    }
}
