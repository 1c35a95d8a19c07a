#![forbid(unsafe_code)]
//! Block device port for PocketFS media.
//!
//! Provides the [`BlockDevice`] trait — whole-block reads and writes plus a
//! cheap type-tag peek — and the two backing stores: [`MemBlockDevice`] for
//! tests and scratch volumes, [`FileBlockDevice`] for image files using
//! `pread`/`pwrite` style positional I/O.

use parking_lot::Mutex;
use pfs_error::{FsError, Result};
use pfs_types::{BlockAddr, BlockSizeClass};
use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::Path;

/// Fill value of an erased block.
///
/// Matches the empty node tag, so a cleared block reads back as an empty
/// node and the allocator can treat "erased" and "free" as the same state.
pub const ERASE_BYTE: u8 = 0xFF;

/// Block size in bytes as a `u64`, for file offsets.
fn block_len_u64(class: BlockSizeClass) -> u64 {
    16_u64 << class.class_byte()
}

// ── Block buffer and device port ────────────────────────────────────────────

/// Owned block buffer.
///
/// Invariant: length == device block size for the originating device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockBuf {
    bytes: Vec<u8>,
}

impl BlockBuf {
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.bytes
    }
}

/// Block-addressed I/O interface.
///
/// Implementations are internally synchronized: all methods take `&self`
/// and may be called from any thread.
pub trait BlockDevice: Send + Sync {
    /// Device block size in bytes.
    fn block_size(&self) -> usize;

    /// Total number of blocks on the medium.
    fn block_count(&self) -> u16;

    /// Read the type tag (first byte) of `block` without transferring the
    /// whole block.
    fn tag(&self, block: BlockAddr) -> Result<u8>;

    /// Read a block by address.
    fn read_block(&self, block: BlockAddr) -> Result<BlockBuf>;

    /// Write a block by address. `data.len()` MUST equal `block_size()`.
    fn write_block(&self, block: BlockAddr, data: &[u8]) -> Result<()>;

    /// Fill `block` with [`ERASE_BYTE`], returning it to the empty state.
    fn clear(&self, block: BlockAddr) -> Result<()>;

    /// Flush pending writes to stable storage.
    fn sync(&self) -> Result<()>;
}

fn check_range(block: BlockAddr, block_count: u16) -> Result<()> {
    if block.get() >= block_count {
        return Err(FsError::InvalidArgument(format!(
            "block out of range: block={block} block_count={block_count}"
        )));
    }
    Ok(())
}

fn check_write_len(len: usize, block_size: usize) -> Result<()> {
    if len != block_size {
        return Err(FsError::InvalidArgument(format!(
            "write size mismatch: got={len} expected={block_size}"
        )));
    }
    Ok(())
}

// ── In-memory device ────────────────────────────────────────────────────────

/// RAM-backed block device, born fully erased.
#[derive(Debug)]
pub struct MemBlockDevice {
    class: BlockSizeClass,
    count: u16,
    cells: Mutex<Vec<u8>>,
}

impl MemBlockDevice {
    #[must_use]
    pub fn new(class: BlockSizeClass, count: u16) -> Self {
        let cells = vec![ERASE_BYTE; class.bytes() * usize::from(count)];
        Self {
            class,
            count,
            cells: Mutex::new(cells),
        }
    }

    fn offset(&self, block: BlockAddr) -> usize {
        self.class.bytes() * usize::from(block.get())
    }
}

impl BlockDevice for MemBlockDevice {
    fn block_size(&self) -> usize {
        self.class.bytes()
    }

    fn block_count(&self) -> u16 {
        self.count
    }

    fn tag(&self, block: BlockAddr) -> Result<u8> {
        check_range(block, self.count)?;
        Ok(self.cells.lock()[self.offset(block)])
    }

    fn read_block(&self, block: BlockAddr) -> Result<BlockBuf> {
        check_range(block, self.count)?;
        let start = self.offset(block);
        let end = start + self.class.bytes();
        Ok(BlockBuf::new(self.cells.lock()[start..end].to_vec()))
    }

    fn write_block(&self, block: BlockAddr, data: &[u8]) -> Result<()> {
        check_range(block, self.count)?;
        check_write_len(data.len(), self.class.bytes())?;
        let start = self.offset(block);
        self.cells.lock()[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn clear(&self, block: BlockAddr) -> Result<()> {
        check_range(block, self.count)?;
        let start = self.offset(block);
        let end = start + self.class.bytes();
        self.cells.lock()[start..end].fill(ERASE_BYTE);
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }
}

// ── Image-file device ───────────────────────────────────────────────────────

/// File-backed block device over a raw image.
///
/// Uses `std::os::unix::fs::FileExt`, which is thread-safe and does not
/// require a shared seek position. The image carries no header of its own:
/// byte 0 of the file is byte 0 of block 0.
#[derive(Debug)]
pub struct FileBlockDevice {
    file: File,
    class: BlockSizeClass,
    count: u16,
}

impl FileBlockDevice {
    /// Create (or overwrite) an image file of `count` fully erased blocks.
    pub fn create(path: impl AsRef<Path>, class: BlockSizeClass, count: u16) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;
        let device = Self { file, class, count };
        let erased = vec![ERASE_BYTE; class.bytes()];
        for raw in 0..count {
            device.file.write_all_at(&erased, device.offset(BlockAddr(raw)))?;
        }
        Ok(device)
    }

    /// Open an existing image file read-write.
    ///
    /// The block count is derived from the file length, which must be a
    /// whole number of blocks and fit the 16-bit address space.
    pub fn open(path: impl AsRef<Path>, class: BlockSizeClass) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path.as_ref())?;
        let len = file.metadata()?.len();
        let block_len = block_len_u64(class);
        if len % block_len != 0 {
            return Err(FsError::InvalidArgument(format!(
                "image length is not block-aligned: len_bytes={len} block_size={block_len}"
            )));
        }
        let blocks = len / block_len;
        let count = u16::try_from(blocks).map_err(|_| {
            FsError::InvalidArgument(format!(
                "image too large: {blocks} blocks exceed the 16-bit address space"
            ))
        })?;
        Ok(Self { file, class, count })
    }

    /// Flush the image to stable storage.
    pub fn sync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    fn offset(&self, block: BlockAddr) -> u64 {
        u64::from(block.get()) * block_len_u64(self.class)
    }
}

impl BlockDevice for FileBlockDevice {
    fn block_size(&self) -> usize {
        self.class.bytes()
    }

    fn block_count(&self) -> u16 {
        self.count
    }

    fn tag(&self, block: BlockAddr) -> Result<u8> {
        check_range(block, self.count)?;
        let mut byte = [0_u8; 1];
        self.file.read_exact_at(&mut byte, self.offset(block))?;
        Ok(byte[0])
    }

    fn read_block(&self, block: BlockAddr) -> Result<BlockBuf> {
        check_range(block, self.count)?;
        let mut buf = vec![0_u8; self.class.bytes()];
        self.file.read_exact_at(&mut buf, self.offset(block))?;
        Ok(BlockBuf::new(buf))
    }

    fn write_block(&self, block: BlockAddr, data: &[u8]) -> Result<()> {
        check_range(block, self.count)?;
        check_write_len(data.len(), self.class.bytes())?;
        self.file.write_all_at(data, self.offset(block))?;
        Ok(())
    }

    fn clear(&self, block: BlockAddr) -> Result<()> {
        check_range(block, self.count)?;
        let erased = vec![ERASE_BYTE; self.class.bytes()];
        self.file.write_all_at(&erased, self.offset(block))?;
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        FileBlockDevice::sync(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_device_is_fully_erased() {
        let dev = MemBlockDevice::new(BlockSizeClass::B64, 8);
        assert_eq!(dev.block_size(), 64);
        assert_eq!(dev.block_count(), 8);
        for raw in 0..8 {
            let block = BlockAddr(raw);
            assert_eq!(dev.tag(block).expect("tag"), ERASE_BYTE);
            let buf = dev.read_block(block).expect("read");
            assert!(buf.as_slice().iter().all(|b| *b == ERASE_BYTE));
        }
    }

    #[test]
    fn write_read_round_trip_and_tag_peek() {
        let dev = MemBlockDevice::new(BlockSizeClass::B32, 4);
        let mut data = vec![0_u8; 32];
        data[0] = 0x03;
        data[31] = 0xAB;
        dev.write_block(BlockAddr(2), &data).expect("write");

        assert_eq!(dev.tag(BlockAddr(2)).expect("tag"), 0x03);
        assert_eq!(dev.read_block(BlockAddr(2)).expect("read").as_slice(), &data[..]);
        // Neighbors untouched.
        assert_eq!(dev.tag(BlockAddr(1)).expect("tag"), ERASE_BYTE);
        assert_eq!(dev.tag(BlockAddr(3)).expect("tag"), ERASE_BYTE);
    }

    #[test]
    fn clear_returns_block_to_empty() {
        let dev = MemBlockDevice::new(BlockSizeClass::B32, 4);
        dev.write_block(BlockAddr(1), &[0x01; 32]).expect("write");
        dev.clear(BlockAddr(1)).expect("clear");
        assert_eq!(dev.tag(BlockAddr(1)).expect("tag"), ERASE_BYTE);
        assert!(
            dev.read_block(BlockAddr(1))
                .expect("read")
                .as_slice()
                .iter()
                .all(|b| *b == ERASE_BYTE)
        );
    }

    #[test]
    fn out_of_range_blocks_rejected() {
        let dev = MemBlockDevice::new(BlockSizeClass::B32, 4);
        for result in [
            dev.tag(BlockAddr(4)).map(|_| ()),
            dev.read_block(BlockAddr(4)).map(|_| ()),
            dev.write_block(BlockAddr(4), &[0_u8; 32]),
            dev.clear(BlockAddr(4)),
        ] {
            assert!(matches!(result, Err(FsError::InvalidArgument(_))));
        }
    }

    #[test]
    fn short_and_long_writes_rejected() {
        let dev = MemBlockDevice::new(BlockSizeClass::B32, 4);
        assert!(matches!(
            dev.write_block(BlockAddr(0), &[0_u8; 31]),
            Err(FsError::InvalidArgument(_))
        ));
        assert!(matches!(
            dev.write_block(BlockAddr(0), &[0_u8; 33]),
            Err(FsError::InvalidArgument(_))
        ));
    }
}
