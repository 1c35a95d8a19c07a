//! File engine.
//!
//! Files are sequential streams: the head node's payload first, then each
//! file-extend in chain order, with the byte count declared in the head.
//! Readers stop at the declared size; writers buffer one block at a time
//! and only patch the size field at close, so an interrupted write leaves
//! a shorter file on the medium, never a longer one.

use std::io;

use crate::chain::ChainWalker;
use crate::dir::{self, EntryKind};
use crate::{FsError, Result, Volume, structural};
use pfs_block::{BlockBuf, BlockDevice};
use pfs_ondisk::{ExtendKind, ExtendNode, FileNode, set_chain_next, set_file_size};
use pfs_types::{BlockAddr, NodeName};

pub(crate) fn open<'v, D: BlockDevice>(
    vol: &'v Volume<D>,
    dir: BlockAddr,
    leaf: &str,
) -> Result<FileReader<'v, D>> {
    let found = dir::find(vol, dir, leaf)?.ok_or_else(|| FsError::NotFound(leaf.to_owned()))?;
    if found.kind == EntryKind::Directory {
        return Err(FsError::NotFile);
    }
    let buf = vol.device().read_block(found.block)?;
    let node =
        FileNode::parse_from_block(buf.as_slice()).map_err(|err| structural(found.block, err))?;
    Ok(FileReader {
        vol,
        walker: ChainWalker::new(node.extend, ExtendKind::File, vol.total_blocks()),
        block: found.block,
        buf,
        cursor: vol.geometry().head_payload().start,
        remaining: node.size,
        size: node.size,
    })
}

pub(crate) fn create<'v, D: BlockDevice>(
    vol: &'v Volume<D>,
    dir: BlockAddr,
    name: NodeName,
) -> Result<FileWriter<'v, D>> {
    let head = dir::insert(vol, dir, name, EntryKind::File)?;
    let buf = vol.device().read_block(head)?;
    Ok(FileWriter {
        vol,
        head,
        block: head,
        buf,
        cursor: vol.geometry().head_payload().start,
        written: 0,
        closed: false,
    })
}

// ── Reader ──────────────────────────────────────────────────────────────────

/// Sequential reader returned by [`Volume::open`].
pub struct FileReader<'v, D: BlockDevice> {
    vol: &'v Volume<D>,
    walker: ChainWalker,
    block: BlockAddr,
    buf: BlockBuf,
    cursor: usize,
    remaining: u16,
    size: u16,
}

impl<D: BlockDevice> FileReader<'_, D> {
    /// Declared size of the file in bytes.
    #[must_use]
    pub fn size(&self) -> u16 {
        self.size
    }

    /// Next byte of the stream, or `Eof` past the declared size.
    pub fn read_byte(&mut self) -> Result<u8> {
        if self.remaining == 0 {
            return Err(FsError::Eof);
        }
        if self.cursor >= self.vol.block_size() {
            self.advance_block()?;
        }
        let byte = self.buf.as_slice()[self.cursor];
        self.cursor += 1;
        self.remaining -= 1;
        Ok(byte)
    }

    /// Fill `out` from the stream. A short count means end of file.
    pub fn read(&mut self, out: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < out.len() && self.remaining > 0 {
            if self.cursor >= self.vol.block_size() {
                self.advance_block()?;
            }
            let run = (self.vol.block_size() - self.cursor)
                .min(out.len() - filled)
                .min(usize::from(self.remaining));
            out[filled..filled + run]
                .copy_from_slice(&self.buf.as_slice()[self.cursor..self.cursor + run]);
            self.cursor += run;
            self.remaining -= run as u16;
            filled += run;
        }
        Ok(filled)
    }

    /// A chain that ends before the declared size is corruption, not EOF.
    fn advance_block(&mut self) -> Result<()> {
        match self.walker.step(self.vol.device())? {
            Some((block, buf, _)) => {
                self.block = block;
                self.buf = buf;
                self.cursor = self.vol.geometry().extend_payload().start;
                Ok(())
            }
            None => Err(structural(
                self.block,
                format!(
                    "extend chain ends with {} bytes of the declared size unread",
                    self.remaining
                ),
            )),
        }
    }
}

impl<D: BlockDevice> io::Read for FileReader<'_, D> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        FileReader::read(self, out).map_err(io::Error::from)
    }
}

// ── Writer ──────────────────────────────────────────────────────────────────

/// Sequential writer returned by [`Volume::create`].
///
/// Dropping a writer flushes it on a best-effort basis and logs a warning;
/// call [`FileWriter::close`] to observe flush errors.
pub struct FileWriter<'v, D: BlockDevice> {
    vol: &'v Volume<D>,
    head: BlockAddr,
    block: BlockAddr,
    buf: BlockBuf,
    cursor: usize,
    written: u16,
    closed: bool,
}

impl<D: BlockDevice> FileWriter<'_, D> {
    /// Bytes accepted so far.
    #[must_use]
    pub fn written(&self) -> u16 {
        self.written
    }

    /// Append one byte, growing the chain when the current block is full.
    pub fn write_byte(&mut self, byte: u8) -> Result<()> {
        if self.written == u16::MAX {
            return Err(FsError::OutOfSpace);
        }
        if self.cursor >= self.vol.block_size() {
            self.grow()?;
        }
        self.buf.as_mut_slice()[self.cursor] = byte;
        self.cursor += 1;
        self.written += 1;
        Ok(())
    }

    /// Append all of `data`. On error the bytes counted by
    /// [`FileWriter::written`] are still part of the file.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        let mut rest = data;
        while !rest.is_empty() {
            let capacity = usize::from(u16::MAX - self.written);
            if capacity == 0 {
                return Err(FsError::OutOfSpace);
            }
            if self.cursor >= self.vol.block_size() {
                self.grow()?;
            }
            let run = (self.vol.block_size() - self.cursor)
                .min(rest.len())
                .min(capacity);
            self.buf.as_mut_slice()[self.cursor..self.cursor + run]
                .copy_from_slice(&rest[..run]);
            self.cursor += run;
            self.written += run as u16;
            rest = &rest[run..];
        }
        Ok(())
    }

    /// Flush buffered bytes and patch the declared size into the head node.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.finish()
    }

    fn grow(&mut self) -> Result<()> {
        let extend = self.vol.allocator().allocate(self.vol.device())?;
        if let Err(err) = self.attach_extend(extend) {
            rollback_release(self.vol, extend);
            return Err(err);
        }
        tracing::trace!(
            target: "pfs::file",
            file = self.head.get(),
            extend = extend.get(),
            "file_chain_extended"
        );
        Ok(())
    }

    /// The new extend goes out fully formed before anything links to it,
    /// and the writer's own state changes only once both writes landed.
    fn attach_extend(&mut self, extend: BlockAddr) -> Result<()> {
        let mut fresh = vec![0_u8; self.vol.block_size()];
        ExtendNode::new(ExtendKind::File)
            .encode_into(&mut fresh)
            .map_err(|err| structural(extend, err))?;
        self.vol.device().write_block(extend, &fresh)?;

        let mut filled = self.buf.as_slice().to_vec();
        set_chain_next(&mut filled, Some(extend)).map_err(|err| structural(self.block, err))?;
        self.vol.device().write_block(self.block, &filled)?;

        self.block = extend;
        self.buf = BlockBuf::new(fresh);
        self.cursor = self.vol.geometry().extend_payload().start;
        Ok(())
    }

    /// Size is committed last: until the head write lands, the medium holds
    /// a shorter file.
    fn finish(&mut self) -> Result<()> {
        if self.block == self.head {
            set_file_size(self.buf.as_mut_slice(), self.written)
                .map_err(|err| structural(self.head, err))?;
            self.vol
                .device()
                .write_block(self.head, self.buf.as_slice())?;
        } else {
            self.vol
                .device()
                .write_block(self.block, self.buf.as_slice())?;
            let mut head_buf = self.vol.device().read_block(self.head)?;
            set_file_size(head_buf.as_mut_slice(), self.written)
                .map_err(|err| structural(self.head, err))?;
            self.vol
                .device()
                .write_block(self.head, head_buf.as_slice())?;
        }
        tracing::trace!(
            target: "pfs::file",
            file = self.head.get(),
            size = self.written,
            "file_closed"
        );
        Ok(())
    }
}

impl<D: BlockDevice> Drop for FileWriter<'_, D> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        match self.finish() {
            Ok(()) => tracing::warn!(
                target: "pfs::file",
                file = self.head.get(),
                "writer_dropped_without_close"
            ),
            Err(err) => tracing::warn!(
                target: "pfs::file",
                file = self.head.get(),
                error = %err,
                "unclosed_writer_flush_failed"
            ),
        }
    }
}

impl<D: BlockDevice> io::Write for FileWriter<'_, D> {
    /// Reports partial progress instead of an error when some bytes were
    /// accepted; the failure resurfaces on the next call.
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let before = self.written;
        match FileWriter::write(self, data) {
            Ok(()) => Ok(data.len()),
            Err(err) => {
                let accepted = usize::from(self.written - before);
                if accepted > 0 {
                    Ok(accepted)
                } else {
                    Err(err.into())
                }
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.vol
            .device()
            .write_block(self.block, self.buf.as_slice())?;
        Ok(())
    }
}

fn rollback_release<D: BlockDevice>(vol: &Volume<D>, block: BlockAddr) {
    if let Err(err) = vol.allocator().release(vol.device(), block) {
        tracing::warn!(
            target: "pfs::file",
            block = block.get(),
            error = %err,
            "rollback_release_failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pfs_block::MemBlockDevice;
    use pfs_types::BlockSizeClass;

    fn small_volume(count: u16) -> Volume<MemBlockDevice> {
        Volume::format(MemBlockDevice::new(BlockSizeClass::B32, count), "").expect("format")
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 256) as u8).collect()
    }

    #[test]
    fn small_file_round_trip() {
        let vol = small_volume(64);
        let mut writer = vol.create("hello").expect("create");
        writer.write(b"hello, pocket").expect("write");
        writer.close().expect("close");

        let mut reader = vol.open("hello").expect("open");
        assert_eq!(reader.size(), 13);
        let mut out = [0_u8; 32];
        let n = reader.read(&mut out).expect("read");
        assert_eq!(&out[..n], b"hello, pocket");
        assert_eq!(reader.read(&mut out).expect("read at end"), 0);
    }

    #[test]
    fn empty_file_reads_nothing() {
        let vol = small_volume(64);
        vol.create("blank").expect("create").close().expect("close");

        let mut reader = vol.open("blank").expect("open");
        assert_eq!(reader.size(), 0);
        assert!(matches!(reader.read_byte(), Err(FsError::Eof)));
        let mut out = [0_u8; 4];
        assert_eq!(reader.read(&mut out).expect("read"), 0);
    }

    #[test]
    fn payload_spans_extend_blocks() {
        // 32-byte blocks: 14 payload bytes in the head, 28 per extend.
        // 100 bytes therefore need the head plus 4 extends.
        let vol = small_volume(64);
        let before = vol.free_blocks().expect("free");

        let data = pattern(100);
        let mut writer = vol.create("wide").expect("create");
        writer.write(&data).expect("write");
        writer.close().expect("close");
        assert_eq!(before - vol.free_blocks().expect("free"), 5);

        let mut reader = vol.open("wide").expect("open");
        assert_eq!(reader.size(), 100);
        let mut out = vec![0_u8; 128];
        let n = reader.read(&mut out).expect("read");
        assert_eq!(&out[..n], &data[..], "payload must survive the chain");
        assert!(matches!(reader.read_byte(), Err(FsError::Eof)));
    }

    #[test]
    fn dropped_writer_still_flushes() {
        let vol = small_volume(64);
        {
            let mut writer = vol.create("notes").expect("create");
            writer.write(b"kept").expect("write");
            // No close; Drop flushes on a best-effort basis.
        }
        let mut reader = vol.open("notes").expect("open");
        assert_eq!(reader.size(), 4);
        let mut out = [0_u8; 8];
        let n = reader.read(&mut out).expect("read");
        assert_eq!(&out[..n], b"kept");
    }

    #[test]
    fn byte_interface_matches_slice_interface() {
        let vol = small_volume(64);
        let data = pattern(40);
        let mut writer = vol.create("bytes").expect("create");
        for &byte in &data {
            writer.write_byte(byte).expect("write_byte");
        }
        writer.close().expect("close");

        let mut reader = vol.open("bytes").expect("open");
        let mut collected = Vec::new();
        loop {
            match reader.read_byte() {
                Ok(byte) => collected.push(byte),
                Err(FsError::Eof) => break,
                Err(err) => panic!("unexpected error: {err}"),
            }
        }
        assert_eq!(collected, data);
    }

    #[test]
    fn io_adapters_round_trip() {
        use std::io::{Read as _, Write as _};

        let vol = small_volume(64);
        let data = pattern(60);
        let mut writer = vol.create("adapted").expect("create");
        writer.write_all(&data).expect("write_all");
        writer.close().expect("close");

        let mut reader = vol.open("adapted").expect("open");
        let mut out = Vec::new();
        reader.read_to_end(&mut out).expect("read_to_end");
        assert_eq!(out, data);
    }

    #[test]
    fn out_of_space_keeps_accepted_bytes() {
        // Blocks 0 and 1 reserved, so a 4-block volume fits a head plus
        // one extend: 14 + 28 = 42 payload bytes.
        let vol = small_volume(4);
        let mut writer = vol.create("big").expect("create");
        let err = writer.write(&[0x5A; 64]).expect_err("volume too small");
        assert!(matches!(err, FsError::OutOfSpace));
        assert_eq!(writer.written(), 42);
        writer.close().expect("close");

        let mut reader = vol.open("big").expect("open");
        assert_eq!(reader.size(), 42);
        let mut out = vec![0_u8; 64];
        let n = reader.read(&mut out).expect("read");
        assert_eq!(n, 42);
        assert!(out[..42].iter().all(|b| *b == 0x5A));
    }

    #[test]
    fn open_rejects_directories_and_missing_names() {
        let vol = small_volume(64);
        vol.create_dir("d").expect("mkdir");
        assert!(matches!(vol.open("d"), Err(FsError::NotFile)));
        assert!(matches!(vol.open("absent"), Err(FsError::NotFound(_))));
    }
}
