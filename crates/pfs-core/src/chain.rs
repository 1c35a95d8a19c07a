//! Bounded traversal of extend chains.
//!
//! A well-formed chain never revisits a block, so it can never be longer
//! than the volume has blocks. The walker enforces that bound and the tag
//! of every link, turning cycles, dangling pointers, and cross-linked
//! chains into structural errors instead of hangs.

use crate::structural;
use pfs_block::{BlockBuf, BlockDevice};
use pfs_error::Result;
use pfs_ondisk::{ExtendKind, ExtendNode, Node};
use pfs_types::BlockAddr;

/// Stepwise walker over one file or directory extend chain.
pub(crate) struct ChainWalker {
    next: Option<BlockAddr>,
    kind: ExtendKind,
    steps: u16,
    limit: u16,
}

impl ChainWalker {
    /// Walker starting at a head node's first extend pointer. `limit` is
    /// the volume block count.
    pub(crate) fn new(first: Option<BlockAddr>, kind: ExtendKind, limit: u16) -> Self {
        Self {
            next: first,
            kind,
            steps: 0,
            limit,
        }
    }

    /// Load the next extend block, or `None` at the end of the chain.
    pub(crate) fn step(
        &mut self,
        dev: &dyn BlockDevice,
    ) -> Result<Option<(BlockAddr, BlockBuf, ExtendNode)>> {
        let Some(addr) = self.next else {
            return Ok(None);
        };
        if self.steps >= self.limit {
            return Err(structural(
                addr,
                "extend chain longer than the volume block count",
            ));
        }
        self.steps += 1;

        if addr.get() >= self.limit {
            return Err(structural(
                addr,
                format!("extend pointer beyond the volume of {} blocks", self.limit),
            ));
        }
        let buf = dev.read_block(addr)?;
        let node = Node::parse(buf.as_slice()).map_err(|err| structural(addr, err))?;
        let ext = match (self.kind, node) {
            (ExtendKind::File, Node::FileExtend(ext)) | (ExtendKind::Dir, Node::DirExtend(ext)) => {
                ext
            }
            (_, other) => {
                return Err(structural(
                    addr,
                    format!(
                        "expected {} in chain, found {}",
                        self.kind.tag(),
                        other.tag()
                    ),
                ));
            }
        };

        self.next = ext.next;
        Ok(Some((addr, buf, ext)))
    }
}

/// Collect every extend address of a chain up front (for release passes).
pub(crate) fn collect_chain(
    dev: &dyn BlockDevice,
    first: Option<BlockAddr>,
    kind: ExtendKind,
    limit: u16,
) -> Result<Vec<BlockAddr>> {
    let mut walker = ChainWalker::new(first, kind, limit);
    let mut blocks = Vec::new();
    while let Some((addr, _, _)) = walker.step(dev)? {
        blocks.push(addr);
    }
    Ok(blocks)
}
