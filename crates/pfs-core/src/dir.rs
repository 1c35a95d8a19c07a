//! Directory engine.
//!
//! A directory is a head node whose payload is an array of 16-bit entry
//! slots, continued through dir-extend blocks when the head fills up. A
//! slot holds the block address of a child node, or zero when free.
//! Listing order is slot order: the head block first, then each extend in
//! chain order. Removal leaves holes; insertion fills the first hole
//! before growing the chain, and nothing is ever compacted.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::chain::{ChainWalker, collect_chain};
use crate::{FsError, Result, Volume, structural};
use pfs_block::{BlockBuf, BlockDevice};
use pfs_ondisk::{
    DirNode, ENTRY_SLOT_LEN, ExtendKind, ExtendNode, FileNode, Node, set_chain_next,
};
use pfs_types::{BlockAddr, NodeName, read_le_u16, write_le_u16};

// ── Entries ─────────────────────────────────────────────────────────────────

/// What a directory slot points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    File,
    Directory,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => f.write_str("file"),
            Self::Directory => f.write_str("directory"),
        }
    }
}

/// One listing row. `size` is the declared byte size for files and zero
/// for directories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: NodeName,
    pub kind: EntryKind,
    pub size: u16,
    pub block: BlockAddr,
}

/// Lookup result carrying enough position data to edit the slot later.
pub(crate) struct FoundEntry {
    pub(crate) block: BlockAddr,
    pub(crate) kind: EntryKind,
    pub(crate) slot_block: BlockAddr,
    pub(crate) slot_offset: usize,
}

// ── Slot walking ────────────────────────────────────────────────────────────

struct SlotRef {
    block: BlockAddr,
    offset: usize,
    child: Option<BlockAddr>,
}

/// Cursor over a directory's entry slots, free and occupied alike, in
/// slot order. After a full walk `block()` is the chain tail.
struct SlotWalk {
    walker: ChainWalker,
    block: BlockAddr,
    buf: BlockBuf,
    offset: usize,
    end: usize,
    extend_start: usize,
    extend_end: usize,
}

impl SlotWalk {
    fn new<D: BlockDevice>(vol: &Volume<D>, dir: BlockAddr) -> Result<Self> {
        let (buf, node) = read_dir_node(vol, dir)?;
        let geometry = vol.geometry();
        let head_start = geometry.head_payload().start;
        let extend_start = geometry.extend_payload().start;
        Ok(Self {
            walker: ChainWalker::new(node.extend, ExtendKind::Dir, vol.total_blocks()),
            block: dir,
            buf,
            offset: head_start,
            end: head_start + geometry.head_slots() * ENTRY_SLOT_LEN,
            extend_start,
            extend_end: extend_start + geometry.extend_slots() * ENTRY_SLOT_LEN,
        })
    }

    fn next_slot(&mut self, dev: &dyn BlockDevice) -> Result<Option<SlotRef>> {
        loop {
            if self.offset + ENTRY_SLOT_LEN <= self.end {
                let offset = self.offset;
                self.offset += ENTRY_SLOT_LEN;
                let raw = read_le_u16(self.buf.as_slice(), offset)
                    .map_err(|err| structural(self.block, err))?;
                return Ok(Some(SlotRef {
                    block: self.block,
                    offset,
                    child: BlockAddr::from_wire(raw),
                }));
            }
            match self.walker.step(dev)? {
                Some((block, buf, _)) => {
                    self.block = block;
                    self.buf = buf;
                    self.offset = self.extend_start;
                    self.end = self.extend_end;
                }
                None => return Ok(None),
            }
        }
    }

    fn block(&self) -> BlockAddr {
        self.block
    }
}

// ── Node access ─────────────────────────────────────────────────────────────

/// Read `dir` and require a directory head node.
pub(crate) fn read_dir_node<D: BlockDevice>(
    vol: &Volume<D>,
    dir: BlockAddr,
) -> Result<(BlockBuf, DirNode)> {
    let buf = vol.device().read_block(dir)?;
    match Node::parse(buf.as_slice()).map_err(|err| structural(dir, err))? {
        Node::Dir(node) => Ok((buf, node)),
        Node::File(_) => Err(FsError::NotDirectory),
        other => Err(structural(
            dir,
            format!("expected a directory node, found {}", other.tag()),
        )),
    }
}

/// Decode the node a slot points at into a listing row.
fn load_entry<D: BlockDevice>(
    vol: &Volume<D>,
    slot_block: BlockAddr,
    child: BlockAddr,
) -> Result<DirEntry> {
    if child.get() >= vol.total_blocks() {
        return Err(structural(
            slot_block,
            format!(
                "entry slot points beyond the volume of {} blocks",
                vol.total_blocks()
            ),
        ));
    }
    let buf = vol.device().read_block(child)?;
    match Node::parse(buf.as_slice()).map_err(|err| structural(child, err))? {
        Node::File(node) => Ok(DirEntry {
            name: node.name,
            kind: EntryKind::File,
            size: node.size,
            block: child,
        }),
        Node::Dir(node) => Ok(DirEntry {
            name: node.name,
            kind: EntryKind::Directory,
            size: 0,
            block: child,
        }),
        other => Err(structural(
            child,
            format!("entry slot points at a {} node", other.tag()),
        )),
    }
}

// ── Lookup ──────────────────────────────────────────────────────────────────

/// Find `name` in `dir`. Names the 12-byte field cannot store match
/// nothing rather than erroring, so lookups and removals of impossible
/// names report not-found.
pub(crate) fn find<D: BlockDevice>(
    vol: &Volume<D>,
    dir: BlockAddr,
    name: &str,
) -> Result<Option<FoundEntry>> {
    let Some(key) = NodeName::from_bytes(name.as_bytes()) else {
        return Ok(None);
    };
    find_key(vol, dir, key)
}

pub(crate) fn find_key<D: BlockDevice>(
    vol: &Volume<D>,
    dir: BlockAddr,
    key: NodeName,
) -> Result<Option<FoundEntry>> {
    let mut walk = SlotWalk::new(vol, dir)?;
    while let Some(slot) = walk.next_slot(vol.device())? {
        let Some(child) = slot.child else { continue };
        let entry = load_entry(vol, slot.block, child)?;
        if entry.name == key {
            return Ok(Some(FoundEntry {
                block: child,
                kind: entry.kind,
                slot_block: slot.block,
                slot_offset: slot.offset,
            }));
        }
    }
    Ok(None)
}

// ── Listing ─────────────────────────────────────────────────────────────────

pub(crate) fn read_dir<'v, D: BlockDevice>(
    vol: &'v Volume<D>,
    dir: BlockAddr,
) -> Result<ReadDir<'v, D>> {
    Ok(ReadDir {
        vol,
        walk: Some(SlotWalk::new(vol, dir)?),
    })
}

/// Iterator over a directory's entries in slot order.
///
/// Entries are read lazily; a structural fault mid-listing surfaces as an
/// `Err` item, after which the iterator is fused.
pub struct ReadDir<'v, D: BlockDevice> {
    vol: &'v Volume<D>,
    walk: Option<SlotWalk>,
}

impl<D: BlockDevice> Iterator for ReadDir<'_, D> {
    type Item = Result<DirEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut walk = self.walk.take()?;
        loop {
            match walk.next_slot(self.vol.device()) {
                Ok(Some(slot)) => {
                    let Some(child) = slot.child else { continue };
                    return match load_entry(self.vol, slot.block, child) {
                        Ok(entry) => {
                            self.walk = Some(walk);
                            Some(Ok(entry))
                        }
                        Err(err) => Some(Err(err)),
                    };
                }
                Ok(None) => return None,
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

// ── Insertion ───────────────────────────────────────────────────────────────

/// Create a child node named `name` in `dir` and point a slot at it.
///
/// The child block is written in full before any slot refers to it, and a
/// new dir-extend is written in full before the chain tail links to it, so
/// a failure mid-insert leaks at most the blocks allocated here.
pub(crate) fn insert<D: BlockDevice>(
    vol: &Volume<D>,
    dir: BlockAddr,
    name: NodeName,
    kind: EntryKind,
) -> Result<BlockAddr> {
    if find_key(vol, dir, name)?.is_some() {
        return Err(FsError::AlreadyExists);
    }

    let child = vol.allocator().allocate(vol.device())?;
    let placed = write_child_node(vol, child, name, kind, dir)
        .and_then(|()| place_in_slot(vol, dir, child));
    if let Err(err) = placed {
        rollback_release(vol, child);
        return Err(err);
    }
    tracing::trace!(
        target: "pfs::dir",
        dir = dir.get(),
        child = child.get(),
        name = %name,
        kind = %kind,
        "entry_inserted"
    );
    Ok(child)
}

fn write_child_node<D: BlockDevice>(
    vol: &Volume<D>,
    block: BlockAddr,
    name: NodeName,
    kind: EntryKind,
    parent: BlockAddr,
) -> Result<()> {
    let mut bytes = vec![0_u8; vol.block_size()];
    match kind {
        EntryKind::File => FileNode::new(name).encode_into(&mut bytes),
        EntryKind::Directory => DirNode::new(name, Some(parent)).encode_into(&mut bytes),
    }
    .map_err(|err| structural(block, err))?;
    vol.device().write_block(block, &bytes)
}

fn place_in_slot<D: BlockDevice>(vol: &Volume<D>, dir: BlockAddr, child: BlockAddr) -> Result<()> {
    let mut walk = SlotWalk::new(vol, dir)?;
    while let Some(slot) = walk.next_slot(vol.device())? {
        if slot.child.is_none() {
            return write_slot(vol, slot.block, slot.offset, Some(child));
        }
    }
    append_extend(vol, walk.block(), child)
}

/// Grow the slot chain: a fresh dir-extend carrying `child` in its first
/// slot, linked from the current tail only once fully written.
fn append_extend<D: BlockDevice>(vol: &Volume<D>, tail: BlockAddr, child: BlockAddr) -> Result<()> {
    let extend = vol.allocator().allocate(vol.device())?;
    let linked = write_extend_block(vol, extend, child)
        .and_then(|()| set_chain_next_on(vol, tail, Some(extend)));
    if let Err(err) = linked {
        rollback_release(vol, extend);
        return Err(err);
    }
    tracing::trace!(
        target: "pfs::dir",
        tail = tail.get(),
        extend = extend.get(),
        "dir_chain_extended"
    );
    Ok(())
}

fn write_extend_block<D: BlockDevice>(
    vol: &Volume<D>,
    extend: BlockAddr,
    child: BlockAddr,
) -> Result<()> {
    let mut bytes = vec![0_u8; vol.block_size()];
    ExtendNode::new(ExtendKind::Dir)
        .encode_into(&mut bytes)
        .map_err(|err| structural(extend, err))?;
    write_le_u16(&mut bytes, vol.geometry().extend_payload().start, child.get())
        .map_err(|err| structural(extend, err))?;
    vol.device().write_block(extend, &bytes)
}

fn set_chain_next_on<D: BlockDevice>(
    vol: &Volume<D>,
    block: BlockAddr,
    next: Option<BlockAddr>,
) -> Result<()> {
    let mut buf = vol.device().read_block(block)?;
    set_chain_next(buf.as_mut_slice(), next).map_err(|err| structural(block, err))?;
    vol.device().write_block(block, buf.as_slice())
}

fn write_slot<D: BlockDevice>(
    vol: &Volume<D>,
    block: BlockAddr,
    offset: usize,
    child: Option<BlockAddr>,
) -> Result<()> {
    let mut buf = vol.device().read_block(block)?;
    write_le_u16(buf.as_mut_slice(), offset, BlockAddr::to_wire(child))
        .map_err(|err| structural(block, err))?;
    vol.device().write_block(block, buf.as_slice())
}

/// Give back a block after a failed multi-step edit. The directory never
/// pointed at it, so a failure here only leaks the block until the next
/// format; log and move on.
fn rollback_release<D: BlockDevice>(vol: &Volume<D>, block: BlockAddr) {
    if let Err(err) = vol.allocator().release(vol.device(), block) {
        tracing::warn!(
            target: "pfs::dir",
            block = block.get(),
            error = %err,
            "rollback_release_failed"
        );
    }
}

// ── Removal ─────────────────────────────────────────────────────────────────

/// Remove `leaf` from `dir`, releasing its node block and extend chain.
///
/// The chain is collected before anything is edited, then the parent slot
/// is zeroed before any block is released: a fault mid-removal leaks
/// blocks, it never leaves the directory pointing at erased ones.
pub(crate) fn remove<D: BlockDevice>(vol: &Volume<D>, dir: BlockAddr, leaf: &str) -> Result<()> {
    let found = find(vol, dir, leaf)?.ok_or_else(|| FsError::NotFound(leaf.to_owned()))?;

    let buf = vol.device().read_block(found.block)?;
    let (chain_head, kind) =
        match Node::parse(buf.as_slice()).map_err(|err| structural(found.block, err))? {
            Node::File(node) => (node.extend, ExtendKind::File),
            Node::Dir(node) => {
                ensure_empty(vol, found.block)?;
                (node.extend, ExtendKind::Dir)
            }
            other => {
                return Err(structural(
                    found.block,
                    format!("entry slot points at a {} node", other.tag()),
                ));
            }
        };
    let chain = collect_chain(vol.device(), chain_head, kind, vol.total_blocks())?;

    write_slot(vol, found.slot_block, found.slot_offset, None)?;
    for block in chain {
        vol.allocator().release(vol.device(), block)?;
    }
    vol.allocator().release(vol.device(), found.block)?;
    tracing::trace!(
        target: "pfs::dir",
        dir = dir.get(),
        block = found.block.get(),
        name = leaf,
        "entry_removed"
    );
    Ok(())
}

/// Empty means no occupied slot; leftover extend blocks with only holes
/// still count as empty.
fn ensure_empty<D: BlockDevice>(vol: &Volume<D>, dir: BlockAddr) -> Result<()> {
    let mut walk = SlotWalk::new(vol, dir)?;
    while let Some(slot) = walk.next_slot(vol.device())? {
        if slot.child.is_some() {
            return Err(FsError::NotEmpty);
        }
    }
    Ok(())
}

// ── Rename ──────────────────────────────────────────────────────────────────

/// Re-encode the node's name field in place; the entry keeps its block and
/// its slot.
pub(crate) fn rename<D: BlockDevice>(
    vol: &Volume<D>,
    dir: BlockAddr,
    leaf: &str,
    new: NodeName,
) -> Result<()> {
    let found = find(vol, dir, leaf)?.ok_or_else(|| FsError::NotFound(leaf.to_owned()))?;
    if find_key(vol, dir, new)?.is_some() {
        return Err(FsError::AlreadyExists);
    }

    let mut buf = vol.device().read_block(found.block)?;
    match Node::parse(buf.as_slice()).map_err(|err| structural(found.block, err))? {
        Node::File(mut node) => {
            node.name = new;
            node.encode_into(buf.as_mut_slice())
                .map_err(|err| structural(found.block, err))?;
        }
        Node::Dir(mut node) => {
            node.name = new;
            node.encode_into(buf.as_mut_slice())
                .map_err(|err| structural(found.block, err))?;
        }
        other => {
            return Err(structural(
                found.block,
                format!("entry slot points at a {} node", other.tag()),
            ));
        }
    }
    vol.device().write_block(found.block, buf.as_slice())?;
    tracing::trace!(
        target: "pfs::dir",
        dir = dir.get(),
        block = found.block.get(),
        from = leaf,
        to = %new,
        "entry_renamed"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pfs_block::MemBlockDevice;
    use pfs_types::BlockSizeClass;

    fn small_volume(count: u16) -> Volume<MemBlockDevice> {
        Volume::format(MemBlockDevice::new(BlockSizeClass::B32, count), "").expect("format")
    }

    fn names(vol: &Volume<MemBlockDevice>, path: &str) -> Vec<String> {
        vol.read_dir(path)
            .expect("read_dir")
            .map(|entry| entry.expect("entry").name.to_string())
            .collect()
    }

    #[test]
    fn listing_follows_slot_order() {
        let vol = small_volume(64);
        for name in ["bin", "etc", "var"] {
            vol.create_dir(name).expect("mkdir");
        }
        assert_eq!(names(&vol, "/"), ["bin", "etc", "var"]);
    }

    #[test]
    fn freed_slots_are_reused_first() {
        let vol = small_volume(64);
        for name in ["a", "b", "c"] {
            vol.create_dir(name).expect("mkdir");
        }
        vol.remove("b").expect("remove");
        vol.create_dir("d").expect("mkdir");

        // "d" takes the hole "b" left, ahead of the slots after "c".
        assert_eq!(names(&vol, "/"), ["a", "d", "c"]);
    }

    #[test]
    fn listing_spans_extend_blocks() {
        // 32-byte blocks hold 7 head slots, so 9 entries need one extend.
        let vol = small_volume(64);
        let before = vol.free_blocks().expect("free");
        for i in 0..9 {
            vol.create_dir(&format!("d{i}")).expect("mkdir");
        }

        let listed = names(&vol, "/");
        let expected: Vec<String> = (0..9).map(|i| format!("d{i}")).collect();
        assert_eq!(listed, expected);

        // 9 child nodes plus 1 dir-extend.
        let after = vol.free_blocks().expect("free");
        assert_eq!(before - after, 10);
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let vol = small_volume(64);
        vol.create_dir("twice").expect("mkdir");
        assert!(matches!(
            vol.create_dir("twice"),
            Err(FsError::AlreadyExists)
        ));
        // The namespace is shared between files and directories.
        assert!(matches!(
            vol.create("twice"),
            Err(FsError::AlreadyExists)
        ));
    }

    #[test]
    fn rename_keeps_slot_position() {
        let vol = small_volume(64);
        for name in ["a", "b", "c"] {
            vol.create_dir(name).expect("mkdir");
        }
        vol.rename("b", "z").expect("rename");
        assert_eq!(names(&vol, "/"), ["a", "z", "c"]);

        assert!(matches!(
            vol.rename("a", "z"),
            Err(FsError::AlreadyExists)
        ));
        // A live name collides with itself too.
        assert!(matches!(
            vol.rename("z", "z"),
            Err(FsError::AlreadyExists)
        ));
        assert!(matches!(
            vol.rename("ghost", "w"),
            Err(FsError::NotFound(_))
        ));
    }

    #[test]
    fn remove_refuses_nonempty_directory() {
        let vol = small_volume(64);
        vol.create_dir("nest").expect("mkdir");
        vol.create_dir("nest/inner").expect("mkdir inner");

        assert!(matches!(vol.remove("nest"), Err(FsError::NotEmpty)));

        vol.remove("nest/inner").expect("remove inner");
        vol.remove("nest").expect("remove nest");
        assert!(names(&vol, "/").is_empty());
    }

    #[test]
    fn removing_directory_releases_its_extend_chain() {
        let vol = small_volume(64);
        let baseline = vol.free_blocks().expect("free");

        vol.create_dir("deep").expect("mkdir");
        for i in 0..9 {
            vol.create_dir(&format!("deep/d{i}")).expect("mkdir child");
        }
        // deep + 9 children + 1 dir-extend under deep.
        assert_eq!(vol.free_blocks().expect("free"), baseline - 11);

        for i in 0..9 {
            vol.remove(&format!("deep/d{i}")).expect("remove child");
        }
        // Holes do not shrink the chain; the extend is still allocated.
        assert_eq!(vol.free_blocks().expect("free"), baseline - 2);

        vol.remove("deep").expect("remove deep");
        assert_eq!(vol.free_blocks().expect("free"), baseline);
    }

    #[test]
    fn unstorable_names_report_not_found() {
        let vol = small_volume(64);
        assert!(matches!(
            vol.remove("far-too-long-for-the-field"),
            Err(FsError::NotFound(_))
        ));
    }
}
