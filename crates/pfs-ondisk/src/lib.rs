#![forbid(unsafe_code)]
//! On-disk node codec for PocketFS.
//!
//! Every block on the medium decodes as exactly one node, selected by the
//! type tag in byte 0. This crate parses block buffers into typed nodes,
//! encodes nodes back, and answers geometry questions (where does the
//! payload start, how many directory entry slots fit a block).
//!
//! Two rules shape the API:
//!
//! - **Parse, then validate.** Parsing only rejects what cannot be decoded
//!   at all (truncated buffer, unknown tag, unknown block-size class).
//!   Semantic checks — version, geometry against the device — live in
//!   [`Superblock::validate`] so callers control when they apply.
//! - **Encoding touches headers only.** `encode_into` writes the node's
//!   header region and leaves payload bytes as they are, so metadata
//!   updates never disturb file contents or entry slots. Writers that need
//!   a deterministic image start from a zeroed buffer.
//!
//! Reserved and attribute bytes are preserved on parse and tolerated when
//! nonzero; freshly built nodes write them as zero.

use pfs_types::{
    BlockAddr, BlockSizeClass, FS_VERSION, NAME_LEN, NodeName, NodeTag, ParseError, read_fixed,
    read_le_u16, read_u8, write_le_u16, write_u8,
};
use serde::{Deserialize, Serialize};
use std::ops::Range;

// ── Wire layout ─────────────────────────────────────────────────────────────
//
// Superblock (block 0):            File / directory head node:
//   0x00  1   fs_type                0x00  1   tag (0x01 file, 0x03 dir)
//   0x01  1   blk_size class         0x01  2   extend (LE, 0 = none)
//   0x02  2   first_block (LE)       0x03  12  name (NUL-padded)
//   0x04  2   num_blocks (LE)        0x0F  1   attributes
//   0x06  12  volume name            0x10  2   file: size / dir: parent (LE)
//   0x12  —   zero                   0x12  —   payload
//
// Extend node (0x02 file, 0x04 dir):
//   0x00  1   tag
//   0x01  2   next (LE, 0 = end of chain)
//   0x03  1   reserved
//   0x04  —   payload

/// Header length of superblocks and file/directory head nodes; the payload
/// of a head block starts here.
pub const NODE_HEADER_LEN: usize = 0x12;

/// Header length of extend nodes; their payload starts here.
pub const EXTEND_HEADER_LEN: usize = 0x04;

/// Width of one directory entry slot (a little-endian block address).
pub const ENTRY_SLOT_LEN: usize = 2;

const TAG_OFFSET: usize = 0x00;
const CHAIN_NEXT_OFFSET: usize = 0x01;
const NAME_OFFSET: usize = 0x03;
const ATTR_OFFSET: usize = 0x0F;
const SIZE_OFFSET: usize = 0x10;
const PARENT_OFFSET: usize = 0x10;
const EXTEND_RESERVED_OFFSET: usize = 0x03;

const SB_VERSION_OFFSET: usize = 0x00;
const SB_CLASS_OFFSET: usize = 0x01;
const SB_FIRST_BLOCK_OFFSET: usize = 0x02;
const SB_NUM_BLOCKS_OFFSET: usize = 0x04;
const SB_NAME_OFFSET: usize = 0x06;

// ── Geometry ────────────────────────────────────────────────────────────────

/// Payload geometry of one block-size class.
///
/// All chain blocks of a volume share a size, so a single copy of this
/// answers payload and slot questions for every node shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockGeometry {
    class: BlockSizeClass,
}

impl BlockGeometry {
    #[must_use]
    pub fn new(class: BlockSizeClass) -> Self {
        Self { class }
    }

    #[must_use]
    pub fn class(self) -> BlockSizeClass {
        self.class
    }

    #[must_use]
    pub fn block_size(self) -> usize {
        self.class.bytes()
    }

    /// Byte range of the payload in a file or directory head block.
    #[must_use]
    pub fn head_payload(self) -> Range<usize> {
        NODE_HEADER_LEN..self.block_size()
    }

    /// Byte range of the payload in an extend block.
    #[must_use]
    pub fn extend_payload(self) -> Range<usize> {
        EXTEND_HEADER_LEN..self.block_size()
    }

    #[must_use]
    pub fn head_payload_len(self) -> usize {
        self.block_size() - NODE_HEADER_LEN
    }

    #[must_use]
    pub fn extend_payload_len(self) -> usize {
        self.block_size() - EXTEND_HEADER_LEN
    }

    /// Directory entry slots in a head block.
    #[must_use]
    pub fn head_slots(self) -> usize {
        self.head_payload_len() / ENTRY_SLOT_LEN
    }

    /// Directory entry slots in an extend block.
    #[must_use]
    pub fn extend_slots(self) -> usize {
        self.extend_payload_len() / ENTRY_SLOT_LEN
    }
}

// ── Superblock ──────────────────────────────────────────────────────────────

/// Volume identity and geometry, stored in block 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Superblock {
    pub version: u8,
    pub class: BlockSizeClass,
    pub first_block: BlockAddr,
    pub block_count: u16,
    pub name: NodeName,
}

impl Superblock {
    /// First block the allocator may hand out; blocks 0 and 1 are reserved
    /// for the superblock and the root directory.
    pub const FIRST_USABLE: BlockAddr = BlockAddr(2);

    /// Superblock for a freshly formatted volume.
    #[must_use]
    pub fn new(class: BlockSizeClass, block_count: u16, name: NodeName) -> Self {
        Self {
            version: FS_VERSION,
            class,
            first_block: Self::FIRST_USABLE,
            block_count,
            name,
        }
    }

    pub fn parse_from_block(block: &[u8]) -> Result<Self, ParseError> {
        let version = read_u8(block, SB_VERSION_OFFSET)?;
        let class = BlockSizeClass::from_class_byte(read_u8(block, SB_CLASS_OFFSET)?)?;
        let first_block = BlockAddr(read_le_u16(block, SB_FIRST_BLOCK_OFFSET)?);
        let block_count = read_le_u16(block, SB_NUM_BLOCKS_OFFSET)?;
        let name = NodeName::from_raw(read_fixed::<NAME_LEN>(block, SB_NAME_OFFSET)?);
        Ok(Self {
            version,
            class,
            first_block,
            block_count,
            name,
        })
    }

    pub fn encode_into(&self, block: &mut [u8]) -> Result<(), ParseError> {
        write_u8(block, SB_VERSION_OFFSET, self.version)?;
        write_u8(block, SB_CLASS_OFFSET, self.class.class_byte())?;
        write_le_u16(block, SB_FIRST_BLOCK_OFFSET, self.first_block.get())?;
        write_le_u16(block, SB_NUM_BLOCKS_OFFSET, self.block_count)?;
        block[SB_NAME_OFFSET..SB_NAME_OFFSET + NAME_LEN].copy_from_slice(self.name.as_bytes());
        Ok(())
    }

    /// Check the parsed superblock against the device it was read from.
    pub fn validate(&self, device_class: BlockSizeClass, device_count: u16) -> Result<(), ParseError> {
        if self.version != FS_VERSION {
            return Err(ParseError::InvalidField {
                field: "fs_type",
                reason: "unsupported format version",
            });
        }
        if self.class != device_class {
            return Err(ParseError::InvalidField {
                field: "blk_size",
                reason: "does not match device block size",
            });
        }
        if self.block_count < Self::FIRST_USABLE.get() {
            return Err(ParseError::InvalidField {
                field: "num_blocks",
                reason: "no room for superblock and root directory",
            });
        }
        if self.block_count > device_count {
            return Err(ParseError::InvalidField {
                field: "num_blocks",
                reason: "exceeds device capacity",
            });
        }
        if self.first_block < Self::FIRST_USABLE {
            return Err(ParseError::InvalidField {
                field: "first_block",
                reason: "overlaps reserved blocks",
            });
        }
        if self.first_block.get() > self.block_count {
            return Err(ParseError::InvalidField {
                field: "first_block",
                reason: "beyond end of volume",
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn block_size(&self) -> usize {
        self.class.bytes()
    }

    #[must_use]
    pub fn geometry(&self) -> BlockGeometry {
        BlockGeometry::new(self.class)
    }
}

// ── Head nodes ──────────────────────────────────────────────────────────────

/// File head node. Payload bytes hold the leading span of the file's
/// contents; `extend` chains to the rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNode {
    pub extend: Option<BlockAddr>,
    pub name: NodeName,
    pub attributes: u8,
    pub size: u16,
}

impl FileNode {
    /// Head node of a freshly created, empty file.
    #[must_use]
    pub fn new(name: NodeName) -> Self {
        Self {
            extend: None,
            name,
            attributes: 0,
            size: 0,
        }
    }

    pub fn parse_from_block(block: &[u8]) -> Result<Self, ParseError> {
        expect_tag(block, NodeTag::File)?;
        Ok(Self {
            extend: BlockAddr::from_wire(read_le_u16(block, CHAIN_NEXT_OFFSET)?),
            name: NodeName::from_raw(read_fixed::<NAME_LEN>(block, NAME_OFFSET)?),
            attributes: read_u8(block, ATTR_OFFSET)?,
            size: read_le_u16(block, SIZE_OFFSET)?,
        })
    }

    pub fn encode_into(&self, block: &mut [u8]) -> Result<(), ParseError> {
        write_u8(block, TAG_OFFSET, NodeTag::File.as_byte())?;
        write_le_u16(block, CHAIN_NEXT_OFFSET, BlockAddr::to_wire(self.extend))?;
        write_name(block, self.name)?;
        write_u8(block, ATTR_OFFSET, self.attributes)?;
        write_le_u16(block, SIZE_OFFSET, self.size)?;
        Ok(())
    }
}

/// Directory head node. Payload bytes hold entry slots; `extend` chains to
/// more slots. The root directory has no parent and an all-NUL name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirNode {
    pub extend: Option<BlockAddr>,
    pub name: NodeName,
    pub attributes: u8,
    pub parent: Option<BlockAddr>,
}

impl DirNode {
    /// Head node of a freshly created, empty directory.
    #[must_use]
    pub fn new(name: NodeName, parent: Option<BlockAddr>) -> Self {
        Self {
            extend: None,
            name,
            attributes: 0,
            parent,
        }
    }

    pub fn parse_from_block(block: &[u8]) -> Result<Self, ParseError> {
        expect_tag(block, NodeTag::Directory)?;
        Ok(Self {
            extend: BlockAddr::from_wire(read_le_u16(block, CHAIN_NEXT_OFFSET)?),
            name: NodeName::from_raw(read_fixed::<NAME_LEN>(block, NAME_OFFSET)?),
            attributes: read_u8(block, ATTR_OFFSET)?,
            parent: BlockAddr::from_wire(read_le_u16(block, PARENT_OFFSET)?),
        })
    }

    pub fn encode_into(&self, block: &mut [u8]) -> Result<(), ParseError> {
        write_u8(block, TAG_OFFSET, NodeTag::Directory.as_byte())?;
        write_le_u16(block, CHAIN_NEXT_OFFSET, BlockAddr::to_wire(self.extend))?;
        write_name(block, self.name)?;
        write_u8(block, ATTR_OFFSET, self.attributes)?;
        write_le_u16(block, PARENT_OFFSET, BlockAddr::to_wire(self.parent))?;
        Ok(())
    }
}

// ── Extend nodes ────────────────────────────────────────────────────────────

/// Which chain an extend block continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtendKind {
    File,
    Dir,
}

impl ExtendKind {
    #[must_use]
    pub fn tag(self) -> NodeTag {
        match self {
            Self::File => NodeTag::FileExtend,
            Self::Dir => NodeTag::DirExtend,
        }
    }

    #[must_use]
    pub fn from_tag(tag: NodeTag) -> Option<Self> {
        match tag {
            NodeTag::FileExtend => Some(Self::File),
            NodeTag::DirExtend => Some(Self::Dir),
            _ => None,
        }
    }
}

/// Continuation block of a file or directory chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendNode {
    pub kind: ExtendKind,
    pub next: Option<BlockAddr>,
}

impl ExtendNode {
    /// Tail extend for a growing chain.
    #[must_use]
    pub fn new(kind: ExtendKind) -> Self {
        Self { kind, next: None }
    }

    pub fn parse_from_block(block: &[u8]) -> Result<Self, ParseError> {
        let raw = read_u8(block, TAG_OFFSET)?;
        let tag = NodeTag::from_byte(raw).ok_or(ParseError::UnknownTag { actual: raw })?;
        let kind = ExtendKind::from_tag(tag).ok_or(ParseError::InvalidField {
            field: "tag",
            reason: "not an extend node",
        })?;
        let next = BlockAddr::from_wire(read_le_u16(block, CHAIN_NEXT_OFFSET)?);
        // Reserved byte at 0x03 is tolerated; ensure it is present so a
        // truncated buffer still fails loudly.
        read_u8(block, EXTEND_RESERVED_OFFSET)?;
        Ok(Self { kind, next })
    }

    pub fn encode_into(&self, block: &mut [u8]) -> Result<(), ParseError> {
        write_u8(block, TAG_OFFSET, self.kind.tag().as_byte())?;
        write_le_u16(block, CHAIN_NEXT_OFFSET, BlockAddr::to_wire(self.next))?;
        write_u8(block, EXTEND_RESERVED_OFFSET, 0)?;
        Ok(())
    }
}

// ── Tagged dispatch ─────────────────────────────────────────────────────────

/// Any decodable block body, selected by the tag byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Node {
    Empty,
    File(FileNode),
    Dir(DirNode),
    FileExtend(ExtendNode),
    DirExtend(ExtendNode),
}

impl Node {
    /// Decode one block. The superblock is not a node; block 0 goes through
    /// [`Superblock::parse_from_block`] instead.
    pub fn parse(block: &[u8]) -> Result<Self, ParseError> {
        let raw = read_u8(block, TAG_OFFSET)?;
        let tag = NodeTag::from_byte(raw).ok_or(ParseError::UnknownTag { actual: raw })?;
        match tag {
            NodeTag::Empty => Ok(Self::Empty),
            NodeTag::File => FileNode::parse_from_block(block).map(Self::File),
            NodeTag::Directory => DirNode::parse_from_block(block).map(Self::Dir),
            NodeTag::FileExtend => ExtendNode::parse_from_block(block).map(Self::FileExtend),
            NodeTag::DirExtend => ExtendNode::parse_from_block(block).map(Self::DirExtend),
        }
    }

    #[must_use]
    pub fn tag(&self) -> NodeTag {
        match self {
            Self::Empty => NodeTag::Empty,
            Self::File(_) => NodeTag::File,
            Self::Dir(_) => NodeTag::Directory,
            Self::FileExtend(_) => NodeTag::FileExtend,
            Self::DirExtend(_) => NodeTag::DirExtend,
        }
    }
}

// ── In-place field patches ──────────────────────────────────────────────────

/// Rewrite the chain pointer of an already-encoded node in place.
///
/// Every non-empty node shape keeps its pointer at the same offset, so one
/// patch covers file heads, directory heads, and both extend kinds.
pub fn set_chain_next(block: &mut [u8], next: Option<BlockAddr>) -> Result<(), ParseError> {
    let raw = read_u8(block, TAG_OFFSET)?;
    match NodeTag::from_byte(raw) {
        Some(NodeTag::Empty) | None => Err(ParseError::InvalidField {
            field: "tag",
            reason: "no chain pointer in this node",
        }),
        Some(_) => write_le_u16(block, CHAIN_NEXT_OFFSET, BlockAddr::to_wire(next)),
    }
}

/// Rewrite the size field of an already-encoded file head node in place.
pub fn set_file_size(block: &mut [u8], size: u16) -> Result<(), ParseError> {
    expect_tag(block, NodeTag::File)?;
    write_le_u16(block, SIZE_OFFSET, size)
}

fn expect_tag(block: &[u8], expected: NodeTag) -> Result<(), ParseError> {
    let raw = read_u8(block, TAG_OFFSET)?;
    if raw != expected.as_byte() {
        return Err(ParseError::InvalidField {
            field: "tag",
            reason: match expected {
                NodeTag::File => "not a file node",
                NodeTag::Directory => "not a directory node",
                _ => "unexpected node tag",
            },
        });
    }
    Ok(())
}

fn write_name(block: &mut [u8], name: NodeName) -> Result<(), ParseError> {
    if block.len() < NAME_OFFSET + NAME_LEN {
        return Err(ParseError::InsufficientData {
            needed: NAME_LEN,
            offset: NAME_OFFSET,
            actual: block.len().saturating_sub(NAME_OFFSET),
        });
    }
    block[NAME_OFFSET..NAME_OFFSET + NAME_LEN].copy_from_slice(name.as_bytes());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> NodeName {
        NodeName::from_bytes(s.as_bytes()).expect("test name")
    }

    #[test]
    fn superblock_round_trip() {
        let sb = Superblock::new(BlockSizeClass::B128, 200, name("vault"));
        let mut block = vec![0_u8; 128];
        sb.encode_into(&mut block).expect("encode");

        assert_eq!(block[0x00], FS_VERSION);
        assert_eq!(block[0x01], 0x03);
        assert_eq!(&block[0x02..0x04], &2_u16.to_le_bytes());
        assert_eq!(&block[0x04..0x06], &200_u16.to_le_bytes());
        assert_eq!(&block[0x06..0x12], name("vault").as_bytes());

        let parsed = Superblock::parse_from_block(&block).expect("parse");
        assert_eq!(parsed, sb);
        assert_eq!(parsed.block_size(), 128);
    }

    #[test]
    fn superblock_validate_rejects_mismatches() {
        let sb = Superblock::new(BlockSizeClass::B64, 100, name("v"));
        sb.validate(BlockSizeClass::B64, 100).expect("valid");
        // Count may undershoot the device but never exceed it.
        sb.validate(BlockSizeClass::B64, 150).expect("valid, slack at end");

        assert!(sb.validate(BlockSizeClass::B128, 100).is_err());
        assert!(sb.validate(BlockSizeClass::B64, 99).is_err());

        let mut wrong_version = sb.clone();
        wrong_version.version = 0x02;
        assert!(wrong_version.validate(BlockSizeClass::B64, 100).is_err());

        let mut tiny = sb.clone();
        tiny.block_count = 1;
        assert!(tiny.validate(BlockSizeClass::B64, 100).is_err());

        let mut reserved = sb.clone();
        reserved.first_block = BlockAddr(1);
        assert!(reserved.validate(BlockSizeClass::B64, 100).is_err());

        let mut past_end = sb;
        past_end.first_block = BlockAddr(101);
        assert!(past_end.validate(BlockSizeClass::B64, 100).is_err());
    }

    #[test]
    fn file_node_round_trip() {
        let node = FileNode {
            extend: Some(BlockAddr(9)),
            name: name("notes.txt"),
            attributes: 0,
            size: 1234,
        };
        let mut block = vec![0_u8; 64];
        node.encode_into(&mut block).expect("encode");
        assert_eq!(block[0], 0x01);

        let parsed = FileNode::parse_from_block(&block).expect("parse");
        assert_eq!(parsed, node);

        match Node::parse(&block).expect("dispatch") {
            Node::File(file) => assert_eq!(file, node),
            other => panic!("expected file node, got {other:?}"),
        }
    }

    #[test]
    fn dir_node_round_trip_and_root_shape() {
        let child = DirNode::new(name("docs"), Some(BlockAddr(1)));
        let mut block = vec![0_u8; 64];
        child.encode_into(&mut block).expect("encode");
        assert_eq!(DirNode::parse_from_block(&block).expect("parse"), child);

        let root = DirNode::new(NodeName::EMPTY, None);
        let mut block = vec![0_u8; 64];
        root.encode_into(&mut block).expect("encode");
        // Root: no parent, all-NUL name.
        assert_eq!(&block[0x10..0x12], &[0, 0]);
        assert_eq!(&block[0x03..0x0F], &[0; 12]);
        let parsed = DirNode::parse_from_block(&block).expect("parse");
        assert_eq!(parsed.parent, None);
        assert!(parsed.name.is_empty());
    }

    #[test]
    fn extend_node_round_trip_both_kinds() {
        for kind in [ExtendKind::File, ExtendKind::Dir] {
            let ext = ExtendNode {
                kind,
                next: Some(BlockAddr(17)),
            };
            let mut block = vec![0_u8; 32];
            ext.encode_into(&mut block).expect("encode");
            assert_eq!(block[0], kind.tag().as_byte());
            assert_eq!(ExtendNode::parse_from_block(&block).expect("parse"), ext);
        }
    }

    #[test]
    fn extend_reserved_byte_is_tolerated() {
        let ext = ExtendNode::new(ExtendKind::File);
        let mut block = vec![0_u8; 32];
        ext.encode_into(&mut block).expect("encode");
        block[0x03] = 0x7E;
        assert_eq!(ExtendNode::parse_from_block(&block).expect("parse"), ext);
    }

    #[test]
    fn node_dispatch_by_tag() {
        let empty = vec![0xFF_u8; 32];
        assert_eq!(Node::parse(&empty).expect("parse"), Node::Empty);
        assert_eq!(Node::parse(&empty).expect("parse").tag(), NodeTag::Empty);

        let mut unknown = vec![0_u8; 32];
        unknown[0] = 0x17;
        assert_eq!(
            Node::parse(&unknown),
            Err(ParseError::UnknownTag { actual: 0x17 })
        );
    }

    #[test]
    fn truncated_buffers_fail_loudly() {
        let mut header = vec![0_u8; NODE_HEADER_LEN];
        FileNode::new(name("a")).encode_into(&mut header).expect("encode");

        // Header-only buffer parses; anything shorter does not.
        FileNode::parse_from_block(&header).expect("parse exact header");
        assert!(matches!(
            FileNode::parse_from_block(&header[..NODE_HEADER_LEN - 1]),
            Err(ParseError::InsufficientData { .. })
        ));

        let mut ext = vec![0_u8; EXTEND_HEADER_LEN];
        ExtendNode::new(ExtendKind::Dir).encode_into(&mut ext).expect("encode");
        ExtendNode::parse_from_block(&ext).expect("parse exact header");
        assert!(matches!(
            ExtendNode::parse_from_block(&ext[..EXTEND_HEADER_LEN - 1]),
            Err(ParseError::InsufficientData { .. })
        ));

        assert!(matches!(
            Node::parse(&[]),
            Err(ParseError::InsufficientData { .. })
        ));
    }

    #[test]
    fn encode_preserves_payload_bytes() {
        let mut block = vec![0xAA_u8; 64];
        FileNode::new(name("keep")).encode_into(&mut block).expect("encode");
        assert!(block[NODE_HEADER_LEN..].iter().all(|b| *b == 0xAA));

        let mut block = vec![0xAA_u8; 64];
        ExtendNode::new(ExtendKind::File).encode_into(&mut block).expect("encode");
        assert!(block[EXTEND_HEADER_LEN..].iter().all(|b| *b == 0xAA));

        let mut block = vec![0xAA_u8; 64];
        Superblock::new(BlockSizeClass::B64, 9, name("v")).encode_into(&mut block).expect("encode");
        assert!(block[NODE_HEADER_LEN..].iter().all(|b| *b == 0xAA));
    }

    #[test]
    fn chain_next_patch_applies_to_all_linked_shapes() {
        let mut file = vec![0_u8; 32];
        FileNode::new(name("f")).encode_into(&mut file).expect("encode");
        set_chain_next(&mut file, Some(BlockAddr(5))).expect("patch");
        assert_eq!(
            FileNode::parse_from_block(&file).expect("parse").extend,
            Some(BlockAddr(5))
        );

        let mut ext = vec![0_u8; 32];
        ExtendNode::new(ExtendKind::Dir).encode_into(&mut ext).expect("encode");
        set_chain_next(&mut ext, Some(BlockAddr(6))).expect("patch");
        set_chain_next(&mut ext, None).expect("unlink");
        assert_eq!(ExtendNode::parse_from_block(&ext).expect("parse").next, None);

        let empty = &mut [0xFF_u8; 32][..];
        assert!(set_chain_next(empty, Some(BlockAddr(5))).is_err());
    }

    #[test]
    fn file_size_patch_requires_file_tag() {
        let mut file = vec![0_u8; 32];
        FileNode::new(name("f")).encode_into(&mut file).expect("encode");
        set_file_size(&mut file, 777).expect("patch");
        assert_eq!(FileNode::parse_from_block(&file).expect("parse").size, 777);

        let mut dir = vec![0_u8; 32];
        DirNode::new(name("d"), Some(BlockAddr(1))).encode_into(&mut dir).expect("encode");
        assert!(set_file_size(&mut dir, 1).is_err());
    }

    #[test]
    fn geometry_slot_math() {
        let small = BlockGeometry::new(BlockSizeClass::B32);
        assert_eq!(small.head_payload(), 0x12..32);
        assert_eq!(small.head_payload_len(), 14);
        assert_eq!(small.head_slots(), 7);
        assert_eq!(small.extend_payload(), 0x04..32);
        assert_eq!(small.extend_payload_len(), 28);
        assert_eq!(small.extend_slots(), 14);

        let large = BlockGeometry::new(BlockSizeClass::B1024);
        assert_eq!(large.head_payload_len(), 1006);
        assert_eq!(large.head_slots(), 503);
        assert_eq!(large.extend_payload_len(), 1020);
        assert_eq!(large.extend_slots(), 510);
    }

    #[test]
    fn nodes_serialize_for_reports() {
        let sb = Superblock::new(BlockSizeClass::B256, 64, name("backup"));
        let json = serde_json::to_value(&sb).expect("to json");
        assert_eq!(json["block_count"], 64);
        assert_eq!(json["version"], i64::from(FS_VERSION));

        let node = Node::File(FileNode::new(name("log.bin")));
        let json = serde_json::to_value(&node).expect("to json");
        assert!(json.get("File").is_some(), "tagged enum shape: {json}");
    }
}
