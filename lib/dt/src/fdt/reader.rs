use core::{fmt, mem::take, ops::Range, str};

use crate::{
    fdt::{FdtHeader, FdtToken, ReservedMemoryEntry},
    node::{DeviceTree, Node, NodeType, split_unit_name},
    prop::Property,
};
use alloc::{boxed::Box, vec, vec::Vec};
use log::debug;
use utils::endian::{BigEndian32, EndianData};

/// Parses an FDT blob held in memory into a [DeviceTree].
///
/// The reader only ever indexes into the slice it was given, so a corrupt or truncated blob
/// yields an [FdtError] instead of reading past its end.
pub struct FdtReader<'a> {
    blob: &'a [u8],
    cursor: usize,
    strings_base: usize,
    nodes: Vec<Node>,
}

#[inline(always)]
fn align4(offset: usize) -> usize {
    (offset + 3) & !3
}

/// Basic Reader Functions
impl<'a> FdtReader<'a> {
    /// Read a 32-bit big-endian word at the cursor without advancing.
    #[inline(always)]
    fn peek_u32(&self) -> Result<u32, FdtError> {
        self.blob
            .get(self.cursor..)
            .and_then(BigEndian32::from_bytes)
            .map(|word| word.value())
            .ok_or(FdtError::Truncated {
                offset: self.cursor,
            })
    }

    /// Advance the cursor by 4 bytes.
    #[inline(always)]
    fn advance(&mut self) {
        self.cursor += 4;
    }

    /// Advance the cursor by `step` bytes and align it to 4 bytes.
    #[inline(always)]
    fn advance_bytes_aligned(&mut self, step: usize) {
        self.cursor = align4(self.cursor + step);
    }

    /// Read a 32-bit big-endian word and advance the cursor by 4 bytes.
    #[inline(always)]
    fn read_u32(&mut self) -> Result<u32, FdtError> {
        let res = self.peek_u32()?;
        self.advance();
        Ok(res)
    }

    /// Read `len` bytes at the cursor and advance to the next 4-byte aligned position.
    fn readbytes_aligned(&mut self, len: usize) -> Result<&'a [u8], FdtError> {
        let blob: &'a [u8] = self.blob;
        let res = self
            .cursor
            .checked_add(len)
            .and_then(|end| blob.get(self.cursor..end))
            .ok_or(FdtError::Truncated {
                offset: self.cursor,
            })?;
        self.advance_bytes_aligned(len);
        Ok(res)
    }

    /// Advance past zero words and NOPs to the next meaningful token.
    fn skip(&mut self) -> Result<(), FdtError> {
        loop {
            let word = self.peek_u32()?;
            if word != 0 && word != u32::from(FdtToken::Nop) {
                return Ok(());
            }
            self.advance();
        }
    }

    /// Read a NUL-terminated string at the cursor and advance to the next aligned position.
    fn readstr_aligned(&mut self) -> Result<&'a str, FdtError> {
        let start = self.cursor;
        let blob: &'a [u8] = self.blob;
        let res = Self::str_at(blob, start)?;
        self.advance_bytes_aligned(res.len() + 1);
        Ok(res)
    }

    fn str_at(blob: &'a [u8], offset: usize) -> Result<&'a str, FdtError> {
        let rest = blob.get(offset..).ok_or(FdtError::Truncated { offset })?;
        let len = rest
            .iter()
            .position(|byte| *byte == 0)
            .ok_or(FdtError::Truncated { offset })?;
        str::from_utf8(&rest[..len]).map_err(|_| FdtError::InvalidString { offset })
    }

    /// Read a token and verify it equals `supposed`.
    fn read_and_check(&mut self, supposed: FdtToken) -> Result<(), FdtError> {
        let offset = self.cursor;
        let node_type = self.read_u32()?;
        if node_type != u32::from(supposed) {
            return Err(FdtError::InvalidNodeType { node_type, offset });
        }
        Ok(())
    }
}

impl<'a> FdtReader<'a> {
    /// Expected FDT magic number (0xd00dfeed).
    pub const FDT_MAGIC: u32 = 0xd00dfeed;
    /// The FDT version this parser targets.
    pub const FDT_VERSION: u32 = 17;
    /// The last compatible FDT version accepted by this parser.
    pub const LAST_COMP_VERSION: u32 = 16;
    /// Deepest node nesting accepted below the root.
    pub const MAX_DEPTH: usize = 32;

    /// Create a reader over `blob`. Call [Self::validate] or [Self::read] to check it.
    pub fn new(blob: &'a [u8]) -> FdtReader<'a> {
        FdtReader {
            blob,
            cursor: 0,
            strings_base: 0,
            nodes: vec![],
        }
    }

    pub fn get_header(&self) -> Result<FdtHeader, FdtError> {
        FdtHeader::parse(self.blob).ok_or(FdtError::Truncated {
            offset: self.blob.len(),
        })
    }

    /// Validate the FDT header (magic number and compatible version range).
    pub fn validate(&self) -> Result<FdtHeader, FdtError> {
        let header = self.get_header()?;

        if header.magic != Self::FDT_MAGIC {
            return Err(FdtError::InvalidMagic {
                magic: header.magic,
            });
        }

        // We use version 17, and the last compatible version is 16
        if header.version < Self::LAST_COMP_VERSION
            || header.last_comp_version > Self::FDT_VERSION
        {
            return Err(FdtError::IncompatibleVersion {
                version: header.version,
            });
        }
        if header.totalsize as usize > self.blob.len() {
            return Err(FdtError::Truncated {
                offset: self.blob.len(),
            });
        }
        Ok(header)
    }

    /// Read a string from the strings block.
    fn get_string(&self, offset: usize) -> Result<&'a str, FdtError> {
        Self::str_at(self.blob, self.strings_base + offset)
    }

    /// Read consecutive property entries, stopping at the first non-property token.
    fn read_props(&mut self) -> Result<Vec<Property>, FdtError> {
        let mut res = Vec::<Property>::new();
        loop {
            self.skip()?;
            if self.peek_u32()? != u32::from(FdtToken::Prop) {
                break Ok(res);
            }
            self.advance();
            let len = self.read_u32()? as usize;
            let name_offset = self.read_u32()? as usize;
            let name = self.get_string(name_offset)?;
            let data = self.readbytes_aligned(len)?;
            res.push(Property::new(name, data.to_vec()));
        }
    }

    /// Parse a single node (name, properties and child nodes) without setting its parent.
    ///
    /// Children are stored before their parent, so ids come out in post-order.
    fn read_node(&mut self, depth: usize) -> Result<usize, FdtError> {
        self.skip()?;
        if depth > Self::MAX_DEPTH {
            return Err(FdtError::TooDeep {
                offset: self.cursor,
            });
        }
        self.read_and_check(FdtToken::BeginNode)?;
        let full_name = self.readstr_aligned()?;
        let (node_name, unit_addr) = split_unit_name(full_name);
        let props = self.read_props()?;
        let mut children = vec![];
        loop {
            self.skip()?;
            let offset = self.cursor;
            match FdtToken::try_from(self.peek_u32()?) {
                Ok(FdtToken::BeginNode) => children.push(self.read_node(depth + 1)?),
                Ok(FdtToken::EndNode) => {
                    self.advance();
                    break;
                }
                _ => {
                    return Err(FdtError::InvalidNodeType {
                        node_type: self.peek_u32()?,
                        offset,
                    });
                }
            }
        }
        let id = self.nodes.len();
        self.nodes.push(Node {
            node_id: id,
            parent_id: 0,
            full_name: Box::from(full_name),
            node_name: Box::from(node_name),
            unit_addr: Box::from(unit_addr),
            children,
            props,
            node_type: NodeType::Device,
        });
        Ok(id)
    }

    fn set_parent(&mut self, root_id: usize) {
        let mut pending = vec![root_id];
        while let Some(node_id) = pending.pop() {
            for child_idx in 0..self.nodes[node_id].children.len() {
                let sub_id = self.nodes[node_id].children[child_idx];
                self.nodes[sub_id].parent_id = node_id;
                pending.push(sub_id);
            }
        }
    }

    /// Get the memory reservation map. Entries are not promised to be disjoint.
    ///
    /// The blob itself is always appended as the last reservation.
    fn get_mem_rsv_map(&self, header: &FdtHeader) -> Result<Vec<Range<usize>>, FdtError> {
        let mut res = Vec::new();
        let mut offset = header.off_mem_rsvmap as usize;
        loop {
            let block = self
                .blob
                .get(offset..)
                .and_then(ReservedMemoryEntry::parse)
                .ok_or(FdtError::Truncated { offset })?;
            if block.is_terminator() {
                break;
            }
            res.push(block.addr as usize..block.addr.saturating_add(block.size) as usize);
            offset += ReservedMemoryEntry::SIZE;
        }
        let start = self.blob.as_ptr() as usize;
        res.push(start..start + header.totalsize as usize);
        Ok(res)
    }

    fn read_internal(&mut self) -> Result<DeviceTree, FdtError> {
        let header = self.validate()?;
        self.blob = &self.blob[..header.totalsize as usize];
        self.strings_base = header.off_dt_strings as usize;
        self.cursor = header.off_dt_struct as usize;

        let root_id = self.read_node(0)?;
        self.set_parent(root_id);
        self.nodes[root_id].parent_id = root_id;
        self.skip()?;
        self.read_and_check(FdtToken::End)?;

        let mem_rsv_map = self.get_mem_rsv_map(&header)?;
        let mut tree = DeviceTree::from_nodes(root_id, take(&mut self.nodes), mem_rsv_map);
        for path in ["/aliases", "/memory", "/reserved-memory", "/chosen"] {
            let ids: Vec<usize> = tree.get_nodes(path).iter().map(|n| n.node_id).collect();
            for id in ids {
                tree.container[id].node_type = NodeType::Description;
            }
        }
        Ok(tree)
    }

    /// Parse the entire structure block into a [DeviceTree].
    ///
    /// All strings and byte-array data are **copied**, so the blob can be dropped afterwards.
    /// On failure no partial tree is kept and the reader can be retried.
    pub fn read(&mut self) -> Result<DeviceTree, FdtError> {
        match self.read_internal() {
            Ok(res) => Ok(res),
            Err(err) => {
                debug!("Discarding flattened device tree: {}.", err);
                self.cursor = 0;
                self.nodes.clear();
                Err(err)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdtError {
    InvalidNodeType { node_type: u32, offset: usize },
    InvalidMagic { magic: u32 },
    IncompatibleVersion { version: u32 },
    Truncated { offset: usize },
    InvalidString { offset: usize },
    /// Nodes nest deeper than [FdtReader::MAX_DEPTH].
    TooDeep { offset: usize },
}

impl fmt::Display for FdtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FdtError::InvalidNodeType { node_type, offset } => {
                write!(f, "unexpected token {:#x} at offset {:#x}", node_type, offset)
            }
            FdtError::InvalidMagic { magic } => write!(f, "bad magic {:#x}", magic),
            FdtError::IncompatibleVersion { version } => {
                write!(f, "unsupported version {}", version)
            }
            FdtError::Truncated { offset } => write!(f, "blob ends at offset {:#x}", offset),
            FdtError::InvalidString { offset } => {
                write!(f, "string at offset {:#x} is not UTF-8", offset)
            }
            FdtError::TooDeep { offset } => {
                write!(f, "node at offset {:#x} is nested too deep", offset)
            }
        }
    }
}

impl core::error::Error for FdtError {}

#[cfg(test)]
mod tests {
    use super::*;

    /// Assembles a version 17 blob token by token.
    struct BlobWriter {
        structure: Vec<u8>,
        strings: Vec<u8>,
        reserved: Vec<(u64, u64)>,
    }

    impl BlobWriter {
        fn new() -> BlobWriter {
            BlobWriter {
                structure: vec![],
                strings: vec![],
                reserved: vec![],
            }
        }
        fn word(&mut self, word: u32) {
            self.structure.extend_from_slice(&word.to_be_bytes());
        }
        fn pad(&mut self) {
            while self.structure.len() % 4 != 0 {
                self.structure.push(0);
            }
        }
        fn begin(&mut self, name: &str) -> &mut Self {
            self.word(FdtToken::BeginNode.into());
            self.structure.extend_from_slice(name.as_bytes());
            self.structure.push(0);
            self.pad();
            self
        }
        fn prop(&mut self, name: &str, data: &[u8]) -> &mut Self {
            let name_offset = self.strings.len() as u32;
            self.strings.extend_from_slice(name.as_bytes());
            self.strings.push(0);
            self.word(FdtToken::Prop.into());
            self.word(data.len() as u32);
            self.word(name_offset);
            self.structure.extend_from_slice(data);
            self.pad();
            self
        }
        fn prop_u32(&mut self, name: &str, value: u32) -> &mut Self {
            self.prop(name, &value.to_be_bytes())
        }
        fn end(&mut self) -> &mut Self {
            self.word(FdtToken::EndNode.into());
            self
        }
        fn finish(&mut self) -> Vec<u8> {
            self.word(FdtToken::End.into());
            let rsv_off = FdtHeader::SIZE;
            let struct_off = rsv_off + ReservedMemoryEntry::SIZE * (self.reserved.len() + 1);
            let strings_off = struct_off + self.structure.len();
            let total = strings_off + self.strings.len();
            let header = [
                FdtReader::FDT_MAGIC,
                total as u32,
                struct_off as u32,
                strings_off as u32,
                rsv_off as u32,
                17,
                16,
                0,
                self.strings.len() as u32,
                self.structure.len() as u32,
            ];
            let mut blob = vec![];
            for word in header {
                blob.extend_from_slice(&word.to_be_bytes());
            }
            for (addr, size) in self.reserved.iter().chain([(0, 0)].iter()) {
                blob.extend_from_slice(&addr.to_be_bytes());
                blob.extend_from_slice(&size.to_be_bytes());
            }
            blob.extend_from_slice(&self.structure);
            blob.extend_from_slice(&self.strings);
            blob
        }
    }

    fn zynq_blob() -> Vec<u8> {
        let mut writer = BlobWriter::new();
        writer.reserved.push((0x3000_0000, 0x100_0000));
        writer
            .begin("")
            .prop_u32("#address-cells", 1)
            .prop_u32("#size-cells", 1)
            .begin("chosen")
            .prop("bootargs", b"console=ttyPS0,115200\0")
            .end()
            .begin("memory@0")
            .prop("device_type", b"memory\0")
            .prop("reg", &[0, 0, 0, 0, 0x40, 0, 0, 0])
            .end()
            .begin("dma@40400000")
            .prop_u32("phandle", 1)
            .prop_u32("#dma-cells", 1)
            .begin("dma-channel@40400000")
            .prop("compatible", b"mm2s-dma\0")
            .end()
            .begin("dma-channel@40400030")
            .prop("compatible", b"s2mm-dma\0")
            .end()
            .end()
            .end();
        writer.finish()
    }

    #[test]
    fn reads_nodes_properties_and_reservations() {
        let blob = zynq_blob();
        let tree = FdtReader::new(&blob).read().unwrap();

        assert_eq!(tree.get_node("/chosen").unwrap().node_type, NodeType::Description);
        let memory = tree.get_nodes("/memory");
        assert_eq!(memory.len(), 1);
        assert_eq!(memory[0].node_type, NodeType::Description);
        assert_eq!(tree.get_reg_value(memory[0]).unwrap(), [0..0x4000_0000]);

        let dma = tree.find_by_phandle(1).unwrap();
        assert_eq!(dma.node_type, NodeType::Device);
        assert_eq!(tree.child_count(dma), 2);
        let rx = tree.nth_child(dma, 1).unwrap();
        assert_eq!(
            tree.get_property(rx, "compatible").unwrap().value_as_str(),
            Ok("s2mm-dma")
        );
        assert_eq!(tree.get_parent(rx).node_id, dma.node_id);
        assert!(tree.is_root(tree.get_parent(dma)));

        assert_eq!(tree.mem_rsv_map.len(), 2);
        assert_eq!(tree.mem_rsv_map[0], 0x3000_0000..0x3100_0000);
    }

    #[test]
    fn rejects_bad_headers() {
        let mut blob = zynq_blob();
        blob[0] = 0;
        assert!(matches!(
            FdtReader::new(&blob).read(),
            Err(FdtError::InvalidMagic { .. })
        ));

        let blob = zynq_blob();
        assert!(matches!(
            FdtReader::new(&blob[..blob.len() - 8]).read(),
            Err(FdtError::Truncated { .. })
        ));
        assert!(matches!(
            FdtReader::new(&blob[..12]).validate(),
            Err(FdtError::Truncated { .. })
        ));
    }

    #[test]
    fn rejects_corrupt_tokens() {
        let mut writer = BlobWriter::new();
        writer.begin("").prop_u32("#size-cells", 1);
        writer.word(0x7);
        writer.end();
        let blob = writer.finish();
        let mut reader = FdtReader::new(&blob);
        assert!(matches!(
            reader.read(),
            Err(FdtError::InvalidNodeType { node_type: 0x7, .. })
        ));
        // the reader is reusable after a failure
        assert!(reader.read().is_err());
    }

    #[test]
    fn limits_nesting_depth() {
        let nested = |depth: usize| {
            let mut writer = BlobWriter::new();
            writer.begin("");
            for level in 0..depth {
                writer.begin(&alloc::format!("bus@{}", level));
            }
            for _ in 0..=depth {
                writer.end();
            }
            writer.finish()
        };

        let blob = nested(FdtReader::MAX_DEPTH);
        let tree = FdtReader::new(&blob).read().unwrap();
        let deepest = tree
            .container
            .iter()
            .find(|node| node.children.is_empty())
            .unwrap();
        assert_eq!(&*deepest.full_name, "bus@31");
        assert_eq!(&*tree.get_parent(deepest).full_name, "bus@30");

        let blob = nested(FdtReader::MAX_DEPTH + 1);
        assert!(matches!(
            FdtReader::new(&blob).read(),
            Err(FdtError::TooDeep { .. })
        ));
    }
}
