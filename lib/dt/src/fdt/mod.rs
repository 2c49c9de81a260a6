//! This module provides functionalities to resolve a flattened device tree

use num_enum::{IntoPrimitive, TryFromPrimitive};
use utils::endian::{BigEndian32, BigEndian64, EndianData, decode_all};

pub mod reader;

/// Flattened Device Tree header, decoded into native order.
///
/// Field order follows the on-disk layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FdtHeader {
    pub magic: u32,
    pub totalsize: u32,
    pub off_dt_struct: u32,
    pub off_dt_strings: u32,
    pub off_mem_rsvmap: u32,
    pub version: u32,
    pub last_comp_version: u32,
    pub boot_cpuid_phys: u32,
    pub size_dt_strings: u32,
    pub size_dt_struct: u32,
}

impl FdtHeader {
    pub const SIZE: usize = 40;

    /// Decode the header at the start of `blob`, or `None` if the blob is too short.
    pub fn parse(blob: &[u8]) -> Option<FdtHeader> {
        let words = decode_all::<u32, BigEndian32>(blob.get(..Self::SIZE)?)?;
        Some(FdtHeader {
            magic: words[0],
            totalsize: words[1],
            off_dt_struct: words[2],
            off_dt_strings: words[3],
            off_mem_rsvmap: words[4],
            version: words[5],
            last_comp_version: words[6],
            boot_cpuid_phys: words[7],
            size_dt_strings: words[8],
            size_dt_struct: words[9],
        })
    }
}

/// Flattened Reserved Memory Entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservedMemoryEntry {
    pub addr: u64,
    pub size: u64,
}

impl ReservedMemoryEntry {
    pub const SIZE: usize = 16;

    pub fn parse(bytes: &[u8]) -> Option<ReservedMemoryEntry> {
        Some(ReservedMemoryEntry {
            addr: BigEndian64::from_bytes(bytes)?.value(),
            size: BigEndian64::from_bytes(bytes.get(8..)?)?.value(),
        })
    }

    /// The all-zero entry that terminates the reservation block.
    pub fn is_terminator(&self) -> bool {
        self.addr == 0 && self.size == 0
    }
}

/// Tokens found in the FDT structure block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum FdtToken {
    /// Begin a node (followed by its name string)
    BeginNode = 0x01,
    /// End a node
    EndNode = 0x02,
    /// A property entry (length, nameoff, data)
    Prop = 0x03,
    /// No-op padding word
    Nop = 0x04,
    /// End of the structure block
    End = 0x09,
}
