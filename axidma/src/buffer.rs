//! The device's physical DMA buffer and the collaborator that maps it for the session holder.

use bitflags::bitflags;
use core::ops::Range;
use dt::{
    node::{DeviceTree, Node},
    prop::PropertyError,
};
use utils::range::{RangeExt, span};

/// Physical buffer region owned by one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferRegion {
    pub base: usize,
    pub length: usize,
}

impl BufferRegion {
    pub const fn new(base: usize, length: usize) -> Self {
        Self { base, length }
    }

    /// Take the region from the first `reg` entry of `node`.
    pub fn from_reg(tree: &DeviceTree, node: &Node) -> Result<Self, PropertyError> {
        let reg = tree.get_reg_value(node)?;
        let first = reg.first().ok_or(PropertyError::InvalidPropFormat)?;
        Ok(Self::new(first.start, first.len()))
    }

    /// Physical range of `[offset, offset + length)` inside the buffer, or `None` if any part of
    /// it falls outside.
    pub fn span(&self, offset: usize, length: usize) -> Option<Range<usize>> {
        let local = span(offset, length)?;
        if !(0..self.length).covers(&local) {
            return None;
        }
        span(self.base.checked_add(offset)?, length)
    }
}

bitflags! {
    /// Attributes of a buffer mapping.
    pub struct MapFlags: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const SHARED = 1 << 2;
        /// Bypass the data cache. DMA buffers must be mapped this way.
        const NON_CACHED = 1 << 3;
    }
}

/// Platform hook that installs buffer mappings in the session holder's address space.
pub trait RegionMapper: Send + Sync {
    type Error: core::error::Error + Send + Sync + 'static;

    /// Map the physical range `phys` and return the start of the caller-visible range.
    fn map(&self, phys: Range<usize>, flags: MapFlags) -> Result<usize, Self::Error>;

    /// Tear down a mapping previously returned by [Self::map].
    fn unmap(&self, _virt: Range<usize>) {}
}

/// A mapping handed out to the session holder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedRegion {
    pub virt: Range<usize>,
    pub phys: Range<usize>,
    pub flags: MapFlags,
}

impl MappedRegion {
    /// Physical address behind `[addr, addr + size)`, if the whole range lies in this mapping.
    ///
    /// A zero-sized range translates as long as `addr` lies within `[virt.start, virt.end]`.
    pub fn translate(&self, addr: usize, size: usize) -> Option<usize> {
        let range = span(addr, size)?;
        if !self.virt.covers(&range) {
            return None;
        }
        Some(self.phys.start + (addr - self.virt.start))
    }
}
