//! Fixtures shared by the unit tests.

use crate::buffer::{MapFlags, RegionMapper};
use alloc::{sync::Arc, vec::Vec};
use core::{
    fmt,
    ops::Range,
    sync::atomic::{AtomicBool, Ordering},
};
use dt::{builder::DeviceTreeBuilder, node::DeviceTree, prop::Property};
use spin::Mutex;
use std::sync::Barrier;

pub const BUFFER_BASE: usize = 0x3000_0000;
pub const BUFFER_LEN: usize = 0x10_0000;
pub const VIRT_BASE: usize = 0x7f00_0000_0000;

/// Add a DMA core node with one sub-channel per entry of `tags`. An empty tag leaves the
/// sub-channel without a `compatible` property.
pub fn add_core(builder: &mut DeviceTreeBuilder, name: &str, phandle: u32, tags: &[&str]) -> usize {
    let core = builder.add_node(DeviceTreeBuilder::ROOT, name);
    builder
        .add_prop(core, Property::from_u32("phandle", phandle))
        .add_prop(core, Property::from_u32("#dma-cells", 1));
    for (i, tag) in tags.iter().enumerate() {
        let channel = builder.add_node(core, &alloc::format!("dma-channel@{}", i));
        if !tag.is_empty() {
            builder.add_prop(channel, Property::from_string("compatible", tag));
        }
    }
    core
}

pub fn add_client(builder: &mut DeviceTreeBuilder, names: &[&str], dmas: &[u32]) -> usize {
    let client = builder.add_node(DeviceTreeBuilder::ROOT, "axidma_chrdev");
    builder
        .add_prop(client, Property::from_strlist("dma-names", names))
        .add_prop(client, Property::from_cells("dmas", dmas));
    client
}

/// `tx_channel` on sub-channel 0 of an `mm2s-dma` core and `rx_channel` on sub-channel 0 of an
/// `s2mm-dma` core.
pub fn two_channel_tree() -> (DeviceTree, usize) {
    let mut builder = DeviceTreeBuilder::new();
    add_core(&mut builder, "dma@40400000", 1, &["mm2s-dma"]);
    add_core(&mut builder, "dma@40410000", 2, &["s2mm-dma"]);
    let client = add_client(&mut builder, &["tx_channel", "rx_channel"], &[1, 0, 2, 0]);
    (builder.build(), client)
}

#[derive(Debug)]
pub struct MockMapError;

impl fmt::Display for MockMapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("no free virtual range")
    }
}

impl core::error::Error for MockMapError {}

/// Records every call and hands out virtual addresses at a fixed offset from the physical ones.
pub struct MockMapper {
    pub virt_base: usize,
    pub fail: AtomicBool,
    /// When set, `map` meets the test on this barrier twice: once on entry and once before
    /// returning.
    pub pause: Mutex<Option<Arc<Barrier>>>,
    pub mapped: Mutex<Vec<(Range<usize>, MapFlags)>>,
    pub unmapped: Mutex<Vec<Range<usize>>>,
}

impl MockMapper {
    pub fn with_virt_base(virt_base: usize) -> Self {
        Self {
            virt_base,
            fail: AtomicBool::new(false),
            pause: Mutex::new(None),
            mapped: Mutex::new(Vec::new()),
            unmapped: Mutex::new(Vec::new()),
        }
    }
}

impl Default for MockMapper {
    fn default() -> Self {
        Self::with_virt_base(VIRT_BASE)
    }
}

impl RegionMapper for MockMapper {
    type Error = MockMapError;

    fn map(&self, phys: Range<usize>, flags: MapFlags) -> Result<usize, MockMapError> {
        let pause = self.pause.lock().clone();
        if let Some(barrier) = &pause {
            barrier.wait();
            barrier.wait();
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(MockMapError);
        }
        let virt = self.virt_base.wrapping_add(phys.start - BUFFER_BASE);
        self.mapped.lock().push((phys, flags));
        Ok(virt)
    }

    fn unmap(&self, virt: Range<usize>) {
        self.unmapped.lock().push(virt);
    }
}
