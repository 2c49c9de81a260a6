//! Channel descriptors and the fixed type-tag vocabulary.

use alloc::boxed::Box;
use core::fmt;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Transfer direction relative to the peripheral.
///
/// The discriminants are shared with the transfer engine and the user-facing request protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum Direction {
    /// Memory to device (mm2s)
    ToDevice = 0,
    /// Device to memory (s2mm)
    FromDevice = 1,
}

impl Direction {
    pub fn name(self) -> &'static str {
        match self {
            Direction::ToDevice => "transmit",
            Direction::FromDevice => "receive",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum EngineType {
    Dma = 0,
    Vdma = 1,
}

impl EngineType {
    pub fn name(self) -> &'static str {
        match self {
            EngineType::Dma => "DMA",
            EngineType::Vdma => "VDMA",
        }
    }
}

impl fmt::Display for EngineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDescriptor {
    /// Position in the `dmas` list, also the channel id used by the transfer engine.
    pub index: usize,
    pub engine_type: EngineType,
    pub direction: Direction,
    pub name: Box<str>,
}

/// Number of channels of each kind found at attach time.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ChannelCounts {
    pub dma_tx: usize,
    pub dma_rx: usize,
    pub vdma_tx: usize,
    pub vdma_rx: usize,
}

impl ChannelCounts {
    pub fn total(&self) -> usize {
        self.dma_tx + self.dma_rx + self.vdma_tx + self.vdma_rx
    }

    pub fn get(&self, slot: CounterSlot) -> usize {
        match slot {
            CounterSlot::DmaTx => self.dma_tx,
            CounterSlot::DmaRx => self.dma_rx,
            CounterSlot::VdmaTx => self.vdma_tx,
            CounterSlot::VdmaRx => self.vdma_rx,
        }
    }

    pub(crate) fn bump(&mut self, slot: CounterSlot) {
        match slot {
            CounterSlot::DmaTx => self.dma_tx += 1,
            CounterSlot::DmaRx => self.dma_rx += 1,
            CounterSlot::VdmaTx => self.vdma_tx += 1,
            CounterSlot::VdmaRx => self.vdma_rx += 1,
        }
    }
}

/// Which field of [ChannelCounts] a resolved channel is counted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterSlot {
    DmaTx,
    DmaRx,
    VdmaTx,
    VdmaRx,
}

/// One entry of the sub-channel type vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeTag {
    pub tag: &'static str,
    pub engine_type: EngineType,
    pub direction: Direction,
    pub counter: CounterSlot,
}

#[cfg(not(feature = "legacy-vdma-rx-count"))]
const VDMA_RX_COUNTER: CounterSlot = CounterSlot::VdmaRx;
#[cfg(feature = "legacy-vdma-rx-count")]
const VDMA_RX_COUNTER: CounterSlot = CounterSlot::DmaRx;

pub static TYPE_TAGS: [TypeTag; 4] = [
    TypeTag {
        tag: "mm2s-dma",
        engine_type: EngineType::Dma,
        direction: Direction::ToDevice,
        counter: CounterSlot::DmaTx,
    },
    TypeTag {
        tag: "s2mm-dma",
        engine_type: EngineType::Dma,
        direction: Direction::FromDevice,
        counter: CounterSlot::DmaRx,
    },
    TypeTag {
        tag: "mm2s-vdma",
        engine_type: EngineType::Vdma,
        direction: Direction::ToDevice,
        counter: CounterSlot::VdmaTx,
    },
    TypeTag {
        tag: "s2mm-vdma",
        engine_type: EngineType::Vdma,
        direction: Direction::FromDevice,
        counter: VDMA_RX_COUNTER,
    },
];

impl TypeTag {
    pub fn lookup(tag: &str) -> Option<&'static TypeTag> {
        TYPE_TAGS.iter().find(|entry| entry.tag == tag)
    }
}
