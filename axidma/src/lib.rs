//! Control-plane core of the AXI DMA driver.
//!
//! The crate covers the two pieces of the driver that keep the hardware and the software view of
//! it consistent:
//! - [topology] reads the channel wiring out of a [dt::node::DeviceTree] and produces an immutable
//!   [topology::DeviceTopology].
//! - [session] arbitrates exclusive access to the device's DMA buffer and asks the platform's
//!   [buffer::RegionMapper] to map sub-ranges of it for the session holder.
//!
//! [device::DeviceSlot] ties both to the attach/detach lifecycle of one device. The transfer engine,
//! interrupt handling and the user-facing character device are left to the platform.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

#[macro_use]
pub mod logging;

pub mod buffer;
pub mod channel;
pub mod config;
pub mod device;
pub mod error;
pub mod handle;
pub mod session;
pub mod topology;

#[cfg(test)]
mod testing;

pub use buffer::{BufferRegion, MapFlags, MappedRegion, RegionMapper};
pub use channel::{ChannelCounts, ChannelDescriptor, Direction, EngineType};
pub use config::AxiDmaConfig;
pub use device::{AxiDmaDevice, DeviceSlot, DeviceState};
pub use error::{AttachError, CallerId, SessionError, TopologyError};
pub use session::{Caller, Session, SessionManager};
pub use topology::{DeviceTopology, count_declared_channels, resolve, resolve_name};
