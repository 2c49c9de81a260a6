//! Device tree model for the AXI DMA platform driver.
//!
//! A [node::DeviceTree] is either assembled in code with [builder::DeviceTreeBuilder] or read
//! from a flattened blob with [fdt::reader::FdtReader].

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod builder;
pub mod fdt;
pub mod node;
pub mod prop;
