//! Resolution of the channel topology from the hardware description.
//!
//! The driver node lists its channels twice: by name in `dma-names`, and as references into the
//! DMA core nodes in `dmas`. Every reference carries one selector cell that picks the first or
//! second sub-channel node of the core, whose `compatible` tag tells the engine type and direction.
//!
//! ```text
//! axidma_chrdev {
//!     dma-names = "tx_channel", "rx_channel";
//!     dmas = <&axi_dma_0 0>, <&axi_dma_0 1>;
//! };
//! ```
//!
//! Resolution either produces a complete [DeviceTopology] or an error; nothing is kept from a
//! failed attempt.

use crate::{
    channel::{ChannelCounts, ChannelDescriptor, CounterSlot, Direction, EngineType, TypeTag},
    debug_ex,
    error::TopologyError,
};
use alloc::{boxed::Box, vec::Vec};
use dt::{
    node::{DeviceTree, Node},
    prop::{Property, PropertyError},
};
use log::error;

/// Channel names, in declaration order.
pub const DMA_NAMES_PROP: &str = "dma-names";
/// Channel references into the DMA core nodes.
pub const DMAS_PROP: &str = "dmas";
/// Argument cell count of a DMA core's references.
pub const DMA_CELLS_PROP: &str = "#dma-cells";
/// Type tag of a sub-channel node.
pub const CHANNEL_TYPE_PROP: &str = "compatible";

/// The validated channel table of one device. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTopology {
    channels: Vec<ChannelDescriptor>,
    counts: ChannelCounts,
}

impl DeviceTopology {
    pub fn channels(&self) -> &[ChannelDescriptor] {
        &self.channels
    }

    pub fn counts(&self) -> ChannelCounts {
        self.counts
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ChannelDescriptor> {
        self.channels.get(index)
    }

    /// Look up a channel and check that it has the expected engine type and direction.
    pub fn find(
        &self,
        index: usize,
        engine_type: EngineType,
        direction: Direction,
    ) -> Option<&ChannelDescriptor> {
        self.get(index)
            .filter(|chan| chan.engine_type == engine_type && chan.direction == direction)
    }

    pub fn name_of(&self, index: usize) -> Option<&str> {
        self.get(index).map(|chan| chan.name.as_ref())
    }
}

fn malformed(property: &'static str, node: &str, cause: PropertyError) -> TopologyError {
    TopologyError::MalformedProperty {
        property,
        node: Box::from(node),
        cause,
    }
}

fn required<'a>(
    tree: &DeviceTree,
    node: &'a Node,
    path: &str,
    property: &'static str,
) -> Result<&'a Property, TopologyError> {
    tree.get_property(node, property)
        .ok_or_else(|| TopologyError::MissingProperty {
            property,
            node: Box::from(path),
        })
}

/// Check both channel lists and return their common length.
fn check_channel_lists(tree: &DeviceTree, node: &Node, path: &str) -> Result<usize, TopologyError> {
    let names = required(tree, node, path, DMA_NAMES_PROP)?;
    required(tree, node, path, DMAS_PROP)?;

    let names = names
        .count_strings()
        .map_err(|cause| malformed(DMA_NAMES_PROP, path, cause))?;
    if names == 0 {
        return Err(TopologyError::EmptyProperty {
            property: DMA_NAMES_PROP,
            node: Box::from(path),
        });
    }
    let references = tree
        .count_phandle_with_args(node, DMAS_PROP, DMA_CELLS_PROP)
        .map_err(|cause| malformed(DMAS_PROP, path, cause))?;
    if references == 0 {
        return Err(TopologyError::EmptyProperty {
            property: DMAS_PROP,
            node: Box::from(path),
        });
    }
    if names != references {
        return Err(TopologyError::LengthMismatch {
            names,
            references,
            node: Box::from(path),
        });
    }
    Ok(names)
}

/// Validate the channel lists of `node` and return how many channels it declares.
///
/// [resolve] applies the same checks, so sizing storage with this never disagrees with it.
pub fn count_declared_channels(tree: &DeviceTree, node: &Node) -> Result<usize, TopologyError> {
    let path = tree.get_full_path(node);
    check_channel_lists(tree, node, &path).inspect_err(|err| {
        error!("Unable to count DMA channels: {}.", err);
    })
}

/// Resolve the first `declared` channels of `node` into a [DeviceTopology].
pub fn resolve(
    tree: &DeviceTree,
    node: &Node,
    declared: usize,
) -> Result<DeviceTopology, TopologyError> {
    let path = tree.get_full_path(node);
    resolve_channels(tree, node, &path, declared).inspect_err(|err| {
        error!("Unable to resolve DMA channels: {}.", err);
    })
}

fn resolve_channels(
    tree: &DeviceTree,
    node: &Node,
    path: &str,
    declared: usize,
) -> Result<DeviceTopology, TopologyError> {
    let len = check_channel_lists(tree, node, path)?;
    if declared > len {
        return Err(TopologyError::IndexOutOfRange { index: len, len });
    }
    let names = required(tree, node, path, DMA_NAMES_PROP)?
        .value_as_strlist()
        .map_err(|cause| malformed(DMA_NAMES_PROP, path, cause))?;

    let mut channels = Vec::with_capacity(declared);
    let mut counts = ChannelCounts::default();
    for (index, name) in names.iter().take(declared).enumerate() {
        let (channel, counter) = resolve_channel(tree, node, path, index, name)?;
        counts.bump(counter);
        channels.push(channel);
    }
    Ok(DeviceTopology { channels, counts })
}

fn resolve_channel(
    tree: &DeviceTree,
    node: &Node,
    path: &str,
    index: usize,
    name: &str,
) -> Result<(ChannelDescriptor, CounterSlot), TopologyError> {
    let reference = tree
        .parse_phandle_with_args(node, DMAS_PROP, DMA_CELLS_PROP, index)
        .map_err(|cause| malformed(DMAS_PROP, path, cause))?;
    let selector = match reference.args.as_slice() {
        [selector @ (0 | 1)] => *selector,
        _ => {
            return Err(TopologyError::InvalidArgument {
                index,
                args: reference.args,
                node: Box::from(path),
            });
        }
    };

    let core = tree
        .node(reference.node_id)
        .ok_or_else(|| malformed(DMAS_PROP, path, PropertyError::DanglingHandle))?;
    let children = tree.child_count(core);
    let channel_node = match children {
        1 | 2 => tree.nth_child(core, selector as usize),
        _ => None,
    }
    .ok_or_else(|| TopologyError::InvalidTopology {
        node: tree.get_full_path(core),
        children,
        selector,
    })?;

    // an undecodable tag counts as a missing one
    let tag = tree
        .get_property(channel_node, CHANNEL_TYPE_PROP)
        .and_then(|prop| prop.value_as_str().ok());
    let entry = tag
        .and_then(TypeTag::lookup)
        .ok_or_else(|| TopologyError::UnknownChannelType {
            node: tree.get_full_path(channel_node),
            tag: tag.map(Box::from),
        })?;

    debug_ex!(
        "{}: channel {} '{}' is a {} {} channel.",
        path,
        index,
        name,
        entry.engine_type,
        entry.direction
    );
    Ok((
        ChannelDescriptor {
            index,
            engine_type: entry.engine_type,
            direction: entry.direction,
            name: Box::from(name),
        },
        entry.counter,
    ))
}

/// Name of channel `index`, read straight from `dma-names`.
pub fn resolve_name<'a>(
    tree: &DeviceTree,
    node: &'a Node,
    index: usize,
) -> Result<&'a str, TopologyError> {
    let path = tree.get_full_path(node);
    let names = required(tree, node, &path, DMA_NAMES_PROP)?
        .value_as_strlist()
        .map_err(|cause| malformed(DMA_NAMES_PROP, &path, cause))?;
    names
        .get(index)
        .copied()
        .ok_or(TopologyError::IndexOutOfRange {
            index,
            len: names.len(),
        })
}
