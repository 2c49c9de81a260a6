//! In-memory construction of a [DeviceTree].
//!
//! Platforms that describe their hardware in code (or tests that need a fixture) add nodes and
//! properties here instead of going through a flattened blob.

use crate::{
    node::{DeviceTree, Node, NodeType, split_unit_name},
    prop::Property,
};
use alloc::{boxed::Box, vec, vec::Vec};
use core::ops::Range;

pub struct DeviceTreeBuilder {
    nodes: Vec<Node>,
    mem_rsv_map: Vec<Range<usize>>,
}

impl Default for DeviceTreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceTreeBuilder {
    /// Id of the root node.
    pub const ROOT: usize = 0;

    pub fn new() -> DeviceTreeBuilder {
        DeviceTreeBuilder {
            nodes: vec![Node {
                node_id: Self::ROOT,
                parent_id: Self::ROOT,
                full_name: Box::from(""),
                node_name: Box::from(""),
                unit_addr: Box::from(""),
                children: vec![],
                props: vec![],
                node_type: NodeType::Device,
            }],
            mem_rsv_map: vec![],
        }
    }

    /// Append a child named `full_name` (`name` or `name@unit-address`) to `parent`.
    ///
    /// `parent` must be an id returned by this builder.
    pub fn add_node(&mut self, parent: usize, full_name: &str) -> usize {
        let id = self.nodes.len();
        let (node_name, unit_addr) = split_unit_name(full_name);
        self.nodes.push(Node {
            node_id: id,
            parent_id: parent,
            full_name: Box::from(full_name),
            node_name: Box::from(node_name),
            unit_addr: Box::from(unit_addr),
            children: vec![],
            props: vec![],
            node_type: NodeType::Device,
        });
        self.nodes[parent].children.push(id);
        id
    }

    pub fn add_prop(&mut self, node: usize, prop: Property) -> &mut Self {
        self.nodes[node].props.push(prop);
        self
    }

    pub fn set_node_type(&mut self, node: usize, node_type: NodeType) -> &mut Self {
        self.nodes[node].node_type = node_type;
        self
    }

    pub fn reserve_memory(&mut self, range: Range<usize>) -> &mut Self {
        self.mem_rsv_map.push(range);
        self
    }

    pub fn build(self) -> DeviceTree {
        DeviceTree::from_nodes(Self::ROOT, self.nodes, self.mem_rsv_map)
    }
}
