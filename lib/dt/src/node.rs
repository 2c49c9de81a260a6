use crate::prop::{Property, PropertyError};
use alloc::{boxed::Box, collections::btree_map::BTreeMap, string::String, vec, vec::Vec};
use core::ops::Range;

/// The hardware description graph.
///
/// Nodes live in `container` and refer to each other by index. The root node is its own parent.
#[derive(Debug, Clone)]
pub struct DeviceTree {
    pub root_id: usize,
    pub container: Vec<Node>,
    pub mem_rsv_map: Vec<Range<usize>>,
    /// phandle value -> node id
    pub phandle_map: BTreeMap<u32, usize>,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub node_id: usize,
    pub parent_id: usize,
    pub full_name: Box<str>,
    pub node_name: Box<str>,
    pub unit_addr: Box<str>,
    pub children: Vec<usize>,
    pub props: Vec<Property>,
    pub node_type: NodeType,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum NodeType {
    Device,
    Description,
}

/// One resolved entry of a phandle list such as `dmas = <&axi_dma_0 0>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhandleArgs {
    pub node_id: usize,
    pub args: Vec<u32>,
}

/// Split `name@unit-address` into its two parts.
pub(crate) fn split_unit_name(full_name: &str) -> (&str, &str) {
    match full_name.find('@') {
        Some(idx) => (&full_name[..idx], &full_name[idx + 1..]),
        None => (full_name, ""),
    }
}

impl DeviceTree {
    /// Assemble a tree from nodes whose `parent_id`s are already set, indexing every
    /// `phandle` (or legacy `linux,phandle`) property.
    pub(crate) fn from_nodes(
        root_id: usize,
        container: Vec<Node>,
        mem_rsv_map: Vec<Range<usize>>,
    ) -> DeviceTree {
        let mut phandle_map = BTreeMap::new();
        for node in &container {
            let prop = node
                .props
                .iter()
                .find(|p| p.name.as_ref() == "phandle" || p.name.as_ref() == "linux,phandle");
            if let Some(Ok(phandle)) = prop.map(Property::value_as_u32) {
                phandle_map.insert(phandle, node.node_id);
            }
        }
        DeviceTree {
            root_id,
            container,
            mem_rsv_map,
            phandle_map,
        }
    }

    pub fn root(&self) -> &Node {
        &self.container[self.root_id]
    }
    pub fn node(&self, node_id: usize) -> Option<&Node> {
        self.container.get(node_id)
    }
    pub fn is_root(&self, node: &Node) -> bool {
        node.parent_id == node.node_id
    }
    pub fn get_full_path(&self, node: &Node) -> Box<str> {
        if self.is_root(node) {
            return Box::from("/");
        }
        let mut sections = vec![node.full_name.as_ref()];
        let mut cursor = self.get_parent(node);
        while !self.is_root(cursor) {
            sections.push(cursor.full_name.as_ref());
            cursor = self.get_parent(cursor);
        }
        let mut path = String::new();
        for section in sections.iter().rev() {
            path.push('/');
            path.push_str(section);
        }
        path.into_boxed_str()
    }
    pub fn get_parent(&self, node: &Node) -> &Node {
        &self.container[node.parent_id]
    }
    pub fn get_children<'b>(&'b self, node: &Node) -> impl Iterator<Item = &'b Node> {
        node.children.iter().map(|x| &self.container[*x])
    }
    pub fn child_count(&self, node: &Node) -> usize {
        node.children.len()
    }
    /// The `index`th child in declaration order.
    pub fn nth_child(&self, node: &Node, index: usize) -> Option<&Node> {
        node.children.get(index).map(|x| &self.container[*x])
    }
    pub fn get_property<'b>(&self, node: &'b Node, name: impl AsRef<str>) -> Option<&'b Property> {
        let name = name.as_ref();
        node.props.iter().find(|prop| prop.name.as_ref() == name)
    }
    pub fn find_by_phandle(&self, phandle: u32) -> Option<&Node> {
        self.phandle_map
            .get(&phandle)
            .and_then(|id| self.container.get(*id))
    }
    pub fn get_node(&self, path: impl AsRef<str>) -> Option<&Node> {
        let mut node = self.root();
        for section in path.as_ref().split('/') {
            if section.trim().is_empty() {
                continue;
            }
            node = self
                .get_children(node)
                .find(|subnode| subnode.full_name.as_ref() == section)?;
        }
        Some(node)
    }
    /// Collect all nodes matching `path`. A section matches a child by full name, by
    /// node name without the unit address, or with the `*` wildcard.
    pub fn get_nodes(&self, path: impl AsRef<str>) -> Vec<&Node> {
        let path: Vec<&str> = path
            .as_ref()
            .split('/')
            .filter(|section| !section.trim().is_empty())
            .collect();
        self.get_sub_nodes(self.root(), &path)
    }
    fn get_sub_nodes<'b>(&'b self, node: &'b Node, path: &[&str]) -> Vec<&'b Node> {
        let Some((sec, rest)) = path.split_first() else {
            return vec![node];
        };
        self.get_children(node)
            .filter(|child| {
                *sec == "*" || child.full_name.as_ref() == *sec || child.node_name.as_ref() == *sec
            })
            .flat_map(|child| self.get_sub_nodes(child, rest))
            .collect()
    }
    pub fn get_reg_value(&self, node: &Node) -> Result<Vec<Range<usize>>, PropertyError> {
        let mut size_cel = 1;
        let mut addr_cel = 2;
        if !self.is_root(node) {
            let parent = self.get_parent(node);
            if let Some(prop) = self.get_property(parent, "#address-cells") {
                addr_cel = prop.value_as_u32()? as usize;
            }
            if let Some(prop) = self.get_property(parent, "#size-cells") {
                size_cel = prop.value_as_u32()? as usize;
            }
        }
        let reg = self
            .get_property(node, "reg")
            .ok_or(PropertyError::PropNotFound)?
            .value_as_cells()?;
        let width = size_cel + addr_cel;
        if width == 0 || reg.len() % width != 0 {
            return Err(PropertyError::InvalidPropFormat);
        }
        let mut res = vec![];
        for entry in reg.chunks_exact(width) {
            let (addr_cells, size_cells) = entry.split_at(addr_cel);
            let addr = addr_cells.iter().fold(0u64, |acc, c| (acc << 32) | *c as u64) as usize;
            let sz = size_cells.iter().fold(0u64, |acc, c| (acc << 32) | *c as u64) as usize;
            let end = addr.checked_add(sz).ok_or(PropertyError::InvalidPropFormat)?;
            res.push(addr..end);
        }
        Ok(res)
    }

    /// Decode every entry of the phandle list `list_name` on `node`.
    ///
    /// Each entry is a phandle followed by as many argument cells as the referenced node's
    /// `cells_name` property says (zero when that property is absent).
    fn walk_phandle_list(
        &self,
        node: &Node,
        list_name: &str,
        cells_name: &str,
    ) -> Result<Vec<PhandleArgs>, PropertyError> {
        let cells = self
            .get_property(node, list_name)
            .ok_or(PropertyError::PropNotFound)?
            .value_as_cells()?;
        let mut res = vec![];
        let mut cursor = 0;
        while cursor < cells.len() {
            let target = self
                .find_by_phandle(cells[cursor])
                .ok_or(PropertyError::DanglingHandle)?;
            let count = match self.get_property(target, cells_name) {
                Some(prop) => prop.value_as_u32()? as usize,
                None => 0,
            };
            let start = cursor + 1;
            let args = cells
                .get(start..start + count)
                .ok_or(PropertyError::InvalidPropFormat)?;
            res.push(PhandleArgs {
                node_id: target.node_id,
                args: args.to_vec(),
            });
            cursor = start + count;
        }
        Ok(res)
    }
    pub fn count_phandle_with_args(
        &self,
        node: &Node,
        list_name: &str,
        cells_name: &str,
    ) -> Result<usize, PropertyError> {
        Ok(self.walk_phandle_list(node, list_name, cells_name)?.len())
    }
    pub fn parse_phandle_with_args(
        &self,
        node: &Node,
        list_name: &str,
        cells_name: &str,
        index: usize,
    ) -> Result<PhandleArgs, PropertyError> {
        self.walk_phandle_list(node, list_name, cells_name)?
            .into_iter()
            .nth(index)
            .ok_or(PropertyError::IndexOutOfRange)
    }
}
