use rustc_hash::FxHashMap;
use tinyvec::ArrayVec;

use crate::node::{Node, NodeIds, NodeRef};

/// Scratch state of one evaluation: every unique node reachable from the
/// outputs, in first-seen order, with its id table.
///
/// A workspace can be reused across evaluations to keep its allocations, but
/// its contents are only meaningful between `flatten` and `reset`.
#[derive(Debug, Default)]
pub struct Workspace {
    node_map: FxHashMap<usize, usize>,
    pub(crate) full_nodes: Vec<NodeRef>,
    pub(crate) full_ids: Vec<NodeIds>,
    pub(crate) output_ids: Vec<usize>,
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign ids to every node reachable from `outputs`. Children are visited
    /// before their parents and outputs in the order given, so a child's id is
    /// always smaller than its parent's and isomorphic graphs get identical
    /// tables. A node shared by several parents is listed once.
    pub fn flatten(&mut self, outputs: &[NodeRef]) {
        for output in outputs {
            let id = self.visit(output);
            self.output_ids.push(id);
        }
    }

    fn visit(&mut self, node: &NodeRef) -> usize {
        if let Some(&id) = self.node_map.get(&Node::identity(node)) {
            return id;
        }
        let mut child_ids = ArrayVec::default();
        for child in node.children() {
            child_ids.push(self.visit(child));
        }
        let id = self.full_nodes.len();
        self.node_map.insert(Node::identity(node), id);
        self.full_nodes.push(node.clone());
        self.full_ids.push(NodeIds { id, child_ids });
        id
    }

    pub fn nodes(&self) -> &[NodeRef] {
        &self.full_nodes
    }

    pub fn ids(&self) -> &[NodeIds] {
        &self.full_ids
    }

    pub fn output_ids(&self) -> &[usize] {
        &self.output_ids
    }

    pub fn is_empty(&self) -> bool {
        self.full_nodes.is_empty() && self.output_ids.is_empty()
    }

    /// Forget the previous graph, keeping allocated capacity.
    pub fn reset(&mut self) {
        self.node_map.clear();
        self.full_nodes.clear();
        self.full_ids.clear();
        self.output_ids.clear();
    }
}
