use crate::{
    dtype::DType,
    flatten::Workspace,
    node::{BufferOp, JitOp, ModdimsOp, NodeIds},
    param::{Dim4, Param},
};

/// A private copy of one flattened node. Children are referred to by id.
#[derive(Debug, Clone)]
pub struct EvalNode {
    pub dtype: DType,
    pub op: Box<dyn JitOp>,
    pub ids: NodeIds,
}

/// The flattened graph as it is compiled and launched: cloned from the
/// caller's nodes, with reshapes folded into the buffers below them.
#[derive(Debug, Clone)]
pub struct EvalGraph {
    nodes: Vec<EvalNode>,
    output_ids: Vec<usize>,
}

impl EvalGraph {
    /// Clone the flattened nodes out of `ws` and fold every reshape into the
    /// layout of the buffers it reads. The caller's nodes are left untouched.
    pub fn from_workspace(ws: &Workspace) -> Self {
        let nodes = ws
            .nodes()
            .iter()
            .zip(ws.ids())
            .map(|(node, ids)| EvalNode {
                dtype: node.dtype(),
                op: dyn_clone::clone_box(node.op()),
                ids: ids.clone(),
            })
            .collect();
        let mut graph = Self {
            nodes,
            output_ids: ws.output_ids().to_vec(),
        };
        graph.fold_reshapes();
        graph
    }

    /// Rewrite the buffers under each reshape to the reshape's target shape
    /// with dense strides.
    ///
    /// A walk stops at a nested reshape and hands it the enclosing target
    /// instead. Parents always have larger ids than their children, so going
    /// from the highest id down visits enclosing reshapes first and the
    /// outermost target is the one that reaches the buffers.
    fn fold_reshapes(&mut self) {
        let mut visited = vec![false; self.nodes.len()];
        for id in (0..self.nodes.len()).rev() {
            let Some(target) = self.reshape_target(id) else {
                continue;
            };
            visited.iter_mut().for_each(|v| *v = false);
            let mut stack = self.nodes[id].ids.child_ids.to_vec();
            while let Some(n) = stack.pop() {
                if std::mem::replace(&mut visited[n], true) {
                    continue;
                }
                let op = self.nodes[n].op.as_any_mut();
                if let Some(buffer) = op.downcast_mut::<BufferOp>() {
                    buffer.reshape(target);
                } else if let Some(inner) = op.downcast_mut::<ModdimsOp>() {
                    inner.new_shape = target;
                } else {
                    stack.extend(self.nodes[n].ids.child_ids.iter().copied());
                }
            }
        }
    }

    fn reshape_target(&self, id: usize) -> Option<Dim4> {
        self.nodes[id]
            .op
            .as_any()
            .downcast_ref::<ModdimsOp>()
            .map(|m| m.new_shape)
    }

    /// Whether every operand can be addressed with the output's flat index.
    /// Depends on runtime layouts, so it is recomputed for every launch.
    pub fn is_linear(&self, out_dims: &Dim4) -> bool {
        self.nodes.iter().all(|n| n.op.is_linear(out_dims))
    }

    pub fn nodes(&self) -> &[EvalNode] {
        &self.nodes
    }

    pub fn output_ids(&self) -> &[usize] {
        &self.output_ids
    }

    /// Layout of the buffer with id `id` after normalization.
    pub fn buffer_param(&self, id: usize) -> Option<&Param> {
        self.nodes
            .get(id)?
            .op
            .as_any()
            .downcast_ref::<BufferOp>()
            .map(BufferOp::param)
    }
}
