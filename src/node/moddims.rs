use std::{any::Any, fmt::Write};

use crate::{dtype::DType, error::Result, param::Dim4};

use super::{JitOp, Node, NodeIds, NodeRef};

/// Reshape. Only changes how the operand's memory is indexed, so it costs no
/// data movement: before codegen the target shape is written into the buffer
/// leaves underneath it.
#[derive(Debug, Clone)]
pub struct ModdimsOp {
    pub new_shape: Dim4,
}

impl ModdimsOp {
    pub fn new(new_shape: Dim4) -> Self {
        Self { new_shape }
    }
}

impl Node {
    pub fn moddims(node: &NodeRef, new_shape: Dim4) -> Result<NodeRef> {
        Node::new(node.dtype(), ModdimsOp::new(new_shape), &[node.clone()])
    }
}

impl JitOp for ModdimsOp {
    fn name(&self) -> &'static str {
        "moddims"
    }

    fn gen_funcs(&self, code: &mut String, dtype: DType, ids: &NodeIds) {
        writeln!(
            code,
            "        {} val{} = val{};",
            dtype.type_str(),
            ids.id,
            ids.child_ids[0]
        )
        .unwrap();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
