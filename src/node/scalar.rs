use std::{any::Any, fmt::Write};

use crate::{
    dispatch::KernelArgs,
    dtype::{DType, Scalar},
};

use super::{JitOp, Node, NodeIds, NodeRef};

/// A constant broadcast to every element. The value is a launch argument, so
/// kernels for different constants are shared.
#[derive(Debug, Clone)]
pub struct ScalarOp(pub Scalar);

impl Node {
    pub fn scalar(value: impl Into<Scalar>) -> NodeRef {
        let value = value.into();
        Node::leaf(value.dtype(), ScalarOp(value))
    }
}

impl JitOp for ScalarOp {
    fn name(&self) -> &'static str {
        "scalar"
    }

    fn gen_params(&self, params: &mut Vec<String>, id: usize, dtype: DType) {
        params.push(format!("{} scalar{id}", dtype.type_str()));
    }

    fn gen_funcs(&self, code: &mut String, dtype: DType, ids: &NodeIds) {
        writeln!(
            code,
            "        {} val{id} = scalar{id};",
            dtype.type_str(),
            id = ids.id
        )
        .unwrap();
    }

    fn set_args(&self, args: &mut KernelArgs) {
        args.push_scalar(self.0);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
