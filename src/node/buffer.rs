use std::{any::Any, fmt::Write, sync::Arc};

use crate::{
    dispatch::KernelArgs,
    dtype::{DType, JitType},
    param::{calc_strides, Dim4, Param},
};

use super::{JitOp, Node, NodeIds, NodeRef};

/// Leaf reading an existing device array.
#[derive(Clone)]
pub struct BufferOp {
    param: Param,
    linear: bool,
    /// Keeps the memory behind `param.ptr` alive for as long as any node
    /// (or clone of one) refers to it.
    storage: Option<Arc<dyn Any + Send + Sync>>,
}

impl std::fmt::Debug for BufferOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferOp")
            .field("param", &self.param)
            .field("linear", &self.linear)
            .finish()
    }
}

impl BufferOp {
    pub fn new(param: Param) -> Self {
        Self {
            linear: param.is_contiguous(),
            param,
            storage: None,
        }
    }

    pub fn param(&self) -> &Param {
        &self.param
    }

    /// Reinterpret this buffer as a densely packed array of `dims`.
    pub fn reshape(&mut self, dims: Dim4) {
        self.param.dims = dims;
        self.param.strides = calc_strides(&dims);
    }
}

impl Node {
    pub fn buffer(param: Param, dtype: DType) -> NodeRef {
        Node::leaf(dtype, BufferOp::new(param))
    }

    /// A buffer leaf holding elements of host type `T`.
    pub fn buffer_of<T: JitType>(param: Param) -> NodeRef {
        Node::buffer(param, T::DTYPE)
    }

    /// A buffer leaf that also owns a handle on its backing allocation.
    pub fn buffer_with_storage<S: Any + Send + Sync>(
        param: Param,
        dtype: DType,
        storage: S,
    ) -> NodeRef {
        let mut op = BufferOp::new(param);
        op.storage = Some(Arc::new(storage));
        Node::leaf(dtype, op)
    }
}

impl JitOp for BufferOp {
    fn name(&self) -> &'static str {
        "buffer"
    }

    fn gen_params(&self, params: &mut Vec<String>, id: usize, dtype: DType) {
        params.push(format!("Param<{}> in{id}", dtype.type_str()));
    }

    fn gen_offsets(&self, code: &mut String, id: usize, dtype: DType, is_linear: bool) {
        if is_linear {
            writeln!(code, "        long long idx{id} = idx;").unwrap();
        } else {
            // Dimensions the operand doesn't span (size 1) collapse to index 0,
            // which broadcasts it across the output.
            let terms = (0..4)
                .rev()
                .map(|d| format!("(id{d} < in{id}.dims[{d}]) * in{id}.strides[{d}] * id{d}"))
                .collect::<Vec<_>>()
                .join(" +\n            ");
            writeln!(code, "        long long idx{id} =\n            {terms};").unwrap();
        }
        writeln!(
            code,
            "        const {ty} *in{id}_ptr = in{id}.ptr;",
            ty = dtype.type_str()
        )
        .unwrap();
    }

    fn gen_funcs(&self, code: &mut String, dtype: DType, ids: &NodeIds) {
        writeln!(
            code,
            "        {} val{id} = in{id}_ptr[idx{id}];",
            dtype.type_str(),
            id = ids.id
        )
        .unwrap();
    }

    fn set_args(&self, args: &mut KernelArgs) {
        args.push_param(self.param.raw());
    }

    fn is_linear(&self, out_dims: &Dim4) -> bool {
        self.linear && self.param.dims == *out_dims
    }

    fn is_buffer(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
