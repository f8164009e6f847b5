mod buffer;
mod moddims;
mod nary;
mod scalar;

pub use buffer::*;
pub use moddims::*;
pub use nary::*;
pub use scalar::*;

use std::{any::Any, fmt::Debug, fmt::Write, sync::Arc};

use dyn_clone::{clone_trait_object, DynClone};
use tinyvec::ArrayVec;

use crate::{
    dispatch::KernelArgs,
    dtype::DType,
    error::{JitError, Result},
    param::{Dim4, Param},
};

/// Most operands any single node can have.
pub const MAX_CHILDREN: usize = 3;

/// Shared handle to a node. Two handles are the same node iff they point at the
/// same allocation; structurally equal nodes are still distinct.
pub type NodeRef = Arc<Node>;

/// Position of a node, and of its children, in a flattened graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeIds {
    pub id: usize,
    pub child_ids: ArrayVec<[usize; MAX_CHILDREN]>,
}

/// What an operator must provide to be fused into a kernel.
///
/// Every `gen_*` method writes the code for the node with flattened id `id`.
/// A node's computed value is always named `val{id}`, so an operator refers to
/// its operands as `val{child_id}`.
pub trait JitOp: Debug + DynClone + Send + Sync + Any {
    /// Operator tag. Part of the kernel signature.
    fn name(&self) -> &'static str;

    /// Append this node's contribution to the kernel signature string. Must
    /// not depend on anything that changes between launches of the same
    /// structure, such as addresses or scalar values.
    fn gen_ker_name(&self, sig: &mut String, dtype: DType, ids: &NodeIds) {
        write!(sig, "_{}{}:{}", self.name(), dtype, ids.id).unwrap();
        for child in ids.child_ids.iter() {
            write!(sig, ",{child}").unwrap();
        }
    }

    /// Declare the kernel parameters this node reads from.
    #[allow(unused)]
    fn gen_params(&self, params: &mut Vec<String>, id: usize, dtype: DType) {}

    /// Emit the per-element offset computation for this node's operand.
    #[allow(unused)]
    fn gen_offsets(&self, code: &mut String, id: usize, dtype: DType, is_linear: bool) {}

    /// Emit the statement computing `val{id}`.
    fn gen_funcs(&self, code: &mut String, dtype: DType, ids: &NodeIds);

    /// Append launch arguments, one per parameter declared in `gen_params`.
    #[allow(unused)]
    fn set_args(&self, args: &mut KernelArgs) {}

    /// Whether a single flat index into this node lines up with the output.
    #[allow(unused)]
    fn is_linear(&self, out_dims: &Dim4) -> bool {
        true
    }

    fn is_buffer(&self) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

clone_trait_object!(JitOp);

/// One operator in an expression graph.
#[derive(Debug, Clone)]
pub struct Node {
    dtype: DType,
    children: [Option<NodeRef>; MAX_CHILDREN],
    op: Box<dyn JitOp>,
}

impl Node {
    /// Create a node. Children are kept in the order given.
    pub fn new<O: JitOp>(dtype: DType, op: O, children: &[NodeRef]) -> Result<NodeRef> {
        if children.len() > MAX_CHILDREN {
            return Err(JitError::TooManyChildren(children.len()));
        }
        let mut slots: [Option<NodeRef>; MAX_CHILDREN] = Default::default();
        for (slot, child) in slots.iter_mut().zip(children) {
            *slot = Some(child.clone());
        }
        Ok(Arc::new(Self {
            dtype,
            children: slots,
            op: Box::new(op),
        }))
    }

    pub(crate) fn leaf<O: JitOp>(dtype: DType, op: O) -> NodeRef {
        Arc::new(Self {
            dtype,
            children: Default::default(),
            op: Box::new(op),
        })
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn type_str(&self) -> &'static str {
        self.dtype.type_str()
    }

    pub fn op(&self) -> &dyn JitOp {
        self.op.as_ref()
    }

    /// Children in operand order. Slots are filled front to back, so this stops
    /// at the first empty one.
    pub fn children(&self) -> impl Iterator<Item = &NodeRef> {
        self.children.iter().map_while(Option::as_ref)
    }

    pub fn is_buffer(&self) -> bool {
        self.op.is_buffer()
    }

    pub fn is_linear(&self, out_dims: &Dim4) -> bool {
        self.op.is_linear(out_dims)
    }

    /// The layout of a buffer leaf, `None` for every other node kind.
    pub fn param(&self) -> Option<&Param> {
        self.op
            .as_any()
            .downcast_ref::<BufferOp>()
            .map(BufferOp::param)
    }

    /// Identity key of a node handle: the address of its allocation.
    pub fn identity(node: &NodeRef) -> usize {
        Arc::as_ptr(node) as usize
    }
}
