use std::ffi::c_void;

use crate::{
    dtype::Scalar,
    launch::LaunchPlan,
    normalize::EvalGraph,
    param::{Param, RawParam},
};

/// One kernel launch argument, stored by value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KernelArg {
    Param(RawParam),
    Scalar(Scalar),
    Index(u32),
}

/// Launch arguments in kernel-signature order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KernelArgs(Vec<KernelArg>);

impl KernelArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_param(&mut self, param: RawParam) {
        self.0.push(KernelArg::Param(param));
    }

    pub fn push_scalar(&mut self, scalar: Scalar) {
        self.0.push(KernelArg::Scalar(scalar));
    }

    pub fn push_index(&mut self, index: u32) {
        self.0.push(KernelArg::Index(index));
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn args(&self) -> &[KernelArg] {
        &self.0
    }

    /// Pointers to each argument's bytes, as driver launch calls take them.
    /// They point into `self`, which must stay put until the launch returns.
    pub fn as_kernel_params(&mut self) -> Vec<*mut c_void> {
        self.0
            .iter_mut()
            .map(|arg| match arg {
                KernelArg::Param(p) => p as *mut RawParam as *mut c_void,
                KernelArg::Scalar(s) => s.as_kernel_param(),
                KernelArg::Index(i) => i as *mut u32 as *mut c_void,
            })
            .collect()
    }
}

/// Collect the arguments for one launch: every node's own arguments in
/// flattened order, one layout per output, then the grid bookkeeping values.
///
/// Panics if the count differs from `param_count`, the number of parameters
/// the kernel was generated with.
pub fn assemble_args(
    graph: &EvalGraph,
    outputs: &[Param],
    plan: &LaunchPlan,
    param_count: usize,
) -> KernelArgs {
    let mut args = KernelArgs::new();
    for node in graph.nodes() {
        node.op.set_args(&mut args);
    }
    for out in outputs {
        args.push_param(out.raw());
    }
    args.push_index(plan.blocks_x);
    args.push_index(plan.blocks_y);
    args.push_index(plan.blocks_x_total);
    args.push_index(plan.num_odims);
    assert_eq!(
        args.len(),
        param_count,
        "kernel argument count doesn't match its signature"
    );
    args
}
