//! The device runtime the engine drives: compiling generated source, resolving
//! kernels and launching them on the active stream.

#[cfg(feature = "cuda")]
mod cuda;
#[cfg(feature = "cuda")]
pub use cuda::*;

use crate::{
    codegen::KernelSource,
    dispatch::KernelArgs,
    error::Result,
    launch::{GridLimits, LaunchPlan},
};

pub trait Backend: Send + Sync {
    /// A loaded code module. Cached and shared between threads.
    type Module: Send + Sync;
    /// A launchable kernel inside a module.
    type Function;

    /// Device that evaluations on the calling thread target.
    fn active_device_id(&self) -> usize;

    fn grid_limits(&self, device: usize) -> Result<GridLimits>;

    /// Compile `kernel` and load the result on `device`.
    fn compile(&self, device: usize, kernel: &KernelSource) -> Result<Self::Module>;

    fn resolve_function(&self, module: &Self::Module, name: &str) -> Result<Self::Function>;

    /// Enqueue `function` on the active stream. Does not wait for completion.
    fn launch(
        &self,
        function: &Self::Function,
        plan: &LaunchPlan,
        args: &mut KernelArgs,
    ) -> Result<()>;
}
