use std::cell::RefCell;

use crate::{
    backend::Backend,
    cache::{CachedKernel, KernelCache},
    codegen::{dump_kernel, kernel_name, kernel_source},
    config::JitConfig,
    dispatch::assemble_args,
    error::{JitError, Result},
    flatten::Workspace,
    launch::plan_launch,
    node::NodeRef,
    normalize::EvalGraph,
    param::Param,
};

thread_local! {
    static WORKSPACE: RefCell<Workspace> = RefCell::new(Workspace::new());
}

/// The fusion engine: turns output nodes into one kernel launch.
///
/// All state shared between calls is the kernel cache, so a `Jit` can be put
/// in an `Arc` and used from many threads at once.
pub struct Jit<B: Backend> {
    backend: B,
    cache: KernelCache<B::Module>,
    config: JitConfig,
}

impl<B: Backend> Jit<B> {
    /// An engine over `backend`. The backend should have been built from the
    /// same `config`; see [`JitConfig::from_env`] for the usual source.
    pub fn new(backend: B, config: JitConfig) -> Self {
        Self {
            backend,
            cache: KernelCache::new(),
            config,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn cache(&self) -> &KernelCache<B::Module> {
        &self.cache
    }

    pub fn config(&self) -> &JitConfig {
        &self.config
    }

    /// Evaluate `node` into `output`.
    pub fn eval_node(&self, output: &Param, node: &NodeRef) -> Result<()> {
        self.eval_nodes(std::slice::from_ref(output), std::slice::from_ref(node))
    }

    /// Evaluate `nodes[i]` into `outputs[i]` with a single fused kernel, using
    /// this thread's scratch workspace.
    pub fn eval_nodes(&self, outputs: &[Param], nodes: &[NodeRef]) -> Result<()> {
        WORKSPACE.with(|ws| self.eval_nodes_with(&mut ws.borrow_mut(), outputs, nodes))
    }

    /// Like [`Jit::eval_nodes`], with caller-provided scratch state. The
    /// workspace is empty again when this returns, error or not.
    ///
    /// The launch is only enqueued; completion is up to the caller's stream
    /// synchronization.
    #[tracing::instrument(skip_all)]
    pub fn eval_nodes_with(
        &self,
        ws: &mut Workspace,
        outputs: &[Param],
        nodes: &[NodeRef],
    ) -> Result<()> {
        ws.reset();
        let result = self.eval_in(ws, outputs, nodes);
        ws.reset();
        result
    }

    fn eval_in(&self, ws: &mut Workspace, outputs: &[Param], nodes: &[NodeRef]) -> Result<()> {
        if outputs.len() != nodes.len() {
            return Err(JitError::OutputCountMismatch {
                outputs: outputs.len(),
                nodes: nodes.len(),
            });
        }
        let Some(first) = outputs.first() else {
            return Ok(());
        };
        if first.elements() == 0 {
            return Ok(());
        }
        check_output_layouts(outputs)?;

        ws.flatten(nodes);
        let graph = EvalGraph::from_workspace(ws);

        // Outputs are written with the same index as operands are read, so a
        // flat index also needs flat outputs
        let out_dims = first.dims;
        let is_linear = graph.is_linear(&out_dims) && outputs.iter().all(Param::is_contiguous);

        let name = kernel_name(&graph, is_linear);
        let device = self.backend.active_device_id();
        let kernel = self.cache.get_or_compile(device, &name, || {
            let source = kernel_source(&name, &graph, is_linear);
            tracing::debug!(
                "compiling {name}: {} nodes, {} outputs, linear: {is_linear}",
                graph.nodes().len(),
                outputs.len()
            );
            if let Some(dir) = &self.config.kernel_dump_dir {
                dump_kernel(dir, &source);
            }
            Ok(CachedKernel {
                module: self.backend.compile(device, &source)?,
                name: name.clone(),
                param_count: source.param_count,
            })
        })?;
        let function = self.backend.resolve_function(&kernel.module, &kernel.name)?;

        let limits = self.backend.grid_limits(device)?;
        let plan = plan_launch(&out_dims, is_linear, &limits)?;
        let mut args = assemble_args(&graph, outputs, &plan, kernel.param_count);
        tracing::trace!(
            blocks = ?plan.blocks,
            threads = ?plan.threads,
            repeat = plan.repeat,
            "launching {name}"
        );
        self.backend.launch(&function, &plan, &mut args)
    }
}

/// Every output is written at the index computed from the first one, so all of
/// them must have its dims and, wherever a dim spans more than one element,
/// its strides.
fn check_output_layouts(outputs: &[Param]) -> Result<()> {
    let first = &outputs[0];
    for (index, out) in outputs.iter().enumerate().skip(1) {
        if out.dims != first.dims {
            return Err(JitError::OutputShapeMismatch {
                index,
                expected: first.dims,
                found: out.dims,
            });
        }
        let same_strides =
            (0..4).all(|d| first.dims[d] == 1 || out.strides[d] == first.strides[d]);
        if !same_strides {
            return Err(JitError::OutputStrideMismatch {
                index,
                expected: first.strides,
                found: out.strides,
            });
        }
    }
    Ok(())
}
