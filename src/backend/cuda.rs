use std::sync::Arc;

use cudarc::{
    driver::{sys::CUdevice_attribute, CudaDevice, CudaFunction, LaunchAsync, LaunchConfig},
    nvrtc::{compile_ptx_with_opts, CompileOptions},
};

use crate::{
    codegen::KernelSource,
    config::JitConfig,
    dispatch::KernelArgs,
    error::{JitError, Result},
    jit::Jit,
    launch::{GridLimits, LaunchPlan},
};

use super::Backend;

/// Handle to a module loaded into a [`CudaDevice`]. The device owns the
/// module itself, keyed by this name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CudaModule {
    pub name: String,
}

/// Compiles with NVRTC and launches through the driver API on one device.
#[derive(Debug, Clone)]
pub struct CudaBackend {
    device: Arc<CudaDevice>,
    arch: Option<&'static str>,
    include_paths: Vec<String>,
}

impl CudaBackend {
    pub fn new(device: Arc<CudaDevice>, config: &JitConfig) -> Self {
        Self {
            device,
            // Compile options want a 'static arch string; configs are created
            // once per backend.
            arch: config
                .cuda_arch
                .clone()
                .map(|a| &*Box::leak(a.into_boxed_str())),
            include_paths: config.include_paths.clone(),
        }
    }

    pub fn device(&self) -> &Arc<CudaDevice> {
        &self.device
    }

    fn check_device(&self, device: usize) -> Result<()> {
        if device != self.device.ordinal() {
            return Err(JitError::Device(format!(
                "backend drives device {}, got a request for device {device}",
                self.device.ordinal()
            )));
        }
        Ok(())
    }

    fn attribute(&self, attrib: CUdevice_attribute) -> Result<u64> {
        self.device
            .attribute(attrib)
            .map(|v| v as u64)
            .map_err(|e| JitError::Device(e.to_string()))
    }
}

impl Backend for CudaBackend {
    type Module = CudaModule;
    type Function = CudaFunction;

    fn active_device_id(&self) -> usize {
        self.device.ordinal()
    }

    fn grid_limits(&self, device: usize) -> Result<GridLimits> {
        self.check_device(device)?;
        Ok(GridLimits {
            max_x: self.attribute(CUdevice_attribute::CU_DEVICE_ATTRIBUTE_MAX_GRID_DIM_X)?,
            max_y: self.attribute(CUdevice_attribute::CU_DEVICE_ATTRIBUTE_MAX_GRID_DIM_Y)?,
            max_z: self.attribute(CUdevice_attribute::CU_DEVICE_ATTRIBUTE_MAX_GRID_DIM_Z)?,
        })
    }

    fn compile(&self, device: usize, kernel: &KernelSource) -> Result<CudaModule> {
        self.check_device(device)?;
        let ptx = compile_ptx_with_opts(
            &kernel.source,
            CompileOptions {
                arch: self.arch,
                include_paths: self.include_paths.clone(),
                ..Default::default()
            },
        )
        .map_err(|e| JitError::Compile {
            name: kernel.name.clone(),
            msg: e.to_string(),
        })?;
        // Modules live as long as the device, as do their function names
        let func: &'static str = kernel.name.clone().leak();
        self.device
            .load_ptx(ptx, &kernel.name, &[func])
            .map_err(|e| JitError::ModuleLoad {
                name: kernel.name.clone(),
                msg: e.to_string(),
            })?;
        Ok(CudaModule {
            name: kernel.name.clone(),
        })
    }

    fn resolve_function(&self, module: &CudaModule, name: &str) -> Result<CudaFunction> {
        self.device
            .get_func(&module.name, name)
            .ok_or_else(|| JitError::FunctionNotFound(name.to_string()))
    }

    fn launch(
        &self,
        function: &CudaFunction,
        plan: &LaunchPlan,
        args: &mut KernelArgs,
    ) -> Result<()> {
        let cfg = LaunchConfig {
            grid_dim: plan.blocks,
            block_dim: plan.threads,
            shared_mem_bytes: 0,
        };
        let mut params = args.as_kernel_params();
        unsafe { function.clone().launch(cfg, &mut params[..]) }
            .map_err(|e| JitError::Launch(e.to_string()))
    }
}

impl Jit<CudaBackend> {
    /// An engine on `device` whose compiler options and kernel dumps both come
    /// from `config`.
    pub fn cuda(device: Arc<CudaDevice>, config: JitConfig) -> Self {
        Jit::new(CudaBackend::new(device, &config), config)
    }
}
