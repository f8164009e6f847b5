use std::path::PathBuf;

pub const DUMP_DIR_VAR: &str = "FUSION_JIT_DUMP_DIR";
pub const CUDA_ARCH_VAR: &str = "FUSION_JIT_CUDA_ARCH";
pub const INCLUDE_PATHS_VAR: &str = "FUSION_JIT_INCLUDE_PATHS";

/// Knobs of the JIT engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JitConfig {
    /// When set, every newly compiled kernel's source is saved here as
    /// `<name>.cu`.
    pub kernel_dump_dir: Option<PathBuf>,
    /// Virtual architecture passed to the device compiler, e.g. `sm_75`.
    pub cuda_arch: Option<String>,
    pub include_paths: Vec<String>,
}

impl Default for JitConfig {
    fn default() -> Self {
        Self {
            kernel_dump_dir: None,
            cuda_arch: Some("sm_75".to_string()),
            include_paths: vec!["/usr/local/cuda/include".to_string()],
        }
    }
}

impl JitConfig {
    /// Defaults overridden by the `FUSION_JIT_*` environment variables. An
    /// empty `FUSION_JIT_CUDA_ARCH` leaves the architecture to the compiler;
    /// `FUSION_JIT_INCLUDE_PATHS` is a `:`-separated list.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(dir) = var(DUMP_DIR_VAR).filter(|d| !d.is_empty()) {
            config.kernel_dump_dir = Some(PathBuf::from(dir));
        }
        if let Some(arch) = var(CUDA_ARCH_VAR) {
            config.cuda_arch = Some(arch).filter(|a| !a.is_empty());
        }
        if let Some(paths) = var(INCLUDE_PATHS_VAR) {
            config.include_paths = paths
                .split(':')
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
        }
        config
    }
}
