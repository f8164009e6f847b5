use crate::{dtype::DType, node::MAX_CHILDREN};

pub type Result<T> = std::result::Result<T, JitError>;

/// Everything that can go wrong while fusing and launching a kernel.
#[derive(Debug, thiserror::Error)]
pub enum JitError {
    #[error("node was given {0} children, at most {max} are supported", max = MAX_CHILDREN)]
    TooManyChildren(usize),

    #[error("{nodes} output nodes were given for {outputs} output buffers")]
    OutputCountMismatch { outputs: usize, nodes: usize },

    #[error("output {index} has dims {found:?}, expected {expected:?} like the first output")]
    OutputShapeMismatch {
        index: usize,
        expected: [i64; 4],
        found: [i64; 4],
    },

    #[error("output {index} has strides {found:?}, expected {expected:?} like the first output")]
    OutputStrideMismatch {
        index: usize,
        expected: [i64; 4],
        found: [i64; 4],
    },

    #[error("operator `{op}` does not support element type {dtype}")]
    UnsupportedType { op: &'static str, dtype: DType },

    #[error("operator `{op}` expects operands of type {expected}, got {found}")]
    TypeMismatch {
        op: &'static str,
        expected: DType,
        found: DType,
    },

    #[error("kernel `{name}` failed to compile: {msg}")]
    Compile { name: String, msg: String },

    #[error("failed to load module for kernel `{name}`: {msg}")]
    ModuleLoad { name: String, msg: String },

    #[error("function `{0}` not found in its compiled module")]
    FunctionNotFound(String),

    #[error("launch configuration exceeds device limits: {0}")]
    LaunchConfig(String),

    #[error("kernel launch failed: {0}")]
    Launch(String),

    #[error("device error: {0}")]
    Device(String),
}
