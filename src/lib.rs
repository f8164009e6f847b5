//! Fuses lazily-built graphs of elementwise array operations into a single
//! device kernel, caches the compiled binary by graph structure and launches it.
//!
//! The pipeline for one evaluation is:
//! flatten (dedup by identity) -> normalize reshapes on a private clone ->
//! classify addressing -> generate source or hit the kernel cache ->
//! plan the launch grid -> marshal arguments and launch.

pub mod backend;
pub mod cache;
pub mod codegen;
pub mod config;
pub mod dispatch;
pub mod dtype;
pub mod error;
pub mod flatten;
pub mod jit;
pub mod launch;
pub mod node;
pub mod normalize;
pub mod param;

#[cfg(test)]
mod tests;

pub use error::{JitError, Result};

pub mod prelude {
    pub use crate::backend::*;
    pub use crate::cache::*;
    pub use crate::codegen::*;
    pub use crate::config::*;
    pub use crate::dispatch::*;
    pub use crate::dtype::*;
    pub use crate::error::*;
    pub use crate::flatten::*;
    pub use crate::jit::*;
    pub use crate::launch::*;
    pub use crate::node::*;
    pub use crate::normalize::*;
    pub use crate::param::*;
}
