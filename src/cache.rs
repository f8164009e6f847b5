use std::{
    hash::{Hash, Hasher},
    sync::Arc,
};

use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHasher};

use crate::error::Result;

/// Deterministic, non-cryptographic hash. Unlike the std `DefaultHasher` its
/// output doesn't change between runs, so dumped kernel names stay stable.
pub fn hash<T: Hash>(obj: T) -> u64 {
    let mut hasher = FxHasher::default();
    obj.hash(&mut hasher);
    hasher.finish()
}

/// A compiled kernel module and what's needed to launch the kernel in it.
#[derive(Debug)]
pub struct CachedKernel<M> {
    pub module: M,
    pub name: String,
    /// Parameters declared by the kernel signature.
    pub param_count: usize,
}

/// Compiled kernels keyed by `(device, hash of kernel name)`.
///
/// Lookups only take a read lock. Compiling happens under a single mutex that
/// re-checks the map first, so racing misses on the same key produce exactly
/// one module and every caller gets that same entry.
#[derive(Debug)]
pub struct KernelCache<M> {
    modules: RwLock<FxHashMap<(usize, u64), Arc<CachedKernel<M>>>>,
    compile_lock: Mutex<()>,
}

impl<M> Default for KernelCache<M> {
    fn default() -> Self {
        Self {
            modules: RwLock::new(FxHashMap::default()),
            compile_lock: Mutex::new(()),
        }
    }
}

impl<M> KernelCache<M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(&self, device: usize, key: u64) -> Option<Arc<CachedKernel<M>>> {
        self.modules.read().get(&(device, key)).cloned()
    }

    /// Return the kernel called `name` on `device`, running `compile` to build
    /// and register it if it isn't cached yet. A failed compile registers
    /// nothing.
    pub fn get_or_compile(
        &self,
        device: usize,
        name: &str,
        compile: impl FnOnce() -> Result<CachedKernel<M>>,
    ) -> Result<Arc<CachedKernel<M>>> {
        let key = hash(name);
        if let Some(entry) = self.find(device, key) {
            debug_assert_eq!(entry.name, name, "kernel name hash collision");
            return Ok(entry);
        }

        let _guard = self.compile_lock.lock();
        // Another thread may have compiled it while we waited
        if let Some(entry) = self.find(device, key) {
            return Ok(entry);
        }
        let entry = Arc::new(compile()?);
        self.modules.write().insert((device, key), entry.clone());
        Ok(entry)
    }

    pub fn len(&self) -> usize {
        self.modules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.modules.write().clear();
    }
}
