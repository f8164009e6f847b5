//! Renders a normalized graph into the source of one fused kernel.
//!
//! Everything here is a pure function of the graph's structure and the
//! addressing mode: buffer addresses and scalar values only ever reach the
//! kernel as launch arguments, so isomorphic graphs produce byte-identical
//! source and share one cache entry.

use std::{fmt::Write, path::Path};

use itertools::Itertools;

use crate::{cache::hash, dtype::DType, normalize::EvalGraph};

/// Kernel grid bookkeeping parameters, always last in the signature.
pub const GRID_PARAMS: [&str; 4] = [
    "uint blocks_x",
    "uint blocks_y",
    "uint blocks_x_total",
    "uint num_odims",
];

const TYPEDEFS: &str = "typedef unsigned int uint;
typedef unsigned char uchar;
typedef unsigned short ushort;
typedef long long dim_t;
";

const HELPERS: &str = "#define jit_neg(a) (-(a))
#define jit_not(a) (!(a))
#define jit_iabs(a) (((a) < 0) ? -(a) : (a))
#define jit_add(a, b) ((a) + (b))
#define jit_sub(a, b) ((a) - (b))
#define jit_mul(a, b) ((a) * (b))
#define jit_div(a, b) ((a) / (b))
#define jit_rem(a, b) ((a) % (b))
#define jit_min(a, b) (((a) < (b)) ? (a) : (b))
#define jit_max(a, b) (((a) > (b)) ? (a) : (b))
#define jit_lt(a, b) ((a) < (b))
#define jit_le(a, b) ((a) <= (b))
#define jit_gt(a, b) ((a) > (b))
#define jit_ge(a, b) ((a) >= (b))
#define jit_eq(a, b) ((a) == (b))
#define jit_ne(a, b) ((a) != (b))
#define jit_and(a, b) ((a) && (b))
#define jit_or(a, b) ((a) || (b))
#define jit_select(c, a, b) ((c) ? (a) : (b))
";

/// Complex values are float2/double2 pairs `{x: re, y: im}`.
const COMPLEX_HELPERS: &str = r#"typedef float2 cfloat;
typedef double2 cdouble;

__device__ inline cfloat jit_cmake(float re, float im) { cfloat v = {re, im}; return v; }
__device__ inline cdouble jit_cmake(double re, double im) { cdouble v = {re, im}; return v; }

#define JIT_COMPLEX_OPS(T) \
__device__ inline T jit_cadd(T a, T b) { return jit_cmake(a.x + b.x, a.y + b.y); } \
__device__ inline T jit_csub(T a, T b) { return jit_cmake(a.x - b.x, a.y - b.y); } \
__device__ inline T jit_cmul(T a, T b) { \
    return jit_cmake(a.x * b.x - a.y * b.y, a.x * b.y + a.y * b.x); \
} \
__device__ inline T jit_cdiv(T a, T b) { \
    auto d = b.x * b.x + b.y * b.y; \
    return jit_cmake((a.x * b.x + a.y * b.y) / d, (a.y * b.x - a.x * b.y) / d); \
} \
__device__ inline T jit_cneg(T a) { return jit_cmake(-a.x, -a.y); }

JIT_COMPLEX_OPS(cfloat)
JIT_COMPLEX_OPS(cdouble)
"#;

const PARAM_STRUCT: &str = "template<typename T>
struct Param {
    dim_t dims[4];
    dim_t strides[4];
    T *ptr;
};
";

const LOOP_START: &str = "    for (uint blockIdx_x = blockIdx.x; blockIdx_x < blocks_x_total; blockIdx_x += gridDim.x) {
";

const LINEAR_INDEX: &str = "        uint threadId = threadIdx.x;
        long long idx = (long long)blockIdx_x * blockDim.x * blockDim.y + threadId;
        if (idx >= outref.dims[0] * outref.dims[1] * outref.dims[2] * outref.dims[3]) return;
";

const GENERAL_INDEX: &str = "        long long id0 = 0, id1 = 0, id2 = 0, id3 = 0;
        long long blockIdx_y = (long long)blockIdx.z * gridDim.y + blockIdx.y;
        if (num_odims > 2) {
            id2 = blockIdx_x / blocks_x;
            id0 = blockIdx_x - id2 * blocks_x;
            id0 = threadIdx.x + id0 * blockDim.x;
            if (num_odims > 3) {
                id3 = blockIdx_y / blocks_y;
                id1 = blockIdx_y - id3 * blocks_y;
                id1 = threadIdx.y + id1 * blockDim.y;
            } else {
                id1 = threadIdx.y + blockDim.y * blockIdx_y;
            }
        } else {
            id1 = threadIdx.y + blockDim.y * blockIdx_y;
            id0 = threadIdx.x + (long long)blockDim.x * blockIdx_x;
        }

        bool cond = id0 < outref.dims[0] &&
                    id1 < outref.dims[1] &&
                    id2 < outref.dims[2] &&
                    id3 < outref.dims[3];
        if (!cond) { continue; }

        long long idx = outref.strides[3] * id3 +
                        outref.strides[2] * id2 +
                        outref.strides[1] * id1 +
                        outref.strides[0] * id0;
";

/// Generated kernel text plus what the dispatcher needs to check against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelSource {
    pub name: String,
    pub source: String,
    /// Number of parameters in the kernel signature.
    pub param_count: usize,
}

/// Name of the kernel for `graph` in the given addressing mode: a hash of the
/// graph's structure, element types and output selection.
pub fn kernel_name(graph: &EvalGraph, is_linear: bool) -> String {
    let mut sig = String::with_capacity(512);
    sig.push(if is_linear { 'L' } else { 'G' });
    for &id in graph.output_ids() {
        write!(sig, "_o{id}{}", graph.nodes()[id].dtype).unwrap();
    }
    for node in graph.nodes() {
        node.op.gen_ker_name(&mut sig, node.dtype, &node.ids);
    }
    format!("KER{}", hash(&sig))
}

/// Render the fused kernel `name` for `graph`.
pub fn kernel_source(name: &str, graph: &EvalGraph, is_linear: bool) -> KernelSource {
    let mut params = vec![];
    let mut offsets = String::new();
    let mut ops = String::new();
    for node in graph.nodes() {
        node.op.gen_params(&mut params, node.ids.id, node.dtype);
        node.op
            .gen_offsets(&mut offsets, node.ids.id, node.dtype, is_linear);
        node.op.gen_funcs(&mut ops, node.dtype, &node.ids);
    }

    let out_type = |id: usize| graph.nodes()[id].dtype.type_str();
    let mut writes = String::new();
    for (k, &id) in graph.output_ids().iter().enumerate() {
        params.push(format!("Param<{}> out{k}", out_type(id)));
        writeln!(writes, "        out{k}.ptr[idx] = val{id};").unwrap();
    }
    params.extend(GRID_PARAMS.iter().map(|p| p.to_string()));

    let mut src = String::new();
    if graph.nodes().iter().any(|n| n.dtype == DType::F16) {
        src.push_str("#include <cuda_fp16.h>\n");
    }
    src.push_str(TYPEDEFS);
    src.push('\n');
    src.push_str(HELPERS);
    src.push('\n');
    if graph.nodes().iter().any(|n| n.dtype.is_complex()) {
        src.push_str(COMPLEX_HELPERS);
        src.push('\n');
    }
    src.push_str(PARAM_STRUCT);
    src.push('\n');
    writeln!(
        src,
        "extern \"C\" __global__ void\n{name}(\n    {})\n{{",
        params.iter().join(",\n    ")
    )
    .unwrap();
    writeln!(
        src,
        "    const Param<{}> &outref = out0;",
        out_type(graph.output_ids()[0])
    )
    .unwrap();
    src.push_str(LOOP_START);
    src.push_str(if is_linear {
        LINEAR_INDEX
    } else {
        GENERAL_INDEX
    });
    src.push_str(&offsets);
    src.push_str(&ops);
    src.push_str(&writes);
    src.push_str("    }\n}\n");

    KernelSource {
        name: name.to_string(),
        param_count: params.len(),
        source: src,
    }
}

/// Write `kernel` to `<dir>/<name>.cu` for inspection. Failures are logged and
/// otherwise ignored.
pub fn dump_kernel(dir: &Path, kernel: &KernelSource) {
    let path = dir.join(format!("{}.cu", kernel.name));
    if path.exists() {
        return;
    }
    if let Err(e) = std::fs::create_dir_all(dir).and_then(|_| std::fs::write(&path, &kernel.source))
    {
        tracing::warn!("couldn't save kernel source to {}: {e}", path.display());
    }
}
