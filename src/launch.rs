use crate::{
    error::{JitError, Result},
    param::Dim4,
};

/// Threads per block when every operand shares the output's flat layout.
pub const LINEAR_THREADS: u32 = 256;
/// Block shape (x, y) for 4-D addressing.
pub const GENERAL_THREADS: (u32, u32) = (32, 8);

/// Largest grid a device accepts along each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridLimits {
    pub max_x: u64,
    pub max_y: u64,
    pub max_z: u64,
}

impl Default for GridLimits {
    fn default() -> Self {
        Self {
            max_x: i32::MAX as u64,
            max_y: 65535,
            max_z: 65535,
        }
    }
}

/// Launch geometry of one fused kernel plus the bookkeeping values the kernel
/// uses to turn block ids back into element indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchPlan {
    pub threads: (u32, u32, u32),
    pub blocks: (u32, u32, u32),
    /// Blocks spanning dim 0 (general addressing only, 1 otherwise).
    pub blocks_x: u32,
    /// Blocks spanning dim 1 (general addressing only, 1 otherwise).
    pub blocks_y: u32,
    /// Logical blocks along x, covered by `blocks.0` launched blocks looping
    /// `repeat` times.
    pub blocks_x_total: u32,
    pub num_odims: u32,
    pub repeat: u32,
}

fn divup(a: u64, b: u64) -> u64 {
    (a + b - 1) / b
}

fn to_u32(v: u64, what: &str) -> Result<u32> {
    u32::try_from(v).map_err(|_| JitError::LaunchConfig(format!("{what} = {v} overflows u32")))
}

/// Number of output dimensions left after dropping trailing size-1 ones.
pub fn num_odims(dims: &Dim4) -> u32 {
    dims.iter().rposition(|&d| d != 1).map_or(0, |i| i as u32 + 1)
}

/// Pick the grid for an output of `dims`. When the natural grid is wider than
/// the device allows, the kernel's grid-stride loop covers the rest: the
/// launched grid never exceeds `limits` and every element is visited once.
pub fn plan_launch(dims: &Dim4, is_linear: bool, limits: &GridLimits) -> Result<LaunchPlan> {
    if limits.max_x == 0 || limits.max_y == 0 || limits.max_z == 0 {
        return Err(JitError::LaunchConfig(format!(
            "grid limits {limits:?} leave no room for a block"
        )));
    }
    if dims.iter().any(|&d| d <= 0) {
        return Err(JitError::LaunchConfig(format!(
            "output dims {dims:?} contain no elements"
        )));
    }
    let d = dims.map(|d| d as u64);

    let (threads, blocks_x, blocks_y, blocks_x_total, grid_y, grid_z) = if is_linear {
        let total = d.iter().product::<u64>();
        let blocks_x_total = divup(total, LINEAR_THREADS as u64);
        ((LINEAR_THREADS, 1), 1, 1, blocks_x_total, 1, 1)
    } else {
        let (tx, ty) = GENERAL_THREADS;
        let bx = divup(d[0], tx as u64);
        let by = divup(d[1], ty as u64);
        // Dims 2 and 3 are folded into the x and y axes
        let blocks_x_total = bx * d[2];
        let folded_y = by * d[3];
        let grid_z = divup(folded_y, limits.max_y);
        let grid_y = divup(folded_y, grid_z);
        ((tx, ty), bx, by, blocks_x_total, grid_y, grid_z)
    };
    let repeat = divup(blocks_x_total, limits.max_x);
    let grid_x = divup(blocks_x_total, repeat);

    if grid_z > limits.max_z {
        return Err(JitError::LaunchConfig(format!(
            "{grid_z} blocks along z exceed the device limit of {}",
            limits.max_z
        )));
    }

    Ok(LaunchPlan {
        threads: (threads.0, threads.1, 1),
        blocks: (
            to_u32(grid_x, "grid x")?,
            to_u32(grid_y, "grid y")?,
            to_u32(grid_z, "grid z")?,
        ),
        blocks_x: to_u32(blocks_x, "blocks_x")?,
        blocks_y: to_u32(blocks_y, "blocks_y")?,
        blocks_x_total: to_u32(blocks_x_total, "blocks_x_total")?,
        num_odims: num_odims(dims),
        repeat: to_u32(repeat, "repeat")?,
    })
}
