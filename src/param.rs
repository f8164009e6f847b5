/// Four-dimensional extents or strides, innermost dimension first.
pub type Dim4 = [i64; 4];

/// Raw device address of an array's first element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DevicePtr(pub u64);

/// Device-visible layout of one array. Strides are counted in elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Param {
    pub dims: Dim4,
    pub strides: Dim4,
    pub ptr: DevicePtr,
}

impl Param {
    pub fn new(dims: Dim4, strides: Dim4, ptr: DevicePtr) -> Self {
        Self { dims, strides, ptr }
    }

    /// A densely packed array of the given dims.
    pub fn contiguous(dims: Dim4, ptr: DevicePtr) -> Self {
        Self::new(dims, calc_strides(&dims), ptr)
    }

    pub fn elements(&self) -> i64 {
        self.dims.iter().product()
    }

    /// Whether a single flat index addresses this array in row-major order.
    /// Strides of size-1 dimensions are never used and so don't matter.
    pub fn is_contiguous(&self) -> bool {
        let dense = calc_strides(&self.dims);
        self.dims
            .iter()
            .zip(self.strides.iter().zip(dense))
            .all(|(&d, (&s, expected))| d == 1 || s == expected)
    }

    pub(crate) fn raw(&self) -> RawParam {
        RawParam {
            dims: self.dims,
            strides: self.strides,
            ptr: self.ptr.0,
        }
    }
}

/// Strides of a densely packed array with the given dims.
pub fn calc_strides(dims: &Dim4) -> Dim4 {
    let mut strides = [1; 4];
    for i in 1..4 {
        strides[i] = strides[i - 1] * dims[i - 1];
    }
    strides
}

/// Byte-for-byte image of the generated `Param<T>` struct
/// (`dim_t dims[4]; dim_t strides[4]; T *ptr;` with `dim_t = long long`).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawParam {
    pub dims: Dim4,
    pub strides: Dim4,
    pub ptr: u64,
}
