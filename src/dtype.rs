use half::f16;
use num::complex::{Complex32, Complex64};
use strum::{Display, EnumIter};

/// Element types a fused kernel can operate on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum DType {
    F32,
    F64,
    F16,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    Bool,
    C32,
    C64,
}

impl DType {
    /// The device-side spelling of this type in generated source.
    pub fn type_str(self) -> &'static str {
        match self {
            DType::F32 => "float",
            DType::F64 => "double",
            DType::F16 => "__half",
            DType::I8 => "signed char",
            DType::U8 => "uchar",
            DType::I16 => "short",
            DType::U16 => "ushort",
            DType::I32 => "int",
            DType::U32 => "uint",
            DType::I64 => "long long",
            DType::U64 => "unsigned long long",
            // Booleans travel as bytes
            DType::Bool => "char",
            DType::C32 => "cfloat",
            DType::C64 => "cdouble",
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, DType::F32 | DType::F64 | DType::F16)
    }

    pub fn is_complex(self) -> bool {
        matches!(self, DType::C32 | DType::C64)
    }

    /// Real type of each half of a complex type.
    pub fn component(self) -> Option<DType> {
        match self {
            DType::C32 => Some(DType::F32),
            DType::C64 => Some(DType::F64),
            _ => None,
        }
    }
}

/// A host value that is passed to a kernel by value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    F32(f32),
    F64(f64),
    F16(f16),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    Bool(bool),
    C32(Complex32),
    C64(Complex64),
}

impl Scalar {
    pub fn dtype(&self) -> DType {
        match self {
            Scalar::F32(_) => DType::F32,
            Scalar::F64(_) => DType::F64,
            Scalar::F16(_) => DType::F16,
            Scalar::I8(_) => DType::I8,
            Scalar::U8(_) => DType::U8,
            Scalar::I16(_) => DType::I16,
            Scalar::U16(_) => DType::U16,
            Scalar::I32(_) => DType::I32,
            Scalar::U32(_) => DType::U32,
            Scalar::I64(_) => DType::I64,
            Scalar::U64(_) => DType::U64,
            Scalar::Bool(_) => DType::Bool,
            Scalar::C32(_) => DType::C32,
            Scalar::C64(_) => DType::C64,
        }
    }

    /// Pointer to the value's bytes, in the form kernel launch APIs expect.
    pub(crate) fn as_kernel_param(&mut self) -> *mut std::ffi::c_void {
        match self {
            Scalar::F32(v) => v as *mut f32 as *mut _,
            Scalar::F64(v) => v as *mut f64 as *mut _,
            Scalar::F16(v) => v as *mut f16 as *mut _,
            Scalar::I8(v) => v as *mut i8 as *mut _,
            Scalar::U8(v) => v as *mut u8 as *mut _,
            Scalar::I16(v) => v as *mut i16 as *mut _,
            Scalar::U16(v) => v as *mut u16 as *mut _,
            Scalar::I32(v) => v as *mut i32 as *mut _,
            Scalar::U32(v) => v as *mut u32 as *mut _,
            Scalar::I64(v) => v as *mut i64 as *mut _,
            Scalar::U64(v) => v as *mut u64 as *mut _,
            Scalar::Bool(v) => v as *mut bool as *mut _,
            // `Complex<T>` is repr(C) { re, im }, the layout of float2/double2
            Scalar::C32(v) => v as *mut Complex32 as *mut _,
            Scalar::C64(v) => v as *mut Complex64 as *mut _,
        }
    }
}

/// Host types with a device counterpart.
pub trait JitType: Copy + Send + Sync + 'static {
    const DTYPE: DType;
}

macro_rules! jit_type {
    ($t:ty, $variant:ident) => {
        impl JitType for $t {
            const DTYPE: DType = DType::$variant;
        }

        impl From<$t> for Scalar {
            fn from(v: $t) -> Self {
                Scalar::$variant(v)
            }
        }
    };
}

jit_type!(f32, F32);
jit_type!(f64, F64);
jit_type!(f16, F16);
jit_type!(i8, I8);
jit_type!(u8, U8);
jit_type!(i16, I16);
jit_type!(u16, U16);
jit_type!(i32, I32);
jit_type!(u32, U32);
jit_type!(i64, I64);
jit_type!(u64, U64);
jit_type!(bool, Bool);
jit_type!(Complex32, C32);
jit_type!(Complex64, C64);
