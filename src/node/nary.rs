use std::{any::Any, fmt::Write};

use strum::{EnumIter, IntoStaticStr};

use crate::{
    dtype::DType,
    error::{JitError, Result},
};

use super::{JitOp, Node, NodeIds, NodeRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum UnaryOp {
    Neg,
    Not,
    Abs,
    Sqrt,
    Exp,
    Log,
    Sin,
    Cos,
    Tanh,
    Floor,
    Ceil,
    Recip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Min,
    Max,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinaryOp {
    fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Eq | BinaryOp::Ne
        )
    }
}

/// Which computation an interior node performs on its operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaryKind {
    Unary(UnaryOp),
    Binary(BinaryOp),
    /// `cond ? a : b`, operands in that order.
    Select,
    /// Conversion from the given type to the node's type.
    Cast(DType),
}

/// An elementwise operation over the values of its children.
#[derive(Debug, Clone)]
pub struct NaryOp {
    pub kind: NaryKind,
}

impl Node {
    pub fn unary(op: UnaryOp, a: &NodeRef) -> Result<NodeRef> {
        let dtype = a.dtype();
        let supported = match op {
            UnaryOp::Not => dtype == DType::Bool,
            UnaryOp::Neg => !matches!(
                dtype,
                DType::Bool | DType::U8 | DType::U16 | DType::U32 | DType::U64
            ),
            UnaryOp::Abs => dtype != DType::Bool && !dtype.is_complex(),
            _ => dtype.is_float(),
        };
        if !supported {
            return Err(JitError::UnsupportedType {
                op: op.into(),
                dtype,
            });
        }
        Node::new(
            dtype,
            NaryOp {
                kind: NaryKind::Unary(op),
            },
            &[a.clone()],
        )
    }

    pub fn binary(op: BinaryOp, a: &NodeRef, b: &NodeRef) -> Result<NodeRef> {
        let dtype = a.dtype();
        if b.dtype() != dtype {
            return Err(JitError::TypeMismatch {
                op: op.into(),
                expected: dtype,
                found: b.dtype(),
            });
        }
        let supported = match op {
            _ if dtype.is_complex() => matches!(
                op,
                BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div
            ),
            BinaryOp::And | BinaryOp::Or => dtype == DType::Bool,
            BinaryOp::Pow => dtype.is_float(),
            _ => dtype != DType::Bool || matches!(op, BinaryOp::Eq | BinaryOp::Ne),
        };
        if !supported {
            return Err(JitError::UnsupportedType {
                op: op.into(),
                dtype,
            });
        }
        let out = if op.is_comparison() {
            DType::Bool
        } else {
            dtype
        };
        Node::new(
            out,
            NaryOp {
                kind: NaryKind::Binary(op),
            },
            &[a.clone(), b.clone()],
        )
    }

    pub fn select(cond: &NodeRef, a: &NodeRef, b: &NodeRef) -> Result<NodeRef> {
        if cond.dtype() != DType::Bool {
            return Err(JitError::TypeMismatch {
                op: "select",
                expected: DType::Bool,
                found: cond.dtype(),
            });
        }
        if a.dtype() != b.dtype() {
            return Err(JitError::TypeMismatch {
                op: "select",
                expected: a.dtype(),
                found: b.dtype(),
            });
        }
        Node::new(
            a.dtype(),
            NaryOp {
                kind: NaryKind::Select,
            },
            &[cond.clone(), a.clone(), b.clone()],
        )
    }

    pub fn cast(a: &NodeRef, to: DType) -> Result<NodeRef> {
        // Dropping the imaginary part has to be asked for explicitly
        if a.dtype().is_complex() && !to.is_complex() {
            return Err(JitError::UnsupportedType {
                op: "cast",
                dtype: a.dtype(),
            });
        }
        Node::new(
            to,
            NaryOp {
                kind: NaryKind::Cast(a.dtype()),
            },
            &[a.clone()],
        )
    }
}

/// Render a float math function. `f64` picks the double precision spelling.
fn float_math(op: UnaryOp, x: &str, f64: bool) -> String {
    let suffix = if f64 { "" } else { "f" };
    match op {
        UnaryOp::Recip => format!("(1.0{suffix} / ({x}))"),
        UnaryOp::Abs => format!("fabs{suffix}({x})"),
        _ => {
            let name: &'static str = op.into();
            format!("{name}{suffix}({x})")
        }
    }
}

fn render_unary(op: UnaryOp, dtype: DType, x: &str) -> String {
    match (op, dtype) {
        (UnaryOp::Neg, d) if d.is_complex() => format!("jit_cneg({x})"),
        (UnaryOp::Not, _) => format!("jit_not({x})"),
        (UnaryOp::Neg, _) => format!("jit_neg({x})"),
        (UnaryOp::Abs, d) if !d.is_float() => format!("jit_iabs({x})"),
        // Half precision math goes through float
        (_, DType::F16) => format!(
            "__float2half({})",
            float_math(op, &format!("__half2float({x})"), false)
        ),
        (_, d) => float_math(op, x, d == DType::F64),
    }
}

fn render_binary(op: BinaryOp, dtype: DType, a: &str, b: &str) -> String {
    match op {
        BinaryOp::Rem | BinaryOp::Pow if dtype.is_float() => {
            let name = if op == BinaryOp::Rem { "fmod" } else { "pow" };
            match dtype {
                DType::F64 => format!("{name}({a}, {b})"),
                DType::F32 => format!("{name}f({a}, {b})"),
                _ => format!("__float2half({name}f(__half2float({a}), __half2float({b})))"),
            }
        }
        _ => {
            let name: &'static str = op.into();
            let c = if dtype.is_complex() { "c" } else { "" };
            format!("jit_{c}{name}({a}, {b})")
        }
    }
}

fn render_cast(from: DType, to: DType, x: &str) -> String {
    if let Some(part) = to.component() {
        let part = part.type_str();
        return match from {
            f if f == to => x.to_string(),
            f if f.is_complex() => format!("jit_cmake(({part})({x}).x, ({part})({x}).y)"),
            DType::F16 => format!("jit_cmake(({part})__half2float({x}), ({part})0)"),
            _ => format!("jit_cmake(({part})({x}), ({part})0)"),
        };
    }
    match (from, to) {
        (f, t) if f == t => x.to_string(),
        (DType::F16, DType::Bool) => format!("(char)(__half2float({x}) != 0.0f)"),
        (_, DType::Bool) => format!("(char)(({x}) != 0)"),
        (DType::F16, t) => format!("({})__half2float({x})", t.type_str()),
        (_, DType::F16) => format!("__float2half((float)({x}))"),
        (_, t) => format!("({})({x})", t.type_str()),
    }
}

impl JitOp for NaryOp {
    fn name(&self) -> &'static str {
        match self.kind {
            NaryKind::Unary(op) => op.into(),
            NaryKind::Binary(op) => op.into(),
            NaryKind::Select => "select",
            NaryKind::Cast(_) => "cast",
        }
    }

    fn gen_ker_name(&self, sig: &mut String, dtype: DType, ids: &NodeIds) {
        // The operand type of a cast isn't implied by the node's own type
        let from = match self.kind {
            NaryKind::Cast(from) => from.to_string(),
            _ => String::new(),
        };
        write!(sig, "_{}{from}{dtype}:{}", self.name(), ids.id).unwrap();
        for child in ids.child_ids.iter() {
            write!(sig, ",{child}").unwrap();
        }
    }

    fn gen_funcs(&self, code: &mut String, dtype: DType, ids: &NodeIds) {
        let vals = ids
            .child_ids
            .iter()
            .map(|c| format!("val{c}"))
            .collect::<Vec<_>>();
        let expr = match self.kind {
            NaryKind::Unary(op) => render_unary(op, dtype, &vals[0]),
            NaryKind::Binary(op) => render_binary(op, dtype, &vals[0], &vals[1]),
            NaryKind::Select => format!("jit_select({}, {}, {})", vals[0], vals[1], vals[2]),
            NaryKind::Cast(from) => render_cast(from, dtype, &vals[0]),
        };
        writeln!(
            code,
            "        {} val{} = {expr};",
            dtype.type_str(),
            ids.id
        )
        .unwrap();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
