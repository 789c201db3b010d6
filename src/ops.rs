//! Operator table.
//!
//! Each host operator maps to a `(foreign method name, reflected)` pair. One
//! shared handler ([`Tensor::apply`](crate::tensor::Tensor::apply)) consumes the
//! table, so the unwrap/call/wrap sequence exists exactly once.
//!
//! # Reflected operators
//!
//! A reflected operator is the `k ∘ t` form, where the tensor is on the right.
//!
//! - For commutative operations (`add`, `mul`) the foreign method is called on
//!   the tensor with the other operand as its argument: `t.add(k)`.
//! - For everything else the namespace-level function is called with operands in
//!   written order, `sub(k, t)`, so `k - t` never silently becomes `t - k`.
//!
//! # Typed methods
//!
//! [`Method`] lists the tensor methods the wrapper models with typed
//! signatures. [`Tensor::dispatch`](crate::tensor::Tensor::dispatch) consumes
//! it; names outside this set go through
//! [`Tensor::call`](crate::tensor::Tensor::call).

use crate::tensor::Tensor;

/// The binary operations the foreign engine exposes as tensor methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BinaryOp {
    Add = 0,
    Sub,
    Mul,
    Div,
    Pow,
    MatMul,
}

impl BinaryOp {
    /// Name of the foreign method (and namespace function) implementing this op.
    pub const fn foreign_name(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::Pow => "pow",
            Self::MatMul => "matmul",
        }
    }

    /// Whether operand order is irrelevant to the result.
    pub const fn is_commutative(self) -> bool {
        matches!(self, Self::Add | Self::Mul)
    }
}

impl TryFrom<u8> for BinaryOp {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Add),
            1 => Ok(Self::Sub),
            2 => Ok(Self::Mul),
            3 => Ok(Self::Div),
            4 => Ok(Self::Pow),
            5 => Ok(Self::MatMul),
            _ => Err(()),
        }
    }
}

/// One row of the operator table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operator {
    /// Host-side operator name, e.g. `"rsub"`.
    pub name: &'static str,
    pub op: BinaryOp,
    /// `true` when the tensor is the right-hand operand.
    pub reflected: bool,
}

impl Operator {
    const fn new(name: &'static str, op: BinaryOp, reflected: bool) -> Self {
        Self { name, op, reflected }
    }

    /// Finds the table row for a host operator name.
    pub fn lookup(name: &str) -> Option<Self> {
        OPERATORS.iter().copied().find(|o| o.name == name)
    }

    /// How this operator reaches the foreign engine.
    pub const fn route(self) -> Route {
        if self.reflected && !self.op.is_commutative() {
            Route::NamespaceSwapped
        } else {
            Route::Method
        }
    }
}

/// Where the shared binary handler sends a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// `tensor.<op>(other)`.
    Method,
    /// `<op>(other, tensor)` at namespace level.
    NamespaceSwapped,
}

/// Every operator the tensor wrapper overloads.
pub const OPERATORS: &[Operator] = &[
    Operator::new("add", BinaryOp::Add, false),
    Operator::new("radd", BinaryOp::Add, true),
    Operator::new("sub", BinaryOp::Sub, false),
    Operator::new("rsub", BinaryOp::Sub, true),
    Operator::new("mul", BinaryOp::Mul, false),
    Operator::new("rmul", BinaryOp::Mul, true),
    Operator::new("truediv", BinaryOp::Div, false),
    Operator::new("rtruediv", BinaryOp::Div, true),
    Operator::new("pow", BinaryOp::Pow, false),
    Operator::new("rpow", BinaryOp::Pow, true),
    Operator::new("matmul", BinaryOp::MatMul, false),
    Operator::new("rmatmul", BinaryOp::MatMul, true),
];

/// A modeled tensor method together with its typed arguments.
#[derive(Debug, Clone, Copy)]
pub enum Method<'a> {
    ToList,
    Backward,
    ZeroGrad,
    Grad,
    Shape,
    Item,
    RequiresGrad,
    Sum { dim: i64, keepdim: bool },
    Reshape(&'a [i64]),
    AllClose {
        other: &'a Tensor,
        rtol: f64,
        atol: f64,
        equal_nan: bool,
    },
}

impl Method<'_> {
    /// Name of the foreign method behind this entry.
    pub const fn foreign_name(&self) -> &'static str {
        match self {
            Self::ToList => "tolist",
            Self::Backward => "backward",
            Self::ZeroGrad => "zero_grad",
            Self::Grad => "grad",
            Self::Shape => "shape",
            Self::Item => "item",
            Self::RequiresGrad => "requires_grad",
            Self::Sum { .. } => "sum",
            Self::Reshape(_) => "reshape",
            Self::AllClose { .. } => "allclose",
        }
    }
}
