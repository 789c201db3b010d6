//! Values that cross the host/foreign boundary.
//!
//! Three shapes of data meet here:
//!
//! - [`ForeignValue`] is what the foreign engine speaks. Tensors appear only as
//!   opaque [`HandleId`]s; everything else is a plain scalar, string or list.
//! - [`HostData`] is host-native nested numbers, the currency of the marshalling
//!   collaborator (`tolist()` and tensor construction).
//! - [`Value`] is what host code passes to and receives from forwarded calls.
//!   A [`Value::Tensor`] owns its handle; [`Value::None`] is the absent value.
//!
//! ## Ownership across the boundary
//!
//! A `ForeignValue::Handle` passed *into* the engine is borrowed for the duration
//! of the call. A `ForeignValue::Handle` coming *out* of the engine is a fresh
//! reference owned by the receiver, which must eventually hand it back through
//! [`ForeignEngine::release`](crate::engine::ForeignEngine::release).

use core::fmt;

use crate::error::Error;
use crate::tensor::Tensor;

/// Opaque identifier for one foreign tensor reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(pub u64);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A value in the foreign engine's representation.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ForeignValue {
    /// The foreign null/undefined.
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<ForeignValue>),
    /// A tensor reference.
    Handle(HandleId),
}

impl ForeignValue {
    /// Returns `true` for the foreign null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Float(x) => Some(x),
            #[allow(clippy::cast_precision_loss)]
            Self::Int(x) => Some(x as f64),
            _ => None,
        }
    }

    /// Boolean view of the value, if it has one.
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Self::Bool(b) => Some(b),
            _ => None,
        }
    }
}

/// Host-native nested numbers.
///
/// A rank-0 tensor is a bare [`HostData::Scalar`]; every additional dimension
/// adds one level of [`HostData::Seq`].
#[derive(Debug, Clone, PartialEq)]
pub enum HostData {
    Scalar(f64),
    Seq(Vec<HostData>),
}

impl HostData {
    /// Infers the shape by walking the first element of every level.
    ///
    /// Ragged input is not rejected here; the foreign runtime decides what a
    /// ragged literal means.
    pub fn shape(&self) -> Vec<usize> {
        let mut shape = Vec::new();
        let mut cur = self;
        while let Self::Seq(items) = cur {
            shape.push(items.len());
            match items.first() {
                Some(first) => cur = first,
                None => break,
            }
        }
        shape
    }

    /// Row-major flattening of every number.
    pub fn flatten(&self) -> Vec<f64> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into(&self, out: &mut Vec<f64>) {
        match self {
            Self::Scalar(x) => out.push(*x),
            Self::Seq(items) => items.iter().for_each(|item| item.flatten_into(out)),
        }
    }

    /// Rebuilds nested data from a flat buffer and a shape.
    ///
    /// Returns `None` when the element count does not match the shape.
    pub fn from_flat(shape: &[usize], data: &[f64]) -> Option<Self> {
        if shape.iter().product::<usize>() != data.len() {
            return None;
        }
        Some(Self::build(shape, data))
    }

    fn build(shape: &[usize], data: &[f64]) -> Self {
        match shape.split_first() {
            None => Self::Scalar(data[0]),
            Some((&n, rest)) => {
                let stride = rest.iter().product::<usize>();
                Self::Seq(
                    (0..n)
                        .map(|i| Self::build(rest, &data[i * stride..(i + 1) * stride]))
                        .collect(),
                )
            }
        }
    }

    /// The scalar, if this is rank 0.
    pub fn as_scalar(&self) -> Option<f64> {
        match *self {
            Self::Scalar(x) => Some(x),
            Self::Seq(_) => None,
        }
    }

    /// The outer dimension, if this is not rank 0.
    pub fn into_items(self) -> Option<Vec<HostData>> {
        match self {
            Self::Scalar(_) => None,
            Self::Seq(items) => Some(items),
        }
    }
}

impl From<f64> for HostData {
    fn from(x: f64) -> Self {
        Self::Scalar(x)
    }
}

impl From<f32> for HostData {
    fn from(x: f32) -> Self {
        Self::Scalar(f64::from(x))
    }
}

impl<T: Into<HostData>> From<Vec<T>> for HostData {
    fn from(items: Vec<T>) -> Self {
        Self::Seq(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<HostData>, const N: usize> From<[T; N]> for HostData {
    fn from(items: [T; N]) -> Self {
        Self::Seq(items.into_iter().map(Into::into).collect())
    }
}

impl TryFrom<&Value> for HostData {
    type Error = Error;

    /// Numbers and (nested) lists of numbers; anything else is not tensor data.
    fn try_from(value: &Value) -> Result<Self, Error> {
        match value {
            Value::Float(x) => Ok(Self::Scalar(*x)),
            #[allow(clippy::cast_precision_loss)]
            Value::Int(x) => Ok(Self::Scalar(*x as f64)),
            Value::List(items) => items
                .iter()
                .map(Self::try_from)
                .collect::<Result<_, _>>()
                .map(Self::Seq),
            other => Err(Error::Marshal(format!("not host tensor data: {other:?}"))),
        }
    }
}

impl fmt::Display for HostData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(x) => write!(f, "{x:?}"),
            Self::Seq(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// A host-side argument to, or result of, a forwarded call.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// The absent value.
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Tensor(Tensor),
}

impl Value {
    /// Returns `true` for the absent value.
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Takes the tensor out, if this is one.
    pub fn into_tensor(self) -> Option<Tensor> {
        match self {
            Self::Tensor(t) => Some(t),
            _ => None,
        }
    }

    /// Borrows the tensor, if this is one.
    pub fn as_tensor(&self) -> Option<&Tensor> {
        match self {
            Self::Tensor(t) => Some(t),
            _ => None,
        }
    }

    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Float(x) => Some(x),
            #[allow(clippy::cast_precision_loss)]
            Self::Int(x) => Some(x as f64),
            _ => None,
        }
    }

    /// Boolean view of the value, if it has one.
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Self::Bool(b) => Some(b),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(x: i64) -> Self {
        Self::Int(x)
    }
}

impl From<i32> for Value {
    fn from(x: i32) -> Self {
        Self::Int(i64::from(x))
    }
}

impl From<usize> for Value {
    #[allow(clippy::cast_possible_wrap)]
    fn from(x: usize) -> Self {
        Self::Int(x as i64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<Tensor> for Value {
    fn from(t: Tensor) -> Self {
        Self::Tensor(t)
    }
}

impl From<&Tensor> for Value {
    fn from(t: &Tensor) -> Self {
        Self::Tensor(t.clone())
    }
}

impl From<Option<Tensor>> for Value {
    fn from(t: Option<Tensor>) -> Self {
        t.map_or(Self::None, Self::Tensor)
    }
}

impl From<HostData> for Value {
    fn from(data: HostData) -> Self {
        match data {
            HostData::Scalar(x) => Self::Float(x),
            HostData::Seq(items) => Self::List(items.into_iter().map(Self::from).collect()),
        }
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}
