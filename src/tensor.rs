//! The host-side tensor wrapper.
//!
//! A [`Tensor`] owns exactly one foreign [`Handle`] and nothing else: no shape
//! cache, no data copy, no gradient state. Every method reads through to the
//! foreign engine, so what you see is always what the engine currently holds.
//!
//! ## Construction may yield nothing
//!
//! [`Tensor::new`] returns `Ok(None)` when given [`TensorData::Absent`]. The same
//! rule drives [`Tensor::grad`]: a gradient the engine has not populated comes
//! back as `None`, never as a wrapper around nothing.
//!
//! ## Operators
//!
//! `+ - * /` are overloaded between tensors (owned or borrowed) and between a
//! tensor and an `f64` on either side, each yielding `Result<Tensor>`. `pow` and `matmul` have no
//! Rust operator and are plain methods. All of them go through
//! [`Tensor::apply`] and the [`OPERATORS`](crate::ops::OPERATORS) table.
//!
//! ## Anything else
//!
//! The modeled methods are also reachable as data through [`Tensor::dispatch`]
//! and a [`Method`]. Operations the wrapper does not model are reached with
//! [`Tensor::call`], which forwards by name and rewraps whatever comes back.
//!
//! ## Example
//!
//! ```rust,ignore
//! let a = torch.tensor(vec![1.0, 2.0], true)?.unwrap();
//! let loss = (&a * 3.0)?.sum(-1, false)?;
//! loss.backward()?;
//! assert_eq!(a.grad()?.unwrap().tolist()?, HostData::from(vec![3.0, 3.0]));
//! ```

use core::fmt;
use core::ops::{Add, Div, Mul, Sub};
use std::rc::Rc;

use tracing::{debug, trace};

use crate::engine::Target;
use crate::error::{Error, Result};
use crate::forward;
use crate::handle::{Bridge, Handle};
use crate::ops::{Method, Operator, Route};
use crate::value::{ForeignValue, HostData, Value};

/// What a tensor can be constructed from.
#[derive(Debug, Clone)]
pub enum TensorData {
    /// Nothing; construction yields `None`.
    Absent,
    /// An existing foreign reference, wrapped as-is.
    Foreign(Handle),
    /// Host numbers, marshalled into a new foreign tensor.
    Host(HostData),
}

impl From<HostData> for TensorData {
    fn from(data: HostData) -> Self {
        Self::Host(data)
    }
}

impl From<Handle> for TensorData {
    fn from(handle: Handle) -> Self {
        Self::Foreign(handle)
    }
}

impl From<Tensor> for TensorData {
    fn from(t: Tensor) -> Self {
        Self::Foreign(t.into_handle())
    }
}

impl TryFrom<Value> for TensorData {
    type Error = Error;

    /// `None` is absent, a tensor is wrapped as-is, numbers and lists are host data.
    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::None => Ok(Self::Absent),
            Value::Tensor(t) => Ok(t.into()),
            other => HostData::try_from(&other).map(Self::Host),
        }
    }
}

impl From<f64> for TensorData {
    fn from(x: f64) -> Self {
        Self::Host(HostData::Scalar(x))
    }
}

impl<T: Into<HostData>> From<Vec<T>> for TensorData {
    fn from(items: Vec<T>) -> Self {
        Self::Host(HostData::from(items))
    }
}

impl<T: Into<HostData>, const N: usize> From<[T; N]> for TensorData {
    fn from(items: [T; N]) -> Self {
        Self::Host(HostData::from(items))
    }
}

impl<T: Into<TensorData>> From<Option<T>> for TensorData {
    fn from(data: Option<T>) -> Self {
        data.map_or(Self::Absent, Into::into)
    }
}

/// A host-side proxy for one foreign tensor.
///
/// Cloning is cheap and shares the same foreign reference.
#[derive(Clone)]
pub struct Tensor {
    handle: Handle,
}

impl Tensor {
    /// Builds a tensor, or nothing.
    ///
    /// - [`TensorData::Absent`] yields `Ok(None)`.
    /// - [`TensorData::Foreign`] is wrapped directly; `requires_grad` is ignored
    ///   because the foreign handle already carries its own flag.
    /// - [`TensorData::Host`] is marshalled into a new foreign tensor with
    ///   `requires_grad` passed through as engine-side configuration.
    ///
    /// # Errors
    /// Whatever the marshalling collaborator raises.
    pub fn new(
        bridge: &Rc<Bridge>,
        data: impl Into<TensorData>,
        requires_grad: bool,
    ) -> Result<Option<Self>> {
        match data.into() {
            TensorData::Absent => Ok(None),
            TensorData::Foreign(handle) => Ok(Some(Self::from_handle(handle))),
            TensorData::Host(data) => {
                debug!(shape = ?data.shape(), requires_grad, "creating tensor from host data");
                let id = bridge.marshal().create_tensor_from_host_data(&data, requires_grad)?;
                Ok(Some(Self::from_handle(Handle::adopt(bridge, id))))
            }
        }
    }

    pub(crate) fn from_handle(handle: Handle) -> Self {
        Self { handle }
    }

    /// The underlying foreign handle.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Consumes the wrapper, keeping the foreign reference alive.
    pub fn into_handle(self) -> Handle {
        self.handle
    }

    pub fn bridge(&self) -> &Rc<Bridge> {
        self.handle.bridge()
    }

    fn target(&self) -> Target {
        Target::Handle(self.handle.id())
    }

    fn read(&self, name: &str) -> Result<ForeignValue> {
        self.bridge().invoke(self.target(), name, &[], &[])
    }

    /// Copies the contents back into host-native nested numbers.
    ///
    /// # Errors
    /// Whatever the marshalling collaborator raises.
    pub fn tolist(&self) -> Result<HostData> {
        self.bridge().marshal().host_data_from_handle(self.handle.id())
    }

    /// Runs the foreign backward pass from this tensor.
    ///
    /// Gradients accumulate on the foreign leaf tensors; read them with [`grad`](Self::grad).
    pub fn backward(&self) -> Result<()> {
        let out = self.read("backward")?;
        // adopt-and-drop so a returned reference is not leaked
        drop(forward::wrap_value(self.bridge(), out));
        Ok(())
    }

    /// Clears accumulated gradients on the foreign side.
    pub fn zero_grad(&self) -> Result<()> {
        let out = self.read("zero_grad")?;
        drop(forward::wrap_value(self.bridge(), out));
        Ok(())
    }

    /// The accumulated gradient, or `None` if the engine has not populated one.
    pub fn grad(&self) -> Result<Option<Tensor>> {
        let out = self.read("grad")?;
        forward::wrap_optional_tensor(self.bridge(), "grad", out)
    }

    /// Dimension sizes.
    pub fn shape(&self) -> Result<Vec<usize>> {
        match self.read("shape")? {
            ForeignValue::List(dims) => dims
                .into_iter()
                .map(|d| match d {
                    ForeignValue::Int(n) => usize::try_from(n)
                        .map_err(|_| Error::Marshal(format!("negative dimension {n}"))),
                    other => Err(Error::Marshal(format!("dimension is not an integer: {other:?}"))),
                })
                .collect(),
            other => Err(Error::Marshal(format!("shape is not a list: {other:?}"))),
        }
    }

    /// The single element as a host number.
    ///
    /// # Errors
    /// The engine's error for tensors that are not single-element, typically
    /// [`Error::InvalidOperation`].
    pub fn item(&self) -> Result<f64> {
        let out = self.read("item")?;
        out.as_f64()
            .ok_or_else(|| Error::Marshal(format!("item is not a number: {out:?}")))
    }

    /// Whether the foreign tensor records operations for autograd.
    ///
    /// Read fresh on every call.
    pub fn requires_grad(&self) -> Result<bool> {
        let out = self.read("requires_grad")?;
        out.as_bool()
            .ok_or_else(|| Error::Marshal(format!("requires_grad is not a bool: {out:?}")))
    }

    /// Sums over `dim` (`-1` for the last one).
    pub fn sum(&self, dim: i64, keepdim: bool) -> Result<Tensor> {
        let out = self.bridge().invoke(
            self.target(),
            "sum",
            &[ForeignValue::Int(dim), ForeignValue::Bool(keepdim)],
            &[],
        )?;
        forward::wrap_tensor(self.bridge(), "sum", out)
    }

    /// Reshapes to `dims`; a single `-1` lets the engine infer one size.
    pub fn reshape(&self, dims: &[i64]) -> Result<Tensor> {
        let bridge = self.bridge();
        let list = bridge
            .marshal()
            .to_foreign_list(dims.iter().copied().map(ForeignValue::Int).collect())?;
        let out = bridge.invoke(self.target(), "reshape", &[list], &[])?;
        forward::wrap_tensor(bridge, "reshape", out)
    }

    /// Elementwise closeness: `|a - b| <= atol + rtol * |b|`, evaluated by the engine.
    pub fn allclose(&self, other: &Tensor, rtol: f64, atol: f64, equal_nan: bool) -> Result<bool> {
        let out = self.bridge().invoke(
            self.target(),
            "allclose",
            &[
                ForeignValue::Handle(other.handle.id()),
                ForeignValue::Float(rtol),
                ForeignValue::Float(atol),
                ForeignValue::Bool(equal_nan),
            ],
            &[],
        )?;
        out.as_bool()
            .ok_or_else(|| Error::Marshal(format!("allclose is not a bool: {out:?}")))
    }

    /// [`allclose`](Self::allclose) with the tolerances from
    /// [`BridgeConfig`](crate::config::BridgeConfig).
    pub fn allclose_default(&self, other: &Tensor) -> Result<bool> {
        let d = self.bridge().config().allclose;
        self.allclose(other, d.rtol, d.atol, d.equal_nan)
    }

    /// The shared binary-operator handler.
    ///
    /// `other` is unwrapped if it is a tensor and passed through otherwise.
    pub fn apply(&self, op: Operator, other: impl Into<Value>) -> Result<Tensor> {
        let bridge = self.bridge();
        let name = op.op.foreign_name();
        let other = forward::unwrap_value(&other.into());
        let out = match op.route() {
            Route::Method => bridge.invoke(self.target(), name, &[other], &[])?,
            Route::NamespaceSwapped => bridge.invoke(
                Target::Namespace,
                name,
                &[other, ForeignValue::Handle(self.handle.id())],
                &[],
            )?,
        };
        forward::wrap_tensor(bridge, name, out)
    }

    /// [`apply`](Self::apply) by host operator name (`"add"`, `"rsub"`, ...).
    ///
    /// # Errors
    /// [`Error::UnknownAttribute`] for a name missing from the operator table.
    pub fn try_op(&self, name: &str, other: impl Into<Value>) -> Result<Tensor> {
        let op = Operator::lookup(name).ok_or_else(|| Error::unknown(name))?;
        self.apply(op, other)
    }

    pub fn pow(&self, exponent: impl Into<Value>) -> Result<Tensor> {
        self.try_op("pow", exponent)
    }

    /// `base ** self`.
    pub fn rpow(&self, base: impl Into<Value>) -> Result<Tensor> {
        self.try_op("rpow", base)
    }

    pub fn matmul(&self, other: impl Into<Value>) -> Result<Tensor> {
        self.try_op("matmul", other)
    }

    /// `other @ self`.
    pub fn rmatmul(&self, other: impl Into<Value>) -> Result<Tensor> {
        self.try_op("rmatmul", other)
    }

    /// Routes numeric formatting through [`item`](Self::item).
    ///
    /// ```rust,ignore
    /// println!("{:.5}", loss.scalar()?);
    /// ```
    ///
    /// # Errors
    /// Exactly what `item()` raises for a non-scalar tensor.
    pub fn scalar(&self) -> Result<Scalar> {
        self.item().map(Scalar)
    }

    /// Iterates the outer dimension of a fresh [`tolist`](Self::tolist).
    ///
    /// Every call pulls the contents again, so iterating twice sees current data.
    ///
    /// # Errors
    /// [`Error::InvalidOperation`] for a rank-0 tensor.
    pub fn iter(&self) -> Result<std::vec::IntoIter<HostData>> {
        self.tolist()?
            .into_items()
            .map(IntoIterator::into_iter)
            .ok_or_else(|| Error::InvalidOperation("iteration over a 0-d tensor".into()))
    }

    /// Runs one of the modeled methods, boxing its result as a [`Value`].
    ///
    /// Unit results become [`Value::None`]; the shape becomes a list of ints
    /// and `tolist()` a nested list of floats.
    pub fn dispatch(&self, method: Method<'_>) -> Result<Value> {
        trace!(method = method.foreign_name(), handle = %self.handle.id(), "dispatch");
        match method {
            Method::ToList => self.tolist().map(Value::from),
            Method::Backward => self.backward().map(|()| Value::None),
            Method::ZeroGrad => self.zero_grad().map(|()| Value::None),
            Method::Grad => self.grad().map(Value::from),
            Method::Shape => self.shape().map(Value::from),
            Method::Item => self.item().map(Value::Float),
            Method::RequiresGrad => self.requires_grad().map(Value::Bool),
            Method::Sum { dim, keepdim } => self.sum(dim, keepdim).map(Value::Tensor),
            Method::Reshape(dims) => self.reshape(dims).map(Value::Tensor),
            Method::AllClose {
                other,
                rtol,
                atol,
                equal_nan,
            } => self.allclose(other, rtol, atol, equal_nan).map(Value::Bool),
        }
    }

    /// Forwards any tensor method by name.
    ///
    /// Tensor arguments (positional or named, at any list depth) are passed as
    /// their foreign handles; every other argument is passed through. Returned
    /// handles come back as tensors, the foreign null as [`Value::None`].
    ///
    /// # Errors
    /// [`Error::UnknownAttribute`] if the engine has no such method, or whatever
    /// the method raised.
    pub fn call(&self, name: &str, args: &[Value], kwargs: &[(&str, Value)]) -> Result<Value> {
        forward::call(self.bridge(), self.target(), name, args, kwargs)
    }

    /// Debug-style rendering with fresh data and gradient flag.
    pub fn repr(&self) -> Result<String> {
        let data = self.tolist()?;
        Ok(if self.requires_grad()? {
            format!("Tensor(data={data}, requires_grad=true)")
        } else {
            format!("Tensor(data={data})")
        })
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.repr() {
            Ok(s) => f.write_str(&s),
            Err(e) => write!(f, "Tensor({:?}, <{e}>)", self.handle),
        }
    }
}

/// A tensor's single value, formattable with the usual numeric specifiers.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Scalar(pub f64);

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::LowerExp for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerExp::fmt(&self.0, f)
    }
}

impl fmt::UpperExp for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::UpperExp::fmt(&self.0, f)
    }
}

macro_rules! forward_binop {
    ($Trait:ident, $method:ident, $fwd:literal, $rev:literal) => {
        impl $Trait<&Tensor> for &Tensor {
            type Output = Result<Tensor>;

            fn $method(self, rhs: &Tensor) -> Result<Tensor> {
                self.try_op($fwd, rhs)
            }
        }

        impl $Trait<Tensor> for &Tensor {
            type Output = Result<Tensor>;

            fn $method(self, rhs: Tensor) -> Result<Tensor> {
                self.try_op($fwd, rhs)
            }
        }

        impl $Trait<&Tensor> for Tensor {
            type Output = Result<Tensor>;

            fn $method(self, rhs: &Tensor) -> Result<Tensor> {
                self.try_op($fwd, rhs)
            }
        }

        impl $Trait<Tensor> for Tensor {
            type Output = Result<Tensor>;

            fn $method(self, rhs: Tensor) -> Result<Tensor> {
                self.try_op($fwd, rhs)
            }
        }

        impl $Trait<f64> for &Tensor {
            type Output = Result<Tensor>;

            fn $method(self, rhs: f64) -> Result<Tensor> {
                self.try_op($fwd, rhs)
            }
        }

        impl $Trait<f64> for Tensor {
            type Output = Result<Tensor>;

            fn $method(self, rhs: f64) -> Result<Tensor> {
                self.try_op($fwd, rhs)
            }
        }

        impl $Trait<&Tensor> for f64 {
            type Output = Result<Tensor>;

            fn $method(self, rhs: &Tensor) -> Result<Tensor> {
                rhs.try_op($rev, self)
            }
        }

        impl $Trait<Tensor> for f64 {
            type Output = Result<Tensor>;

            fn $method(self, rhs: Tensor) -> Result<Tensor> {
                rhs.try_op($rev, self)
            }
        }
    };
}

forward_binop!(Add, add, "add", "radd");
forward_binop!(Sub, sub, "sub", "rsub");
forward_binop!(Mul, mul, "mul", "rmul");
forward_binop!(Div, div, "truediv", "rtruediv");
