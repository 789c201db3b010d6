//! The engine facade.
//!
//! [`Torch`] mirrors the foreign engine's top-level namespace. A handful of
//! names are modeled directly (see [`FACADE_OPERATIONS`]); everything else is
//! reached through [`Torch::call`], which forwards by name with no membership
//! check and lets the engine decide whether the name exists.
//!
//! [`Torch::call`] checks the facade list first, so calling a listed name by
//! string lands in the same handler as the typed method:
//!
//! - `Size` returns its argument unchanged, without touching the engine,
//! - `tensor` builds through [`Tensor::new`],
//! - `cat` and `ones` pack their list argument with the marshaller first,
//! - `no_grad` is refused, since a scope cannot be handed back as a value;
//!   use [`Torch::no_grad`] or [`Torch::with_no_grad`].
//!
//! ## Example
//!
//! ```rust,ignore
//! let torch = Torch::new(bridge);
//! let x = torch.tensor(vec![0.0, 1.0], false)?.unwrap();
//! let y = torch.sin(&x)?;
//! let z = torch.call("exp", &[Value::from(&y)], &[])?;
//! ```

use std::collections::HashSet;
use std::rc::Rc;

use lazy_static::lazy_static;

use crate::engine::Target;
use crate::error::{Error, Result};
use crate::forward;
use crate::grad_mode::{self, GradModeGuard};
use crate::handle::Bridge;
use crate::tensor::{Tensor, TensorData};
use crate::value::{ForeignValue, Value};

/// Names the facade knows about up front.
pub const FACADE_OPERATIONS: &[&str] = &[
    "sin", "mean", "square", "abs", "relu", "ones_like", "linspace", "ones", "cat", "tensor",
    "Size", "no_grad",
];

lazy_static! {
    static ref FACADE_SET: HashSet<&'static str> = FACADE_OPERATIONS.iter().copied().collect();
}

/// Entry point mirroring the foreign namespace.
#[derive(Debug, Clone)]
pub struct Torch {
    bridge: Rc<Bridge>,
}

impl Torch {
    pub fn new(bridge: Rc<Bridge>) -> Self {
        Self { bridge }
    }

    pub fn bridge(&self) -> &Rc<Bridge> {
        &self.bridge
    }

    /// Whether `name` is one of the [`FACADE_OPERATIONS`].
    pub fn is_facade_operation(name: &str) -> bool {
        FACADE_SET.contains(name)
    }

    /// Tensor construction; see [`Tensor::new`].
    pub fn tensor(
        &self,
        data: impl Into<TensorData>,
        requires_grad: bool,
    ) -> Result<Option<Tensor>> {
        Tensor::new(&self.bridge, data, requires_grad)
    }

    /// Shape literal. Returned unchanged, without validation.
    pub fn size<S>(&self, shape: S) -> S {
        shape
    }

    /// Concatenates along `dim`.
    ///
    /// An empty slice is forwarded as-is; the engine's error comes back.
    pub fn cat(&self, tensors: &[&Tensor], dim: i64) -> Result<Tensor> {
        let items = tensors
            .iter()
            .map(|t| ForeignValue::Handle(t.handle().id()))
            .collect();
        let list = self.bridge.marshal().to_foreign_list(items)?;
        let out = self
            .bridge
            .invoke(Target::Namespace, "cat", &[list, ForeignValue::Int(dim)], &[])?;
        forward::wrap_tensor(&self.bridge, "cat", out)
    }

    /// Disables gradient tracking until the guard drops.
    pub fn no_grad(&self) -> Result<GradModeGuard> {
        GradModeGuard::no_grad(&self.bridge)
    }

    /// Enables gradient tracking until the guard drops.
    pub fn enable_grad(&self) -> Result<GradModeGuard> {
        GradModeGuard::enable_grad(&self.bridge)
    }

    /// Runs `f` with gradient tracking disabled.
    pub fn with_no_grad<R>(&self, f: impl FnOnce() -> R) -> Result<R> {
        grad_mode::with_no_grad(&self.bridge, f)
    }

    pub fn is_grad_enabled(&self) -> Result<bool> {
        grad_mode::is_grad_enabled(&self.bridge)
    }

    pub fn sin(&self, x: &Tensor) -> Result<Tensor> {
        self.call_tensor("sin", &[x.into()], &[])
    }

    pub fn mean(&self, x: &Tensor) -> Result<Tensor> {
        self.call_tensor("mean", &[x.into()], &[])
    }

    pub fn square(&self, x: &Tensor) -> Result<Tensor> {
        self.call_tensor("square", &[x.into()], &[])
    }

    pub fn abs(&self, x: &Tensor) -> Result<Tensor> {
        self.call_tensor("abs", &[x.into()], &[])
    }

    pub fn relu(&self, x: &Tensor) -> Result<Tensor> {
        self.call_tensor("relu", &[x.into()], &[])
    }

    pub fn ones_like(&self, x: &Tensor) -> Result<Tensor> {
        self.call_tensor("ones_like", &[x.into()], &[])
    }

    /// `steps` evenly spaced values from `start` to `end`, both inclusive.
    pub fn linspace(&self, start: f64, end: f64, steps: usize) -> Result<Tensor> {
        self.call_tensor("linspace", &[start.into(), end.into(), steps.into()], &[])
    }

    pub fn ones(&self, shape: &[usize]) -> Result<Tensor> {
        self.filled("ones", shape)
    }

    pub fn zeros(&self, shape: &[usize]) -> Result<Tensor> {
        self.filled("zeros", shape)
    }

    fn filled(&self, name: &str, shape: &[usize]) -> Result<Tensor> {
        let dims = shape
            .iter()
            .map(|&d| i64::try_from(d).map(ForeignValue::Int))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Marshal(e.to_string()))?;
        let list = self.bridge.marshal().to_foreign_list(dims)?;
        let out = self.bridge.invoke(Target::Namespace, name, &[list], &[])?;
        forward::wrap_tensor(&self.bridge, name, out)
    }

    fn call_tensor(&self, name: &str, args: &[Value], kwargs: &[(&str, Value)]) -> Result<Tensor> {
        forward::call(&self.bridge, Target::Namespace, name, args, kwargs)?
            .into_tensor()
            .ok_or_else(|| Error::NotATensor { op: name.to_owned() })
    }

    /// Calls any namespace-level function by name.
    ///
    /// Names in [`FACADE_OPERATIONS`] are handled by the facade itself (see the
    /// module docs); every other name is forwarded with its arguments unwrapped
    /// the same way as [`Tensor::call`].
    ///
    /// # Errors
    /// [`Error::InvalidOperation`] for `no_grad` and for arguments a facade
    /// handler cannot use; otherwise whatever the engine raises.
    pub fn call(&self, name: &str, args: &[Value], kwargs: &[(&str, Value)]) -> Result<Value> {
        if Self::is_facade_operation(name) {
            return self.call_facade(name, args, kwargs);
        }
        forward::call(&self.bridge, Target::Namespace, name, args, kwargs)
    }

    fn call_facade(&self, name: &str, args: &[Value], kwargs: &[(&str, Value)]) -> Result<Value> {
        match name {
            "Size" => Ok(match args {
                [shape] => shape.clone(),
                _ => Value::List(args.to_vec()),
            }),
            "tensor" => {
                let data = argument(args, kwargs, 0, "data").cloned().unwrap_or_default();
                let requires_grad = match argument(args, kwargs, 1, "requires_grad") {
                    None => false,
                    Some(v) => v.as_bool().ok_or_else(|| {
                        Error::InvalidOperation(format!(
                            "tensor: requires_grad must be a bool, got {v:?}"
                        ))
                    })?,
                };
                let data = TensorData::try_from(data)?;
                self.tensor(data, requires_grad).map(Value::from)
            }
            "cat" => {
                let Some(Value::List(items)) = argument(args, kwargs, 0, "tensors") else {
                    return Err(Error::InvalidOperation("cat: expected a list of tensors".into()));
                };
                let tensors = items
                    .iter()
                    .map(|v| v.as_tensor().ok_or_else(|| Error::NotATensor { op: "cat".into() }))
                    .collect::<Result<Vec<_>>>()?;
                let dim = match argument(args, kwargs, 1, "dim") {
                    None => 0,
                    Some(Value::Int(d)) => *d,
                    Some(other) => {
                        return Err(Error::InvalidOperation(format!(
                            "cat: dim must be an int, got {other:?}"
                        )));
                    }
                };
                self.cat(&tensors, dim).map(Value::Tensor)
            }
            "ones" => {
                let dims = match args {
                    [Value::List(dims)] => dims.as_slice(),
                    _ => args,
                };
                let shape = dims
                    .iter()
                    .map(|d| match d {
                        Value::Int(n) => usize::try_from(*n).ok(),
                        _ => None,
                    })
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| {
                        Error::InvalidOperation(format!("ones: expected a shape, got {args:?}"))
                    })?;
                self.ones(&shape).map(Value::Tensor)
            }
            "no_grad" => Err(Error::InvalidOperation(
                "no_grad opens a scope; use Torch::no_grad or Torch::with_no_grad".into(),
            )),
            _ => self.call_tensor(name, args, kwargs).map(Value::Tensor),
        }
    }
}

/// Positional argument `index`, else the named argument `key`.
fn argument<'a>(
    args: &'a [Value],
    kwargs: &'a [(&str, Value)],
    index: usize,
    key: &str,
) -> Option<&'a Value> {
    args.get(index)
        .or_else(|| kwargs.iter().find(|(k, _)| *k == key).map(|(_, v)| v))
}
