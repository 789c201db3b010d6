//! The unwrap → invoke → rewrap sequence.
//!
//! Every forwarded call, modeled or not, runs through [`call`]:
//!
//! 1. each positional and named argument is unwrapped: tensors become the ids
//!    of their handles (recursively, inside lists); everything else passes
//!    through as the matching plain foreign value,
//! 2. the engine is invoked by name,
//! 3. the result is rewrapped: every returned handle is adopted into a
//!    [`Tensor`], the foreign null becomes [`Value::None`], and plain values
//!    pass through.

use std::rc::Rc;

use crate::engine::Target;
use crate::error::{Error, Result};
use crate::handle::{Bridge, Handle};
use crate::tensor::Tensor;
use crate::value::{ForeignValue, Value};

/// Host argument to foreign argument. Tensor handles are borrowed, not cloned.
pub(crate) fn unwrap_value(value: &Value) -> ForeignValue {
    match value {
        Value::None => ForeignValue::Null,
        Value::Bool(b) => ForeignValue::Bool(*b),
        Value::Int(x) => ForeignValue::Int(*x),
        Value::Float(x) => ForeignValue::Float(*x),
        Value::Str(s) => ForeignValue::Str(s.clone()),
        Value::List(items) => ForeignValue::List(items.iter().map(unwrap_value).collect()),
        Value::Tensor(t) => ForeignValue::Handle(t.handle().id()),
    }
}

pub(crate) fn unwrap_args(args: &[Value]) -> Vec<ForeignValue> {
    args.iter().map(unwrap_value).collect()
}

pub(crate) fn unwrap_kwargs(kwargs: &[(&str, Value)]) -> Vec<(String, ForeignValue)> {
    kwargs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), unwrap_value(v)))
        .collect()
}

/// Foreign result to host result, adopting every returned handle.
pub(crate) fn wrap_value(bridge: &Rc<Bridge>, value: ForeignValue) -> Value {
    match value {
        ForeignValue::Null => Value::None,
        ForeignValue::Bool(b) => Value::Bool(b),
        ForeignValue::Int(x) => Value::Int(x),
        ForeignValue::Float(x) => Value::Float(x),
        ForeignValue::Str(s) => Value::Str(s),
        ForeignValue::List(items) => {
            Value::List(items.into_iter().map(|v| wrap_value(bridge, v)).collect())
        }
        ForeignValue::Handle(id) => Value::Tensor(Tensor::from_handle(Handle::adopt(bridge, id))),
    }
}

/// Wraps a result that must be a tensor.
///
/// A non-tensor result is still adopted first so no returned handle leaks.
pub(crate) fn wrap_tensor(bridge: &Rc<Bridge>, op: &str, value: ForeignValue) -> Result<Tensor> {
    wrap_value(bridge, value)
        .into_tensor()
        .ok_or_else(|| Error::NotATensor { op: op.to_owned() })
}

/// Wraps a result that may be absent (e.g. a gradient that was never populated).
pub(crate) fn wrap_optional_tensor(
    bridge: &Rc<Bridge>,
    op: &str,
    value: ForeignValue,
) -> Result<Option<Tensor>> {
    if value.is_null() {
        return Ok(None);
    }
    wrap_tensor(bridge, op, value).map(Some)
}

/// Unwraps arguments, invokes `name` on `target`, rewraps the result.
pub(crate) fn call(
    bridge: &Rc<Bridge>,
    target: Target,
    name: &str,
    args: &[Value],
    kwargs: &[(&str, Value)],
) -> Result<Value> {
    let args = unwrap_args(args);
    let kwargs = unwrap_kwargs(kwargs);
    let out = bridge.invoke(target, name, &args, &kwargs)?;
    Ok(wrap_value(bridge, out))
}
