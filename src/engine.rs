//! Collaborator seams.
//!
//! The bridge never computes anything itself. Every tensor operation goes
//! through [`ForeignEngine::invoke`], and every conversion between host numbers
//! and foreign tensors goes through [`Marshal`]. Implement both traits to plug
//! the bridge into a concrete runtime (an embedded interpreter, an FFI library,
//! a remote worker).
//!
//! # Contract
//!
//! - A [`ForeignValue::Handle`] returned from any method is a new reference the
//!   caller owns. The bridge returns it through [`ForeignEngine::release`] once
//!   the last host copy is dropped.
//! - Handles passed in `args`/`kwargs` are borrowed for the call only.
//! - Failures are reported as [`Error`](crate::Error) values and are passed
//!   through to the user untouched.

use crate::error::Result;
use crate::value::{ForeignValue, HandleId, HostData};

/// The receiver of a foreign call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// A namespace-level function, e.g. `cat` or `ones`.
    Namespace,
    /// A method on the given tensor, e.g. `t.sum(...)`.
    Handle(HandleId),
}

/// The foreign tensor/autograd engine.
pub trait ForeignEngine {
    /// Invokes the operation `name` on `target`.
    ///
    /// This is the single escape hatch every forwarding path funnels through,
    /// whether the operation is modeled host-side or not. Property reads
    /// (`grad`, `shape`, `requires_grad`) are invoked the same way with no
    /// arguments.
    ///
    /// # Errors
    /// [`Error::UnknownAttribute`](crate::Error::UnknownAttribute) if `target`
    /// has no such operation, or whatever the engine raised while executing it.
    fn invoke(
        &self,
        target: Target,
        name: &str,
        args: &[ForeignValue],
        kwargs: &[(String, ForeignValue)],
    ) -> Result<ForeignValue>;

    /// Reads the process-wide gradient-tracking flag.
    fn gradient_tracking_enabled(&self) -> Result<bool>;

    /// Writes the process-wide gradient-tracking flag.
    fn set_gradient_tracking_enabled(&self, enabled: bool) -> Result<()>;

    /// Gives back one reference previously returned to the bridge.
    ///
    /// Runs on drop paths, so it cannot report failure.
    fn release(&self, handle: HandleId);
}

/// Conversion between host-native data and foreign values.
pub trait Marshal {
    /// Builds a new foreign tensor from host numbers.
    fn create_tensor_from_host_data(
        &self,
        data: &HostData,
        requires_grad: bool,
    ) -> Result<HandleId>;

    /// Copies a foreign tensor's contents back into host numbers.
    fn host_data_from_handle(&self, handle: HandleId) -> Result<HostData>;

    /// Packs values into the foreign runtime's list type.
    fn to_foreign_list(&self, items: Vec<ForeignValue>) -> Result<ForeignValue>;
}
