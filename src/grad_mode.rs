//! Scoped control of the foreign gradient-tracking flag.
//!
//! The flag is process-wide state owned by the foreign engine. The bridge only
//! ever changes it through a [`GradModeGuard`]: acquiring the guard saves the
//! current value and sets the requested one; dropping it writes the saved value
//! back. Because each guard restores exactly what it saw, guards nest to any
//! depth, and the flag is restored on early return and panic unwind too.
//!
//! Overlapping guards from independent threads are not supported; the bridge
//! types are `!Send`.
//!
//! ## Example
//!
//! ```rust,ignore
//! {
//!     let _guard = torch.no_grad()?;
//!     let y = (&w * 2.0)?; // not recorded
//! }
//! // tracking is back to whatever it was before
//! ```

use std::rc::Rc;

use tracing::{debug, warn};

use crate::error::Result;
use crate::handle::Bridge;

/// Holds the gradient flag at a fixed value until dropped.
#[must_use = "the previous gradient mode is restored as soon as the guard is dropped"]
#[derive(Debug)]
pub struct GradModeGuard {
    bridge: Rc<Bridge>,
    prev: bool,
    enabled: bool,
}

impl GradModeGuard {
    /// Saves the current flag and sets it to `enabled`.
    ///
    /// # Errors
    /// Whatever the engine raises reading or writing the flag. Nothing is
    /// changed if the read fails.
    pub fn enter(bridge: &Rc<Bridge>, enabled: bool) -> Result<Self> {
        let engine = bridge.engine();
        let prev = engine.gradient_tracking_enabled()?;
        engine.set_gradient_tracking_enabled(enabled)?;
        debug!(prev, enabled, "entered gradient mode scope");
        Ok(Self {
            bridge: Rc::clone(bridge),
            prev,
            enabled,
        })
    }

    /// Disables tracking for the guard's lifetime.
    pub fn no_grad(bridge: &Rc<Bridge>) -> Result<Self> {
        Self::enter(bridge, false)
    }

    /// Enables tracking for the guard's lifetime.
    pub fn enable_grad(bridge: &Rc<Bridge>) -> Result<Self> {
        Self::enter(bridge, true)
    }

    /// The value that will be restored.
    pub fn previous(&self) -> bool {
        self.prev
    }

    /// The value this guard set.
    pub fn enabled(&self) -> bool {
        self.enabled
    }
}

impl Drop for GradModeGuard {
    fn drop(&mut self) {
        match self.bridge.engine().set_gradient_tracking_enabled(self.prev) {
            Ok(()) => debug!(restored = self.prev, "left gradient mode scope"),
            Err(e) => warn!(restored = self.prev, "failed to restore gradient tracking flag: {e}"),
        }
    }
}

/// Reads the flag without changing it.
pub fn is_grad_enabled(bridge: &Rc<Bridge>) -> Result<bool> {
    bridge.engine().gradient_tracking_enabled()
}

/// Runs `f` with tracking disabled.
///
/// The flag is restored after `f` returns or unwinds.
pub fn with_no_grad<R>(bridge: &Rc<Bridge>, f: impl FnOnce() -> R) -> Result<R> {
    let _guard = GradModeGuard::no_grad(bridge)?;
    Ok(f())
}
