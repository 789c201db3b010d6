//! Owned foreign handles and the bridge they belong to.
//!
//! A [`Bridge`] pairs one [`ForeignEngine`] with one [`Marshal`] collaborator
//! and the active [`BridgeConfig`]. Everything that talks to the foreign side
//! holds an `Rc<Bridge>`.
//!
//! A [`Handle`] is one foreign tensor reference owned by the host. Clones share
//! that reference; when the last clone drops the reference is given back with
//! [`ForeignEngine::release`]. The foreign buffer itself lives as long as the
//! engine keeps other references to it, so dropping a handle never destroys data
//! something else still points at.
//!
//! Both types are `!Send`: the foreign runtime and its gradient flag are
//! single-threaded shared state.

use core::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::config::BridgeConfig;
use crate::engine::{ForeignEngine, Marshal, Target};
use crate::error::Result;
use crate::value::{ForeignValue, HandleId};

/// One engine, one marshaller, one configuration.
pub struct Bridge {
    engine: Rc<dyn ForeignEngine>,
    marshal: Rc<dyn Marshal>,
    config: BridgeConfig,
}

impl Bridge {
    /// Creates a bridge with [`BridgeConfig::default`].
    pub fn new(engine: Rc<dyn ForeignEngine>, marshal: Rc<dyn Marshal>) -> Rc<Self> {
        Self::with_config(engine, marshal, BridgeConfig::default())
    }

    /// Creates a bridge with an explicit configuration.
    pub fn with_config(
        engine: Rc<dyn ForeignEngine>,
        marshal: Rc<dyn Marshal>,
        config: BridgeConfig,
    ) -> Rc<Self> {
        Rc::new(Self {
            engine,
            marshal,
            config,
        })
    }

    pub fn engine(&self) -> &dyn ForeignEngine {
        &*self.engine
    }

    pub fn marshal(&self) -> &dyn Marshal {
        &*self.marshal
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Forwards one call to the engine, tracing it when configured to.
    pub(crate) fn invoke(
        &self,
        target: Target,
        name: &str,
        args: &[ForeignValue],
        kwargs: &[(String, ForeignValue)],
    ) -> Result<ForeignValue> {
        if self.config.trace_calls {
            trace!(?target, op = name, args = args.len(), kwargs = kwargs.len(), "forwarding");
        }
        self.engine.invoke(target, name, args, kwargs)
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge").field("config", &self.config).finish_non_exhaustive()
    }
}

struct HandleInner {
    id: HandleId,
    bridge: Rc<Bridge>,
}

impl Drop for HandleInner {
    fn drop(&mut self) {
        self.bridge.engine.release(self.id);
    }
}

/// A host-owned reference to one foreign tensor.
#[derive(Clone)]
pub struct Handle {
    inner: Rc<HandleInner>,
}

impl Handle {
    /// Takes ownership of a reference the engine just returned.
    ///
    /// The id must be a fresh reference (from `invoke` or
    /// [`Marshal::create_tensor_from_host_data`]); it is released exactly once.
    pub fn adopt(bridge: &Rc<Bridge>, id: HandleId) -> Self {
        Self {
            inner: Rc::new(HandleInner {
                id,
                bridge: Rc::clone(bridge),
            }),
        }
    }

    /// The borrowed id to pass as a call argument.
    pub fn id(&self) -> HandleId {
        self.inner.id
    }

    pub fn bridge(&self) -> &Rc<Bridge> {
        &self.inner.bridge
    }

    /// Number of host-side clones sharing this reference.
    pub fn host_refs(&self) -> usize {
        Rc::strong_count(&self.inner)
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", self.inner.id)
    }
}
