//! briny_bridge: host-side tensors that live in a foreign autograd engine.
//!
//! The tensors you hold here are proxies. Storage, math, the autograd graph and
//! the backward pass all live in a separate engine reachable only through opaque
//! handles. This crate supplies the proxy discipline around that engine:
//! wrapping handles, forwarding calls by name, rewrapping results, and scoping
//! the engine's global gradient-tracking flag.
//!
//! # Features
//!
//! - [`Tensor`] wraps one foreign handle with operators, `sum`, `reshape`,
//!   `allclose`, `backward`, `grad`, iteration and formatting.
//! - [`Torch`] mirrors the engine namespace (`cat`, `ones`, `sin`, ...).
//! - Any operation the wrapper does not model is still one [`Tensor::call`] or
//!   [`Torch::call`] away; unknown names are the engine's problem, not ours.
//! - [`GradModeGuard`] disables (or enables) gradient tracking for a scope and
//!   restores the exact prior value on exit, nesting safely.
//!
//! # Collaborators
//!
//! Plug in a runtime by implementing [`engine::ForeignEngine`] (invoke by name,
//! gradient flag, reference release) and [`engine::Marshal`] (host data to and
//! from foreign tensors), then build a [`Bridge`] from them.
//!
//! # Modules
//!
//! - [`value`] — Values crossing the boundary.
//! - [`engine`] — Collaborator traits.
//! - [`handle`] — Owned foreign handles and the [`Bridge`].
//! - [`ops`] — Operator table shared by every binary operator.
//! - [`tensor`] — The tensor wrapper.
//! - [`grad_mode`] — Scoped gradient-tracking guards.
//! - [`torch`] — The namespace facade.
//! - [`config`] — Defaults and environment overrides.
//! - [`error`] — Error taxonomy.
//!
//! # Threading
//!
//! Single-threaded. The gradient flag is process-wide foreign state and the
//! bridge types are `!Send`.
//!
//! # Example
//!
//! ```rust,ignore
//! use briny_bridge::{Bridge, Torch};
//!
//! let torch = Torch::new(Bridge::new(engine.clone(), engine));
//! let a = torch.tensor(vec![1.0, 2.0], true)?.unwrap();
//! a.sum(-1, false)?.backward()?;
//! println!("{:?}", a.grad()?); // Some(Tensor(data=[1.0, 1.0]))
//! ```
//!
pub mod config;
pub mod engine;
pub mod error;
mod forward;
pub mod grad_mode;
pub mod handle;
pub mod ops;
pub mod tensor;
pub mod torch;
pub mod value;

pub use config::BridgeConfig;
pub use error::{Error, Result};
pub use grad_mode::GradModeGuard;
pub use handle::{Bridge, Handle};
pub use tensor::{Scalar, Tensor, TensorData};
pub use torch::Torch;
pub use value::{ForeignValue, HandleId, HostData, Value};
