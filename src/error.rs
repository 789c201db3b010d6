//! Error taxonomy shared by every forwarding path.
//!
//! The bridge never swallows or translates a failure. Errors raised inside the
//! foreign engine travel back to the caller exactly as the engine reported them;
//! the only errors produced host-side are type checks on what came back across
//! the boundary (`NotATensor`) and configuration parsing.
//!
//! Absent values are *not* errors: constructing a tensor from nothing, or
//! reading a gradient that was never populated, yields `None`.

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Every failure that can surface from a bridged call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// The foreign engine raised while executing `op`.
    #[error("foreign operation `{op}` failed: {message}")]
    Foreign { op: String, message: String },

    /// The foreign engine has no operation with this name.
    #[error("foreign engine has no attribute `{name}`")]
    UnknownAttribute { name: String },

    /// The foreign engine rejected the call for the given operand (e.g. `item()` on
    /// a tensor with more than one element).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// The marshalling collaborator could not convert a value.
    #[error("marshalling failed: {0}")]
    Marshal(String),

    /// An operation that always yields a tensor came back with something else.
    #[error("foreign operation `{op}` did not return a tensor")]
    NotATensor { op: String },

    /// Configuration could not be parsed.
    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    /// Shorthand for [`Error::Foreign`].
    pub fn foreign(op: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Foreign {
            op: op.into(),
            message: message.into(),
        }
    }

    /// Shorthand for [`Error::UnknownAttribute`].
    pub fn unknown(name: impl Into<String>) -> Self {
        Self::UnknownAttribute { name: name.into() }
    }
}
