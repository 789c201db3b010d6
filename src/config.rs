//! Bridge configuration.
//!
//! Configuration is small: default tolerances for `allclose` and whether every
//! forwarded call emits a `trace` event. Values come from, in order,
//! [`BridgeConfig::default`], an optional JSON document, and environment
//! overrides:
//!
//! - `BRINY_BRIDGE_RTOL` — relative tolerance for `allclose`
//! - `BRINY_BRIDGE_ATOL` — absolute tolerance for `allclose`
//! - `BRINY_BRIDGE_TRACE_CALLS` — `1`/`true` to trace every forwarded call
//!
//! ## Example
//!
//! ```rust
//! use briny_bridge::config::BridgeConfig;
//! let cfg = BridgeConfig::from_json(r#"{ "allclose": { "rtol": 1e-3 } }"#).unwrap();
//! assert_eq!(cfg.allclose.rtol, 1e-3);
//! assert_eq!(cfg.allclose.atol, 1e-8);
//! ```

use serde::Deserialize;

use crate::error::{Error, Result};

/// Environment variable overriding [`AllCloseDefaults::rtol`].
pub const ENV_RTOL: &str = "BRINY_BRIDGE_RTOL";
/// Environment variable overriding [`AllCloseDefaults::atol`].
pub const ENV_ATOL: &str = "BRINY_BRIDGE_ATOL";
/// Environment variable overriding [`BridgeConfig::trace_calls`].
pub const ENV_TRACE_CALLS: &str = "BRINY_BRIDGE_TRACE_CALLS";

/// Tolerances used when `allclose` is called without explicit values.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct AllCloseDefaults {
    pub rtol: f64,
    pub atol: f64,
    pub equal_nan: bool,
}

impl Default for AllCloseDefaults {
    fn default() -> Self {
        Self {
            rtol: 1e-5,
            atol: 1e-8,
            equal_nan: false,
        }
    }
}

/// Top-level configuration for a [`Bridge`](crate::handle::Bridge).
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub allclose: AllCloseDefaults,
    /// Emit a `trace` event for every forwarded call.
    pub trace_calls: bool,
}

impl BridgeConfig {
    /// Parses a JSON document; missing fields keep their defaults.
    ///
    /// # Errors
    /// [`Error::Config`] if the document is malformed.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }

    /// Defaults with environment overrides applied.
    ///
    /// # Errors
    /// [`Error::Config`] if a variable is set but unparsable.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary key lookup.
    ///
    /// # Errors
    /// [`Error::Config`] if a value is present but unparsable.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(v) = lookup(ENV_RTOL) {
            self.allclose.rtol = parse_float(ENV_RTOL, &v)?;
        }
        if let Some(v) = lookup(ENV_ATOL) {
            self.allclose.atol = parse_float(ENV_ATOL, &v)?;
        }
        if let Some(v) = lookup(ENV_TRACE_CALLS) {
            self.trace_calls = parse_flag(ENV_TRACE_CALLS, &v)?;
        }
        Ok(self)
    }
}

fn parse_float(key: &str, raw: &str) -> Result<f64> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Config(format!("{key}: expected a number, got `{raw}`")))
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(Error::Config(format!("{key}: expected a boolean, got `{raw}`"))),
    }
}
