//! Evaluation Configuration
//!
//! Selects which execution path compiled functions use and how they manage
//! output storage. Built with a chained builder or read from the
//! environment.
//!
//! # Example
//! ```rust
//! use tessera_graph::config::{EvalConfig, Mode};
//!
//! let config = EvalConfig::new().mode(Mode::Reference).reuse_storage(false);
//! assert_eq!(config.mode, Mode::Reference);
//! ```
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use tessera_core::error::{Error, Result};

/// Environment variable selecting the execution mode.
pub const MODE_ENV: &str = "TESSERA_MODE";

/// Environment variable toggling output storage reuse.
pub const REUSE_ENV: &str = "TESSERA_REUSE_STORAGE";

// =============================================================================
// Execution Mode
// =============================================================================

/// Execution path used by compiled functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Generic per-element path; the behavioral reference.
    Reference,
    /// Loop nests specialized to operand rank and layout.
    #[default]
    Specialized,
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reference" | "py" => Ok(Self::Reference),
            "specialized" | "c" => Ok(Self::Specialized),
            other => Err(Error::configuration(format!(
                "unknown execution mode '{other}', expected 'reference' or 'specialized'"
            ))),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reference => write!(f, "reference"),
            Self::Specialized => write!(f, "specialized"),
        }
    }
}

// =============================================================================
// EvalConfig
// =============================================================================

/// Configuration for compiled functions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// Execution path.
    pub mode: Mode,
    /// Keep intermediate storage between runs and reuse it when unaliased.
    pub reuse_storage: bool,
    /// Type-check arguments against the input variables before running.
    pub check_inputs: bool,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            reuse_storage: true,
            check_inputs: true,
        }
    }
}

impl EvalConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set execution mode.
    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Builder: toggle storage reuse.
    pub fn reuse_storage(mut self, reuse: bool) -> Self {
        self.reuse_storage = reuse;
        self
    }

    /// Builder: toggle argument type checks.
    pub fn check_inputs(mut self, check: bool) -> Self {
        self.check_inputs = check;
        self
    }

    /// Defaults overridden by `TESSERA_MODE` and `TESSERA_REUSE_STORAGE`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(mode) = lookup(MODE_ENV) {
            config.mode = mode.parse()?;
        }
        if let Some(reuse) = lookup(REUSE_ENV) {
            config.reuse_storage = match reuse.trim() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                other => {
                    return Err(Error::configuration(format!(
                        "{REUSE_ENV} must be a boolean, got '{other}'"
                    )))
                }
            };
        }
        Ok(config)
    }
}

// =============================================================================
// Tests
// =============================================================================
