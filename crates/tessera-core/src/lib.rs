//! Tessera Core - Foundation Layer for the Tessera Array Engine
//!
//! This crate provides the core abstractions every other Tessera crate builds
//! on: element types, dynamically typed scalar values, shared typed storage,
//! and the unified error type.
//!
//! # Key Features
//! - Runtime dtype system (bool, signed/unsigned integers, f32, f64)
//! - Numpy-style type promotion
//! - Reference-counted storage shared between array views
//! - One error enum covering construction, typing and execution failures
//!
//! # Example
//! ```rust
//! use tessera_core::{DType, Storage, Value};
//!
//! let storage = Storage::zeros(DType::F32, 1024);
//! assert_eq!(storage.read().get(0), Value::F32(0.0));
//! ```
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Array/kernel-specific allowances
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::format_push_string)]
#![allow(clippy::unnecessary_wraps)]

// =============================================================================
// Modules
// =============================================================================

pub mod dtype;
pub mod error;
pub mod storage;
pub mod value;

// =============================================================================
// Re-exports
// =============================================================================

pub use dtype::{DType, Element};
pub use error::{Error, Result};
pub use storage::{Buffer, Storage};
pub use value::Value;

// =============================================================================
// Prelude
// =============================================================================

/// Convenient imports for common usage.
pub mod prelude {
    pub use crate::dtype::{DType, Element};
    pub use crate::error::{Error, Result};
    pub use crate::storage::{Buffer, Storage};
    pub use crate::value::Value;
}
