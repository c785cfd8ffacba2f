//! Tessera Tensor - Strided N-Dimensional Arrays
//!
//! This crate provides the `Array` type every Tessera operator consumes and
//! produces. Arrays are dynamically typed strided views over shared storage,
//! so permutations and unit-axis insertions never copy data.
//!
//! # Key Features
//! - N-dimensional arrays with arbitrary shape and element strides
//! - Zero-copy views (permute, transpose, unit-axis insert/remove)
//! - Per-element access through tagged `Value`s
//! - Output storage reuse when a buffer is not aliased
//!
//! # Example
//! ```rust
//! use tessera_tensor::{arange, DType};
//!
//! let a = arange(DType::F32, &[2, 3]).unwrap();
//! let t = a.transpose();
//! assert_eq!(t.shape(), &[3, 2]);
//! assert_eq!(t.to_vec::<f32>(), vec![0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);
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

pub mod array;
pub mod creation;
pub mod shape;

// =============================================================================
// Re-exports
// =============================================================================

pub use array::Array;
pub use creation::{arange, ones, ones_like, zeros};
pub use shape::{Shape, Strides};
pub use tessera_core::{DType, Element, Error, Result, Value};

// =============================================================================
// Prelude
// =============================================================================

/// Convenient imports for common usage.
pub mod prelude {
    pub use crate::array::Array;
    pub use crate::shape::{Shape, Strides};
    pub use crate::{arange, ones, zeros};
    pub use tessera_core::{DType, Element, Error, Result, Value};
}
