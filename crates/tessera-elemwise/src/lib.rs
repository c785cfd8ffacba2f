//! Tessera Elemwise - Broadcasting Operators, Reductions and Gradients
//!
//! The operator layer of Tessera: `DimShuffle` rearranges axes as views,
//! `Elemwise` lifts a scalar operation over broadcast arrays, `CAReduce`
//! and `Sum` fold along axes, and `grad` differentiates graphs built from
//! them. Every operator runs along a reference path and a specialized
//! loop-nest path and can emit kernel source for the latter.
//!
//! # Key Features
//! - Static broadcasting with rank padding and in-place outputs
//! - Reductions seeded with the scalar op's identity
//! - Symbolic gradients through a shadow scalar graph
//! - Structural equality, hashing and serde for every operator
//!
//! # Example
//! ```rust
//! use tessera_elemwise::functional::{add, sum};
//! use tessera_graph::{Function, Graph, TensorType};
//! use tessera_tensor::{Array, DType};
//!
//! let mut graph = Graph::new();
//! let x = graph.input("x", TensorType::new(DType::F64, &[false, false]));
//! let row = graph.input("row", TensorType::new(DType::F64, &[true, false]));
//! let y = add(&mut graph, x, row).unwrap();
//! let total = sum(&mut graph, y, None).unwrap();
//!
//! let mut f = Function::compile(&graph, &[x, row], &[total]).unwrap();
//! let out = f
//!     .run(&[
//!         Array::from_vec(vec![1.0f64, 2.0, 3.0, 4.0], &[2, 2]).unwrap(),
//!         Array::from_vec(vec![10.0f64, 20.0], &[1, 2]).unwrap(),
//!     ])
//!     .unwrap();
//! assert_eq!(out[0].to_vec::<f64>(), vec![70.0]);
//! ```
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Kernel-specific allowances
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::format_push_string)]

// =============================================================================
// Modules
// =============================================================================

pub mod careduce;
pub mod codegen;
pub mod dimshuffle;
pub mod elemwise;
pub mod functional;
pub mod gradient;
pub mod loops;

// =============================================================================
// Re-exports
// =============================================================================

pub use careduce::{sum_dtype, CAReduce, Sum};
pub use codegen::{IterOrder, Kernel};
pub use dimshuffle::{Axis, DimShuffle};
pub use elemwise::{broadcast_extents, Elemwise, Lifted};
pub use gradient::grad;
pub use loops::LoopPlan;

/// Structural hash shared by the operators; stable within a build.
pub(crate) fn fx_hash<T: core::hash::Hash + ?Sized>(value: &T) -> u64 {
    use core::hash::Hasher;
    let mut hasher = rustc_hash::FxHasher::default();
    value.hash(&mut hasher);
    hasher.finish()
}

// =============================================================================
// Prelude
// =============================================================================

/// Convenient imports for common usage.
pub mod prelude {
    pub use crate::careduce::{CAReduce, Sum};
    pub use crate::dimshuffle::{Axis, DimShuffle};
    pub use crate::elemwise::Elemwise;
    pub use crate::functional;
    pub use crate::gradient::grad;
    pub use crate::order;
}
