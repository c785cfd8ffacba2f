//! # Tessera - Broadcasting Elementwise and Reduction Engine
//!
//! Tessera builds symbolic array expressions out of three operator families
//! and runs them on strided n-dimensional arrays:
//!
//! ## Core Features
//!
//! - **Arrays**: dtype-tagged strided storage with views, unit-axis edits and casts
//! - **Graphs**: typed variables with static broadcast flags, compiled into `Function`s
//! - **DimShuffle**: axis permutation, insertion and removal as zero-copy views
//! - **Elemwise**: any scalar op lifted over broadcast operands, optionally in place
//! - **Reductions**: `CAReduce` over commutative-associative ops and a widening `Sum`
//! - **Gradients**: symbolic reverse mode through the same operators
//! - **Codegen**: loop-nest kernel source for the specialized execution path
//!
//! # Quick Start
//!
//! ```rust
//! use tessera::prelude::*;
//!
//! let mut graph = Graph::new();
//! let x = graph.input("x", TensorType::new(DType::F64, &[false, false]));
//! let cost = functional::sum(&mut graph, x, None).unwrap();
//! let gx = grad(&mut graph, cost, &[x], None).unwrap()[0].unwrap();
//!
//! let mut f = Function::compile(&graph, &[x], &[cost, gx]).unwrap();
//! let out = f.run(&[ones(DType::F64, &[2, 3])]).unwrap();
//! assert_eq!(out[0].to_vec::<f64>(), vec![6.0]);
//! assert_eq!(out[1].to_vec::<f64>(), vec![1.0; 6]);
//! ```
//!
//! # Execution Modes
//!
//! `Mode::Reference` runs each op's generic per-element path.
//! `Mode::Specialized` (the default) runs stride-driven loop nests and
//! reuses output storage across runs. Both produce identical results; the
//! `TESSERA_MODE` environment variable selects one through
//! `EvalConfig::from_env`.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]

// =============================================================================
// Crate Re-exports
// =============================================================================

pub use tessera_core as core;

pub use tessera_tensor as tensor;

pub use tessera_graph as graph;

pub use tessera_elemwise as elemwise;

// =============================================================================
// Item Re-exports
// =============================================================================

pub use tessera_core::{DType, Error, Result, Value};
pub use tessera_elemwise::{functional, grad, order, Axis, CAReduce, DimShuffle, Elemwise, Sum};
pub use tessera_graph::{EvalConfig, Function, Graph, Mode, TensorType, VarId};
pub use tessera_tensor::Array;

// =============================================================================
// Prelude
// =============================================================================

/// Common imports for building and running expressions.
pub mod prelude {
    pub use tessera_core::{DType, Error, Result, Value};
    pub use tessera_elemwise::prelude::*;
    pub use tessera_graph::prelude::*;
    pub use tessera_graph::scalar;
    pub use tessera_tensor::{arange, ones, zeros, Array};
}
