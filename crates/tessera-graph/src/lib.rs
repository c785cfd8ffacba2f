//! Tessera Graph - Symbolic Variables, Operators and Evaluation
//!
//! This crate provides the symbolic layer the Tessera operators plug into:
//! statically typed variables, the `Op` contract, the scalar operations that
//! elementwise operators lift, and a `Function` evaluator that runs a graph
//! on concrete arrays.
//!
//! # Key Features
//! - `TensorType` with per-axis broadcast flags
//! - Append-only graph arena with topological ordering
//! - Built-in scalar operations with gradient rules over a shadow scalar graph
//! - Reference and specialized execution modes selected by `EvalConfig`
//!
//! # Example
//! ```rust
//! use tessera_graph::{EvalConfig, Function, Graph, Mode, TensorType};
//! use tessera_tensor::{Array, DType};
//!
//! let mut graph = Graph::new();
//! let x = graph.input("x", TensorType::new(DType::F32, &[false]));
//! let config = EvalConfig::new().mode(Mode::Reference);
//! let mut f = Function::new(&graph, &[x], &[x], config).unwrap();
//! let out = f.run(&[Array::from_vec(vec![1.0f32, 2.0], &[2]).unwrap()]).unwrap();
//! assert_eq!(out[0].to_vec::<f32>(), vec![1.0, 2.0]);
//! ```
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Graph/kernel-specific allowances
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

pub mod config;
pub mod function;
pub mod graph;
pub mod op;
pub mod printing;
pub mod scalar;
pub mod types;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{EvalConfig, Mode};
pub use function::Function;
pub use graph::{Apply, Graph, NodeId, VarId, Variable};
pub use op::{downcast_eq, NodeTypes, Op, OpRef, Signature, ViewMap};
pub use printing::pprint;
pub use scalar::{ScalarGraph, ScalarOp, ScalarOpRef, ScalarVar};
pub use types::{BroadcastPattern, TensorType};

// =============================================================================
// Prelude
// =============================================================================

/// Convenient imports for common usage.
pub mod prelude {
    pub use crate::config::{EvalConfig, Mode};
    pub use crate::function::Function;
    pub use crate::graph::{Graph, NodeId, VarId};
    pub use crate::op::{Op, OpRef};
    pub use crate::printing::pprint;
    pub use crate::scalar::{ScalarOp, ScalarOpRef};
    pub use crate::types::TensorType;
}
