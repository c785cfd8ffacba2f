//! Operators - The Contract Every Graph Operation Implements
//!
//! An `Op` is an immutable descriptor. Applying it to variables type-checks
//! them and yields the output types (`make_node`); executing it maps input
//! arrays to output arrays along a reference path (`perform`) or a
//! specialized loop-nest path (`perform_specialized`); differentiating it
//! builds new graph fragments (`grad`).
//!
//! # Key Features
//! - Dynamic structural equality and hashing across operator types
//! - Declared aliasing: `view_map` for views, `destroy_map` for in-place
//! - Optional source emission for specialized kernels
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use core::any::Any;
use core::fmt;
use core::hash::{Hash, Hasher};
use std::collections::BTreeMap;
use std::sync::Arc;

use tessera_core::error::{Error, Result};
use tessera_tensor::Array;

use crate::graph::{Graph, VarId};
use crate::types::TensorType;

// =============================================================================
// Supporting Types
// =============================================================================

/// Output index → input indices it aliases.
pub type ViewMap = BTreeMap<usize, Vec<usize>>;

/// Shared handle to an operator descriptor.
pub type OpRef = Arc<dyn Op>;

/// What `make_node` decided: the (possibly rewritten) inputs and the
/// output types.
#[derive(Debug, Clone)]
pub struct Signature {
    /// Inputs the node is actually built on, after any rank padding.
    pub inputs: Vec<VarId>,
    /// Type of each output.
    pub outputs: Vec<TensorType>,
}

/// Static types of a node's operands, handed to execution.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeTypes {
    /// Input types, in order.
    pub inputs: Vec<TensorType>,
    /// Output types, in order.
    pub outputs: Vec<TensorType>,
}

// =============================================================================
// Op Trait
// =============================================================================

/// A graph operation.
pub trait Op: fmt::Debug + fmt::Display + Send + Sync + 'static {
    /// Type-checks `inputs` and returns the node signature.
    ///
    /// May add helper nodes to `graph` (for example rank padding) and return
    /// their outputs in place of the original inputs.
    fn make_node(&self, graph: &mut Graph, inputs: &[VarId]) -> Result<Signature>;

    /// Reference execution.
    ///
    /// `outputs` holds one slot per output; a slot may carry storage from a
    /// previous run that the op is free to reuse.
    fn perform(&self, node: &NodeTypes, inputs: &[Array], outputs: &mut [Option<Array>])
        -> Result<()>;

    /// Specialized execution. Defaults to the reference path.
    fn perform_specialized(
        &self,
        node: &NodeTypes,
        inputs: &[Array],
        outputs: &mut [Option<Array>],
    ) -> Result<()> {
        self.perform(node, inputs, outputs)
    }

    /// Emits kernel source for this node, if the op supports it.
    fn c_code(&self, _node: &NodeTypes, _inputs: &[String], _outputs: &[String]) -> Result<Option<String>> {
        Ok(None)
    }

    /// Builds gradient expressions for each input given one gradient per
    /// output. `None` marks an input with no defined derivative.
    fn grad(
        &self,
        _graph: &mut Graph,
        _inputs: &[VarId],
        _output_grads: &[VarId],
    ) -> Result<Vec<Option<VarId>>> {
        Err(Error::invalid_operation(format!("{self} has no gradient")))
    }

    /// Outputs that are views of inputs.
    fn view_map(&self) -> ViewMap {
        ViewMap::new()
    }

    /// Outputs that overwrite inputs.
    fn destroy_map(&self) -> ViewMap {
        ViewMap::new()
    }

    /// Renders an application of this op given rendered inputs.
    fn pretty(&self, _node: &NodeTypes, inputs: &[String]) -> String {
        format!("{self}({})", inputs.join(", "))
    }

    /// Upcast for structural comparison.
    fn as_any(&self) -> &dyn Any;

    /// Structural equality with any other op.
    fn op_eq(&self, other: &dyn Op) -> bool;

    /// Structural hash, consistent with `op_eq`.
    fn op_hash(&self) -> u64;
}

/// `op_eq` for ops whose structural equality is their `PartialEq`.
pub fn downcast_eq<T: Op + PartialEq>(this: &T, other: &dyn Op) -> bool {
    other
        .as_any()
        .downcast_ref::<T>()
        .is_some_and(|other| other == this)
}

impl PartialEq for dyn Op {
    fn eq(&self, other: &Self) -> bool {
        self.op_eq(other)
    }
}

impl Eq for dyn Op {}

impl Hash for dyn Op {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.op_hash());
    }
}
