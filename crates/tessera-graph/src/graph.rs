//! Graph - Symbolic Variables and Compute Nodes
//!
//! An append-only arena of typed variables and the `Apply` nodes that
//! produce them. Nodes are never mutated after creation; gradient rules and
//! rank normalization only ever add new nodes.
//!
//! # Key Features
//! - Typed input, constant and intermediate variables
//! - Node construction through `Op::make_node`
//! - Topological ordering restricted to what the requested outputs need
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use std::sync::Arc;

use rustc_hash::FxHashSet;
use tessera_core::error::{Error, Result};
use tessera_tensor::Array;
use tracing::debug;

use crate::op::{NodeTypes, Op, OpRef};
use crate::types::TensorType;

// =============================================================================
// Identifiers
// =============================================================================

/// Handle to a variable in a [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub(crate) usize);

impl VarId {
    /// Returns the raw index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Handle to a compute node in a [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Returns the raw index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

// =============================================================================
// Variables and Nodes
// =============================================================================

/// A typed symbolic value.
#[derive(Debug, Clone)]
pub struct Variable {
    /// Handle of this variable.
    pub id: VarId,
    /// Static type.
    pub ty: TensorType,
    /// Producing node and output index, for intermediates.
    pub owner: Option<(NodeId, usize)>,
    /// Optional display name.
    pub name: Option<String>,
    /// Fixed value, for constants.
    pub constant: Option<Array>,
}

/// Application of an op to input variables.
#[derive(Debug, Clone)]
pub struct Apply {
    /// Handle of this node.
    pub id: NodeId,
    /// The operator.
    pub op: OpRef,
    /// Input variables.
    pub inputs: Vec<VarId>,
    /// Output variables.
    pub outputs: Vec<VarId>,
}

// =============================================================================
// Graph
// =============================================================================

/// Arena of variables and nodes.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    vars: Vec<Variable>,
    nodes: Vec<Apply>,
}

impl Graph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push_var(
        &mut self,
        ty: TensorType,
        owner: Option<(NodeId, usize)>,
        name: Option<String>,
        constant: Option<Array>,
    ) -> VarId {
        let id = VarId(self.vars.len());
        self.vars.push(Variable {
            id,
            ty,
            owner,
            name,
            constant,
        });
        id
    }

    /// Adds a named free input variable.
    pub fn input(&mut self, name: &str, ty: TensorType) -> VarId {
        self.push_var(ty, None, Some(name.to_string()), None)
    }

    /// Adds a constant; unit axes of `value` become broadcastable.
    pub fn constant(&mut self, value: Array) -> VarId {
        let ty = TensorType::of_array(&value);
        self.push_var(ty, None, None, Some(value))
    }

    /// Names a variable for printing.
    pub fn set_name(&mut self, var: VarId, name: &str) {
        if let Some(v) = self.vars.get_mut(var.0) {
            v.name = Some(name.to_string());
        }
    }

    /// Returns a variable.
    ///
    /// # Panics
    /// Panics if `id` did not come from this graph.
    #[must_use]
    pub fn var(&self, id: VarId) -> &Variable {
        &self.vars[id.0]
    }

    /// Returns the static type of a variable.
    #[must_use]
    pub fn ty(&self, id: VarId) -> &TensorType {
        &self.var(id).ty
    }

    /// Returns a node.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &Apply {
        &self.nodes[id.0]
    }

    /// Returns the node that produced `var`, if any.
    #[must_use]
    pub fn owner(&self, var: VarId) -> Option<&Apply> {
        self.var(var).owner.map(|(node, _)| self.node(node))
    }

    /// All variables, in creation order.
    #[must_use]
    pub fn variables(&self) -> &[Variable] {
        &self.vars
    }

    /// All nodes, in creation order.
    #[must_use]
    pub fn nodes(&self) -> &[Apply] {
        &self.nodes
    }

    /// Static operand types of a node.
    #[must_use]
    pub fn node_types(&self, id: NodeId) -> NodeTypes {
        let node = self.node(id);
        NodeTypes {
            inputs: node.inputs.iter().map(|&v| self.ty(v).clone()).collect(),
            outputs: node.outputs.iter().map(|&v| self.ty(v).clone()).collect(),
        }
    }

    fn check_vars(&self, inputs: &[VarId]) -> Result<()> {
        match inputs.iter().find(|v| v.0 >= self.vars.len()) {
            Some(bad) => Err(Error::invalid_operation(format!(
                "variable {} does not belong to this graph",
                bad.0
            ))),
            None => Ok(()),
        }
    }

    /// Applies `op` to `inputs` and returns the new node.
    pub fn apply_ref(&mut self, op: OpRef, inputs: &[VarId]) -> Result<NodeId> {
        self.check_vars(inputs)?;
        let signature = op.make_node(self, inputs)?;
        self.check_vars(&signature.inputs)?;

        let id = NodeId(self.nodes.len());
        let outputs = signature
            .outputs
            .into_iter()
            .enumerate()
            .map(|(i, ty)| self.push_var(ty, Some((id, i)), None, None))
            .collect::<Vec<_>>();
        debug!(op = %op, node = id.0, inputs = ?signature.inputs, "applied node");
        self.nodes.push(Apply {
            id,
            op,
            inputs: signature.inputs,
            outputs,
        });
        Ok(id)
    }

    /// Applies `op` to `inputs` and returns the new node.
    pub fn apply<O: Op>(&mut self, op: O, inputs: &[VarId]) -> Result<NodeId> {
        self.apply_ref(Arc::new(op), inputs)
    }

    /// Applies a single-output op and returns its output variable.
    pub fn call<O: Op>(&mut self, op: O, inputs: &[VarId]) -> Result<VarId> {
        self.call_ref(Arc::new(op), inputs)
    }

    /// Applies a single-output shared op and returns its output variable.
    pub fn call_ref(&mut self, op: OpRef, inputs: &[VarId]) -> Result<VarId> {
        let node = self.apply_ref(op, inputs)?;
        match self.node(node).outputs.as_slice() {
            [out] => Ok(*out),
            outs => Err(Error::invalid_operation(format!(
                "expected a single output, node has {}",
                outs.len()
            ))),
        }
    }

    /// Nodes needed to compute `outputs`, each after all of its producers.
    #[must_use]
    pub fn toposort(&self, outputs: &[VarId]) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut visited: FxHashSet<NodeId> = FxHashSet::default();
        // (node, inputs already expanded)
        let mut stack: Vec<(NodeId, bool)> = outputs
            .iter()
            .rev()
            .filter_map(|&v| self.var(v).owner.map(|(n, _)| (n, false)))
            .collect();

        while let Some((node, expanded)) = stack.pop() {
            if expanded {
                if visited.insert(node) {
                    order.push(node);
                }
                continue;
            }
            if visited.contains(&node) {
                continue;
            }
            stack.push((node, true));
            for &input in self.node(node).inputs.iter().rev() {
                if let Some((producer, _)) = self.var(input).owner {
                    if !visited.contains(&producer) {
                        stack.push((producer, false));
                    }
                }
            }
        }
        order
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::Signature;
    use core::any::Any;
    use core::fmt;
    use tessera_core::dtype::DType;

    /// Adds one to every element; enough to exercise graph plumbing.
    #[derive(Debug, PartialEq)]
    struct Bump;

    impl fmt::Display for Bump {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "Bump")
        }
    }

    impl Op for Bump {
        fn make_node(&self, graph: &mut Graph, inputs: &[VarId]) -> Result<Signature> {
            Ok(Signature {
                inputs: inputs.to_vec(),
                outputs: vec![graph.ty(inputs[0]).clone()],
            })
        }

        fn perform(
            &self,
            _node: &NodeTypes,
            inputs: &[Array],
            outputs: &mut [Option<Array>],
        ) -> Result<()> {
            let bumped: Vec<f64> = inputs[0].to_vec::<f64>().iter().map(|x| x + 1.0).collect();
            outputs[0] = Some(Array::from_vec(bumped, inputs[0].shape())?);
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn op_eq(&self, other: &dyn Op) -> bool {
            crate::op::downcast_eq(self, other)
        }

        fn op_hash(&self) -> u64 {
            7
        }
    }

    #[test]
    fn test_apply_records_owner() {
        let mut g = Graph::new();
        let x = g.input("x", TensorType::new(DType::F64, &[false]));
        let y = g.call(Bump, &[x]).unwrap();
        let node = g.owner(y).unwrap();
        assert_eq!(node.inputs, vec![x]);
        assert_eq!(node.op.to_string(), "Bump");
        assert!(g.owner(x).is_none());
    }

    #[test]
    fn test_toposort_orders_producers_first() {
        let mut g = Graph::new();
        let x = g.input("x", TensorType::new(DType::F64, &[false]));
        let a = g.call(Bump, &[x]).unwrap();
        let b = g.call(Bump, &[a]).unwrap();
        let _unused = g.call(Bump, &[x]).unwrap();
        let order = g.toposort(&[b]);
        assert_eq!(order.len(), 2);
        assert_eq!(g.node(order[0]).outputs, vec![a]);
        assert_eq!(g.node(order[1]).outputs, vec![b]);
    }

    #[test]
    fn test_dyn_op_equality() {
        let a: OpRef = Arc::new(Bump);
        let b: OpRef = Arc::new(Bump);
        assert!(*a == *b);
    }

    #[test]
    fn test_foreign_variable_rejected() {
        let mut g = Graph::new();
        assert!(g.call(Bump, &[VarId(3)]).is_err());
    }
}
