//! Gradient - Symbolic Reverse-Mode Differentiation
//!
//! Walks the nodes between a cost and the requested variables in reverse
//! topological order, asking each op for the gradient expressions of its
//! inputs and summing contributions that reach a variable along several
//! paths. The result is more graph, not numbers; compile it with
//! `Function` to evaluate.
//!
//! # Key Features
//! - Scalar costs seeded with one, or any cost with an explicit seed
//! - Missing output gradients of multi-output nodes filled with zeros
//! - Only nodes connected to a requested variable are differentiated
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use rustc_hash::{FxHashMap, FxHashSet};
use tessera_core::error::{Error, Result};
use tessera_core::value::Value;
use tessera_graph::{Graph, VarId};
use tessera_tensor::Array;
use tracing::{debug, trace};

use crate::functional;

// =============================================================================
// Gradient
// =============================================================================

/// Builds `d cost / d v` for every `v` in `wrt`.
///
/// Without a `seed` the cost must be rank 0 and is seeded with one. A seed
/// must have the cost's type. An entry is `None` when the variable does not
/// influence the cost or the only paths to it have no defined derivative
/// (discrete inputs).
pub fn grad(graph: &mut Graph, cost: VarId, wrt: &[VarId], seed: Option<VarId>) -> Result<Vec<Option<VarId>>> {
    let cost_ty = graph.ty(cost).clone();
    let seed = match seed {
        Some(seed) => {
            if graph.ty(seed).ndim() != cost_ty.ndim() {
                return Err(Error::type_error(format!(
                    "gradient seed of type {} does not match cost of type {cost_ty}",
                    graph.ty(seed)
                )));
            }
            seed
        }
        None if cost_ty.ndim() == 0 => graph.constant(Array::scalar_value(Value::one(cost_ty.dtype))),
        None => {
            return Err(Error::type_error(format!(
                "cost must be a scalar to be differentiated without a seed, got {cost_ty}"
            )))
        }
    };

    let order = graph.toposort(&[cost]);

    // Forward pass: which variables depend on something in `wrt`.
    let mut connected: FxHashSet<VarId> = wrt.iter().copied().collect();
    for &node in &order {
        let apply = graph.node(node);
        if apply.inputs.iter().any(|v| connected.contains(v)) {
            connected.extend(apply.outputs.iter().copied());
        }
    }
    if !connected.contains(&cost) {
        debug!(cost = cost.index(), "cost does not depend on any requested variable");
        return Ok(vec![None; wrt.len()]);
    }

    let mut grads: FxHashMap<VarId, VarId> = FxHashMap::default();
    grads.insert(cost, seed);

    for &node in order.iter().rev() {
        let apply = graph.node(node).clone();
        if !apply.outputs.iter().any(|v| grads.contains_key(v)) {
            continue;
        }
        if !apply.inputs.iter().any(|v| connected.contains(v)) {
            continue;
        }

        let mut output_grads = Vec::with_capacity(apply.outputs.len());
        for &output in &apply.outputs {
            let g = match grads.get(&output) {
                Some(&g) => g,
                None => functional::zeros_like(graph, output)?,
            };
            output_grads.push(g);
        }

        trace!(op = %apply.op, node = node.index(), "differentiating");
        let input_grads = apply.op.grad(graph, &apply.inputs, &output_grads)?;
        if input_grads.len() != apply.inputs.len() {
            return Err(Error::invalid_operation(format!(
                "{} returned {} gradients for {} inputs",
                apply.op,
                input_grads.len(),
                apply.inputs.len()
            )));
        }

        for (&input, g) in apply.inputs.iter().zip(input_grads) {
            let Some(g) = g else { continue };
            if !connected.contains(&input) {
                continue;
            }
            let total = match grads.get(&input) {
                Some(&previous) => functional::add(graph, previous, g)?,
                None => g,
            };
            grads.insert(input, total);
        }
    }

    debug!(cost = cost.index(), wrt = wrt.len(), "built gradient graph");
    Ok(wrt.iter().map(|v| grads.get(v).copied()).collect())
}

// =============================================================================
// Tests
// =============================================================================
