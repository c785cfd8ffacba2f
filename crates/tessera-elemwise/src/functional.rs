//! Functional - Graph-Building Shorthands
//!
//! Free functions that apply the elementwise, shuffle and reduction ops to
//! graph variables, so expressions read like arithmetic instead of node
//! construction.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use tessera_core::error::Result;
use tessera_core::value::Value;
use tessera_graph::scalar::{self, ScalarOpRef};
use tessera_graph::{Graph, VarId};
use tessera_tensor::Array;

use crate::careduce::{CAReduce, Sum};
use crate::dimshuffle::{Axis, DimShuffle};
use crate::elemwise::Elemwise;

// =============================================================================
// Elementwise
// =============================================================================

/// Applies `op` elementwise to `inputs`, broadcasting them together.
pub fn elemwise(graph: &mut Graph, op: ScalarOpRef, inputs: &[VarId]) -> Result<VarId> {
    graph.call(Elemwise::new(op), inputs)
}

/// `a + b`
pub fn add(graph: &mut Graph, a: VarId, b: VarId) -> Result<VarId> {
    elemwise(graph, scalar::add(), &[a, b])
}

/// `a - b`
pub fn sub(graph: &mut Graph, a: VarId, b: VarId) -> Result<VarId> {
    elemwise(graph, scalar::sub(), &[a, b])
}

/// `a * b`
pub fn mul(graph: &mut Graph, a: VarId, b: VarId) -> Result<VarId> {
    elemwise(graph, scalar::mul(), &[a, b])
}

/// `a / b`, always floating point.
pub fn true_div(graph: &mut Graph, a: VarId, b: VarId) -> Result<VarId> {
    elemwise(graph, scalar::true_div(), &[a, b])
}

/// Elementwise maximum.
pub fn maximum(graph: &mut Graph, a: VarId, b: VarId) -> Result<VarId> {
    elemwise(graph, scalar::maximum(), &[a, b])
}

/// Elementwise minimum.
pub fn minimum(graph: &mut Graph, a: VarId, b: VarId) -> Result<VarId> {
    elemwise(graph, scalar::minimum(), &[a, b])
}

/// `-x`
pub fn neg(graph: &mut Graph, x: VarId) -> Result<VarId> {
    elemwise(graph, scalar::neg(), &[x])
}

/// `e^x`
pub fn exp(graph: &mut Graph, x: VarId) -> Result<VarId> {
    elemwise(graph, scalar::exp(), &[x])
}

/// Natural logarithm.
pub fn log(graph: &mut Graph, x: VarId) -> Result<VarId> {
    elemwise(graph, scalar::log(), &[x])
}

/// `x * x`
pub fn sqr(graph: &mut Graph, x: VarId) -> Result<VarId> {
    elemwise(graph, scalar::sqr(), &[x])
}

/// A variable shaped like `like` and filled with `value`.
///
/// Built as a broadcast of a scalar constant, so nothing is stored per
/// element until execution.
pub fn fill_like(graph: &mut Graph, like: VarId, value: Value) -> Result<VarId> {
    let nd = graph.ty(like).ndim();
    let constant = graph.constant(Array::scalar_value(value));
    let expanded = if nd == 0 {
        constant
    } else {
        graph.call(DimShuffle::new(&[], vec![Axis::Insert; nd], true)?, &[constant])?
    };
    elemwise(graph, scalar::second(), &[like, expanded])
}

/// Zeros shaped and typed like `like`.
pub fn zeros_like(graph: &mut Graph, like: VarId) -> Result<VarId> {
    let dtype = graph.ty(like).dtype;
    fill_like(graph, like, Value::zero(dtype))
}

// =============================================================================
// Shuffles
// =============================================================================

/// Reorders, drops and inserts axes of `x`.
pub fn dimshuffle(graph: &mut Graph, x: VarId, order: Vec<Axis>) -> Result<VarId> {
    let pattern = graph.ty(x).broadcastable.clone();
    graph.call(DimShuffle::new(&pattern, order, false)?, &[x])
}

/// Reverses the axes of `x`.
pub fn transpose(graph: &mut Graph, x: VarId) -> Result<VarId> {
    let order = (0..graph.ty(x).ndim()).rev().map(Axis::Input).collect();
    dimshuffle(graph, x, order)
}

// =============================================================================
// Reductions
// =============================================================================

/// Sum over `axis`, or over everything for `None`.
pub fn sum(graph: &mut Graph, x: VarId, axis: Option<&[usize]>) -> Result<VarId> {
    graph.call(Sum::new(axis), &[x])
}

/// Folds `op` over `axis`, or over everything for `None`.
pub fn reduce(graph: &mut Graph, op: ScalarOpRef, x: VarId, axis: Option<&[usize]>) -> Result<VarId> {
    graph.call(CAReduce::new(op, axis)?, &[x])
}

/// Maximum over `axis`, or over everything for `None`.
pub fn max(graph: &mut Graph, x: VarId, axis: Option<&[usize]>) -> Result<VarId> {
    reduce(graph, scalar::maximum(), x, axis)
}

// =============================================================================
// Tests
// =============================================================================
