//! Elemwise - Broadcasting Scalar Operations over Arrays
//!
//! `Elemwise` lifts a `ScalarOp` to N-dimensional arrays with
//! numpy-style broadcasting. Lower-rank operands are left-padded with
//! broadcastable axes, outputs may overwrite inputs of the same layout, and
//! execution runs either the lifted reference callable or a strided loop nest
//! driven by each operand's broadcast pattern.
//!
//! # Key Features
//! - Rank padding through in-place `DimShuffle` nodes
//! - In-place outputs checked for legality when the node is built
//! - Reference and specialized paths producing identical results
//! - Kernel source emission with the scalar op inlined in the loop body
//! - Gradients lifted from the scalar op's shadow-graph rule
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use core::any::Any;
use core::fmt;
use std::collections::BTreeMap;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tessera_core::dtype::DType;
use tessera_core::error::{Error, Result};
use tessera_core::value::Value;
use tessera_graph::scalar::{self, check_arity, ScalarExpr, ScalarGraph, ScalarOpRef, ScalarVar};
use tessera_graph::{downcast_eq, Graph, NodeTypes, Op, Signature, TensorType, VarId, ViewMap};
use tessera_tensor::shape::{advance, broadcast_strides, linear_index, numel};
use tessera_tensor::{Array, Shape};
use tracing::{debug, trace};

use crate::careduce::Sum;
use crate::codegen::{broadcast_order, make_alias, make_alloc, make_checks, make_declare, make_loop, IterOrder, Kernel};
use crate::dimshuffle::{Axis, DimShuffle};
use crate::fx_hash;
use crate::loops::LoopPlan;

// =============================================================================
// Lifted Callable
// =============================================================================

/// A scalar op applied independently at every coordinate of a broadcast
/// shape.
#[derive(Debug, Clone)]
pub struct Lifted {
    op: ScalarOpRef,
    nin: usize,
}

impl Lifted {
    /// Lifts an op with a fixed, non-zero arity; variadic ops get `None`.
    #[must_use]
    pub fn new(op: &ScalarOpRef) -> Option<Self> {
        match op.nin() {
            Some(nin) if nin > 0 => Some(Self::with_arity(op, nin)),
            _ => None,
        }
    }

    /// Lifts `op` for exactly `nin` inputs.
    #[must_use]
    pub fn with_arity(op: &ScalarOpRef, nin: usize) -> Self {
        Self {
            op: Arc::clone(op),
            nin,
        }
    }

    /// Number of inputs the callable takes.
    #[must_use]
    pub fn nin(&self) -> usize {
        self.nin
    }

    /// Evaluates every coordinate of `shape`, reading unit axes of the
    /// inputs repeatedly. Returns one row-major value list per output.
    pub fn call(&self, inputs: &[Array], shape: &[usize], out_dtypes: &[DType]) -> Result<Vec<Vec<Value>>> {
        if inputs.len() != self.nin {
            return Err(Error::type_error(format!(
                "{} lifted for {} inputs, called with {}",
                self.op.name(),
                self.nin,
                inputs.len()
            )));
        }
        let total = numel(shape);
        let mut results: Vec<Vec<Value>> = out_dtypes.iter().map(|_| Vec::with_capacity(total)).collect();
        if total == 0 {
            return Ok(results);
        }

        let strides: Vec<_> = inputs
            .iter()
            .map(|a| broadcast_strides(a.shape(), a.strides(), shape))
            .collect();
        let buffers: Vec<_> = inputs.iter().map(|a| a.storage().read()).collect();
        let mut index: Shape = Shape::from_elem(0, shape.len());
        let mut args = Vec::with_capacity(self.nin);
        let mut outs: Vec<Value> = out_dtypes.iter().map(|&d| Value::zero(d)).collect();

        loop {
            args.clear();
            for ((input, buffer), strides) in inputs.iter().zip(&buffers).zip(&strides) {
                args.push(buffer.get(linear_index(input.offset(), &index, strides)));
            }
            for (slot, &dtype) in outs.iter_mut().zip(out_dtypes) {
                *slot = Value::zero(dtype);
            }
            self.op.apply(&args, &mut outs)?;
            for (result, &value) in results.iter_mut().zip(&outs) {
                result.push(value);
            }
            if !advance(&mut index, shape) {
                break;
            }
        }
        Ok(results)
    }
}

// =============================================================================
// Elemwise
// =============================================================================

/// A scalar op generalized to broadcasting arrays.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "ElemwiseSpec", into = "ElemwiseSpec")]
pub struct Elemwise {
    scalar_op: ScalarOpRef,
    inplace_pattern: BTreeMap<usize, usize>,
    name: Option<String>,
    lifted: Option<Lifted>,
    hash: u64,
}

#[derive(Serialize, Deserialize)]
struct ElemwiseSpec {
    scalar_op: String,
    #[serde(default)]
    inplace_pattern: Vec<(usize, usize)>,
    #[serde(default)]
    name: Option<String>,
}

impl TryFrom<ElemwiseSpec> for Elemwise {
    type Error = Error;

    fn try_from(spec: ElemwiseSpec) -> Result<Self> {
        let op = scalar::lookup(&spec.scalar_op)
            .ok_or_else(|| Error::configuration(format!("unknown scalar op '{}'", spec.scalar_op)))?;
        let elemwise = Self::inplace(op, &spec.inplace_pattern);
        Ok(match spec.name {
            Some(name) => elemwise.named(name),
            None => elemwise,
        })
    }
}

impl From<Elemwise> for ElemwiseSpec {
    fn from(op: Elemwise) -> Self {
        Self {
            scalar_op: op.scalar_op.name().to_string(),
            inplace_pattern: op.inplace_pattern.into_iter().collect(),
            name: op.name,
        }
    }
}

impl Elemwise {
    /// Lifts `scalar_op` with every output freshly allocated.
    #[must_use]
    pub fn new(scalar_op: ScalarOpRef) -> Self {
        Self::inplace(scalar_op, &[])
    }

    /// Lifts `scalar_op` with output `o` overwriting input `i` for every
    /// `(o, i)` in `pattern`. Legality is checked when the node is built.
    #[must_use]
    pub fn inplace(scalar_op: ScalarOpRef, pattern: &[(usize, usize)]) -> Self {
        let inplace_pattern: BTreeMap<usize, usize> = pattern.iter().copied().collect();
        let pairs: Vec<(usize, usize)> = inplace_pattern.iter().map(|(&o, &i)| (o, i)).collect();
        let hash = fx_hash(&("Elemwise", scalar_op.name(), pairs));
        Self {
            lifted: Lifted::new(&scalar_op),
            scalar_op,
            inplace_pattern,
            name: None,
            hash,
        }
    }

    /// Sets a display name; does not affect equality.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The wrapped scalar op.
    #[must_use]
    pub fn scalar_op(&self) -> &ScalarOpRef {
        &self.scalar_op
    }

    /// Output index → overwritten input index.
    #[must_use]
    pub fn inplace_pattern(&self) -> &BTreeMap<usize, usize> {
        &self.inplace_pattern
    }

    /// Display name, if set.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The precomputed reference callable; `None` for variadic ops, which
    /// are lifted per call with the arity of the call site.
    #[must_use]
    pub fn lifted(&self) -> Option<&Lifted> {
        self.lifted.as_ref()
    }

    fn lifted_for(&self, nin: usize) -> Lifted {
        match &self.lifted {
            Some(lifted) => lifted.clone(),
            None => Lifted::with_arity(&self.scalar_op, nin),
        }
    }

    /// Output storage: the aliased input for in-place outputs, otherwise
    /// `existing` reused when possible.
    fn output_array(&self, index: usize, ty: &TensorType, inputs: &[Array], existing: Option<Array>, shape: &[usize]) -> Result<Array> {
        match self.inplace_pattern.get(&index) {
            Some(&input) => inputs.get(input).cloned().ok_or_else(|| {
                Error::value(format!("in-place output {index} refers to missing input {input}"))
            }),
            None => Ok(Array::reuse_or_alloc(existing, ty.dtype, shape)),
        }
    }

    fn shapes(inputs: &[Array]) -> Vec<Vec<usize>> {
        inputs.iter().map(|a| a.shape().to_vec()).collect()
    }
}

/// Per-axis extent of the broadcast result.
///
/// Non-broadcastable operands set the extent and must all agree;
/// broadcastable ones must have extent 1 and stretch to it.
pub fn broadcast_extents(types: &[TensorType], inputs: &[Array]) -> Result<Vec<usize>> {
    let nd = types.first().map_or(0, TensorType::ndim);
    for (ty, input) in types.iter().zip(inputs) {
        if input.ndim() != ty.ndim() || ty.ndim() != nd {
            return Err(Error::type_error(format!(
                "elementwise operands must all have {nd} dimensions, got shape {:?}",
                input.shape()
            )));
        }
    }
    let mismatch = || {
        let operands: Vec<(&[usize], &[bool])> = types
            .iter()
            .zip(inputs)
            .map(|(ty, input)| (input.shape(), ty.broadcastable.as_slice()))
            .collect();
        Error::dimension_mismatch(&operands)
    };

    let mut extents = Vec::with_capacity(nd);
    for axis in 0..nd {
        let target = types
            .iter()
            .zip(inputs)
            .find(|(ty, _)| !ty.broadcastable[axis])
            .map_or(1, |(_, input)| input.shape()[axis]);
        for (ty, input) in types.iter().zip(inputs) {
            let extent = input.shape()[axis];
            let stretches = ty.broadcastable[axis] && extent == 1;
            if extent != target && !stretches {
                return Err(mismatch());
            }
        }
        extents.push(target);
    }
    Ok(extents)
}

impl PartialEq for Elemwise {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
            && *self.scalar_op == *other.scalar_op
            && self.inplace_pattern == other.inplace_pattern
    }
}

impl Eq for Elemwise {}

impl core::hash::Hash for Elemwise {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl fmt::Display for Elemwise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.name {
            return f.write_str(name);
        }
        write!(f, "Elemwise{{{}}}", self.scalar_op.name())?;
        if !self.inplace_pattern.is_empty() {
            let pairs: Vec<String> = self
                .inplace_pattern
                .iter()
                .map(|(o, i)| format!("{o}: {i}"))
                .collect();
            write!(f, "{{{}}}", pairs.join(", "))?;
        }
        Ok(())
    }
}

// =============================================================================
// Op Implementation
// =============================================================================

impl Op for Elemwise {
    fn make_node(&self, graph: &mut Graph, inputs: &[VarId]) -> Result<Signature> {
        check_arity(self.scalar_op.as_ref(), inputs.len())?;
        let nd = inputs.iter().map(|&v| graph.ty(v).ndim()).max().unwrap_or(0);

        let mut padded = Vec::with_capacity(inputs.len());
        for &input in inputs {
            let ty = graph.ty(input).clone();
            let missing = nd - ty.ndim();
            if missing == 0 {
                padded.push(input);
                continue;
            }
            let order: Vec<Axis> = core::iter::repeat(Axis::Insert)
                .take(missing)
                .chain((0..ty.ndim()).map(Axis::Input))
                .collect();
            let pad = DimShuffle::new(&ty.broadcastable, order, true)?;
            padded.push(graph.call(pad, &[input])?);
        }

        let types: Vec<TensorType> = padded.iter().map(|&v| graph.ty(v).clone()).collect();
        let out_broadcastable: tessera_graph::BroadcastPattern = (0..nd)
            .map(|axis| types.iter().all(|t| t.broadcastable[axis]))
            .collect();
        let in_dtypes: Vec<DType> = types.iter().map(|t| t.dtype).collect();
        let out_dtypes = self.scalar_op.output_types(&in_dtypes)?;

        for (&output, &input) in &self.inplace_pattern {
            let (Some(&out_dtype), Some(in_type)) = (out_dtypes.get(output), types.get(input)) else {
                return Err(Error::value(format!(
                    "in-place pattern maps output {output} to input {input}, but the node has {} outputs and {} inputs",
                    out_dtypes.len(),
                    types.len()
                )));
            };
            let narrowed = out_broadcastable
                .iter()
                .zip(&in_type.broadcastable)
                .any(|(&ob, &ib)| ib && !ob);
            if narrowed {
                return Err(Error::value(
                    "Operation cannot be done inplace on an input with broadcasted dimensions.",
                ));
            }
            if out_dtype != in_type.dtype {
                return Err(Error::type_error(format!(
                    "Cannot do an inplace operation on incompatible data types ({} and {}), output {output} aliases input {input}",
                    out_dtype, in_type.dtype
                )));
            }
        }

        Ok(Signature {
            inputs: padded,
            outputs: out_dtypes
                .into_iter()
                .map(|dtype| TensorType {
                    dtype,
                    broadcastable: out_broadcastable.clone(),
                })
                .collect(),
        })
    }

    fn perform(&self, node: &NodeTypes, inputs: &[Array], outputs: &mut [Option<Array>]) -> Result<()> {
        let shape = broadcast_extents(&node.inputs, inputs)?;
        let out_dtypes: Vec<DType> = node.outputs.iter().map(|t| t.dtype).collect();
        let results = self
            .lifted_for(inputs.len())
            .call(inputs, &shape, &out_dtypes)
            .map_err(|e| e.during(self.to_string(), Self::shapes(inputs)))?;

        for (index, values) in results.into_iter().enumerate() {
            let out = self.output_array(index, &node.outputs[index], inputs, outputs[index].take(), &shape)?;
            if out.ndim() == 0 {
                if let Some(&value) = values.first() {
                    out.set(&[], value)?;
                }
            } else {
                out.assign(&values)?;
            }
            outputs[index] = Some(out);
        }
        Ok(())
    }

    fn perform_specialized(
        &self,
        node: &NodeTypes,
        inputs: &[Array],
        outputs: &mut [Option<Array>],
    ) -> Result<()> {
        let shape = broadcast_extents(&node.inputs, inputs)?;
        let outs = node
            .outputs
            .iter()
            .enumerate()
            .map(|(index, ty)| self.output_array(index, ty, inputs, outputs[index].take(), &shape))
            .collect::<Result<Vec<_>>>()?;

        let mut plan = LoopPlan::new(&shape);
        for (input, ty) in inputs.iter().zip(&node.inputs) {
            plan = plan.array(input, &broadcast_order(&ty.broadcastable))?;
        }
        for (out, ty) in outs.iter().zip(&node.outputs) {
            plan = plan.array(out, &broadcast_order(&ty.broadcastable))?;
        }
        trace!(op = %self, shape = ?shape, iterations = plan.iterations(), "running loop nest");

        let nin = inputs.len();
        let out_dtypes: Vec<DType> = node.outputs.iter().map(|t| t.dtype).collect();
        let mut written: Vec<Vec<(usize, Value)>> = outs.iter().map(|_| Vec::with_capacity(plan.iterations())).collect();
        {
            let buffers: Vec<_> = inputs.iter().map(|a| a.storage().read()).collect();
            let mut args = Vec::with_capacity(nin);
            let mut results: Vec<Value> = out_dtypes.iter().map(|&d| Value::zero(d)).collect();
            plan.run(|positions| {
                args.clear();
                args.extend(buffers.iter().zip(positions).map(|(b, &p)| b.get(p)));
                for (slot, &dtype) in results.iter_mut().zip(&out_dtypes) {
                    *slot = Value::zero(dtype);
                }
                self.scalar_op.apply(&args, &mut results)?;
                for ((sink, &value), &position) in written.iter_mut().zip(&results).zip(&positions[nin..]) {
                    sink.push((position, value));
                }
                Ok(())
            })
            .map_err(|e| e.during(self.to_string(), Self::shapes(inputs)))?;
        }

        for ((out, values), slot) in outs.into_iter().zip(written).zip(outputs.iter_mut()) {
            if !out.is_writable() {
                return Err(Error::ReadOnly);
            }
            {
                let mut buffer = out.storage().write();
                for (position, value) in values {
                    buffer.set(position, value);
                }
            }
            *slot = Some(out);
        }
        Ok(())
    }

    fn c_code(&self, node: &NodeTypes, inputs: &[String], outputs: &[String]) -> Result<Option<String>> {
        let sub_in: Vec<String> = inputs.iter().map(|n| format!("{n}_i")).collect();
        let sub_out: Vec<String> = outputs.iter().map(|n| format!("{n}_i")).collect();
        let Some(task) = self.scalar_op.c_code(&sub_in, &sub_out) else {
            return Ok(None);
        };

        let in_orders: Vec<IterOrder> = node.inputs.iter().map(|t| broadcast_order(&t.broadcastable)).collect();
        let out_orders: Vec<IterOrder> = node.outputs.iter().map(|t| broadcast_order(&t.broadcastable)).collect();
        let in_dtypes: Vec<DType> = node.inputs.iter().map(|t| t.dtype).collect();
        let out_dtypes: Vec<DType> = node.outputs.iter().map(|t| t.dtype).collect();

        let orders: Vec<IterOrder> = in_orders.iter().chain(&out_orders).cloned().collect();
        let dtypes: Vec<DType> = in_dtypes.iter().chain(&out_dtypes).copied().collect();
        let names: Vec<String> = inputs.iter().chain(outputs).cloned().collect();

        let mut alloc = String::new();
        for (index, ((order, &dtype), name)) in out_orders.iter().zip(&out_dtypes).zip(outputs).enumerate() {
            match self.inplace_pattern.get(&index) {
                Some(&input) => alloc.push_str(&make_alias(order, dtype, name, &inputs[input])),
                None => alloc.push_str(&make_alloc(order, order.len(), dtype, name)),
            }
        }

        let kernel = Kernel {
            declare: make_declare(&orders, &dtypes, &names),
            checks: make_checks(&in_orders, &in_dtypes, inputs),
            alloc,
            body: make_loop(&orders, &dtypes, &names, &[], &task),
        };
        Ok(Some(kernel.source()))
    }

    fn grad(&self, graph: &mut Graph, inputs: &[VarId], output_grads: &[VarId]) -> Result<Vec<Option<VarId>>> {
        let mut shadow = ScalarGraph::new();
        let scalar_inputs: Vec<ScalarVar> = inputs.iter().map(|&v| shadow.input(graph.ty(v).dtype)).collect();
        let scalar_ograds: Vec<ScalarVar> = output_grads.iter().map(|&v| shadow.input(graph.ty(v).dtype)).collect();
        let scalar_igrads = self.scalar_op.grad(&mut shadow, &scalar_inputs, &scalar_ograds)?;
        debug!(op = %self, inputs = inputs.len(), "lifting scalar gradient");

        let nd = inputs.first().map_or(0, |&v| graph.ty(v).ndim());
        let mut lifted: FxHashMap<ScalarVar, VarId> = scalar_inputs
            .iter()
            .copied()
            .zip(inputs.iter().copied())
            .chain(scalar_ograds.iter().copied().zip(output_grads.iter().copied()))
            .collect();

        let mut grads = Vec::with_capacity(inputs.len());
        for (scalar_grad, &input) in scalar_igrads.into_iter().zip(inputs) {
            let Some(scalar_grad) = scalar_grad else {
                grads.push(None);
                continue;
            };
            let r = lift(graph, &shadow, scalar_grad, nd, &mut lifted)?;
            let broadcastable = graph.ty(input).broadcastable.clone();
            let to_sum: Vec<usize> = broadcastable
                .iter()
                .enumerate()
                .filter_map(|(axis, &b)| b.then_some(axis))
                .collect();
            if to_sum.is_empty() {
                grads.push(Some(r));
                continue;
            }
            let mut kept = 0;
            let restore: Vec<Axis> = broadcastable
                .iter()
                .map(|&b| {
                    if b {
                        Axis::Insert
                    } else {
                        kept += 1;
                        Axis::Input(kept - 1)
                    }
                })
                .collect();
            let summed = graph.call(Sum::new(Some(to_sum.as_slice())), &[r])?;
            let pattern = graph.ty(summed).broadcastable.clone();
            let shuffle = DimShuffle::new(&pattern, restore, false)?;
            grads.push(Some(graph.call(shuffle, &[summed])?));
        }
        Ok(grads)
    }

    fn destroy_map(&self) -> ViewMap {
        self.inplace_pattern.iter().map(|(&o, &i)| (o, vec![i])).collect()
    }

    fn pretty(&self, _node: &NodeTypes, inputs: &[String]) -> String {
        format!("{}({})", self.scalar_op.name(), inputs.join(", "))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn op_eq(&self, other: &dyn Op) -> bool {
        downcast_eq(self, other)
    }

    fn op_hash(&self) -> u64 {
        self.hash
    }
}

/// Rebuilds shadow-graph variable `var` as tensor nodes of rank `nd`.
fn lift(
    graph: &mut Graph,
    shadow: &ScalarGraph,
    var: ScalarVar,
    nd: usize,
    lifted: &mut FxHashMap<ScalarVar, VarId>,
) -> Result<VarId> {
    if let Some(&done) = lifted.get(&var) {
        return Ok(done);
    }
    let result = match shadow.expr(var) {
        ScalarExpr::Input => {
            return Err(Error::invalid_operation(
                "scalar gradient refers to an input outside the node",
            ))
        }
        ScalarExpr::Constant(value) => {
            let constant = graph.constant(Array::scalar_value(*value));
            if nd == 0 {
                constant
            } else {
                let expand = DimShuffle::new(&[], vec![Axis::Insert; nd], true)?;
                graph.call(expand, &[constant])?
            }
        }
        ScalarExpr::Apply { op, inputs, output } => {
            let args = inputs
                .iter()
                .map(|&input| lift(graph, shadow, input, nd, lifted))
                .collect::<Result<Vec<_>>>()?;
            let node = graph.apply(Elemwise::new(Arc::clone(op)), &args)?;
            graph.node(node).outputs.get(*output).copied().ok_or_else(|| {
                Error::invalid_operation(format!("{} has no output {output}", op.name()))
            })?
        }
    };
    lifted.insert(var, result);
    Ok(result)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_graph::scalar::{add, exp, mul, neg, second};
    use tessera_tensor::arange;

    fn build(op: &Elemwise, graph: &mut Graph, types: &[TensorType]) -> (NodeTypes, Vec<VarId>) {
        let vars: Vec<VarId> = types
            .iter()
            .enumerate()
            .map(|(i, t)| graph.input(&format!("v{i}"), t.clone()))
            .collect();
        let id = graph.apply(op.clone(), &vars).unwrap();
        (graph.node_types(id), graph.node(id).outputs.clone())
    }

    fn run_both(op: &Elemwise, node: &NodeTypes, inputs: &[Array]) -> (Array, Array) {
        let mut reference = vec![None; node.outputs.len()];
        op.perform(node, inputs, &mut reference).unwrap();
        let mut specialized = vec![None; node.outputs.len()];
        op.perform_specialized(node, inputs, &mut specialized).unwrap();
        (reference[0].clone().unwrap(), specialized[0].clone().unwrap())
    }

    #[test]
    fn test_make_node_pads_and_ands_patterns() {
        let mut g = Graph::new();
        let x = g.input("x", TensorType::new(DType::F32, &[false, true]));
        let y = g.input("y", TensorType::new(DType::F64, &[true]));
        let z = g.call(Elemwise::new(add()), &[x, y]).unwrap();
        assert_eq!(g.ty(z), &TensorType::new(DType::F64, &[false, true]));

        let node = g.owner(z).unwrap();
        let padded = g.owner(node.inputs[1]).unwrap();
        assert_eq!(padded.op.to_string(), "InplaceDimShuffle{x,0}");
    }

    #[test]
    fn test_broadcast_rows_and_columns() {
        let mut g = Graph::new();
        let op = Elemwise::new(add());
        let (node, _) = build(
            &op,
            &mut g,
            &[TensorType::new(DType::F64, &[false, false]), TensorType::new(DType::F64, &[true, false])],
        );
        let a = arange(DType::F64, &[10, 5]).unwrap();
        let row = Array::from_vec(vec![100.0f64, 200.0, 300.0, 400.0, 500.0], &[1, 5]).unwrap();
        let (reference, specialized) = run_both(&op, &node, &[a.clone(), row]);
        assert_eq!(reference.shape(), &[10, 5]);
        let values = reference.to_vec::<f64>();
        assert_eq!(&values[5..10], &[105.0, 206.0, 307.0, 408.0, 509.0]);
        assert_eq!(specialized.to_vec::<f64>(), values);

        let (node, _) = node_cols(&op, &mut g);
        let col = arange(DType::F64, &[10, 1]).unwrap();
        let (reference, specialized) = run_both(&op, &node, &[a, col]);
        let values = reference.to_vec::<f64>();
        assert_eq!(&values[5..10], &[6.0, 7.0, 8.0, 9.0, 10.0]);
        assert_eq!(specialized.to_vec::<f64>(), values);
    }

    fn node_cols(op: &Elemwise, g: &mut Graph) -> (NodeTypes, Vec<VarId>) {
        build(
            op,
            g,
            &[TensorType::new(DType::F64, &[false, false]), TensorType::new(DType::F64, &[false, true])],
        )
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut g = Graph::new();
        let op = Elemwise::new(add());
        let matrix = TensorType::new(DType::F32, &[false, false]);
        let (node, _) = build(&op, &mut g, &[matrix.clone(), matrix]);
        let a = Array::zeros(DType::F32, &[3, 4]);
        let b = Array::zeros(DType::F32, &[3, 5]);
        for specialized in [false, true] {
            let mut out = vec![None];
            let err = if specialized {
                op.perform_specialized(&node, &[a.clone(), b.clone()], &mut out)
            } else {
                op.perform(&node, &[a.clone(), b.clone()], &mut out)
            }
            .unwrap_err();
            assert!(matches!(err, Error::DimensionMismatch { .. }));
            assert!(err.to_string().contains("(3, 4), (3, 5)"));
        }
    }

    #[test]
    fn test_mismatch_marks_broadcastable_axes() {
        let mut g = Graph::new();
        let op = Elemwise::new(add());
        let (node, _) = build(
            &op,
            &mut g,
            &[TensorType::new(DType::F32, &[false, false]), TensorType::new(DType::F32, &[true, false])],
        );
        let a = Array::zeros(DType::F32, &[3, 4]);
        let b = Array::zeros(DType::F32, &[1, 5]);
        let err = op.perform(&node, &[a, b], &mut [None]).unwrap_err();
        assert!(err.to_string().contains("(3, 4), (*, 5)"));
    }

    #[test]
    fn test_inplace_legality() {
        let mut g = Graph::new();
        let x = g.input("x", TensorType::new(DType::F64, &[true, false]));
        let y = g.input("y", TensorType::new(DType::F64, &[false, false]));
        let narrowed = g.call(Elemwise::inplace(add(), &[(0, 0)]), &[x, y]);
        assert!(matches!(narrowed, Err(Error::Value { .. })));

        let i = g.input("i", TensorType::new(DType::I32, &[false, false]));
        let retyped = g.call(Elemwise::inplace(add(), &[(0, 0)]), &[i, y]);
        assert!(matches!(retyped, Err(Error::Type { .. })));

        assert!(g.call(Elemwise::inplace(add(), &[(0, 1)]), &[x, y]).is_ok());
    }

    #[test]
    fn test_inplace_execution_overwrites_input() {
        let mut g = Graph::new();
        let op = Elemwise::inplace(neg(), &[(0, 0)]);
        let (node, _) = build(&op, &mut g, &[TensorType::new(DType::I32, &[false])]);
        let a = arange(DType::I32, &[4]).unwrap();
        let mut out = vec![None];
        op.perform_specialized(&node, &[a.clone()], &mut out).unwrap();
        let out = out.pop().flatten().unwrap();
        assert!(out.shares_storage(&a));
        assert_eq!(a.to_vec::<i32>(), vec![0, -1, -2, -3]);
        assert_eq!(op.destroy_map().get(&0), Some(&vec![0]));
    }

    #[test]
    fn test_rank_zero_and_strided_inputs() {
        let mut g = Graph::new();
        let op = Elemwise::new(mul());
        let (node, _) = build(
            &op,
            &mut g,
            &[TensorType::new(DType::I64, &[false, false]), TensorType::new(DType::I64, &[false, false])],
        );
        let a = arange(DType::I64, &[3, 2]).unwrap().transpose();
        let b = arange(DType::I64, &[2, 3]).unwrap();
        let (reference, specialized) = run_both(&op, &node, &[a, b]);
        assert_eq!(reference.to_vec::<i64>(), vec![0, 2, 8, 3, 12, 25]);
        assert_eq!(specialized.to_vec::<i64>(), reference.to_vec::<i64>());

        let op = Elemwise::new(exp());
        let (node, _) = build(&op, &mut g, &[TensorType::scalar(DType::F64)]);
        let (reference, specialized) = run_both(&op, &node, &[Array::scalar(0.0f64)]);
        assert_eq!(reference.item().unwrap(), Value::F64(1.0));
        assert_eq!(specialized.item().unwrap(), Value::F64(1.0));
    }

    #[test]
    fn test_aliased_storage_not_reused() {
        let mut g = Graph::new();
        let op = Elemwise::new(neg());
        let (node, _) = build(&op, &mut g, &[TensorType::new(DType::F64, &[false])]);
        let previous = Array::zeros(DType::F64, &[2]);
        let keep = previous.clone();
        let mut out = vec![Some(previous)];
        op.perform(&node, &[arange(DType::F64, &[3]).unwrap()], &mut out).unwrap();
        let out = out.pop().flatten().unwrap();
        assert!(!out.shares_storage(&keep));
        assert_eq!(keep.to_vec::<f64>(), vec![0.0, 0.0]);
        assert_eq!(out.to_vec::<f64>(), vec![0.0, -1.0, -2.0]);
    }

    #[test]
    fn test_c_code_layout() {
        let mut g = Graph::new();
        let op = Elemwise::new(add());
        let (node, _) = build(
            &op,
            &mut g,
            &[TensorType::new(DType::F32, &[false, false]), TensorType::new(DType::F32, &[true, false])],
        );
        let src = op
            .c_code(&node, &["V1".into(), "V2".into()], &["V3".into()])
            .unwrap()
            .unwrap();
        let declare = src.find("npy_intp dims[2];").unwrap();
        let check = src.find("dims[0] = V1.dims[0];").unwrap();
        let alloc = src.find("tessera_alloc(&V3").unwrap();
        let body = src.find("V3_i = V1_i + V2_i;").unwrap();
        assert!(declare < check && check < alloc && alloc < body);
        assert!(src.contains("V2_stride0 = 0;"));
    }

    #[test]
    fn test_equality_hash_and_display() {
        let a = Elemwise::inplace(add(), &[(0, 1), (1, 0)]);
        let b = Elemwise::inplace(add(), &[(1, 0), (0, 1)]).named("plus");
        assert_eq!(a, b);
        assert_eq!(a.op_hash(), b.op_hash());
        assert_ne!(a, Elemwise::new(add()));
        assert_ne!(Elemwise::new(add()), Elemwise::new(mul()));
        assert_eq!(Elemwise::new(add()).to_string(), "Elemwise{add}");
        assert_eq!(Elemwise::inplace(add(), &[(0, 0)]).to_string(), "Elemwise{add}{0: 0}");
        assert_eq!(b.to_string(), "plus");
        assert!(Elemwise::new(add()).lifted().is_none());
        assert_eq!(Elemwise::new(second()).lifted().map(Lifted::nin), Some(2));
    }

    #[test]
    fn test_serde_round_trip() {
        let op = Elemwise::inplace(mul(), &[(0, 1)]).named("scale");
        let json = serde_json::to_string(&op).unwrap();
        let back: Elemwise = serde_json::from_str(&json).unwrap();
        assert_eq!(back, op);
        assert_eq!(back.op_hash(), op.op_hash());
        assert_eq!(back.name(), Some("scale"));
        assert!(serde_json::from_str::<Elemwise>(r#"{"scalar_op":"nope"}"#).is_err());
    }

    #[test]
    fn test_execution_error_names_op_and_shapes() {
        let op = Elemwise::new(exp());
        // an integer output slot makes the float kernel fail per element
        let node = NodeTypes {
            inputs: vec![TensorType::new(DType::F64, &[false])],
            outputs: vec![TensorType::new(DType::I32, &[false])],
        };
        let input = Array::zeros(DType::F64, &[2]);
        for specialized in [false, true] {
            let mut out = vec![None];
            let err = if specialized {
                op.perform_specialized(&node, &[input.clone()], &mut out)
            } else {
                op.perform(&node, &[input.clone()], &mut out)
            }
            .unwrap_err();
            match err {
                Error::Execution { op, shapes, .. } => {
                    assert_eq!(op, "Elemwise{exp}");
                    assert_eq!(shapes, vec![vec![2]]);
                }
                other => panic!("expected an execution error, got {other:?}"),
            }
        }

        let lifted = Lifted::with_arity(op.scalar_op(), 1);
        assert!(matches!(
            lifted.call(&[input.clone(), input], &[2], &[DType::F64]),
            Err(Error::Type { .. })
        ));
    }

    #[test]
    fn test_gradient_sums_broadcast_axes() {
        let mut g = Graph::new();
        let x = g.input("x", TensorType::new(DType::F64, &[false, false]));
        let b = g.input("b", TensorType::new(DType::F64, &[true, false]));
        let z = g.call(Elemwise::new(add()), &[x, b]).unwrap();
        let gz = g.input("gz", g.ty(z).clone());
        let node = g.owner(z).unwrap().clone();
        let grads = node.op.grad(&mut g, &node.inputs, &[gz]).unwrap();
        assert_eq!(grads[0], Some(gz));
        let gb = grads[1].unwrap();
        assert_eq!(g.ty(gb), &TensorType::new(DType::F64, &[true, false]));

        let mut f = tessera_graph::Function::compile(&g, &[gz], &[gb]).unwrap();
        let out = f.run(&[arange(DType::F64, &[2, 3]).unwrap()]).unwrap();
        assert_eq!(out[0].shape(), &[1, 3]);
        assert_eq!(out[0].to_vec::<f64>(), vec![3.0, 5.0, 7.0]);
    }

    #[test]
    fn test_gradient_of_discrete_input_is_undefined() {
        let mut g = Graph::new();
        let x = g.input("x", TensorType::new(DType::I32, &[false]));
        let y = g.input("y", TensorType::new(DType::F32, &[false]));
        let z = g.call(Elemwise::new(mul()), &[x, y]).unwrap();
        let gz = g.input("gz", g.ty(z).clone());
        let node = g.owner(z).unwrap().clone();
        let grads = node.op.grad(&mut g, &node.inputs, &[gz]).unwrap();
        assert!(grads[0].is_none());
        assert!(grads[1].is_some());
    }
}
