//! CAReduce - Commutative-Associative Reductions
//!
//! Folds a binary scalar op over a set of axes, removing them from the
//! result. The op must be commutative and associative; the specialized path
//! visits reduced elements in a different order than the reference path.
//! `Sum` is the reduction over `add` with widened integer outputs and a
//! gradient.
//!
//! # Key Features
//! - Axis sets stored sorted, so equality is set equality
//! - Reference fold in descending axis order
//! - Loop-nest path with kept axes outermost and accumulators seeded with
//!   the op's identity
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use core::any::Any;
use core::fmt;

use serde::{Deserialize, Serialize};
use tessera_core::dtype::DType;
use tessera_core::error::{Error, Result};
use tessera_core::value::Value;
use tessera_graph::scalar::{self, ScalarOpRef};
use tessera_graph::{downcast_eq, Graph, NodeTypes, Op, Signature, TensorType, VarId, ViewMap};
use tessera_tensor::shape::numel;
use tessera_tensor::Array;
use tracing::{debug, trace};

use crate::codegen::{
    c_literal, element_ref, make_alloc, make_checks, make_declare, make_loop, IterOrder, Kernel,
};
use crate::dimshuffle::{Axis, DimShuffle};
use crate::elemwise::Elemwise;
use crate::fx_hash;
use crate::loops::LoopPlan;

// =============================================================================
// CAReduce
// =============================================================================

/// Reduction of a commutative, associative binary op over some axes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "CAReduceSpec", into = "CAReduceSpec")]
pub struct CAReduce {
    scalar_op: ScalarOpRef,
    axis: Option<Vec<usize>>,
    hash: u64,
}

#[derive(Serialize, Deserialize)]
struct CAReduceSpec {
    scalar_op: String,
    axis: Option<Vec<usize>>,
}

impl TryFrom<CAReduceSpec> for CAReduce {
    type Error = Error;

    fn try_from(spec: CAReduceSpec) -> Result<Self> {
        let op = scalar::lookup(&spec.scalar_op)
            .ok_or_else(|| Error::configuration(format!("unknown scalar op '{}'", spec.scalar_op)))?;
        Self::new(op, spec.axis.as_deref())
    }
}

impl From<CAReduce> for CAReduceSpec {
    fn from(op: CAReduce) -> Self {
        Self {
            scalar_op: op.scalar_op.name().to_string(),
            axis: op.axis,
        }
    }
}

impl CAReduce {
    /// Reduces `axis` (all axes for `None`) with `scalar_op`.
    ///
    /// The op must take two inputs (or be variadic) and produce one output.
    /// An op that is not commutative and associative is accepted; its result
    /// then follows the fixed iteration order.
    pub fn new(scalar_op: ScalarOpRef, axis: Option<&[usize]>) -> Result<Self> {
        let binary = matches!(scalar_op.nin(), Some(2) | None);
        if !binary || scalar_op.nout() != 1 {
            return Err(Error::configuration(format!(
                "CAReduce only supports binary functions with a single output, {} takes {:?} inputs and has {} outputs",
                scalar_op.name(),
                scalar_op.nin(),
                scalar_op.nout()
            )));
        }
        let reduce = Self::build(scalar_op, axis);
        if !reduce.is_order_independent() {
            debug!(op = reduce.scalar_op.name(), "reduction result depends on iteration order");
        }
        Ok(reduce)
    }

    fn build(scalar_op: ScalarOpRef, axis: Option<&[usize]>) -> Self {
        let axis = axis.map(|axes| {
            let mut axes = axes.to_vec();
            axes.sort_unstable();
            axes.dedup();
            axes
        });
        let hash = fx_hash(&("CAReduce", scalar_op.name(), &axis));
        Self {
            scalar_op,
            axis,
            hash,
        }
    }

    /// The folded op.
    #[must_use]
    pub fn scalar_op(&self) -> &ScalarOpRef {
        &self.scalar_op
    }

    /// Whether folding order cannot change the result.
    #[must_use]
    pub fn is_order_independent(&self) -> bool {
        self.scalar_op.is_commutative() && self.scalar_op.is_associative()
    }

    /// Reduced axes, ascending; `None` means all of them.
    #[must_use]
    pub fn axis(&self) -> Option<&[usize]> {
        self.axis.as_deref()
    }

    /// Reduced axes for an input of rank `ndim`.
    #[must_use]
    pub fn reduced_axes(&self, ndim: usize) -> Vec<usize> {
        match &self.axis {
            Some(axes) => axes.clone(),
            None => (0..ndim).collect(),
        }
    }

    fn signature(&self, graph: &Graph, inputs: &[VarId], output_dtype: impl Fn(DType) -> DType) -> Result<Signature> {
        let [input] = inputs else {
            return Err(Error::type_error(format!("reductions take one input, got {}", inputs.len())));
        };
        let ty = graph.ty(*input);
        if let Some(&bad) = self.axis.iter().flatten().find(|&&a| a >= ty.ndim()) {
            return Err(Error::type_error(format!(
                "Not enough dimensions on {ty} to reduce on axis {bad}"
            )));
        }
        let reduced = self.reduced_axes(ty.ndim());
        let broadcastable = ty
            .broadcastable
            .iter()
            .enumerate()
            .filter(|(axis, _)| !reduced.contains(axis))
            .map(|(_, &b)| b)
            .collect();
        Ok(Signature {
            inputs: vec![*input],
            outputs: vec![TensorType {
                dtype: output_dtype(ty.dtype),
                broadcastable,
            }],
        })
    }

    fn checked_axes(&self, input: &Array) -> Result<Vec<usize>> {
        let axes = self.reduced_axes(input.ndim());
        match axes.iter().find(|&&a| a >= input.ndim()) {
            Some(&bad) => Err(Error::type_error(format!(
                "cannot reduce axis {bad} of an array with shape {:?}",
                input.shape()
            ))),
            None => Ok(axes),
        }
    }

    fn reduce_reference(
        &self,
        label: &str,
        node: &NodeTypes,
        inputs: &[Array],
        outputs: &mut [Option<Array>],
    ) -> Result<()> {
        let input = &inputs[0];
        let dtype = node.outputs[0].dtype;
        let axes = self.checked_axes(input)?;

        let mut result = input.astype(dtype);
        for &axis in axes.iter().rev() {
            result = fold_axis(&self.scalar_op, &result, axis)
                .map_err(|e| e.during(label, vec![input.shape().to_vec()]))?;
        }
        outputs[0] = Some(result);
        Ok(())
    }

    fn reduce_specialized(
        &self,
        label: &str,
        node: &NodeTypes,
        inputs: &[Array],
        outputs: &mut [Option<Array>],
    ) -> Result<()> {
        let input = &inputs[0];
        let dtype = node.outputs[0].dtype;
        let axes = self.checked_axes(input)?;
        if axes.is_empty() {
            return Elemwise::new(scalar::identity()).perform_specialized(node, inputs, outputs);
        }
        let Some(identity) = self.scalar_op.identity(dtype) else {
            trace!(op = label, "no identity element, using the reference fold");
            return self.reduce_reference(label, node, inputs, outputs);
        };

        let (kept, in_order, out_order) = reduction_orders(input.ndim(), &axes);
        let extents: Vec<usize> = in_order
            .iter()
            .flatten()
            .map(|&axis| input.shape()[axis])
            .collect();
        let out_shape: Vec<usize> = kept.iter().map(|&axis| input.shape()[axis]).collect();
        let out = Array::reuse_or_alloc(outputs[0].take(), dtype, &out_shape);
        let plan = LoopPlan::new(&extents).array(input, &in_order)?.array(&out, &out_order)?;
        trace!(op = label, extents = ?extents, "running reduction loop nest");

        let mut accumulators = vec![identity; numel(&out_shape)];
        {
            let buffer = input.storage().read();
            let mut folded = [Value::zero(dtype)];
            plan.run(|positions| {
                let element = buffer.get(positions[0]).cast(dtype);
                let slot = &mut accumulators[positions[1]];
                folded[0] = Value::zero(dtype);
                self.scalar_op.apply(&[*slot, element], &mut folded)?;
                *slot = folded[0];
                Ok(())
            })
            .map_err(|e| e.during(label, vec![input.shape().to_vec()]))?;
        }
        out.assign(&accumulators)?;
        outputs[0] = Some(out);
        Ok(())
    }

    fn reduce_c_code(&self, node: &NodeTypes, inputs: &[String], outputs: &[String]) -> Result<Option<String>> {
        let (in_ty, out_ty) = (&node.inputs[0], &node.outputs[0]);
        let axes = self.reduced_axes(in_ty.ndim());
        if axes.is_empty() {
            return Elemwise::new(scalar::identity()).c_code(node, inputs, outputs);
        }
        let Some(identity) = self.scalar_op.identity(out_ty.dtype) else {
            return Ok(None);
        };
        let (input, output) = (&inputs[0], &outputs[0]);
        let Some(task) = self
            .scalar_op
            .c_code(&[format!("{output}_i"), format!("{input}_i")], &[format!("{output}_i")])
        else {
            return Ok(None);
        };

        let (kept, in_order, out_order) = reduction_orders(in_ty.ndim(), &axes);
        let orders = vec![in_order.clone(), out_order.clone()];
        let dtypes = [in_ty.dtype, out_ty.dtype];
        let names = [input.clone(), output.clone()];
        let init = format!("{} = {};", element_ref(output, kept.len()), c_literal(identity));

        let kernel = Kernel {
            declare: make_declare(&orders, &dtypes, &names),
            checks: make_checks(&[in_order], &dtypes[..1], &names[..1]),
            alloc: make_alloc(&out_order, kept.len(), out_ty.dtype, output),
            body: make_loop(&orders, &dtypes, &names, &[(kept.len(), init)], &task),
        };
        Ok(Some(kernel.source()))
    }
}

/// Kept axes, then loop orders for input and output: kept axes outermost,
/// reduced axes innermost, where the output steps by 0.
fn reduction_orders(ndim: usize, axes: &[usize]) -> (Vec<usize>, IterOrder, IterOrder) {
    let kept: Vec<usize> = (0..ndim).filter(|a| !axes.contains(a)).collect();
    let in_order: IterOrder = kept.iter().chain(axes).map(|&a| Some(a)).collect();
    let out_order: IterOrder = (0..kept.len())
        .map(Some)
        .chain(core::iter::repeat(None).take(axes.len()))
        .collect();
    (kept, in_order, out_order)
}

/// Folds `op` along `axis`, removing it.
fn fold_axis(op: &ScalarOpRef, array: &Array, axis: usize) -> Result<Array> {
    let dtype = array.dtype();
    let shape = array.shape();
    let extent = shape[axis];
    let outer: usize = shape[..axis].iter().product();
    let inner: usize = shape[axis + 1..].iter().product();
    let values = array.values();

    let mut folded = Vec::with_capacity(outer * inner);
    let mut slot = [Value::zero(dtype)];
    for o in 0..outer {
        for i in 0..inner {
            let mut acc: Option<Value> = None;
            for k in 0..extent {
                let element = values[(o * extent + k) * inner + i];
                acc = Some(match acc {
                    None => element,
                    Some(previous) => {
                        slot[0] = Value::zero(dtype);
                        op.apply(&[previous, element], &mut slot)?;
                        slot[0]
                    }
                });
            }
            let acc = match acc {
                Some(acc) => acc,
                None => op.identity(dtype).ok_or_else(|| {
                    Error::value(format!(
                        "cannot reduce a zero-size axis with {}, which has no identity",
                        op.name()
                    ))
                })?,
            };
            folded.push(acc);
        }
    }
    let mut out_shape = shape.to_vec();
    out_shape.remove(axis);
    Array::from_values(dtype, folded, &out_shape)
}

impl PartialEq for CAReduce {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && *self.scalar_op == *other.scalar_op && self.axis == other.axis
    }
}

impl Eq for CAReduce {}

impl core::hash::Hash for CAReduce {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

fn join_axes(axes: &[usize]) -> String {
    axes.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

impl fmt::Display for CAReduce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.axis {
            Some(axes) => write!(f, "Reduce{{{}}}{{{}}}", self.scalar_op.name(), join_axes(axes)),
            None => write!(f, "Reduce{{{}}}", self.scalar_op.name()),
        }
    }
}

fn empty_axis_view(axis: Option<&[usize]>) -> ViewMap {
    let mut map = ViewMap::new();
    if axis.is_some_and(<[usize]>::is_empty) {
        map.insert(0, vec![0]);
    }
    map
}

impl Op for CAReduce {
    fn make_node(&self, graph: &mut Graph, inputs: &[VarId]) -> Result<Signature> {
        self.signature(graph, inputs, |dtype| dtype)
    }

    fn perform(&self, node: &NodeTypes, inputs: &[Array], outputs: &mut [Option<Array>]) -> Result<()> {
        self.reduce_reference(&self.to_string(), node, inputs, outputs)
    }

    fn perform_specialized(
        &self,
        node: &NodeTypes,
        inputs: &[Array],
        outputs: &mut [Option<Array>],
    ) -> Result<()> {
        self.reduce_specialized(&self.to_string(), node, inputs, outputs)
    }

    fn c_code(&self, node: &NodeTypes, inputs: &[String], outputs: &[String]) -> Result<Option<String>> {
        self.reduce_c_code(node, inputs, outputs)
    }

    fn view_map(&self) -> ViewMap {
        empty_axis_view(self.axis())
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

// =============================================================================
// Sum
// =============================================================================

/// Output dtype of a sum: narrow integers and bools widen, others pass through.
#[must_use]
pub fn sum_dtype(dtype: DType) -> DType {
    match dtype {
        DType::I8 | DType::I16 => DType::I32,
        DType::I32 => DType::I64,
        DType::U8 => DType::U32,
        DType::U32 => DType::U64,
        DType::Bool => DType::I64,
        other => other,
    }
}

/// Sum over some axes, with widened integer outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "SumSpec", into = "SumSpec")]
pub struct Sum {
    reduce: CAReduce,
    hash: u64,
}

#[derive(Serialize, Deserialize)]
struct SumSpec {
    axis: Option<Vec<usize>>,
}

impl From<SumSpec> for Sum {
    fn from(spec: SumSpec) -> Self {
        Self::new(spec.axis.as_deref())
    }
}

impl From<Sum> for SumSpec {
    fn from(op: Sum) -> Self {
        Self { axis: op.reduce.axis }
    }
}

impl Sum {
    /// Sums `axis` (all axes for `None`).
    #[must_use]
    pub fn new(axis: Option<&[usize]>) -> Self {
        let reduce = CAReduce::build(scalar::add(), axis);
        let hash = fx_hash(&("Sum", &reduce.axis));
        Self { reduce, hash }
    }

    /// Summed axes, ascending; `None` means all of them.
    #[must_use]
    pub fn axis(&self) -> Option<&[usize]> {
        self.reduce.axis()
    }

    /// The underlying reduction over `add`.
    #[must_use]
    pub fn as_reduce(&self) -> &CAReduce {
        &self.reduce
    }
}

impl PartialEq for Sum {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.reduce.axis == other.reduce.axis
    }
}

impl Eq for Sum {}

impl core::hash::Hash for Sum {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl fmt::Display for Sum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.axis() {
            Some(axes) => write!(f, "Sum{{{}}}", join_axes(axes)),
            None => write!(f, "Sum"),
        }
    }
}

impl Op for Sum {
    fn make_node(&self, graph: &mut Graph, inputs: &[VarId]) -> Result<Signature> {
        self.reduce.signature(graph, inputs, sum_dtype)
    }

    fn perform(&self, node: &NodeTypes, inputs: &[Array], outputs: &mut [Option<Array>]) -> Result<()> {
        self.reduce.reduce_reference(&self.to_string(), node, inputs, outputs)
    }

    fn perform_specialized(
        &self,
        node: &NodeTypes,
        inputs: &[Array],
        outputs: &mut [Option<Array>],
    ) -> Result<()> {
        self.reduce.reduce_specialized(&self.to_string(), node, inputs, outputs)
    }

    fn c_code(&self, node: &NodeTypes, inputs: &[String], outputs: &[String]) -> Result<Option<String>> {
        self.reduce.reduce_c_code(node, inputs, outputs)
    }

    fn grad(&self, graph: &mut Graph, inputs: &[VarId], output_grads: &[VarId]) -> Result<Vec<Option<VarId>>> {
        let (Some(&x), Some(&gz)) = (inputs.first(), output_grads.first()) else {
            return Err(Error::invalid_operation("Sum gradient needs one input and one output gradient"));
        };
        let axes = self.reduce.reduced_axes(graph.ty(x).ndim());
        if axes.is_empty() {
            return Ok(vec![Some(gz)]);
        }
        debug!(op = %self, axes = ?axes, "building Sum gradient");

        let mut kept = 0;
        let order: Vec<Axis> = (0..graph.ty(x).ndim())
            .map(|axis| {
                if axes.contains(&axis) {
                    Axis::Insert
                } else {
                    kept += 1;
                    Axis::Input(kept - 1)
                }
            })
            .collect();
        let pattern = graph.ty(gz).broadcastable.clone();
        let expanded = graph.call(DimShuffle::new(&pattern, order, false)?, &[gz])?;
        let broadcast = graph.call(Elemwise::new(scalar::second()), &[x, expanded])?;
        Ok(vec![Some(broadcast)])
    }

    fn view_map(&self) -> ViewMap {
        empty_axis_view(self.axis())
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

// =============================================================================
// Tests
// =============================================================================
