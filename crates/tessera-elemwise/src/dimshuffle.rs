//! DimShuffle - Axis Reordering, Insertion and Removal
//!
//! Reorders the axes of an array, inserts new broadcastable unit axes and
//! drops broadcastable ones, without copying data when applied in place.
//! Elementwise operators use it to left-pad operands to a common rank and
//! gradient rules use it to restore reduced axes.
//!
//! # Example
//! ```rust
//! use tessera_elemwise::{order, DimShuffle};
//!
//! // (a, b) -> (1, b, a)
//! let op = DimShuffle::new(&[false, false], order![x, 1, 0], false).unwrap();
//! assert_eq!(op.to_string(), "DimShuffle{x,1,0}");
//! assert_eq!(op.augment(), &[0]);
//! ```
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use core::any::Any;
use core::fmt;

use serde::{Deserialize, Serialize};
use tessera_core::error::{Error, Result};
use tessera_tensor::{Array, Strides};
use tessera_graph::{
    downcast_eq, BroadcastPattern, Graph, NodeTypes, Op, Signature, TensorType, VarId, ViewMap,
};
use tracing::debug;

use crate::elemwise::Elemwise;
use crate::fx_hash;

// =============================================================================
// Axis
// =============================================================================

/// One entry of a new axis order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "AxisRepr", into = "AxisRepr")]
pub enum Axis {
    /// Axis `i` of the input.
    Input(usize),
    /// A new broadcastable axis of extent 1, written `x`.
    Insert,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input(i) => write!(f, "{i}"),
            Self::Insert => write!(f, "x"),
        }
    }
}

/// Wire form: input axes as numbers, inserted axes as `"x"`.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum AxisRepr {
    Index(usize),
    Marker(String),
}

impl TryFrom<AxisRepr> for Axis {
    type Error = String;

    fn try_from(repr: AxisRepr) -> core::result::Result<Self, String> {
        match repr {
            AxisRepr::Index(i) => Ok(Self::Input(i)),
            AxisRepr::Marker(m) if m == "x" => Ok(Self::Insert),
            AxisRepr::Marker(m) => Err(format!("invalid axis marker '{m}', expected 'x'")),
        }
    }
}

impl From<Axis> for AxisRepr {
    fn from(axis: Axis) -> Self {
        match axis {
            Axis::Input(i) => Self::Index(i),
            Axis::Insert => Self::Marker("x".to_string()),
        }
    }
}

/// Builds a `Vec<Axis>` from input axis indices and `x` markers.
///
/// ```rust
/// use tessera_elemwise::{order, Axis};
///
/// assert_eq!(order![x, 1, 0], vec![Axis::Insert, Axis::Input(1), Axis::Input(0)]);
/// ```
#[macro_export]
macro_rules! order {
    (@axis x) => {
        $crate::Axis::Insert
    };
    (@axis $i:tt) => {
        $crate::Axis::Input($i)
    };
    ($($axis:tt),* $(,)?) => {
        vec![$($crate::order!(@axis $axis)),*]
    };
}

// =============================================================================
// DimShuffle
// =============================================================================

/// Reorders, inserts and drops axes of its single input.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "DimShuffleSpec", into = "DimShuffleSpec")]
pub struct DimShuffle {
    input_broadcastable: BroadcastPattern,
    new_order: Vec<Axis>,
    inplace: bool,
    // derived
    drop: Vec<usize>,
    shuffle: Vec<usize>,
    augment: Vec<usize>,
    hash: u64,
}

#[derive(Serialize, Deserialize)]
struct DimShuffleSpec {
    input_broadcastable: Vec<bool>,
    new_order: Vec<Axis>,
    inplace: bool,
}

impl TryFrom<DimShuffleSpec> for DimShuffle {
    type Error = Error;

    fn try_from(spec: DimShuffleSpec) -> Result<Self> {
        Self::new(&spec.input_broadcastable, spec.new_order, spec.inplace)
    }
}

impl From<DimShuffle> for DimShuffleSpec {
    fn from(op: DimShuffle) -> Self {
        Self {
            input_broadcastable: op.input_broadcastable.to_vec(),
            new_order: op.new_order,
            inplace: op.inplace,
        }
    }
}

impl DimShuffle {
    /// Creates a shuffle of an input with pattern `input_broadcastable`.
    ///
    /// Output axis `j` is input axis `i` for `Axis::Input(i)` and a new unit
    /// axis for `Axis::Insert`. Input axes left out are dropped, which is
    /// only allowed for broadcastable ones.
    pub fn new(input_broadcastable: &[bool], new_order: Vec<Axis>, inplace: bool) -> Result<Self> {
        let ndim = input_broadcastable.len();
        let mut referenced = vec![false; ndim];
        let mut shuffle = Vec::new();
        let mut augment = Vec::new();

        for (j, axis) in new_order.iter().enumerate() {
            match *axis {
                Axis::Input(i) if i >= ndim => {
                    return Err(Error::configuration(format!(
                        "new_order[{j}] is {i}, but the input only has {ndim} axes"
                    )));
                }
                Axis::Input(i) if referenced[i] => {
                    return Err(Error::configuration(format!(
                        "the same input axis may not appear twice in new_order, found {i} again at position {j}"
                    )));
                }
                Axis::Input(i) => {
                    referenced[i] = true;
                    shuffle.push(i);
                }
                Axis::Insert => augment.push(j),
            }
        }

        let mut drop = Vec::new();
        for (i, (&seen, &bcast)) in referenced.iter().zip(input_broadcastable).enumerate() {
            if seen {
                continue;
            }
            if !bcast {
                return Err(Error::configuration(format!(
                    "cannot drop a non-broadcastable dimension: input axis {i} of pattern {input_broadcastable:?} is missing from new_order"
                )));
            }
            drop.push(i);
        }
        for i in &mut shuffle {
            *i -= drop.iter().filter(|&&d| d < *i).count();
        }

        let hash = fx_hash(&("DimShuffle", inplace, &new_order, input_broadcastable));
        Ok(Self {
            input_broadcastable: BroadcastPattern::from_slice(input_broadcastable),
            new_order,
            inplace,
            drop,
            shuffle,
            augment,
            hash,
        })
    }

    /// Expected input broadcast pattern.
    #[must_use]
    pub fn input_broadcastable(&self) -> &[bool] {
        &self.input_broadcastable
    }

    /// The new axis order.
    #[must_use]
    pub fn new_order(&self) -> &[Axis] {
        &self.new_order
    }

    /// Whether the output is a view of the input.
    #[must_use]
    pub fn is_inplace(&self) -> bool {
        self.inplace
    }

    /// Input axes removed, ascending.
    #[must_use]
    pub fn drop(&self) -> &[usize] {
        &self.drop
    }

    /// Permutation of the retained axes, numbered after dropping.
    #[must_use]
    pub fn shuffle(&self) -> &[usize] {
        &self.shuffle
    }

    /// Output positions of inserted axes.
    #[must_use]
    pub fn augment(&self) -> &[usize] {
        &self.augment
    }

    /// Broadcast pattern of the output.
    #[must_use]
    pub fn output_broadcastable(&self) -> BroadcastPattern {
        self.new_order
            .iter()
            .map(|axis| match *axis {
                Axis::Input(i) => self.input_broadcastable[i],
                Axis::Insert => true,
            })
            .collect()
    }

    /// Order that undoes this shuffle on its output: inserted axes are
    /// dropped again and dropped axes come back as unit axes.
    #[must_use]
    pub fn inverse_order(&self) -> Vec<Axis> {
        let mut order = vec![Axis::Insert; self.input_broadcastable.len()];
        for (j, axis) in self.new_order.iter().enumerate() {
            if let Axis::Input(i) = *axis {
                order[i] = Axis::Input(j);
            }
        }
        order
    }

    /// Same order, opposite aliasing.
    #[must_use]
    pub fn with_inplace(&self, inplace: bool) -> Self {
        let mut op = self.clone();
        op.inplace = inplace;
        op.hash = fx_hash(&("DimShuffle", inplace, &op.new_order, op.input_broadcastable.as_slice()));
        op
    }

    fn check_input(&self, input: &Array) -> Result<()> {
        if input.ndim() != self.input_broadcastable.len() {
            return Err(Error::type_error(format!(
                "DimShuffle expected an input with {} dimensions, got shape {:?}",
                self.input_broadcastable.len(),
                input.shape()
            )));
        }
        Ok(())
    }

    fn output_layout(&self, input: &Array) -> (Vec<usize>, Strides) {
        let mut shape = Vec::with_capacity(self.new_order.len());
        let mut strides = Strides::with_capacity(self.new_order.len());
        for axis in &self.new_order {
            match *axis {
                Axis::Input(i) => {
                    shape.push(input.shape()[i]);
                    strides.push(input.strides()[i]);
                }
                Axis::Insert => {
                    shape.push(1);
                    strides.push(0);
                }
            }
        }
        // row-major back-fill of the stride-0 unit axes
        let nd = shape.len();
        if nd > 0 && strides[nd - 1] == 0 && shape[nd - 1] == 1 {
            strides[nd - 1] = 1;
        }
        for i in (0..nd.saturating_sub(1)).rev() {
            if strides[i] == 0 && shape[i] == 1 {
                strides[i] = strides[i + 1] * shape[i + 1].max(1) as isize;
            }
        }
        (shape, strides)
    }
}

impl PartialEq for DimShuffle {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
            && self.inplace == other.inplace
            && self.new_order == other.new_order
            && self.input_broadcastable == other.input_broadcastable
    }
}

impl Eq for DimShuffle {}

impl core::hash::Hash for DimShuffle {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl fmt::Display for DimShuffle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let order: Vec<String> = self.new_order.iter().map(ToString::to_string).collect();
        if self.inplace {
            write!(f, "InplaceDimShuffle{{{}}}", order.join(","))
        } else {
            write!(f, "DimShuffle{{{}}}", order.join(","))
        }
    }
}

// =============================================================================
// Op Implementation
// =============================================================================

impl Op for DimShuffle {
    fn make_node(&self, graph: &mut Graph, inputs: &[VarId]) -> Result<Signature> {
        let [input] = inputs else {
            return Err(Error::type_error(format!(
                "DimShuffle takes one input, got {}",
                inputs.len()
            )));
        };
        let ty = graph.ty(*input);
        if ty.broadcastable != self.input_broadcastable {
            return Err(Error::type_error(format!(
                "The number of dimensions and/or broadcastable pattern of the input is incorrect for this op. Expected {:?}, got {:?}.",
                self.input_broadcastable.as_slice(),
                ty.broadcastable.as_slice()
            )));
        }
        Ok(Signature {
            inputs: vec![*input],
            outputs: vec![TensorType {
                dtype: ty.dtype,
                broadcastable: self.output_broadcastable(),
            }],
        })
    }

    fn perform(&self, _node: &NodeTypes, inputs: &[Array], outputs: &mut [Option<Array>]) -> Result<()> {
        let input = &inputs[0];
        self.check_input(input)?;

        let mut res = input.clone();
        for &axis in self.drop.iter().rev() {
            res = res.remove_unit_axis(axis)?;
        }
        res = res.permute(&self.shuffle)?;
        for &position in &self.augment {
            res = res.insert_unit_axis(position)?;
        }
        if !self.inplace {
            res = res.copy();
        }
        outputs[0] = Some(res);
        Ok(())
    }

    fn perform_specialized(
        &self,
        _node: &NodeTypes,
        inputs: &[Array],
        outputs: &mut [Option<Array>],
    ) -> Result<()> {
        let input = &inputs[0];
        self.check_input(input)?;
        let base = if self.inplace { input.clone() } else { input.copy() };
        let (shape, strides) = self.output_layout(&base);
        let view = Array::from_parts(
            base.storage().clone(),
            &shape,
            &strides,
            base.offset(),
            base.is_writable(),
        )?;
        outputs[0] = Some(view);
        Ok(())
    }

    fn c_code(&self, node: &NodeTypes, inputs: &[String], outputs: &[String]) -> Result<Option<String>> {
        let (input, output) = (&inputs[0], &outputs[0]);
        let nd = self.new_order.len();
        let mut src = format!(
            "npy_intp {output}_dims[{n}];\nnpy_intp {output}_strides[{n}];\n",
            n = nd.max(1)
        );
        for (j, axis) in self.new_order.iter().enumerate() {
            match axis {
                Axis::Input(i) => src.push_str(&format!(
                    "{output}_dims[{j}] = {input}.dims[{i}];\n{output}_strides[{j}] = {input}.strides[{i}];\n"
                )),
                Axis::Insert => src.push_str(&format!(
                    "{output}_dims[{j}] = 1;\n{output}_strides[{j}] = 0;\n"
                )),
            }
        }
        if nd > 0 {
            src.push_str(&format!(
                "if ({output}_strides[{last}] == 0 && {output}_dims[{last}] == 1) {output}_strides[{last}] = 1;\n\
                 for (int i = {start}; i >= 0; --i) {{\n    \
                 if ({output}_strides[i] == 0 && {output}_dims[i] == 1) {output}_strides[i] = {output}_strides[i + 1] * {output}_dims[i + 1];\n}}\n",
                last = nd - 1,
                start = nd as isize - 2,
            ));
        }
        let base = if self.inplace {
            input.clone()
        } else {
            format!("tessera_copy({input})")
        };
        let dtype = node.outputs.first().map_or("npy_float64", |t| t.dtype.c_type());
        src.push_str(&format!(
            "{output} = tessera_view({base}, \"{dtype}\", {nd}, {output}_dims, {output}_strides);\n"
        ));
        Ok(Some(src))
    }

    fn grad(&self, graph: &mut Graph, inputs: &[VarId], output_grads: &[VarId]) -> Result<Vec<Option<VarId>>> {
        let gz = output_grads
            .first()
            .copied()
            .ok_or_else(|| Error::invalid_operation("DimShuffle gradient needs one output gradient"))?;
        let grad_order = self.inverse_order();
        debug!(op = %self, inputs = inputs.len(), "building DimShuffle gradient");
        let copied = graph.call(Elemwise::new(tessera_graph::scalar::identity()), &[gz])?;
        let pattern = graph.ty(copied).broadcastable.clone();
        let inverse = DimShuffle::new(&pattern, grad_order, true)?;
        Ok(vec![Some(graph.call(inverse, &[copied])?)])
    }

    fn view_map(&self) -> ViewMap {
        let mut map = ViewMap::new();
        if self.inplace {
            map.insert(0, vec![0]);
        }
        map
    }

    fn pretty(&self, node: &NodeTypes, inputs: &[String]) -> String {
        let input_ndim = node.inputs.first().map_or(self.input_broadcastable.len(), TensorType::ndim);
        let order: &[Axis] = {
            let leading = self.new_order.iter().take_while(|a| **a == Axis::Insert).count();
            &self.new_order[leading..]
        };
        let identity: Vec<Axis> = (0..input_ndim).map(Axis::Input).collect();
        let reversed: Vec<Axis> = (0..input_ndim).rev().map(Axis::Input).collect();
        if order == identity.as_slice() {
            inputs[0].clone()
        } else if order == reversed.as_slice() {
            format!("{}.T", inputs[0])
        } else {
            let rendered: Vec<String> = order.iter().map(ToString::to_string).collect();
            format!("DimShuffle{{{}}}({})", rendered.join(", "), inputs[0])
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::dtype::DType;
    use tessera_tensor::arange;

    fn types(op: &DimShuffle, dtype: DType) -> NodeTypes {
        NodeTypes {
            inputs: vec![TensorType::new(dtype, op.input_broadcastable())],
            outputs: vec![TensorType::new(dtype, &op.output_broadcastable())],
        }
    }

    fn run(op: &DimShuffle, input: &Array, specialized: bool) -> Array {
        let node = types(op, input.dtype());
        let mut out = vec![None];
        if specialized {
            op.perform_specialized(&node, &[input.clone()], &mut out).unwrap();
        } else {
            op.perform(&node, &[input.clone()], &mut out).unwrap();
        }
        out.pop().flatten().unwrap()
    }

    #[test]
    fn test_derived_fields() {
        let op = DimShuffle::new(&[true, false, true], order![x, 1, x], false).unwrap();
        assert_eq!(op.drop(), &[0, 2]);
        assert_eq!(op.shuffle(), &[0]);
        assert_eq!(op.augment(), &[0, 2]);
        assert_eq!(op.output_broadcastable().as_slice(), &[true, false, true]);

        let op = DimShuffle::new(&[true, false, false], order![2, 1], false).unwrap();
        assert_eq!(op.drop(), &[0]);
        assert_eq!(op.shuffle(), &[1, 0]);
    }

    #[test]
    fn test_construction_errors() {
        let drop_real = DimShuffle::new(&[false, false], order![0], false);
        assert!(matches!(drop_real, Err(Error::Configuration { .. })));
        let out_of_range = DimShuffle::new(&[false], order![0, 1], false);
        assert!(matches!(out_of_range, Err(Error::Configuration { .. })));
        let repeated = DimShuffle::new(&[false], order![0, 0], false);
        assert!(matches!(repeated, Err(Error::Configuration { .. })));
    }

    #[test]
    fn test_make_node_checks_pattern() {
        let mut g = Graph::new();
        let x = g.input("x", TensorType::new(DType::F64, &[false, true]));
        let op = DimShuffle::new(&[false, false], order![1, 0], true).unwrap();
        assert!(matches!(g.call(op, &[x]), Err(Error::Type { .. })));

        let op = DimShuffle::new(&[false, true], order![x, 0], true).unwrap();
        let y = g.call(op, &[x]).unwrap();
        assert_eq!(g.ty(y), &TensorType::new(DType::F64, &[true, false]));
    }

    #[test]
    fn test_paths_agree() {
        let input = arange(DType::F32, &[2, 1, 3]).unwrap();
        let op = DimShuffle::new(&[false, true, false], order![2, x, 0], false).unwrap();
        let reference = run(&op, &input, false);
        let specialized = run(&op, &input, true);
        assert_eq!(reference.shape(), &[3, 1, 2]);
        assert_eq!(specialized.shape(), reference.shape());
        assert_eq!(specialized.to_vec::<f32>(), reference.to_vec::<f32>());
        assert_eq!(reference.to_vec::<f32>(), vec![0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);
    }

    #[test]
    fn test_inplace_shares_storage_and_writability() {
        let input = arange(DType::I64, &[2, 3]).unwrap().readonly();
        let op = DimShuffle::new(&[false, false], order![1, x, 0], true).unwrap();
        let view = run(&op, &input, true);
        assert!(view.shares_storage(&input));
        assert!(!view.is_writable());
        assert_eq!(view.strides(), &[1, 6, 3]);

        let copy = run(&op.with_inplace(false), &input, true);
        assert!(!copy.shares_storage(&input));
        assert!(copy.is_writable());
    }

    #[test]
    fn test_stride_backfill() {
        let input = arange(DType::F64, &[4]).unwrap();
        let op = DimShuffle::new(&[false], order![0, x, x], true).unwrap();
        let view = run(&op, &input, true);
        assert_eq!(view.shape(), &[4, 1, 1]);
        assert_eq!(view.strides(), &[1, 1, 1]);
    }

    #[test]
    fn test_display_and_pretty() {
        let op = DimShuffle::new(&[false, false], order![x, 0, 1], true).unwrap();
        assert_eq!(op.to_string(), "InplaceDimShuffle{x,0,1}");
        let node = types(&op, DType::F64);
        assert_eq!(op.pretty(&node, &["a".to_string()]), "a");

        let op = DimShuffle::new(&[false, false], order![1, 0], false).unwrap();
        assert_eq!(op.pretty(&types(&op, DType::F64), &["a".to_string()]), "a.T");

        let op = DimShuffle::new(&[false, false, false], order![1, 0, 2], false).unwrap();
        assert_eq!(
            op.pretty(&types(&op, DType::F64), &["a".to_string()]),
            "DimShuffle{1, 0, 2}(a)"
        );
    }

    #[test]
    fn test_equality_and_hash() {
        let a = DimShuffle::new(&[false, true], order![0, x], true).unwrap();
        let b = DimShuffle::new(&[false, true], order![0, x], true).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.op_hash(), b.op_hash());
        assert_ne!(a, a.with_inplace(false));
        assert_ne!(a, DimShuffle::new(&[false, true], order![x, 0], true).unwrap());
        assert_ne!(a, DimShuffle::new(&[false, false], order![0, x, 1], true).unwrap());
    }

    #[test]
    fn test_serde_round_trip() {
        let op = DimShuffle::new(&[true, false], order![1, x], false).unwrap();
        let json = serde_json::to_string(&op).unwrap();
        assert!(json.contains("\"x\""));
        let back: DimShuffle = serde_json::from_str(&json).unwrap();
        assert_eq!(back, op);
        assert_eq!(back.op_hash(), op.op_hash());
        assert_eq!(back.drop(), op.drop());

        let bad = r#"{"input_broadcastable":[false],"new_order":[],"inplace":false}"#;
        assert!(serde_json::from_str::<DimShuffle>(bad).is_err());
    }

    #[test]
    fn test_c_code_mentions_view() {
        let op = DimShuffle::new(&[false], order![x, 0], true).unwrap();
        let src = op
            .c_code(&types(&op, DType::F32), &["V1".into()], &["V2".into()])
            .unwrap()
            .unwrap();
        assert!(src.contains("V2_dims[0] = 1;"));
        assert!(src.contains("V2_strides[1] = V1.strides[0];"));
        assert!(src.contains("tessera_view(V1, \"npy_float32\""));
    }
}
