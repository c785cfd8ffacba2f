//! Scalar Operations - Per-Element Kernels and Their Shadow Graph
//!
//! A `ScalarOp` describes one element-level computation: arity, type
//! inference, a reference implementation over tagged values, inline source
//! for specialized kernels, algebraic properties and a gradient rule.
//! Gradient rules are written against a `ScalarGraph`, a small expression
//! graph over scalars that the elementwise operator later lifts back to
//! arrays.
//!
//! # Key Features
//! - Variadic and fixed-arity operators
//! - Identity elements for reductions
//! - Name-based lookup for deserialization
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

pub mod ops;

use core::fmt;
use core::hash::{Hash, Hasher};
use std::sync::Arc;

use tessera_core::dtype::DType;
use tessera_core::error::{Error, Result};
use tessera_core::value::Value;

pub use ops::{
    add, and, exp, ge, identity, log, lookup, lt, maximum, minimum, mul, neg, or, second, sqr, sub,
    true_div,
};

// =============================================================================
// ScalarOp Trait
// =============================================================================

/// Shared handle to a scalar operation.
pub type ScalarOpRef = Arc<dyn ScalarOp>;

/// An element-level operation.
pub trait ScalarOp: fmt::Debug + Send + Sync {
    /// Unique name; also the structural identity of the op.
    fn name(&self) -> &str;

    /// Number of inputs, or `None` for variadic ops.
    fn nin(&self) -> Option<usize>;

    /// Number of outputs.
    fn nout(&self) -> usize {
        1
    }

    /// Whether operand order does not matter.
    fn is_commutative(&self) -> bool {
        false
    }

    /// Whether grouping of repeated applications does not matter.
    fn is_associative(&self) -> bool {
        false
    }

    /// Identity element for `dtype`, if the op has one.
    fn identity(&self, _dtype: DType) -> Option<Value> {
        None
    }

    /// Output dtypes for the given input dtypes.
    fn output_types(&self, inputs: &[DType]) -> Result<Vec<DType>>;

    /// Reference implementation. `outputs` arrive holding a zero of each
    /// output dtype and are overwritten.
    fn apply(&self, inputs: &[Value], outputs: &mut [Value]) -> Result<()>;

    /// Inline kernel source assigning `outputs` from `inputs`.
    fn c_code(&self, inputs: &[String], outputs: &[String]) -> Option<String>;

    /// Gradient of each input given one gradient per output.
    fn grad(
        &self,
        graph: &mut ScalarGraph,
        inputs: &[ScalarVar],
        output_grads: &[ScalarVar],
    ) -> Result<Vec<Option<ScalarVar>>>;
}

impl PartialEq for dyn ScalarOp {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl Eq for dyn ScalarOp {}

impl Hash for dyn ScalarOp {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name().hash(state);
    }
}

impl fmt::Display for dyn ScalarOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Checks an input count against an op's arity.
pub fn check_arity(op: &dyn ScalarOp, given: usize) -> Result<()> {
    match op.nin() {
        Some(n) if n != given => Err(Error::type_error(format!(
            "{} takes {n} inputs, got {given}",
            op.name()
        ))),
        _ => Ok(()),
    }
}

// =============================================================================
// Shadow Scalar Graph
// =============================================================================

/// Handle to a node of a [`ScalarGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScalarVar(usize);

/// How a scalar variable is defined.
#[derive(Debug, Clone)]
pub enum ScalarExpr {
    /// Free input (an element of an input or output gradient).
    Input,
    /// Literal constant.
    Constant(Value),
    /// Output `output` of `op` applied to `inputs`.
    Apply {
        /// Operation applied.
        op: ScalarOpRef,
        /// Operands.
        inputs: Vec<ScalarVar>,
        /// Which output of `op` this variable is.
        output: usize,
    },
}

/// Expression graph over scalars used to express gradient rules.
#[derive(Debug, Clone, Default)]
pub struct ScalarGraph {
    vars: Vec<(DType, ScalarExpr)>,
}

impl ScalarGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, dtype: DType, expr: ScalarExpr) -> ScalarVar {
        self.vars.push((dtype, expr));
        ScalarVar(self.vars.len() - 1)
    }

    /// Adds a free input of `dtype`.
    pub fn input(&mut self, dtype: DType) -> ScalarVar {
        self.push(dtype, ScalarExpr::Input)
    }

    /// Adds a literal.
    pub fn constant(&mut self, value: Value) -> ScalarVar {
        self.push(value.dtype(), ScalarExpr::Constant(value))
    }

    /// Applies `op`, returning one variable per output.
    pub fn apply(&mut self, op: &ScalarOpRef, inputs: &[ScalarVar]) -> Result<Vec<ScalarVar>> {
        check_arity(op.as_ref(), inputs.len())?;
        let dtypes: Vec<DType> = inputs.iter().map(|&v| self.dtype(v)).collect();
        let out_types = op.output_types(&dtypes)?;
        Ok(out_types
            .into_iter()
            .enumerate()
            .map(|(output, dtype)| {
                self.push(
                    dtype,
                    ScalarExpr::Apply {
                        op: Arc::clone(op),
                        inputs: inputs.to_vec(),
                        output,
                    },
                )
            })
            .collect())
    }

    /// Applies a single-output op.
    pub fn apply1(&mut self, op: &ScalarOpRef, inputs: &[ScalarVar]) -> Result<ScalarVar> {
        let outs = self.apply(op, inputs)?;
        outs.first()
            .copied()
            .ok_or_else(|| Error::invalid_operation(format!("{} produced no output", op.name())))
    }

    /// Returns the dtype of a variable.
    #[must_use]
    pub fn dtype(&self, var: ScalarVar) -> DType {
        self.vars[var.0].0
    }

    /// Returns how a variable is defined.
    #[must_use]
    pub fn expr(&self, var: ScalarVar) -> &ScalarExpr {
        &self.vars[var.0].1
    }

    /// Evaluates `var` given values for the free inputs it depends on.
    pub fn evaluate(&self, var: ScalarVar, bindings: &[(ScalarVar, Value)]) -> Result<Value> {
        match self.expr(var) {
            ScalarExpr::Input => bindings
                .iter()
                .find(|(v, _)| *v == var)
                .map(|(_, value)| *value)
                .ok_or_else(|| Error::invalid_operation("unbound scalar input")),
            ScalarExpr::Constant(value) => Ok(*value),
            ScalarExpr::Apply { op, inputs, output } => {
                let args = inputs
                    .iter()
                    .map(|&v| self.evaluate(v, bindings))
                    .collect::<Result<Vec<_>>>()?;
                let dtypes: Vec<DType> = args.iter().map(|v| v.dtype()).collect();
                let mut outs: Vec<Value> = op
                    .output_types(&dtypes)?
                    .into_iter()
                    .map(Value::zero)
                    .collect();
                op.apply(&args, &mut outs)?;
                outs.get(*output)
                    .copied()
                    .ok_or_else(|| Error::invalid_operation("scalar output index out of range"))
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_graph_evaluate() {
        let mut g = ScalarGraph::new();
        let x = g.input(DType::F64);
        let two = g.constant(Value::F64(2.0));
        let y = g.apply1(&mul(), &[x, two]).unwrap();
        let z = g.apply1(&add(), &[y, x]).unwrap();
        assert_eq!(g.evaluate(z, &[(x, Value::F64(3.0))]).unwrap(), Value::F64(9.0));
        assert_eq!(g.dtype(z), DType::F64);
    }

    #[test]
    fn test_arity_checked() {
        let mut g = ScalarGraph::new();
        let x = g.input(DType::F32);
        assert!(g.apply(&neg(), &[x, x]).is_err());
        assert!(g.apply(&add(), &[x, x, x]).is_ok());
    }

    #[test]
    fn test_equality_by_name() {
        assert!(*add() == *add());
        assert!(*add() != *mul());
        assert_eq!(add().to_string(), "add");
    }
}
