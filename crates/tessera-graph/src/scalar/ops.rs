//! Built-in Scalar Operations
//!
//! Arithmetic, transcendental, comparison and logical element kernels.
//! Integer arithmetic wraps on overflow; comparisons and logical ops
//! produce `bool`; gradients of discrete inputs are undefined.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use std::sync::Arc;

use tessera_core::dtype::DType;
use tessera_core::error::{Error, Result};
use tessera_core::value::Value;

use super::{ScalarGraph, ScalarOp, ScalarOpRef, ScalarVar};

// =============================================================================
// Value Kernels
// =============================================================================

/// Casts both operands to `$out` and combines them; bools go through `u8`.
macro_rules! binary {
    ($out:expr, $a:expr, $b:expr, |$x:ident, $y:ident| int: $int:expr, float: $float:expr) => {
        match ($a.cast($out), $b.cast($out)) {
            (Value::Bool(l), Value::Bool(r)) => {
                let ($x, $y) = (u8::from(l), u8::from(r));
                Ok(Value::U8($int).cast(DType::Bool))
            }
            (Value::I8($x), Value::I8($y)) => Ok(Value::I8($int)),
            (Value::I16($x), Value::I16($y)) => Ok(Value::I16($int)),
            (Value::I32($x), Value::I32($y)) => Ok(Value::I32($int)),
            (Value::I64($x), Value::I64($y)) => Ok(Value::I64($int)),
            (Value::U8($x), Value::U8($y)) => Ok(Value::U8($int)),
            (Value::U32($x), Value::U32($y)) => Ok(Value::U32($int)),
            (Value::U64($x), Value::U64($y)) => Ok(Value::U64($int)),
            (Value::F32($x), Value::F32($y)) => Ok(Value::F32($float)),
            (Value::F64($x), Value::F64($y)) => Ok(Value::F64($float)),
            (l, r) => Err(Error::DTypeMismatch {
                expected: l.dtype(),
                actual: r.dtype(),
            }),
        }
    };
}

/// Casts the operand to `$out` and maps it; bools go through `u8`.
macro_rules! unary {
    ($out:expr, $a:expr, |$x:ident| int: $int:expr, float: $float:expr) => {
        match $a.cast($out) {
            Value::Bool(v) => {
                let $x = u8::from(v);
                Ok(Value::U8($int).cast(DType::Bool))
            }
            Value::I8($x) => Ok(Value::I8($int)),
            Value::I16($x) => Ok(Value::I16($int)),
            Value::I32($x) => Ok(Value::I32($int)),
            Value::I64($x) => Ok(Value::I64($int)),
            Value::U8($x) => Ok(Value::U8($int)),
            Value::U32($x) => Ok(Value::U32($int)),
            Value::U64($x) => Ok(Value::U64($int)),
            Value::F32($x) => Ok(Value::F32($float)),
            Value::F64($x) => Ok(Value::F64($float)),
        }
    };
}

/// Casts the operand to the float dtype `$out` and maps it.
macro_rules! float_unary {
    ($out:expr, $a:expr, |$x:ident| $float:expr) => {
        match $a.cast($out) {
            Value::F32($x) => Ok(Value::F32($float)),
            Value::F64($x) => Ok(Value::F64($float)),
            other => Err(Error::invalid_operation(format!(
                "expected a float operand, got {}",
                other.dtype()
            ))),
        }
    };
}

fn upcast(name: &str, inputs: &[DType]) -> Result<Vec<DType>> {
    DType::promote_all(inputs)
        .map(|t| vec![t])
        .ok_or_else(|| Error::type_error(format!("{name} needs at least one input")))
}

/// Integers up to 16 bits map to f32, wider ones to f64.
fn float_upcast(name: &str, inputs: &[DType]) -> Result<Vec<DType>> {
    let t = upcast(name, inputs)?[0];
    let float = if t.is_float() {
        t
    } else if t.size_of() <= 2 {
        DType::F32
    } else {
        DType::F64
    };
    Ok(vec![float])
}

fn first(inputs: &[Value]) -> Result<Value> {
    inputs
        .first()
        .copied()
        .ok_or_else(|| Error::invalid_operation("scalar op called without inputs"))
}

fn out_dtype(outputs: &[Value]) -> Result<DType> {
    outputs
        .first()
        .map(|v| v.dtype())
        .ok_or_else(|| Error::invalid_operation("scalar op called without output slots"))
}

fn assign(outputs: &[String], expr: String) -> Option<String> {
    outputs.first().map(|out| format!("{out} = {expr};"))
}

fn continuous(graph: &ScalarGraph, var: ScalarVar) -> bool {
    graph.dtype(var).is_float()
}

fn gz(output_grads: &[ScalarVar]) -> Result<ScalarVar> {
    output_grads
        .first()
        .copied()
        .ok_or_else(|| Error::invalid_operation("missing output gradient"))
}

fn pair(inputs: &[ScalarVar]) -> Result<(ScalarVar, ScalarVar)> {
    match inputs {
        [x, y] => Ok((*x, *y)),
        _ => Err(Error::invalid_operation("binary op given wrong operand count")),
    }
}

// =============================================================================
// Arithmetic
// =============================================================================

/// Variadic sum.
#[derive(Debug, Clone, Copy, Default)]
pub struct Add;

impl ScalarOp for Add {
    fn name(&self) -> &str {
        "add"
    }

    fn nin(&self) -> Option<usize> {
        None
    }

    fn is_commutative(&self) -> bool {
        true
    }

    fn is_associative(&self) -> bool {
        true
    }

    fn identity(&self, dtype: DType) -> Option<Value> {
        Some(Value::zero(dtype))
    }

    fn output_types(&self, inputs: &[DType]) -> Result<Vec<DType>> {
        upcast(self.name(), inputs)
    }

    fn apply(&self, inputs: &[Value], outputs: &mut [Value]) -> Result<()> {
        let out = out_dtype(outputs)?;
        let mut acc = first(inputs)?.cast(out);
        for &v in &inputs[1..] {
            acc = binary!(out, acc, v, |x, y| int: x.wrapping_add(y), float: x + y)?;
        }
        outputs[0] = acc;
        Ok(())
    }

    fn c_code(&self, inputs: &[String], outputs: &[String]) -> Option<String> {
        assign(outputs, inputs.join(" + "))
    }

    fn grad(
        &self,
        graph: &mut ScalarGraph,
        inputs: &[ScalarVar],
        output_grads: &[ScalarVar],
    ) -> Result<Vec<Option<ScalarVar>>> {
        let gz = gz(output_grads)?;
        Ok(inputs
            .iter()
            .map(|&x| continuous(graph, x).then_some(gz))
            .collect())
    }
}

/// Binary difference.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sub;

impl ScalarOp for Sub {
    fn name(&self) -> &str {
        "sub"
    }

    fn nin(&self) -> Option<usize> {
        Some(2)
    }

    fn output_types(&self, inputs: &[DType]) -> Result<Vec<DType>> {
        upcast(self.name(), inputs)
    }

    fn apply(&self, inputs: &[Value], outputs: &mut [Value]) -> Result<()> {
        let out = out_dtype(outputs)?;
        outputs[0] = binary!(out, inputs[0], inputs[1], |x, y| int: x.wrapping_sub(y), float: x - y)?;
        Ok(())
    }

    fn c_code(&self, inputs: &[String], outputs: &[String]) -> Option<String> {
        assign(outputs, format!("{} - {}", inputs[0], inputs[1]))
    }

    fn grad(
        &self,
        graph: &mut ScalarGraph,
        inputs: &[ScalarVar],
        output_grads: &[ScalarVar],
    ) -> Result<Vec<Option<ScalarVar>>> {
        let (x, y) = pair(inputs)?;
        let gz = gz(output_grads)?;
        let gx = continuous(graph, x).then_some(gz);
        let gy = if continuous(graph, y) {
            Some(graph.apply1(&neg(), &[gz])?)
        } else {
            None
        };
        Ok(vec![gx, gy])
    }
}

/// Variadic product.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mul;

impl ScalarOp for Mul {
    fn name(&self) -> &str {
        "mul"
    }

    fn nin(&self) -> Option<usize> {
        None
    }

    fn is_commutative(&self) -> bool {
        true
    }

    fn is_associative(&self) -> bool {
        true
    }

    fn identity(&self, dtype: DType) -> Option<Value> {
        Some(Value::one(dtype))
    }

    fn output_types(&self, inputs: &[DType]) -> Result<Vec<DType>> {
        upcast(self.name(), inputs)
    }

    fn apply(&self, inputs: &[Value], outputs: &mut [Value]) -> Result<()> {
        let out = out_dtype(outputs)?;
        let mut acc = first(inputs)?.cast(out);
        for &v in &inputs[1..] {
            acc = binary!(out, acc, v, |x, y| int: x.wrapping_mul(y), float: x * y)?;
        }
        outputs[0] = acc;
        Ok(())
    }

    fn c_code(&self, inputs: &[String], outputs: &[String]) -> Option<String> {
        assign(outputs, inputs.join(" * "))
    }

    fn grad(
        &self,
        graph: &mut ScalarGraph,
        inputs: &[ScalarVar],
        output_grads: &[ScalarVar],
    ) -> Result<Vec<Option<ScalarVar>>> {
        let gz = gz(output_grads)?;
        let mut grads = Vec::with_capacity(inputs.len());
        for (i, &x) in inputs.iter().enumerate() {
            if !continuous(graph, x) {
                grads.push(None);
                continue;
            }
            let mut factors = vec![gz];
            factors.extend(inputs.iter().enumerate().filter(|(j, _)| *j != i).map(|(_, &v)| v));
            grads.push(Some(graph.apply1(&mul(), &factors)?));
        }
        Ok(grads)
    }
}

/// Division that always produces a float.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrueDiv;

impl ScalarOp for TrueDiv {
    fn name(&self) -> &str {
        "true_div"
    }

    fn nin(&self) -> Option<usize> {
        Some(2)
    }

    fn output_types(&self, inputs: &[DType]) -> Result<Vec<DType>> {
        float_upcast(self.name(), inputs)
    }

    fn apply(&self, inputs: &[Value], outputs: &mut [Value]) -> Result<()> {
        let out = out_dtype(outputs)?;
        let denominator = inputs[1].cast(out);
        outputs[0] = match (inputs[0].cast(out), denominator) {
            (Value::F32(x), Value::F32(y)) => Value::F32(x / y),
            (Value::F64(x), Value::F64(y)) => Value::F64(x / y),
            (other, _) => {
                return Err(Error::invalid_operation(format!(
                    "true_div expects float operands, got {}",
                    other.dtype()
                )))
            }
        };
        Ok(())
    }

    fn c_code(&self, inputs: &[String], outputs: &[String]) -> Option<String> {
        assign(outputs, format!("{} / {}", inputs[0], inputs[1]))
    }

    fn grad(
        &self,
        graph: &mut ScalarGraph,
        inputs: &[ScalarVar],
        output_grads: &[ScalarVar],
    ) -> Result<Vec<Option<ScalarVar>>> {
        let (x, y) = pair(inputs)?;
        let gz = gz(output_grads)?;
        let gx = if continuous(graph, x) {
            Some(graph.apply1(&true_div(), &[gz, y])?)
        } else {
            None
        };
        let gy = if continuous(graph, y) {
            let num = graph.apply1(&mul(), &[gz, x])?;
            let den = graph.apply1(&sqr(), &[y])?;
            let quotient = graph.apply1(&true_div(), &[num, den])?;
            Some(graph.apply1(&neg(), &[quotient])?)
        } else {
            None
        };
        Ok(vec![gx, gy])
    }
}

/// Negation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Neg;

impl ScalarOp for Neg {
    fn name(&self) -> &str {
        "neg"
    }

    fn nin(&self) -> Option<usize> {
        Some(1)
    }

    fn output_types(&self, inputs: &[DType]) -> Result<Vec<DType>> {
        upcast(self.name(), inputs)
    }

    fn apply(&self, inputs: &[Value], outputs: &mut [Value]) -> Result<()> {
        let out = out_dtype(outputs)?;
        outputs[0] = unary!(out, first(inputs)?, |x| int: x.wrapping_neg(), float: -x)?;
        Ok(())
    }

    fn c_code(&self, inputs: &[String], outputs: &[String]) -> Option<String> {
        assign(outputs, format!("-{}", inputs[0]))
    }

    fn grad(
        &self,
        graph: &mut ScalarGraph,
        inputs: &[ScalarVar],
        output_grads: &[ScalarVar],
    ) -> Result<Vec<Option<ScalarVar>>> {
        if !continuous(graph, inputs[0]) {
            return Ok(vec![None]);
        }
        Ok(vec![Some(graph.apply1(&neg(), &[gz(output_grads)?])?)])
    }
}

/// Square.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sqr;

impl ScalarOp for Sqr {
    fn name(&self) -> &str {
        "sqr"
    }

    fn nin(&self) -> Option<usize> {
        Some(1)
    }

    fn output_types(&self, inputs: &[DType]) -> Result<Vec<DType>> {
        upcast(self.name(), inputs)
    }

    fn apply(&self, inputs: &[Value], outputs: &mut [Value]) -> Result<()> {
        let out = out_dtype(outputs)?;
        outputs[0] = unary!(out, first(inputs)?, |x| int: x.wrapping_mul(x), float: x * x)?;
        Ok(())
    }

    fn c_code(&self, inputs: &[String], outputs: &[String]) -> Option<String> {
        assign(outputs, format!("{0} * {0}", inputs[0]))
    }

    fn grad(
        &self,
        graph: &mut ScalarGraph,
        inputs: &[ScalarVar],
        output_grads: &[ScalarVar],
    ) -> Result<Vec<Option<ScalarVar>>> {
        let x = inputs[0];
        if !continuous(graph, x) {
            return Ok(vec![None]);
        }
        let two = graph.constant(Value::F64(2.0).cast(graph.dtype(x)));
        Ok(vec![Some(graph.apply1(&mul(), &[gz(output_grads)?, two, x])?)])
    }
}

// =============================================================================
// Transcendental
// =============================================================================

/// Natural exponential.
#[derive(Debug, Clone, Copy, Default)]
pub struct Exp;

impl ScalarOp for Exp {
    fn name(&self) -> &str {
        "exp"
    }

    fn nin(&self) -> Option<usize> {
        Some(1)
    }

    fn output_types(&self, inputs: &[DType]) -> Result<Vec<DType>> {
        float_upcast(self.name(), inputs)
    }

    fn apply(&self, inputs: &[Value], outputs: &mut [Value]) -> Result<()> {
        let out = out_dtype(outputs)?;
        outputs[0] = float_unary!(out, first(inputs)?, |x| x.exp())?;
        Ok(())
    }

    fn c_code(&self, inputs: &[String], outputs: &[String]) -> Option<String> {
        assign(outputs, format!("exp({})", inputs[0]))
    }

    fn grad(
        &self,
        graph: &mut ScalarGraph,
        inputs: &[ScalarVar],
        output_grads: &[ScalarVar],
    ) -> Result<Vec<Option<ScalarVar>>> {
        let x = inputs[0];
        if !continuous(graph, x) {
            return Ok(vec![None]);
        }
        let e = graph.apply1(&exp(), &[x])?;
        Ok(vec![Some(graph.apply1(&mul(), &[gz(output_grads)?, e])?)])
    }
}

/// Natural logarithm.
#[derive(Debug, Clone, Copy, Default)]
pub struct Log;

impl ScalarOp for Log {
    fn name(&self) -> &str {
        "log"
    }

    fn nin(&self) -> Option<usize> {
        Some(1)
    }

    fn output_types(&self, inputs: &[DType]) -> Result<Vec<DType>> {
        float_upcast(self.name(), inputs)
    }

    fn apply(&self, inputs: &[Value], outputs: &mut [Value]) -> Result<()> {
        let out = out_dtype(outputs)?;
        outputs[0] = float_unary!(out, first(inputs)?, |x| x.ln())?;
        Ok(())
    }

    fn c_code(&self, inputs: &[String], outputs: &[String]) -> Option<String> {
        assign(outputs, format!("log({})", inputs[0]))
    }

    fn grad(
        &self,
        graph: &mut ScalarGraph,
        inputs: &[ScalarVar],
        output_grads: &[ScalarVar],
    ) -> Result<Vec<Option<ScalarVar>>> {
        let x = inputs[0];
        if !continuous(graph, x) {
            return Ok(vec![None]);
        }
        Ok(vec![Some(graph.apply1(&true_div(), &[gz(output_grads)?, x])?)])
    }
}

// =============================================================================
// Structural
// =============================================================================

/// Passes its input through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl ScalarOp for Identity {
    fn name(&self) -> &str {
        "identity"
    }

    fn nin(&self) -> Option<usize> {
        Some(1)
    }

    fn output_types(&self, inputs: &[DType]) -> Result<Vec<DType>> {
        Ok(inputs.to_vec())
    }

    fn apply(&self, inputs: &[Value], outputs: &mut [Value]) -> Result<()> {
        outputs[0] = first(inputs)?;
        Ok(())
    }

    fn c_code(&self, inputs: &[String], outputs: &[String]) -> Option<String> {
        assign(outputs, inputs[0].clone())
    }

    fn grad(
        &self,
        graph: &mut ScalarGraph,
        inputs: &[ScalarVar],
        output_grads: &[ScalarVar],
    ) -> Result<Vec<Option<ScalarVar>>> {
        Ok(vec![continuous(graph, inputs[0]).then_some(gz(output_grads)?)])
    }
}

/// Returns its second input; broadcasting it against the first.
#[derive(Debug, Clone, Copy, Default)]
pub struct Second;

impl ScalarOp for Second {
    fn name(&self) -> &str {
        "second"
    }

    fn nin(&self) -> Option<usize> {
        Some(2)
    }

    fn output_types(&self, inputs: &[DType]) -> Result<Vec<DType>> {
        inputs
            .get(1)
            .map(|&t| vec![t])
            .ok_or_else(|| Error::type_error("second takes 2 inputs"))
    }

    fn apply(&self, inputs: &[Value], outputs: &mut [Value]) -> Result<()> {
        outputs[0] = inputs
            .get(1)
            .copied()
            .ok_or_else(|| Error::invalid_operation("second called with one input"))?;
        Ok(())
    }

    fn c_code(&self, inputs: &[String], outputs: &[String]) -> Option<String> {
        assign(outputs, inputs[1].clone())
    }

    fn grad(
        &self,
        graph: &mut ScalarGraph,
        inputs: &[ScalarVar],
        output_grads: &[ScalarVar],
    ) -> Result<Vec<Option<ScalarVar>>> {
        let (_, y) = pair(inputs)?;
        Ok(vec![None, continuous(graph, y).then_some(gz(output_grads)?)])
    }
}

// =============================================================================
// Extrema
// =============================================================================

/// Larger of two values.
#[derive(Debug, Clone, Copy, Default)]
pub struct Maximum;

impl ScalarOp for Maximum {
    fn name(&self) -> &str {
        "maximum"
    }

    fn nin(&self) -> Option<usize> {
        Some(2)
    }

    fn is_commutative(&self) -> bool {
        true
    }

    fn is_associative(&self) -> bool {
        true
    }

    fn identity(&self, dtype: DType) -> Option<Value> {
        Some(Value::lowest(dtype))
    }

    fn output_types(&self, inputs: &[DType]) -> Result<Vec<DType>> {
        upcast(self.name(), inputs)
    }

    fn apply(&self, inputs: &[Value], outputs: &mut [Value]) -> Result<()> {
        let out = out_dtype(outputs)?;
        outputs[0] = binary!(out, inputs[0], inputs[1], |x, y| int: x.max(y), float: x.max(y))?;
        Ok(())
    }

    fn c_code(&self, inputs: &[String], outputs: &[String]) -> Option<String> {
        assign(outputs, format!("(({0}) > ({1})) ? ({0}) : ({1})", inputs[0], inputs[1]))
    }

    fn grad(
        &self,
        graph: &mut ScalarGraph,
        inputs: &[ScalarVar],
        output_grads: &[ScalarVar],
    ) -> Result<Vec<Option<ScalarVar>>> {
        let (x, y) = pair(inputs)?;
        let gz = gz(output_grads)?;
        let x_wins = graph.apply1(&ge(), &[x, y])?;
        let y_wins = graph.apply1(&lt(), &[x, y])?;
        let gx = if continuous(graph, x) {
            Some(graph.apply1(&mul(), &[gz, x_wins])?)
        } else {
            None
        };
        let gy = if continuous(graph, y) {
            Some(graph.apply1(&mul(), &[gz, y_wins])?)
        } else {
            None
        };
        Ok(vec![gx, gy])
    }
}

/// Smaller of two values.
#[derive(Debug, Clone, Copy, Default)]
pub struct Minimum;

impl ScalarOp for Minimum {
    fn name(&self) -> &str {
        "minimum"
    }

    fn nin(&self) -> Option<usize> {
        Some(2)
    }

    fn is_commutative(&self) -> bool {
        true
    }

    fn is_associative(&self) -> bool {
        true
    }

    fn identity(&self, dtype: DType) -> Option<Value> {
        Some(Value::highest(dtype))
    }

    fn output_types(&self, inputs: &[DType]) -> Result<Vec<DType>> {
        upcast(self.name(), inputs)
    }

    fn apply(&self, inputs: &[Value], outputs: &mut [Value]) -> Result<()> {
        let out = out_dtype(outputs)?;
        outputs[0] = binary!(out, inputs[0], inputs[1], |x, y| int: x.min(y), float: x.min(y))?;
        Ok(())
    }

    fn c_code(&self, inputs: &[String], outputs: &[String]) -> Option<String> {
        assign(outputs, format!("(({0}) < ({1})) ? ({0}) : ({1})", inputs[0], inputs[1]))
    }

    fn grad(
        &self,
        graph: &mut ScalarGraph,
        inputs: &[ScalarVar],
        output_grads: &[ScalarVar],
    ) -> Result<Vec<Option<ScalarVar>>> {
        let (x, y) = pair(inputs)?;
        let gz = gz(output_grads)?;
        let x_wins = graph.apply1(&ge(), &[y, x])?;
        let y_wins = graph.apply1(&lt(), &[y, x])?;
        let gx = if continuous(graph, x) {
            Some(graph.apply1(&mul(), &[gz, x_wins])?)
        } else {
            None
        };
        let gy = if continuous(graph, y) {
            Some(graph.apply1(&mul(), &[gz, y_wins])?)
        } else {
            None
        };
        Ok(vec![gx, gy])
    }
}

// =============================================================================
// Comparison and Logic
// =============================================================================

/// Comparison and logical ops share everything but the predicate.
#[derive(Debug, Clone, Copy)]
pub struct Predicate {
    name: &'static str,
    symbol: &'static str,
    logical: bool,
    test: fn(Value, Value) -> bool,
}

impl ScalarOp for Predicate {
    fn name(&self) -> &str {
        self.name
    }

    fn nin(&self) -> Option<usize> {
        Some(2)
    }

    fn is_commutative(&self) -> bool {
        self.logical
    }

    fn is_associative(&self) -> bool {
        self.logical
    }

    fn identity(&self, dtype: DType) -> Option<Value> {
        match self.name {
            "and" => Some(Value::Bool(true).cast(dtype)),
            "or" => Some(Value::Bool(false).cast(dtype)),
            _ => None,
        }
    }

    fn output_types(&self, inputs: &[DType]) -> Result<Vec<DType>> {
        super::check_arity(self, inputs.len())?;
        Ok(vec![DType::Bool])
    }

    fn apply(&self, inputs: &[Value], outputs: &mut [Value]) -> Result<()> {
        let common = DType::promote_all(&[inputs[0].dtype(), inputs[1].dtype()])
            .unwrap_or(DType::Bool);
        let holds = (self.test)(inputs[0].cast(common), inputs[1].cast(common));
        outputs[0] = Value::Bool(holds).cast(out_dtype(outputs)?);
        Ok(())
    }

    fn c_code(&self, inputs: &[String], outputs: &[String]) -> Option<String> {
        assign(outputs, format!("({} {} {})", inputs[0], self.symbol, inputs[1]))
    }

    fn grad(
        &self,
        _graph: &mut ScalarGraph,
        inputs: &[ScalarVar],
        _output_grads: &[ScalarVar],
    ) -> Result<Vec<Option<ScalarVar>>> {
        Ok(vec![None; inputs.len()])
    }
}

// =============================================================================
// Constructors
// =============================================================================

/// `x + y + ...`
#[must_use]
pub fn add() -> ScalarOpRef {
    Arc::new(Add)
}

/// `x - y`
#[must_use]
pub fn sub() -> ScalarOpRef {
    Arc::new(Sub)
}

/// `x * y * ...`
#[must_use]
pub fn mul() -> ScalarOpRef {
    Arc::new(Mul)
}

/// `x / y` in floating point.
#[must_use]
pub fn true_div() -> ScalarOpRef {
    Arc::new(TrueDiv)
}

/// `-x`
#[must_use]
pub fn neg() -> ScalarOpRef {
    Arc::new(Neg)
}

/// `x * x`
#[must_use]
pub fn sqr() -> ScalarOpRef {
    Arc::new(Sqr)
}

/// `e^x`
#[must_use]
pub fn exp() -> ScalarOpRef {
    Arc::new(Exp)
}

/// `ln x`
#[must_use]
pub fn log() -> ScalarOpRef {
    Arc::new(Log)
}

/// `x`
#[must_use]
pub fn identity() -> ScalarOpRef {
    Arc::new(Identity)
}

/// `y`, broadcast against `x`.
#[must_use]
pub fn second() -> ScalarOpRef {
    Arc::new(Second)
}

/// `max(x, y)`
#[must_use]
pub fn maximum() -> ScalarOpRef {
    Arc::new(Maximum)
}

/// `min(x, y)`
#[must_use]
pub fn minimum() -> ScalarOpRef {
    Arc::new(Minimum)
}

/// `x >= y`
#[must_use]
pub fn ge() -> ScalarOpRef {
    Arc::new(Predicate {
        name: "ge",
        symbol: ">=",
        logical: false,
        test: |x, y| x >= y,
    })
}

/// `x < y`
#[must_use]
pub fn lt() -> ScalarOpRef {
    Arc::new(Predicate {
        name: "lt",
        symbol: "<",
        logical: false,
        test: |x, y| x < y,
    })
}

/// Logical and.
#[must_use]
pub fn and() -> ScalarOpRef {
    Arc::new(Predicate {
        name: "and",
        symbol: "&&",
        logical: true,
        test: |x, y| x.is_truthy() && y.is_truthy(),
    })
}

/// Logical or.
#[must_use]
pub fn or() -> ScalarOpRef {
    Arc::new(Predicate {
        name: "or",
        symbol: "||",
        logical: true,
        test: |x, y| x.is_truthy() || y.is_truthy(),
    })
}

/// Resolves a built-in scalar op by name.
#[must_use]
pub fn lookup(name: &str) -> Option<ScalarOpRef> {
    let op = match name {
        "add" => add(),
        "sub" => sub(),
        "mul" => mul(),
        "true_div" => true_div(),
        "neg" => neg(),
        "sqr" => sqr(),
        "exp" => exp(),
        "log" => log(),
        "identity" => identity(),
        "second" => second(),
        "maximum" => maximum(),
        "minimum" => minimum(),
        "ge" => ge(),
        "lt" => lt(),
        "and" => and(),
        "or" => or(),
        _ => return None,
    };
    Some(op)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn run(op: &ScalarOpRef, inputs: &[Value]) -> Value {
        let dtypes: Vec<DType> = inputs.iter().map(|v| v.dtype()).collect();
        let mut outs: Vec<Value> = op
            .output_types(&dtypes)
            .unwrap()
            .into_iter()
            .map(Value::zero)
            .collect();
        op.apply(inputs, &mut outs).unwrap();
        outs[0]
    }

    #[test]
    fn test_add_promotes() {
        assert_eq!(run(&add(), &[Value::I8(3), Value::F32(0.5)]), Value::F32(3.5));
        assert_eq!(run(&add(), &[Value::I8(1), Value::I8(2), Value::I8(3)]), Value::I8(6));
    }

    #[test]
    fn test_integer_wraps() {
        assert_eq!(run(&add(), &[Value::I8(127), Value::I8(1)]), Value::I8(-128));
        assert_eq!(run(&mul(), &[Value::U8(16), Value::U8(16)]), Value::U8(0));
    }

    #[test]
    fn test_true_div_is_float() {
        assert_eq!(run(&true_div(), &[Value::I32(1), Value::I32(4)]), Value::F64(0.25));
        assert_eq!(run(&true_div(), &[Value::I8(1), Value::I8(2)]), Value::F32(0.5));
    }

    #[test]
    fn test_transcendental() {
        assert_eq!(run(&exp(), &[Value::F64(0.0)]), Value::F64(1.0));
        assert_eq!(run(&log(), &[Value::F64(1.0)]), Value::F64(0.0));
        assert_eq!(run(&neg(), &[Value::I16(4)]), Value::I16(-4));
        assert_eq!(run(&sqr(), &[Value::F32(3.0)]), Value::F32(9.0));
    }

    #[test]
    fn test_predicates() {
        assert_eq!(run(&ge(), &[Value::I32(2), Value::F64(2.0)]), Value::Bool(true));
        assert_eq!(run(&lt(), &[Value::I32(2), Value::I32(2)]), Value::Bool(false));
        assert_eq!(run(&and(), &[Value::Bool(true), Value::I8(0)]), Value::Bool(false));
        assert_eq!(run(&or(), &[Value::Bool(false), Value::I8(2)]), Value::Bool(true));
    }

    #[test]
    fn test_identities() {
        assert_eq!(add().identity(DType::I32), Some(Value::I32(0)));
        assert_eq!(mul().identity(DType::F32), Some(Value::F32(1.0)));
        assert_eq!(maximum().identity(DType::F64), Some(Value::F64(f64::NEG_INFINITY)));
        assert_eq!(and().identity(DType::Bool), Some(Value::Bool(true)));
        assert_eq!(sub().identity(DType::I32), None);
    }

    #[test]
    fn test_c_code() {
        let ins = vec!["a".to_string(), "b".to_string()];
        let outs = vec!["z".to_string()];
        assert_eq!(add().c_code(&ins, &outs).unwrap(), "z = a + b;");
        assert_eq!(second().c_code(&ins, &outs).unwrap(), "z = b;");
    }

    #[test]
    fn test_mul_grad() {
        let mut g = ScalarGraph::new();
        let x = g.input(DType::F64);
        let y = g.input(DType::F64);
        let gz = g.input(DType::F64);
        let grads = mul().grad(&mut g, &[x, y], &[gz]).unwrap();
        let gx = grads[0].unwrap();
        let bindings = [(x, Value::F64(3.0)), (y, Value::F64(5.0)), (gz, Value::F64(2.0))];
        assert_eq!(g.evaluate(gx, &bindings).unwrap(), Value::F64(10.0));
    }

    #[test]
    fn test_discrete_grad_undefined() {
        let mut g = ScalarGraph::new();
        let x = g.input(DType::I32);
        let y = g.input(DType::F32);
        let gz = g.input(DType::F32);
        let grads = add().grad(&mut g, &[x, y], &[gz]).unwrap();
        assert!(grads[0].is_none());
        assert_eq!(grads[1], Some(gz));
    }

    #[test]
    fn test_lookup() {
        for name in ["add", "second", "true_div", "or"] {
            assert_eq!(lookup(name).unwrap().name(), name);
        }
        assert!(lookup("cosh").is_none());
    }
}
