//! Kernel Source Generation - Loop Nest Templates
//!
//! Emits kernel source for strided loop nests in four fragments that are
//! always concatenated in the same order: declarations, dimension checks,
//! output allocation, then the loop itself. Operators supply one iteration
//! order per operand; the innermost body is the scalar op's inline code.
//!
//! # Key Features
//! - Per-operand iteration orders with stride-0 levels for broadcast axes
//! - Dimension checks naming the mismatching operands
//! - Code hooks at the entry of any loop level (reduction accumulators)
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use tessera_core::dtype::DType;
use tessera_core::value::Value;

/// Maps each loop level to an operand axis, or to `None` for a level the
/// operand is broadcast along.
pub type IterOrder = Vec<Option<usize>>;

/// Iteration order for an operand whose rank equals the loop depth;
/// broadcastable axes are stepped with stride 0.
#[must_use]
pub fn broadcast_order(pattern: &[bool]) -> IterOrder {
    pattern
        .iter()
        .enumerate()
        .map(|(axis, &bcast)| (!bcast).then_some(axis))
        .collect()
}

fn depth(orders: &[IterOrder]) -> usize {
    orders.first().map_or(0, Vec::len)
}

// =============================================================================
// Fragments
// =============================================================================

/// Declares the shared loop extents and per-operand iteration state.
#[must_use]
pub fn make_declare(orders: &[IterOrder], dtypes: &[DType], names: &[String]) -> String {
    let nloops = depth(orders);
    let mut out = format!("npy_intp dims[{}];\n", nloops.max(1));
    for ((order, dtype), name) in orders.iter().zip(dtypes).zip(names) {
        out.push_str(&format!("{}* {name}_data;\n", dtype.c_type()));
        if !order.is_empty() {
            let strides: Vec<String> = (0..order.len()).map(|l| format!("{name}_stride{l}")).collect();
            out.push_str(&format!("npy_intp {};\n", strides.join(", ")));
        }
    }
    out
}

/// Fills `dims` from the inputs and checks that every non-broadcast level
/// agrees across them, then points each input's iteration state at its data.
/// Levels no input drives get extent 1.
#[must_use]
pub fn make_checks(orders: &[IterOrder], dtypes: &[DType], names: &[String]) -> String {
    let mut out = String::new();
    for level in 0..depth(orders) {
        let mut driving: Option<(usize, usize)> = None;
        for (i, order) in orders.iter().enumerate() {
            let Some(axis) = order[level] else { continue };
            match driving {
                None => {
                    out.push_str(&format!("dims[{level}] = {}.dims[{axis}];\n", names[i]));
                    driving = Some((i, axis));
                }
                Some((first, first_axis)) => {
                    out.push_str(&format!(
                        "if ({name}.dims[{axis}] != dims[{level}]) {{\n    \
                         tessera_fail(\"Input dimension mis-match. \
                         (input[{first}].shape[{first_axis}] = %ld, input[{i}].shape[{axis}] = %ld)\", \
                         dims[{level}], {name}.dims[{axis}]);\n}}\n",
                        name = names[i]
                    ));
                }
            }
        }
        if driving.is_none() {
            out.push_str(&format!("dims[{level}] = 1;\n"));
        }
    }
    for ((order, dtype), name) in orders.iter().zip(dtypes).zip(names) {
        out.push_str(&bind_state(order, *dtype, name));
    }
    out
}

/// Allocates output `name` of rank `ndim` unless it already holds storage
/// of that shape. Output axis `a` spans loop level `a`, so its extent is
/// `dims[a]`; broadcast axes pick up the unit extent `make_checks` wrote.
#[must_use]
pub fn make_alloc(order: &IterOrder, ndim: usize, dtype: DType, name: &str) -> String {
    let shape: Vec<String> = (0..ndim).map(|a| format!("dims[{a}]")).collect();
    let mut out = format!("npy_intp {name}_dims[{}] = {{{}}};\n", ndim.max(1), shape.join(", "));
    let mut condition = format!("{name}.data == NULL || {name}.nd != {ndim}");
    for a in 0..ndim {
        condition.push_str(&format!(" || {name}.dims[{a}] != {name}_dims[{a}]"));
    }
    out.push_str(&format!(
        "if ({condition}) {{\n    tessera_alloc(&{name}, \"{}\", {ndim}, {name}_dims);\n}}\n",
        dtype.name()
    ));
    out.push_str(&bind_state(order, dtype, name));
    out
}

/// Makes output `name` alias input `source` and binds its iteration state.
#[must_use]
pub fn make_alias(order: &IterOrder, dtype: DType, name: &str, source: &str) -> String {
    let mut out = format!("{name} = {source};\n");
    out.push_str(&bind_state(order, dtype, name));
    out
}

fn bind_state(order: &IterOrder, dtype: DType, name: &str) -> String {
    let mut out = format!("{name}_data = ({}*){name}.data + {name}.offset;\n", dtype.c_type());
    for (level, axis) in order.iter().enumerate() {
        match axis {
            Some(axis) => out.push_str(&format!("{name}_stride{level} = {name}.strides[{axis}];\n")),
            None => out.push_str(&format!("{name}_stride{level} = 0;\n")),
        }
    }
    out
}

/// Storage expression for operand `name` using the indices of the
/// outermost `levels` loops.
#[must_use]
pub fn element_ref(name: &str, levels: usize) -> String {
    if levels == 0 {
        return format!("{name}_data[0]");
    }
    let terms: Vec<String> = (0..levels).map(|l| format!("i{l} * {name}_stride{l}")).collect();
    format!("{name}_data[{}]", terms.join(" + "))
}

/// Emits the loop nest. `pre` places code just before loop level `n`
/// opens (level `depth` means just before the body). Inside the body each
/// operand is reachable as `<name>_i`.
#[must_use]
pub fn make_loop(
    orders: &[IterOrder],
    dtypes: &[DType],
    names: &[String],
    pre: &[(usize, String)],
    body: &str,
) -> String {
    let nloops = depth(orders);
    let mut out = String::new();
    for level in 0..=nloops {
        let indent = "    ".repeat(level);
        for (_, code) in pre.iter().filter(|(at, _)| *at == level) {
            for line in code.lines() {
                out.push_str(&format!("{indent}{line}\n"));
            }
        }
        if level < nloops {
            out.push_str(&format!(
                "{indent}for (npy_intp i{level} = 0; i{level} < dims[{level}]; ++i{level}) {{\n"
            ));
        }
    }
    let indent = "    ".repeat(nloops);
    for (dtype, name) in dtypes.iter().zip(names) {
        out.push_str(&format!(
            "{indent}{}& {name}_i = {};\n",
            dtype.c_type(),
            element_ref(name, nloops)
        ));
    }
    for line in body.lines() {
        out.push_str(&format!("{indent}{line}\n"));
    }
    for level in (0..nloops).rev() {
        out.push_str(&format!("{}}}\n", "    ".repeat(level)));
    }
    out
}

/// A value as a kernel source literal.
#[must_use]
pub fn c_literal(value: Value) -> String {
    match value {
        Value::Bool(b) => u8::from(b).to_string(),
        Value::F32(v) if v.is_infinite() => infinity(v.is_sign_negative()),
        Value::F64(v) if v.is_infinite() => infinity(v.is_sign_negative()),
        Value::F32(v) => format!("{v:?}f"),
        Value::F64(v) => format!("{v:?}"),
        other => other.to_string(),
    }
}

fn infinity(negative: bool) -> String {
    let literal = if negative { "-INFINITY" } else { "INFINITY" };
    literal.to_string()
}

// =============================================================================
// Kernel
// =============================================================================

/// The four fragments of one node's kernel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Kernel {
    /// Declarations.
    pub declare: String,
    /// Dimension checks and input binding.
    pub checks: String,
    /// Output allocation or aliasing.
    pub alloc: String,
    /// Loop nest.
    pub body: String,
}

impl Kernel {
    /// Full source: declare, check, alloc, loop.
    #[must_use]
    pub fn source(&self) -> String {
        [&self.declare, &self.checks, &self.alloc, &self.body]
            .iter()
            .filter(|part| !part.is_empty())
            .map(|part| part.trim_end())
            .collect::<Vec<_>>()
            .join("\n\n")
            + "\n"
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: &[&str]) -> Vec<String> {
        n.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_broadcast_order() {
        assert_eq!(broadcast_order(&[false, true, false]), vec![Some(0), None, Some(2)]);
        assert!(broadcast_order(&[]).is_empty());
    }

    #[test]
    fn test_checks_compare_against_driving_operand() {
        let orders = vec![vec![Some(0), Some(1)], vec![None, Some(1)]];
        let text = make_checks(&orders, &[DType::F64, DType::F64], &names(&["a", "b"]));
        assert!(text.contains("dims[0] = a.dims[0];"));
        assert!(text.contains("dims[1] = a.dims[1];"));
        assert!(text.contains("if (b.dims[1] != dims[1])"));
        assert!(text.contains("b_stride0 = 0;"));
    }

    #[test]
    fn test_alloc_keeps_broadcast_axes() {
        let text = make_alloc(&broadcast_order(&[true, false]), 2, DType::F64, "z");
        assert!(text.contains("npy_intp z_dims[2] = {dims[0], dims[1]};"));
        assert!(text.contains("z.nd != 2"));
        assert!(text.contains("tessera_alloc(&z, \"f64\", 2, z_dims);"));
        assert!(text.contains("z_stride0 = 0;"));
        assert!(text.contains("z_stride1 = z.strides[1];"));
    }

    #[test]
    fn test_alloc_reduced_output() {
        let text = make_alloc(&vec![Some(0), None], 1, DType::I32, "z");
        assert!(text.contains("npy_intp z_dims[1] = {dims[0]};"));
        assert!(text.contains("z.nd != 1"));
        assert!(text.contains("z_stride1 = 0;"));
    }

    #[test]
    fn test_unit_extent_for_undriven_level() {
        let orders = vec![broadcast_order(&[true, false])];
        let text = make_checks(&orders, &[DType::F64], &names(&["a"]));
        assert!(text.contains("dims[0] = 1;"));
        assert!(text.contains("dims[1] = a.dims[1];"));
    }

    #[test]
    fn test_loop_nest_and_hooks() {
        let orders = vec![vec![Some(0), Some(1)]];
        let text = make_loop(
            &orders,
            &[DType::F32],
            &names(&["x"]),
            &[(1, "acc = 0;".to_string())],
            "x_i = -x_i;",
        );
        let outer = text.find("for (npy_intp i0").unwrap();
        let hook = text.find("acc = 0;").unwrap();
        let inner = text.find("for (npy_intp i1").unwrap();
        assert!(outer < hook && hook < inner);
        assert!(text.contains("npy_float32& x_i = x_data[i0 * x_stride0 + i1 * x_stride1];"));
        assert_eq!(text.matches('}').count(), 2);
    }

    #[test]
    fn test_kernel_fragment_order() {
        let kernel = Kernel {
            declare: "D".into(),
            checks: "C".into(),
            alloc: "A".into(),
            body: "L".into(),
        };
        assert_eq!(kernel.source(), "D\n\nC\n\nA\n\nL\n");
    }

    #[test]
    fn test_literals() {
        assert_eq!(c_literal(Value::F64(f64::NEG_INFINITY)), "-INFINITY");
        assert_eq!(c_literal(Value::F64(0.0)), "0.0");
        assert_eq!(c_literal(Value::Bool(true)), "1");
        assert_eq!(c_literal(Value::I32(-3)), "-3");
    }
}
