//! End-to-end tests for the operator families through compiled functions.

use tessera::prelude::*;

fn both_modes(graph: &Graph, inputs: &[VarId], outputs: &[VarId], args: &[Array]) -> Vec<Vec<Array>> {
    [Mode::Reference, Mode::Specialized]
        .into_iter()
        .map(|mode| {
            let mut f = Function::new(graph, inputs, outputs, EvalConfig::new().mode(mode)).unwrap();
            f.run(args).unwrap()
        })
        .collect()
}

/// Test 1: rows and columns broadcast along the right axis
#[test]
fn test_add_broadcasts_rows_and_columns() {
    let mut g = Graph::new();
    let x = g.input("x", TensorType::new(DType::F64, &[false, false]));
    let row = g.input("row", TensorType::new(DType::F64, &[true, false]));
    let col = g.input("col", TensorType::new(DType::F64, &[false, true]));
    let by_row = functional::add(&mut g, x, row).unwrap();
    let by_col = functional::add(&mut g, x, col).unwrap();

    let xs = arange(DType::F64, &[10, 5]).unwrap();
    let rows = Array::from_vec(vec![100.0f64, 200.0, 300.0, 400.0, 500.0], &[1, 5]).unwrap();
    let cols = arange(DType::F64, &[10, 1]).unwrap();
    for out in both_modes(&g, &[x, row, col], &[by_row, by_col], &[xs, rows, cols]) {
        assert_eq!(out[0].shape(), &[10, 5]);
        assert_eq!(out[1].shape(), &[10, 5]);
        let r = out[0].to_vec::<f64>();
        let c = out[1].to_vec::<f64>();
        for i in 0..10 {
            for j in 0..5 {
                let x = (i * 5 + j) as f64;
                assert_eq!(r[i * 5 + j], x + 100.0 * (j + 1) as f64);
                assert_eq!(c[i * 5 + j], x + i as f64);
            }
        }
    }
}

/// Test 2: an output may not overwrite an input it outgrows
#[test]
fn test_inplace_into_broadcast_input_rejected() {
    let mut g = Graph::new();
    let x = g.input("x", TensorType::new(DType::F64, &[false, false]));
    let row = g.input("row", TensorType::new(DType::F64, &[true, false]));
    let op = Elemwise::inplace(scalar::add(), &[(0, 1)]);
    assert!(matches!(g.call(op, &[x, row]), Err(Error::Value { .. })));

    let ok = Elemwise::inplace(scalar::add(), &[(0, 0)]);
    assert!(g.call(ok, &[x, row]).is_ok());
}

/// Test 3: mismatched extents fail instead of truncating
#[test]
fn test_dimension_mismatch_reported() {
    let mut g = Graph::new();
    let a = g.input("a", TensorType::new(DType::F32, &[false, false]));
    let b = g.input("b", TensorType::new(DType::F32, &[false, false]));
    let c = functional::add(&mut g, a, b).unwrap();
    for mode in [Mode::Reference, Mode::Specialized] {
        let mut f = Function::new(&g, &[a, b], &[c], EvalConfig::new().mode(mode)).unwrap();
        let err = f
            .run(&[zeros(DType::F32, &[3, 4]), zeros(DType::F32, &[3, 5])])
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }), "{err}");
    }
}

/// Test 4: empty and full reductions
#[test]
fn test_reducer_identity_cases() {
    let mut g = Graph::new();
    let x = g.input("x", TensorType::new(DType::F64, &[false, false]));
    let copy = functional::reduce(&mut g, scalar::add(), x, Some(&[])).unwrap();
    let total = functional::reduce(&mut g, scalar::add(), x, None).unwrap();

    let xs = arange(DType::F64, &[4, 5]).unwrap();
    for out in both_modes(&g, &[x], &[copy, total], &[xs.clone()]) {
        assert_eq!(out[0].shape(), xs.shape());
        assert_eq!(out[0].to_vec::<f64>(), xs.to_vec::<f64>());
        assert_eq!(out[1].shape(), &[] as &[usize]);
        assert_eq!(out[1].item().unwrap(), Value::F64(190.0));
    }
}

/// Test 5: gradient of a row sum is ones everywhere
#[test]
fn test_sum_gradient_is_ones() {
    let mut g = Graph::new();
    let x = g.input("x", TensorType::new(DType::F64, &[false, false]));
    let s = functional::sum(&mut g, x, Some(&[1])).unwrap();
    let gz = g.input("gz", TensorType::new(DType::F64, &[false]));
    let gx = grad(&mut g, s, &[x], Some(gz)).unwrap()[0].unwrap();

    let args = [zeros(DType::F64, &[3, 4]), ones(DType::F64, &[3])];
    for out in both_modes(&g, &[x, gz], &[gx], &args) {
        assert_eq!(out[0].shape(), &[3, 4]);
        assert_eq!(out[0].to_vec::<f64>(), vec![1.0; 12]);
    }
}

/// Test 6: sums widen narrow integers only
#[test]
fn test_sum_result_types() {
    let mut g = Graph::new();
    let small = g.input("small", TensorType::new(DType::I8, &[false]));
    let float = g.input("float", TensorType::new(DType::F32, &[false]));
    let s_small = functional::sum(&mut g, small, None).unwrap();
    let s_float = functional::sum(&mut g, float, None).unwrap();
    assert_eq!(g.ty(s_small).dtype, DType::I32);
    assert_eq!(g.ty(s_float).dtype, DType::F32);

    let args = [
        Array::from_vec(vec![127i8, 127, 127], &[3]).unwrap(),
        Array::from_vec(vec![0.5f32, 0.25], &[2]).unwrap(),
    ];
    for out in both_modes(&g, &[small, float], &[s_small, s_float], &args) {
        assert_eq!(out[0].item().unwrap(), Value::I32(381));
        assert_eq!(out[1].item().unwrap(), Value::F32(0.75));
    }
}

/// Test 7: equality and hashing follow constructor arguments
#[test]
fn test_structural_equality() {
    let a = DimShuffle::new(&[false, true], order![1, x, 0], false).unwrap();
    let b = DimShuffle::new(&[false, true], order![1, x, 0], false).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.op_hash(), b.op_hash());
    assert_ne!(a, DimShuffle::new(&[false, true], order![x, 1, 0], false).unwrap());

    let e1 = Elemwise::inplace(scalar::add(), &[(0, 0)]);
    let e2 = Elemwise::inplace(scalar::add(), &[(0, 0)]);
    assert_eq!(e1, e2);
    assert_eq!(e1.op_hash(), e2.op_hash());
    assert_ne!(e1, Elemwise::inplace(scalar::add(), &[(0, 1)]));
    assert_ne!(e1, Elemwise::new(scalar::add()));

    let r1 = CAReduce::new(scalar::maximum(), Some(&[0])).unwrap();
    let r2 = CAReduce::new(scalar::maximum(), Some(&[0])).unwrap();
    assert_eq!(r1, r2);
    assert_eq!(r1.op_hash(), r2.op_hash());
    assert_ne!(r1, CAReduce::new(scalar::maximum(), Some(&[1])).unwrap());
}

/// Test 8: operators survive a JSON round trip
#[test]
fn test_operator_serialization() {
    let shuffle = DimShuffle::new(&[true, false], order![1, x], true).unwrap();
    let json = serde_json::to_string(&shuffle).unwrap();
    let back: DimShuffle = serde_json::from_str(&json).unwrap();
    assert_eq!(back, shuffle);
    assert_eq!(back.op_hash(), shuffle.op_hash());

    let elemwise = Elemwise::inplace(scalar::mul(), &[(0, 1)]);
    let back: Elemwise = serde_json::from_str(&serde_json::to_string(&elemwise).unwrap()).unwrap();
    assert_eq!(back, elemwise);

    let sum = Sum::new(Some(&[0, 2]));
    let back: Sum = serde_json::from_str(&serde_json::to_string(&sum).unwrap()).unwrap();
    assert_eq!(back, sum);
}

/// Test 9: kernels are emitted for every node of a compiled expression
#[test]
fn test_function_kernel_sources() {
    let mut g = Graph::new();
    let x = g.input("x", TensorType::new(DType::F32, &[false, false]));
    let y = g.input("y", TensorType::new(DType::F32, &[false]));
    let z = functional::mul(&mut g, x, y).unwrap();
    let total = functional::sum(&mut g, z, Some(&[0])).unwrap();

    let f = Function::compile(&g, &[x, y], &[total]).unwrap();
    let sources = f.c_code().unwrap();
    assert_eq!(sources.len(), f.len());
    let (_, reduce) = sources.last().unwrap();
    assert!(reduce.contains("for (npy_intp i1"));
    assert!(reduce.contains("npy_float32*"));
}

/// Test 10: printing names the expression structure
#[test]
fn test_pretty_printing() {
    let mut g = Graph::new();
    let x = g.input("x", TensorType::new(DType::F64, &[false, false]));
    let t = functional::transpose(&mut g, x).unwrap();
    let e = functional::exp(&mut g, t).unwrap();
    assert_eq!(pprint(&g, e), "exp(x.T)");
}

/// Test 11: kernels allocate broadcast outputs at full rank
#[test]
fn test_kernel_allocates_broadcast_output_at_full_rank() {
    let mut g = Graph::new();
    let a = g.input("a", TensorType::new(DType::F64, &[true, false]));
    let b = g.input("b", TensorType::new(DType::F64, &[true, false]));
    let z = functional::add(&mut g, a, b).unwrap();

    let mut f = Function::compile(&g, &[a, b], &[z]).unwrap();
    let sources = f.c_code().unwrap();
    let (_, kernel) = &sources[0];
    let out = format!("V{}", z.index());
    assert!(kernel.contains(&format!("tessera_alloc(&{out}, \"f64\", 2, {out}_dims);")));
    assert!(kernel.contains(&format!("{out}.nd != 2")));
    assert!(kernel.contains(&format!("{out}_stride0 = 0;")));
    assert!(kernel.contains(&format!("{out}_stride1 = {out}.strides[1];")));

    let row = Array::from_vec(vec![1.0f64, 2.0, 3.0], &[1, 3]).unwrap();
    let result = f.run(&[row.clone(), row]).unwrap();
    assert_eq!(result[0].shape(), &[1, 3]);
}
