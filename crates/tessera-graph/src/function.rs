//! Function - Compiled Graph Evaluation
//!
//! Freezes the part of a graph needed for a set of outputs into a
//! topological node order and runs it on concrete arrays, through either
//! the reference or the specialized path of each op.
//!
//! # Key Features
//! - Argument type checks against input variable types
//! - Intermediate storage retained between runs for reuse
//! - Kernel source emission for every node that supports it
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use rustc_hash::FxHashMap;
use tessera_core::error::{Error, Result};
use tessera_tensor::Array;
use tracing::{debug, trace};

use crate::config::{EvalConfig, Mode};
use crate::graph::{Graph, NodeId, VarId};
use crate::op::NodeTypes;

// =============================================================================
// Function
// =============================================================================

/// An executable view of a graph from chosen inputs to chosen outputs.
#[derive(Debug)]
pub struct Function {
    graph: Graph,
    inputs: Vec<VarId>,
    outputs: Vec<VarId>,
    order: Vec<(NodeId, NodeTypes)>,
    config: EvalConfig,
    retained: FxHashMap<VarId, Array>,
}

impl Function {
    /// Compiles `graph` from `inputs` to `outputs`.
    ///
    /// Fails if an input is not a free variable or if the outputs depend on
    /// a free variable that is not listed as an input.
    pub fn new(graph: &Graph, inputs: &[VarId], outputs: &[VarId], config: EvalConfig) -> Result<Self> {
        for &input in inputs {
            let var = graph.var(input);
            if var.owner.is_some() || var.constant.is_some() {
                return Err(Error::type_error(format!(
                    "function input {} must be a free variable",
                    input.index()
                )));
            }
        }

        let order: Vec<(NodeId, NodeTypes)> = graph
            .toposort(outputs)
            .into_iter()
            .map(|node| (node, graph.node_types(node)))
            .collect();

        let is_available = |v: VarId| {
            let var = graph.var(v);
            var.owner.is_some() || var.constant.is_some() || inputs.contains(&v)
        };
        for &(node, _) in &order {
            if let Some(&missing) = graph.node(node).inputs.iter().find(|&&v| !is_available(v)) {
                return Err(Error::type_error(format!(
                    "variable {} is needed but was not given as an input",
                    missing.index()
                )));
            }
        }
        if let Some(&missing) = outputs.iter().find(|&&v| !is_available(v)) {
            return Err(Error::type_error(format!(
                "output variable {} is a free variable not given as an input",
                missing.index()
            )));
        }

        debug!(nodes = order.len(), mode = %config.mode, "compiled function");
        Ok(Self {
            graph: graph.clone(),
            inputs: inputs.to_vec(),
            outputs: outputs.to_vec(),
            order,
            config,
            retained: FxHashMap::default(),
        })
    }

    /// Compiles with the default configuration.
    pub fn compile(graph: &Graph, inputs: &[VarId], outputs: &[VarId]) -> Result<Self> {
        Self::new(graph, inputs, outputs, EvalConfig::default())
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    /// Returns the graph this function was compiled from.
    #[must_use]
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Number of nodes executed per run.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true if running only forwards inputs or constants.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Runs the function. Returned arrays may share storage with each other
    /// or with the arguments where ops declare views.
    pub fn run(&mut self, args: &[Array]) -> Result<Vec<Array>> {
        if args.len() != self.inputs.len() {
            return Err(Error::type_error(format!(
                "function takes {} arguments, got {}",
                self.inputs.len(),
                args.len()
            )));
        }

        let mut values: FxHashMap<VarId, Array> = FxHashMap::default();
        for (&var, arg) in self.inputs.iter().zip(args) {
            if self.config.check_inputs {
                self.graph.ty(var).check(arg)?;
            }
            values.insert(var, arg.clone());
        }

        for (node_id, types) in &self.order {
            let node = self.graph.node(*node_id);
            let inputs = node
                .inputs
                .iter()
                .map(|&v| lookup(&self.graph, &values, v))
                .collect::<Result<Vec<_>>>()?;
            let mut outputs: Vec<Option<Array>> = node
                .outputs
                .iter()
                .map(|v| self.retained.remove(v))
                .collect();

            trace!(op = %node.op, node = node_id.index(), "performing");
            match self.config.mode {
                Mode::Reference => node.op.perform(types, &inputs, &mut outputs)?,
                Mode::Specialized => node.op.perform_specialized(types, &inputs, &mut outputs)?,
            }

            for (&var, out) in node.outputs.iter().zip(outputs) {
                let array = out.ok_or_else(|| {
                    Error::invalid_operation(format!("{} left output {} unset", node.op, var.index()))
                })?;
                values.insert(var, array);
            }
        }

        let results = self
            .outputs
            .iter()
            .map(|&v| lookup(&self.graph, &values, v))
            .collect::<Result<Vec<_>>>()?;

        if self.config.reuse_storage {
            for (node_id, _) in &self.order {
                for var in &self.graph.node(*node_id).outputs {
                    if !self.outputs.contains(var) {
                        if let Some(array) = values.remove(var) {
                            self.retained.insert(*var, array);
                        }
                    }
                }
            }
        }
        Ok(results)
    }

    /// Kernel source for every node that emits it, in execution order.
    pub fn c_code(&self) -> Result<Vec<(NodeId, String)>> {
        let name = |v: &VarId| format!("V{}", v.index());
        let mut sources = Vec::new();
        for (node_id, types) in &self.order {
            let node = self.graph.node(*node_id);
            let inames: Vec<String> = node.inputs.iter().map(name).collect();
            let onames: Vec<String> = node.outputs.iter().map(name).collect();
            if let Some(source) = node.op.c_code(types, &inames, &onames)? {
                sources.push((*node_id, source));
            }
        }
        Ok(sources)
    }
}

fn lookup(graph: &Graph, values: &FxHashMap<VarId, Array>, var: VarId) -> Result<Array> {
    if let Some(array) = values.get(&var) {
        return Ok(array.clone());
    }
    graph
        .var(var)
        .constant
        .clone()
        .ok_or_else(|| Error::invalid_operation(format!("variable {} has no value", var.index())))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TensorType;
    use tessera_core::dtype::DType;

    #[test]
    fn test_passthrough_and_argument_checks() {
        let mut g = Graph::new();
        let x = g.input("x", TensorType::new(DType::F32, &[true, false]));
        let mut f = Function::compile(&g, &[x], &[x]).unwrap();
        assert!(f.is_empty());

        let arg = Array::zeros(DType::F32, &[1, 3]);
        let out = f.run(&[arg.clone()]).unwrap();
        assert!(out[0].shares_storage(&arg));

        let wrong = Array::zeros(DType::F32, &[2, 3]);
        assert!(matches!(f.run(&[wrong]), Err(Error::Type { .. })));
        assert!(f.run(&[]).is_err());
    }

    #[test]
    fn test_unbound_variables_rejected() {
        let mut g = Graph::new();
        let x = g.input("x", TensorType::scalar(DType::F64));
        let y = g.input("y", TensorType::scalar(DType::F64));
        assert!(Function::compile(&g, &[x], &[y]).is_err());

        let c = g.constant(Array::scalar(1.0f64));
        assert!(Function::compile(&g, &[c], &[c]).is_err());
        assert!(Function::compile(&g, &[], &[c]).is_ok());
    }
}
