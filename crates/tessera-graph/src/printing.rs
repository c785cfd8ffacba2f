//! Printing - Human-Readable Expression Rendering
//!
//! Renders a variable as the expression that produces it. Ops control
//! their own rendering through `Op::pretty`; named variables print as their
//! name and constants as their value.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use crate::graph::{Graph, VarId};

/// Renders the expression computing `var`.
#[must_use]
pub fn pprint(graph: &Graph, var: VarId) -> String {
    let variable = graph.var(var);
    if let Some(name) = &variable.name {
        return name.clone();
    }
    if let Some(constant) = &variable.constant {
        return match constant.item() {
            Ok(value) => value.to_string(),
            Err(_) => format!("Constant{{{:?}}}", constant.shape()),
        };
    }
    match variable.owner {
        Some((node_id, index)) => {
            let node = graph.node(node_id);
            let inputs: Vec<String> = node.inputs.iter().map(|&v| pprint(graph, v)).collect();
            let rendered = node.op.pretty(&graph.node_types(node_id), &inputs);
            if node.outputs.len() > 1 {
                format!("{rendered}[{index}]")
            } else {
                rendered
            }
        }
        None => format!("<{}>", variable.ty),
    }
}
