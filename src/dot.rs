//! Network to DOT (Graphviz) conversion.
//!
//! This module renders logic networks, buffered or not, in DOT format.
//!
//! # DOT Format
//!
//! The generated DOT output follows these conventions:
//! - **Inputs** are rendered as triangles, **outputs** as inverted triangles
//! - **Gates** are rendered as circles labeled with their function
//! - **Buffers and splitters** are rendered as small boxes
//! - **Edges** point from fanin to gate; complemented edges are dashed
//! - When levels are given, nodes of the same level share a rank and every
//!   rank is labeled with its level
//!
//! # Examples
//!
//! ```
//! use aqfp_rs::dot::to_dot;
//! use aqfp_rs::network::Network;
//!
//! let mut ntk = Network::new();
//! let a = ntk.add_input();
//! let b = ntk.add_input();
//! let f = ntk.add_maj(a, !b, a);
//! ntk.add_output(f);
//!
//! let dot = to_dot(&ntk, None).unwrap();
//! // Write to file and render with: dot -Tpng output.dot -o output.png
//! ```

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::gate::{BinaryType, Gate, TernaryType};
use crate::network::LogicNetwork;
use crate::signal::Signal;
use crate::types::Node;

/// Configuration options for DOT output generation.
#[derive(Debug, Clone)]
pub struct DotConfig {
    /// Shape for gates (default: "circle")
    pub gate_shape: &'static str,
    /// Shape for buffers and splitters (default: "box")
    pub buffer_shape: &'static str,
    /// Shape for primary inputs (default: "triangle")
    pub input_shape: &'static str,
    /// Shape for primary outputs (default: "invtriangle")
    pub output_shape: &'static str,
    /// Style for regular edges (default: "solid")
    pub edge_style: &'static str,
    /// Style for complemented edges (default: "dashed")
    pub negated_edge_style: &'static str,
    /// Whether to draw the constant node even if nothing reads it (default: false)
    pub show_constant: bool,
}

impl Default for DotConfig {
    fn default() -> Self {
        Self {
            gate_shape: "circle",
            buffer_shape: "box",
            input_shape: "triangle",
            output_shape: "invtriangle",
            edge_style: "solid",
            negated_edge_style: "dashed",
            show_constant: false,
        }
    }
}

fn label(gate: &Gate) -> &'static str {
    match gate {
        Gate::Buffer(_) => "",
        Gate::Binary(BinaryType::And, _) => "AND",
        Gate::Binary(BinaryType::Xor, _) => "XOR",
        Gate::Ternary(TernaryType::Maj, _) => "MAJ",
        Gate::Ternary(TernaryType::Xor, _) => "XOR3",
    }
}

/// Converts a network to DOT format.
///
/// `levels`, if given, holds one level per node and is used to rank the nodes.
pub fn to_dot<N: LogicNetwork>(ntk: &N, levels: Option<&[u32]>) -> Result<String, std::fmt::Error> {
    to_dot_with_config(ntk, levels, &DotConfig::default())
}

/// Converts a network to DOT format with custom configuration.
pub fn to_dot_with_config<N: LogicNetwork>(
    ntk: &N,
    levels: Option<&[u32]>,
    config: &DotConfig,
) -> Result<String, std::fmt::Error> {
    let mut dot = String::new();
    writeln!(dot, "digraph {{")?;
    writeln!(dot, "rankdir=BT;")?;

    let uses_constant = config.show_constant
        || ntk.outputs().iter().any(|s| s.is_const())
        || ntk
            .gates()
            .iter()
            .any(|&g| ntk.fanins(g).iter().any(|s| s.is_const()));

    let node_line = |dot: &mut String, n: Node| -> std::fmt::Result {
        if ntk.is_constant(n) {
            writeln!(dot, "{} [shape=square, label=\"0\"];", n)
        } else if ntk.is_pi(n) {
            writeln!(dot, "{} [shape={}, label=\"{}\"];", n, config.input_shape, n)
        } else if ntk.is_buffer(n) {
            writeln!(dot, "{} [shape={}, label=\"\", width=0.2, height=0.2];", n, config.buffer_shape)
        } else {
            let name = ntk.gate(n).map(label).unwrap_or("?");
            writeln!(dot, "{} [shape={}, label=\"{}\"];", n, config.gate_shape, name)
        }
    };

    let nodes = (0..ntk.size() as u32)
        .map(Node::new)
        .filter(|&n| !ntk.is_constant(n) || uses_constant);
    match levels {
        Some(levels) => {
            let mut ranks = BTreeMap::<u32, Vec<Node>>::new();
            for n in nodes {
                ranks.entry(levels[n.index()]).or_default().push(n);
            }
            for (level, members) in &ranks {
                writeln!(dot, "{{ rank=same")?;
                writeln!(dot, "level{} [shape=plaintext, label=\"{}\"];", level, level)?;
                for &n in members {
                    node_line(&mut dot, n)?;
                }
                writeln!(dot, "}}")?;
            }
            // Invisible chain keeping the level labels in order.
            let labels: Vec<String> = ranks.keys().map(|l| format!("level{}", l)).collect();
            if labels.len() > 1 {
                writeln!(dot, "{} [style=invis];", labels.join(" -> "))?;
            }
        }
        None => {
            for n in nodes {
                node_line(&mut dot, n)?;
            }
        }
    }

    let edge = |dot: &mut String, from: Signal, to: &str| -> std::fmt::Result {
        let style = if from.is_negated() {
            config.negated_edge_style
        } else {
            config.edge_style
        };
        writeln!(dot, "{} -> {} [style={}];", from.node(), to, style)
    };

    for &g in ntk.gates() {
        for &fi in ntk.fanins(g) {
            edge(&mut dot, fi, &g.to_string())?;
        }
    }

    writeln!(dot, "{{ rank=source")?;
    for i in 0..ntk.num_pos() {
        writeln!(dot, "po{} [shape={}, label=\"po{}\"];", i, config.output_shape, i)?;
    }
    writeln!(dot, "}}")?;
    for (i, &po) in ntk.outputs().iter().enumerate() {
        edge(&mut dot, po, &format!("po{}", i))?;
    }

    writeln!(dot, "}}")?;
    Ok(dot)
}
