//! Logic networks.
//!
//! The engine is written against the [`LogicNetwork`] trait, which exposes only
//! what buffer insertion needs: node identity, the constant, primary inputs and
//! outputs, gates in topological order, fanins and fan-out sizes. The
//! materializer additionally needs to build a network, which is captured by
//! [`BufferedNetwork`].
//!
//! [`Network`] is the concrete implementation shipped with the crate. It stores
//! nodes in creation order (node 0 is the constant), so the gate list is a
//! topological order by construction. It handles AND/XOR/MAJ gates and explicit
//! buffers, which makes it usable both as the input and as the output of buffer
//! insertion.
//!
//! # Example
//!
//! ```
//! use aqfp_rs::network::{LogicNetwork, Network};
//!
//! let mut ntk = Network::new();
//! let a = ntk.add_input();
//! let b = ntk.add_input();
//! let f = ntk.add_and(a, b);
//! ntk.add_output(f);
//!
//! assert_eq!(ntk.num_gates(), 1);
//! assert_eq!(ntk.fanout_size(a.node()), 1);
//! assert_eq!(ntk.simulate(&[true, true]), vec![true]);
//! ```

use crate::gate::Gate;
use crate::signal::Signal;
use crate::types::{Consumer, Node};

/// Read-only view of a logic network.
pub trait LogicNetwork {
    /// Total number of nodes, including the constant.
    fn size(&self) -> usize;

    fn is_pi(&self, node: Node) -> bool;

    fn is_buffer(&self, node: Node) -> bool;

    /// Primary inputs in creation order.
    fn pis(&self) -> &[Node];

    /// Gates (buffers included) in topological order.
    fn gates(&self) -> &[Node];

    /// Primary output drivers, indexed by output port.
    fn outputs(&self) -> &[Signal];

    /// Fanins of a node; empty for the constant and for inputs.
    fn fanins(&self, node: Node) -> &[Signal];

    /// Number of references to a node, primary outputs included.
    fn fanout_size(&self, node: Node) -> u32;

    /// Function of a gate node.
    fn gate(&self, node: Node) -> Option<&Gate>;

    fn get_constant(&self, value: bool) -> Signal {
        Signal::from(value)
    }

    fn is_constant(&self, node: Node) -> bool {
        node == Node::CONSTANT
    }

    fn is_gate(&self, node: Node) -> bool {
        !self.is_constant(node) && !self.is_pi(node)
    }

    fn num_pis(&self) -> usize {
        self.pis().len()
    }

    fn num_pos(&self) -> usize {
        self.outputs().len()
    }

    fn num_gates(&self) -> usize {
        self.gates().len()
    }

    fn num_buffers(&self) -> usize {
        self.gates().iter().filter(|&&n| self.is_buffer(n)).count()
    }
}

/// A network that can be built node by node.
pub trait BufferedNetwork: LogicNetwork {
    fn create_pi(&mut self) -> Signal;

    /// Adds a primary output and returns its port index.
    fn create_po(&mut self, signal: Signal) -> usize;

    fn create_gate(&mut self, gate: Gate) -> Signal;

    fn create_buf(&mut self, signal: Signal) -> Signal {
        self.create_gate(Gate::buffer(signal))
    }
}

/// Collects, for every node, the list of its consumers: one entry per fanin
/// reference of a gate, plus one entry per primary output it drives.
pub fn consumer_lists<N: LogicNetwork>(ntk: &N) -> Vec<Vec<Consumer>> {
    let mut lists = vec![Vec::new(); ntk.size()];
    for &g in ntk.gates() {
        for fi in ntk.fanins(g) {
            lists[fi.node().index()].push(Consumer::Node(g));
        }
    }
    for (i, po) in ntk.outputs().iter().enumerate() {
        lists[po.node().index()].push(Consumer::Output(i));
    }
    lists
}

#[derive(Debug, Clone)]
enum NodeKind {
    Constant,
    Input,
    Gate(Gate),
}

/// Concrete logic network with AND, XOR, MAJ and buffer nodes.
#[derive(Debug, Clone)]
pub struct Network {
    nodes: Vec<NodeKind>,
    fanout: Vec<u32>,
    inputs: Vec<Node>,
    gates: Vec<Node>,
    outputs: Vec<Signal>,
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

impl Network {
    pub fn new() -> Self {
        Self {
            nodes: vec![NodeKind::Constant],
            fanout: vec![0],
            inputs: Vec::new(),
            gates: Vec::new(),
            outputs: Vec::new(),
        }
    }

    fn push(&mut self, kind: NodeKind) -> Node {
        let node = Node::new(self.nodes.len() as u32);
        self.nodes.push(kind);
        self.fanout.push(0);
        node
    }

    pub fn add_input(&mut self) -> Signal {
        let node = self.push(NodeKind::Input);
        self.inputs.push(node);
        Signal::from_node(node)
    }

    /// Adds a gate node.
    ///
    /// # Panics
    ///
    /// Panics if a fanin refers to a node that does not exist yet.
    pub fn add_gate(&mut self, gate: Gate) -> Signal {
        for fi in gate.inputs() {
            assert!(fi.node().index() < self.nodes.len(), "Fanin {} does not exist", fi);
        }
        for fi in gate.inputs() {
            self.fanout[fi.node().index()] += 1;
        }
        let node = self.push(NodeKind::Gate(gate));
        self.gates.push(node);
        Signal::from_node(node)
    }

    pub fn add_output(&mut self, signal: Signal) -> usize {
        assert!(signal.node().index() < self.nodes.len(), "Output driver {} does not exist", signal);
        self.fanout[signal.node().index()] += 1;
        self.outputs.push(signal);
        self.outputs.len() - 1
    }

    pub fn add_buffer(&mut self, a: Signal) -> Signal {
        self.add_gate(Gate::buffer(a))
    }

    pub fn add_and(&mut self, a: Signal, b: Signal) -> Signal {
        self.add_gate(Gate::and(a, b))
    }

    pub fn add_or(&mut self, a: Signal, b: Signal) -> Signal {
        !self.add_gate(Gate::and(!a, !b))
    }

    pub fn add_xor(&mut self, a: Signal, b: Signal) -> Signal {
        self.add_gate(Gate::xor(a, b))
    }

    pub fn add_maj(&mut self, a: Signal, b: Signal, c: Signal) -> Signal {
        self.add_gate(Gate::maj(a, b, c))
    }

    pub fn add_xor3(&mut self, a: Signal, b: Signal, c: Signal) -> Signal {
        self.add_gate(Gate::xor3(a, b, c))
    }

    /// Evaluates all outputs for one input assignment.
    ///
    /// # Panics
    ///
    /// Panics if `inputs` does not provide exactly one value per primary input.
    pub fn simulate(&self, inputs: &[bool]) -> Vec<bool> {
        assert_eq!(inputs.len(), self.inputs.len(), "Expected one value per input");
        let mut values = vec![false; self.nodes.len()];
        for (&pi, &v) in self.inputs.iter().zip(inputs) {
            values[pi.index()] = v;
        }
        for &g in &self.gates {
            if let NodeKind::Gate(gate) = &self.nodes[g.index()] {
                let value = gate.eval(|n| values[n.index()]);
                values[g.index()] = value;
            }
        }
        self.outputs
            .iter()
            .map(|s| values[s.node().index()] ^ s.is_negated())
            .collect()
    }
}

impl LogicNetwork for Network {
    fn size(&self) -> usize {
        self.nodes.len()
    }

    fn is_pi(&self, node: Node) -> bool {
        matches!(self.nodes[node.index()], NodeKind::Input)
    }

    fn is_buffer(&self, node: Node) -> bool {
        matches!(&self.nodes[node.index()], NodeKind::Gate(g) if g.is_buffer())
    }

    fn pis(&self) -> &[Node] {
        &self.inputs
    }

    fn gates(&self) -> &[Node] {
        &self.gates
    }

    fn outputs(&self) -> &[Signal] {
        &self.outputs
    }

    fn fanins(&self, node: Node) -> &[Signal] {
        match &self.nodes[node.index()] {
            NodeKind::Gate(gate) => gate.inputs(),
            _ => &[],
        }
    }

    fn fanout_size(&self, node: Node) -> u32 {
        self.fanout[node.index()]
    }

    fn gate(&self, node: Node) -> Option<&Gate> {
        match &self.nodes[node.index()] {
            NodeKind::Gate(gate) => Some(gate),
            _ => None,
        }
    }
}

impl BufferedNetwork for Network {
    fn create_pi(&mut self) -> Signal {
        self.add_input()
    }

    fn create_po(&mut self, signal: Signal) -> usize {
        self.add_output(signal)
    }

    fn create_gate(&mut self, gate: Gate) -> Signal {
        self.add_gate(gate)
    }
}
