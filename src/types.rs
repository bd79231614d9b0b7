//! Type-safe wrappers for network nodes and output ports.
//!
//! Levels are plain `u32` values throughout the crate; nodes and output ports
//! get newtypes so that the many index maps in the engine cannot be mixed up.
use std::fmt;

/// A node identifier in a logic network.
///
/// Nodes are numbered in creation order, which is also a topological order.
///
/// # Invariants
///
/// - Node 0 is the constant-false node
/// - A gate's fanins always have smaller identifiers than the gate itself
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Node(u32);

impl Node {
    /// The constant node.
    pub const CONSTANT: Node = Node(0);

    /// Creates a node from its raw identifier.
    pub const fn new(id: u32) -> Self {
        Node(id)
    }

    /// Returns the raw identifier.
    pub const fn id(self) -> u32 {
        self.0
    }

    /// Returns the identifier as an index into per-node maps.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl From<Node> for u32 {
    fn from(node: Node) -> Self {
        node.0
    }
}

/// A consumer of a node's value: another node, or a primary output port.
///
/// Output ports are identified by their position in the network's output list.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Consumer {
    Node(Node),
    Output(usize),
}

impl fmt::Display for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Consumer::Node(node) => write!(f, "{}", node),
            Consumer::Output(index) => write!(f, "po{}", index),
        }
    }
}
