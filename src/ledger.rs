//! Fan-out trees of scheduled nodes.
//!
//! For every node that drives its consumers through splitters, the ledger keeps
//! the shape of the splitter tree as a list of entries sorted by *relative
//! depth* (consumer level minus node level). An entry records the consumers
//! sitting at that relative depth and `num_edges`, the number of wires that
//! arrive there: consumers plus splitters placed at that depth.
//!
//! # Building a tree
//!
//! Consumers are inserted with [`FanoutLedger::insert`], then
//! [`FanoutLedger::count_edges`] derives the splitters by sweeping from the
//! farthest entry towards the node. `e` wires at relative depth `r` need
//! `⌈e / S⌉` splitters at `r - 1`. A single splitter with nothing else at
//! `r - 1` is not given its own entry: it is folded into the previous entry as
//! the head of a buffer chain, and the chain length is implied by the gap
//! between the two entries.
//!
//! ```text
//! consumers at rd 2 and 5, S = 2:
//!
//!   rd 1: 1 edge        (splitter)
//!   rd 2: 2 edges       (consumer + chain head)
//!   rd 5: 1 edge        (consumer, chain buffers at rd 3 and 4)
//! ```
//!
//! The number of buffers of a tree is the number of non-consumer edges plus the
//! number of skipped relative depths.

use std::fmt;

use log::debug;

use crate::types::{Consumer, Node};
use crate::utils::ceil_div;

/// One relative depth of a fan-out tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanoutEntry {
    pub relative_depth: u32,
    /// Consumer nodes at this depth, one per fanin reference.
    pub fanouts: Vec<Node>,
    /// Primary output ports read at this depth.
    pub outputs: Vec<usize>,
    /// Wires arriving at this depth: consumers plus splitters.
    pub num_edges: u32,
}

impl FanoutEntry {
    fn internal(relative_depth: u32, num_edges: u32) -> Self {
        Self {
            relative_depth,
            fanouts: Vec::new(),
            outputs: Vec::new(),
            num_edges,
        }
    }

    pub fn num_consumers(&self) -> u32 {
        (self.fanouts.len() + self.outputs.len()) as u32
    }

    /// Splitters (or buffers) placed at this depth.
    pub fn num_splitters(&self) -> u32 {
        self.num_edges - self.num_consumers()
    }
}

impl fmt::Display for FanoutEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rd {}: {} edges [", self.relative_depth, self.num_edges)?;
        let consumers = self
            .fanouts
            .iter()
            .map(|&n| Consumer::Node(n))
            .chain(self.outputs.iter().map(|&i| Consumer::Output(i)));
        for (i, c) in consumers.enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", c)?;
        }
        write!(f, "]")
    }
}

/// Per-node fan-out trees.
#[derive(Debug, Clone, Default)]
pub struct FanoutLedger {
    trees: Vec<Vec<FanoutEntry>>,
}

impl FanoutLedger {
    pub fn new(num_nodes: usize) -> Self {
        Self {
            trees: vec![Vec::new(); num_nodes],
        }
    }

    pub fn resize(&mut self, num_nodes: usize) {
        if self.trees.len() < num_nodes {
            self.trees.resize_with(num_nodes, Vec::new);
        }
    }

    /// Empties every tree.
    pub fn clear(&mut self) {
        for tree in self.trees.iter_mut() {
            tree.clear();
        }
    }

    pub fn tree(&self, node: Node) -> &[FanoutEntry] {
        &self.trees[node.index()]
    }

    /// Removes and returns the tree of a node.
    pub fn take(&mut self, node: Node) -> Vec<FanoutEntry> {
        std::mem::take(&mut self.trees[node.index()])
    }

    /// Puts back a tree previously obtained with [`take`](Self::take).
    pub fn restore(&mut self, node: Node, tree: Vec<FanoutEntry>) {
        self.trees[node.index()] = tree;
    }

    /// Consumers of a node in tree order.
    pub fn consumers(&self, node: Node) -> Vec<Consumer> {
        let mut result = Vec::new();
        for entry in self.tree(node) {
            result.extend(entry.fanouts.iter().map(|&n| Consumer::Node(n)));
            result.extend(entry.outputs.iter().map(|&i| Consumer::Output(i)));
        }
        result
    }

    /// Records a consumer of `node` at the given relative depth.
    ///
    /// # Panics
    ///
    /// Panics if `relative_depth` is 0.
    pub fn insert(&mut self, node: Node, relative_depth: u32, consumer: Consumer) {
        assert!(relative_depth > 0, "Consumer {} of {} must sit at a later level", consumer, node);
        let tree = &mut self.trees[node.index()];
        let pos = tree.partition_point(|e| e.relative_depth < relative_depth);
        if pos == tree.len() || tree[pos].relative_depth != relative_depth {
            tree.insert(pos, FanoutEntry::internal(relative_depth, 0));
        }
        let entry = &mut tree[pos];
        match consumer {
            Consumer::Node(n) => entry.fanouts.push(n),
            Consumer::Output(i) => entry.outputs.push(i),
        }
        entry.num_edges += 1;
    }

    /// Derives the splitters of a freshly filled tree.
    ///
    /// `capacity` is the number of wires the node itself can drive (1 for a
    /// gate). Returns `false` if the tree cannot be realized, which happens
    /// when too many wires end up at relative depth 1.
    pub fn count_edges(&mut self, node: Node, capacity: u32, splitter_capacity: u32) -> bool {
        let tree = &mut self.trees[node.index()];
        if tree.is_empty() || (tree.len() == 1 && tree[0].num_edges == 1) {
            return true;
        }

        if tree[0].relative_depth > 1 {
            tree.insert(0, FanoutEntry::internal(1, 0));
        }

        let mut i = tree.len() - 1;
        while i > 0 {
            let rd = tree[i].relative_depth;
            let splitters = ceil_div(tree[i].num_edges, splitter_capacity);
            if tree[i - 1].relative_depth + 1 == rd || splitters == 1 {
                tree[i - 1].num_edges += splitters;
                i -= 1;
            } else {
                tree.insert(i, FanoutEntry::internal(rd - 1, splitters));
            }
        }

        let legal = tree[0].num_edges <= capacity;
        if !legal {
            debug!(
                "Fan-out tree of {} needs {} wires at relative depth 1, capacity is {}",
                node, tree[0].num_edges, capacity
            );
        }
        legal
    }

    /// Buffers (and splitters) in the tree of a node.
    pub fn num_buffers(&self, node: Node) -> u32 {
        let mut count = 0;
        let mut prev = 0;
        for entry in self.tree(node) {
            count += entry.num_splitters();
            count += entry.relative_depth - prev - 1;
            prev = entry.relative_depth;
        }
        count
    }

    /// Lowest relative depth at which one more consumer could attach to the
    /// existing tree without adding a buffer, if any.
    pub fn lowest_free_slot(&self, node: Node, capacity: u32, splitter_capacity: u32) -> Option<u32> {
        let tree = self.tree(node);
        match tree {
            [] => return Some(1),
            [only] if only.num_edges == 1 => return Some(1),
            _ => {}
        }
        if tree[0].relative_depth == 1 && tree[0].num_edges < capacity {
            return Some(1);
        }
        for (k, entry) in tree.iter().enumerate() {
            let splitters = entry.num_splitters();
            if splitters == 0 {
                continue;
            }
            let children = match tree.get(k + 1) {
                Some(next) if next.relative_depth == entry.relative_depth + 1 => next.num_edges,
                Some(_) => 1,
                None => 0,
            };
            if splitters * splitter_capacity > children {
                return Some(entry.relative_depth + 1);
            }
        }
        None
    }
}
