//! Level assignment of a network.
//!
//! Every node gets a level (clock stage); every primary output gets an output
//! level, which is the level of a virtual consumer reading the output. The
//! value must therefore be available at `output_level - 1`, called the
//! arrival of the output.

use crate::types::Node;

/// Growable per-node and per-output level maps, plus the network depth.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LevelStore {
    levels: Vec<u32>,
    output_levels: Vec<u32>,
    depth: u32,
}

impl LevelStore {
    pub fn new(num_nodes: usize, num_outputs: usize) -> Self {
        Self {
            levels: vec![0; num_nodes],
            output_levels: vec![0; num_outputs],
            depth: 0,
        }
    }

    /// Builds a store from node levels computed elsewhere.
    pub fn from_levels(levels: Vec<u32>, num_outputs: usize) -> Self {
        Self {
            levels,
            output_levels: vec![0; num_outputs],
            depth: 0,
        }
    }

    /// Grows the maps to cover the given network size. Existing levels are kept.
    pub fn resize(&mut self, num_nodes: usize, num_outputs: usize) {
        if self.levels.len() < num_nodes {
            self.levels.resize(num_nodes, 0);
        }
        if self.output_levels.len() < num_outputs {
            self.output_levels.resize(num_outputs, 0);
        }
    }

    /// Resets every level to 0.
    pub fn reset(&mut self) {
        self.levels.fill(0);
        self.output_levels.fill(0);
        self.depth = 0;
    }

    pub fn level(&self, node: Node) -> u32 {
        self.levels[node.index()]
    }

    pub fn set_level(&mut self, node: Node, level: u32) {
        self.levels[node.index()] = level;
    }

    pub fn output_level(&self, index: usize) -> u32 {
        self.output_levels[index]
    }

    pub fn set_output_level(&mut self, index: usize, level: u32) {
        self.output_levels[index] = level;
    }

    /// Sets every output level to `depth + 1`.
    pub fn balance_outputs(&mut self) {
        let level = self.depth + 1;
        self.output_levels.fill(level);
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn set_depth(&mut self, depth: u32) {
        self.depth = depth;
    }

    pub fn levels(&self) -> &[u32] {
        &self.levels
    }

    pub fn output_levels(&self) -> &[u32] {
        &self.output_levels
    }

    pub fn num_outputs(&self) -> usize {
        self.output_levels.len()
    }
}
