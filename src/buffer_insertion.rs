//! Buffer and splitter insertion engine.
//!
//! [`BufferInsertion`] borrows a network, assigns a level to every node
//! ([`schedule`](BufferInsertion::schedule)), optionally improves the
//! assignment ([`optimize`](BufferInsertion::optimize)), counts the buffers the
//! assignment requires ([`count_buffers`](BufferInsertion::count_buffers)) and
//! finally writes a network with explicit buffers
//! ([`dump_buffered_network`](BufferInsertion::dump_buffered_network)).
//! [`run`](BufferInsertion::run) does all of it.
//!
//! # Example
//!
//! ```
//! use aqfp_rs::assumptions::AqfpAssumptions;
//! use aqfp_rs::buffer_insertion::{BufferInsertion, BufferInsertionParams, Scheduling};
//! use aqfp_rs::network::{LogicNetwork, Network};
//!
//! let mut ntk = Network::new();
//! let a = ntk.add_input();
//! let b = ntk.add_input();
//! let f = ntk.add_and(a, b);
//! let g = ntk.add_and(f, b);
//! ntk.add_output(f);
//! ntk.add_output(g);
//!
//! let params = BufferInsertionParams {
//!     assume: AqfpAssumptions::default(),
//!     scheduling: Scheduling::Asap,
//!     ..Default::default()
//! };
//! let mut engine = BufferInsertion::new(&ntk, params);
//! let mut buffered = Network::new();
//! let count = engine.run(&mut buffered).unwrap();
//!
//! assert_eq!(count as usize, buffered.num_buffers());
//! ```

use std::path::PathBuf;

use log::{debug, info, warn};

use crate::assumptions::AqfpAssumptions;
use crate::ledger::{FanoutEntry, FanoutLedger};
use crate::levels::LevelStore;
use crate::network::{BufferedNetwork, LogicNetwork};
use crate::solver::{SolverError, Z3Process};
use crate::types::{Consumer, Node};
use crate::utils::ceil_log;

/// How the initial level assignment is computed.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum Scheduling {
    /// Levels are supplied by the caller.
    Provided,
    /// As soon as possible.
    #[default]
    Asap,
    /// As late as possible, within the ASAP depth.
    Alap,
    /// As soon as possible within the minimal depth.
    AsapDepth,
    /// As late as possible within the minimal depth.
    AlapDepth,
    /// The cheaper of ASAP and ALAP.
    Better,
    /// The cheaper of ASAP_depth and ALAP_depth.
    BetterDepth,
}

/// How hard [`BufferInsertion::optimize`] tries.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum OptimizationEffort {
    #[default]
    None,
    /// One pass of chunk movement.
    OnePass,
    /// Chunk movement until no move is accepted.
    UntilSat,
    /// Hand the problem to an external SMT solver.
    Optimal,
}

/// External solver settings for [`OptimizationEffort::Optimal`].
#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// Solver executable, looked up in `PATH` when relative.
    pub program: PathBuf,
    /// Extra command-line arguments placed before the model file.
    pub args: Vec<String>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("z3"),
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BufferInsertionParams {
    pub assume: AqfpAssumptions,
    pub scheduling: Scheduling,
    pub optimization_effort: OptimizationEffort,
    /// Upper bound on the number of nodes moved together.
    pub max_chunk_size: usize,
    pub solver: SolverConfig,
}

impl Default for BufferInsertionParams {
    fn default() -> Self {
        Self {
            assume: AqfpAssumptions::default(),
            scheduling: Scheduling::Asap,
            optimization_effort: OptimizationEffort::None,
            max_chunk_size: 100,
            solver: SolverConfig::default(),
        }
    }
}

/// Statistics collected while inserting buffers.
#[derive(Debug, Clone, Default)]
pub struct BufferInsertionStats {
    /// Buffers required by the initial schedule.
    pub scheduled_buffers: u32,
    /// Buffers after optimization.
    pub optimized_buffers: u32,
    /// Chunk movement passes.
    pub passes: usize,
    /// Chunks formed.
    pub chunks: usize,
    /// Accepted downward moves.
    pub moves_down: usize,
    /// Accepted upward moves.
    pub moves_up: usize,
    /// Tentative moves that were rolled back.
    pub rejected_moves: usize,
    /// Gates without any consumer.
    pub dangling_nodes: usize,
    /// Buffers created by the last materialization.
    pub materialized_buffers: Option<u32>,
    /// Whether the last materialization disagreed with the predicted count.
    pub count_mismatch: bool,
}

/// Schedules a network for AQFP and computes the buffers it needs.
pub struct BufferInsertion<'a, N: LogicNetwork> {
    pub(crate) ntk: &'a N,
    pub(crate) params: BufferInsertionParams,
    pub(crate) levels: LevelStore,
    pub(crate) ledger: FanoutLedger,
    pub(crate) buffers: Vec<u32>,
    pub(crate) outdated: bool,
    /// Chunk membership marks, compared against `generation`.
    pub(crate) marks: Vec<u32>,
    pub(crate) generation: u32,
    pub(crate) stats: BufferInsertionStats,
}

impl<'a, N: LogicNetwork> BufferInsertion<'a, N> {
    /// Creates an engine that computes its own schedule.
    ///
    /// # Panics
    ///
    /// Panics if the assumptions are inconsistent, if `params.scheduling` is
    /// [`Scheduling::Provided`], or if the network already contains buffers.
    pub fn new(ntk: &'a N, params: BufferInsertionParams) -> Self {
        assert_ne!(
            params.scheduling,
            Scheduling::Provided,
            "Provided scheduling requires levels, use `with_levels`"
        );
        Self::create(ntk, params, LevelStore::new(ntk.size(), ntk.num_pos()))
    }

    /// Creates an engine over a caller-supplied level assignment.
    ///
    /// The levels must be legal: every gate sits above its non-constant fanins,
    /// and every fan-out tree fits between a node and its consumers.
    ///
    /// # Panics
    ///
    /// Panics if `params.scheduling` is not [`Scheduling::Provided`] or if
    /// `levels` does not cover every node.
    pub fn with_levels(ntk: &'a N, levels: Vec<u32>, params: BufferInsertionParams) -> Self {
        assert_eq!(
            params.scheduling,
            Scheduling::Provided,
            "Levels are only taken with provided scheduling"
        );
        assert_eq!(levels.len(), ntk.size(), "Expected one level per node");
        Self::create(ntk, params, LevelStore::from_levels(levels, ntk.num_pos()))
    }

    fn create(ntk: &'a N, params: BufferInsertionParams, levels: LevelStore) -> Self {
        params.assume.validate();
        assert_eq!(ntk.num_buffers(), 0, "Network is already buffered");
        let size = ntk.size();
        Self {
            ntk,
            params,
            levels,
            ledger: FanoutLedger::new(size),
            buffers: vec![0; size],
            outdated: true,
            marks: vec![0; size],
            generation: 0,
            stats: BufferInsertionStats::default(),
        }
    }

    /// Grows every per-node map to the current network size.
    pub(crate) fn ensure_size(&mut self) {
        let size = self.ntk.size();
        self.levels.resize(size, self.ntk.num_pos());
        self.ledger.resize(size);
        if self.buffers.len() < size {
            self.buffers.resize(size, 0);
            self.marks.resize(size, 0);
        }
    }
}

// Getters
impl<N: LogicNetwork> BufferInsertion<'_, N> {
    pub fn network(&self) -> &N {
        self.ntk
    }

    pub fn params(&self) -> &BufferInsertionParams {
        &self.params
    }

    pub fn assumptions(&self) -> &AqfpAssumptions {
        &self.params.assume
    }

    pub fn stats(&self) -> &BufferInsertionStats {
        &self.stats
    }

    pub fn level(&self, node: Node) -> u32 {
        self.levels.level(node)
    }

    pub fn output_level(&self, index: usize) -> u32 {
        self.levels.output_level(index)
    }

    pub fn depth(&self) -> u32 {
        self.levels.depth()
    }

    pub fn levels(&self) -> &LevelStore {
        &self.levels
    }

    /// Levels of the primary inputs, in input order.
    pub fn pi_levels(&self) -> Vec<u32> {
        self.ntk.pis().iter().map(|&pi| self.levels.level(pi)).collect()
    }

    /// Fan-out tree of a node as of the last buffer count.
    pub fn fanout_tree(&self, node: Node) -> &[FanoutEntry] {
        self.ledger.tree(node)
    }

    /// Total number of buffers and splitters.
    ///
    /// # Panics
    ///
    /// Panics if levels changed since the last [`count_buffers`](Self::count_buffers).
    pub fn num_buffers(&self) -> u32 {
        assert!(!self.outdated, "Buffer counts are outdated, call `count_buffers` first");
        self.buffers.iter().sum()
    }

    /// Buffers and splitters in the fan-out tree of one node.
    pub fn num_buffers_of(&self, node: Node) -> u32 {
        assert!(!self.outdated, "Buffer counts are outdated, call `count_buffers` first");
        self.buffers[node.index()]
    }
}

// Node classification
impl<N: LogicNetwork> BufferInsertion<'_, N> {
    /// Whether a node drives its consumers through a splitter tree.
    pub(crate) fn has_tree(&self, node: Node) -> bool {
        has_tree(self.ntk, &self.params.assume, node)
    }

    pub(crate) fn capacity(&self, node: Node) -> u32 {
        self.params.assume.own_capacity(self.ntk.is_pi(node))
    }

    /// Levels of splitters a balanced tree needs between a node and its consumers.
    pub fn num_splitter_levels(&self, node: Node) -> u32 {
        if !self.has_tree(node) {
            return 0;
        }
        let fanout = self.ntk.fanout_size(node);
        if fanout <= self.capacity(node) {
            0
        } else {
            ceil_log(fanout, self.params.assume.splitter_capacity)
        }
    }

    pub(crate) fn target_level(&self, consumer: Consumer) -> u32 {
        match consumer {
            Consumer::Node(n) => self.levels.level(n),
            Consumer::Output(i) => self.levels.output_level(i),
        }
    }
}

pub(crate) fn has_tree<N: LogicNetwork>(ntk: &N, assume: &AqfpAssumptions, node: Node) -> bool {
    if ntk.is_constant(node) {
        false
    } else if ntk.is_pi(node) {
        assume.branch_pis
    } else {
        true
    }
}

/// Fills `ledger` from scratch for the given levels. Returns `false` if some
/// consumer does not sit above its producer or some tree cannot be realized.
pub(crate) fn fill_ledger<N: LogicNetwork>(
    ntk: &N,
    assume: &AqfpAssumptions,
    levels: &LevelStore,
    ledger: &mut FanoutLedger,
) -> bool {
    ledger.clear();
    let mut legal = true;
    let gate_edges = ntk.gates().iter().flat_map(|&g| {
        ntk.fanins(g)
            .iter()
            .map(move |fi| (fi.node(), levels.level(g), Consumer::Node(g)))
    });
    let output_edges = ntk
        .outputs()
        .iter()
        .enumerate()
        .map(|(i, po)| (po.node(), levels.output_level(i), Consumer::Output(i)));
    for (producer, level, consumer) in gate_edges.chain(output_edges) {
        if !has_tree(ntk, assume, producer) {
            continue;
        }
        match level.checked_sub(levels.level(producer)) {
            Some(rd) if rd > 0 => ledger.insert(producer, rd, consumer),
            _ => {
                debug!("{} at level {} does not sit above {}", consumer, level, producer);
                legal = false;
            }
        }
    }

    let s = assume.splitter_capacity;
    for &pi in ntk.pis() {
        if assume.branch_pis {
            legal &= ledger.count_edges(pi, assume.ci_capacity, s);
        }
    }
    for &g in ntk.gates() {
        legal &= ledger.count_edges(g, 1, s);
    }
    legal
}

// Buffer counting
impl<N: LogicNetwork> BufferInsertion<'_, N> {
    /// Rebuilds every fan-out tree from the current levels.
    ///
    /// # Panics
    ///
    /// Panics if the level assignment is not legal.
    pub fn update_fanout_info(&mut self) {
        self.ensure_size();
        let legal = fill_ledger(self.ntk, &self.params.assume, &self.levels, &mut self.ledger);
        assert!(legal, "Level assignment is not legal");
        self.outdated = false;
    }

    /// Rebuilds the fan-out tree of a single node from its current consumers.
    pub(crate) fn rebuild_tree(&mut self, node: Node) -> bool {
        let consumers = self.ledger.consumers(node);
        self.ledger.take(node);
        let level = self.levels.level(node);
        for c in consumers {
            match self.target_level(c).checked_sub(level) {
                Some(rd) if rd > 0 => self.ledger.insert(node, rd, c),
                _ => return false,
            }
        }
        let capacity = self.capacity(node);
        self.ledger
            .count_edges(node, capacity, self.params.assume.splitter_capacity)
    }

    /// Recomputes the buffer count of every node, rebuilding the fan-out trees
    /// first if levels changed.
    pub fn count_buffers(&mut self) {
        let rebuilt = self.outdated;
        if self.outdated {
            self.update_fanout_info();
        }

        let ntk = self.ntk;
        self.buffers.fill(0);
        let mut dangling = 0;
        for &n in ntk.pis().iter().chain(ntk.gates()) {
            if !self.has_tree(n) {
                continue;
            }
            if ntk.fanout_size(n) == 0 && !ntk.is_pi(n) {
                dangling += 1;
                if rebuilt {
                    warn!("Gate {} has no consumers", n);
                }
                continue;
            }
            self.buffers[n.index()] = self.ledger.num_buffers(n);
        }
        self.stats.dangling_nodes = dangling;
    }

    /// Checks the level assignment against the assumptions without touching
    /// the fan-out trees.
    pub fn check_levels(&self) -> bool {
        let ntk = self.ntk;
        let assume = &self.params.assume;
        for &g in ntk.gates() {
            for fi in ntk.fanins(g) {
                if !ntk.is_constant(fi.node()) && self.level(g) <= self.level(fi.node()) {
                    debug!("{} at level {} does not sit above fanin {}", g, self.level(g), fi);
                    return false;
                }
            }
        }
        for &pi in ntk.pis() {
            if assume.branch_pis && !assume.is_admissible_pi_level(self.level(pi)) {
                debug!("Input {} sits at inadmissible level {}", pi, self.level(pi));
                return false;
            }
        }
        let mut max_output = None;
        for (i, po) in ntk.outputs().iter().enumerate() {
            let out = self.output_level(i);
            max_output = max_output.max(Some(out));
            if ntk.is_constant(po.node()) {
                continue;
            }
            if out <= self.level(po.node()) || !assume.is_aligned_arrival(out - 1) {
                debug!("Output {} has inadmissible level {}", i, out);
                return false;
            }
            if assume.balance_pos && out != self.depth() + 1 {
                debug!("Output {} is not balanced", i);
                return false;
            }
        }
        if max_output.is_some_and(|m| m != self.depth() + 1) {
            return false;
        }
        let mut scratch = FanoutLedger::new(ntk.size());
        fill_ledger(ntk, assume, &self.levels, &mut scratch)
    }
}

// Top-level flow
impl<N: LogicNetwork> BufferInsertion<'_, N> {
    /// Improves the schedule according to the configured effort.
    ///
    /// Returns whether the buffer count went down. Only the external solver
    /// can fail.
    pub fn optimize(&mut self) -> Result<bool, SolverError> {
        if self.outdated {
            self.count_buffers();
        }
        let before = self.num_buffers();
        let improved = match self.params.optimization_effort {
            OptimizationEffort::None => false,
            OptimizationEffort::OnePass => self.find_and_move_chunks(),
            OptimizationEffort::UntilSat => {
                let mut improved = false;
                while self.find_and_move_chunks() {
                    improved = true;
                }
                improved
            }
            OptimizationEffort::Optimal => {
                let backend = Z3Process::new(&self.params.solver);
                self.optimize_with_solver(&backend)?
            }
        };
        if self.outdated {
            self.count_buffers();
        }
        self.stats.optimized_buffers = self.num_buffers();
        info!(
            "Optimization ({:?}): {} -> {} buffers",
            self.params.optimization_effort, before, self.stats.optimized_buffers
        );
        Ok(improved)
    }

    /// Schedules, optimizes and counts, without building a network.
    pub fn dry_run(&mut self) -> Result<u32, SolverError> {
        self.schedule();
        self.count_buffers();
        self.stats.scheduled_buffers = self.num_buffers();
        self.optimize()?;
        Ok(self.num_buffers())
    }

    /// Schedules, optimizes, and writes the buffered network into `out`.
    ///
    /// Returns the number of buffers and splitters.
    pub fn run<B: BufferedNetwork>(&mut self, out: &mut B) -> Result<u32, SolverError> {
        let count = self.dry_run()?;
        self.dump_buffered_network(out);
        Ok(count)
    }
}
