//! Level assignment policies.
//!
//! # ASAP and ALAP
//!
//! A node with fan-out `f > 1` needs a splitter tree of `⌈log_S f⌉` levels
//! before its consumers. ASAP places every gate right above its latest fanin
//! plus that fanin's splitter levels; ALAP does the same in reverse from the
//! outputs, keeping the ASAP depth.
//!
//! # Depth-optimal variants
//!
//! Assuming a full balanced tree for every node is pessimistic: if the
//! consumers of a node sit at different levels, the tree can branch early for
//! the near consumers and late for the far ones. [`latest_feasible_level`]
//! computes the latest level from which a tree can still reach a given
//! multiset of consumer levels, by rebuilding the tree bottom-up: wires at the
//! highest level are merged in groups of `S` one level down, joined by the
//! consumers found there, until what is left fits the node itself.
//!
//! ALAP_depth uses that bound in the reverse pass and lowers the depth phase
//! by phase while the result stays feasible. ASAP_depth then pulls every node
//! as early as the trees of its fanins allow.

use log::{debug, info};

use crate::buffer_insertion::{BufferInsertion, Scheduling};
use crate::levels::LevelStore;
use crate::network::{consumer_lists, LogicNetwork};
use crate::types::{Consumer, Node};

/// Latest level of a producer whose splitter tree reaches consumers at the
/// given levels. `capacity` is the number of wires the producer drives itself.
///
/// # Panics
///
/// Panics if `levels` is empty.
pub fn latest_feasible_level(levels: &[i64], capacity: u32, splitter_capacity: u32) -> i64 {
    assert!(!levels.is_empty(), "A producer without consumers has no latest level");
    let mut sorted = levels.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));

    let s = splitter_capacity as i64;
    let mut level = sorted[0];
    let mut wires: i64 = 0;
    let mut idx = 0;
    loop {
        while idx < sorted.len() && sorted[idx] == level {
            wires += 1;
            idx += 1;
        }
        if idx == sorted.len() && wires <= capacity as i64 {
            return level - 1;
        }
        wires = (wires + s - 1) / s;
        level -= 1;
    }
}

impl<N: LogicNetwork> BufferInsertion<'_, N> {
    /// Computes the level assignment with the configured policy.
    pub fn schedule(&mut self) {
        self.ensure_size();
        match self.params.scheduling {
            Scheduling::Provided => self.compute_output_levels(),
            Scheduling::Asap => self.asap(),
            Scheduling::Alap => {
                self.asap();
                self.alap();
            }
            Scheduling::AsapDepth => {
                self.alap_depth();
                self.compact_asap();
            }
            Scheduling::AlapDepth => self.alap_depth(),
            Scheduling::Better => {
                self.asap();
                self.keep_cheaper(|this| this.alap());
            }
            Scheduling::BetterDepth => {
                self.alap_depth();
                self.keep_cheaper(|this| this.compact_asap());
            }
        }
        self.outdated = true;
        info!(
            "Scheduled {} gates ({:?}): depth {}",
            self.ntk.num_gates(),
            self.params.scheduling,
            self.levels.depth()
        );
    }

    /// Applies `step` to the current schedule and reverts it if it needs more buffers.
    fn keep_cheaper(&mut self, step: impl FnOnce(&mut Self)) {
        self.outdated = true;
        self.count_buffers();
        let before = self.num_buffers();
        let saved = self.levels.clone();

        step(self);
        self.outdated = true;
        self.count_buffers();
        let after = self.num_buffers();
        debug!("Schedule candidates: {} vs {} buffers", before, after);
        if after > before {
            self.levels = saved;
            self.outdated = true;
        }
    }

    /// ASAP schedule.
    pub(crate) fn asap(&mut self) {
        let ntk = self.ntk;
        self.levels.reset();
        let pi_level = self.params.assume.earliest_pi_level();
        for &pi in ntk.pis() {
            self.levels.set_level(pi, pi_level);
        }
        for &g in ntk.gates() {
            let mut level = 0;
            for fi in ntk.fanins(g) {
                let n = fi.node();
                if ntk.is_constant(n) {
                    continue;
                }
                level = level.max(self.levels.level(n) + self.num_splitter_levels(n));
            }
            self.levels.set_level(g, level + 1);
        }
        self.compute_output_levels();
    }

    /// Places every output right after its driver's splitter tree and derives the depth.
    pub(crate) fn compute_output_levels(&mut self) {
        let ntk = self.ntk;
        let mut depth = 0;
        for (i, po) in ntk.outputs().iter().enumerate() {
            let n = po.node();
            if ntk.is_constant(n) {
                continue;
            }
            let arrival = self.levels.level(n) + self.num_splitter_levels(n);
            let level = self.params.assume.output_level_at_least(arrival);
            self.levels.set_output_level(i, level);
            depth = depth.max(level - 1);
        }
        assert_eq!(depth % self.params.assume.num_phases, 0, "Depth is not phase-aligned");
        self.levels.set_depth(depth);
        self.finish_output_levels();
    }

    /// Balances outputs if required; constant outputs always go to `depth + 1`.
    fn finish_output_levels(&mut self) {
        let ntk = self.ntk;
        if self.params.assume.balance_pos {
            self.levels.balance_outputs();
        } else {
            let level = self.levels.depth() + 1;
            for (i, po) in ntk.outputs().iter().enumerate() {
                if ntk.is_constant(po.node()) {
                    self.levels.set_output_level(i, level);
                }
            }
        }
    }

    /// ALAP schedule within the current depth. Must run after [`asap`](Self::asap).
    pub(crate) fn alap(&mut self) {
        let ntk = self.ntk;
        self.levels.balance_outputs();
        let asap = self.levels.levels().to_vec();
        let mut bound: Vec<Option<u32>> = vec![None; ntk.size()];

        let tighten = |bound: &mut [Option<u32>], n: Node, consumer_level: u32, splitters: u32| {
            let b = consumer_level - splitters - 1;
            let slot = &mut bound[n.index()];
            *slot = Some(slot.map_or(b, |old| old.min(b)));
        };

        for (i, po) in ntk.outputs().iter().enumerate() {
            let n = po.node();
            if self.has_tree(n) {
                let sl = self.num_splitter_levels(n);
                tighten(&mut bound, n, self.levels.output_level(i), sl);
            }
        }
        for &g in ntk.gates().iter().rev() {
            let level = bound[g.index()].unwrap_or(asap[g.index()]);
            self.levels.set_level(g, level);
            for fi in ntk.fanins(g) {
                let n = fi.node();
                if self.has_tree(n) {
                    let sl = self.num_splitter_levels(n);
                    tighten(&mut bound, n, level, sl);
                }
            }
        }
        for &pi in ntk.pis() {
            if !self.has_tree(pi) {
                continue;
            }
            if let Some(b) = bound[pi.index()] {
                let level = match self.params.assume.latest_pi_level(b) {
                    Some(level) => level,
                    None => panic!("No admissible phase for input {} at or below level {}", pi, b),
                };
                self.levels.set_level(pi, level);
            }
        }
    }

    /// Latest level of `node` given the (tentative) levels of its consumers.
    fn latest_level(&self, node: Node, consumers: &[Consumer], levels: &[i64], outputs: &LevelStore) -> Option<i64> {
        if consumers.is_empty() {
            return None;
        }
        let targets: Vec<i64> = consumers
            .iter()
            .map(|&c| match c {
                Consumer::Node(m) => levels[m.index()],
                Consumer::Output(i) => outputs.output_level(i) as i64,
            })
            .collect();
        Some(latest_feasible_level(
            &targets,
            self.capacity(node),
            self.params.assume.splitter_capacity,
        ))
    }

    /// Depth-optimal latest schedule for a given depth, or `None` if the depth
    /// is too small.
    fn latest_schedule(&self, consumers: &[Vec<Consumer>], depth: u32, fallback: &LevelStore) -> Option<LevelStore> {
        let ntk = self.ntk;
        let assume = &self.params.assume;
        let mut store = fallback.clone();
        store.set_depth(depth);
        store.balance_outputs();
        let mut levels: Vec<i64> = fallback.levels().iter().map(|&l| l as i64).collect();

        for &g in ntk.gates().iter().rev() {
            if let Some(l) = self.latest_level(g, &consumers[g.index()], &levels, &store) {
                levels[g.index()] = l;
            }
        }
        for &pi in ntk.pis() {
            if !self.has_tree(pi) {
                continue;
            }
            if let Some(l) = self.latest_level(pi, &consumers[pi.index()], &levels, &store) {
                let l = u32::try_from(l).ok()?;
                levels[pi.index()] = assume.latest_pi_level(l)? as i64;
            }
        }

        for &g in ntk.gates() {
            let level = levels[g.index()];
            if level < 1 {
                return None;
            }
            for fi in ntk.fanins(g) {
                if !ntk.is_constant(fi.node()) && levels[fi.node().index()] >= level {
                    return None;
                }
            }
        }
        for (i, &l) in levels.iter().enumerate() {
            store.set_level(Node::new(i as u32), u32::try_from(l).ok()?);
        }
        Some(store)
    }

    /// ALAP schedule at the minimal depth reachable by depth-optimal trees.
    pub(crate) fn alap_depth(&mut self) {
        self.asap();
        let consumers = consumer_lists(self.ntk);
        let asap = self.levels.clone();
        let step = self.params.assume.num_phases;

        let mut depth = asap.depth();
        let Some(mut best) = self.latest_schedule(&consumers, depth, &asap) else {
            // Cannot happen for a legal ASAP schedule; keep the plain ALAP one.
            self.alap();
            return;
        };
        while depth >= step {
            match self.latest_schedule(&consumers, depth - step, &asap) {
                Some(schedule) => {
                    best = schedule;
                    depth -= step;
                }
                None => break,
            }
        }
        debug!("Depth-optimal depth {} (ASAP depth {})", depth, asap.depth());
        self.levels = best;
    }

    /// Moves every node as early as the trees of its fanins allow, keeping the
    /// current depth. Expects a feasible schedule.
    pub(crate) fn compact_asap(&mut self) {
        let ntk = self.ntk;
        let assume = &self.params.assume;
        let consumers = consumer_lists(ntk);
        let mut levels: Vec<i64> = self.levels.levels().iter().map(|&l| l as i64).collect();
        let mut store = self.levels.clone();

        let earliest = assume.earliest_pi_level() as i64;
        for &pi in ntk.pis() {
            if self.has_tree(pi) {
                levels[pi.index()] = earliest;
            }
        }

        let fits = |this: &Self, levels: &[i64], store: &LevelStore, n: Node| -> bool {
            if !this.has_tree(n) {
                return true;
            }
            match this.latest_level(n, &consumers[n.index()], levels, store) {
                Some(latest) => latest >= levels[n.index()],
                None => true,
            }
        };

        for &g in ntk.gates() {
            let current = levels[g.index()];
            let lowest = ntk
                .fanins(g)
                .iter()
                .filter(|fi| !ntk.is_constant(fi.node()))
                .map(|fi| levels[fi.node().index()] + 1)
                .max()
                .unwrap_or(1)
                .max(1);
            for candidate in lowest..current {
                levels[g.index()] = candidate;
                if ntk.fanins(g).iter().all(|fi| fits(self, &levels, &store, fi.node())) {
                    break;
                }
                levels[g.index()] = current;
            }
        }

        if !assume.balance_pos {
            for (i, po) in ntk.outputs().iter().enumerate() {
                let n = po.node();
                if ntk.is_constant(n) {
                    continue;
                }
                let current = store.output_level(i);
                let mut candidate = assume.output_level_at_least(levels[n.index()] as u32);
                while candidate < current {
                    store.set_output_level(i, candidate);
                    if fits(self, &levels, &store, n) {
                        break;
                    }
                    store.set_output_level(i, current);
                    candidate += assume.num_phases;
                }
            }
            let depth = ntk
                .outputs()
                .iter()
                .enumerate()
                .filter(|(_, po)| !ntk.is_constant(po.node()))
                .map(|(i, _)| store.output_level(i) - 1)
                .max()
                .unwrap_or(0);
            store.set_depth(depth);
        }

        for (i, &l) in levels.iter().enumerate() {
            store.set_level(Node::new(i as u32), l as u32);
        }
        self.levels = store;
        self.finish_output_levels();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assumptions::AqfpAssumptions;
    use crate::buffer_insertion::BufferInsertionParams;
    use crate::network::Network;
    use crate::signal::Signal;
    use test_log::test;

    #[test]
    fn test_latest_feasible_level() {
        assert_eq!(latest_feasible_level(&[7], 1, 2), 6);
        assert_eq!(latest_feasible_level(&[7, 7], 1, 2), 5);
        assert_eq!(latest_feasible_level(&[7, 7, 7], 1, 2), 4);
        assert_eq!(latest_feasible_level(&[7, 7, 7], 1, 3), 5);
        // One near consumer forces an early branch.
        assert_eq!(latest_feasible_level(&[10, 7], 1, 2), 5);
        assert_eq!(latest_feasible_level(&[5, 4, 3], 1, 2), 1);
        // Inputs with capacity 2 drive two consumers directly.
        assert_eq!(latest_feasible_level(&[4, 4], 2, 2), 3);
        assert_eq!(latest_feasible_level(&[4, 4, 4], 2, 2), 2);
    }

    /// Inputs a to e; f1 = c & d, f2 = c | d, f3 = d & e, f4 = f2 & f3.
    /// Outputs: 0, a, b, b, b, f1, f3, f4.
    fn reference_network() -> (Network, [Signal; 4]) {
        let mut ntk = Network::new();
        let a = ntk.add_input();
        let b = ntk.add_input();
        let c = ntk.add_input();
        let d = ntk.add_input();
        let e = ntk.add_input();
        let f1 = ntk.add_and(c, d);
        let f2 = ntk.add_or(c, d);
        let f3 = ntk.add_and(d, e);
        let f4 = ntk.add_and(f2, f3);
        ntk.add_output(ntk.get_constant(false));
        ntk.add_output(a);
        ntk.add_output(b);
        ntk.add_output(b);
        ntk.add_output(b);
        ntk.add_output(f1);
        ntk.add_output(f3);
        ntk.add_output(f4);
        (ntk, [f1, f2, f3, f4])
    }

    fn unbalanced_io() -> AqfpAssumptions {
        AqfpAssumptions {
            branch_pis: true,
            balance_pis: false,
            balance_pos: false,
            splitter_capacity: 2,
            ci_capacity: 1,
            ci_phases: vec![0],
            num_phases: 1,
        }
    }

    fn engine(ntk: &Network, scheduling: Scheduling) -> BufferInsertion<'_, Network> {
        BufferInsertion::new(
            ntk,
            BufferInsertionParams {
                assume: unbalanced_io(),
                scheduling,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_asap_levels() {
        let (ntk, [f1, f2, f3, f4]) = reference_network();
        let mut engine = engine(&ntk, Scheduling::Asap);
        engine.schedule();
        assert_eq!(engine.level(f1.node()), 3);
        assert_eq!(engine.level(f2.node()), 3);
        assert_eq!(engine.level(f3.node()), 3);
        assert_eq!(engine.level(f4.node()), 5);
        assert_eq!(engine.depth(), 5);
        assert!(engine.check_levels());
    }

    #[test]
    fn test_alap_levels() {
        let (ntk, [f1, _, f3, f4]) = reference_network();
        let mut engine = engine(&ntk, Scheduling::Alap);
        engine.schedule();
        assert_eq!(engine.depth(), 5);
        assert_eq!(engine.level(f4.node()), 5);
        assert_eq!(engine.level(f1.node()), 5);
        assert_eq!(engine.level(f3.node()), 3);
        for i in 0..ntk.num_pos() {
            assert_eq!(engine.output_level(i), 6);
        }
        assert!(engine.check_levels());
    }

    #[test]
    fn test_depth_optimal_schedules() {
        let (ntk, [_, _, f3, f4]) = reference_network();
        for scheduling in [Scheduling::AlapDepth, Scheduling::AsapDepth, Scheduling::BetterDepth] {
            let mut engine = engine(&ntk, scheduling);
            engine.schedule();
            assert_eq!(engine.depth(), 4, "{:?}", scheduling);
            assert!(engine.check_levels(), "{:?}", scheduling);
            assert!(engine.level(f4.node()) > engine.level(f3.node()));
        }
    }

    #[test]
    fn test_alap_depth_levels() {
        let (ntk, [f1, f2, f3, f4]) = reference_network();
        let mut engine = engine(&ntk, Scheduling::AlapDepth);
        engine.schedule();
        assert_eq!(engine.level(f4.node()), 4);
        assert_eq!(engine.level(f3.node()), 2);
        assert_eq!(engine.level(f2.node()), 3);
        assert_eq!(engine.level(f1.node()), 4);
        assert_eq!(engine.pi_levels(), vec![4, 2, 1, 0, 1]);
    }

    #[test]
    fn test_better_is_not_worse() {
        let (ntk, _) = reference_network();
        let mut costs = Vec::new();
        for scheduling in [Scheduling::Asap, Scheduling::Alap, Scheduling::Better] {
            let mut engine = engine(&ntk, scheduling);
            engine.schedule();
            engine.count_buffers();
            costs.push(engine.num_buffers());
        }
        assert_eq!(costs[2], costs[0].min(costs[1]));
    }

    #[test]
    fn test_phase_aligned_outputs() {
        let (ntk, _) = reference_network();
        let assume = AqfpAssumptions {
            num_phases: 4,
            ..unbalanced_io()
        };
        for scheduling in [Scheduling::Asap, Scheduling::Alap, Scheduling::AlapDepth, Scheduling::AsapDepth] {
            let mut engine = BufferInsertion::new(
                &ntk,
                BufferInsertionParams {
                    assume: assume.clone(),
                    scheduling,
                    ..Default::default()
                },
            );
            engine.schedule();
            assert_eq!(engine.depth() % 4, 0, "{:?}", scheduling);
            for i in 0..ntk.num_pos() {
                assert_eq!((engine.output_level(i) - 1) % 4, 0, "{:?}", scheduling);
            }
            for l in engine.pi_levels() {
                assert_eq!(l % 4, 0, "{:?}", scheduling);
            }
            assert!(engine.check_levels(), "{:?}", scheduling);
        }
    }

    #[test]
    fn test_balanced_inputs_keep_phase() {
        let (ntk, _) = reference_network();
        let assume = AqfpAssumptions {
            balance_pis: true,
            ..unbalanced_io()
        };
        let mut engine = BufferInsertion::new(
            &ntk,
            BufferInsertionParams {
                assume,
                scheduling: Scheduling::Alap,
                ..Default::default()
            },
        );
        engine.schedule();
        assert!(engine.pi_levels().iter().all(|&l| l == 0));
        assert!(engine.check_levels());
    }
}
