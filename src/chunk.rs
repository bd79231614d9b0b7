//! Chunk movement.
//!
//! A chunk is a connected group of nodes that sit right next to each other:
//! every member is a direct consumer (relative depth 1) or a first-branch
//! consumer (relative depth 2) of another member. Shifting the whole chunk by
//! a few levels keeps its internal wires unchanged and only changes the wires
//! crossing its boundary, the *interfaces*. A shift is kept only if the
//! buffer count of all affected fan-out trees strictly decreases.

use std::collections::BTreeSet;

use log::{debug, trace};

use crate::buffer_insertion::BufferInsertion;
use crate::ledger::FanoutEntry;
use crate::network::LogicNetwork;
use crate::types::{Consumer, Node};

#[derive(Debug)]
pub(crate) struct Chunk {
    id: u32,
    members: Vec<Node>,
    /// Incoming wires as `(member, producer)`.
    input_interfaces: Vec<(Node, Node)>,
    /// Outgoing wires as `(member, consumer)`.
    output_interfaces: Vec<(Node, Consumer)>,
}

impl Chunk {
    fn new(id: u32) -> Self {
        Self {
            id,
            members: Vec::new(),
            input_interfaces: Vec::new(),
            output_interfaces: Vec::new(),
        }
    }
}

/// State captured before a tentative shift.
struct Snapshot {
    levels: Vec<(Node, u32)>,
    trees: Vec<(Node, Vec<FanoutEntry>)>,
}

impl<N: LogicNetwork> BufferInsertion<'_, N> {
    /// Runs one pass of chunk movement over all nodes.
    ///
    /// Returns whether any move was accepted.
    pub(crate) fn find_and_move_chunks(&mut self) -> bool {
        if self.outdated {
            self.count_buffers();
        }
        self.ensure_size();
        self.stats.passes += 1;

        let ntk = self.ntk;
        let pass_start = self.generation;
        let mut moved = false;
        for &n in ntk.pis().iter().chain(ntk.gates()) {
            if self.marks[n.index()] > pass_start || ntk.fanout_size(n) == 0 || !self.is_recruitable(n) {
                continue;
            }
            self.generation += 1;
            let chunk = self.recruit(n, pass_start);
            self.stats.chunks += 1;
            trace!(
                "Chunk {} from {}: {} members, {} inputs, {} outputs",
                chunk.id,
                n,
                chunk.members.len(),
                chunk.input_interfaces.len(),
                chunk.output_interfaces.len()
            );
            if self.try_move_down(&chunk) || self.try_move_up(&chunk) {
                moved = true;
            }
        }
        moved
    }

    /// Whether a node may be moved at all.
    fn is_recruitable(&self, node: Node) -> bool {
        let assume = &self.params.assume;
        self.ntk.is_gate(node)
            || (self.ntk.is_pi(node) && assume.branch_pis && !assume.balance_pis && assume.num_phases == 1)
    }

    fn can_join(&self, node: Node, chunk: &Chunk, pass_start: u32) -> bool {
        self.is_recruitable(node)
            && self.marks[node.index()] <= pass_start
            && chunk.members.len() < self.params.max_chunk_size
    }

    /// Whether `consumer` reads `producer` right at its node or right after
    /// its first splitter.
    fn is_close(&self, producer: Node, consumer: Node) -> bool {
        match self.ledger.tree(producer) {
            [only] => only.relative_depth == 1 && only.fanouts.contains(&consumer),
            tree => tree
                .get(1)
                .is_some_and(|e| e.relative_depth == 2 && e.fanouts.contains(&consumer)),
        }
    }

    fn join(&mut self, node: Node, chunk: &mut Chunk, stack: &mut Vec<Node>) {
        self.marks[node.index()] = chunk.id;
        chunk.members.push(node);
        stack.push(node);
    }

    /// Grows a chunk from `seed`.
    fn recruit(&mut self, seed: Node, pass_start: u32) -> Chunk {
        let ntk = self.ntk;
        let mut chunk = Chunk::new(self.generation);
        let mut stack = Vec::new();
        self.join(seed, &mut chunk, &mut stack);

        while let Some(n) = stack.pop() {
            for fi in ntk.fanins(n) {
                let m = fi.node();
                if ntk.is_constant(m) || self.marks[m.index()] == chunk.id {
                    continue;
                }
                if self.can_join(m, &chunk, pass_start) && self.is_close(m, n) {
                    self.join(m, &mut chunk, &mut stack);
                } else {
                    chunk.input_interfaces.push((n, m));
                }
            }

            let tree = self.ledger.tree(n);
            let mut fanouts = Vec::new();
            for (k, entry) in tree.iter().enumerate() {
                let close = (tree.len() == 1 && entry.relative_depth == 1) || (k == 1 && entry.relative_depth == 2);
                fanouts.extend(entry.fanouts.iter().map(|&m| (Consumer::Node(m), close)));
                fanouts.extend(entry.outputs.iter().map(|&i| (Consumer::Output(i), false)));
            }
            for (consumer, close) in fanouts {
                match consumer {
                    Consumer::Node(m) if self.marks[m.index()] == chunk.id => {}
                    Consumer::Node(m) if close && self.can_join(m, &chunk, pass_start) => {
                        self.join(m, &mut chunk, &mut stack);
                    }
                    _ => chunk.output_interfaces.push((n, consumer)),
                }
            }
        }

        // Interfaces recorded before their outer end joined.
        let marks = &self.marks;
        let id = chunk.id;
        chunk.input_interfaces.retain(|&(_, o)| marks[o.index()] != id);
        chunk.output_interfaces.retain(|&(_, c)| match c {
            Consumer::Node(m) => marks[m.index()] != id,
            Consumer::Output(_) => true,
        });
        chunk
    }

    /// Relative depth of an interface wire.
    fn interface_depth(&self, member: Node, consumer: Consumer) -> i64 {
        self.target_level(consumer) as i64 - self.level(member) as i64
    }

    fn try_move_down(&mut self, chunk: &Chunk) -> bool {
        let benefit: BTreeSet<Consumer> = chunk.output_interfaces.iter().map(|&(_, c)| c).collect();
        if benefit.is_empty() {
            return false;
        }

        let assume = &self.params.assume;
        let s = assume.splitter_capacity;
        let mut slack = i64::MAX;
        for &(m, o) in &chunk.input_interfaces {
            let free = if self.has_tree(o) {
                match self.ledger.lowest_free_slot(o, self.capacity(o), s) {
                    Some(free) => free,
                    None => return false,
                }
            } else {
                1
            };
            let rd = self.level(m) as i64 - self.level(o) as i64;
            slack = slack.min(rd - free as i64);
        }
        for &m in &chunk.members {
            let floor = if self.ntk.is_pi(m) { assume.earliest_pi_level() } else { 1 };
            slack = slack.min(self.level(m) as i64 - floor as i64);
        }

        if slack <= 0 {
            return false;
        }
        let accepted = self.try_shift(chunk, -slack);
        if accepted {
            self.stats.moves_down += 1;
        }
        accepted
    }

    fn try_move_up(&mut self, chunk: &Chunk) -> bool {
        let min_rd = |this: &Self, m: Node| -> i64 {
            if this.ntk.fanout_size(m) <= this.capacity(m) {
                1
            } else {
                2
            }
        };

        let mut benefit = BTreeSet::new();
        let mut slack = i64::MAX;
        for &(m, c) in &chunk.output_interfaces {
            let rd = self.interface_depth(m, c);
            let lower = min_rd(self, m);
            if rd > lower {
                benefit.insert(c);
            }
            slack = slack.min(rd - lower);
        }
        if benefit.is_empty() {
            return false;
        }
        let depth = self.depth() as i64;
        for &m in &chunk.members {
            slack = slack.min(depth - self.level(m) as i64);
        }

        if slack <= 0 {
            return false;
        }
        let accepted = self.try_shift(chunk, slack);
        if accepted {
            self.stats.moves_up += 1;
        }
        accepted
    }

    /// Shifts every member by `delta` levels and keeps the result only if it
    /// is legal and needs fewer buffers.
    fn try_shift(&mut self, chunk: &Chunk, delta: i64) -> bool {
        let mut affected = chunk.members.clone();
        affected.extend(
            chunk
                .input_interfaces
                .iter()
                .map(|&(_, o)| o)
                .filter(|&o| self.has_tree(o)),
        );
        affected.sort_unstable();
        affected.dedup();

        let snapshot = Snapshot {
            levels: chunk.members.iter().map(|&m| (m, self.level(m))).collect(),
            trees: affected.iter().map(|&n| (n, self.ledger.tree(n).to_vec())).collect(),
        };
        let before: u32 = affected.iter().map(|&n| self.buffers[n.index()]).sum();

        let mut legal = true;
        for &m in &chunk.members {
            match u32::try_from(self.level(m) as i64 + delta) {
                Ok(level) => self.levels.set_level(m, level),
                Err(_) => legal = false,
            }
        }
        legal &= self.is_legal_shift(chunk);

        let mut after = 0;
        if legal {
            for &n in &affected {
                legal &= self.rebuild_tree(n);
                if !legal {
                    break;
                }
                after += self.ledger.num_buffers(n);
            }
        }

        if legal && after < before {
            for &n in &affected {
                self.buffers[n.index()] = self.ledger.num_buffers(n);
            }
            debug!(
                "Moved chunk {} ({} members) by {}: {} -> {} buffers",
                chunk.id,
                chunk.members.len(),
                delta,
                before,
                after
            );
            true
        } else {
            self.undo(snapshot);
            self.stats.rejected_moves += 1;
            false
        }
    }

    fn is_legal_shift(&self, chunk: &Chunk) -> bool {
        let assume = &self.params.assume;
        chunk.members.iter().all(|&m| {
            if self.ntk.is_pi(m) {
                assume.is_admissible_pi_level(self.level(m))
            } else {
                self.level(m) >= 1 && self.level(m) <= self.depth()
            }
        }) && chunk
            .input_interfaces
            .iter()
            .all(|&(m, o)| self.level(m) > self.level(o))
    }

    fn undo(&mut self, snapshot: Snapshot) {
        for (node, level) in snapshot.levels {
            self.levels.set_level(node, level);
        }
        for (node, tree) in snapshot.trees {
            self.ledger.restore(node, tree);
        }
    }
}
