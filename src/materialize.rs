//! Writing out a network with explicit buffers.
//!
//! Every fan-out tree is built right after its root node, deepest consumers
//! first. A consumer at relative depth `r` needs a driver at `r - 1`; the
//! driver is the last buffer created at that depth if it still has a free
//! output, otherwise a new buffer is chained from the nearest shallower depth
//! that has one. Building deepest-first reproduces the trees derived by
//! [`FanoutLedger::count_edges`](crate::ledger::FanoutLedger::count_edges).

use std::collections::HashMap;

use log::{debug, warn};

use crate::buffer_insertion::BufferInsertion;
use crate::network::{BufferedNetwork, LogicNetwork};
use crate::signal::Signal;
use crate::types::{Consumer, Node};

/// A buffer or the tree root, with the number of outputs already taken.
#[derive(Debug, Copy, Clone)]
struct Slot {
    signal: Signal,
    used: u32,
}

/// Buffered network under construction, with the level of every created node.
struct Emitter<'o, B> {
    out: &'o mut B,
    levels: Vec<u32>,
}

impl<B: BufferedNetwork> Emitter<'_, B> {
    fn record(&mut self, signal: Signal, level: u32) -> Signal {
        let index = signal.node().index();
        if self.levels.len() <= index {
            self.levels.resize(index + 1, 0);
        }
        self.levels[index] = level;
        signal
    }

    fn buffer(&mut self, fanin: Signal, level: u32) -> Signal {
        let b = self.out.create_buf(fanin);
        self.record(b, level)
    }
}

impl<N: LogicNetwork> BufferInsertion<'_, N> {
    /// Writes the network into `out` with every buffer and splitter made
    /// explicit, and returns the level of every node of `out`.
    ///
    /// Counts buffers first if levels changed. A difference between the number
    /// of created buffers and [`num_buffers`](Self::num_buffers) is logged and
    /// recorded in [`stats`](Self::stats).
    pub fn dump_buffered_network<B: BufferedNetwork>(&mut self, out: &mut B) -> Vec<u32> {
        if self.outdated {
            self.count_buffers();
        }
        let ntk = self.ntk;
        let existing = out.num_buffers();
        let mut emitter = Emitter {
            levels: vec![0; out.size()],
            out,
        };

        let mut signals = vec![Signal::zero(); ntk.size()];
        signals[Node::CONSTANT.index()] = emitter.out.get_constant(false);
        let mut drivers: HashMap<(Node, Consumer), Vec<Signal>> = HashMap::new();

        for &pi in ntk.pis() {
            let s = emitter.out.create_pi();
            signals[pi.index()] = emitter.record(s, self.level(pi));
        }
        for &pi in ntk.pis() {
            if self.has_tree(pi) {
                self.emit_tree(&mut emitter, pi, signals[pi.index()], &mut drivers);
            }
        }

        for &g in ntk.gates() {
            let Some(&gate) = ntk.gate(g) else {
                unreachable!("{} is listed as a gate", g);
            };
            let children: Vec<Signal> = ntk
                .fanins(g)
                .iter()
                .map(|&fi| self.driver_of(fi.node(), Consumer::Node(g), &signals, &mut drivers).negate_if(fi.is_negated()))
                .collect();
            let s = emitter.out.create_gate(gate.with_inputs(&children));
            signals[g.index()] = emitter.record(s, self.level(g));
            self.emit_tree(&mut emitter, g, s, &mut drivers);
        }

        for (i, &po) in ntk.outputs().iter().enumerate() {
            let driver = self.driver_of(po.node(), Consumer::Output(i), &signals, &mut drivers);
            emitter.out.create_po(driver.negate_if(po.is_negated()));
        }

        let created = (emitter.out.num_buffers() - existing) as u32;
        let expected = self.num_buffers();
        self.stats.materialized_buffers = Some(created);
        self.stats.count_mismatch = created != expected;
        if created != expected {
            warn!("Created {} buffers, but {} were counted", created, expected);
        } else {
            debug!("Created {} buffers", created);
        }
        emitter.levels
    }

    /// Signal that feeds `consumer` from `producer`.
    fn driver_of(
        &self,
        producer: Node,
        consumer: Consumer,
        signals: &[Signal],
        drivers: &mut HashMap<(Node, Consumer), Vec<Signal>>,
    ) -> Signal {
        if !self.has_tree(producer) {
            return signals[producer.index()];
        }
        match drivers.get_mut(&(producer, consumer)).and_then(|stack| stack.pop()) {
            Some(s) => s,
            None => unreachable!("{} has no wire towards {}", producer, consumer),
        }
    }

    /// Creates the buffers of the fan-out tree of `node` and assigns a driver
    /// to every consumer.
    fn emit_tree<B: BufferedNetwork>(
        &self,
        emitter: &mut Emitter<'_, B>,
        node: Node,
        root: Signal,
        drivers: &mut HashMap<(Node, Consumer), Vec<Signal>>,
    ) {
        let level = self.level(node);
        let root_capacity = self.capacity(node);
        let s = self.params.assume.splitter_capacity;
        let capacity = |depth: usize| if depth == 0 { root_capacity } else { s };

        let mut slots: Vec<Vec<Slot>> = vec![vec![Slot { signal: root, used: 0 }]];
        for entry in self.ledger.tree(node).iter().rev() {
            let consumers = entry
                .fanouts
                .iter()
                .map(|&m| Consumer::Node(m))
                .chain(entry.outputs.iter().map(|&i| Consumer::Output(i)));
            for consumer in consumers {
                let target = (entry.relative_depth - 1) as usize;
                if slots.len() <= target {
                    slots.resize_with(target + 1, Vec::new);
                }

                // Nearest depth with a free output.
                let mut from = target;
                loop {
                    if slots[from].last().is_some_and(|slot| slot.used < capacity(from)) {
                        break;
                    }
                    if from == 0 {
                        warn!("Fan-out of {} exceeds its capacity", node);
                        break;
                    }
                    from -= 1;
                }
                for depth in from + 1..=target {
                    let Some(parent) = slots[depth - 1].last_mut() else {
                        unreachable!("Empty depth {} below a buffer", depth - 1);
                    };
                    parent.used += 1;
                    let fanin = parent.signal;
                    let b = emitter.buffer(fanin, level + depth as u32);
                    slots[depth].push(Slot { signal: b, used: 0 });
                }

                let Some(driver) = slots[target].last_mut() else {
                    unreachable!("No driver at depth {}", target);
                };
                driver.used += 1;
                drivers.entry((node, consumer)).or_default().push(driver.signal);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::assumptions::AqfpAssumptions;
    use crate::buffer_insertion::{BufferInsertion, BufferInsertionParams, Scheduling};
    use crate::network::{LogicNetwork, Network};
    use crate::verify::verify_buffered_network;
    use test_log::test;

    fn all_assignments(n: usize) -> impl Iterator<Item = Vec<bool>> {
        (0..1u32 << n).map(move |bits| (0..n).map(|i| bits >> i & 1 == 1).collect())
    }

    #[test]
    fn test_chain_materialization() {
        let mut ntk = Network::new();
        let a = ntk.add_input();
        let b = ntk.add_input();
        let c = ntk.add_input();
        let f = ntk.add_and(a, b);
        let g = ntk.add_and(f, c);
        let h = ntk.add_xor(g, c);
        ntk.add_output(h);
        ntk.add_output(!f);

        let params = BufferInsertionParams {
            assume: AqfpAssumptions::default(),
            scheduling: Scheduling::Asap,
            ..Default::default()
        };
        let mut engine = BufferInsertion::new(&ntk, params.clone());
        let mut buffered = Network::new();
        let count = engine.run(&mut buffered).unwrap();
        let levels = engine.dump_buffered_network(&mut Network::new());

        // f feeds g two levels up and an output four levels up.
        assert_eq!(count, 3);
        assert_eq!(buffered.num_buffers(), 3);
        assert!(!engine.stats().count_mismatch);
        assert!(verify_buffered_network(&buffered, &params.assume, &levels));
        for inputs in all_assignments(3) {
            assert_eq!(ntk.simulate(&inputs), buffered.simulate(&inputs));
        }
    }

    #[test]
    fn test_splitter_tree_materialization() {
        let mut ntk = Network::new();
        let a = ntk.add_input();
        let b = ntk.add_input();
        let c = ntk.add_input();
        let d = ntk.add_input();
        let f = ntk.add_maj(a, b, c);
        let consumers = [
            ntk.add_and(f, a),
            ntk.add_and(f, b),
            ntk.add_xor(f, c),
            ntk.add_and(!f, d),
            ntk.add_xor(f, d),
        ];
        for s in consumers {
            ntk.add_output(s);
        }

        let assume = AqfpAssumptions {
            splitter_capacity: 2,
            ..AqfpAssumptions::balanced(2)
        };
        let params = BufferInsertionParams {
            assume: assume.clone(),
            scheduling: Scheduling::Asap,
            ..Default::default()
        };
        let mut engine = BufferInsertion::new(&ntk, params);
        let mut buffered = Network::new();
        let count = engine.run(&mut buffered).unwrap();
        let mut again = Network::new();
        let levels = engine.dump_buffered_network(&mut again);

        assert_eq!(count as usize, buffered.num_buffers());
        assert_eq!(again.num_buffers(), buffered.num_buffers());
        assert!(!engine.stats().count_mismatch);
        assert!(verify_buffered_network(&again, &assume, &levels));
        for inputs in all_assignments(4) {
            assert_eq!(ntk.simulate(&inputs), again.simulate(&inputs));
        }
    }

    #[test]
    fn test_constant_outputs() {
        let mut ntk = Network::new();
        let a = ntk.add_input();
        let b = ntk.add_input();
        let f = ntk.add_xor(a, b);
        ntk.add_output(ntk.get_constant(true));
        ntk.add_output(f);
        ntk.add_output(ntk.get_constant(false));

        let mut engine = BufferInsertion::new(&ntk, BufferInsertionParams::default());
        let mut buffered = Network::new();
        assert_eq!(engine.run(&mut buffered).unwrap(), 0);
        assert_eq!(buffered.num_pos(), 3);
        for inputs in all_assignments(2) {
            assert_eq!(ntk.simulate(&inputs), buffered.simulate(&inputs));
        }
    }
}
