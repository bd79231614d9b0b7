//! Rebuilding the buffer trees of a network that already has them.
//!
//! The buffered network is scheduled with
//! [`schedule_buffered_network`], its buffers are dropped, and the remaining
//! gates are handed to [`BufferInsertion`] at their recovered levels. Trees
//! that were built by hand or by another tool come back as the trees the
//! ledger derives for the same levels, which never need more buffers.

use log::info;

use crate::buffer_insertion::{BufferInsertion, BufferInsertionParams, Scheduling};
use crate::network::{BufferedNetwork, LogicNetwork, Network};
use crate::signal::Signal;
use crate::solver::SolverError;
use crate::types::Node;
use crate::verify::schedule_buffered_network;

/// Copies `ntk` without its buffers.
///
/// Returns the copy together with the level of each of its nodes, taken from
/// `levels` (one entry per node of `ntk`).
pub fn strip_buffers<N: LogicNetwork>(ntk: &N, levels: &[u32]) -> (Network, Vec<u32>) {
    let mut clean = Network::new();
    let mut clean_levels = vec![0; clean.size()];
    let mut signals = vec![Signal::zero(); ntk.size()];
    signals[Node::CONSTANT.index()] = clean.get_constant(false);

    fn place(clean_levels: &mut Vec<u32>, s: Signal, level: u32) {
        let i = s.node().index();
        if clean_levels.len() <= i {
            clean_levels.resize(i + 1, 0);
        }
        clean_levels[i] = level;
    }

    for &pi in ntk.pis() {
        let s = clean.add_input();
        place(&mut clean_levels, s, levels[pi.index()]);
        signals[pi.index()] = s;
    }
    for &g in ntk.gates() {
        let Some(gate) = ntk.gate(g) else {
            unreachable!("{} is listed as a gate", g);
        };
        let children: Vec<Signal> = ntk
            .fanins(g)
            .iter()
            .map(|&fi| signals[fi.node().index()].negate_if(fi.is_negated()))
            .collect();
        signals[g.index()] = if gate.is_buffer() {
            children[0]
        } else {
            let s = clean.add_gate(gate.with_inputs(&children));
            place(&mut clean_levels, s, levels[g.index()]);
            s
        };
    }
    for &po in ntk.outputs() {
        clean.add_output(signals[po.node().index()].negate_if(po.is_negated()));
    }
    (clean, clean_levels)
}

/// Replaces every buffer and splitter tree of `ntk` and writes the result into `out`.
///
/// Gates keep the levels recovered by [`schedule_buffered_network`] under
/// `params.assume`; the scheduling policy in `params` is ignored, while the
/// optimization effort still applies. Returns the number of buffers and
/// splitters in `out`.
pub fn reconstruct<N: LogicNetwork, B: BufferedNetwork>(
    ntk: &N,
    params: &BufferInsertionParams,
    out: &mut B,
) -> Result<u32, SolverError> {
    let levels = schedule_buffered_network(ntk, &params.assume);
    let (clean, clean_levels) = strip_buffers(ntk, &levels);

    let params = BufferInsertionParams {
        scheduling: Scheduling::Provided,
        ..params.clone()
    };
    let mut engine = BufferInsertion::with_levels(&clean, clean_levels, params);
    let count = engine.run(out)?;
    info!(
        "Rebuilt {} buffers and splitters as {} ({} gates)",
        ntk.num_buffers(),
        count,
        clean.num_gates()
    );
    Ok(count)
}
