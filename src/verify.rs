//! Checks on buffered networks.

use log::debug;

use crate::assumptions::AqfpAssumptions;
use crate::network::LogicNetwork;
use crate::types::Node;

/// Recovers a level assignment for a network with explicit buffers.
///
/// Every wire out of a branched node spans exactly one level, so the nodes
/// connected by such wires form rigid groups. Each group is placed as early as
/// its inputs and phases allow. With `balance_pos`, groups that drive outputs
/// are then lifted until all outputs arrive together, unless that would move
/// a balanced input off its phase. Constants and inputs that are not branched
/// stay at the earliest input level.
///
/// The result is meant for [`verify_buffered_network`]; a network that is not
/// path-balanced gets some assignment that fails verification.
pub fn schedule_buffered_network<N: LogicNetwork>(ntk: &N, assume: &AqfpAssumptions) -> Vec<u32> {
    let size = ntk.size();
    let earliest = assume.earliest_pi_level();
    let exempt = |n: Node| ntk.is_constant(n) || (ntk.is_pi(n) && !assume.branch_pis);

    // Rigid wires in both directions, with the level step along each.
    let mut wires: Vec<Vec<(Node, i64)>> = vec![Vec::new(); size];
    for &g in ntk.gates() {
        for fi in ntk.fanins(g) {
            let m = fi.node();
            if !exempt(m) {
                wires[g.index()].push((m, -1));
                wires[m.index()].push((g, 1));
            }
        }
    }
    let mut drives_output = vec![false; size];
    for po in ntk.outputs() {
        drives_output[po.node().index()] = true;
    }

    let floor = |n: Node| -> i64 {
        if ntk.is_pi(n) {
            earliest as i64
        } else if ntk.fanins(n).iter().any(|fi| ntk.is_pi(fi.node()) && exempt(fi.node())) {
            earliest as i64 + 1
        } else {
            1
        }
    };
    // Inputs on an admissible phase and output drivers aligned.
    fn fits<N: LogicNetwork>(
        ntk: &N,
        assume: &AqfpAssumptions,
        drives_output: &[bool],
        members: &[Node],
        level_of: impl Fn(Node) -> i64,
    ) -> bool {
        members.iter().all(|&m| {
            let level = level_of(m) as u32;
            if ntk.is_pi(m) {
                assume.is_admissible_pi_level(level)
            } else {
                !drives_output[m.index()] || assume.is_aligned_arrival(level)
            }
        })
    }

    let mut levels = vec![0; size];
    for &pi in ntk.pis() {
        levels[pi.index()] = earliest;
    }

    let mut offset = vec![0i64; size];
    let mut seen = vec![false; size];
    let mut groups: Vec<Vec<Node>> = Vec::new();
    for &root in ntk.pis().iter().chain(ntk.gates()) {
        if exempt(root) || seen[root.index()] {
            continue;
        }
        seen[root.index()] = true;
        let mut members = vec![root];
        let mut stack = vec![root];
        while let Some(n) = stack.pop() {
            for &(m, step) in &wires[n.index()] {
                if !seen[m.index()] {
                    seen[m.index()] = true;
                    offset[m.index()] = offset[n.index()] + step;
                    members.push(m);
                    stack.push(m);
                }
            }
        }

        let lowest = members
            .iter()
            .map(|&m| floor(m) - offset[m.index()])
            .max()
            .unwrap_or(0);
        let span = (assume.num_phases + assume.ci_phases.iter().copied().max().unwrap_or(0)) as i64;
        let shift = (lowest..=lowest + span)
            .find(|&shift| fits(ntk, assume, &drives_output, &members, |m| offset[m.index()] + shift))
            .unwrap_or(lowest);
        for &m in &members {
            levels[m.index()] = (offset[m.index()] + shift) as u32;
        }
        groups.push(members);
    }

    if assume.balance_pos {
        let top = |members: &[Node], levels: &[u32]| {
            members
                .iter()
                .filter(|&&m| drives_output[m.index()])
                .map(|&m| levels[m.index()])
                .max()
        };
        let arrival = groups.iter().filter_map(|members| top(members, &levels)).max();
        if let Some(arrival) = arrival {
            for members in &groups {
                let Some(level) = top(members, &levels) else {
                    continue;
                };
                let lift = arrival - level;
                if lift > 0 && fits(ntk, assume, &drives_output, members, |m| (levels[m.index()] + lift) as i64) {
                    for &m in members {
                        levels[m.index()] += lift;
                    }
                }
            }
        }
    }
    levels
}

/// Checks a network with explicit buffers without being given its levels.
///
/// Equivalent to [`verify_buffered_network`] over the levels found by
/// [`schedule_buffered_network`].
pub fn verify_aqfp_buffer<N: LogicNetwork>(ntk: &N, assume: &AqfpAssumptions) -> bool {
    let levels = schedule_buffered_network(ntk, assume);
    verify_buffered_network(ntk, assume, &levels)
}

/// Checks that a network with explicit buffers is path-balanced and respects
/// the fan-out limits of the technology.
///
/// `levels` holds the level of every node of `ntk`, as returned by
/// [`BufferInsertion::dump_buffered_network`](crate::buffer_insertion::BufferInsertion::dump_buffered_network).
/// Inputs that are not branched are exempt from every check except being
/// read by a later level.
pub fn verify_buffered_network<N: LogicNetwork>(ntk: &N, assume: &AqfpAssumptions, levels: &[u32]) -> bool {
    let mut legal = true;
    let exempt = |n: Node| ntk.is_constant(n) || (ntk.is_pi(n) && !assume.branch_pis);

    for &n in ntk.pis().iter().chain(ntk.gates()) {
        let limit = if ntk.is_pi(n) {
            if assume.branch_pis {
                assume.ci_capacity
            } else {
                u32::MAX
            }
        } else if ntk.is_buffer(n) {
            assume.splitter_capacity
        } else {
            1
        };
        if ntk.fanout_size(n) > limit {
            debug!("{} drives {} consumers, limit is {}", n, ntk.fanout_size(n), limit);
            legal = false;
        }
    }

    if assume.branch_pis {
        for &pi in ntk.pis() {
            if !assume.is_admissible_pi_level(levels[pi.index()]) {
                debug!("Input {} sits at inadmissible level {}", pi, levels[pi.index()]);
                legal = false;
            }
        }
    }

    for &g in ntk.gates() {
        let level = levels[g.index()];
        for fi in ntk.fanins(g) {
            let n = fi.node();
            if ntk.is_constant(n) {
                continue;
            }
            let ok = if exempt(n) {
                levels[n.index()] < level
            } else {
                levels[n.index()] + 1 == level
            };
            if !ok {
                debug!("{} at level {} reads {} at level {}", g, level, n, levels[n.index()]);
                legal = false;
            }
        }
    }

    let mut arrival = None;
    for (i, po) in ntk.outputs().iter().enumerate() {
        let n = po.node();
        if exempt(n) {
            continue;
        }
        let level = levels[n.index()];
        if !assume.is_aligned_arrival(level) {
            debug!("Output {} arrives at unaligned level {}", i, level);
            legal = false;
        }
        if assume.balance_pos {
            match arrival {
                None => arrival = Some(level),
                Some(a) if a != level => {
                    debug!("Output {} arrives at {}, expected {}", i, level, a);
                    legal = false;
                }
                Some(_) => {}
            }
        }
    }
    legal
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Network;
    use test_log::test;

    fn balanced() -> AqfpAssumptions {
        AqfpAssumptions::balanced(2)
    }

    #[test]
    fn test_balanced_network() {
        let mut ntk = Network::new();
        let a = ntk.add_input();
        let b = ntk.add_input();
        let c = ntk.add_input();
        let f = ntk.add_and(a, b);
        let c1 = ntk.add_buffer(c);
        let g = ntk.add_and(f, c1);
        ntk.add_output(g);
        let levels = vec![0, 0, 0, 0, 1, 1, 2];
        assert!(verify_buffered_network(&ntk, &balanced(), &levels));
    }

    #[test]
    fn test_unbalanced_path() {
        let mut ntk = Network::new();
        let a = ntk.add_input();
        let b = ntk.add_input();
        let c = ntk.add_input();
        let f = ntk.add_and(a, b);
        let g = ntk.add_and(f, c);
        ntk.add_output(g);
        let levels = vec![0, 0, 0, 0, 1, 2];
        assert!(!verify_buffered_network(&ntk, &balanced(), &levels));

        // Non-branched inputs may be read at any later level.
        let relaxed = AqfpAssumptions {
            splitter_capacity: 2,
            ..AqfpAssumptions::default()
        };
        assert!(verify_buffered_network(&ntk, &relaxed, &levels));
    }

    #[test]
    fn test_fanout_limits() {
        let mut ntk = Network::new();
        let a = ntk.add_input();
        let b = ntk.add_input();
        let f = ntk.add_and(a, b);
        let a1 = ntk.add_buffer(a);
        let g = ntk.add_and(f, a1);
        let h = ntk.add_and(f, a1);
        ntk.add_output(g);
        ntk.add_output(h);
        // f drives two gates without a splitter.
        let levels = vec![0, 0, 0, 1, 1, 2, 2];
        assert!(!verify_buffered_network(&ntk, &balanced(), &levels));
    }

    #[test]
    fn test_unbalanced_outputs() {
        let mut ntk = Network::new();
        let a = ntk.add_input();
        let b = ntk.add_input();
        let c = ntk.add_input();
        let f = ntk.add_and(a, b);
        let c1 = ntk.add_buffer(c);
        ntk.add_output(f);
        ntk.add_output(c1);
        let mut levels = vec![0, 0, 0, 0, 1, 1];
        assert!(verify_buffered_network(&ntk, &balanced(), &levels));

        // c and its buffer one level later: outputs arrive at 1 and 2.
        levels[3] = 1;
        levels[5] = 2;
        let unbalanced_pis = AqfpAssumptions {
            balance_pis: false,
            ..balanced()
        };
        assert!(!verify_buffered_network(&ntk, &unbalanced_pis, &levels));
        let unbalanced_pos = AqfpAssumptions {
            balance_pos: false,
            ..unbalanced_pis
        };
        assert!(verify_buffered_network(&ntk, &unbalanced_pos, &levels));
    }

    #[test]
    fn test_schedule_balanced_inputs() {
        let mut ntk = Network::new();
        let a = ntk.add_input();
        let b = ntk.add_input();
        let c = ntk.add_input();
        let f = ntk.add_and(a, b);
        let c1 = ntk.add_buffer(c);
        let g = ntk.add_and(f, c1);
        ntk.add_output(g);
        assert_eq!(schedule_buffered_network(&ntk, &balanced()), vec![0, 0, 0, 0, 1, 1, 2]);
        assert!(verify_aqfp_buffer(&ntk, &balanced()));
    }

    #[test]
    fn test_schedule_lifts_unbalanced_inputs() {
        // f only becomes legal once a and b are read one level late.
        let mut ntk = Network::new();
        let a = ntk.add_input();
        let b = ntk.add_input();
        let c = ntk.add_input();
        let f = ntk.add_and(a, b);
        let c1 = ntk.add_buffer(c);
        let c2 = ntk.add_buffer(c1);
        let g = ntk.add_and(f, c2);
        ntk.add_output(g);

        let unbalanced = AqfpAssumptions {
            branch_pis: true,
            balance_pis: false,
            balance_pos: false,
            splitter_capacity: 2,
            ..AqfpAssumptions::default()
        };
        assert_eq!(
            schedule_buffered_network(&ntk, &unbalanced),
            vec![0, 1, 1, 0, 2, 1, 2, 3]
        );
        assert!(verify_aqfp_buffer(&ntk, &unbalanced));
        assert!(!verify_aqfp_buffer(&ntk, &balanced()));
    }

    #[test]
    fn test_schedule_balances_outputs() {
        // f reads only unbranched inputs, so it can wait for g2.
        let mut ntk = Network::new();
        let a = ntk.add_input();
        let b = ntk.add_input();
        let c = ntk.add_input();
        let d = ntk.add_input();
        let f = ntk.add_and(a, b);
        let g1 = ntk.add_and(c, d);
        let g2 = ntk.add_and(g1, d);
        ntk.add_output(f);
        ntk.add_output(g2);

        let relaxed = AqfpAssumptions::default();
        let levels = schedule_buffered_network(&ntk, &relaxed);
        assert_eq!(levels[f.node().index()], 2);
        assert_eq!(levels[g2.node().index()], 2);
        assert!(verify_aqfp_buffer(&ntk, &relaxed));

        let unbalanced_pos = AqfpAssumptions {
            balance_pos: false,
            ..relaxed
        };
        assert_eq!(schedule_buffered_network(&ntk, &unbalanced_pos)[f.node().index()], 1);
        assert!(verify_aqfp_buffer(&ntk, &unbalanced_pos));

        // Branched inputs pin f to level 1 and leave d without a splitter.
        assert!(!verify_aqfp_buffer(&ntk, &AqfpAssumptions::balanced(3)));
    }

    #[test]
    fn test_schedule_splitter_feeds_output() {
        // s drives an output and h, which waits for the chain on c.
        let mut ntk = Network::new();
        let a = ntk.add_input();
        let b = ntk.add_input();
        let c = ntk.add_input();
        let g = ntk.add_and(a, b);
        let s = ntk.add_buffer(g);
        let k1 = ntk.add_buffer(c);
        let k2 = ntk.add_buffer(k1);
        let k3 = ntk.add_buffer(k2);
        let h = ntk.add_and(s, k3);
        ntk.add_output(s);
        ntk.add_output(h);

        let unbalanced = AqfpAssumptions {
            branch_pis: true,
            balance_pis: false,
            balance_pos: false,
            splitter_capacity: 2,
            ..AqfpAssumptions::default()
        };
        assert_eq!(
            schedule_buffered_network(&ntk, &unbalanced),
            vec![0, 1, 1, 0, 2, 3, 1, 2, 3, 4]
        );
        assert!(verify_aqfp_buffer(&ntk, &unbalanced));

        let balanced_pos = AqfpAssumptions {
            balance_pos: true,
            ..unbalanced
        };
        assert!(!verify_aqfp_buffer(&ntk, &balanced_pos));
    }
}
