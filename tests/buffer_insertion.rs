//! End-to-end tests for buffer insertion.
//!
//! Tests cover every scheduling policy and optimization effort on arithmetic
//! circuits and seeded random networks, and check the materialized networks
//! for legality and functional equivalence.

use aqfp_rs::assumptions::AqfpAssumptions;
use aqfp_rs::buffer_insertion::{
    BufferInsertion, BufferInsertionParams, BufferInsertionStats, OptimizationEffort, Scheduling, SolverConfig,
};
use aqfp_rs::generators::{array_multiplier, random_network, ripple_carry_adder};
use aqfp_rs::ledger::FanoutEntry;
use aqfp_rs::network::{LogicNetwork, Network};
use aqfp_rs::reconstruct::reconstruct;
use aqfp_rs::solver::SolverError;
use aqfp_rs::verify::{verify_aqfp_buffer, verify_buffered_network};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use test_log::test;

const POLICIES: [Scheduling; 6] = [
    Scheduling::Asap,
    Scheduling::Alap,
    Scheduling::AsapDepth,
    Scheduling::AlapDepth,
    Scheduling::Better,
    Scheduling::BetterDepth,
];

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

fn technologies() -> Vec<AqfpAssumptions> {
    vec![AqfpAssumptions::default(), AqfpAssumptions::balanced(2), unbalanced_io()]
}

fn seeded_network(seed: u64) -> Network {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    random_network(6, 30, 5, |n| rng.random_range(0..n))
}

fn all_assignments(n: usize) -> impl Iterator<Item = Vec<bool>> {
    (0..1u32 << n).map(move |bits| (0..n).map(|i| bits >> i & 1 == 1).collect())
}

struct Outcome {
    count: u32,
    buffered: Network,
    levels: Vec<u32>,
    stats: BufferInsertionStats,
}

fn insert(ntk: &Network, params: BufferInsertionParams) -> Outcome {
    let mut engine = BufferInsertion::new(ntk, params);
    let count = engine.dry_run().unwrap();
    assert!(engine.check_levels());
    let mut buffered = Network::new();
    let levels = engine.dump_buffered_network(&mut buffered);
    Outcome {
        count,
        buffered,
        levels,
        stats: engine.stats().clone(),
    }
}

fn assert_faithful(ntk: &Network, assume: &AqfpAssumptions, outcome: &Outcome) {
    assert!(!outcome.stats.count_mismatch);
    assert_eq!(outcome.count as usize, outcome.buffered.num_buffers());
    assert_eq!(outcome.buffered.num_gates(), ntk.num_gates() + outcome.buffered.num_buffers());
    assert!(verify_buffered_network(&outcome.buffered, assume, &outcome.levels));
    for inputs in all_assignments(ntk.num_pis()) {
        assert_eq!(ntk.simulate(&inputs), outcome.buffered.simulate(&inputs));
    }
}

// ─── Scheduling ────────────────────────────────────────────────────────────────

#[test]
fn every_policy_is_legal_on_random_networks() {
    for seed in 0..3 {
        let ntk = seeded_network(seed);
        for assume in technologies() {
            for scheduling in POLICIES {
                let params = BufferInsertionParams {
                    assume: assume.clone(),
                    scheduling,
                    ..Default::default()
                };
                let outcome = insert(&ntk, params);
                assert_faithful(&ntk, &assume, &outcome);
            }
        }
    }
}

#[test]
fn phase_aligned_adder() {
    let ntk = ripple_carry_adder(3);
    let assume = AqfpAssumptions {
        num_phases: 4,
        ..unbalanced_io()
    };
    for scheduling in POLICIES {
        let params = BufferInsertionParams {
            assume: assume.clone(),
            scheduling,
            ..Default::default()
        };
        let outcome = insert(&ntk, params);
        assert_faithful(&ntk, &assume, &outcome);
    }
}

#[test]
fn depth_optimal_reference_scenario() {
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

    let params = BufferInsertionParams {
        assume: unbalanced_io(),
        scheduling: Scheduling::AlapDepth,
        ..Default::default()
    };
    let mut engine = BufferInsertion::new(&ntk, params.clone());
    engine.dry_run().unwrap();
    assert_eq!(engine.depth(), 4);
    assert_eq!(engine.pi_levels(), vec![4, 2, 1, 0, 1]);

    let outcome = insert(&ntk, params);
    assert_faithful(&ntk, &unbalanced_io(), &outcome);
}

// ─── Optimization ──────────────────────────────────────────────────────────────

#[test]
fn optimization_never_increases_the_count() {
    for seed in 10..14 {
        let ntk = seeded_network(seed);
        for effort in [OptimizationEffort::OnePass, OptimizationEffort::UntilSat] {
            for assume in technologies() {
                let params = BufferInsertionParams {
                    assume: assume.clone(),
                    scheduling: Scheduling::Asap,
                    optimization_effort: effort,
                    ..Default::default()
                };
                let outcome = insert(&ntk, params);
                assert!(outcome.stats.optimized_buffers <= outcome.stats.scheduled_buffers);
                assert_eq!(outcome.count, outcome.stats.optimized_buffers);
                assert_faithful(&ntk, &assume, &outcome);
            }
        }
    }
}

#[test]
fn until_sat_is_at_least_as_good_as_one_pass() {
    let ntk = array_multiplier(3);
    let run = |effort| {
        let params = BufferInsertionParams {
            scheduling: Scheduling::Asap,
            optimization_effort: effort,
            ..Default::default()
        };
        insert(&ntk, params).count
    };
    let none = run(OptimizationEffort::None);
    let one_pass = run(OptimizationEffort::OnePass);
    let until_sat = run(OptimizationEffort::UntilSat);
    assert!(one_pass <= none);
    assert!(until_sat <= one_pass);
}

#[test]
fn one_pass_removes_output_padding() {
    // g1 feeds an output that arrives three levels after it.
    let mut ntk = Network::new();
    let a = ntk.add_input();
    let b = ntk.add_input();
    let c = ntk.add_input();
    let d = ntk.add_input();
    let g1 = ntk.add_and(a, b);
    let g2 = ntk.add_and(c, d);
    let g3 = ntk.add_and(g2, d);
    let g4 = ntk.add_and(g3, d);
    let g5 = ntk.add_and(g4, d);
    ntk.add_output(g1);
    ntk.add_output(g5);

    let params = BufferInsertionParams {
        scheduling: Scheduling::Asap,
        optimization_effort: OptimizationEffort::OnePass,
        ..Default::default()
    };
    let outcome = insert(&ntk, params);
    assert_eq!(outcome.stats.scheduled_buffers, 3);
    assert_eq!(outcome.count, 0);
    assert_eq!(outcome.levels[g1.node().index()], 4);
    assert_faithful(&ntk, &AqfpAssumptions::default(), &outcome);
}

#[test]
fn optimum_makes_no_moves() {
    // A balanced tree of AND gates has nothing to gain.
    let mut ntk = Network::new();
    let inputs: Vec<_> = (0..4).map(|_| ntk.add_input()).collect();
    let x = ntk.add_and(inputs[0], inputs[1]);
    let y = ntk.add_xor(inputs[2], inputs[3]);
    let z = ntk.add_and(x, y);
    ntk.add_output(z);

    let params = BufferInsertionParams {
        scheduling: Scheduling::Asap,
        optimization_effort: OptimizationEffort::UntilSat,
        ..Default::default()
    };
    let outcome = insert(&ntk, params);
    assert_eq!(outcome.count, 0);
    assert_eq!(outcome.stats.moves_up, 0);
    assert_eq!(outcome.stats.moves_down, 0);
}

#[test]
fn rejected_moves_are_rolled_back_exactly() {
    let sorted = |tree: &[FanoutEntry]| -> Vec<FanoutEntry> {
        tree.iter()
            .cloned()
            .map(|mut entry| {
                entry.fanouts.sort_unstable();
                entry.outputs.sort_unstable();
                entry
            })
            .collect()
    };

    let mut rejected = 0;
    for seed in 20..24 {
        let ntk = seeded_network(seed);
        for assume in technologies() {
            let params = BufferInsertionParams {
                assume,
                scheduling: Scheduling::Asap,
                optimization_effort: OptimizationEffort::UntilSat,
                ..Default::default()
            };
            let mut engine = BufferInsertion::new(&ntk, params);
            let count = engine.dry_run().unwrap();
            rejected += engine.stats().rejected_moves;

            let nodes: Vec<_> = ntk.pis().iter().chain(ntk.gates()).copied().collect();
            let trees: Vec<_> = nodes.iter().map(|&n| sorted(engine.fanout_tree(n))).collect();
            let counts: Vec<_> = nodes.iter().map(|&n| engine.num_buffers_of(n)).collect();

            engine.update_fanout_info();
            engine.count_buffers();
            for (i, &n) in nodes.iter().enumerate() {
                assert_eq!(sorted(engine.fanout_tree(n)), trees[i]);
                assert_eq!(engine.num_buffers_of(n), counts[i]);
            }
            assert_eq!(engine.num_buffers(), count);
        }
    }
    assert!(rejected > 0);
}

#[test]
fn missing_solver_is_reported() {
    let ntk = ripple_carry_adder(2);
    let params = BufferInsertionParams {
        optimization_effort: OptimizationEffort::Optimal,
        solver: SolverConfig {
            program: "/nonexistent/aqfp-solver".into(),
            args: Vec::new(),
        },
        ..Default::default()
    };
    let mut engine = BufferInsertion::new(&ntk, params);
    let result = engine.dry_run();
    assert!(matches!(result, Err(SolverError::NotFound { .. })));
}

// ─── Counting ──────────────────────────────────────────────────────────────────

#[test]
fn recounting_is_idempotent() {
    let ntk = seeded_network(99);
    let params = BufferInsertionParams {
        assume: AqfpAssumptions::balanced(3),
        scheduling: Scheduling::BetterDepth,
        ..Default::default()
    };
    let mut engine = BufferInsertion::new(&ntk, params);
    let count = engine.dry_run().unwrap();
    let trees: Vec<_> = ntk.gates().iter().map(|&g| engine.fanout_tree(g).to_vec()).collect();

    engine.update_fanout_info();
    engine.count_buffers();
    engine.count_buffers();
    assert_eq!(engine.num_buffers(), count);
    for (&g, tree) in ntk.gates().iter().zip(&trees) {
        assert_eq!(engine.fanout_tree(g), tree.as_slice());
    }
    let per_node: u32 = ntk
        .pis()
        .iter()
        .chain(ntk.gates())
        .map(|&n| engine.num_buffers_of(n))
        .sum();
    assert_eq!(per_node, count);
}

#[test]
fn splitter_capacity_shapes_the_tree() {
    // One gate drives four outputs.
    let mut ntk = Network::new();
    let a = ntk.add_input();
    let b = ntk.add_input();
    let g = ntk.add_and(a, b);
    for _ in 0..4 {
        ntk.add_output(g);
    }

    let mut counts = Vec::new();
    for s in [2, 3, 4] {
        let assume = AqfpAssumptions {
            splitter_capacity: s,
            ..AqfpAssumptions::default()
        };
        let params = BufferInsertionParams {
            assume: assume.clone(),
            scheduling: Scheduling::Asap,
            ..Default::default()
        };
        let outcome = insert(&ntk, params);
        assert_faithful(&ntk, &assume, &outcome);
        counts.push(outcome.count);
    }
    assert_eq!(counts, vec![3, 3, 1]);
}

#[test]
fn provided_levels_are_kept() {
    let mut ntk = Network::new();
    let a = ntk.add_input();
    let b = ntk.add_input();
    let f = ntk.add_and(a, b);
    let g = ntk.add_xor(f, b);
    ntk.add_output(g);

    // g one level later than necessary: f needs one buffer.
    let levels = vec![0, 0, 0, 1, 3];
    let params = BufferInsertionParams {
        scheduling: Scheduling::Provided,
        ..Default::default()
    };
    let mut engine = BufferInsertion::with_levels(&ntk, levels, params);
    assert_eq!(engine.dry_run().unwrap(), 1);
    assert_eq!(engine.level(g.node()), 3);
    assert_eq!(engine.depth(), 3);
}

// ─── Reconstruction ────────────────────────────────────────────────────────────

#[test]
fn reconstruction_never_needs_more_buffers() {
    for seed in 30..33 {
        let ntk = seeded_network(seed);
        for assume in technologies() {
            let params = BufferInsertionParams {
                assume: assume.clone(),
                scheduling: Scheduling::Alap,
                ..Default::default()
            };
            let outcome = insert(&ntk, params.clone());
            assert!(verify_aqfp_buffer(&outcome.buffered, &assume));

            let mut rebuilt = Network::new();
            let count = reconstruct(&outcome.buffered, &params, &mut rebuilt).unwrap();
            assert!(count <= outcome.count);
            assert_eq!(count as usize, rebuilt.num_buffers());
            assert!(verify_aqfp_buffer(&rebuilt, &assume));
            for inputs in all_assignments(ntk.num_pis()) {
                assert_eq!(ntk.simulate(&inputs), rebuilt.simulate(&inputs));
            }
        }
    }
}
