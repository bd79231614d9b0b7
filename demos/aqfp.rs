use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use color_eyre::eyre::bail;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use aqfp_rs::assumptions::AqfpAssumptions;
use aqfp_rs::buffer_insertion::{BufferInsertion, BufferInsertionParams, OptimizationEffort, Scheduling, SolverConfig};
use aqfp_rs::dot::to_dot;
use aqfp_rs::generators::{array_multiplier, random_network, ripple_carry_adder};
use aqfp_rs::network::{LogicNetwork, Network};
use aqfp_rs::verify::verify_buffered_network;

#[derive(Debug, Copy, Clone, ValueEnum)]
enum Circuit {
    Adder,
    Multiplier,
    Random,
}

#[derive(Debug, Copy, Clone, ValueEnum)]
enum Policy {
    Asap,
    Alap,
    AsapDepth,
    AlapDepth,
    Better,
    BetterDepth,
}

impl From<Policy> for Scheduling {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::Asap => Scheduling::Asap,
            Policy::Alap => Scheduling::Alap,
            Policy::AsapDepth => Scheduling::AsapDepth,
            Policy::AlapDepth => Scheduling::AlapDepth,
            Policy::Better => Scheduling::Better,
            Policy::BetterDepth => Scheduling::BetterDepth,
        }
    }
}

#[derive(Debug, Copy, Clone, ValueEnum)]
enum Effort {
    None,
    OnePass,
    UntilSat,
    Optimal,
}

impl From<Effort> for OptimizationEffort {
    fn from(effort: Effort) -> Self {
        match effort {
            Effort::None => OptimizationEffort::None,
            Effort::OnePass => OptimizationEffort::OnePass,
            Effort::UntilSat => OptimizationEffort::UntilSat,
            Effort::Optimal => OptimizationEffort::Optimal,
        }
    }
}

#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    /// Circuit to buffer.
    #[arg(value_enum, default_value = "adder")]
    circuit: Circuit,

    /// Operand width for arithmetic circuits, number of gates for random ones.
    #[arg(long, value_name = "INT", default_value = "8")]
    size: usize,

    /// Seed for random circuits.
    #[arg(long, value_name = "INT", default_value = "42")]
    seed: u64,

    /// Scheduling policy.
    #[arg(long, value_enum, default_value = "better")]
    scheduling: Policy,

    /// Optimization effort.
    #[arg(long, value_enum, default_value = "until-sat")]
    effort: Effort,

    /// Maximum number of consumers of a splitter.
    #[arg(long, value_name = "INT", default_value = "3")]
    splitter_capacity: u32,

    /// Clock period for phase alignment.
    #[arg(long, value_name = "INT", default_value = "1")]
    phases: u32,

    /// Branch and balance primary inputs.
    #[arg(long)]
    balance_pis: bool,

    /// Do not require outputs to arrive at the same level.
    #[arg(long)]
    unbalanced_pos: bool,

    /// SMT solver executable for the optimal effort.
    #[arg(long, value_name = "PATH", default_value = "z3")]
    solver: PathBuf,

    /// Write the buffered network in DOT format.
    #[arg(long, value_name = "FILE")]
    dot: Option<PathBuf>,
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let time_total = std::time::Instant::now();

    let args = Cli::parse();
    println!("args = {:?}", args);

    let ntk: Network = match args.circuit {
        Circuit::Adder => ripple_carry_adder(args.size),
        Circuit::Multiplier => array_multiplier(args.size),
        Circuit::Random => {
            let mut rng = ChaCha8Rng::seed_from_u64(args.seed);
            random_network(16, args.size, 8, |n| rng.random_range(0..n))
        }
    };
    println!(
        "Network with {} inputs, {} outputs and {} gates",
        ntk.num_pis(),
        ntk.num_pos(),
        ntk.num_gates()
    );

    let assume = AqfpAssumptions {
        branch_pis: args.balance_pis,
        balance_pis: args.balance_pis,
        balance_pos: !args.unbalanced_pos,
        splitter_capacity: args.splitter_capacity,
        num_phases: args.phases,
        ..AqfpAssumptions::default()
    };
    let params = BufferInsertionParams {
        assume: assume.clone(),
        scheduling: args.scheduling.into(),
        optimization_effort: args.effort.into(),
        solver: SolverConfig {
            program: args.solver.clone(),
            args: Vec::new(),
        },
        ..Default::default()
    };

    let mut engine = BufferInsertion::new(&ntk, params);
    let count = engine.dry_run()?;
    let mut buffered = Network::new();
    let levels = engine.dump_buffered_network(&mut buffered);

    println!("Depth: {}", engine.depth());
    println!("Buffers and splitters: {}", count);
    println!("stats = {:#?}", engine.stats());

    if !verify_buffered_network(&buffered, &assume, &levels) {
        bail!("Buffered network is not legal");
    }
    println!("Buffered network is legal");

    if let Some(path) = &args.dot {
        std::fs::write(path, to_dot(&buffered, Some(levels.as_slice()))?)?;
        println!("Wrote {}", path.display());
    }

    println!("All done in {:.3} s", time_total.elapsed().as_secs_f64());
    Ok(())
}
