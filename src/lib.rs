//! # aqfp-rs: Buffer and Splitter Insertion for AQFP Circuits
//!
//! **`aqfp-rs`** turns a Boolean logic network into one that can be realized in
//! **adiabatic quantum-flux-parametron (AQFP)** technology.
//!
//! ## What is AQFP?
//!
//! AQFP is a superconducting logic family in which every gate is clocked.
//! A signal produced at level `l` can only be read at level `l + 1`, so every
//! path between two gates must be padded with buffers until it is exactly one
//! level long. On top of that, a gate drives a single consumer: higher fan-out
//! requires splitters, which are buffers with several outputs.
//! The cost of a circuit is dominated by these buffers and splitters, and the
//! number required depends entirely on the level assigned to every gate.
//!
//! ## Key Features
//!
//! - **Level Scheduling**: ASAP, ALAP and depth-optimal schedules, with clock-phase alignment at the circuit boundary ([`schedule`]).
//! - **Exact Counting**: Fan-out trees are derived per node and counted incrementally ([`ledger`]).
//! - **Schedule Optimization**: Chunk movement heuristics and an optional external SMT solver ([`solver`]).
//! - **Materialization**: Writes a network with explicit buffers that can be checked by [`verify`].
//! - **Reconstruction**: Replaces the buffer trees of an already buffered network ([`reconstruct`]).
//! - **Network Agnostic**: The engine works over the [`LogicNetwork`][crate::network::LogicNetwork] trait.
//!
//! ## Basic Usage
//!
//! ```rust
//! use aqfp_rs::assumptions::AqfpAssumptions;
//! use aqfp_rs::buffer_insertion::{BufferInsertion, BufferInsertionParams, OptimizationEffort, Scheduling};
//! use aqfp_rs::network::{LogicNetwork, Network};
//! use aqfp_rs::verify::verify_buffered_network;
//!
//! // 1. Build a network
//! let mut ntk = Network::new();
//! let a = ntk.add_input();
//! let b = ntk.add_input();
//! let c = ntk.add_input();
//! let f = ntk.add_maj(a, b, c);
//! let g = ntk.add_and(f, !c);
//! ntk.add_output(g);
//! ntk.add_output(f);
//!
//! // 2. Configure the technology and the effort
//! let params = BufferInsertionParams {
//!     assume: AqfpAssumptions::default(),
//!     scheduling: Scheduling::Better,
//!     optimization_effort: OptimizationEffort::UntilSat,
//!     ..Default::default()
//! };
//!
//! // 3. Insert buffers
//! let mut engine = BufferInsertion::new(&ntk, params.clone());
//! let mut buffered = Network::new();
//! let count = engine.run(&mut buffered).unwrap();
//! assert_eq!(count as usize, buffered.num_buffers());
//!
//! // 4. Check the result
//! let levels = engine.dump_buffered_network(&mut Network::new());
//! assert!(verify_buffered_network(&buffered, &params.assume, &levels));
//! ```
//!
//! ## Core Components
//!
//! - **[`buffer_insertion`]**: The [`BufferInsertion`][crate::buffer_insertion::BufferInsertion] engine and its parameters.
//! - **[`network`]**: The network traits and a simple in-memory network.
//! - **[`dot`]**: Visualization of (buffered) networks using Graphviz.

pub mod assumptions;
pub mod buffer_insertion;
mod chunk;
pub mod dot;
pub mod gate;
pub mod generators;
pub mod ledger;
pub mod levels;
mod materialize;
pub mod network;
pub mod reconstruct;
pub mod schedule;
pub mod signal;
pub mod solver;
pub mod types;
pub mod utils;
pub mod verify;
