//! Optimal scheduling through an external SMT solver.
//!
//! The scheduling problem is written as an integer program in SMT-LIB 2
//! (`QF_LIA` with an objective): one level variable per movable node, and for
//! every fan-out tree one edge counter and one splitter counter per relative
//! depth. Splitters at depth `r` are `⌈e(r+1) / S⌉`, encoded as
//! `S·(b − 1) < e ≤ S·b`. The objective is the total number of splitters,
//! bounded above by the current count.
//!
//! The solver runs as a separate process behind [`SolverBackend`]; its answer
//! is parsed back into levels and checked before it replaces the current
//! schedule.

use std::fmt::{self, Write as _};
use std::io::Write as _;
use std::path::PathBuf;
use std::process::{Command, ExitStatus};

use log::{debug, info, warn};
use thiserror::Error;

use crate::buffer_insertion::{fill_ledger, BufferInsertion, SolverConfig};
use crate::network::LogicNetwork;
use crate::types::{Consumer, Node};

/// Levels the solver may add on top of the current depth.
const DEPTH_SLACK: u32 = 3;

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("solver executable {program:?} not found")]
    NotFound { program: PathBuf },

    #[error("failed to run solver: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to write model: {0}")]
    Format(#[from] fmt::Error),

    #[error("solver exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },

    #[error("solver found no schedule: {0}")]
    Unsatisfiable(String),

    #[error("malformed solver output: {line}")]
    MalformedOutput { line: String },

    #[error("solver returned an illegal level assignment")]
    IllegalAssignment,
}

/// Something that can solve an SMT-LIB model and return the raw answer.
pub trait SolverBackend {
    fn solve(&self, model: &str) -> Result<String, SolverError>;
}

/// Runs an external solver on a temporary model file.
#[derive(Debug, Clone)]
pub struct Z3Process {
    config: SolverConfig,
}

impl Z3Process {
    pub fn new(config: &SolverConfig) -> Self {
        Self { config: config.clone() }
    }
}

impl SolverBackend for Z3Process {
    fn solve(&self, model: &str) -> Result<String, SolverError> {
        let mut file = tempfile::Builder::new().prefix("aqfp").suffix(".smt2").tempfile()?;
        file.write_all(model.as_bytes())?;
        file.flush()?;

        debug!("Running {:?} on {}", self.config.program, file.path().display());
        let output = Command::new(&self.config.program)
            .args(&self.config.args)
            .arg(file.path())
            .output()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => SolverError::NotFound {
                    program: self.config.program.clone(),
                },
                _ => SolverError::Io(e),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        // Solvers report unsat with a failing `get-value` and a non-zero status.
        let answered = stdout
            .lines()
            .find(|line| !line.trim().is_empty())
            .is_some_and(|line| matches!(line.trim(), "sat" | "unsat" | "unknown"));
        if output.status.success() || answered {
            Ok(stdout)
        } else {
            Err(SolverError::Failed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
    }
}

/// Parsed answer of the solver.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SolverSolution {
    pub total: u32,
    pub depth: u32,
    pub levels: Vec<(Node, u32)>,
    pub output_levels: Vec<(usize, u32)>,
}

/// Parses `sat` followed by `(name value)` pairs.
pub fn parse_solution(text: &str) -> Result<SolverSolution, SolverError> {
    let mut lines = text.lines().skip_while(|line| line.trim().is_empty());
    match lines.next().map(str::trim) {
        Some("sat") => {}
        Some(other) => return Err(SolverError::Unsatisfiable(other.to_string())),
        None => return Err(SolverError::Unsatisfiable("empty answer".to_string())),
    }

    let mut solution = SolverSolution::default();
    for line in lines {
        let cleaned = line.replace(['(', ')'], " ");
        let tokens: Vec<&str> = cleaned.split_whitespace().collect();
        if tokens.len() % 2 != 0 {
            return Err(SolverError::MalformedOutput { line: line.to_string() });
        }
        for pair in tokens.chunks(2) {
            let malformed = || SolverError::MalformedOutput { line: line.to_string() };
            let value: u32 = pair[1].parse().map_err(|_| malformed())?;
            let name = pair[0];
            if name == "total" {
                solution.total = value;
            } else if name == "depth" {
                solution.depth = value;
            } else if let Some(id) = name.strip_prefix('l') {
                let id: u32 = id.parse().map_err(|_| malformed())?;
                solution.levels.push((Node::new(id), value));
            } else if let Some(index) = name.strip_prefix('o') {
                let index: usize = index.parse().map_err(|_| malformed())?;
                solution.output_levels.push((index, value));
            } else {
                return Err(malformed());
            }
        }
    }
    Ok(solution)
}

impl<N: LogicNetwork> BufferInsertion<'_, N> {
    /// Whether the solver decides the level of `node`.
    fn is_variable(&self, node: Node) -> bool {
        self.ntk.is_gate(node) || (self.ntk.is_pi(node) && self.has_tree(node))
    }

    fn level_term(&self, node: Node) -> String {
        if self.is_variable(node) {
            format!("l{}", node.id())
        } else {
            self.level(node).to_string()
        }
    }

    fn consumer_term(&self, consumer: Consumer) -> String {
        match consumer {
            Consumer::Node(n) => self.level_term(n),
            Consumer::Output(_) if self.params.assume.balance_pos => "(+ depth 1)".to_string(),
            Consumer::Output(i) => format!("o{}", i),
        }
    }

    /// Writes the scheduling problem as an SMT-LIB 2 model.
    pub fn encode_model(&mut self) -> Result<String, SolverError> {
        if self.outdated {
            self.count_buffers();
        }
        let ntk = self.ntk;
        let assume = &self.params.assume;
        let np = assume.num_phases;
        let s = assume.splitter_capacity;
        let max_depth = self.depth() + DEPTH_SLACK;
        let upper_bound = self.num_buffers();
        let consumers = crate::network::consumer_lists(ntk);

        let mut m = String::new();
        writeln!(m, "(set-logic QF_LIA)")?;
        writeln!(m, "(declare-const depth Int)")?;
        writeln!(m, "(assert (<= depth {}))", max_depth)?;
        writeln!(m, "(assert (= (mod depth {}) 0))", np)?;

        let mut values = vec!["total".to_string(), "depth".to_string()];
        for &n in ntk.pis().iter().chain(ntk.gates()) {
            if !self.is_variable(n) {
                continue;
            }
            let l = format!("l{}", n.id());
            writeln!(m, "(declare-const {} Int)", l)?;
            writeln!(m, "(assert (<= {} {}))", l, max_depth)?;
            if ntk.is_pi(n) {
                let phases: Vec<String> = assume
                    .ci_phases
                    .iter()
                    .map(|&p| {
                        if assume.balance_pis {
                            format!("(= {} {})", l, p)
                        } else {
                            format!("(and (>= {l} {p}) (= (mod (- {l} {p}) {np}) 0))")
                        }
                    })
                    .collect();
                writeln!(m, "(assert (or {}))", phases.join(" "))?;
            } else {
                writeln!(m, "(assert (>= {} 1))", l)?;
            }
            values.push(l);
        }

        for (i, po) in ntk.outputs().iter().enumerate() {
            if assume.balance_pos || ntk.is_constant(po.node()) {
                continue;
            }
            let o = format!("o{}", i);
            writeln!(m, "(declare-const {} Int)", o)?;
            writeln!(m, "(assert (<= {} (+ depth 1)))", o)?;
            writeln!(m, "(assert (= (mod (- {} 1) {}) 0))", o, np)?;
            writeln!(m, "(assert (> {} {}))", o, self.level_term(po.node()))?;
            values.push(o);
        }

        // Consumers of nodes without a tree only need to sit later.
        for &g in ntk.gates() {
            for fi in ntk.fanins(g) {
                let n = fi.node();
                if !ntk.is_constant(n) && !self.has_tree(n) {
                    writeln!(m, "(assert (> l{} {}))", g.id(), self.level_term(n))?;
                }
            }
        }

        let mut totals = Vec::new();
        for &n in ntk.pis().iter().chain(ntk.gates()) {
            if !self.has_tree(n) || consumers[n.index()].is_empty() {
                continue;
            }
            let ln = self.level_term(n);
            let lowest = if ntk.is_pi(n) { assume.earliest_pi_level() } else { 1 };
            let max_rd = max_depth + 1 - lowest;
            let targets: Vec<String> = consumers[n.index()].iter().map(|&c| self.consumer_term(c)).collect();

            writeln!(m, "; fan-out tree of {}", n)?;
            for t in &targets {
                writeln!(m, "(assert (>= (- {} {}) 1))", t, ln)?;
            }
            let mut splitters = Vec::new();
            for rd in (1..=max_rd).rev() {
                let e = format!("e{}_{}", n.id(), rd);
                let here: Vec<String> = targets
                    .iter()
                    .map(|t| format!("(ite (= (- {} {}) {}) 1 0)", t, ln, rd))
                    .collect();
                writeln!(m, "(declare-const {} Int)", e)?;
                if rd == max_rd {
                    writeln!(m, "(assert (= {} (+ 0 {})))", e, here.join(" "))?;
                } else {
                    let b = format!("b{}_{}", n.id(), rd);
                    let above = format!("e{}_{}", n.id(), rd + 1);
                    writeln!(m, "(declare-const {} Int)", b)?;
                    writeln!(m, "(assert (>= {} 0))", b)?;
                    writeln!(m, "(assert (< (* {} (- {} 1)) {}))", s, b, above)?;
                    writeln!(m, "(assert (<= {} (* {} {})))", above, s, b)?;
                    writeln!(m, "(assert (= {} (+ {} {})))", e, b, here.join(" "))?;
                    splitters.push(b);
                }
            }
            writeln!(m, "(assert (<= e{}_1 {}))", n.id(), self.capacity(n))?;

            let total = format!("bufs{}", n.id());
            writeln!(m, "(declare-const {} Int)", total)?;
            writeln!(m, "(assert (= {} (+ 0 {})))", total, splitters.join(" "))?;
            totals.push(total);
        }

        writeln!(m, "(declare-const total Int)")?;
        writeln!(m, "(assert (= total (+ 0 {})))", totals.join(" "))?;
        writeln!(m, "(assert (<= total {}))", upper_bound)?;
        writeln!(m, "(minimize total)")?;
        writeln!(m, "(check-sat)")?;
        writeln!(m, "(get-value ({}))", values.join(" "))?;
        writeln!(m, "(exit)")?;
        Ok(m)
    }

    /// Replaces the schedule with the solver's, if it is legal and cheaper.
    ///
    /// Returns whether the buffer count went down. On any error the schedule
    /// is left as it was.
    pub fn optimize_with_solver(&mut self, backend: &dyn SolverBackend) -> Result<bool, SolverError> {
        let model = self.encode_model()?;
        let before = self.num_buffers();
        let answer = backend.solve(&model)?;
        let solution = parse_solution(&answer)?;
        info!("Solver reports {} buffers at depth {}", solution.total, solution.depth);

        let saved = self.levels.clone();
        self.apply_solution(&solution);
        let legal = fill_ledger(self.ntk, &self.params.assume, &self.levels, &mut self.ledger) && self.check_levels();
        self.outdated = true;
        if !legal {
            self.levels = saved;
            self.count_buffers();
            return Err(SolverError::IllegalAssignment);
        }

        self.count_buffers();
        let after = self.num_buffers();
        if after > before {
            warn!("Solver schedule needs {} buffers, keeping {}", after, before);
            self.levels = saved;
            self.outdated = true;
            self.count_buffers();
            return Ok(false);
        }
        Ok(after < before)
    }

    fn apply_solution(&mut self, solution: &SolverSolution) {
        let ntk = self.ntk;
        self.levels.set_depth(solution.depth);
        for &(node, level) in &solution.levels {
            if node.index() < ntk.size() {
                self.levels.set_level(node, level);
            }
        }
        if self.params.assume.balance_pos {
            self.levels.balance_outputs();
            return;
        }
        for &(index, level) in &solution.output_levels {
            if index < ntk.num_pos() {
                self.levels.set_output_level(index, level);
            }
        }
        let depth = ntk
            .outputs()
            .iter()
            .enumerate()
            .filter(|(_, po)| !ntk.is_constant(po.node()))
            .map(|(i, _)| self.levels.output_level(i).saturating_sub(1))
            .max()
            .unwrap_or(0);
        self.levels.set_depth(depth);
        for (i, po) in ntk.outputs().iter().enumerate() {
            if ntk.is_constant(po.node()) {
                self.levels.set_output_level(i, depth + 1);
            }
        }
    }
}
