//! Technology assumptions for AQFP circuits.
//!
//! In adiabatic quantum-flux-parametron logic every gate is clocked: a value
//! produced at level `l` can only be consumed at level `l + 1`, and a gate can
//! drive exactly one consumer. Longer wires are realized with buffers (one per
//! level), higher fan-out with splitters (a buffer with up to
//! `splitter_capacity` consumers). The assumptions below describe how strict
//! the target technology is at the circuit boundary.
//!
//! # Phases
//!
//! Inputs and outputs may be restricted to particular clock phases. With
//! `num_phases = 4` and `ci_phases = [0]`, an input may sit at level 0, 4, 8, …
//! and every output must arrive at a multiple of 4. When `balance_pis` is set,
//! inputs are further restricted to exactly the listed phases.

use crate::utils::align_up;

/// Immutable description of the target technology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AqfpAssumptions {
    /// Whether primary inputs need splitters to drive more than `ci_capacity` consumers.
    pub branch_pis: bool,
    /// Whether primary inputs must sit exactly on one of `ci_phases`.
    pub balance_pis: bool,
    /// Whether all primary outputs must arrive at the same level.
    pub balance_pos: bool,
    /// Maximum number of consumers of a splitter.
    pub splitter_capacity: u32,
    /// Number of consumers a primary input drives without splitters.
    pub ci_capacity: u32,
    /// Admissible phases of primary inputs.
    pub ci_phases: Vec<u32>,
    /// Clock period used for phase alignment.
    pub num_phases: u32,
}

impl Default for AqfpAssumptions {
    fn default() -> Self {
        Self {
            branch_pis: false,
            balance_pis: false,
            balance_pos: true,
            splitter_capacity: 3,
            ci_capacity: 1,
            ci_phases: vec![0],
            num_phases: 1,
        }
    }
}

impl AqfpAssumptions {
    /// Fully constrained boundary: inputs branched and balanced, outputs balanced.
    pub fn balanced(splitter_capacity: u32) -> Self {
        Self {
            branch_pis: true,
            balance_pis: true,
            balance_pos: true,
            splitter_capacity,
            ..Self::default()
        }
    }

    /// Checks the assumptions for consistency.
    ///
    /// # Panics
    ///
    /// Panics on a configuration that no schedule can satisfy.
    pub fn validate(&self) {
        assert!(self.num_phases > 0, "num_phases must be positive");
        assert!(!self.ci_phases.is_empty(), "ci_phases must not be empty");
        assert!(self.splitter_capacity >= 2, "splitter_capacity must be at least 2");
        assert!(self.ci_capacity >= 1, "ci_capacity must be at least 1");
        assert!(
            self.branch_pis || !self.balance_pis,
            "Balancing inputs requires branching inputs"
        );
    }

    /// Both sides of the circuit boundary are balanced.
    pub fn balance_cios(&self) -> bool {
        self.balance_pis && self.balance_pos
    }

    /// Earliest admissible input level.
    pub fn earliest_pi_level(&self) -> u32 {
        self.ci_phases.iter().copied().min().unwrap_or(0)
    }

    pub fn is_admissible_pi_level(&self, level: u32) -> bool {
        if self.balance_pis {
            self.ci_phases.contains(&level)
        } else {
            self.ci_phases
                .iter()
                .any(|&p| level >= p && (level - p) % self.num_phases == 0)
        }
    }

    /// Latest admissible input level not exceeding `bound`.
    pub fn latest_pi_level(&self, bound: u32) -> Option<u32> {
        if self.balance_pis {
            self.ci_phases.iter().copied().filter(|&p| p <= bound).max()
        } else {
            self.ci_phases
                .iter()
                .filter(|&&p| p <= bound)
                .map(|&p| p + (bound - p) / self.num_phases * self.num_phases)
                .max()
        }
    }

    /// Smallest output level (arrival level plus one) whose arrival is at
    /// least `arrival` and phase-aligned.
    pub fn output_level_at_least(&self, arrival: u32) -> u32 {
        align_up(arrival, self.num_phases) + 1
    }

    pub fn is_aligned_arrival(&self, arrival: u32) -> bool {
        arrival % self.num_phases == 0
    }

    /// Number of consumers a node can drive directly.
    pub fn own_capacity(&self, is_pi: bool) -> u32 {
        if is_pi {
            self.ci_capacity
        } else {
            1
        }
    }
}
