//! MAP inference over a ground [`Mrf`].
//!
//! Two engines share one result type:
//!
//! - [`maxwalksat::MaxWalkSat`]: stochastic local search on make/break costs,
//!   independent chains in parallel.
//! - [`ilp::IlpInference`]: LP relaxation solved by an [`LpSolver`](crate::lp::LpSolver),
//!   then rounded.

pub mod ilp;
pub mod maxwalksat;

use std::time::Duration;

use crate::error::InferError;
use crate::ground::AtomId;
use crate::mrf::Mrf;

pub use ilp::IlpInference;
pub use maxwalksat::MaxWalkSat;

/// Result type for inference.
pub type InferResult<T> = std::result::Result<T, InferError>;

/// Counters and phase timings of one inference run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InferenceStats {
    pub flips: u64,
    pub tries: u32,
    /// Atoms whose relaxed value was neither near 0 nor near 1.
    pub non_integral: usize,
    /// Relaxation optimum, when an LP was solved.
    pub lp_objective: Option<f64>,
    pub translation: Duration,
    pub solve: Duration,
    pub rounding: Duration,
}

/// Best assignment found, over the network's dense atom indices.
#[derive(Debug, Clone, PartialEq)]
pub struct MapResult {
    pub assignment: Vec<bool>,
    pub cost: f64,
    pub hard_violations: usize,
    pub stats: InferenceStats,
}

impl MapResult {
    /// Truth value of a ground atom id, if the atom is in the network.
    pub fn value_of(&self, mrf: &Mrf, id: AtomId) -> Option<bool> {
        mrf.index_of(id).map(|idx| self.assignment[idx as usize])
    }
}

/// A MAP inference engine.
pub trait MapInference {
    fn name(&self) -> &str;

    fn infer(&self, mrf: &Mrf) -> InferResult<MapResult>;
}
