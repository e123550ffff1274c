//! Grounding: weighted first-order clauses + evidence -> ground network.
//!
//! ```text
//! Mln ──► ClauseGrounder (one per clause, rayon) ──► CliqueRegistry ──► Mrf
//!              ▲                                          │
//!              └──────── atoms of interest ◄──────────────┘
//! ```
//!
//! The interest set starts as the unknown query atoms. Each round grounds the
//! clauses that mention a signature of interest into a fresh registry; atoms
//! of every retained ground clause join the interest set. The first round
//! that discovers no new atom is final and its registry becomes the network.

pub mod grounder;
pub mod identity;
pub mod odometer;
pub mod registry;

use std::collections::{BTreeSet, HashSet};
use std::time::{Duration, Instant};

use rayon::prelude::*;

use crate::kb::Mln;
use crate::logic::AtomSignature;
use crate::mrf::Mrf;

pub use grounder::{ClauseGrounder, GroundResult, GroundingOptions, GroundingStats};
pub use identity::{AtomId, AtomIdentity, ConstantsSet, IdentityMap};
pub use registry::{Clique, CliqueEntry, CliqueRegistry, ConstraintKey};

/// Default bound on interest-expansion rounds.
pub const DEFAULT_MAX_ROUNDS: usize = 64;

/// What a grounding run did.
#[derive(Debug, Clone, Default)]
pub struct GroundingSummary {
    pub rounds: usize,
    /// Counters of the final round.
    pub stats: GroundingStats,
    pub interest_atoms: usize,
    /// Whether the interest set was still growing when `max_rounds` was hit.
    pub truncated: bool,
    pub elapsed: Duration,
}

/// Grounding driver over an assembled [`Mln`].
#[derive(Debug, Clone)]
pub struct Grounding<'a> {
    mln: &'a Mln,
    options: GroundingOptions,
    partitions: usize,
    max_rounds: usize,
}

impl<'a> Grounding<'a> {
    pub fn new(mln: &'a Mln, options: GroundingOptions) -> Self {
        Self {
            mln,
            options,
            partitions: rayon::current_num_threads(),
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }

    /// Clique register partition count.
    pub fn partitions(mut self, partitions: usize) -> Self {
        self.partitions = partitions.max(1);
        self
    }

    pub fn max_rounds(mut self, rounds: usize) -> Self {
        self.max_rounds = rounds.max(1);
        self
    }

    /// Ground every relevant clause and assemble the network.
    pub fn run(&self) -> GroundResult<(Mrf, GroundingSummary)> {
        let start = Instant::now();
        let mln = self.mln;
        let grounders = (0..mln.clauses().len())
            .map(|i| ClauseGrounder::new(i, mln, self.options))
            .collect::<GroundResult<Vec<_>>>()?;

        let query_atoms = mln.unknown_query_atoms();
        let mut interest: HashSet<AtomId> = query_atoms.iter().copied().collect();
        let mut interest_sigs: BTreeSet<AtomSignature> = mln.query().clone();
        let mut summary = GroundingSummary::default();

        let registry = loop {
            summary.rounds += 1;
            let registry = CliqueRegistry::new(self.partitions);
            let relevant: Vec<&ClauseGrounder<'_>> = grounders
                .iter()
                .filter(|g| {
                    mln.clauses()[g.clause_index()]
                        .literals
                        .iter()
                        .any(|l| interest_sigs.contains(&l.atom.signature()))
                })
                .collect();

            let results: Vec<_> = relevant
                .par_iter()
                .map(|g| g.ground(&interest, &registry))
                .collect();

            let mut stats = GroundingStats::default();
            let mut discovered: HashSet<AtomId> = HashSet::new();
            for result in results {
                stats.merge(&result.stats);
                discovered.extend(result.atoms.into_iter().filter(|a| !interest.contains(a)));
            }
            summary.stats = stats;

            tracing::debug!(
                round = summary.rounds,
                clauses = relevant.len(),
                cliques = registry.len(),
                new_atoms = discovered.len(),
                "grounding round finished"
            );

            if discovered.is_empty() {
                break registry;
            }
            if summary.rounds >= self.max_rounds {
                tracing::warn!(
                    rounds = summary.rounds,
                    pending = discovered.len(),
                    "atoms of interest still growing at max_rounds; network may miss clauses around the newest atoms"
                );
                summary.truncated = true;
                interest.extend(discovered);
                break registry;
            }
            for &id in &discovered {
                if let Ok(identity) = mln.identities().owner(id) {
                    interest_sigs.insert(identity.signature().clone());
                }
            }
            interest.extend(discovered);
        };

        summary.interest_atoms = interest.len();
        let mrf = Mrf::assemble(
            registry.into_cliques(),
            query_atoms,
            mln.identities().query_range(),
        );
        summary.elapsed = start.elapsed();

        tracing::info!(
            rounds = summary.rounds,
            substitutions = summary.stats.substitutions,
            tautologies = summary.stats.tautologies,
            ground_clauses = mrf.constraint_count(),
            ground_atoms = mrf.atom_count(),
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "grounding complete"
        );
        Ok((mrf, summary))
    }
}
