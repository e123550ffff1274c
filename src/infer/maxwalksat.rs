//! MaxWalkSAT local search.
//!
//! Each step picks a violated constraint uniformly at random, then flips one
//! of its atoms: a random one with probability `noise`, otherwise the one with
//! the lowest `delta` that is not tabu (a tabu atom is still taken when it
//! would beat the best cost seen). Atoms that would break a hard constraint
//! are only eligible while repairing a violated hard constraint.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::config::{InitialState, MaxWalkSatConfig};
use crate::mrf::{Mrf, MrfState};

use super::{InferResult, InferenceStats, MapInference, MapResult};

const COST_EPS: f64 = 1e-9;

/// Outcome of [`MaxWalkSat::search`] on one chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchOutcome {
    pub cost: f64,
    pub flips: u64,
    pub tries: u32,
}

#[derive(Debug, Clone, Default)]
pub struct MaxWalkSat {
    config: MaxWalkSatConfig,
}

impl MaxWalkSat {
    pub fn new(config: MaxWalkSatConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MaxWalkSatConfig {
        &self.config
    }

    /// Run `chains` independent chains and keep the lowest-cost result.
    pub fn run(&self, mrf: &Mrf) -> MapResult {
        let chains = self.config.chains.max(1);
        let best = (0..chains)
            .into_par_iter()
            .map(|chain| {
                let mut rng = StdRng::seed_from_u64(self.config.seed.wrapping_add(chain as u64));
                let mut state = MrfState::new(mrf);
                self.initialize(&mut state, &mut rng);
                let outcome = self.search(&mut state, &mut rng);
                tracing::debug!(chain, cost = outcome.cost, flips = outcome.flips, "chain finished");
                (chain, outcome, state.state().to_vec(), state.hard_violations())
            })
            .min_by(|a, b| a.1.cost.total_cmp(&b.1.cost).then(a.0.cmp(&b.0)));

        match best {
            Some((_, outcome, assignment, hard_violations)) => MapResult {
                assignment,
                cost: outcome.cost,
                hard_violations,
                stats: InferenceStats {
                    flips: outcome.flips,
                    tries: outcome.tries,
                    ..Default::default()
                },
            },
            None => MapResult {
                assignment: vec![false; mrf.atom_count()],
                cost: 0.0,
                hard_violations: 0,
                stats: InferenceStats::default(),
            },
        }
    }

    /// Set free atoms according to the configured initial state.
    pub fn initialize(&self, state: &mut MrfState<'_>, rng: &mut StdRng) {
        match self.config.init {
            InitialState::AllFalse => {
                let falses = vec![false; state.mrf().atom_count()];
                state.assign(&falses);
            }
            InitialState::Random => state.randomize(rng),
        }
    }

    /// Search from the current state of `state`; later tries re-initialise.
    /// On return `state` holds the best assignment found.
    pub fn search(&self, state: &mut MrfState<'_>, rng: &mut StdRng) -> SearchOutcome {
        let mut flips = 0u64;
        let mut tries = 0u32;
        state.save_low();

        for attempt in 0..self.config.max_tries.max(1) {
            tries += 1;
            if attempt > 0 {
                self.initialize(state, rng);
                if state.cost() < state.low_cost() {
                    state.save_low();
                }
            }
            let best_before = state.low_cost();

            for _ in 0..self.config.max_flips {
                if state.cost() <= self.config.target_cost + COST_EPS {
                    break;
                }
                let Some(atom) = self.pick(state, rng) else {
                    continue;
                };
                state.flip(atom);
                flips += 1;
                if state.cost() < state.low_cost() - COST_EPS {
                    state.save_low();
                }
            }

            tracing::trace!(
                attempt,
                cost = state.low_cost(),
                improved = state.low_cost() < best_before,
                "maxwalksat try finished"
            );
            if state.low_cost() <= self.config.target_cost + COST_EPS {
                break;
            }
        }

        state.restore_low();
        SearchOutcome {
            cost: state.cost(),
            flips,
            tries,
        }
    }

    /// Choose the atom to flip for a random violated constraint.
    fn pick(&self, state: &MrfState<'_>, rng: &mut StdRng) -> Option<u32> {
        let violated = state.violated();
        let ci = *violated.choose(rng)?;
        let mrf = state.mrf();
        let c = mrf.constraint(ci);

        // A positive constraint is fixed by any literal turning true; a negative
        // one only by its currently true literals turning false.
        let candidates: Vec<u32> = c
            .lits
            .iter()
            .filter(|l| c.is_positive() || state.value(l.atom) == l.positive)
            .map(|l| l.atom)
            .filter(|&a| !state.is_fixed(a) && (c.hard || !state.is_critical(a)))
            .collect();
        if candidates.is_empty() {
            return None;
        }

        if rng.gen_bool(self.config.noise.clamp(0.0, 1.0)) {
            return candidates.choose(rng).copied();
        }

        let now = state.flips();
        let tabu = |a: u32| {
            self.config.tabu_length > 0
                && state.last_flip(a) > 0
                && now - state.last_flip(a) < self.config.tabu_length
        };
        let aspires = |a: u32| state.cost() + state.delta(a) < state.low_cost() - COST_EPS;

        let allowed: Vec<u32> = candidates
            .iter()
            .copied()
            .filter(|&a| !tabu(a) || aspires(a))
            .collect();
        let pool = if allowed.is_empty() { &candidates } else { &allowed };

        let best = pool
            .iter()
            .map(|&a| state.delta(a))
            .fold(f64::INFINITY, f64::min);
        let ties: Vec<u32> = pool
            .iter()
            .copied()
            .filter(|&a| state.delta(a) <= best + COST_EPS)
            .collect();
        ties.choose(rng).copied()
    }
}

impl MapInference for MaxWalkSat {
    fn name(&self) -> &str {
        "maxwalksat"
    }

    fn infer(&self, mrf: &Mrf) -> InferResult<MapResult> {
        Ok(self.run(mrf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ground::registry::{CliqueEntry, CliqueRegistry};

    fn mrf_of(entries: Vec<CliqueEntry>) -> Mrf {
        let registry = CliqueRegistry::new(2);
        for e in entries {
            registry.register(e);
        }
        Mrf::assemble(registry.into_cliques(), [], None)
    }

    fn exhaustive_best(mrf: &Mrf) -> f64 {
        let n = mrf.atom_count();
        (0u32..1 << n)
            .map(|bits| {
                let assignment: Vec<bool> = (0..n).map(|i| bits & (1 << i) != 0).collect();
                mrf.evaluate(&assignment)
            })
            .fold(f64::INFINITY, f64::min)
    }

    fn small_theory() -> Mrf {
        mrf_of(vec![
            CliqueEntry::new(vec![1, 2], 1.0, 0, 1),
            CliqueEntry::new(vec![-1, 3], 2.0, 1, 1),
            CliqueEntry::new(vec![-2, -3], 1.5, 2, 1),
            CliqueEntry::new(vec![3], -0.5, 3, 1),
            CliqueEntry::new(vec![-1, -2], f64::INFINITY, 4, 1),
            CliqueEntry::new(vec![4, -1], 0.3, 5, 1),
        ])
    }

    #[test]
    fn finds_optimum_on_small_theory() {
        let mrf = small_theory();
        let config = MaxWalkSatConfig {
            max_flips: 2_000,
            max_tries: 3,
            chains: 2,
            init: InitialState::Random,
            ..Default::default()
        };
        let result = MaxWalkSat::new(config).run(&mrf);
        assert!((result.cost - exhaustive_best(&mrf)).abs() < 1e-9);
        assert_eq!(result.hard_violations, 0);
        assert!((mrf.evaluate(&result.assignment) - result.cost).abs() < 1e-9);
    }

    #[test]
    fn same_seed_same_result() {
        let mrf = small_theory();
        let config = MaxWalkSatConfig {
            max_flips: 50,
            chains: 3,
            init: InitialState::Random,
            ..Default::default()
        };
        let a = MaxWalkSat::new(config.clone()).run(&mrf);
        let b = MaxWalkSat::new(config).run(&mrf);
        assert_eq!(a.assignment, b.assignment);
        assert_eq!(a.stats.flips, b.stats.flips);
    }

    #[test]
    fn fixed_atoms_never_flip() {
        let mrf = mrf_of(vec![
            CliqueEntry::new(vec![1], 5.0, 0, 1),
            CliqueEntry::new(vec![-1, 2], 1.0, 1, 1),
        ]);
        let a1 = mrf.index_of(1).unwrap();
        let mut state = MrfState::new(&mrf);
        state.fix(a1, false);
        let mut rng = StdRng::seed_from_u64(1);
        MaxWalkSat::new(MaxWalkSatConfig::default()).search(&mut state, &mut rng);
        assert!(!state.value(a1));
        assert!((state.cost() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn empty_network_costs_nothing() {
        let mrf = Mrf::assemble(Vec::new(), [7, 8], None);
        let result = MaxWalkSat::default().run(&mrf);
        assert_eq!(result.assignment, vec![false, false]);
        assert_eq!(result.cost, 0.0);
    }
}
