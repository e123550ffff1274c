//! LP-relaxation MAP inference.
//!
//! Translation, per constraint (`t(l)` is `x` for a positive literal and
//! `1 - x` for a negative one):
//!
//! | constraint            | objective      | rows                         |
//! |-----------------------|----------------|------------------------------|
//! | hard                  |                | `Σ t(l) >= 1`                |
//! | soft unit, weight `w` | `w · t(l)`     |                              |
//! | soft, `w > 0`         | `w · aux`      | `Σ t(l) >= aux`              |
//! | soft, `w < 0`         | `|w| · aux`    | `aux <= 1 - t(l)` per literal|
//!
//! For `w < 0` the auxiliary variable can only reach 1 when every literal is
//! false, i.e. when the penalised clause does not hold.
//!
//! The solved relaxation is rounded: values past the integrality tolerance
//! are fixed, the rest are decided by RoundUp (reverse discovery order, each
//! atom set TRUE iff that lowers cost, then fixed) or by local search over the
//! fractional atoms only.

use std::collections::HashMap;
use std::time::Instant;

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::config::{IlpConfig, MaxWalkSatConfig, Rounding};
use crate::error::InferError;
use crate::ground::AtomId;
use crate::lp::{BoundedSimplex, LinearProgram, LpSolver, LpStatus, Relation, VarId};
use crate::mrf::{Mrf, MrfState};

use super::maxwalksat::MaxWalkSat;
use super::{InferResult, InferenceStats, MapInference, MapResult};

/// Linear program built from a network.
#[derive(Debug, Clone)]
pub struct Translation {
    pub program: LinearProgram,
    /// LP variable of each dense atom (`None`: the atom is in no constraint).
    pub atom_vars: Vec<Option<VarId>>,
    /// Dense atoms in the order their variables were created.
    pub discovery: Vec<u32>,
}

pub struct IlpInference {
    config: IlpConfig,
    local_search: MaxWalkSatConfig,
    solver: Box<dyn LpSolver>,
    annotation: Option<HashMap<AtomId, bool>>,
}

impl IlpInference {
    pub fn new(config: IlpConfig, local_search: MaxWalkSatConfig) -> Self {
        let solver = Box::new(BoundedSimplex::new(config.max_pivots));
        Self {
            config,
            local_search,
            solver,
            annotation: None,
        }
    }

    /// Swap the LP backend.
    pub fn with_solver(mut self, solver: Box<dyn LpSolver>) -> Self {
        self.solver = solver;
        self
    }

    /// Gold values for loss-augmented inference; unlisted atoms count as FALSE.
    pub fn with_annotation(mut self, annotation: HashMap<AtomId, bool>) -> Self {
        self.annotation = Some(annotation);
        self
    }

    pub fn translate(&self, mrf: &Mrf) -> Translation {
        let mut program = LinearProgram::new();
        let mut atom_vars: Vec<Option<VarId>> = vec![None; mrf.atom_count()];
        let mut discovery = Vec::new();

        for (ci, c) in mrf.constraints().iter().enumerate() {
            // Σ t(l) = Σ coef·x + constant
            let mut terms = Vec::with_capacity(c.lits.len());
            let mut negatives = 0.0;
            for l in &c.lits {
                let var = *atom_vars[l.atom as usize].get_or_insert_with(|| {
                    discovery.push(l.atom);
                    program.add_unit_variable(format!("atom:{}", mrf.atom(l.atom).id))
                });
                if l.positive {
                    terms.push((var, 1.0));
                } else {
                    terms.push((var, -1.0));
                    negatives += 1.0;
                }
            }

            if c.hard {
                program.add_constraint(terms, Relation::GreaterEq, 1.0 - negatives);
            } else if c.is_unit() {
                let (var, coef) = terms[0];
                program.add_objective(var, c.weight * coef);
                if coef < 0.0 {
                    program.add_offset(c.weight);
                }
            } else if c.weight > 0.0 {
                let aux = program.add_unit_variable(format!("clause:{ci}"));
                program.add_objective(aux, c.weight);
                let mut row = terms;
                row.push((aux, -1.0));
                program.add_constraint(row, Relation::GreaterEq, -negatives);
            } else {
                let aux = program.add_unit_variable(format!("clause:{ci}"));
                program.add_objective(aux, -c.weight);
                // aux + t(l) <= 1
                for (var, coef) in terms {
                    let rhs = if coef < 0.0 { 0.0 } else { 1.0 };
                    program.add_constraint(vec![(aux, 1.0), (var, coef)], Relation::LessEq, rhs);
                }
            }
        }

        if self.config.loss_augmented {
            match &self.annotation {
                Some(gold) => {
                    for (atom, var) in atom_vars.iter().enumerate() {
                        let Some(var) = *var else { continue };
                        let id = mrf.atom(atom as u32).id;
                        if gold.get(&id).copied().unwrap_or(false) {
                            program.add_offset(1.0);
                            program.add_objective(var, -1.0);
                        } else {
                            program.add_objective(var, 1.0);
                        }
                    }
                }
                None => tracing::warn!("loss-augmented inference requested without annotation"),
            }
        }

        Translation {
            program,
            atom_vars,
            discovery,
        }
    }

    fn round(
        &self,
        mrf: &Mrf,
        translation: &Translation,
        values: &[f64],
        stats: &mut InferenceStats,
    ) -> (Vec<bool>, f64, usize) {
        let tol = self.config.integrality_tolerance;
        let mut state = MrfState::new(mrf);
        let mut fractional = Vec::new();
        for &atom in &translation.discovery {
            let Some(var) = translation.atom_vars[atom as usize] else {
                continue;
            };
            let v = values[var.0];
            if v > 1.0 - tol {
                state.fix(atom, true);
            } else if v < tol {
                state.fix(atom, false);
            } else {
                fractional.push((atom, v));
            }
        }
        stats.non_integral = fractional.len();
        tracing::debug!(non_integral = fractional.len(), "relaxation extracted");

        match self.config.rounding {
            Rounding::RoundUp => {
                for &(atom, _) in fractional.iter().rev() {
                    let value = state.delta(atom) < 0.0;
                    state.fix(atom, value);
                }
            }
            Rounding::LocalSearch => {
                for &(atom, v) in &fractional {
                    if v >= 0.5 {
                        state.flip(atom);
                    }
                }
                if !fractional.is_empty() {
                    let mut rng = StdRng::seed_from_u64(self.local_search.seed);
                    let outcome =
                        MaxWalkSat::new(self.local_search.clone()).search(&mut state, &mut rng);
                    stats.flips = outcome.flips;
                    stats.tries = outcome.tries;
                }
            }
        }
        (state.state().to_vec(), state.cost(), state.hard_violations())
    }
}

impl MapInference for IlpInference {
    fn name(&self) -> &str {
        "ilp"
    }

    fn infer(&self, mrf: &Mrf) -> InferResult<MapResult> {
        let mut stats = InferenceStats::default();

        let t0 = Instant::now();
        let translation = self.translate(mrf);
        stats.translation = t0.elapsed();
        tracing::info!(
            variables = translation.program.variable_count(),
            rows = translation.program.constraint_count(),
            solver = self.solver.name(),
            "LP relaxation built"
        );

        let t1 = Instant::now();
        let solution = self.solver.solve(&translation.program)?;
        stats.solve = t1.elapsed();
        if solution.status != LpStatus::Optimal {
            return Err(InferError::NonOptimal {
                status: solution.status.to_string(),
            });
        }
        if solution.values.len() != translation.program.variable_count() {
            return Err(InferError::Solver {
                message: format!(
                    "solver returned {} values for {} variables",
                    solution.values.len(),
                    translation.program.variable_count()
                ),
            });
        }
        stats.lp_objective = Some(solution.objective);

        let t2 = Instant::now();
        let (assignment, cost, hard_violations) =
            self.round(mrf, &translation, &solution.values, &mut stats);
        stats.rounding = t2.elapsed();

        if hard_violations > 0 {
            tracing::warn!(hard_violations, "rounded assignment violates hard constraints");
        }
        tracing::info!(
            objective = solution.objective,
            cost,
            non_integral = stats.non_integral,
            translation_ms = stats.translation.as_millis() as u64,
            solve_ms = stats.solve.as_millis() as u64,
            rounding_ms = stats.rounding.as_millis() as u64,
            "ILP inference finished"
        );

        Ok(MapResult {
            assignment,
            cost,
            hard_violations,
            stats,
        })
    }
}
