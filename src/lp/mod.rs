//! Linear programs over box-bounded variables, and the solver seam.
//!
//! [`LinearProgram`] is a maximisation problem whose variables all live in
//! `[0, upper]`. Backends implement [`LpSolver`]; the default is the in-process
//! [`simplex::BoundedSimplex`].

pub mod simplex;

use std::fmt;

use crate::error::InferError;

pub use simplex::BoundedSimplex;

/// Index of a variable in a [`LinearProgram`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub usize);

/// Relation of a linear row to its right-hand side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    LessEq,
    GreaterEq,
    Equal,
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Relation::LessEq => "<=",
            Relation::GreaterEq => ">=",
            Relation::Equal => "=",
        })
    }
}

/// `Σ coef·var  (<= | >= | =)  rhs`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearConstraint {
    pub terms: Vec<(VarId, f64)>,
    pub relation: Relation,
    pub rhs: f64,
}

/// Maximise `offset + Σ objective[j]·x_j` subject to the rows and `0 <= x_j <= upper[j]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearProgram {
    names: Vec<String>,
    upper: Vec<f64>,
    objective: Vec<f64>,
    offset: f64,
    constraints: Vec<LinearConstraint>,
}

impl LinearProgram {
    pub fn new() -> Self {
        Self::default()
    }

    /// New variable in `[0, 1]` with a zero objective coefficient.
    pub fn add_unit_variable(&mut self, name: impl Into<String>) -> VarId {
        self.add_variable(name, 1.0)
    }

    pub fn add_variable(&mut self, name: impl Into<String>, upper: f64) -> VarId {
        self.names.push(name.into());
        self.upper.push(upper);
        self.objective.push(0.0);
        VarId(self.names.len() - 1)
    }

    /// Add `coef·var` to the objective.
    pub fn add_objective(&mut self, var: VarId, coef: f64) {
        self.objective[var.0] += coef;
    }

    /// Add a constant to the objective.
    pub fn add_offset(&mut self, value: f64) {
        self.offset += value;
    }

    pub fn add_constraint(&mut self, terms: Vec<(VarId, f64)>, relation: Relation, rhs: f64) {
        self.constraints.push(LinearConstraint {
            terms,
            relation,
            rhs,
        });
    }

    pub fn variable_count(&self) -> usize {
        self.names.len()
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    pub fn name(&self, var: VarId) -> &str {
        &self.names[var.0]
    }

    pub fn upper(&self, var: VarId) -> f64 {
        self.upper[var.0]
    }

    pub fn objective(&self) -> &[f64] {
        &self.objective
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn constraints(&self) -> &[LinearConstraint] {
        &self.constraints
    }

    /// Objective value of a point.
    pub fn evaluate(&self, values: &[f64]) -> f64 {
        self.offset
            + self
                .objective
                .iter()
                .zip(values)
                .map(|(c, x)| c * x)
                .sum::<f64>()
    }

    /// Whether a point satisfies every row and bound within `tolerance`.
    pub fn is_feasible(&self, values: &[f64], tolerance: f64) -> bool {
        let bounded = values
            .iter()
            .zip(&self.upper)
            .all(|(&x, &u)| x >= -tolerance && x <= u + tolerance);
        bounded
            && self.constraints.iter().all(|row| {
                let lhs: f64 = row.terms.iter().map(|(v, c)| c * values[v.0]).sum();
                match row.relation {
                    Relation::LessEq => lhs <= row.rhs + tolerance,
                    Relation::GreaterEq => lhs >= row.rhs - tolerance,
                    Relation::Equal => (lhs - row.rhs).abs() <= tolerance,
                }
            })
    }
}

/// Termination status of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LpStatus {
    Optimal,
    Infeasible,
    Unbounded,
    IterationLimit,
}

impl fmt::Display for LpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LpStatus::Optimal => "optimal",
            LpStatus::Infeasible => "infeasible",
            LpStatus::Unbounded => "unbounded",
            LpStatus::IterationLimit => "iteration limit",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LpSolution {
    pub status: LpStatus,
    /// One value per variable (meaningful only when optimal).
    pub values: Vec<f64>,
    /// Objective value including the offset.
    pub objective: f64,
}

/// A linear programming backend. Solving is synchronous and blocking.
pub trait LpSolver: Send + Sync {
    fn name(&self) -> &str;

    /// Solve `program`. `Err` is reserved for backend failures; a problem that is
    /// merely infeasible or unfinished comes back as a non-optimal status.
    fn solve(&self, program: &LinearProgram) -> Result<LpSolution, InferError>;
}
