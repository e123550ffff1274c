//! Bounded-variable two-phase primal simplex over sparse rows.
//!
//! Variable bounds `0 <= x_j <= u_j` never become rows. A non-basic variable
//! sits at either bound; one at its upper bound is stored complemented
//! (`u_j - x_j`), so every non-basic column reads as zero and the usual
//! tableau algebra applies. The ratio test has three outcomes: a basic
//! variable drops to zero, a basic variable reaches its upper bound, or the
//! entering variable reaches its own bound (a bound flip, no pivot).
//!
//! Rows are normalised to a non-negative right-hand side, preferring `<=` so
//! that a slack starts basic. A `>=` row left with a positive right-hand side
//! gets a surplus plus an artificial, an `=` row an artificial. Phase one
//! drives the artificials to zero; phase two optimises the real objective with
//! artificials barred from re-entering.
//!
//! Entering columns follow Dantzig's rule; after a run of degenerate steps the
//! solver falls back to Bland's rule until progress resumes.

use crate::error::InferError;

use super::{LinearProgram, LpSolution, LpSolver, LpStatus, Relation, VarId};

const EPS: f64 = 1e-9;
const FEASIBILITY_EPS: f64 = 1e-7;
/// Entries below this magnitude are dropped after elimination.
const DROP_EPS: f64 = 1e-12;

/// Default step budget.
pub const DEFAULT_MAX_PIVOTS: usize = 1_000_000;

/// In-process bounded simplex backend.
#[derive(Debug, Clone)]
pub struct BoundedSimplex {
    max_pivots: usize,
}

impl BoundedSimplex {
    /// `max_pivots` bounds pivots and bound flips together.
    pub fn new(max_pivots: usize) -> Self {
        Self {
            max_pivots: max_pivots.max(1),
        }
    }
}

impl Default for BoundedSimplex {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PIVOTS)
    }
}

impl LpSolver for BoundedSimplex {
    fn name(&self) -> &str {
        "bounded-simplex"
    }

    fn solve(&self, program: &LinearProgram) -> Result<LpSolution, InferError> {
        let mut tableau = Tableau::build(program)?;

        let status = tableau.run_phase_one(self.max_pivots);
        if status != LpStatus::Optimal {
            return Ok(tableau.solution(program, status));
        }
        let status = tableau.run_phase_two(program, self.max_pivots);

        tracing::debug!(
            variables = program.variable_count(),
            rows = tableau.rows.len(),
            steps = tableau.steps,
            status = %status,
            "simplex finished"
        );
        Ok(tableau.solution(program, status))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Structural,
    Slack,
    Artificial,
}

/// `(column, coefficient)` pairs sorted by column.
type SparseRow = Vec<(usize, f64)>;

fn coef(row: &[(usize, f64)], col: usize) -> f64 {
    row.binary_search_by_key(&col, |&(j, _)| j)
        .map_or(0.0, |k| row[k].1)
}

/// `row - factor * pivot`, with column `cleared` removed outright.
fn eliminate(row: &[(usize, f64)], factor: f64, pivot: &[(usize, f64)], cleared: usize) -> SparseRow {
    let mut out = Vec::with_capacity(row.len() + pivot.len());
    let (mut a, mut b) = (0, 0);
    while a < row.len() || b < pivot.len() {
        let (col, value) = match (row.get(a), pivot.get(b)) {
            (Some(&(ja, va)), Some(&(jb, vb))) if ja == jb => {
                a += 1;
                b += 1;
                (ja, va - factor * vb)
            }
            (Some(&(ja, va)), Some(&(jb, _))) if ja < jb => {
                a += 1;
                (ja, va)
            }
            (Some(&(ja, va)), None) => {
                a += 1;
                (ja, va)
            }
            (_, Some(&(jb, vb))) => {
                b += 1;
                (jb, -factor * vb)
            }
            (None, None) => break,
        };
        if col != cleared && value.abs() > DROP_EPS {
            out.push((col, value));
        }
    }
    out
}

struct Tableau {
    rows: Vec<SparseRow>,
    /// Value of each row's basic column.
    rhs: Vec<f64>,
    /// Reduced costs: `objective + Σ z_j·x_j = z_rhs` over non-basic columns.
    z: Vec<f64>,
    z_rhs: f64,
    basis: Vec<usize>,
    kinds: Vec<Column>,
    upper: Vec<f64>,
    /// Column currently stands for `upper - x`.
    flipped: Vec<bool>,
    steps: usize,
}

impl Tableau {
    fn build(program: &LinearProgram) -> Result<Self, InferError> {
        let n = program.variable_count();

        let mut upper = Vec::with_capacity(n);
        for j in 0..n {
            let u = program.upper(VarId(j));
            if u.is_nan() || u < 0.0 {
                return Err(InferError::Solver {
                    message: format!("variable {} has invalid upper bound {u}", program.name(VarId(j))),
                });
            }
            upper.push(u);
        }

        let mut normalised: Vec<(SparseRow, Relation, f64)> = Vec::new();
        for row in program.constraints() {
            let mut terms = Vec::with_capacity(row.terms.len());
            for &(var, c) in &row.terms {
                if var.0 >= n {
                    return Err(InferError::Solver {
                        message: format!("row references unknown variable {}", var.0),
                    });
                }
                terms.push((var.0, c));
            }
            if !row.rhs.is_finite() || terms.iter().any(|(_, c)| !c.is_finite()) {
                return Err(InferError::Solver {
                    message: "non-finite coefficient in constraint row".into(),
                });
            }
            terms.sort_by_key(|&(j, _)| j);
            let mut merged: SparseRow = Vec::with_capacity(terms.len());
            for (j, c) in terms {
                match merged.last_mut() {
                    Some((last, acc)) if *last == j => *acc += c,
                    _ => merged.push((j, c)),
                }
            }
            merged.retain(|&(_, c)| c != 0.0);
            normalised.push(normalise(merged, row.relation, row.rhs));
        }

        let slacks = normalised
            .iter()
            .filter(|(_, rel, _)| *rel != Relation::Equal)
            .count();
        let artificials = normalised
            .iter()
            .filter(|(_, rel, _)| *rel != Relation::LessEq)
            .count();
        let cols = n + slacks + artificials;

        let mut kinds = vec![Column::Structural; n];
        kinds.extend(std::iter::repeat_n(Column::Slack, slacks));
        kinds.extend(std::iter::repeat_n(Column::Artificial, artificials));
        upper.resize(cols, f64::INFINITY);

        let mut rows = Vec::with_capacity(normalised.len());
        let mut rhs = Vec::with_capacity(normalised.len());
        let mut basis = Vec::with_capacity(normalised.len());
        let mut next_slack = n;
        let mut next_art = n + slacks;
        for (mut row, relation, value) in normalised {
            match relation {
                Relation::LessEq => {
                    row.push((next_slack, 1.0));
                    basis.push(next_slack);
                    next_slack += 1;
                }
                Relation::GreaterEq => {
                    row.push((next_slack, -1.0));
                    next_slack += 1;
                    row.push((next_art, 1.0));
                    basis.push(next_art);
                    next_art += 1;
                }
                Relation::Equal => {
                    row.push((next_art, 1.0));
                    basis.push(next_art);
                    next_art += 1;
                }
            }
            rows.push(row);
            rhs.push(value);
        }

        Ok(Self {
            rows,
            rhs,
            z: vec![0.0; cols],
            z_rhs: 0.0,
            basis,
            kinds,
            upper,
            flipped: vec![false; cols],
            steps: 0,
        })
    }

    fn cols(&self) -> usize {
        self.kinds.len()
    }

    /// Reset the reduced costs for maximising `cost · x` (uncomplemented columns).
    fn price(&mut self, cost: &[f64]) {
        let effective: Vec<f64> = cost
            .iter()
            .zip(&self.flipped)
            .map(|(&c, &f)| if f { -c } else { c })
            .collect();
        self.z_rhs = cost
            .iter()
            .enumerate()
            .filter(|&(j, &c)| self.flipped[j] && c != 0.0)
            .map(|(j, &c)| c * self.upper[j])
            .sum();
        for (z, &c) in self.z.iter_mut().zip(&effective) {
            *z = -c;
        }
        for (i, row) in self.rows.iter().enumerate() {
            let cb = effective[self.basis[i]];
            if cb != 0.0 {
                for &(j, a) in row {
                    self.z[j] += cb * a;
                }
                self.z_rhs += cb * self.rhs[i];
            }
        }
    }

    fn run_phase_one(&mut self, max_pivots: usize) -> LpStatus {
        if !self.kinds.contains(&Column::Artificial) {
            return LpStatus::Optimal;
        }
        let cost: Vec<f64> = self
            .kinds
            .iter()
            .map(|k| if *k == Column::Artificial { -1.0 } else { 0.0 })
            .collect();
        self.price(&cost);
        match self.iterate(max_pivots, true) {
            LpStatus::Optimal => {}
            other => return other,
        }
        if self.z_rhs < -FEASIBILITY_EPS {
            return LpStatus::Infeasible;
        }

        // Pivot zero-level artificials out of the basis where possible.
        for i in 0..self.rows.len() {
            if self.kinds[self.basis[i]] != Column::Artificial {
                continue;
            }
            let entering = self.rows[i]
                .iter()
                .find(|&&(j, a)| self.kinds[j] != Column::Artificial && a.abs() > EPS)
                .map(|&(j, _)| j);
            if let Some(j) = entering {
                self.pivot(i, j);
            }
        }
        LpStatus::Optimal
    }

    fn run_phase_two(&mut self, program: &LinearProgram, max_pivots: usize) -> LpStatus {
        let mut cost = vec![0.0; self.cols()];
        cost[..program.variable_count()].copy_from_slice(program.objective());
        self.price(&cost);
        self.iterate(max_pivots, false)
    }

    fn iterate(&mut self, max_pivots: usize, allow_artificial: bool) -> LpStatus {
        let cols = self.cols();
        let mut degenerate_run = 0usize;
        loop {
            if self.steps >= max_pivots {
                return LpStatus::IterationLimit;
            }
            let bland = degenerate_run > cols;
            let eligible = |j: usize| allow_artificial || self.kinds[j] != Column::Artificial;

            let entering = if bland {
                (0..cols).find(|&j| eligible(j) && self.z[j] < -EPS)
            } else {
                (0..cols)
                    .filter(|&j| eligible(j) && self.z[j] < -EPS)
                    .min_by(|&a, &b| self.z[a].total_cmp(&self.z[b]))
            };
            let Some(col) = entering else {
                return LpStatus::Optimal;
            };

            // (row, step, leaves at upper bound)
            let mut leaving: Option<(usize, f64, bool)> = None;
            for (i, row) in self.rows.iter().enumerate() {
                let a = coef(row, col);
                let b = self.basis[i];
                let (ratio, to_upper) = if a > EPS {
                    (self.rhs[i] / a, false)
                } else if a < -EPS && self.upper[b].is_finite() {
                    ((self.upper[b] - self.rhs[i]) / -a, true)
                } else {
                    continue;
                };
                let ratio = ratio.max(0.0);
                let better = match leaving {
                    None => true,
                    Some((best, best_ratio, _)) => {
                        ratio < best_ratio - EPS
                            || (ratio <= best_ratio + EPS && b < self.basis[best])
                    }
                };
                if better {
                    leaving = Some((i, ratio, to_upper));
                }
            }

            let own = self.upper[col];
            let step = match leaving {
                Some((row, ratio, to_upper)) if ratio < own - EPS => {
                    let outgoing = self.basis[row];
                    self.pivot(row, col);
                    if to_upper {
                        self.complement(outgoing);
                    }
                    ratio
                }
                _ if own.is_finite() => {
                    self.complement(col);
                    self.steps += 1;
                    own
                }
                _ => return LpStatus::Unbounded,
            };

            if step <= EPS {
                degenerate_run += 1;
            } else {
                degenerate_run = 0;
            }
        }
    }

    fn pivot(&mut self, r: usize, c: usize) {
        let inv = 1.0 / coef(&self.rows[r], c);
        for entry in self.rows[r].iter_mut() {
            entry.1 *= inv;
        }
        self.rhs[r] *= inv;
        let pivot_row = std::mem::take(&mut self.rows[r]);
        let pivot_rhs = self.rhs[r];

        for i in 0..self.rows.len() {
            if i == r {
                continue;
            }
            let factor = coef(&self.rows[i], c);
            if factor != 0.0 {
                self.rows[i] = eliminate(&self.rows[i], factor, &pivot_row, c);
                self.rhs[i] -= factor * pivot_rhs;
            }
        }
        let factor = self.z[c];
        if factor != 0.0 {
            for &(j, v) in &pivot_row {
                self.z[j] -= factor * v;
            }
            self.z[c] = 0.0;
            self.z_rhs -= factor * pivot_rhs;
        }

        self.rows[r] = pivot_row;
        self.basis[r] = c;
        self.steps += 1;
    }

    /// Substitute `upper - x` for column `c` everywhere.
    fn complement(&mut self, c: usize) {
        let u = self.upper[c];
        for (row, rhs) in self.rows.iter_mut().zip(self.rhs.iter_mut()) {
            if let Ok(k) = row.binary_search_by_key(&c, |&(j, _)| j) {
                *rhs -= row[k].1 * u;
                row[k].1 = -row[k].1;
            }
        }
        self.z_rhs -= self.z[c] * u;
        self.z[c] = -self.z[c];
        self.flipped[c] = !self.flipped[c];
    }

    fn solution(&self, program: &LinearProgram, status: LpStatus) -> LpSolution {
        let n = program.variable_count();
        let mut stored = vec![0.0; n];
        for (i, &b) in self.basis.iter().enumerate() {
            if b < n {
                stored[b] = self.rhs[i];
            }
        }
        let values: Vec<f64> = stored
            .into_iter()
            .enumerate()
            .map(|(j, v)| {
                let u = self.upper[j];
                let x = if self.flipped[j] { u - v } else { v };
                x.clamp(0.0, u)
            })
            .collect();
        LpSolution {
            status,
            objective: program.evaluate(&values),
            values,
        }
    }
}

/// Make the right-hand side non-negative, turning `>=` into `<=` where the sign allows.
fn normalise(mut coefs: SparseRow, relation: Relation, rhs: f64) -> (SparseRow, Relation, f64) {
    let negate = match relation {
        Relation::GreaterEq => rhs <= 0.0,
        Relation::LessEq | Relation::Equal => rhs < 0.0,
    };
    if !negate {
        return (coefs, relation, rhs);
    }
    coefs.iter_mut().for_each(|(_, c)| *c = -*c);
    let flipped = match relation {
        Relation::LessEq => Relation::GreaterEq,
        Relation::GreaterEq => Relation::LessEq,
        Relation::Equal => Relation::Equal,
    };
    (coefs, flipped, -rhs)
}
