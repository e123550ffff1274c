//! Ground Markov random field: the read-only skeleton handed to inference.
//!
//! Constraints and atoms are stored in dense vectors. Every atom carries the
//! indices of the constraints in which it occurs positively and negatively, so
//! a flip touches only its own neighbourhood. Mutable search state lives in
//! [`state::MrfState`], one per chain, borrowing the skeleton.

pub mod state;

use std::collections::{BTreeMap, HashMap};

use crate::ground::identity::AtomId;
use crate::ground::registry::{Clique, ConstraintKey};

pub use state::MrfState;

/// Literal over a dense atom index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Lit {
    pub atom: u32,
    pub positive: bool,
}

/// Ground clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub id: ConstraintKey,
    /// Finite accumulated weight, or +inf for hard constraints.
    pub weight: f64,
    /// Sorted signed atom ids.
    pub literals: Vec<i32>,
    /// The same literals over dense atom indices.
    pub lits: Vec<Lit>,
    pub hard: bool,
    /// Minimum number of true literals for the constraint to count as satisfied.
    pub threshold: u32,
    pub dependencies: BTreeMap<usize, i32>,
}

impl Constraint {
    pub fn is_unit(&self) -> bool {
        self.lits.len() == 1
    }

    pub fn is_positive(&self) -> bool {
        self.weight > 0.0
    }

    pub fn is_satisfied(&self, nsat: u32) -> bool {
        nsat >= self.threshold
    }

    /// Whether the constraint costs anything at this satisfaction count.
    pub fn is_violated(&self, nsat: u32) -> bool {
        self.is_satisfied(nsat) != self.is_positive()
    }
}

/// Ground atom node with its occurrence lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroundAtom {
    pub id: AtomId,
    /// Constraints where the atom appears as a positive literal.
    pub positive: Vec<u32>,
    /// Constraints where the atom appears as a negative literal.
    pub negative: Vec<u32>,
}

impl GroundAtom {
    pub fn degree(&self) -> usize {
        self.positive.len() + self.negative.len()
    }

    /// Every constraint touching this atom.
    pub fn occurrences(&self) -> impl Iterator<Item = u32> + '_ {
        self.positive.iter().chain(&self.negative).copied()
    }
}

/// Assembled ground network.
#[derive(Debug, Clone, Default)]
pub struct Mrf {
    constraints: Vec<Constraint>,
    atoms: Vec<GroundAtom>,
    index: HashMap<AtomId, u32>,
    query_range: Option<(AtomId, AtomId)>,
    hard_weight: f64,
    max_literals: usize,
}

impl Mrf {
    /// Build the network from accumulated cliques plus any atoms that must be
    /// present even without constraints (unknown query atoms).
    ///
    /// Cliques whose accumulated weight cancelled to zero are dropped.
    pub fn assemble(
        cliques: Vec<(ConstraintKey, Clique)>,
        extra_atoms: impl IntoIterator<Item = AtomId>,
        query_range: Option<(AtomId, AtomId)>,
    ) -> Self {
        let mut mrf = Mrf {
            query_range,
            ..Default::default()
        };

        let mut finite_sum = 0.0;
        for (key, clique) in cliques {
            if clique.weight == 0.0 || clique.literals.is_empty() {
                continue;
            }
            let hard = clique.weight.is_infinite();
            if !hard {
                finite_sum += clique.weight.abs();
            }
            let cidx = mrf.constraints.len() as u32;
            let mut lits = Vec::with_capacity(clique.literals.len());
            for &lit in &clique.literals {
                let atom = mrf.intern(lit.unsigned_abs());
                let positive = lit > 0;
                let node = &mut mrf.atoms[atom as usize];
                if positive {
                    node.positive.push(cidx);
                } else {
                    node.negative.push(cidx);
                }
                lits.push(Lit { atom, positive });
            }
            mrf.max_literals = mrf.max_literals.max(lits.len());
            mrf.constraints.push(Constraint {
                id: key,
                weight: if hard { f64::INFINITY } else { clique.weight },
                literals: clique.literals,
                lits,
                hard,
                threshold: 1,
                dependencies: clique.dependencies,
            });
        }
        for id in extra_atoms {
            mrf.intern(id);
        }
        mrf.hard_weight = finite_sum + 1.0;

        tracing::info!(
            atoms = mrf.atoms.len(),
            constraints = mrf.constraints.len(),
            hard = mrf.hard_count(),
            max_literals = mrf.max_literals,
            hard_weight = mrf.hard_weight,
            "MRF assembled"
        );
        mrf
    }

    fn intern(&mut self, id: AtomId) -> u32 {
        if let Some(&idx) = self.index.get(&id) {
            return idx;
        }
        let idx = self.atoms.len() as u32;
        self.atoms.push(GroundAtom {
            id,
            positive: Vec::new(),
            negative: Vec::new(),
        });
        self.index.insert(id, idx);
        idx
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn constraint(&self, idx: u32) -> &Constraint {
        &self.constraints[idx as usize]
    }

    pub fn atoms(&self) -> &[GroundAtom] {
        &self.atoms
    }

    pub fn atom(&self, idx: u32) -> &GroundAtom {
        &self.atoms[idx as usize]
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    pub fn hard_count(&self) -> usize {
        self.constraints.iter().filter(|c| c.hard).count()
    }

    /// Dense index of a ground atom id.
    pub fn index_of(&self, id: AtomId) -> Option<u32> {
        self.index.get(&id).copied()
    }

    pub fn query_range(&self) -> Option<(AtomId, AtomId)> {
        self.query_range
    }

    /// Weight standing in for infinity; larger than the sum of all finite weights.
    pub fn hard_weight(&self) -> f64 {
        self.hard_weight
    }

    pub fn max_literals(&self) -> usize {
        self.max_literals
    }

    /// Cost a violated constraint adds: `|weight|`, or the hard sentinel.
    pub fn cost_weight(&self, idx: u32) -> f64 {
        let c = self.constraint(idx);
        if c.hard { self.hard_weight } else { c.weight.abs() }
    }

    /// Cost of a complete assignment over dense atom indices, from scratch.
    pub fn evaluate(&self, assignment: &[bool]) -> f64 {
        (0..self.constraints.len() as u32)
            .filter(|&ci| {
                let c = self.constraint(ci);
                let nsat = c
                    .lits
                    .iter()
                    .filter(|l| assignment[l.atom as usize] == l.positive)
                    .count() as u32;
                c.is_violated(nsat)
            })
            .map(|ci| self.cost_weight(ci))
            .sum()
    }

    /// Number of hard constraints an assignment violates.
    pub fn hard_violations(&self, assignment: &[bool]) -> usize {
        self.constraints
            .iter()
            .filter(|c| c.hard && !c.lits.iter().any(|l| assignment[l.atom as usize] == l.positive))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ground::registry::{CliqueEntry, CliqueRegistry};

    fn mrf_of(entries: Vec<CliqueEntry>, extra: &[AtomId]) -> Mrf {
        let registry = CliqueRegistry::new(2);
        for e in entries {
            registry.register(e);
        }
        Mrf::assemble(registry.into_cliques(), extra.iter().copied(), Some((1, 3)))
    }

    #[test]
    fn adjacency_follows_literal_signs() {
        let mrf = mrf_of(
            vec![
                CliqueEntry::new(vec![1, -2], 1.0, 0, 1),
                CliqueEntry::new(vec![2, 3], 2.0, 1, 1),
            ],
            &[],
        );
        assert_eq!(mrf.constraint_count(), 2);
        assert_eq!(mrf.atom_count(), 3);
        let a2 = mrf.atom(mrf.index_of(2).unwrap());
        assert_eq!(a2.positive.len(), 1);
        assert_eq!(a2.negative.len(), 1);
        assert_eq!(a2.degree(), 2);
        assert_eq!(mrf.max_literals(), 2);
    }

    #[test]
    fn hard_weight_exceeds_finite_sum() {
        let mrf = mrf_of(
            vec![
                CliqueEntry::new(vec![1], 1.5, 0, 1),
                CliqueEntry::new(vec![2], -2.5, 1, 1),
                CliqueEntry::new(vec![1, 2], f64::INFINITY, 2, 1),
            ],
            &[],
        );
        assert!(mrf.hard_weight() > 4.0);
        assert_eq!(mrf.hard_count(), 1);
    }

    #[test]
    fn cancelled_cliques_are_dropped_and_extra_atoms_kept() {
        let mrf = mrf_of(
            vec![
                CliqueEntry::new(vec![1], 1.0, 0, 1),
                CliqueEntry::new(vec![1], 1.0, 1, -1),
            ],
            &[3],
        );
        assert_eq!(mrf.constraint_count(), 0);
        assert_eq!(mrf.atom_count(), 1);
        assert_eq!(mrf.atom(0).id, 3);
    }

    #[test]
    fn evaluate_counts_positive_and_negative_costs() {
        let mrf = mrf_of(
            vec![
                CliqueEntry::new(vec![1, 2], 2.0, 0, 1),
                CliqueEntry::new(vec![1], -0.5, 1, 1),
            ],
            &[],
        );
        let a1 = mrf.index_of(1).unwrap() as usize;
        let mut assignment = vec![false; 2];
        assert_eq!(mrf.evaluate(&assignment), 2.0);
        assignment[a1] = true;
        assert_eq!(mrf.evaluate(&assignment), 0.5);
    }
}
