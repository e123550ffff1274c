//! Structural similarity of atoms and clauses up to variable renaming.
//!
//! Two formulas are similar when a bijection between their variable names maps
//! one onto the other. Constants must match verbatim. For clauses the renaming is
//! shared across all literals and every literal keeps its polarity.

use std::collections::HashMap;

use super::{AtomicFormula, Clause, Term};

/// Bidirectional variable renaming built up while matching.
#[derive(Debug, Clone, Default)]
struct Renaming<'a> {
    forward: HashMap<&'a str, &'a str>,
    backward: HashMap<&'a str, &'a str>,
}

impl<'a> Renaming<'a> {
    /// Record `a -> b`; fails if it contradicts an earlier binding in either direction.
    fn bind(&mut self, a: &'a str, b: &'a str) -> bool {
        match (self.forward.get(a), self.backward.get(b)) {
            (Some(&fa), Some(&bb)) => fa == b && bb == a,
            (None, None) => {
                self.forward.insert(a, b);
                self.backward.insert(b, a);
                true
            }
            _ => false,
        }
    }
}

fn unify_atoms<'a>(
    a: &'a AtomicFormula,
    b: &'a AtomicFormula,
    renaming: &mut Renaming<'a>,
) -> bool {
    if a.symbol != b.symbol || a.terms.len() != b.terms.len() {
        return false;
    }
    a.terms.iter().zip(&b.terms).all(|(ta, tb)| match (ta, tb) {
        (Term::Variable(va), Term::Variable(vb)) => renaming.bind(va, vb),
        (Term::Constant(ca), Term::Constant(cb)) => ca == cb,
        _ => false,
    })
}

/// Atom similarity: same predicate, same arity, consistent renaming.
pub fn atoms_similar(a: &AtomicFormula, b: &AtomicFormula) -> bool {
    let mut renaming = Renaming::default();
    unify_atoms(a, b, &mut renaming)
}

/// Clause similarity: a polarity-preserving literal matching under one renaming.
pub fn clauses_similar(a: &Clause, b: &Clause) -> bool {
    if a.literals.len() != b.literals.len() {
        return false;
    }
    let mut used = vec![false; b.literals.len()];
    match_from(a, b, 0, &mut used, Renaming::default())
}

fn match_from<'a>(
    a: &'a Clause,
    b: &'a Clause,
    idx: usize,
    used: &mut [bool],
    renaming: Renaming<'a>,
) -> bool {
    let Some(lit_a) = a.literals.get(idx) else {
        return true;
    };
    for (j, lit_b) in b.literals.iter().enumerate() {
        if used[j] || lit_a.positive != lit_b.positive {
            continue;
        }
        let mut attempt = renaming.clone();
        if unify_atoms(&lit_a.atom, &lit_b.atom, &mut attempt) {
            used[j] = true;
            if match_from(a, b, idx + 1, used, attempt) {
                return true;
            }
            used[j] = false;
        }
    }
    false
}
