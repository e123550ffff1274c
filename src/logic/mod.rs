//! First-order clause representation consumed by the grounder.
//!
//! The knowledge base loader hands the engine clauses that are already in
//! conjunctive normal form: a weight plus a disjunction of literals over
//! atomic formulas whose terms are variables or constants.

pub mod similarity;

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A predicate family: name plus arity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AtomSignature {
    pub symbol: String,
    pub arity: usize,
}

impl AtomSignature {
    pub fn new(symbol: impl Into<String>, arity: usize) -> Self {
        Self {
            symbol: symbol.into(),
            arity,
        }
    }
}

impl fmt::Display for AtomSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.symbol, self.arity)
    }
}

/// A term inside an atomic formula.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Term {
    Variable(String),
    Constant(String),
}

impl Term {
    pub fn var(name: impl Into<String>) -> Self {
        Term::Variable(name.into())
    }

    pub fn constant(name: impl Into<String>) -> Self {
        Term::Constant(name.into())
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, Term::Variable(_))
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Variable(name) | Term::Constant(name) => f.write_str(name),
        }
    }
}

/// An atom `Symbol(t1, ..., tn)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AtomicFormula {
    pub symbol: String,
    pub terms: Vec<Term>,
}

impl AtomicFormula {
    pub fn new(symbol: impl Into<String>, terms: Vec<Term>) -> Self {
        Self {
            symbol: symbol.into(),
            terms,
        }
    }

    pub fn signature(&self) -> AtomSignature {
        AtomSignature::new(self.symbol.clone(), self.terms.len())
    }

    pub fn arity(&self) -> usize {
        self.terms.len()
    }

    /// Variable names in order of first appearance.
    pub fn variables(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for term in &self.terms {
            if let Term::Variable(name) = term {
                if !seen.contains(&name.as_str()) {
                    seen.push(name.as_str());
                }
            }
        }
        seen
    }

    pub fn is_ground(&self) -> bool {
        self.terms.iter().all(|t| !t.is_variable())
    }

    /// True when `other` is this atom up to a consistent variable renaming.
    pub fn is_similar_to(&self, other: &AtomicFormula) -> bool {
        similarity::atoms_similar(self, other)
    }
}

impl fmt::Display for AtomicFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.symbol)?;
        for (i, term) in self.terms.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{term}")?;
        }
        f.write_str(")")
    }
}

/// A possibly negated atomic formula.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Literal {
    pub positive: bool,
    pub atom: AtomicFormula,
}

impl Literal {
    pub fn positive(atom: AtomicFormula) -> Self {
        Self {
            positive: true,
            atom,
        }
    }

    pub fn negative(atom: AtomicFormula) -> Self {
        Self {
            positive: false,
            atom,
        }
    }

    pub fn negate(&self) -> Self {
        Self {
            positive: !self.positive,
            atom: self.atom.clone(),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.positive {
            f.write_str("!")?;
        }
        write!(f, "{}", self.atom)
    }
}

/// A weighted disjunction of literals.
///
/// Infinite weights denote hard constraints. NaN weights are rejected when the
/// clause enters the knowledge base and again when a grounder is built for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    pub weight: f64,
    pub literals: Vec<Literal>,
}

impl Clause {
    pub fn new(weight: f64, literals: Vec<Literal>) -> Self {
        Self { weight, literals }
    }

    pub fn hard(literals: Vec<Literal>) -> Self {
        Self::new(f64::INFINITY, literals)
    }

    pub fn is_hard(&self) -> bool {
        self.weight.is_infinite()
    }

    pub fn is_unit(&self) -> bool {
        self.literals.len() == 1
    }

    /// Distinct variable names, in order of first appearance.
    pub fn variables(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for lit in &self.literals {
            for v in lit.atom.variables() {
                if !seen.contains(&v) {
                    seen.push(v);
                }
            }
        }
        seen
    }

    pub fn signatures(&self) -> BTreeSet<AtomSignature> {
        self.literals.iter().map(|l| l.atom.signature()).collect()
    }

    /// True when `other` equals this clause up to literal order and a single
    /// consistent variable renaming, with polarities matching literal by literal.
    pub fn is_similar_to(&self, other: &Clause) -> bool {
        similarity::clauses_similar(self, other)
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_hard() {
            if self.weight < 0.0 {
                f.write_str("-inf ")?;
            }
        } else {
            write!(f, "{} ", self.weight)?;
        }
        for (i, lit) in self.literals.iter().enumerate() {
            if i > 0 {
                f.write_str(" v ")?;
            }
            write!(f, "{lit}")?;
        }
        if self.is_hard() && self.weight > 0.0 {
            f.write_str(".")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atom(symbol: &str, terms: &[&str]) -> AtomicFormula {
        AtomicFormula::new(
            symbol,
            terms
                .iter()
                .map(|t| {
                    if t.chars().next().is_some_and(|c| c.is_lowercase()) {
                        Term::var(*t)
                    } else {
                        Term::constant(*t)
                    }
                })
                .collect(),
        )
    }

    #[test]
    fn signature_display() {
        assert_eq!(AtomSignature::new("Friends", 2).to_string(), "Friends/2");
    }

    #[test]
    fn clause_variables_in_first_appearance_order() {
        let clause = Clause::new(
            1.0,
            vec![
                Literal::negative(atom("Friends", &["x", "y"])),
                Literal::positive(atom("Smokes", &["y"])),
                Literal::positive(atom("Knows", &["z", "x"])),
            ],
        );
        assert_eq!(clause.variables(), vec!["x", "y", "z"]);
    }

    #[test]
    fn clause_display() {
        let clause = Clause::new(
            1.5,
            vec![
                Literal::negative(atom("Smokes", &["x"])),
                Literal::positive(atom("Cancer", &["x"])),
            ],
        );
        assert_eq!(clause.to_string(), "1.5 !Smokes(x) v Cancer(x)");
        let hard = Clause::hard(vec![Literal::positive(atom("Cancer", &["Anna"]))]);
        assert_eq!(hard.to_string(), "Cancer(Anna).");
        assert!(hard.is_hard());
        assert!(hard.is_unit());
    }
}
