//! Per-clause grounding.
//!
//! A [`ClauseGrounder`] is built once per weighted clause. Construction resolves
//! every literal to either an evidence-backed atom or a dynamic evaluator,
//! orders the literals, assigns each variable an odometer digit and computes
//! each literal's pivot: the least significant digit among its variables.
//!
//! Enumeration walks the Cartesian product of the variable domains. When a
//! literal is satisfied by evidence (or its atom is absent from the domain), the
//! outcome depends only on digits at or above its pivot, so the odometer skips
//! straight past every substitution sharing them.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::GroundError;
use crate::ground::identity::{AtomId, AtomIdentity, ConstantsSet};
use crate::ground::odometer::Odometer;
use crate::ground::registry::{CliqueEntry, CliqueRegistry};
use crate::kb::dynamic::DynamicFn;
use crate::kb::{EvidenceDb, Mln, TriState, WorldAssumption};
use crate::logic::{AtomSignature, Clause, Term};

/// Result type for grounding operations.
pub type GroundResult<T> = std::result::Result<T, GroundError>;

/// Weight rewriting applied to each ground clause before registration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroundingOptions {
    /// Split negative-weight clauses into positive-weight unit clauses.
    pub eliminate_negative_weights: bool,
    /// Turn `w !a` into `-w a`.
    pub eliminate_negated_unit: bool,
}

/// Counters for one grounding pass of one clause.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroundingStats {
    pub substitutions: u64,
    pub tautologies: u64,
    pub absent: u64,
    pub falsified: u64,
    pub filtered: u64,
    pub emitted: u64,
}

impl GroundingStats {
    pub fn merge(&mut self, other: &GroundingStats) {
        self.substitutions += other.substitutions;
        self.tautologies += other.tautologies;
        self.absent += other.absent;
        self.falsified += other.falsified;
        self.filtered += other.filtered;
        self.emitted += other.emitted;
    }
}

/// Output of [`ClauseGrounder::ground`].
#[derive(Debug, Clone, Default)]
pub struct ClauseGrounding {
    pub stats: GroundingStats,
    /// Atoms of every retained ground clause.
    pub atoms: HashSet<AtomId>,
}

#[derive(Debug, Clone)]
enum ArgSlot {
    /// Variable bound to an odometer digit. `rebind` holds the argument's own
    /// domain when it differs from the variable's domain.
    Var {
        digit: usize,
        rebind: Option<Arc<ConstantsSet>>,
    },
    /// Constant resolved to an index in the argument domain (`None`: absent).
    Index(Option<usize>),
    /// Constant passed verbatim to a dynamic evaluator.
    Name(String),
}

enum LiteralSource<'a> {
    Evidence {
        identity: &'a AtomIdentity,
        db: &'a EvidenceDb,
    },
    Dynamic(DynamicFn),
}

struct PreparedLiteral<'a> {
    positive: bool,
    signature: AtomSignature,
    source: LiteralSource<'a>,
    args: Vec<ArgSlot>,
    pivot: usize,
}

/// Outcome of evaluating all literals under one substitution.
enum Evaluation {
    /// Satisfied by evidence; skip past this digit.
    Tautology(usize),
    /// Some atom has no id; skip past this digit.
    Absent(usize),
    /// Every literal falsified by evidence.
    Falsified,
    /// Unknown literals remain (in the output buffer).
    Open,
}

/// Grounder for one weighted clause.
pub struct ClauseGrounder<'a> {
    clause_index: usize,
    clause: &'a Clause,
    literals: Vec<PreparedLiteral<'a>>,
    var_names: Vec<String>,
    /// Domain per odometer digit.
    domains: Vec<Arc<ConstantsSet>>,
    options: GroundingOptions,
}

impl<'a> ClauseGrounder<'a> {
    pub fn new(
        clause_index: usize,
        mln: &'a Mln,
        options: GroundingOptions,
    ) -> GroundResult<Self> {
        let clause = &mln.clauses()[clause_index];
        if clause.weight.is_nan() {
            return Err(GroundError::NanWeight {
                clause: clause_index,
            });
        }

        // Resolve sources and order: closed-world evidence, dynamic, open-world;
        // then by arity.
        let mut resolved = Vec::with_capacity(clause.literals.len());
        for (pos, lit) in clause.literals.iter().enumerate() {
            let sig = lit.atom.signature();
            let (source, class) = match mln.identities().get(&sig) {
                Some(identity) => {
                    let db = mln
                        .evidence(&sig)
                        .ok_or_else(|| GroundError::UnsupportedDynamicAtom {
                            signature: sig.to_string(),
                        })?;
                    let class = match db.assumption() {
                        WorldAssumption::Closed => 0,
                        WorldAssumption::Open => 2,
                    };
                    (LiteralSource::Evidence { identity, db }, class)
                }
                None => match mln.kb().dynamic().evaluator(&sig) {
                    Some(Some(f)) => (LiteralSource::Dynamic(f), 1),
                    _ => {
                        return Err(GroundError::UnsupportedDynamicAtom {
                            signature: sig.to_string(),
                        });
                    }
                },
            };
            resolved.push((class, sig.arity, pos, source));
        }
        resolved.sort_by_key(|(class, arity, pos, _)| (*class, *arity, *pos));

        // Variables in first-appearance order over the sorted literals.
        let mut var_names: Vec<String> = Vec::new();
        for (_, _, pos, _) in &resolved {
            for v in clause.literals[*pos].atom.variables() {
                if !var_names.iter().any(|n| n == v) {
                    var_names.push(v.to_string());
                }
            }
        }
        let n = var_names.len();
        // The first variable is the most significant digit.
        let digit_of = |name: &str| var_names.iter().position(|v| v == name).map(|k| n - 1 - k);

        let mut domains: Vec<Option<Arc<ConstantsSet>>> = vec![None; n];
        for (_, _, pos, source) in &resolved {
            if let LiteralSource::Evidence { identity, .. } = source {
                for (arg, term) in clause.literals[*pos].atom.terms.iter().enumerate() {
                    let Term::Variable(v) = term else { continue };
                    if let Some(d) = digit_of(v) {
                        if domains[d].is_none() {
                            domains[d] = identity.domain(arg).cloned();
                        }
                    }
                }
            }
        }
        let domains: Vec<Arc<ConstantsSet>> = domains
            .into_iter()
            .enumerate()
            .map(|(d, dom)| {
                dom.ok_or_else(|| GroundError::UntypedVariable {
                    variable: var_names[n - 1 - d].clone(),
                    clause: clause_index,
                })
            })
            .collect::<GroundResult<_>>()?;

        let mut literals = Vec::with_capacity(resolved.len());
        for (_, _, pos, source) in resolved {
            let lit = &clause.literals[pos];
            let mut args = Vec::with_capacity(lit.atom.terms.len());
            let mut pivot = n;
            for (arg, term) in lit.atom.terms.iter().enumerate() {
                let slot = match (term, &source) {
                    (Term::Variable(v), LiteralSource::Evidence { identity, .. }) => {
                        let digit = digit_of(v).unwrap_or(0);
                        pivot = pivot.min(digit);
                        let rebind = identity
                            .domain(arg)
                            .filter(|arg_dom| !Arc::ptr_eq(arg_dom, &domains[digit]))
                            .cloned();
                        ArgSlot::Var { digit, rebind }
                    }
                    (Term::Variable(v), LiteralSource::Dynamic(_)) => {
                        let digit = digit_of(v).unwrap_or(0);
                        pivot = pivot.min(digit);
                        ArgSlot::Var {
                            digit,
                            rebind: None,
                        }
                    }
                    (Term::Constant(c), LiteralSource::Evidence { identity, .. }) => {
                        ArgSlot::Index(identity.domain(arg).and_then(|d| d.get(c)))
                    }
                    (Term::Constant(c), LiteralSource::Dynamic(_)) => ArgSlot::Name(c.clone()),
                };
                args.push(slot);
            }
            literals.push(PreparedLiteral {
                positive: lit.positive,
                signature: lit.atom.signature(),
                source,
                args,
                pivot,
            });
        }
        // Most significant pivots first: the first decisive literal gives the widest skip.
        literals.sort_by(|a, b| b.pivot.cmp(&a.pivot));

        tracing::trace!(
            clause = clause_index,
            variables = ?var_names,
            order = ?literals.iter().map(|l| (l.signature.to_string(), l.pivot)).collect::<Vec<_>>(),
            "clause grounder prepared"
        );

        Ok(Self {
            clause_index,
            clause,
            literals,
            var_names,
            domains,
            options,
        })
    }

    pub fn clause_index(&self) -> usize {
        self.clause_index
    }

    pub fn variables(&self) -> &[String] {
        &self.var_names
    }

    /// Size of the full substitution product.
    pub fn substitution_space(&self) -> u128 {
        self.domains.iter().map(|d| d.len() as u128).product()
    }

    /// Enumerate substitutions and register every retained ground clause.
    ///
    /// A ground clause is retained when at least one of its atoms is in `interest`.
    pub fn ground(
        &self,
        interest: &HashSet<AtomId>,
        registry: &CliqueRegistry,
    ) -> ClauseGrounding {
        let mut out = ClauseGrounding::default();
        if self.clause.weight == 0.0 {
            return out;
        }

        let mut odometer = Odometer::new(self.domains.iter().map(|d| d.len()).collect());
        let mut lits: Vec<i32> = Vec::with_capacity(self.literals.len());
        let mut indices: Vec<usize> = Vec::new();
        let mut names: Vec<&str> = Vec::new();

        while let Some(digits) = odometer.current() {
            out.stats.substitutions += 1;
            lits.clear();
            match self.evaluate(digits, &mut lits, &mut indices, &mut names) {
                Evaluation::Tautology(pivot) => {
                    out.stats.tautologies += 1;
                    odometer.skip_past(pivot);
                    continue;
                }
                Evaluation::Absent(pivot) => {
                    out.stats.absent += 1;
                    odometer.skip_past(pivot);
                    continue;
                }
                Evaluation::Falsified => {
                    out.stats.falsified += 1;
                    tracing::trace!(clause = self.clause_index, "grounding falsified by evidence");
                }
                Evaluation::Open => {
                    lits.sort_unstable();
                    lits.dedup();
                    if lits.iter().any(|l| *l > 0 && lits.binary_search(&-l).is_ok()) {
                        out.stats.tautologies += 1;
                    } else if !lits.iter().any(|l| interest.contains(&l.unsigned_abs())) {
                        out.stats.filtered += 1;
                    } else {
                        out.atoms.extend(lits.iter().map(|l| l.unsigned_abs()));
                        out.stats.emitted += self.store(&lits, registry);
                    }
                }
            }
            odometer.advance();
        }

        tracing::debug!(
            clause = self.clause_index,
            substitutions = out.stats.substitutions,
            tautologies = out.stats.tautologies,
            emitted = out.stats.emitted,
            "clause grounded"
        );
        out
    }

    fn evaluate<'s>(
        &'s self,
        digits: &[usize],
        lits: &mut Vec<i32>,
        indices: &mut Vec<usize>,
        names: &mut Vec<&'s str>,
    ) -> Evaluation {
        for lit in &self.literals {
            let truth = match &lit.source {
                LiteralSource::Evidence { identity, db } => {
                    indices.clear();
                    for slot in &lit.args {
                        let idx = match slot {
                            ArgSlot::Var { digit, rebind } => {
                                let idx = digits[*digit];
                                match rebind {
                                    None => Some(idx),
                                    Some(arg_dom) => self.domains[*digit]
                                        .at(idx)
                                        .and_then(|name| arg_dom.get(name)),
                                }
                            }
                            ArgSlot::Index(idx) => *idx,
                            ArgSlot::Name(_) => None,
                        };
                        match idx {
                            Some(i) => indices.push(i),
                            None => return Evaluation::Absent(lit.pivot),
                        }
                    }
                    let Some(id) = identity.encode_indices(indices) else {
                        return Evaluation::Absent(lit.pivot);
                    };
                    match db.get(id) {
                        TriState::Unknown => {
                            let id = id as i32;
                            lits.push(if lit.positive { id } else { -id });
                            continue;
                        }
                        known => known == TriState::True,
                    }
                }
                LiteralSource::Dynamic(f) => {
                    names.clear();
                    for slot in &lit.args {
                        match slot {
                            ArgSlot::Var { digit, .. } => {
                                match self.domains[*digit].at(digits[*digit]) {
                                    Some(name) => names.push(name),
                                    None => return Evaluation::Absent(lit.pivot),
                                }
                            }
                            ArgSlot::Name(name) => names.push(name.as_str()),
                            ArgSlot::Index(_) => return Evaluation::Absent(lit.pivot),
                        }
                    }
                    f(names.as_slice())
                }
            };
            if truth == lit.positive {
                return Evaluation::Tautology(lit.pivot);
            }
        }
        if lits.is_empty() {
            Evaluation::Falsified
        } else {
            Evaluation::Open
        }
    }

    /// Apply weight rewriting and register; returns the number of entries emitted.
    fn store(&self, lits: &[i32], registry: &CliqueRegistry) -> u64 {
        let w = self.clause.weight;
        let idx = self.clause_index;
        let hard = w.is_infinite();
        let negative = w < 0.0;

        let split = negative && (hard || self.options.eliminate_negative_weights);
        if split {
            if lits.len() == 1 {
                registry.register(CliqueEntry::new(vec![-lits[0]], w, idx, -1));
                return 1;
            }
            let share = if hard { w } else { w / lits.len() as f64 };
            for &l in lits {
                registry.register(CliqueEntry::new(vec![-l], share, idx, -1));
            }
            return lits.len() as u64;
        }
        if !hard && self.options.eliminate_negated_unit && lits.len() == 1 && lits[0] < 0 {
            registry.register(CliqueEntry::new(vec![-lits[0]], w, idx, -1));
            return 1;
        }
        registry.register(CliqueEntry::new(lits.to_vec(), w, idx, 1));
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kb::KnowledgeBase;
    use crate::logic::{AtomicFormula, Literal};

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

    fn base_kb(persons: &[&str]) -> KnowledgeBase {
        let mut kb = KnowledgeBase::new();
        kb.declare_constants("person", persons.iter().copied());
        kb.declare_predicate("Smokes", &["person"]);
        kb.declare_predicate("Cancer", &["person"]);
        kb.declare_predicate("Friends", &["person", "person"]);
        kb
    }

    fn all_query(mln: &Mln) -> HashSet<AtomId> {
        mln.unknown_query_atoms().into_iter().collect()
    }

    #[test]
    fn smokers_implication_drops_tautologies() {
        let mut kb = base_kb(&["Anna", "Bob"]);
        kb.add_clause(Clause::new(
            1.5,
            vec![
                Literal::negative(atom("Smokes", &["x"])),
                Literal::positive(atom("Cancer", &["x"])),
            ],
        ))
        .unwrap();
        let mln = Mln::builder(kb)
            .query(AtomSignature::new("Cancer", 1))
            .fact(atom("Smokes", &["Anna"]), true)
            .build()
            .unwrap();
        let registry = CliqueRegistry::new(2);
        let grounder = ClauseGrounder::new(0, &mln, GroundingOptions::default()).unwrap();
        let result = grounder.ground(&all_query(&mln), &registry);

        assert_eq!(result.stats.emitted, 1);
        assert_eq!(result.stats.tautologies, 1);
        let cancer_anna = mln
            .identities()
            .encode(&AtomSignature::new("Cancer", 1), &["Anna"])
            .unwrap() as i32;
        let clique = registry.get(&[cancer_anna]).unwrap();
        assert_eq!(clique.weight, 1.5);
    }

    #[test]
    fn always_true_literal_prunes_whole_subproduct() {
        // Smokes(x) holds for every x and decides at x's digit, before y is
        // ever varied.
        let persons = ["A", "B", "C", "D"];
        let mut kb = base_kb(&persons);
        kb.add_clause(Clause::new(
            1.0,
            vec![
                Literal::positive(atom("Smokes", &["x"])),
                Literal::positive(atom("Cancer", &["y"])),
                Literal::negative(atom("Friends", &["x", "y"])),
            ],
        ))
        .unwrap();
        let mut builder = Mln::builder(kb).query(AtomSignature::new("Cancer", 1));
        for p in persons {
            builder = builder.fact(atom("Smokes", &[p]), true);
            for q in persons {
                builder = builder.fact(atom("Friends", &[p, q]), true);
            }
        }
        let mln = builder.build().unwrap();
        let registry = CliqueRegistry::new(2);
        let grounder = ClauseGrounder::new(0, &mln, GroundingOptions::default()).unwrap();
        let result = grounder.ground(&all_query(&mln), &registry);

        assert!(registry.is_empty());
        assert_eq!(result.stats.emitted, 0);
        // One evaluation per value of x, not one per (x, y) pair.
        assert_eq!(result.stats.substitutions, 4);
        assert_eq!(result.stats.tautologies, 4);
    }

    #[test]
    fn negative_weight_split_into_units() {
        let mut kb = base_kb(&["Anna"]);
        kb.add_clause(Clause::new(
            -2.0,
            vec![
                Literal::positive(atom("Smokes", &["x"])),
                Literal::positive(atom("Cancer", &["x"])),
            ],
        ))
        .unwrap();
        let mln = Mln::builder(kb)
            .query(AtomSignature::new("Cancer", 1))
            .query(AtomSignature::new("Smokes", 1))
            .build()
            .unwrap();
        let registry = CliqueRegistry::new(1);
        let options = GroundingOptions {
            eliminate_negative_weights: true,
            ..Default::default()
        };
        let grounder = ClauseGrounder::new(0, &mln, options).unwrap();
        let result = grounder.ground(&all_query(&mln), &registry);
        assert_eq!(result.stats.emitted, 2);

        let ids = mln.identities();
        let smokes = ids.encode(&AtomSignature::new("Smokes", 1), &["Anna"]).unwrap() as i32;
        let cancer = ids.encode(&AtomSignature::new("Cancer", 1), &["Anna"]).unwrap() as i32;
        assert_eq!(registry.get(&[-smokes]).unwrap().weight, 1.0);
        assert_eq!(registry.get(&[-cancer]).unwrap().weight, 1.0);
    }

    #[test]
    fn negated_unit_is_flipped() {
        let mut kb = base_kb(&["Anna"]);
        kb.add_clause(Clause::new(0.8, vec![Literal::negative(atom("Cancer", &["x"]))]))
            .unwrap();
        let mln = Mln::builder(kb)
            .query(AtomSignature::new("Cancer", 1))
            .build()
            .unwrap();
        let registry = CliqueRegistry::new(1);
        let options = GroundingOptions {
            eliminate_negated_unit: true,
            ..Default::default()
        };
        ClauseGrounder::new(0, &mln, options)
            .unwrap()
            .ground(&all_query(&mln), &registry);
        let cancer = mln
            .identities()
            .encode(&AtomSignature::new("Cancer", 1), &["Anna"])
            .unwrap() as i32;
        let clique = registry.get(&[cancer]).unwrap();
        assert_eq!(clique.weight, -0.8);
        assert_eq!(clique.dependencies.get(&0), Some(&-1));
    }

    #[test]
    fn dynamic_literal_is_evaluated() {
        let mut kb = base_kb(&["Anna", "Bob"]);
        // Friends(x,y) v equals(x,y): tautological on the diagonal.
        kb.add_clause(Clause::new(
            1.0,
            vec![
                Literal::positive(atom("Friends", &["x", "y"])),
                Literal::positive(atom("equals", &["x", "y"])),
            ],
        ))
        .unwrap();
        let mln = Mln::builder(kb)
            .query(AtomSignature::new("Friends", 2))
            .build()
            .unwrap();
        let registry = CliqueRegistry::new(1);
        let result = ClauseGrounder::new(0, &mln, GroundingOptions::default())
            .unwrap()
            .ground(&all_query(&mln), &registry);
        assert_eq!(result.stats.emitted, 2);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn unwired_dynamic_atom_is_fatal() {
        let mut kb = base_kb(&["Anna"]);
        kb.dynamic_mut().declare(AtomSignature::new("near", 2));
        kb.add_clause(Clause::new(
            1.0,
            vec![
                Literal::positive(atom("Friends", &["x", "y"])),
                Literal::positive(atom("near", &["x", "y"])),
            ],
        ))
        .unwrap();
        let mln = Mln::builder(kb).build().unwrap();
        let err = ClauseGrounder::new(0, &mln, GroundingOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, GroundError::UnsupportedDynamicAtom { .. }));
    }

    #[test]
    fn variable_domain_follows_its_argument_position() {
        let mut kb = base_kb(&["Anna", "Bob"]);
        kb.declare_constants("city", ["Oslo", "Rome", "Lima"]);
        kb.declare_predicate("Lives", &["person", "city"]);
        kb.add_clause(Clause::new(1.0, vec![Literal::positive(atom("Lives", &["Anna", "c"]))]))
            .unwrap();
        kb.add_clause(Clause::new(
            1.0,
            vec![
                Literal::positive(atom("Cancer", &["x"])),
                Literal::positive(atom("equals", &["x", "z"])),
            ],
        ))
        .unwrap();
        let mln = Mln::builder(kb)
            .query(AtomSignature::new("Lives", 2))
            .build()
            .unwrap();

        // `c` ranges over cities, not over the persons at position 0.
        let registry = CliqueRegistry::new(1);
        let result = ClauseGrounder::new(0, &mln, GroundingOptions::default())
            .unwrap()
            .ground(&all_query(&mln), &registry);
        assert_eq!(result.stats.substitutions, 3);
        assert_eq!(result.stats.emitted, 3);

        // `z` only occurs in a dynamic literal, so nothing gives it a domain.
        let err = ClauseGrounder::new(1, &mln, GroundingOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, GroundError::UntypedVariable { ref variable, clause: 1 } if variable == "z"));
    }

    #[test]
    fn constant_outside_domain_drops_groundings() {
        let mut kb = base_kb(&["Anna", "Bob"]);
        kb.add_clause(Clause::new(
            1.0,
            vec![
                Literal::positive(atom("Cancer", &["x"])),
                Literal::negative(atom("Friends", &["x", "Zed"])),
            ],
        ))
        .unwrap();
        let mln = Mln::builder(kb)
            .query(AtomSignature::new("Cancer", 1))
            .build()
            .unwrap();
        let registry = CliqueRegistry::new(1);
        let result = ClauseGrounder::new(0, &mln, GroundingOptions::default())
            .unwrap()
            .ground(&all_query(&mln), &registry);
        assert_eq!(result.stats.emitted, 0);
        assert!(result.stats.absent > 0);
    }

    #[test]
    fn groundings_outside_interest_are_filtered() {
        let mut kb = base_kb(&["Anna", "Bob"]);
        kb.add_clause(Clause::new(0.5, vec![Literal::positive(atom("Cancer", &["x"]))]))
            .unwrap();
        let mln = Mln::builder(kb)
            .query(AtomSignature::new("Cancer", 1))
            .build()
            .unwrap();
        let registry = CliqueRegistry::new(1);
        let result = ClauseGrounder::new(0, &mln, GroundingOptions::default())
            .unwrap()
            .ground(&HashSet::new(), &registry);
        assert_eq!(result.stats.filtered, 2);
        assert!(registry.is_empty());
    }
}
