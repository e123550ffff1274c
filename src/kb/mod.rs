//! Knowledge base and assembled MLN (schema + evidence + constants).
//!
//! [`KnowledgeBase`] holds what the loader parsed: predicate schema, declared
//! constant domains, dynamic predicates and weighted clauses. [`MlnBuilder`]
//! adds query/world-assumption declarations and evidence facts, validates the
//! whole thing against the schema and lays out atom ids. The result, [`Mln`],
//! is read-only input to grounding.

pub mod dynamic;
pub mod evidence;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::error::KbError;
use crate::ground::identity::{AtomId, ConstantsSet, IdentityMap};
use crate::logic::{AtomSignature, AtomicFormula, Clause, Term};

pub use dynamic::DynamicRegistry;
pub use evidence::{EvidenceDb, TriState, WorldAssumption};

/// Result type for knowledge base operations.
pub type KbResult<T> = std::result::Result<T, KbError>;

/// Parsed knowledge base: schema, constants, dynamic predicates and clauses.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    schema: BTreeMap<AtomSignature, Vec<String>>,
    constants: BTreeMap<String, ConstantsSet>,
    dynamic: DynamicRegistry,
    clauses: Vec<Clause>,
}

impl KnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `symbol(type1, ..., typeN)`.
    pub fn declare_predicate(&mut self, symbol: &str, arg_types: &[&str]) -> AtomSignature {
        let sig = AtomSignature::new(symbol, arg_types.len());
        self.schema
            .insert(sig.clone(), arg_types.iter().map(|t| t.to_string()).collect());
        sig
    }

    /// Add constants to the domain of a type.
    pub fn declare_constants<I, S>(&mut self, type_name: &str, constants: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set = self.constants.entry(type_name.to_string()).or_default();
        for c in constants {
            set.insert(c);
        }
    }

    /// Append a clause. Clauses similar to an existing one are kept, with a warning.
    pub fn add_clause(&mut self, clause: Clause) -> KbResult<usize> {
        if clause.weight.is_nan() {
            return Err(KbError::NanWeight {
                clause: clause.to_string(),
            });
        }
        if let Some(existing) = self.clauses.iter().position(|c| c.is_similar_to(&clause)) {
            tracing::warn!(
                clause = %clause,
                existing = existing,
                "clause is a variable renaming of an earlier clause; both will be grounded"
            );
        }
        self.clauses.push(clause);
        Ok(self.clauses.len() - 1)
    }

    #[cfg(test)]
    pub(crate) fn push_clause_unchecked(&mut self, clause: Clause) {
        self.clauses.push(clause);
    }

    pub fn schema(&self) -> &BTreeMap<AtomSignature, Vec<String>> {
        &self.schema
    }

    pub fn arg_types(&self, signature: &AtomSignature) -> Option<&[String]> {
        self.schema.get(signature).map(Vec::as_slice)
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn dynamic(&self) -> &DynamicRegistry {
        &self.dynamic
    }

    pub fn dynamic_mut(&mut self) -> &mut DynamicRegistry {
        &mut self.dynamic
    }

    fn check_signature(&self, role: &str, signature: &AtomSignature) -> KbResult<()> {
        if self.schema.contains_key(signature) {
            return Ok(());
        }
        if let Some((declared, _)) = self
            .schema
            .iter()
            .find(|(sig, _)| sig.symbol == signature.symbol)
        {
            return Err(KbError::ArityMismatch {
                signature: declared.to_string(),
                expected: declared.arity,
                actual: signature.arity,
            });
        }
        Err(KbError::UnknownSignature {
            role: role.to_string(),
            signature: signature.to_string(),
        })
    }
}

/// Collects declarations and evidence, then validates and assembles an [`Mln`].
#[derive(Debug, Clone)]
pub struct MlnBuilder {
    kb: KnowledgeBase,
    query: BTreeSet<AtomSignature>,
    cwa: BTreeSet<AtomSignature>,
    owa: BTreeSet<AtomSignature>,
    facts: Vec<(AtomicFormula, bool)>,
    annotations: Vec<(AtomicFormula, bool)>,
}

impl MlnBuilder {
    pub fn new(kb: KnowledgeBase) -> Self {
        Self {
            kb,
            query: BTreeSet::new(),
            cwa: BTreeSet::new(),
            owa: BTreeSet::new(),
            facts: Vec::new(),
            annotations: Vec::new(),
        }
    }

    pub fn query(mut self, signature: AtomSignature) -> Self {
        self.query.insert(signature);
        self
    }

    pub fn closed_world(mut self, signature: AtomSignature) -> Self {
        self.cwa.insert(signature);
        self
    }

    pub fn open_world(mut self, signature: AtomSignature) -> Self {
        self.owa.insert(signature);
        self
    }

    /// Evidence fact about a ground atom.
    pub fn fact(mut self, atom: AtomicFormula, value: bool) -> Self {
        self.facts.push((atom, value));
        self
    }

    /// Gold annotation used by loss-augmented inference.
    pub fn annotation(mut self, atom: AtomicFormula, value: bool) -> Self {
        self.annotations.push((atom, value));
        self
    }

    pub fn build(self) -> KbResult<Mln> {
        let MlnBuilder {
            kb,
            query,
            cwa,
            owa,
            facts,
            annotations,
        } = self;

        for sig in &query {
            kb.check_signature("query", sig)?;
        }
        for sig in &cwa {
            kb.check_signature("closed-world", sig)?;
        }
        for sig in &owa {
            kb.check_signature("open-world", sig)?;
        }
        if let Some(sig) = cwa.iter().find(|s| owa.contains(*s) || query.contains(*s)) {
            return Err(KbError::ConflictingWorldAssumption {
                signature: sig.to_string(),
            });
        }
        for (atom, _) in facts.iter().chain(&annotations) {
            kb.check_signature("evidence", &atom.signature())?;
        }
        for clause in kb.clauses() {
            for lit in &clause.literals {
                let sig = lit.atom.signature();
                if !kb.dynamic().contains(&sig) {
                    kb.check_signature("clause", &sig)?;
                }
            }
        }

        // Domains: declared constants plus every constant mentioned in evidence.
        let mut domains = kb.constants.clone();
        for (atom, _) in facts.iter().chain(&annotations) {
            let types = kb.schema.get(&atom.signature()).map(Vec::as_slice).unwrap_or(&[]);
            for (term, type_name) in atom.terms.iter().zip(types) {
                match term {
                    Term::Constant(c) => {
                        domains.entry(type_name.clone()).or_default().insert(c.as_str());
                    }
                    Term::Variable(v) => {
                        return Err(KbError::UnknownConstant {
                            constant: v.clone(),
                            type_name: type_name.clone(),
                        });
                    }
                }
            }
        }
        let domains: BTreeMap<String, Arc<ConstantsSet>> = domains
            .into_iter()
            .map(|(t, set)| (t, Arc::new(set)))
            .collect();

        let mut schema_domains = BTreeMap::new();
        for (sig, types) in &kb.schema {
            let mut per_arg = Vec::with_capacity(types.len());
            for type_name in types {
                let domain = domains.get(type_name).ok_or_else(|| KbError::UnknownType {
                    type_name: type_name.clone(),
                    signature: sig.to_string(),
                })?;
                per_arg.push(Arc::clone(domain));
            }
            schema_domains.insert(sig.clone(), per_arg);
        }

        let identities = IdentityMap::build(&schema_domains, &query)?;

        let mut evidence = BTreeMap::new();
        for identity in identities.identities() {
            let sig = identity.signature();
            let assumption = if query.contains(sig) || owa.contains(sig) {
                WorldAssumption::Open
            } else {
                WorldAssumption::Closed
            };
            evidence.insert(sig.clone(), EvidenceDb::new(identity.clone(), assumption));
        }
        for (atom, value) in &facts {
            let id = encode_fact(&identities, &kb, atom)?;
            if let Some(db) = evidence.get_mut(&atom.signature()) {
                db.set(id, *value);
            }
        }

        let annotation = if annotations.is_empty() {
            None
        } else {
            let mut dbs = BTreeMap::new();
            for identity in identities.identities() {
                dbs.insert(
                    identity.signature().clone(),
                    EvidenceDb::new(identity.clone(), WorldAssumption::Closed),
                );
            }
            for (atom, value) in &annotations {
                let id = encode_fact(&identities, &kb, atom)?;
                if let Some(db) = dbs.get_mut(&atom.signature()) {
                    db.set(id, *value);
                }
            }
            for (sig, db) in &evidence {
                let annotated = dbs.get(sig).map_or(0, EvidenceDb::fact_count);
                if db.assumption() == WorldAssumption::Open && annotated == 0 {
                    tracing::warn!(
                        signature = %sig,
                        "no annotation for non-evidence predicate; all its groundings default to FALSE"
                    );
                }
            }
            Some(dbs)
        };

        tracing::info!(
            predicates = kb.schema.len(),
            clauses = kb.clauses.len(),
            facts = facts.len(),
            atoms = identities.atom_count(),
            "MLN assembled"
        );

        Ok(Mln {
            kb,
            domains,
            identities,
            evidence,
            query,
            annotation,
        })
    }
}

fn encode_fact(
    identities: &IdentityMap,
    kb: &KnowledgeBase,
    atom: &AtomicFormula,
) -> KbResult<AtomId> {
    let sig = atom.signature();
    let constants: Vec<&str> = atom
        .terms
        .iter()
        .map(|t| match t {
            Term::Constant(c) | Term::Variable(c) => c.as_str(),
        })
        .collect();
    identities.encode(&sig, &constants).ok_or_else(|| {
        let type_name = kb
            .arg_types(&sig)
            .and_then(|types| types.first().cloned())
            .unwrap_or_default();
        KbError::UnknownConstant {
            constant: atom.to_string(),
            type_name,
        }
    })
}

/// Knowledge base + evidence + atom id layout, ready for grounding.
#[derive(Debug, Clone)]
pub struct Mln {
    kb: KnowledgeBase,
    domains: BTreeMap<String, Arc<ConstantsSet>>,
    identities: IdentityMap,
    evidence: BTreeMap<AtomSignature, EvidenceDb>,
    query: BTreeSet<AtomSignature>,
    annotation: Option<BTreeMap<AtomSignature, EvidenceDb>>,
}

impl Mln {
    pub fn builder(kb: KnowledgeBase) -> MlnBuilder {
        MlnBuilder::new(kb)
    }

    pub fn kb(&self) -> &KnowledgeBase {
        &self.kb
    }

    pub fn clauses(&self) -> &[Clause] {
        self.kb.clauses()
    }

    pub fn identities(&self) -> &IdentityMap {
        &self.identities
    }

    pub fn query(&self) -> &BTreeSet<AtomSignature> {
        &self.query
    }

    pub fn domain(&self, type_name: &str) -> Option<&Arc<ConstantsSet>> {
        self.domains.get(type_name)
    }

    pub fn evidence(&self, signature: &AtomSignature) -> Option<&EvidenceDb> {
        self.evidence.get(signature)
    }

    /// Evidence state of any ground atom; ids outside every interval are UNKNOWN.
    pub fn evidence_state(&self, id: AtomId) -> TriState {
        self.identities
            .owner(id)
            .ok()
            .and_then(|identity| self.evidence.get(identity.signature()))
            .map_or(TriState::Unknown, |db| db.get(id))
    }

    /// Gold annotation of an atom, FALSE when not annotated.
    pub fn annotation_state(&self, id: AtomId) -> Option<bool> {
        let dbs = self.annotation.as_ref()?;
        let identity = self.identities.owner(id).ok()?;
        Some(dbs.get(identity.signature())?.get(id) == TriState::True)
    }

    pub fn has_annotation(&self) -> bool {
        self.annotation.is_some()
    }

    /// Query atom ids whose value is not fixed by evidence.
    pub fn unknown_query_atoms(&self) -> Vec<AtomId> {
        self.query
            .iter()
            .filter_map(|sig| self.evidence.get(sig))
            .flat_map(|db| db.unknown_ids())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::Literal;

    fn smokers_kb() -> KnowledgeBase {
        let mut kb = KnowledgeBase::new();
        kb.declare_constants("person", ["Anna", "Bob"]);
        kb.declare_predicate("Smokes", &["person"]);
        kb.declare_predicate("Cancer", &["person"]);
        kb.declare_predicate("Friends", &["person", "person"]);
        kb.add_clause(Clause::new(
            1.5,
            vec![
                Literal::negative(AtomicFormula::new("Smokes", vec![Term::var("x")])),
                Literal::positive(AtomicFormula::new("Cancer", vec![Term::var("x")])),
            ],
        ))
        .unwrap();
        kb
    }

    fn ground(symbol: &str, args: &[&str]) -> AtomicFormula {
        AtomicFormula::new(symbol, args.iter().map(|a| Term::constant(*a)).collect())
    }

    #[test]
    fn nan_weight_is_rejected() {
        let mut kb = KnowledgeBase::new();
        let err = kb.add_clause(Clause::new(f64::NAN, vec![])).unwrap_err();
        assert!(matches!(err, KbError::NanWeight { .. }));
    }

    #[test]
    fn unknown_query_signature_is_fatal() {
        let err = Mln::builder(smokers_kb())
            .query(AtomSignature::new("Asthma", 1))
            .build()
            .unwrap_err();
        assert!(matches!(err, KbError::UnknownSignature { ref role, .. } if role == "query"));
    }

    #[test]
    fn arity_mismatch_is_reported() {
        let err = Mln::builder(smokers_kb())
            .query(AtomSignature::new("Cancer", 2))
            .build()
            .unwrap_err();
        assert!(matches!(err, KbError::ArityMismatch { expected: 1, actual: 2, .. }));
    }

    #[test]
    fn closed_and_open_world_conflict_is_fatal() {
        let smokes = AtomSignature::new("Smokes", 1);
        let err = Mln::builder(smokers_kb())
            .closed_world(smokes.clone())
            .open_world(smokes)
            .build()
            .unwrap_err();
        assert!(matches!(err, KbError::ConflictingWorldAssumption { .. }));
    }

    #[test]
    fn evidence_and_defaults() {
        let mln = Mln::builder(smokers_kb())
            .query(AtomSignature::new("Cancer", 1))
            .fact(ground("Smokes", &["Anna"]), true)
            .fact(ground("Friends", &["Anna", "Bob"]), true)
            .build()
            .unwrap();
        let ids = mln.identities();
        let smokes = AtomSignature::new("Smokes", 1);
        let cancer = AtomSignature::new("Cancer", 1);
        let anna = ids.encode(&smokes, &["Anna"]).unwrap();
        let bob = ids.encode(&smokes, &["Bob"]).unwrap();
        assert_eq!(mln.evidence_state(anna), TriState::True);
        assert_eq!(mln.evidence_state(bob), TriState::False);
        let cancer_bob = ids.encode(&cancer, &["Bob"]).unwrap();
        assert_eq!(mln.evidence_state(cancer_bob), TriState::Unknown);
        assert_eq!(mln.unknown_query_atoms().len(), 2);
        assert_eq!(ids.query_range(), Some((1, 2)));
    }

    #[test]
    fn evidence_constants_extend_domains() {
        let mln = Mln::builder(smokers_kb())
            .query(AtomSignature::new("Cancer", 1))
            .fact(ground("Smokes", &["Chris"]), true)
            .build()
            .unwrap();
        assert_eq!(mln.domain("person").unwrap().len(), 3);
        assert_eq!(mln.unknown_query_atoms().len(), 3);
    }

    #[test]
    fn clause_with_undeclared_predicate_is_fatal() {
        let mut kb = smokers_kb();
        kb.add_clause(Clause::new(
            1.0,
            vec![Literal::positive(AtomicFormula::new(
                "Asthma",
                vec![Term::var("x")],
            ))],
        ))
        .unwrap();
        let err = Mln::builder(kb).build().unwrap_err();
        assert!(matches!(err, KbError::UnknownSignature { ref role, .. } if role == "clause"));
    }
}
