//! JSON interchange format for a complete inference problem.
//!
//! ```json
//! {
//!   "types": { "person": ["Anna", "Bob"] },
//!   "predicates": [
//!     { "name": "Smokes", "args": ["person"] },
//!     { "name": "Cancer", "args": ["person"] }
//!   ],
//!   "clauses": [
//!     { "weight": 1.5, "literals": ["!Smokes(x)", "Cancer(x)"] },
//!     { "weight": "inf", "literals": ["!Cancer(Bob)"] }
//!   ],
//!   "evidence": ["Smokes(Anna)"],
//!   "query": ["Cancer/1"]
//! }
//! ```
//!
//! Terms starting with a lowercase letter are variables, all others constants.
//! A leading `!` negates a literal (or marks a FALSE evidence fact). Clauses
//! are already in CNF; hard clauses use the weight `"inf"` (or `"-inf"`).

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MlnResult, ProblemError};
use crate::kb::{KnowledgeBase, Mln};
use crate::logic::{AtomSignature, AtomicFormula, Clause, Literal, Term};

/// Clause weight: a number, or `"inf"`/`"-inf"` for hard clauses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WeightSpec {
    Number(f64),
    Text(String),
}

impl WeightSpec {
    pub fn value(&self) -> Result<f64, ProblemError> {
        match self {
            WeightSpec::Number(w) => Ok(*w),
            WeightSpec::Text(t) => match t.trim() {
                "inf" | "+inf" | "hard" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                other => other.parse().map_err(|_| ProblemError::Parse {
                    path: "<clause weight>".into(),
                    message: format!("invalid weight \"{other}\""),
                }),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredicateSpec {
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClauseSpec {
    pub weight: WeightSpec,
    pub literals: Vec<String>,
}

/// A complete problem: knowledge base, evidence and query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    #[serde(default)]
    pub types: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub predicates: Vec<PredicateSpec>,
    /// Extra dynamic predicates (`name/arity`) beyond the built-ins.
    #[serde(default)]
    pub dynamic: Vec<String>,
    #[serde(default)]
    pub clauses: Vec<ClauseSpec>,
    #[serde(default)]
    pub evidence: Vec<String>,
    #[serde(default)]
    pub query: Vec<String>,
    #[serde(default)]
    pub cwa: Vec<String>,
    #[serde(default)]
    pub owa: Vec<String>,
    #[serde(default)]
    pub annotation: Vec<String>,
}

impl Problem {
    pub fn from_json(json: &str) -> Result<Self, ProblemError> {
        serde_json::from_str(json).map_err(|e| ProblemError::Parse {
            path: "<inline>".into(),
            message: e.to_string(),
        })
    }

    pub fn load(path: &Path) -> Result<Self, ProblemError> {
        let content = std::fs::read_to_string(path).map_err(|e| ProblemError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(|e| ProblemError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Build the knowledge base described by this problem.
    pub fn knowledge_base(&self) -> MlnResult<KnowledgeBase> {
        let mut kb = KnowledgeBase::new();
        for (type_name, constants) in &self.types {
            kb.declare_constants(type_name, constants.iter().cloned());
        }
        for p in &self.predicates {
            let args: Vec<&str> = p.args.iter().map(String::as_str).collect();
            kb.declare_predicate(&p.name, &args);
        }
        for text in &self.dynamic {
            let sig = parse_signature(text)?;
            if !kb.dynamic().contains(&sig) {
                kb.dynamic_mut().declare(sig);
            }
        }
        for spec in &self.clauses {
            let literals = spec
                .literals
                .iter()
                .map(|l| parse_literal(l))
                .collect::<Result<Vec<_>, _>>()?;
            kb.add_clause(Clause::new(spec.weight.value()?, literals))?;
        }
        Ok(kb)
    }

    /// Validate and assemble the MLN.
    pub fn into_mln(self) -> MlnResult<Mln> {
        let mut builder = Mln::builder(self.knowledge_base()?);
        for text in &self.query {
            builder = builder.query(parse_signature(text)?);
        }
        for text in &self.cwa {
            builder = builder.closed_world(parse_signature(text)?);
        }
        for text in &self.owa {
            builder = builder.open_world(parse_signature(text)?);
        }
        for text in &self.evidence {
            let lit = parse_literal(text)?;
            builder = builder.fact(lit.atom, lit.positive);
        }
        for text in &self.annotation {
            let lit = parse_literal(text)?;
            builder = builder.annotation(lit.atom, lit.positive);
        }
        Ok(builder.build()?)
    }
}

/// Parse `Name/arity`.
pub fn parse_signature(text: &str) -> Result<AtomSignature, ProblemError> {
    let malformed = || ProblemError::MalformedAtom {
        text: text.to_string(),
    };
    let (name, arity) = text.trim().rsplit_once('/').ok_or_else(malformed)?;
    let arity = arity.trim().parse().map_err(|_| malformed())?;
    if name.trim().is_empty() {
        return Err(malformed());
    }
    Ok(AtomSignature::new(name.trim(), arity))
}

/// Parse `[!]Name(t1,...,tn)`; a bare `Name` has arity zero.
pub fn parse_literal(text: &str) -> Result<Literal, ProblemError> {
    let malformed = || ProblemError::MalformedAtom {
        text: text.to_string(),
    };
    let trimmed = text.trim();
    let (positive, rest) = match trimmed.strip_prefix('!') {
        Some(rest) => (false, rest.trim_start()),
        None => (true, trimmed),
    };

    let (name, terms) = match rest.find('(') {
        None => (rest, Vec::new()),
        Some(open) => {
            let inner = rest[open + 1..].strip_suffix(')').ok_or_else(malformed)?;
            let terms = if inner.trim().is_empty() {
                Vec::new()
            } else {
                inner
                    .split(',')
                    .map(|t| parse_term(t.trim()).ok_or_else(malformed))
                    .collect::<Result<Vec<_>, _>>()?
            };
            (&rest[..open], terms)
        }
    };
    let name = name.trim();
    if name.is_empty() || name.contains(|c: char| c.is_whitespace() || c == ')' || c == ',') {
        return Err(malformed());
    }
    Ok(Literal {
        positive,
        atom: AtomicFormula::new(name, terms),
    })
}

fn parse_term(text: &str) -> Option<Term> {
    let first = text.chars().next()?;
    if text.contains(|c: char| c.is_whitespace() || c == '(' || c == ')') {
        return None;
    }
    Some(if first.is_lowercase() {
        Term::var(text)
    } else {
        Term::constant(text)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{KbError, MlnError};

    const SMOKERS: &str = r#"{
        "types": { "person": ["Anna", "Bob"] },
        "predicates": [
            { "name": "Smokes", "args": ["person"] },
            { "name": "Cancer", "args": ["person"] },
            { "name": "Friends", "args": ["person", "person"] }
        ],
        "clauses": [
            { "weight": 1.5, "literals": ["!Smokes(x)", "Cancer(x)"] },
            { "weight": "inf", "literals": ["!Friends(x,y)", "!equals(x,y)"] }
        ],
        "evidence": ["Smokes(Anna)", "Friends(Anna,Bob)"],
        "query": ["Cancer/1"]
    }"#;

    #[test]
    fn parses_literals_and_terms() {
        let lit = parse_literal("!Friends(x, Bob)").unwrap();
        assert!(!lit.positive);
        assert_eq!(lit.atom.symbol, "Friends");
        assert_eq!(lit.atom.terms, vec![Term::var("x"), Term::constant("Bob")]);
        let zero = parse_literal("Raining").unwrap();
        assert_eq!(zero.atom.arity(), 0);
    }

    #[test]
    fn malformed_atoms_are_rejected() {
        for bad in ["Smokes(x", "(x)", "Smokes(a b)", "", "Smokes(,)"] {
            assert!(parse_literal(bad).is_err(), "{bad} accepted");
        }
        assert!(parse_signature("Cancer").is_err());
        assert!(parse_signature("Cancer/x").is_err());
        assert_eq!(parse_signature("Cancer/1").unwrap(), AtomSignature::new("Cancer", 1));
    }

    #[test]
    fn weights_accept_infinity_text() {
        assert_eq!(WeightSpec::Text("inf".into()).value().unwrap(), f64::INFINITY);
        assert_eq!(WeightSpec::Text("-inf".into()).value().unwrap(), f64::NEG_INFINITY);
        assert_eq!(WeightSpec::Text("2.5".into()).value().unwrap(), 2.5);
        assert!(WeightSpec::Text("heavy".into()).value().is_err());
    }

    #[test]
    fn smokers_problem_builds() {
        let mln = Problem::from_json(SMOKERS).unwrap().into_mln().unwrap();
        assert_eq!(mln.clauses().len(), 2);
        assert!(mln.clauses()[1].is_hard());
        assert_eq!(mln.unknown_query_atoms().len(), 2);
    }

    #[test]
    fn undeclared_query_fails_with_kb_error() {
        let mut problem = Problem::from_json(SMOKERS).unwrap();
        problem.query.push("Asthma/1".into());
        let err = problem.into_mln().unwrap_err();
        assert!(matches!(err, MlnError::Kb(KbError::UnknownSignature { .. })));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Problem::load(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, ProblemError::Read { .. }));
    }
}
