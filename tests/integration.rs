//! End-to-end integration tests for the markov-map engine.
//!
//! These tests exercise the full pipeline from a problem description through
//! grounding, both inference methods and result export.

use markov_map::config::{EngineConfig, InferenceMethod, Rounding};
use markov_map::engine::Engine;
use markov_map::export::write_text;
use markov_map::kb::{KnowledgeBase, Mln};
use markov_map::logic::{AtomSignature, AtomicFormula, Clause, Literal, Term};
use markov_map::mrf::MrfState;
use markov_map::problem::Problem;

const SMOKERS: &str = r#"{
    "types": { "person": ["Anna", "Bob", "Chris"] },
    "predicates": [
        { "name": "Smokes", "args": ["person"] },
        { "name": "Cancer", "args": ["person"] },
        { "name": "Friends", "args": ["person", "person"] }
    ],
    "clauses": [
        { "weight": 1.5, "literals": ["!Smokes(x)", "Cancer(x)"] },
        { "weight": 1.1, "literals": ["!Friends(x,y)", "!Smokes(x)", "Smokes(y)"] },
        { "weight": 0.2, "literals": ["!Cancer(x)"] },
        { "weight": 0.1, "literals": ["!Smokes(x)"] }
    ],
    "evidence": ["Smokes(Anna)", "Friends(Anna,Bob)", "Friends(Bob,Anna)"],
    "query": ["Smokes/1", "Cancer/1"]
}"#;

fn engine(method: InferenceMethod) -> Engine {
    let mut config = EngineConfig::default();
    config.inference.method = method;
    Engine::new(config).unwrap()
}

fn atom(symbol: &str, terms: &[&str]) -> AtomicFormula {
    AtomicFormula::new(
        symbol,
        terms
            .iter()
            .map(|t| {
                if t.starts_with(char::is_lowercase) {
                    Term::var(*t)
                } else {
                    Term::constant(*t)
                }
            })
            .collect(),
    )
}

fn person_kb(persons: &[&str]) -> KnowledgeBase {
    let mut kb = KnowledgeBase::new();
    kb.declare_constants("person", persons.iter().copied());
    kb.declare_predicate("Smokes", &["person"]);
    kb.declare_predicate("Cancer", &["person"]);
    kb
}

#[test]
fn smokers_end_to_end_with_both_methods() {
    let mln = Problem::from_json(SMOKERS).unwrap().into_mln().unwrap();
    let smokes = AtomSignature::new("Smokes", 1);
    let cancer = AtomSignature::new("Cancer", 1);

    for method in [InferenceMethod::MaxWalkSat, InferenceMethod::Ilp] {
        let out = engine(method).infer(&mln).unwrap();
        assert_eq!(out.result.hard_violations, 0);
        assert!((out.result.cost - 0.5).abs() < 1e-9, "{method}: cost {}", out.result.cost);

        assert_eq!(out.value(&smokes, &["Bob"]), Some(true), "{method}");
        assert_eq!(out.value(&smokes, &["Chris"]), Some(false), "{method}");
        assert_eq!(out.value(&cancer, &["Anna"]), Some(true), "{method}");
        assert_eq!(out.value(&cancer, &["Bob"]), Some(true), "{method}");
        assert_eq!(out.value(&cancer, &["Chris"]), Some(false), "{method}");

        // Evidence query atoms are reported, flagged as such.
        let anna = out
            .atoms
            .iter()
            .find(|a| a.predicate == "Smokes" && a.args == ["Anna"])
            .unwrap();
        assert!(anna.value && anna.evidence);
        assert_eq!(out.atoms.len(), 6);
    }
}

#[test]
fn text_export_lists_every_query_atom() {
    let mln = Problem::from_json(SMOKERS).unwrap().into_mln().unwrap();
    let out = engine(InferenceMethod::Ilp).infer(&mln).unwrap();
    let mut buf = Vec::new();
    write_text(&mut buf, &out.atoms).unwrap();
    let text = String::from_utf8(buf).unwrap();
    assert!(text.lines().any(|l| l == "Cancer(Bob) 1"));
    assert!(text.lines().any(|l| l == "Smokes(Chris) 0"));
    assert_eq!(text.lines().count(), 6);

    let summary = out.summary();
    assert_eq!(summary.method, "ilp");
    assert!(summary.lp_objective.is_some());
    assert_eq!(summary.hard_violations, 0);
}

#[test]
fn tautological_clause_produces_no_constraints() {
    let mut kb = person_kb(&["Anna", "Bob"]);
    kb.add_clause(Clause::new(
        2.0,
        vec![
            Literal::positive(atom("Smokes", &["x"])),
            Literal::negative(atom("Smokes", &["x"])),
        ],
    ))
    .unwrap();
    let mln = Mln::builder(kb)
        .query(AtomSignature::new("Smokes", 1))
        .build()
        .unwrap();

    let (mrf, summary) = engine(InferenceMethod::MaxWalkSat).ground(&mln).unwrap();
    assert_eq!(mrf.constraint_count(), 0);
    assert_eq!(summary.stats.tautologies, 2);
    // Unconstrained query atoms still appear in the network.
    assert_eq!(mrf.atom_count(), 2);
}

#[test]
fn clause_true_by_evidence_is_pruned() {
    let mut kb = person_kb(&["Anna", "Bob"]);
    kb.add_clause(Clause::new(
        1.0,
        vec![
            Literal::positive(atom("Smokes", &["x"])),
            Literal::positive(atom("Cancer", &["x"])),
        ],
    ))
    .unwrap();
    let mln = Mln::builder(kb)
        .query(AtomSignature::new("Cancer", 1))
        .fact(atom("Smokes", &["Anna"]), true)
        .build()
        .unwrap();

    let (mrf, _) = engine(InferenceMethod::MaxWalkSat).ground(&mln).unwrap();
    // Only Bob's grounding survives, reduced to the unit `Cancer(Bob)`.
    assert_eq!(mrf.constraint_count(), 1);
    let c = &mrf.constraints()[0];
    assert!(c.is_unit() && c.is_positive());
    assert_eq!(c.weight, 1.0);
}

#[test]
fn duplicate_clauses_merge_with_summed_weight() {
    let mut kb = person_kb(&["Anna"]);
    for _ in 0..2 {
        kb.add_clause(Clause::new(
            1.0,
            vec![
                Literal::negative(atom("Smokes", &["x"])),
                Literal::positive(atom("Cancer", &["x"])),
            ],
        ))
        .unwrap();
    }
    let mln = Mln::builder(kb)
        .query(AtomSignature::new("Smokes", 1))
        .query(AtomSignature::new("Cancer", 1))
        .build()
        .unwrap();

    let (mrf, _) = engine(InferenceMethod::MaxWalkSat).ground(&mln).unwrap();
    assert_eq!(mrf.constraint_count(), 1);
    let c = &mrf.constraints()[0];
    assert_eq!(c.weight, 2.0);
    assert_eq!(c.dependencies.len(), 2);
}

#[test]
fn hard_disjunction_holds_under_both_methods() {
    let problem = r#"{
        "types": { "thing": ["K"] },
        "predicates": [
            { "name": "A", "args": ["thing"] },
            { "name": "B", "args": ["thing"] }
        ],
        "clauses": [
            { "weight": "inf", "literals": ["A(K)", "B(K)"] },
            { "weight": 1.0, "literals": ["!A(K)"] },
            { "weight": 2.0, "literals": ["!B(K)"] }
        ],
        "query": ["A/1", "B/1"]
    }"#;
    let mln = Problem::from_json(problem).unwrap().into_mln().unwrap();
    let a = AtomSignature::new("A", 1);
    let b = AtomSignature::new("B", 1);

    for method in [InferenceMethod::MaxWalkSat, InferenceMethod::Ilp] {
        let out = engine(method).infer(&mln).unwrap();
        assert_eq!(out.mrf.hard_count(), 1);
        assert_eq!(out.result.hard_violations, 0, "{method}");
        assert_eq!(out.value(&a, &["K"]), Some(true), "{method}");
        assert_eq!(out.value(&b, &["K"]), Some(false), "{method}");
        assert!((out.result.cost - 1.0).abs() < 1e-9);
    }
}

#[test]
fn negative_weights_are_eliminated_end_to_end() {
    let problem = r#"{
        "types": { "person": ["Anna"] },
        "predicates": [
            { "name": "Smokes", "args": ["person"] },
            { "name": "Cancer", "args": ["person"] }
        ],
        "clauses": [
            { "weight": -2.0, "literals": ["Smokes(x)", "Cancer(x)"] }
        ],
        "query": ["Smokes/1", "Cancer/1"]
    }"#;
    let mln = Problem::from_json(problem).unwrap().into_mln().unwrap();

    let mut config = EngineConfig::default();
    config.grounding.eliminate_negative_weights = true;
    config.inference.method = InferenceMethod::Ilp;
    let out = Engine::new(config).unwrap().infer(&mln).unwrap();

    assert_eq!(out.mrf.constraint_count(), 2);
    assert!(out.mrf.constraints().iter().all(|c| c.weight > 0.0 && c.is_unit()));
    assert!(out.atoms.iter().all(|a| !a.value));
    assert!(out.result.cost.abs() < 1e-9);
}

#[test]
fn local_search_rounding_matches_reported_cost() {
    let mln = Problem::from_json(SMOKERS).unwrap().into_mln().unwrap();
    let mut config = EngineConfig::default();
    config.inference.method = InferenceMethod::Ilp;
    config.inference.ilp.rounding = Rounding::LocalSearch;
    let out = Engine::new(config).unwrap().infer(&mln).unwrap();

    // Rebuilding the search state from the assignment gives the same cost.
    let mut state = MrfState::new(&out.mrf);
    state.assign(&out.result.assignment);
    assert!((state.cost() - out.result.cost).abs() < 1e-9);
    assert!((out.mrf.evaluate(&out.result.assignment) - out.result.cost).abs() < 1e-9);
}

#[test]
fn problem_and_config_files_load_from_disk() {
    let dir = tempfile::TempDir::new().unwrap();
    let problem_path = dir.path().join("smokers.json");
    std::fs::write(&problem_path, SMOKERS).unwrap();

    let config_path = dir.path().join("markov-map.toml");
    std::fs::write(
        &config_path,
        "[inference]\nmethod = \"ilp\"\n\n[inference.ilp]\nrounding = \"round_up\"\n",
    )
    .unwrap();

    let config = EngineConfig::load(&config_path).unwrap();
    assert_eq!(config.inference.method, InferenceMethod::Ilp);

    let mln = Problem::load(&problem_path).unwrap().into_mln().unwrap();
    let out = Engine::new(config).unwrap().infer(&mln).unwrap();
    assert_eq!(out.value(&AtomSignature::new("Cancer", 1), &["Bob"]), Some(true));
}
