// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # markov-map
//!
//! Grounding and MAP inference for Markov Logic Networks.
//!
//! ## Architecture
//!
//! - **Knowledge base** (`kb`, `logic`): typed predicates, weighted CNF clauses,
//!   evidence under closed/open world assumptions and dynamic predicates
//! - **Grounding** (`ground`): dense atom ids, odometer enumeration with
//!   evidence-driven pruning, parallel deduplicating clique registry
//! - **Network** (`mrf`): ground constraints plus incremental search state
//! - **Inference** (`infer`, `lp`): MaxWalkSAT local search, and an LP
//!   relaxation solved by an in-process simplex followed by rounding
//!
//! ## Library usage
//!
//! ```no_run
//! use markov_map::config::EngineConfig;
//! use markov_map::engine::Engine;
//! use markov_map::problem::Problem;
//!
//! let mln = Problem::load("smokers.json".as_ref()).unwrap().into_mln().unwrap();
//! let engine = Engine::new(EngineConfig::default()).unwrap();
//! let outcome = engine.infer(&mln).unwrap();
//! for atom in &outcome.atoms {
//!     println!("{atom}");
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod ground;
pub mod infer;
pub mod kb;
pub mod logic;
pub mod lp;
pub mod mrf;
pub mod problem;
