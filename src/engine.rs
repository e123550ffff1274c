//! Engine facade: top-level API for markov-map.
//!
//! The `Engine` owns the configuration and runs the whole pipeline:
//! grounding, MAP inference with the configured method, and decoding of the
//! query atoms.

use std::collections::HashMap;

use crate::config::{EngineConfig, InferenceMethod};
use crate::error::MlnResult;
use crate::export::{AtomExport, ResultExport, SummaryExport, decode_results};
use crate::ground::{AtomId, Grounding, GroundingSummary};
use crate::infer::{IlpInference, MapInference, MapResult, MaxWalkSat};
use crate::kb::Mln;
use crate::logic::AtomSignature;
use crate::mrf::Mrf;

/// The markov-map MAP inference engine.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    config: EngineConfig,
}

impl Engine {
    /// Create a new engine with the given configuration.
    pub fn new(config: EngineConfig) -> MlnResult<Self> {
        config.validate()?;
        tracing::info!(
            method = %config.inference.method,
            partitions = config.grounding.partition_count(),
            "initializing markov-map engine"
        );
        Ok(Self { config })
    }

    /// Get the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Ground the MLN into a network.
    pub fn ground(&self, mln: &Mln) -> MlnResult<(Mrf, GroundingSummary)> {
        let grounding = &self.config.grounding;
        let (mrf, summary) = Grounding::new(mln, grounding.options())
            .partitions(grounding.partition_count())
            .max_rounds(grounding.max_rounds)
            .run()?;
        Ok((mrf, summary))
    }

    /// Ground, infer with the configured method and decode the query atoms.
    pub fn infer(&self, mln: &Mln) -> MlnResult<InferenceOutput> {
        let (mrf, grounding) = self.ground(mln)?;
        let inference = &self.config.inference;

        let result = match inference.method {
            InferenceMethod::MaxWalkSat => MaxWalkSat::new(inference.maxwalksat.clone()).infer(&mrf)?,
            InferenceMethod::Ilp => {
                let mut ilp = IlpInference::new(inference.ilp.clone(), inference.maxwalksat.clone());
                if inference.ilp.loss_augmented && mln.has_annotation() {
                    ilp = ilp.with_annotation(annotation_of(mln, &mrf));
                }
                ilp.infer(&mrf)?
            }
        };

        let atoms = decode_results(mln, &mrf, &result);
        tracing::info!(
            method = %inference.method,
            cost = result.cost,
            hard_violations = result.hard_violations,
            query_atoms = atoms.len(),
            "inference complete"
        );
        Ok(InferenceOutput {
            method: inference.method,
            mrf,
            grounding,
            result,
            atoms,
        })
    }
}

fn annotation_of(mln: &Mln, mrf: &Mrf) -> HashMap<AtomId, bool> {
    mrf.atoms()
        .iter()
        .filter_map(|a| mln.annotation_state(a.id).map(|v| (a.id, v)))
        .collect()
}

/// Everything one inference run produced.
#[derive(Debug, Clone)]
pub struct InferenceOutput {
    pub method: InferenceMethod,
    pub mrf: Mrf,
    pub grounding: GroundingSummary,
    pub result: MapResult,
    pub atoms: Vec<AtomExport>,
}

impl InferenceOutput {
    /// Inferred (or evidence) value of a query atom.
    pub fn value(&self, signature: &AtomSignature, args: &[&str]) -> Option<bool> {
        self.atoms
            .iter()
            .find(|a| {
                a.predicate == signature.symbol
                    && a.args.len() == args.len()
                    && a.args.iter().zip(args).all(|(x, y)| x == y)
            })
            .map(|a| a.value)
    }

    pub fn summary(&self) -> SummaryExport {
        let stats = &self.result.stats;
        SummaryExport {
            method: self.method.to_string(),
            ground_atoms: self.mrf.atom_count(),
            ground_clauses: self.mrf.constraint_count(),
            hard_clauses: self.mrf.hard_count(),
            grounding_rounds: self.grounding.rounds,
            non_integral: stats.non_integral,
            cost: self.result.cost,
            hard_violations: self.result.hard_violations,
            lp_objective: stats.lp_objective,
            grounding_ms: self.grounding.elapsed.as_millis() as u64,
            translation_ms: stats.translation.as_millis() as u64,
            solve_ms: stats.solve.as_millis() as u64,
            rounding_ms: stats.rounding.as_millis() as u64,
        }
    }

    pub fn export(&self) -> ResultExport {
        ResultExport {
            summary: self.summary(),
            atoms: self.atoms.clone(),
        }
    }
}
