//! Export types for inference results.
//!
//! Results are decoded back to predicate names and constants, restricted to
//! the query atom id range. Query atoms settled by evidence are reported with
//! their evidence value; atoms that fail to decode are logged and skipped.

use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::ground::AtomId;
use crate::infer::MapResult;
use crate::kb::{Mln, TriState};
use crate::mrf::Mrf;

/// One decoded query atom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomExport {
    /// Ground atom id.
    pub id: AtomId,
    /// Predicate signature, e.g. `Cancer/1`.
    pub signature: String,
    pub predicate: String,
    pub args: Vec<String>,
    pub value: bool,
    /// Value came from evidence rather than inference.
    pub evidence: bool,
}

impl std::fmt::Display for AtomExport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}({}) {}",
            self.predicate,
            self.args.join(","),
            u8::from(self.value)
        )
    }
}

/// Summary counters and timings of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryExport {
    pub method: String,
    pub ground_atoms: usize,
    pub ground_clauses: usize,
    pub hard_clauses: usize,
    pub grounding_rounds: usize,
    pub non_integral: usize,
    pub cost: f64,
    pub hard_violations: usize,
    pub lp_objective: Option<f64>,
    pub grounding_ms: u64,
    pub translation_ms: u64,
    pub solve_ms: u64,
    pub rounding_ms: u64,
}

impl std::fmt::Display for SummaryExport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "markov-map {}", self.method)?;
        writeln!(f, "  ground atoms:    {}", self.ground_atoms)?;
        writeln!(
            f,
            "  ground clauses:  {} ({} hard)",
            self.ground_clauses, self.hard_clauses
        )?;
        writeln!(f, "  grounding:       {} rounds, {} ms", self.grounding_rounds, self.grounding_ms)?;
        if let Some(objective) = self.lp_objective {
            writeln!(f, "  lp objective:    {objective:.4}")?;
            writeln!(f, "  non-integral:    {}", self.non_integral)?;
        }
        writeln!(f, "  solve:           {} ms", self.translation_ms + self.solve_ms + self.rounding_ms)?;
        write!(
            f,
            "  cost:            {:.4} ({} hard violations)",
            self.cost, self.hard_violations
        )
    }
}

/// Full JSON document written by [`write_json`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultExport {
    pub summary: SummaryExport,
    pub atoms: Vec<AtomExport>,
}

/// Decode the assignment of every query atom.
pub fn decode_results(mln: &Mln, mrf: &Mrf, result: &MapResult) -> Vec<AtomExport> {
    let Some((start, end)) = mln.identities().query_range() else {
        return Vec::new();
    };
    let mut out = Vec::with_capacity((end - start + 1) as usize);
    for id in start..=end {
        let (signature, args) = match mln.identities().decode(id) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!(id, error = %e, "failed to decode query atom; skipping");
                continue;
            }
        };
        let (value, evidence) = match mln.evidence_state(id) {
            TriState::Unknown => (result.value_of(mrf, id).unwrap_or(false), false),
            known => (known == TriState::True, true),
        };
        out.push(AtomExport {
            id,
            signature: signature.to_string(),
            predicate: signature.symbol,
            args,
            value,
            evidence,
        });
    }
    out
}

/// One `Pred(A,B) 0|1` line per atom.
pub fn write_text<W: Write>(mut writer: W, atoms: &[AtomExport]) -> std::io::Result<()> {
    for atom in atoms {
        writeln!(writer, "{atom}")?;
    }
    writer.flush()
}

/// Pretty-printed JSON document.
pub fn write_json<W: Write>(mut writer: W, export: &ResultExport) -> std::io::Result<()> {
    serde_json::to_writer_pretty(&mut writer, export)?;
    writeln!(writer)?;
    writer.flush()
}
