//! Clique register: partitioned accumulation of ground clauses.
//!
//! Ground clauses are keyed by a content hash of their sorted literal array.
//! The key picks one of `n` partitions (`key % n`); each partition is a
//! `DashMap`, so concurrent grounders writing to different keys never contend
//! on the same entry. Identical ground clauses coalesce by summing
//! `freq * weight`. Sums are kept per source clause and folded in clause index
//! order on read, so the result does not depend on which worker arrived first.

use std::collections::BTreeMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::num::NonZeroU64;

use dashmap::DashMap;

/// Content-derived identity of a ground clause. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ConstraintKey(NonZeroU64);

impl ConstraintKey {
    /// Key of a sorted literal array. A zero hash is remapped to 1.
    pub fn of(sorted_literals: &[i32]) -> Self {
        let mut hasher = DefaultHasher::new();
        sorted_literals.hash(&mut hasher);
        let raw = hasher.finish();
        ConstraintKey(NonZeroU64::new(raw).unwrap_or(NonZeroU64::MIN))
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl std::fmt::Display for ConstraintKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "clique:{:016x}", self.0)
    }
}

/// One grounding emitted by a clause grounder.
#[derive(Debug, Clone, PartialEq)]
pub struct CliqueEntry {
    pub key: ConstraintKey,
    /// Per-occurrence weight (infinite for hard clauses).
    pub weight: f64,
    /// Sorted, duplicate-free signed atom ids.
    pub literals: Vec<i32>,
    pub clause_index: usize,
    /// `+1`, or `-1` when the literals were negated relative to the source clause.
    pub freq: i32,
}

impl CliqueEntry {
    /// Build an entry from literals in any order.
    pub fn new(mut literals: Vec<i32>, weight: f64, clause_index: usize, freq: i32) -> Self {
        literals.sort_unstable();
        literals.dedup();
        Self {
            key: ConstraintKey::of(&literals),
            weight,
            literals,
            clause_index,
            freq,
        }
    }

    fn contribution(&self) -> f64 {
        self.freq as f64 * self.weight
    }
}

/// Accumulated ground clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Clique {
    pub literals: Vec<i32>,
    pub weight: f64,
    /// Source clause index -> summed frequency.
    pub dependencies: BTreeMap<usize, i32>,
}

impl Clique {
    pub fn is_hard(&self) -> bool {
        self.weight.is_infinite()
    }
}

/// Clique under accumulation: `(summed freq, summed contribution)` per source clause.
#[derive(Debug, Clone)]
struct Accumulator {
    literals: Vec<i32>,
    per_clause: BTreeMap<usize, (i32, f64)>,
}

impl Accumulator {
    fn to_clique(&self) -> Clique {
        Clique {
            literals: self.literals.clone(),
            weight: self.weight(),
            dependencies: self.dependencies(),
        }
    }

    fn into_clique(self) -> Clique {
        let weight = self.weight();
        let dependencies = self.dependencies();
        Clique {
            literals: self.literals,
            weight,
            dependencies,
        }
    }

    fn weight(&self) -> f64 {
        self.per_clause.values().fold(0.0, |acc, &(_, sum)| acc + sum)
    }

    fn dependencies(&self) -> BTreeMap<usize, i32> {
        self.per_clause
            .iter()
            .map(|(&clause, &(freq, _))| (clause, freq))
            .collect()
    }
}

/// Partitioned, thread-safe clique register.
pub struct CliqueRegistry {
    /// Hash collisions keep separate cliques under one key.
    partitions: Vec<DashMap<ConstraintKey, Vec<Accumulator>>>,
}

impl CliqueRegistry {
    pub fn new(partitions: usize) -> Self {
        let n = partitions.max(1);
        Self {
            partitions: (0..n).map(|_| DashMap::new()).collect(),
        }
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    pub fn partition_of(&self, key: ConstraintKey) -> usize {
        (key.get() % self.partitions.len() as u64) as usize
    }

    /// Accumulate one grounding.
    pub fn register(&self, entry: CliqueEntry) {
        let partition = &self.partitions[self.partition_of(entry.key)];
        let contribution = entry.contribution();
        let mut slot = partition.entry(entry.key).or_default();
        // One clause is ground by one worker, so each per-clause sum sees a fixed order.
        match slot.iter_mut().find(|c| c.literals == entry.literals) {
            Some(acc) => {
                let (freq, sum) = acc.per_clause.entry(entry.clause_index).or_insert((0, 0.0));
                *freq += entry.freq;
                *sum += contribution;
            }
            None => {
                let mut per_clause = BTreeMap::new();
                per_clause.insert(entry.clause_index, (entry.freq, contribution));
                slot.push(Accumulator {
                    literals: entry.literals,
                    per_clause,
                });
            }
        }
    }

    /// Number of distinct ground clauses.
    pub fn len(&self) -> usize {
        self.partitions
            .iter()
            .map(|p| p.iter().map(|e| e.value().len()).sum::<usize>())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.iter().all(|p| p.is_empty())
    }

    /// Accumulated clique for a literal set, if registered.
    pub fn get(&self, literals: &[i32]) -> Option<Clique> {
        let mut sorted = literals.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        let key = ConstraintKey::of(&sorted);
        let partition = &self.partitions[self.partition_of(key)];
        let slot = partition.get(&key)?;
        slot.iter()
            .find(|c| c.literals == sorted)
            .map(Accumulator::to_clique)
    }

    /// Drain into `(key, clique)` pairs in deterministic (key, literals) order.
    pub fn into_cliques(self) -> Vec<(ConstraintKey, Clique)> {
        let mut out: Vec<(ConstraintKey, Clique)> = self
            .partitions
            .into_iter()
            .flat_map(|p| p.into_iter())
            .flat_map(|(key, cliques)| {
                cliques
                    .into_iter()
                    .map(move |c| (key, c.into_clique()))
            })
            .collect();
        out.sort_by(|(ka, a), (kb, b)| ka.cmp(kb).then_with(|| a.literals.cmp(&b.literals)));
        out
    }
}

impl Default for CliqueRegistry {
    fn default() -> Self {
        Self::new(rayon::current_num_threads())
    }
}

impl std::fmt::Debug for CliqueRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CliqueRegistry")
            .field("partitions", &self.partitions.len())
            .field("cliques", &self.len())
            .finish()
    }
}
