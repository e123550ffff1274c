//! Three-state evidence databases addressed by ground atom id.
//!
//! One [`EvidenceDb`] per predicate signature. Atoms without an explicit fact
//! take the database default: FALSE under the closed-world assumption, UNKNOWN
//! under the open-world assumption (query and hidden predicates).

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ground::identity::{AtomId, AtomIdentity};
use crate::logic::AtomSignature;

/// Truth value of a ground atom in evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriState {
    True,
    False,
    Unknown,
}

impl TriState {
    pub fn from_bool(value: bool) -> Self {
        if value { TriState::True } else { TriState::False }
    }

    pub fn is_known(self) -> bool {
        self != TriState::Unknown
    }

    pub fn as_bool(self) -> Option<bool> {
        match self {
            TriState::True => Some(true),
            TriState::False => Some(false),
            TriState::Unknown => None,
        }
    }
}

impl fmt::Display for TriState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriState::True => f.write_str("TRUE"),
            TriState::False => f.write_str("FALSE"),
            TriState::Unknown => f.write_str("UNKNOWN"),
        }
    }
}

/// World assumption applied to atoms without explicit facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorldAssumption {
    Closed,
    Open,
}

impl WorldAssumption {
    fn default_state(self) -> TriState {
        match self {
            WorldAssumption::Closed => TriState::False,
            WorldAssumption::Open => TriState::Unknown,
        }
    }
}

/// Evidence for one predicate signature.
#[derive(Debug, Clone)]
pub struct EvidenceDb {
    identity: AtomIdentity,
    assumption: WorldAssumption,
    facts: HashMap<AtomId, bool>,
    true_count: usize,
}

impl EvidenceDb {
    pub fn new(identity: AtomIdentity, assumption: WorldAssumption) -> Self {
        Self {
            identity,
            assumption,
            facts: HashMap::new(),
            true_count: 0,
        }
    }

    pub fn signature(&self) -> &AtomSignature {
        self.identity.signature()
    }

    pub fn identity(&self) -> &AtomIdentity {
        &self.identity
    }

    pub fn assumption(&self) -> WorldAssumption {
        self.assumption
    }

    /// Record a fact; the last write for an atom wins.
    pub fn set(&mut self, id: AtomId, value: bool) {
        match self.facts.insert(id, value) {
            Some(true) if !value => self.true_count -= 1,
            Some(false) | None if value => self.true_count += 1,
            _ => {}
        }
    }

    pub fn get(&self, id: AtomId) -> TriState {
        match self.facts.get(&id) {
            Some(&value) => TriState::from_bool(value),
            None => self.assumption.default_state(),
        }
    }

    /// Number of explicit facts.
    pub fn fact_count(&self) -> usize {
        self.facts.len()
    }

    pub fn true_fact_count(&self) -> usize {
        self.true_count
    }

    /// True when some atom of this signature can still be UNKNOWN.
    pub fn has_unknown(&self) -> bool {
        self.assumption == WorldAssumption::Open && self.facts.len() < self.identity.len() as usize
    }

    /// Ids in this signature's interval whose state is UNKNOWN.
    pub fn unknown_ids(&self) -> impl Iterator<Item = AtomId> + '_ {
        let open = self.assumption == WorldAssumption::Open;
        (self.identity.start()..self.identity.end())
            .filter(move |id| open && !self.facts.contains_key(id))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::Arc;

    use super::*;
    use crate::ground::identity::{ConstantsSet, IdentityMap};

    fn identity() -> AtomIdentity {
        let persons: Arc<ConstantsSet> = Arc::new(["Anna", "Bob"].into_iter().collect());
        let mut schema = BTreeMap::new();
        schema.insert(AtomSignature::new("Smokes", 1), vec![persons]);
        let map = IdentityMap::build(&schema, &BTreeSet::new()).unwrap();
        map.get(&AtomSignature::new("Smokes", 1)).unwrap().clone()
    }

    #[test]
    fn closed_world_defaults_to_false() {
        let id = identity();
        let anna = id.encode(&["Anna"]).unwrap();
        let bob = id.encode(&["Bob"]).unwrap();
        let mut db = EvidenceDb::new(id, WorldAssumption::Closed);
        db.set(anna, true);
        assert_eq!(db.get(anna), TriState::True);
        assert_eq!(db.get(bob), TriState::False);
        assert!(!db.has_unknown());
        assert_eq!(db.unknown_ids().count(), 0);
    }

    #[test]
    fn open_world_defaults_to_unknown() {
        let id = identity();
        let anna = id.encode(&["Anna"]).unwrap();
        let bob = id.encode(&["Bob"]).unwrap();
        let mut db = EvidenceDb::new(id, WorldAssumption::Open);
        db.set(anna, false);
        assert_eq!(db.get(anna), TriState::False);
        assert_eq!(db.get(bob), TriState::Unknown);
        assert_eq!(db.unknown_ids().collect::<Vec<_>>(), vec![bob]);
    }

    #[test]
    fn true_count_tracks_overwrites() {
        let id = identity();
        let anna = id.encode(&["Anna"]).unwrap();
        let mut db = EvidenceDb::new(id, WorldAssumption::Closed);
        db.set(anna, true);
        db.set(anna, true);
        assert_eq!(db.true_fact_count(), 1);
        db.set(anna, false);
        assert_eq!(db.true_fact_count(), 0);
        assert_eq!(db.fact_count(), 1);
    }
}
