//! Atom identity codec: ground atom <-> dense integer id.
//!
//! Every predicate signature owns a contiguous id interval whose size is the
//! product of its argument domain sizes. Encoding is mixed-radix arithmetic over
//! the constant indices; decoding is a binary search for the owning interval
//! followed by the inverse digit extraction. Ids start at 1: 0 is never a valid
//! atom id, so a signed literal `±id` is never zero.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use crate::error::IdentityError;
use crate::logic::AtomSignature;

/// Dense ground atom identifier (always >= 1).
pub type AtomId = u32;

/// Result type for identity operations.
pub type IdentityResult<T> = std::result::Result<T, IdentityError>;

/// Largest usable atom id: literals are `i32`, so ids stay below `i32::MAX`.
const MAX_ATOM_ID: u64 = i32::MAX as u64;

/// Ordered, indexed set of constants of one type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstantsSet {
    constants: Vec<String>,
    index: HashMap<String, usize>,
}

impl ConstantsSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a constant, returning its index. Existing constants keep their index.
    pub fn insert(&mut self, constant: impl Into<String>) -> usize {
        let constant = constant.into();
        if let Some(&idx) = self.index.get(&constant) {
            return idx;
        }
        let idx = self.constants.len();
        self.index.insert(constant.clone(), idx);
        self.constants.push(constant);
        idx
    }

    pub fn get(&self, constant: &str) -> Option<usize> {
        self.index.get(constant).copied()
    }

    pub fn at(&self, idx: usize) -> Option<&str> {
        self.constants.get(idx).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.constants.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for ConstantsSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = ConstantsSet::new();
        for c in iter {
            set.insert(c);
        }
        set
    }
}

/// Id interval and mixed-radix layout of one predicate signature.
#[derive(Debug, Clone)]
pub struct AtomIdentity {
    signature: AtomSignature,
    start: AtomId,
    len: u32,
    domains: Vec<Arc<ConstantsSet>>,
    /// Place value of each argument position (last argument varies fastest).
    strides: Vec<u32>,
}

impl AtomIdentity {
    fn new(
        signature: AtomSignature,
        start: AtomId,
        domains: Vec<Arc<ConstantsSet>>,
    ) -> IdentityResult<Self> {
        let mut strides = vec![0u32; domains.len()];
        let mut size: u64 = 1;
        for (pos, domain) in domains.iter().enumerate().rev() {
            strides[pos] = size as u32;
            size = size.saturating_mul(domain.len() as u64);
            if start as u64 + size > MAX_ATOM_ID {
                return Err(IdentityError::DomainOverflow {
                    signature: signature.to_string(),
                    start: start as u64,
                    required: size,
                });
            }
        }
        Ok(Self {
            signature,
            start,
            len: size as u32,
            domains,
            strides,
        })
    }

    pub fn signature(&self) -> &AtomSignature {
        &self.signature
    }

    /// First id of the interval.
    pub fn start(&self) -> AtomId {
        self.start
    }

    /// One past the last id of the interval.
    pub fn end(&self) -> AtomId {
        self.start + self.len
    }

    /// Number of ground atoms of this signature.
    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, id: AtomId) -> bool {
        id >= self.start && id < self.end()
    }

    pub fn domain(&self, position: usize) -> Option<&Arc<ConstantsSet>> {
        self.domains.get(position)
    }

    /// Encode constant names; `None` when a constant is outside its argument domain.
    pub fn encode(&self, constants: &[&str]) -> Option<AtomId> {
        if constants.len() != self.domains.len() {
            return None;
        }
        let mut offset = 0u32;
        for ((constant, domain), stride) in constants.iter().zip(&self.domains).zip(&self.strides)
        {
            offset += domain.get(constant)? as u32 * stride;
        }
        Some(self.start + offset)
    }

    /// Encode per-argument domain indices; `None` when an index is out of range.
    pub fn encode_indices(&self, indices: &[usize]) -> Option<AtomId> {
        if indices.len() != self.domains.len() {
            return None;
        }
        let mut offset = 0u32;
        for ((&idx, domain), stride) in indices.iter().zip(&self.domains).zip(&self.strides) {
            if idx >= domain.len() {
                return None;
            }
            offset += idx as u32 * stride;
        }
        Some(self.start + offset)
    }

    /// Per-argument domain indices of an id in this interval.
    pub fn decode_indices(&self, id: AtomId) -> Option<Vec<usize>> {
        if !self.contains(id) {
            return None;
        }
        let mut rest = id - self.start;
        let mut indices = Vec::with_capacity(self.strides.len());
        for &stride in &self.strides {
            indices.push((rest / stride) as usize);
            rest %= stride;
        }
        Some(indices)
    }

    /// Constant names of an id in this interval.
    pub fn decode(&self, id: AtomId) -> Option<Vec<String>> {
        let indices = self.decode_indices(id)?;
        indices
            .iter()
            .zip(&self.domains)
            .map(|(&idx, domain)| domain.at(idx).map(str::to_string))
            .collect()
    }
}

/// Global bijection over all schema predicates.
#[derive(Debug, Clone, Default)]
pub struct IdentityMap {
    identities: BTreeMap<AtomSignature, AtomIdentity>,
    /// `(start, signature)` sorted by start, for decoding.
    intervals: Vec<(AtomId, AtomSignature)>,
    query_range: Option<(AtomId, AtomId)>,
    next: AtomId,
}

impl IdentityMap {
    /// Lay out id intervals. Query signatures come first so that query atom ids
    /// form one contiguous range.
    pub fn build(
        schema: &BTreeMap<AtomSignature, Vec<Arc<ConstantsSet>>>,
        query: &BTreeSet<AtomSignature>,
    ) -> IdentityResult<Self> {
        let mut map = IdentityMap {
            next: 1,
            ..Default::default()
        };
        let query_first = schema
            .iter()
            .filter(|(sig, _)| query.contains(*sig))
            .chain(schema.iter().filter(|(sig, _)| !query.contains(*sig)));

        let mut query_end = None;
        for (sig, domains) in query_first {
            let identity = AtomIdentity::new(sig.clone(), map.next, domains.clone())?;
            map.next = identity.end();
            if query.contains(sig) {
                query_end = Some(identity.end());
            }
            if !identity.is_empty() {
                map.intervals.push((identity.start(), sig.clone()));
            }
            map.identities.insert(sig.clone(), identity);
        }
        map.query_range = query_end.filter(|&end| end > 1).map(|end| (1, end - 1));

        tracing::debug!(
            signatures = map.identities.len(),
            atoms = map.next - 1,
            "atom identity map built"
        );
        Ok(map)
    }

    pub fn get(&self, signature: &AtomSignature) -> Option<&AtomIdentity> {
        self.identities.get(signature)
    }

    pub fn identity(&self, signature: &AtomSignature) -> IdentityResult<&AtomIdentity> {
        self.get(signature)
            .ok_or_else(|| IdentityError::UnknownSignature {
                signature: signature.to_string(),
            })
    }

    pub fn encode(&self, signature: &AtomSignature, constants: &[&str]) -> Option<AtomId> {
        self.identities.get(signature)?.encode(constants)
    }

    /// Identity that owns `id`.
    pub fn owner(&self, id: AtomId) -> IdentityResult<&AtomIdentity> {
        let pos = self.intervals.partition_point(|(start, _)| *start <= id);
        pos.checked_sub(1)
            .and_then(|p| self.identities.get(&self.intervals[p].1))
            .filter(|identity| identity.contains(id))
            .ok_or(IdentityError::UnknownAtomId { id })
    }

    pub fn decode(&self, id: AtomId) -> IdentityResult<(AtomSignature, Vec<String>)> {
        let identity = self.owner(id)?;
        let constants = identity
            .decode(id)
            .ok_or(IdentityError::UnknownAtomId { id })?;
        Ok((identity.signature().clone(), constants))
    }

    /// Inclusive `[start, end]` range of query atom ids, if any query atom exists.
    pub fn query_range(&self) -> Option<(AtomId, AtomId)> {
        self.query_range
    }

    pub fn is_query_atom(&self, id: AtomId) -> bool {
        self.query_range
            .is_some_and(|(start, end)| id >= start && id <= end)
    }

    /// Total number of ground atoms over all signatures.
    pub fn atom_count(&self) -> u32 {
        self.next.saturating_sub(1)
    }

    pub fn identities(&self) -> impl Iterator<Item = &AtomIdentity> {
        self.identities.values()
    }
}
