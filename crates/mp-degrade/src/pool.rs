//! Candidate pools for fake substitution.

use crate::truth::TruthHandle;
use mp_core::{Error, Result};
use rand::Rng;
use std::collections::BTreeSet;

/// Truth objects already used by some slot in the current event.
///
/// Shared by every pool of the event, so an object is drawn at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumedSet {
    handles: BTreeSet<TruthHandle>,
}

impl ConsumedSet {
    /// Empty set, one per event.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `handle` was already used this event.
    pub fn contains(&self, handle: TruthHandle) -> bool {
        self.handles.contains(&handle)
    }

    /// Mark `handle` as used; returns `false` if it already was.
    pub fn insert(&mut self, handle: TruthHandle) -> bool {
        self.handles.insert(handle)
    }

    /// Number of consumed objects.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether nothing has been consumed yet.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Consumed handles in arena order.
    pub fn iter(&self) -> impl Iterator<Item = TruthHandle> + '_ {
        self.handles.iter().copied()
    }
}

/// Ordered list of substitution candidates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidatePool {
    entries: Vec<TruthHandle>,
}

impl CandidatePool {
    /// Pool over `entries`, kept in the given order.
    pub fn new(entries: Vec<TruthHandle>) -> Self {
        Self { entries }
    }

    /// Number of entries, consumed or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the pool has no entries at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in pool order.
    pub fn entries(&self) -> &[TruthHandle] {
        &self.entries
    }

    /// Number of entries not yet consumed.
    pub fn remaining(&self, consumed: &ConsumedSet) -> usize {
        self.entries.iter().filter(|&&h| !consumed.contains(h)).count()
    }

    /// Pool indices whose entry has been consumed.
    pub fn consumed_indices(&self, consumed: &ConsumedSet) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|&(_, &h)| consumed.contains(h))
            .map(|(i, _)| i)
            .collect()
    }

    /// Draw uniformly among unused entries by rejection sampling and mark the draw consumed.
    ///
    /// Returns `None` when every entry is used.
    pub fn draw<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        consumed: &mut ConsumedSet,
    ) -> Result<Option<(usize, TruthHandle)>> {
        if self.remaining(consumed) == 0 {
            return Ok(None);
        }
        loop {
            let idx = rng.random_range(0..self.entries.len());
            let handle = *self.entries.get(idx).ok_or_else(|| {
                Error::InvariantViolation(format!(
                    "sampled pool index {idx} out of range (pool size {})",
                    self.entries.len()
                ))
            })?;
            if consumed.insert(handle) {
                return Ok(Some((idx, handle)));
            }
        }
    }
}
