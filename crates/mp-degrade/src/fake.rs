//! Per-slot fake-object substitution.

use crate::config::FakeRates;
use crate::measured::Provenance;
use crate::pool::{CandidatePool, ConsumedSet};
use crate::truth::{TruthArena, TruthHandle};
use mp_core::{Error, ParticleType, Result};
use rand::Rng;
use serde::Serialize;

/// Fixed positional role of a jet within an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotRole {
    /// Leading b-jet.
    BJetLead,
    /// Subleading b-jet.
    BJetSublead,
    /// Leading W-jet.
    WJetLead,
    /// Subleading W-jet.
    WJetSublead,
}

impl SlotRole {
    /// Role for position `index` (0 = leading) of a jet type.
    pub fn for_position(kind: ParticleType, index: usize) -> Result<Self> {
        match (kind, index) {
            (ParticleType::BJet, 0) => Ok(Self::BJetLead),
            (ParticleType::BJet, 1) => Ok(Self::BJetSublead),
            (ParticleType::HadWJet, 0) => Ok(Self::WJetLead),
            (ParticleType::HadWJet, 1) => Ok(Self::WJetSublead),
            _ => Err(Error::InvariantViolation(format!(
                "no slot for {kind:?} at position {index}"
            ))),
        }
    }

    /// Jet type filled by this slot.
    pub fn kind(self) -> ParticleType {
        match self {
            Self::BJetLead | Self::BJetSublead => ParticleType::BJet,
            Self::WJetLead | Self::WJetSublead => ParticleType::HadWJet,
        }
    }
}

/// Identity decision for one slot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SlotAssignment {
    /// Slot being filled.
    pub role: SlotRole,
    /// The slot's own truth object.
    pub truth: TruthHandle,
    /// Object chosen for the slot, or `None` when the pool was exhausted.
    pub assigned: Option<(TruthHandle, Provenance)>,
    /// Pool position of the drawn object, for pool draws.
    pub pool_index: Option<usize>,
}

impl SlotAssignment {
    /// `true` when a pool object replaced the truth object.
    pub fn is_fake(&self) -> bool {
        self.assigned.is_none_or(|(_, p)| p.is_fake())
    }
}

/// Decides per slot whether the truth object is kept or replaced from a pool.
#[derive(Debug, Clone, PartialEq)]
pub struct FakeSubstitutionSampler {
    rates: FakeRates,
}

impl FakeSubstitutionSampler {
    /// Sampler with per-slot substitution rates.
    pub fn new(rates: FakeRates) -> Self {
        Self { rates }
    }

    /// Substitution probability of a slot.
    pub fn rate(&self, role: SlotRole) -> f64 {
        match role {
            SlotRole::BJetLead => self.rates.bjet_lead,
            SlotRole::BJetSublead => self.rates.bjet_sublead,
            SlotRole::WJetLead => self.rates.wjet_lead,
            SlotRole::WJetSublead => self.rates.wjet_sublead,
        }
    }

    /// Decide one slot.
    ///
    /// One uniform draw `u` is always taken. The truth object is kept when
    /// `u > rate` and it has not been consumed by an earlier slot; otherwise a
    /// pool draw replaces it, or the slot stays empty if the pool is exhausted.
    pub fn assign<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        role: SlotRole,
        truth: TruthHandle,
        pool: &CandidatePool,
        consumed: &mut ConsumedSet,
        arena: &TruthArena,
    ) -> Result<SlotAssignment> {
        let u: f64 = rng.random();
        if u > self.rate(role) && !consumed.contains(truth) {
            return Ok(SlotAssignment {
                role,
                truth,
                assigned: Some((truth, Provenance::Genuine)),
                pool_index: None,
            });
        }
        match pool.draw(rng, consumed)? {
            Some((idx, handle)) => {
                let provenance = Provenance::of_pool_entry(arena.resolve(handle)?.category);
                Ok(SlotAssignment {
                    role,
                    truth,
                    assigned: Some((handle, provenance)),
                    pool_index: Some(idx),
                })
            }
            None => Ok(SlotAssignment { role, truth, assigned: None, pool_index: None }),
        }
    }
}
