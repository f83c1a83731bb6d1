//! Measured (degraded) objects and their provenance.

use crate::truth::{TruthCategory, TruthHandle, TruthParticle};
use mp_core::types::{BOTTOM_QUARK_MASS, ELECTRON_MASS, MUON_MASS};
use mp_core::{EngineParticle, Error, ParticleType, Result};
use serde::{Deserialize, Serialize};

/// How a measured object relates to the truth object of its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// The slot's own truth object.
    Genuine,
    /// A truth object from another decay category (e.g. a W-jet used as a b-jet).
    Substituted,
    /// An extra generator jet drawn from the candidate pool.
    PoolDraw,
}

impl Provenance {
    /// `true` for anything but [`Provenance::Genuine`].
    pub fn is_fake(self) -> bool {
        self != Self::Genuine
    }

    /// Provenance of a pool entry, from its truth category.
    pub fn of_pool_entry(category: TruthCategory) -> Self {
        match category {
            TruthCategory::GenJet => Self::PoolDraw,
            TruthCategory::Lepton | TruthCategory::BQuark | TruthCategory::WQuark => {
                Self::Substituted
            }
        }
    }
}

/// Measured object: engine-facing kinematics plus provenance and truth source.
///
/// Leptons are always genuine; only jets can be substituted or smeared.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeasuredParticle {
    particle: EngineParticle,
    provenance: Provenance,
    source: TruthHandle,
}

impl MeasuredParticle {
    /// Lepton copied from truth. Anything but an electron or muon is an invariant violation.
    pub fn lepton(source: TruthHandle, truth: &TruthParticle) -> Result<Self> {
        let (kind, mass) = match truth.pdg_id.abs() {
            11 => (ParticleType::Electron, ELECTRON_MASS),
            13 => (ParticleType::Muon, MUON_MASS),
            other => {
                return Err(Error::InvariantViolation(format!(
                    "unresolved lepton type for pdg id {other}"
                )));
            }
        };
        let charge = if truth.pdg_id > 0 { -1 } else { 1 };
        let (pt, eta, phi) = (truth.pt, truth.eta, truth.phi);
        Ok(Self {
            particle: EngineParticle { kind, pt, eta, phi, mass, charge },
            provenance: Provenance::Genuine,
            source,
        })
    }

    /// Jet with a (possibly smeared) pt and the direction of its source object.
    ///
    /// b-jets carry the b-quark mass; W-jets keep the source mass.
    pub fn jet(
        kind: ParticleType,
        pt: f64,
        source: TruthHandle,
        truth: &TruthParticle,
        provenance: Provenance,
    ) -> Result<Self> {
        let mass = match kind {
            ParticleType::BJet => BOTTOM_QUARK_MASS,
            ParticleType::HadWJet => truth.mass,
            ParticleType::Electron | ParticleType::Muon => {
                return Err(Error::InvariantViolation(format!("{kind:?} is not a jet type")));
            }
        };
        Ok(Self {
            particle: EngineParticle { kind, pt, eta: truth.eta, phi: truth.phi, mass, charge: 0 },
            provenance,
            source,
        })
    }

    /// Kinematics as seen by the engine.
    pub fn particle(&self) -> &EngineParticle {
        &self.particle
    }

    /// Object type.
    pub fn kind(&self) -> ParticleType {
        self.particle.kind
    }

    /// Measured transverse momentum.
    pub fn pt(&self) -> f64 {
        self.particle.pt
    }

    /// Relation to the slot's truth object.
    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    /// Whether the object is not the slot's own truth object.
    pub fn is_fake(&self) -> bool {
        self.provenance.is_fake()
    }

    /// Truth object this measurement was built from.
    pub fn source(&self) -> TruthHandle {
        self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::truth::TruthArena;

    fn truth(category: TruthCategory, pdg_id: i32, mass: f64) -> TruthParticle {
        TruthParticle { category, pt: 42.0, eta: 0.3, phi: -1.2, mass, pdg_id, charge: 0 }
    }

    #[test]
    fn test_lepton_type_and_charge() {
        let mut arena = TruthArena::new();
        let t = truth(TruthCategory::Lepton, -11, 0.0);
        let h = arena.push(t);
        let m = MeasuredParticle::lepton(h, &t).unwrap();
        assert_eq!(m.kind(), ParticleType::Electron);
        assert_eq!(m.particle().charge, 1);
        assert_eq!(m.particle().pdg_id(), -11);
        assert!(!m.is_fake());
        assert_eq!(m.source(), h);
    }

    #[test]
    fn test_tau_is_invariant_violation() {
        let mut arena = TruthArena::new();
        let t = truth(TruthCategory::Lepton, 15, 1.777);
        let h = arena.push(t);
        assert!(matches!(MeasuredParticle::lepton(h, &t), Err(Error::InvariantViolation(_))));
    }

    #[test]
    fn test_jet_masses() {
        let mut arena = TruthArena::new();
        let t = truth(TruthCategory::GenJet, 21, 7.5);
        let h = arena.push(t);
        let b =
            MeasuredParticle::jet(ParticleType::BJet, 50.0, h, &t, Provenance::PoolDraw).unwrap();
        assert_eq!(b.particle().mass, BOTTOM_QUARK_MASS);
        assert_eq!(b.pt(), 50.0);
        assert!(b.is_fake());
        let w =
            MeasuredParticle::jet(ParticleType::HadWJet, 50.0, h, &t, Provenance::Genuine).unwrap();
        assert_eq!(w.particle().mass, 7.5);
        let muon = MeasuredParticle::jet(ParticleType::Muon, 50.0, h, &t, Provenance::Genuine);
        assert!(muon.is_err());
    }
}
