//! Common data types for memperf

use nalgebra::Matrix2;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Electron mass [GeV].
pub const ELECTRON_MASS: f64 = 0.510_998_95e-3;
/// Muon mass [GeV].
pub const MUON_MASS: f64 = 0.105_658_374_5;
/// Bottom-quark mass assigned to b-jets [GeV].
pub const BOTTOM_QUARK_MASS: f64 = 4.8;

/// Run / luminosity-section / event number triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId {
    /// Run number
    pub run: u32,
    /// Luminosity section
    pub lumi: u32,
    /// Event number
    pub event: u64,
}

impl EventId {
    /// Create a new event id.
    pub fn new(run: u32, lumi: u32, event: u64) -> Self {
        Self { run, lumi, event }
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.run, self.lumi, self.event)
    }
}

/// Particle type understood by the probability engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticleType {
    /// Electron
    Electron,
    /// Muon
    Muon,
    /// Jet from a b quark
    BJet,
    /// Jet from a hadronically decaying W boson
    HadWJet,
}

impl ParticleType {
    /// `true` for electrons and muons.
    pub fn is_lepton(self) -> bool {
        matches!(self, Self::Electron | Self::Muon)
    }

    /// `true` for b-jets and W-jets.
    pub fn is_jet(self) -> bool {
        !self.is_lepton()
    }
}

/// Kinematic record handed to the probability engine.
///
/// Carries no truth or provenance information.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineParticle {
    /// Particle type
    pub kind: ParticleType,
    /// Transverse momentum [GeV]
    pub pt: f64,
    /// Pseudorapidity
    pub eta: f64,
    /// Azimuth
    pub phi: f64,
    /// Mass [GeV]
    pub mass: f64,
    /// Electric charge (0 for jets)
    pub charge: i32,
}

impl EngineParticle {
    /// PDG id implied by type and charge; `0` for jets.
    ///
    /// Follows the PDG sign convention: negative leptons carry positive ids.
    pub fn pdg_id(&self) -> i32 {
        let base = match self.kind {
            ParticleType::Electron => 11,
            ParticleType::Muon => 13,
            ParticleType::BJet | ParticleType::HadWJet => return 0,
        };
        if self.charge < 0 { base } else { -base }
    }
}

/// Missing transverse momentum as seen by the engine: `(px, py)` and its covariance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeasuredMissingEt {
    /// x component [GeV]
    pub px: f64,
    /// y component [GeV]
    pub py: f64,
    /// 2×2 resolution covariance
    pub cov: Matrix2<f64>,
}

impl MeasuredMissingEt {
    /// Build with a diagonal covariance `diag(sigma_x², sigma_y²)`.
    pub fn with_resolution(px: f64, py: f64, sigma_x: f64, sigma_y: f64) -> Self {
        let cov = Matrix2::new(sigma_x * sigma_x, 0.0, 0.0, sigma_y * sigma_y);
        Self { px, py, cov }
    }

    /// Magnitude.
    pub fn pt(&self) -> f64 {
        self.px.hypot(self.py)
    }

    /// Azimuth.
    pub fn phi(&self) -> f64 {
        self.py.atan2(self.px)
    }
}

/// Result returned by a probability engine for one measured event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemResult {
    /// Probability density under the signal hypothesis
    pub prob_signal: f64,
    /// Integration uncertainty on `prob_signal`
    pub prob_signal_err: f64,
    /// Probability density under the background hypothesis
    pub prob_background: f64,
    /// Integration uncertainty on `prob_background`
    pub prob_background_err: f64,
}

impl MemResult {
    /// Create a new result.
    pub fn new(
        prob_signal: f64,
        prob_signal_err: f64,
        prob_background: f64,
        prob_background_err: f64,
    ) -> Self {
        Self { prob_signal, prob_signal_err, prob_background, prob_background_err }
    }

    /// Likelihood ratio `Ps / (Ps + Pb)`; `0` when both probabilities vanish.
    pub fn likelihood_ratio(&self) -> f64 {
        let sum = self.prob_signal + self.prob_background;
        if sum > 0.0 { self.prob_signal / sum } else { 0.0 }
    }

    /// Uncertainty on [`likelihood_ratio`](Self::likelihood_ratio), by linear error propagation.
    pub fn likelihood_ratio_err(&self) -> f64 {
        let sum = self.prob_signal + self.prob_background;
        if sum <= 0.0 {
            return 0.0;
        }
        let ds = self.prob_background * self.prob_signal_err;
        let db = self.prob_signal * self.prob_background_err;
        ds.hypot(db) / (sum * sum)
    }

    /// Log-likelihood-ratio score `ln(Ps) - ln(Pb)`.
    ///
    /// Vanishing probabilities are floored at `f64::MIN_POSITIVE` to keep the score finite.
    pub fn score(&self) -> f64 {
        let s = self.prob_signal.max(f64::MIN_POSITIVE);
        let b = self.prob_background.max(f64::MIN_POSITIVE);
        s.ln() - b.ln()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_event_id_display() {
        assert_eq!(EventId::new(1, 22, 333).to_string(), "1:22:333");
    }

    #[test]
    fn test_pdg_id_sign_convention() {
        let mut p = EngineParticle {
            kind: ParticleType::Muon,
            pt: 30.0,
            eta: 0.1,
            phi: 0.2,
            mass: MUON_MASS,
            charge: -1,
        };
        assert_eq!(p.pdg_id(), 13);
        p.charge = 1;
        assert_eq!(p.pdg_id(), -13);
        p.kind = ParticleType::BJet;
        assert_eq!(p.pdg_id(), 0);
    }

    #[test]
    fn test_met_resolution_covariance() {
        let met = MeasuredMissingEt::with_resolution(3.0, 4.0, 10.0, 20.0);
        assert_relative_eq!(met.pt(), 5.0);
        assert_relative_eq!(met.cov[(0, 0)], 100.0);
        assert_relative_eq!(met.cov[(1, 1)], 400.0);
        assert_relative_eq!(met.cov[(0, 1)], 0.0);
    }

    #[test]
    fn test_likelihood_ratio() {
        let r = MemResult::new(3.0, 0.3, 1.0, 0.1);
        assert_relative_eq!(r.likelihood_ratio(), 0.75);
        let expected_err = (1.0f64 * 0.3).hypot(3.0 * 0.1) / 16.0;
        assert_relative_eq!(r.likelihood_ratio_err(), expected_err);
        assert_relative_eq!(r.score(), 3.0f64.ln());
    }

    #[test]
    fn test_likelihood_ratio_degenerate() {
        let r = MemResult::new(0.0, 0.0, 0.0, 0.0);
        assert_eq!(r.likelihood_ratio(), 0.0);
        assert_eq!(r.likelihood_ratio_err(), 0.0);
        assert!(r.score().is_finite());
    }
}
