//! Toy probability engine for smoke runs.
//!
//! Scores the b-jet pair against a Higgs resonance versus a falling
//! continuum, with the pair-mass resolution propagated from Gaussian jet
//! transfer functions. It is a stand-in for a matrix-element integrator, not
//! a physics model.

use crate::kinematics::LorentzVector;
use mp_core::{
    EngineParticle, Error, MeasuredMissingEt, MemResult, ParticleType, ProbabilityEngine, Result,
};
use statrs::distribution::{Continuous, Exp, Normal};

/// Gaussian jet pt response with `sigma = coeff * sqrt(max(1, pt))`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JetTransferFunction {
    /// Stochastic resolution coefficient.
    pub coeff: f64,
}

impl JetTransferFunction {
    /// Resolution at a given pt.
    pub fn sigma(&self, pt: f64) -> f64 {
        self.coeff * pt.max(1.0).sqrt()
    }

    /// Invariant-mass resolution of a jet pair, floored at 1 GeV.
    pub fn pair_mass_sigma(&self, a: &EngineParticle, b: &EngineParticle, mass: f64) -> f64 {
        let ra = self.sigma(a.pt) / a.pt.max(1.0);
        let rb = self.sigma(b.pt) / b.pt.max(1.0);
        (0.5 * mass * ra.hypot(rb)).max(1.0)
    }
}

fn p4(p: &EngineParticle) -> LorentzVector {
    LorentzVector::from_pt_eta_phi_m(p.pt, p.eta, p.phi, p.mass)
}

fn pair_mass(a: &EngineParticle, b: &EngineParticle) -> f64 {
    (p4(a) + p4(b)).mass()
}

/// Resonance-versus-continuum likelihoods of the jet-pair masses.
#[derive(Debug, Clone, PartialEq)]
pub struct ToyMassEngine {
    transfer: JetTransferFunction,
    higgs_mass: f64,
    higgs_width: f64,
    w_mass: f64,
    w_width: f64,
    continuum_scale: f64,
    relative_error: f64,
}

impl ToyMassEngine {
    /// Engine with jet resolution coefficient `jet_coeff` (clamped at 0).
    pub fn new(jet_coeff: f64) -> Self {
        Self {
            transfer: JetTransferFunction { coeff: jet_coeff.max(0.0) },
            higgs_mass: 125.0,
            higgs_width: 2.0,
            w_mass: 80.4,
            w_width: 2.1,
            continuum_scale: 100.0,
            relative_error: 0.01,
        }
    }

    fn resonance(&self, mass: f64, peak: f64, width: f64, resolution: f64) -> Result<f64> {
        let n = Normal::new(peak, width.hypot(resolution))
            .map_err(|e| Error::Engine(e.to_string()))?;
        Ok(n.pdf(mass))
    }

    fn continuum(&self, mass: f64) -> Result<f64> {
        let e = Exp::new(1.0 / self.continuum_scale).map_err(|e| Error::Engine(e.to_string()))?;
        Ok(e.pdf(mass))
    }
}

impl Default for ToyMassEngine {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl ProbabilityEngine for ToyMassEngine {
    fn evaluate(
        &mut self,
        particles: &[EngineParticle],
        _met: &MeasuredMissingEt,
    ) -> Result<MemResult> {
        if particles.is_empty() {
            return Err(Error::Engine("empty measured particle list".into()));
        }
        let of_kind =
            |kind: ParticleType| particles.iter().filter(|p| p.kind == kind).collect::<Vec<_>>();
        let bjets = of_kind(ParticleType::BJet);
        let wjets = of_kind(ParticleType::HadWJet);

        let mut ps = 1.0;
        let mut pb = 1.0;
        if let [a, b] = bjets.as_slice() {
            let m = pair_mass(a, b);
            let sigma = self.transfer.pair_mass_sigma(a, b, m);
            ps *= self.resonance(m, self.higgs_mass, self.higgs_width, sigma)?;
            pb *= self.continuum(m)?;
        }
        if let [a, b] = wjets.as_slice() {
            let m = pair_mass(a, b);
            let sigma = self.transfer.pair_mass_sigma(a, b, m);
            let w = self.resonance(m, self.w_mass, self.w_width, sigma)?;
            ps *= w;
            pb *= w;
        }
        Ok(MemResult::new(ps, self.relative_error * ps, pb, self.relative_error * pb))
    }

    fn name(&self) -> &str {
        "toy-mass"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn jet(kind: ParticleType, pt: f64, eta: f64, phi: f64) -> EngineParticle {
        EngineParticle { kind, pt, eta, phi, mass: 4.8, charge: 0 }
    }

    fn met() -> MeasuredMissingEt {
        MeasuredMissingEt::with_resolution(0.0, 0.0, 10.0, 10.0)
    }

    #[test]
    fn test_resonant_pair_prefers_signal() {
        let mut engine = ToyMassEngine::default();
        // back-to-back 62.5 GeV jets at eta 0: m = 125 GeV (mass terms aside)
        let a = jet(ParticleType::BJet, 62.5, 0.0, 0.0);
        let b = jet(ParticleType::BJet, 62.5, 0.0, std::f64::consts::PI);
        let r = engine.evaluate(&[a, b], &met()).unwrap();
        assert!(r.likelihood_ratio() > 0.5);

        let c = jet(ParticleType::BJet, 200.0, 0.0, 0.0);
        let d = jet(ParticleType::BJet, 200.0, 0.0, std::f64::consts::PI);
        let r = engine.evaluate(&[c, d], &met()).unwrap();
        assert!(r.likelihood_ratio() < 0.5);
    }

    #[test]
    fn test_single_bjet_is_uninformative() {
        let mut engine = ToyMassEngine::default();
        let r = engine.evaluate(&[jet(ParticleType::BJet, 60.0, 0.0, 0.0)], &met()).unwrap();
        assert_relative_eq!(r.likelihood_ratio(), 0.5);
        assert_relative_eq!(r.prob_signal_err, 0.01);
    }

    #[test]
    fn test_empty_input_is_engine_error() {
        let mut engine = ToyMassEngine::default();
        assert!(matches!(engine.evaluate(&[], &met()), Err(Error::Engine(_))));
        assert_eq!(engine.name(), "toy-mass");
    }

    #[test]
    fn test_pair_resolution_floor() {
        let tf = JetTransferFunction { coeff: 0.0 };
        let a = jet(ParticleType::BJet, 50.0, 0.0, 0.0);
        assert_relative_eq!(tf.pair_mass_sigma(&a, &a, 100.0), 1.0);
        let tf = JetTransferFunction { coeff: 1.0 };
        let expected = 0.5 * 100.0 * (0.1f64).hypot(0.1);
        let a = jet(ParticleType::BJet, 100.0, 0.0, 0.0);
        assert_relative_eq!(tf.pair_mass_sigma(&a, &a, 100.0), expected);
    }
}
