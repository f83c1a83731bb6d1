//! Synthetic generator-truth events for smoke runs, benchmarks and tests.
//!
//! Kinematics are drawn from flat distributions; W bosons are built from
//! their daughters so decay-chain matching always succeeds.

use crate::config::{BranchNames, Channel};
use crate::input::{GenEvent, GenParticle};
use crate::kinematics::LorentzVector;
use mp_core::EventId;
use mp_core::types::{ELECTRON_MASS, MUON_MASS};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;

/// Settings of the synthetic event stream.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthConfig {
    /// Decay channel to generate.
    pub channel: Channel,
    /// Signal decay chain when set, top-pair background otherwise.
    pub signal: bool,
    /// Additional gluon jets per event.
    pub extra_jets: usize,
    /// Run number stamped on every event.
    pub run: u32,
    /// Generator seed.
    pub seed: u64,
    /// Collection names to write.
    pub branches: BranchNames,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            channel: Channel::Dilepton,
            signal: false,
            extra_jets: 3,
            run: 1,
            seed: 1,
            branches: BranchNames::default(),
        }
    }
}

/// Infinite iterator of synthetic events with consecutive event numbers.
#[derive(Debug, Clone)]
pub struct SyntheticEvents {
    config: SynthConfig,
    rng: StdRng,
    next_event: u64,
}

impl SyntheticEvents {
    /// Stream starting at event 1.
    pub fn new(config: SynthConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self { config, rng, next_event: 1 }
    }

    fn particle(&mut self, pt: (f64, f64), mass: f64, pdg_id: i32) -> GenParticle {
        let pt = self.rng.random_range(pt.0..pt.1);
        let eta = self.rng.random_range(-2.2..2.2);
        let phi = self.rng.random_range(-PI..PI);
        GenParticle::new(pt, eta, phi, mass, pdg_id)
    }

    /// Lepton and neutrino from a W of the given charge.
    fn leptonic_w(&mut self, charge: i32) -> (GenParticle, GenParticle, GenParticle) {
        let flavour = if self.rng.random::<bool>() { 11 } else { 13 };
        let mass = if flavour == 11 { ELECTRON_MASS } else { MUON_MASS };
        let lepton = self.particle((20.0, 90.0), mass, -charge * flavour);
        let nu = self.particle((10.0, 70.0), 0.0, charge * (flavour + 1));
        let w = GenParticle::from_p4(lepton.p4() + nu.p4(), 24 * charge);
        (w, lepton, nu)
    }

    /// Two light quarks and the W they come from.
    fn hadronic_w(&mut self, charge: i32) -> (GenParticle, GenParticle, GenParticle) {
        let q1 = self.particle((25.0, 100.0), 0.0, 2 * charge);
        let q2 = self.particle((25.0, 100.0), 0.0, -charge);
        let w = GenParticle::from_p4(q1.p4() + q2.p4(), 24 * charge);
        (w, q1, q2)
    }

    /// Generator jet near a parton, with a small pt response.
    fn jet_from(&mut self, parton: &GenParticle) -> GenParticle {
        let scale = self.rng.random_range(0.9..1.1);
        let pt = parton.pt * scale;
        let p4 = LorentzVector::from_pt_eta_phi_m(pt, parton.eta, parton.phi, parton.mass);
        GenParticle::from_p4(p4, 21)
    }
}

impl Iterator for SyntheticEvents {
    type Item = GenEvent;

    fn next(&mut self) -> Option<GenEvent> {
        let lumi = 1 + (self.next_event / 1000) as u32;
        let id = EventId::new(self.config.run, lumi, self.next_event);
        self.next_event += 1;

        let b = self.particle((30.0, 150.0), 4.7, 5);
        let bbar = self.particle((30.0, 150.0), 4.7, -5);
        let mut jets = vec![self.jet_from(&b), self.jet_from(&bbar)];
        let names = self.config.branches.clone();
        let mut event = GenEvent::new(id);

        match self.config.channel {
            Channel::Dilepton => {
                let (w_plus, l_plus, nu) = self.leptonic_w(1);
                let (w_minus, l_minus, nubar) = self.leptonic_w(-1);
                if self.config.signal {
                    event = event
                        .with_collection(names.leptons, vec![l_plus, l_minus])
                        .with_collection(names.neutrinos, vec![nu, nubar])
                        .with_collection(names.higgs_daughters, vec![b, bbar, w_plus, w_minus]);
                } else {
                    event = event
                        .with_collection(names.top_leptons, vec![l_plus, l_minus])
                        .with_collection(names.top_neutrinos, vec![nu, nubar])
                        .with_collection(names.top_bquarks, vec![b, bbar]);
                }
            }
            Channel::SingleLepton => {
                let charge = if self.rng.random::<bool>() { 1 } else { -1 };
                let (w_lep, lepton, nu) = self.leptonic_w(charge);
                let (w_had, q1, q2) = self.hadronic_w(-charge);
                jets.push(self.jet_from(&q1));
                jets.push(self.jet_from(&q2));
                if self.config.signal {
                    event = event
                        .with_collection(names.leptons, vec![lepton])
                        .with_collection(names.neutrinos, vec![nu])
                        .with_collection(names.higgs_daughters, vec![b, bbar, w_lep, w_had])
                        .with_collection(names.vector_bosons, vec![w_lep, w_had])
                        .with_collection(names.vector_boson_quarks, vec![q1, q2]);
                } else {
                    event = event
                        .with_collection(names.top_leptons, vec![lepton])
                        .with_collection(names.top_neutrinos, vec![nu])
                        .with_collection(names.top_bquarks, vec![b, bbar])
                        .with_collection(names.top_wquarks, vec![q1, q2]);
                }
            }
        }

        for _ in 0..self.config.extra_jets {
            let j = self.particle((20.0, 120.0), 5.0, 21);
            jets.push(j);
        }
        Some(event.with_collection(names.jets, jets))
    }
}
