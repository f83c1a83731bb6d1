//! Generator-truth event records and event sources.

use crate::kinematics::LorentzVector;
use mp_core::{Error, EventId, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::BufRead;

/// One generator-level particle as read from the input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenParticle {
    /// Transverse momentum (GeV).
    pub pt: f64,
    /// Pseudorapidity.
    pub eta: f64,
    /// Azimuth.
    pub phi: f64,
    /// Mass (GeV).
    pub mass: f64,
    /// PDG particle code.
    pub pdg_id: i32,
    /// Integer charge; `0` when absent from the input.
    #[serde(default)]
    pub charge: i32,
}

impl GenParticle {
    /// Create a particle; the charge of charged leptons follows from the PDG id.
    pub fn new(pt: f64, eta: f64, phi: f64, mass: f64, pdg_id: i32) -> Self {
        Self { pt, eta, phi, mass, pdg_id, charge: pdg_charge(pdg_id) }
    }

    /// Create from a four-vector.
    pub fn from_p4(p4: LorentzVector, pdg_id: i32) -> Self {
        Self::new(p4.pt(), p4.eta(), p4.phi(), p4.mass(), pdg_id)
    }

    /// Four-vector of the particle.
    pub fn p4(&self) -> LorentzVector {
        LorentzVector::from_pt_eta_phi_m(self.pt, self.eta, self.phi, self.mass)
    }
}

/// Integer charge for charged leptons and W bosons; `0` otherwise.
pub fn pdg_charge(pdg_id: i32) -> i32 {
    match pdg_id {
        11 | 13 | 15 => -1,
        -11 | -13 | -15 => 1,
        24 => 1,
        -24 => -1,
        _ => 0,
    }
}

/// One event of generator-truth collections keyed by logical name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenEvent {
    /// Run number.
    pub run: u32,
    /// Luminosity block.
    pub lumi: u32,
    /// Event number.
    pub event: u64,
    /// Generator weight; only its sign enters the event weight.
    #[serde(default = "unit_weight")]
    pub gen_weight: f64,
    /// Pileup reweighting factor.
    #[serde(default = "unit_weight")]
    pub pileup_weight: f64,
    /// LHE scale weight.
    #[serde(default = "unit_weight")]
    pub lhe_scale_weight: f64,
    /// Particle collections by logical name.
    #[serde(default)]
    pub collections: BTreeMap<String, Vec<GenParticle>>,
}

fn unit_weight() -> f64 {
    1.0
}

impl GenEvent {
    /// Empty event with unit weights.
    pub fn new(id: EventId) -> Self {
        Self {
            run: id.run,
            lumi: id.lumi,
            event: id.event,
            gen_weight: 1.0,
            pileup_weight: 1.0,
            lhe_scale_weight: 1.0,
            collections: BTreeMap::new(),
        }
    }

    /// Builder-style collection insert.
    pub fn with_collection(mut self, name: impl Into<String>, particles: Vec<GenParticle>) -> Self {
        self.collections.insert(name.into(), particles);
        self
    }

    /// Run, luminosity block and event number.
    pub fn id(&self) -> EventId {
        EventId::new(self.run, self.lumi, self.event)
    }

    /// Fetch a collection; a missing name is a malformed record.
    pub fn collection(&self, name: &str) -> Result<&[GenParticle]> {
        self.collections.get(name).map(Vec::as_slice).ok_or_else(|| {
            Error::Input(format!("event {}: missing collection '{name}'", self.id()))
        })
    }

    /// Event weight: `sign(gen_weight)` (when enabled) × LHE scale weight × pileup weight.
    pub fn weight(&self, apply_gen_weight: bool) -> f64 {
        let sign = if apply_gen_weight {
            if self.gen_weight > 0.0 {
                1.0
            } else if self.gen_weight < 0.0 {
                -1.0
            } else {
                0.0
            }
        } else {
            1.0
        };
        sign * self.lhe_scale_weight * self.pileup_weight
    }
}

/// Line-delimited JSON event reader; blank lines are skipped.
pub struct JsonLinesSource<R> {
    reader: R,
    line_no: usize,
    buf: String,
}

impl<R: BufRead> JsonLinesSource<R> {
    /// Read events from `reader`, one JSON object per line.
    pub fn new(reader: R) -> Self {
        Self { reader, line_no: 0, buf: String::new() }
    }
}

impl<R: BufRead> Iterator for JsonLinesSource<R> {
    type Item = Result<GenEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.reader.read_line(&mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e.into())),
            }
            self.line_no += 1;
            let line = self.buf.trim();
            if line.is_empty() {
                continue;
            }
            return Some(
                serde_json::from_str(line)
                    .map_err(|e| Error::Input(format!("line {}: {e}", self.line_no))),
            );
        }
    }
}
