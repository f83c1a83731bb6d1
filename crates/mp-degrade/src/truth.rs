//! Per-event generator truth: arena storage and decay-chain assembly.
//!
//! Truth objects are stored once in a [`TruthArena`] and referenced by
//! [`TruthHandle`]; measured objects and truth matches carry handles instead
//! of references, so nothing downstream borrows from the arena.

use crate::config::{AnalysisConfig, BranchNames, Channel};
use crate::cutflow::{Cut, Rejection, Stage};
use crate::input::{GenEvent, GenParticle, pdg_charge};
use crate::kinematics::{LorentzVector, delta_r};
use mp_core::types::BOTTOM_QUARK_MASS;
use mp_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Stable index of a truth object within its event's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TruthHandle(u32);

impl TruthHandle {
    /// Position in the arena.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Decay-chain role of a truth object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TruthCategory {
    /// Charged lepton from a W decay
    Lepton,
    /// b quark from a Higgs or top decay
    BQuark,
    /// Light quark from a hadronic W decay
    WQuark,
    /// Generator jet, candidate for fake substitution
    GenJet,
}

/// Immutable generator-level object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TruthParticle {
    /// Decay-chain role.
    pub category: TruthCategory,
    /// Transverse momentum (GeV).
    pub pt: f64,
    /// Pseudorapidity.
    pub eta: f64,
    /// Azimuth.
    pub phi: f64,
    /// Mass (GeV); b quarks carry the fixed b mass.
    pub mass: f64,
    /// PDG particle code.
    pub pdg_id: i32,
    /// Integer charge.
    pub charge: i32,
}

impl TruthParticle {
    fn from_gen(category: TruthCategory, p: &GenParticle) -> Self {
        let charge = if p.charge != 0 { p.charge } else { pdg_charge(p.pdg_id) };
        Self {
            category,
            pt: p.pt,
            eta: p.eta,
            phi: p.phi,
            mass: p.mass,
            pdg_id: p.pdg_id,
            charge,
        }
    }

    /// Four-vector of the object.
    pub fn p4(&self) -> LorentzVector {
        LorentzVector::from_pt_eta_phi_m(self.pt, self.eta, self.phi, self.mass)
    }

    /// Angular separation to a direction.
    pub fn delta_r_to(&self, eta: f64, phi: f64) -> f64 {
        delta_r(self.eta, self.phi, eta, phi)
    }
}

/// Append-only store of one event's truth objects.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TruthArena {
    particles: Vec<TruthParticle>,
}

impl TruthArena {
    /// Empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a particle and return its handle.
    pub fn push(&mut self, particle: TruthParticle) -> TruthHandle {
        let handle = TruthHandle(self.particles.len() as u32);
        self.particles.push(particle);
        handle
    }

    /// Object behind `handle`, if it belongs to this arena.
    pub fn get(&self, handle: TruthHandle) -> Option<&TruthParticle> {
        self.particles.get(handle.index())
    }

    /// Like [`get`](Self::get), but a dangling handle is an invariant violation.
    pub fn resolve(&self, handle: TruthHandle) -> Result<&TruthParticle> {
        self.get(handle).ok_or_else(|| {
            Error::InvariantViolation(format!(
                "truth handle {} out of range (arena size {})",
                handle.index(),
                self.particles.len()
            ))
        })
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.particles.len()
    }

    /// Whether the arena holds nothing.
    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    fn extend(&mut self, category: TruthCategory, particles: &[GenParticle]) -> Vec<TruthHandle> {
        particles.iter().map(|p| self.push(TruthParticle::from_gen(category, p))).collect()
    }
}

/// Generator-level missing transverse momentum (sum of neutrinos).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TruthMissingEt {
    /// x component (GeV).
    pub px: f64,
    /// y component (GeV).
    pub py: f64,
}

impl TruthMissingEt {
    /// Vector sum of the given neutrinos.
    pub fn from_neutrinos<'a>(neutrinos: impl IntoIterator<Item = &'a GenParticle>) -> Self {
        neutrinos.into_iter().fold(Self::default(), |acc, nu| {
            let p4 = nu.p4();
            Self { px: acc.px + p4.px, py: acc.py + p4.py }
        })
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

/// Truth objects of one event, organised by decay-chain role.
///
/// `leptons`, `bjets` and `wjets` are the objects the measured slots are
/// matched against; `jets` holds every generator jet.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledTruth {
    /// Storage for every object below.
    pub arena: TruthArena,
    /// Charged leptons from W decays.
    pub leptons: Vec<TruthHandle>,
    /// b quarks, with the b mass applied.
    pub bjets: Vec<TruthHandle>,
    /// Hadronic W daughters, pt-ordered; empty in the dilepton channel.
    pub wjets: Vec<TruthHandle>,
    /// Every generator jet of the event.
    pub jets: Vec<TruthHandle>,
    /// Summed neutrino momentum.
    pub met: TruthMissingEt,
}

/// Raw collections of one event that passed the multiplicity check.
#[derive(Debug, Clone, Copy)]
pub struct RawTruth<'e> {
    leptons: &'e [GenParticle],
    neutrinos: &'e [GenParticle],
    jets: &'e [GenParticle],
    higgs_daughters: &'e [GenParticle],
    wquarks: &'e [GenParticle],
    top_leptons: &'e [GenParticle],
    top_neutrinos: &'e [GenParticle],
    top_bquarks: &'e [GenParticle],
}

/// Three-momentum tolerance for matching decay products to their parent.
pub fn pairing_tolerance(parent: &LorentzVector) -> f64 {
    (0.05 * parent.p()).max(1.0)
}

fn is_charged_lepton(pdg_id: i32) -> bool {
    matches!(pdg_id.abs(), 11 | 13 | 15)
}

/// Find the unique (lepton, neutrino) pair from the decay of `w`.
///
/// The lepton must carry the W charge, the neutrino the matching flavour and
/// sign, and the pair momentum must agree with the W within
/// [`pairing_tolerance`]. Zero or several candidate pairs give `None`.
pub fn find_lepton_neutrino_pair(
    w: &GenParticle,
    leptons: &[GenParticle],
    neutrinos: &[GenParticle],
) -> Option<(usize, usize)> {
    let charge = pdg_charge(w.pdg_id);
    if charge == 0 || w.pdg_id.abs() != 24 {
        return None;
    }
    let w_p4 = w.p4();
    let tolerance = pairing_tolerance(&w_p4);
    let mut found = None;
    for (i, lepton) in leptons.iter().enumerate() {
        if !is_charged_lepton(lepton.pdg_id) || pdg_charge(lepton.pdg_id) != charge {
            continue;
        }
        let nu_pdg = -lepton.pdg_id.signum() * (lepton.pdg_id.abs() + 1);
        for (j, nu) in neutrinos.iter().enumerate() {
            if nu.pdg_id != nu_pdg {
                continue;
            }
            if (lepton.p4() + nu.p4()).momentum_distance(&w_p4) < tolerance {
                if found.is_some() {
                    return None;
                }
                found = Some((i, j));
            }
        }
    }
    found
}

/// Find the unique pair of quarks whose summed momentum matches `w`.
pub fn find_w_daughter_pair(w: &GenParticle, quarks: &[GenParticle]) -> Option<(usize, usize)> {
    let w_p4 = w.p4();
    let tolerance = pairing_tolerance(&w_p4);
    let mut found = None;
    for i in 0..quarks.len() {
        for j in (i + 1)..quarks.len() {
            if (quarks[i].p4() + quarks[j].p4()).momentum_distance(&w_p4) < tolerance {
                if found.is_some() {
                    return None;
                }
                found = Some((i, j));
            }
        }
    }
    found
}

fn to_bjet(p: &GenParticle) -> GenParticle {
    GenParticle { mass: BOTTOM_QUARK_MASS, ..*p }
}

fn sort_desc_pt(particles: &mut [GenParticle]) {
    particles.sort_by(|a, b| b.pt.total_cmp(&a.pt));
}

/// Builds [`AssembledTruth`] from raw collections for one channel and process.
#[derive(Debug, Clone)]
pub struct TruthAssembler {
    channel: Channel,
    is_signal: bool,
    branches: BranchNames,
}

impl TruthAssembler {
    /// Assembler for the channel, process and collection names of `config`.
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            channel: config.channel,
            is_signal: config.is_signal(),
            branches: config.branches.clone(),
        }
    }

    /// Fetch the collections this channel needs and check their multiplicities.
    ///
    /// A configured collection missing from the event is an input error; a
    /// multiplicity mismatch is a soft rejection at
    /// [`Cut::GenLevelMultiplicity`].
    pub fn fetch<'e>(&self, event: &'e GenEvent) -> Result<Stage<RawTruth<'e>>> {
        let b = &self.branches;
        let mut raw = RawTruth {
            leptons: &[],
            neutrinos: &[],
            jets: event.collection(&b.jets)?,
            higgs_daughters: &[],
            wquarks: &[],
            top_leptons: &[],
            top_neutrinos: &[],
            top_bquarks: &[],
        };
        let single = self.channel == Channel::SingleLepton;

        let ok = if self.is_signal {
            raw.leptons = event.collection(&b.leptons)?;
            raw.neutrinos = event.collection(&b.neutrinos)?;
            raw.higgs_daughters = event.collection(&b.higgs_daughters)?;
            if single {
                let w_bosons = event.collection(&b.vector_bosons)?;
                raw.wquarks = event.collection(&b.vector_boson_quarks)?;
                raw.higgs_daughters.len() == 4 && w_bosons.len() == 2 && raw.wquarks.len() == 2
            } else {
                raw.higgs_daughters.len() == 4
            }
        } else {
            raw.top_leptons = event.collection(&b.top_leptons)?;
            raw.top_neutrinos = event.collection(&b.top_neutrinos)?;
            raw.top_bquarks = event.collection(&b.top_bquarks)?;
            if single {
                raw.wquarks = event.collection(&b.top_wquarks)?;
                raw.top_leptons.len() == 1
                    && raw.top_neutrinos.len() == 1
                    && raw.top_bquarks.len() == 2
                    && raw.wquarks.len() == 2
            } else {
                raw.top_leptons.len() == 2
                    && raw.top_neutrinos.len() == 2
                    && raw.top_bquarks.len() == 2
            }
        };

        if !ok {
            return Ok(Err(Rejection::new(
                Cut::GenLevelMultiplicity,
                format!(
                    "unexpected truth multiplicities (higgs daughters {}, W quarks {}, \
                     top leptons {}, top neutrinos {}, top b quarks {})",
                    raw.higgs_daughters.len(),
                    raw.wquarks.len(),
                    raw.top_leptons.len(),
                    raw.top_neutrinos.len(),
                    raw.top_bquarks.len()
                ),
            )));
        }
        Ok(Ok(raw))
    }

    /// Resolve decay chains into leptons, b-jets, W-jets and missing Et.
    ///
    /// Failed or ambiguous matching is a soft rejection at
    /// [`Cut::GenLevelMatching`].
    pub fn assemble(&self, raw: &RawTruth<'_>) -> Stage<AssembledTruth> {
        let (leptons, bjets, wjets, met) =
            if self.is_signal { self.resolve_signal(raw)? } else { self.resolve_background(raw) };

        let (want_leptons, want_wjets) = match self.channel {
            Channel::Dilepton => (2, 0),
            Channel::SingleLepton => (1, 2),
        };
        if leptons.len() != want_leptons || bjets.len() != 2 || wjets.len() != want_wjets {
            return Err(Rejection::new(
                Cut::GenLevelMatching,
                format!(
                    "matched {} leptons, {} b-jets, {} W-jets",
                    leptons.len(),
                    bjets.len(),
                    wjets.len()
                ),
            ));
        }

        let mut arena = TruthArena::new();
        let leptons = arena.extend(TruthCategory::Lepton, &leptons);
        let bjets = arena.extend(TruthCategory::BQuark, &bjets);
        let wjets = arena.extend(TruthCategory::WQuark, &wjets);
        let jets = arena.extend(TruthCategory::GenJet, raw.jets);
        Ok(AssembledTruth { arena, leptons, bjets, wjets, jets, met })
    }

    #[allow(clippy::type_complexity)]
    fn resolve_signal(
        &self,
        raw: &RawTruth<'_>,
    ) -> Stage<(Vec<GenParticle>, Vec<GenParticle>, Vec<GenParticle>, TruthMissingEt)> {
        let find = |pdg: i32| raw.higgs_daughters.iter().find(|p| p.pdg_id == pdg);
        let mut bjets = Vec::new();
        if let (Some(b), Some(bbar)) = (find(5), find(-5)) {
            bjets.push(to_bjet(b));
            bjets.push(to_bjet(bbar));
        }

        let mut leptons = Vec::new();
        let mut neutrinos = Vec::new();
        let mut wjets = Vec::new();
        if let (Some(w_plus), Some(w_minus)) = (find(24), find(-24)) {
            let mut hadronic = Vec::new();
            for (w, other) in [(w_plus, w_minus), (w_minus, w_plus)] {
                match find_lepton_neutrino_pair(w, raw.leptons, raw.neutrinos) {
                    Some((l, n)) => {
                        leptons.push(raw.leptons[l]);
                        neutrinos.push(raw.neutrinos[n]);
                        hadronic.push(other);
                    }
                    None if self.channel == Channel::Dilepton => {
                        return Err(Rejection::new(
                            Cut::GenLevelMatching,
                            format!(
                                "no unique lepton+neutrino pair for W with pdg id {}",
                                w.pdg_id
                            ),
                        ));
                    }
                    None => {}
                }
            }
            if self.channel == Channel::SingleLepton {
                if leptons.len() != 1 {
                    return Err(Rejection::new(
                        Cut::GenLevelMatching,
                        format!(
                            "{} leptonically decaying W bosons, expected exactly one",
                            leptons.len()
                        ),
                    ));
                }
                if let Some((i, j)) = find_w_daughter_pair(hadronic[0], raw.wquarks) {
                    wjets.push(raw.wquarks[i]);
                    wjets.push(raw.wquarks[j]);
                    sort_desc_pt(&mut wjets);
                }
            }
        }
        let met = TruthMissingEt::from_neutrinos(&neutrinos);
        Ok((leptons, bjets, wjets, met))
    }

    fn resolve_background(
        &self,
        raw: &RawTruth<'_>,
    ) -> (Vec<GenParticle>, Vec<GenParticle>, Vec<GenParticle>, TruthMissingEt) {
        let leptons = raw.top_leptons.to_vec();
        let bjets = raw.top_bquarks.iter().map(to_bjet).collect();
        let mut wjets = raw.wquarks.to_vec();
        sort_desc_pt(&mut wjets);
        let met = TruthMissingEt::from_neutrinos(raw.top_neutrinos);
        (leptons, bjets, wjets, met)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use mp_core::EventId;

    fn w_from(a: &GenParticle, b: &GenParticle, pdg: i32) -> GenParticle {
        GenParticle::from_p4(a.p4() + b.p4(), pdg)
    }

    #[test]
    fn test_arena_handles_are_stable() {
        let mut arena = TruthArena::new();
        let gen_jet = GenParticle::new(30.0, 0.0, 0.0, 5.0, 21);
        let p = TruthParticle::from_gen(TruthCategory::GenJet, &gen_jet);
        let h0 = arena.push(p);
        let h1 = arena.push(TruthParticle { pt: 40.0, ..p });
        assert_eq!(h0.index(), 0);
        assert_eq!(arena.resolve(h1).unwrap().pt, 40.0);
        let mut other = TruthArena::new();
        other.push(p);
        assert!(matches!(other.resolve(h1), Err(Error::InvariantViolation(_))));
    }

    #[test]
    fn test_lepton_neutrino_pairing_unique() {
        let mu = GenParticle::new(40.0, 0.2, 1.0, 0.1057, -13);
        let nu = GenParticle::new(30.0, -0.3, -1.0, 0.0, 14);
        let e = GenParticle::new(35.0, -1.0, 0.0, 0.0005, 11);
        let w_plus = w_from(&mu, &nu, 24);
        assert_eq!(find_lepton_neutrino_pair(&w_plus, &[e, mu], &[nu]), Some((1, 0)));

        // wrong neutrino flavour
        let nu_e = GenParticle { pdg_id: 12, ..nu };
        assert_eq!(find_lepton_neutrino_pair(&w_plus, &[mu], &[nu_e]), None);

        // two identical candidates are ambiguous
        assert_eq!(find_lepton_neutrino_pair(&w_plus, &[mu, mu], &[nu]), None);
    }

    #[test]
    fn test_w_daughter_pair() {
        let q1 = GenParticle::new(50.0, 0.5, 0.3, 0.0, 2);
        let q2 = GenParticle::new(30.0, -0.4, 1.9, 0.0, -1);
        let q3 = GenParticle::new(25.0, 1.5, -2.0, 0.0, 3);
        let w = w_from(&q1, &q2, 24);
        assert_eq!(find_w_daughter_pair(&w, &[q3, q1, q2]), Some((1, 2)));
        assert_eq!(find_w_daughter_pair(&w, &[q1, q3]), None);
    }

    fn dilepton_signal_event() -> GenEvent {
        let mu = GenParticle::new(40.0, 0.2, 1.0, 0.1057, -13);
        let nu = GenParticle::new(30.0, -0.3, -1.0, 0.0, 14);
        let e = GenParticle::new(35.0, -1.0, 0.0, 0.0005, 11);
        let nubar = GenParticle::new(25.0, 1.2, 2.8, 0.0, -12);
        let daughters = vec![
            GenParticle::new(80.0, 0.5, 0.0, 4.7, 5),
            GenParticle::new(60.0, -0.5, 2.0, 4.7, -5),
            w_from(&mu, &nu, 24),
            w_from(&e, &nubar, -24),
        ];
        GenEvent::new(EventId::new(1, 1, 1))
            .with_collection("GenLep", vec![mu, e])
            .with_collection("GenNu", vec![nu, nubar])
            .with_collection("GenJet", vec![])
            .with_collection("GenHiggsDaughters", daughters)
    }

    fn signal_config() -> AnalysisConfig {
        AnalysisConfig { process: "signal".into(), ..AnalysisConfig::default() }
    }

    #[test]
    fn test_dilepton_signal_assembly() {
        let event = dilepton_signal_event();
        let assembler = TruthAssembler::new(&signal_config());
        let raw = assembler.fetch(&event).unwrap().unwrap();
        let truth = assembler.assemble(&raw).unwrap();
        assert_eq!(truth.leptons.len(), 2);
        assert_eq!(truth.bjets.len(), 2);
        assert!(truth.wjets.is_empty());
        let b = truth.arena.resolve(truth.bjets[0]).unwrap();
        assert_eq!(b.mass, BOTTOM_QUARK_MASS);
        assert_eq!(b.category, TruthCategory::BQuark);

        let nu = GenParticle::new(30.0, -0.3, -1.0, 0.0, 14).p4();
        let nubar = GenParticle::new(25.0, 1.2, 2.8, 0.0, -12).p4();
        assert_relative_eq!(truth.met.px, nu.px + nubar.px, epsilon = 1e-9);
        assert_relative_eq!(truth.met.py, nu.py + nubar.py, epsilon = 1e-9);
    }

    #[test]
    fn test_wrong_multiplicity_is_soft_rejection() {
        let mut event = dilepton_signal_event();
        event.collections.get_mut("GenHiggsDaughters").unwrap().pop();
        let assembler = TruthAssembler::new(&signal_config());
        let rejection = assembler.fetch(&event).unwrap().unwrap_err();
        assert_eq!(rejection.cut, Cut::GenLevelMultiplicity);
    }

    #[test]
    fn test_unpaired_w_is_soft_rejection() {
        let mut event = dilepton_signal_event();
        let lone_nu = GenParticle::new(30.0, -0.3, -1.0, 0.0, 14);
        event.collections.insert("GenNu".into(), vec![lone_nu]);
        let assembler = TruthAssembler::new(&signal_config());
        let raw = assembler.fetch(&event).unwrap().unwrap();
        let rejection = assembler.assemble(&raw).unwrap_err();
        assert_eq!(rejection.cut, Cut::GenLevelMatching);
    }

    #[test]
    fn test_missing_collection_is_input_error() {
        let mut event = dilepton_signal_event();
        event.collections.remove("GenJet");
        let assembler = TruthAssembler::new(&signal_config());
        assert!(matches!(assembler.fetch(&event), Err(Error::Input(_))));
    }

    #[test]
    fn test_single_lepton_background_sorts_wjets() {
        let event = GenEvent::new(EventId::new(1, 1, 2))
            .with_collection("GenJet", vec![])
            .with_collection("GenLepFromTop", vec![GenParticle::new(40.0, 0.0, 0.0, 0.1, 13)])
            .with_collection("GenNuFromTop", vec![GenParticle::new(20.0, 0.0, 1.0, 0.0, -14)])
            .with_collection(
                "GenBQuarkFromTop",
                vec![
                    GenParticle::new(70.0, 0.1, 2.0, 4.7, 5),
                    GenParticle::new(90.0, 0.1, -2.0, 4.7, -5),
                ],
            )
            .with_collection(
                "GenQuarkFromTop",
                vec![
                    GenParticle::new(30.0, 0.4, 0.5, 0.0, 1),
                    GenParticle::new(45.0, -0.4, 1.5, 0.0, -2),
                ],
            );
        let cfg = AnalysisConfig { channel: Channel::SingleLepton, ..AnalysisConfig::default() };
        let assembler = TruthAssembler::new(&cfg);
        let raw = assembler.fetch(&event).unwrap().unwrap();
        let truth = assembler.assemble(&raw).unwrap();
        let w0 = truth.arena.resolve(truth.wjets[0]).unwrap();
        let w1 = truth.arena.resolve(truth.wjets[1]).unwrap();
        assert_eq!((w0.pt, w1.pt), (45.0, 30.0));
        assert_eq!(truth.arena.resolve(truth.leptons[0]).unwrap().charge, -1);
    }
}
