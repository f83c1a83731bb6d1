//! Hypothesis variants: the full measured event and its missing-object versions.

use crate::config::Channel;
use crate::measured::MeasuredParticle;
use crate::truth::{AssembledTruth, TruthArena, TruthHandle, TruthMissingEt, TruthParticle};
use mp_core::{EngineParticle, EventId, MeasuredMissingEt, MemResult, ParticleType, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// ΔR within which a measured object is matched to a truth object.
pub const TRUTH_MATCH_DELTA_R: f64 = 0.3;

/// Which objects a variant keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantKind {
    /// Every slot object.
    Full,
    /// One b-jet dropped.
    MissingBJet,
    /// One W-jet dropped (single-lepton only).
    MissingWJet,
    /// One b-jet and one W-jet dropped (single-lepton only).
    MissingBJetAndWJet,
}

impl VariantKind {
    /// Variants built for a channel, in build order.
    pub fn for_channel(channel: Channel) -> &'static [VariantKind] {
        match channel {
            Channel::Dilepton => &[Self::Full, Self::MissingBJet],
            Channel::SingleLepton => {
                &[Self::Full, Self::MissingBJet, Self::MissingWJet, Self::MissingBJetAndWJet]
            }
        }
    }

    /// Stable identifier, used for output file names.
    pub fn name(self) -> &'static str {
        match self {
            Self::Full => "mem",
            Self::MissingBJet => "mem_missingBJet",
            Self::MissingWJet => "mem_missingWJet",
            Self::MissingBJetAndWJet => "mem_missingBnWJet",
        }
    }
}

impl fmt::Display for VariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Truth object matched to a measured object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TruthMatch {
    /// Handle of the matched object in the event arena.
    pub handle: TruthHandle,
    /// Copy of the matched object.
    pub particle: TruthParticle,
}

/// Closest truth object among `candidates` within [`TRUTH_MATCH_DELTA_R`].
pub fn find_truth_match(
    measured: &EngineParticle,
    candidates: &[TruthHandle],
    arena: &TruthArena,
) -> Result<Option<TruthMatch>> {
    let mut best: Option<(f64, TruthMatch)> = None;
    for &handle in candidates {
        let particle = *arena.resolve(handle)?;
        let dr = particle.delta_r_to(measured.eta, measured.phi);
        if dr < TRUTH_MATCH_DELTA_R && best.is_none_or(|(d, _)| dr < d) {
            best = Some((dr, TruthMatch { handle, particle }));
        }
    }
    Ok(best.map(|(_, m)| m))
}

/// Truth-level reference objects of an event, shared by all its variants.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenReference {
    /// Truth leptons.
    pub leptons: Vec<TruthParticle>,
    /// Truth b quarks.
    pub bjets: Vec<TruthParticle>,
    /// Truth W daughters.
    pub wjets: Vec<TruthParticle>,
    /// Truth missing Et.
    pub met: TruthMissingEt,
}

impl GenReference {
    /// Resolve the matching lists of `truth`, pt-ordered.
    pub fn from_truth(truth: &AssembledTruth) -> Result<Self> {
        let resolve = |handles: &[TruthHandle]| -> Result<Vec<TruthParticle>> {
            let mut v = handles
                .iter()
                .map(|&h| truth.arena.resolve(h).copied())
                .collect::<Result<Vec<_>>>()?;
            v.sort_by(|a, b| b.pt.total_cmp(&a.pt));
            Ok(v)
        };
        Ok(Self {
            leptons: resolve(&truth.leptons)?,
            bjets: resolve(&truth.bjets)?,
            wjets: resolve(&truth.wjets)?,
            met: truth.met,
        })
    }
}

/// One measured event construction scored by the probability engine.
///
/// Immutable once built, except for the engine result attached after scoring.
#[derive(Debug, Clone, PartialEq)]
pub struct HypothesisVariant {
    id: EventId,
    is_signal: bool,
    kind: VariantKind,
    category: String,
    particles: Vec<MeasuredParticle>,
    truth_matches: Vec<Option<TruthMatch>>,
    met: MeasuredMissingEt,
    reference: GenReference,
    result: Option<MemResult>,
    engine_time: Option<Duration>,
}

impl HypothesisVariant {
    /// Event the variant was built from.
    pub fn id(&self) -> EventId {
        self.id
    }

    /// Whether the event came from the signal process.
    pub fn is_signal(&self) -> bool {
        self.is_signal
    }

    /// Which objects the variant keeps.
    pub fn kind(&self) -> VariantKind {
        self.kind
    }

    /// Categorisation label, e.g. `2genuineBJets` or `missingBJet_fakeBJet_2genuineWJets`.
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Leptons first, then b-jets, then W-jets, each pt-ordered by slot.
    pub fn particles(&self) -> &[MeasuredParticle] {
        &self.particles
    }

    /// Truth match for each entry of [`particles`](Self::particles).
    pub fn truth_matches(&self) -> &[Option<TruthMatch>] {
        &self.truth_matches
    }

    /// Measured missing Et with its covariance.
    pub fn met(&self) -> &MeasuredMissingEt {
        &self.met
    }

    /// Truth-level reference objects of the event.
    pub fn reference(&self) -> &GenReference {
        &self.reference
    }

    /// Engine output, once scored.
    pub fn result(&self) -> Option<&MemResult> {
        self.result.as_ref()
    }

    /// Wall time of the engine call, once scored.
    pub fn engine_time(&self) -> Option<Duration> {
        self.engine_time
    }

    /// Kinematics handed to the engine; provenance is not included.
    pub fn engine_particles(&self) -> Vec<EngineParticle> {
        self.particles.iter().map(|p| *p.particle()).collect()
    }

    /// Measured objects of one type with their truth matches.
    pub fn of_kind(
        &self,
        kind: ParticleType,
    ) -> impl Iterator<Item = (&MeasuredParticle, Option<&TruthMatch>)> {
        self.particles
            .iter()
            .zip(&self.truth_matches)
            .filter(move |(p, _)| p.kind() == kind)
            .map(|(p, m)| (p, m.as_ref()))
    }

    /// Number of measured objects of one type.
    pub fn count(&self, kind: ParticleType) -> usize {
        self.particles.iter().filter(|p| p.kind() == kind).count()
    }

    /// Store the engine output and its wall-clock cost.
    pub fn attach_result(&mut self, result: MemResult, wall_time: Duration) {
        self.result = Some(result);
        self.engine_time = Some(wall_time);
    }
}

/// Measured inputs of one event that passed all cuts.
#[derive(Debug, Clone, Copy)]
pub struct VariantInputs<'a> {
    /// Event identity.
    pub id: EventId,
    /// Whether the event came from the signal process.
    pub is_signal: bool,
    /// Truth objects the measured objects are matched against.
    pub truth: &'a AssembledTruth,
    /// Measured leptons, pt-ordered.
    pub leptons: &'a [MeasuredParticle],
    /// Measured b-jets in slot order.
    pub bjets: &'a [MeasuredParticle],
    /// Measured W-jets in slot order; empty in the dilepton channel.
    pub wjets: &'a [MeasuredParticle],
    /// Smeared missing Et.
    pub met: MeasuredMissingEt,
}

fn count_label(n_genuine: usize, noun: &str) -> String {
    if n_genuine == 1 { format!("1genuine{noun}") } else { format!("{n_genuine}genuine{noun}s") }
}

fn survivor_label(survivor: &MeasuredParticle, noun: &str) -> String {
    if survivor.is_fake() { format!("fake{noun}") } else { format!("genuine{noun}") }
}

/// Keep one of exactly two slot objects: the leading one when `u > 0.5`.
fn keep_one(jets: &[MeasuredParticle], u: f64) -> Option<MeasuredParticle> {
    match jets {
        [lead, sublead] => Some(if u > 0.5 { *lead } else { *sublead }),
        _ => None,
    }
}

/// Builds the full and missing-object variants of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariantBuilder {
    channel: Channel,
}

impl VariantBuilder {
    /// Builder for one channel's variant set.
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }

    /// Build every constructible variant.
    ///
    /// The drop draws are always taken (one in the dilepton channel, four in
    /// the single-lepton channel), so the stream advances identically whether
    /// or not a variant can be built. A variant whose object counts cannot be
    /// met is omitted.
    pub fn build<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        inputs: &VariantInputs<'_>,
    ) -> Result<Vec<HypothesisVariant>> {
        let reference = GenReference::from_truth(inputs.truth)?;
        let lep = inputs.leptons;
        let (b, w) = (inputs.bjets, inputs.wjets);
        let mut out = Vec::new();

        match self.channel {
            Channel::Dilepton => {
                let u: f64 = rng.random();
                if lep.len() == 2 && b.len() == 2 {
                    let n = b.iter().filter(|j| !j.is_fake()).count();
                    let particles = [lep, b].concat();
                    let label = count_label(n, "BJet");
                    let kind = VariantKind::Full;
                    out.push(self.variant(inputs, &reference, kind, label, particles)?);
                }
                if let (2, Some(kept)) = (lep.len(), keep_one(b, u)) {
                    let label = format!("missingBJet_{}", survivor_label(&kept, "BJet"));
                    let particles = [lep, std::slice::from_ref(&kept)].concat();
                    let kind = VariantKind::MissingBJet;
                    out.push(self.variant(inputs, &reference, kind, label, particles)?);
                }
            }
            Channel::SingleLepton => {
                let u1: f64 = rng.random();
                let u2: f64 = rng.random();
                let u3: f64 = rng.random();
                let u4: f64 = rng.random();
                if lep.len() != 1 {
                    return Ok(out);
                }
                let nb = b.iter().filter(|j| !j.is_fake()).count();
                let nw = w.iter().filter(|j| !j.is_fake()).count();
                if b.len() == 2 && w.len() == 2 {
                    let label = format!("{}_{}", count_label(nb, "BJet"), count_label(nw, "WJet"));
                    let particles = [lep, b, w].concat();
                    let kind = VariantKind::Full;
                    out.push(self.variant(inputs, &reference, kind, label, particles)?);
                }
                if let (Some(kept), 2) = (keep_one(b, u1), w.len()) {
                    let label = format!(
                        "missingBJet_{}_{}",
                        survivor_label(&kept, "BJet"),
                        count_label(nw, "WJet")
                    );
                    let particles = [lep, std::slice::from_ref(&kept), w].concat();
                    let kind = VariantKind::MissingBJet;
                    out.push(self.variant(inputs, &reference, kind, label, particles)?);
                }
                if let (2, Some(kept)) = (b.len(), keep_one(w, u2)) {
                    let label = format!(
                        "missingWJet_{}_{}",
                        count_label(nb, "BJet"),
                        survivor_label(&kept, "WJet")
                    );
                    let particles = [lep, b, std::slice::from_ref(&kept)].concat();
                    let kind = VariantKind::MissingWJet;
                    out.push(self.variant(inputs, &reference, kind, label, particles)?);
                }
                if let (Some(kept_b), Some(kept_w)) = (keep_one(b, u3), keep_one(w, u4)) {
                    let label = format!(
                        "missingBnWJet_{}_{}",
                        survivor_label(&kept_b, "BJet"),
                        survivor_label(&kept_w, "WJet")
                    );
                    let kept = [kept_b, kept_w];
                    let particles = [lep, kept.as_slice()].concat();
                    let kind = VariantKind::MissingBJetAndWJet;
                    out.push(self.variant(inputs, &reference, kind, label, particles)?);
                }
            }
        }
        Ok(out)
    }

    fn variant(
        &self,
        inputs: &VariantInputs<'_>,
        reference: &GenReference,
        kind: VariantKind,
        category: String,
        particles: Vec<MeasuredParticle>,
    ) -> Result<HypothesisVariant> {
        let truth = inputs.truth;
        let truth_matches = particles
            .iter()
            .map(|p| {
                let candidates = match p.kind() {
                    ParticleType::Electron | ParticleType::Muon => &truth.leptons,
                    ParticleType::BJet => &truth.bjets,
                    ParticleType::HadWJet => &truth.wjets,
                };
                find_truth_match(p.particle(), candidates, &truth.arena)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(HypothesisVariant {
            id: inputs.id,
            is_signal: inputs.is_signal,
            kind,
            category,
            particles,
            truth_matches,
            met: inputs.met,
            reference: reference.clone(),
            result: None,
            engine_time: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measured::Provenance;
    use crate::truth::{TruthCategory, TruthMissingEt};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    struct Fixture {
        truth: AssembledTruth,
        leptons: Vec<MeasuredParticle>,
        bjets: Vec<MeasuredParticle>,
        wjets: Vec<MeasuredParticle>,
    }

    fn tp(category: TruthCategory, pt: f64, eta: f64, phi: f64, pdg_id: i32) -> TruthParticle {
        TruthParticle { category, pt, eta, phi, mass: 0.0, pdg_id, charge: 0 }
    }

    fn jet(
        arena: &TruthArena,
        kind: ParticleType,
        pt: f64,
        source: TruthHandle,
        provenance: Provenance,
    ) -> MeasuredParticle {
        MeasuredParticle::jet(kind, pt, source, arena.get(source).unwrap(), provenance).unwrap()
    }

    fn fixture(n_leptons: usize) -> Fixture {
        let mut arena = TruthArena::new();
        let l = [
            arena.push(tp(TruthCategory::Lepton, 40.0, 0.0, 0.0, 13)),
            arena.push(tp(TruthCategory::Lepton, 30.0, 1.0, 1.0, -11)),
        ];
        let b = [
            arena.push(tp(TruthCategory::BQuark, 80.0, 0.5, 2.0, 5)),
            arena.push(tp(TruthCategory::BQuark, 60.0, -0.5, -2.0, -5)),
        ];
        let w = [
            arena.push(tp(TruthCategory::WQuark, 50.0, 1.5, 3.0, 2)),
            arena.push(tp(TruthCategory::WQuark, 35.0, -1.5, -0.5, -1)),
        ];
        let extra = arena.push(tp(TruthCategory::GenJet, 45.0, 2.0, -1.2, 21));

        let leptons = l[..n_leptons]
            .iter()
            .map(|&h| MeasuredParticle::lepton(h, arena.get(h).unwrap()).unwrap())
            .collect();
        let bjets = vec![
            jet(&arena, ParticleType::BJet, 80.0, b[0], Provenance::Genuine),
            jet(&arena, ParticleType::BJet, 45.0, extra, Provenance::PoolDraw),
        ];
        let wjets = vec![
            jet(&arena, ParticleType::HadWJet, 50.0, w[0], Provenance::Genuine),
            jet(&arena, ParticleType::HadWJet, 35.0, w[1], Provenance::Genuine),
        ];
        let truth = AssembledTruth {
            arena,
            leptons: l[..n_leptons].to_vec(),
            bjets: b.to_vec(),
            wjets: w.to_vec(),
            jets: vec![extra],
            met: TruthMissingEt { px: 10.0, py: 0.0 },
        };
        Fixture { truth, leptons, bjets, wjets }
    }

    fn inputs<'a>(f: &'a Fixture, wjets: &'a [MeasuredParticle]) -> VariantInputs<'a> {
        VariantInputs {
            id: EventId::new(1, 1, 1),
            is_signal: false,
            truth: &f.truth,
            leptons: &f.leptons,
            bjets: &f.bjets,
            wjets,
            met: MeasuredMissingEt::with_resolution(10.0, 0.0, 10.0, 10.0),
        }
    }

    #[test]
    fn test_dilepton_variants_and_categories() {
        let f = fixture(2);
        let mut rng = StdRng::seed_from_u64(1);
        let builder = VariantBuilder::new(Channel::Dilepton);
        let variants = builder.build(&mut rng, &inputs(&f, &[])).unwrap();
        assert_eq!(variants.len(), 2);
        let full = &variants[0];
        assert_eq!(full.kind(), VariantKind::Full);
        assert_eq!(full.category(), "1genuineBJet");
        assert_eq!(full.count(ParticleType::BJet), 2);
        assert!(full.truth_matches()[2].is_some());
        assert!(full.truth_matches()[3].is_none());
        assert_eq!(full.reference().bjets.len(), 2);

        let missing = &variants[1];
        assert_eq!(missing.kind(), VariantKind::MissingBJet);
        assert_eq!(missing.count(ParticleType::BJet), 1);
        let kept = missing.of_kind(ParticleType::BJet).next().unwrap().0;
        let expected =
            if kept.is_fake() { "missingBJet_fakeBJet" } else { "missingBJet_genuineBJet" };
        assert_eq!(missing.category(), expected);
        assert!(missing.result().is_none());
    }

    #[test]
    fn test_single_lepton_builds_four_variants() {
        let f = fixture(1);
        let mut rng = StdRng::seed_from_u64(2);
        let builder = VariantBuilder::new(Channel::SingleLepton);
        let variants = builder.build(&mut rng, &inputs(&f, &f.wjets)).unwrap();
        let kinds: Vec<VariantKind> = variants.iter().map(|v| v.kind()).collect();
        assert_eq!(kinds, VariantKind::for_channel(Channel::SingleLepton));
        assert_eq!(variants[0].category(), "1genuineBJet_2genuineWJets");
        let both = &variants[3];
        assert_eq!(both.count(ParticleType::BJet), 1);
        assert_eq!(both.count(ParticleType::HadWJet), 1);
        assert_eq!(both.particles().len(), 3);
        assert!(both.category().starts_with("missingBnWJet_"));
    }

    #[test]
    fn test_single_lepton_missing_labels_keep_other_category() {
        let f = fixture(1);
        let extra = f.truth.jets[0];
        let wjets = vec![
            f.wjets[0],
            jet(&f.truth.arena, ParticleType::HadWJet, 45.0, extra, Provenance::PoolDraw),
        ];
        let mut rng = StdRng::seed_from_u64(7);
        let builder = VariantBuilder::new(Channel::SingleLepton);
        let variants = builder.build(&mut rng, &inputs(&f, &wjets)).unwrap();
        assert_eq!(variants.len(), 4);
        assert_eq!(variants[0].category(), "1genuineBJet_1genuineWJet");

        let missing_b = variants[1].category();
        assert_eq!(variants[1].kind(), VariantKind::MissingBJet);
        assert!(missing_b.starts_with("missingBJet_"), "{missing_b}");
        assert!(missing_b.ends_with("BJet_1genuineWJet"), "{missing_b}");

        let missing_w = variants[2].category();
        assert_eq!(variants[2].kind(), VariantKind::MissingWJet);
        assert!(missing_w.starts_with("missingWJet_1genuineBJet_"), "{missing_w}");
        assert!(missing_w.ends_with("WJet"), "{missing_w}");
    }

    #[test]
    fn test_unsatisfiable_variants_are_omitted_but_draws_taken() {
        let f = fixture(1);
        let one_w = &f.wjets[..1];
        let mut rng = StdRng::seed_from_u64(3);
        let builder = VariantBuilder::new(Channel::SingleLepton);
        let variants = builder.build(&mut rng, &inputs(&f, one_w)).unwrap();
        assert!(variants.is_empty());

        let mut reference = StdRng::seed_from_u64(3);
        for _ in 0..4 {
            let _: f64 = reference.random();
        }
        assert_eq!(rng.random::<u64>(), reference.random::<u64>());
    }

    #[test]
    fn test_attach_result() {
        let f = fixture(2);
        let mut rng = StdRng::seed_from_u64(4);
        let builder = VariantBuilder::new(Channel::Dilepton);
        let mut variants = builder.build(&mut rng, &inputs(&f, &[])).unwrap();
        variants[0].attach_result(MemResult::new(2.0, 0.1, 1.0, 0.1), Duration::from_millis(3));
        assert_eq!(variants[0].result().unwrap().prob_signal, 2.0);
        assert_eq!(variants[0].engine_time(), Some(Duration::from_millis(3)));
        assert_eq!(variants[0].engine_particles().len(), 4);
    }

    #[test]
    fn test_truth_match_picks_closest() {
        let mut arena = TruthArena::new();
        let far = arena.push(tp(TruthCategory::BQuark, 50.0, 0.25, 0.0, 5));
        let near = arena.push(tp(TruthCategory::BQuark, 50.0, 0.1, 0.0, -5));
        let m = EngineParticle {
            kind: ParticleType::BJet,
            pt: 50.0,
            eta: 0.0,
            phi: 0.0,
            mass: 4.8,
            charge: 0,
        };
        let found = find_truth_match(&m, &[far, near], &arena).unwrap().unwrap();
        assert_eq!(found.handle, near);
        let outside = EngineParticle { eta: 1.0, ..m };
        assert!(find_truth_match(&outside, &[far, near], &arena).unwrap().is_none());
    }
}
