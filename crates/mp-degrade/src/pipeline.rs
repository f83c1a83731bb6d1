//! Per-event processing and the event loop.
//!
//! [`EventProcessor`] takes one generator event through truth assembly,
//! selection, fake substitution, smearing, the event-level cuts and variant
//! construction. [`Analyzer`] drives it over an event stream, applies the
//! allow-list and the skip/max controls, calls the probability engine once per
//! variant and hands scored variants to a [`RecordSink`].

use crate::allowlist::RunLumiEventSelector;
use crate::config::{AnalysisConfig, Channel, RunConfig, SelectionConfig};
use crate::cutflow::{Cut, CutFlowTable, Rejection};
use crate::fake::{FakeSubstitutionSampler, SlotAssignment, SlotRole};
use crate::input::GenEvent;
use crate::kinematics::LorentzVector;
use crate::measured::MeasuredParticle;
use crate::pool::{CandidatePool, ConsumedSet};
use crate::record::RecordSink;
use crate::rng::RandomStreams;
use crate::selection::{JetSelector, ObjectSelector};
use crate::smear::{JetSmearer, MetSmearer};
use crate::truth::{AssembledTruth, TruthAssembler, TruthHandle};
use crate::variant::{HypothesisVariant, VariantBuilder, VariantInputs};
use mp_core::{
    EngineParticle, EventId, MeasuredMissingEt, ParticleType, ProbabilityEngine, Result,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::time::Instant;

/// An event that passed every cut.
#[derive(Debug, Clone)]
pub struct SelectedEvent {
    /// Event identity.
    pub id: EventId,
    /// Event weight.
    pub weight: f64,
    /// Truth objects the measured objects refer to.
    pub truth: AssembledTruth,
    /// Slot decisions in slot order (b-jet slots, then W-jet slots).
    pub slots: Vec<SlotAssignment>,
    /// Pool the b-jet slots drew from.
    pub bjet_pool: CandidatePool,
    /// Pool the W-jet slots drew from (empty in the dilepton channel).
    pub wjet_pool: CandidatePool,
    /// Objects consumed by fake substitution.
    pub consumed: ConsumedSet,
    /// Smeared missing Et.
    pub met: MeasuredMissingEt,
    /// Unscored variants in build order.
    pub variants: Vec<HypothesisVariant>,
}

/// Result of processing one event.
#[derive(Debug, Clone)]
pub enum EventOutcome {
    /// The event failed a cut; processing continues with the next event.
    Rejected(Rejection),
    /// The event passed every cut.
    Selected(Box<SelectedEvent>),
}

impl EventOutcome {
    /// Whether the event passed every cut.
    pub fn is_selected(&self) -> bool {
        matches!(self, Self::Selected(_))
    }
}

/// Jets surviving substitution and smearing, per category.
struct DegradedJets {
    slots: Vec<SlotAssignment>,
    measured: Vec<MeasuredParticle>,
}

/// Stateless per-event pipeline; all randomness comes from the streams passed in.
#[derive(Debug, Clone)]
pub struct EventProcessor {
    channel: Channel,
    is_signal: bool,
    apply_gen_weight: bool,
    selection: SelectionConfig,
    assembler: TruthAssembler,
    selector: ObjectSelector,
    sampler: FakeSubstitutionSampler,
    jet_smearer: JetSmearer,
    met_smearer: MetSmearer,
    variants: VariantBuilder,
}

impl EventProcessor {
    /// Validate `config` and build the per-event stages.
    pub fn new(config: &AnalysisConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            channel: config.channel,
            is_signal: config.is_signal(),
            apply_gen_weight: config.apply_gen_weight,
            selection: config.selection.clone(),
            assembler: TruthAssembler::new(config),
            selector: ObjectSelector::new(&config.selection),
            sampler: FakeSubstitutionSampler::new(config.fake_rates.clone()),
            jet_smearer: JetSmearer::new(&config.smearing.jet),
            met_smearer: MetSmearer::new(&config.smearing.met),
            variants: VariantBuilder::new(config.channel),
        })
    }

    /// Decay channel being processed.
    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Process one event that already passed the allow-list.
    ///
    /// Soft rejections are returned as [`EventOutcome::Rejected`]; errors are
    /// fatal (malformed input, invariant violations).
    pub fn process(
        &self,
        event: &GenEvent,
        streams: &mut RandomStreams,
        cut_flow: &mut CutFlowTable,
    ) -> Result<EventOutcome> {
        let weight = event.weight(self.apply_gen_weight);
        cut_flow.begin_event();
        cut_flow.pass(Cut::RunLumiEvent, weight)?;

        let raw = match self.assembler.fetch(event)? {
            Ok(raw) => raw,
            Err(rejection) => return Ok(EventOutcome::Rejected(rejection)),
        };
        cut_flow.pass(Cut::GenLevelMultiplicity, weight)?;
        let truth = match self.assembler.assemble(&raw) {
            Ok(truth) => truth,
            Err(rejection) => return Ok(EventOutcome::Rejected(rejection)),
        };
        cut_flow.pass(Cut::GenLevelMatching, weight)?;

        let selected = self.selector.select(&truth)?;
        let mut consumed = ConsumedSet::new();
        let (bjet_pool, wjet_pool) = match self.channel {
            Channel::Dilepton => {
                (CandidatePool::new(selected.extra_jets.clone()), CandidatePool::default())
            }
            Channel::SingleLepton => {
                let joint = [selected.wjets.as_slice(), selected.extra_jets.as_slice()].concat();
                (CandidatePool::new(joint), CandidatePool::new(selected.extra_jets.clone()))
            }
        };
        let jet_selector = *self.selector.jet_selector();
        let bjets = self.degrade(
            ParticleType::BJet,
            &selected.bjets,
            &bjet_pool,
            &mut consumed,
            &truth,
            streams,
            &jet_selector,
        )?;
        let wjets = match self.channel {
            Channel::Dilepton => DegradedJets { slots: Vec::new(), measured: Vec::new() },
            Channel::SingleLepton => self.degrade(
                ParticleType::HadWJet,
                &selected.wjets,
                &wjet_pool,
                &mut consumed,
                &truth,
                streams,
                &jet_selector,
            )?,
        };
        let met = self.met_smearer.smear(&mut streams.met_smearing, &truth.met)?;

        let leptons = selected
            .leptons
            .iter()
            .map(|&h| MeasuredParticle::lepton(h, truth.arena.resolve(h)?))
            .collect::<Result<Vec<_>>>()?;

        let rejection =
            self.apply_cuts(&leptons, &bjets.measured, &wjets.measured, weight, cut_flow)?;
        if let Some(rejection) = rejection {
            return Ok(EventOutcome::Rejected(rejection));
        }

        let inputs = VariantInputs {
            id: event.id(),
            is_signal: self.is_signal,
            truth: &truth,
            leptons: &leptons,
            bjets: &bjets.measured,
            wjets: &wjets.measured,
            met,
        };
        let variants = self.variants.build(&mut streams.selection, &inputs)?;

        let mut slots = bjets.slots;
        slots.extend(wjets.slots);
        Ok(EventOutcome::Selected(Box::new(SelectedEvent {
            id: event.id(),
            weight,
            truth,
            slots,
            bjet_pool,
            wjet_pool,
            consumed,
            met,
            variants,
        })))
    }

    /// Fake substitution then pt smearing, slot by slot.
    #[allow(clippy::too_many_arguments)]
    fn degrade(
        &self,
        kind: ParticleType,
        truth_jets: &[TruthHandle],
        pool: &CandidatePool,
        consumed: &mut ConsumedSet,
        truth: &AssembledTruth,
        streams: &mut RandomStreams,
        jet_selector: &JetSelector,
    ) -> Result<DegradedJets> {
        let mut slots = Vec::with_capacity(truth_jets.len());
        let mut measured = Vec::with_capacity(truth_jets.len());
        for (i, &h) in truth_jets.iter().enumerate() {
            let role = SlotRole::for_position(kind, i)?;
            let slot =
                self.sampler.assign(&mut streams.selection, role, h, pool, consumed, &truth.arena)?;
            if let Some((source, provenance)) = slot.assigned {
                let t = truth.arena.resolve(source)?;
                let pt = self.jet_smearer.smear(&mut streams.jet_smearing, t.pt)?;
                if jet_selector.passes_pt(pt) {
                    measured.push(MeasuredParticle::jet(kind, pt, source, t, provenance)?);
                }
            }
            slots.push(slot);
        }
        Ok(DegradedJets { slots, measured })
    }

    fn apply_cuts(
        &self,
        leptons: &[MeasuredParticle],
        bjets: &[MeasuredParticle],
        wjets: &[MeasuredParticle],
        weight: f64,
        cut_flow: &mut CutFlowTable,
    ) -> Result<Option<Rejection>> {
        let sel = &self.selection;
        match self.channel {
            Channel::Dilepton => {
                let [lead, sublead] = match leptons {
                    [a, b, ..] => [a.particle(), b.particle()],
                    _ => {
                        let reason = format!("{} leptons", leptons.len());
                        return Ok(Some(Rejection::new(Cut::LeptonCount, reason)));
                    }
                };
                cut_flow.pass(Cut::LeptonCount, weight)?;
                if !(lead.pt > sel.lead_lepton_min_pt && sublead.pt > sel.sublead_lepton_min_pt) {
                    return Ok(Some(Rejection::new(
                        Cut::LeptonPt,
                        format!("lepton pt {:.2}, {:.2}", lead.pt, sublead.pt),
                    )));
                }
                cut_flow.pass(Cut::LeptonPt, weight)?;
                if lead.charge + sublead.charge != 0 {
                    return Ok(Some(Rejection::new(
                        Cut::LeptonCharge,
                        format!("lepton charges {}, {}", lead.charge, sublead.charge),
                    )));
                }
                cut_flow.pass(Cut::LeptonCharge, weight)?;
                if bjets.len() < 2 {
                    let reason = format!("{} b-jets", bjets.len());
                    return Ok(Some(Rejection::new(Cut::BJetCount, reason)));
                }
                cut_flow.pass(Cut::BJetCount, weight)?;
                let p4 = |p: &EngineParticle| {
                    LorentzVector::from_pt_eta_phi_m(p.pt, p.eta, p.phi, p.mass)
                };
                let mll = (p4(lead) + p4(sublead)).mass();
                if mll >= sel.mll_max {
                    return Ok(Some(Rejection::new(Cut::MllMax, format!("m(ll) = {mll:.2} GeV"))));
                }
                cut_flow.pass(Cut::MllMax, weight)?;
                if mll < sel.mll_min {
                    return Ok(Some(Rejection::new(Cut::MllMin, format!("m(ll) = {mll:.2} GeV"))));
                }
                cut_flow.pass(Cut::MllMin, weight)?;
            }
            Channel::SingleLepton => {
                let Some(lead) = leptons.first().map(MeasuredParticle::particle) else {
                    return Ok(Some(Rejection::new(Cut::LeptonCount, "0 leptons")));
                };
                cut_flow.pass(Cut::LeptonCount, weight)?;
                if lead.pt <= sel.lead_lepton_min_pt {
                    let reason = format!("lepton pt {:.2}", lead.pt);
                    return Ok(Some(Rejection::new(Cut::LeptonPt, reason)));
                }
                cut_flow.pass(Cut::LeptonPt, weight)?;
                if bjets.len() < 2 {
                    let reason = format!("{} b-jets", bjets.len());
                    return Ok(Some(Rejection::new(Cut::BJetCount, reason)));
                }
                cut_flow.pass(Cut::BJetCount, weight)?;
                if wjets.len() < 2 {
                    let reason = format!("{} W-jets", wjets.len());
                    return Ok(Some(Rejection::new(Cut::WJetCount, reason)));
                }
                cut_flow.pass(Cut::WJetCount, weight)?;
            }
        }
        Ok(None)
    }
}

/// Unweighted and weighted count of one variant category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryTally {
    /// Unweighted count.
    pub events: u64,
    /// Sum of event weights.
    pub weighted: f64,
}

/// End-of-run report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Events read from the source.
    pub analyzed: u64,
    /// Selected events processed without scoring.
    pub skipped: u64,
    /// Selected events scored and recorded.
    pub selected: u64,
    /// Sum of the weights of the selected events.
    pub selected_weighted: f64,
    /// Weighted pass counts per cut.
    pub cut_flow: CutFlowTable,
    /// Variant name → category → tally.
    pub categories: BTreeMap<String, BTreeMap<String, CategoryTally>>,
}

/// Event loop over a stream of generator events.
pub struct Analyzer<'w> {
    processor: EventProcessor,
    run: RunConfig,
    selection: SelectionConfig,
    verbose: bool,
    allow_list: Option<RunLumiEventSelector>,
    selected_events: Option<Box<dyn Write + 'w>>,
}

impl<'w> Analyzer<'w> {
    /// Event loop for `config`, without allow-list or selected-events output.
    pub fn new(config: &AnalysisConfig) -> Result<Self> {
        Ok(Self {
            processor: EventProcessor::new(config)?,
            run: config.run.clone(),
            selection: config.selection.clone(),
            verbose: config.verbose,
            allow_list: None,
            selected_events: None,
        })
    }

    /// Only process events on the allow-list; the loop ends once all were seen.
    pub fn with_allow_list(mut self, allow_list: RunLumiEventSelector) -> Self {
        self.allow_list = Some(allow_list);
        self
    }

    /// Write `run:ls:event` of every recorded event to `writer`.
    pub fn with_selected_events_writer(mut self, writer: impl Write + 'w) -> Self {
        self.selected_events = Some(Box::new(writer));
        self
    }

    fn should_stop(&self, analyzed: u64, selected: u64) -> bool {
        if self.run.max_events.is_some_and(|max| analyzed >= max) {
            return true;
        }
        if self.run.max_sel_events.is_some_and(|max| selected >= max) {
            return true;
        }
        self.allow_list.as_ref().is_some_and(RunLumiEventSelector::are_we_done)
    }

    /// Run the event loop.
    pub fn run<I, E, S>(&mut self, events: I, engine: &mut E, sink: &mut S) -> Result<RunSummary>
    where
        I: IntoIterator<Item = Result<GenEvent>>,
        E: ProbabilityEngine + ?Sized,
        S: RecordSink + ?Sized,
    {
        let channel = self.processor.channel();
        let mut streams = RandomStreams::from_seed(self.run.seed);
        let mut summary = RunSummary {
            analyzed: 0,
            skipped: 0,
            selected: 0,
            selected_weighted: 0.0,
            cut_flow: CutFlowTable::new(channel, &self.selection),
            categories: BTreeMap::new(),
        };
        tracing::info!(
            channel = channel.as_str(),
            engine = engine.name(),
            seed = self.run.seed,
            skip_sel_events = self.run.skip_sel_events,
            "starting event loop"
        );

        for event in events {
            if self.should_stop(summary.analyzed, summary.selected) {
                break;
            }
            let event = event?;
            summary.analyzed += 1;
            if self.run.report_every > 0 && summary.analyzed % self.run.report_every == 0 {
                let (analyzed, selected) = (summary.analyzed, summary.selected);
                tracing::info!(analyzed, selected, "processing");
            }
            let id = event.id();
            if let Some(allow_list) = self.allow_list.as_mut() {
                if !allow_list.accept(id) {
                    continue;
                }
            }

            let outcome = self.processor.process(&event, &mut streams, &mut summary.cut_flow)?;
            let selected = match outcome {
                EventOutcome::Rejected(rejection) => {
                    if self.verbose {
                        tracing::info!(event = %id, cut = ?rejection.cut, "{}", rejection.reason);
                    } else {
                        tracing::debug!(event = %id, cut = ?rejection.cut, "{}", rejection.reason);
                    }
                    continue;
                }
                EventOutcome::Selected(selected) => selected,
            };

            if summary.skipped < self.run.skip_sel_events {
                summary.skipped += 1;
                continue;
            }
            if let Some(w) = self.selected_events.as_mut() {
                writeln!(w, "{id}")?;
            }

            let SelectedEvent { weight, variants, .. } = *selected;
            for mut variant in variants {
                let particles = variant.engine_particles();
                let start = Instant::now();
                let result = engine.evaluate(&particles, variant.met())?;
                variant.attach_result(result, start.elapsed());
                tracing::debug!(
                    event = %id,
                    variant = variant.kind().name(),
                    category = variant.category(),
                    lr = result.likelihood_ratio(),
                    "scored"
                );
                let tally = summary
                    .categories
                    .entry(variant.kind().name().to_string())
                    .or_default()
                    .entry(variant.category().to_string())
                    .or_default();
                tally.events += 1;
                tally.weighted += weight;
                sink.record(&variant, weight)?;
            }
            summary.selected += 1;
            summary.selected_weighted += weight;
        }

        sink.finish()?;
        if let Some(w) = self.selected_events.as_mut() {
            w.flush()?;
        }
        tracing::info!(
            analyzed = summary.analyzed,
            skipped = summary.skipped,
            selected = summary.selected,
            "event loop finished"
        );
        Ok(summary)
    }
}
