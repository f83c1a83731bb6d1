//! Output records assembled from field groups, and the sinks that store them.

use crate::config::Channel;
use crate::kinematics::{LorentzVector, delta_r};
use crate::variant::{HypothesisVariant, VariantKind};
use mp_core::{ParticleType, Result};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// One flat output row.
pub type Record = Map<String, Value>;

/// Receives finished, scored variants.
pub trait RecordSink {
    /// Store one variant with its event weight.
    fn record(&mut self, variant: &HypothesisVariant, weight: f64) -> Result<()>;

    /// Flush buffered output.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<S: RecordSink + ?Sized> RecordSink for &mut S {
    fn record(&mut self, variant: &HypothesisVariant, weight: f64) -> Result<()> {
        (**self).record(variant, weight)
    }

    fn finish(&mut self) -> Result<()> {
        (**self).finish()
    }
}

/// A named block of output fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldGroup {
    /// Event identity, variant, category and weight.
    Event,
    /// Engine probabilities, likelihood ratio and wall time.
    Engine,
    /// Measured leptons, `lepton1_*` …
    Leptons {
        /// Number of lepton columns; absent leptons are zero-filled.
        slots: usize,
    },
    /// Measured jets of one type, `<prefix>1_*` … plus a multiplicity.
    Jets {
        /// Jet type to select.
        kind: ParticleType,
        /// Column prefix.
        prefix: &'static str,
        /// Number of jet columns.
        slots: usize,
    },
    /// Truth reference jets of one type, `gen_<prefix>1_*` …
    GenJets {
        /// Jet type whose truth reference is written.
        kind: ParticleType,
        /// Column prefix, after `gen_`.
        prefix: &'static str,
        /// Number of jet columns.
        slots: usize,
    },
    /// Measured and truth missing Et.
    Met,
    /// Pair quantities of the measured jets of one type (`m<suffix>`, `pt<suffix>`, `dr<suffix>`).
    JetPair {
        /// Jet type to pair.
        kind: ParticleType,
        /// Column suffix.
        suffix: &'static str,
    },
    /// Dilepton mass.
    LeptonPair,
}

fn put(rec: &mut Record, key: impl Into<String>, value: Value) {
    rec.insert(key.into(), value);
}

fn write_kinematics(rec: &mut Record, prefix: &str, p4: Option<(f64, f64, f64, f64)>) {
    let (pt, eta, phi, mass) = p4.unwrap_or((0.0, 0.0, 0.0, 0.0));
    put(rec, format!("{prefix}_pt"), json!(pt));
    put(rec, format!("{prefix}_eta"), json!(eta));
    put(rec, format!("{prefix}_phi"), json!(phi));
    put(rec, format!("{prefix}_mass"), json!(mass));
}

impl FieldGroup {
    /// Append this group's fields for `variant`.
    pub fn write(&self, variant: &HypothesisVariant, weight: f64, rec: &mut Record) {
        match *self {
            Self::Event => {
                let id = variant.id();
                put(rec, "run", json!(id.run));
                put(rec, "ls", json!(id.lumi));
                put(rec, "event", json!(id.event));
                put(rec, "isSignal", json!(variant.is_signal()));
                put(rec, "variant", json!(variant.kind().name()));
                put(rec, "category", json!(variant.category()));
                put(rec, "evtWeight", json!(weight));
            }
            Self::Engine => {
                let r = variant.result();
                put(rec, "memProbS", json!(r.map_or(0.0, |r| r.prob_signal)));
                put(rec, "memProbSerr", json!(r.map_or(0.0, |r| r.prob_signal_err)));
                put(rec, "memProbB", json!(r.map_or(0.0, |r| r.prob_background)));
                put(rec, "memProbBerr", json!(r.map_or(0.0, |r| r.prob_background_err)));
                put(rec, "memLR", json!(r.map_or(-1.0, |r| r.likelihood_ratio())));
                put(rec, "memLRerr", json!(r.map_or(0.0, |r| r.likelihood_ratio_err())));
                put(rec, "memScore", json!(r.map_or(0.0, |r| r.score())));
                let wall = variant.engine_time().map_or(-1.0, |t| t.as_secs_f64());
                put(rec, "memCpuTime", json!(wall));
            }
            Self::Leptons { slots } => {
                let leptons: Vec<_> = variant
                    .particles()
                    .iter()
                    .zip(variant.truth_matches())
                    .filter(|(p, _)| p.kind().is_lepton())
                    .collect();
                for i in 0..slots {
                    let prefix = format!("lepton{}", i + 1);
                    let lep = leptons.get(i);
                    let p = lep.map(|(m, _)| m.particle());
                    write_kinematics(rec, &prefix, p.map(|p| (p.pt, p.eta, p.phi, p.mass)));
                    let matched = lep.is_some_and(|(_, m)| m.is_some());
                    put(rec, format!("{prefix}_pdgId"), json!(p.map_or(0, |p| p.pdg_id())));
                    put(rec, format!("{prefix}_charge"), json!(p.map_or(0, |p| p.charge)));
                    put(rec, format!("{prefix}_isGenMatched"), json!(matched));
                }
            }
            Self::Jets { kind, prefix, slots } => {
                let jets: Vec<_> = variant.of_kind(kind).collect();
                for i in 0..slots {
                    let name = format!("{prefix}{}", i + 1);
                    let jet = jets.get(i);
                    let p = jet.map(|(m, _)| m.particle());
                    write_kinematics(rec, &name, p.map(|p| (p.pt, p.eta, p.phi, p.mass)));
                    let matched = jet.is_some_and(|(_, m)| m.is_some());
                    put(rec, format!("{name}_isGenMatched"), json!(matched));
                    let fake = jet.is_some_and(|(m, _)| m.is_fake());
                    put(rec, format!("{name}_isFake"), json!(fake));
                }
                put(rec, format!("n{prefix}s"), json!(jets.len()));
            }
            Self::GenJets { kind, prefix, slots } => {
                let reference = variant.reference();
                let truth = match kind {
                    ParticleType::BJet => &reference.bjets,
                    ParticleType::HadWJet => &reference.wjets,
                    ParticleType::Electron | ParticleType::Muon => &reference.leptons,
                };
                for i in 0..slots {
                    let t = truth.get(i).map(|t| (t.pt, t.eta, t.phi, t.mass));
                    write_kinematics(rec, &format!("gen_{prefix}{}", i + 1), t);
                }
            }
            Self::Met => {
                let met = variant.met();
                put(rec, "met_px", json!(met.px));
                put(rec, "met_py", json!(met.py));
                put(rec, "met_pt", json!(met.pt()));
                put(rec, "met_phi", json!(met.phi()));
                put(rec, "met_cov00", json!(met.cov[(0, 0)]));
                put(rec, "met_cov01", json!(met.cov[(0, 1)]));
                put(rec, "met_cov10", json!(met.cov[(1, 0)]));
                put(rec, "met_cov11", json!(met.cov[(1, 1)]));
                let gen_met = variant.reference().met;
                put(rec, "gen_met_px", json!(gen_met.px));
                put(rec, "gen_met_py", json!(gen_met.py));
                put(rec, "gen_met_pt", json!(gen_met.pt()));
                put(rec, "gen_met_phi", json!(gen_met.phi()));
            }
            Self::JetPair { kind, suffix } => {
                let jets: Vec<_> = variant.of_kind(kind).map(|(m, _)| *m.particle()).collect();
                let (mass, pt, dr) = match jets.as_slice() {
                    [a, b] => {
                        let sum = LorentzVector::from_pt_eta_phi_m(a.pt, a.eta, a.phi, a.mass)
                            + LorentzVector::from_pt_eta_phi_m(b.pt, b.eta, b.phi, b.mass);
                        (sum.mass(), sum.pt(), delta_r(a.eta, a.phi, b.eta, b.phi))
                    }
                    _ => (-1.0, -1.0, -1.0),
                };
                put(rec, format!("m{suffix}"), json!(mass));
                put(rec, format!("pt{suffix}"), json!(pt));
                put(rec, format!("dr{suffix}"), json!(dr));
            }
            Self::LeptonPair => {
                let leptons: Vec<_> = variant
                    .particles()
                    .iter()
                    .filter(|p| p.kind().is_lepton())
                    .map(|m| *m.particle())
                    .collect();
                let mll = match leptons.as_slice() {
                    [a, b] => (LorentzVector::from_pt_eta_phi_m(a.pt, a.eta, a.phi, a.mass)
                        + LorentzVector::from_pt_eta_phi_m(b.pt, b.eta, b.phi, b.mass))
                    .mass(),
                    _ => -1.0,
                };
                put(rec, "mll", json!(mll));
            }
        }
    }
}

/// Ordered field groups of one channel's records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLayout {
    groups: Vec<FieldGroup>,
}

impl RecordLayout {
    /// Layout from an explicit group list.
    pub fn new(groups: Vec<FieldGroup>) -> Self {
        Self { groups }
    }

    /// Default layout of a channel's records.
    pub fn for_channel(channel: Channel) -> Self {
        let bjets = [
            FieldGroup::Jets { kind: ParticleType::BJet, prefix: "bjet", slots: 2 },
            FieldGroup::GenJets { kind: ParticleType::BJet, prefix: "bjet", slots: 2 },
            FieldGroup::JetPair { kind: ParticleType::BJet, suffix: "bb" },
        ];
        let mut groups = vec![FieldGroup::Event, FieldGroup::Engine];
        match channel {
            Channel::Dilepton => {
                groups.push(FieldGroup::Leptons { slots: 2 });
                groups.push(FieldGroup::LeptonPair);
                groups.extend(bjets);
            }
            Channel::SingleLepton => {
                groups.push(FieldGroup::Leptons { slots: 1 });
                groups.extend(bjets);
                let kind = ParticleType::HadWJet;
                groups.push(FieldGroup::Jets { kind, prefix: "wjet", slots: 2 });
                groups.push(FieldGroup::GenJets { kind, prefix: "wjet", slots: 2 });
                groups.push(FieldGroup::JetPair { kind, suffix: "jj" });
            }
        }
        groups.push(FieldGroup::Met);
        Self { groups }
    }

    /// Groups in output order.
    pub fn groups(&self) -> &[FieldGroup] {
        &self.groups
    }

    /// Build the record of one variant.
    pub fn build(&self, variant: &HypothesisVariant, weight: f64) -> Record {
        let mut rec = Record::new();
        for g in &self.groups {
            g.write(variant, weight, &mut rec);
        }
        rec
    }
}

/// Writes one JSON object per line, one file per variant kind (`<dir>/<kind>.jsonl`).
pub struct JsonLinesSink {
    dir: PathBuf,
    layout: RecordLayout,
    writers: BTreeMap<VariantKind, BufWriter<File>>,
}

impl JsonLinesSink {
    /// Create the output directory if needed; files are opened on first use.
    pub fn create(dir: &Path, layout: RecordLayout) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self { dir: dir.to_path_buf(), layout, writers: BTreeMap::new() })
    }

    /// Path of the file holding one variant kind.
    pub fn path_for(&self, kind: VariantKind) -> PathBuf {
        self.dir.join(format!("{}.jsonl", kind.name()))
    }
}

impl RecordSink for JsonLinesSink {
    fn record(&mut self, variant: &HypothesisVariant, weight: f64) -> Result<()> {
        let kind = variant.kind();
        if !self.writers.contains_key(&kind) {
            let file = File::create(self.path_for(kind))?;
            self.writers.insert(kind, BufWriter::new(file));
        }
        let rec = self.layout.build(variant, weight);
        if let Some(w) = self.writers.get_mut(&kind) {
            serde_json::to_writer(&mut *w, &rec)?;
            w.write_all(b"\n")?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        for w in self.writers.values_mut() {
            w.flush()?;
        }
        Ok(())
    }
}

/// Keeps variants and their records in memory.
#[derive(Debug, Clone)]
pub struct MemorySink {
    layout: RecordLayout,
    /// Recorded variants with their weights, in arrival order.
    pub variants: Vec<(HypothesisVariant, f64)>,
    /// Records built from `variants`.
    pub records: Vec<Record>,
}

impl MemorySink {
    /// Empty sink building records with `layout`.
    pub fn new(layout: RecordLayout) -> Self {
        Self { layout, variants: Vec::new(), records: Vec::new() }
    }

    /// Recorded variants of one kind.
    pub fn of_kind(&self, kind: VariantKind) -> impl Iterator<Item = &HypothesisVariant> {
        self.variants.iter().map(|(v, _)| v).filter(move |v| v.kind() == kind)
    }
}

impl RecordSink for MemorySink {
    fn record(&mut self, variant: &HypothesisVariant, weight: f64) -> Result<()> {
        self.records.push(self.layout.build(variant, weight));
        self.variants.push((variant.clone(), weight));
        Ok(())
    }
}
