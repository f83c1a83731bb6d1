//! Analysis configuration.
//!
//! Loaded from YAML (or JSON, selected by file extension). Every field has a
//! default, so an empty document is a valid dilepton background configuration.

use mp_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Final state under study.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Two charged leptons, two b-jets.
    #[default]
    Dilepton,
    /// One charged lepton, two b-jets, two jets from a hadronic W.
    SingleLepton,
}

impl Channel {
    /// Lower-case identifier used in logs and output file names.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dilepton => "dilepton",
            Self::SingleLepton => "single_lepton",
        }
    }
}

/// Logical names of the generator-truth collections read per event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BranchNames {
    /// Charged leptons
    pub leptons: String,
    /// Neutrinos
    pub neutrinos: String,
    /// Generator jets (the extra-jet pool before cleaning)
    pub jets: String,
    /// Higgs decay products
    pub higgs_daughters: String,
    /// W/Z bosons
    pub vector_bosons: String,
    /// Quarks from W/Z decays
    pub vector_boson_quarks: String,
    /// Leptons from top decays
    pub top_leptons: String,
    /// Neutrinos from top decays
    pub top_neutrinos: String,
    /// b quarks from top decays
    pub top_bquarks: String,
    /// Light quarks from hadronic W decays in top decays
    pub top_wquarks: String,
}

impl Default for BranchNames {
    fn default() -> Self {
        Self {
            leptons: "GenLep".into(),
            neutrinos: "GenNu".into(),
            jets: "GenJet".into(),
            higgs_daughters: "GenHiggsDaughters".into(),
            vector_bosons: "GenVbosons".into(),
            vector_boson_quarks: "GenWZQuark".into(),
            top_leptons: "GenLepFromTop".into(),
            top_neutrinos: "GenNuFromTop".into(),
            top_bquarks: "GenBQuarkFromTop".into(),
            top_wquarks: "GenQuarkFromTop".into(),
        }
    }
}

/// Jet transverse-momentum smearing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JetSmearingConfig {
    /// Smear jet pt.
    pub enabled: bool,
    /// Resolution coefficient: `sigma = coeff * sqrt(max(1, pt))`.
    pub coeff: f64,
}

impl Default for JetSmearingConfig {
    fn default() -> Self {
        Self { enabled: false, coeff: 1.0 }
    }
}

/// Missing-Et smearing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetSmearingConfig {
    /// Smear the missing-Et components; the covariance is reported either way.
    pub enabled: bool,
    /// Resolution on `px` (GeV).
    pub sigma_x: f64,
    /// Resolution on `py` (GeV).
    pub sigma_y: f64,
}

impl Default for MetSmearingConfig {
    fn default() -> Self {
        Self { enabled: false, sigma_x: 10.0, sigma_y: 10.0 }
    }
}

/// Resolution smearing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmearingConfig {
    /// Jet pt smearing.
    pub jet: JetSmearingConfig,
    /// Missing-Et smearing.
    pub met: MetSmearingConfig,
}

/// Per-slot fake-substitution probabilities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FakeRates {
    /// Leading b-jet slot.
    pub bjet_lead: f64,
    /// Subleading b-jet slot.
    pub bjet_sublead: f64,
    /// Leading W-jet slot.
    pub wjet_lead: f64,
    /// Subleading W-jet slot.
    pub wjet_sublead: f64,
}

/// Object thresholds and event-level cuts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Jet pt threshold, also applied after smearing (GeV).
    pub jet_min_pt: f64,
    /// Jet |eta| bound.
    pub jet_max_abs_eta: f64,
    /// Lepton acceptance pt threshold (GeV).
    pub lepton_min_pt: f64,
    /// Lepton |eta| bound.
    pub lepton_max_abs_eta: f64,
    /// Leading-lepton pt cut (GeV).
    pub lead_lepton_min_pt: f64,
    /// Subleading-lepton pt cut, dilepton only (GeV).
    pub sublead_lepton_min_pt: f64,
    /// ΔR below which a lower-precedence object is removed.
    pub overlap_delta_r: f64,
    /// Lower edge of the dilepton mass window, inclusive (GeV).
    pub mll_min: f64,
    /// Upper edge of the dilepton mass window, exclusive (GeV).
    pub mll_max: f64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            jet_min_pt: 20.0,
            jet_max_abs_eta: 2.4,
            lepton_min_pt: 0.0,
            lepton_max_abs_eta: 2.4,
            lead_lepton_min_pt: 25.0,
            sublead_lepton_min_pt: 15.0,
            overlap_delta_r: 0.4,
            mll_min: 12.0,
            mll_max: 76.0,
        }
    }
}

/// Event-loop control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Seed of the three random streams.
    pub seed: u64,
    /// Number of fully selected events to process without scoring or recording.
    pub skip_sel_events: u64,
    /// Stop after this many recorded events (`None`: no limit).
    pub max_sel_events: Option<u64>,
    /// Stop after this many analyzed events (`None`: no limit).
    pub max_events: Option<u64>,
    /// Progress log period in analyzed events (`0` disables).
    pub report_every: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: 12345,
            skip_sel_events: 0,
            max_sel_events: None,
            max_events: None,
            report_every: 1000,
        }
    }
}

/// Top-level analysis configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Final state.
    pub channel: Channel,
    /// Process label; labels containing `"signal"` select the signal truth chain.
    pub process: String,
    /// Truth collection names.
    pub branches: BranchNames,
    /// Resolution smearing.
    pub smearing: SmearingConfig,
    /// Fake-substitution rates.
    pub fake_rates: FakeRates,
    /// Object and event selection.
    pub selection: SelectionConfig,
    /// Event-loop control.
    pub run: RunConfig,
    /// Multiply event weights by the sign of the generator weight.
    pub apply_gen_weight: bool,
    /// Log rejections at info level.
    pub verbose: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            channel: Channel::default(),
            process: "background".into(),
            branches: BranchNames::default(),
            smearing: SmearingConfig::default(),
            fake_rates: FakeRates::default(),
            selection: SelectionConfig::default(),
            run: RunConfig::default(),
            apply_gen_weight: true,
            verbose: false,
        }
    }
}

impl AnalysisConfig {
    /// Parse a YAML document.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let cfg: Self = serde_yaml_ng::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from disk; `.json` files are parsed as JSON, everything else as YAML.
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let cfg: Self = if is_json {
            serde_json::from_slice(&bytes)?
        } else {
            serde_yaml_ng::from_slice(&bytes)?
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// `true` when the process label selects the signal truth chain.
    pub fn is_signal(&self) -> bool {
        self.process.to_ascii_lowercase().contains("signal")
    }

    /// Check ranges and internal consistency.
    pub fn validate(&self) -> Result<()> {
        let rates = [
            ("fake_rates.bjet_lead", self.fake_rates.bjet_lead),
            ("fake_rates.bjet_sublead", self.fake_rates.bjet_sublead),
            ("fake_rates.wjet_lead", self.fake_rates.wjet_lead),
            ("fake_rates.wjet_sublead", self.fake_rates.wjet_sublead),
        ];
        for (name, p) in rates {
            if !(0.0..=1.0).contains(&p) {
                return Err(Error::Validation(format!("{name} must be in [0, 1], got {p}")));
            }
        }

        let non_negative = [
            ("smearing.jet.coeff", self.smearing.jet.coeff),
            ("smearing.met.sigma_x", self.smearing.met.sigma_x),
            ("smearing.met.sigma_y", self.smearing.met.sigma_y),
            ("selection.jet_min_pt", self.selection.jet_min_pt),
            ("selection.jet_max_abs_eta", self.selection.jet_max_abs_eta),
            ("selection.lepton_min_pt", self.selection.lepton_min_pt),
            ("selection.lepton_max_abs_eta", self.selection.lepton_max_abs_eta),
            ("selection.lead_lepton_min_pt", self.selection.lead_lepton_min_pt),
            ("selection.sublead_lepton_min_pt", self.selection.sublead_lepton_min_pt),
            ("selection.overlap_delta_r", self.selection.overlap_delta_r),
            ("selection.mll_min", self.selection.mll_min),
            ("selection.mll_max", self.selection.mll_max),
        ];
        for (name, v) in non_negative {
            if !v.is_finite() || v < 0.0 {
                return Err(Error::Validation(format!("{name} must be finite and >= 0, got {v}")));
            }
        }

        if self.selection.mll_min >= self.selection.mll_max {
            return Err(Error::Validation(format!(
                "selection.mll_min ({}) must be below selection.mll_max ({})",
                self.selection.mll_min, self.selection.mll_max
            )));
        }
        if self.run.max_sel_events == Some(0) {
            return Err(Error::Validation("run.max_sel_events must be > 0 when set".into()));
        }
        if self.channel == Channel::Dilepton
            && (self.fake_rates.wjet_lead > 0.0 || self.fake_rates.wjet_sublead > 0.0)
        {
            tracing::warn!("W-jet fake rates are ignored in the dilepton channel");
        }
        Ok(())
    }
}
