//! Ordered, weighted cut-flow bookkeeping.

use crate::config::{Channel, SelectionConfig};
use mp_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Named selection step, in the order events encounter them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cut {
    /// Optional run/lumi/event allow-list.
    RunLumiEvent,
    /// Raw truth collection multiplicities.
    GenLevelMultiplicity,
    /// Decay-chain matching produced the expected objects.
    GenLevelMatching,
    /// Enough selected leptons.
    LeptonCount,
    /// Lepton pt thresholds.
    LeptonPt,
    /// Opposite-sign lepton pair (dilepton only).
    LeptonCharge,
    /// Two b-jets after substitution and smearing.
    BJetCount,
    /// Two W-jets after substitution and smearing (single-lepton only).
    WJetCount,
    /// Upper dilepton mass bound.
    MllMax,
    /// Lower dilepton mass bound.
    MllMin,
}

const DILEPTON_CUTS: &[Cut] = &[
    Cut::RunLumiEvent,
    Cut::GenLevelMultiplicity,
    Cut::GenLevelMatching,
    Cut::LeptonCount,
    Cut::LeptonPt,
    Cut::LeptonCharge,
    Cut::BJetCount,
    Cut::MllMax,
    Cut::MllMin,
];

const SINGLE_LEPTON_CUTS: &[Cut] = &[
    Cut::RunLumiEvent,
    Cut::GenLevelMultiplicity,
    Cut::GenLevelMatching,
    Cut::LeptonCount,
    Cut::LeptonPt,
    Cut::BJetCount,
    Cut::WJetCount,
];

impl Cut {
    /// Declared cut order for a channel.
    pub fn sequence(channel: Channel) -> &'static [Cut] {
        match channel {
            Channel::Dilepton => DILEPTON_CUTS,
            Channel::SingleLepton => SINGLE_LEPTON_CUTS,
        }
    }

    /// Human-readable name with thresholds rendered from the selection config.
    pub fn label(self, channel: Channel, sel: &SelectionConfig) -> String {
        match (self, channel) {
            (Self::RunLumiEvent, _) => "run:ls:event selection".into(),
            (Self::GenLevelMultiplicity, _) => "generator-level selection (1)".into(),
            (Self::GenLevelMatching, _) => "generator-level selection (2)".into(),
            (Self::LeptonCount, Channel::Dilepton) => ">= 2 gen leptons".into(),
            (Self::LeptonCount, Channel::SingleLepton) => ">= 1 gen lepton".into(),
            (Self::LeptonPt, Channel::Dilepton) => format!(
                "lead gen lepton pT > {} GeV && sublead gen lepton pT > {} GeV",
                sel.lead_lepton_min_pt, sel.sublead_lepton_min_pt
            ),
            (Self::LeptonPt, Channel::SingleLepton) => {
                format!("gen lepton pT > {} GeV", sel.lead_lepton_min_pt)
            }
            (Self::LeptonCharge, _) => "gen lepton-pair OS charge".into(),
            (Self::BJetCount, _) => ">= 2 gen b-jets".into(),
            (Self::WJetCount, _) => ">= 2 gen jets from W->jj".into(),
            (Self::MllMax, _) => format!("m(ll) < {} GeV", sel.mll_max),
            (Self::MllMin, _) => format!("m(ll) > {} GeV", sel.mll_min),
        }
    }
}

/// Why an event stopped.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    /// First cut the event failed.
    pub cut: Cut,
    /// Diagnostic detail for verbose logging.
    pub reason: String,
}

impl Rejection {
    pub(crate) fn new(cut: Cut, reason: impl Into<String>) -> Self {
        Self { cut, reason: reason.into() }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fails {:?}: {}", self.cut, self.reason)
    }
}

/// Outcome of a stage that may softly reject an event.
pub type Stage<T> = std::result::Result<T, Rejection>;

/// One row of the cut-flow table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CutFlowRow {
    /// Cut identity
    pub cut: Cut,
    /// Rendered label
    pub name: String,
    /// Unweighted pass count
    pub events: u64,
    /// Sum of event weights
    pub weighted: f64,
}

/// Forward-only weighted counters, one per declared cut.
///
/// Within an event, cuts must be passed in declared order starting from the
/// first; any other transition is an invariant violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CutFlowTable {
    rows: Vec<CutFlowRow>,
    #[serde(skip)]
    cursor: usize,
}

impl CutFlowTable {
    /// Table with zeroed counters for the channel's cut sequence.
    pub fn new(channel: Channel, sel: &SelectionConfig) -> Self {
        let rows = Cut::sequence(channel)
            .iter()
            .map(|&cut| CutFlowRow { cut, name: cut.label(channel, sel), events: 0, weighted: 0.0 })
            .collect();
        Self { rows, cursor: 0 }
    }

    /// Reset the per-event position to the first cut.
    pub fn begin_event(&mut self) {
        self.cursor = 0;
    }

    /// Record that the current event passed `cut`.
    pub fn pass(&mut self, cut: Cut, weight: f64) -> Result<()> {
        let row = self.rows.get_mut(self.cursor).ok_or_else(|| {
            Error::InvariantViolation(format!(
                "cut-flow: {cut:?} passed after the last declared cut"
            ))
        })?;
        if row.cut != cut {
            return Err(Error::InvariantViolation(format!(
                "cut-flow: expected {:?}, got {cut:?}",
                row.cut
            )));
        }
        row.events += 1;
        row.weighted += weight;
        self.cursor += 1;
        Ok(())
    }

    /// Rows in declared order.
    pub fn rows(&self) -> &[CutFlowRow] {
        &self.rows
    }

    /// Row for `cut`, if declared for this channel.
    pub fn row(&self, cut: Cut) -> Option<&CutFlowRow> {
        self.rows.iter().find(|r| r.cut == cut)
    }

    /// `true` when the table contains `cut`.
    pub fn declares(&self, cut: Cut) -> bool {
        self.row(cut).is_some()
    }
}

impl fmt::Display for CutFlowTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.rows.iter().map(|r| r.name.len()).max().unwrap_or(0);
        for r in &self.rows {
            writeln!(f, "{:<width$} : {:>10} ({:.3})", r.name, r.events, r.weighted)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_labels_follow_thresholds() {
        let sel = SelectionConfig { mll_max: 70.0, ..SelectionConfig::default() };
        let table = CutFlowTable::new(Channel::Dilepton, &sel);
        let names: Vec<&str> = table.rows().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names[0], "run:ls:event selection");
        assert_eq!(names[4], "lead gen lepton pT > 25 GeV && sublead gen lepton pT > 15 GeV");
        assert_eq!(names[7], "m(ll) < 70 GeV");
        assert_eq!(names.len(), 9);
        assert!(!table.declares(Cut::WJetCount));

        let single = CutFlowTable::new(Channel::SingleLepton, &sel);
        assert_eq!(single.rows().last().unwrap().name, ">= 2 gen jets from W->jj");
        assert!(!single.declares(Cut::LeptonCharge));
    }

    #[test]
    fn test_forward_only_transitions() {
        let mut table = CutFlowTable::new(Channel::SingleLepton, &SelectionConfig::default());
        table.begin_event();
        table.pass(Cut::RunLumiEvent, 0.5).unwrap();
        table.pass(Cut::GenLevelMultiplicity, 0.5).unwrap();
        let repeated = table.pass(Cut::GenLevelMultiplicity, 0.5);
        assert!(matches!(repeated, Err(Error::InvariantViolation(_))));
        assert!(matches!(table.pass(Cut::LeptonPt, 0.5), Err(Error::InvariantViolation(_))));

        table.begin_event();
        table.pass(Cut::RunLumiEvent, 2.0).unwrap();
        let rows = table.rows();
        assert_eq!(rows[0].events, 2);
        assert_relative_eq!(rows[0].weighted, 2.5);
        assert_eq!(rows[1].events, 1);
        assert_eq!(rows[2].events, 0);
    }

    #[test]
    fn test_passing_past_last_cut_is_fatal() {
        let mut table = CutFlowTable::new(Channel::SingleLepton, &SelectionConfig::default());
        table.begin_event();
        for &cut in Cut::sequence(Channel::SingleLepton) {
            table.pass(cut, 1.0).unwrap();
        }
        assert!(matches!(table.pass(Cut::WJetCount, 1.0), Err(Error::InvariantViolation(_))));
    }
}
