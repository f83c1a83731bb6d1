//! Object selection, overlap cleaning and pt ordering of truth objects.

use crate::config::SelectionConfig;
use crate::truth::{AssembledTruth, TruthArena, TruthHandle, TruthParticle};
use mp_core::Result;

/// Electrons and muons within acceptance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeptonSelector {
    /// Exclusive pt threshold (GeV).
    pub min_pt: f64,
    /// Exclusive |eta| bound.
    pub max_abs_eta: f64,
}

impl LeptonSelector {
    /// Electron or muon passing both thresholds; taus never pass.
    pub fn accepts(&self, p: &TruthParticle) -> bool {
        matches!(p.pdg_id.abs(), 11 | 13)
            && p.pt > self.min_pt
            && p.eta.abs() < self.max_abs_eta
    }
}

/// Jets within acceptance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JetSelector {
    /// Exclusive pt threshold (GeV).
    pub min_pt: f64,
    /// Exclusive |eta| bound.
    pub max_abs_eta: f64,
}

impl JetSelector {
    /// Jet passing both thresholds.
    pub fn accepts(&self, p: &TruthParticle) -> bool {
        p.pt > self.min_pt && p.eta.abs() < self.max_abs_eta
    }

    /// Kinematic threshold alone, used after pt smearing.
    pub fn passes_pt(&self, pt: f64) -> bool {
        pt > self.min_pt
    }
}

/// Removes candidates closer than `min_delta_r` to any higher-precedence object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlapCleaner {
    /// Minimum separation in ΔR.
    pub min_delta_r: f64,
}

impl OverlapCleaner {
    /// Keep the candidates (in input order) not overlapping any object in `against`.
    pub fn clean(
        &self,
        arena: &TruthArena,
        candidates: &[TruthHandle],
        against: &[&[TruthHandle]],
    ) -> Result<Vec<TruthHandle>> {
        let mut kept = Vec::with_capacity(candidates.len());
        'candidates: for &h in candidates {
            let c = arena.resolve(h)?;
            for group in against {
                for &o in *group {
                    let other = arena.resolve(o)?;
                    if c.delta_r_to(other.eta, other.phi) < self.min_delta_r {
                        continue 'candidates;
                    }
                }
            }
            kept.push(h);
        }
        Ok(kept)
    }
}

/// Stable descending sort by pt; ties keep input order.
pub fn sort_by_pt_desc(arena: &TruthArena, handles: &[TruthHandle]) -> Result<Vec<TruthHandle>> {
    let mut keyed = handles
        .iter()
        .map(|&h| Ok((arena.resolve(h)?.pt, h)))
        .collect::<Result<Vec<_>>>()?;
    keyed.sort_by(|a, b| b.0.total_cmp(&a.0));
    Ok(keyed.into_iter().map(|(_, h)| h).collect())
}

fn keep_where(
    arena: &TruthArena,
    handles: &[TruthHandle],
    pred: impl Fn(&TruthParticle) -> bool,
) -> Result<Vec<TruthHandle>> {
    let mut out = Vec::with_capacity(handles.len());
    for &h in handles {
        if pred(arena.resolve(h)?) {
            out.push(h);
        }
    }
    Ok(out)
}

/// Selected truth objects, each list pt-ordered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectedObjects {
    /// Accepted leptons.
    pub leptons: Vec<TruthHandle>,
    /// b-quarks cleaned against leptons.
    pub bjets: Vec<TruthHandle>,
    /// W daughters cleaned against leptons and b-quarks.
    pub wjets: Vec<TruthHandle>,
    /// Generator jets cleaned against leptons, b-jets and W-jets.
    pub extra_jets: Vec<TruthHandle>,
}

/// Applies acceptance and overlap cleaning.
///
/// Precedence is leptons → b-jets → W-jets → extra jets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectSelector {
    leptons: LeptonSelector,
    jets: JetSelector,
    cleaner: OverlapCleaner,
}

impl ObjectSelector {
    /// Selector with the thresholds of `sel`.
    pub fn new(sel: &SelectionConfig) -> Self {
        Self {
            leptons: LeptonSelector {
                min_pt: sel.lepton_min_pt,
                max_abs_eta: sel.lepton_max_abs_eta,
            },
            jets: JetSelector { min_pt: sel.jet_min_pt, max_abs_eta: sel.jet_max_abs_eta },
            cleaner: OverlapCleaner { min_delta_r: sel.overlap_delta_r },
        }
    }

    /// Jet acceptance, reused for the post-smearing threshold.
    pub fn jet_selector(&self) -> &JetSelector {
        &self.jets
    }

    /// Clean against the unselected matching lists, then apply acceptance and sort.
    pub fn select(&self, truth: &AssembledTruth) -> Result<SelectedObjects> {
        let arena = &truth.arena;
        let leptons = keep_where(arena, &truth.leptons, |p| self.leptons.accepts(p))?;

        let (l, b, w) = (truth.leptons.as_slice(), truth.bjets.as_slice(), truth.wjets.as_slice());
        let bjets = self.cleaner.clean(arena, b, &[l])?;
        let wjets = self.cleaner.clean(arena, w, &[l, b])?;
        let extra = self.cleaner.clean(arena, &truth.jets, &[l, b, w])?;

        let bjets = keep_where(arena, &bjets, |p| self.jets.accepts(p))?;
        let wjets = keep_where(arena, &wjets, |p| self.jets.accepts(p))?;
        let extra = keep_where(arena, &extra, |p| self.jets.accepts(p))?;

        Ok(SelectedObjects {
            leptons: sort_by_pt_desc(arena, &leptons)?,
            bjets: sort_by_pt_desc(arena, &bjets)?,
            wjets: sort_by_pt_desc(arena, &wjets)?,
            extra_jets: sort_by_pt_desc(arena, &extra)?,
        })
    }
}
