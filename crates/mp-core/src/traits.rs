//! Core traits for memperf
//!
//! The degradation pipeline hands each measured hypothesis to a
//! [`ProbabilityEngine`] and never depends on a concrete integrator.

use crate::Result;
use crate::types::{EngineParticle, MeasuredMissingEt, MemResult};

/// Signal/background probability engine (matrix-element integrator).
///
/// Called once per constructed hypothesis variant. Errors are returned to the
/// caller unchanged.
pub trait ProbabilityEngine {
    /// Compute signal and background probabilities for one measured event.
    fn evaluate(
        &mut self,
        particles: &[EngineParticle],
        met: &MeasuredMissingEt,
    ) -> Result<MemResult>;

    /// Engine name (e.g. "toy-mass").
    fn name(&self) -> &str;
}

impl<E: ProbabilityEngine + ?Sized> ProbabilityEngine for Box<E> {
    fn evaluate(
        &mut self,
        particles: &[EngineParticle],
        met: &MeasuredMissingEt,
    ) -> Result<MemResult> {
        (**self).evaluate(particles, met)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
