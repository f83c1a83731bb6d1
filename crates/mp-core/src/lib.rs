//! # mp-core
//!
//! Core types and traits for memperf, a toolkit for measuring how well a
//! matrix-element (MEM) likelihood-ratio engine separates a signal process
//! from a background process once generator-level truth is degraded.
//!
//! This crate provides:
//! - The shared [`Error`] type and [`Result`] alias
//! - Engine-facing value types ([`EngineParticle`], [`MeasuredMissingEt`], [`MemResult`])
//! - The [`ProbabilityEngine`](traits::ProbabilityEngine) seam, so the pipeline
//!   never depends on a concrete integrator

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use traits::ProbabilityEngine;
pub use types::{EngineParticle, EventId, MeasuredMissingEt, MemResult, ParticleType};

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
