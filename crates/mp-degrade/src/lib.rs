//! # mp-degrade
//!
//! Truth degradation and hypothesis construction for MEM performance studies.
//!
//! Generator-level truth is turned into what a detector would plausibly
//! deliver to a matrix-element likelihood engine:
//! - [`truth`]: decay-chain assembly into leptons, b-jets, W-jets and missing Et
//! - [`selection`]: acceptance cuts, overlap cleaning and pt ordering
//! - [`fake`] and [`pool`]: per-slot fake-object substitution without double use
//! - [`smear`]: Gaussian jet pt and missing-Et resolution
//! - [`variant`]: the full measured event and its missing-object variants
//! - [`cutflow`]: the ordered, weighted cut-flow
//! - [`pipeline`]: the per-event processor and the event loop
//!
//! Every sampling stage draws from its own stream in [`rng::RandomStreams`],
//! seeded once per run, so runs and chunked reprocessing are reproducible.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod allowlist;
pub mod config;
pub mod cutflow;
pub mod engine;
pub mod fake;
pub mod input;
pub mod kinematics;
pub mod measured;
pub mod pipeline;
pub mod pool;
pub mod record;
pub mod rng;
pub mod selection;
pub mod smear;
pub mod synth;
pub mod truth;
pub mod variant;

pub use allowlist::RunLumiEventSelector;
pub use config::{AnalysisConfig, Channel};
pub use cutflow::{Cut, CutFlowTable, Rejection};
pub use engine::ToyMassEngine;
pub use input::{GenEvent, GenParticle, JsonLinesSource};
pub use measured::{MeasuredParticle, Provenance};
pub use pipeline::{Analyzer, EventOutcome, EventProcessor, RunSummary, SelectedEvent};
pub use record::{JsonLinesSink, MemorySink, RecordLayout, RecordSink};
pub use rng::RandomStreams;
pub use synth::{SynthConfig, SyntheticEvents};
pub use variant::{HypothesisVariant, VariantKind};
