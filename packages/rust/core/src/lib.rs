//! Core domain logic for errorpress.
//!
//! This crate turns discovered candidates into sequenced items and drives
//! them through collection, drafting, the quality gate and publication
//! (see [`pipeline::Pipeline`]).

pub mod dedup;
pub mod generation;
pub mod lifecycle;
pub mod pipeline;
pub mod quality;
pub mod scoring;
pub mod selection;
pub mod sequencer;
pub mod slots;

pub use generation::BridgeGenerator;
pub use pipeline::{
    Collaborators, DiscoveryPlan, ItemOutcome, Pipeline, ProgressReporter, RunSummary,
    SilentProgress, discover, plan_batch,
};
pub use quality::QualityGate;
pub use slots::SlotStore;
