//! The drafting pipeline.
//!
//! A run carries one [`PipelineState`](lexdraft_core::PipelineState) through
//! seven stages in a fixed order. Stages return deltas; the orchestrator
//! merges them, halts after the first four stages when the state carries an
//! error, and forwards progress to an optional event stream.

mod orchestrator;
mod progress;
pub mod stages;

#[cfg(test)]
mod testkit;

pub use orchestrator::{Pipeline, PipelineDeps};
pub use progress::StageProgress;
