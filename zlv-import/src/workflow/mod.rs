//! Stream plumbing shared by every import
//!
//! Processors decide, [`Change`]s describe the decision, and the drivers in
//! [`pipeline`] apply changes and report outcomes.

pub mod change;
pub mod pipeline;

pub use change::{Change, Reassignment};
pub use pipeline::{run_batched_pipeline, run_pipeline, BatchProcessor, PipelineContext, Processor};
