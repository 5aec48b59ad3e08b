//! Pipeline plumbing shared by every stage.
//!
//! This module provides the stage identifiers, the event reporting seam and the
//! [`StageContext`] handed to each stage entry point.

mod context;
pub mod progress;

pub use context::StageContext;
pub use progress::{
    ClosureReporter, EventLevel, MemoryReporter, PipelineStage, StageEvent, StageReporter,
    TracingReporter,
};
