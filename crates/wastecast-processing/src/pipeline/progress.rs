//! Stage event reporting.
//!
//! Stages never touch a global logger. They receive a [`StageReporter`] through
//! their [`StageContext`](super::StageContext) and emit [`StageEvent`]s into it.
//! The CLI plugs in [`TracingReporter`]; tests plug in [`MemoryReporter`] and
//! assert on what a stage reported.
//!
//! # Example
//!
//! ```rust
//! use wastecast_processing::pipeline::{
//!     EventLevel, MemoryReporter, PipelineStage, StageEvent, StageReporter,
//! };
//!
//! let reporter = MemoryReporter::new();
//! reporter.report(StageEvent::warn(
//!     PipelineStage::FeatureEngineering,
//!     "skipping 'is_weekend': column 'day_of_week' not found",
//! ));
//!
//! assert_eq!(reporter.warnings().len(), 1);
//! assert_eq!(reporter.events()[0].level, EventLevel::Warn);
//! ```

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// The independently invokable steps of the pipeline, in DAG order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Load the raw dataset and split it
    Ingestion,
    /// Fill, deduplicate and encode
    Preprocessing,
    /// Derive additional columns
    FeatureEngineering,
    /// Fit and persist configured model families
    Training,
    /// Score persisted models on the held-out data
    Evaluation,
}

impl PipelineStage {
    /// All stages in dependency order.
    pub const ALL: [PipelineStage; 5] = [
        Self::Ingestion,
        Self::Preprocessing,
        Self::FeatureEngineering,
        Self::Training,
        Self::Evaluation,
    ];

    /// Returns a human-readable name for the stage.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Ingestion => "Data Ingestion",
            Self::Preprocessing => "Data Preprocessing",
            Self::FeatureEngineering => "Feature Engineering",
            Self::Training => "Model Training",
            Self::Evaluation => "Model Evaluation",
        }
    }

    /// Configuration section that parameterises the stage.
    pub fn config_section(&self) -> &'static str {
        match self {
            Self::Ingestion => "data_ingestion",
            Self::Preprocessing => "data_preprocessing",
            Self::FeatureEngineering => "feature_engineering",
            Self::Training => "model_training",
            Self::Evaluation => "model_evaluation",
        }
    }
}

/// Severity of a stage event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    Debug,
    Info,
    Warn,
}

/// A single message emitted by a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageEvent {
    /// Stage that emitted the event
    pub stage: PipelineStage,
    /// Severity
    pub level: EventLevel,
    /// Human-readable message
    pub message: String,
}

impl StageEvent {
    pub fn debug(stage: PipelineStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            level: EventLevel::Debug,
            message: message.into(),
        }
    }

    pub fn info(stage: PipelineStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            level: EventLevel::Info,
            message: message.into(),
        }
    }

    pub fn warn(stage: PipelineStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            level: EventLevel::Warn,
            message: message.into(),
        }
    }
}

/// Trait for receiving events from pipeline stages.
///
/// Implementations must be `Send + Sync` so a driver may share one reporter
/// across threads.
pub trait StageReporter: Send + Sync {
    /// Called for every event a stage emits.
    fn report(&self, event: StageEvent);
}

/// Forwards events to `tracing`, tagged with the stage name.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl StageReporter for TracingReporter {
    fn report(&self, event: StageEvent) {
        let stage = event.stage.config_section();
        match event.level {
            EventLevel::Debug => tracing::debug!(stage, "{}", event.message),
            EventLevel::Info => tracing::info!(stage, "{}", event.message),
            EventLevel::Warn => tracing::warn!(stage, "{}", event.message),
        }
    }
}

/// Wrapper that implements [`StageReporter`] using a closure.
pub struct ClosureReporter<F>
where
    F: Fn(StageEvent) + Send + Sync,
{
    callback: F,
}

impl<F> ClosureReporter<F>
where
    F: Fn(StageEvent) + Send + Sync,
{
    /// Creates a new closure-based reporter.
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> StageReporter for ClosureReporter<F>
where
    F: Fn(StageEvent) + Send + Sync,
{
    fn report(&self, event: StageEvent) {
        (self.callback)(event);
    }
}

/// Records every event in memory.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    events: Mutex<Vec<StageEvent>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded events.
    pub fn events(&self) -> Vec<StageEvent> {
        self.events.lock().clone()
    }

    /// Messages of the recorded warnings.
    pub fn warnings(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter(|event| event.level == EventLevel::Warn)
            .map(|event| event.message.clone())
            .collect()
    }
}

impl StageReporter for MemoryReporter {
    fn report(&self, event: StageEvent) {
        self.events.lock().push(event);
    }
}

static_assertions::assert_impl_all!(MemoryReporter: Send, Sync);
static_assertions::assert_impl_all!(TracingReporter: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_stage_order_and_sections() {
        let sections: Vec<&str> = PipelineStage::ALL
            .iter()
            .map(|stage| stage.config_section())
            .collect();
        assert_eq!(
            sections,
            vec![
                "data_ingestion",
                "data_preprocessing",
                "feature_engineering",
                "model_training",
                "model_evaluation"
            ]
        );
    }

    #[test]
    fn test_closure_reporter() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let reporter = ClosureReporter::new(move |_event| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        reporter.report(StageEvent::info(PipelineStage::Training, "fitting"));
        reporter.report(StageEvent::debug(PipelineStage::Training, "done"));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_memory_reporter_filters_warnings() {
        let reporter = MemoryReporter::new();
        reporter.report(StageEvent::info(PipelineStage::Training, "fitting"));
        reporter.report(StageEvent::warn(
            PipelineStage::Training,
            "Unknown model: SVR, skipping",
        ));
        assert_eq!(reporter.events().len(), 2);
        assert_eq!(reporter.warnings(), vec!["Unknown model: SVR, skipping"]);
    }

    #[test]
    fn test_event_serialization() {
        let event = StageEvent::warn(PipelineStage::FeatureEngineering, "skip");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("feature_engineering"));
        assert!(json.contains("warn"));
    }
}
