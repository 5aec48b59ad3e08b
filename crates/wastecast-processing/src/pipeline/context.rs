//! Everything a stage needs to run, passed explicitly.

use super::progress::{PipelineStage, StageEvent, StageReporter};
use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::store::ArtifactStore;

/// Borrowed view of the run: the configuration document, the artifact store
/// and the event sink.
///
/// One context is built per run and handed to each stage entry point in turn.
#[derive(Clone, Copy)]
pub struct StageContext<'a> {
    pub config: &'a Config,
    pub store: &'a ArtifactStore,
    pub reporter: &'a dyn StageReporter,
}

impl<'a> StageContext<'a> {
    pub fn new(
        config: &'a Config,
        store: &'a ArtifactStore,
        reporter: &'a dyn StageReporter,
    ) -> Self {
        Self {
            config,
            store,
            reporter,
        }
    }

    /// Emit an informational event.
    pub fn info(&self, stage: PipelineStage, message: impl Into<String>) {
        self.reporter.report(StageEvent::info(stage, message));
    }

    /// Emit a warning event.
    pub fn warn(&self, stage: PipelineStage, message: impl Into<String>) {
        self.reporter.report(StageEvent::warn(stage, message));
    }

    /// Emit a debug event.
    pub fn debug(&self, stage: PipelineStage, message: impl Into<String>) {
        self.reporter.report(StageEvent::debug(stage, message));
    }

    /// Run a stage body between start/finish events, tagging failures with the
    /// stage name.
    pub fn run_stage<T>(
        &self,
        stage: PipelineStage,
        body: impl FnOnce(&StageContext<'a>) -> Result<T>,
    ) -> Result<T> {
        self.info(stage, format!("{} started", stage.display_name()));
        match body(self) {
            Ok(value) => {
                self.info(stage, format!("{} completed", stage.display_name()));
                Ok(value)
            }
            Err(e) => Err(annotate(stage, e)),
        }
    }
}

fn annotate(stage: PipelineStage, error: PipelineError) -> PipelineError {
    error.with_context(format!("{} failed", stage.display_name()))
}
