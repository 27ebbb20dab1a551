//! Sequences the external pipeline for the two workflows: building a
//! sight's model offline, and localizing one query online.

mod create;
mod localize;
mod pairs;

use std::sync::Arc;

use crate::error::{LocError, LocResult};
use crate::maintenance::CleanupNotifier;
use crate::pipeline::{self, LocalizationPipeline, Stage, StageConfig, StageResult};
use crate::registry::SightRegistry;
use crate::settings::ServiceSettings;

pub use create::{collect_reference_images, ReferenceImage};
pub use pairs::write_localization_pairs;

#[derive(Clone)]
pub struct Orchestrator {
    pipeline: Arc<dyn LocalizationPipeline>,
    registry: Arc<SightRegistry>,
    settings: Arc<ServiceSettings>,
    cleanup: Option<CleanupNotifier>,
}

impl Orchestrator {
    pub fn new(
        pipeline: Arc<dyn LocalizationPipeline>,
        registry: Arc<SightRegistry>,
        settings: Arc<ServiceSettings>,
    ) -> Self {
        Self {
            pipeline,
            registry,
            settings,
            cleanup: None,
        }
    }

    /// Successful localization runs post a cleanup notice here.
    pub fn with_cleanup_notifier(mut self, notifier: CleanupNotifier) -> Self {
        self.cleanup = Some(notifier);
        self
    }

    fn feature_config(&self) -> StageConfig {
        StageConfig {
            name: self.settings.pipeline.feature_config.clone(),
            output: self.settings.pipeline.feature_output.clone(),
        }
    }

    fn matcher_config(&self) -> StageConfig {
        StageConfig {
            name: self.settings.pipeline.matcher_config.clone(),
            output: self.settings.pipeline.matcher_output.clone(),
        }
    }

    async fn run_stage<T, F>(&self, stage: Stage, call: F) -> LocResult<T>
    where
        F: FnOnce(&dyn LocalizationPipeline) -> StageResult<T> + Send + 'static,
        T: Send + 'static,
    {
        pipeline::run_blocking(&self.pipeline, stage, call)
            .await
            .map_err(|err| LocError::stage(stage, err))
    }
}
