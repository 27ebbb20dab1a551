use std::path::PathBuf;
use std::sync::Arc;

use crate::pipeline::{self, LocalizationPipeline, Stage};
use crate::session::{self, Session};

use super::CleanupInbox;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing was due.
    Idle,
    Cleaned { sight_id: String, visualized: bool },
    /// The reset failed; the session is retried on the next tick.
    ResetFailed { sight_id: String },
}

pub struct MaintenanceWorker {
    inbox: CleanupInbox,
    pending: Option<Arc<Session>>,
    pipeline: Arc<dyn LocalizationPipeline>,
    top_k: usize,
}

impl MaintenanceWorker {
    pub fn new(inbox: CleanupInbox, pipeline: Arc<dyn LocalizationPipeline>, top_k: usize) -> Self {
        Self {
            inbox,
            pending: None,
            pipeline,
            top_k,
        }
    }

    /// One maintenance pass. Does not touch the filesystem unless a
    /// session is due.
    pub async fn tick(&mut self) -> TickOutcome {
        while let Ok(session) = self.inbox.try_recv() {
            self.pending = Some(session);
        }
        let Some(session) = self.pending.take() else {
            return TickOutcome::Idle;
        };
        let sight_id = session.sight_id().to_string();

        let (generation, last_run) = {
            let state = session.lock().await;
            if !state.cleanup_due {
                log_debug!("session {sight_id} already clean");
                return TickOutcome::Idle;
            }
            let last_run = state.run_stamp.clone().zip(state.result_file.clone());
            (state.generation, last_run)
        };

        let visualized = match last_run {
            Some((run_stamp, result_file)) => self.visualize(&session, run_stamp, result_file).await,
            None => false,
        };

        let mut state = session.lock().await;
        let layout = session.layout().clone();
        let reset = tokio::task::spawn_blocking(move || session::reset_matcher_artifacts(&layout)).await;

        match reset {
            Ok(Ok(())) => {
                if state.generation == generation {
                    state.cleanup_due = false;
                } else {
                    log_info!("newer run on {sight_id} finished during cleanup; keeping it due");
                }
                log_info!("reset matcher artifacts of {sight_id}");
                TickOutcome::Cleaned {
                    sight_id,
                    visualized,
                }
            }
            Ok(Err(err)) => {
                log_error!("failed to reset matcher artifacts of {sight_id}: {err}");
                drop(state);
                self.pending = Some(session);
                TickOutcome::ResetFailed { sight_id }
            }
            Err(err) => {
                log_error!("artifact reset task for {sight_id} aborted: {err}");
                drop(state);
                self.pending = Some(session);
                TickOutcome::ResetFailed { sight_id }
            }
        }
    }

    /// Runs outside the session lock. A missing input is a recognized
    /// outcome of a run that produced no result file.
    async fn visualize(&self, session: &Session, run_stamp: String, result_file: PathBuf) -> bool {
        let layout = session.layout().clone();
        let sight_id = layout.sight_id.clone();
        let top_k = self.top_k;

        let outcome = pipeline::run_blocking(&self.pipeline, Stage::Visualize, move |pipeline| {
            pipeline.visualize(
                &result_file,
                &layout.images,
                &layout.final_model,
                top_k,
                &layout.visualization_dir(&run_stamp),
            )
        })
        .await;

        match outcome {
            Ok(()) => true,
            Err(err) if err.is_missing_file() => {
                log_info!("skipped visualization of {sight_id}: {err}");
                false
            }
            Err(err) => {
                log_warn!("visualization of {sight_id} failed: {err}");
                false
            }
        }
    }
}
