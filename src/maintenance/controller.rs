use anyhow::{bail, Context, Result};
use log::info;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use super::loop_worker::maintenance_loop;
use super::MaintenanceWorker;

/// Owns the maintenance task for the lifetime of the server.
pub struct MaintenanceController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl Default for MaintenanceController {
    fn default() -> Self {
        Self::new()
    }
}

impl MaintenanceController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn start(&mut self, worker: MaintenanceWorker, interval: Duration) -> Result<()> {
        if self.handle.is_some() {
            bail!("maintenance already running");
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(maintenance_loop(worker, interval, cancel_token.clone()));
        info!("Maintenance scheduled every {}ms", interval.as_millis());

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// Cancels the loop and waits for the tick in progress, if any.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("maintenance loop task failed to join")
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maintenance::cleanup_channel;
    use crate::pipeline::testing::StubPipeline;
    use std::sync::Arc;

    #[tokio::test]
    async fn start_twice_is_rejected_and_stop_joins() {
        let (_notifier, inbox) = cleanup_channel();
        let worker = MaintenanceWorker::new(inbox, Arc::new(StubPipeline::default()), 1);
        let mut controller = MaintenanceController::new();

        controller
            .start(worker, Duration::from_millis(10))
            .unwrap();
        assert!(controller.is_running());

        let (_other_notifier, other_inbox) = cleanup_channel();
        let other = MaintenanceWorker::new(other_inbox, Arc::new(StubPipeline::default()), 1);
        assert!(controller.start(other, Duration::from_millis(10)).is_err());

        controller.stop().await.unwrap();
        assert!(!controller.is_running());
        controller.stop().await.unwrap();
    }
}
