use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{MaintenanceWorker, TickOutcome};

// Set to false to silence per-tick logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

pub async fn maintenance_loop(
    mut worker: MaintenanceWorker,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match worker.tick().await {
                    TickOutcome::Idle => {}
                    TickOutcome::Cleaned { sight_id, visualized } => {
                        log_debug!("maintenance cleaned {sight_id} (visualized: {visualized})");
                    }
                    TickOutcome::ResetFailed { sight_id } => {
                        log_info!("maintenance will retry {sight_id} next tick");
                    }
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("maintenance loop shutting down");
                break;
            }
        }
    }
}
