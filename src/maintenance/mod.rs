//! Background upkeep of the most recently served session: visualize its
//! last run, then restore the scratch matcher artifacts.
//!
//! Request handling never touches maintenance state directly. A finished
//! run posts a notice on the cleanup channel; the worker drains it on each
//! tick and only acts on the latest one.

mod controller;
mod loop_worker;
mod worker;

use std::sync::Arc;

use log::debug;
use tokio::sync::mpsc;

use crate::session::Session;

pub use controller::MaintenanceController;
pub use loop_worker::maintenance_loop;
pub use worker::{MaintenanceWorker, TickOutcome};

pub type CleanupInbox = mpsc::UnboundedReceiver<Arc<Session>>;

/// Sending half of the cleanup channel, held by the orchestrator.
#[derive(Clone)]
pub struct CleanupNotifier {
    sender: mpsc::UnboundedSender<Arc<Session>>,
}

impl CleanupNotifier {
    pub fn notify(&self, session: Arc<Session>) {
        let sight_id = session.sight_id().to_string();
        if self.sender.send(session).is_err() {
            debug!("maintenance is not running; dropped cleanup notice for {sight_id}");
        }
    }
}

pub fn cleanup_channel() -> (CleanupNotifier, CleanupInbox) {
    let (sender, inbox) = mpsc::unbounded_channel();
    (CleanupNotifier { sender }, inbox)
}
