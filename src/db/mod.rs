//! Durable copy of the sight registry.
//!
//! rusqlite connections are not `Sync`, so a single thread owns the
//! connection and runs closures sent to it. Async callers await the reply
//! on a oneshot channel.

use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use log::{error, info, warn};
use rusqlite::Connection;
use tokio::sync::oneshot;

mod helpers;
mod migrations;
pub mod models;
mod repositories;

use migrations::run_migrations;

pub use models::{ReferencePoint, Sight};

const THREAD_NAME: &str = "sightloc-registry-db";

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum Request {
    Run(Job),
    Stop,
}

/// Owns the connection thread; the last clone of [`Database`] to go away
/// stops it and waits for queued jobs to drain.
struct ConnectionThread {
    requests: mpsc::Sender<Request>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for ConnectionThread {
    fn drop(&mut self) {
        let handle = match self.thread.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(handle) = handle else {
            return;
        };

        if self.requests.send(Request::Stop).is_err() {
            warn!("{THREAD_NAME} already exited before shutdown");
        }
        if let Err(panic) = handle.join() {
            error!("{THREAD_NAME} panicked: {panic:?}");
        }
    }
}

/// Opens the file, applies connection pragmas and brings the schema up
/// to date.
fn open_connection(path: &Path) -> Result<Connection> {
    let mut conn = Connection::open(path)
        .with_context(|| format!("failed to open registry database {}", path.display()))?;

    for (pragma, value) in [("journal_mode", "WAL"), ("foreign_keys", "ON")] {
        if let Err(err) = conn.pragma_update(None, pragma, value) {
            warn!("registry pragma {pragma}={value} not applied: {err}");
        }
    }

    run_migrations(&mut conn).context("failed to migrate registry schema")?;
    Ok(conn)
}

fn serve_requests(mut conn: Connection, requests: mpsc::Receiver<Request>) {
    while let Ok(request) = requests.recv() {
        match request {
            Request::Run(job) => job(&mut conn),
            Request::Stop => break,
        }
    }
    info!("{THREAD_NAME} stopped");
}

/// Cheap, clonable handle to the registry database.
#[derive(Clone)]
pub struct Database {
    thread: Arc<ConnectionThread>,
    path: Arc<PathBuf>,
}

impl Database {
    /// Opens (or creates) the database at `path`, creating its parent
    /// directory. Returns once the schema is migrated.
    pub fn open(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create registry directory {}", parent.display())
            })?;
        }

        let (requests, inbox) = mpsc::channel::<Request>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let thread_path = path.clone();

        let handle = thread::Builder::new()
            .name(THREAD_NAME.into())
            .spawn(move || match open_connection(&thread_path) {
                Ok(conn) => {
                    if ready_tx.send(Ok(())).is_ok() {
                        serve_requests(conn, inbox);
                    }
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                }
            })
            .context("failed to spawn registry database thread")?;

        ready_rx
            .recv()
            .context("registry database thread exited during startup")??;
        info!("Sight registry database at {}", path.display());

        Ok(Self {
            thread: Arc::new(ConnectionThread {
                requests,
                thread: Mutex::new(Some(handle)),
            }),
            path: Arc::new(path),
        })
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Runs `job` on the connection thread and returns its result.
    pub async fn execute<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply, answer) = oneshot::channel();
        let request = Request::Run(Box::new(move |conn| {
            // The caller may have been dropped; nothing to report then.
            let _ = reply.send(job(conn));
        }));

        self.thread
            .requests
            .send(request)
            .map_err(|_| anyhow!("{THREAD_NAME} is no longer accepting work"))?;

        answer
            .await
            .map_err(|_| anyhow!("{THREAD_NAME} dropped a request without answering"))?
    }
}
