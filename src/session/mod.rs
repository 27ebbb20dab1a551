//! Per-sight runtime state for serving localization requests.

mod cache;

use std::{fs, path::PathBuf};

use tokio::sync::{Mutex, MutexGuard};

use crate::error::{LocError, LocResult};
use crate::layout::SightLayout;
use crate::wire::PoseResult;

pub use cache::SessionCache;

/// Mutable part of a session. Guarded by the session lock, which a
/// localization run holds from query staging to commit and the
/// maintenance reset holds while it restores the scratch artifacts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    /// `%m_%d_%Y_%H:%M:%S` stamp of the last successful run.
    pub run_stamp: Option<String>,
    pub result_file: Option<PathBuf>,
    pub last_pose: Option<PoseResult>,
    pub cleanup_due: bool,
    /// Bumped by every successful run; lets maintenance tell whether a
    /// newer run slipped in while it was visualizing.
    pub generation: u64,
    pub runs: u64,
}

impl SessionState {
    pub(crate) fn commit_run(
        &mut self,
        run_stamp: String,
        result_file: PathBuf,
        pose: Option<PoseResult>,
    ) {
        self.run_stamp = Some(run_stamp);
        self.result_file = Some(result_file);
        self.last_pose = pose;
        self.cleanup_due = true;
        self.generation += 1;
        self.runs += 1;
    }
}

#[derive(Debug)]
pub struct Session {
    layout: SightLayout,
    state: Mutex<SessionState>,
}

impl Session {
    /// Prepares the query workspace and the scratch area of a sight.
    /// Blocking; the cache runs it off the async runtime.
    pub fn create(layout: SightLayout) -> LocResult<Self> {
        prepare_workspace(&layout)?;

        Ok(Self {
            layout,
            state: Mutex::new(SessionState::default()),
        })
    }

    pub fn sight_id(&self) -> &str {
        &self.layout.sight_id
    }

    pub fn layout(&self) -> &SightLayout {
        &self.layout
    }

    pub async fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().await
    }

    pub async fn snapshot(&self) -> SessionState {
        self.state.lock().await.clone()
    }
}

/// Creates the query workspace and scratch area of a sight and seeds the
/// scratch artifacts. Blocking.
pub fn prepare_workspace(layout: &SightLayout) -> LocResult<()> {
    for dir in [
        &layout.query_images,
        &layout.intrinsics_dir,
        &layout.localization_dir,
    ] {
        fs::create_dir_all(dir).map_err(|err| LocError::artifact(dir, err))?;
    }
    reset_matcher_artifacts(layout)
}

/// Overwrites the session's scratch feature and match files with fresh
/// copies of the finished model's artifacts.
pub fn reset_matcher_artifacts(layout: &SightLayout) -> LocResult<()> {
    for (source, scratch) in layout.matcher_artifacts() {
        fs::copy(&source, &scratch).map_err(|err| LocError::artifact(&source, err))?;
    }
    Ok(())
}
