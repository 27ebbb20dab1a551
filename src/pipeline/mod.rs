//! Black-box contract of the external localization pipeline.
//!
//! Every call is blocking, synchronous and non-cancellable; callers on the
//! async runtime go through `tokio::task::spawn_blocking`.

mod command;
#[cfg(test)]
pub(crate) mod testing;

use std::{fmt, io, path::Path, path::PathBuf, sync::Arc};

use thiserror::Error;

pub use command::CommandPipeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    ExtractFeatures,
    MatchFeatures,
    Reconstruct,
    Triangulate,
    Localize,
    Visualize,
    /// Not an external call: reading the solver's answer back.
    ReadResult,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::ExtractFeatures => "extract_features",
            Stage::MatchFeatures => "match_features",
            Stage::Reconstruct => "reconstruct",
            Stage::Triangulate => "triangulate",
            Stage::Localize => "localize",
            Stage::Visualize => "visualize",
            Stage::ReadResult => "read_result",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum StageError {
    #[error("missing input file {}", .0.display())]
    MissingFile(PathBuf),

    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl StageError {
    /// Missing inputs, whether reported by the stage or by the OS.
    pub fn is_missing_file(&self) -> bool {
        match self {
            StageError::MissingFile(_) => true,
            StageError::Io(err) => err.kind() == io::ErrorKind::NotFound,
            StageError::Failed(_) => false,
        }
    }
}

pub type StageResult<T = ()> = Result<T, StageError>;

/// Feature or matcher configuration handed to a stage: the configuration
/// name the pipeline knows, and the artifact name it writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageConfig {
    pub name: String,
    pub output: String,
}

pub trait LocalizationPipeline: Send + Sync {
    fn extract_features(
        &self,
        config: &StageConfig,
        image_dir: &Path,
        output_dir: &Path,
    ) -> StageResult;

    fn match_features(
        &self,
        config: &StageConfig,
        pairs_file: &Path,
        feature_name: &str,
        output_dir: &Path,
        exhaustive: bool,
    ) -> StageResult;

    /// Returns the directory holding the reconstructed SfM model.
    fn reconstruct(
        &self,
        output_dir: &Path,
        image_dir: &Path,
        pairs_file: &Path,
        feature_file: &Path,
        match_file: &Path,
    ) -> StageResult<PathBuf>;

    /// Returns the path of the finished, triangulated model.
    fn triangulate(
        &self,
        model_output_dir: &Path,
        reference_model: &Path,
        image_dir: &Path,
        pairs_file: &Path,
        feature_file: &Path,
        match_file: &Path,
    ) -> StageResult<PathBuf>;

    fn localize(
        &self,
        model: &Path,
        intrinsics_file: &Path,
        pairs_file: &Path,
        feature_file: &Path,
        match_file: &Path,
        result_file: &Path,
    ) -> StageResult;

    fn visualize(
        &self,
        result_file: &Path,
        image_dir: &Path,
        model: &Path,
        top_k: usize,
        output_dir: &Path,
    ) -> StageResult;
}

/// Runs one blocking stage call on the blocking pool. A panicking stage
/// is reported as a failure of that stage.
pub async fn run_blocking<T, F>(
    pipeline: &Arc<dyn LocalizationPipeline>,
    stage: Stage,
    call: F,
) -> StageResult<T>
where
    F: FnOnce(&dyn LocalizationPipeline) -> StageResult<T> + Send + 'static,
    T: Send + 'static,
{
    let pipeline = Arc::clone(pipeline);
    tokio::task::spawn_blocking(move || call(pipeline.as_ref()))
        .await
        .unwrap_or_else(|err| Err(StageError::Failed(format!("{stage} task aborted: {err}"))))
}
