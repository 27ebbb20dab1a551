//! Error taxonomy shared by the codec, registry, sessions and orchestrator.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::{Stage, StageError};

/// Errors surfaced to whoever triggered a core operation.
#[derive(Debug, Error)]
pub enum LocError {
    /// A required marker was absent, or a field could not be read.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("no reference image of sight '{0}' carries GPS data")]
    EmptyGpsSet(String),

    #[error("no sights registered")]
    NoSightsRegistered,

    #[error("unknown sight '{0}'")]
    UnknownSight(String),

    #[error("sight '{0}' has no reference images to pair against")]
    NoReferenceImages(String),

    #[error("pipeline stage {stage} failed: {source}")]
    PipelineStageFailed {
        stage: Stage,
        #[source]
        source: StageError,
    },

    /// Preparing a session or query artifact on disk failed.
    #[error("failed to prepare artifact {path}: {source}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl LocError {
    pub(crate) fn stage(stage: Stage, source: StageError) -> Self {
        Self::PipelineStageFailed { stage, source }
    }

    pub(crate) fn artifact(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Artifact {
            path: path.into(),
            source,
        }
    }
}

pub type LocResult<T> = std::result::Result<T, LocError>;
