//! Pipeline error taxonomy.
//!
//! Every failure carries enough context to tell an operator which stage
//! and unit failed, and [`PipelineError::kind`] separates "not ready yet"
//! (precondition) from "attempted and failed" (transient or permanent).

use storyreel_core::dependencies::{MissingDependency, Stage};
use storyreel_core::error::CoreError;
use storyreel_core::types::DbId;
use storyreel_db::store::StoreError;
use storyreel_providers::ProviderError;
use storyreel_storage::StorageError;

/// Coarse classification used for retry decisions and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Precondition,
    NotFound,
    Conflict,
    Transient,
    Permanent,
    Timeout,
    Cancelled,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Stage '{stage}' cannot run, missing: {}", format_missing(.missing))]
    Precondition {
        stage: Stage,
        missing: Vec<MissingDependency>,
    },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Conflict: {0}")]
    Conflict(String),

    /// A provider call for one unit of a stage failed.
    #[error("Stage '{stage}' failed for {unit}: {source}")]
    Provider {
        stage: Stage,
        unit: String,
        #[source]
        source: ProviderError,
    },

    #[error("Storage failure: {0}")]
    Storage(#[from] StorageError),

    #[error("Video {video_id} failed: {message}")]
    VideoFailed { video_id: DbId, message: String },

    #[error("Video {video_id} timed out: {message}")]
    Timeout { video_id: DbId, message: String },

    #[error("Stage '{stage}' was cancelled")]
    Cancelled { stage: Stage },

    #[error("Store failure: {0}")]
    Store(StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Precondition { .. } => ErrorKind::Precondition,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Provider { source, .. } if source.is_transient() => ErrorKind::Transient,
            Self::Provider { .. } => ErrorKind::Permanent,
            Self::Storage(e) if e.is_transient() => ErrorKind::Transient,
            Self::Storage(StorageError::NotFound(_)) => ErrorKind::NotFound,
            Self::Storage(_) => ErrorKind::Permanent,
            Self::VideoFailed { .. } => ErrorKind::Permanent,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::Store(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Only transient failures are worth retrying unchanged.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    pub(crate) fn provider(stage: Stage, unit: impl Into<String>, source: ProviderError) -> Self {
        Self::Provider {
            stage,
            unit: unit.into(),
            source,
        }
    }
}

impl From<CoreError> for PipelineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            CoreError::Validation(msg) => Self::Validation(msg),
            CoreError::Conflict(msg) => Self::Conflict(msg),
            CoreError::Precondition { stage, missing } => Self::Precondition { stage, missing },
            CoreError::Internal(msg) => Self::Internal(msg),
        }
    }
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            StoreError::Conflict(msg) => Self::Conflict(msg),
            StoreError::InvalidTransition { .. } => Self::Conflict(err.to_string()),
            StoreError::Database(_) => Self::Store(err),
        }
    }
}

fn format_missing(missing: &[MissingDependency]) -> String {
    missing
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type PipelineResult<T> = Result<T, PipelineError>;
