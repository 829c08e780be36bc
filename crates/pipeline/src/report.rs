//! Outcome of multi-unit stages.

use serde::Serialize;
use storyreel_core::narration::ShotKey;

use crate::error::PipelineError;

/// One unit of a batch that did not complete.
#[derive(Debug, Clone, Serialize)]
pub struct UnitFailure {
    /// Shot the failure belongs to, for shot-indexed stages.
    pub shot: Option<ShotKey>,
    /// Narration video sequence, for video stages.
    pub sequence: Option<i32>,
    pub message: String,
    /// Whether retrying the unit unchanged may succeed.
    pub retryable: bool,
}

impl UnitFailure {
    pub fn for_shot(shot: ShotKey, error: &PipelineError) -> Self {
        Self {
            shot: Some(shot),
            sequence: None,
            message: error.to_string(),
            retryable: error.is_retryable(),
        }
    }

    pub fn for_sequence(sequence: i32, error: &PipelineError) -> Self {
        Self {
            shot: None,
            sequence: Some(sequence),
            message: error.to_string(),
            retryable: error.is_retryable(),
        }
    }
}

/// Completed records plus per-unit failures of one batch, both in source
/// order. Completed records stay persisted whatever happened to their
/// siblings.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport<T> {
    pub completed: Vec<T>,
    pub failed: Vec<UnitFailure>,
}

impl<T> BatchReport<T> {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Shots that failed, ready to be passed to a narrow retry.
    pub fn failed_shots(&self) -> Vec<ShotKey> {
        self.failed.iter().filter_map(|f| f.shot).collect()
    }
}

impl<T> Default for BatchReport<T> {
    fn default() -> Self {
        Self {
            completed: Vec::new(),
            failed: Vec::new(),
        }
    }
}
