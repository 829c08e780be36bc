//! Entity lifecycle and unit status state machine.
//!
//! Every persisted entity is either active or tombstoned; lookups only
//! ever see active rows. Generated units (narrations, audio clips,
//! subtitles, images, videos) additionally move through [`UnitState`].

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Soft-delete lifecycle
// ---------------------------------------------------------------------------

/// Two-state soft-delete flag derived from a nullable tombstone timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum Lifecycle {
    Active,
    Tombstoned { at: Timestamp },
}

impl Lifecycle {
    /// Map a `deleted_at` column value onto the lifecycle flag.
    pub fn from_deleted_at(deleted_at: Option<Timestamp>) -> Self {
        match deleted_at {
            None => Self::Active,
            Some(at) => Self::Tombstoned { at },
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

// ---------------------------------------------------------------------------
// Unit state machine
// ---------------------------------------------------------------------------

/// Processing state of a generated unit.
///
/// Narration, audio, subtitle and image units go `pending -> completed |
/// failed`. Videos additionally pass through `processing` while their
/// provider job runs. A failed unit may be put back to `pending` for a
/// retry; completed units are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitState {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl UnitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: UnitState) -> bool {
        use UnitState::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Completed)
                | (Pending, Failed)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Failed, Pending)
        )
    }

    /// The states a unit must currently be in to move to `next`.
    pub fn allowed_sources(next: UnitState) -> &'static [UnitState] {
        use UnitState::*;
        match next {
            Pending => &[Failed],
            Processing => &[Pending],
            Completed => &[Pending, Processing],
            Failed => &[Pending, Processing],
        }
    }

    /// Validate a transition, returning a conflict error when illegal.
    pub fn ensure_transition(&self, next: UnitState) -> Result<(), CoreError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(CoreError::Conflict(format!(
                "Illegal status transition {} -> {}",
                self.as_str(),
                next.as_str()
            )))
        }
    }
}

impl std::fmt::Display for UnitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_from_deleted_at() {
        assert_eq!(Lifecycle::from_deleted_at(None), Lifecycle::Active);
        let now = chrono::Utc::now();
        let tombstoned = Lifecycle::from_deleted_at(Some(now));
        assert!(!tombstoned.is_active());
        assert_eq!(tombstoned, Lifecycle::Tombstoned { at: now });
    }

    #[test]
    fn video_path_is_legal() {
        assert!(UnitState::Pending.can_transition_to(UnitState::Processing));
        assert!(UnitState::Processing.can_transition_to(UnitState::Completed));
        assert!(UnitState::Processing.can_transition_to(UnitState::Failed));
    }

    #[test]
    fn completed_is_terminal() {
        for next in [
            UnitState::Pending,
            UnitState::Processing,
            UnitState::Failed,
            UnitState::Completed,
        ] {
            assert!(!UnitState::Completed.can_transition_to(next));
        }
    }

    #[test]
    fn failed_can_only_be_retried() {
        assert!(UnitState::Failed.can_transition_to(UnitState::Pending));
        assert!(!UnitState::Failed.can_transition_to(UnitState::Completed));
        assert!(UnitState::Failed.ensure_transition(UnitState::Processing).is_err());
    }

    #[test]
    fn allowed_sources_agree_with_transition_table() {
        use UnitState::*;
        for next in [Pending, Processing, Completed, Failed] {
            for from in [Pending, Processing, Completed, Failed] {
                assert_eq!(
                    UnitState::allowed_sources(next).contains(&from),
                    from.can_transition_to(next),
                    "{from} -> {next}"
                );
            }
        }
    }
}
