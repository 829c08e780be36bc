use crate::dependencies::{MissingDependency, Stage};
use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// A stage was asked to run before its prerequisites were met.
    #[error("Stage '{stage}' cannot run, missing: {}", format_missing(.missing))]
    Precondition {
        stage: Stage,
        missing: Vec<MissingDependency>,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

fn format_missing(missing: &[MissingDependency]) -> String {
    missing
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narration::ShotKey;

    #[test]
    fn precondition_message_lists_every_dependency() {
        let err = CoreError::Precondition {
            stage: Stage::Subtitle,
            missing: vec![
                MissingDependency::Audio {
                    shot: ShotKey::new(1, 2),
                },
                MissingDependency::AudioNotCompleted {
                    shot: ShotKey::new(2, 1),
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("Stage 'subtitle' cannot run"));
        assert!(msg.contains("audio for scene 1 shot 2 is missing"));
        assert!(msg.contains("audio for scene 2 shot 1 is not completed"));
    }
}
