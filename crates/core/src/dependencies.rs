//! Stage dependency evaluation.
//!
//! Pure precondition logic for every stage of the pipeline. The caller
//! loads a [`StageSnapshot`] of live entity status for one chapter and
//! [`evaluate`] returns either `Ok(())` or the precise list of unmet
//! dependencies, so failures can name exactly what must run first.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::lifecycle::UnitState;
use crate::narration::ShotKey;

/// Minimum number of completed images required for a narration video.
pub const DEFAULT_MIN_NARRATION_IMAGES: usize = 2;

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// A pipeline stage that produces an artifact for a chapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Narration,
    Audio,
    Subtitle,
    Image,
    NarrationVideo,
    FinalVideo,
}

impl Stage {
    /// Every stage in pipeline order.
    pub const ALL: [Stage; 6] = [
        Stage::Narration,
        Stage::Audio,
        Stage::Subtitle,
        Stage::Image,
        Stage::NarrationVideo,
        Stage::FinalVideo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Narration => "narration",
            Self::Audio => "audio",
            Self::Subtitle => "subtitle",
            Self::Image => "image",
            Self::NarrationVideo => "narration_video",
            Self::FinalVideo => "final_video",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Missing dependencies
// ---------------------------------------------------------------------------

/// One unmet prerequisite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum MissingDependency {
    /// The chapter does not exist or is tombstoned.
    Chapter,
    /// No active narration exists for the chapter.
    Narration,
    /// The active narration exists but has not completed.
    NarrationNotCompleted { state: UnitState },
    /// No audio record exists for a shot.
    Audio { shot: ShotKey },
    /// The shot's audio exists but has not completed.
    AudioNotCompleted { shot: ShotKey },
    /// No active subtitle exists for the narration.
    Subtitle,
    /// The subtitle exists but has not completed.
    SubtitleNotCompleted { state: UnitState },
    /// Too few completed images.
    Images { required: usize, completed: usize },
    /// No narration videos exist for the chapter.
    NarrationVideos,
    /// A narration video has not completed.
    NarrationVideoNotCompleted { sequence: i32, state: UnitState },
    /// No closing asset is configured for final videos.
    OutroAsset,
}

impl std::fmt::Display for MissingDependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Chapter => write!(f, "chapter does not exist"),
            Self::Narration => write!(f, "narration is missing"),
            Self::NarrationNotCompleted { state } => {
                write!(f, "narration is {state}, expected completed")
            }
            Self::Audio { shot } => write!(f, "audio for {shot} is missing"),
            Self::AudioNotCompleted { shot } => write!(f, "audio for {shot} is not completed"),
            Self::Subtitle => write!(f, "subtitle is missing"),
            Self::SubtitleNotCompleted { state } => {
                write!(f, "subtitle is {state}, expected completed")
            }
            Self::Images {
                required,
                completed,
            } => write!(
                f,
                "at least {required} completed images required, found {completed}"
            ),
            Self::NarrationVideos => write!(f, "no narration videos exist"),
            Self::NarrationVideoNotCompleted { sequence, state } => {
                write!(f, "narration video #{sequence} is {state}, expected completed")
            }
            Self::OutroAsset => write!(f, "no closing asset is configured"),
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Live status of everything a chapter's stages depend on.
#[derive(Debug, Clone, Default)]
pub struct StageSnapshot {
    pub chapter_exists: bool,
    /// State of the active narration, if any.
    pub narration: Option<UnitState>,
    /// Shot keys of the active narration in source order. Empty until
    /// the narration has completed.
    pub shots: Vec<ShotKey>,
    /// Audio state per shot of the active narration.
    pub audio: HashMap<ShotKey, UnitState>,
    /// State of the active subtitle, if any.
    pub subtitle: Option<UnitState>,
    /// Number of completed images of the active narration.
    pub completed_images: usize,
    /// Active narration videos as `(sequence, state)`.
    pub narration_videos: Vec<(i32, UnitState)>,
    pub outro_configured: bool,
    /// Completed-image threshold for narration videos.
    pub min_images: usize,
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Evaluate whether `stage` may run against `snapshot`.
pub fn evaluate(stage: Stage, snapshot: &StageSnapshot) -> Result<(), Vec<MissingDependency>> {
    let mut missing = Vec::new();

    if !snapshot.chapter_exists {
        return Err(vec![MissingDependency::Chapter]);
    }

    match stage {
        Stage::Narration => {}
        Stage::Audio | Stage::Image => {
            check_narration(snapshot, &mut missing);
        }
        Stage::Subtitle => {
            check_narration(snapshot, &mut missing);
            if missing.is_empty() {
                check_audio(snapshot, &mut missing);
            }
        }
        Stage::NarrationVideo => {
            check_narration(snapshot, &mut missing);
            if missing.is_empty() {
                check_audio(snapshot, &mut missing);
                match snapshot.subtitle {
                    None => missing.push(MissingDependency::Subtitle),
                    Some(UnitState::Completed) => {}
                    Some(state) => missing.push(MissingDependency::SubtitleNotCompleted { state }),
                }
                let required = snapshot.min_images.max(1);
                if snapshot.completed_images < required {
                    missing.push(MissingDependency::Images {
                        required,
                        completed: snapshot.completed_images,
                    });
                }
            }
        }
        Stage::FinalVideo => {
            if snapshot.narration_videos.is_empty() {
                missing.push(MissingDependency::NarrationVideos);
            }
            let mut videos = snapshot.narration_videos.clone();
            videos.sort_by_key(|(seq, _)| *seq);
            for (sequence, state) in videos {
                if state != UnitState::Completed {
                    missing.push(MissingDependency::NarrationVideoNotCompleted { sequence, state });
                }
            }
            if !snapshot.outro_configured {
                missing.push(MissingDependency::OutroAsset);
            }
        }
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(missing)
    }
}

/// Like [`evaluate`] but folds the result into a [`CoreError::Precondition`].
pub fn ensure_can_run(stage: Stage, snapshot: &StageSnapshot) -> Result<(), CoreError> {
    evaluate(stage, snapshot).map_err(|missing| CoreError::Precondition { stage, missing })
}

fn check_narration(snapshot: &StageSnapshot, missing: &mut Vec<MissingDependency>) {
    match snapshot.narration {
        None => missing.push(MissingDependency::Narration),
        Some(UnitState::Completed) => {}
        Some(state) => missing.push(MissingDependency::NarrationNotCompleted { state }),
    }
}

fn check_audio(snapshot: &StageSnapshot, missing: &mut Vec<MissingDependency>) {
    for shot in &snapshot.shots {
        match snapshot.audio.get(shot) {
            None => missing.push(MissingDependency::Audio { shot: *shot }),
            Some(UnitState::Completed) => {}
            Some(_) => missing.push(MissingDependency::AudioNotCompleted { shot: *shot }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_snapshot() -> StageSnapshot {
        let shots = vec![ShotKey::new(1, 1), ShotKey::new(1, 2), ShotKey::new(2, 1)];
        StageSnapshot {
            chapter_exists: true,
            narration: Some(UnitState::Completed),
            audio: shots.iter().map(|k| (*k, UnitState::Completed)).collect(),
            shots,
            subtitle: Some(UnitState::Completed),
            completed_images: 3,
            narration_videos: vec![(1, UnitState::Completed), (2, UnitState::Completed)],
            outro_configured: true,
            min_images: DEFAULT_MIN_NARRATION_IMAGES,
        }
    }

    #[test]
    fn everything_ready() {
        let snap = ready_snapshot();
        for stage in Stage::ALL {
            assert!(evaluate(stage, &snap).is_ok(), "{stage}");
        }
    }

    #[test]
    fn missing_chapter_blocks_every_stage() {
        let snap = StageSnapshot::default();
        for stage in Stage::ALL {
            assert_eq!(evaluate(stage, &snap), Err(vec![MissingDependency::Chapter]));
        }
    }

    #[test]
    fn narration_only_needs_chapter() {
        let snap = StageSnapshot {
            chapter_exists: true,
            ..Default::default()
        };
        assert!(evaluate(Stage::Narration, &snap).is_ok());
        assert_eq!(
            evaluate(Stage::Audio, &snap),
            Err(vec![MissingDependency::Narration])
        );
    }

    #[test]
    fn pending_narration_blocks_images() {
        let snap = StageSnapshot {
            chapter_exists: true,
            narration: Some(UnitState::Pending),
            ..Default::default()
        };
        assert_eq!(
            evaluate(Stage::Image, &snap),
            Err(vec![MissingDependency::NarrationNotCompleted {
                state: UnitState::Pending
            }])
        );
    }

    #[test]
    fn subtitle_lists_each_unfinished_audio() {
        let mut snap = ready_snapshot();
        snap.audio.remove(&ShotKey::new(1, 2));
        snap.audio.insert(ShotKey::new(2, 1), UnitState::Failed);
        assert_eq!(
            evaluate(Stage::Subtitle, &snap),
            Err(vec![
                MissingDependency::Audio {
                    shot: ShotKey::new(1, 2)
                },
                MissingDependency::AudioNotCompleted {
                    shot: ShotKey::new(2, 1)
                },
            ])
        );
    }

    #[test]
    fn narration_video_requires_two_images() {
        let mut snap = ready_snapshot();
        snap.completed_images = 1;
        assert_eq!(
            evaluate(Stage::NarrationVideo, &snap),
            Err(vec![MissingDependency::Images {
                required: 2,
                completed: 1
            }])
        );
    }

    #[test]
    fn narration_video_reports_subtitle_and_images_together() {
        let mut snap = ready_snapshot();
        snap.subtitle = None;
        snap.completed_images = 0;
        let missing = evaluate(Stage::NarrationVideo, &snap).unwrap_err();
        assert_eq!(missing.len(), 2);
        assert!(missing.contains(&MissingDependency::Subtitle));
    }

    #[test]
    fn final_video_needs_every_narration_video() {
        let mut snap = ready_snapshot();
        snap.narration_videos = vec![(2, UnitState::Processing), (1, UnitState::Completed)];
        snap.outro_configured = false;
        assert_eq!(
            evaluate(Stage::FinalVideo, &snap),
            Err(vec![
                MissingDependency::NarrationVideoNotCompleted {
                    sequence: 2,
                    state: UnitState::Processing
                },
                MissingDependency::OutroAsset,
            ])
        );

        snap.narration_videos.clear();
        snap.outro_configured = true;
        assert_eq!(
            evaluate(Stage::FinalVideo, &snap),
            Err(vec![MissingDependency::NarrationVideos])
        );
    }

    #[test]
    fn ensure_can_run_wraps_precondition() {
        let snap = StageSnapshot::default();
        let err = ensure_can_run(Stage::Subtitle, &snap).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Precondition {
                stage: Stage::Subtitle,
                ..
            }
        ));
    }
}
