//! Clip planning for narration and final videos.
//!
//! A chapter's narration is cut into one clip per scene, in scene order,
//! so a clip's sequence number always matches the source ordering. Each
//! shot contributes its audio clip and an image; shots whose image is
//! missing borrow the nearest preceding shot's image (or the nearest
//! following one when nothing precedes them).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::narration::{NarrationContent, ShotKey};
use crate::subtitle::{cues_in_window, CaptionCue};

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Completed audio for one shot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShotAudio {
    pub storage_key: String,
    pub duration_ms: i64,
}

// ---------------------------------------------------------------------------
// Plans
// ---------------------------------------------------------------------------

/// One shot placed inside a clip. Times are clip-local.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipShot {
    pub key: ShotKey,
    pub image_key: String,
    pub audio_key: String,
    pub start_ms: i64,
    pub duration_ms: i64,
    /// `true` when the image was borrowed from another shot.
    pub borrowed_image: bool,
}

/// Everything the video provider needs to render one narration video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipPlan {
    pub sequence: i32,
    pub scene_number: i32,
    pub shots: Vec<ClipShot>,
    /// Offset of this clip on the whole-narration timeline.
    pub timeline_start_ms: i64,
    pub duration_ms: i64,
    /// Caption cues overlapping the clip, rebased to clip-local time.
    pub captions: Vec<CaptionCue>,
}

/// Plan the narration videos for a chapter.
///
/// `images` maps shot keys to the storage key of their latest completed
/// image; at least one image must exist. Every shot must have audio.
pub fn plan_narration_clips(
    content: &NarrationContent,
    audio: &HashMap<ShotKey, ShotAudio>,
    images: &HashMap<ShotKey, String>,
    cues: &[CaptionCue],
) -> Result<Vec<ClipPlan>, CoreError> {
    if images.is_empty() {
        return Err(CoreError::Validation(
            "Cannot plan narration clips without any completed image".into(),
        ));
    }

    let keys = content.shot_keys();
    let resolved = resolve_images(&keys, images);

    let mut clips = Vec::with_capacity(content.scenes.len());
    let mut cursor = 0i64;
    for (idx, scene) in content.scenes.iter().enumerate() {
        let clip_start = cursor;
        let mut shots = Vec::with_capacity(scene.shots.len());
        for shot in &scene.shots {
            let key = ShotKey::new(scene.scene_number, shot.shot_number);
            let clip_audio = audio.get(&key).ok_or_else(|| {
                CoreError::Validation(format!("No completed audio for {key}"))
            })?;
            let (image_key, borrowed_image) = resolved.get(&key).cloned().ok_or_else(|| {
                CoreError::Internal(format!("Image resolution skipped {key}"))
            })?;
            shots.push(ClipShot {
                key,
                image_key,
                audio_key: clip_audio.storage_key.clone(),
                start_ms: cursor - clip_start,
                duration_ms: clip_audio.duration_ms,
                borrowed_image,
            });
            cursor += clip_audio.duration_ms;
        }
        clips.push(ClipPlan {
            sequence: idx as i32 + 1,
            scene_number: scene.scene_number,
            shots,
            timeline_start_ms: clip_start,
            duration_ms: cursor - clip_start,
            captions: cues_in_window(cues, clip_start, cursor),
        });
    }
    Ok(clips)
}

/// Pick an image for every key: its own, else the nearest preceding
/// shot's, else the nearest following shot's.
fn resolve_images(
    keys: &[ShotKey],
    images: &HashMap<ShotKey, String>,
) -> HashMap<ShotKey, (String, bool)> {
    let mut resolved = HashMap::with_capacity(keys.len());
    let mut last_seen: Option<&String> = None;
    let mut pending_head: Vec<ShotKey> = Vec::new();

    for key in keys {
        match images.get(key) {
            Some(own) => {
                for head in pending_head.drain(..) {
                    resolved.insert(head, (own.clone(), true));
                }
                resolved.insert(*key, (own.clone(), false));
                last_seen = Some(own);
            }
            None => match last_seen {
                Some(prev) => {
                    resolved.insert(*key, (prev.clone(), true));
                }
                None => pending_head.push(*key),
            },
        }
    }
    resolved
}

// ---------------------------------------------------------------------------
// Final video
// ---------------------------------------------------------------------------

/// Ordered inputs of a final video: narration videos by sequence, then
/// the closing asset.
pub fn plan_final_cut(
    narration_videos: &[(i32, String)],
    outro_key: &str,
) -> Result<Vec<String>, CoreError> {
    if narration_videos.is_empty() {
        return Err(CoreError::Validation(
            "A final video needs at least one narration video".into(),
        ));
    }
    let mut ordered = narration_videos.to_vec();
    ordered.sort_by_key(|(seq, _)| *seq);
    for pair in ordered.windows(2) {
        if pair[0].0 == pair[1].0 {
            return Err(CoreError::Conflict(format!(
                "Duplicate narration video sequence {}",
                pair[0].0
            )));
        }
    }
    let mut parts: Vec<String> = ordered.into_iter().map(|(_, key)| key).collect();
    parts.push(outro_key.to_string());
    Ok(parts)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narration::{Scene, Shot};
    use crate::subtitle::{layout_cues, TimedText};

    fn content(shape: &[usize]) -> NarrationContent {
        NarrationContent {
            scenes: shape
                .iter()
                .enumerate()
                .map(|(s, &n)| Scene {
                    scene_number: s as i32 + 1,
                    shots: (1..=n as i32)
                        .map(|shot_number| Shot {
                            shot_number,
                            text: format!("Line {}-{shot_number}.", s + 1),
                            visual_description: "desc".into(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    fn audio_for(content: &NarrationContent, ms: i64) -> HashMap<ShotKey, ShotAudio> {
        content
            .shot_keys()
            .into_iter()
            .map(|k| {
                (
                    k,
                    ShotAudio {
                        storage_key: format!("a/{}_{}", k.scene_number, k.shot_number),
                        duration_ms: ms,
                    },
                )
            })
            .collect()
    }

    fn cues_for(content: &NarrationContent, ms: i64) -> Vec<CaptionCue> {
        let units: Vec<TimedText<'_>> = content
            .shots()
            .map(|s| TimedText {
                key: s.key,
                text: &s.shot.text,
                duration_ms: ms,
            })
            .collect();
        layout_cues(&units).unwrap()
    }

    #[test]
    fn one_clip_per_scene_in_order() {
        let c = content(&[2, 2, 2]);
        let audio = audio_for(&c, 1000);
        let images: HashMap<_, _> = c
            .shot_keys()
            .into_iter()
            .map(|k| (k, format!("img/{}_{}", k.scene_number, k.shot_number)))
            .collect();
        let cues = cues_for(&c, 1000);

        let clips = plan_narration_clips(&c, &audio, &images, &cues).unwrap();
        assert_eq!(clips.len(), 3);
        for (i, clip) in clips.iter().enumerate() {
            assert_eq!(clip.sequence, i as i32 + 1);
            assert_eq!(clip.scene_number, i as i32 + 1);
            assert_eq!(clip.duration_ms, 2000);
            assert_eq!(clip.timeline_start_ms, i as i64 * 2000);
            assert_eq!(clip.shots[1].start_ms, 1000);
            assert_eq!(clip.captions.len(), 2);
            assert_eq!(clip.captions[0].start_ms, 0);
            assert_eq!(clip.captions[1].end_ms, 2000);
        }
    }

    #[test]
    fn missing_images_borrow_neighbours() {
        let c = content(&[3, 1]);
        let audio = audio_for(&c, 500);
        let mut images = HashMap::new();
        images.insert(ShotKey::new(1, 2), "img/b".to_string());
        images.insert(ShotKey::new(2, 1), "img/d".to_string());

        let clips = plan_narration_clips(&c, &audio, &images, &[]).unwrap();
        let first = &clips[0].shots;
        // Head shot borrows the following image.
        assert_eq!(first[0].image_key, "img/b");
        assert!(first[0].borrowed_image);
        assert_eq!(first[1].image_key, "img/b");
        assert!(!first[1].borrowed_image);
        // Later gap borrows the preceding image.
        assert_eq!(first[2].image_key, "img/b");
        assert!(first[2].borrowed_image);
        assert_eq!(clips[1].shots[0].image_key, "img/d");
    }

    #[test]
    fn no_images_is_an_error() {
        let c = content(&[1]);
        let audio = audio_for(&c, 500);
        assert!(plan_narration_clips(&c, &audio, &HashMap::new(), &[]).is_err());
    }

    #[test]
    fn missing_audio_is_an_error() {
        let c = content(&[2]);
        let mut audio = audio_for(&c, 500);
        audio.remove(&ShotKey::new(1, 2));
        let images: HashMap<_, _> = [(ShotKey::new(1, 1), "i".to_string())].into();
        let err = plan_narration_clips(&c, &audio, &images, &[]).unwrap_err();
        assert!(err.to_string().contains("scene 1 shot 2"));
    }

    #[test]
    fn final_cut_orders_by_sequence_and_appends_outro() {
        let parts = plan_final_cut(
            &[(2, "v2".into()), (1, "v1".into()), (3, "v3".into())],
            "outro.mp4",
        )
        .unwrap();
        assert_eq!(parts, vec!["v1", "v2", "v3", "outro.mp4"]);
    }

    #[test]
    fn final_cut_rejects_duplicates_and_empty() {
        assert!(plan_final_cut(&[], "o").is_err());
        assert!(plan_final_cut(&[(1, "a".into()), (1, "b".into())], "o").is_err());
    }
}
