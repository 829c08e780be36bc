//! Structured narration schema: ordered scenes, each with ordered shots.
//!
//! The structuring provider returns free-form text that must decode into
//! [`NarrationContent`]. Decoding is strict: missing fields, empty scene
//! or shot lists, blank narration text, and out-of-order numbering are
//! all validation errors rather than being repaired.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Maximum number of scenes accepted from a single structuring call.
pub const MAX_SCENES: usize = 200;

/// Maximum number of shots per scene.
pub const MAX_SHOTS_PER_SCENE: usize = 100;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Identifies a shot within a narration: `(scene_number, shot_number)`.
///
/// Ordering is scene-major, which is the source order of the narration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShotKey {
    pub scene_number: i32,
    pub shot_number: i32,
}

impl ShotKey {
    pub fn new(scene_number: i32, shot_number: i32) -> Self {
        Self {
            scene_number,
            shot_number,
        }
    }
}

impl std::fmt::Display for ShotKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "scene {} shot {}", self.scene_number, self.shot_number)
    }
}

/// The smallest narration unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shot {
    #[serde(alias = "shot_number")]
    pub shot_number: i32,
    pub text: String,
    #[serde(alias = "visual_description")]
    pub visual_description: String,
}

/// An ordered group of shots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    #[serde(alias = "scene_number")]
    pub scene_number: i32,
    pub shots: Vec<Shot>,
}

/// A chapter's narration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrationContent {
    pub scenes: Vec<Scene>,
}

/// A shot flattened together with its key, in source order.
#[derive(Debug, Clone, Copy)]
pub struct ShotRef<'a> {
    pub key: ShotKey,
    pub shot: &'a Shot,
}

// ---------------------------------------------------------------------------
// Parsing and validation
// ---------------------------------------------------------------------------

impl NarrationContent {
    /// Decode and validate raw structuring-provider output.
    ///
    /// Accepts a bare JSON object or one wrapped in a Markdown code fence.
    pub fn parse_provider_output(raw: &str) -> Result<Self, CoreError> {
        let body = strip_code_fence(raw);
        if body.is_empty() {
            return Err(CoreError::Validation(
                "Structuring provider returned an empty response".into(),
            ));
        }
        let content: NarrationContent = serde_json::from_str(body).map_err(|e| {
            CoreError::Validation(format!("Malformed narration document: {e}"))
        })?;
        content.validate()?;
        Ok(content)
    }

    /// Check the structural invariants of the document.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.scenes.is_empty() {
            return Err(CoreError::Validation(
                "Narration must contain at least one scene".into(),
            ));
        }
        if self.scenes.len() > MAX_SCENES {
            return Err(CoreError::Validation(format!(
                "Narration has {} scenes, at most {MAX_SCENES} allowed",
                self.scenes.len()
            )));
        }

        let mut prev_scene = 0;
        for scene in &self.scenes {
            if scene.scene_number <= prev_scene {
                return Err(CoreError::Validation(format!(
                    "Scene numbers must be positive and strictly increasing, got {} after {}",
                    scene.scene_number, prev_scene
                )));
            }
            prev_scene = scene.scene_number;

            if scene.shots.is_empty() {
                return Err(CoreError::Validation(format!(
                    "Scene {} must contain at least one shot",
                    scene.scene_number
                )));
            }
            if scene.shots.len() > MAX_SHOTS_PER_SCENE {
                return Err(CoreError::Validation(format!(
                    "Scene {} has {} shots, at most {MAX_SHOTS_PER_SCENE} allowed",
                    scene.scene_number,
                    scene.shots.len()
                )));
            }

            let mut prev_shot = 0;
            for shot in &scene.shots {
                let key = ShotKey::new(scene.scene_number, shot.shot_number);
                if shot.shot_number <= prev_shot {
                    return Err(CoreError::Validation(format!(
                        "Shot numbers in scene {} must be positive and strictly increasing, got {} after {}",
                        scene.scene_number, shot.shot_number, prev_shot
                    )));
                }
                prev_shot = shot.shot_number;

                if shot.text.trim().is_empty() {
                    return Err(CoreError::Validation(format!(
                        "Narration text for {key} must not be empty"
                    )));
                }
                if shot.visual_description.trim().is_empty() {
                    return Err(CoreError::Validation(format!(
                        "Visual description for {key} must not be empty"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Iterate every shot in source order.
    pub fn shots(&self) -> impl Iterator<Item = ShotRef<'_>> {
        self.scenes.iter().flat_map(|scene| {
            scene.shots.iter().map(move |shot| ShotRef {
                key: ShotKey::new(scene.scene_number, shot.shot_number),
                shot,
            })
        })
    }

    /// All shot keys in source order.
    pub fn shot_keys(&self) -> Vec<ShotKey> {
        self.shots().map(|s| s.key).collect()
    }

    pub fn shot_count(&self) -> usize {
        self.scenes.iter().map(|s| s.shots.len()).sum()
    }

    /// Look up a single shot by key.
    pub fn find_shot(&self, key: ShotKey) -> Option<&Shot> {
        self.scenes
            .iter()
            .find(|s| s.scene_number == key.scene_number)
            .and_then(|s| s.shots.iter().find(|shot| shot.shot_number == key.shot_number))
    }
}

/// Remove a surrounding Markdown code fence (```` ```json ... ``` ````).
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
