//! Command-line definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use storyreel_core::narration::ShotKey;

/// Storyreel worker: drives chapters of a novel through the video pipeline.
#[derive(Parser, Debug)]
#[command(name = "storyreel-worker")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply pending database migrations
    Migrate,

    /// Upload a novel file, create the novel and split it into chapters
    Ingest {
        /// Path to the UTF-8 novel text
        file: PathBuf,

        /// Owner of the novel
        #[arg(long)]
        user: i64,

        /// Number of chapters to aim for
        #[arg(long, default_value_t = 10)]
        chapters: usize,

        /// Narration style hint passed to the structuring provider
        #[arg(long)]
        style: Option<String>,

        /// Narration perspective hint, e.g. "first person"
        #[arg(long)]
        narration_type: Option<String>,
    },

    /// Generate (or regenerate) a chapter's narration
    Narrate { chapter_id: i64 },

    /// Synthesize audio for a narration's shots
    Audio {
        narration_id: i64,

        /// Only re-run these shots, written as SCENE.SHOT
        #[arg(long = "retry", value_parser = parse_shot_key, num_args = 1..)]
        retry: Vec<ShotKey>,
    },

    /// Build the caption track of a narration
    Subtitle { narration_id: i64 },

    /// Generate a new image version for every shot of a chapter
    Images {
        chapter_id: i64,

        /// Re-run the unfinished images of this version instead
        #[arg(long)]
        retry_version: Option<i32>,
    },

    /// Render one narration video per scene
    NarrationVideo { chapter_id: i64 },

    /// Assemble the final video from the narration videos and the outro
    FinalVideo { chapter_id: i64 },

    /// Resume polling a video left processing by a stopped worker
    ResumeVideo { video_id: i64 },

    /// Run every stage of a chapter in order
    Run { chapter_id: i64 },

    /// Show which stages of a chapter can run
    Status { chapter_id: i64 },

    /// Soft-delete a resource and remove its stored object
    DeleteResource { resource_id: i64 },
}

/// Parse `SCENE.SHOT` (e.g. `2.1`) into a shot key.
pub fn parse_shot_key(value: &str) -> Result<ShotKey, String> {
    let (scene, shot) = value
        .split_once('.')
        .ok_or_else(|| format!("expected SCENE.SHOT, got '{value}'"))?;
    let scene: i32 = scene
        .trim()
        .parse()
        .map_err(|_| format!("invalid scene number in '{value}'"))?;
    let shot: i32 = shot
        .trim()
        .parse()
        .map_err(|_| format!("invalid shot number in '{value}'"))?;
    if scene < 1 || shot < 1 {
        return Err(format!("scene and shot numbers start at 1, got '{value}'"));
    }
    Ok(ShotKey::new(scene, shot))
}
