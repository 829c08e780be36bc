//! Event type names published by the pipeline.

pub const RESOURCE_READY: &str = "resource.ready";
pub const RESOURCE_FAILED: &str = "resource.failed";
pub const RESOURCE_DELETED: &str = "resource.deleted";
pub const NOVEL_CHAPTERED: &str = "novel.chaptered";
pub const NARRATION_COMPLETED: &str = "narration.completed";
pub const NARRATION_FAILED: &str = "narration.failed";
pub const AUDIO_BATCH_FINISHED: &str = "audio.batch_finished";
pub const SUBTITLE_COMPLETED: &str = "subtitle.completed";
pub const SUBTITLE_FAILED: &str = "subtitle.failed";
pub const IMAGE_BATCH_FINISHED: &str = "image.batch_finished";
pub const VIDEO_PROCESSING: &str = "video.processing";
pub const VIDEO_COMPLETED: &str = "video.completed";
pub const VIDEO_FAILED: &str = "video.failed";
