//! Blob storage key naming conventions.
//!
//! Generates deterministic object keys for every artifact the pipeline
//! writes, so that a key alone identifies its owner and position.

use crate::narration::ShotKey;
use crate::types::DbId;

/// Map a MIME content type to the file extension used in storage keys.
///
/// ```
/// use storyreel_core::naming::extension_for_content_type;
///
/// assert_eq!(extension_for_content_type("audio/mpeg"), "mp3");
/// assert_eq!(extension_for_content_type("image/png; charset=binary"), "png");
/// assert_eq!(extension_for_content_type("application/x-unknown"), "bin");
/// ```
pub fn extension_for_content_type(content_type: &str) -> &'static str {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        "audio/ogg" | "audio/opus" => "ogg",
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "video/mp4" => "mp4",
        "application/x-subrip" => "srt",
        "text/plain" => "txt",
        _ => "bin",
    }
}

/// Normalise a user-supplied file extension: lowercase, alphanumeric
/// only, at most 10 characters. Returns `"bin"` when nothing remains.
pub fn sanitize_extension(ext: &str) -> String {
    let cleaned: String = ext
        .trim_start_matches('.')
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(10)
        .collect::<String>()
        .to_ascii_lowercase();
    if cleaned.is_empty() {
        "bin".to_string()
    } else {
        cleaned
    }
}

/// Key for an uploaded source file.
pub fn resource_key(user_id: DbId, token: &str, ext: &str) -> String {
    format!("resources/{user_id}/{token}.{}", sanitize_extension(ext))
}

/// Key for one shot's narration audio.
pub fn audio_key(narration_id: DbId, shot: ShotKey, ext: &str) -> String {
    format!(
        "narrations/{narration_id}/audio/s{:03}_{:03}.{ext}",
        shot.scene_number, shot.shot_number
    )
}

/// Key for a narration's caption track.
pub fn subtitle_key(narration_id: DbId, subtitle_id: DbId) -> String {
    format!("narrations/{narration_id}/subtitles/{subtitle_id}.srt")
}

/// Key for one version of a shot image.
pub fn image_key(chapter_id: DbId, shot: ShotKey, version: i32, ext: &str) -> String {
    format!(
        "chapters/{chapter_id}/images/s{:03}_{:03}_v{version}.{ext}",
        shot.scene_number, shot.shot_number
    )
}

/// Key for a narration video clip.
pub fn narration_video_key(chapter_id: DbId, video_id: DbId, sequence: i32) -> String {
    format!("chapters/{chapter_id}/videos/narration_{sequence:03}_{video_id}.mp4")
}

/// Key for a chapter's final video.
pub fn final_video_key(chapter_id: DbId, video_id: DbId) -> String {
    format!("chapters/{chapter_id}/videos/final_{video_id}.mp4")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_keys_sort_in_shot_order() {
        let a = audio_key(7, ShotKey::new(1, 2), "mp3");
        let b = audio_key(7, ShotKey::new(1, 10), "mp3");
        let c = audio_key(7, ShotKey::new(2, 1), "mp3");
        assert_eq!(a, "narrations/7/audio/s001_002.mp3");
        assert!(a < b && b < c);
    }

    #[test]
    fn image_key_carries_version() {
        assert_eq!(
            image_key(3, ShotKey::new(2, 4), 5, "png"),
            "chapters/3/images/s002_004_v5.png"
        );
    }

    #[test]
    fn video_keys() {
        assert_eq!(
            narration_video_key(9, 41, 2),
            "chapters/9/videos/narration_002_41.mp4"
        );
        assert_eq!(final_video_key(9, 42), "chapters/9/videos/final_42.mp4");
        assert_eq!(subtitle_key(5, 6), "narrations/5/subtitles/6.srt");
    }

    #[test]
    fn resource_key_sanitizes_extension() {
        assert_eq!(resource_key(1, "abc", ".TXT"), "resources/1/abc.txt");
        assert_eq!(resource_key(1, "abc", "../.."), "resources/1/abc.bin");
    }

    #[test]
    fn content_type_mapping() {
        assert_eq!(extension_for_content_type("audio/wav"), "wav");
        assert_eq!(extension_for_content_type("IMAGE/JPEG"), "jpg");
        assert_eq!(extension_for_content_type("application/x-subrip"), "srt");
    }
}
