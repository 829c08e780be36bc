//! Caption track layout and SubRip rendering.
//!
//! Cues are laid out on a single running timeline: each shot occupies
//! exactly its recorded audio duration, in narration order. Shot text
//! longer than [`MAX_CUE_CHARS`] is split at sentence boundaries into
//! several cues sharing the shot's window in proportion to their length.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::narration::ShotKey;

/// Longest caption text shown at once before a shot is split.
pub const MAX_CUE_CHARS: usize = 84;

/// Content type of rendered caption tracks.
pub const SRT_CONTENT_TYPE: &str = "application/x-subrip";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Narration text of one shot together with its measured audio duration.
#[derive(Debug, Clone, Copy)]
pub struct TimedText<'a> {
    pub key: ShotKey,
    pub text: &'a str,
    pub duration_ms: i64,
}

/// A single caption cue on the narration timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionCue {
    pub key: ShotKey,
    pub start_ms: i64,
    pub end_ms: i64,
    pub text: String,
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Lay out cues for `units` in the given order.
///
/// Fails if any unit has a non-positive duration; a caption track is
/// never produced with gaps or overlaps.
pub fn layout_cues(units: &[TimedText<'_>]) -> Result<Vec<CaptionCue>, CoreError> {
    if units.is_empty() {
        return Err(CoreError::Validation(
            "Cannot lay out captions without any timed text".into(),
        ));
    }

    let mut cues = Vec::with_capacity(units.len());
    let mut cursor = 0i64;
    for unit in units {
        if unit.duration_ms <= 0 {
            return Err(CoreError::Validation(format!(
                "Audio duration for {} must be positive, got {}ms",
                unit.key, unit.duration_ms
            )));
        }
        let unit_end = cursor + unit.duration_ms;
        let segments = split_caption_text(unit.text, MAX_CUE_CHARS);
        let total_chars: usize = segments.iter().map(|s| s.chars().count()).sum();

        let mut seg_start = cursor;
        let mut chars_so_far = 0usize;
        // Text of segments too short to get their own millisecond.
        let mut carried = String::new();
        let last = segments.len().saturating_sub(1);
        for (i, segment) in segments.into_iter().enumerate() {
            chars_so_far += segment.chars().count();
            let seg_end = if i == last || total_chars == 0 {
                unit_end
            } else {
                cursor + unit.duration_ms * chars_so_far as i64 / total_chars as i64
            };
            if !carried.is_empty() {
                carried.push(' ');
            }
            carried.push_str(&segment);
            if seg_end > seg_start {
                cues.push(CaptionCue {
                    key: unit.key,
                    start_ms: seg_start,
                    end_ms: seg_end,
                    text: std::mem::take(&mut carried),
                });
                seg_start = seg_end;
            }
        }
        cursor = unit_end;
    }
    Ok(cues)
}

/// Total length of the timeline covered by `cues`.
pub fn timeline_end_ms(cues: &[CaptionCue]) -> i64 {
    cues.last().map(|c| c.end_ms).unwrap_or(0)
}

/// Cues overlapping `[start_ms, end_ms)`, clipped and rebased so the
/// window starts at zero.
pub fn cues_in_window(cues: &[CaptionCue], start_ms: i64, end_ms: i64) -> Vec<CaptionCue> {
    cues.iter()
        .filter(|c| c.end_ms > start_ms && c.start_ms < end_ms)
        .map(|c| CaptionCue {
            key: c.key,
            start_ms: c.start_ms.max(start_ms) - start_ms,
            end_ms: c.end_ms.min(end_ms) - start_ms,
            text: c.text.clone(),
        })
        .collect()
}

/// Split caption text into chunks of at most `max_chars`, preferring
/// sentence ends and falling back to word boundaries.
fn split_caption_text(text: &str, max_chars: usize) -> Vec<String> {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.chars().count() <= max_chars {
        return vec![normalized];
    }

    let mut pieces: Vec<String> = Vec::new();
    let mut current = String::new();
    for ch in normalized.chars() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?' | '。' | '！' | '？' | ';' | '；') {
            pieces.push(std::mem::take(&mut current).trim().to_string());
        }
    }
    if !current.trim().is_empty() {
        pieces.push(current.trim().to_string());
    }

    let mut chunks: Vec<String> = Vec::new();
    let mut buf = String::new();
    for piece in pieces.into_iter().filter(|p| !p.is_empty()) {
        for part in wrap_words(&piece, max_chars) {
            let joined_len = buf.chars().count() + 1 + part.chars().count();
            if buf.is_empty() {
                buf = part;
            } else if joined_len <= max_chars {
                buf.push(' ');
                buf.push_str(&part);
            } else {
                chunks.push(std::mem::replace(&mut buf, part));
            }
        }
    }
    if !buf.is_empty() {
        chunks.push(buf);
    }
    chunks
}

/// Break a single over-long sentence at word boundaries. Words longer
/// than `max_chars` (common in CJK text) are cut by character count.
fn wrap_words(sentence: &str, max_chars: usize) -> Vec<String> {
    if sentence.chars().count() <= max_chars {
        return vec![sentence.to_string()];
    }
    let mut out = Vec::new();
    let mut line = String::new();
    for word in sentence.split(' ') {
        let word_chars: Vec<char> = word.chars().collect();
        for piece in word_chars.chunks(max_chars) {
            let piece: String = piece.iter().collect();
            let len = line.chars().count();
            if len == 0 {
                line = piece;
            } else if len + 1 + piece.chars().count() <= max_chars {
                line.push(' ');
                line.push_str(&piece);
            } else {
                out.push(std::mem::replace(&mut line, piece));
            }
        }
    }
    if !line.is_empty() {
        out.push(line);
    }
    out
}

// ---------------------------------------------------------------------------
// SubRip rendering
// ---------------------------------------------------------------------------

/// Format milliseconds as an SRT timestamp (`HH:MM:SS,mmm`).
pub fn format_srt_timestamp(ms: i64) -> String {
    let ms = ms.max(0);
    let millis = ms % 1000;
    let total_secs = ms / 1000;
    let secs = total_secs % 60;
    let mins = (total_secs / 60) % 60;
    let hours = total_secs / 3600;
    format!("{hours:02}:{mins:02}:{secs:02},{millis:03}")
}

/// Render cues as a SubRip document with 1-based cue numbers.
pub fn render_srt(cues: &[CaptionCue]) -> String {
    let mut out = String::new();
    for (i, cue) in cues.iter().enumerate() {
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            format_srt_timestamp(cue.start_ms),
            format_srt_timestamp(cue.end_ms),
            cue.text
        ));
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
