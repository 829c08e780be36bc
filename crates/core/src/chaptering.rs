//! Chaptering engine: split a raw novel into an ordered list of chapters.
//!
//! The text is divided into `target` pieces of roughly equal character
//! length. Each cut is moved to the best natural break point near its
//! ideal offset, ranked heading line > blank-line paragraph > line
//! break > sentence end. When no natural break exists near the ideal
//! offset the cut falls back to the nearest character boundary, so the
//! engine never drops or duplicates content: concatenating the chapter
//! texts in sequence order yields the original input byte for byte.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// A chapter's first line is used as its title only when it is at most
/// this many characters long; longer first lines are prose.
pub const MAX_TITLE_CHARS: usize = 60;

/// Upper bound on the requested chapter count.
pub const MAX_TARGET_CHAPTERS: usize = 10_000;

/// Sentence terminators, Latin and CJK.
const SENTENCE_TERMINATORS: &[char] = &['.', '!', '?', '…', '。', '！', '？'];

/// Closing punctuation that belongs to the sentence it ends.
const CLOSING_MARKS: &[char] = &['"', '\'', '”', '’', ')', '」', '』', '）', '】'];

/// CJK terminators end a sentence without trailing whitespace.
const CJK_TERMINATORS: &[char] = &['。', '！', '？'];

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One chapter produced by [`split_chapters`], before persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChapterDraft {
    /// 1-based, contiguous position within the novel.
    pub sequence: i32,
    pub title: String,
    pub text: String,
}

/// Kinds of natural break point, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum BreakKind {
    Heading,
    Paragraph,
    Line,
    Sentence,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    /// Byte offset where the next chapter would begin.
    pos: usize,
    kind: BreakKind,
}

fn heading_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?mi)^[ \t\x{3000}]*(?:(?:chapter|part|book)\s+(?:\d+|[ivxlcdm]+|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve|thirteen|fourteen|fifteen|sixteen|seventeen|eighteen|nineteen|twenty)\b|prologue\b|epilogue\b|第[0-9零一二三四五六七八九十百千两]+[章回节卷])",
        )
        .expect("static heading regex is valid")
    })
}

// ---------------------------------------------------------------------------
// Splitting
// ---------------------------------------------------------------------------

/// Split `text` into about `target` chapters.
///
/// Returns fewer chapters than requested only when the text has fewer
/// characters than `target`.
pub fn split_chapters(text: &str, target: usize) -> Result<Vec<ChapterDraft>, CoreError> {
    if text.trim().is_empty() {
        return Err(CoreError::Validation("Novel text must not be empty".into()));
    }
    if target == 0 {
        return Err(CoreError::Validation(
            "Target chapter count must be at least 1".into(),
        ));
    }
    if target > MAX_TARGET_CHAPTERS {
        return Err(CoreError::Validation(format!(
            "Target chapter count must not exceed {MAX_TARGET_CHAPTERS}"
        )));
    }

    let cuts = choose_cuts(text, target);

    let mut drafts = Vec::with_capacity(cuts.len() + 1);
    let mut start = 0usize;
    for end in cuts.into_iter().chain(std::iter::once(text.len())) {
        let sequence = drafts.len() as i32 + 1;
        let body = &text[start..end];
        drafts.push(ChapterDraft {
            sequence,
            title: derive_title(body, sequence),
            text: body.to_string(),
        });
        start = end;
    }
    Ok(drafts)
}

/// Pick the byte offsets at which chapters 2..=N begin.
fn choose_cuts(text: &str, target: usize) -> Vec<usize> {
    let char_starts: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    let total_chars = char_starts.len();
    let count = target.min(total_chars);
    if count <= 1 {
        return Vec::new();
    }

    let byte_at = |char_idx: usize| -> usize {
        if char_idx >= total_chars {
            text.len()
        } else {
            char_starts[char_idx]
        }
    };

    let chapter_chars = total_chars / count;
    let window_chars = chapter_chars / 2;
    let candidates = collect_candidates(text);

    let mut cuts = Vec::with_capacity(count - 1);
    let mut prev = 0usize;
    for i in 1..count {
        let ideal_char = i * total_chars / count;
        let ideal = byte_at(ideal_char);
        let lo = byte_at(ideal_char.saturating_sub(window_chars)).max(prev + 1);
        let hi = byte_at(ideal_char + window_chars).min(text.len() - 1);

        let natural = candidates
            .iter()
            .filter(|c| c.pos >= lo && c.pos <= hi)
            .min_by_key(|c| (c.kind, c.pos.abs_diff(ideal)));

        let cut = match natural {
            Some(c) => c.pos,
            None => ideal,
        };
        if cut <= prev || cut >= text.len() {
            continue;
        }
        cuts.push(cut);
        prev = cut;
    }
    cuts
}

/// Scan the text once and record every natural break point.
fn collect_candidates(text: &str) -> Vec<Candidate> {
    let mut out: Vec<Candidate> = Vec::new();

    for m in heading_regex().find_iter(text) {
        if m.start() > 0 {
            out.push(Candidate {
                pos: m.start(),
                kind: BreakKind::Heading,
            });
        }
    }

    let mut line_start = 0usize;
    let mut prev_line_blank = false;
    for (i, ch) in text.char_indices() {
        if ch != '\n' {
            continue;
        }
        let line_blank = text[line_start..i].trim().is_empty();
        let next = i + 1;
        if next < text.len() {
            let kind = if line_blank && !prev_line_blank {
                BreakKind::Paragraph
            } else {
                BreakKind::Line
            };
            out.push(Candidate { pos: next, kind });
        }
        prev_line_blank = line_blank;
        line_start = next;
    }

    let mut iter = text.char_indices().peekable();
    while let Some((_, ch)) = iter.next() {
        if !SENTENCE_TERMINATORS.contains(&ch) {
            continue;
        }
        while let Some(&(_, next)) = iter.peek() {
            if CLOSING_MARKS.contains(&next) || SENTENCE_TERMINATORS.contains(&next) {
                iter.next();
            } else {
                break;
            }
        }
        match iter.peek() {
            Some(&(pos, ' ' | '\t')) => {
                // Trailing spaces stay with the sentence they follow.
                let mut end = pos;
                while let Some(&(p, ' ' | '\t')) = iter.peek() {
                    end = p + 1;
                    iter.next();
                }
                if end < text.len() {
                    out.push(Candidate {
                        pos: end,
                        kind: BreakKind::Sentence,
                    });
                }
            }
            Some(&(pos, next)) if CJK_TERMINATORS.contains(&ch) && next != '\n' => {
                out.push(Candidate {
                    pos,
                    kind: BreakKind::Sentence,
                });
            }
            _ => {}
        }
    }

    out.sort_by_key(|c| (c.pos, c.kind));
    out.dedup_by_key(|c| c.pos);
    out
}

/// First non-empty line when it is short enough to be a title,
/// otherwise `Chapter N`.
fn derive_title(body: &str, sequence: i32) -> String {
    body.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .filter(|l| l.chars().count() <= MAX_TITLE_CHARS)
        .map(ToString::to_string)
        .unwrap_or_else(|| format!("Chapter {sequence}"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
