//! Chapter text to scene/shot structure.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::http::JsonApi;
use crate::{ProviderError, ProviderResult};

/// Input to one structuring call.
#[derive(Debug, Clone, Copy)]
pub struct StructureRequest<'a> {
    pub chapter_text: &'a str,
    /// Narrative style hint taken from the novel (e.g. "suspense").
    pub style: Option<&'a str>,
    /// Narration voice hint taken from the novel (e.g. "first_person").
    pub narration_type: Option<&'a str>,
}

#[async_trait]
pub trait StructuringProvider: Send + Sync {
    /// Return the provider's raw output. Parsing and validation into a
    /// narration document is the caller's job.
    async fn structure(&self, request: StructureRequest<'_>) -> ProviderResult<String>;
}

// ---------------------------------------------------------------------------
// Prompt
// ---------------------------------------------------------------------------

const SYSTEM_PROMPT: &str = "You adapt novel chapters into narration scripts for short videos. \
Reply with a single JSON object and nothing else, shaped as \
{\"scenes\":[{\"sceneNumber\":1,\"shots\":[{\"shotNumber\":1,\"text\":\"...\",\"visualDescription\":\"...\"}]}]}. \
Number scenes from 1 and shots from 1 within each scene. \
`text` is the narration spoken over the shot; `visualDescription` describes one still image for it.";

/// Build the user prompt for a request, appending any style hints.
pub fn build_prompt(request: &StructureRequest<'_>) -> String {
    let mut prompt = String::new();
    if let Some(style) = request.style.filter(|s| !s.trim().is_empty()) {
        prompt.push_str(&format!("Style: {}\n", style.trim()));
    }
    if let Some(kind) = request.narration_type.filter(|s| !s.trim().is_empty()) {
        prompt.push_str(&format!("Narration type: {}\n", kind.trim()));
    }
    if !prompt.is_empty() {
        prompt.push('\n');
    }
    prompt.push_str("Chapter:\n");
    prompt.push_str(request.chapter_text);
    prompt
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// OpenAI-compatible chat completions client.
pub struct HttpStructuringProvider {
    api: JsonApi,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl HttpStructuringProvider {
    pub fn new(api: JsonApi, model: String) -> Self {
        Self { api, model }
    }
}

#[async_trait]
impl StructuringProvider for HttpStructuringProvider {
    async fn structure(&self, request: StructureRequest<'_>) -> ProviderResult<String> {
        let body = json!({
            "model": self.model,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": build_prompt(&request) },
            ],
        });

        let response: ChatResponse = self.api.post_json("chat/completions", &body).await?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ProviderError::InvalidResponse("Completion has no content".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_carries_hints_before_text() {
        let prompt = build_prompt(&StructureRequest {
            chapter_text: "It was a dark night.",
            style: Some("suspense"),
            narration_type: Some(" first_person "),
        });
        assert_eq!(
            prompt,
            "Style: suspense\nNarration type: first_person\n\nChapter:\nIt was a dark night."
        );
    }

    #[test]
    fn blank_hints_are_skipped() {
        let prompt = build_prompt(&StructureRequest {
            chapter_text: "Text",
            style: Some("  "),
            narration_type: None,
        });
        assert_eq!(prompt, "Chapter:\nText");
    }
}
