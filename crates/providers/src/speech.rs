//! Text-to-speech synthesis.

use std::io::Cursor;

use async_trait::async_trait;
use serde_json::json;

use crate::http::JsonApi;
use crate::{ProviderError, ProviderResult};

/// Synthesized narration audio.
#[derive(Debug, Clone)]
pub struct SpeechClip {
    pub bytes: Vec<u8>,
    pub content_type: String,
    /// Measured playback length.
    pub duration_ms: i64,
}

#[async_trait]
pub trait SpeechProvider: Send + Sync {
    async fn synthesize(&self, text: &str) -> ProviderResult<SpeechClip>;
}

/// Measure the playback length of a WAV payload.
pub fn wav_duration_ms(bytes: &[u8]) -> ProviderResult<i64> {
    let reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| ProviderError::InvalidResponse(format!("Unreadable WAV audio: {e}")))?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Err(ProviderError::InvalidResponse(
            "WAV audio declares a zero sample rate".into(),
        ));
    }
    // `duration` counts frames, i.e. samples per channel.
    let frames = i64::from(reader.duration());
    Ok(frames * 1000 / i64::from(spec.sample_rate))
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// OpenAI-compatible `audio/speech` client. Requests WAV so the clip
/// length can be measured locally.
pub struct HttpSpeechProvider {
    api: JsonApi,
    model: String,
    voice: String,
}

impl HttpSpeechProvider {
    pub fn new(api: JsonApi, model: String, voice: String) -> Self {
        Self { api, model, voice }
    }
}

#[async_trait]
impl SpeechProvider for HttpSpeechProvider {
    async fn synthesize(&self, text: &str) -> ProviderResult<SpeechClip> {
        let body = json!({
            "model": self.model,
            "voice": self.voice,
            "input": text,
            "response_format": "wav",
        });
        let bytes = self.api.post_for_bytes("audio/speech", &body).await?;
        let duration_ms = wav_duration_ms(&bytes)?;
        if duration_ms <= 0 {
            return Err(ProviderError::InvalidResponse(
                "Speech provider returned empty audio".into(),
            ));
        }
        Ok(SpeechClip {
            bytes,
            content_type: "audio/wav".to_string(),
            duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn wav(sample_rate: u32, channels: u16, frames: u32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut buf = Vec::new();
        {
            let mut writer = hound::WavWriter::new(Cursor::new(&mut buf), spec).unwrap();
            for _ in 0..frames * u32::from(channels) {
                writer.write_sample(0i16).unwrap();
            }
            writer.finalize().unwrap();
        }
        buf
    }

    #[test]
    fn duration_of_mono_clip() {
        assert_eq!(wav_duration_ms(&wav(16_000, 1, 24_000)).unwrap(), 1500);
    }

    #[test]
    fn duration_counts_frames_not_samples() {
        assert_eq!(wav_duration_ms(&wav(22_050, 2, 22_050)).unwrap(), 1000);
    }

    #[test]
    fn garbage_is_invalid_response() {
        assert_matches!(
            wav_duration_ms(b"ID3\x04not a wav"),
            Err(ProviderError::InvalidResponse(_))
        );
    }
}
