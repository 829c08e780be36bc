//! Pipeline tuning loaded from environment variables.

use std::time::Duration;

use storyreel_core::dependencies::DEFAULT_MIN_NARRATION_IMAGES;
use storyreel_core::polling::PollPolicy;

const DEFAULT_MAX_CONCURRENT_PROVIDER_CALLS: usize = 4;
const DEFAULT_VIDEO_POLL_INITIAL_MS: u64 = 2_000;
const DEFAULT_VIDEO_POLL_MAX_MS: u64 = 15_000;
const DEFAULT_VIDEO_POLL_MULTIPLIER: f64 = 1.5;
const DEFAULT_VIDEO_JOB_TIMEOUT_SECS: u64 = 900;
const DEFAULT_PRESIGN_TTL_SECS: u64 = 3_600;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Upper bound on in-flight provider calls across every stage.
    pub max_concurrent_provider_calls: usize,
    /// Back-off and deadline for asynchronous video jobs.
    pub video_poll: PollPolicy,
    /// Lifetime of presigned URLs handed to providers and clients.
    pub presign_ttl: Duration,
    /// Storage key of the closing clip appended to final videos.
    pub outro_storage_key: Option<String>,
    /// Completed images a narration video needs.
    pub min_narration_images: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_provider_calls: DEFAULT_MAX_CONCURRENT_PROVIDER_CALLS,
            video_poll: PollPolicy {
                initial_delay: Duration::from_millis(DEFAULT_VIDEO_POLL_INITIAL_MS),
                max_delay: Duration::from_millis(DEFAULT_VIDEO_POLL_MAX_MS),
                multiplier: DEFAULT_VIDEO_POLL_MULTIPLIER,
                timeout: Duration::from_secs(DEFAULT_VIDEO_JOB_TIMEOUT_SECS),
            },
            presign_ttl: Duration::from_secs(DEFAULT_PRESIGN_TTL_SECS),
            outro_storage_key: None,
            min_narration_images: DEFAULT_MIN_NARRATION_IMAGES,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                          | Default |
    /// |----------------------------------|---------|
    /// | `MAX_CONCURRENT_PROVIDER_CALLS`  | `4`     |
    /// | `VIDEO_POLL_INITIAL_MS`          | `2000`  |
    /// | `VIDEO_POLL_MAX_MS`              | `15000` |
    /// | `VIDEO_POLL_MULTIPLIER`          | `1.5`   |
    /// | `VIDEO_JOB_TIMEOUT_SECS`         | `900`   |
    /// | `PRESIGN_TTL_SECS`               | `3600`  |
    /// | `OUTRO_STORAGE_KEY`              | none    |
    /// | `MIN_NARRATION_IMAGES`           | `2`     |
    ///
    /// Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        fn parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
            std::env::var(name)
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        }

        let multiplier: f64 = parsed("VIDEO_POLL_MULTIPLIER", DEFAULT_VIDEO_POLL_MULTIPLIER);
        Self {
            max_concurrent_provider_calls: parsed(
                "MAX_CONCURRENT_PROVIDER_CALLS",
                DEFAULT_MAX_CONCURRENT_PROVIDER_CALLS,
            )
            .max(1),
            video_poll: PollPolicy {
                initial_delay: Duration::from_millis(
                    parsed("VIDEO_POLL_INITIAL_MS", DEFAULT_VIDEO_POLL_INITIAL_MS).max(1),
                ),
                max_delay: Duration::from_millis(parsed(
                    "VIDEO_POLL_MAX_MS",
                    DEFAULT_VIDEO_POLL_MAX_MS,
                )),
                multiplier: if multiplier >= 1.0 {
                    multiplier
                } else {
                    DEFAULT_VIDEO_POLL_MULTIPLIER
                },
                timeout: Duration::from_secs(parsed(
                    "VIDEO_JOB_TIMEOUT_SECS",
                    DEFAULT_VIDEO_JOB_TIMEOUT_SECS,
                )),
            },
            presign_ttl: Duration::from_secs(parsed("PRESIGN_TTL_SECS", DEFAULT_PRESIGN_TTL_SECS)),
            outro_storage_key: std::env::var("OUTRO_STORAGE_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            min_narration_images: parsed("MIN_NARRATION_IMAGES", DEFAULT_MIN_NARRATION_IMAGES),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_poll_delay_is_raised() {
        std::env::set_var("VIDEO_POLL_INITIAL_MS", "0");
        let config = PipelineConfig::from_env();
        std::env::remove_var("VIDEO_POLL_INITIAL_MS");
        assert_eq!(config.video_poll.initial_delay, Duration::from_millis(1));
    }
}
