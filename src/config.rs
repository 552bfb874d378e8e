use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tuning knobs for a player session.
///
/// All timestamps are microseconds, the unit of every presentation timestamp
/// in the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// A video frame is due once its timestamp is at most this far ahead of the audio clock
    pub sync_tolerance_us: i64,
    /// Decode throttles while the two oldest buffered video frames are further apart than this
    pub prebuffer_threshold_us: i64,
    /// Pacing only applies once this many audio chunks are buffered
    pub pacing_min_audio_chunks: usize,
    /// Name given to the background decode thread
    pub decode_thread_name: String,
    /// Name given to the audio sink writer thread
    pub writer_thread_name: String,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            sync_tolerance_us: 1_000,
            prebuffer_threshold_us: 10_000,
            pacing_min_audio_chunks: 2,
            decode_thread_name: "mediasync-decode".to_string(),
            writer_thread_name: "mediasync-audio".to_string(),
        }
    }
}

impl PlayerConfig {
    /// Load overrides from a JSON file; absent fields keep their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading player config {}", path.display()))?;
        Self::from_json_str(&raw).with_context(|| format!("parsing player config {}", path.display()))
    }

    pub fn from_json_str(raw: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.sync_tolerance_us < 0 {
            bail!("sync_tolerance_us must not be negative (got {})", self.sync_tolerance_us);
        }
        if self.prebuffer_threshold_us < 0 {
            bail!(
                "prebuffer_threshold_us must not be negative (got {})",
                self.prebuffer_threshold_us
            );
        }
        Ok(())
    }
}

/// Returns a version as specified in Cargo.toml
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub fn app_name() -> &'static str {
    env!("CARGO_PKG_NAME")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PlayerConfig::default();
        assert_eq!(config.sync_tolerance_us, 1_000);
        assert_eq!(config.prebuffer_threshold_us, 10_000);
        assert!(config.validate().is_ok());
        assert_eq!(config.pacing_min_audio_chunks, 2);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = PlayerConfig::from_json_str(r#"{ "sync_tolerance_us": 5000 }"#).unwrap();
        assert_eq!(config.sync_tolerance_us, 5_000);
        assert_eq!(config.prebuffer_threshold_us, 10_000);
        assert_eq!(config.writer_thread_name, "mediasync-audio");
    }

    #[test]
    fn test_rejects_negative_timings() {
        let err = PlayerConfig::from_json_str(r#"{ "prebuffer_threshold_us": -1 }"#).unwrap_err();
        assert!(err.to_string().contains("prebuffer_threshold_us"));
        assert!(PlayerConfig::from_json_str(r#"{ "sync_tolerance_us": -500 }"#).is_err());
        assert!(PlayerConfig::from_json_str(r#"{ "prebuffer_threshold_us": 0 }"#).is_ok());
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(PlayerConfig::from_json_str("{ sync_tolerance_us: }").is_err());
    }
}
