use beam_core::IceServerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Reference chunk size for the sub-channel: 64 KiB.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Chunks on the wire never exceed 64 KiB. Transports with a smaller
/// message limit cut chunks further when sending.
pub const MAX_CHUNK_SIZE: usize = 64 * 1024;

pub const DEFAULT_OFFER_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Tunables for a peer session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    /// Size of each binary chunk sent over the sub-channel.
    pub chunk_size: usize,
    /// How long an offer waits for accept/decline before expiring.
    pub offer_timeout_secs: u64,
    /// Label of the data sub-channel opened by the initiator.
    pub channel_label: String,
    /// The sender pauses while the sub-channel has more than this many bytes queued.
    pub buffered_amount_high: usize,
    /// Cap on candidates buffered for a peer whose connection does not exist yet.
    pub max_early_candidates: usize,
    pub ice_servers: Vec<IceServerConfig>,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            offer_timeout_secs: DEFAULT_OFFER_TIMEOUT_SECS,
            channel_label: "file-transfer".to_owned(),
            buffered_amount_high: 1024 * 1024,
            max_early_candidates: 32,
            ice_servers: vec![IceServerConfig {
                urls: vec!["stun:stun.l.google.com:19302".to_owned()],
                username: None,
                credential: None,
            }],
        }
    }
}

impl PeerConfig {
    pub fn offer_timeout(&self) -> Duration {
        Duration::from_secs(self.offer_timeout_secs)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(ConfigError::Invalid(format!(
                "chunk_size must be between 1 and {} bytes, got {}",
                MAX_CHUNK_SIZE, self.chunk_size
            )));
        }
        if self.offer_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "offer_timeout_secs must be greater than zero".to_owned(),
            ));
        }
        if self.buffered_amount_high < self.chunk_size {
            return Err(ConfigError::Invalid(format!(
                "buffered_amount_high ({}) must hold at least one chunk ({})",
                self.buffered_amount_high, self.chunk_size
            )));
        }
        if self.channel_label.is_empty() {
            return Err(ConfigError::Invalid("channel_label must not be empty".to_owned()));
        }
        Ok(())
    }
}
