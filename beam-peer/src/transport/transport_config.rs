use crate::config::PeerConfig;
use beam_core::IceServerConfig;

/// Settings for the WebRTC transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub ice_servers: Vec<IceServerConfig>,
    pub buffered_amount_high: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::from(&PeerConfig::default())
    }
}

impl From<&PeerConfig> for TransportConfig {
    fn from(config: &PeerConfig) -> Self {
        Self {
            ice_servers: config.ice_servers.clone(),
            buffered_amount_high: config.buffered_amount_high,
        }
    }
}
