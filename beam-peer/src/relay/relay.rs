use async_trait::async_trait;
use beam_core::{PeerId, PeerRecord, SignalEnvelope};
use thiserror::Error;

/// Connection state of the relay as seen by this peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Connecting,
    Open,
    Closed,
}

/// Everything a relay delivers to a subscriber.
#[derive(Debug, Clone)]
pub enum RelayEvent {
    State(RelayState),
    /// Members already present when this peer entered.
    Snapshot(Vec<PeerRecord>),
    Joined(PeerRecord),
    Left(PeerId),
    /// Published envelope, addressed to anyone.
    Envelope(SignalEnvelope),
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("relay connection is closed")]
    Closed,

    #[error("relay transport error: {0}")]
    Transport(String),

    #[error("failed to encode relay frame: {0}")]
    Encode(#[from] serde_json::Error),
}

/// External pub/sub channel with presence tracking.
///
/// Implementations deliver incoming traffic as [`RelayEvent`]s on the channel
/// returned when they were created. Delivery must preserve per-sender order.
#[async_trait]
pub trait Relay: Send + Sync {
    /// Announce this peer to presence.
    async fn enter(&self, member: PeerRecord) -> Result<(), RelayError>;

    /// Publish an envelope to every subscriber of `event`.
    async fn publish(&self, event: &str, envelope: SignalEnvelope) -> Result<(), RelayError>;

    /// Leave presence and stop receiving.
    async fn leave(&self) -> Result<(), RelayError>;
}
