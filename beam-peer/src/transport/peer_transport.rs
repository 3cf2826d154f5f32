use crate::transport::TransportEvent;
use anyhow::Result;
use async_trait::async_trait;
use beam_core::{IceCandidate, PeerId, SessionDescription};
use bytes::Bytes;
use std::fmt;
use tokio::sync::mpsc;

/// Identifies one connection attempt to a peer. A later attempt to the same
/// peer gets a new generation so late events from a closed transport can be
/// told apart from the live one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Link {
    pub peer: PeerId,
    pub generation: u64,
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.peer, self.generation)
    }
}

/// One message received on the sub-channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMessage {
    pub is_text: bool,
    pub data: Bytes,
}

impl ChannelMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            is_text: true,
            data: Bytes::from(text.into()),
        }
    }

    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self {
            is_text: false,
            data: data.into(),
        }
    }
}

/// Send capability over an open, ordered, reliable sub-channel.
#[async_trait]
pub trait ChannelSink: Send + Sync {
    fn label(&self) -> &str;

    /// Resolves once `len` more bytes may be submitted without growing the
    /// outbound buffer past its limit. Fails if the channel closes first.
    async fn ready_for(&self, len: usize) -> Result<()>;

    async fn send_text(&self, text: &str) -> Result<()>;

    async fn send_binary(&self, data: Bytes) -> Result<()>;

    /// Largest binary message the far end can read, if the transport caps it.
    fn max_message_size(&self) -> Option<usize> {
        None
    }

    /// Resolves once everything submitted so far has left the outbound buffer.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Offer/answer + candidate-exchange connection with an attached sub-channel.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Initiator only: create the named sub-channel before the offer.
    async fn open_channel(&self, label: &str) -> Result<()>;

    /// Create an offer and apply it as the local description.
    async fn create_offer(&self) -> Result<SessionDescription>;

    /// Create an answer and apply it as the local description.
    async fn create_answer(&self) -> Result<SessionDescription>;

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Creates transports. Every event of the new transport is reported on
/// `events`, tagged with `link`.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn connect(
        &self,
        link: Link,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Box<dyn PeerTransport>>;
}
