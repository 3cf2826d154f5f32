use crate::transport::{ChannelMessage, ChannelSink, Link};
use beam_core::IceCandidate;
use std::fmt;
use std::sync::Arc;

/// Events a transport reports back to the session loop.
pub enum TransportEvent {
    /// Local candidate gathered; must be signaled to the peer.
    CandidateGenerated(Link, IceCandidate),

    /// The sub-channel is open. The sink is the only handle the codec gets.
    ChannelOpen(Link, Arc<dyn ChannelSink>),

    Message(Link, ChannelMessage),

    /// Failed, closed or disconnected.
    Disconnected(Link),
}

impl TransportEvent {
    pub fn link(&self) -> &Link {
        match self {
            TransportEvent::CandidateGenerated(link, _)
            | TransportEvent::ChannelOpen(link, _)
            | TransportEvent::Message(link, _)
            | TransportEvent::Disconnected(link) => link,
        }
    }
}

impl fmt::Debug for TransportEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportEvent::CandidateGenerated(link, c) => f
                .debug_tuple("CandidateGenerated")
                .field(link)
                .field(&c.candidate)
                .finish(),
            TransportEvent::ChannelOpen(link, sink) => f
                .debug_tuple("ChannelOpen")
                .field(link)
                .field(&sink.label())
                .finish(),
            TransportEvent::Message(link, msg) => f
                .debug_tuple("Message")
                .field(link)
                .field(&msg.data.len())
                .finish(),
            TransportEvent::Disconnected(link) => {
                f.debug_tuple("Disconnected").field(link).finish()
            }
        }
    }
}
