//! Presence-based peer-to-peer file transfer.
//!
//! A [`Session`] drives the whole protocol from a single event loop: it
//! tracks who is online ([`PresenceDirectory`]), talks to the relay through a
//! [`RelayAdapter`], runs the offer/accept handshake ([`Negotiator`]), opens
//! direct connections ([`TransportManager`]) and streams files over them
//! ([`codec`]).

pub mod codec;
pub mod config;
pub mod negotiation;
pub mod presence;
pub mod relay;
pub mod session;
pub mod store;
pub mod transport;

pub use codec::{ProtocolViolation, ReceiveOutcome, Reassembler, ReceivedFile, send_file};
pub use config::{ConfigError, PeerConfig};
pub use negotiation::{NegotiationError, NegotiationState, Negotiator};
pub use presence::{PresenceChange, PresenceDirectory};
pub use relay::{
    MemoryHub, MemoryRelay, Relay, RelayAdapter, RelayError, RelayEvent, RelayInput, RelayState,
    WsRelay,
};
pub use session::{
    Direction, FailureReason, Session, SessionError, SessionEvent, SessionHandle,
};
pub use store::{DirectoryStore, FileHandle, MemoryStore, ObjectStore, StoreError};
pub use transport::{
    ChannelMessage, ChannelSink, Link, PeerTransport, TransportError, TransportEvent,
    TransportFactory, TransportManager, WebRtcFactory,
};

pub use beam_core::{PeerId, PeerRecord};
