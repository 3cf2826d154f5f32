use crate::codec::ProtocolViolation;
use crate::negotiation::Direction;
use crate::relay::RelayState;
use beam_core::{FileHeader, FileOffer, PeerId, PeerRecord};
use std::fmt;

/// Why a transfer or pending offer ended without completing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    PeerLeft,
    RelayUnavailable,
    /// The direct transport failed or closed mid-transfer.
    TransportClosed,
    Protocol(ProtocolViolation),
    Store(String),
    Transport(String),
    Cancelled,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::PeerLeft => f.write_str("peer left"),
            FailureReason::RelayUnavailable => f.write_str("relay unavailable"),
            FailureReason::TransportClosed => f.write_str("connection closed"),
            FailureReason::Protocol(v) => write!(f, "protocol violation: {v}"),
            FailureReason::Store(e) => write!(f, "storage error: {e}"),
            FailureReason::Transport(e) => write!(f, "transport error: {e}"),
            FailureReason::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Notifications for the user interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    RelayState(RelayState),
    PeerJoined(PeerRecord),
    PeerUpdated(PeerRecord),
    PeerLeft(PeerRecord),

    /// Someone wants to send us a file; answer with accept or decline.
    IncomingOffer { from: PeerId, offer: FileOffer },
    /// A prompt for an earlier offer should be dismissed (superseded or expired).
    IncomingOfferWithdrawn { from: PeerId, offer: FileOffer },

    OfferDeclined {
        peer: PeerId,
        display_name: String,
        file_name: String,
    },
    OfferExpired { peer: PeerId, file_name: String },

    TransferStarted {
        peer: PeerId,
        direction: Direction,
        file_name: String,
        size: u64,
    },
    Progress {
        peer: PeerId,
        direction: Direction,
        transferred: u64,
        total: u64,
    },
    FileSent {
        to: PeerId,
        file_name: String,
        size: u64,
    },
    FileReceived {
        from: PeerId,
        header: FileHeader,
        location: String,
    },
    TransferFailed { peer: PeerId, reason: FailureReason },
}
