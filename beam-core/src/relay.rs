//! Frames exchanged between a peer and the presence relay.

use crate::model::{PeerId, PeerRecord, SignalEnvelope};
use serde::{Deserialize, Serialize};

/// Channel event name that carries [`SignalEnvelope`]s.
pub const SIGNAL_EVENT: &str = "signal";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "d", rename_all = "snake_case")]
pub enum RelayFrame {
    /// Client announces itself to presence.
    Enter { member: PeerRecord },
    /// Client publishes an envelope on the channel.
    Publish {
        event: String,
        envelope: SignalEnvelope,
    },
    /// Members already present when the client entered.
    Snapshot { members: Vec<PeerRecord> },
    Join { member: PeerRecord },
    Leave { identity: PeerId },
    /// An envelope published by any member, delivered to every member.
    Message {
        event: String,
        envelope: SignalEnvelope,
    },
}
