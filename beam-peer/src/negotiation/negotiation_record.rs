use crate::store::FileHandle;
use beam_core::{FileOffer, PeerId};
use std::fmt;
use tokio::task::AbortHandle;

/// Distinguishes successive offers to or from the same peer.
pub type OfferId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    OfferSent,
    Accepted,
    Declined,
    Expired,
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NegotiationState::OfferSent => "offer-sent",
            NegotiationState::Accepted => "accepted",
            NegotiationState::Declined => "declined",
            NegotiationState::Expired => "expired",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outbound,
    Inbound,
}

/// Fired when an offer's timer runs out. Stale ids are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expiry {
    pub direction: Direction,
    pub peer: PeerId,
    pub id: OfferId,
}

/// Aborts the timer task when dropped.
#[derive(Debug)]
pub(crate) struct ExpiryTimer(AbortHandle);

impl ExpiryTimer {
    pub(crate) fn new(handle: AbortHandle) -> Self {
        Self(handle)
    }
}

impl Drop for ExpiryTimer {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// An offer this peer made.
#[derive(Debug)]
pub struct NegotiationRecord {
    pub id: OfferId,
    pub target: PeerId,
    pub file: FileHandle,
    pub state: NegotiationState,
    pub(crate) timer: Option<ExpiryTimer>,
}

impl NegotiationRecord {
    pub fn is_pending(&self) -> bool {
        self.state == NegotiationState::OfferSent
    }
}

/// An offer another peer made to us, awaiting or past the local decision.
#[derive(Debug)]
pub struct InboundOffer {
    pub id: OfferId,
    pub from: PeerId,
    pub offer: FileOffer,
    pub accepted: bool,
    pub(crate) timer: Option<ExpiryTimer>,
}
