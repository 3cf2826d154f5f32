use crate::negotiation::{
    Direction, Expiry, ExpiryTimer, InboundOffer, NegotiationRecord, NegotiationState, OfferId,
};
use crate::store::FileHandle;
use beam_core::{FileOffer, PeerId};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NegotiationError {
    #[error("no offer outstanding to {0}")]
    NoOfferTo(PeerId),

    #[error("offer to {peer} is {state}, not awaiting a reply")]
    NotAwaiting {
        peer: PeerId,
        state: NegotiationState,
    },

    #[error("a transfer to {0} is already in progress")]
    InProgress(PeerId),

    #[error("no offer outstanding from {0}")]
    NoOfferFrom(PeerId),

    #[error("offer from {0} was already accepted")]
    AlreadyAnswered(PeerId),
}

/// Offer/accept/decline state machine, both directions.
///
/// Outbound records live from `initiate` until declined, expired, cancelled
/// or completed. Inbound offers live until the local decision, or, once
/// accepted, until the transfer from that peer ends.
pub struct Negotiator {
    timeout: Duration,
    expiry_tx: mpsc::UnboundedSender<Expiry>,
    outbound: HashMap<PeerId, NegotiationRecord>,
    inbound: HashMap<PeerId, InboundOffer>,
    next_id: OfferId,
}

impl Negotiator {
    pub fn new(timeout: Duration, expiry_tx: mpsc::UnboundedSender<Expiry>) -> Self {
        Self {
            timeout,
            expiry_tx,
            outbound: HashMap::new(),
            inbound: HashMap::new(),
            next_id: 0,
        }
    }

    fn start_timer(&mut self, direction: Direction, peer: &PeerId) -> (OfferId, ExpiryTimer) {
        self.next_id += 1;
        let expiry = Expiry {
            direction,
            peer: peer.clone(),
            id: self.next_id,
        };
        let tx = self.expiry_tx.clone();
        let timeout = self.timeout;
        let task = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = tx.send(expiry);
        });
        (self.next_id, ExpiryTimer::new(task.abort_handle()))
    }

    /// `Idle → OfferSent`. A still-pending earlier offer to the same target is
    /// replaced and returned.
    pub fn initiate(
        &mut self,
        target: &PeerId,
        file: FileHandle,
    ) -> Result<(OfferId, Option<NegotiationRecord>), NegotiationError> {
        if let Some(existing) = self.outbound.get(target) {
            if existing.state == NegotiationState::Accepted {
                return Err(NegotiationError::InProgress(target.clone()));
            }
        }

        let (id, timer) = self.start_timer(Direction::Outbound, target);
        let record = NegotiationRecord {
            id,
            target: target.clone(),
            file,
            state: NegotiationState::OfferSent,
            timer: Some(timer),
        };
        info!("Offer #{} of '{}' sent to {}", id, record.file.name, target);
        let replaced = self.outbound.insert(target.clone(), record);
        Ok((id, replaced))
    }

    fn awaiting_reply(&mut self, peer: &PeerId) -> Result<&mut NegotiationRecord, NegotiationError> {
        let record = self
            .outbound
            .get_mut(peer)
            .ok_or_else(|| NegotiationError::NoOfferTo(peer.clone()))?;
        if record.state != NegotiationState::OfferSent {
            return Err(NegotiationError::NotAwaiting {
                peer: peer.clone(),
                state: record.state,
            });
        }
        Ok(record)
    }

    /// `OfferSent → Accepted`. Returns the file to send.
    pub fn on_accept(&mut self, from: &PeerId) -> Result<FileHandle, NegotiationError> {
        let record = self.awaiting_reply(from)?;
        record.state = NegotiationState::Accepted;
        record.timer = None;
        info!("Offer #{} accepted by {}", record.id, from);
        Ok(record.file.clone())
    }

    /// `OfferSent → Declined`. The record is destroyed.
    pub fn on_decline(&mut self, from: &PeerId) -> Result<NegotiationRecord, NegotiationError> {
        self.awaiting_reply(from)?;
        let mut record = self
            .outbound
            .remove(from)
            .ok_or_else(|| NegotiationError::NoOfferTo(from.clone()))?;
        record.state = NegotiationState::Declined;
        record.timer = None;
        info!("Offer #{} declined by {}", record.id, from);
        Ok(record)
    }

    /// `OfferSent → Expired`, if `id` is still the pending offer to `peer`.
    pub fn expire_outbound(&mut self, peer: &PeerId, id: OfferId) -> Option<NegotiationRecord> {
        let pending = self
            .outbound
            .get(peer)
            .is_some_and(|r| r.id == id && r.is_pending());
        if !pending {
            debug!("Ignoring stale expiry #{} for {}", id, peer);
            return None;
        }

        let mut record = self.outbound.remove(peer)?;
        record.state = NegotiationState::Expired;
        record.timer = None;
        info!("Offer #{} to {} expired", id, peer);
        Some(record)
    }

    /// Abandon the offer to `target` in whatever state it is.
    pub fn cancel(&mut self, target: &PeerId) -> Option<NegotiationRecord> {
        let record = self.outbound.remove(target)?;
        info!("Offer #{} to {} cancelled ({})", record.id, target, record.state);
        Some(record)
    }

    /// Drop an accepted record once its transport is gone.
    pub fn complete(&mut self, target: &PeerId) -> Option<NegotiationRecord> {
        match self.outbound.get(target) {
            Some(r) if r.state == NegotiationState::Accepted => self.outbound.remove(target),
            _ => None,
        }
    }

    pub fn outbound(&self, target: &PeerId) -> Option<&NegotiationRecord> {
        self.outbound.get(target)
    }

    pub fn state(&self, target: &PeerId) -> Option<NegotiationState> {
        self.outbound.get(target).map(|r| r.state)
    }

    /// Record an incoming offer. A previous offer from the same sender is
    /// superseded and returned.
    pub fn on_offer(&mut self, from: &PeerId, offer: FileOffer) -> (OfferId, Option<InboundOffer>) {
        let (id, timer) = self.start_timer(Direction::Inbound, from);
        info!(
            "Offer #{} from {}: '{}' ({} bytes)",
            id, from, offer.file_name, offer.file_size
        );
        let superseded = self.inbound.insert(
            from.clone(),
            InboundOffer {
                id,
                from: from.clone(),
                offer,
                accepted: false,
                timer: Some(timer),
            },
        );
        (id, superseded)
    }

    /// Apply the local decision on the offer from `from`. A declined offer is
    /// forgotten; an accepted one stays until [`finish_inbound`](Self::finish_inbound).
    pub fn resolve(&mut self, from: &PeerId, accept: bool) -> Result<FileOffer, NegotiationError> {
        let inbound = self
            .inbound
            .get_mut(from)
            .ok_or_else(|| NegotiationError::NoOfferFrom(from.clone()))?;
        if inbound.accepted {
            return Err(NegotiationError::AlreadyAnswered(from.clone()));
        }

        if accept {
            inbound.accepted = true;
            inbound.timer = None;
            return Ok(inbound.offer.clone());
        }

        self.inbound
            .remove(from)
            .map(|i| i.offer)
            .ok_or_else(|| NegotiationError::NoOfferFrom(from.clone()))
    }

    /// Withdraw an unanswered inbound offer whose timer fired.
    pub fn expire_inbound(&mut self, from: &PeerId, id: OfferId) -> Option<InboundOffer> {
        let pending = self
            .inbound
            .get(from)
            .is_some_and(|i| i.id == id && !i.accepted);
        if !pending {
            return None;
        }
        info!("Offer #{} from {} expired unanswered", id, from);
        self.inbound.remove(from)
    }

    pub fn inbound(&self, from: &PeerId) -> Option<&InboundOffer> {
        self.inbound.get(from)
    }

    pub fn is_accepted_inbound(&self, from: &PeerId) -> bool {
        self.inbound.get(from).is_some_and(|i| i.accepted)
    }

    pub fn finish_inbound(&mut self, from: &PeerId) -> Option<InboundOffer> {
        self.inbound.remove(from)
    }

    /// Drop everything involving `peer`.
    pub fn forget(&mut self, peer: &PeerId) -> (Option<NegotiationRecord>, Option<InboundOffer>) {
        (self.outbound.remove(peer), self.inbound.remove(peer))
    }

    pub fn clear(&mut self) -> (Vec<NegotiationRecord>, Vec<InboundOffer>) {
        (
            self.outbound.drain().map(|(_, r)| r).collect(),
            self.inbound.drain().map(|(_, i)| i).collect(),
        )
    }
}
