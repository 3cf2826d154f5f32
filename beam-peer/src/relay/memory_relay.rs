use crate::relay::{Relay, RelayError, RelayEvent, RelayState};
use async_trait::async_trait;
use beam_core::{PeerId, PeerRecord, SignalEnvelope};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

struct Member {
    record: Option<PeerRecord>,
    tx: mpsc::UnboundedSender<RelayEvent>,
}

/// In-process relay: presence plus fan-out of every published envelope to
/// every member. Each member's events travel on its own FIFO channel, so
/// per-sender order is preserved.
#[derive(Clone, Default)]
pub struct MemoryHub {
    members: Arc<DashMap<PeerId, Member>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `identity` to the hub. It becomes visible to others on `enter`.
    pub fn connect(
        &self,
        identity: impl Into<PeerId>,
    ) -> (MemoryRelay, mpsc::UnboundedReceiver<RelayEvent>) {
        let identity = identity.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(RelayEvent::State(RelayState::Open));

        self.members
            .insert(identity.clone(), Member { record: None, tx });

        let relay = MemoryRelay {
            hub: self.clone(),
            identity,
        };
        (relay, rx)
    }

    /// Members that have entered presence.
    pub fn members(&self) -> Vec<PeerRecord> {
        let mut members: Vec<PeerRecord> = self
            .members
            .iter()
            .filter_map(|m| m.value().record.clone())
            .collect();
        members.sort_by(|a, b| a.identity.cmp(&b.identity));
        members
    }

    /// Simulate the relay dropping one member: it sees its connection close,
    /// everyone else sees it leave.
    pub fn drop_member(&self, identity: &PeerId) {
        let Some((_, member)) = self.members.remove(identity) else {
            return;
        };
        info!("Hub dropping member {}", identity);
        let _ = member.tx.send(RelayEvent::State(RelayState::Closed));
        if member.record.is_some() {
            self.broadcast(RelayEvent::Left(identity.clone()));
        }
    }

    fn enter(&self, identity: &PeerId, record: PeerRecord) -> Result<(), RelayError> {
        let snapshot: Vec<PeerRecord> = self
            .members
            .iter()
            .filter(|m| m.key() != identity)
            .filter_map(|m| m.value().record.clone())
            .collect();

        {
            let mut member = self.members.get_mut(identity).ok_or(RelayError::Closed)?;
            member.record = Some(record.clone());
            let _ = member.tx.send(RelayEvent::Snapshot(snapshot));
        }

        for entry in self.members.iter() {
            if entry.key() != identity && entry.value().record.is_some() {
                let _ = entry.value().tx.send(RelayEvent::Joined(record.clone()));
            }
        }
        Ok(())
    }

    fn publish(&self, identity: &PeerId, envelope: SignalEnvelope) -> Result<(), RelayError> {
        if !self.members.contains_key(identity) {
            return Err(RelayError::Closed);
        }
        debug!("Hub fan-out {} -> {}", envelope.from, envelope.to);
        self.broadcast(RelayEvent::Envelope(envelope));
        Ok(())
    }

    fn leave(&self, identity: &PeerId) {
        if let Some((_, member)) = self.members.remove(identity) {
            if member.record.is_some() {
                self.broadcast(RelayEvent::Left(identity.clone()));
            }
        }
    }

    fn broadcast(&self, event: RelayEvent) {
        for entry in self.members.iter() {
            if entry.value().record.is_some() {
                let _ = entry.value().tx.send(event.clone());
            }
        }
    }
}

/// One member's handle onto a [`MemoryHub`].
#[derive(Clone)]
pub struct MemoryRelay {
    hub: MemoryHub,
    identity: PeerId,
}

#[async_trait]
impl Relay for MemoryRelay {
    async fn enter(&self, member: PeerRecord) -> Result<(), RelayError> {
        self.hub.enter(&self.identity, member)
    }

    async fn publish(&self, _event: &str, envelope: SignalEnvelope) -> Result<(), RelayError> {
        self.hub.publish(&self.identity, envelope)
    }

    async fn leave(&self) -> Result<(), RelayError> {
        self.hub.leave(&self.identity);
        Ok(())
    }
}
