use beam_core::{PeerId, PeerRecord};
use std::collections::HashMap;
use tracing::debug;

/// Result of applying a join notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceChange {
    Joined(PeerRecord),
    /// Repeat join (reconnect) carrying different metadata.
    Updated(PeerRecord),
    /// Repeat join with identical metadata.
    Unchanged,
}

/// What a presence snapshot changed relative to the directory.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SnapshotDiff {
    pub joined: Vec<PeerRecord>,
    pub updated: Vec<PeerRecord>,
    pub left: Vec<PeerRecord>,
}

/// The live set of online peers, keyed by identity.
#[derive(Debug, Default)]
pub struct PresenceDirectory {
    peers: HashMap<PeerId, PeerRecord>,
}

impl PresenceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent upsert.
    pub fn on_peer_joined(&mut self, record: PeerRecord) -> PresenceChange {
        match self.peers.insert(record.identity.clone(), record.clone()) {
            None => {
                debug!("Peer {} joined as '{}'", record.identity, record.display_name);
                PresenceChange::Joined(record)
            }
            Some(previous) if previous == record => PresenceChange::Unchanged,
            Some(_) => PresenceChange::Updated(record),
        }
    }

    pub fn on_peer_left(&mut self, identity: &PeerId) -> Option<PeerRecord> {
        let removed = self.peers.remove(identity);
        if removed.is_some() {
            debug!("Peer {} left", identity);
        }
        removed
    }

    /// Reconciles the directory with a full member list from the relay.
    /// Members absent from the snapshot are treated as having left.
    pub fn apply_snapshot(&mut self, members: Vec<PeerRecord>) -> SnapshotDiff {
        let mut diff = SnapshotDiff::default();

        let present: Vec<PeerId> = members.iter().map(|m| m.identity.clone()).collect();
        let stale: Vec<PeerId> = self
            .peers
            .keys()
            .filter(|id| !present.contains(id))
            .cloned()
            .collect();
        for id in stale {
            if let Some(record) = self.peers.remove(&id) {
                diff.left.push(record);
            }
        }

        for member in members {
            match self.on_peer_joined(member) {
                PresenceChange::Joined(r) => diff.joined.push(r),
                PresenceChange::Updated(r) => diff.updated.push(r),
                PresenceChange::Unchanged => {}
            }
        }

        diff
    }

    /// Drops every peer, returning the removed records.
    pub fn clear(&mut self) -> Vec<PeerRecord> {
        let mut removed: Vec<PeerRecord> = self.peers.drain().map(|(_, r)| r).collect();
        removed.sort_by(|a, b| a.identity.cmp(&b.identity));
        removed
    }

    /// Snapshot of online peers, ordered by identity.
    pub fn list(&self) -> Vec<PeerRecord> {
        let mut peers: Vec<PeerRecord> = self.peers.values().cloned().collect();
        peers.sort_by(|a, b| a.identity.cmp(&b.identity));
        peers
    }

    pub fn get(&self, identity: &PeerId) -> Option<&PeerRecord> {
        self.peers.get(identity)
    }

    pub fn contains(&self, identity: &PeerId) -> bool {
        self.peers.contains_key(identity)
    }

    /// Display name for notifications; falls back to the raw identity.
    pub fn display_name(&self, identity: &PeerId) -> String {
        self.peers
            .get(identity)
            .map(|r| r.display_name.clone())
            .unwrap_or_else(|| identity.to_string())
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
