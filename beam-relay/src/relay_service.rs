use beam_core::{PeerId, PeerRecord, RelayFrame, SignalEnvelope};
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// One WebSocket connection to the relay.
pub type ConnectionId = u64;

struct Member {
    record: Option<PeerRecord>,
    tx: mpsc::UnboundedSender<RelayFrame>,
}

struct RelayInner {
    members: DashMap<ConnectionId, Member>,
    next_id: AtomicU64,
}

/// Presence and fan-out state shared by every connection.
#[derive(Clone)]
pub struct RelayService {
    inner: Arc<RelayInner>,
}

impl Default for RelayService {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayService {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RelayInner {
                members: DashMap::new(),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register a connection. It receives nothing until it enters presence.
    pub fn connect(&self, tx: mpsc::UnboundedSender<RelayFrame>) -> ConnectionId {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.members.insert(id, Member { record: None, tx });
        debug!("Connection {} opened", id);
        id
    }

    pub fn identity_of(&self, conn: ConnectionId) -> Option<PeerId> {
        self.inner
            .members
            .get(&conn)
            .and_then(|m| m.record.as_ref().map(|r| r.identity.clone()))
    }

    /// Enter presence: send the snapshot of everyone else to `conn`, then
    /// announce `member` to them. Entering again updates the record.
    pub fn enter(&self, conn: ConnectionId, member: PeerRecord) {
        // an older connection with the same identity is replaced
        let stale: Vec<ConnectionId> = self
            .inner
            .members
            .iter()
            .filter(|m| *m.key() != conn)
            .filter(|m| m.record.as_ref().is_some_and(|r| r.identity == member.identity))
            .map(|m| *m.key())
            .collect();
        for id in stale {
            info!("Connection {} replaces {} for {}", conn, id, member.identity);
            self.inner.members.remove(&id);
        }

        let snapshot: Vec<PeerRecord> = self
            .inner
            .members
            .iter()
            .filter(|m| *m.key() != conn)
            .filter_map(|m| m.record.clone())
            .collect();

        {
            let Some(mut entry) = self.inner.members.get_mut(&conn) else {
                warn!("Enter on unknown connection {}", conn);
                return;
            };
            entry.record = Some(member.clone());
            let _ = entry.tx.send(RelayFrame::Snapshot { members: snapshot });
        }

        info!("{} ({}) entered presence", member.identity, member.display_name);
        self.send_to_others(conn, RelayFrame::Join { member });
    }

    /// Fan `envelope` out to every member, in the order publishes arrive.
    pub fn publish(&self, conn: ConnectionId, event: String, envelope: SignalEnvelope) {
        let Some(identity) = self.identity_of(conn) else {
            warn!("Connection {} published before entering presence", conn);
            return;
        };
        if envelope.from != identity {
            warn!(
                "Dropping envelope from {} claiming to be {}",
                identity, envelope.from
            );
            return;
        }

        debug!("{} -> {} ({})", envelope.from, envelope.to, envelope.signal.kind());
        let frame = RelayFrame::Message { event, envelope };
        for member in self.inner.members.iter() {
            if member.record.is_some() {
                let _ = member.tx.send(frame.clone());
            }
        }
    }

    /// Forget `conn`; if it was present, everyone else sees it leave.
    pub fn disconnect(&self, conn: ConnectionId) {
        let Some((_, member)) = self.inner.members.remove(&conn) else {
            return;
        };
        debug!("Connection {} closed", conn);

        if let Some(record) = member.record {
            info!("{} left presence", record.identity);
            self.send_to_others(
                conn,
                RelayFrame::Leave {
                    identity: record.identity,
                },
            );
        }
    }

    /// Everyone currently present.
    pub fn members(&self) -> Vec<PeerRecord> {
        let mut members: Vec<PeerRecord> = self
            .inner
            .members
            .iter()
            .filter_map(|m| m.record.clone())
            .collect();
        members.sort_by(|a, b| a.identity.cmp(&b.identity));
        members
    }

    fn send_to_others(&self, conn: ConnectionId, frame: RelayFrame) {
        for member in self.inner.members.iter() {
            if *member.key() != conn && member.record.is_some() {
                let _ = member.tx.send(frame.clone());
            }
        }
    }
}
