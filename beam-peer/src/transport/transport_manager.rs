use crate::store::FileHandle;
use crate::transport::{ChannelSink, Link, PeerTransport, TransportEvent, TransportFactory};
use beam_core::{IceCandidate, PeerId, SdpKind, SessionDescription};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("a connection to {0} already exists")]
    AlreadyConnected(PeerId),

    #[error("no connection to {0}")]
    NoConnection(PeerId),

    #[error("unexpected {kind:?} description from {peer}")]
    UnexpectedDescription { peer: PeerId, kind: SdpKind },

    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

impl TransportError {
    /// Whether the underlying transport failed, as opposed to a stray signal.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TransportError::Transport(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Received `FileAccept`; creates the connection offer.
    Initiator,
    /// Answers the initiator's offer.
    Responder,
}

/// What happened to a remote candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateDisposition {
    Applied,
    /// Waiting in the entry's queue for the remote description.
    Queued,
    /// No entry yet; held until one is created.
    Buffered,
    Dropped,
}

/// Summary of a connection that was torn down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedConnection {
    pub link: Link,
    pub role: Role,
    /// Bytes the send task handed to the sub-channel, once it finished.
    pub sent: Option<u64>,
}

pub struct ConnectionEntry {
    link: Link,
    role: Role,
    transport: Box<dyn PeerTransport>,
    pending_candidates: VecDeque<IceCandidate>,
    local_description_set: bool,
    remote_description_set: bool,
    sink: Option<Arc<dyn ChannelSink>>,
    outgoing: Option<FileHandle>,
    send_task: Option<JoinHandle<()>>,
    sent: Option<u64>,
    disconnected: bool,
}

impl ConnectionEntry {
    fn new(link: Link, role: Role, transport: Box<dyn PeerTransport>) -> Self {
        Self {
            link,
            role,
            transport,
            pending_candidates: VecDeque::new(),
            local_description_set: false,
            remote_description_set: false,
            sink: None,
            outgoing: None,
            send_task: None,
            sent: None,
            disconnected: false,
        }
    }

    pub fn link(&self) -> &Link {
        &self.link
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn pending_candidates(&self) -> usize {
        self.pending_candidates.len()
    }

    pub fn sent(&self) -> Option<u64> {
        self.sent
    }

    /// The transport reported a terminal state but the entry is kept until
    /// its send task reports.
    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }

    async fn apply_remote(&mut self, desc: SessionDescription) -> anyhow::Result<()> {
        self.transport.set_remote_description(desc).await?;
        self.remote_description_set = true;

        // queued candidates go in strictly after the description, in arrival order
        while let Some(candidate) = self.pending_candidates.pop_front() {
            if let Err(e) = self.transport.add_ice_candidate(candidate).await {
                warn!("Failed to apply queued candidate for {}: {:?}", self.link, e);
            }
        }
        Ok(())
    }

    async fn shutdown(mut self) -> ClosedConnection {
        if let Some(task) = self.send_task.take() {
            task.abort();
        }
        self.sink = None;
        self.outgoing = None;
        self.pending_candidates.clear();

        if let Err(e) = self.transport.close().await {
            warn!("Error closing transport {}: {:?}", self.link, e);
        }

        ClosedConnection {
            link: self.link,
            role: self.role,
            sent: self.sent,
        }
    }
}

/// Owns one [`ConnectionEntry`] per remote peer with an active or pending transfer.
pub struct TransportManager {
    factory: Arc<dyn TransportFactory>,
    events: mpsc::Sender<TransportEvent>,
    channel_label: String,
    max_early_candidates: usize,
    entries: HashMap<PeerId, ConnectionEntry>,
    early_candidates: HashMap<PeerId, VecDeque<IceCandidate>>,
    next_generation: u64,
}

impl TransportManager {
    pub fn new(
        factory: Arc<dyn TransportFactory>,
        events: mpsc::Sender<TransportEvent>,
        channel_label: impl Into<String>,
        max_early_candidates: usize,
    ) -> Self {
        Self {
            factory,
            events,
            channel_label: channel_label.into(),
            max_early_candidates,
            entries: HashMap::new(),
            early_candidates: HashMap::new(),
            next_generation: 0,
        }
    }

    pub fn contains(&self, peer: &PeerId) -> bool {
        self.entries.contains_key(peer)
    }

    pub fn entry(&self, peer: &PeerId) -> Option<&ConnectionEntry> {
        self.entries.get(peer)
    }

    /// Whether `link` belongs to the live connection for its peer.
    pub fn is_current(&self, link: &Link) -> bool {
        self.entries
            .get(&link.peer)
            .is_some_and(|e| e.link == *link)
    }

    fn next_link(&mut self, peer: &PeerId) -> Link {
        self.next_generation += 1;
        Link {
            peer: peer.clone(),
            generation: self.next_generation,
        }
    }

    /// Initiating side: create the transport and its sub-channel, and return
    /// the local offer to signal to `peer`.
    pub async fn start_initiator(
        &mut self,
        peer: &PeerId,
        file: FileHandle,
    ) -> Result<SessionDescription, TransportError> {
        if self.entries.contains_key(peer) {
            return Err(TransportError::AlreadyConnected(peer.clone()));
        }

        let link = self.next_link(peer);
        info!("Opening connection {} as initiator", link);
        let transport = self.factory.connect(link.clone(), self.events.clone()).await?;
        let mut entry = ConnectionEntry::new(link, Role::Initiator, transport);

        let offer = match Self::prepare_offer(&entry, &self.channel_label).await {
            Ok(offer) => offer,
            Err(e) => {
                entry.shutdown().await;
                return Err(e.into());
            }
        };
        entry.local_description_set = true;
        entry.outgoing = Some(file);
        entry.pending_candidates = self.early_candidates.remove(peer).unwrap_or_default();

        self.entries.insert(peer.clone(), entry);
        Ok(offer)
    }

    async fn prepare_offer(
        entry: &ConnectionEntry,
        label: &str,
    ) -> anyhow::Result<SessionDescription> {
        entry.transport.open_channel(label).await?;
        entry.transport.create_offer().await
    }

    /// Apply a remote description. An offer creates the responding side and
    /// returns the local answer to signal back.
    pub async fn apply_remote_description(
        &mut self,
        peer: &PeerId,
        desc: SessionDescription,
    ) -> Result<Option<SessionDescription>, TransportError> {
        match desc.kind {
            SdpKind::Offer => {
                if self.entries.contains_key(peer) {
                    return Err(TransportError::UnexpectedDescription {
                        peer: peer.clone(),
                        kind: desc.kind,
                    });
                }

                let link = self.next_link(peer);
                info!("Opening connection {} as responder", link);
                let transport = self.factory.connect(link.clone(), self.events.clone()).await?;
                let mut entry = ConnectionEntry::new(link, Role::Responder, transport);
                entry.pending_candidates = self.early_candidates.remove(peer).unwrap_or_default();

                let answer = match Self::answer(&mut entry, desc).await {
                    Ok(answer) => answer,
                    Err(e) => {
                        entry.shutdown().await;
                        return Err(e.into());
                    }
                };

                self.entries.insert(peer.clone(), entry);
                Ok(Some(answer))
            }

            SdpKind::Answer => {
                let entry = self
                    .entries
                    .get_mut(peer)
                    .ok_or_else(|| TransportError::NoConnection(peer.clone()))?;
                if entry.role != Role::Initiator || entry.remote_description_set {
                    return Err(TransportError::UnexpectedDescription {
                        peer: peer.clone(),
                        kind: desc.kind,
                    });
                }

                entry.apply_remote(desc).await?;
                debug!("Remote answer applied for {}", entry.link);
                Ok(None)
            }
        }
    }

    async fn answer(
        entry: &mut ConnectionEntry,
        offer: SessionDescription,
    ) -> anyhow::Result<SessionDescription> {
        entry.apply_remote(offer).await?;
        let answer = entry.transport.create_answer().await?;
        entry.local_description_set = true;
        Ok(answer)
    }

    /// Apply a remote candidate now, or hold it until the remote description
    /// is in place.
    pub async fn add_remote_candidate(
        &mut self,
        peer: &PeerId,
        candidate: IceCandidate,
    ) -> CandidateDisposition {
        let Some(entry) = self.entries.get_mut(peer) else {
            let queue = self.early_candidates.entry(peer.clone()).or_default();
            if queue.len() >= self.max_early_candidates {
                warn!("Dropping early candidate from {}: buffer full", peer);
                return CandidateDisposition::Dropped;
            }
            queue.push_back(candidate);
            return CandidateDisposition::Buffered;
        };

        if !entry.remote_description_set {
            entry.pending_candidates.push_back(candidate);
            return CandidateDisposition::Queued;
        }

        match entry.transport.add_ice_candidate(candidate).await {
            Ok(()) => CandidateDisposition::Applied,
            Err(e) => {
                warn!("Failed to add candidate for {}: {:?}", entry.link, e);
                CandidateDisposition::Dropped
            }
        }
    }

    /// Record that the sub-channel of `link` opened. Returns the entry's role,
    /// or `None` for a stale link.
    pub fn channel_open(&mut self, link: &Link, sink: Arc<dyn ChannelSink>) -> Option<Role> {
        let entry = self.entries.get_mut(&link.peer)?;
        if entry.link != *link {
            return None;
        }
        info!("Sub-channel '{}' open on {}", sink.label(), link);
        entry.sink = Some(sink);
        Some(entry.role)
    }

    /// Hands out the file and sink for sending, once: only for the initiator,
    /// and only after both descriptions are set and the channel is open.
    pub fn take_sender(&mut self, peer: &PeerId) -> Option<(FileHandle, Arc<dyn ChannelSink>)> {
        let entry = self.entries.get_mut(peer)?;
        if entry.role != Role::Initiator
            || !entry.local_description_set
            || !entry.remote_description_set
            || entry.send_task.is_some()
        {
            return None;
        }
        let sink = entry.sink.clone()?;
        let file = entry.outgoing.take()?;
        Some((file, sink))
    }

    pub fn attach_send_task(&mut self, peer: &PeerId, task: JoinHandle<()>) {
        match self.entries.get_mut(peer) {
            Some(entry) => entry.send_task = Some(task),
            None => task.abort(),
        }
    }

    /// Whether a send task is attached and has not reported completion.
    pub fn send_in_flight(&self, peer: &PeerId) -> bool {
        self.entries
            .get(peer)
            .is_some_and(|e| e.send_task.is_some() && e.sent.is_none())
    }

    pub fn mark_disconnected(&mut self, link: &Link) {
        if let Some(entry) = self.entries.get_mut(&link.peer) {
            if entry.link == *link {
                entry.disconnected = true;
            }
        }
    }

    pub fn mark_sent(&mut self, peer: &PeerId, bytes: u64) {
        if let Some(entry) = self.entries.get_mut(peer) {
            entry.sent = Some(bytes);
        }
    }

    /// Close and forget the connection to `peer`, cancelling any send in flight.
    pub async fn teardown(&mut self, peer: &PeerId) -> Option<ClosedConnection> {
        self.early_candidates.remove(peer);
        let entry = self.entries.remove(peer)?;
        info!("Tearing down connection {}", entry.link);
        Some(entry.shutdown().await)
    }

    /// Like [`teardown`](Self::teardown), but only if `link` is still the live connection.
    pub async fn teardown_link(&mut self, link: &Link) -> Option<ClosedConnection> {
        if !self.is_current(link) {
            debug!("Ignoring teardown of stale link {}", link);
            return None;
        }
        self.teardown(&link.peer).await
    }

    pub async fn teardown_all(&mut self) -> Vec<ClosedConnection> {
        self.early_candidates.clear();
        let peers: Vec<PeerId> = self.entries.keys().cloned().collect();
        let mut closed = Vec::with_capacity(peers.len());
        for peer in peers {
            if let Some(c) = self.teardown(&peer).await {
                closed.push(c);
            }
        }
        closed
    }
}
