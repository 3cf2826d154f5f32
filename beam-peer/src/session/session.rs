use crate::codec::{ReceiveOutcome, Reassembler, send_file};
use crate::config::PeerConfig;
use crate::negotiation::{Direction, Expiry, NegotiationState, Negotiator, OfferId};
use crate::presence::{PresenceChange, PresenceDirectory};
use crate::relay::{Relay, RelayAdapter, RelayError, RelayEvent, RelayInput, RelayState};
use crate::session::{FailureReason, SessionCommand, SessionError, SessionEvent, SessionHandle};
use crate::store::{FileHandle, ObjectStore};
use crate::transport::{
    ChannelMessage, ChannelSink, ClosedConnection, Link, Role, TransportEvent, TransportFactory,
    TransportManager,
};
use beam_core::{
    FileOffer, OfferSender, PeerId, PeerRecord, SdpKind, SessionDescription, SignalPayload,
};
use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// How long a send task may keep running after its transport went down.
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

/// How long the sender waits for the receiver to close after the last chunk
/// left the outbound buffer.
const RECEIVER_CLOSE_GRACE: Duration = Duration::from_secs(10);

/// How a send task ended.
#[derive(Debug)]
enum SendOutcome {
    Sent(u64),
    StoreFailed(String),
    TransportFailed(String),
}

/// Reports from send tasks back into the loop.
#[derive(Debug)]
enum SendReport {
    Progress { link: Link, sent: u64, total: u64 },
    Finished { link: Link, outcome: SendOutcome },
    /// A grace period on `link` ran out.
    Overdue { link: Link },
}

/// The peer's event loop.
///
/// Owns the presence directory, relay adapter, negotiator, transport manager
/// and all in-progress reassembly. Every relay message, transport callback,
/// timer and user command is handled here one at a time, so none of that
/// state is shared.
pub struct Session {
    local: PeerRecord,
    config: PeerConfig,
    directory: PresenceDirectory,
    adapter: RelayAdapter,
    relay_rx: mpsc::UnboundedReceiver<RelayEvent>,
    negotiator: Negotiator,
    expiry_rx: mpsc::UnboundedReceiver<Expiry>,
    transports: TransportManager,
    transport_rx: mpsc::Receiver<TransportEvent>,
    receivers: HashMap<PeerId, Reassembler>,
    send_tx: mpsc::UnboundedSender<SendReport>,
    send_rx: mpsc::UnboundedReceiver<SendReport>,
    store: Arc<dyn ObjectStore>,
    command_rx: mpsc::Receiver<SessionCommand>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl Session {
    pub fn new(
        local: PeerRecord,
        config: PeerConfig,
        relay: Arc<dyn Relay>,
        relay_rx: mpsc::UnboundedReceiver<RelayEvent>,
        factory: Arc<dyn TransportFactory>,
        store: Arc<dyn ObjectStore>,
    ) -> (Self, SessionHandle, mpsc::UnboundedReceiver<SessionEvent>) {
        let (command_tx, command_rx) = mpsc::channel(100);
        let (transport_tx, transport_rx) = mpsc::channel(256);
        let (expiry_tx, expiry_rx) = mpsc::unbounded_channel();
        let (send_tx, send_rx) = mpsc::unbounded_channel();
        let (events, events_rx) = mpsc::unbounded_channel();

        let session = Self {
            adapter: RelayAdapter::new(relay, local.identity.clone()),
            negotiator: Negotiator::new(config.offer_timeout(), expiry_tx),
            transports: TransportManager::new(
                factory,
                transport_tx,
                config.channel_label.clone(),
                config.max_early_candidates,
            ),
            local,
            config,
            directory: PresenceDirectory::new(),
            relay_rx,
            expiry_rx,
            transport_rx,
            receivers: HashMap::new(),
            send_tx,
            send_rx,
            store,
            command_rx,
            events,
        };

        (session, SessionHandle::new(command_tx), events_rx)
    }

    pub fn local(&self) -> &PeerRecord {
        &self.local
    }

    /// Enter presence and process events until shut down or every handle is dropped.
    pub async fn run(mut self) {
        info!(
            "Session for {} ({}) started",
            self.local.identity, self.local.display_name
        );

        if let Err(e) = self.adapter.enter(self.local.clone()).await {
            error!("Failed to enter presence: {}", e);
            self.relay_failed().await;
        }

        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(c) => {
                            if self.handle_command(c).await.is_break() {
                                break;
                            }
                        }
                        None => {
                            info!("All session handles dropped. Shutting down.");
                            self.shutdown().await;
                            break;
                        }
                    }
                }

                Some(evt) = self.relay_rx.recv() => {
                    let inputs = self.adapter.ingest(evt);
                    self.handle_relay_inputs(inputs).await;
                }

                Some(evt) = self.transport_rx.recv() => {
                    self.handle_transport_event(evt).await;
                }

                Some(report) = self.send_rx.recv() => {
                    self.handle_send_report(report).await;
                }

                Some(expiry) = self.expiry_rx.recv() => {
                    self.handle_expiry(expiry);
                }
            }
        }

        info!("Session for {} finished", self.local.identity);
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    async fn shutdown(&mut self) {
        self.transports.teardown_all().await;
        self.receivers.clear();
        self.negotiator.clear();
        if self.adapter.connection_state() != RelayState::Closed {
            if let Err(e) = self.adapter.leave().await {
                warn!("Failed to leave presence: {}", e);
            }
        }
    }

    // --- commands ---

    async fn handle_command(&mut self, cmd: SessionCommand) -> ControlFlow<()> {
        match cmd {
            SessionCommand::Initiate {
                target,
                file,
                reply,
            } => {
                let _ = reply.send(self.initiate(target, file).await);
            }

            SessionCommand::Accept { from, reply } => {
                let _ = reply.send(self.answer_offer(from, true).await);
            }

            SessionCommand::Decline { from, reply } => {
                let result = self.answer_offer(from, false).await.map(|_| ());
                let _ = reply.send(result);
            }

            SessionCommand::Cancel { target, reply } => {
                let _ = reply.send(Ok(self.cancel(&target).await));
            }

            SessionCommand::Peers { reply } => {
                let _ = reply.send(Ok(self.directory.list()));
            }

            SessionCommand::Shutdown { reply } => {
                self.shutdown().await;
                let _ = reply.send(Ok(()));
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    async fn initiate(&mut self, target: PeerId, file: FileHandle) -> Result<OfferId, SessionError> {
        if !self.directory.contains(&target) {
            return Err(SessionError::UnknownPeer(target));
        }
        if self.transports.contains(&target) {
            return Err(SessionError::TransferInProgress(target));
        }

        let offer = FileOffer {
            file_name: file.name.clone(),
            file_size: file.size,
            from_user: OfferSender {
                display_name: self.local.display_name.clone(),
                uid: self.local.identity.clone(),
            },
        };

        let (id, replaced) = self.negotiator.initiate(&target, file)?;
        if let Some(old) = replaced {
            debug!("Offer #{} to {} replaced by #{}", old.id, target, id);
        }

        if let Err(e) = self
            .adapter
            .publish(&target, SignalPayload::FileOffer(offer))
            .await
        {
            self.negotiator.cancel(&target);
            self.publish_failed(&e).await;
            return Err(e.into());
        }
        Ok(id)
    }

    async fn answer_offer(&mut self, from: PeerId, accept: bool) -> Result<FileOffer, SessionError> {
        let offer = self.negotiator.resolve(&from, accept)?;
        let signal = if accept {
            info!("Accepted '{}' from {}", offer.file_name, from);
            SignalPayload::FileAccept
        } else {
            info!("Declined '{}' from {}", offer.file_name, from);
            SignalPayload::FileDecline
        };

        if let Err(e) = self.adapter.publish(&from, signal).await {
            self.publish_failed(&e).await;
            return Err(e.into());
        }
        Ok(offer)
    }

    async fn cancel(&mut self, target: &PeerId) -> bool {
        let record = self.negotiator.cancel(target);
        let inbound = if self.negotiator.is_accepted_inbound(target) {
            self.negotiator.finish_inbound(target)
        } else {
            None
        };
        self.receivers.remove(target);
        let closed = self.transports.teardown(target).await;

        let cancelled = record.is_some() || inbound.is_some() || closed.is_some();
        if cancelled {
            self.emit(SessionEvent::TransferFailed {
                peer: target.clone(),
                reason: FailureReason::Cancelled,
            });
        }
        cancelled
    }

    // --- relay ---

    async fn handle_relay_inputs(&mut self, inputs: Vec<RelayInput>) {
        for input in inputs {
            match input {
                RelayInput::StateChanged(state) => self.emit(SessionEvent::RelayState(state)),

                RelayInput::Joined(record) => match self.directory.on_peer_joined(record.clone()) {
                    PresenceChange::Joined(r) => self.emit(SessionEvent::PeerJoined(r)),
                    PresenceChange::Updated(r) => self.emit(SessionEvent::PeerUpdated(r)),
                    PresenceChange::Unchanged => {}
                },

                RelayInput::Left(identity) => {
                    if let Some(record) = self.directory.on_peer_left(&identity) {
                        self.emit(SessionEvent::PeerLeft(record));
                    }
                    self.forget_peer(&identity, FailureReason::PeerLeft).await;
                }

                RelayInput::Snapshot(members) => {
                    let diff = self.directory.apply_snapshot(members);
                    for record in diff.joined {
                        self.emit(SessionEvent::PeerJoined(record));
                    }
                    for record in diff.updated {
                        self.emit(SessionEvent::PeerUpdated(record));
                    }
                    for record in diff.left {
                        let identity = record.identity.clone();
                        self.emit(SessionEvent::PeerLeft(record));
                        self.forget_peer(&identity, FailureReason::PeerLeft).await;
                    }
                }

                RelayInput::Signal { from, signal } => self.handle_signal(from, signal).await,

                RelayInput::AllPeersLeft => self.all_peers_left().await,
            }
        }
    }

    async fn publish_failed(&mut self, e: &RelayError) {
        error!("Relay publish failed: {}", e);
        self.relay_failed().await;
    }

    async fn relay_failed(&mut self) {
        for input in self.adapter.fail() {
            match input {
                RelayInput::StateChanged(state) => self.emit(SessionEvent::RelayState(state)),
                RelayInput::AllPeersLeft => self.all_peers_left().await,
                _ => {}
            }
        }
    }

    /// The relay is gone: nothing in flight can be trusted to finish.
    async fn all_peers_left(&mut self) {
        warn!("Relay unavailable; dropping all peers, offers and connections");

        for record in self.directory.clear() {
            self.emit(SessionEvent::PeerLeft(record));
        }

        let mut failed: Vec<PeerId> = Vec::new();
        let mut sent: HashMap<PeerId, u64> = HashMap::new();
        for closed in self.transports.teardown_all().await {
            match Self::cleanly_sent(&closed) {
                Some(size) => {
                    sent.insert(closed.link.peer, size);
                }
                None => failed.push(closed.link.peer),
            }
        }
        self.receivers.clear();

        let (outbound, inbound) = self.negotiator.clear();
        for record in outbound {
            if let Some(size) = sent.remove(&record.target) {
                self.report_sent(record.target, record.file.name, size);
            } else if record.state == NegotiationState::OfferSent
                && !failed.contains(&record.target)
            {
                failed.push(record.target);
            }
        }
        for offer in inbound {
            if !offer.accepted {
                self.emit(SessionEvent::IncomingOfferWithdrawn {
                    from: offer.from,
                    offer: offer.offer,
                });
            }
        }

        failed.sort();
        for peer in failed {
            self.emit(SessionEvent::TransferFailed {
                peer,
                reason: FailureReason::RelayUnavailable,
            });
        }
    }

    /// Drop all negotiation and transport state for a departed peer.
    async fn forget_peer(&mut self, peer: &PeerId, reason: FailureReason) {
        let closed = self.transports.teardown(peer).await;
        let partial = self.receivers.remove(peer);
        if partial.as_ref().is_some_and(|r| r.in_progress()) {
            info!("Discarding partial transfer from {}", peer);
        }

        let (outbound, inbound) = self.negotiator.forget(peer);

        let failed = match closed.as_ref().map(Self::cleanly_sent) {
            Some(Some(size)) => {
                let file_name = outbound.map(|r| r.file.name).unwrap_or_default();
                self.report_sent(peer.clone(), file_name, size);
                false
            }
            Some(None) => true,
            None => outbound.as_ref().is_some_and(|r| r.is_pending()),
        };
        if failed {
            self.emit(SessionEvent::TransferFailed {
                peer: peer.clone(),
                reason,
            });
        }

        if let Some(offer) = inbound.filter(|i| !i.accepted) {
            self.emit(SessionEvent::IncomingOfferWithdrawn {
                from: offer.from,
                offer: offer.offer,
            });
        }
    }

    /// Bytes sent over a connection the sending side finished with.
    fn cleanly_sent(closed: &ClosedConnection) -> Option<u64> {
        match closed.role {
            Role::Initiator => closed.sent,
            Role::Responder => None,
        }
    }

    fn report_sent(&self, to: PeerId, file_name: String, size: u64) {
        info!("Sent '{}' ({} bytes) to {}", file_name, size, to);
        self.emit(SessionEvent::FileSent {
            to,
            file_name,
            size,
        });
    }

    /// Tear down a finished send and report it.
    async fn complete_send(&mut self, peer: &PeerId) {
        let Some(closed) = self.transports.teardown(peer).await else {
            return;
        };
        let file_name = self
            .negotiator
            .complete(peer)
            .map(|r| r.file.name)
            .unwrap_or_default();
        if let Some(size) = Self::cleanly_sent(&closed) {
            self.report_sent(peer.clone(), file_name, size);
        }
    }

    fn schedule_overdue(&self, link: &Link, after: Duration) {
        let reports = self.send_tx.clone();
        let link = link.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = reports.send(SendReport::Overdue { link });
        });
    }

    // --- signals ---

    async fn handle_signal(&mut self, from: PeerId, signal: SignalPayload) {
        debug!("Received {} from {}", signal.kind(), from);

        match signal {
            SignalPayload::FileOffer(offer) => self.on_file_offer(from, offer).await,

            SignalPayload::FileAccept => {
                let file = match self.negotiator.on_accept(&from) {
                    Ok(file) => file,
                    Err(e) => {
                        warn!("Ignoring accept from {}: {}", from, e);
                        return;
                    }
                };
                self.start_connection(from, file).await;
            }

            SignalPayload::FileDecline => match self.negotiator.on_decline(&from) {
                Ok(record) => {
                    let display_name = self.directory.display_name(&from);
                    info!("{} declined '{}'", display_name, record.file.name);
                    self.emit(SessionEvent::OfferDeclined {
                        peer: from,
                        display_name,
                        file_name: record.file.name,
                    });
                }
                Err(e) => warn!("Ignoring decline from {}: {}", from, e),
            },

            SignalPayload::SessionDescription(desc) => self.on_description(from, desc).await,

            SignalPayload::ConnectivityCandidate(candidate) => {
                if !self.expects_transport_from(&from) {
                    warn!("Dropping candidate from {}: no accepted transfer", from);
                    return;
                }
                let disposition = self.transports.add_remote_candidate(&from, candidate).await;
                debug!("Candidate from {}: {:?}", from, disposition);
            }
        }
    }

    async fn on_file_offer(&mut self, from: PeerId, offer: FileOffer) {
        if offer.from_user.uid != from {
            warn!(
                "Offer from {} names sender {}; using the envelope sender",
                from, offer.from_user.uid
            );
        }

        let (_, superseded) = self.negotiator.on_offer(&from, offer.clone());
        if let Some(old) = superseded {
            if old.accepted {
                self.receivers.remove(&from);
                if self.transports.teardown(&from).await.is_some() {
                    self.emit(SessionEvent::TransferFailed {
                        peer: from.clone(),
                        reason: FailureReason::Cancelled,
                    });
                }
            } else {
                self.emit(SessionEvent::IncomingOfferWithdrawn {
                    from: from.clone(),
                    offer: old.offer,
                });
            }
        }

        self.emit(SessionEvent::IncomingOffer { from, offer });
    }

    /// Whether `from` may open or feed a transport to us.
    fn expects_transport_from(&self, from: &PeerId) -> bool {
        self.transports.contains(from)
            || self.negotiator.is_accepted_inbound(from)
            || self.negotiator.state(from) == Some(NegotiationState::Accepted)
    }

    /// We received `FileAccept`, so we create the connection offer.
    async fn start_connection(&mut self, peer: PeerId, file: FileHandle) {
        let offer = match self.transports.start_initiator(&peer, file).await {
            Ok(offer) => offer,
            Err(e) => {
                error!("Failed to start connection to {}: {}", peer, e);
                self.negotiator.complete(&peer);
                self.emit(SessionEvent::TransferFailed {
                    peer,
                    reason: FailureReason::Transport(e.to_string()),
                });
                return;
            }
        };

        if let Err(e) = self
            .adapter
            .publish(&peer, SignalPayload::SessionDescription(offer))
            .await
        {
            self.publish_failed(&e).await;
        }
    }

    async fn on_description(&mut self, from: PeerId, desc: SessionDescription) {
        match desc.kind {
            SdpKind::Offer if !self.negotiator.is_accepted_inbound(&from) => {
                warn!("Dropping connection offer from {}: no accepted file offer", from);
                return;
            }
            SdpKind::Offer if self.negotiator.state(&from) == Some(NegotiationState::Accepted) => {
                warn!("Ignoring connection offer from {}: already initiating", from);
                return;
            }
            _ => {}
        }

        match self.transports.apply_remote_description(&from, desc).await {
            Ok(Some(answer)) => {
                if let Err(e) = self
                    .adapter
                    .publish(&from, SignalPayload::SessionDescription(answer))
                    .await
                {
                    self.publish_failed(&e).await;
                }
            }
            Ok(None) => self.maybe_start_sending(&from),
            Err(e) if e.is_fatal() => {
                error!("Connection setup with {} failed: {}", from, e);
                self.fail_transfer(&from, FailureReason::Transport(e.to_string()))
                    .await;
            }
            Err(e) => warn!("Ignoring description from {}: {}", from, e),
        }
    }

    // --- transport ---

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        if !self.transports.is_current(event.link()) {
            debug!("Ignoring event from stale link: {:?}", event);
            return;
        }

        match event {
            TransportEvent::CandidateGenerated(link, candidate) => {
                if let Err(e) = self
                    .adapter
                    .publish(&link.peer, SignalPayload::ConnectivityCandidate(candidate))
                    .await
                {
                    self.publish_failed(&e).await;
                }
            }

            TransportEvent::ChannelOpen(link, sink) => self.on_channel_open(link, sink),

            TransportEvent::Message(link, message) => self.on_channel_message(link, message).await,

            TransportEvent::Disconnected(link) => {
                info!("Transport {} disconnected", link);
                if self.transports.send_in_flight(&link.peer) {
                    // the last chunks may already be with the receiver
                    debug!("Waiting for the send task on {} to report", link);
                    self.transports.mark_disconnected(&link);
                    self.schedule_overdue(&link, DISCONNECT_GRACE);
                    return;
                }
                let peer = link.peer.clone();
                let Some(closed) = self.transports.teardown_link(&link).await else {
                    return;
                };
                let record = self.negotiator.complete(&peer);

                // the receiver closes once it has everything
                if let Some(size) = Self::cleanly_sent(&closed) {
                    let file_name = record.map(|r| r.file.name).unwrap_or_default();
                    self.report_sent(peer, file_name, size);
                    return;
                }
                if closed.role == Role::Responder {
                    if self.receivers.remove(&peer).is_some_and(|r| r.in_progress()) {
                        warn!("Transfer from {} interrupted; discarding partial data", peer);
                    }
                    self.negotiator.finish_inbound(&peer);
                }
                self.emit(SessionEvent::TransferFailed {
                    peer,
                    reason: FailureReason::TransportClosed,
                });
            }
        }
    }

    fn on_channel_open(&mut self, link: Link, sink: Arc<dyn ChannelSink>) {
        match self.transports.channel_open(&link, sink) {
            Some(Role::Initiator) => self.maybe_start_sending(&link.peer),
            Some(Role::Responder) => {
                // the header may have arrived before the open notification
                self.receivers
                    .entry(link.peer)
                    .or_insert_with(Reassembler::new);
            }
            None => {}
        }
    }

    /// Spawn the send task once the initiator's channel is usable.
    fn maybe_start_sending(&mut self, peer: &PeerId) {
        let Some((file, sink)) = self.transports.take_sender(peer) else {
            return;
        };
        let Some(link) = self.transports.entry(peer).map(|e| e.link().clone()) else {
            return;
        };

        self.emit(SessionEvent::TransferStarted {
            peer: peer.clone(),
            direction: Direction::Outbound,
            file_name: file.name.clone(),
            size: file.size,
        });

        let store = self.store.clone();
        let reports = self.send_tx.clone();
        let chunk_size = self.config.chunk_size;
        let task = tokio::spawn(async move {
            let outcome = run_send(store, sink, file, chunk_size, &link, &reports).await;
            let _ = reports.send(SendReport::Finished { link, outcome });
        });
        self.transports.attach_send_task(peer, task);
    }

    async fn on_channel_message(&mut self, link: Link, message: ChannelMessage) {
        let peer = link.peer;
        if !self.receivers.contains_key(&peer) {
            if self.transports.entry(&peer).map(|e| e.role()) != Some(Role::Responder) {
                warn!("Dropping sub-channel message from {}: not receiving", peer);
                return;
            }
            self.receivers.insert(peer.clone(), Reassembler::new());
        }
        let Some(reassembler) = self.receivers.get_mut(&peer) else {
            return;
        };

        match reassembler.push(message) {
            Ok(ReceiveOutcome::Started(header)) => {
                self.emit(SessionEvent::TransferStarted {
                    peer,
                    direction: Direction::Inbound,
                    file_name: header.name,
                    size: header.size,
                });
            }

            Ok(ReceiveOutcome::Progress { received, total }) => {
                self.emit(SessionEvent::Progress {
                    peer,
                    direction: Direction::Inbound,
                    transferred: received,
                    total,
                });
            }

            Ok(ReceiveOutcome::Completed(file)) => {
                info!(
                    "Received '{}' ({} bytes) from {}",
                    file.header.name, file.header.size, peer
                );
                self.receivers.remove(&peer);
                self.negotiator.finish_inbound(&peer);
                self.transports.teardown(&peer).await;

                match self.store.persist(&peer, &file).await {
                    Ok(location) => self.emit(SessionEvent::FileReceived {
                        from: peer,
                        header: file.header,
                        location,
                    }),
                    Err(e) => {
                        error!("Failed to save '{}' from {}: {}", file.header.name, peer, e);
                        self.emit(SessionEvent::TransferFailed {
                            peer,
                            reason: FailureReason::Store(e.to_string()),
                        });
                    }
                }
            }

            Err(violation) => {
                error!("Protocol violation from {}: {}", peer, violation);
                self.fail_transfer(&peer, FailureReason::Protocol(violation))
                    .await;
            }
        }
    }

    async fn fail_transfer(&mut self, peer: &PeerId, reason: FailureReason) {
        self.transports.teardown(peer).await;
        self.receivers.remove(peer);
        self.negotiator.complete(peer);
        self.negotiator.finish_inbound(peer);
        self.emit(SessionEvent::TransferFailed {
            peer: peer.clone(),
            reason,
        });
    }

    // --- internal ---

    async fn handle_send_report(&mut self, report: SendReport) {
        match report {
            SendReport::Progress { link, sent, total } => {
                if self.transports.is_current(&link) {
                    self.emit(SessionEvent::Progress {
                        peer: link.peer,
                        direction: Direction::Outbound,
                        transferred: sent,
                        total,
                    });
                }
            }

            SendReport::Finished { link, outcome } => {
                if !self.transports.is_current(&link) {
                    return;
                }
                let peer = link.peer.clone();
                let disconnected = self
                    .transports
                    .entry(&peer)
                    .is_some_and(|e| e.is_disconnected());

                match outcome {
                    SendOutcome::Sent(size) => {
                        self.transports.mark_sent(&peer, size);
                        if disconnected {
                            self.complete_send(&peer).await;
                        } else {
                            debug!("All of {} flushed; waiting for {} to close", size, peer);
                            self.schedule_overdue(&link, RECEIVER_CLOSE_GRACE);
                        }
                    }
                    SendOutcome::StoreFailed(e) => {
                        self.fail_transfer(&peer, FailureReason::Store(e)).await;
                    }
                    SendOutcome::TransportFailed(_) if disconnected => {
                        self.fail_transfer(&peer, FailureReason::TransportClosed)
                            .await;
                    }
                    SendOutcome::TransportFailed(e) => {
                        self.fail_transfer(&peer, FailureReason::Transport(e)).await;
                    }
                }
            }

            SendReport::Overdue { link } => {
                if !self.transports.is_current(&link) {
                    return;
                }
                let peer = link.peer;
                if self.transports.send_in_flight(&peer) {
                    warn!("Send task on {} did not finish after disconnect", peer);
                    self.fail_transfer(&peer, FailureReason::TransportClosed)
                        .await;
                } else if self.transports.entry(&peer).and_then(|e| e.sent()).is_some() {
                    warn!("{} never closed after receiving everything", peer);
                    self.complete_send(&peer).await;
                }
            }
        }
    }

    fn handle_expiry(&mut self, expiry: Expiry) {
        match expiry.direction {
            Direction::Outbound => {
                if let Some(record) = self.negotiator.expire_outbound(&expiry.peer, expiry.id) {
                    self.emit(SessionEvent::OfferExpired {
                        peer: expiry.peer,
                        file_name: record.file.name,
                    });
                }
            }
            Direction::Inbound => {
                if let Some(inbound) = self.negotiator.expire_inbound(&expiry.peer, expiry.id) {
                    self.emit(SessionEvent::IncomingOfferWithdrawn {
                        from: inbound.from,
                        offer: inbound.offer,
                    });
                }
            }
        }
    }
}

async fn run_send(
    store: Arc<dyn ObjectStore>,
    sink: Arc<dyn ChannelSink>,
    file: FileHandle,
    chunk_size: usize,
    link: &Link,
    reports: &mpsc::UnboundedSender<SendReport>,
) -> SendOutcome {
    let payload = match store.fetch(&file).await {
        Ok(payload) => payload,
        Err(e) => {
            error!("Failed to read '{}': {}", file.name, e);
            return SendOutcome::StoreFailed(e.to_string());
        }
    };

    let header = file.header();
    let progress = |sent, total| {
        let _ = reports.send(SendReport::Progress {
            link: link.clone(),
            sent,
            total,
        });
    };

    match send_file(sink.as_ref(), &header, payload, chunk_size, progress).await {
        Ok(sent) => SendOutcome::Sent(sent),
        Err(e) => {
            warn!("Sending '{}' on {} failed: {:?}", file.name, link, e);
            SendOutcome::TransportFailed(format!("{e:#}"))
        }
    }
}
