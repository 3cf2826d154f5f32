use anyhow::{Result, bail};
use async_trait::async_trait;
use beam_peer::{
    ChannelMessage, ChannelSink, Link, PeerId, PeerTransport, TransportEvent, TransportFactory,
};
use beam_core::{IceCandidate, SdpKind, SessionDescription};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, mpsc};

/// Transport calls as seen by the mock, per local peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    OpenChannel(String),
    CreateOffer,
    CreateAnswer,
    SetRemote(SdpKind),
    AddCandidate(String),
    Close,
}

#[derive(Default)]
struct EndState {
    label: Option<String>,
    local_set: bool,
    remote_set: bool,
    open: bool,
    closed: bool,
    binary_sent: usize,
    /// Open notification held back until the first message arrives.
    deferred_open: Option<Arc<MockSink>>,
}

/// One side of a mock connection.
struct MockEnd {
    local: PeerId,
    link: Link,
    events: mpsc::Sender<TransportEvent>,
    state: Mutex<EndState>,
}

impl MockEnd {
    fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }
}

#[derive(Default)]
struct NetworkState {
    /// Keyed by (local, remote).
    ends: HashMap<(PeerId, PeerId), Arc<MockEnd>>,
    calls: Vec<(PeerId, MockCall)>,
    pause_after: Option<usize>,
    wedged: bool,
    open_late: bool,
}

/// Connects the mock transports of every peer in a test. Two ends open their
/// sub-channel once both have a local and a remote description.
#[derive(Clone, Default)]
pub struct MockNetwork {
    state: Arc<Mutex<NetworkState>>,
    release: Arc<Notify>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn factory(&self, local: impl Into<PeerId>) -> MockFactory {
        MockFactory {
            local: local.into(),
            network: self.clone(),
        }
    }

    /// Stall every sender after it has sent `chunks` binary messages.
    pub fn pause_after(&self, chunks: usize) {
        self.state.lock().unwrap().pause_after = Some(chunks);
    }

    /// Like [`pause_after`](Self::pause_after), but the sender never wakes up,
    /// not even when the sub-channel closes.
    pub fn wedge_after(&self, chunks: usize) {
        let mut state = self.state.lock().unwrap();
        state.pause_after = Some(chunks);
        state.wedged = true;
    }

    /// Tell the answering side its sub-channel is open only after the first
    /// message on it has been delivered.
    pub fn open_late(&self) {
        self.state.lock().unwrap().open_late = true;
    }

    pub fn calls_of(&self, peer: &PeerId) -> Vec<MockCall> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|(p, _)| p == peer)
            .map(|(_, c)| c.clone())
            .collect()
    }

    fn record(&self, peer: &PeerId, call: MockCall) {
        self.state.lock().unwrap().calls.push((peer.clone(), call));
    }

    fn peer_end(&self, end: &MockEnd) -> Option<Arc<MockEnd>> {
        self.state
            .lock()
            .unwrap()
            .ends
            .get(&(end.link.peer.clone(), end.local.clone()))
            .cloned()
    }

    async fn try_open(&self, end: &Arc<MockEnd>) {
        let Some(other) = self.peer_end(end) else {
            return;
        };

        let label = {
            let mut a = end.state.lock().unwrap();
            let mut b = other.state.lock().unwrap();
            let ready = a.local_set && a.remote_set && b.local_set && b.remote_set;
            if !ready || a.open || b.open || a.closed || b.closed {
                return;
            }
            a.open = true;
            b.open = true;
            a.label
                .clone()
                .or_else(|| b.label.clone())
                .unwrap_or_else(|| "file-transfer".to_owned())
        };

        let open_late = self.state.lock().unwrap().open_late;
        for (from, to) in [(end.clone(), other.clone()), (other, end.clone())] {
            let sink = Arc::new(MockSink {
                label: label.clone(),
                from: from.clone(),
                to,
                network: self.clone(),
            });
            {
                let mut state = from.state.lock().unwrap();
                if open_late && state.label.is_none() {
                    state.deferred_open = Some(sink);
                    continue;
                }
            }
            let _ = from
                .events
                .send(TransportEvent::ChannelOpen(from.link.clone(), sink))
                .await;
        }
    }
}

pub struct MockFactory {
    local: PeerId,
    network: MockNetwork,
}

#[async_trait]
impl TransportFactory for MockFactory {
    async fn connect(
        &self,
        link: Link,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Box<dyn PeerTransport>> {
        let end = Arc::new(MockEnd {
            local: self.local.clone(),
            link: link.clone(),
            events,
            state: Mutex::new(EndState::default()),
        });
        self.network
            .state
            .lock()
            .unwrap()
            .ends
            .insert((self.local.clone(), link.peer), end.clone());

        Ok(Box::new(MockTransport {
            end,
            network: self.network.clone(),
        }))
    }
}

pub struct MockTransport {
    end: Arc<MockEnd>,
    network: MockNetwork,
}

impl MockTransport {
    async fn local_description_ready(&self) {
        self.end.state.lock().unwrap().local_set = true;

        let candidate = IceCandidate {
            candidate: format!("candidate:{} 1 udp 2130706431 127.0.0.1 9 typ host", self.end.local),
            sdp_mid: Some("0".to_owned()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        };
        let _ = self
            .end
            .events
            .send(TransportEvent::CandidateGenerated(
                self.end.link.clone(),
                candidate,
            ))
            .await;

        self.network.try_open(&self.end).await;
    }
}

#[async_trait]
impl PeerTransport for MockTransport {
    async fn open_channel(&self, label: &str) -> Result<()> {
        self.network
            .record(&self.end.local, MockCall::OpenChannel(label.to_owned()));
        self.end.state.lock().unwrap().label = Some(label.to_owned());
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        self.network.record(&self.end.local, MockCall::CreateOffer);
        self.local_description_ready().await;
        Ok(SessionDescription::offer(format!(
            "v=0 mock offer from {}",
            self.end.local
        )))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        self.network.record(&self.end.local, MockCall::CreateAnswer);
        self.local_description_ready().await;
        Ok(SessionDescription::answer(format!(
            "v=0 mock answer from {}",
            self.end.local
        )))
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        self.network
            .record(&self.end.local, MockCall::SetRemote(desc.kind));
        self.end.state.lock().unwrap().remote_set = true;
        self.network.try_open(&self.end).await;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        if !self.end.state.lock().unwrap().remote_set {
            bail!("candidate added before remote description");
        }
        self.network
            .record(&self.end.local, MockCall::AddCandidate(candidate.candidate));
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.network.record(&self.end.local, MockCall::Close);
        {
            let mut state = self.end.state.lock().unwrap();
            if state.closed {
                return Ok(());
            }
            state.closed = true;
        }

        {
            let mut network = self.network.state.lock().unwrap();
            let key = (self.end.local.clone(), self.end.link.peer.clone());
            if network
                .ends
                .get(&key)
                .is_some_and(|e| Arc::ptr_eq(e, &self.end))
            {
                network.ends.remove(&key);
            }
        }

        if let Some(other) = self.network.peer_end(&self.end) {
            if !other.is_closed() {
                let _ = other
                    .events
                    .send(TransportEvent::Disconnected(other.link.clone()))
                    .await;
            }
        }
        self.network.release.notify_waiters();
        Ok(())
    }
}

/// Delivers sub-channel messages straight into the other end's event stream.
pub struct MockSink {
    label: String,
    from: Arc<MockEnd>,
    to: Arc<MockEnd>,
    network: MockNetwork,
}

impl MockSink {
    fn ensure_open(&self) -> Result<()> {
        if self.from.is_closed() || self.to.is_closed() {
            bail!("sub-channel closed");
        }
        Ok(())
    }

    fn paused(&self) -> bool {
        let limit = self.network.state.lock().unwrap().pause_after;
        limit.is_some_and(|n| self.from.state.lock().unwrap().binary_sent >= n)
    }

    fn wedged(&self) -> bool {
        self.network.state.lock().unwrap().wedged
    }

    async fn deliver(&self, message: ChannelMessage) -> Result<()> {
        self.ensure_open()?;
        self.to
            .events
            .send(TransportEvent::Message(self.to.link.clone(), message))
            .await?;

        let deferred = self.to.state.lock().unwrap().deferred_open.take();
        if let Some(sink) = deferred {
            self.to
                .events
                .send(TransportEvent::ChannelOpen(self.to.link.clone(), sink))
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelSink for MockSink {
    fn label(&self) -> &str {
        &self.label
    }

    async fn ready_for(&self, _len: usize) -> Result<()> {
        loop {
            self.ensure_open()?;
            let released = self.network.release.notified();
            if !self.paused() {
                return Ok(());
            }
            if self.wedged() {
                std::future::pending::<()>().await;
            }
            released.await;
        }
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        self.deliver(ChannelMessage::text(text)).await
    }

    async fn send_binary(&self, data: Bytes) -> Result<()> {
        self.deliver(ChannelMessage::binary(data)).await?;
        self.from.state.lock().unwrap().binary_sent += 1;
        Ok(())
    }
}
