use crate::transport::{
    ChannelMessage, ChannelSink, Link, PeerTransport, TransportConfig, TransportEvent,
    TransportFactory,
};
use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use beam_core::{IceCandidate, IceServerConfig, SdpKind, SessionDescription};
use bytes::Bytes;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

const BUFFER_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A send buffer that has not shrunk for this long is treated as dead.
const STALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Largest binary message webrtc-rs reads in one piece is `u16::MAX` bytes;
/// browsers interoperate best at 16 KiB.
pub const WEBRTC_MAX_MESSAGE_SIZE: usize = 16 * 1024;

fn to_rtc_ice_server(server: &IceServerConfig) -> RTCIceServer {
    RTCIceServer {
        urls: server.urls.clone(),
        username: server.username.clone().unwrap_or_default(),
        credential: server.credential.clone().unwrap_or_default(),
    }
}

/// Queue `event` without waiting for room in the channel. Used from callbacks
/// that `RTCPeerConnection::close` waits on.
fn send_detached(events: &mpsc::Sender<TransportEvent>, event: TransportEvent) {
    match events.try_send(event) {
        Ok(()) | Err(TrySendError::Closed(_)) => {}
        Err(TrySendError::Full(event)) => {
            let events = events.clone();
            tokio::spawn(async move {
                let _ = events.send(event).await;
            });
        }
    }
}

/// Creates one [`WebRtcTransport`] per connection attempt.
#[derive(Debug, Clone, Default)]
pub struct WebRtcFactory {
    config: TransportConfig,
}

impl WebRtcFactory {
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TransportFactory for WebRtcFactory {
    async fn connect(
        &self,
        link: Link,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Box<dyn PeerTransport>> {
        let transport = WebRtcTransport::new(link, &self.config, events).await?;
        Ok(Box::new(transport))
    }
}

pub struct WebRtcTransport {
    link: Link,
    peer_connection: Arc<RTCPeerConnection>,
    events: mpsc::Sender<TransportEvent>,
    high_watermark: usize,
    /// Set once the connection reached a terminal state; sinks stop waiting.
    down: Arc<AtomicBool>,
}

impl WebRtcTransport {
    pub async fn new(
        link: Link,
        config: &TransportConfig,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Self> {
        let mut m = MediaEngine::default();
        m.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut m)?;

        let api = APIBuilder::new()
            .with_media_engine(m)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: config.ice_servers.iter().map(to_rtc_ice_server).collect(),
            ..Default::default()
        };

        let peer_connection = Arc::new(api.new_peer_connection(rtc_config).await?);
        let down = Arc::new(AtomicBool::new(false));

        let state_tx = events.clone();
        let state_link = link.clone();
        let state_down = down.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                let tx = state_tx.clone();
                let link = state_link.clone();
                let down = state_down.clone();

                Box::pin(async move {
                    info!("Peer connection state changed for {}: {:?}", link, s);
                    match s {
                        RTCPeerConnectionState::Failed
                        | RTCPeerConnectionState::Disconnected
                        | RTCPeerConnectionState::Closed => {
                            down.store(true, Ordering::SeqCst);
                            send_detached(&tx, TransportEvent::Disconnected(link));
                        }
                        _ => {}
                    }
                })
            },
        ));

        let ice_tx = events.clone();
        let ice_link = link.clone();
        peer_connection.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
            let tx = ice_tx.clone();
            let link = ice_link.clone();

            Box::pin(async move {
                let Some(candidate) = c else { return };
                let Ok(init) = candidate.to_json() else {
                    return;
                };
                let candidate = IceCandidate {
                    candidate: init.candidate,
                    sdp_mid: init.sdp_mid,
                    sdp_mline_index: init.sdp_mline_index,
                    username_fragment: init.username_fragment,
                };
                let _ = tx
                    .send(TransportEvent::CandidateGenerated(link, candidate))
                    .await;
            })
        }));

        // the responder learns about the sub-channel from the initiator
        let dc_tx = events.clone();
        let dc_link = link.clone();
        let high_watermark = config.buffered_amount_high;
        let dc_down = down.clone();
        peer_connection.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
            let tx = dc_tx.clone();
            let link = dc_link.clone();
            let down = dc_down.clone();

            Box::pin(async move {
                debug!("Remote data channel '{}' announced on {}", dc.label(), link);
                wire_channel(link, dc, tx, high_watermark, down);
            })
        }));

        Ok(Self {
            link,
            peer_connection,
            events,
            high_watermark,
            down,
        })
    }

    fn to_rtc_description(desc: SessionDescription) -> Result<RTCSessionDescription> {
        let rtc = match desc.kind {
            SdpKind::Offer => RTCSessionDescription::offer(desc.sdp)?,
            SdpKind::Answer => RTCSessionDescription::answer(desc.sdp)?,
        };
        Ok(rtc)
    }
}

fn wire_channel(
    link: Link,
    dc: Arc<RTCDataChannel>,
    events: mpsc::Sender<TransportEvent>,
    high_watermark: usize,
    down: Arc<AtomicBool>,
) {
    let open_dc = dc.clone();
    let open_tx = events.clone();
    let open_link = link.clone();
    dc.on_open(Box::new(move || {
        let tx = open_tx.clone();
        let link = open_link.clone();
        let sink = Arc::new(DataChannelSink {
            dc: open_dc.clone(),
            high_watermark,
            down: down.clone(),
        });

        Box::pin(async move {
            info!("Data channel '{}' open on {}", sink.label(), link);
            let _ = tx.send(TransportEvent::ChannelOpen(link, sink)).await;
        })
    }));

    let msg_tx = events;
    dc.on_message(Box::new(move |msg: DataChannelMessage| {
        let tx = msg_tx.clone();
        let link = link.clone();
        Box::pin(async move {
            let message = ChannelMessage {
                is_text: msg.is_string,
                data: msg.data,
            };
            let _ = tx.send(TransportEvent::Message(link, message)).await;
        })
    }));
}

#[async_trait]
impl PeerTransport for WebRtcTransport {
    async fn open_channel(&self, label: &str) -> Result<()> {
        let dc = self.peer_connection.create_data_channel(label, None).await?;
        debug!("Created data channel '{}' on {}", label, self.link);
        wire_channel(
            self.link.clone(),
            dc,
            self.events.clone(),
            self.high_watermark,
            self.down.clone(),
        );
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self.peer_connection.create_offer(None).await?;
        self.peer_connection
            .set_local_description(offer.clone())
            .await?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self.peer_connection.create_answer(None).await?;
        self.peer_connection
            .set_local_description(answer.clone())
            .await?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        let desc = Self::to_rtc_description(desc)?;
        self.peer_connection.set_remote_description(desc).await?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: candidate.username_fragment,
        };
        self.peer_connection.add_ice_candidate(init).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.down.store(true, Ordering::SeqCst);
        self.peer_connection.close().await?;
        Ok(())
    }
}

/// Sending half of an open data channel, with buffered-amount back-pressure.
pub struct DataChannelSink {
    dc: Arc<RTCDataChannel>,
    high_watermark: usize,
    down: Arc<AtomicBool>,
}

impl DataChannelSink {
    fn ensure_open(&self) -> Result<()> {
        if self.down.load(Ordering::SeqCst) {
            bail!("connection behind '{}' is down", self.dc.label());
        }
        match self.dc.ready_state() {
            RTCDataChannelState::Open => Ok(()),
            state => Err(anyhow!(
                "data channel '{}' not open: {:?}",
                self.dc.label(),
                state
            )),
        }
    }

    /// Poll the buffered amount until `done` accepts it. Fails when the
    /// connection goes down or the buffer stops draining.
    async fn wait_for_buffer<F>(&self, done: F) -> Result<()>
    where
        F: Fn(usize) -> bool + Send + Sync,
    {
        self.ensure_open()?;
        let mut buffered = self.dc.buffered_amount().await;
        if done(buffered) {
            return Ok(());
        }

        let label = self.dc.label();
        debug!(channel = %label, buffered, "Waiting for the send buffer to drain");

        let mut last_drained = Instant::now();
        loop {
            tokio::time::sleep(BUFFER_POLL_INTERVAL).await;
            self.ensure_open()?;

            let now = self.dc.buffered_amount().await;
            if done(now) {
                return Ok(());
            }
            if now < buffered {
                last_drained = Instant::now();
            } else if last_drained.elapsed() >= STALL_TIMEOUT {
                bail!(
                    "send buffer of '{}' stuck at {} bytes for {:?}",
                    label,
                    now,
                    STALL_TIMEOUT
                );
            }
            buffered = now;
        }
    }
}

#[async_trait]
impl ChannelSink for DataChannelSink {
    fn label(&self) -> &str {
        self.dc.label()
    }

    async fn ready_for(&self, len: usize) -> Result<()> {
        let high = self.high_watermark;
        // a single chunk larger than the watermark waits for an empty buffer
        self.wait_for_buffer(|buffered| buffered == 0 || buffered + len <= high)
            .await
    }

    fn max_message_size(&self) -> Option<usize> {
        Some(WEBRTC_MAX_MESSAGE_SIZE)
    }

    async fn flush(&self) -> Result<()> {
        self.wait_for_buffer(|buffered| buffered == 0).await
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        self.dc.send_text(text.to_owned()).await?;
        Ok(())
    }

    async fn send_binary(&self, data: Bytes) -> Result<()> {
        if let Err(e) = self.dc.send(&data).await {
            warn!("Send on '{}' failed: {:?}", self.dc.label(), e);
            return Err(e.into());
        }
        Ok(())
    }
}
