use crate::relay::{Relay, RelayError, RelayEvent, RelayState};
use async_trait::async_trait;
use beam_core::{PeerRecord, RelayFrame, SIGNAL_EVENT, SignalEnvelope};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

enum Outbound {
    Frame(RelayFrame),
    Close,
}

/// Relay client for a `beam-relay` server over WebSocket.
pub struct WsRelay {
    outbound: mpsc::UnboundedSender<Outbound>,
    closed: Arc<AtomicBool>,
}

impl WsRelay {
    pub async fn connect(
        url: &str,
    ) -> Result<(Self, mpsc::UnboundedReceiver<RelayEvent>), RelayError> {
        let (socket, _) = connect_async(url)
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;
        info!("Connected to relay at {}", url);

        let (mut sender, mut receiver) = socket.split();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outbound>();
        let closed = Arc::new(AtomicBool::new(false));

        let _ = event_tx.send(RelayEvent::State(RelayState::Open));

        tokio::spawn(async move {
            while let Some(out) = out_rx.recv().await {
                let frame = match out {
                    Outbound::Frame(frame) => frame,
                    Outbound::Close => break,
                };
                let text = match serde_json::to_string(&frame) {
                    Ok(text) => text,
                    Err(e) => {
                        error!("Failed to serialize relay frame: {}", e);
                        continue;
                    }
                };
                if sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            let _ = sender.close().await;
        });

        let closed_flag = closed.clone();
        tokio::spawn(async move {
            while let Some(msg) = receiver.next().await {
                match msg {
                    Ok(Message::Text(text)) => match serde_json::from_str::<RelayFrame>(&text) {
                        Ok(frame) => {
                            let Some(event) = frame_to_event(frame) else {
                                continue;
                            };
                            if event_tx.send(event).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("Invalid relay frame: {:?}", e),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Relay socket error: {}", e);
                        break;
                    }
                }
            }

            closed_flag.store(true, Ordering::SeqCst);
            let _ = event_tx.send(RelayEvent::State(RelayState::Closed));
            info!("Relay connection closed");
        });

        Ok((
            Self {
                outbound: out_tx,
                closed,
            },
            event_rx,
        ))
    }

    fn send(&self, frame: RelayFrame) -> Result<(), RelayError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RelayError::Closed);
        }
        self.outbound
            .send(Outbound::Frame(frame))
            .map_err(|_| RelayError::Closed)
    }
}

fn frame_to_event(frame: RelayFrame) -> Option<RelayEvent> {
    match frame {
        RelayFrame::Snapshot { members } => Some(RelayEvent::Snapshot(members)),
        RelayFrame::Join { member } => Some(RelayEvent::Joined(member)),
        RelayFrame::Leave { identity } => Some(RelayEvent::Left(identity)),
        RelayFrame::Message { event, envelope } if event == SIGNAL_EVENT => {
            Some(RelayEvent::Envelope(envelope))
        }
        other => {
            debug!("Ignoring relay frame {:?}", other);
            None
        }
    }
}

#[async_trait]
impl Relay for WsRelay {
    async fn enter(&self, member: PeerRecord) -> Result<(), RelayError> {
        self.send(RelayFrame::Enter { member })
    }

    async fn publish(&self, event: &str, envelope: SignalEnvelope) -> Result<(), RelayError> {
        self.send(RelayFrame::Publish {
            event: event.to_owned(),
            envelope,
        })
    }

    async fn leave(&self) -> Result<(), RelayError> {
        self.outbound
            .send(Outbound::Close)
            .map_err(|_| RelayError::Closed)
    }
}
