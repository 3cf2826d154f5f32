use crate::relay::{Relay, RelayError, RelayEvent, RelayState};
use beam_core::{PeerId, PeerRecord, SIGNAL_EVENT, SignalEnvelope, SignalPayload};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Relay traffic after addressing and self-filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayInput {
    Joined(PeerRecord),
    Left(PeerId),
    Snapshot(Vec<PeerRecord>),
    Signal { from: PeerId, signal: SignalPayload },
    StateChanged(RelayState),
    /// Emitted once when the relay goes away: liveness of every peer is unknown.
    AllPeersLeft,
}

/// Wraps the external relay for one local identity.
pub struct RelayAdapter {
    relay: Arc<dyn Relay>,
    local: PeerId,
    state: RelayState,
}

impl RelayAdapter {
    pub fn new(relay: Arc<dyn Relay>, local: PeerId) -> Self {
        Self {
            relay,
            local,
            state: RelayState::Connecting,
        }
    }

    pub fn connection_state(&self) -> RelayState {
        self.state
    }

    pub async fn enter(&mut self, member: PeerRecord) -> Result<(), RelayError> {
        self.relay.enter(member).await
    }

    pub async fn leave(&mut self) -> Result<(), RelayError> {
        self.relay.leave().await
    }

    /// Publish `signal` addressed to `to`.
    pub async fn publish(&mut self, to: &PeerId, signal: SignalPayload) -> Result<(), RelayError> {
        if self.state == RelayState::Closed {
            return Err(RelayError::Closed);
        }

        debug!("Publishing {} to {}", signal.kind(), to);
        let envelope = SignalEnvelope::new(to.clone(), self.local.clone(), signal);
        self.relay.publish(SIGNAL_EVENT, envelope).await
    }

    /// Translate one relay event into what the session should act on.
    /// Envelopes addressed to other peers never get past this point.
    pub fn ingest(&mut self, event: RelayEvent) -> Vec<RelayInput> {
        match event {
            RelayEvent::State(state) => self.transition(state),

            _ if self.state == RelayState::Closed => {
                debug!("Ignoring relay event while closed");
                Vec::new()
            }

            RelayEvent::Envelope(envelope) => {
                if envelope.to != self.local {
                    return Vec::new();
                }
                if envelope.from == self.local {
                    warn!("Dropping envelope addressed from self");
                    return Vec::new();
                }
                vec![RelayInput::Signal {
                    from: envelope.from,
                    signal: envelope.signal,
                }]
            }

            RelayEvent::Joined(record) if record.identity == self.local => Vec::new(),
            RelayEvent::Joined(record) => vec![RelayInput::Joined(record)],

            RelayEvent::Left(identity) if identity == self.local => Vec::new(),
            RelayEvent::Left(identity) => vec![RelayInput::Left(identity)],

            RelayEvent::Snapshot(members) => {
                let members = members
                    .into_iter()
                    .filter(|m| m.identity != self.local)
                    .collect();
                vec![RelayInput::Snapshot(members)]
            }
        }
    }

    /// Treat the relay as gone after a failed publish or subscribe.
    pub fn fail(&mut self) -> Vec<RelayInput> {
        self.transition(RelayState::Closed)
    }

    fn transition(&mut self, state: RelayState) -> Vec<RelayInput> {
        if state == self.state {
            return Vec::new();
        }

        info!("Relay state {:?} -> {:?}", self.state, state);
        self.state = state;

        match state {
            RelayState::Closed => vec![RelayInput::StateChanged(state), RelayInput::AllPeersLeft],
            _ => vec![RelayInput::StateChanged(state)],
        }
    }
}
