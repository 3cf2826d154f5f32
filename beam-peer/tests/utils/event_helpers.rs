use beam_core::{PeerId, SignalEnvelope};
use beam_peer::{RelayEvent, SessionEvent};
use std::time::Duration;
use tokio::sync::mpsc;

pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Wait for the first event matching `pred`, returning it together with
/// every event skipped on the way.
pub async fn wait_for_event<F>(
    events: &mut mpsc::UnboundedReceiver<SessionEvent>,
    pred: F,
) -> (SessionEvent, Vec<SessionEvent>)
where
    F: FnMut(&SessionEvent) -> bool,
{
    wait_for_event_within(events, EVENT_TIMEOUT, pred).await
}

pub async fn wait_for_event_within<F>(
    events: &mut mpsc::UnboundedReceiver<SessionEvent>,
    timeout: Duration,
    mut pred: F,
) -> (SessionEvent, Vec<SessionEvent>)
where
    F: FnMut(&SessionEvent) -> bool,
{
    let mut skipped = Vec::new();
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        let event = tokio::time::timeout_at(deadline, events.recv())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for event; saw {:?}", skipped))
            .expect("session event stream closed");

        if pred(&event) {
            return (event, skipped);
        }
        skipped.push(event);
    }
}

/// Every envelope an observer has seen on the hub so far.
pub fn envelopes_seen(tap: &mut mpsc::UnboundedReceiver<RelayEvent>) -> Vec<SignalEnvelope> {
    let mut seen = Vec::new();
    while let Ok(event) = tap.try_recv() {
        if let RelayEvent::Envelope(envelope) = event {
            seen.push(envelope);
        }
    }
    seen
}

/// Envelopes from `from` of the given signal kind.
pub fn envelopes_of_kind<'a>(
    seen: &'a [SignalEnvelope],
    from: &'a PeerId,
    kind: &'a str,
) -> impl Iterator<Item = &'a SignalEnvelope> + 'a {
    seen.iter()
        .filter(move |e| &e.from == from && e.signal.kind() == kind)
}

