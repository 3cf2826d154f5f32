use beam_peer::{PeerId, PeerRecord, Relay, RelayEvent};
use beam_core::{SIGNAL_EVENT, SignalEnvelope, SignalPayload};

use crate::integration::{connect, init_tracing, next_matching, start_relay};

#[tokio::test]
async fn test_presence_and_envelopes_over_websocket() {
    init_tracing();
    let (addr, service) = start_relay().await;

    let (alice, mut alice_rx) = connect(addr).await;
    alice
        .enter(PeerRecord::new("alice", "Alice"))
        .await
        .expect("alice enters");
    let snapshot = next_matching(&mut alice_rx, |e| matches!(e, RelayEvent::Snapshot(_))).await;
    assert!(matches!(snapshot, RelayEvent::Snapshot(members) if members.is_empty()));

    let (bob, mut bob_rx) = connect(addr).await;
    bob.enter(PeerRecord::new("bob", "Bob"))
        .await
        .expect("bob enters");
    let snapshot = next_matching(&mut bob_rx, |e| matches!(e, RelayEvent::Snapshot(_))).await;
    assert!(
        matches!(snapshot, RelayEvent::Snapshot(members) if members == vec![PeerRecord::new("alice", "Alice")])
    );

    let joined = next_matching(&mut alice_rx, |e| matches!(e, RelayEvent::Joined(_))).await;
    assert!(matches!(joined, RelayEvent::Joined(r) if r.identity == PeerId::from("bob")));
    assert_eq!(service.members().len(), 2);

    let envelope = SignalEnvelope::new("bob".into(), "alice".into(), SignalPayload::FileAccept);
    alice
        .publish(SIGNAL_EVENT, envelope.clone())
        .await
        .expect("alice publishes");

    let received = next_matching(&mut bob_rx, |e| matches!(e, RelayEvent::Envelope(_))).await;
    assert!(matches!(received, RelayEvent::Envelope(e) if e == envelope));
    // publishers hear their own envelopes too
    let echoed = next_matching(&mut alice_rx, |e| matches!(e, RelayEvent::Envelope(_))).await;
    assert!(matches!(echoed, RelayEvent::Envelope(e) if e == envelope));

    bob.leave().await.expect("bob leaves");
    let left = next_matching(&mut alice_rx, |e| matches!(e, RelayEvent::Left(_))).await;
    assert!(matches!(left, RelayEvent::Left(id) if id == PeerId::from("bob")));
}

#[tokio::test]
async fn test_envelopes_keep_publish_order() {
    init_tracing();
    let (addr, _service) = start_relay().await;

    let (alice, mut alice_rx) = connect(addr).await;
    alice
        .enter(PeerRecord::new("alice", "Alice"))
        .await
        .expect("alice enters");
    next_matching(&mut alice_rx, |e| matches!(e, RelayEvent::Snapshot(_))).await;

    let (bob, mut bob_rx) = connect(addr).await;
    bob.enter(PeerRecord::new("bob", "Bob"))
        .await
        .expect("bob enters");
    next_matching(&mut bob_rx, |e| matches!(e, RelayEvent::Snapshot(_))).await;

    let signals = [
        SignalPayload::FileAccept,
        SignalPayload::FileDecline,
        SignalPayload::FileAccept,
    ];
    for signal in signals.iter().cloned() {
        let envelope = SignalEnvelope::new("bob".into(), "alice".into(), signal);
        alice
            .publish(SIGNAL_EVENT, envelope)
            .await
            .expect("alice publishes");
    }

    for expected in signals {
        let event = next_matching(&mut bob_rx, |e| matches!(e, RelayEvent::Envelope(_))).await;
        assert!(matches!(event, RelayEvent::Envelope(e) if e.signal == expected));
    }
}
