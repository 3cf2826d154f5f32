use std::sync::Arc;

use beam_peer::{
    MemoryStore, PeerConfig, PeerId, PeerRecord, Session, SessionEvent, SessionHandle,
    WebRtcFactory,
};
use tokio::sync::mpsc;

use crate::integration::{EVENT_TIMEOUT, connect, init_tracing, start_relay};

async fn spawn_session(
    addr: std::net::SocketAddr,
    identity: &str,
    display_name: &str,
) -> (SessionHandle, mpsc::UnboundedReceiver<SessionEvent>, MemoryStore) {
    let (relay, relay_rx) = connect(addr).await;
    let store = MemoryStore::new();
    let (session, handle, events) = Session::new(
        PeerRecord::new(identity, display_name),
        PeerConfig::default(),
        Arc::new(relay),
        relay_rx,
        Arc::new(WebRtcFactory::default()),
        Arc::new(store.clone()),
    );
    tokio::spawn(session.run());
    (handle, events, store)
}

async fn wait_for<F>(events: &mut mpsc::UnboundedReceiver<SessionEvent>, pred: F) -> SessionEvent
where
    F: Fn(&SessionEvent) -> bool,
{
    tokio::time::timeout(EVENT_TIMEOUT, async {
        loop {
            match events.recv().await {
                Some(event) if pred(&event) => return event,
                Some(_) => continue,
                None => panic!("session event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for session event")
}

#[tokio::test]
async fn test_declined_offer_between_sessions() {
    init_tracing();
    let (addr, _service) = start_relay().await;

    let (alice, mut alice_events, alice_store) = spawn_session(addr, "alice", "Alice").await;
    wait_for(&mut alice_events, |e| matches!(e, SessionEvent::RelayState(_))).await;

    let (bob, mut bob_events, _) = spawn_session(addr, "bob", "Bob").await;
    wait_for(&mut alice_events, |e| {
        matches!(e, SessionEvent::PeerJoined(r) if r.identity == PeerId::from("bob"))
    })
    .await;
    wait_for(&mut bob_events, |e| {
        matches!(e, SessionEvent::PeerJoined(r) if r.identity == PeerId::from("alice"))
    })
    .await;

    let file = alice_store.put("notes.txt", b"hello bob".to_vec());
    alice.initiate("bob", file).await.expect("offer sent");

    let offer = wait_for(&mut bob_events, |e| {
        matches!(e, SessionEvent::IncomingOffer { .. })
    })
    .await;
    let SessionEvent::IncomingOffer { from, offer } = offer else {
        unreachable!()
    };
    assert_eq!(from, PeerId::from("alice"));
    assert_eq!(offer.file_name, "notes.txt");
    assert_eq!(offer.file_size, 9);

    bob.decline("alice").await.expect("decline");
    let declined = wait_for(&mut alice_events, |e| {
        matches!(e, SessionEvent::OfferDeclined { .. })
    })
    .await;
    assert_eq!(
        declined,
        SessionEvent::OfferDeclined {
            peer: PeerId::from("bob"),
            display_name: "Bob".into(),
            file_name: "notes.txt".into(),
        }
    );

    bob.shutdown().await.expect("bob shuts down");
    wait_for(&mut alice_events, |e| {
        matches!(e, SessionEvent::PeerLeft(r) if r.identity == PeerId::from("bob"))
    })
    .await;
    assert!(alice.peers().await.expect("peers").is_empty());
}
