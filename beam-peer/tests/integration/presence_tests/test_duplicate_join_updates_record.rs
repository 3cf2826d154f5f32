use beam_peer::{PeerRecord, Relay, SessionEvent};

use crate::integration::{TestNet, init_tracing};
use crate::utils::wait_for_event;

#[tokio::test]
async fn test_duplicate_join_updates_record() {
    init_tracing();

    let net = TestNet::new();
    let mut alice = net.spawn_peer("alice", "Alice");

    let (dave, _rx) = net.hub.connect("dave");
    dave.enter(PeerRecord::new("dave", "Dave")).await.unwrap();
    wait_for_event(&mut alice.events, |e| {
        matches!(e, SessionEvent::PeerJoined(r) if r.identity.as_str() == "dave")
    })
    .await;

    // reconnect with new metadata
    dave.enter(PeerRecord::new("dave", "David")).await.unwrap();
    let (updated, skipped) = wait_for_event(&mut alice.events, |e| {
        matches!(e, SessionEvent::PeerUpdated(_))
    })
    .await;
    assert_eq!(updated, SessionEvent::PeerUpdated(PeerRecord::new("dave", "David")));
    assert!(skipped.is_empty());

    let peers = alice.handle.peers().await.unwrap();
    assert_eq!(peers, vec![PeerRecord::new("dave", "David")]);
}
