use beam_peer::{SessionError, SessionEvent};

use crate::integration::{TestNet, alice_and_bob, init_tracing};
use crate::utils::wait_for_event;

#[tokio::test]
async fn test_shutdown_leaves_presence() {
    init_tracing();

    let net = TestNet::new();
    let (mut alice, bob) = alice_and_bob(&net).await;

    bob.handle.shutdown().await.expect("bob shuts down");

    let bob_id = bob.identity.clone();
    wait_for_event(&mut alice.events, |e| {
        matches!(e, SessionEvent::PeerLeft(r) if r.identity == bob_id)
    })
    .await;

    // the actor has stopped taking commands
    assert!(matches!(bob.handle.peers().await, Err(SessionError::Closed)));
    assert!(alice.handle.peers().await.unwrap().is_empty());
}
