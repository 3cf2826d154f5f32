use beam_peer::SessionEvent;

use crate::integration::{TestNet, alice_and_bob, init_tracing};
use crate::utils::wait_for_event;

#[tokio::test]
async fn test_zero_byte_transfer() {
    init_tracing();

    let net = TestNet::new();
    let (mut alice, mut bob) = alice_and_bob(&net).await;

    let file = alice.store.put("empty.txt", Vec::new());
    alice.handle.initiate("bob", file).await.unwrap();
    wait_for_event(&mut bob.events, |e| {
        matches!(e, SessionEvent::IncomingOffer { .. })
    })
    .await;
    bob.handle.accept("alice").await.unwrap();

    let (received, _) = wait_for_event(&mut bob.events, |e| {
        matches!(e, SessionEvent::FileReceived { .. })
    })
    .await;
    let SessionEvent::FileReceived { header, .. } = received else {
        unreachable!();
    };
    assert_eq!(header.name, "empty.txt");
    assert_eq!(header.size, 0);
    assert_eq!(header.mime_type, "text/plain");

    wait_for_event(&mut alice.events, |e| {
        matches!(e, SessionEvent::FileSent { size: 0, .. })
    })
    .await;

    let stored = bob.store.received().await;
    assert!(stored[0].1.data.is_empty());
}
