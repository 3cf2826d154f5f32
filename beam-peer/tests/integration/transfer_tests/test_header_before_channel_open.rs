use beam_peer::SessionEvent;

use crate::integration::{TestNet, alice_and_bob, init_tracing};
use crate::utils::wait_for_event;

#[tokio::test]
async fn test_header_before_channel_open() {
    init_tracing();

    let net = TestNet::new();
    net.network.open_late();
    let (mut alice, mut bob) = alice_and_bob(&net).await;

    let payload: Vec<u8> = (0..200_000).map(|i| (i % 97) as u8).collect();
    let file = alice.store.put("early.bin", payload.clone());
    alice.handle.initiate("bob", file).await.unwrap();
    wait_for_event(&mut bob.events, |e| {
        matches!(e, SessionEvent::IncomingOffer { .. })
    })
    .await;
    bob.handle.accept("alice").await.unwrap();

    let (received, skipped) = wait_for_event(&mut bob.events, |e| {
        matches!(e, SessionEvent::FileReceived { .. })
    })
    .await;
    let SessionEvent::FileReceived { header, .. } = received else {
        unreachable!();
    };
    assert_eq!(header.name, "early.bin");
    assert!(
        !skipped
            .iter()
            .any(|e| matches!(e, SessionEvent::TransferFailed { .. }))
    );

    let stored = bob.store.received().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].1.data.as_ref(), payload.as_slice());
}
