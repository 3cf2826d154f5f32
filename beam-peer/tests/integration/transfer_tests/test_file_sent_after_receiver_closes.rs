use beam_peer::SessionEvent;

use crate::integration::{TestNet, alice_and_bob, init_tracing};
use crate::utils::{MockCall, wait_for_event};

#[tokio::test]
async fn test_file_sent_after_receiver_closes() {
    init_tracing();

    let net = TestNet::new();
    let (mut alice, mut bob) = alice_and_bob(&net).await;

    let file = alice.store.put("tail.bin", vec![3u8; 300_000]);
    alice.handle.initiate("bob", file).await.unwrap();
    wait_for_event(&mut bob.events, |e| {
        matches!(e, SessionEvent::IncomingOffer { .. })
    })
    .await;
    bob.handle.accept("alice").await.unwrap();

    let (sent, _) = wait_for_event(&mut alice.events, |e| {
        matches!(e, SessionEvent::FileSent { .. })
    })
    .await;
    assert_eq!(
        sent,
        SessionEvent::FileSent {
            to: bob.identity.clone(),
            file_name: "tail.bin".into(),
            size: 300_000,
        }
    );

    // only the receiver closing after the last chunk completes a send
    assert!(net.network.calls_of(&bob.identity).contains(&MockCall::Close));

    wait_for_event(&mut bob.events, |e| {
        matches!(e, SessionEvent::FileReceived { .. })
    })
    .await;
}
