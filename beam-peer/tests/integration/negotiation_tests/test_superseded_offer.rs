use beam_peer::SessionEvent;

use crate::integration::{TestNet, alice_and_bob, init_tracing};
use crate::utils::wait_for_event;

#[tokio::test]
async fn test_superseded_offer() {
    init_tracing();

    let net = TestNet::new();
    let (mut alice, mut bob) = alice_and_bob(&net).await;

    let first = alice.store.put("draft-1.txt", &b"first"[..]);
    let second = alice.store.put("draft-2.txt", &b"second draft"[..]);
    alice.handle.initiate("bob", first).await.unwrap();
    alice.handle.initiate("bob", second).await.unwrap();

    let (withdrawn, skipped) = wait_for_event(&mut bob.events, |e| {
        matches!(e, SessionEvent::IncomingOfferWithdrawn { .. })
    })
    .await;
    assert!(skipped.iter().any(|e| matches!(
        e,
        SessionEvent::IncomingOffer { offer, .. } if offer.file_name == "draft-1.txt"
    )));
    let SessionEvent::IncomingOfferWithdrawn { offer, .. } = withdrawn else {
        unreachable!();
    };
    assert_eq!(offer.file_name, "draft-1.txt");

    let (latest, _) = wait_for_event(&mut bob.events, |e| {
        matches!(e, SessionEvent::IncomingOffer { .. })
    })
    .await;
    let SessionEvent::IncomingOffer { offer, .. } = latest else {
        unreachable!();
    };
    assert_eq!(offer.file_name, "draft-2.txt");

    let accepted = bob.handle.accept("alice").await.unwrap();
    assert_eq!(accepted.file_name, "draft-2.txt");

    let (received, _) = wait_for_event(&mut bob.events, |e| {
        matches!(e, SessionEvent::FileReceived { .. })
    })
    .await;
    let SessionEvent::FileReceived { header, .. } = received else {
        unreachable!();
    };
    assert_eq!(header.name, "draft-2.txt");
    assert_eq!(bob.store.received().await[0].1.data.as_ref(), b"second draft");
}
