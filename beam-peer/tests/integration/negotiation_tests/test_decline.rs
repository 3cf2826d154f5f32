use beam_peer::SessionEvent;

use crate::integration::{TestNet, alice_and_bob, init_tracing};
use crate::utils::{envelopes_of_kind, envelopes_seen, wait_for_event};

#[tokio::test]
async fn test_decline() {
    init_tracing();

    let net = TestNet::new();
    let mut tap = net.tap().await;
    let (mut alice, mut bob) = alice_and_bob(&net).await;

    let file = alice.store.put("notes.md", &b"# notes"[..]);
    alice.handle.initiate("bob", file.clone()).await.unwrap();

    wait_for_event(&mut bob.events, |e| {
        matches!(e, SessionEvent::IncomingOffer { .. })
    })
    .await;
    bob.handle.decline("alice").await.unwrap();

    let (declined, _) = wait_for_event(&mut alice.events, |e| {
        matches!(e, SessionEvent::OfferDeclined { .. })
    })
    .await;
    assert_eq!(
        declined,
        SessionEvent::OfferDeclined {
            peer: bob.identity.clone(),
            display_name: "Bob".into(),
            file_name: "notes.md".into(),
        }
    );

    // a second round trip proves alice has handled everything from the first
    alice.handle.initiate("bob", file).await.unwrap();
    wait_for_event(&mut bob.events, |e| {
        matches!(e, SessionEvent::IncomingOffer { .. })
    })
    .await;

    let seen = envelopes_seen(&mut tap);
    assert_eq!(
        envelopes_of_kind(&seen, &alice.identity, "session-description").count(),
        0
    );
    assert_eq!(
        envelopes_of_kind(&seen, &alice.identity, "file-offer").count(),
        2
    );
    assert!(net.network.calls_of(&alice.identity).is_empty());
    assert!(net.network.calls_of(&bob.identity).is_empty());
}
