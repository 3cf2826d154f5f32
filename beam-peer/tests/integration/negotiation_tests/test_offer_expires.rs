use std::time::Duration;

use beam_peer::{NegotiationError, SessionError, SessionEvent};

use crate::integration::{TestNet, alice_and_bob, init_tracing};
use crate::utils::{envelopes_seen, wait_for_event};

#[tokio::test(start_paused = true)]
async fn test_offer_expires() {
    init_tracing();

    let net = TestNet::new();
    let mut tap = net.tap().await;
    let (mut alice, mut bob) = alice_and_bob(&net).await;

    let file = alice.store.put("slides.pdf", vec![1u8; 4096]);
    alice.handle.initiate("bob", file).await.unwrap();
    wait_for_event(&mut bob.events, |e| {
        matches!(e, SessionEvent::IncomingOffer { .. })
    })
    .await;

    tokio::time::advance(Duration::from_secs(61)).await;

    let (expired, _) = wait_for_event(&mut alice.events, |e| {
        matches!(e, SessionEvent::OfferExpired { .. })
    })
    .await;
    assert_eq!(
        expired,
        SessionEvent::OfferExpired {
            peer: bob.identity.clone(),
            file_name: "slides.pdf".into(),
        }
    );

    let (withdrawn, _) = wait_for_event(&mut bob.events, |e| {
        matches!(e, SessionEvent::IncomingOfferWithdrawn { .. })
    })
    .await;
    let SessionEvent::IncomingOfferWithdrawn { from, offer } = withdrawn else {
        unreachable!();
    };
    assert_eq!(from, alice.identity);
    assert_eq!(offer.file_name, "slides.pdf");

    let late = bob.handle.accept("alice").await;
    assert!(matches!(
        late,
        Err(SessionError::Negotiation(NegotiationError::NoOfferFrom(_)))
    ));

    // only the offer itself ever went out from alice
    let seen = envelopes_seen(&mut tap);
    let from_alice: Vec<_> = seen
        .iter()
        .filter(|e| e.from == alice.identity)
        .map(|e| e.signal.kind())
        .collect();
    assert_eq!(from_alice, vec!["file-offer"]);
}
