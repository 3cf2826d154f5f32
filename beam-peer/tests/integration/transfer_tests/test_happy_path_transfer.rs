use beam_core::{SdpKind, SignalPayload};
use beam_peer::{Direction, SessionEvent};

use crate::integration::{TestNet, alice_and_bob, init_tracing};
use crate::utils::{MockCall, envelopes_of_kind, envelopes_seen, wait_for_event};

const FILE_SIZE: usize = 1_048_576;
const CHUNK: u64 = 65_536;

#[tokio::test]
async fn test_happy_path_transfer() {
    init_tracing();

    let net = TestNet::new();
    let mut tap = net.tap().await;
    let (mut alice, mut bob) = alice_and_bob(&net).await;

    let payload: Vec<u8> = (0..FILE_SIZE).map(|i| (i % 251) as u8).collect();
    let file = alice.store.put("report.bin", payload.clone());
    alice
        .handle
        .initiate("bob", file)
        .await
        .expect("Failed to initiate");

    let (offer_event, _) = wait_for_event(&mut bob.events, |e| {
        matches!(e, SessionEvent::IncomingOffer { .. })
    })
    .await;
    let SessionEvent::IncomingOffer { from, offer } = offer_event else {
        unreachable!();
    };
    assert_eq!(from, alice.identity);
    assert_eq!(offer.file_name, "report.bin");
    assert_eq!(offer.file_size, FILE_SIZE as u64);
    assert_eq!(offer.from_user.display_name, "Alice");

    bob.handle.accept("alice").await.expect("Failed to accept");

    let (received, bob_events) = wait_for_event(&mut bob.events, |e| {
        matches!(e, SessionEvent::FileReceived { .. })
    })
    .await;
    let SessionEvent::FileReceived { from, header, .. } = received else {
        unreachable!();
    };
    assert_eq!(from, alice.identity);
    assert_eq!(header.size, FILE_SIZE as u64);

    // header, then 15 partial chunks; the 16th completes the transfer
    let inbound: Vec<u64> = bob_events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Progress {
                direction: Direction::Inbound,
                transferred,
                ..
            } => Some(*transferred),
            _ => None,
        })
        .collect();
    assert_eq!(inbound, (1..16).map(|n| n * CHUNK).collect::<Vec<_>>());

    let (sent, alice_events) = wait_for_event(&mut alice.events, |e| {
        matches!(e, SessionEvent::FileSent { .. })
    })
    .await;
    assert_eq!(
        sent,
        SessionEvent::FileSent {
            to: bob.identity.clone(),
            file_name: "report.bin".into(),
            size: FILE_SIZE as u64,
        }
    );
    let outbound = alice_events
        .iter()
        .filter(|e| {
            matches!(
                e,
                SessionEvent::Progress {
                    direction: Direction::Outbound,
                    ..
                }
            )
        })
        .count();
    assert_eq!(outbound, 16);

    let stored = bob.store.received().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].0, alice.identity);
    assert_eq!(stored[0].1.data.as_ref(), payload.as_slice());

    // the side that received FileAccept made the connection offer
    let alice_calls = net.network.calls_of(&alice.identity);
    let bob_calls = net.network.calls_of(&bob.identity);
    assert!(alice_calls.contains(&MockCall::CreateOffer));
    assert!(!alice_calls.contains(&MockCall::CreateAnswer));
    assert!(bob_calls.contains(&MockCall::CreateAnswer));
    assert!(!bob_calls.contains(&MockCall::CreateOffer));
    assert_eq!(
        alice_calls[0],
        MockCall::OpenChannel("file-transfer".into())
    );

    let seen = envelopes_seen(&mut tap);
    let alice_descs: Vec<_> = envelopes_of_kind(&seen, &alice.identity, "session-description")
        .map(|e| match &e.signal {
            SignalPayload::SessionDescription(d) => d.kind,
            other => panic!("unexpected {:?}", other),
        })
        .collect();
    let bob_descs: Vec<_> = envelopes_of_kind(&seen, &bob.identity, "session-description")
        .map(|e| match &e.signal {
            SignalPayload::SessionDescription(d) => d.kind,
            other => panic!("unexpected {:?}", other),
        })
        .collect();
    assert_eq!(alice_descs, vec![SdpKind::Offer]);
    assert_eq!(bob_descs, vec![SdpKind::Answer]);
    assert_eq!(
        envelopes_of_kind(&seen, &bob.identity, "file-accept").count(),
        1
    );
}
