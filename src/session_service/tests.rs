#![cfg(test)]
use super::*;
use crate::rpc::{Request, Response, RpcType};
use enr::EnrBuilder;
use futures::future;
use std::net::IpAddr;
use std::time::Duration;
use tokio::time::timeout;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn keyed_enr(ip: IpAddr, port: u16) -> (SecretKey, Enr<CombinedKey>) {
    let secret = SecretKey::random(&mut rand::thread_rng());
    // Build the ENR's signing key from the same scalar `secret` holds, via
    // the raw-bytes constructor rather than the enum variant directly: the
    // variant's backing type is an `enr` implementation detail, but loading
    // a persisted secp256k1 key from its 32-byte scalar is part of its
    // public API and keeps both keys provably in sync.
    let mut secret_bytes = secret.serialize();
    let combined = CombinedKey::secp256k1_from_bytes(&mut secret_bytes).unwrap();
    let enr = EnrBuilder::new("v4").ip(ip).udp(port).build(&combined).unwrap();
    (secret, enr)
}

fn ping(id: RequestId) -> ProtocolMessage {
    ProtocolMessage {
        id,
        body: RpcType::Request(Request::Ping { enr_seq: 1 }),
    }
}

fn pong(id: RequestId) -> ProtocolMessage {
    ProtocolMessage {
        id,
        body: RpcType::Response(Response::Pong { enr_seq: 1 }),
    }
}

/// Drives both services until `receiver` returns `Some(_)` or the 200ms
/// budget expires, at which point the sender side is simply dropped —
/// the same `future::poll_fn` + `select` + `timeout` idiom used elsewhere
/// for exercising two cooperating `poll`-based services without channels.
async fn run_until<F>(sender: &mut SessionService, receiver: &mut SessionService, mut on_event: F)
where
    F: FnMut(&mut SessionService, &mut SessionService, SessionEvent) -> bool,
{
    let drive = async {
        loop {
            let sender_poll = future::poll_fn(|cx| sender.poll(cx));
            let receiver_poll = future::poll_fn(|cx| receiver.poll(cx));
            futures::pin_mut!(sender_poll);
            futures::pin_mut!(receiver_poll);
            match future::select(sender_poll, receiver_poll).await {
                future::Either::Left((event, _)) => {
                    if on_event(sender, receiver, event) {
                        return;
                    }
                }
                future::Either::Right((event, _)) => {
                    if on_event(sender, receiver, event) {
                        return;
                    }
                }
            }
        }
    };
    timeout(Duration::from_millis(500), drive)
        .await
        .expect("handshake did not complete in time");
}

#[tokio::test]
async fn handshake_establishes_trusted_session_and_delivers_message() {
    init();
    let ip: IpAddr = "127.0.0.1".parse().unwrap();
    let (sender_key, sender_enr) = keyed_enr(ip, 7000);
    let (receiver_key, receiver_enr) = keyed_enr(ip, 7001);

    let mut sender = SessionService::new(
        sender_enr.clone(),
        sender_key,
        sender_enr.udp_socket().unwrap(),
        Discv5Config::default(),
    )
    .await
    .unwrap();
    let mut receiver = SessionService::new(
        receiver_enr.clone(),
        receiver_key,
        receiver_enr.udp_socket().unwrap(),
        Discv5Config::default(),
    )
    .await
    .unwrap();

    let message = ping(1);
    sender.send_request(&receiver_enr, message.clone()).unwrap();

    // the reply reuses the request's id, the same correlation convention
    // `on_message`'s `pending_requests.remove(&from, protocol_message.id)`
    // relies on to clear the sender's outstanding entry.
    let reply = pong(1);
    let mut receiver_delivered = false;
    let mut sender_delivered = false;
    let mut reply_sent = false;
    let sender_enr_for_challenge = sender_enr.clone();
    let sender_id = sender_enr.node_id();
    run_until(&mut sender, &mut receiver, |_sender, receiver, event| match event {
        SessionEvent::WhoAreYouRequest { src, auth_tag, .. } => {
            receiver.send_who_are_you(
                src,
                &sender_enr_for_challenge.node_id(),
                0,
                Some(sender_enr_for_challenge.clone()),
                auth_tag,
            );
            false
        }
        SessionEvent::Message { src_id, message: received, src } if src_id == sender_id => {
            assert_eq!(*received, message);
            receiver_delivered = true;
            if !reply_sent {
                receiver.send_response(src, &sender_id, reply.clone()).unwrap();
                reply_sent = true;
            }
            false
        }
        SessionEvent::Message { message: received, .. } => {
            // the sender's side, receiving B's response.
            assert_eq!(*received, reply);
            sender_delivered = true;
            receiver_delivered && sender_delivered
        }
        _ => false,
    })
    .await;

    assert!(receiver_delivered);
    assert!(sender_delivered);
    assert!(receiver
        .sessions
        .get(&sender_enr.node_id())
        .map(|s| s.is_trusted_established())
        .unwrap_or(false));
    assert!(sender
        .sessions
        .get(&receiver_enr.node_id())
        .map(|s| s.is_trusted_established())
        .unwrap_or(false));
}

#[tokio::test]
async fn established_session_is_reused_for_later_messages() {
    init();
    let ip: IpAddr = "127.0.0.1".parse().unwrap();
    let (sender_key, sender_enr) = keyed_enr(ip, 7010);
    let (receiver_key, receiver_enr) = keyed_enr(ip, 7011);

    let mut sender = SessionService::new(
        sender_enr.clone(),
        sender_key,
        sender_enr.udp_socket().unwrap(),
        Discv5Config::default(),
    )
    .await
    .unwrap();
    let mut receiver = SessionService::new(
        receiver_enr.clone(),
        receiver_key,
        receiver_enr.udp_socket().unwrap(),
        Discv5Config::default(),
    )
    .await
    .unwrap();

    let first = ping(1);
    sender.send_request(&receiver_enr, first.clone()).unwrap();

    let sender_enr_for_challenge = sender_enr.clone();
    let mut received_count = 0usize;
    let mut second_sent = false;
    run_until(&mut sender, &mut receiver, |sender, receiver, event| match event {
        SessionEvent::WhoAreYouRequest { src, auth_tag, .. } => {
            receiver.send_who_are_you(
                src,
                &sender_enr_for_challenge.node_id(),
                0,
                Some(sender_enr_for_challenge.clone()),
                auth_tag,
            );
            false
        }
        SessionEvent::Message { .. } => {
            received_count += 1;
            if !second_sent {
                // session is now established on the sender's side too; this
                // call must go straight out as an encrypted Message packet,
                // no new handshake.
                sender.send_request(&receiver_enr, ping(2)).unwrap();
                second_sent = true;
                false
            } else {
                received_count == 2
            }
        }
        _ => false,
    })
    .await;

    assert_eq!(received_count, 2);
    // no second RandomSent session was ever created: the node id maps to
    // exactly one session throughout.
    assert_eq!(
        sender.sessions.get(&receiver_enr.node_id()).unwrap().state,
        SessionState::Established
    );
}

#[test]
fn untrusted_session_is_not_trusted_established() {
    // A session can be `Established` (keys confirmed) without being
    // `trusted` (remote ENR's endpoint doesn't match the observed
    // source).
    let mut session = Session::new_random_sent(NodeId::new(&[1u8; 32]));
    session.state = SessionState::Established;
    session.outbound_key = Some([0u8; 16]);
    session.inbound_key = Some([0u8; 16]);
    session.last_seen_multiaddr = Some("127.0.0.1:9000".parse().unwrap());
    // remote_enr left at None: trust can never be established without it.
    assert!(!session.is_trusted_established());
}

#[tokio::test]
async fn untrusted_established_session_rejects_send_request_but_allows_send_response() {
    init();
    let ip: IpAddr = "127.0.0.1".parse().unwrap();
    let (local_key, local_enr) = keyed_enr(ip, 7030);
    let (_peer_key, peer_enr) = keyed_enr(ip, 7031);

    let mut service = SessionService::new(
        local_enr.clone(),
        local_key,
        local_enr.udp_socket().unwrap(),
        Discv5Config::default(),
    )
    .await
    .unwrap();

    let peer_id = peer_enr.node_id();
    let mut session = Session::new_random_sent(peer_id.clone());
    session.state = SessionState::Established;
    session.outbound_key = Some([0u8; 16]);
    session.inbound_key = Some([0u8; 16]);
    session.remote_enr = Some(peer_enr.clone());
    // Observed source deliberately does not match the peer's advertised
    // endpoint, so the session can never be trusted.
    session.last_seen_multiaddr = Some("127.0.0.1:9999".parse().unwrap());
    service.sessions.insert(peer_id.clone(), session);

    let result = service.send_request(&peer_enr, ping(1));
    assert!(
        matches!(result, Err(Error::UntrustedPeer)),
        "expected UntrustedPeer, got {result:?}"
    );

    let dst = peer_enr.udp_socket().unwrap();
    let result = service.send_response(dst, &peer_id, ping(2));
    assert!(result.is_ok(), "expected Ok, got {result:?}");
}

#[tokio::test]
async fn request_to_unreachable_peer_fails_after_retries() {
    init();
    let ip: IpAddr = "127.0.0.1".parse().unwrap();
    let (sender_key, sender_enr) = keyed_enr(ip, 7020);
    // Nobody is bound on this port: the handshake packet is sent into the
    // void and every retry times out.
    let (_unused_key, unreachable_enr) = keyed_enr(ip, 7021);

    let mut config = Discv5Config::default();
    config.request_timeout = Duration::from_millis(20);
    config.request_retries = 1;

    let mut sender = SessionService::new(
        sender_enr.clone(),
        sender_key,
        sender_enr.udp_socket().unwrap(),
        config,
    )
    .await
    .unwrap();

    sender.send_request(&unreachable_enr, ping(1)).unwrap();

    let result = timeout(Duration::from_millis(200), future::poll_fn(|cx| sender.poll(cx))).await;
    match result {
        Ok(SessionEvent::RequestFailed(node_id, request_id)) => {
            assert_eq!(node_id, unreachable_enr.node_id());
            assert_eq!(request_id, 1);
        }
        other => panic!("expected RequestFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn lost_who_are_you_abandons_half_session_without_request_failed() {
    init();
    let ip: IpAddr = "127.0.0.1".parse().unwrap();
    let (local_key, local_enr) = keyed_enr(ip, 7040);
    // Nobody is bound on this port: every WHOAREYOU (and its
    // retransmissions) is sent into the void.
    let (_peer_key, peer_enr) = keyed_enr(ip, 7041);

    let mut config = Discv5Config::default();
    config.request_timeout = Duration::from_millis(20);
    config.request_retries = 1;

    let mut b = SessionService::new(
        local_enr.clone(),
        local_key,
        local_enr.udp_socket().unwrap(),
        config,
    )
    .await
    .unwrap();

    let peer_id = peer_enr.node_id();
    let auth_tag = crypto::random_auth_tag();
    b.send_who_are_you(peer_enr.udp_socket().unwrap(), &peer_id, 0, Some(peer_enr.clone()), auth_tag);
    assert!(b.sessions.get(&peer_id).is_some());

    // no user message was ever queued for this peer, so exhausting the
    // challenge's retries must abandon the half-session silently.
    let result = timeout(Duration::from_millis(200), future::poll_fn(|cx| b.poll(cx))).await;
    assert!(result.is_err(), "expected no event at all, got {result:?}");
    assert!(b.sessions.get(&peer_id).is_none());
}

#[tokio::test]
async fn session_expiry_triggers_fresh_handshake_on_next_request() {
    init();
    let ip: IpAddr = "127.0.0.1".parse().unwrap();
    let (sender_key, sender_enr) = keyed_enr(ip, 7050);
    let (receiver_key, receiver_enr) = keyed_enr(ip, 7051);

    let mut config = Discv5Config::default();
    config.session_timeout = Duration::from_millis(30);

    let mut sender = SessionService::new(
        sender_enr.clone(),
        sender_key,
        sender_enr.udp_socket().unwrap(),
        config.clone(),
    )
    .await
    .unwrap();
    let mut receiver = SessionService::new(
        receiver_enr.clone(),
        receiver_key,
        receiver_enr.udp_socket().unwrap(),
        config,
    )
    .await
    .unwrap();

    let sender_id = sender_enr.node_id();
    let sender_enr_for_challenge = sender_enr.clone();

    sender.send_request(&receiver_enr, ping(1)).unwrap();
    let mut receiver_delivered = false;
    let mut sender_delivered = false;
    run_until(&mut sender, &mut receiver, |_sender, receiver, event| match event {
        SessionEvent::WhoAreYouRequest { src, auth_tag, .. } => {
            receiver.send_who_are_you(
                src,
                &sender_id,
                0,
                Some(sender_enr_for_challenge.clone()),
                auth_tag,
            );
            false
        }
        SessionEvent::Message { src_id, src, .. } if src_id == sender_id => {
            receiver_delivered = true;
            receiver.send_response(src, &sender_id, pong(1)).unwrap();
            false
        }
        SessionEvent::Message { .. } => {
            sender_delivered = true;
            receiver_delivered && sender_delivered
        }
        _ => false,
    })
    .await;
    assert!(receiver_delivered && sender_delivered);
    assert!(receiver
        .sessions
        .get(&sender_id)
        .map(|s| s.is_trusted_established())
        .unwrap_or(false));

    // let both sides' sessions with each other expire; neither has an
    // outstanding pending request left by this point, so the timeout
    // removes the entry outright instead of extending it.
    tokio::time::sleep(Duration::from_millis(150)).await;
    let _ = timeout(Duration::from_millis(50), future::poll_fn(|cx| receiver.poll(cx))).await;
    let _ = timeout(Duration::from_millis(50), future::poll_fn(|cx| sender.poll(cx))).await;
    assert!(receiver.sessions.get(&sender_id).is_none());
    assert!(sender.sessions.get(&receiver_enr.node_id()).is_none());

    // the next request has to run the Random/WHOAREYOU/AuthMessage
    // handshake again from scratch, and still delivers.
    sender.send_request(&receiver_enr, ping(2)).unwrap();
    let mut delivered = false;
    run_until(&mut sender, &mut receiver, |_sender, receiver, event| match event {
        SessionEvent::WhoAreYouRequest { src, auth_tag, .. } => {
            receiver.send_who_are_you(
                src,
                &sender_id,
                0,
                Some(sender_enr_for_challenge.clone()),
                auth_tag,
            );
            false
        }
        SessionEvent::Message { src_id, message, .. } if src_id == sender_id => {
            assert_eq!(message.id, 2);
            delivered = true;
            true
        }
        _ => false,
    })
    .await;
    assert!(delivered);
}

#[tokio::test]
async fn decrypt_failure_drops_established_session_and_surfaces_request_failed_once() {
    init();
    let ip: IpAddr = "127.0.0.1".parse().unwrap();
    let (local_key, local_enr) = keyed_enr(ip, 7060);
    let (_peer_key, peer_enr) = keyed_enr(ip, 7061);

    let mut service = SessionService::new(
        local_enr.clone(),
        local_key,
        local_enr.udp_socket().unwrap(),
        Discv5Config::default(),
    )
    .await
    .unwrap();

    let peer_id = peer_enr.node_id();
    let mut session = Session::new_random_sent(peer_id.clone());
    session.state = SessionState::Established;
    session.outbound_key = Some([0u8; 16]);
    session.inbound_key = Some([1u8; 16]);
    session.remote_enr = Some(peer_enr.clone());
    session.last_seen_multiaddr = Some(peer_enr.udp_socket().unwrap());
    service.sessions.insert(peer_id.clone(), session);
    // a message that was somehow left buffered alongside an already
    // established session; decrypt failure must still fail it instead of
    // dropping it silently.
    service
        .pending_messages
        .entry(peer_id.clone())
        .or_default()
        .push_back(ping(9));

    let from = peer_enr.udp_socket().unwrap();
    let wire_tag = tag::get_tag(&peer_id, &service.local_node_id);
    // garbage ciphertext: the inbound key can never authenticate it.
    service.on_message(from, wire_tag, crypto::random_auth_tag(), vec![0u8; 32]);

    assert!(service.sessions.get(&peer_id).is_none());
    assert!(service.pending_messages.get(&peer_id).is_none());

    let first = timeout(Duration::from_millis(50), future::poll_fn(|cx| service.poll(cx)))
        .await
        .unwrap();
    match first {
        SessionEvent::RequestFailed(node_id, request_id) => {
            assert_eq!(node_id, peer_id);
            assert_eq!(request_id, 9);
        }
        other => panic!("expected RequestFailed, got {other:?}"),
    }

    let second = timeout(Duration::from_millis(50), future::poll_fn(|cx| service.poll(cx)))
        .await
        .unwrap();
    assert!(matches!(second, SessionEvent::WhoAreYouRequest { src_id, .. } if src_id == peer_id));

    let third = timeout(Duration::from_millis(50), future::poll_fn(|cx| service.poll(cx))).await;
    assert!(third.is_err(), "expected exactly one WhoAreYouRequest, got {third:?}");
}
