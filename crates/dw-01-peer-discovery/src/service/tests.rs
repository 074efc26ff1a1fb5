use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use shared_types::testing::duplex_pair;
use shared_types::{FrameStream, PeerId, ProtocolHandler, StreamOpener, TransportError};

use serde_json::{json, Value};
use shared_types::{read_json, write_json};
use tokio::time::Instant;

use super::relay::splice;
use super::*;
use crate::config::DialConfig;
use crate::domain::{circuit_addr, ExchangeMessage};

const ECHO: &str = "/test/echo/1.0.0";

struct EchoHandler;

#[async_trait]
impl ProtocolHandler for EchoHandler {
    fn protocol(&self) -> &'static str {
        ECHO
    }

    async fn handle(&self, _remote: PeerId, mut stream: Box<dyn FrameStream>) {
        if let Ok(Some(frame)) = stream.read_frame().await {
            let _ = stream.write_frame(&frame).await;
        }
        let _ = stream.close().await;
    }
}

async fn start(config: NodeConfig) -> P2pNode {
    P2pNode::start_with_keypair(config, Keypair::generate_ed25519())
        .await
        .unwrap()
}

fn relay_config() -> NodeConfig {
    let mut config = NodeConfig::for_testing();
    config.relay.enabled = true;
    config
}

async fn wait_until(what: &str, check: impl Fn() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {what}");
}

async fn echo(opener: &P2pNode, peer: &PeerId, payload: &[u8]) -> Vec<u8> {
    let mut stream = opener.open_stream(peer, ECHO).await.unwrap();
    stream.write_frame(payload).await.unwrap();
    let reply = stream.read_frame().await.unwrap().unwrap();
    stream.close().await.unwrap();
    reply
}

#[tokio::test]
async fn test_dial_identifies_both_sides() {
    let a = start(NodeConfig::for_testing()).await;
    let b = start(NodeConfig::for_testing()).await;

    let dialed = b.dial(&a.listen_addrs()[0]).await.unwrap();
    assert_eq!(dialed, a.local_peer_id());
    wait_until("a to see b", || a.is_connected(&b.local_peer_id())).await;

    assert_eq!(b.connection_status(&a.local_peer_id()), ConnectionStatus::Direct);
    // The acceptor learned b's advertised address from identify.
    assert_eq!(a.peer_addrs(&b.local_peer_id()), b.inner.listen_addrs);
}

#[tokio::test]
async fn test_registered_handler_serves_streams() {
    let a = start(NodeConfig::for_testing()).await;
    let b = start(NodeConfig::for_testing()).await;
    a.register_handler(Arc::new(EchoHandler));

    b.dial(&a.listen_addrs()[0]).await.unwrap();
    assert_eq!(echo(&b, &a.local_peer_id(), b"ping").await, b"ping");
}

#[tokio::test]
async fn test_unknown_protocol_is_rejected() {
    let a = start(NodeConfig::for_testing()).await;
    let b = start(NodeConfig::for_testing()).await;
    b.dial(&a.listen_addrs()[0]).await.unwrap();

    let mut stream = b.open_stream(&a.local_peer_id(), "/nope/1.0.0").await.unwrap();
    let rejection: shared_types::StreamRejection = shared_types::read_json(&mut stream).await.unwrap();
    assert_eq!(rejection.kind, "error");
    assert!(rejection.reason.starts_with("unsupported-protocol"));
}

#[tokio::test]
async fn test_stream_to_unknown_peer_is_not_connected() {
    let a = start(NodeConfig::for_testing()).await;
    let err = a.open_stream(&PeerId::random(), ECHO).await.err().unwrap();
    assert!(matches!(err, TransportError::NotConnected { .. }));
}

#[tokio::test]
async fn test_dial_rejects_wrong_peer_id() {
    let a = start(NodeConfig::for_testing()).await;
    let b = start(NodeConfig::for_testing()).await;
    let wrong = crate::domain::quic_multiaddr(a.inner.transport.local_addr().unwrap())
        .with(multiaddr::Protocol::P2p(PeerId::random()));

    assert!(matches!(b.dial(&wrong).await, Err(NodeError::Handshake { .. })));
    assert!(!b.is_connected(&a.local_peer_id()));
}

#[tokio::test]
async fn test_peer_exchange_discovers_and_dials() {
    let hub = start(relay_config()).await;
    let a = start(NodeConfig::for_testing()).await;
    let b = start(NodeConfig::for_testing()).await;
    a.dial(&hub.listen_addrs()[0]).await.unwrap();
    b.dial(&hub.listen_addrs()[0]).await.unwrap();
    wait_until("hub to see both", || hub.connected_peers().len() == 2).await;

    let outcome = a
        .request_peer_exchange(Some(hub.local_peer_id()), "test", true)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ExchangeOutcome::Completed {
            target: hub.local_peer_id(),
            received: 1,
            scheduled: 1,
        }
    );

    wait_until("a to dial b", || a.is_connected(&b.local_peer_id())).await;
    assert_eq!(a.connection_status(&b.local_peer_id()), ConnectionStatus::Direct);
}

#[tokio::test]
async fn test_unforced_exchange_is_throttled() {
    let hub = start(NodeConfig::for_testing()).await;
    let a = start(NodeConfig::for_testing()).await;
    a.dial(&hub.listen_addrs()[0]).await.unwrap();

    let first = a.request_peer_exchange(None, "first", false).await.unwrap();
    assert!(matches!(first, ExchangeOutcome::Completed { received: 0, .. }));
    let second = a.request_peer_exchange(None, "second", false).await.unwrap();
    assert_eq!(second, ExchangeOutcome::Skipped(SkipReason::Throttled));
    let forced = a.request_peer_exchange(None, "forced", true).await.unwrap();
    assert!(matches!(forced, ExchangeOutcome::Completed { .. }));
}

#[tokio::test]
async fn test_exchange_without_peers_is_skipped() {
    let a = start(NodeConfig::for_testing()).await;
    let outcome = a.request_peer_exchange(None, "lonely", true).await.unwrap();
    assert_eq!(outcome, ExchangeOutcome::Skipped(SkipReason::NoTarget));
}

#[tokio::test]
async fn test_bootstrap_connect_reserves_relay_slot() {
    let hub = start(relay_config()).await;
    let mut config = NodeConfig::for_testing();
    config.bootstrap_peers = hub.listen_addrs();
    let a = start(config).await;

    wait_until("reservation", || !a.held_reservations().is_empty()).await;
    let held = &a.held_reservations()[0];
    assert_eq!(held.relay, hub.local_peer_id());
    assert_eq!(
        held.addrs,
        vec![circuit_addr(&hub.inner.listen_addrs[0], hub.local_peer_id(), a.local_peer_id())]
    );
    assert_eq!(hub.granted_reservations(), 1);
}

#[tokio::test]
async fn test_circuit_carries_protocol_streams() {
    let hub = start(relay_config()).await;
    let a = start(NodeConfig::for_testing()).await;
    let b = start(NodeConfig::for_testing()).await;
    b.register_handler(Arc::new(EchoHandler));

    b.dial(&hub.listen_addrs()[0]).await.unwrap();
    b.reserve(&hub.local_peer_id()).await.unwrap();

    let circuit = circuit_addr(&hub.inner.listen_addrs[0], hub.local_peer_id(), b.local_peer_id());
    assert_eq!(a.dial(&circuit).await.unwrap(), b.local_peer_id());
    assert_eq!(
        a.connection_status(&b.local_peer_id()),
        ConnectionStatus::Relayed {
            relay: hub.local_peer_id()
        }
    );
    wait_until("b to route back to a", || b.is_connected(&a.local_peer_id())).await;

    assert_eq!(echo(&a, &b.local_peer_id(), b"through the relay").await, b"through the relay");
}

#[tokio::test]
async fn test_circuit_needs_reservation() {
    let hub = start(relay_config()).await;
    let a = start(NodeConfig::for_testing()).await;
    let b = start(NodeConfig::for_testing()).await;
    b.dial(&hub.listen_addrs()[0]).await.unwrap();

    let circuit = circuit_addr(&hub.inner.listen_addrs[0], hub.local_peer_id(), b.local_peer_id());
    let err = a.dial(&circuit).await.unwrap_err();
    assert!(
        matches!(err, NodeError::Transport(TransportError::RelayRefused { ref reason, .. }) if reason == "no-reservation")
    );
}

#[tokio::test]
async fn test_full_pool_refuses_reservation() {
    let mut config = relay_config();
    config.relay.max_reservations = 1;
    let hub = start(config).await;
    let a = start(NodeConfig::for_testing()).await;
    let b = start(NodeConfig::for_testing()).await;
    a.dial(&hub.listen_addrs()[0]).await.unwrap();
    b.dial(&hub.listen_addrs()[0]).await.unwrap();

    a.reserve(&hub.local_peer_id()).await.unwrap();
    let err = b.reserve(&hub.local_peer_id()).await.unwrap_err();
    assert!(matches!(err, NodeError::Refused(ref reason) if reason == "reservation-refused"));
}

#[tokio::test]
async fn test_non_relay_refuses_reservation() {
    let plain = start(NodeConfig::for_testing()).await;
    let a = start(NodeConfig::for_testing()).await;
    a.dial(&plain.listen_addrs()[0]).await.unwrap();

    let err = a.reserve(&plain.local_peer_id()).await.unwrap_err();
    assert!(matches!(err, NodeError::Refused(ref reason) if reason == "relay-disabled"));
}

#[tokio::test]
async fn test_disconnect_removes_peer() {
    let a = start(NodeConfig::for_testing()).await;
    let b = start(NodeConfig::for_testing()).await;
    let mut events = a.subscribe();
    b.dial(&a.listen_addrs()[0]).await.unwrap();
    wait_until("a to see b", || a.is_connected(&b.local_peer_id())).await;

    b.shutdown();
    wait_until("a to drop b", || !a.is_connected(&b.local_peer_id())).await;
    assert!(a.connected_peers().is_empty());

    let mut saw_disconnect = false;
    while let Ok(event) = events.try_recv() {
        if event == (NodeEvent::PeerDisconnected { peer: b.local_peer_id() }) {
            saw_disconnect = true;
        }
    }
    assert!(saw_disconnect);
}

#[tokio::test]
async fn test_splice_forwards_turn_by_turn() {
    let (mut client, mut relay_in) = duplex_pair();
    let (mut relay_out, mut server) = duplex_pair();

    let relay = tokio::spawn(async move { splice(&mut relay_in, &mut relay_out).await });

    client.write_frame(b"request").await.unwrap();
    assert_eq!(server.read_frame().await.unwrap().unwrap(), b"request");
    server.write_frame(b"response").await.unwrap();
    server.close().await.unwrap();
    assert_eq!(client.read_frame().await.unwrap().unwrap(), b"response");
    client.close().await.unwrap();

    assert_eq!(relay.await.unwrap(), 2);
    assert!(server.read_frame().await.unwrap().is_none());
}

#[tokio::test]
async fn test_default_exchange_target_prefers_bootstrap() {
    let hub = start(relay_config()).await;
    let other = start(NodeConfig::for_testing()).await;
    let mut config = NodeConfig::for_testing();
    config.bootstrap_peers = hub.listen_addrs();
    let a = start(config).await;
    a.dial(&other.listen_addrs()[0]).await.unwrap();
    wait_until("bootstrap exchange", || {
        *a.inner.exchange_target.read() == Some(hub.local_peer_id())
    })
    .await;

    // The last explicit target is not the bootstrap peer.
    a.request_peer_exchange(Some(other.local_peer_id()), "direct", true)
        .await
        .unwrap();
    let outcome = a.request_peer_exchange(None, "default", true).await.unwrap();
    assert!(matches!(
        outcome,
        ExchangeOutcome::Completed { target, .. } if target == hub.local_peer_id()
    ));
}

// =============================================================================
// TIMERS (paused clock, no sockets involved)
// =============================================================================

/// Parses as a multiaddr but is not a QUIC address, so every dial fails at once.
fn undialable(peer: PeerId) -> Multiaddr {
    format!("/ip4/127.0.0.1/tcp/9/p2p/{peer}").parse().unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_dial_retries_with_linear_backoff() {
    let mut config = NodeConfig::for_testing();
    config.dial = DialConfig::default();
    let node = start(config).await;
    let peer = PeerId::random();
    assert!(node.inner.book.lock().begin_dial(peer));

    let started = Instant::now();
    node.dial_with_retry(peer, &[undialable(peer)]).await;

    // Three attempts: 1 s then 2 s between them, nothing after the last.
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(4), "{elapsed:?}");
    assert!(!node.inner.book.lock().is_dialing(&peer));
}

#[tokio::test(start_paused = true)]
async fn test_resync_tick_redials_bootstrap_peer() {
    let bootstrap = PeerId::random();
    let mut config = NodeConfig::for_testing();
    config.dial = DialConfig::default();
    config.bootstrap_peers = vec![undialable(bootstrap)];
    let node = start(config).await;
    assert!(node.inner.book.lock().is_dialing(&bootstrap));

    // The startup dial gives up after its retries.
    tokio::time::sleep(Duration::from_secs(29)).await;
    assert!(!node.inner.book.lock().is_dialing(&bootstrap));

    // The 30 s tick starts a fresh dial, now waiting out its first backoff.
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert!(node.inner.book.lock().is_dialing(&bootstrap));
}

#[tokio::test(start_paused = true)]
async fn test_silent_exchange_client_times_out() {
    let node = start(NodeConfig::for_testing()).await;
    let (mut client, server) = duplex_pair();

    let started = Instant::now();
    let serving = tokio::spawn({
        let node = node.clone();
        async move { node.serve_exchange(PeerId::random(), server).await }
    });

    let reply: Value = read_json(&mut client).await.unwrap();
    assert!(started.elapsed() >= Duration::from_secs(10));
    assert_eq!(reply, json!({ "type": "error", "reason": "timeout", "once": true }));
    serving.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_malformed_exchange_request_gets_error_reply() {
    let node = start(NodeConfig::for_testing()).await;

    let (mut client, server) = duplex_pair();
    let serving = tokio::spawn({
        let node = node.clone();
        async move { node.serve_exchange(PeerId::random(), server).await }
    });
    client.write_frame(b"{not json").await.unwrap();
    let reply: Value = read_json(&mut client).await.unwrap();
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["once"], true);
    assert!(!reply["reason"].as_str().unwrap().is_empty());
    assert!(client.read_frame().await.unwrap().is_none());
    serving.await.unwrap();

    // Well-formed, but a response is not a request.
    let (mut client, server) = duplex_pair();
    let serving = tokio::spawn({
        let node = node.clone();
        async move { node.serve_exchange(PeerId::random(), server).await }
    });
    write_json(&mut client, &ExchangeMessage::error("nope")).await.unwrap();
    let reply: Value = read_json(&mut client).await.unwrap();
    assert_eq!(
        reply,
        json!({ "type": "error", "reason": "unexpected-message", "once": true })
    );
    serving.await.unwrap();
}
