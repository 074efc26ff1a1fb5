use super::*;
use crate::adapters::LocalChunkStore;
use crate::config::ChunkTransferConfig;
use crate::domain::{ChunkMessage, ChunkTransferError, REASON_HASH_MISMATCH, REASON_NOT_FOUND};
use async_trait::async_trait;
use shared_types::encoding::sha256_hex;
use shared_types::testing::{duplex_pair, InMemoryNetwork, MemoryEndpoint};
use shared_types::{read_json, write_json, FrameStream, PeerId, ProtocolHandler, CHUNK_PROTOCOL};
use std::sync::Arc;
use std::time::Duration;

struct Fixture {
    client: ChunkClient,
    server_peer: PeerId,
    store: Arc<LocalChunkStore>,
    handler: Arc<ChunkProtocolHandler>,
}

fn fixture() -> Fixture {
    let network = InMemoryNetwork::new();
    let server = network.join();
    let client_endpoint = network.join();
    let config = ChunkTransferConfig::default();

    let store = Arc::new(LocalChunkStore::new(16));
    let handler = Arc::new(ChunkProtocolHandler::with_provider(
        server.peer_id(),
        &config,
        store.clone(),
    ));
    server.register_handler(handler.clone());

    Fixture {
        client: ChunkClient::new(Arc::new(client_endpoint), &config),
        server_peer: server.peer_id(),
        store,
        handler,
    }
}

#[tokio::test]
async fn test_request_served_from_transfer_store() {
    let fx = fixture();
    fx.store.add_transfer("m1", vec![b"first".to_vec(), b"second".to_vec()]);

    let data = fx.client.request_chunk(&fx.server_peer, "m1", 1).await.unwrap();
    assert_eq!(data, b"second");
}

#[tokio::test]
async fn test_missing_chunk_yields_remote_error() {
    let fx = fixture();
    let err = fx.client.request_chunk(&fx.server_peer, "m1", 0).await.unwrap_err();
    match err {
        ChunkTransferError::Remote(reason) => assert_eq!(reason, REASON_NOT_FOUND),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_no_provider_replies_no_handler() {
    let network = InMemoryNetwork::new();
    let server = network.join();
    let client_endpoint = network.join();
    let config = ChunkTransferConfig::default();
    server.register_handler(Arc::new(ChunkProtocolHandler::new(server.peer_id(), &config)));

    let client = ChunkClient::new(Arc::new(client_endpoint), &config);
    let err = client.request_chunk(&server.peer_id(), "m1", 0).await.unwrap_err();
    assert!(matches!(err, ChunkTransferError::Remote(ref r) if r == "no-handler"));
}

#[tokio::test]
async fn test_upload_is_cached_and_acked() {
    let fx = fixture();
    let mut events = fx.handler.subscribe();

    let ack = fx
        .client
        .upload_chunk(&fx.server_peer, "m2", 4, b"payload".to_vec())
        .await
        .unwrap();
    assert_eq!(ack.peer_id, fx.server_peer.to_string());
    assert_eq!(ack.chunk_index, 4);
    assert_eq!(fx.store.get("m2", 4), Some(b"payload".to_vec()));

    let event = events.recv().await.unwrap();
    assert_eq!(event.manifest_id, "m2");
    assert_eq!(event.chunk_index, 4);

    // The uploaded chunk is now servable.
    let data = fx.client.request_chunk(&fx.server_peer, "m2", 4).await.unwrap();
    assert_eq!(data, b"payload");
}

#[tokio::test]
async fn test_corrupted_upload_is_nacked() {
    let fx = fixture();
    let wrong_hash = sha256_hex(b"something else");

    let err = fx
        .client
        .upload_with_hash(&fx.server_peer, "m3", 0, b"payload".to_vec(), wrong_hash)
        .await
        .unwrap_err();
    match err {
        ChunkTransferError::Rejected(reason) => assert_eq!(reason, REASON_HASH_MISMATCH),
        other => panic!("unexpected {other:?}"),
    }
    assert!(!fx.store.contains("m3", 0));
}

#[tokio::test]
async fn test_hash_check_can_be_disabled() {
    let network = InMemoryNetwork::new();
    let server = network.join();
    let client_endpoint = network.join();
    let config = ChunkTransferConfig {
        verify_upload_hash: false,
        ..Default::default()
    };
    let store = Arc::new(LocalChunkStore::new(4));
    server.register_handler(Arc::new(ChunkProtocolHandler::with_provider(
        server.peer_id(),
        &config,
        store.clone(),
    )));

    let client = ChunkClient::new(Arc::new(client_endpoint), &config);
    client
        .upload_with_hash(&server.peer_id(), "m", 0, b"x".to_vec(), "bogus".into())
        .await
        .unwrap();
    assert!(store.contains("m", 0));
}

#[tokio::test]
async fn test_handler_wire_exchange_over_duplex() {
    let store = Arc::new(LocalChunkStore::new(4));
    store.add_transfer("m", vec![b"abc".to_vec()]);
    let handler = ChunkProtocolHandler::with_provider(
        PeerId::random(),
        &ChunkTransferConfig::default(),
        store,
    );

    let (mut client, server) = duplex_pair();
    let serve = tokio::spawn(async move { handler.handle(PeerId::random(), Box::new(server)).await });

    write_json(&mut client, &serde_json::json!({
        "type": "chunk-request",
        "requestId": "req-1",
        "manifestId": "m",
        "chunkIndex": 0
    }))
    .await
    .unwrap();
    let reply: serde_json::Value = read_json(&mut client).await.unwrap();
    assert_eq!(reply["type"], "chunk-response");
    assert_eq!(reply["requestId"], "req-1");
    assert_eq!(reply["data"], "YWJj");
    assert_eq!(reply["status"], "success");

    // Handler closes its side after one exchange.
    assert!(client.read_frame().await.unwrap().is_none());
    serve.await.unwrap();
}

#[tokio::test]
async fn test_unexpected_inbound_message_gets_error() {
    let handler = ChunkProtocolHandler::new(PeerId::random(), &ChunkTransferConfig::default());
    let reply = handler.respond(&PeerId::random(), ChunkMessage::error("r", "boom"));
    assert!(matches!(reply, ChunkMessage::ChunkError(ref e) if e.reason == "unexpected-message"));
}

/// Reads the request and never answers.
struct SilentHandler;

#[async_trait]
impl ProtocolHandler for SilentHandler {
    fn protocol(&self) -> &'static str {
        CHUNK_PROTOCOL
    }

    async fn handle(&self, _remote: PeerId, mut stream: Box<dyn FrameStream>) {
        let _ = stream.read_frame().await;
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_request_times_out() {
    let network = InMemoryNetwork::new();
    let server = network.join();
    server.register_handler(Arc::new(SilentHandler));
    let client = ChunkClient::new(Arc::new(network.join()), &ChunkTransferConfig::default());

    let err = client.request_chunk(&server.peer_id(), "m", 0).await.unwrap_err();
    assert!(matches!(err, ChunkTransferError::Timeout(30_000)));
    assert_eq!(err.status(), "timeout");
}

#[tokio::test]
async fn test_unknown_peer_is_unreachable() {
    let fx = fixture();
    let err = fx.client.request_chunk(&PeerId::random(), "m", 0).await.unwrap_err();
    assert_eq!(err.status(), "unreachable");
}

#[tokio::test]
async fn test_replication_reports_every_chunk() {
    let network = InMemoryNetwork::new();
    let server = network.join();
    let client_endpoint: MemoryEndpoint = network.join();
    let config = ChunkTransferConfig::default();
    let store = Arc::new(LocalChunkStore::new(16));
    server.register_handler(Arc::new(ChunkProtocolHandler::with_provider(
        server.peer_id(),
        &config,
        store.clone(),
    )));
    let client = ChunkClient::new(Arc::new(client_endpoint), &config);

    let chunks = vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()];
    let mut progress = Vec::new();
    let report = client
        .replicate_to_peer(&server.peer_id(), "m", &chunks, |p| progress.push(p))
        .await;

    assert_eq!(report.successful, 3);
    assert_eq!(report.failed, 0);
    assert_eq!(progress.len(), 3);
    assert_eq!(progress[2].completed, 3);
    assert!(progress.iter().all(|p| p.succeeded && p.total == 3));
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(store.get("m", i as u32).as_ref(), Some(chunk));
    }
}

#[tokio::test]
async fn test_replication_continues_past_failures() {
    let fx = fixture();
    let chunks = vec![b"a".to_vec(), b"b".to_vec()];
    // Unknown peer: every upload fails, the pass still completes.
    let mut calls = 0;
    let report = fx
        .client
        .replicate_to_peer(&PeerId::random(), "m", &chunks, |_| calls += 1)
        .await;

    assert_eq!(calls, 2);
    assert_eq!(report.successful, 0);
    assert_eq!(report.failed, 2);
    assert_eq!(report.errors[1].chunk_index, 1);
}
