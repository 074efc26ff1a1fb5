//! # Mesh Flows
//!
//! Full `PeerRuntime` nodes on loopback QUIC: identity handshake, chunk
//! protocol and record DHT all run over real connections, with a live
//! registry alongside.

use std::time::Duration;

use dw_01_peer_discovery::NodeConfig;
use dw_05_resolver::{ChunkSource, DomainBinding, DomainSource, PublishOptions};
use node_runtime::{DwebConfig, PeerRuntime};
use rand::RngCore;
use tempfile::TempDir;

use super::fixtures::RegistryFixture;

async fn wait_until(what: &str, check: impl Fn() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {what}");
}

fn peer_config(dir: &TempDir, registry: &RegistryFixture) -> DwebConfig {
    let mut config = DwebConfig {
        data_dir: dir.path().to_path_buf(),
        node: NodeConfig::for_testing(),
        ..DwebConfig::default()
    };
    config.resolver.registry_url = registry.url.clone();
    config
}

/// Seed node plus a second node bootstrapped from it, connected both ways.
async fn pair(registry: &RegistryFixture) -> (PeerRuntime, PeerRuntime, [TempDir; 2]) {
    let dirs = [TempDir::new().unwrap(), TempDir::new().unwrap()];

    let seed = PeerRuntime::start(&peer_config(&dirs[0], registry)).await.unwrap();

    let mut config = peer_config(&dirs[1], registry);
    config.node.bootstrap_peers = seed.node().listen_addrs();
    config.resolver.registry_fallback = false;
    let reader = PeerRuntime::start(&config).await.unwrap();

    let seed_id = seed.node().local_peer_id();
    let reader_id = reader.node().local_peer_id();
    wait_until("reader connected", || reader.node().is_connected(&seed_id)).await;
    wait_until("seed sees reader", || seed.node().is_connected(&reader_id)).await;
    (seed, reader, dirs)
}

fn random_bytes(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut data);
    data
}

#[tokio::test]
async fn test_reader_fetches_chunks_from_seed_over_quic() {
    let registry = RegistryFixture::start().await.unwrap();
    let (seed, reader, _dirs) = pair(&registry).await;

    let data = random_bytes(300 * 1024);
    let report = seed
        .publisher(None)
        .unwrap()
        .publish(
            &data,
            PublishOptions {
                file_name: "bundle.bin".to_string(),
                ..PublishOptions::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(report.manifest.manifest.chunk_count, 2);

    let file = reader
        .resolver()
        .unwrap()
        .resolve_manifest(&report.manifest.manifest.manifest_id)
        .await
        .unwrap();
    assert_eq!(file.data, data);

    let seed_id = seed.node().local_peer_id().to_string();
    assert!(file
        .sources
        .iter()
        .all(|s| matches!(s, ChunkSource::Peer { peer } if *peer == seed_id)));

    reader.shutdown().await;
    seed.shutdown().await;
}

#[tokio::test]
async fn test_domain_published_by_seed_resolves_on_reader_dht() {
    let registry = RegistryFixture::start().await.unwrap();
    let (seed, reader, _dirs) = pair(&registry).await;

    let data = b"<html>mesh</html>".to_vec();
    let report = seed
        .publisher(None)
        .unwrap()
        .publish(
            &data,
            PublishOptions {
                file_name: "index.html".to_string(),
                mime_type: "text/html".to_string(),
                domain: Some(DomainBinding {
                    domain: "mesh.example".to_string(),
                    owner: "alice".to_string(),
                    ..DomainBinding::default()
                }),
                ..PublishOptions::default()
            },
        )
        .await
        .unwrap();
    assert!(report.dht_published);

    let resolver = reader.resolver().unwrap();
    let found = resolver.resolve_domain("mesh.example").await.unwrap();
    assert_eq!(found.source, DomainSource::Dht);
    assert_eq!(found.manifest_id, report.manifest.manifest.manifest_id);

    let file = resolver.resolve_domain_file("mesh.example").await.unwrap();
    assert_eq!(file.data, data);

    reader.shutdown().await;
    seed.shutdown().await;
}

#[tokio::test]
async fn test_shut_down_seed_leaves_chunk_unavailable() {
    let registry = RegistryFixture::start().await.unwrap();
    let (seed, reader, _dirs) = pair(&registry).await;

    let report = seed
        .publisher(None)
        .unwrap()
        .publish(b"ephemeral", PublishOptions::default())
        .await
        .unwrap();
    seed.shutdown().await;

    let err = reader
        .resolver()
        .unwrap()
        .resolve_manifest(&report.manifest.manifest.manifest_id)
        .await
        .unwrap_err();
    match err {
        dw_05_resolver::ResolveError::ChunkUnavailable { index, reasons } => {
            assert_eq!(index, 0);
            assert!(reasons[0].starts_with("peer-"));
            assert!(reasons.contains(&"registry-fallback-disabled".to_string()));
        }
        other => panic!("expected chunk-unavailable, got {other:?}"),
    }

    reader.shutdown().await;
}
