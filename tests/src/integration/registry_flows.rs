//! # Publish / Resolve Flows Against the Live Registry
//!
//! Publisher and resolver talk to a real dw-04 REST server over loopback
//! HTTP. Peers are in-memory endpoints serving `/dweb/chunk/1.0.0` from a
//! `LocalChunkStore`, so the peer tier runs the real chunk protocol
//! without sockets.

use std::sync::Arc;
use std::time::Duration;

use dw_02_chunk_transfer::{ChunkClient, ChunkProtocolHandler, ChunkTransferConfig, LocalChunkStore};
use dw_03_domain_dht::{DhtConfig, DomainDht, InMemoryDht};
use dw_04_registry::domain::ownership::{owner_for_public_key, personal_message_hash};
use dw_05_resolver::{
    ChunkSource, ClientError, DomainBinding, DomainSource, HttpPointerFetcher, HttpRegistryClient,
    MemoryObserver, PeerBridge, PublishOptions, Publisher, RegistryApi, ResolveError, Resolver,
    ResolverConfig, StorageClient,
};
use k256::ecdsa::SigningKey;
use rand::RngCore;
use shared_types::testing::{InMemoryNetwork, MemoryEndpoint};

use super::fixtures::{RegistryFixture, StorageFixture};

const CHUNK: usize = 64 * 1024;
const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// FIXTURES
// =============================================================================

fn random_bytes(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut data);
    data
}

fn registry_client(registry: &RegistryFixture) -> Arc<HttpRegistryClient> {
    Arc::new(HttpRegistryClient::new(registry.url.clone(), HTTP_TIMEOUT).unwrap())
}

/// An endpoint serving chunks out of its own store.
fn holder(network: &Arc<InMemoryNetwork>) -> (MemoryEndpoint, Arc<LocalChunkStore>) {
    let endpoint = network.join();
    let store = Arc::new(LocalChunkStore::default());
    endpoint.register_handler(Arc::new(ChunkProtocolHandler::with_provider(
        endpoint.peer_id(),
        &ChunkTransferConfig::default(),
        store.clone(),
    )));
    (endpoint, store)
}

fn resolver_config(registry: &RegistryFixture) -> ResolverConfig {
    ResolverConfig {
        registry_url: registry.url.clone(),
        prefer_cache: false,
        ..ResolverConfig::default()
    }
}

fn resolver(
    registry: &RegistryFixture,
    network: &Arc<InMemoryNetwork>,
    config: ResolverConfig,
) -> (Resolver, Arc<MemoryObserver>) {
    let client = ChunkClient::new(Arc::new(network.join()), &ChunkTransferConfig::default());
    let observer = Arc::new(MemoryObserver::new());
    let resolver = Resolver::new(
        registry_client(registry),
        Arc::new(HttpPointerFetcher::new(HTTP_TIMEOUT).unwrap()),
        config,
    )
    .with_peers(Arc::new(PeerBridge::spawn(client, Duration::from_secs(2))))
    .with_observer(observer.clone());
    (resolver, observer)
}

fn options(name: &str) -> PublishOptions {
    PublishOptions {
        file_name: name.to_string(),
        chunk_size: CHUNK,
        ..PublishOptions::default()
    }
}

// =============================================================================
// PEER TIER
// =============================================================================

#[tokio::test]
async fn test_published_file_resolves_from_seeding_peer() {
    let registry = RegistryFixture::start().await.unwrap();
    let network = InMemoryNetwork::new();
    let (seed, store) = holder(&network);

    let data = random_bytes(3 * CHUNK + 100);
    let report = Publisher::new(registry_client(&registry))
        .with_seeding(store, seed.peer_id().to_string())
        .publish(&data, options("site.tar"))
        .await
        .unwrap();
    let manifest_id = report.manifest.manifest.manifest_id.clone();
    assert_eq!(report.manifest.manifest.chunk_count, 4);
    assert_eq!(report.manifest.replicas, vec![seed.peer_id().to_string()]);

    let mut config = resolver_config(&registry);
    config.registry_fallback = false;
    let (resolver, observer) = resolver(&registry, &network, config);

    let file = resolver.resolve_manifest(&manifest_id).await.unwrap();
    assert_eq!(file.data, data);
    let seed_id = seed.peer_id().to_string();
    assert!(file
        .sources
        .iter()
        .all(|s| matches!(s, ChunkSource::Peer { peer } if *peer == seed_id)));
    assert!(observer.reasons(0).is_empty());
}

#[tokio::test]
async fn test_replica_update_points_resolver_at_new_holder() {
    let registry = RegistryFixture::start().await.unwrap();
    let network = InMemoryNetwork::new();
    let data = random_bytes(2 * CHUNK);

    // Registered without any replica; nobody can serve it yet.
    let report = Publisher::new(registry_client(&registry))
        .publish(&data, options("late.bin"))
        .await
        .unwrap();
    let manifest_id = report.manifest.manifest.manifest_id.clone();

    let mut config = resolver_config(&registry);
    config.registry_fallback = false;
    let (resolver, observer) = resolver(&registry, &network, config);
    let err = resolver.resolve_manifest(&manifest_id).await.unwrap_err();
    assert!(matches!(err, ResolveError::ChunkUnavailable { index: 0, .. }));
    assert_eq!(observer.reasons(0)[0], "peer-none");

    let (late, store) = holder(&network);
    store.add_transfer(manifest_id.clone(), dw_05_resolver::domain::split_chunks(&data, CHUNK));
    let view = registry_client(&registry)
        .update_replicas(&manifest_id, &late.peer_id().to_string(), None)
        .await
        .unwrap();
    assert_eq!(view.chunk_replicas[1], vec![late.peer_id().to_string()]);

    let file = resolver.resolve_manifest(&manifest_id).await.unwrap();
    assert_eq!(file.data, data);
}

// =============================================================================
// REGISTRY TIERS
// =============================================================================

#[tokio::test]
async fn test_storage_pointer_serves_when_seed_leaves() {
    let registry = RegistryFixture::start().await.unwrap();
    let storage = StorageFixture::start().await.unwrap();
    let network = InMemoryNetwork::new();
    let (seed, store) = holder(&network);

    let data = random_bytes(2 * CHUNK + 1);
    let report = Publisher::new(registry_client(&registry))
        .with_seeding(store, seed.peer_id().to_string())
        .with_storage(StorageClient::new(storage.url.clone(), HTTP_TIMEOUT).unwrap())
        .publish(&data, options("mirror.bin"))
        .await
        .unwrap();
    assert_eq!(report.pointers_set, 3);
    assert_eq!(storage.len(), 3);
    assert!(report.manifest.chunk_pointers.iter().all(Option::is_some));

    network.leave(&seed.peer_id());
    let (resolver, observer) = resolver(&registry, &network, resolver_config(&registry));
    let manifest_id = report.manifest.manifest.manifest_id.clone();

    let file = resolver.resolve_manifest(&manifest_id).await.unwrap();
    assert_eq!(file.data, data);
    assert!(file.sources.iter().all(|s| matches!(s, ChunkSource::Pointer { .. })));
    assert!(observer.reasons(0)[0].starts_with("peer-"));
}

#[tokio::test]
async fn test_dead_pointer_falls_through_to_inline_data() {
    let registry = RegistryFixture::start().await.unwrap();
    let storage = StorageFixture::start().await.unwrap();
    let network = InMemoryNetwork::new();

    let data = random_bytes(CHUNK + 10);
    let report = Publisher::new(registry_client(&registry))
        .with_storage(StorageClient::new(storage.url.clone(), HTTP_TIMEOUT).unwrap())
        .publish(
            &data,
            PublishOptions {
                inline_data: true,
                ..options("inline.bin")
            },
        )
        .await
        .unwrap();
    let manifest_id = report.manifest.manifest.manifest_id.clone();
    storage.forget(&manifest_id, 1);

    let (resolver, observer) = resolver(&registry, &network, resolver_config(&registry));
    let file = resolver.resolve_manifest(&manifest_id).await.unwrap();
    assert_eq!(file.data, data);
    assert!(matches!(file.sources[0], ChunkSource::Pointer { .. }));
    assert_eq!(file.sources[1], ChunkSource::Inline);
    assert_eq!(observer.reasons(1), vec!["peer-none", "pointer-404"]);
}

#[tokio::test]
async fn test_swept_pointer_leaves_inline_copy() {
    let registry = RegistryFixture::start().await.unwrap();
    let storage = StorageFixture::start().await.unwrap();
    let network = InMemoryNetwork::new();

    let data = random_bytes(CHUNK / 2);
    let report = Publisher::new(registry_client(&registry))
        .with_storage(StorageClient::new(storage.url.clone(), HTTP_TIMEOUT).unwrap())
        .publish(
            &data,
            PublishOptions {
                inline_data: true,
                pointer_ttl_ms: Some(1),
                ..options("short-lived.bin")
            },
        )
        .await
        .unwrap();
    let manifest_id = report.manifest.manifest.manifest_id.clone();

    tokio::time::sleep(Duration::from_millis(20)).await;
    let pruned = registry.service.prune_expired_pointers_now().unwrap();
    assert_eq!(pruned.cleared, 1);

    let chunk = registry_client(&registry).get_chunk(&manifest_id, 0).await.unwrap();
    assert_eq!(chunk.pointer, None);
    assert!(chunk.data.is_some());

    let (resolver, _) = resolver(&registry, &network, resolver_config(&registry));
    let file = resolver.resolve_manifest(&manifest_id).await.unwrap();
    assert_eq!(file.data, data);
    assert_eq!(file.sources, vec![ChunkSource::Inline]);
}

#[tokio::test]
async fn test_unknown_manifest_is_registry_404() {
    let registry = RegistryFixture::start().await.unwrap();
    let network = InMemoryNetwork::new();
    let (resolver, _) = resolver(&registry, &network, resolver_config(&registry));

    let err = resolver.resolve_manifest("no-such-manifest").await.unwrap_err();
    match err {
        ResolveError::Registry(e) => {
            assert!(e.is_not_found());
            assert!(matches!(
                e,
                ClientError::Status { code: Some(ref code), .. } if code == "MANIFEST_NOT_FOUND"
            ));
        }
        other => panic!("expected registry error, got {other:?}"),
    }
}

// =============================================================================
// DOMAINS
// =============================================================================

#[tokio::test]
async fn test_domain_resolves_from_dht_then_registry() {
    let registry = RegistryFixture::start().await.unwrap();
    let network = InMemoryNetwork::new();
    let (seed, store) = holder(&network);
    let dht = InMemoryDht::new();
    let dht_config = DhtConfig::default();

    let data = random_bytes(CHUNK + 5);
    let report = Publisher::new(registry_client(&registry))
        .with_seeding(store, seed.peer_id().to_string())
        .with_dht(DomainDht::new(Arc::new(dht.clone()), seed.peer_id().to_string(), &dht_config))
        .publish(
            &data,
            PublishOptions {
                domain: Some(DomainBinding {
                    domain: "Docs.Example".to_string(),
                    owner: "alice".to_string(),
                    ..DomainBinding::default()
                }),
                ..options("index.html")
            },
        )
        .await
        .unwrap();
    assert!(report.dht_published);
    let record = report.domain.unwrap();
    assert_eq!(record.domain, "docs.example");

    let (with_dht, _) = resolver(&registry, &network, resolver_config(&registry));
    let with_dht = with_dht.with_dht(DomainDht::new(Arc::new(dht), "reader", &dht_config));
    let found = with_dht.resolve_domain("docs.example").await.unwrap();
    assert_eq!(found.source, DomainSource::Dht);
    assert_eq!(found.manifest_id, record.manifest_id);

    let (registry_only, _) = resolver(&registry, &network, resolver_config(&registry));
    let found = registry_only.resolve_domain("docs.example").await.unwrap();
    assert_eq!(found.source, DomainSource::Registry);

    let file = registry_only.resolve_domain_file("docs.example").await.unwrap();
    assert_eq!(file.data, data);

    let err = registry_only.resolve_domain("missing.example").await.unwrap_err();
    assert!(matches!(err, ResolveError::DomainNotFound(_)));
}

#[tokio::test]
async fn test_crypto_owner_binding_requires_proof() {
    let registry = RegistryFixture::start().await.unwrap();
    let signing_key = SigningKey::random(&mut rand::thread_rng());
    let verifying_key = signing_key.verifying_key();
    let owner = owner_for_public_key(verifying_key);
    let message = "bind signed.example";
    let (signature, recovery_id) = signing_key
        .sign_prehash_recoverable(&personal_message_hash(message))
        .unwrap();
    let mut sig_bytes = signature.to_bytes().to_vec();
    sig_bytes.push(27 + recovery_id.to_byte());

    let publisher = Publisher::new(registry_client(&registry));
    let unsigned = publisher
        .publish(
            b"hello",
            PublishOptions {
                domain: Some(DomainBinding {
                    domain: "signed.example".to_string(),
                    owner: owner.clone(),
                    ..DomainBinding::default()
                }),
                ..options("hello.txt")
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        unsigned,
        ResolveError::Registry(ClientError::Status { status: 401, .. })
    ));

    let binding = DomainBinding {
        domain: "signed.example".to_string(),
        owner: owner.clone(),
        public_key: Some(hex::encode(verifying_key.to_encoded_point(false).as_bytes())),
        signature: Some(format!("0x{}", hex::encode(&sig_bytes))),
        message: Some(message.to_string()),
        ..DomainBinding::default()
    };
    let report = publisher
        .publish(
            b"hello",
            PublishOptions {
                domain: Some(binding.clone()),
                ..options("hello.txt")
            },
        )
        .await
        .unwrap();
    assert_eq!(report.domain.unwrap().owner, owner);

    let taken = publisher
        .publish(
            b"other",
            PublishOptions {
                domain: Some(binding),
                ..options("other.txt")
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        taken,
        ResolveError::Registry(ClientError::Status { status: 409, .. })
    ));
}
