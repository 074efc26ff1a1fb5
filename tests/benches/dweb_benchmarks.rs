//! # DWeb Benchmarks
//!
//! | Area | Operation |
//! |------|-----------|
//! | dw-05 Publisher | chunking + SHA-256 of a file |
//! | dw-04 Registry | manifest create, chunk pointer update |
//! | dw-04 Ownership | `dweb:0x` signature verification |
//! | dw-05 Cache | chunk cache put/get |

use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use dw_04_registry::domain::ownership::{
    owner_for_public_key, personal_message_hash, verify_ownership, OwnershipProof,
};
use dw_04_registry::{InMemoryKVStore, ManifestSubmission, PointerUpdate, RegistryConfig, RegistryService};
use dw_05_resolver::{cache_key, ChunkCache, ChunkedFile, MemoryChunkCache};
use k256::ecdsa::SigningKey;
use rand::RngCore;
use shared_types::SystemTimeSource;

fn random_bytes(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut data);
    data
}

// ============================================================================
// DW-05: Chunking and hashing
// ============================================================================

fn bench_chunking(c: &mut Criterion) {
    let mut group = c.benchmark_group("dw-05-chunking");
    group.measurement_time(Duration::from_secs(5));

    for size in [64 * 1024, 1024 * 1024, 8 * 1024 * 1024] {
        let data = random_bytes(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("chunk_and_hash", size), &data, |b, data| {
            b.iter(|| {
                black_box(ChunkedFile::new(
                    "bench",
                    "bench.bin",
                    "application/octet-stream",
                    data,
                    256 * 1024,
                ))
            })
        });
    }
    group.finish();
}

// ============================================================================
// DW-04: Registry writes
// ============================================================================

fn submission(id: &str, file: &ChunkedFile) -> ManifestSubmission {
    let mut upload = serde_json::to_value(file.upload(false, &[])).unwrap_or_default();
    upload["manifestId"] = id.into();
    serde_json::from_value(upload).unwrap_or_default()
}

fn bench_registry(c: &mut Criterion) {
    let mut group = c.benchmark_group("dw-04-registry");
    let file = ChunkedFile::new("m", "f.bin", "application/octet-stream", &random_bytes(1024 * 1024), 64 * 1024);

    let service = RegistryService::new(
        Box::new(InMemoryKVStore::new()),
        Arc::new(SystemTimeSource),
        &RegistryConfig::default(),
    );
    let mut n = 0u64;
    group.bench_function("create_manifest_16_chunks", |b| {
        b.iter(|| {
            n += 1;
            black_box(service.create_manifest(submission(&format!("m-{n}"), &file)).is_ok())
        })
    });

    let _ = service.create_manifest(submission("pointers", &file));
    let mut i = 0u64;
    group.bench_function("update_chunk_pointer", |b| {
        b.iter(|| {
            i += 1;
            let update = PointerUpdate::set(
                format!("http://storage.test/chunks/pointers/{}", i % 16),
                None,
            );
            black_box(service.update_chunk_pointer("pointers", i % 16, &update).is_ok())
        })
    });
    group.finish();
}

// ============================================================================
// DW-04: Ownership proofs
// ============================================================================

fn bench_ownership(c: &mut Criterion) {
    let signing_key = SigningKey::random(&mut rand::thread_rng());
    let verifying_key = signing_key.verifying_key();
    let owner = owner_for_public_key(verifying_key);
    let message = "bind bench.example";
    let Ok((signature, _)) = signing_key.sign_prehash_recoverable(&personal_message_hash(message))
    else {
        return;
    };
    let public_key = hex::encode(verifying_key.to_encoded_point(false).as_bytes());
    let signature = hex::encode(signature.to_bytes());

    c.bench_function("dw-04-verify-ownership", |b| {
        b.iter(|| {
            let proof = OwnershipProof {
                public_key: &public_key,
                signature: &signature,
                message,
            };
            black_box(verify_ownership(&owner, Some(proof)).is_ok())
        })
    });
}

// ============================================================================
// DW-05: Chunk cache
// ============================================================================

fn bench_cache(c: &mut Criterion) {
    let cache = MemoryChunkCache::new();
    let chunk = random_bytes(256 * 1024);
    for index in 0..1024u32 {
        cache.put(&cache_key("http://registry.test", "m", index), chunk.clone());
    }

    let mut index = 0u32;
    c.bench_function("dw-05-cache-get", |b| {
        b.iter(|| {
            index = (index + 1) % 2048;
            black_box(cache.get(&cache_key("http://registry.test", "m", index)))
        })
    });
}

criterion_group!(benches, bench_chunking, bench_registry, bench_ownership, bench_cache);
criterion_main!(benches);
