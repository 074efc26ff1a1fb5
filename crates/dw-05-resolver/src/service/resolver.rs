//! The chunk fallback cascade.
//!
//! For each chunk, stopping at the first success:
//!
//! 1. local cache, when `prefer_cache` is set
//! 2. every replica peer, through the peer bridge
//! 3. (registry fallback only) a fresh registry chunk record, then its
//!    pointer URL, then its inline data
//! 4. local cache, when not already tried
//!
//! Every tier records an attempt with the observer.

use std::sync::Arc;

use dw_03_domain_dht::DomainDht;
use shared_types::encoding::sha256_hex;
use shared_types::{add_unique, ChunkView, ManifestView};
use tracing::{debug, info, warn};

use crate::adapters::{cache_key, TracingObserver};
use crate::config::ResolverConfig;
use crate::domain::*;
use crate::ports::{ChunkCache, PeerChunkSource, PointerFetcher, RegistryApi, ResolutionObserver};

/// A fully resolved file.
#[derive(Debug, Clone)]
pub struct ResolvedFile {
    pub manifest: ManifestView,
    pub data: Vec<u8>,
    /// Source of each chunk, index-aligned.
    pub sources: Vec<ChunkSource>,
}

/// Where a domain binding was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainSource {
    Dht,
    Registry,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainResolution {
    pub domain: String,
    pub manifest_id: String,
    pub source: DomainSource,
}

pub struct Resolver {
    registry: Arc<dyn RegistryApi>,
    pointers: Arc<dyn PointerFetcher>,
    peers: Option<Arc<dyn PeerChunkSource>>,
    cache: Option<Arc<dyn ChunkCache>>,
    observer: Arc<dyn ResolutionObserver>,
    dht: Option<DomainDht>,
    config: ResolverConfig,
}

/// Per-chunk bookkeeping shared by the tiers.
struct ChunkContext<'a> {
    manifest: &'a ManifestView,
    index: u32,
    reasons: Vec<String>,
}

impl Resolver {
    pub fn new(
        registry: Arc<dyn RegistryApi>,
        pointers: Arc<dyn PointerFetcher>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            registry,
            pointers,
            peers: None,
            cache: None,
            observer: Arc::new(TracingObserver),
            dht: None,
            config,
        }
    }

    pub fn with_peers(mut self, peers: Arc<dyn PeerChunkSource>) -> Self {
        self.peers = Some(peers);
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn ChunkCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ResolutionObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_dht(mut self, dht: DomainDht) -> Self {
        self.dht = Some(dht);
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Fetch the manifest and resolve every chunk in index order.
    pub async fn resolve_manifest(&self, manifest_id: &str) -> Result<ResolvedFile, ResolveError> {
        let manifest = self.registry.get_manifest(manifest_id).await?;
        let count = manifest.manifest.chunk_count;

        // Sized from what actually arrived; the manifest's sizes are not trusted.
        let mut chunks = Vec::new();
        let mut sources = Vec::new();
        for index in 0..count {
            let (chunk, source) = self.resolve_chunk(&manifest, index).await?;
            chunks.push(chunk);
            sources.push(source);
        }
        let data = chunks.concat();

        if self.config.verify_hashes && !manifest.manifest.sha256.is_empty() {
            let actual = sha256_hex(&data);
            if actual != manifest.manifest.sha256 {
                return Err(ResolveError::FileHashMismatch {
                    expected: manifest.manifest.sha256.clone(),
                    actual,
                });
            }
        }

        info!(
            manifest_id = %manifest_id,
            chunks = count,
            bytes = data.len(),
            "[dw-05] ✅ File resolved"
        );
        Ok(ResolvedFile {
            manifest,
            data,
            sources,
        })
    }

    /// Resolve one chunk of an already fetched manifest.
    pub async fn resolve_chunk(
        &self,
        manifest: &ManifestView,
        index: u32,
    ) -> Result<(Vec<u8>, ChunkSource), ResolveError> {
        let mut ctx = ChunkContext {
            manifest,
            index,
            reasons: Vec::new(),
        };

        let resolved = match self.cascade(&mut ctx).await {
            Some(resolved) => resolved,
            None => {
                self.fallback(&mut ctx, Tier::Cache, REASON_CHUNK_UNAVAILABLE.to_string());
                warn!(
                    manifest_id = %manifest.manifest.manifest_id,
                    chunk_index = index,
                    reasons = ?ctx.reasons,
                    "[dw-05] Chunk unavailable"
                );
                return Err(ResolveError::ChunkUnavailable {
                    index,
                    reasons: ctx.reasons,
                });
            }
        };

        if resolved.1 != ChunkSource::Cache {
            if let Some(cache) = &self.cache {
                cache.put(&self.cache_key(&ctx), resolved.0.clone());
            }
        }
        Ok(resolved)
    }

    async fn cascade(&self, ctx: &mut ChunkContext<'_>) -> Option<(Vec<u8>, ChunkSource)> {
        if self.config.prefer_cache {
            if let Some(hit) = self.from_cache(ctx) {
                return Some(hit);
            }
        }

        if let Some(hit) = self.from_peers(ctx).await {
            return Some(hit);
        }

        if self.config.registry_fallback {
            let record = self.fresh_record(ctx).await;
            if let Some(hit) = self.from_pointer(ctx, record.pointer.as_deref()).await {
                return Some(hit);
            }
            if let Some(hit) = self.from_inline(ctx, record.data) {
                return Some(hit);
            }
        } else {
            self.fallback(ctx, Tier::Registry, REASON_FALLBACK_DISABLED.to_string());
        }

        if !self.config.prefer_cache {
            return self.from_cache(ctx);
        }
        None
    }

    fn from_cache(&self, ctx: &mut ChunkContext<'_>) -> Option<(Vec<u8>, ChunkSource)> {
        let data = self.cache.as_ref()?.get(&self.cache_key(ctx))?;
        self.served(ctx, Tier::Cache, ChunkSource::Cache);
        Some((data, ChunkSource::Cache))
    }

    async fn from_peers(&self, ctx: &mut ChunkContext<'_>) -> Option<(Vec<u8>, ChunkSource)> {
        let peers = self.peers.as_ref()?;
        let candidates = candidate_peers(ctx.manifest, ctx.index);
        if candidates.is_empty() {
            self.fallback(ctx, Tier::Peer, REASON_NO_PEERS.to_string());
            return None;
        }

        let manifest = ctx.manifest;
        let manifest_id = &manifest.manifest.manifest_id;
        let expected = manifest.manifest.chunk_hashes.get(ctx.index as usize);
        for peer in candidates {
            match peers.fetch_chunk(&peer, manifest_id, ctx.index).await {
                Ok(data) => {
                    let verified = !self.config.verify_hashes
                        || expected.map_or(true, |hash| *hash == sha256_hex(&data));
                    if verified {
                        let source = ChunkSource::Peer { peer };
                        self.served(ctx, Tier::Peer, source.clone());
                        return Some((data, source));
                    }
                    debug!(peer = %peer, chunk_index = ctx.index, "[dw-05] Peer served corrupt chunk");
                    self.fallback(ctx, Tier::Peer, REASON_PEER_HASH_MISMATCH.to_string());
                }
                Err(e) => {
                    debug!(peer = %peer, chunk_index = ctx.index, error = %e, "[dw-05] Peer fetch failed");
                    self.fallback(ctx, Tier::Peer, peer_reason(e.status()));
                }
            }
        }
        None
    }

    /// Current registry record for the chunk. Falls back to the manifest
    /// snapshot when the registry cannot answer.
    async fn fresh_record(&self, ctx: &mut ChunkContext<'_>) -> ChunkSnapshot {
        let manifest = ctx.manifest;
        let manifest_id = &manifest.manifest.manifest_id;
        match self.registry.get_chunk(manifest_id, ctx.index).await {
            Ok(view) => ChunkSnapshot::from(view),
            Err(e) => {
                let reason = if e.is_not_found() {
                    REASON_CHUNK_MISSING
                } else {
                    REASON_REGISTRY_ERROR
                };
                debug!(manifest_id = %manifest_id, chunk_index = ctx.index, error = %e, "[dw-05] Registry chunk lookup failed");
                self.fallback(ctx, Tier::Registry, reason.to_string());
                ChunkSnapshot::from_manifest(manifest, ctx.index)
            }
        }
    }

    async fn from_pointer(
        &self,
        ctx: &mut ChunkContext<'_>,
        pointer: Option<&str>,
    ) -> Option<(Vec<u8>, ChunkSource)> {
        let url = pointer?;
        match self.pointers.fetch(url).await {
            Ok(data) => {
                let source = ChunkSource::Pointer {
                    url: url.to_string(),
                };
                self.served(ctx, Tier::Pointer, source.clone());
                Some((data, source))
            }
            Err(e) => {
                let reason = match e {
                    PointerError::Status(status) => pointer_status_reason(status),
                    PointerError::Fetch(_) => REASON_POINTER_ERROR.to_string(),
                };
                debug!(url = %url, error = %e, "[dw-05] Pointer fetch failed");
                self.fallback(ctx, Tier::Pointer, reason);
                None
            }
        }
    }

    fn from_inline(
        &self,
        ctx: &mut ChunkContext<'_>,
        data: Option<Vec<u8>>,
    ) -> Option<(Vec<u8>, ChunkSource)> {
        let data = data?;
        self.served(ctx, Tier::Inline, ChunkSource::Inline);
        Some((data, ChunkSource::Inline))
    }

    fn cache_key(&self, ctx: &ChunkContext<'_>) -> String {
        cache_key(
            self.registry.endpoint(),
            &ctx.manifest.manifest.manifest_id,
            ctx.index,
        )
    }

    fn served(&self, ctx: &ChunkContext<'_>, tier: Tier, source: ChunkSource) {
        self.observer.record(&ChunkAttempt {
            manifest_id: ctx.manifest.manifest.manifest_id.clone(),
            chunk_index: ctx.index,
            tier,
            outcome: AttemptOutcome::Served(source),
        });
    }

    fn fallback(&self, ctx: &mut ChunkContext<'_>, tier: Tier, reason: String) {
        self.observer.record(&ChunkAttempt {
            manifest_id: ctx.manifest.manifest.manifest_id.clone(),
            chunk_index: ctx.index,
            tier,
            outcome: AttemptOutcome::Fallback(reason.clone()),
        });
        ctx.reasons.push(reason);
    }

    /// Look up which manifest a domain points at: DHT first (when
    /// configured), then the registry.
    pub async fn resolve_domain(&self, domain: &str) -> Result<DomainResolution, ResolveError> {
        if let Some(dht) = &self.dht {
            match dht.resolve_domain(domain, Some(self.config.dht_timeout())).await {
                Ok(record) => {
                    debug!(domain = %domain, manifest_id = %record.manifest_id, "[dw-05] Domain resolved via DHT");
                    return Ok(DomainResolution {
                        domain: record.domain,
                        manifest_id: record.manifest_id,
                        source: DomainSource::Dht,
                    });
                }
                Err(e) => debug!(domain = %domain, error = %e, "[dw-05] DHT miss, asking registry"),
            }
        }

        match self.registry.get_domain(domain).await {
            Ok(record) => Ok(DomainResolution {
                domain: record.domain,
                manifest_id: record.manifest_id,
                source: DomainSource::Registry,
            }),
            Err(e) if e.is_not_found() => Err(ResolveError::DomainNotFound(domain.to_string())),
            Err(e) => Err(ResolveError::Registry(e)),
        }
    }

    /// Resolve a domain and then its file.
    pub async fn resolve_domain_file(&self, domain: &str) -> Result<ResolvedFile, ResolveError> {
        let resolution = self.resolve_domain(domain).await?;
        self.resolve_manifest(&resolution.manifest_id).await
    }
}

/// Pointer and inline data of one chunk.
struct ChunkSnapshot {
    pointer: Option<String>,
    data: Option<Vec<u8>>,
}

impl From<ChunkView> for ChunkSnapshot {
    fn from(view: ChunkView) -> Self {
        Self {
            pointer: view.pointer,
            data: view.data,
        }
    }
}

impl ChunkSnapshot {
    fn from_manifest(manifest: &ManifestView, index: u32) -> Self {
        let index = index as usize;
        Self {
            pointer: manifest.chunk_pointers.get(index).cloned().flatten(),
            data: manifest
                .chunk_data
                .get(index)
                .cloned()
                .flatten()
                .and_then(|encoded| shared_types::encoding::decode_base64(&encoded).ok()),
        }
    }
}

/// Chunk replicas first, then manifest-level replicas.
fn candidate_peers(manifest: &ManifestView, index: u32) -> Vec<String> {
    let mut peers = manifest
        .chunk_replicas
        .get(index as usize)
        .cloned()
        .unwrap_or_default();
    for peer in &manifest.replicas {
        add_unique(&mut peers, peer);
    }
    peers
}
