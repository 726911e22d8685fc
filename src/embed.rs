//! §4.3 Embedder — query/element text→vector with batching and caching.
//!
//! The trait shape and cache-stats struct are grounded in
//! `aether-core`'s `EmbeddingProvider`/`LocalTextEmbedder` (lazy-load, LRU query
//! cache, `CacheStats`). Element-embedding caching itself is delegated to the Delta
//! Index (§4.2) so keys survive across snapshots, per spec; this module owns only the
//! query-embedding LRU and the embedding routines themselves.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{HerError, Result};
use crate::model::ElementDescriptor;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub capacity: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Small hand-rolled LRU, mirroring `aether-core::text_embed::EmbeddingCache`
/// (`HashMap` + `VecDeque` recency list) rather than pulling in an external LRU crate
/// for a structure this small.
struct QueryEmbeddingCache {
    capacity: usize,
    map: HashMap<String, Vec<f32>>,
    order: VecDeque<String>,
    hits: u64,
    misses: u64,
}

impl QueryEmbeddingCache {
    fn new(capacity: usize) -> Self {
        Self { capacity, map: HashMap::new(), order: VecDeque::new(), hits: 0, misses: 0 }
    }

    fn get(&mut self, key: &str) -> Option<Vec<f32>> {
        if let Some(v) = self.map.get(key) {
            self.hits += 1;
            self.order.retain(|k| k != key);
            self.order.push_back(key.to_string());
            Some(v.clone())
        } else {
            self.misses += 1;
            None
        }
    }

    fn insert(&mut self, key: String, value: Vec<f32>) {
        if self.map.contains_key(&key) {
            self.order.retain(|k| k != &key);
        } else if self.map.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.map.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.map.insert(key, value);
    }

    fn stats(&self) -> CacheStats {
        CacheStats { hits: self.hits, misses: self.misses, size: self.map.len(), capacity: self.capacity }
    }
}

/// Trait for query/element embedding providers (§4.3), mirroring this codebase's
/// reranker/embedder trait shape: `kind()`, readiness, fallible `init()`.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn kind(&self) -> &'static str;
    fn dimension(&self) -> usize;

    async fn embed_query_raw(&self, text: &str) -> Result<Vec<f32>>;
    async fn embed_elements_raw(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn is_ready(&self) -> bool {
        true
    }

    async fn init(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Wraps an `EmbeddingProvider` with the query-embedding LRU and the element-text
/// canonicalization + batching policy (§4.3).
pub struct Embedder<P: EmbeddingProvider> {
    provider: P,
    query_cache: Mutex<QueryEmbeddingCache>,
    batch_size: usize,
    token_budget: usize,
}

impl<P: EmbeddingProvider> Embedder<P> {
    pub fn new(provider: P) -> Self {
        Self::with_config(provider, 256, 64, 96)
    }

    pub fn with_config(provider: P, query_cache_capacity: usize, batch_size: usize, token_budget: usize) -> Self {
        Self {
            provider,
            query_cache: Mutex::new(QueryEmbeddingCache::new(query_cache_capacity)),
            batch_size,
            token_budget,
        }
    }

    pub fn dimension(&self) -> usize {
        self.provider.dimension()
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.query_cache.lock().unwrap().stats()
    }

    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(cached) = self.query_cache.lock().unwrap().get(text) {
            return Ok(cached);
        }
        let vector = l2_normalize(self.provider.embed_query_raw(text).await?);
        self.query_cache.lock().unwrap().insert(text.to_string(), vector.clone());
        Ok(vector)
    }

    /// Embeds the given descriptors in batches of `batch_size`, returning
    /// `(element_key, vector)` pairs in input order.
    pub async fn embed_elements(&self, descriptors: &[&ElementDescriptor]) -> Result<Vec<(String, Vec<f32>)>> {
        let mut out = Vec::with_capacity(descriptors.len());
        for chunk in descriptors.chunks(self.batch_size) {
            let texts: Vec<String> = chunk.iter().map(|d| d.canonical_text(self.token_budget)).collect();
            let vectors = self.provider.embed_elements_raw(&texts).await?;
            if vectors.len() != chunk.len() {
                return Err(HerError::Embedding(format!(
                    "provider returned {} vectors for {} inputs",
                    vectors.len(),
                    chunk.len()
                )));
            }
            for (descriptor, vector) in chunk.iter().zip(vectors) {
                out.push((descriptor.element_key(), l2_normalize(vector)));
            }
        }
        Ok(out)
    }
}

pub fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    v
}

/// Deterministic, model-free embedder: hashes token n-grams into a fixed-width
/// bag-of-features vector. Stands in for a real model in tests and CI, the same way
/// this codebase's `MockEmbeddingProvider`/`MockReranker` stand in for theirs — never
/// a hard dependency on model weights being present.
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    fn hash_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for token in text.split_whitespace() {
            let h = crate::hashutil::stable_digest_full(&[token]);
            let bucket = u64::from_str_radix(&h[..8], 16).unwrap_or(0) as usize % self.dim;
            v[bucket] += 1.0;
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn kind(&self) -> &'static str {
        "hash-embedder"
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    async fn embed_query_raw(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.hash_text(text))
    }

    async fn embed_elements_raw(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.hash_text(t)).collect())
    }
}
