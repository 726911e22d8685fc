//! §4.10 Orchestrator — single entry point tying every stage together, plus the
//! `RetrievalResult` produced type (§6).

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::HerOptions;
use crate::delta::DeltaIndex;
use crate::driver::Driver;
use crate::embed::{Embedder, EmbeddingProvider};
use crate::error::HerError;
use crate::locator;
use crate::model::{Candidate, LocatorKind, PageSnapshot};
use crate::promotion::{self, PromotionStore};
use crate::ranker;
use crate::rerank::{self, DeepReranker};
use crate::snapshotter::Snapshotter;
use crate::snippet;
use crate::stability;
use crate::verify;

/// Synthesize+verify fallback budget (§4.10 step 5) — distinct from
/// `HerOptions::max_candidates`, which bounds the cache-consult stage.
const SYNTH_VERIFY_BUDGET: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResultSource {
    CacheHit,
    Ranked,
    FallbackUnverified,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub ok: bool,
    pub unique: bool,
    pub frame_path: Vec<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Diagnostics {
    pub cosine: f32,
    pub rerank: f32,
    pub fused: f32,
    pub promotion_prior: f32,
    pub candidates_considered: usize,
    pub timings_ms: BTreeMap<String, u64>,
    pub error_kind: String,
    /// Cross-origin frame URLs skipped while snapshotting (§4.1); always present,
    /// empty when nothing was skipped.
    pub skipped_frames: Vec<String>,
}

/// §6 "Retrieval result (produced)". All fields always present; absent values use
/// the schema's zero value — never omitted.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResult {
    pub success: bool,
    pub selector: String,
    pub strategy: String,
    pub confidence: f32,
    pub frame_path: Vec<String>,
    pub alternatives: Vec<String>,
    pub verification: VerificationReport,
    pub source: ResultSource,
    pub diagnostics: Diagnostics,
}

impl RetrievalResult {
    fn failure(error_kind: &str) -> Self {
        Self {
            success: false,
            selector: String::new(),
            strategy: String::new(),
            confidence: 0.0,
            frame_path: Vec::new(),
            alternatives: Vec::new(),
            verification: VerificationReport { ok: false, unique: false, frame_path: Vec::new(), error: Some(error_kind.to_string()) },
            source: ResultSource::FallbackUnverified,
            diagnostics: Diagnostics {
                cosine: 0.0,
                rerank: 0.0,
                fused: 0.0,
                promotion_prior: 0.0,
                candidates_considered: 0,
                timings_ms: BTreeMap::new(),
                error_kind: error_kind.to_string(),
                skipped_frames: Vec::new(),
            },
        }
    }
}

/// Per-session state: Delta Index and the previous snapshot, so a caller reuses one
/// `Orchestrator` across repeated `resolve()` calls on the same page (§4.2, §5).
pub struct Orchestrator<E: EmbeddingProvider, R: DeepReranker> {
    embedder: Embedder<E>,
    reranker: R,
    store: PromotionStore,
    options: HerOptions,
    delta: Mutex<DeltaIndex>,
    prior_snapshot: Mutex<Option<PageSnapshot>>,
}

impl<E: EmbeddingProvider, R: DeepReranker> Orchestrator<E, R> {
    pub fn new(embedder: E, reranker: R, store: PromotionStore, options: HerOptions) -> Self {
        Self {
            embedder: Embedder::new(embedder),
            reranker,
            store,
            options,
            delta: Mutex::new(DeltaIndex::new()),
            prior_snapshot: Mutex::new(None),
        }
    }

    /// §4.10: one entry, `resolve(step, page_handle, options) -> RetrievalResult`.
    /// `dom_hash` is the caller-supplied extra context-key component (§3
    /// `context_key`); `now` is the caller-supplied wall-clock time (kept explicit,
    /// like `PromotionStore`, so retrieval is deterministic in tests).
    pub async fn resolve(&self, step: &str, driver: &dyn Driver, dom_hash: Option<&str>, now: f64) -> RetrievalResult {
        let call_timeout = Duration::from_millis(self.options.per_call_timeout_ms);
        match timeout(call_timeout, self.resolve_once(step, driver, dom_hash, now)).await {
            Ok(result) => result,
            Err(_) => RetrievalResult::failure("timeout"),
        }
    }

    async fn resolve_once(&self, step: &str, driver: &dyn Driver, dom_hash: Option<&str>, now: f64) -> RetrievalResult {
        match self.resolve_inner(step, driver, dom_hash, now).await {
            Ok(result) => result,
            Err(err) if is_retryable(&err) => {
                warn!(error = %err, "resolve failed with a retryable error; retrying once after stability wait");
                stability::wait_document_ready(driver, self.options.per_call_timeout_ms.min(5_000)).await;
                match self.resolve_inner(step, driver, dom_hash, now).await {
                    Ok(result) => result,
                    Err(err) => RetrievalResult::failure(err.kind()),
                }
            }
            Err(err) => RetrievalResult::failure(err.kind()),
        }
    }

    async fn resolve_inner(
        &self,
        step: &str,
        driver: &dyn Driver,
        dom_hash: Option<&str>,
        now: f64,
    ) -> crate::error::Result<RetrievalResult> {
        let mut timings_ms = BTreeMap::new();
        let url = driver.current_url().await.map_err(|e| HerError::Driver(e.to_string()))?;
        // §3 `context_key` is keyed on host+path, not the full URL, so cache entries
        // aren't fragmented across query-string/fragment variants or http vs https.
        let context = promotion::context_key(&promotion::host_and_path(&url), dom_hash, None);

        // 1. ConsultCache.
        if let Some(hit) = self.consult_cache(&context, driver, now, &mut timings_ms).await {
            return Ok(hit);
        }

        // Stability waits before the expensive DOM+AX walk (§4.11).
        let wait_budget_ms = self.options.per_call_timeout_ms.min(5_000);
        stability::wait_document_ready(driver, wait_budget_ms).await;
        stability::wait_network_idle(driver, self.options.network_idle_ms, wait_budget_ms).await;
        if self.options.auto_overlay_dismiss {
            stability::dismiss_safe_overlays(driver, wait_budget_ms).await;
        }
        stability::wait_spinner_gone(driver, wait_budget_ms).await;

        // 2. Snapshot.
        let t0 = std::time::Instant::now();
        let prior = self.prior_snapshot.lock().unwrap().clone();
        let snapshotter = Snapshotter::new(driver);
        let snapshot = snapshotter.snapshot(&url, prior.as_ref()).await?;
        timings_ms.insert("snapshot".to_string(), t0.elapsed().as_millis() as u64);
        let skipped_frames = snapshot.skipped_frames.clone();

        if !snapshot.all_elements().any(|e| e.is_interactive) {
            return Err(HerError::NoElements);
        }

        let changed_keys = {
            let mut delta = self.delta.lock().unwrap();
            delta.refresh(&snapshot)
        };
        *self.prior_snapshot.lock().unwrap() = Some(snapshot);

        // Embed only what changed (§4.2 invariant 1).
        let t0 = std::time::Instant::now();
        {
            let descriptors: Vec<_> = {
                let delta = self.delta.lock().unwrap();
                changed_keys
                    .iter()
                    .filter_map(|k| delta.descriptor_for(k).cloned())
                    .collect()
            };
            if !descriptors.is_empty() {
                let refs: Vec<&_> = descriptors.iter().collect();
                let vectors = self.embedder.embed_elements(&refs).await?;
                self.delta.lock().unwrap().store_vectors(vectors);
            }
        }
        timings_ms.insert("embed".to_string(), t0.elapsed().as_millis() as u64);

        // 3. Shortlist. Only interactive elements are retrieval candidates; the Delta
        // Index still tracks every descriptor (needed for ancestor/sibling lookups in
        // the Snippet Builder and for stable content hashing), so the filter happens
        // here rather than in `DeltaIndex`/`Snapshotter`.
        let t0 = std::time::Instant::now();
        let query_vec = self.embedder.embed_query(step).await?;
        let (full_pool, pool, vectors) = {
            let delta = self.delta.lock().unwrap();
            let full_pool: Vec<_> = delta.all_elements().into_iter().cloned().collect();
            let all_vectors = delta.vectors(self.embedder.dimension());
            let mut pool = Vec::new();
            let mut vectors = Vec::new();
            for (descriptor, vector) in full_pool.iter().cloned().zip(all_vectors) {
                if descriptor.is_interactive {
                    pool.push(descriptor);
                    vectors.push(vector);
                }
            }
            (full_pool, pool, vectors)
        };
        let shortlist = ranker::shortlist(&query_vec, &vectors, self.options.shortlist_k);
        timings_ms.insert("shortlist".to_string(), t0.elapsed().as_millis() as u64);

        if shortlist.is_empty() {
            return Err(HerError::NoElements);
        }

        // 4. Rerank (+ synthesize candidates eagerly so the promotion prior can be
        // looked up before fusion, and so synth+verify doesn't redo this work).
        // Locator synthesis and snippet building consult the *full* pool (including
        // non-interactive ancestors/siblings), not just the interactive shortlist pool.
        let t0 = std::time::Instant::now();
        let pool_refs: Vec<&_> = full_pool.iter().collect();
        let mut candidates: Vec<Candidate> = Vec::with_capacity(shortlist.len());
        for entry in &shortlist {
            let descriptor = pool[entry.index].clone();
            let locator_candidates = locator::synthesize(&descriptor, &pool_refs);

            let promotion_prior = self
                .store
                .top_for_context(&context, self.options.max_candidates, 0.0, now)
                .iter()
                .filter(|r| locator_candidates.iter().any(|c| c.expression == r.locator))
                .map(|r| r.decayed_score(now, self.options.promotion_half_life_sec) as f32)
                .fold(0.0f32, f32::max);

            let snippet = snippet::build_snippet(&descriptor, &pool_refs);
            let rerank_score = self.reranker.score(step, &snippet).await?;
            let fused = rerank::fuse(entry.cosine_score, rerank_score, promotion_prior, &self.options.fusion_weights);

            candidates.push(Candidate {
                descriptor,
                cosine_score: entry.cosine_score,
                rerank_score,
                fused_score: fused,
                promotion_prior,
                locator_candidates,
                chosen_locator: None,
                verified: false,
                unique: false,
            });
        }
        candidates.sort_by(|a, b| b.fused_score.partial_cmp(&a.fused_score).unwrap_or(std::cmp::Ordering::Equal));
        timings_ms.insert("rerank".to_string(), t0.elapsed().as_millis() as u64);

        // 5. Synthesize + Verify (synthesis already done above; this stage verifies).
        let t0 = std::time::Instant::now();
        let candidates_considered = candidates.len();
        let mut best_attempt: Option<(Candidate, verify::VerifyOutcome)> = None;
        for candidate in candidates.into_iter().take(SYNTH_VERIFY_BUDGET) {
            let outcome = verify::verify(
                driver,
                &candidate.descriptor.frame_path,
                candidate.descriptor.backend_id,
                &candidate.descriptor.tag,
                &candidate.descriptor.bbox,
                &candidate.locator_candidates,
            )
            .await;

            if outcome.verified && outcome.unique {
                timings_ms.insert("verify".to_string(), t0.elapsed().as_millis() as u64);
                // 6. Record.
                let _ = self.store.record_success(&context, &outcome.chosen.expression, outcome.chosen.kind.strategy_label(), now);
                info!(selector = %outcome.chosen.expression, strategy = outcome.chosen.kind.strategy_label(), "resolved via ranked retrieval");
                return Ok(RetrievalResult {
                    success: true,
                    selector: outcome.chosen.expression.clone(),
                    strategy: outcome.chosen.kind.strategy_label().to_string(),
                    confidence: candidate.fused_score.clamp(0.0, 1.0),
                    frame_path: candidate.descriptor.frame_path.clone(),
                    alternatives: outcome.alternatives,
                    verification: VerificationReport {
                        ok: true,
                        unique: true,
                        frame_path: candidate.descriptor.frame_path,
                        error: None,
                    },
                    source: ResultSource::Ranked,
                    diagnostics: Diagnostics {
                        cosine: candidate.cosine_score,
                        rerank: candidate.rerank_score,
                        fused: candidate.fused_score,
                        promotion_prior: candidate.promotion_prior,
                        candidates_considered,
                        timings_ms,
                        error_kind: String::new(),
                        skipped_frames: skipped_frames.clone(),
                    },
                });
            }

            if best_attempt.is_none() {
                best_attempt = Some((candidate, outcome));
            }
        }
        timings_ms.insert("verify".to_string(), t0.elapsed().as_millis() as u64);

        // Verification exhaustion (§4.10 step 6, §7): return the best attempted
        // locator for diagnostics; no writes for freshly synthesized locators.
        let (candidate, outcome) = best_attempt.ok_or(HerError::NotUnique)?;
        debug!(candidates_considered, "verification exhausted without a unique match");
        Ok(RetrievalResult {
            success: false,
            selector: outcome.chosen.expression.clone(),
            strategy: outcome.chosen.kind.strategy_label().to_string(),
            confidence: 0.0,
            frame_path: candidate.descriptor.frame_path.clone(),
            alternatives: outcome.alternatives,
            verification: VerificationReport {
                ok: false,
                unique: false,
                frame_path: candidate.descriptor.frame_path,
                error: Some("not-unique".to_string()),
            },
            source: ResultSource::FallbackUnverified,
            diagnostics: Diagnostics {
                cosine: candidate.cosine_score,
                rerank: candidate.rerank_score,
                fused: candidate.fused_score,
                promotion_prior: candidate.promotion_prior,
                candidates_considered,
                timings_ms,
                error_kind: "not-unique".to_string(),
                skipped_frames,
            },
        })
    }

    async fn consult_cache(
        &self,
        context: &str,
        driver: &dyn Driver,
        now: f64,
        timings_ms: &mut BTreeMap<String, u64>,
    ) -> Option<RetrievalResult> {
        let t0 = std::time::Instant::now();
        let records = self.store.top_for_context(context, self.options.max_candidates, 0.0, now);
        for record in &records {
            let Some(kind) = LocatorKind::from_label(&record.strategy) else { continue };
            if verify::verify_unique_only(driver, kind, &record.locator).await {
                timings_ms.insert("cache".to_string(), t0.elapsed().as_millis() as u64);
                info!(selector = %record.locator, "resolved via promotion cache short-circuit");
                return Some(RetrievalResult {
                    success: true,
                    selector: record.locator.clone(),
                    strategy: record.strategy.clone(),
                    confidence: (record.decayed_score(now, self.options.promotion_half_life_sec) as f32 + 0.05).clamp(0.0, 1.0),
                    frame_path: Vec::new(),
                    alternatives: Vec::new(),
                    verification: VerificationReport { ok: true, unique: true, frame_path: Vec::new(), error: None },
                    source: ResultSource::CacheHit,
                    diagnostics: Diagnostics {
                        cosine: 0.0,
                        rerank: 0.0,
                        fused: 0.0,
                        promotion_prior: record.decayed_score(now, self.options.promotion_half_life_sec) as f32,
                        candidates_considered: 1,
                        timings_ms: timings_ms.clone(),
                        error_kind: String::new(),
                        skipped_frames: Vec::new(),
                    },
                });
            }
            let _ = self.store.record_failure(context, &record.locator, &record.strategy, now);
        }
        timings_ms.insert("cache".to_string(), t0.elapsed().as_millis() as u64);
        None
    }
}

fn is_retryable(err: &HerError) -> bool {
    // `is_retryable()` covers Driver/Timeout; a detached page surfaces as
    // `HerError::Snapshot` (see `snapshotter::Snapshotter::snapshot`), which §7 also
    // calls out as a retryable driver-level condition, so it's included here too.
    err.is_retryable() || matches!(err, HerError::Snapshot(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::mock::MockDriver;
    use crate::driver::{NodeHandle, RawAxNode, RawDomNode};
    use crate::embed::HashEmbedder;
    use crate::model::BoundingBox;
    use crate::rerank::HeuristicReranker;
    use tempfile::TempDir;

    fn leaf(tag: &str, backend_id: u64, attrs: &[(&str, &str)], text: &str) -> RawDomNode {
        RawDomNode {
            backend_id,
            tag: tag.to_string(),
            attributes: attrs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            inner_text: text.to_string(),
            bbox: BoundingBox { x: 0, y: 0, w: 10, h: 10 },
            children: Vec::new(),
            shadow_children: Vec::new(),
            in_closed_shadow: false,
        }
    }

    fn orchestrator(dir: &TempDir) -> Orchestrator<HashEmbedder, HeuristicReranker> {
        let store = PromotionStore::open(dir.path(), 86_400.0, 3.0 * 86_400.0).unwrap();
        Orchestrator::new(HashEmbedder::new(32), HeuristicReranker, store, HerOptions::default())
    }

    #[tokio::test]
    async fn empty_pool_returns_no_elements() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(&dir);
        let dom = leaf("div", 1, &[], "");
        let driver = MockDriver::new("https://x.test", dom, vec![]);
        let result = orch.resolve("Click on \"Apple\"", &driver, None, 1000.0).await;
        assert!(!result.success);
        assert_eq!(result.diagnostics.error_kind, "no-elements");
    }

    #[tokio::test]
    async fn resolves_and_verifies_an_id_candidate() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(&dir);
        let mut root = leaf("div", 1, &[], "");
        root.children.push(leaf("button", 2, &[("id", "apple-filter-main")], "Apple"));
        let driver = MockDriver::new("https://x.test", root, vec![])
            .with_locator_match("//*[@id='apple-filter-main']", vec![NodeHandle { backend_id: 2, tag: "button".into(), bbox: BoundingBox { x: 0, y: 0, w: 10, h: 10 } }]);

        let result = orch.resolve("Click on \"Apple\" filter", &driver, None, 1000.0).await;
        assert!(result.success);
        assert_eq!(result.selector, "//*[@id='apple-filter-main']");
        assert_eq!(result.strategy, "id");
        assert!(matches!(result.source, ResultSource::Ranked));
    }

    #[tokio::test]
    async fn second_call_short_circuits_via_cache() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(&dir);
        let mut root = leaf("div", 1, &[], "");
        root.children.push(leaf("button", 2, &[("id", "apple-filter-main")], "Apple"));
        let driver = MockDriver::new("https://x.test", root, vec![])
            .with_locator_match("//*[@id='apple-filter-main']", vec![NodeHandle { backend_id: 2, tag: "button".into(), bbox: BoundingBox { x: 0, y: 0, w: 10, h: 10 } }]);

        let first = orch.resolve("Click on \"Apple\" filter", &driver, None, 1000.0).await;
        assert!(matches!(first.source, ResultSource::Ranked));

        let second = orch.resolve("Click on \"Apple\" filter", &driver, None, 1001.0).await;
        assert!(matches!(second.source, ResultSource::CacheHit));
        assert!(second.confidence >= first.confidence);
    }

    #[tokio::test]
    async fn duplicate_labeled_buttons_disambiguate_via_ancestor_context() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(&dir);
        let mut header = leaf("header", 2, &[("data-testid", "site-header")], "");
        header.children.push(leaf("button", 3, &[("id", "apple-header-cta")], "Apple"));
        let mut footer = leaf("footer", 4, &[("data-testid", "site-footer")], "");
        footer.children.push(leaf("button", 5, &[("id", "apple-footer-cta")], "Apple"));
        let mut root = leaf("div", 1, &[], "");
        root.children.push(header);
        root.children.push(footer);

        let footer_handle = NodeHandle { backend_id: 5, tag: "button".into(), bbox: BoundingBox { x: 0, y: 0, w: 10, h: 10 } };
        let header_handle = NodeHandle { backend_id: 3, tag: "button".into(), bbox: BoundingBox { x: 0, y: 0, w: 10, h: 10 } };
        let driver = MockDriver::new("https://x.test", root, vec![])
            .with_locator_match("//*[@id='apple-footer-cta']", vec![footer_handle])
            .with_locator_match("//*[@id='apple-header-cta']", vec![header_handle]);

        let result = orch.resolve("Click the Apple button in the footer", &driver, None, 1000.0).await;
        assert!(result.success);
        assert_eq!(result.selector, "//*[@id='apple-footer-cta']");
    }

    #[tokio::test]
    async fn stale_cached_locator_is_demoted_and_a_fresh_one_is_promoted() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(&dir);
        let mut root = leaf("div", 1, &[], "");
        root.children.push(leaf("button", 2, &[("id", "apple-filter-main")], "Apple"));
        let driver = MockDriver::new("https://x.test", root, vec![])
            .with_locator_match("//*[@id='apple-filter-main']", vec![NodeHandle { backend_id: 2, tag: "button".into(), bbox: BoundingBox { x: 0, y: 0, w: 10, h: 10 } }]);

        let context = promotion::context_key(&promotion::host_and_path("https://x.test"), None, None);
        orch.store.record_success(&context, "//*[@id='stale-button']", "id", 500.0).unwrap();

        let result = orch.resolve("Click on \"Apple\" filter", &driver, None, 1000.0).await;
        assert!(result.success);
        assert!(matches!(result.source, ResultSource::Ranked), "the stale cached locator must not verify, forcing a full resolve");

        let records = orch.store.top_for_context(&context, 10, -1.0, 1000.0);
        let stale = records.iter().find(|r| r.locator == "//*[@id='stale-button']").unwrap();
        assert_eq!(stale.failures, 1);
        let fresh = records.iter().find(|r| r.locator == "//*[@id='apple-filter-main']").unwrap();
        assert_eq!(fresh.successes, 1);
    }

    #[tokio::test]
    async fn ranked_diagnostics_surface_a_nonzero_promotion_prior_when_the_winning_locator_matches_a_fresh_entry() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(&dir);
        let mut root = leaf("div", 1, &[], "");
        root.children.push(leaf("button", 2, &[("id", "apple-filter-main")], "Apple"));
        let driver = MockDriver::new("https://x.test", root, vec![])
            .with_locator_match("//*[@id='apple-filter-main']", vec![NodeHandle { backend_id: 2, tag: "button".into(), bbox: BoundingBox { x: 0, y: 0, w: 10, h: 10 } }]);

        // A strategy label unknown to `LocatorKind::from_label` is skipped by
        // `consult_cache` (no cache-hit short-circuit), but still counts toward the
        // promotion prior folded into fusion during ranking, since that lookup
        // matches on locator expression rather than strategy.
        let context = promotion::context_key(&promotion::host_and_path("https://x.test"), None, None);
        orch.store.record_success(&context, "//*[@id='apple-filter-main']", "unrecognized-strategy", 500.0).unwrap();

        let result = orch.resolve("Click on \"Apple\" filter", &driver, None, 1000.0).await;
        assert!(result.success);
        assert!(matches!(result.source, ResultSource::Ranked));
        assert!(result.diagnostics.promotion_prior > 0.0, "a fresh matching promotion entry must be reflected in diagnostics.promotion_prior");
        assert!(
            (result.diagnostics.fused - rerank::fuse(
                result.diagnostics.cosine,
                result.diagnostics.rerank,
                result.diagnostics.promotion_prior,
                &HerOptions::default().fusion_weights,
            ))
            .abs()
                < 1e-6,
            "fused must actually incorporate the reported promotion_prior"
        );
    }

    #[tokio::test]
    async fn resolves_an_element_scoped_to_a_same_origin_child_frame() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(&dir);
        let root = leaf("div", 1, &[], "");
        let driver = MockDriver::new("https://x.test", root, vec![])
            .with_child_frame(
                "iframe#frame3",
                "https://x.test/widget",
                false,
                leaf("button", 2, &[("id", "iframe-submit")], "Submit"),
                vec![],
            )
            .with_locator_match("//*[@id='iframe-submit']", vec![NodeHandle { backend_id: 2, tag: "button".into(), bbox: BoundingBox { x: 0, y: 0, w: 10, h: 10 } }]);

        let result = orch.resolve("Click submit", &driver, None, 1000.0).await;
        assert!(result.success);
        assert_eq!(result.frame_path, vec!["iframe#frame3".to_string()]);
        assert_eq!(result.selector, "//*[@id='iframe-submit']");
    }

    /// Wraps `HashEmbedder` to count `embed_elements_raw` invocations, so a test can
    /// assert the Delta Index skips re-embedding elements that haven't changed.
    struct CountingEmbedder {
        inner: HashEmbedder,
        element_calls: std::sync::atomic::AtomicUsize,
    }

    impl CountingEmbedder {
        fn new(dim: usize) -> Self {
            Self { inner: HashEmbedder::new(dim), element_calls: std::sync::atomic::AtomicUsize::new(0) }
        }

        fn calls(&self) -> usize {
            self.element_calls.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl EmbeddingProvider for CountingEmbedder {
        fn kind(&self) -> &'static str {
            "counting-embedder"
        }

        fn dimension(&self) -> usize {
            self.inner.dimension()
        }

        async fn embed_query_raw(&self, text: &str) -> crate::error::Result<Vec<f32>> {
            self.inner.embed_query_raw(text).await
        }

        async fn embed_elements_raw(&self, texts: &[String]) -> crate::error::Result<Vec<Vec<f32>>> {
            self.element_calls.fetch_add(texts.len(), std::sync::atomic::Ordering::SeqCst);
            self.inner.embed_elements_raw(texts).await
        }
    }

    #[tokio::test]
    async fn unchanged_elements_are_not_re_embedded_on_a_second_resolve() {
        let dir = TempDir::new().unwrap();
        let store = PromotionStore::open(dir.path(), 86_400.0, 3.0 * 86_400.0).unwrap();
        let orch = Orchestrator::new(CountingEmbedder::new(32), HeuristicReranker, store, HerOptions::default());
        let mut root = leaf("div", 1, &[], "");
        root.children.push(leaf("button", 2, &[("id", "apple-filter-main")], "Apple"));
        let driver = MockDriver::new("https://x.test", root, vec![])
            .with_locator_match("//*[@id='apple-filter-main']", vec![NodeHandle { backend_id: 2, tag: "button".into(), bbox: BoundingBox { x: 0, y: 0, w: 10, h: 10 } }]);

        let first = orch.resolve("Click on \"Apple\" filter", &driver, None, 1000.0).await;
        assert!(first.success);
        let calls_after_first = orch.embedder.provider().calls();
        assert!(calls_after_first > 0);

        // Force a re-snapshot (not a cache hit) by clearing the promoted locator, but
        // the DOM itself is unchanged, so the delta index should re-embed nothing.
        orch.store.clear(None).unwrap();
        let second = orch.resolve("Click on \"Apple\" filter", &driver, None, 1001.0).await;
        assert!(second.success);
        assert_eq!(orch.embedder.provider().calls(), calls_after_first, "unchanged elements must not be re-embedded");
    }

    #[tokio::test]
    async fn cross_origin_frame_is_reported_in_diagnostics_and_contributes_no_elements() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(&dir);
        let mut root = leaf("div", 1, &[], "");
        root.children.push(leaf("button", 2, &[("id", "apple-filter-main")], "Apple"));
        let driver = MockDriver::new("https://x.test", root, vec![])
            .with_child_frame(
                "iframe#ads",
                "https://ads.example",
                true,
                leaf("div", 3, &[], "should never surface"),
                vec![],
            )
            .with_locator_match("//*[@id='apple-filter-main']", vec![NodeHandle { backend_id: 2, tag: "button".into(), bbox: BoundingBox { x: 0, y: 0, w: 10, h: 10 } }]);

        let result = orch.resolve("Click on \"Apple\" filter", &driver, None, 1000.0).await;
        assert!(result.success);
        assert_eq!(result.diagnostics.skipped_frames, vec!["https://ads.example".to_string()]);
    }

    #[tokio::test]
    async fn no_ax_role_still_resolves_via_attribute_merge() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(&dir);
        let mut root = leaf("div", 1, &[], "");
        root.children.push(leaf("button", 2, &[("id", "x-1")], "Apple"));
        let ax = vec![RawAxNode { backend_id: 2, role: Some("button".to_string()), name: Some("Apple".to_string()) }];
        let driver = MockDriver::new("https://x.test", root, ax).with_locator_match(
            "//tag[normalize-space()='Apple']".replace("tag", "button").as_str(),
            vec![NodeHandle { backend_id: 2, tag: "button".into(), bbox: BoundingBox { x: 0, y: 0, w: 10, h: 10 } }],
        );
        // "x-1" looks generated (letters + '-' + digits) so the id candidate is
        // skipped; the text-exact candidate should verify instead.
        let result = orch.resolve("Click on \"Apple\"", &driver, None, 1000.0).await;
        assert!(result.success);
        assert_eq!(result.strategy, "text");
    }
}
