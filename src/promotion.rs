//! §4.9 Promotion Cache — persistent (context → locator) store with decay and
//! success/failure bookkeeping.
//!
//! Backed by one JSON file per `context_key` under `cache_dir`, atomic
//! write-then-rename on update, mirroring this codebase's file-backed-store idiom
//! (`auth.rs`'s one-profile-per-file layout) rather than an embedded SQL engine — the
//! logical `promotions` table in §6 is a projection of these files, not a literal one.
//! An in-memory mirror is loaded eagerly at construction so reads never hit disk.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{HerError, Result};
use crate::model::PromotionRecord;

pub const DEFAULT_SUCCESS_BOOST: f64 = 0.10;
pub const DEFAULT_FAILURE_PENALTY: f64 = 0.05;

struct Inner {
    /// context_key -> locator -> record.
    by_context: HashMap<String, HashMap<String, PromotionRecord>>,
}

/// Single-writer, file-backed promotion store (§4.9, §6 "Promotion store layout").
pub struct PromotionStore {
    cache_dir: PathBuf,
    half_life_sec: f64,
    default_ttl_sec: f64,
    inner: Mutex<Inner>,
}

impl PromotionStore {
    pub fn open(cache_dir: impl Into<PathBuf>, half_life_sec: f64, default_ttl_sec: f64) -> Result<Self> {
        let cache_dir = cache_dir.into();
        std::fs::create_dir_all(&cache_dir)
            .map_err(|e| HerError::Store(format!("failed to create cache dir: {e}")))?;

        let mut by_context = HashMap::new();
        let entries = std::fs::read_dir(&cache_dir).map_err(|e| HerError::Store(e.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|e| HerError::Store(e.to_string()))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(context_key) = path.file_stem().and_then(|s| s.to_str()) else { continue };
            match load_context_file(&path) {
                Ok(records) => {
                    let map = records.into_iter().map(|r| (r.locator.clone(), r)).collect();
                    by_context.insert(context_key.to_string(), map);
                }
                // Corrupt record file: skipped + logged, per §7 "Store" error kind.
                Err(e) => tracing::warn!(path = ?path, error = %e, "skipping corrupt promotion record file"),
            }
        }

        Ok(Self { cache_dir, half_life_sec, default_ttl_sec, inner: Mutex::new(Inner { by_context }) })
    }

    fn context_path(&self, context_key: &str) -> PathBuf {
        self.cache_dir.join(format!("{context_key}.json"))
    }

    /// Atomic write-then-rename so a crash mid-write never leaves a half-written file.
    fn persist_context(&self, context_key: &str, records: &HashMap<String, PromotionRecord>) -> Result<()> {
        let values: Vec<&PromotionRecord> = records.values().collect();
        let json = serde_json::to_vec_pretty(&values).map_err(|e| HerError::Store(e.to_string()))?;
        let path = self.context_path(context_key);
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json).map_err(|e| HerError::Store(e.to_string()))?;
        std::fs::rename(&tmp_path, &path).map_err(|e| HerError::Store(e.to_string()))?;
        Ok(())
    }

    /// Purge expired entries for `context_key`, then return records scoring at least
    /// `min_score` (decayed), sorted `(-decayed_score, -successes, +failures,
    /// -last_used_ts)`, truncated to `limit`.
    pub fn top_for_context(&self, context_key: &str, limit: usize, min_score: f64, now: f64) -> Vec<PromotionRecord> {
        self.purge_expired_context(context_key, now);

        let inner = self.inner.lock().unwrap();
        let Some(records) = inner.by_context.get(context_key) else { return Vec::new() };

        let mut out: Vec<PromotionRecord> = records
            .values()
            .filter(|r| r.decayed_score(now, self.half_life_sec) >= min_score)
            .cloned()
            .collect();

        out.sort_by(|a, b| {
            let da = a.decayed_score(now, self.half_life_sec);
            let db = b.decayed_score(now, self.half_life_sec);
            db.partial_cmp(&da)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.successes.cmp(&a.successes))
                .then_with(|| a.failures.cmp(&b.failures))
                .then_with(|| b.last_used_ts.partial_cmp(&a.last_used_ts).unwrap_or(Ordering::Equal))
        });
        out.truncate(limit);
        out
    }

    pub fn record_success(&self, context_key: &str, locator: &str, strategy: &str, now: f64) -> Result<()> {
        self.record_success_with_boost(context_key, locator, strategy, now, DEFAULT_SUCCESS_BOOST)
    }

    pub fn record_success_with_boost(
        &self,
        context_key: &str,
        locator: &str,
        strategy: &str,
        now: f64,
        boost: f64,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let context = inner.by_context.entry(context_key.to_string()).or_default();
        let record = context.entry(locator.to_string()).or_insert_with(|| {
            self.fresh_record(context_key, locator, strategy, now)
        });
        record.successes += 1;
        record.score += boost;
        record.last_used_ts = now;
        self.persist_context(context_key, context)
    }

    pub fn record_failure(&self, context_key: &str, locator: &str, strategy: &str, now: f64) -> Result<()> {
        self.record_failure_with_penalty(context_key, locator, strategy, now, DEFAULT_FAILURE_PENALTY)
    }

    pub fn record_failure_with_penalty(
        &self,
        context_key: &str,
        locator: &str,
        strategy: &str,
        now: f64,
        penalty: f64,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let context = inner.by_context.entry(context_key.to_string()).or_default();
        let record = context.entry(locator.to_string()).or_insert_with(|| {
            self.fresh_record(context_key, locator, strategy, now)
        });
        record.failures += 1;
        record.score = (record.score - penalty).max(0.0);
        record.last_used_ts = now;
        self.persist_context(context_key, context)
    }

    fn fresh_record(&self, context_key: &str, locator: &str, strategy: &str, now: f64) -> PromotionRecord {
        PromotionRecord {
            context_key: context_key.to_string(),
            locator: locator.to_string(),
            strategy: strategy.to_string(),
            successes: 0,
            failures: 0,
            score: 0.0,
            last_used_ts: now,
            ttl_sec: self.default_ttl_sec,
        }
    }

    pub fn purge_expired(&self, now: f64) {
        let keys: Vec<String> = self.inner.lock().unwrap().by_context.keys().cloned().collect();
        for key in keys {
            self.purge_expired_context(&key, now);
        }
    }

    fn purge_expired_context(&self, context_key: &str, now: f64) {
        let removed = {
            let mut inner = self.inner.lock().unwrap();
            let Some(context) = inner.by_context.get_mut(context_key) else { return };
            let before = context.len();
            context.retain(|_, r| r.is_fresh(now));
            before != context.len()
        };
        if removed {
            let inner = self.inner.lock().unwrap();
            if let Some(context) = inner.by_context.get(context_key) {
                let _ = self.persist_context(context_key, context);
            }
        }
    }

    pub fn clear(&self, context_key: Option<&str>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        match context_key {
            Some(key) => {
                inner.by_context.remove(key);
                let path = self.context_path(key);
                if path.exists() {
                    std::fs::remove_file(&path).map_err(|e| HerError::Store(e.to_string()))?;
                }
            }
            None => {
                let keys: Vec<String> = inner.by_context.keys().cloned().collect();
                inner.by_context.clear();
                for key in keys {
                    let path = self.context_path(&key);
                    if path.exists() {
                        std::fs::remove_file(&path).map_err(|e| HerError::Store(e.to_string()))?;
                    }
                }
            }
        }
        Ok(())
    }
}

fn load_context_file(path: &Path) -> anyhow::Result<Vec<PromotionRecord>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Deterministic digest of `(host+path, optional dom hash, optional extras)` (§3
/// "Promotion record", `context_key`).
pub fn context_key(host_and_path: &str, dom_hash: Option<&str>, extra: Option<&str>) -> String {
    crate::hashutil::stable_digest_full(&[host_and_path, dom_hash.unwrap_or(""), extra.unwrap_or("")])
}

/// Strips scheme, query string, and fragment from `url`, leaving `host+path` (§3
/// "Context key"), so the promotion cache doesn't fragment across `http`/`https` or
/// query-string/fragment variants of the same page.
pub fn host_and_path(url: &str) -> String {
    let without_scheme = match url.find("://") {
        Some(idx) => &url[idx + 3..],
        None => url,
    };
    let end = without_scheme
        .find(['?', '#'])
        .unwrap_or(without_scheme.len());
    without_scheme[..end].trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, PromotionStore) {
        let dir = TempDir::new().unwrap();
        let store = PromotionStore::open(dir.path(), 86_400.0, 3.0 * 86_400.0).unwrap();
        (dir, store)
    }

    #[test]
    fn record_success_then_top_for_context_returns_rank_one() {
        let (_dir, store) = store();
        store.record_success("ctx1", "//*[@id='a']", "id", 1000.0).unwrap();
        let top = store.top_for_context("ctx1", 5, 0.0, 1000.0);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].locator, "//*[@id='a']");
    }

    #[test]
    fn record_failure_then_success_leaves_score_above_pre_penalty_minus_penalty() {
        let (_dir, store) = store();
        store.record_failure("ctx1", "//*[@id='a']", "id", 1000.0).unwrap();
        let before = store.top_for_context("ctx1", 5, -1.0, 1000.0)[0].score;
        store.record_success("ctx1", "//*[@id='a']", "id", 1000.0).unwrap();
        let after = store.top_for_context("ctx1", 5, -1.0, 1000.0)[0].score;
        assert!(after >= before - DEFAULT_FAILURE_PENALTY);
        let record = &store.top_for_context("ctx1", 5, -1.0, 1000.0)[0];
        assert_eq!(record.successes, 1);
        assert_eq!(record.failures, 1);
    }

    #[test]
    fn decayed_score_is_never_greater_than_score() {
        let (_dir, store) = store();
        store.record_success("ctx1", "//*[@id='a']", "id", 0.0).unwrap();
        let now = 3600.0;
        let record = store.top_for_context("ctx1", 5, -1.0, now)[0].clone();
        assert!(record.decayed_score(now, 86_400.0) <= record.score);
        assert!(record.decayed_score(now, 86_400.0) < record.score);
    }

    #[test]
    fn expired_record_at_exactly_ttl_is_excluded() {
        let (_dir, store) = store();
        let ttl = 3.0 * 86_400.0;
        store.record_success("ctx1", "//*[@id='a']", "id", 0.0).unwrap();
        let top = store.top_for_context("ctx1", 5, -1.0, ttl);
        assert!(top.is_empty(), "record at exactly ttl age must be treated as expired");
    }

    #[test]
    fn persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = PromotionStore::open(dir.path(), 86_400.0, 3.0 * 86_400.0).unwrap();
            store.record_success("ctx1", "//*[@id='a']", "id", 1000.0).unwrap();
        }
        let reopened = PromotionStore::open(dir.path(), 86_400.0, 3.0 * 86_400.0).unwrap();
        let top = reopened.top_for_context("ctx1", 5, -1.0, 1000.0);
        assert_eq!(top.len(), 1);
    }

    #[test]
    fn clear_context_removes_its_file() {
        let (dir, store) = store();
        store.record_success("ctx1", "//*[@id='a']", "id", 1000.0).unwrap();
        store.clear(Some("ctx1")).unwrap();
        assert!(store.top_for_context("ctx1", 5, -1.0, 1000.0).is_empty());
        assert!(!dir.path().join("ctx1.json").exists());
    }

    #[test]
    fn context_key_is_deterministic_and_order_sensitive() {
        let a = context_key("example.com/page", Some("h1"), None);
        let b = context_key("example.com/page", Some("h1"), None);
        let c = context_key("example.com/other", Some("h1"), None);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn ranking_prefers_higher_score_then_successes_then_fewer_failures() {
        let (_dir, store) = store();
        store.record_success("ctx1", "A", "id", 1000.0).unwrap();
        store.record_success("ctx1", "B", "id", 1000.0).unwrap();
        store.record_success("ctx1", "B", "id", 1000.0).unwrap();
        let top = store.top_for_context("ctx1", 5, -1.0, 1000.0);
        assert_eq!(top[0].locator, "B");
    }

    #[test]
    fn host_and_path_strips_scheme_query_and_fragment() {
        assert_eq!(host_and_path("https://example.com/page?x=1#section"), "example.com/page");
        assert_eq!(host_and_path("http://example.com/page"), "example.com/page");
        assert_eq!(host_and_path("https://example.com/page/"), "example.com/page");
    }

    #[test]
    fn host_and_path_unifies_scheme_and_query_variants() {
        let variants = [
            "http://example.com/page",
            "https://example.com/page",
            "https://example.com/page?ref=ad",
            "https://example.com/page#top",
        ];
        let canonical: Vec<String> = variants.iter().map(|u| host_and_path(u)).collect();
        assert!(canonical.windows(2).all(|w| w[0] == w[1]));
    }
}
