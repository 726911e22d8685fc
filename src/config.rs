//! Structured, read-only configuration for the retriever.
//!
//! The recognized option set is closed: anything outside `HerOptions`'s fields is
//! rejected at construction, via `#[serde(deny_unknown_fields)]` plus `from_json`'s
//! explicit check, since `serde`'s rejection alone only fires on the `Deserialize`
//! path and callers may also build options programmatically.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::HerError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FusionWeights {
    pub cosine: f32,
    pub rerank: f32,
    pub promotion: f32,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            cosine: 0.3,
            rerank: 0.6,
            promotion: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct HerOptions {
    pub cache_dir: PathBuf,
    pub embedding_model_id: String,
    pub rerank_model_id: String,
    pub promotion_ttl_sec: f64,
    pub promotion_half_life_sec: f64,
    pub fusion_weights: FusionWeights,
    pub shortlist_k: usize,
    pub max_candidates: usize,
    pub per_call_timeout_ms: u64,
    pub network_idle_ms: u64,
    pub auto_overlay_dismiss: bool,
}

impl Default for HerOptions {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            embedding_model_id: "hash-embedder-v1".to_string(),
            rerank_model_id: "heuristic-reranker-v1".to_string(),
            promotion_ttl_sec: 3.0 * 24.0 * 3600.0,
            promotion_half_life_sec: 24.0 * 3600.0,
            fusion_weights: FusionWeights::default(),
            shortlist_k: 12,
            max_candidates: 3,
            per_call_timeout_ms: 30_000,
            network_idle_ms: 500,
            auto_overlay_dismiss: true,
        }
    }
}

fn default_cache_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".her")
        .join("promotions")
}

impl HerOptions {
    /// Parse options from a JSON object, rejecting unrecognized keys.
    ///
    /// `serde`'s `deny_unknown_fields` already does this for the direct `Deserialize`
    /// path; this wrapper exists so construction from an arbitrary caller-supplied
    /// `serde_json::Value` (e.g. a config file read at CLI startup) produces a
    /// `HerError::Input` instead of a raw `serde_json::Error`.
    pub fn from_json(value: serde_json::Value) -> Result<Self, HerError> {
        serde_json::from_value(value).map_err(|e| HerError::Input(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let opts = HerOptions::default();
        assert_eq!(opts.shortlist_k, 12);
        assert_eq!(opts.max_candidates, 3);
        assert_eq!(opts.fusion_weights, FusionWeights { cosine: 0.3, rerank: 0.6, promotion: 0.1 });
        assert_eq!(opts.network_idle_ms, 500);
        assert_eq!(opts.promotion_ttl_sec, 3.0 * 24.0 * 3600.0);
        assert_eq!(opts.promotion_half_life_sec, 24.0 * 3600.0);
    }

    #[test]
    fn unknown_option_is_rejected() {
        let value = serde_json::json!({ "shortlist_k": 5, "bogus_option": true });
        let err = HerOptions::from_json(value).unwrap_err();
        assert_eq!(err.kind(), "input");
    }

    #[test]
    fn partial_object_fills_remaining_defaults() {
        let value = serde_json::json!({ "shortlist_k": 20 });
        let opts = HerOptions::from_json(value).unwrap();
        assert_eq!(opts.shortlist_k, 20);
        assert_eq!(opts.max_candidates, 3);
    }
}
