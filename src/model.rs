//! Core data model (§3): element descriptors, snapshots, vector records, candidates,
//! promotion records, and locator candidates.
//!
//! Cyclic references are deliberately absent: ancestry is represented as path vectors
//! (`frame_path`, `dom_hierarchy`) rather than parent pointers, so the whole model stays
//! plain-old-data and trivially `Serialize`/`Clone`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Visible,
    Offscreen,
    Hidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl BoundingBox {
    pub const ZERO: BoundingBox = BoundingBox { x: 0, y: 0, w: 0, h: 0 };

    /// Whether this box lies wholly outside `viewport` (used for `offscreen`).
    pub fn wholly_outside(&self, viewport: &BoundingBox) -> bool {
        self.x + self.w <= viewport.x
            || self.y + self.h <= viewport.y
            || self.x >= viewport.x + viewport.w
            || self.y >= viewport.y + viewport.h
    }
}

/// A snapshot's atomic record (§3 "Element descriptor").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementDescriptor {
    pub frame_path: Vec<String>,
    pub backend_id: u64,
    pub tag: String,
    pub role: String,
    pub accessible_name: String,
    pub inner_text: String,
    pub attributes: BTreeMap<String, String>,
    pub bbox: BoundingBox,
    pub visibility: Visibility,
    pub is_interactive: bool,
    pub xpath_abs: String,
    pub dom_hierarchy: Vec<String>,
}

impl ElementDescriptor {
    /// The stable digest identifying this element across snapshots (§3 "Vector record").
    ///
    /// Built from a subset deliberately narrower than the full descriptor so that
    /// incidental changes (bbox drift, non-identity attribute churn) don't spuriously
    /// evict an otherwise-unchanged element's cached embedding.
    pub fn element_key(&self) -> String {
        let attrs = normalized_attrs_subset(&self.attributes);
        let prefix: String = self.inner_text.chars().take(64).collect();
        crate::hashutil::stable_digest_full(&[
            &self.frame_path.join(">"),
            &self.tag,
            &attrs,
            &prefix,
            &self.xpath_abs,
        ])
    }

    /// The canonical text representation fed to the embedder (§4.3).
    pub fn canonical_text(&self, token_budget: usize) -> String {
        let mut parts = vec![
            self.role.clone(),
            self.tag.clone(),
            self.accessible_name.clone(),
            self.inner_text.clone(),
        ];
        for (k, v) in &self.attributes {
            parts.push(format!("{k}={v}"));
        }
        let joined = parts.join(" | ");
        joined.split_whitespace().take(token_budget).collect::<Vec<_>>().join(" ")
    }
}

fn normalized_attrs_subset(attrs: &BTreeMap<String, String>) -> String {
    attrs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(";")
}

/// `{frame_path, frame_url, content_hash, elements[]}` (§3 "Frame snapshot").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameSnapshot {
    pub frame_path: Vec<String>,
    pub frame_url: String,
    pub content_hash: String,
    pub elements: Vec<ElementDescriptor>,
}

impl FrameSnapshot {
    /// Deterministic function of `(tag, normalized_attrs, inner_text_prefix, sibling_index)`
    /// over all elements, in order — equal hashes are treated as equivalent content.
    pub fn compute_content_hash(elements: &[ElementDescriptor]) -> String {
        let mut parts_owned: Vec<String> = Vec::with_capacity(elements.len() * 4);
        for (idx, el) in elements.iter().enumerate() {
            parts_owned.push(el.tag.clone());
            parts_owned.push(normalized_attrs_subset(&el.attributes));
            parts_owned.push(el.inner_text.chars().take(64).collect());
            parts_owned.push(idx.to_string());
        }
        let refs: Vec<&str> = parts_owned.iter().map(String::as_str).collect();
        crate::hashutil::stable_digest_full(&refs)
    }
}

/// `{url, root, children, taken_at}` (§3 "Page snapshot"). Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub url: String,
    pub root: FrameSnapshot,
    pub children: Vec<FrameSnapshot>,
    pub taken_at: f64,
    /// Frame URLs skipped for being cross-origin (diagnostic only, not an error).
    pub skipped_frames: Vec<String>,
}

impl PageSnapshot {
    pub fn all_frames(&self) -> impl Iterator<Item = &FrameSnapshot> {
        std::iter::once(&self.root).chain(self.children.iter())
    }

    pub fn all_elements(&self) -> impl Iterator<Item = &ElementDescriptor> {
        self.all_frames().flat_map(|f| f.elements.iter())
    }
}

/// `{element_key, vector, snapshot_id}` (§3 "Vector record").
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub element_key: String,
    pub vector: Vec<f32>,
    pub snapshot_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LocatorKind {
    Id,
    Testid,
    AriaLabel,
    RoleName,
    TextExact,
    Css,
    Xpath,
}

impl LocatorKind {
    pub fn specificity_rank(&self) -> u8 {
        match self {
            LocatorKind::Id => 0,
            LocatorKind::Testid => 1,
            LocatorKind::AriaLabel => 2,
            LocatorKind::RoleName => 3,
            LocatorKind::TextExact => 4,
            LocatorKind::Css => 5,
            LocatorKind::Xpath => 6,
        }
    }

    /// The `strategy` label emitted on `RetrievalResult`.
    pub fn strategy_label(&self) -> &'static str {
        match self {
            LocatorKind::Id => "id",
            LocatorKind::Testid => "testid",
            LocatorKind::AriaLabel => "aria",
            LocatorKind::RoleName => "role+name",
            LocatorKind::TextExact => "text",
            LocatorKind::Css => "css",
            LocatorKind::Xpath => "xpath",
        }
    }

    /// Reverse of `strategy_label`, used to recover a candidate's kind from a
    /// `PromotionRecord.strategy` string read back from the store.
    pub fn from_label(label: &str) -> Option<LocatorKind> {
        match label {
            "id" => Some(LocatorKind::Id),
            "testid" => Some(LocatorKind::Testid),
            "aria" => Some(LocatorKind::AriaLabel),
            "role+name" => Some(LocatorKind::RoleName),
            "text" => Some(LocatorKind::TextExact),
            "css" => Some(LocatorKind::Css),
            "xpath" => Some(LocatorKind::Xpath),
            _ => None,
        }
    }
}

/// `{kind, expression, specificity_rank}` (§3 "Locator candidate").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocatorCandidate {
    pub kind: LocatorKind,
    pub expression: String,
    pub specificity_rank: u8,
}

impl LocatorCandidate {
    pub fn new(kind: LocatorKind, expression: String) -> Self {
        let specificity_rank = kind.specificity_rank();
        Self { kind, expression, specificity_rank }
    }
}

/// Transient per-retrieval record (§3 "Candidate").
#[derive(Debug, Clone)]
pub struct Candidate {
    pub descriptor: ElementDescriptor,
    pub cosine_score: f32,
    pub rerank_score: f32,
    pub fused_score: f32,
    pub promotion_prior: f32,
    pub locator_candidates: Vec<LocatorCandidate>,
    pub chosen_locator: Option<LocatorCandidate>,
    pub verified: bool,
    pub unique: bool,
}

/// `{context_key, locator_string, strategy, successes, failures, score, last_used_ts, ttl}`
/// (§3 "Promotion record").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromotionRecord {
    pub context_key: String,
    pub locator: String,
    pub strategy: String,
    pub successes: u32,
    pub failures: u32,
    pub score: f64,
    pub last_used_ts: f64,
    pub ttl_sec: f64,
}

impl PromotionRecord {
    /// `now - last_used_ts > ttl` is expired per §3; the exactly-`ttl`-age boundary
    /// case (§8) is also treated as expired, so freshness is a strict `<`, not `<=`.
    pub fn is_fresh(&self, now: f64) -> bool {
        (now - self.last_used_ts) < self.ttl_sec
    }

    /// `score · 2^(−age_seconds / half_life)`.
    pub fn decayed_score(&self, now: f64, half_life_sec: f64) -> f64 {
        let age = (now - self.last_used_ts).max(0.0);
        if age <= 0.0 {
            return self.score;
        }
        self.score * 2f64.powf(-age / half_life_sec)
    }
}
