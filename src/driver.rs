//! The driver capability set the core consumes (§6 "Driver interface (consumed)").
//!
//! This is an out-of-scope external collaborator per the purpose statement — the core
//! never assumes a specific browser protocol beyond this trait. `browser.rs` provides
//! a `chromiumoxide`-backed implementation; tests use `mock::MockDriver`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::{BoundingBox, Visibility};

/// Opaque raw DOM node as reported by the driver, pre-merge with the AX tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDomNode {
    pub backend_id: u64,
    pub tag: String,
    pub attributes: Vec<(String, String)>,
    pub inner_text: String,
    pub bbox: BoundingBox,
    pub children: Vec<RawDomNode>,
    pub shadow_children: Vec<RawDomNode>,
    pub in_closed_shadow: bool,
}

/// Opaque raw accessibility node, keyed by the same `backend_id` space as DOM nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawAxNode {
    pub backend_id: u64,
    pub role: Option<String>,
    pub name: Option<String>,
}

/// A resolved match from `query_locator`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeHandle {
    pub backend_id: u64,
    pub tag: String,
    pub bbox: BoundingBox,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocatorQueryKind {
    Xpath,
    Css,
}

#[derive(Debug, Clone, Default)]
pub struct QueryLocatorResult {
    pub matches: Vec<NodeHandle>,
}

impl QueryLocatorResult {
    pub fn match_count(&self) -> usize {
        self.matches.len()
    }
}

/// Page-readiness / network-activity snapshot used by Stability Waits (§4.11).
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadinessState {
    pub document_ready: bool,
    pub in_flight_requests: u32,
    pub ms_since_last_activity: u64,
}

#[async_trait]
pub trait Driver: Send + Sync {
    async fn navigate(&self, url: &str) -> anyhow::Result<()>;
    async fn current_url(&self) -> anyhow::Result<String>;

    /// Optional cheap pre-check signal a driver may provide to skip a full DOM/AX walk.
    /// Returns `None` when the driver doesn't support it (caller must then assume dirty).
    async fn content_hash_hint(&self, frame_path: &[String]) -> anyhow::Result<Option<String>>;

    async fn eval_in_frame(&self, frame_path: &[String], expression: &str) -> anyhow::Result<serde_json::Value>;
    async fn dom_tree(&self, frame_path: &[String]) -> anyhow::Result<RawDomNode>;
    async fn ax_tree(&self, frame_path: &[String]) -> anyhow::Result<Vec<RawAxNode>>;

    /// Enumerate reachable child frames as `(frame_path_segment, url, is_cross_origin)`.
    async fn child_frames(&self, frame_path: &[String]) -> anyhow::Result<Vec<(String, String, bool)>>;

    async fn query_locator(
        &self,
        frame_path: &[String],
        kind: LocatorQueryKind,
        expression: &str,
    ) -> anyhow::Result<QueryLocatorResult>;

    async fn click(&self, frame_path: &[String], handle: &NodeHandle) -> anyhow::Result<()>;
    async fn type_text(&self, frame_path: &[String], handle: &NodeHandle, text: &str) -> anyhow::Result<()>;
    async fn select(&self, frame_path: &[String], handle: &NodeHandle, value: &str) -> anyhow::Result<()>;

    async fn readiness(&self) -> anyhow::Result<ReadinessState>;
    async fn is_detached(&self) -> bool;
}

pub fn visibility_from_flags(hidden: bool, opacity_zero: bool, offscreen: bool) -> Visibility {
    if hidden || opacity_zero {
        Visibility::Hidden
    } else if offscreen {
        Visibility::Offscreen
    } else {
        Visibility::Visible
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    /// An in-memory `Driver` for orchestrator/verifier tests, built around a fixed
    /// set of `NodeHandle`s keyed by locator expression — mirroring how
    /// `MockEmbeddingProvider`/`MockReranker` stand in for the real thing elsewhere
    /// in this codebase's test suites.
    pub struct MockDriver {
        pub url: Mutex<String>,
        pub dom: RawDomNode,
        pub ax: Vec<RawAxNode>,
        pub locator_matches: Mutex<Vec<(String, Vec<NodeHandle>)>>,
        pub detached: Mutex<bool>,
        /// When `Some(true)`, `content_hash_hint` reports "unchanged" (dirty=false).
        pub not_dirty: Mutex<Option<bool>>,
        /// Canned response for `eval_in_frame`, e.g. to simulate an overlay-dismiss
        /// script finding (or not finding) a safe control to click.
        pub eval_response: Mutex<serde_json::Value>,
        /// Child frames reachable from the root frame: `(segment, url, is_cross_origin)`.
        pub child_frame_descs: Mutex<Vec<(String, String, bool)>>,
        /// DOM/AX payload for non-root frames, keyed by the full frame path segment
        /// vector. The root frame (`[]`) always uses `dom`/`ax` above.
        pub frame_data: Mutex<std::collections::HashMap<Vec<String>, (RawDomNode, Vec<RawAxNode>)>>,
    }

    impl MockDriver {
        pub fn new(url: &str, dom: RawDomNode, ax: Vec<RawAxNode>) -> Self {
            Self {
                url: Mutex::new(url.to_string()),
                dom,
                ax,
                locator_matches: Mutex::new(Vec::new()),
                detached: Mutex::new(false),
                not_dirty: Mutex::new(None),
                eval_response: Mutex::new(serde_json::Value::Null),
                child_frame_descs: Mutex::new(Vec::new()),
                frame_data: Mutex::new(std::collections::HashMap::new()),
            }
        }

        pub fn with_locator_match(self, expression: &str, handles: Vec<NodeHandle>) -> Self {
            self.locator_matches.lock().unwrap().push((expression.to_string(), handles));
            self
        }

        pub fn with_eval_response(self, value: serde_json::Value) -> Self {
            *self.eval_response.lock().unwrap() = value;
            self
        }

        /// Register a same-origin or cross-origin child frame of the root frame. For
        /// cross-origin frames `dom`/`ax` are never consulted (the snapshotter must skip
        /// them before calling `dom_tree`/`ax_tree`), so an empty payload is fine.
        pub fn with_child_frame(
            self,
            segment: &str,
            url: &str,
            cross_origin: bool,
            dom: RawDomNode,
            ax: Vec<RawAxNode>,
        ) -> Self {
            self.child_frame_descs.lock().unwrap().push((segment.to_string(), url.to_string(), cross_origin));
            self.frame_data.lock().unwrap().insert(vec![segment.to_string()], (dom, ax));
            self
        }
    }

    #[async_trait]
    impl Driver for MockDriver {
        async fn navigate(&self, url: &str) -> anyhow::Result<()> {
            *self.url.lock().unwrap() = url.to_string();
            Ok(())
        }

        async fn current_url(&self) -> anyhow::Result<String> {
            Ok(self.url.lock().unwrap().clone())
        }

        async fn content_hash_hint(&self, _frame_path: &[String]) -> anyhow::Result<Option<String>> {
            if self.not_dirty.lock().unwrap().unwrap_or(false) {
                Ok(Some("unchanged".to_string()))
            } else {
                Ok(None)
            }
        }

        async fn eval_in_frame(&self, _frame_path: &[String], _expression: &str) -> anyhow::Result<serde_json::Value> {
            Ok(self.eval_response.lock().unwrap().clone())
        }

        async fn dom_tree(&self, frame_path: &[String]) -> anyhow::Result<RawDomNode> {
            if frame_path.is_empty() {
                return Ok(self.dom.clone());
            }
            match self.frame_data.lock().unwrap().get(frame_path) {
                Some((dom, _)) => Ok(dom.clone()),
                None => Ok(self.dom.clone()),
            }
        }

        async fn ax_tree(&self, frame_path: &[String]) -> anyhow::Result<Vec<RawAxNode>> {
            if frame_path.is_empty() {
                return Ok(self.ax.clone());
            }
            match self.frame_data.lock().unwrap().get(frame_path) {
                Some((_, ax)) => Ok(ax.clone()),
                None => Ok(self.ax.clone()),
            }
        }

        async fn child_frames(&self, frame_path: &[String]) -> anyhow::Result<Vec<(String, String, bool)>> {
            if frame_path.is_empty() {
                Ok(self.child_frame_descs.lock().unwrap().clone())
            } else {
                Ok(Vec::new())
            }
        }

        async fn query_locator(
            &self,
            _frame_path: &[String],
            _kind: LocatorQueryKind,
            expression: &str,
        ) -> anyhow::Result<QueryLocatorResult> {
            let matches = self
                .locator_matches
                .lock()
                .unwrap()
                .iter()
                .find(|(e, _)| e == expression)
                .map(|(_, m)| m.clone())
                .unwrap_or_default();
            Ok(QueryLocatorResult { matches })
        }

        async fn click(&self, _frame_path: &[String], _handle: &NodeHandle) -> anyhow::Result<()> {
            Ok(())
        }

        async fn type_text(&self, _frame_path: &[String], _handle: &NodeHandle, _text: &str) -> anyhow::Result<()> {
            Ok(())
        }

        async fn select(&self, _frame_path: &[String], _handle: &NodeHandle, _value: &str) -> anyhow::Result<()> {
            Ok(())
        }

        async fn readiness(&self) -> anyhow::Result<ReadinessState> {
            Ok(ReadinessState { document_ready: true, in_flight_requests: 0, ms_since_last_activity: 1000 })
        }

        async fn is_detached(&self) -> bool {
            *self.detached.lock().unwrap()
        }
    }
}
