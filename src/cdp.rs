//! `chromiumoxide`-backed `Driver` (§6 "Driver interface (consumed)").
//!
//! Grounded in `browser.rs`'s connect/launch pattern and `mutation.rs`'s dirty-flag
//! JS. The DOM and accessibility trees are both produced by a single in-page JS walk
//! rather than separate CDP `DOM`/`Accessibility` domain calls, assigning each visited
//! element a `backend_id` and recording it in a page-global registry so later
//! `query_locator`/`click`/`type_text`/`select` calls can resolve a handle back to a
//! live element without re-walking the tree.
//!
//! Only the root frame is addressed; a non-empty `frame_path` is rejected with
//! `HerError::Driver`. Same-origin nested-frame targeting is a real CDP concern
//! (distinct execution contexts per frame) that this driver does not attempt —
//! see `DESIGN.md`.

use async_trait::async_trait;
use chromiumoxide::page::Page;
use serde::Deserialize;

use crate::driver::{Driver, LocatorQueryKind, NodeHandle, QueryLocatorResult, RawAxNode, RawDomNode, ReadinessState};
use crate::model::BoundingBox;
use crate::mutation::{DirtyState, CHECK_DIRTY_JS, INSTALL_OBSERVER_JS, RESET_DIRTY_JS};

/// Walks `document` assigning each element a stable-for-this-page `backend_id` (its
/// index into `window.__her_registry`), returning `{dom, ax}` where `dom` mirrors
/// `RawDomNode` and `ax` mirrors `RawAxNode` built from the same walk (role/name are
/// read from ARIA attributes and a small implicit-role table, not the real
/// accessibility tree).
const SNAPSHOT_JS: &str = r#"(function() {
    window.__her_registry = [];
    function role_of(el) {
        var explicit = el.getAttribute('role');
        if (explicit) return explicit;
        var implicit = {
            A: el.hasAttribute('href') ? 'link' : 'generic',
            BUTTON: 'button', INPUT: 'textbox', TEXTAREA: 'textbox',
            SELECT: 'combobox', IMG: 'img', NAV: 'navigation',
            H1: 'heading', H2: 'heading', H3: 'heading', H4: 'heading', H5: 'heading', H6: 'heading',
            UL: 'list', OL: 'list', LI: 'listitem', TABLE: 'table', FORM: 'form',
        };
        return implicit[el.tagName] || 'generic';
    }
    function name_of(el) {
        return el.getAttribute('aria-label') || el.getAttribute('alt') || el.getAttribute('title') || '';
    }
    function is_dom_visible(el, rect) {
        var style = window.getComputedStyle(el);
        if (style.display === 'none' || style.visibility === 'hidden' || style.opacity === '0') return false;
        return rect.width > 0 && rect.height > 0;
    }
    function walk(el) {
        var backend_id = window.__her_registry.length;
        window.__her_registry.push(el);
        var rect = el.getBoundingClientRect();
        var attrs = [];
        for (var i = 0; i < el.attributes.length; i++) {
            attrs.push([el.attributes[i].name, el.attributes[i].value]);
        }
        var own_text = '';
        for (var j = 0; j < el.childNodes.length; j++) {
            var n = el.childNodes[j];
            if (n.nodeType === 3) own_text += n.textContent;
        }
        var children = [];
        var shadow_children = [];
        for (var k = 0; k < el.children.length; k++) {
            children.push(walk(el.children[k]));
        }
        if (el.shadowRoot) {
            for (var m = 0; m < el.shadowRoot.children.length; m++) {
                shadow_children.push(walk(el.shadowRoot.children[m]));
            }
        }
        return {
            backend_id: backend_id,
            tag: el.tagName.toLowerCase(),
            attributes: attrs,
            inner_text: own_text.trim(),
            bbox: { x: Math.round(rect.x), y: Math.round(rect.y), w: Math.round(rect.width), h: Math.round(rect.height) },
            children: children,
            shadow_children: shadow_children,
            in_closed_shadow: false,
            __visible: is_dom_visible(el, rect),
            __role: role_of(el),
            __name: name_of(el) || own_text.trim().slice(0, 120),
        };
    }
    var root = document.body || document.documentElement;
    var dom = walk(root);
    var ax = [];
    (function collect_ax(node) {
        ax.push({ backend_id: node.backend_id, role: node.__role, name: node.__name });
        node.children.forEach(collect_ax);
        node.shadow_children.forEach(collect_ax);
    })(dom);
    return JSON.stringify({ dom: dom, ax: ax });
})()"#;

const READINESS_JS: &str = r#"(function() {
    var entries = performance.getEntriesByType('resource');
    var now = performance.now();
    var recent = entries.filter(function(e) { return (now - e.responseEnd) < 200 && e.responseEnd > 0; });
    var last = entries.length ? Math.max.apply(null, entries.map(function(e){ return e.responseEnd; })) : 0;
    return JSON.stringify({
        document_ready: document.readyState === 'complete',
        in_flight_requests: recent.length,
        ms_since_last_activity: Math.max(0, Math.round(now - last)),
    });
})()"#;

#[derive(Deserialize)]
struct RawNode {
    backend_id: u64,
    tag: String,
    attributes: Vec<(String, String)>,
    inner_text: String,
    bbox: BoundingBox,
    children: Vec<RawNode>,
    shadow_children: Vec<RawNode>,
    in_closed_shadow: bool,
    #[serde(rename = "__role")]
    role: String,
    #[serde(rename = "__name")]
    name: String,
}

#[derive(Deserialize)]
struct SnapshotJs {
    dom: RawNode,
    ax: Vec<AxEntry>,
}

#[derive(Deserialize)]
struct AxEntry {
    backend_id: u64,
    role: String,
    name: String,
}

fn to_raw_dom(node: RawNode) -> RawDomNode {
    RawDomNode {
        backend_id: node.backend_id,
        tag: node.tag,
        attributes: node.attributes,
        inner_text: node.inner_text,
        bbox: node.bbox,
        children: node.children.into_iter().map(to_raw_dom).collect(),
        shadow_children: node.shadow_children.into_iter().map(to_raw_dom).collect(),
        in_closed_shadow: node.in_closed_shadow,
    }
}

#[derive(Deserialize)]
struct ReadinessJs {
    document_ready: bool,
    in_flight_requests: u32,
    ms_since_last_activity: u64,
}

/// The `Driver` implementation CLI commands construct directly from a `chromiumoxide::Page`.
pub struct CdpDriver {
    page: Page,
}

impl CdpDriver {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    async fn eval_json(&self, script: &str) -> anyhow::Result<serde_json::Value> {
        let result = self.page.evaluate(script).await?;
        Ok(result.into_value()?)
    }

    fn require_root_frame(frame_path: &[String]) -> anyhow::Result<()> {
        if frame_path.is_empty() {
            Ok(())
        } else {
            Err(anyhow::anyhow!("CdpDriver only addresses the root frame; got frame_path={frame_path:?}"))
        }
    }
}

#[async_trait]
impl Driver for CdpDriver {
    async fn navigate(&self, url: &str) -> anyhow::Result<()> {
        self.page.goto(url).await?;
        self.page.wait_for_navigation().await.ok();
        self.page.evaluate(INSTALL_OBSERVER_JS).await?;
        Ok(())
    }

    async fn current_url(&self) -> anyhow::Result<String> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    async fn content_hash_hint(&self, frame_path: &[String]) -> anyhow::Result<Option<String>> {
        Self::require_root_frame(frame_path)?;
        let raw: String = self.page.evaluate(CHECK_DIRTY_JS).await?.into_value()?;
        let parsed = DirtyState::from_json(&raw);
        if parsed.dirty {
            Ok(None)
        } else {
            self.page.evaluate(RESET_DIRTY_JS).await?;
            Ok(Some(format!("stable-{}", parsed.mutation_count)))
        }
    }

    async fn eval_in_frame(&self, frame_path: &[String], expression: &str) -> anyhow::Result<serde_json::Value> {
        Self::require_root_frame(frame_path)?;
        self.eval_json(expression).await
    }

    async fn dom_tree(&self, frame_path: &[String]) -> anyhow::Result<RawDomNode> {
        Self::require_root_frame(frame_path)?;
        let raw: String = self.page.evaluate(SNAPSHOT_JS).await?.into_value()?;
        let parsed: SnapshotJs = serde_json::from_str(&raw)?;
        Ok(to_raw_dom(parsed.dom))
    }

    async fn ax_tree(&self, frame_path: &[String]) -> anyhow::Result<Vec<RawAxNode>> {
        Self::require_root_frame(frame_path)?;
        let raw: String = self.page.evaluate(SNAPSHOT_JS).await?.into_value()?;
        let parsed: SnapshotJs = serde_json::from_str(&raw)?;
        Ok(parsed
            .ax
            .into_iter()
            .map(|a| RawAxNode { backend_id: a.backend_id, role: Some(a.role), name: Some(a.name) })
            .collect())
    }

    async fn child_frames(&self, frame_path: &[String]) -> anyhow::Result<Vec<(String, String, bool)>> {
        Self::require_root_frame(frame_path)?;
        // Cross-origin frames throw on `contentDocument` access; this driver treats
        // that as the cross-origin signal rather than inspecting `document.domain`.
        const JS: &str = r#"(function() {
            var out = [];
            var frames = document.querySelectorAll('iframe, frame');
            for (var i = 0; i < frames.length; i++) {
                var f = frames[i];
                var name = f.getAttribute('name') || f.getAttribute('id') || ('frame-' + i);
                var cross_origin = false;
                try { f.contentDocument.body; } catch (e) { cross_origin = true; }
                out.push([name, f.src || '', cross_origin]);
            }
            return JSON.stringify(out);
        })()"#;
        let raw: String = self.page.evaluate(JS).await?.into_value()?;
        Ok(serde_json::from_str(&raw)?)
    }

    async fn query_locator(
        &self,
        frame_path: &[String],
        kind: LocatorQueryKind,
        expression: &str,
    ) -> anyhow::Result<QueryLocatorResult> {
        Self::require_root_frame(frame_path)?;
        let query_js = match kind {
            LocatorQueryKind::Css => format!(
                "(function(){{var els=Array.from(document.querySelectorAll({expr}));return els;}})()",
                expr = serde_json::to_string(expression)?
            ),
            LocatorQueryKind::Xpath => format!(
                r#"(function() {{
                    var result = document.evaluate({expr}, document, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
                    var out = [];
                    for (var i = 0; i < result.snapshotLength; i++) out.push(result.snapshotItem(i));
                    return out;
                }})()"#,
                expr = serde_json::to_string(expression)?
            ),
        };
        let resolve_js = format!(
            r#"(function() {{
                var els = {query_js};
                var registry = window.__her_registry || [];
                return JSON.stringify(els.map(function(el) {{
                    var idx = registry.indexOf(el);
                    var rect = el.getBoundingClientRect();
                    return {{
                        backend_id: idx >= 0 ? idx : -1,
                        tag: el.tagName.toLowerCase(),
                        bbox: {{ x: Math.round(rect.x), y: Math.round(rect.y), w: Math.round(rect.width), h: Math.round(rect.height) }},
                    }};
                }}));
            }})()"#
        );
        let raw: String = self.page.evaluate(resolve_js).await?.into_value()?;
        let matches: Vec<NodeHandle> = serde_json::from_str(&raw)?;
        Ok(QueryLocatorResult { matches })
    }

    async fn click(&self, frame_path: &[String], handle: &NodeHandle) -> anyhow::Result<()> {
        Self::require_root_frame(frame_path)?;
        let js = format!(
            "(function(){{var el=(window.__her_registry||[])[{id}];if(!el)throw new Error('stale handle');el.click();}})()",
            id = handle.backend_id
        );
        self.page.evaluate(js).await?;
        Ok(())
    }

    async fn type_text(&self, frame_path: &[String], handle: &NodeHandle, text: &str) -> anyhow::Result<()> {
        Self::require_root_frame(frame_path)?;
        let js = format!(
            r#"(function() {{
                var el = (window.__her_registry || [])[{id}];
                if (!el) throw new Error('stale handle');
                el.focus();
                el.value = {text};
                el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
            }})()"#,
            id = handle.backend_id,
            text = serde_json::to_string(text)?
        );
        self.page.evaluate(js).await?;
        Ok(())
    }

    async fn select(&self, frame_path: &[String], handle: &NodeHandle, value: &str) -> anyhow::Result<()> {
        Self::require_root_frame(frame_path)?;
        let js = format!(
            r#"(function() {{
                var el = (window.__her_registry || [])[{id}];
                if (!el) throw new Error('stale handle');
                el.value = {value};
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
            }})()"#,
            id = handle.backend_id,
            value = serde_json::to_string(value)?
        );
        self.page.evaluate(js).await?;
        Ok(())
    }

    async fn readiness(&self) -> anyhow::Result<ReadinessState> {
        let raw: String = self.page.evaluate(READINESS_JS).await?.into_value()?;
        let parsed: ReadinessJs = serde_json::from_str(&raw)?;
        Ok(ReadinessState {
            document_ready: parsed.document_ready,
            in_flight_requests: parsed.in_flight_requests,
            ms_since_last_activity: parsed.ms_since_last_activity,
        })
    }

    async fn is_detached(&self) -> bool {
        self.page.url().await.is_err()
    }
}
