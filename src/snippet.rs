//! §4.5 Snippet Builder — bounded, syntactic HTML context for the Deep Reranker.
//!
//! The snippet is assembled from `ElementDescriptor`s already in hand (via
//! `dom_hierarchy` prefix matching), never a live DOM fragment — it exists only to
//! feed `rerank::DeepReranker::score`.

use crate::model::ElementDescriptor;

const MAX_ANCESTORS: usize = 3;
const MAX_SIBLINGS: usize = 5;
const MAX_TOKENS: usize = 512;
const MAX_BYTES: usize = 4 * 1024;

/// Build a bounded HTML snippet for `target`, using `pool` (typically
/// `DeltaIndex::all_elements()`) to find ancestors and siblings by `dom_hierarchy`
/// prefix/equality. Falls back to target-only when hierarchy can't be resolved.
pub fn build_snippet(target: &ElementDescriptor, pool: &[&ElementDescriptor]) -> String {
    let ancestors = find_ancestors(target, pool);
    let siblings = find_siblings(target, pool);

    let mut html = String::new();
    // Innermost ancestor first in source order, i.e. open tags from outermost to
    // innermost: iterate the ancestor list in reverse (it was collected innermost-first).
    for ancestor in ancestors.iter().rev() {
        html.push_str(&open_tag(ancestor));
    }
    for sib in &siblings {
        html.push_str(&render_element(sib));
    }
    html.push_str(&render_element(target));
    for _ in &ancestors {
        html.push_str("</div>");
    }

    truncate(html)
}

/// Ancestors sharing a strict prefix of `target.dom_hierarchy`, innermost first,
/// capped at `MAX_ANCESTORS`. When `dom_hierarchy` is empty, no ancestors are found.
fn find_ancestors<'a>(target: &ElementDescriptor, pool: &[&'a ElementDescriptor]) -> Vec<&'a ElementDescriptor> {
    if target.dom_hierarchy.is_empty() {
        return Vec::new();
    }
    let mut candidates: Vec<&ElementDescriptor> = pool
        .iter()
        .copied()
        .filter(|e| {
            e.frame_path == target.frame_path
                && e.dom_hierarchy.len() < target.dom_hierarchy.len()
                && target.dom_hierarchy[..e.dom_hierarchy.len()] == e.dom_hierarchy[..]
        })
        .collect();
    // Innermost (longest hierarchy) first.
    candidates.sort_by(|a, b| b.dom_hierarchy.len().cmp(&a.dom_hierarchy.len()));
    candidates.truncate(MAX_ANCESTORS);
    candidates
}

/// Elements sharing the same parent `dom_hierarchy` (i.e. same hierarchy up to the
/// target's immediate parent) as `target`, excluding the target itself.
fn find_siblings<'a>(target: &ElementDescriptor, pool: &[&'a ElementDescriptor]) -> Vec<&'a ElementDescriptor> {
    if target.dom_hierarchy.len() < 2 {
        return Vec::new();
    }
    let parent_prefix = &target.dom_hierarchy[..target.dom_hierarchy.len() - 1];
    pool.iter()
        .copied()
        .filter(|e| {
            e.frame_path == target.frame_path
                && e.xpath_abs != target.xpath_abs
                && e.dom_hierarchy.len() == target.dom_hierarchy.len()
                && &e.dom_hierarchy[..e.dom_hierarchy.len() - 1] == parent_prefix
        })
        .take(MAX_SIBLINGS)
        .collect()
}

fn open_tag(el: &ElementDescriptor) -> String {
    format!("<div{}>", render_attrs(el))
}

fn render_element(el: &ElementDescriptor) -> String {
    format!(
        "<{tag}{attrs}>{text}</{tag}>",
        tag = escape(&el.tag),
        attrs = render_attrs(el),
        text = escape(&el.inner_text),
    )
}

fn render_attrs(el: &ElementDescriptor) -> String {
    let mut out = String::new();
    if !el.role.is_empty() {
        out.push_str(&format!(" role=\"{}\"", escape(&el.role)));
    }
    for (k, v) in &el.attributes {
        out.push_str(&format!(" {}=\"{}\"", escape(k), escape(v)));
    }
    out
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn truncate(html: String) -> String {
    let token_capped: String = html.split_whitespace().take(MAX_TOKENS).collect::<Vec<_>>().join(" ");
    if token_capped.len() <= MAX_BYTES {
        token_capped
    } else {
        token_capped.chars().take(MAX_BYTES).collect()
    }
}
