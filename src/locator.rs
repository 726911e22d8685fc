//! §4.7 Locator Synthesizer — ordered candidate locators for a winning descriptor.
//!
//! Every candidate is scoped to the element's `frame_path` by the Verifier, not here;
//! this module only builds the expression strings in priority order.

use crate::model::{ElementDescriptor, LocatorCandidate, LocatorKind};

/// Emit locator candidates for `target` in priority order (§4.7, items 1-7). `pool`
/// (typically all elements of `target`'s frame) is consulted only for the id-duplicate
/// check in step 1.
pub fn synthesize(target: &ElementDescriptor, pool: &[&ElementDescriptor]) -> Vec<LocatorCandidate> {
    let mut out = Vec::new();

    if let Some(id) = target.attributes.get("id") {
        if is_stable_id(id) && !is_duplicated_id(id, target, pool) {
            out.push(LocatorCandidate::new(LocatorKind::Id, format!("//*[@id={}]", xpath_literal(id))));
        }
    }

    if let Some(testid) = target.attributes.get("data-testid") {
        out.push(LocatorCandidate::new(
            LocatorKind::Testid,
            format!("//*[@data-testid={}]", xpath_literal(testid)),
        ));
    }

    if let Some(aria_label) = target.attributes.get("aria-label") {
        out.push(LocatorCandidate::new(
            LocatorKind::AriaLabel,
            format!("//*[@aria-label={}]", xpath_literal(aria_label)),
        ));
    }

    if !target.role.is_empty() && !target.accessible_name.is_empty() {
        out.push(LocatorCandidate::new(
            LocatorKind::RoleName,
            format!(
                "//*[@role={}][normalize-space()={}]",
                xpath_literal(&target.role),
                xpath_literal(&target.accessible_name)
            ),
        ));
    }

    let text = target.inner_text.trim();
    if !text.is_empty() && text.chars().count() < 100 {
        out.push(LocatorCandidate::new(
            LocatorKind::TextExact,
            format!("//{}[normalize-space()={}]", target.tag, xpath_literal(text)),
        ));
    }

    if let Some(css) = attribute_css(target) {
        out.push(LocatorCandidate::new(LocatorKind::Css, css));
    }

    // Absolute xpath, last resort: always present so the Verifier always has a
    // fallback-unverified candidate to report.
    out.push(LocatorCandidate::new(LocatorKind::Xpath, target.xpath_abs.clone()));

    out
}

fn is_duplicated_id(id: &str, target: &ElementDescriptor, pool: &[&ElementDescriptor]) -> bool {
    pool.iter()
        .filter(|e| e.frame_path == target.frame_path && e.attributes.get("id").map(String::as_str) == Some(id))
        .count()
        > 1
}

/// Rejects "looks auto-generated" ids: `^[a-z]+[-_]\d+$` (e.g. `field-12`) or any
/// 6-or-more-digit run (e.g. a timestamp or database id baked into the DOM).
fn is_stable_id(id: &str) -> bool {
    if matches_generated_pattern(id) {
        return false;
    }
    let mut run = 0;
    for c in id.chars() {
        if c.is_ascii_digit() {
            run += 1;
            if run >= 6 {
                return false;
            }
        } else {
            run = 0;
        }
    }
    true
}

/// `^[a-z]+[-_]\d+$`: lowercase letters, one `-`/`_`, then all digits, nothing else.
fn matches_generated_pattern(id: &str) -> bool {
    let bytes = id.as_bytes();
    let Some(sep_pos) = bytes.iter().position(|b| *b == b'-' || *b == b'_') else {
        return false;
    };
    let (prefix, rest) = id.split_at(sep_pos);
    let suffix = &rest[1..];
    !prefix.is_empty()
        && prefix.chars().all(|c| c.is_ascii_lowercase())
        && !suffix.is_empty()
        && suffix.chars().all(|c| c.is_ascii_digit())
}

fn attribute_css(target: &ElementDescriptor) -> Option<String> {
    if let Some(name) = target.attributes.get("name") {
        return Some(format!("{}[name='{}']", target.tag, css_escape(name)));
    }
    if let Some(href) = target.attributes.get("href") {
        return Some(format!("{}[href='{}']", target.tag, css_escape(href)));
    }
    if let Some(class) = target.attributes.get("class") {
        if let Some(first) = class.split_whitespace().next() {
            return Some(format!("{}.{}", target.tag, first));
        }
    }
    None
}

fn css_escape(v: &str) -> String {
    v.replace('\\', "\\\\").replace('\'', "\\'")
}

/// XPath string literal, using `concat()` when the value contains both quote kinds
/// (XPath 1.0 has no escape sequence inside a single string literal).
fn xpath_literal(v: &str) -> String {
    if !v.contains('\'') {
        format!("'{v}'")
    } else if !v.contains('"') {
        format!("\"{v}\"")
    } else {
        let parts: Vec<String> = v
            .split('\'')
            .map(|chunk| format!("'{chunk}'"))
            .collect::<Vec<_>>()
            .join(", \"'\", ");
        format!("concat({parts})")
    }
}
