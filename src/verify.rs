//! §4.8 Verifier — confirm a synthesized locator resolves to exactly one node, and
//! that it is the intended element.

use crate::driver::{Driver, LocatorQueryKind, NodeHandle};
use crate::model::{BoundingBox, LocatorCandidate, LocatorKind};

#[derive(Debug, Clone)]
pub struct VerifyOutcome {
    pub chosen: LocatorCandidate,
    pub verified: bool,
    pub unique: bool,
    /// Other synthesized expressions, deduplicated, excluding `chosen.expression`
    /// (§8 invariant 5: no duplicates, never contains the chosen selector).
    pub alternatives: Vec<String>,
}

fn query_kind_for(kind: LocatorKind) -> LocatorQueryKind {
    match kind {
        LocatorKind::Css => LocatorQueryKind::Css,
        _ => LocatorQueryKind::Xpath,
    }
}

fn same_node(handle: &NodeHandle, backend_id: u64, tag: &str, bbox: &BoundingBox) -> bool {
    if handle.backend_id == backend_id {
        return true;
    }
    handle.tag == tag && handle.bbox == *bbox
}

fn alternatives_for(chosen: &str, candidates: &[LocatorCandidate]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for c in candidates {
        if c.expression == chosen {
            continue;
        }
        if seen.insert(c.expression.clone()) {
            out.push(c.expression.clone());
        }
    }
    out
}

/// Try `candidates` in order against `frame_path`. Returns the first candidate that
/// resolves to exactly one node matching `backend_id` (or, as fallback, `tag`+`bbox`).
/// If none verify uniquely, returns the last candidate (the absolute xpath, by
/// `locator::synthesize`'s ordering) with `verified=false, unique=false`.
pub async fn verify(
    driver: &dyn Driver,
    frame_path: &[String],
    backend_id: u64,
    tag: &str,
    bbox: &BoundingBox,
    candidates: &[LocatorCandidate],
) -> VerifyOutcome {
    for candidate in candidates {
        let query_kind = query_kind_for(candidate.kind);
        let result = match driver.query_locator(frame_path, query_kind, &candidate.expression).await {
            Ok(r) => r,
            Err(_) => continue,
        };
        match result.match_count() {
            0 => continue,
            1 => {
                if same_node(&result.matches[0], backend_id, tag, bbox) {
                    return VerifyOutcome {
                        alternatives: alternatives_for(&candidate.expression, candidates),
                        chosen: candidate.clone(),
                        verified: true,
                        unique: true,
                    };
                }
                // Resolves uniquely but to the wrong node: not a match, try next.
                continue;
            }
            _ => continue, // ambiguous; try next candidate
        }
    }

    let fallback = candidates.last().expect("synthesize always emits at least the absolute xpath").clone();
    VerifyOutcome {
        alternatives: alternatives_for(&fallback.expression, candidates),
        chosen: fallback,
        verified: false,
        unique: false,
    }
}

/// Lighter check used by the Orchestrator's cache-consult stage (§4.10 step 1): a
/// promotion record carries no stored `frame_path`/`backend_id`, so all we can assert
/// is that the expression still resolves to exactly one node at the root frame.
pub async fn verify_unique_only(driver: &dyn Driver, kind: LocatorKind, expression: &str) -> bool {
    match driver.query_locator(&[], query_kind_for(kind), expression).await {
        Ok(r) => r.match_count() == 1,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::mock::MockDriver;
    use crate::driver::RawDomNode;
    use crate::model::LocatorKind;

    fn dom() -> RawDomNode {
        RawDomNode {
            backend_id: 1,
            tag: "div".to_string(),
            attributes: vec![],
            inner_text: String::new(),
            bbox: BoundingBox::ZERO,
            children: vec![],
            shadow_children: vec![],
            in_closed_shadow: false,
        }
    }

    fn handle(backend_id: u64, tag: &str) -> NodeHandle {
        NodeHandle { backend_id, tag: tag.to_string(), bbox: BoundingBox::ZERO }
    }

    #[tokio::test]
    async fn first_unique_match_wins() {
        let driver = MockDriver::new("https://x.test", dom(), vec![])
            .with_locator_match("//*[@id='apple-filter-main']", vec![handle(42, "button")]);
        let candidates = vec![
            LocatorCandidate::new(LocatorKind::Id, "//*[@id='apple-filter-main']".to_string()),
            LocatorCandidate::new(LocatorKind::Xpath, "/html[1]/body[1]/button[1]".to_string()),
        ];
        let outcome = verify(&driver, &[], 42, "button", &BoundingBox::ZERO, &candidates).await;
        assert!(outcome.verified);
        assert!(outcome.unique);
        assert_eq!(outcome.chosen.kind, LocatorKind::Id);
        assert_eq!(outcome.alternatives, vec!["/html[1]/body[1]/button[1]".to_string()]);
    }

    #[tokio::test]
    async fn ambiguous_match_falls_through_to_next_candidate() {
        let driver = MockDriver::new("https://x.test", dom(), vec![])
            .with_locator_match("//button[normalize-space()='Apple']", vec![handle(1, "button"), handle(2, "button")])
            .with_locator_match("//*[@id='apple-filter-main']", vec![handle(42, "button")]);
        let candidates = vec![
            LocatorCandidate::new(LocatorKind::TextExact, "//button[normalize-space()='Apple']".to_string()),
            LocatorCandidate::new(LocatorKind::Id, "//*[@id='apple-filter-main']".to_string()),
        ];
        let outcome = verify(&driver, &[], 42, "button", &BoundingBox::ZERO, &candidates).await;
        assert!(outcome.verified);
        assert_eq!(outcome.chosen.kind, LocatorKind::Id);
    }

    #[tokio::test]
    async fn zero_matches_all_candidates_returns_unverified_fallback() {
        let driver = MockDriver::new("https://x.test", dom(), vec![]);
        let candidates = vec![
            LocatorCandidate::new(LocatorKind::Id, "//*[@id='missing']".to_string()),
            LocatorCandidate::new(LocatorKind::Xpath, "/html[1]/body[1]/button[1]".to_string()),
        ];
        let outcome = verify(&driver, &[], 42, "button", &BoundingBox::ZERO, &candidates).await;
        assert!(!outcome.verified);
        assert!(!outcome.unique);
        assert_eq!(outcome.chosen.kind, LocatorKind::Xpath);
    }

    #[tokio::test]
    async fn alternatives_never_contain_the_chosen_selector_and_have_no_duplicates() {
        let driver = MockDriver::new("https://x.test", dom(), vec![])
            .with_locator_match("//*[@id='a']", vec![handle(42, "button")]);
        let candidates = vec![
            LocatorCandidate::new(LocatorKind::Id, "//*[@id='a']".to_string()),
            LocatorCandidate::new(LocatorKind::Xpath, "//*[@id='a']".to_string()),
            LocatorCandidate::new(LocatorKind::Css, "button.foo".to_string()),
        ];
        let outcome = verify(&driver, &[], 42, "button", &BoundingBox::ZERO, &candidates).await;
        assert!(!outcome.alternatives.contains(&"//*[@id='a']".to_string()));
        assert_eq!(outcome.alternatives, vec!["button.foo".to_string()]);
    }
}
