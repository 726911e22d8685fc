//! DOM mutation observer management for incremental re-snapshots.
//!
//! After navigating to a page, we inject a MutationObserver via CDP that
//! tracks DOM changes. This lets us:
//! 1. Return cached snapshots when nothing changed (skip re-processing)
//! 2. Know how much the page changed (mutation count)
//! 3. Wait for the page to update after async actions

/// JavaScript to inject a MutationObserver that tracks DOM changes.
/// Safe to call multiple times - disconnects any previous observer first.
pub const INSTALL_OBSERVER_JS: &str = r#"(function() {
    if (window.__cortex_observer) {
        window.__cortex_observer.disconnect();
    }
    window.__cortex_dirty = false;
    window.__cortex_mutation_count = 0;
    window.__cortex_observer = new MutationObserver(function(mutations) {
        window.__cortex_dirty = true;
        window.__cortex_mutation_count += mutations.length;
    });
    var target = document.body || document.documentElement;
    if (target) {
        window.__cortex_observer.observe(target, {
            childList: true,
            attributes: true,
            characterData: true,
            subtree: true
        });
    }
    return 'installed';
})()"#;

/// JavaScript to check if the DOM has mutations since last reset.
/// Returns JSON: {"dirty": bool, "count": number}
pub const CHECK_DIRTY_JS: &str = r#"(function() {
    return JSON.stringify({
        dirty: !!window.__cortex_dirty,
        count: window.__cortex_mutation_count || 0
    });
})()"#;

/// JavaScript to reset the dirty state after taking a snapshot.
/// Returns the mutation count before reset.
pub const RESET_DIRTY_JS: &str = r#"(function() {
    var count = window.__cortex_mutation_count || 0;
    window.__cortex_dirty = false;
    window.__cortex_mutation_count = 0;
    return count;
})()"#;

/// Parsed result of CHECK_DIRTY_JS.
#[derive(Debug)]
pub struct DirtyState {
    pub dirty: bool,
    /// Number of mutations since last reset; folded into `content_hash_hint`'s digest.
    pub mutation_count: u64,
}

impl DirtyState {
    pub fn from_json(json: &str) -> Self {
        #[derive(serde::Deserialize)]
        struct Raw {
            dirty: bool,
            count: u64,
        }

        match serde_json::from_str::<Raw>(json) {
            Ok(raw) => DirtyState {
                dirty: raw.dirty,
                mutation_count: raw.count,
            },
            Err(_) => DirtyState {
                dirty: true, // assume dirty on parse failure (e.g. page navigated)
                mutation_count: 0,
            },
        }
    }
}
