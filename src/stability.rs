//! §4.11 Stability Waits — readiness heuristics invoked before snapshotting.
//!
//! Each wait has a bounded timeout; failure to stabilize is not fatal (the orchestrator
//! proceeds to snapshot regardless per §4.11).

use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::debug;

use crate::driver::Driver;

/// Selectors treated as "a spinner is showing" — hidden (or absent) means stable.
const SPINNER_SELECTORS: &[&str] = &[".spinner", ".loading", "[role=progressbar]", ".loader"];

/// Buttons safe to auto-dismiss ("Accept"/"Close"-like). Matched case-insensitively
/// against accessible name / inner text.
const OVERLAY_ACCEPT_ALLOWLIST: &[&str] = &["accept", "close", "dismiss", "ok", "got it", "agree"];

/// Never auto-click anything matching this, even if it also matches the allow-list.
const OVERLAY_DANGER_LIST: &[&str] = &["delete", "cancel", "decline", "remove", "reject"];

/// Poll `readiness().document_ready` until true or `timeout_ms` elapses. Not fatal.
pub async fn wait_document_ready(driver: &dyn Driver, timeout_ms: u64) {
    let deadline = timeout(Duration::from_millis(timeout_ms), async {
        loop {
            match driver.readiness().await {
                Ok(r) if r.document_ready => return,
                _ => sleep(Duration::from_millis(50)).await,
            }
        }
    });
    if deadline.await.is_err() {
        debug!("document-ready wait timed out; proceeding anyway");
    }
}

/// Wait until `in_flight_requests == 0` has held for `idle_window_ms`, or `timeout_ms`
/// elapses. Default `idle_window_ms` is 500 per spec.
pub async fn wait_network_idle(driver: &dyn Driver, idle_window_ms: u64, timeout_ms: u64) {
    let deadline = timeout(Duration::from_millis(timeout_ms), async {
        loop {
            match driver.readiness().await {
                Ok(r) if r.in_flight_requests == 0 && r.ms_since_last_activity >= idle_window_ms => return,
                _ => sleep(Duration::from_millis(50)).await,
            }
        }
    });
    if deadline.await.is_err() {
        debug!("network-idle wait timed out; proceeding anyway");
    }
}

/// Confirm no element matching `SPINNER_SELECTORS` resolves (i.e. is gone/hidden).
/// Best-effort: a driver that can't evaluate CSS presence checks is treated as "gone".
pub async fn wait_spinner_gone(driver: &dyn Driver, timeout_ms: u64) {
    let deadline = timeout(Duration::from_millis(timeout_ms), async {
        loop {
            let mut any_visible = false;
            for selector in SPINNER_SELECTORS {
                let expr = format!(
                    "(function(){{var el=document.querySelector('{selector}');return !!(el && el.offsetParent!==null);}})()"
                );
                if let Ok(serde_json::Value::Bool(true)) = driver.eval_in_frame(&[], &expr).await {
                    any_visible = true;
                    break;
                }
            }
            if !any_visible {
                return;
            }
            sleep(Duration::from_millis(50)).await;
        }
    });
    if deadline.await.is_err() {
        debug!("spinner-gone wait timed out; proceeding anyway");
    }
}

/// True iff `label` should be auto-clicked: matches the accept allow-list and does
/// not match the danger list. The danger list always wins.
pub fn is_safe_to_dismiss(label: &str) -> bool {
    let lower = label.to_lowercase();
    if OVERLAY_DANGER_LIST.iter().any(|d| lower.contains(d)) {
        return false;
    }
    OVERLAY_ACCEPT_ALLOWLIST.iter().any(|a| lower.contains(a))
}

/// In-page script that finds the first accept/close-like control and clicks it,
/// returning its label, or `null` if nothing matched. Mirrors `is_safe_to_dismiss`'s
/// allow/danger lists in JS so the in-page check and the Rust-side predicate can never
/// drift apart.
fn overlay_dismiss_script() -> String {
    let allow = OVERLAY_ACCEPT_ALLOWLIST.iter().map(|s| format!("'{s}'")).collect::<Vec<_>>().join(",");
    let deny = OVERLAY_DANGER_LIST.iter().map(|s| format!("'{s}'")).collect::<Vec<_>>().join(",");
    format!(
        "(function(){{\
           var allow=[{allow}];var deny=[{deny}];\
           var els=document.querySelectorAll('button, [role=button], a');\
           for (var i=0;i<els.length;i++){{\
             var el=els[i];\
             var label=(el.innerText||el.textContent||'').trim().toLowerCase();\
             if(!label) continue;\
             if(deny.some(function(d){{return label.indexOf(d)!==-1}})) continue;\
             if(allow.some(function(a){{return label.indexOf(a)!==-1}})){{el.click();return label;}}\
           }}\
           return null;\
         }})()"
    )
}

/// Best-effort: click the first safe accept/close control found in the top frame, if
/// any. Not fatal — a driver that can't evaluate the script, or a page with no
/// matching overlay, simply leaves the page untouched. Gated by the caller on
/// `HerOptions::auto_overlay_dismiss`.
pub async fn dismiss_safe_overlays(driver: &dyn Driver, timeout_ms: u64) -> bool {
    let result = timeout(Duration::from_millis(timeout_ms), driver.eval_in_frame(&[], &overlay_dismiss_script())).await;
    match result {
        Ok(Ok(serde_json::Value::String(label))) => {
            debug!(label = %label, "auto-dismissed overlay");
            true
        }
        _ => false,
    }
}
