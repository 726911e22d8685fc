use her_core::dom::{AriaRole, PageSnapshot, SemanticNode};
use her_core::extract;
use her_core::hints::{self, TaskContext};
use her_core::pipeline;
use her_core::serialize;

// ── Test Fixtures ───────────────────────────────────────────────────────────
//
// Small, purpose-built HTML snippets rather than whole-page fixtures, each sized to
// exercise one or two pipeline behaviors.

const STORE: &str = r#"
<html>
<head><title>ShopNow</title>
<script src="/react.production.min.js"></script>
<style>.hidden { display: none; }</style>
</head>
<body>
  <header><h1>ShopNow</h1></header>
  <nav><a href="/cart">Cart</a></nav>
  <main>
    <form>
      <label for="q">Search</label>
      <input id="q" type="text" placeholder="Search products">
      <input type="hidden" name="csrf" value="abc">
      <button type="submit">Go</button>
    </form>
    <table>
      <tr><th>Name</th><th>Price</th></tr>
      <tr><td>Widget</td><td>$9.99</td></tr>
      <tr><td>Gadget</td><td>$19.50</td></tr>
    </table>
    <ul>
      <li>Free shipping over $50</li>
      <li>30-day returns</li>
    </ul>
    <div style="display:none">Promo code hidden</div>
    <div aria-hidden="true">Decorative</div>
  </main>
  <footer>&copy; ShopNow</footer>
</body>
</html>
"#;

fn snap(html: &str) -> PageSnapshot {
    pipeline::process(html, "https://example.com")
}

fn snap_text(html: &str) -> String {
    serialize::to_compact_text(&snap(html))
}

/// Count total nodes recursively.
fn count_nodes(nodes: &[SemanticNode]) -> usize {
    nodes.iter().map(|n| 1 + count_nodes(&n.children)).sum()
}

/// Collect all ref_ids > 0 from the tree.
fn collect_refs(nodes: &[SemanticNode]) -> Vec<u32> {
    let mut refs = Vec::new();
    for n in nodes {
        if n.ref_id > 0 {
            refs.push(n.ref_id);
        }
        refs.extend(collect_refs(&n.children));
    }
    refs
}

/// Check if a node with the given role and name-substring exists anywhere in the tree.
fn has_node(nodes: &[SemanticNode], role: &AriaRole, name_contains: &str) -> bool {
    for n in nodes {
        if n.role == *role && n.name.to_lowercase().contains(&name_contains.to_lowercase()) {
            return true;
        }
        if has_node(&n.children, role, name_contains) {
            return true;
        }
    }
    false
}

/// Count nodes of a specific role.
fn count_role(nodes: &[SemanticNode], role: &AriaRole) -> usize {
    let mut count = 0;
    for n in nodes {
        if n.role == *role {
            count += 1;
        }
        count += count_role(&n.children, role);
    }
    count
}

// ═══════════════════════════════════════════════════════════════════════════
// STRUCTURAL PRUNING
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn scripts_and_styles_are_pruned() {
    let text = snap_text(STORE);
    assert!(!text.contains("react.production"), "script src should be pruned");
    assert!(!text.contains(".hidden {"), "style contents should be pruned");
}

#[test]
fn display_none_and_aria_hidden_subtrees_are_pruned() {
    let text = snap_text(STORE);
    assert!(!text.contains("Promo code hidden"));
    assert!(!text.contains("Decorative"));
}

#[test]
fn hidden_inputs_are_pruned() {
    let snapshot = snap(STORE);
    let textboxes = count_role(&snapshot.nodes, &AriaRole::TextBox);
    assert_eq!(textboxes, 1, "only the search box should surface, the hidden csrf input should not");
}

#[test]
fn label_for_is_pruned_and_its_text_becomes_the_inputs_accessible_name() {
    let snapshot = snap(STORE);
    assert!(has_node(&snapshot.nodes, &AriaRole::TextBox, "search"));
    assert!(!has_node(&snapshot.nodes, &AriaRole::Group, "search"), "the <label> element itself should not survive as a separate node");
}

// ═══════════════════════════════════════════════════════════════════════════
// ROLE DETECTION
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn page_title_is_extracted() {
    let snapshot = snap(STORE);
    assert_eq!(snapshot.title, "ShopNow");
}

#[test]
fn landmarks_headings_and_widgets_are_detected() {
    let snapshot = snap(STORE);
    assert!(has_node(&snapshot.nodes, &AriaRole::Heading { level: 1 }, "shopnow"));
    assert!(has_node(&snapshot.nodes, &AriaRole::Navigation, ""));
    assert!(has_node(&snapshot.nodes, &AriaRole::Form, ""));
    assert!(has_node(&snapshot.nodes, &AriaRole::Button, "go"));
    assert!(has_node(&snapshot.nodes, &AriaRole::ContentInfo, ""));
    assert!(has_node(&snapshot.nodes, &AriaRole::Table, ""));
    assert!(has_node(&snapshot.nodes, &AriaRole::List, ""));
}

#[test]
fn list_items_are_present_under_the_list() {
    let snapshot = snap(STORE);
    assert_eq!(count_role(&snapshot.nodes, &AriaRole::ListItem), 2);
}

#[test]
fn explicit_role_attribute_overrides_tag_inference() {
    let html = r#"<div role="button" id="x">Custom button</div>"#;
    let snapshot = snap(html);
    assert!(has_node(&snapshot.nodes, &AriaRole::Button, "custom button"));
}

// ═══════════════════════════════════════════════════════════════════════════
// REF ASSIGNMENT
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn interactive_elements_get_nonzero_refs_and_refs_are_unique() {
    let snapshot = snap(STORE);
    let refs = collect_refs(&snapshot.nodes);
    assert!(!refs.is_empty());
    let mut sorted = refs.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(sorted.len(), refs.len(), "ref ids must be unique");
}

#[test]
fn refs_are_stable_across_repeated_processing_of_the_same_html() {
    let first = collect_refs(&snap(STORE).nodes);
    let second = collect_refs(&snap(STORE).nodes);
    assert_eq!(first, second);
}

#[test]
fn non_interactive_roles_get_zero_ref() {
    let snapshot = snap(STORE);
    fn all_headings_have_zero_ref(nodes: &[SemanticNode]) -> bool {
        nodes.iter().all(|n| {
            let ok = !matches!(n.role, AriaRole::Heading { .. }) || n.ref_id == 0;
            ok && all_headings_have_zero_ref(&n.children)
        })
    }
    assert!(all_headings_have_zero_ref(&snapshot.nodes));
}

// ═══════════════════════════════════════════════════════════════════════════
// COMPACT TEXT SERIALIZATION
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn compact_text_starts_with_a_page_header() {
    let text = snap_text(STORE);
    assert!(text.starts_with("page: \"ShopNow\""));
}

#[test]
fn compact_text_annotates_interactive_nodes_with_their_ref() {
    let text = snap_text(STORE);
    assert!(text.contains("@e"), "at least one interactive element should carry a ref annotation");
}

#[test]
fn compact_text_is_meaningfully_smaller_than_the_source_html() {
    let text = snap_text(STORE);
    let ratio = text.len() as f64 / STORE.len() as f64;
    assert!(ratio < 0.7, "compact text should compress the source HTML, got ratio {ratio:.2}");
}

// ═══════════════════════════════════════════════════════════════════════════
// STRUCTURED EXTRACTION
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn extract_with_schema_pulls_rows_out_of_a_table() {
    let snapshot = snap(STORE);
    let schema = serde_json::json!({
        "type": "array",
        "items": {
            "type": "object",
            "properties": {
                "name": { "type": "string" },
                "price": { "type": "string" }
            }
        }
    });
    let result = extract::extract_with_schema(&snapshot, &schema, None);
    let rows = result.as_array().expect("expected an array result");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["name"], "Widget");
    assert_eq!(rows[0]["price"], "$9.99");
    assert_eq!(rows[1]["name"], "Gadget");
    assert_eq!(rows[1]["price"], "$19.50");
}

#[test]
fn extract_with_schema_returns_null_for_an_empty_selector_match() {
    let snapshot = snap(STORE);
    let schema = serde_json::json!({ "type": "object", "properties": {} });
    let result = extract::extract_with_schema(&snapshot, &schema, Some("[role=\"dialog\"]"));
    assert_eq!(result, serde_json::Value::Null);
}

#[test]
fn coerce_value_parses_numeric_and_boolean_types() {
    assert_eq!(extract::coerce_value("42", "number"), serde_json::json!(42.0));
    assert_eq!(extract::coerce_value("true", "boolean"), serde_json::json!(true));
    assert_eq!(extract::coerce_value("hello", "string"), serde_json::json!("hello"));
}

// ═══════════════════════════════════════════════════════════════════════════
// TASK-CONTEXT HINTS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn task_context_keeps_matching_text_and_its_landmark_ancestors() {
    let snapshot = snap(STORE);
    let ctx = TaskContext {
        task: "search for a widget".to_string(),
        focus_text: vec!["search".to_string()],
        focus_roles: vec![],
        interactive_only: false,
    };
    let filtered = ctx.filter_snapshot(&snapshot);
    assert!(has_node(&filtered.nodes, &AriaRole::TextBox, "search"));
}

#[test]
fn task_context_interactive_only_drops_plain_paragraphs() {
    let html = r#"<p>Some unrelated filler paragraph text.</p><button id="go">Go</button>"#;
    let snapshot = snap(html);
    let ctx = TaskContext {
        task: "click go".to_string(),
        focus_text: vec![],
        focus_roles: vec![],
        interactive_only: true,
    };
    let filtered = ctx.filter_snapshot(&snapshot);
    assert!(has_node(&filtered.nodes, &AriaRole::Button, "go"));
    assert!(!has_node(&filtered.nodes, &AriaRole::Paragraph, "filler"));
}

#[test]
fn parse_role_round_trips_common_role_names() {
    assert_eq!(hints::parse_role("button"), Some(AriaRole::Button));
    assert_eq!(hints::parse_role("textbox"), Some(AriaRole::TextBox));
    assert_eq!(hints::parse_role("nav"), Some(AriaRole::Navigation));
    assert_eq!(hints::parse_role("not-a-real-role"), None);
}

// ═══════════════════════════════════════════════════════════════════════════
// MISC NODE COUNTING SANITY
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn node_count_is_nonzero_and_bounded_by_source_element_count() {
    let snapshot = snap(STORE);
    let n = count_nodes(&snapshot.nodes);
    assert!(n > 5);
    assert!(n < 60);
}
