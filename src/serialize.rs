use crate::dom::{AriaRole, PageSnapshot, SemanticNode};

/// Serialize a PageSnapshot into the compact text format designed for LLM consumption.
///
/// Example output:
/// ```text
/// page: "GitHub - Login" [github.com]
/// ---
/// heading[1]: "Sign in to GitHub"
/// form @e1:
///   textbox @e2 "Username or email address"
///   textbox @e3 "Password" (password)
///   checkbox @e4 "Remember me" [unchecked]
///   button @e5 "Sign in"
/// link @e6: "Forgot password?"
/// ```
pub fn to_compact_text(snapshot: &PageSnapshot) -> String {
    let mut output = String::new();

    if !snapshot.title.is_empty() || !snapshot.url.is_empty() {
        output.push_str(&format!("page: \"{}\"", snapshot.title));
        if !snapshot.url.is_empty() {
            output.push_str(&format!(" [{}]", snapshot.url));
        }
        output.push('\n');

        if let Some(vp) = &snapshot.viewport {
            let bottom = vp.scroll_y + vp.viewport_height;
            output.push_str(&format!(
                "viewport: {}-{} of {}px\n",
                vp.scroll_y, bottom, vp.document_height
            ));
        }

        output.push_str("---\n");
    }

    for node in &snapshot.nodes {
        serialize_node(node, 0, &mut output);
    }

    output
}

fn serialize_node(node: &SemanticNode, indent: usize, output: &mut String) {
    let prefix = "  ".repeat(indent);

    match &node.role {
        AriaRole::StaticText => {
            output.push_str(&format!("{}{}\n", prefix, node.name));
        }
        role => {
            output.push_str(&format!("{}{}", prefix, role));

            if node.ref_id > 0 {
                output.push_str(&format!(" @e{}", node.ref_id));
            }

            if node.offscreen == Some(true) {
                output.push_str(" [offscreen]");
            }

            // Name: skip for containers whose children convey the content.
            // But if children would be suppressed (redundant), show the name to avoid
            // losing content entirely.
            let suppress_name =
                is_container_with_children(node) && !has_redundant_children(node);
            if !node.name.is_empty() && !suppress_name {
                output.push_str(&format!(" \"{}\"", node.name));
            }

            serialize_attrs(node, output);

            if let Some(val) = &node.value {
                if !val.is_empty() {
                    output.push_str(&format!(" = \"{val}\""));
                }
            }

            if node.children.is_empty() || has_redundant_children(node) {
                output.push('\n');
            } else {
                output.push_str(":\n");
                for child in &node.children {
                    serialize_node(child, indent + 1, output);
                }
            }
        }
    }
}

fn serialize_attrs(node: &SemanticNode, output: &mut String) {
    if matches!(node.role, AriaRole::Checkbox | AriaRole::Radio) {
        let is_checked = node.attrs.iter().any(|(k, _)| k == "checked");
        if is_checked {
            output.push_str(" [checked]");
        } else {
            output.push_str(" [unchecked]");
        }
    }

    for (key, val) in &node.attrs {
        match key.as_str() {
            "type" if val != "text" => output.push_str(&format!(" ({val})")),
            "disabled" => output.push_str(" [disabled]"),
            "required" => output.push_str(" [required]"),
            "href" => output.push_str(&format!(" -> {val}")),
            "checked" => {} // handled above
            "type" => {}    // text type is default, skip
            _ => {}
        }
    }
}

/// Check if a node's children are just a single text node that repeats the node's name.
/// In that case we suppress the children to avoid duplication like:
///   link @e1 "GitHub":
///     GitHub
/// Instead we emit: link @e1 "GitHub"
fn has_redundant_children(node: &SemanticNode) -> bool {
    node.children.len() == 1
        && node.children[0].role == AriaRole::StaticText
        && node.children[0].name == node.name
}

/// Container roles whose name is just the concatenation of child text -
/// we skip printing the name to avoid redundancy.
fn is_container_with_children(node: &SemanticNode) -> bool {
    if node.children.is_empty() {
        return false;
    }
    matches!(
        node.role,
        AriaRole::List
            | AriaRole::Navigation
            | AriaRole::Main
            | AriaRole::Banner
            | AriaRole::ContentInfo
            | AriaRole::Complementary
            | AriaRole::Region
            | AriaRole::Form
            | AriaRole::Table
            | AriaRole::Row
            | AriaRole::Paragraph
            | AriaRole::Group
    )
}
