//! Task-context hints for focusing page snapshots on relevant content.
//!
//! When an agent sets a task context (e.g., "fill out the login form"), subsequent
//! snapshots are filtered to prioritize relevant elements and remove noise.
//! This reduces token usage by showing only what matters for the current task.

use crate::dom::{AriaRole, PageSnapshot, SemanticNode};

/// Task context that influences how snapshots are filtered.
#[derive(Debug, Clone)]
pub struct TaskContext {
    /// Description of what the agent is trying to accomplish.
    /// Stored for diagnostics and future LLM-based relevance scoring.
    #[allow(dead_code)]
    pub task: String,
    /// Text patterns to match against element names (case-insensitive substring).
    pub focus_text: Vec<String>,
    /// ARIA roles to prioritize.
    pub focus_roles: Vec<AriaRole>,
    /// If true, primarily show interactive elements and their structural parents.
    pub interactive_only: bool,
}

impl TaskContext {
    /// Score a node's relevance to this task context.
    /// Returns 0.0 for irrelevant, higher for more relevant.
    fn score_node(&self, node: &SemanticNode) -> f32 {
        let mut score: f32 = 0.0;

        if node.role.is_interactive() {
            score += 0.5;
        }
        if is_landmark(&node.role) {
            score += 0.3;
        }
        if matches!(node.role, AriaRole::Heading { .. }) {
            score += 0.4;
        }

        let name_lower = node.name.to_lowercase();
        for pattern in &self.focus_text {
            if name_lower.contains(&pattern.to_lowercase()) {
                score += 1.0;
            }
        }

        for role in &self.focus_roles {
            if node.role == *role {
                score += 1.0;
            }
        }

        if self.interactive_only
            && !node.role.is_interactive()
            && !is_landmark(&node.role)
            && !matches!(node.role, AriaRole::Heading { .. })
        {
            score *= 0.1;
        }

        score
    }

    /// Filter a PageSnapshot to only include relevant content.
    /// Keeps structural parents (landmarks, headings) of relevant nodes.
    pub fn filter_snapshot(&self, snapshot: &PageSnapshot) -> PageSnapshot {
        let threshold = if self.interactive_only { 0.3 } else { 0.2 };
        PageSnapshot {
            title: snapshot.title.clone(),
            url: snapshot.url.clone(),
            nodes: self.filter_nodes(&snapshot.nodes, threshold),
            viewport: snapshot.viewport.clone(),
        }
    }

    fn filter_nodes(&self, nodes: &[SemanticNode], threshold: f32) -> Vec<SemanticNode> {
        nodes
            .iter()
            .filter_map(|node| self.filter_node(node, threshold))
            .collect()
    }

    fn filter_node(&self, node: &SemanticNode, threshold: f32) -> Option<SemanticNode> {
        let score = self.score_node(node);

        let filtered_children = self.filter_nodes(&node.children, threshold);

        if score >= threshold || !filtered_children.is_empty() {
            Some(SemanticNode {
                ref_id: node.ref_id,
                role: node.role.clone(),
                name: node.name.clone(),
                value: node.value.clone(),
                attrs: node.attrs.clone(),
                children: filtered_children,
                offscreen: node.offscreen,
            })
        } else {
            None
        }
    }
}

/// Parse a role name string into an AriaRole.
pub fn parse_role(s: &str) -> Option<AriaRole> {
    match s.to_lowercase().as_str() {
        "button" => Some(AriaRole::Button),
        "link" => Some(AriaRole::Link),
        "textbox" | "input" => Some(AriaRole::TextBox),
        "checkbox" => Some(AriaRole::Checkbox),
        "radio" => Some(AriaRole::Radio),
        "combobox" | "select" => Some(AriaRole::ComboBox),
        "option" => Some(AriaRole::Option),
        "tab" => Some(AriaRole::Tab),
        "tabpanel" => Some(AriaRole::TabPanel),
        "dialog" => Some(AriaRole::Dialog),
        "alert" => Some(AriaRole::Alert),
        "menu" => Some(AriaRole::Menu),
        "menuitem" => Some(AriaRole::MenuItem),
        "navigation" | "nav" => Some(AriaRole::Navigation),
        "main" => Some(AriaRole::Main),
        "banner" | "header" => Some(AriaRole::Banner),
        "contentinfo" | "footer" => Some(AriaRole::ContentInfo),
        "complementary" | "aside" => Some(AriaRole::Complementary),
        "search" => Some(AriaRole::Search),
        "region" => Some(AriaRole::Region),
        "form" => Some(AriaRole::Form),
        "heading" => Some(AriaRole::Heading { level: 2 }),
        "list" => Some(AriaRole::List),
        "listitem" => Some(AriaRole::ListItem),
        "table" => Some(AriaRole::Table),
        "row" => Some(AriaRole::Row),
        "cell" => Some(AriaRole::Cell),
        "img" | "image" => Some(AriaRole::Img),
        _ => None,
    }
}

fn is_landmark(role: &AriaRole) -> bool {
    matches!(
        role,
        AriaRole::Navigation
            | AriaRole::Main
            | AriaRole::Banner
            | AriaRole::ContentInfo
            | AriaRole::Complementary
            | AriaRole::Search
            | AriaRole::Region
    )
}
