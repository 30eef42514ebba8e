use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::Span;

use super::prompts::SYSTEM_PROMPT;
use super::tools::ToolRegistry;
use crate::error::ToolError;

#[derive(Debug, Clone, PartialEq)]
pub struct NodeSummary {
    pub id: String,
    pub title: String,
    pub status: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EdgeSummary {
    pub from: String,
    pub to: String,
    pub kind: String,
    pub label: Option<String>,
}

/// Point-in-time view of the graph, used for a single render.
#[derive(Debug, Clone)]
pub struct GraphSnapshot {
    pub nodes: Vec<NodeSummary>,
    pub edges: Vec<EdgeSummary>,
    pub keywords: Vec<String>,
    pub node_count: usize,
    pub fetched_at: DateTime<Utc>,
}

pub(crate) fn scalar(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl GraphSnapshot {
    /// Parse the overview and keyword payloads, skipping anything malformed.
    pub fn from_payloads(overview: &Value, keywords: &Value) -> Self {
        let empty = Vec::new();
        let nodes: Vec<NodeSummary> = overview
            .get("nodes")
            .and_then(Value::as_array)
            .unwrap_or(&empty)
            .iter()
            .filter_map(|n| {
                Some(NodeSummary {
                    id: scalar(n.get("id"))?,
                    title: scalar(n.get("title")).unwrap_or_else(|| "Untitled".into()),
                    status: scalar(n.get("status")).unwrap_or_else(|| "unknown".into()),
                    description: scalar(n.get("description")),
                })
            })
            .collect();
        let edges = overview
            .get("edges")
            .and_then(Value::as_array)
            .unwrap_or(&empty)
            .iter()
            .filter_map(|e| {
                Some(EdgeSummary {
                    from: scalar(e.get("from"))?,
                    to: scalar(e.get("to"))?,
                    kind: scalar(e.get("type")).unwrap_or_else(|| "related".into()),
                    label: scalar(e.get("label")),
                })
            })
            .collect();
        let keywords = keywords
            .as_array()
            .unwrap_or(&empty)
            .iter()
            .filter_map(|k| scalar(Some(k)).or_else(|| scalar(k.get("keyword"))))
            .collect();
        Self { node_count: nodes.len(), nodes, edges, keywords, fetched_at: Utc::now() }
    }
}

/// Renders the system prompt, enriched with live graph state when the graph
/// service answers.
pub struct ContextBuilder {
    registry: Arc<ToolRegistry>,
    base_prompt: String,
    span: Span,
}

impl ContextBuilder {
    pub fn new(registry: Arc<ToolRegistry>, parent: &Span) -> Self {
        Self { registry, base_prompt: SYSTEM_PROMPT.to_string(), span: tracing::info_span!(parent: parent, "context") }
    }

    pub fn base_prompt(&self) -> &str {
        &self.base_prompt
    }

    pub async fn snapshot(&self) -> Result<GraphSnapshot, ToolError> {
        let overview = self.registry.run("get_graph_overview", json!({})).await?;
        let keywords = self.registry.run("get_context_keywords", json!({})).await?;
        Ok(GraphSnapshot::from_payloads(&overview, &keywords))
    }

    pub async fn build_initial_prompt(&self) -> String {
        match self.snapshot().await {
            Ok(snap) => {
                tracing::debug!(parent: &self.span, nodes = snap.node_count, edges = snap.edges.len(), keywords = snap.keywords.len(), "graph snapshot fetched");
                self.render(&snap)
            }
            Err(e) => {
                tracing::warn!(parent: &self.span, error = %e, "graph snapshot unavailable, using static prompt");
                self.base_prompt.clone()
            }
        }
    }

    /// Re-fetches on every call; nothing is cached between renders.
    pub async fn refresh(&self) -> String {
        self.build_initial_prompt().await
    }

    pub fn render(&self, snap: &GraphSnapshot) -> String {
        let mut lines = vec![
            self.base_prompt.clone(),
            String::new(),
            "## Current Research Graph".to_string(),
            format!("Experiments: {} (as of {})", snap.node_count, snap.fetched_at.to_rfc3339()),
            String::new(),
            "### Experiments".to_string(),
        ];
        if snap.nodes.is_empty() {
            lines.push("No experiments recorded yet.".into());
        }
        for n in &snap.nodes {
            lines.push(match &n.description {
                Some(d) => format!("- [#{}] {} ({}): {}", n.id, n.title, n.status, d),
                None => format!("- [#{}] {} ({})", n.id, n.title, n.status),
            });
        }

        lines.push(String::new());
        lines.push("### Relationships".into());
        if snap.edges.is_empty() {
            lines.push("No relationships recorded yet.".into());
        }
        for e in &snap.edges {
            lines.push(match &e.label {
                Some(l) => format!("- #{} → #{} ({}): {}", e.from, e.to, e.kind, l),
                None => format!("- #{} → #{} ({})", e.from, e.to, e.kind),
            });
        }

        lines.push(String::new());
        lines.push("### Context Keywords".into());
        if snap.keywords.is_empty() {
            lines.push("No context keywords saved.".into());
        } else {
            lines.push(snap.keywords.join(", "));
        }
        lines.join("\n")
    }
}
