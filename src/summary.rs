use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::Span;

use crate::agent::context::scalar;
use crate::agent::messages::Message;
use crate::agent::prompts::{OVERVIEW_SUMMARY_PROMPT, SUMMARY_SYSTEM_PROMPT, SUMMARY_UNAVAILABLE, WEEKLY_SUMMARY_PROMPT};
use crate::agent::tools::ToolRegistry;
use crate::error::AssistantError;
use crate::models::{CompletionRequest, LanguageModel};

pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;
const WEEKLY_WINDOW_DAYS: i64 = 7;
const RECENT_IN_TEMPLATE: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SummaryKind {
    Overview,
    Weekly,
}

impl SummaryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryKind::Overview => "overview",
            SummaryKind::Weekly => "weekly",
        }
    }

    fn instructions(&self) -> &'static str {
        match self {
            SummaryKind::Overview => OVERVIEW_SUMMARY_PROMPT,
            SummaryKind::Weekly => WEEKLY_SUMMARY_PROMPT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub summary: String,
    pub generated_at: DateTime<Utc>,
    pub cache_hit: bool,
    pub node_count: usize,
    pub edge_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntryStats {
    pub key: &'static str,
    /// Milliseconds since the entry was stored.
    pub age: i64,
    /// Milliseconds until the entry expires.
    pub expires_in: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub entries: Vec<CacheEntryStats>,
}

struct CacheEntry {
    summary: Summary,
    stored_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// Model-written summaries of the whole graph or of the last week's activity,
/// cached per kind for a fixed TTL.
pub struct SummaryService {
    registry: Arc<ToolRegistry>,
    model: Arc<dyn LanguageModel>,
    model_name: String,
    ttl: Duration,
    cache: Mutex<HashMap<SummaryKind, CacheEntry>>,
    span: Span,
}

impl SummaryService {
    pub fn new(registry: Arc<ToolRegistry>, model: Arc<dyn LanguageModel>, model_name: impl Into<String>, ttl: std::time::Duration, parent: &Span) -> Self {
        Self {
            registry,
            model,
            model_name: model_name.into(),
            ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::seconds(DEFAULT_CACHE_TTL_SECS as i64)),
            cache: Mutex::new(HashMap::new()),
            span: tracing::info_span!(parent: parent, "summaries"),
        }
    }

    pub async fn summarize(&self, kind: SummaryKind, ignore_cache: bool) -> Result<Summary, AssistantError> {
        if !ignore_cache {
            if let Some(hit) = self.cached(kind).await {
                metrics::counter!("assistant_summaries_total", "kind" => kind.as_str(), "cache" => "hit").increment(1);
                tracing::info!(parent: &self.span, kind = kind.as_str(), "returning cached summary");
                return Ok(hit);
            }
        }

        tracing::info!(parent: &self.span, kind = kind.as_str(), ignore_cache, "generating summary");
        let overview = self.registry.run("get_graph_overview", json!({})).await.map_err(|e| {
            tracing::error!(parent: &self.span, error = %e, "graph overview unavailable");
            AssistantError::GraphUnavailable(e)
        })?;
        let (nodes, edges) = graph_items(&overview);
        let (nodes, edges) = match kind {
            SummaryKind::Overview => (nodes, edges),
            SummaryKind::Weekly => updated_since(nodes, edges, Utc::now() - Duration::days(WEEKLY_WINDOW_DAYS)),
        };

        let text = self.generate(kind, &nodes, &edges).await;
        let summary = Summary { summary: text, generated_at: Utc::now(), cache_hit: false, node_count: nodes.len(), edge_count: edges.len() };
        let now = Utc::now();
        self.cache
            .lock()
            .await
            .insert(kind, CacheEntry { summary: summary.clone(), stored_at: now, expires_at: now + self.ttl });
        metrics::counter!("assistant_summaries_total", "kind" => kind.as_str(), "cache" => "miss").increment(1);
        tracing::info!(parent: &self.span, kind = kind.as_str(), nodes = summary.node_count, edges = summary.edge_count, "summary generated");
        Ok(summary)
    }

    async fn cached(&self, kind: SummaryKind) -> Option<Summary> {
        let mut cache = self.cache.lock().await;
        match cache.get(&kind) {
            Some(entry) if entry.expires_at > Utc::now() => Some(Summary { cache_hit: true, ..entry.summary.clone() }),
            Some(_) => {
                cache.remove(&kind);
                None
            }
            None => None,
        }
    }

    /// Falls back to a statistics-only summary when the model call fails.
    async fn generate(&self, kind: SummaryKind, nodes: &[Value], edges: &[Value]) -> String {
        let prompt = format!(
            "{}\n\nHere is the research project data in graph form:\n\n**Experiments ({} total):**\n{}\n\n**Relationships ({} total):**\n{}\n\nPlease generate a summary of this research project.",
            kind.instructions(),
            nodes.len(),
            serde_json::to_string_pretty(nodes).unwrap_or_default(),
            edges.len(),
            serde_json::to_string_pretty(edges).unwrap_or_default(),
        );
        let req = CompletionRequest {
            model: self.model_name.clone(),
            messages: vec![Message::system(SUMMARY_SYSTEM_PROMPT), Message::user(prompt)],
            temperature: Some(0.7),
            max_tokens: Some(2000),
            ..CompletionRequest::default()
        };
        metrics::counter!("assistant_model_calls_total").increment(1);
        match self.model.complete(req).await {
            Ok(resp) => resp.content.filter(|c| !c.trim().is_empty()).unwrap_or_else(|| SUMMARY_UNAVAILABLE.to_string()),
            Err(e) => {
                tracing::warn!(parent: &self.span, error = %e, kind = kind.as_str(), "summary generation failed, using template");
                template_summary(nodes, edges)
            }
        }
    }

    pub async fn clear_cache(&self) {
        self.cache.lock().await.clear();
        tracing::info!(parent: &self.span, "summary cache cleared");
    }

    /// Expired entries are dropped before counting.
    pub async fn cache_stats(&self) -> CacheStats {
        let now = Utc::now();
        let mut cache = self.cache.lock().await;
        cache.retain(|_, e| e.expires_at > now);
        let mut entries: Vec<CacheEntryStats> = cache
            .iter()
            .map(|(kind, e)| CacheEntryStats {
                key: kind.as_str(),
                age: (now - e.stored_at).num_milliseconds(),
                expires_in: (e.expires_at - now).num_milliseconds(),
            })
            .collect();
        entries.sort_by_key(|e| e.key);
        CacheStats { size: entries.len(), entries }
    }
}

/// Nodes and edges trimmed to the fields a summary needs.
fn graph_items(overview: &Value) -> (Vec<Value>, Vec<Value>) {
    let pick = |item: &Value, fields: &[&str]| -> Value {
        fields.iter().map(|f| (f.to_string(), item.get(*f).cloned().unwrap_or(Value::Null))).collect::<serde_json::Map<_, _>>().into()
    };
    let list = |key: &str| overview.get(key).and_then(Value::as_array).cloned().unwrap_or_default();
    let nodes = list("nodes")
        .iter()
        .map(|n| pick(n, &["id", "title", "status", "description", "created_at", "updated_at"]))
        .collect();
    let edges = list("edges").iter().map(|e| pick(e, &["id", "from", "to", "type", "label"])).collect();
    (nodes, edges)
}

/// Accepts RFC 3339 and the offset-less ISO form the graph backend emits, read as UTC.
fn parse_timestamp(v: Option<&Value>) -> Option<DateTime<Utc>> {
    let raw = v?.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok().map(|t| t.and_utc()))
}

/// Keeps nodes updated at or after `cutoff` and the edges touching them.
fn updated_since(nodes: Vec<Value>, edges: Vec<Value>, cutoff: DateTime<Utc>) -> (Vec<Value>, Vec<Value>) {
    let recent: Vec<Value> = nodes
        .into_iter()
        .filter(|n| parse_timestamp(n.get("updated_at")).is_some_and(|t| t >= cutoff))
        .collect();
    let ids: HashSet<String> = recent.iter().filter_map(|n| scalar(n.get("id"))).collect();
    let touches = |e: &Value, end: &str| scalar(e.get(end)).is_some_and(|id| ids.contains(&id));
    let edges = edges.into_iter().filter(|e| touches(e, "from") || touches(e, "to")).collect();
    (recent, edges)
}

fn template_summary(nodes: &[Value], edges: &[Value]) -> String {
    let mut by_status: BTreeMap<String, usize> = BTreeMap::new();
    for n in nodes {
        *by_status.entry(scalar(n.get("status")).unwrap_or_else(|| "unknown".into())).or_default() += 1;
    }
    let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
    for e in edges {
        *by_type.entry(scalar(e.get("type")).unwrap_or_else(|| "related".into())).or_default() += 1;
    }

    let mut lines = vec![
        "# Research Project Summary".to_string(),
        String::new(),
        "## Overview".to_string(),
        format!("This research project contains {} experiments with {} relationships between them.", nodes.len(), edges.len()),
        String::new(),
        "## Experiment Status Breakdown".to_string(),
    ];
    lines.extend(by_status.iter().map(|(status, n)| format!("- {status}: {n} experiments")));
    lines.push(String::new());
    lines.push("## Relationship Types".into());
    lines.extend(by_type.iter().map(|(kind, n)| format!("- {kind}: {n} relationships")));
    lines.push(String::new());
    lines.push("## Recent Experiments".into());

    let mut recent: Vec<&Value> = nodes.iter().collect();
    recent.sort_by_key(|n| std::cmp::Reverse(parse_timestamp(n.get("updated_at"))));
    for n in recent.into_iter().take(RECENT_IN_TEMPLATE) {
        lines.push(format!(
            "- **{}** ({}): {}",
            scalar(n.get("title")).unwrap_or_else(|| "Untitled".into()),
            scalar(n.get("status")).unwrap_or_else(|| "unknown".into()),
            scalar(n.get("description")).unwrap_or_else(|| "No description".into()),
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{text, RecordingGraph, ScriptedModel};

    fn service(model: ScriptedModel, graph: RecordingGraph, ttl_secs: u64) -> (SummaryService, Arc<ScriptedModel>, Arc<RecordingGraph>) {
        let model = Arc::new(model);
        let graph = Arc::new(graph);
        let registry = ToolRegistry::with_graph_tools(graph.clone(), &Span::none()).unwrap();
        let svc = SummaryService::new(Arc::new(registry), model.clone(), "gpt-4", std::time::Duration::from_secs(ttl_secs), &Span::none());
        (svc, model, graph)
    }

    fn ago(days: i64) -> String {
        (Utc::now() - Duration::days(days)).to_rfc3339()
    }

    fn overview() -> Value {
        json!({
            "nodes": [
                {"id": 1, "title": "DNA extraction", "status": "completed", "description": "Baseline protocol", "updated_at": ago(2)},
                {"id": 2, "title": "PCR optimisation", "status": "planned", "updated_at": ago(30)},
                {"id": 3, "title": "Gel imaging", "status": "planned"}
            ],
            "edges": [
                {"id": 7, "from": 1, "to": 2, "type": "leads_to"},
                {"id": 8, "from": 2, "to": 3, "type": "related"}
            ]
        })
    }

    #[tokio::test]
    async fn overview_is_cached_until_ignored() {
        let model = ScriptedModel::new().then(text("Summary A")).then(text("Summary B"));
        let (svc, model, graph) = service(model, RecordingGraph::default().respond("/graph/overview", overview()), 300);

        let first = svc.summarize(SummaryKind::Overview, false).await.unwrap();
        assert_eq!(first.summary, "Summary A");
        assert!(!first.cache_hit);
        assert_eq!((first.node_count, first.edge_count), (3, 2));

        let second = svc.summarize(SummaryKind::Overview, false).await.unwrap();
        assert!(second.cache_hit);
        assert_eq!(second.summary, "Summary A");
        assert_eq!(second.generated_at, first.generated_at);
        assert_eq!(model.requests().len(), 1);
        assert_eq!(graph.requests().len(), 1);

        let fresh = svc.summarize(SummaryKind::Overview, true).await.unwrap();
        assert_eq!(fresh.summary, "Summary B");
        assert!(!fresh.cache_hit);

        let req = &model.requests()[0];
        assert_eq!(req.messages[0].content, SUMMARY_SYSTEM_PROMPT);
        assert_eq!(req.max_tokens, Some(2000));
        assert!(req.tools.is_empty());
    }

    #[tokio::test]
    async fn weekly_keeps_recent_nodes_and_their_edges() {
        let model = ScriptedModel::new().then(text("This week"));
        let (svc, model, _) = service(model, RecordingGraph::default().respond("/graph/overview", overview()), 300);

        let weekly = svc.summarize(SummaryKind::Weekly, false).await.unwrap();
        assert_eq!((weekly.node_count, weekly.edge_count), (1, 1));
        let prompt = &model.requests()[0].messages[1].content;
        assert!(prompt.starts_with(WEEKLY_SUMMARY_PROMPT));
        assert!(prompt.contains("**Experiments (1 total):**"));
        assert!(prompt.contains("DNA extraction"));
        assert!(!prompt.contains("Gel imaging"));
    }

    #[tokio::test]
    async fn model_failure_falls_back_to_template() {
        let model = ScriptedModel::new().then_fail("quota exceeded");
        let (svc, _, _) = service(model, RecordingGraph::default().respond("/graph/overview", overview()), 300);

        let s = svc.summarize(SummaryKind::Overview, false).await.unwrap();
        assert!(s.summary.starts_with("# Research Project Summary"));
        assert!(s.summary.contains("This research project contains 3 experiments with 2 relationships between them."));
        assert!(s.summary.contains("- planned: 2 experiments"));
        assert!(s.summary.contains("- leads_to: 1 relationships"));
        // most recently updated first
        let recent = s.summary.split("## Recent Experiments").nth(1).unwrap();
        assert!(recent.trim_start().starts_with("- **DNA extraction** (completed): Baseline protocol"));
        assert!(recent.contains("- **Gel imaging** (planned): No description"));
    }

    #[tokio::test]
    async fn graph_outage_is_an_error_and_not_cached() {
        let (svc, model, _) = service(ScriptedModel::new(), RecordingGraph::default().offline(), 300);
        let err = svc.summarize(SummaryKind::Overview, false).await.unwrap_err();
        assert!(matches!(err, AssistantError::GraphUnavailable(_)));
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.to_string(), "Failed to fetch graph data from backend");
        assert!(model.requests().is_empty());
        assert_eq!(svc.cache_stats().await.size, 0);
    }

    #[tokio::test]
    async fn stats_clear_and_zero_ttl() {
        let (svc, _, _) = service(ScriptedModel::new().repeating(text("s")), RecordingGraph::default(), 300);
        svc.summarize(SummaryKind::Overview, false).await.unwrap();
        svc.summarize(SummaryKind::Weekly, false).await.unwrap();
        let stats = svc.cache_stats().await;
        assert_eq!(stats.size, 2);
        assert_eq!(stats.entries[0].key, "overview");
        assert!(stats.entries[0].expires_in > 0);
        svc.clear_cache().await;
        assert_eq!(svc.cache_stats().await.size, 0);

        let (svc, model, _) = service(ScriptedModel::new().repeating(text("s")), RecordingGraph::default(), 0);
        svc.summarize(SummaryKind::Overview, false).await.unwrap();
        assert!(!svc.summarize(SummaryKind::Overview, false).await.unwrap().cache_hit);
        assert_eq!(model.requests().len(), 2);
    }

    #[test]
    fn backend_timestamps_without_offset_parse_as_utc() {
        let t = parse_timestamp(Some(&json!("2024-05-01T12:30:00.123456"))).unwrap();
        assert_eq!(t.to_rfc3339(), "2024-05-01T12:30:00.123456+00:00");
        assert!(parse_timestamp(Some(&json!("yesterday"))).is_none());
        assert!(parse_timestamp(None).is_none());
    }
}
