use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::Span;

use crate::error::{FieldIssue, RegistryError, ToolError};
use crate::graph_service::{GraphRequest, GraphService};

pub mod graph_read;
pub mod graph_write;
pub mod keywords;
pub mod schema;

use schema::ArgSchema;

/// A named graph operation the model may call.
///
/// Implementations only describe the call; the registry validates arguments
/// and performs the network round trip.
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn schema(&self) -> ArgSchema;
    /// Build the graph-service call from arguments that already passed `schema()`.
    fn request(&self, args: &Value) -> Result<GraphRequest, Vec<FieldIssue>>;
}

pub struct RegisteredTool {
    tool: Box<dyn Tool>,
    schema: ArgSchema,
    spec: Value,
}

impl RegisteredTool {
    pub fn name(&self) -> &'static str { self.tool.name() }
    pub fn description(&self) -> &'static str { self.tool.description() }
    /// Function-call descriptor, computed once at registration.
    pub fn spec(&self) -> &Value { &self.spec }
}

pub struct ToolRegistry {
    graph: Arc<dyn GraphService>,
    tools: Vec<RegisteredTool>,
    index: HashMap<&'static str, usize>,
    specs: Vec<Value>,
    span: Span,
}

impl ToolRegistry {
    pub fn new(graph: Arc<dyn GraphService>, parent: &Span) -> Self {
        Self {
            graph,
            tools: Vec::new(),
            index: HashMap::new(),
            specs: Vec::new(),
            span: tracing::info_span!(parent: parent, "tools"),
        }
    }

    pub fn with_graph_tools(graph: Arc<dyn GraphService>, parent: &Span) -> Result<Self, RegistryError> {
        let mut r = Self::new(graph, parent);
        r.register(Box::new(graph_read::GetGraphOverview))?;
        r.register(Box::new(graph_read::GetNodeInfo))?;
        r.register(Box::new(graph_read::GetNodeLiterature))?;
        r.register(Box::new(graph_read::GetSuggestedLiterature))?;
        r.register(Box::new(graph_read::GetAllLiterature))?;
        r.register(Box::new(graph_read::GetContextKeywords))?;
        r.register(Box::new(graph_write::CreateNode))?;
        r.register(Box::new(graph_write::UpdateNode))?;
        r.register(Box::new(graph_write::DeleteNode))?;
        r.register(Box::new(graph_write::CreateEdge))?;
        r.register(Box::new(graph_write::UpdateEdge))?;
        r.register(Box::new(graph_write::DeleteEdgeById))?;
        r.register(Box::new(keywords::AddContextKeyword))?;
        r.register(Box::new(keywords::DeleteContextKeyword))?;
        tracing::debug!(parent: &r.span, count = r.len(), "graph tools registered");
        Ok(r)
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) -> Result<(), RegistryError> {
        let name = tool.name();
        if self.index.contains_key(name) {
            return Err(RegistryError::DuplicateTool(name.to_string()));
        }
        let schema = tool.schema();
        let spec = json!({
            "type": "function",
            "function": {
                "name": name,
                "description": tool.description(),
                "parameters": schema.to_descriptor(),
            }
        });
        self.index.insert(name, self.tools.len());
        self.specs.push(spec.clone());
        self.tools.push(RegisteredTool { tool, schema, spec });
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<&RegisteredTool> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    pub fn list(&self) -> impl Iterator<Item = &RegisteredTool> {
        self.tools.iter()
    }

    /// Descriptors for every tool, in registration order.
    pub fn specs(&self) -> &[Value] {
        &self.specs
    }

    pub fn len(&self) -> usize { self.tools.len() }

    pub fn is_empty(&self) -> bool { self.tools.is_empty() }

    /// Validate `args` against the tool's schema and, only on success, perform
    /// its graph-service call.
    pub async fn run(&self, name: &str, args: Value) -> Result<Value, ToolError> {
        let entry = self.find(name).ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        let result = self.invoke(entry, &args).await;
        let status = match &result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        metrics::counter!("assistant_tool_calls_total", "tool" => entry.name(), "status" => status).increment(1);
        match &result {
            Ok(_) => tracing::info!(parent: &self.span, tool = name, "tool call succeeded"),
            Err(e) => tracing::warn!(parent: &self.span, tool = name, error = %e, "tool call failed"),
        }
        result
    }

    async fn invoke(&self, entry: &RegisteredTool, args: &Value) -> Result<Value, ToolError> {
        let tool = entry.name().to_string();
        let validated = entry
            .schema
            .validate(args)
            .map_err(|fields| ToolError::Validation { tool: tool.clone(), fields })?;
        let req = entry
            .tool
            .request(&validated)
            .map_err(|fields| ToolError::Validation { tool: tool.clone(), fields })?;
        tracing::debug!(parent: &self.span, tool = %tool, method = req.method.as_str(), path = %req.path(), "calling graph service");
        self.graph.send(req).await.map_err(|source| ToolError::Upstream { tool, source })
    }
}

/// Integral id argument, used in request paths.
pub(crate) fn id_arg(args: &Value, field: &str) -> Result<i64, Vec<FieldIssue>> {
    let v = args.get(field);
    if let Some(i) = v.and_then(Value::as_i64) {
        return Ok(i);
    }
    match v.and_then(Value::as_f64) {
        Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(f as i64),
        _ => Err(vec![FieldIssue::new(field, "must be an integer id")]),
    }
}

/// Copy the listed fields that are present in `args` into a JSON body.
pub(crate) fn pick(args: &Value, fields: &[&str]) -> Value {
    let mut out = Map::new();
    for f in fields {
        if let Some(v) = args.get(*f) {
            out.insert((*f).to_string(), v.clone());
        }
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpstreamError;
    use crate::testing::RecordingGraph;

    fn registry(graph: Arc<RecordingGraph>) -> ToolRegistry {
        ToolRegistry::with_graph_tools(graph, &Span::none()).unwrap()
    }

    #[test]
    fn registers_every_graph_tool_once() {
        let r = registry(Arc::new(RecordingGraph::default()));
        assert_eq!(r.len(), 14);
        assert_eq!(r.specs().len(), 14);
        assert!(r.find("get_graph_overview").is_some());
        assert!(r.find("delete_context_keyword").is_some());
        assert!(r.find("add_literature").is_none());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut r = registry(Arc::new(RecordingGraph::default()));
        let err = r.register(Box::new(graph_read::GetGraphOverview)).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateTool(n) if n == "get_graph_overview"));
        assert_eq!(r.len(), 14);
    }

    #[test]
    fn specs_are_function_descriptors() {
        let r = registry(Arc::new(RecordingGraph::default()));
        let spec = r.find("create_edge").unwrap().spec();
        assert_eq!(spec["type"], "function");
        assert_eq!(spec["function"]["name"], "create_edge");
        let required = spec["function"]["parameters"]["required"].as_array().unwrap();
        assert_eq!(required.len(), 3);
        assert_eq!(spec["function"]["parameters"]["properties"]["relationship_type"]["enum"].as_array().unwrap().len(), 9);
    }

    #[tokio::test]
    async fn invalid_arguments_never_reach_the_graph_service() {
        let graph = Arc::new(RecordingGraph::default());
        let r = registry(graph.clone());
        let cases = [
            ("get_node_info", json!({})),
            ("get_node_info", json!({"node_id": "three"})),
            ("get_node_info", json!({"node_id": 2.5})),
            ("create_node", json!({"description": "no title"})),
            ("create_node", json!({"title": "x", "status": "running"})),
            ("create_edge", json!({"from_experiment_id": 1, "to_experiment_id": 2, "relationship_type": "causes"})),
            ("add_context_keyword", json!({"keyword": 5})),
        ];
        for (name, args) in cases {
            let err = r.run(name, args).await.unwrap_err();
            assert!(matches!(err, ToolError::Validation { .. }), "{name}: {err}");
        }
        assert!(graph.requests().is_empty());
    }

    #[tokio::test]
    async fn valid_call_hits_the_graph_service_with_defaults() {
        let graph = Arc::new(RecordingGraph::default().respond("/nodes/4", json!({"id": 4})));
        let r = registry(graph.clone());
        let v = r.run("get_node_info", json!({"node_id": 4})).await.unwrap();
        assert_eq!(v["id"], 4);
        let reqs = graph.requests();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].path(), "/nodes/4");
        assert_eq!(reqs[0].query, vec![("with_parents".to_string(), "true".to_string()), ("with_children".to_string(), "true".to_string())]);
    }

    #[tokio::test]
    async fn upstream_failures_are_wrapped() {
        let graph = Arc::new(RecordingGraph::default().offline());
        let r = registry(graph);
        let err = r.run("get_graph_overview", json!({})).await.unwrap_err();
        match err {
            ToolError::Upstream { tool, source } => {
                assert_eq!(tool, "get_graph_overview");
                assert!(matches!(source, UpstreamError::Unreachable { .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_tool_is_reported() {
        let r = registry(Arc::new(RecordingGraph::default()));
        let err = r.run("get_all_nodes", json!({})).await.unwrap_err();
        assert_eq!(err.to_string(), "Tool get_all_nodes not found");
    }

    #[test]
    fn id_arg_accepts_integral_floats_only() {
        assert_eq!(id_arg(&json!({"node_id": 3.0}), "node_id").unwrap(), 3);
        assert!(id_arg(&json!({"node_id": 3.5}), "node_id").is_err());
        assert!(id_arg(&json!({}), "node_id").is_err());
    }
}
