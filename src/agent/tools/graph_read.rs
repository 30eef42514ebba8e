use serde_json::{json, Value};

use super::schema::{ArgSchema, Field};
use super::{id_arg, Tool};
use crate::error::FieldIssue;
use crate::graph_service::GraphRequest;

pub const LITERATURE_RELATIONSHIPS: &[&str] = &["auto", "similar", "builds_on", "prior", "contrast"];

pub struct GetGraphOverview;
pub struct GetNodeInfo;
pub struct GetNodeLiterature;
pub struct GetSuggestedLiterature;
pub struct GetAllLiterature;
pub struct GetContextKeywords;

impl Tool for GetGraphOverview {
    fn name(&self) -> &'static str { "get_graph_overview" }
    fn description(&self) -> &'static str {
        "Get complete graph representation with all nodes and edges to understand the research landscape"
    }
    fn schema(&self) -> ArgSchema { ArgSchema::empty() }
    fn request(&self, _args: &Value) -> Result<GraphRequest, Vec<FieldIssue>> {
        Ok(GraphRequest::get(["graph", "overview"]))
    }
}

impl Tool for GetNodeInfo {
    fn name(&self) -> &'static str { "get_node_info" }
    fn description(&self) -> &'static str {
        "Get detailed information about a specific experiment node including parent and child relationships"
    }
    fn schema(&self) -> ArgSchema {
        ArgSchema::object(vec![
            Field::new("node_id", ArgSchema::Number).describe("ID of the node to get information for"),
            Field::new("with_parents", ArgSchema::with_default(ArgSchema::Boolean, json!(true))).describe("Include parent experiments"),
            Field::new("with_children", ArgSchema::with_default(ArgSchema::Boolean, json!(true))).describe("Include child experiments"),
        ])
    }
    fn request(&self, args: &Value) -> Result<GraphRequest, Vec<FieldIssue>> {
        let id = id_arg(args, "node_id")?;
        Ok(GraphRequest::get(["nodes".to_string(), id.to_string()])
            .query("with_parents", flag(args, "with_parents", true))
            .query("with_children", flag(args, "with_children", true)))
    }
}

impl Tool for GetNodeLiterature {
    fn name(&self) -> &'static str { "get_node_literature" }
    fn description(&self) -> &'static str {
        "Get literature references already attached to a specific experiment node. This does not generate new \
         literature; use get_suggested_literature for that"
    }
    fn schema(&self) -> ArgSchema {
        ArgSchema::object(vec![Field::new("node_id", ArgSchema::Number).describe("ID of the node to get literature for")])
    }
    fn request(&self, args: &Value) -> Result<GraphRequest, Vec<FieldIssue>> {
        let id = id_arg(args, "node_id")?;
        Ok(GraphRequest::get(["nodes".to_string(), id.to_string(), "literature".to_string()]))
    }
}

impl Tool for GetSuggestedLiterature {
    fn name(&self) -> &'static str { "get_suggested_literature" }
    fn description(&self) -> &'static str { "Get AI-suggested literature references for a specific experiment node" }
    fn schema(&self) -> ArgSchema {
        ArgSchema::object(vec![
            Field::new("node_id", ArgSchema::Number).describe("ID of the node to get suggested literature for"),
            Field::new("ignore_cache", ArgSchema::with_default(ArgSchema::Boolean, json!(false))).describe("Bypass cache and recompute suggestions"),
            Field::new("relationship", ArgSchema::with_default(ArgSchema::Enum(LITERATURE_RELATIONSHIPS), json!("auto")))
                .describe("Type of relationship to find"),
        ])
    }
    fn request(&self, args: &Value) -> Result<GraphRequest, Vec<FieldIssue>> {
        let id = id_arg(args, "node_id")?;
        let relationship = args.get("relationship").and_then(Value::as_str).unwrap_or("auto");
        Ok(GraphRequest::get(["nodes".to_string(), id.to_string(), "literature".to_string(), "suggested".to_string()])
            .query("ignore_cache", flag(args, "ignore_cache", false))
            .query("relationship", relationship))
    }
}

impl Tool for GetAllLiterature {
    fn name(&self) -> &'static str { "get_all_literature" }
    fn description(&self) -> &'static str {
        "Get all literature references across all nodes. This does not generate new literature; call it at most once per question"
    }
    fn schema(&self) -> ArgSchema { ArgSchema::empty() }
    fn request(&self, _args: &Value) -> Result<GraphRequest, Vec<FieldIssue>> {
        Ok(GraphRequest::get(["literature"]))
    }
}

impl Tool for GetContextKeywords {
    fn name(&self) -> &'static str { "get_context_keywords" }
    fn description(&self) -> &'static str { "Get all stored context keywords for understanding persistent research context" }
    fn schema(&self) -> ArgSchema { ArgSchema::empty() }
    fn request(&self, _args: &Value) -> Result<GraphRequest, Vec<FieldIssue>> {
        Ok(GraphRequest::get(["context-keywords"]))
    }
}

fn flag(args: &Value, field: &str, default: bool) -> bool {
    args.get(field).and_then(Value::as_bool).unwrap_or(default)
}
