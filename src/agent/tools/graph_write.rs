use serde_json::{json, Value};

use super::schema::{ArgSchema, Field};
use super::{id_arg, pick, Tool};
use crate::error::FieldIssue;
use crate::graph_service::GraphRequest;

pub const NODE_STATUSES: &[&str] = &["planned", "completed", "postponed"];

pub const RELATIONSHIP_TYPES: &[&str] = &[
    "leads_to", "supports", "refutes", "requires", "related", "inspires", "extends", "validates", "implements",
];

const NODE_FIELDS: &[&str] = &["title", "description", "motivation", "expectations", "hypothesis", "result", "status", "extra_data"];
const EDGE_FIELDS: &[&str] = &["from_experiment_id", "to_experiment_id", "relationship_type", "label", "extra_data"];

pub struct CreateNode;
pub struct UpdateNode;
pub struct DeleteNode;
pub struct CreateEdge;
pub struct UpdateEdge;
pub struct DeleteEdgeById;

fn opt_text(name: &'static str, description: &'static str) -> Field {
    Field::new(name, ArgSchema::optional(ArgSchema::String)).describe(description)
}

fn extra_data() -> Field {
    Field::new("extra_data", ArgSchema::optional(ArgSchema::Record)).describe("Additional properties as JSON object")
}

impl Tool for CreateNode {
    fn name(&self) -> &'static str { "create_node" }
    fn description(&self) -> &'static str { "Create a new experiment node with metadata" }
    fn schema(&self) -> ArgSchema {
        ArgSchema::object(vec![
            Field::new("title", ArgSchema::String).describe("Short title/name of the experiment"),
            opt_text("description", "Detailed description of the experiment"),
            opt_text("motivation", "Why this experiment is being conducted"),
            opt_text("expectations", "What we expect to learn/achieve"),
            opt_text("hypothesis", "The hypothesis being tested"),
            Field::new("status", ArgSchema::with_default(ArgSchema::Enum(NODE_STATUSES), json!("planned"))),
            extra_data(),
        ])
    }
    fn request(&self, args: &Value) -> Result<GraphRequest, Vec<FieldIssue>> {
        Ok(GraphRequest::post(["nodes"]).json(pick(args, NODE_FIELDS)))
    }
}

impl Tool for UpdateNode {
    fn name(&self) -> &'static str { "update_node" }
    fn description(&self) -> &'static str { "Update an existing experiment node with new information" }
    fn schema(&self) -> ArgSchema {
        ArgSchema::object(vec![
            Field::new("node_id", ArgSchema::Number).describe("ID of the node to update"),
            opt_text("title", "Updated title"),
            opt_text("description", "Updated description"),
            opt_text("motivation", "Updated motivation"),
            opt_text("expectations", "Updated expectations"),
            opt_text("hypothesis", "Updated hypothesis"),
            opt_text("result", "Results of the experiment"),
            Field::new("status", ArgSchema::optional(ArgSchema::Enum(NODE_STATUSES))).describe("Updated status"),
            extra_data(),
        ])
    }
    fn request(&self, args: &Value) -> Result<GraphRequest, Vec<FieldIssue>> {
        let id = id_arg(args, "node_id")?;
        Ok(GraphRequest::patch(["nodes".to_string(), id.to_string()]).json(pick(args, NODE_FIELDS)))
    }
}

impl Tool for DeleteNode {
    fn name(&self) -> &'static str { "delete_node" }
    fn description(&self) -> &'static str { "Delete an experiment node, optionally with its entire subgraph" }
    fn schema(&self) -> ArgSchema {
        ArgSchema::object(vec![
            Field::new("node_id", ArgSchema::Number).describe("ID of the node to delete"),
            Field::new("force_delete", ArgSchema::with_default(ArgSchema::Boolean, json!(false))).describe("Delete entire subgraph if true"),
        ])
    }
    fn request(&self, args: &Value) -> Result<GraphRequest, Vec<FieldIssue>> {
        let id = id_arg(args, "node_id")?;
        let force = args.get("force_delete").and_then(Value::as_bool).unwrap_or(false);
        Ok(GraphRequest::delete(["nodes".to_string(), id.to_string()]).query("force_delete", force))
    }
}

impl Tool for CreateEdge {
    fn name(&self) -> &'static str { "create_edge" }
    fn description(&self) -> &'static str { "Create a relationship between two experiment nodes" }
    fn schema(&self) -> ArgSchema {
        ArgSchema::object(vec![
            Field::new("from_experiment_id", ArgSchema::Number).describe("Source experiment ID"),
            Field::new("to_experiment_id", ArgSchema::Number).describe("Target experiment ID"),
            Field::new("relationship_type", ArgSchema::Enum(RELATIONSHIP_TYPES)).describe("Type of relationship"),
            opt_text("label", "Optional description of the relationship"),
            extra_data(),
        ])
    }
    fn request(&self, args: &Value) -> Result<GraphRequest, Vec<FieldIssue>> {
        let mut issues = Vec::new();
        for field in ["from_experiment_id", "to_experiment_id"] {
            if let Err(mut e) = id_arg(args, field) {
                issues.append(&mut e);
            }
        }
        if !issues.is_empty() {
            return Err(issues);
        }
        Ok(GraphRequest::post(["edges"]).json(pick(args, EDGE_FIELDS)))
    }
}

impl Tool for UpdateEdge {
    fn name(&self) -> &'static str { "update_edge" }
    fn description(&self) -> &'static str { "Update an existing relationship between experiments" }
    fn schema(&self) -> ArgSchema {
        ArgSchema::object(vec![
            Field::new("edge_id", ArgSchema::Number).describe("ID of the edge to update"),
            Field::new("from_experiment_id", ArgSchema::optional(ArgSchema::Number)).describe("Updated source experiment ID"),
            Field::new("to_experiment_id", ArgSchema::optional(ArgSchema::Number)).describe("Updated target experiment ID"),
            Field::new("relationship_type", ArgSchema::optional(ArgSchema::Enum(RELATIONSHIP_TYPES))).describe("Updated relationship type"),
            opt_text("label", "Updated label"),
            extra_data(),
        ])
    }
    fn request(&self, args: &Value) -> Result<GraphRequest, Vec<FieldIssue>> {
        let id = id_arg(args, "edge_id")?;
        Ok(GraphRequest::patch(["edges".to_string(), id.to_string()]).json(pick(args, EDGE_FIELDS)))
    }
}

impl Tool for DeleteEdgeById {
    fn name(&self) -> &'static str { "delete_edge_by_id" }
    fn description(&self) -> &'static str { "Delete a relationship by its ID" }
    fn schema(&self) -> ArgSchema {
        ArgSchema::object(vec![Field::new("edge_id", ArgSchema::Number).describe("ID of the edge to delete")])
    }
    fn request(&self, args: &Value) -> Result<GraphRequest, Vec<FieldIssue>> {
        let id = id_arg(args, "edge_id")?;
        Ok(GraphRequest::delete(["edges".to_string(), id.to_string()]))
    }
}
