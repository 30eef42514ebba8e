use serde_json::Value;

use super::schema::{ArgSchema, Field};
use super::Tool;
use crate::error::FieldIssue;
use crate::graph_service::GraphRequest;

pub struct AddContextKeyword;
pub struct DeleteContextKeyword;

fn keyword_schema(description: &'static str) -> ArgSchema {
    ArgSchema::object(vec![Field::new("keyword", ArgSchema::String).describe(description)])
}

fn keyword(args: &Value) -> Result<&str, Vec<FieldIssue>> {
    match args.get("keyword").and_then(Value::as_str).map(str::trim) {
        Some(k) if !k.is_empty() => Ok(k),
        _ => Err(vec![FieldIssue::new("keyword", "must not be empty")]),
    }
}

impl Tool for AddContextKeyword {
    fn name(&self) -> &'static str { "add_context_keyword" }
    fn description(&self) -> &'static str { "Add a new context keyword for persistent research context" }
    fn schema(&self) -> ArgSchema { keyword_schema("The keyword or phrase to remember") }
    fn request(&self, args: &Value) -> Result<GraphRequest, Vec<FieldIssue>> {
        Ok(GraphRequest::post(["context-keywords"]).query("keyword", keyword(args)?))
    }
}

impl Tool for DeleteContextKeyword {
    fn name(&self) -> &'static str { "delete_context_keyword" }
    fn description(&self) -> &'static str { "Remove a context keyword" }
    fn schema(&self) -> ArgSchema { keyword_schema("The keyword to remove") }
    fn request(&self, args: &Value) -> Result<GraphRequest, Vec<FieldIssue>> {
        Ok(GraphRequest::delete(["context-keywords", keyword(args)?]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn add_keyword_goes_in_the_query() {
        let req = AddContextKeyword.request(&json!({"keyword": " CRISPR "})).unwrap();
        assert_eq!(req.path(), "/context-keywords");
        assert_eq!(req.query, vec![("keyword".to_string(), "CRISPR".to_string())]);
        assert!(req.body.is_none());
    }

    #[test]
    fn delete_keyword_keeps_raw_segment() {
        let req = DeleteContextKeyword.request(&json!({"keyword": "protein folding"})).unwrap();
        assert_eq!(req.segments, vec!["context-keywords".to_string(), "protein folding".to_string()]);
    }

    #[test]
    fn blank_keyword_is_rejected() {
        assert!(AddContextKeyword.request(&json!({"keyword": "   "})).is_err());
    }
}
