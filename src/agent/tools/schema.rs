//! Argument schemas for graph tools.
//!
//! A schema does two jobs: it validates (and fills defaults into) the JSON
//! arguments a model produced, and it renders the JSON-schema descriptor the
//! completion service receives as the function's `parameters`.

use serde_json::{json, Map, Value};

use crate::error::FieldIssue;

#[derive(Debug, Clone, PartialEq)]
pub enum ArgSchema {
    Object(Vec<Field>),
    String,
    Number,
    Boolean,
    Enum(&'static [&'static str]),
    /// Free-form JSON object.
    Record,
    Optional(Box<ArgSchema>),
    Default(Box<ArgSchema>, Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: &'static str,
    pub schema: ArgSchema,
    pub description: Option<&'static str>,
}

impl Field {
    pub fn new(name: &'static str, schema: ArgSchema) -> Self {
        Self { name, schema, description: None }
    }

    pub fn describe(mut self, description: &'static str) -> Self {
        self.description = Some(description);
        self
    }
}

impl ArgSchema {
    pub fn object(fields: Vec<Field>) -> Self { ArgSchema::Object(fields) }
    pub fn empty() -> Self { ArgSchema::Object(Vec::new()) }
    pub fn optional(inner: ArgSchema) -> Self { ArgSchema::Optional(Box::new(inner)) }
    pub fn with_default(inner: ArgSchema, value: Value) -> Self { ArgSchema::Default(Box::new(inner), value) }

    /// Optional and defaulted fields may be omitted by the caller.
    pub fn is_required(&self) -> bool {
        !matches!(self, ArgSchema::Optional(_) | ArgSchema::Default(..))
    }

    /// Model-facing JSON-schema descriptor. Pure; callers cache the result.
    pub fn to_descriptor(&self) -> Value {
        match self {
            ArgSchema::Object(fields) => {
                let mut properties = Map::new();
                let mut required = Vec::new();
                for field in fields {
                    let mut prop = field.schema.to_descriptor();
                    if let (Some(desc), Some(obj)) = (field.description, prop.as_object_mut()) {
                        obj.insert("description".into(), Value::String(desc.into()));
                    }
                    properties.insert(field.name.into(), prop);
                    if field.schema.is_required() {
                        required.push(Value::String(field.name.into()));
                    }
                }
                json!({ "type": "object", "properties": properties, "required": required })
            }
            ArgSchema::String => json!({ "type": "string" }),
            ArgSchema::Number => json!({ "type": "number" }),
            ArgSchema::Boolean => json!({ "type": "boolean" }),
            ArgSchema::Enum(values) => json!({ "type": "string", "enum": values }),
            ArgSchema::Record => json!({ "type": "object" }),
            ArgSchema::Optional(inner) | ArgSchema::Default(inner, _) => inner.to_descriptor(),
        }
    }

    /// Validate `args`, returning a normalized copy with defaults applied and
    /// unknown keys dropped. Every offending field is reported.
    pub fn validate(&self, args: &Value) -> Result<Value, Vec<FieldIssue>> {
        let mut issues = Vec::new();
        let normalized = self.check("", args, &mut issues);
        if issues.is_empty() { Ok(normalized) } else { Err(issues) }
    }

    fn check(&self, path: &str, value: &Value, issues: &mut Vec<FieldIssue>) -> Value {
        let label = if path.is_empty() { "arguments" } else { path };
        match self {
            ArgSchema::Object(fields) => {
                let empty = Map::new();
                let obj = match value {
                    Value::Object(map) => map,
                    Value::Null if path.is_empty() => &empty,
                    _ => {
                        issues.push(FieldIssue::new(label, "expected an object"));
                        return Value::Null;
                    }
                };
                let mut out = Map::new();
                for field in fields {
                    let child = if path.is_empty() { field.name.to_string() } else { format!("{}.{}", path, field.name) };
                    match obj.get(field.name).filter(|v| !v.is_null()) {
                        Some(v) => {
                            out.insert(field.name.into(), field.schema.check(&child, v, issues));
                        }
                        None => match &field.schema {
                            ArgSchema::Optional(_) => {}
                            ArgSchema::Default(_, default) => {
                                out.insert(field.name.into(), default.clone());
                            }
                            _ => issues.push(FieldIssue::new(child, "is required")),
                        },
                    }
                }
                Value::Object(out)
            }
            ArgSchema::String => expect(value.is_string(), label, "expected a string", value, issues),
            ArgSchema::Number => expect(value.is_number(), label, "expected a number", value, issues),
            ArgSchema::Boolean => expect(value.is_boolean(), label, "expected a boolean", value, issues),
            ArgSchema::Record => expect(value.is_object(), label, "expected an object", value, issues),
            ArgSchema::Enum(values) => {
                let ok = value.as_str().is_some_and(|s| values.contains(&s));
                expect(ok, label, &format!("must be one of {}", values.join(", ")), value, issues)
            }
            ArgSchema::Optional(inner) | ArgSchema::Default(inner, _) => inner.check(path, value, issues),
        }
    }
}

fn expect(ok: bool, field: &str, problem: &str, value: &Value, issues: &mut Vec<FieldIssue>) -> Value {
    if !ok {
        issues.push(FieldIssue::new(field, problem));
    }
    value.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_schema() -> ArgSchema {
        ArgSchema::object(vec![
            Field::new("node_id", ArgSchema::Number).describe("ID of the node"),
            Field::new("with_parents", ArgSchema::with_default(ArgSchema::Boolean, json!(true))),
            Field::new("status", ArgSchema::optional(ArgSchema::Enum(&["planned", "completed", "postponed"]))),
            Field::new("extra_data", ArgSchema::optional(ArgSchema::Record)),
        ])
    }

    #[test]
    fn descriptor_unwraps_wrappers_and_lists_required() {
        let d = node_schema().to_descriptor();
        assert_eq!(d["type"], "object");
        assert_eq!(d["required"], json!(["node_id"]));
        assert_eq!(d["properties"]["node_id"], json!({"type": "number", "description": "ID of the node"}));
        assert_eq!(d["properties"]["with_parents"], json!({"type": "boolean"}));
        assert_eq!(d["properties"]["status"], json!({"type": "string", "enum": ["planned", "completed", "postponed"]}));
        assert_eq!(d["properties"]["extra_data"], json!({"type": "object"}));
    }

    #[test]
    fn descriptor_is_deterministic() {
        assert_eq!(node_schema().to_descriptor(), node_schema().to_descriptor());
        assert_eq!(ArgSchema::empty().to_descriptor(), json!({"type": "object", "properties": {}, "required": []}));
    }

    #[test]
    fn validate_applies_defaults_and_drops_unknown_keys() {
        let v = node_schema().validate(&json!({"node_id": 3, "bogus": 1})).unwrap();
        assert_eq!(v, json!({"node_id": 3, "with_parents": true}));
    }

    #[test]
    fn validate_reports_every_bad_field() {
        let issues = node_schema().validate(&json!({"status": "running", "with_parents": "yes"})).unwrap_err();
        let fields: Vec<_> = issues.iter().map(|i| i.field.as_str()).collect();
        assert_eq!(fields, vec!["node_id", "with_parents", "status"]);
    }

    #[test]
    fn null_arguments_count_as_empty_object() {
        assert_eq!(ArgSchema::empty().validate(&Value::Null).unwrap(), json!({}));
        let issues = ArgSchema::empty().validate(&json!([1, 2])).unwrap_err();
        assert_eq!(issues[0].field, "arguments");
    }

    #[test]
    fn nested_objects_report_dotted_paths() {
        let schema = ArgSchema::object(vec![Field::new("inner", ArgSchema::object(vec![Field::new("x", ArgSchema::String)]))]);
        let issues = schema.validate(&json!({"inner": {"x": 1}})).unwrap_err();
        assert_eq!(issues[0].field, "inner.x");
    }
}
