use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// One offending argument reported by schema validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldIssue {
    pub field: String,
    pub problem: String,
}

impl FieldIssue {
    pub fn new(field: impl Into<String>, problem: impl Into<String>) -> Self {
        Self { field: field.into(), problem: problem.into() }
    }
}

impl std::fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.problem)
    }
}

/// Failure talking to the graph service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("Network Error: Unable to connect to backend API at {base}")]
    Unreachable { base: String },
    #[error("API Error {status}: {detail}")]
    Rejected { status: u16, detail: String },
    #[error("Request Error: {0}")]
    Request(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid arguments for {tool}: {}", join_issues(.fields))]
    Validation { tool: String, fields: Vec<FieldIssue> },
    #[error("{source}")]
    Upstream { tool: String, source: UpstreamError },
    #[error("Tool {0} not found")]
    UnknownTool(String),
    #[error("could not parse arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },
}

impl ToolError {
    /// Status label used for metrics and tool-event logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::Validation { .. } => "validation",
            ToolError::Upstream { .. } => "upstream",
            ToolError::UnknownTool(_) => "unknown",
            ToolError::InvalidArguments { .. } => "parse",
        }
    }
}

fn join_issues(fields: &[FieldIssue]) -> String {
    fields.iter().map(|f| f.to_string()).collect::<Vec<_>>().join("; ")
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("tool {0} is already registered")]
    DuplicateTool(String),
}

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("Session {0} not found")]
    SessionNotFound(Uuid),
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Model(anyhow::Error),
    #[error("Failed to fetch graph data from backend")]
    GraphUnavailable(#[source] ToolError),
}

impl AssistantError {
    pub fn status_code(&self) -> u16 {
        match self {
            AssistantError::SessionNotFound(_) => 404,
            AssistantError::BadRequest(_) => 400,
            AssistantError::Model(_) | AssistantError::GraphUnavailable(_) => 500,
        }
    }
}
