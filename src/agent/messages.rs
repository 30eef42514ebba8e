use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    /// Outcome of a tool call, answering the assistant message that requested it.
    Tool,
}

/// A tool invocation requested by the completion service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRequest {
    pub id: String,
    pub tool_name: String,
    /// Raw JSON text exactly as the model produced it.
    pub arguments: String,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, tool_name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self { id: id.into(), tool_name: tool_name.into(), arguments: arguments.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into(), tool_calls: Vec::new(), tool_call_id: None }
    }

    pub fn system(content: impl Into<String>) -> Self { Self::plain(Role::System, content) }
    pub fn user(content: impl Into<String>) -> Self { Self::plain(Role::User, content) }
    pub fn assistant(content: impl Into<String>) -> Self { Self::plain(Role::Assistant, content) }

    pub fn assistant_tool_calls(content: impl Into<String>, calls: Vec<ToolCallRequest>) -> Self {
        Self { tool_calls: calls, ..Self::plain(Role::Assistant, content) }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self { tool_call_id: Some(call_id.into()), ..Self::plain(Role::Tool, content) }
    }
}

/// Model-facing replay state of one conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentContext {
    pub messages: Vec<Message>,
    pub current_iteration: u32,
    pub last_tool_calls: Vec<ToolCallRequest>,
}

impl AgentContext {
    pub fn seeded(system_prompt: impl Into<String>) -> Self {
        Self { messages: vec![Message::system(system_prompt)], ..Self::default() }
    }

    pub fn seed_prompt(&self) -> Option<&str> {
        self.messages.first().filter(|m| m.role == Role::System).map(|m| m.content.as_str())
    }

    /// Swap the system seed for `prompt`, keeping the rest of the history.
    pub fn replace_seed(&mut self, prompt: impl Into<String>) {
        match self.messages.first_mut() {
            Some(first) if first.role == Role::System => first.content = prompt.into(),
            _ => self.messages.insert(0, Message::system(prompt)),
        }
    }
}
