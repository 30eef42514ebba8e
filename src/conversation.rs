use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::Span;
use uuid::Uuid;

use crate::agent::messages::Role;
use crate::agent::prompts::{CONTEXT_REFRESHED, WELCOME_MESSAGE};
use crate::agent::ResearchAssistant;
use crate::error::AssistantError;
use crate::session::{ConversationContext, ConversationMessage, SessionGuard, SessionStore};
use crate::settings::{resolve_effective_settings, GlobalConfigDefaults, RequestOverrides, SessionSettings};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedConversation {
    pub session_id: Uuid,
    pub message: String,
    pub context: ConversationContext,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub response: String,
    pub context: ConversationContext,
    pub actions: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct History {
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub messages: Vec<ConversationMessage>,
    pub context: ConversationContext,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Refreshed {
    pub message: String,
    pub context: ConversationContext,
}

/// Session-facing operations: ties the session table to the assistant loop.
pub struct ConversationService {
    assistant: Arc<ResearchAssistant>,
    store: Arc<SessionStore>,
    defaults: GlobalConfigDefaults,
    span: Span,
}

impl ConversationService {
    pub fn new(assistant: Arc<ResearchAssistant>, store: Arc<SessionStore>, defaults: GlobalConfigDefaults, parent: &Span) -> Self {
        Self { assistant, store, defaults, span: tracing::info_span!(parent: parent, "conversation") }
    }

    pub fn assistant(&self) -> &ResearchAssistant {
        &self.assistant
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    async fn session(&self, id: Uuid) -> Result<SessionGuard, AssistantError> {
        self.store.get_session(id).await.ok_or(AssistantError::SessionNotFound(id))
    }

    /// Reuses `session_id` when it is known; otherwise opens a new session.
    /// Either way the model context starts over from a fresh seed prompt.
    pub async fn start_conversation(
        &self,
        session_id: Option<Uuid>,
        use_context: bool,
        settings: Option<SessionSettings>,
    ) -> StartedConversation {
        let existing = match session_id {
            Some(id) => {
                let found = self.store.get_session(id).await;
                if found.is_none() {
                    tracing::warn!(parent: &self.span, session = %id, "session not found, creating a new one");
                }
                found
            }
            None => None,
        };
        let mut session = match existing {
            Some(s) => s,
            None => self.store.create_session(settings.clone().unwrap_or_default()).await,
        };
        if let Some(settings) = settings {
            session.settings = settings;
        }

        let agent = self.assistant.start_conversation(use_context).await;
        session.update_context(agent);
        session.add_message(Role::Assistant, WELCOME_MESSAGE, Vec::new());
        tracing::info!(parent: &self.span, session = %session.id, use_context, "conversation started");

        StartedConversation { session_id: session.id, message: WELCOME_MESSAGE.to_string(), context: session.context() }
    }

    /// Runs one turn while holding the session lock, so turns on the same
    /// session never interleave.
    pub async fn send_message(
        &self,
        id: Uuid,
        message: &str,
        file_ids: &[String],
        overrides: &RequestOverrides,
    ) -> Result<Reply, AssistantError> {
        let text = message.trim();
        if text.is_empty() {
            return Err(AssistantError::BadRequest("Message is required".into()));
        }
        let mut session = self.session(id).await?;
        tracing::info!(parent: &self.span, session = %id, len = text.len(), files = file_ids.len(), "processing message");

        let asked_at = Utc::now();
        let settings = resolve_effective_settings(&self.defaults, &session.settings, overrides);
        // The turn runs on a copy. If this future is dropped mid-turn the
        // session keeps its previous context and log.
        let turn = self.assistant.process_message(&with_attachments(text, file_ids), session.agent.clone(), &settings).await;

        tracing::info!(parent: &self.span, session = %id, outcome = turn.outcome.as_str(), actions = turn.actions.len(), "turn complete");
        session.add_message_at(Role::User, text, Vec::new(), asked_at);
        session.update_context(turn.context);
        session.add_message(Role::Assistant, turn.response.clone(), turn.actions.clone());
        Ok(Reply { response: turn.response, context: session.context(), actions: turn.actions, timestamp: Utc::now() })
    }

    /// Waits for an in-flight turn on the same session, so the result never
    /// shows a half-applied turn.
    pub async fn history(&self, id: Uuid) -> Result<History, AssistantError> {
        let session = self.session(id).await?;
        Ok(History {
            session_id: session.id,
            created_at: session.created_at,
            last_activity: session.last_activity,
            messages: session.message_log.clone(),
            context: session.context(),
        })
    }

    pub async fn clear(&self, id: Uuid) -> Result<(), AssistantError> {
        if self.store.clear_session(id).await {
            Ok(())
        } else {
            Err(AssistantError::SessionNotFound(id))
        }
    }

    /// Re-render the seed prompt from live graph state; history is kept.
    pub async fn refresh_context(&self, id: Uuid) -> Result<Refreshed, AssistantError> {
        let mut session = self.session(id).await?;
        let mut agent = session.agent.clone();
        self.assistant.refresh_context(&mut agent).await;
        let had_conversation = session.message_log.iter().any(|m| m.role == Role::User);
        session.update_context(agent);
        if had_conversation {
            session.add_message(Role::Assistant, CONTEXT_REFRESHED, Vec::new());
        }
        tracing::info!(parent: &self.span, session = %id, "context refreshed");
        Ok(Refreshed { message: "Context refreshed successfully".into(), context: session.context() })
    }
}

/// File search is handled elsewhere; the model only learns which files were attached.
fn with_attachments(text: &str, file_ids: &[String]) -> String {
    if file_ids.is_empty() {
        text.to_string()
    } else {
        format!("{text}\n\n[Attached files: {}]", file_ids.join(", "))
    }
}
