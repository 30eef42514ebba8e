use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::Span;
use uuid::Uuid;

use crate::agent::messages::{AgentContext, Role, ToolCallRequest};
use crate::settings::SessionSettings;

/// Display-facing log entry; unlike the model history it records the actions
/// a turn took.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<String>,
}

/// Client-facing projection of an `AgentContext`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationContext {
    pub current_iteration: u32,
    pub message_count: usize,
    /// Calls from the last tool round, arguments included.
    pub last_tool_calls: Vec<ToolCallRequest>,
}

impl From<&AgentContext> for ConversationContext {
    fn from(ctx: &AgentContext) -> Self {
        Self {
            current_iteration: ctx.current_iteration,
            message_count: ctx.messages.len(),
            last_tool_calls: ctx.last_tool_calls.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub settings: SessionSettings,
    pub agent: AgentContext,
    pub message_log: Vec<ConversationMessage>,
}

impl Session {
    pub fn new(settings: SessionSettings) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            last_activity: now,
            settings,
            agent: AgentContext::default(),
            message_log: Vec::new(),
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    pub fn context(&self) -> ConversationContext {
        ConversationContext::from(&self.agent)
    }

    pub fn add_message(&mut self, role: Role, content: impl Into<String>, actions: Vec<String>) {
        self.add_message_at(role, content, actions, Utc::now());
    }

    pub fn add_message_at(&mut self, role: Role, content: impl Into<String>, actions: Vec<String>, timestamp: DateTime<Utc>) {
        self.message_log.push(ConversationMessage { role, content: content.into(), timestamp, actions });
        self.touch();
    }

    pub fn update_context(&mut self, agent: AgentContext) {
        self.agent = agent;
        self.touch();
    }

    /// Drop history and model context; the id stays valid.
    pub fn clear(&mut self) {
        self.message_log.clear();
        self.agent = AgentContext::default();
        self.touch();
    }
}

pub type SessionGuard = OwnedMutexGuard<Session>;

/// In-process session table. Each session sits behind its own lock so a turn
/// can hold one session without blocking the others.
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, Arc<Mutex<Session>>>>,
    span: Span,
}

impl SessionStore {
    pub fn new(parent: &Span) -> Self {
        Self { sessions: RwLock::new(HashMap::new()), span: tracing::info_span!(parent: parent, "sessions") }
    }

    /// Insert a fresh session and return it already locked.
    pub async fn create_session(&self, settings: SessionSettings) -> SessionGuard {
        let session = Session::new(settings);
        let id = session.id;
        let handle = Arc::new(Mutex::new(session));
        let guard = handle.clone().lock_owned().await;
        let mut sessions = self.sessions.write().await;
        sessions.insert(id, handle);
        metrics::gauge!("assistant_sessions_active").set(sessions.len() as f64);
        tracing::info!(parent: &self.span, session = %id, active = sessions.len(), "session created");
        guard
    }

    /// Lock the session for exclusive use and mark it active. Waits while
    /// another turn holds it.
    pub async fn get_session(&self, id: Uuid) -> Option<SessionGuard> {
        let handle = self.sessions.read().await.get(&id).cloned()?;
        let mut guard = handle.lock_owned().await;
        guard.touch();
        Some(guard)
    }

    #[cfg(test)]
    pub async fn contains(&self, id: Uuid) -> bool {
        self.sessions.read().await.contains_key(&id)
    }

    /// Returns false when the id is unknown.
    pub async fn clear_session(&self, id: Uuid) -> bool {
        match self.get_session(id).await {
            Some(mut s) => {
                s.clear();
                tracing::info!(parent: &self.span, session = %id, "session cleared");
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Remove sessions idle for longer than `max_age_hours`. Sessions locked by
    /// an in-flight turn are active by definition and are kept.
    pub async fn cleanup_expired(&self, max_age_hours: i64) -> usize {
        let cutoff = Utc::now() - Duration::hours(max_age_hours);
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, handle| match handle.try_lock() {
            Ok(s) => s.last_activity >= cutoff,
            Err(_) => true,
        });
        let removed = before - sessions.len();
        metrics::gauge!("assistant_sessions_active").set(sessions.len() as f64);
        if removed > 0 {
            metrics::counter!("assistant_sessions_expired_total").increment(removed as u64);
            tracing::info!(parent: &self.span, removed, remaining = sessions.len(), "expired sessions removed");
        }
        removed
    }
}
