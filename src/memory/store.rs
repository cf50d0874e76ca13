//! Conversation message log
//!
//! Append-only, per (user, session). Messages may carry an expiry; once past it
//! they are no longer returned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::clock::Clock;
use crate::Result;

/// Role of a persisted message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    Tool,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
        }
    }
}

/// Role-specific payload of a message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum MessageBody {
    User {
        content: String,
    },
    Assistant {
        content: String,
    },
    #[serde(rename_all = "camelCase")]
    Tool {
        tool_name: String,
        tool_args: Map<String, Value>,
        tool_result: Map<String, Value>,
    },
}

impl MessageBody {
    pub fn role(&self) -> MessageRole {
        match self {
            MessageBody::User { .. } => MessageRole::User,
            MessageBody::Assistant { .. } => MessageRole::Assistant,
            MessageBody::Tool { .. } => MessageRole::Tool,
        }
    }
}

/// A single message in the conversation log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessage {
    pub message_id: Uuid,
    #[serde(flatten)]
    pub body: MessageBody,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl ConversationMessage {
    /// Create a message at `now`, expiring after `ttl` when one is configured.
    pub fn new(body: MessageBody, now: DateTime<Utc>, ttl: Option<Duration>) -> Self {
        let expires_at = ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .and_then(|ttl| now.checked_add_signed(ttl));

        Self {
            message_id: Uuid::new_v4(),
            body,
            created_at: now,
            expires_at,
        }
    }

    pub fn role(&self) -> MessageRole {
        self.body.role()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

#[async_trait::async_trait]
pub trait ConversationStore: Send + Sync {
    async fn save_message(&self, user_id: &str, session_id: &str, message: &ConversationMessage) -> Result<()>;

    /// The most recent `limit` live messages, oldest first.
    async fn list_messages(&self, user_id: &str, session_id: &str, limit: usize)
        -> Result<Vec<ConversationMessage>>;
}

/// In-memory store for development and tests
pub struct InMemoryConversationStore {
    sessions: Arc<RwLock<HashMap<(String, String), Vec<ConversationMessage>>>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryConversationStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    /// Every stored message of a session, expired or not
    pub async fn all_messages(&self, user_id: &str, session_id: &str) -> Vec<ConversationMessage> {
        let sessions = self.sessions.read().await;
        sessions
            .get(&(user_id.to_string(), session_id.to_string()))
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn save_message(&self, user_id: &str, session_id: &str, message: &ConversationMessage) -> Result<()> {
        let now = self.clock.now();
        let mut sessions = self.sessions.write().await;
        let log = sessions
            .entry((user_id.to_string(), session_id.to_string()))
            .or_default();
        log.retain(|m| !m.is_expired(now));
        log.push(message.clone());
        Ok(())
    }

    async fn list_messages(
        &self,
        user_id: &str,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationMessage>> {
        let now = self.clock.now();
        let sessions = self.sessions.read().await;
        let Some(log) = sessions.get(&(user_id.to_string(), session_id.to_string())) else {
            return Ok(Vec::new());
        };

        let live: Vec<&ConversationMessage> = log.iter().filter(|m| !m.is_expired(now)).collect();
        let skip = live.len().saturating_sub(limit);
        Ok(live.into_iter().skip(skip).cloned().collect())
    }
}
