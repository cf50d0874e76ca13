//! Postgres-backed conversation store
//!
//! One row per message in `ai_messages`. The schema is created lazily, once per
//! process, on first use.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use uuid::Uuid;

use super::store::{ConversationMessage, ConversationStore, MessageBody, MessageRole};
use crate::clock::Clock;
use crate::error::FinanceError;
use crate::Result;

pub struct PgConversationStore {
    pool: PgPool,
    schema_ready: Arc<OnceCell<()>>,
    clock: Arc<dyn Clock>,
}

fn db_error(context: &str) -> impl Fn(sqlx::Error) -> FinanceError + '_ {
    move |e| FinanceError::DatabaseError(format!("{}: {}", context, e))
}

/// Columns of one row, split out so the role mapping stays testable.
#[derive(Debug, Default)]
struct MessageColumns {
    role: String,
    content: Option<String>,
    tool_name: Option<String>,
    tool_args: Option<Value>,
    tool_result: Option<Value>,
}

fn into_object(value: Option<Value>) -> Map<String, Value> {
    match value {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

impl MessageColumns {
    fn from_body(body: &MessageBody) -> Self {
        match body {
            MessageBody::User { content } | MessageBody::Assistant { content } => Self {
                role: body.role().as_str().to_string(),
                content: Some(content.clone()),
                ..Default::default()
            },
            MessageBody::Tool {
                tool_name,
                tool_args,
                tool_result,
            } => Self {
                role: MessageRole::Tool.as_str().to_string(),
                tool_name: Some(tool_name.clone()),
                tool_args: Some(Value::Object(tool_args.clone())),
                tool_result: Some(Value::Object(tool_result.clone())),
                ..Default::default()
            },
        }
    }

    fn into_body(self) -> Result<MessageBody> {
        match self.role.as_str() {
            "user" => Ok(MessageBody::User {
                content: self.content.unwrap_or_default(),
            }),
            "assistant" => Ok(MessageBody::Assistant {
                content: self.content.unwrap_or_default(),
            }),
            "tool" => Ok(MessageBody::Tool {
                tool_name: self.tool_name.unwrap_or_default(),
                tool_args: into_object(self.tool_args),
                tool_result: into_object(self.tool_result),
            }),
            other => Err(FinanceError::DatabaseError(format!("unknown message role: {}", other))),
        }
    }
}

impl PgConversationStore {
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
            clock,
        }
    }

    /// Lazy pool; no connection is made until the first query.
    pub fn connect_lazy(url: &str, clock: Arc<dyn Clock>) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(url)
            .map_err(db_error("Invalid DATABASE_URL"))?;
        Ok(Self::new(pool, clock))
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS ai_messages (
                      seq BIGSERIAL,
                      message_id UUID PRIMARY KEY,
                      user_id TEXT NOT NULL,
                      session_id TEXT NOT NULL,
                      role TEXT NOT NULL,
                      content TEXT,
                      tool_name TEXT,
                      tool_args JSONB,
                      tool_result JSONB,
                      created_at TIMESTAMPTZ NOT NULL,
                      expires_at TIMESTAMPTZ
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE INDEX IF NOT EXISTS idx_ai_messages_session_time
                    ON ai_messages (user_id, session_id, created_at DESC);
                    "#,
                )
                .execute(&self.pool)
                .await?;

                info!("ai_messages schema ready");
                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(db_error("Failed to initialize conversation schema"))?;

        Ok(())
    }

    /// Delete every expired row. Returns how many were removed.
    pub async fn purge_expired(&self) -> Result<u64> {
        self.ensure_schema().await?;

        let result = sqlx::query("DELETE FROM ai_messages WHERE expires_at IS NOT NULL AND expires_at <= $1")
            .bind(self.clock.now())
            .execute(&self.pool)
            .await
            .map_err(db_error("Failed to purge expired messages"))?;

        Ok(result.rows_affected())
    }
}

#[async_trait::async_trait]
impl ConversationStore for PgConversationStore {
    async fn save_message(&self, user_id: &str, session_id: &str, message: &ConversationMessage) -> Result<()> {
        self.ensure_schema().await?;

        let columns = MessageColumns::from_body(&message.body);
        sqlx::query(
            r#"
            INSERT INTO ai_messages
              (message_id, user_id, session_id, role, content, tool_name, tool_args, tool_result, created_at, expires_at)
            VALUES
              ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(message.message_id)
        .bind(user_id)
        .bind(session_id)
        .bind(&columns.role)
        .bind(&columns.content)
        .bind(&columns.tool_name)
        .bind(&columns.tool_args)
        .bind(&columns.tool_result)
        .bind(message.created_at)
        .bind(message.expires_at)
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to save conversation message"))?;

        debug!(user_id, session_id, role = columns.role.as_str(), "message saved");
        Ok(())
    }

    async fn list_messages(
        &self,
        user_id: &str,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationMessage>> {
        self.ensure_schema().await?;

        // Newest first so LIMIT keeps the tail of the conversation.
        let rows = sqlx::query(
            r#"
            SELECT message_id, role, content, tool_name, tool_args, tool_result, created_at, expires_at
            FROM ai_messages
            WHERE user_id = $1 AND session_id = $2
              AND (expires_at IS NULL OR expires_at > $3)
            ORDER BY created_at DESC, seq DESC
            LIMIT $4
            "#,
        )
        .bind(user_id)
        .bind(session_id)
        .bind(self.clock.now())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to load conversation messages"))?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            let columns = MessageColumns {
                role: row.try_get("role").map_err(db_error("role"))?,
                content: row.try_get("content").map_err(db_error("content"))?,
                tool_name: row.try_get("tool_name").map_err(db_error("tool_name"))?,
                tool_args: row.try_get("tool_args").map_err(db_error("tool_args"))?,
                tool_result: row.try_get("tool_result").map_err(db_error("tool_result"))?,
            };
            let message_id: Uuid = row.try_get("message_id").map_err(db_error("message_id"))?;
            let created_at: DateTime<Utc> = row.try_get("created_at").map_err(db_error("created_at"))?;
            let expires_at: Option<DateTime<Utc>> = row.try_get("expires_at").map_err(db_error("expires_at"))?;

            messages.push(ConversationMessage {
                message_id,
                body: columns.into_body()?,
                created_at,
                expires_at,
            });
        }

        messages.reverse();
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_columns_round_trip() {
        let body = MessageBody::Assistant {
            content: "You spent $42.".into(),
        };
        let columns = MessageColumns::from_body(&body);
        assert_eq!(columns.role, "assistant");
        assert!(columns.tool_args.is_none());
        assert_eq!(columns.into_body().unwrap(), body);
    }

    #[test]
    fn test_tool_columns_round_trip() {
        let mut args = Map::new();
        args.insert("dimension".into(), json!("merchant"));
        let mut result = Map::new();
        result.insert("totalSpend".into(), json!(100.0));
        let body = MessageBody::Tool {
            tool_name: "get_top_n".into(),
            tool_args: args,
            tool_result: result,
        };

        let columns = MessageColumns::from_body(&body);
        assert_eq!(columns.role, "tool");
        assert_eq!(columns.tool_args.as_ref().unwrap()["dimension"], "merchant");
        assert_eq!(columns.into_body().unwrap(), body);
    }

    #[test]
    fn test_unknown_role_is_an_error() {
        let columns = MessageColumns {
            role: "system".into(),
            ..Default::default()
        };
        assert!(matches!(columns.into_body(), Err(FinanceError::DatabaseError(_))));

        // tool rows with null JSON decode to empty maps
        let columns = MessageColumns {
            role: "tool".into(),
            tool_name: Some("get_spend_total".into()),
            ..Default::default()
        };
        match columns.into_body().unwrap() {
            MessageBody::Tool { tool_args, tool_result, .. } => {
                assert!(tool_args.is_empty());
                assert!(tool_result.is_empty());
            }
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connect_lazy_rejects_bad_url() {
        let clock = crate::testing::fixed_clock();
        assert!(PgConversationStore::connect_lazy("not a url", clock).is_err());
    }
}
