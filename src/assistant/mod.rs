//! Conversational assistant
//!
//! Drives one user turn:
//!
//! AWAITING MODEL → TOOL REQUESTED → TOOL EXECUTED → AWAITING FINAL MODEL → DONE
//!
//! At most one tool runs per turn. A malformed function call is retried once
//! with a stricter prompt; every other failure ends the turn. Nothing about the
//! tool is persisted unless it executed successfully.

pub mod context;
pub mod prompts;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::FinanceError;
use crate::llm::{Content, GenerateRequest, GenerateResponse, LanguageModel, ToolMode};
use crate::memory::{ConversationMessage, ConversationStore, MessageBody};
use crate::tools::ToolRegistry;
use crate::Result;
use prompts::{strict_system_prompt, system_prompt};

#[derive(Debug, Clone)]
pub struct AssistantConfig {
    /// Persisted messages replayed into each turn
    pub history_limit: usize,
    /// `None` keeps messages forever
    pub message_ttl: Option<Duration>,
    pub llm_timeout: Duration,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            history_limit: 8,
            message_ttl: None,
            llm_timeout: Duration::from_secs(30),
            temperature: Some(0.2),
            max_output_tokens: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    AwaitingModel,
    ToolRequested,
    ToolExecuted,
    AwaitingFinalModel,
    Done,
    Failed,
}

/// Tracks where a turn is, for logs.
struct Turn<'a> {
    user_id: &'a str,
    session_id: &'a str,
    state: TurnState,
}

impl<'a> Turn<'a> {
    fn new(user_id: &'a str, session_id: &'a str) -> Self {
        Self {
            user_id,
            session_id,
            state: TurnState::AwaitingModel,
        }
    }

    fn advance(&mut self, next: TurnState) {
        debug!(
            user_id = self.user_id,
            session_id = self.session_id,
            from = ?self.state,
            to = ?next,
            "turn state"
        );
        self.state = next;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDebug {
    pub tool: String,
    pub args: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssistantReply {
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<ToolDebug>,
}

pub struct Assistant {
    model: Arc<dyn LanguageModel>,
    tools: ToolRegistry,
    store: Arc<dyn ConversationStore>,
    clock: Arc<dyn Clock>,
    config: AssistantConfig,
    session_locks: Mutex<HashMap<(String, String), Arc<Mutex<()>>>>,
}

impl Assistant {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        tools: ToolRegistry,
        store: Arc<dyn ConversationStore>,
        clock: Arc<dyn Clock>,
        config: AssistantConfig,
    ) -> Self {
        Self {
            model,
            tools,
            store,
            clock,
            config,
            session_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Answer one user message within a session. Turns of the same session run
    /// one at a time, in arrival order.
    pub async fn query(&self, user_id: &str, session_id: &str, message: &str) -> Result<AssistantReply> {
        let message = message.trim();
        if message.is_empty() {
            return Err(FinanceError::Validation("message is required".to_string()));
        }

        let lock = self.session_lock(user_id, session_id).await;
        let _guard = lock.lock().await;

        let mut turn = Turn::new(user_id, session_id);
        let result = self.run_turn(&mut turn, message).await;
        if let Err(e) = &result {
            warn!(user_id, session_id, state = ?turn.state, "turn failed: {}", e);
            turn.advance(TurnState::Failed);
        }
        result
    }

    async fn session_lock(&self, user_id: &str, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.session_locks.lock().await;
        // Drop locks nobody else is holding or waiting on.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry((user_id.to_string(), session_id.to_string()))
            .or_default()
            .clone()
    }

    async fn run_turn(&self, turn: &mut Turn<'_>, message: &str) -> Result<AssistantReply> {
        let (user_id, session_id) = (turn.user_id, turn.session_id);

        let history = self
            .store
            .list_messages(user_id, session_id, self.config.history_limit)
            .await?;
        let now = self.clock.now();

        let mut request = GenerateRequest {
            system: system_prompt(now),
            contents: context::rebuild(&history, message),
            tools: self.tools.schemas(),
            tool_mode: ToolMode::Auto,
            temperature: self.config.temperature,
            max_output_tokens: self.config.max_output_tokens,
        };

        let response = match self.generate(&request).await {
            Err(e) if e.is_malformed_function_call() => {
                warn!(user_id, session_id, "malformed function call, retrying with strict prompt");
                let strict = GenerateRequest {
                    system: strict_system_prompt(now),
                    ..request.clone()
                };
                self.generate(&strict).await?
            }
            other => other?,
        };

        let Some(call) = response.tool_calls.first().cloned() else {
            self.save(user_id, session_id, MessageBody::User {
                content: message.to_string(),
            })
            .await?;
            if !response.text.is_empty() {
                self.save(user_id, session_id, MessageBody::Assistant {
                    content: response.text.clone(),
                })
                .await?;
            }
            turn.advance(TurnState::Done);
            return Ok(AssistantReply {
                answer: response.text,
                debug: None,
            });
        };

        if response.tool_calls.len() > 1 {
            warn!(
                user_id,
                session_id,
                count = response.tool_calls.len(),
                "model requested more than one tool call; using the first"
            );
        }

        turn.advance(TurnState::ToolRequested);
        if !self.tools.contains(&call.name) {
            return Err(FinanceError::ToolNotFound(call.name));
        }

        info!(user_id, session_id, tool = %call.name, "tool requested");
        let result = self.tools.execute(user_id, &call).await?;
        turn.advance(TurnState::ToolExecuted);

        self.save(user_id, session_id, MessageBody::User {
            content: message.to_string(),
        })
        .await?;
        self.save(user_id, session_id, MessageBody::Tool {
            tool_name: call.name.clone(),
            tool_args: call.args.clone(),
            tool_result: result.response.clone(),
        })
        .await?;

        request.tool_mode = ToolMode::None;
        request.contents.push(Content::function_call(call.clone()));
        request.contents.push(Content::function_response(result));

        turn.advance(TurnState::AwaitingFinalModel);
        let final_response = self.generate(&request).await?;

        self.save(user_id, session_id, MessageBody::Assistant {
            content: final_response.text.clone(),
        })
        .await?;
        turn.advance(TurnState::Done);

        Ok(AssistantReply {
            answer: final_response.text,
            debug: Some(ToolDebug {
                tool: call.name,
                args: call.args,
            }),
        })
    }

    /// One model call bounded by the configured timeout.
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        let timeout = self.config.llm_timeout;
        tokio::time::timeout(timeout, self.model.generate(request))
            .await
            .map_err(|_| FinanceError::LlmTimeout(timeout))?
    }

    async fn save(&self, user_id: &str, session_id: &str, body: MessageBody) -> Result<()> {
        let message = ConversationMessage::new(body, self.clock.now(), self.config.message_ttl);
        self.store.save_message(user_id, session_id, &message).await
    }
}
