//! Language model abstraction
//!
//! Provider-neutral conversation content and a single `generate` call. The
//! assistant only ever talks to a `LanguageModel`; Gemini is one implementation.

pub mod gemini;

pub use gemini::GeminiClient;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::tools::schema::ToolSchema;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

/// Output of a tool, handed back to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub name: String,
    #[serde(default)]
    pub response: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(String),
    FunctionCall(ToolCall),
    FunctionResponse(ToolResult),
}

/// One role-tagged entry of the conversation sent to the model
#[derive(Debug, Clone, PartialEq)]
pub struct Content {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::Text(text.into())],
        }
    }

    pub fn model_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            parts: vec![Part::Text(text.into())],
        }
    }

    pub fn function_call(call: ToolCall) -> Self {
        Self {
            role: Role::Model,
            parts: vec![Part::FunctionCall(call)],
        }
    }

    /// Tool results travel back on the user side of the conversation.
    pub fn function_response(result: ToolResult) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::FunctionResponse(result)],
        }
    }
}

/// Whether the model may call tools on this request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolMode {
    #[default]
    Auto,
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub system: String,
    pub contents: Vec<Content>,
    pub tools: Vec<ToolSchema>,
    pub tool_mode: ToolMode,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
}

impl GenerateResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_call(name: impl Into<String>, args: Value) -> Self {
        let args = match args {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            text: String::new(),
            tool_calls: vec![ToolCall {
                name: name.into(),
                args,
            }],
        }
    }
}

#[async_trait::async_trait]
pub trait LanguageModel: Send + Sync {
    /// One model round trip. Schema-violating tool calls surface as
    /// `FinanceError::MalformedFunctionCall`.
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse>;
}
