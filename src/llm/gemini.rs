//! Gemini API client
//!
//! Talks to the `generateContent` REST endpoint with function declarations.
//! Uses a long-lived reqwest::Client for connection pooling.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, error, info};

use super::{Content, GenerateRequest, GenerateResponse, LanguageModel, Part, Role, ToolCall, ToolMode, ToolResult};
use crate::error::FinanceError;
use crate::tools::schema::{ParameterSchema, ToolSchema};
use crate::Result;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

const MALFORMED_FUNCTION_CALL: &str = "MALFORMED_FUNCTION_CALL";
const SAFETY: &str = "SAFETY";

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(FinanceError::ConfigError("GEMINI_API_KEY not configured".to_string()));
        }

        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait::async_trait]
impl LanguageModel for GeminiClient {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        let body = GeminiRequest::from(request);

        debug!(
            model = %self.model,
            system_len = request.system.len(),
            contents = request.contents.len(),
            tools = request.tools.len(),
            mode = ?request.tool_mode,
            "Calling Gemini API"
        );

        let response = self
            .client
            .post(format!("{}?key={}", self.endpoint(), self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini API request failed: {}", e);
                FinanceError::LlmError(format!("Gemini API error: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!(%status, "Gemini API error response: {}", error_text);
            return Err(FinanceError::LlmError(format!("Gemini API returned {}: {}", status, error_text)));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            FinanceError::LlmError(format!("Gemini parse error: {}", e))
        })?;

        if let Some(usage) = &gemini_response.usage_metadata {
            info!(
                prompt_tokens = usage.prompt_token_count,
                output_tokens = usage.candidates_token_count,
                "Gemini response received"
            );
        }

        parse_response(gemini_response)
    }
}

//
// ================= Wire types =================
//

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<WireContent>,
    contents: Vec<WireContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_config: Option<WireToolConfig>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct WireContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<WirePart>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<WireFunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<WireFunctionResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    args: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionResponse {
    name: String,
    #[serde(default)]
    response: Map<String, Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireTool {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct FunctionDeclaration {
    name: String,
    description: String,
    parameters: WireSchema,
}

#[derive(Debug, Serialize)]
struct WireSchema {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(rename = "enum", skip_serializing_if = "Vec::is_empty")]
    enum_values: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    properties: BTreeMap<String, WireSchema>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    required: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireToolConfig {
    function_calling_config: FunctionCallingConfig,
}

#[derive(Debug, Serialize)]
struct FunctionCallingConfig {
    mode: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<WireContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: i64,
    #[serde(default)]
    candidates_token_count: i64,
}

//
// ================= Conversions =================
//

impl From<&ParameterSchema> for WireSchema {
    fn from(schema: &ParameterSchema) -> Self {
        Self {
            kind: schema.kind.as_upper(),
            description: schema.description.clone(),
            enum_values: schema.enum_values.clone(),
            properties: schema
                .properties
                .iter()
                .map(|(name, prop)| (name.clone(), WireSchema::from(prop)))
                .collect(),
            required: schema.required.clone(),
        }
    }
}

impl From<&ToolSchema> for FunctionDeclaration {
    fn from(tool: &ToolSchema) -> Self {
        Self {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: WireSchema::from(&tool.parameters),
        }
    }
}

impl From<&Part> for WirePart {
    fn from(part: &Part) -> Self {
        match part {
            Part::Text(text) => WirePart {
                text: Some(text.clone()),
                ..Default::default()
            },
            Part::FunctionCall(call) => WirePart {
                function_call: Some(WireFunctionCall {
                    name: call.name.clone(),
                    args: call.args.clone(),
                }),
                ..Default::default()
            },
            Part::FunctionResponse(result) => WirePart {
                function_response: Some(WireFunctionResponse {
                    name: result.name.clone(),
                    response: result.response.clone(),
                }),
                ..Default::default()
            },
        }
    }
}

impl From<&Content> for WireContent {
    fn from(content: &Content) -> Self {
        let role = match content.role {
            Role::User => "user",
            Role::Model => "model",
        };
        Self {
            role: Some(role.to_string()),
            parts: content.parts.iter().map(WirePart::from).collect(),
        }
    }
}

impl From<&GenerateRequest> for GeminiRequest {
    fn from(request: &GenerateRequest) -> Self {
        let system_instruction = (!request.system.is_empty()).then(|| WireContent {
            role: None,
            parts: vec![WirePart {
                text: Some(request.system.clone()),
                ..Default::default()
            }],
        });

        let (tools, tool_config) = if request.tools.is_empty() {
            (Vec::new(), None)
        } else {
            let mode = match request.tool_mode {
                ToolMode::Auto => "AUTO",
                ToolMode::None => "NONE",
            };
            (
                vec![WireTool {
                    function_declarations: request.tools.iter().map(FunctionDeclaration::from).collect(),
                }],
                Some(WireToolConfig {
                    function_calling_config: FunctionCallingConfig { mode },
                }),
            )
        };

        Self {
            system_instruction,
            contents: request.contents.iter().map(WireContent::from).collect(),
            tools,
            tool_config,
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_output_tokens,
            },
        }
    }
}

/// Collect text and function calls across candidates, mapping blocked and
/// malformed responses to their errors.
fn parse_response(response: GeminiResponse) -> Result<GenerateResponse> {
    if let Some(reason) = response.prompt_feedback.as_ref().and_then(|f| f.block_reason.as_deref()) {
        return Err(FinanceError::LlmError(format!("content blocked: {}", reason)));
    }

    let mut out = GenerateResponse::default();
    let mut malformed = false;

    for candidate in response.candidates {
        match candidate.finish_reason.as_deref() {
            Some(SAFETY) => {
                return Err(FinanceError::LlmError("response blocked by safety filters".to_string()));
            }
            Some(MALFORMED_FUNCTION_CALL) => malformed = true,
            _ => {}
        }

        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if let Some(text) = part.text {
                out.text.push_str(&text);
            }
            if let Some(call) = part.function_call {
                out.tool_calls.push(ToolCall {
                    name: call.name,
                    args: call.args,
                });
            }
        }
    }

    if out.text.is_empty() && out.tool_calls.is_empty() {
        if malformed {
            return Err(FinanceError::MalformedFunctionCall);
        }
        return Err(FinanceError::LlmError("empty response from Gemini".to_string()));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{schema::schema_for, ToolKind};
    use serde_json::json;

    fn request(tool_mode: ToolMode) -> GenerateRequest {
        let mut args = Map::new();
        args.insert("groupBy".to_string(), json!("merchant"));
        GenerateRequest {
            system: "You are a finance analytics assistant.".to_string(),
            contents: vec![
                Content::user_text("Where did my money go?"),
                Content::function_call(ToolCall {
                    name: "get_spend_breakdown".to_string(),
                    args: args.clone(),
                }),
                Content::function_response(ToolResult {
                    name: "get_spend_breakdown".to_string(),
                    response: args,
                }),
            ],
            tools: vec![schema_for(ToolKind::SpendBreakdown)],
            tool_mode,
            temperature: Some(0.2),
            max_output_tokens: None,
        }
    }

    #[test]
    fn test_request_serialization() {
        let body = serde_json::to_value(GeminiRequest::from(&request(ToolMode::Auto))).unwrap();

        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "You are a finance analytics assistant.");
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["contents"][1]["parts"][0]["functionCall"]["name"], "get_spend_breakdown");
        assert_eq!(body["contents"][2]["parts"][0]["functionResponse"]["response"]["groupBy"], "merchant");
        assert!(body["contents"][0]["parts"][0].get("functionCall").is_none());

        let declaration = &body["tools"][0]["functionDeclarations"][0];
        assert_eq!(declaration["parameters"]["type"], "OBJECT");
        assert_eq!(declaration["parameters"]["properties"]["groupBy"]["type"], "STRING");
        assert_eq!(body["toolConfig"]["functionCallingConfig"]["mode"], "AUTO");
        assert!(body["generationConfig"].get("maxOutputTokens").is_none());
    }

    #[test]
    fn test_tool_mode_none() {
        let body = serde_json::to_value(GeminiRequest::from(&request(ToolMode::None))).unwrap();
        assert_eq!(body["toolConfig"]["functionCallingConfig"]["mode"], "NONE");
    }

    fn parse(value: Value) -> Result<GenerateResponse> {
        parse_response(serde_json::from_value(value).unwrap())
    }

    #[test]
    fn test_parse_text_and_function_calls() {
        let response = parse(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"text": "Let me check. "},
                    {"functionCall": {"name": "get_spend_total", "args": {"dateFrom": "2025-02-01"}}}
                ]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 10, "candidatesTokenCount": 5}
        }))
        .unwrap();

        assert_eq!(response.text, "Let me check. ");
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].name, "get_spend_total");
        assert_eq!(response.tool_calls[0].args["dateFrom"], "2025-02-01");
    }

    #[test]
    fn test_parse_malformed_function_call() {
        let err = parse(json!({"candidates": [{"finishReason": "MALFORMED_FUNCTION_CALL"}]})).unwrap_err();
        assert!(err.is_malformed_function_call());
    }

    #[test]
    fn test_parse_blocked_and_empty() {
        let blocked = parse(json!({"promptFeedback": {"blockReason": "SAFETY"}})).unwrap_err();
        assert!(matches!(blocked, FinanceError::LlmError(ref m) if m.contains("blocked")));

        let safety = parse(json!({"candidates": [{"content": {"parts": [{"text": "x"}]}, "finishReason": "SAFETY"}]}))
            .unwrap_err();
        assert!(matches!(safety, FinanceError::LlmError(_)));

        let empty = parse(json!({"candidates": []})).unwrap_err();
        assert!(matches!(empty, FinanceError::LlmError(_)));
    }

    #[test]
    fn test_client_requires_api_key() {
        assert!(GeminiClient::new(String::new(), DEFAULT_MODEL.to_string()).is_err());
        let client = GeminiClient::new("key".to_string(), DEFAULT_MODEL.to_string())
            .unwrap()
            .with_base_url("http://localhost:9999/");
        assert_eq!(client.endpoint(), "http://localhost:9999/models/gemini-2.0-flash:generateContent");
    }
}
