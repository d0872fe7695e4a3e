use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use kgrag_core::error::{KgError, Result};
use kgrag_core::llm::{LanguageModel, Prompt};

use crate::runtime::BedrockRuntime;

pub const DEFAULT_MAX_TOKENS: u32 = 512;
pub const DEFAULT_TEMPERATURE: f32 = 0.1;

/// Text generation through the Bedrock Converse API.
pub struct BedrockConverse {
    runtime: BedrockRuntime,
    model_id: String,
    max_tokens: u32,
    temperature: f32,
}

// ── Converse API request/response types ───────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConverseRequest {
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    system: Vec<TextBlock>,
    inference_config: InferenceConfig,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: Vec<TextBlock>,
}

#[derive(Debug, Serialize)]
struct TextBlock {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InferenceConfig {
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConverseResponse {
    output: ConverseOutput,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ConverseOutput {
    message: Option<OutputMessage>,
}

#[derive(Debug, Deserialize)]
struct OutputMessage {
    #[serde(default)]
    content: Vec<OutputBlock>,
}

#[derive(Debug, Deserialize)]
struct OutputBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

// ── Implementation ─────────────────────────────────────────────────────────

impl BedrockConverse {
    pub fn new(runtime: BedrockRuntime, model_id: impl Into<String>) -> Self {
        Self {
            runtime,
            model_id: model_id.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn build_request(&self, prompt: &Prompt) -> ConverseRequest {
        ConverseRequest {
            messages: vec![Message {
                role: "user".to_string(),
                content: vec![TextBlock {
                    text: prompt.text.clone(),
                }],
            }],
            system: prompt
                .system
                .iter()
                .map(|s| TextBlock { text: s.clone() })
                .collect(),
            inference_config: InferenceConfig {
                max_tokens: self.max_tokens,
                temperature: self.temperature,
            },
        }
    }
}

#[async_trait]
impl LanguageModel for BedrockConverse {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        let request = self.build_request(prompt);

        let response: ConverseResponse = self
            .runtime
            .invoke(&self.model_id, "converse", &request)
            .await?;

        let text = response
            .output
            .message
            .map(|m| {
                m.content
                    .into_iter()
                    .filter_map(|b| b.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(KgError::Model {
                model: self.model_id.clone(),
                message: "Converse returned no text content".to_string(),
            });
        }

        tracing::debug!(
            kind = prompt.kind.as_str(),
            stop_reason = ?response.stop_reason,
            input_tokens = response.usage.as_ref().map(|u| u.input_tokens),
            output_tokens = response.usage.as_ref().map(|u| u.output_tokens),
            response_len = text.len(),
            "Received Converse response"
        );

        Ok(text)
    }
}
