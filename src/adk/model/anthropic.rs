// SPDX-License-Identifier: MIT

//! Anthropic Messages API client

use super::{Content, GenerationConfig, Model, Part, ToolSpec};
use crate::adk::error::ModelError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::env;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic Claude model
pub struct AnthropicModel {
    client: Client,
    api_key: String,
    model_name: String,
    base_url: String,
}

impl AnthropicModel {
    /// Reads `ANTHROPIC_API_KEY` and the optional `ANTHROPIC_BASE_URL`
    pub fn new(model_name: impl Into<String>) -> Result<Self, ModelError> {
        let api_key = env::var("ANTHROPIC_API_KEY")
            .map_err(|_| ModelError::ApiKeyMissing("Anthropic".to_string()))?;
        let base_url =
            env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Ok(Self::with_base_url(model_name, api_key, base_url))
    }

    pub fn with_base_url(
        model_name: impl Into<String>,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model_name: model_name.into(),
            base_url: base_url.into(),
        }
    }

    /// System prompt travels outside the message list
    fn system_prompt(history: &[Content]) -> Option<String> {
        let text: Vec<String> = history
            .iter()
            .filter(|c| c.role == "system")
            .map(Content::joined_text)
            .filter(|t| !t.is_empty())
            .collect();
        (!text.is_empty()).then(|| text.join("\n\n"))
    }

    fn message(content: &Content) -> Option<Value> {
        if content.role == "system" {
            return None;
        }
        let role = match content.role.as_str() {
            "model" => "assistant",
            other => other,
        };

        let blocks: Vec<Value> = content
            .parts
            .iter()
            .map(|part| match part {
                Part::Text(t) => json!({ "type": "text", "text": t }),
                Part::Thinking(t) => json!({ "type": "thinking", "thinking": t }),
                Part::FunctionCall { name, args } => json!({
                    "type": "tool_use",
                    "id": format!("tool_{}", name),
                    "name": name,
                    "input": args,
                }),
                Part::FunctionResponse { name, response } => json!({
                    "type": "tool_result",
                    "tool_use_id": format!("tool_{}", name),
                    "content": response.to_string(),
                }),
            })
            .collect();

        (!blocks.is_empty()).then(|| json!({ "role": role, "content": blocks }))
    }

    fn request_body(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
        tools: Option<&[ToolSpec]>,
    ) -> Value {
        let messages: Vec<Value> = history.iter().filter_map(Self::message).collect();
        let mut body = json!({
            "model": self.model_name,
            "messages": messages,
            "max_tokens": config
                .and_then(|c| c.max_output_tokens)
                .unwrap_or(DEFAULT_MAX_TOKENS),
        });

        if let Some(system) = Self::system_prompt(history) {
            body["system"] = json!(system);
        }
        if let Some(cfg) = config {
            if let Some(temperature) = cfg.temperature {
                body["temperature"] = json!(temperature);
            }
            if let Some(top_p) = cfg.top_p {
                body["top_p"] = json!(top_p);
            }
            if let Some(top_k) = cfg.top_k {
                body["top_k"] = json!(top_k);
            }
        }
        if let Some(tools) = tools.filter(|t| !t.is_empty()) {
            body["tools"] = tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.parameters,
                    })
                })
                .collect();
        }

        body
    }

    fn parse_response(response: &Value) -> Result<Content, ModelError> {
        let blocks = response["content"].as_array().ok_or_else(|| {
            ModelError::InvalidResponse("no content in Anthropic response".into())
        })?;

        let parts = blocks
            .iter()
            .filter_map(|block| match block["type"].as_str() {
                Some("text") => block["text"]
                    .as_str()
                    .filter(|t| !t.is_empty())
                    .map(|t| Part::Text(t.to_string())),
                Some("thinking") => block["thinking"]
                    .as_str()
                    .filter(|t| !t.is_empty())
                    .map(|t| Part::Thinking(t.to_string())),
                Some("tool_use") => Some(Part::FunctionCall {
                    name: block["name"].as_str().unwrap_or_default().to_string(),
                    args: block["input"].clone(),
                }),
                _ => None,
            })
            .collect();

        if let Some(reason) = response["stop_reason"].as_str() {
            log::debug!("Anthropic stop reason: {}", reason);
        }

        Ok(Content {
            role: "model".to_string(),
            parts,
        })
    }
}

#[async_trait]
impl Model for AnthropicModel {
    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
        tools: Option<&[ToolSpec]>,
    ) -> Result<Content, ModelError> {
        let url = format!("{}/messages", self.base_url);
        let body = self.request_body(history, config, tools);
        log::debug!("Anthropic request to {} with {} messages", url, history.len());

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await?;
            return Err(ModelError::api("Anthropic", format!("{}: {}", status, text)));
        }

        let json: Value = resp.json().await?;
        log::debug!("Anthropic response: {}", json);
        Self::parse_response(&json)
    }
}
