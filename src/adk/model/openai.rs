// SPDX-License-Identifier: MIT

//! OpenAI Chat Completions client

use super::{Content, GenerationConfig, Model, Part, ToolSpec};
use crate::adk::error::ModelError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::env;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI chat model
pub struct OpenAIModel {
    client: Client,
    api_key: String,
    model_name: String,
    base_url: String,
}

impl OpenAIModel {
    /// Reads `OPENAI_API_KEY` and the optional `OPENAI_BASE_URL`
    pub fn new(model_name: impl Into<String>) -> Result<Self, ModelError> {
        let api_key = env::var("OPENAI_API_KEY")
            .map_err(|_| ModelError::ApiKeyMissing("OpenAI".to_string()))?;
        let base_url = env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
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

    fn message(content: &Content) -> Value {
        let role = match content.role.as_str() {
            "model" => "assistant",
            other => other,
        };

        if let Some((name, response)) = content.parts.iter().find_map(|p| match p {
            Part::FunctionResponse { name, response } => Some((name, response)),
            _ => None,
        }) {
            return json!({
                "role": "tool",
                "tool_call_id": name,
                "content": response.to_string(),
            });
        }

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for part in &content.parts {
            match part {
                Part::Text(t) | Part::Thinking(t) => text.push_str(t),
                Part::FunctionCall { name, args } => tool_calls.push(json!({
                    "id": name,
                    "type": "function",
                    "function": { "name": name, "arguments": args.to_string() },
                })),
                Part::FunctionResponse { .. } => {}
            }
        }

        if tool_calls.is_empty() {
            json!({ "role": role, "content": text })
        } else {
            json!({
                "role": role,
                "content": if text.is_empty() { Value::Null } else { Value::String(text) },
                "tool_calls": tool_calls,
            })
        }
    }

    fn request_body(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
        tools: Option<&[ToolSpec]>,
    ) -> Value {
        let messages: Vec<Value> = history.iter().map(Self::message).collect();
        let mut body = json!({ "model": self.model_name, "messages": messages });

        if let Some(cfg) = config {
            if let Some(temperature) = cfg.temperature {
                body["temperature"] = json!(temperature);
            }
            if let Some(max_tokens) = cfg.max_output_tokens {
                body["max_tokens"] = json!(max_tokens);
            }
            if let Some(top_p) = cfg.top_p {
                body["top_p"] = json!(top_p);
            }
        }

        if let Some(tools) = tools.filter(|t| !t.is_empty()) {
            let specs: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = Value::Array(specs);
            body["tool_choice"] = json!("auto");
        }

        body
    }

    fn parse_response(response: &Value) -> Result<Content, ModelError> {
        let message = response["choices"]
            .as_array()
            .and_then(|c| c.first())
            .map(|choice| &choice["message"])
            .ok_or_else(|| ModelError::InvalidResponse("no choices in OpenAI response".into()))?;

        let mut parts = Vec::new();
        if let Some(text) = message["content"].as_str().filter(|t| !t.is_empty()) {
            parts.push(Part::Text(text.to_string()));
        }
        for call in message["tool_calls"].as_array().into_iter().flatten() {
            let name = call["function"]["name"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            let args = call["function"]["arguments"]
                .as_str()
                .and_then(|raw| serde_json::from_str(raw).ok())
                .unwrap_or_else(|| json!({}));
            parts.push(Part::FunctionCall { name, args });
        }

        Ok(Content {
            role: "model".to_string(),
            parts,
        })
    }
}

#[async_trait]
impl Model for OpenAIModel {
    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
        tools: Option<&[ToolSpec]>,
    ) -> Result<Content, ModelError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(history, config, tools);
        log::debug!("OpenAI request to {} with {} messages", url, history.len());

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await?;
            return Err(ModelError::api("OpenAI", format!("{}: {}", status, text)));
        }

        let json: Value = resp.json().await?;
        log::debug!("OpenAI response: {}", json);
        Self::parse_response(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> OpenAIModel {
        OpenAIModel::with_base_url("gpt-4o-mini", "test-key", "http://localhost")
    }

    #[test]
    fn test_roles_are_mapped() {
        assert_eq!(OpenAIModel::message(&Content::system("s"))["role"], "system");
        assert_eq!(OpenAIModel::message(&Content::user("u"))["role"], "user");
        let msg = OpenAIModel::message(&Content::model("m"));
        assert_eq!(msg["role"], "assistant");
        assert_eq!(msg["content"], "m");
    }

    #[test]
    fn test_function_call_message() {
        let content = Content {
            role: "model".to_string(),
            parts: vec![Part::FunctionCall {
                name: "handoff_to_agent".to_string(),
                args: json!({"agent": "writer"}),
            }],
        };
        let msg = OpenAIModel::message(&content);
        assert!(msg["content"].is_null());
        assert_eq!(msg["tool_calls"][0]["function"]["name"], "handoff_to_agent");
    }

    #[test]
    fn test_request_body_includes_tools_and_config() {
        let tools = vec![ToolSpec {
            name: "lookup".into(),
            description: "Look something up".into(),
            parameters: json!({"type": "object"}),
        }];
        let config = GenerationConfig {
            temperature: Some(0.5),
            max_output_tokens: Some(256),
            ..Default::default()
        };
        let body = model().request_body(&[Content::user("hi")], Some(&config), Some(&tools));

        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["tools"][0]["function"]["name"], "lookup");
        assert_eq!(body["tool_choice"], "auto");

        let bare = model().request_body(&[Content::user("hi")], None, Some(&[]));
        assert!(bare.get("tools").is_none());
    }

    #[test]
    fn test_parse_text_and_tool_calls() {
        let response = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "thinking out loud",
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": { "name": "lookup", "arguments": "{\"q\": \"rust\"}" }
                    }]
                }
            }]
        });
        let content = OpenAIModel::parse_response(&response).unwrap();
        assert_eq!(content.parts.len(), 2);
        assert_eq!(
            content.parts[1],
            Part::FunctionCall {
                name: "lookup".into(),
                args: json!({"q": "rust"})
            }
        );
    }

    #[test]
    fn test_parse_rejects_missing_choices() {
        let err = OpenAIModel::parse_response(&json!({"error": "nope"})).unwrap_err();
        assert!(matches!(err, ModelError::InvalidResponse(_)));
    }
}
