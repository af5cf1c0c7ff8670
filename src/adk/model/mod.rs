// SPDX-License-Identifier: MIT

//! Model module - defines the LLM model trait and implementations
//!
//! This module provides the core Model trait and shared message types.
//! Model implementations are in their own submodules:
//! - [anthropic] - Anthropic's Messages API
//! - [openai] - OpenAI's Chat Completions API

pub mod anthropic;
pub mod openai;

use crate::adk::error::ModelError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Configuration for model generation
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GenerationConfig {
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn system(text: impl Into<String>) -> Self {
        Self::text("system", text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::text("user", text)
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self::text("model", text)
    }

    fn text(role: &str, text: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            parts: vec![Part::Text(text.into())],
        }
    }

    /// Concatenated text parts
    pub fn joined_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Parts of a message - text, thinking, function calls, etc.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Part {
    /// Regular text output from the model
    Text(String),
    /// Reasoning content from thinking models
    Thinking(String),
    /// Function call requested by the model
    FunctionCall { name: String, args: Value },
    /// Response to a function call
    FunctionResponse { name: String, response: Value },
}

/// A function the model may call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments
    pub parameters: Value,
}

/// Core trait for LLM model implementations
#[async_trait]
pub trait Model: Send + Sync {
    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
        tools: Option<&[ToolSpec]>,
    ) -> Result<Content, ModelError>;
}

/// Hosted model providers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAI,
    Anthropic,
}

impl Provider {
    /// Provider from `MODEL_PROVIDER`, falling back to the model name prefix
    pub fn infer(model_name: &str) -> Result<Self, ModelError> {
        match std::env::var("MODEL_PROVIDER") {
            Ok(provider) if !provider.is_empty() => provider.parse(),
            _ => Self::from_model_name(model_name),
        }
    }

    pub fn from_model_name(model_name: &str) -> Result<Self, ModelError> {
        const OPENAI_PREFIXES: [&str; 4] = ["gpt", "o1", "o3", "o4"];
        if OPENAI_PREFIXES.iter().any(|p| model_name.starts_with(p)) {
            Ok(Self::OpenAI)
        } else if model_name.starts_with("claude") {
            Ok(Self::Anthropic)
        } else {
            Err(ModelError::UnsupportedProvider(model_name.to_string()))
        }
    }

    /// Construct a client, reading credentials from the environment
    pub fn create(self, model_name: &str) -> Result<Arc<dyn Model>, ModelError> {
        log::info!("Using provider: {} with model: {}", self, model_name);
        Ok(match self {
            Self::OpenAI => Arc::new(openai::OpenAIModel::new(model_name)?),
            Self::Anthropic => Arc::new(anthropic::AnthropicModel::new(model_name)?),
        })
    }
}

impl FromStr for Provider {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "anthropic" => Ok(Self::Anthropic),
            _ => Err(ModelError::UnsupportedProvider(s.to_string())),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAI => f.write_str("OpenAI"),
            Self::Anthropic => f.write_str("Anthropic"),
        }
    }
}
