// SPDX-License-Identifier: MIT

//! LLM executor - an `AgentExecutor` that delegates to a language model
//!
//! The model sees its instruction as the system message and a single user
//! message built from the task text and the visible context. In swarm mode the
//! executor offers a `handoff_to_agent` function listing its peers; a call to
//! it turns into an [`ExecutorOutput::Handoff`].

use crate::adk::error::{ExecutorError, ModelError};
use crate::adk::executor::{AgentExecutor, ExecutorOutput, Handoff};
use crate::adk::model::{Content, GenerationConfig, Model, Part, ToolSpec};
use crate::kinetic::orchestration::context::ContextView;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use std::sync::Arc;

pub const HANDOFF_TOOL: &str = "handoff_to_agent";

static HANDOFF_PARAMETERS: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "properties": {
            "agent": {
                "type": "string",
                "description": "Name of the agent that should continue the task"
            },
            "message": {
                "type": "string",
                "description": "What the next agent needs to know"
            },
            "context_patch": {
                "type": "object",
                "description": "Key/value pairs to merge into the shared state"
            }
        },
        "required": ["agent", "message"]
    })
});

/// Executor backed by a [`Model`]
pub struct LlmExecutor {
    name: String,
    description: String,
    instruction: String,
    model: Arc<dyn Model>,
    generation_config: Option<GenerationConfig>,
}

impl LlmExecutor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        instruction: impl Into<String>,
        model: Arc<dyn Model>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            instruction: instruction.into(),
            model,
            generation_config: None,
        }
    }

    pub fn with_generation_config(mut self, config: GenerationConfig) -> Self {
        self.generation_config = Some(config);
        self
    }

    fn history(&self, task: &str, context: &ContextView) -> Vec<Content> {
        let mut prompt = task.to_string();

        if let Some(handoff) = context.handoff() {
            log::debug!("Agent {} received handoff from {}", self.name, handoff.from);
        }
        let rendered = context.render();
        if !rendered.is_empty() {
            prompt.push_str("\n\n## Context\n");
            prompt.push_str(&rendered);
        }

        let mut system = self.instruction.clone();
        if !context.peers().is_empty() {
            system.push_str(&format!(
                "\n\nYou are part of a team. If another agent is better suited to continue, \
                 call `{}`; otherwise answer directly.\nAgents:\n",
                HANDOFF_TOOL
            ));
            for peer in context.peers() {
                system.push_str(&format!("- {}: {}\n", peer.name, peer.description));
            }
        }

        vec![Content::system(system), Content::user(prompt)]
    }

    fn handoff_tool(context: &ContextView) -> Option<ToolSpec> {
        if context.peers().is_empty() {
            return None;
        }
        let names: Vec<&str> = context.peers().iter().map(|p| p.name.as_str()).collect();
        let mut parameters = HANDOFF_PARAMETERS.clone();
        parameters["properties"]["agent"]["enum"] = json!(names);
        Some(ToolSpec {
            name: HANDOFF_TOOL.to_string(),
            description: "Transfer the task to another agent".to_string(),
            parameters,
        })
    }

    fn interpret(&self, response: Content) -> Result<ExecutorOutput, ExecutorError> {
        let handoff = response.parts.iter().find_map(|part| match part {
            Part::FunctionCall { name, args } if name == HANDOFF_TOOL => Some(args),
            _ => None,
        });

        if let Some(args) = handoff {
            let target = args["agent"]
                .as_str()
                .filter(|t| !t.is_empty())
                .ok_or_else(|| {
                    ExecutorError::Model(ModelError::InvalidResponse(format!(
                        "{} call without an agent",
                        HANDOFF_TOOL
                    )))
                })?;
            let message = args["message"].as_str().unwrap_or_default();
            let mut handoff = Handoff::new(target, message);
            if let Some(patch) = args["context_patch"].as_object() {
                handoff.context_patch = patch.clone();
            }
            log::info!("Agent {} requests handoff to {}", self.name, target);
            return Ok(ExecutorOutput::Handoff(handoff));
        }

        let text = response.joined_text();
        let text = text.trim();
        if text.is_empty() {
            return Err(ExecutorError::failed(format!(
                "agent {} produced an empty response",
                self.name
            )));
        }

        Ok(match serde_json::from_str::<Value>(text) {
            Ok(value @ (Value::Object(_) | Value::Array(_))) => ExecutorOutput::Final(value),
            _ => ExecutorOutput::text(text),
        })
    }
}

#[async_trait]
impl AgentExecutor for LlmExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn invoke(
        &self,
        task: String,
        context: ContextView,
    ) -> Result<ExecutorOutput, ExecutorError> {
        let history = self.history(&task, &context);
        let tools: Vec<ToolSpec> = Self::handoff_tool(&context).into_iter().collect();

        log::info!(
            "Agent {} calling model with {} tools",
            self.name,
            tools.len()
        );
        let call = self.model.generate_content(
            &history,
            self.generation_config.as_ref(),
            Some(tools.as_slice()),
        );
        let response = tokio::select! {
            response = call => response?,
            _ = context.cancellation().cancelled() => {
                log::warn!("Agent {} abandoned its model call on cancellation", self.name);
                return Err(ExecutorError::Cancelled);
            }
        };

        self.interpret(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinetic::orchestration::context::PeerInfo;
    use std::sync::Mutex;

    /// Replays a canned response and records what it was asked
    struct ScriptedModel {
        reply: Content,
        seen: Mutex<Vec<(Vec<Content>, usize)>>,
    }

    impl ScriptedModel {
        fn new(reply: Content) -> Arc<Self> {
            Arc::new(Self {
                reply,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Model for ScriptedModel {
        async fn generate_content(
            &self,
            history: &[Content],
            _config: Option<&GenerationConfig>,
            tools: Option<&[ToolSpec]>,
        ) -> Result<Content, ModelError> {
            self.seen
                .lock()
                .unwrap()
                .push((history.to_vec(), tools.map_or(0, |t| t.len())));
            Ok(self.reply.clone())
        }
    }

    fn peers() -> Vec<PeerInfo> {
        vec![PeerInfo {
            name: "writer".into(),
            description: "Writes the final report".into(),
        }]
    }

    #[tokio::test]
    async fn test_text_answer_becomes_string_payload() {
        let model = ScriptedModel::new(Content::model("  The answer  "));
        let exec = LlmExecutor::new("analyst", "", "Analyse things", model.clone());

        let out = exec
            .invoke("What is 2+2?".into(), ContextView::new("What is 2+2?"))
            .await
            .unwrap();
        assert_eq!(out, ExecutorOutput::text("The answer"));

        let seen = model.seen.lock().unwrap();
        let (history, tool_count) = &seen[0];
        assert_eq!(history[0].joined_text(), "Analyse things");
        assert_eq!(history[1].joined_text(), "What is 2+2?");
        assert_eq!(*tool_count, 0);
    }

    #[tokio::test]
    async fn test_json_answer_becomes_structured_payload() {
        let model = ScriptedModel::new(Content::model(r#"{"intent": "refund"}"#));
        let exec = LlmExecutor::new("classify", "", "Classify", model);

        let out = exec.invoke("x".into(), ContextView::new("x")).await.unwrap();
        assert_eq!(out, ExecutorOutput::Final(json!({"intent": "refund"})));
    }

    #[tokio::test]
    async fn test_handoff_call_with_peers() {
        let model = ScriptedModel::new(Content {
            role: "model".into(),
            parts: vec![Part::FunctionCall {
                name: HANDOFF_TOOL.into(),
                args: json!({
                    "agent": "writer",
                    "message": "draft ready",
                    "context_patch": {"draft": 1}
                }),
            }],
        });
        let exec = LlmExecutor::new("researcher", "", "Research", model.clone());
        let view = ContextView::new("topic").with_peers(peers());

        let out = exec.invoke("topic".into(), view).await.unwrap();
        let ExecutorOutput::Handoff(handoff) = out else {
            panic!("expected handoff");
        };
        assert_eq!(handoff.target, "writer");
        assert_eq!(handoff.message, "draft ready");
        assert_eq!(handoff.context_patch["draft"], json!(1));

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen[0].1, 1);
        assert!(seen[0].0[0].joined_text().contains("- writer: Writes the final report"));
    }

    /// Never answers
    struct HangingModel;

    #[async_trait]
    impl Model for HangingModel {
        async fn generate_content(
            &self,
            _history: &[Content],
            _config: Option<&GenerationConfig>,
            _tools: Option<&[ToolSpec]>,
        ) -> Result<Content, ModelError> {
            futures::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_cancellation_abandons_model_call() {
        let exec = LlmExecutor::new("slow", "", "", Arc::new(HangingModel));
        let token = tokio_util::sync::CancellationToken::new();
        let view = ContextView::new("x").with_cancellation(token.clone());
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            exec.invoke("x".into(), view),
        )
        .await
        .expect("invoke should return once cancelled")
        .unwrap_err();
        assert!(matches!(err, ExecutorError::Cancelled));
    }

    #[tokio::test]
    async fn test_empty_response_fails() {
        let model = ScriptedModel::new(Content {
            role: "model".into(),
            parts: vec![],
        });
        let exec = LlmExecutor::new("quiet", "", "", model);
        let err = exec.invoke("x".into(), ContextView::new("x")).await.unwrap_err();
        assert!(err.to_string().contains("empty response"));
    }
}
