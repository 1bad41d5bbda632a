//! Deterministic model stub for orchestration tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use super::{ChatMessage, ChatResponse, LlmClient, LlmError, ToolCall, ToolSchema};

/// Replays queued responses in order and records every request.
#[derive(Default)]
pub(crate) struct ScriptedLlm {
    responses: Mutex<VecDeque<Result<ChatResponse, LlmError>>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedLlm {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn then_tool_call(self, id: &str, name: &str, args: Value) -> Self {
        self.push(Ok(ChatResponse {
            content: None,
            tool_calls: Some(vec![ToolCall::new(id, name, &args)]),
        }))
    }

    pub(crate) fn then_answer(self, text: &str) -> Self {
        self.push(Ok(ChatResponse {
            content: Some(text.to_string()),
            tool_calls: None,
        }))
    }

    pub(crate) fn then_fail(self) -> Self {
        self.push(Err(LlmError::Status {
            status: 503,
            body: "service unavailable".to_string(),
        }))
    }

    pub(crate) fn then(self, response: ChatResponse) -> Self {
        self.push(Ok(response))
    }

    fn push(self, response: Result<ChatResponse, LlmError>) -> Self {
        self.responses
            .lock()
            .expect("scripted responses poisoned")
            .push_back(response);
        self
    }

    /// Messages sent on each call so far.
    pub(crate) fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().expect("scripted requests poisoned").clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn chat_completion(
        &self,
        _model: &str,
        messages: &[ChatMessage],
        _tools: Option<&[ToolSchema]>,
    ) -> Result<ChatResponse, LlmError> {
        self.requests
            .lock()
            .expect("scripted requests poisoned")
            .push(messages.to_vec());
        self.responses
            .lock()
            .expect("scripted responses poisoned")
            .pop_front()
            .unwrap_or(Err(LlmError::EmptyResponse))
    }
}
