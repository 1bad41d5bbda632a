//! Core agent loop implementation.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::config::Config;
use crate::llm::{ChatMessage, Decision, LlmClient, LlmError, OpenAiCompatClient, Role, ToolCall};
use crate::session::{FilterSelection, Speaker, Turn};
use crate::tools::{ToolError, ToolRegistry};

use super::prompt::{build_filter_context, build_system_prompt};

/// Shown when the hosted model cannot be reached.
pub const UPSTREAM_APOLOGY: &str =
    "🏠 Sorry, I couldn't reach the property assistant just now. Please try again in a moment.";

/// Shown when the model keeps calling tools past the round-trip bound.
pub const ITERATION_LIMIT_REPLY: &str = "🏠 I couldn't finish that search. Could you narrow it \
     down, for example with a location, a budget or a number of bedrooms?";

/// How a reply was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyOutcome {
    /// The model produced a final answer.
    Answered,
    /// The tool round-trip bound was reached first.
    IterationLimit,
    /// The hosted model failed; the reply is an apology.
    UpstreamUnavailable,
}

impl ReplyOutcome {
    /// Whether the exchange belongs in the transcript.
    pub fn is_complete(self) -> bool {
        !matches!(self, Self::UpstreamUnavailable)
    }
}

/// Record of one tool execution during a reply.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: Value,
    pub ok: bool,
    /// Result or error, truncated for display
    pub summary: String,
}

/// The agent's answer to one user message.
#[derive(Debug, Clone, Serialize)]
pub struct AgentReply {
    pub content: String,
    pub outcome: ReplyOutcome,
    /// Model round-trips used
    pub iterations: usize,
    pub tool_calls: Vec<ToolInvocation>,
}

/// The property search agent.
pub struct Agent {
    llm: Arc<dyn LlmClient>,
    tools: ToolRegistry,
    model: String,
    max_iterations: usize,
    history_turns: usize,
}

impl Agent {
    /// Create an agent backed by the configured OpenAI-compatible endpoint.
    pub fn new(config: &Config, tools: ToolRegistry) -> Result<Self, LlmError> {
        let llm = Arc::new(OpenAiCompatClient::new(&config.llm)?);
        Ok(Self::with_client(config, llm, tools))
    }

    /// Create an agent with an explicit model client.
    pub fn with_client(config: &Config, llm: Arc<dyn LlmClient>, tools: ToolRegistry) -> Self {
        Self {
            llm,
            tools,
            model: config.llm.model.clone(),
            max_iterations: config.max_iterations.max(1),
            history_turns: config.history_turns,
        }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Answer `message` given the prior conversation and, when the user
    /// enabled them, the sidebar filters.
    ///
    /// Never fails: model errors become an apology and tool errors are handed
    /// back to the model.
    pub async fn respond(
        &self,
        history: &[Turn],
        message: &str,
        filters: Option<&FilterSelection>,
    ) -> AgentReply {
        let mut messages = self.build_messages(history, message, filters);
        let tool_schemas = self.tools.get_tool_schemas();
        let mut invocations = Vec::new();

        for iteration in 0..self.max_iterations {
            tracing::debug!("Agent iteration {}", iteration + 1);

            let response = match self
                .llm
                .chat_completion(&self.model, &messages, Some(&tool_schemas))
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(error = %e, iteration = iteration + 1, "Model call failed");
                    return AgentReply {
                        content: UPSTREAM_APOLOGY.to_string(),
                        outcome: ReplyOutcome::UpstreamUnavailable,
                        iterations: iteration + 1,
                        tool_calls: invocations,
                    };
                }
            };

            match response.decision() {
                Decision::ToolCalls(tool_calls) => {
                    messages.push(ChatMessage {
                        role: Role::Assistant,
                        content: response.content.clone(),
                        tool_calls: Some(tool_calls.clone()),
                        tool_call_id: None,
                    });

                    for tool_call in &tool_calls {
                        let (result, invocation) = self.execute_tool_call(tool_call).await;
                        invocations.push(invocation);
                        messages.push(ChatMessage::tool_result(tool_call.id.clone(), result));
                    }
                }
                Decision::FinalAnswer(content) => {
                    tracing::info!(
                        iterations = iteration + 1,
                        tool_calls = invocations.len(),
                        "Agent answered"
                    );
                    return AgentReply {
                        content,
                        outcome: ReplyOutcome::Answered,
                        iterations: iteration + 1,
                        tool_calls: invocations,
                    };
                }
                Decision::Empty => {
                    tracing::warn!(iteration = iteration + 1, "Model returned an empty response");
                    return AgentReply {
                        content: UPSTREAM_APOLOGY.to_string(),
                        outcome: ReplyOutcome::UpstreamUnavailable,
                        iterations: iteration + 1,
                        tool_calls: invocations,
                    };
                }
            }
        }

        tracing::warn!(
            max_iterations = self.max_iterations,
            "Max iterations reached without an answer"
        );
        AgentReply {
            content: ITERATION_LIMIT_REPLY.to_string(),
            outcome: ReplyOutcome::IterationLimit,
            iterations: self.max_iterations,
            tool_calls: invocations,
        }
    }

    fn build_messages(
        &self,
        history: &[Turn],
        message: &str,
        filters: Option<&FilterSelection>,
    ) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(build_system_prompt(&self.tools))];

        if let Some(filters) = filters.filter(|f| f.use_filters) {
            messages.push(ChatMessage::system(build_filter_context(filters)));
        }

        let start = history.len().saturating_sub(self.history_turns);
        messages.extend(history[start..].iter().map(|turn| match turn.speaker {
            Speaker::User => ChatMessage::user(turn.content.clone()),
            Speaker::Assistant => ChatMessage::assistant(turn.content.clone()),
        }));

        messages.push(ChatMessage::user(message));
        messages
    }

    /// Execute a single tool call, returning the message content for the
    /// model and a log record.
    async fn execute_tool_call(&self, tool_call: &ToolCall) -> (String, ToolInvocation) {
        let name = tool_call.function.name.as_str();
        let raw = tool_call.function.arguments.trim();

        let parsed = if raw.is_empty() {
            Ok(Value::Null)
        } else {
            serde_json::from_str::<Value>(raw).map_err(|e| {
                ToolError::InvalidArgument(format!("arguments are not valid JSON: {e}"))
            })
        };
        let arguments = parsed.as_ref().cloned().unwrap_or(Value::Null);

        let result = match parsed {
            Ok(args) => self.tools.execute(name, args).await,
            Err(e) => Err(e),
        };

        let (content, ok) = match result {
            Ok(value) => (value.to_string(), true),
            Err(e) => (e.to_json().to_string(), false),
        };

        let invocation = ToolInvocation {
            name: name.to_string(),
            arguments,
            ok,
            summary: truncate_for_log(&content, 500),
        };
        (content, invocation)
    }
}

/// Truncate a string for logging purposes.
fn truncate_for_log(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated]", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::scripted::ScriptedLlm;
    use crate::llm::ChatResponse;
    use crate::store::fixtures::sample_store;
    use serde_json::json;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn agent(llm: Arc<ScriptedLlm>) -> (TempDir, Agent) {
        let (dir, store) = sample_store();
        let config = Config::new("test-key".to_string(), PathBuf::from("unused.db"));
        let agent = Agent::with_client(&config, llm, ToolRegistry::new(store));
        (dir, agent)
    }

    fn tool_messages(request: &[ChatMessage]) -> Vec<Value> {
        request
            .iter()
            .filter(|m| m.role == Role::Tool)
            .map(|m| serde_json::from_str(m.content.as_deref().unwrap()).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn tool_result_is_fed_back_before_the_answer() {
        let llm = Arc::new(
            ScriptedLlm::new()
                .then_tool_call(
                    "call_1",
                    "search_properties",
                    json!({"min_bedrooms": 3, "max_price": 500000, "near_mosque": true}),
                )
                .then_answer("I found a 3-bedroom home near a mosque for $480,000."),
        );
        let (_dir, agent) = agent(llm.clone());

        let reply = agent
            .respond(&[], "3-bedroom house near a mosque under $500,000", None)
            .await;

        assert_eq!(reply.outcome, ReplyOutcome::Answered);
        assert_eq!(reply.iterations, 2);
        assert_eq!(reply.tool_calls.len(), 1);
        assert!(reply.tool_calls[0].ok);
        assert!(reply.content.contains("$480,000"));

        let requests = llm.requests();
        assert_eq!(requests.len(), 2);
        let results = tool_messages(&requests[1]);
        assert_eq!(results[0]["count"], 1);
        assert_eq!(results[0]["listings"][0]["price"], 480000);
    }

    #[tokio::test]
    async fn model_failure_becomes_an_apology() {
        let llm = Arc::new(ScriptedLlm::new().then_fail());
        let (_dir, agent) = agent(llm);

        let reply = agent.respond(&[], "anything in Davis?", None).await;
        assert_eq!(reply.outcome, ReplyOutcome::UpstreamUnavailable);
        assert_eq!(reply.content, UPSTREAM_APOLOGY);
        assert!(!reply.outcome.is_complete());
    }

    #[tokio::test]
    async fn invalid_arguments_are_reported_to_the_model() {
        let llm = Arc::new(
            ScriptedLlm::new()
                .then_tool_call("call_1", "search_properties", json!({"min_bedrooms": -1}))
                .then_tool_call("call_2", "search_properties", json!({"min_bedrooms": 1}))
                .then_answer("Here are some options."),
        );
        let (_dir, agent) = agent(llm.clone());

        let reply = agent.respond(&[], "homes with -1 bedrooms", None).await;
        assert_eq!(reply.outcome, ReplyOutcome::Answered);
        assert!(!reply.tool_calls[0].ok);
        assert!(reply.tool_calls[1].ok);

        let errors = tool_messages(&llm.requests()[1]);
        assert_eq!(errors[0]["error"], "invalid_argument");
        assert!(!reply.content.contains("invalid_argument"));
    }

    #[tokio::test]
    async fn malformed_argument_json_is_an_invalid_argument() {
        let llm = Arc::new(
            ScriptedLlm::new()
                .then(ChatResponse {
                    content: None,
                    tool_calls: Some(vec![ToolCall {
                        id: "call_1".to_string(),
                        kind: "function".to_string(),
                        function: crate::llm::FunctionCall {
                            name: "search_properties".to_string(),
                            arguments: "{not json".to_string(),
                        },
                    }]),
                })
                .then_answer("Sorry, let me try that differently."),
        );
        let (_dir, agent) = agent(llm.clone());

        let reply = agent.respond(&[], "houses", None).await;
        assert_eq!(reply.outcome, ReplyOutcome::Answered);
        let errors = tool_messages(&llm.requests()[1]);
        assert_eq!(errors[0]["error"], "invalid_argument");
    }

    #[tokio::test]
    async fn loop_is_bounded() {
        let mut script = ScriptedLlm::new();
        for i in 0..10 {
            script = script.then_tool_call(&format!("call_{i}"), "describe_schema", json!({}));
        }
        let llm = Arc::new(script);
        let (_dir, agent) = agent(llm.clone());

        let reply = agent.respond(&[], "keep going", None).await;
        assert_eq!(reply.outcome, ReplyOutcome::IterationLimit);
        assert_eq!(reply.content, ITERATION_LIMIT_REPLY);
        assert_eq!(llm.requests().len(), 5);
        assert!(reply.outcome.is_complete());
    }

    #[tokio::test]
    async fn filters_are_forwarded_only_when_enabled() {
        let llm = Arc::new(ScriptedLlm::new().then_answer("ok").then_answer("ok"));
        let (_dir, agent) = agent(llm.clone());

        let mut filters = FilterSelection::default();
        agent.respond(&[], "hi", Some(&filters)).await;
        filters.use_filters = true;
        agent.respond(&[], "hi", Some(&filters)).await;

        let requests = llm.requests();
        let has_filter_block = |request: &[ChatMessage]| {
            request.iter().any(|m| {
                m.role == Role::System
                    && m.content
                        .as_deref()
                        .is_some_and(|c| c.starts_with("Property Search Details"))
            })
        };
        assert!(!has_filter_block(&requests[0]));
        assert!(has_filter_block(&requests[1]));
    }

    #[tokio::test]
    async fn only_recent_history_is_sent() {
        let llm = Arc::new(ScriptedLlm::new().then_answer("ok"));
        let (_dir, agent) = agent(llm.clone());

        let history: Vec<Turn> = (0..30)
            .map(|i| {
                if i % 2 == 0 {
                    Turn::user(format!("question {i}"))
                } else {
                    Turn::assistant(format!("answer {i}"))
                }
            })
            .collect();
        agent.respond(&history, "latest", None).await;

        let request = &llm.requests()[0];
        // system prompt + 10 history turns + new message
        assert_eq!(request.len(), 12);
        assert_eq!(request[1].content.as_deref(), Some("question 20"));
        assert_eq!(request[11].content.as_deref(), Some("latest"));
    }
}
