//! Agent module - turns chat messages into tool calls and answers.
//!
//! The agent follows a "tools in a loop" pattern:
//! 1. Build context with system prompt, optional filters and recent turns
//! 2. Call the model with the query tools
//! 3. If the model requests tool calls, execute them and feed results back
//! 4. Repeat until the model produces an answer or max iterations is reached

mod agent_loop;
mod prompt;

pub use agent_loop::{
    Agent, AgentReply, ReplyOutcome, ToolInvocation, ITERATION_LIMIT_REPLY, UPSTREAM_APOLOGY,
};
pub use prompt::{build_filter_context, build_system_prompt};
