//! # Real Estate Assistant
//!
//! A conversational property search assistant over a local listings database.
//!
//! This library provides:
//! - Query tools over a read-only SQLite property store
//! - A tool-calling agent backed by an OpenAI-compatible chat endpoint
//! - Chat sessions with a transcript and a structured filter selection
//! - An HTTP API and chat page for the sessions
//! - An MCP server exposing the same tools over stdio
//!
//! ## Architecture
//!
//! The agent follows the "tools in a loop" pattern:
//! 1. Receive a message for a session via the API
//! 2. Build context with the system prompt, enabled filters and recent turns
//! 3. Call the model, execute any requested query tools
//! 4. Feed results back to the model, repeat until it answers
//!
//! ## Example
//!
//! ```rust,ignore
//! use realestate_assistant::{
//!     agent::Agent, config::Config, store::PropertyStore, tools::ToolRegistry,
//! };
//!
//! let config = Config::from_env()?;
//! let tools = ToolRegistry::new(PropertyStore::new(&config.store));
//! let agent = Agent::new(&config, tools)?;
//! let reply = agent.respond(&[], "3-bedroom house near a mosque under $500,000", None).await;
//! ```

pub mod agent;
pub mod api;
pub mod config;
pub mod llm;
pub mod mcp;
pub mod session;
pub mod store;
pub mod tools;

pub use config::Config;
