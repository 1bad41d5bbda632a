//! MCP (Model Context Protocol) server for the property tools.
//!
//! Exposes the same tool registry the chat agent uses, plus the listings
//! schema as a resource and a property-search prompt, over newline-delimited
//! JSON-RPC on stdio.

mod server;
pub mod types;

pub use server::McpServer;
