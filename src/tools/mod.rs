//! Query tools the agent (or an MCP client) can call against the property store.
//!
//! Every tool is read-only, takes a JSON object of keyword arguments and
//! returns structured JSON. Argument problems are reported as
//! [`ToolError::InvalidArgument`] before any SQL is built.

mod args;
mod deals;
mod schema;
mod search;
mod stats;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::llm::ToolSchema;
use crate::store::{PropertyStore, StoreError};

pub use args::SearchArgs;
pub use deals::{haversine_km, FindBestDeals};
pub use schema::DescribeSchema;
pub use search::{SearchProperties, DEFAULT_SEARCH_LIMIT, MAX_SEARCH_LIMIT};
pub use stats::PropertyStatistics;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("tool execution failed: {0}")]
    Execution(#[from] StoreError),
}

impl ToolError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::UnknownTool(_) => "unknown_tool",
            Self::Execution(_) => "tool_execution_failure",
        }
    }

    /// Structured form handed back to the model.
    pub fn to_json(&self) -> Value {
        json!({
            "error": self.kind(),
            "message": self.to_string(),
        })
    }
}

/// A named, typed, read-only operation.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema of the accepted arguments.
    fn parameters_schema(&self) -> Value;

    async fn execute(&self, args: Value, store: &PropertyStore) -> Result<Value, ToolError>;
}

/// Name and description of a registered tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Fixed set of tools bound to one property store.
#[derive(Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    store: PropertyStore,
}

impl ToolRegistry {
    /// Registry with every built-in tool.
    pub fn new(store: PropertyStore) -> Self {
        Self::with_tools(
            store,
            vec![
                Arc::new(SearchProperties),
                Arc::new(PropertyStatistics),
                Arc::new(FindBestDeals),
                Arc::new(DescribeSchema),
            ],
        )
    }

    pub fn with_tools(store: PropertyStore, tools: Vec<Arc<dyn Tool>>) -> Self {
        Self { tools, store }
    }

    pub fn store(&self) -> &PropertyStore {
        &self.store
    }

    pub fn list_tools(&self) -> Vec<ToolInfo> {
        self.tools
            .iter()
            .map(|t| ToolInfo {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }

    /// Tool definitions in chat-completions function format.
    pub fn get_tool_schemas(&self) -> Vec<ToolSchema> {
        self.tools
            .iter()
            .map(|t| ToolSchema::function(t.name(), t.description(), t.parameters_schema()))
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    /// Execute a tool by name.
    pub async fn execute(&self, name: &str, args: Value) -> Result<Value, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        tracing::info!(tool = name, args = %args, "Executing tool");
        let result = tool.execute(args, &self.store).await;
        match &result {
            Ok(_) => tracing::debug!(tool = name, "Tool succeeded"),
            Err(e) => tracing::warn!(tool = name, kind = e.kind(), error = %e, "Tool failed"),
        }
        result
    }
}
