//! MCP server over newline-delimited stdio.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use url::Url;

use super::types::*;
use crate::store::LISTINGS_TABLE;
use crate::tools::{ToolError, ToolRegistry};

const SCHEMA_URI: &str = "schema://database";
const LISTINGS_SCHEME: &str = "listings";
const LISTINGS_TEMPLATE: &str = "listings://query{?location,min_bedrooms,min_bathrooms,\
max_price,near_mosque,halal_financing,property_type,limit}";
const SEARCH_PROMPT: &str = "property_search";

/// MCP server bound to one tool registry.
pub struct McpServer {
    tools: ToolRegistry,
    initialized: bool,
}

impl McpServer {
    pub fn new(tools: ToolRegistry) -> Self {
        Self {
            tools,
            initialized: false,
        }
    }

    /// Serve requests from `reader` until EOF, writing responses to `writer`.
    pub async fn run<R, W>(&mut self, reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        tracing::info!("MCP server starting");
        let mut lines = reader.lines();

        while let Some(line) = lines.next_line().await? {
            if let Some(response) = self.handle_line(&line).await {
                let mut out = serde_json::to_string(&response)?;
                out.push('\n');
                writer.write_all(out.as_bytes()).await?;
                writer.flush().await?;
            }
        }

        tracing::info!("MCP input closed, shutting down");
        Ok(())
    }

    /// Handle one line of input. Returns `None` when no response is due.
    pub async fn handle_line(&mut self, line: &str) -> Option<JsonRpcResponse> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "Unparseable MCP message");
                return Some(JsonRpcResponse::error(
                    None,
                    PARSE_ERROR,
                    format!("Parse error: {e}"),
                ));
            }
        };

        let id = value.get("id").cloned().filter(|id| !id.is_null());
        let request: JsonRpcRequest = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(e) => {
                return Some(JsonRpcResponse::error(
                    id,
                    INVALID_REQUEST,
                    format!("Invalid request: {e}"),
                ))
            }
        };

        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::error(
                request.id,
                INVALID_REQUEST,
                format!("Unsupported jsonrpc version: {}", request.jsonrpc),
            ));
        }

        tracing::debug!(method = %request.method, id = ?request.id, "MCP request");
        if request.is_notification() {
            if request.method == "notifications/initialized" || request.method == "initialized" {
                self.initialized = true;
            }
            return None;
        }
        Some(self.handle_request(request).await)
    }

    async fn handle_request(&mut self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone();
        let result = match request.method.as_str() {
            "initialize" => Ok(self.handle_initialize()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.handle_tools_list()),
            "tools/call" => self.handle_tools_call(request.params).await,
            "resources/list" => Ok(handle_resources_list()),
            "resources/templates/list" => Ok(handle_resource_templates_list()),
            "resources/read" => self.handle_resources_read(request.params).await,
            "prompts/list" => Ok(handle_prompts_list()),
            "prompts/get" => handle_prompts_get(request.params),
            other => Err((METHOD_NOT_FOUND, format!("Method not found: {other}"))),
        };

        match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err((code, message)) => {
                tracing::debug!(code, %message, "MCP error response");
                JsonRpcResponse::error(id, code, message)
            }
        }
    }

    fn handle_initialize(&mut self) -> Value {
        self.initialized = true;
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": { "listChanged": false },
                "resources": { "listChanged": false, "subscribe": false },
                "prompts": { "listChanged": false }
            },
            "serverInfo": {
                "name": "realestate-mcp",
                "version": env!("CARGO_PKG_VERSION")
            }
        })
    }

    fn handle_tools_list(&self) -> Value {
        let tools: Vec<Value> = self
            .tools
            .list_tools()
            .into_iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "inputSchema": t.parameters,
                })
            })
            .collect();
        json!({ "tools": tools })
    }

    async fn handle_tools_call(&self, params: Value) -> Result<Value, (i64, String)> {
        let params: CallToolParams = parse_params(params)?;
        let arguments = match params.arguments {
            Value::Null => json!({}),
            other => other,
        };

        let result = match self.tools.execute(&params.name, arguments).await {
            Ok(value) => {
                let text = serde_json::to_string_pretty(&value)
                    .unwrap_or_else(|_| value.to_string());
                CallToolResult::text(text, false)
            }
            Err(e) => CallToolResult::text(e.to_json().to_string(), true),
        };
        to_value(result)
    }

    async fn handle_resources_read(&self, params: Value) -> Result<Value, (i64, String)> {
        let params: ReadResourceParams = parse_params(params)?;
        if params.uri == SCHEMA_URI {
            return self.read_schema().await;
        }

        match Url::parse(&params.uri) {
            Ok(url) if url.scheme() == LISTINGS_SCHEME && url.host_str() == Some("query") => {
                self.read_listings(&url).await
            }
            _ => Err((INVALID_PARAMS, format!("Unknown resource: {}", params.uri))),
        }
    }

    /// `listings://query?...`: a search over the listings with the query
    /// parameters as `search_properties` arguments.
    async fn read_listings(&self, url: &Url) -> Result<Value, (i64, String)> {
        let args = listings_query_args(url)?;
        let value = self
            .tools
            .execute("search_properties", args)
            .await
            .map_err(|e| match e {
                ToolError::InvalidArgument(message) => (INVALID_PARAMS, message),
                other => (INTERNAL_ERROR, other.to_string()),
            })?;

        let text = serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
        to_value(json!({
            "contents": [ResourceContents {
                uri: url.to_string(),
                mime_type: "application/json".to_string(),
                text,
            }]
        }))
    }

    async fn read_schema(&self) -> Result<Value, (i64, String)> {
        let columns = self
            .tools
            .store()
            .columns()
            .await
            .map_err(|e| (INTERNAL_ERROR, e.to_string()))?;

        let mut text = format!("Database Schema:\n\nTable: {LISTINGS_TABLE}\n");
        for column in &columns {
            text.push_str(&format!(
                "- {} ({}){}{}\n",
                column.name,
                column.data_type,
                if column.primary_key { " PRIMARY KEY" } else { "" },
                if column.nullable { "" } else { " NOT NULL" },
            ));
        }

        to_value(json!({
            "contents": [ResourceContents {
                uri: SCHEMA_URI.to_string(),
                mime_type: "text/plain".to_string(),
                text,
            }]
        }))
    }
}

fn handle_resources_list() -> Value {
    json!({
        "resources": [Resource {
            uri: SCHEMA_URI.to_string(),
            name: "Database Schema".to_string(),
            description: "Columns of the property listings table".to_string(),
            mime_type: "text/plain".to_string(),
        }]
    })
}

fn handle_resource_templates_list() -> Value {
    json!({
        "resourceTemplates": [ResourceTemplate {
            uri_template: LISTINGS_TEMPLATE.to_string(),
            name: "Listings Query".to_string(),
            description: "Property listings matching the query parameters, cheapest first"
                .to_string(),
            mime_type: "application/json".to_string(),
        }]
    })
}

/// Convert `listings://query` parameters into `search_properties` arguments.
fn listings_query_args(url: &Url) -> Result<Value, (i64, String)> {
    let mut args = Map::new();
    for (key, raw) in url.query_pairs() {
        let value = match key.as_ref() {
            "location" | "property_type" => Value::String(raw.to_string()),
            "near_mosque" | "halal_financing" => raw
                .parse::<bool>()
                .map(Value::Bool)
                .map_err(|_| invalid_value(&key, &raw))?,
            "min_bedrooms" | "min_bathrooms" | "limit" => raw
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| invalid_value(&key, &raw))?,
            "max_price" => raw
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(Value::from)
                .ok_or_else(|| invalid_value(&key, &raw))?,
            other => {
                return Err((INVALID_PARAMS, format!("Unknown query parameter: {other}")));
            }
        };
        if args.insert(key.to_string(), value).is_some() {
            return Err((INVALID_PARAMS, format!("Repeated query parameter: {key}")));
        }
    }
    Ok(Value::Object(args))
}

fn invalid_value(key: &str, raw: &str) -> (i64, String) {
    (INVALID_PARAMS, format!("Invalid value for {key}: {raw}"))
}

fn handle_prompts_list() -> Value {
    json!({
        "prompts": [Prompt {
            name: SEARCH_PROMPT.to_string(),
            description: "Set up a property search conversation".to_string(),
        }]
    })
}

fn handle_prompts_get(params: Value) -> Result<Value, (i64, String)> {
    let params: GetPromptParams = parse_params(params)?;
    if params.name != SEARCH_PROMPT {
        return Err((INVALID_PARAMS, format!("Unknown prompt: {}", params.name)));
    }

    let guidance = "You are a helpful real estate support agent. Use the available tools \
to help the user find their ideal property.\n\n\
Tools:\n\
- search_properties: find listings by location, bedrooms, bathrooms, budget, \
mosque proximity, halal financing and property type\n\
- property_statistics: counts and average, minimum or maximum prices, optionally grouped\n\
- find_best_deals: the cheapest listings under a budget, optionally near a reference point\n\
- describe_schema: the columns of the listings table\n\n\
Resources:\n\
- schema://database: the listings schema\n\
- listings://query?location=...&min_bedrooms=...&max_price=...: matching listings";

    to_value(json!({
        "description": "Property search assistant",
        "messages": [
            PromptMessage {
                role: "user".to_string(),
                content: Content::Text { text: guidance.to_string() },
            },
            PromptMessage {
                role: "assistant".to_string(),
                content: Content::Text {
                    text: "How can I help you find your perfect property today?".to_string(),
                },
            },
        ]
    }))
}

fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, (i64, String)> {
    serde_json::from_value(params).map_err(|e| (INVALID_PARAMS, format!("Invalid params: {e}")))
}

fn to_value<T: Serialize>(value: T) -> Result<Value, (i64, String)> {
    serde_json::to_value(value).map_err(|e| (INTERNAL_ERROR, e.to_string()))
}
