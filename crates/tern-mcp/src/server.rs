//! MCP server implementation with stdin/stdout JSON-RPC handling.
//!
//! The same [`McpServer::handle`] entry point backs both the stdio loop
//! ([`McpServer::run`]) and the HTTP transport in [`crate::http`], so the
//! two transports can never drift in how they dispatch `tools/call`.

use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use thiserror::Error;
use tern_tools::ToolRegistry;
use tracing::{debug, error, info};

use crate::protocol::{
    CallToolParams, InitializeParams, InitializeResult, JsonRpcRequest, JsonRpcResponse,
    ListToolsResult, ServerCapabilities, ServerInfo, ToolDefinition, ToolsCapability,
};

/// Errors that can occur in the MCP server.
#[derive(Debug, Error)]
pub enum McpError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// MCP server that dispatches `tools/call` onto a [`ToolRegistry`].
///
/// `initialized` is an `AtomicBool` rather than a plain field because the
/// HTTP transport shares one server across concurrent requests behind an
/// `Arc`; the stdio transport (one request at a time) doesn't need the
/// atomicity but pays it happily.
pub struct McpServer {
    tools: ToolRegistry,
    initialized: AtomicBool,
}

impl McpServer {
    pub fn new(tools: ToolRegistry) -> Self {
        Self {
            tools,
            initialized: AtomicBool::new(false),
        }
    }

    /// Run the server, reading from stdin and writing to stdout.
    pub async fn run(&self) -> Result<(), McpError> {
        info!("MCP server starting");

        let stdin = io::stdin();
        let mut stdout = io::stdout();

        for line in stdin.lock().lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            debug!(request = %line, "received request");

            let request: JsonRpcRequest = match serde_json::from_str(&line) {
                Ok(req) => req,
                Err(e) => {
                    error!(error = %e, "failed to parse request");
                    let response =
                        JsonRpcResponse::error(None, -32700, format!("Parse error: {e}"));
                    writeln!(stdout, "{}", serde_json::to_string(&response)?)?;
                    stdout.flush()?;
                    continue;
                }
            };

            if let Some(response) = self.handle(request).await {
                let response_json = serde_json::to_string(&response)?;
                debug!(response = %response_json, "sending response");
                writeln!(stdout, "{}", response_json)?;
                stdout.flush()?;
            }
        }

        info!("MCP server shutting down");
        Ok(())
    }

    /// Dispatches one already-parsed JSON-RPC request and returns its
    /// response, or `None` for a notification (no `id`) — the one entry
    /// point both [`Self::run`] and [`crate::http::handle_mcp`] call
    /// through, so stdio and HTTP transports see identical behaviour.
    pub async fn handle(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.id.is_none() {
            self.handle_notification(&request);
            return None;
        }

        let result = self.handle_request(&request).await;
        Some(match result {
            Ok(value) => JsonRpcResponse::success(request.id, value),
            Err(e) => JsonRpcResponse::error(request.id, -32603, e),
        })
    }

    fn handle_notification(&self, request: &JsonRpcRequest) {
        match request.method.as_str() {
            "notifications/initialized" => debug!("client sent initialized notification"),
            "notifications/cancelled" => debug!("client cancelled request"),
            _ => debug!(method = %request.method, "unknown notification"),
        }
    }

    async fn handle_request(&self, request: &JsonRpcRequest) -> Result<Value, String> {
        match request.method.as_str() {
            "initialize" => self.handle_initialize(request),
            "tools/list" => self.handle_list_tools(),
            "tools/call" => self.handle_call_tool(request).await,
            _ => Err(format!("Unknown method: {}", request.method)),
        }
    }

    fn handle_initialize(&self, request: &JsonRpcRequest) -> Result<Value, String> {
        let _params: InitializeParams = request
            .params
            .as_ref()
            .map(|p| serde_json::from_value(p.clone()))
            .transpose()
            .map_err(|e| format!("Invalid initialize params: {e}"))?
            .ok_or("Missing initialize params")?;

        self.initialized.store(true, Ordering::Relaxed);

        let result = InitializeResult {
            protocol_version: "2024-11-05".to_string(),
            capabilities: ServerCapabilities {
                logging: None,
                prompts: None,
                resources: None,
                tools: Some(ToolsCapability {
                    list_changed: false,
                }),
            },
            server_info: ServerInfo {
                name: "tern".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        serde_json::to_value(result).map_err(|e| e.to_string())
    }

    fn handle_list_tools(&self) -> Result<Value, String> {
        let tools = self
            .tools
            .definitions()
            .into_iter()
            .map(|(name, description, input_schema)| ToolDefinition {
                name,
                description,
                input_schema,
            })
            .collect();
        let result = ListToolsResult { tools };
        serde_json::to_value(result).map_err(|e| e.to_string())
    }

    async fn handle_call_tool(&self, request: &JsonRpcRequest) -> Result<Value, String> {
        let params: CallToolParams = request
            .params
            .as_ref()
            .map(|p| serde_json::from_value(p.clone()))
            .transpose()
            .map_err(|e| format!("Invalid call params: {e}"))?
            .ok_or("Missing call params")?;

        debug!(tool = %params.name, "executing tool");

        let result = self.tools.execute(&params.name, &params.arguments).await;
        serde_json::to_value(result).map_err(|e| e.to_string())
    }
}
