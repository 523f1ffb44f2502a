//! `Tool` trait, shared execution context, and the registry the MCP server
//! dispatches `tools/call` requests through.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use tern_facts::FactStore;
use tern_reason::ReasoningEngine;
use tern_session::{PageLauncher, SessionManager};

use crate::envelope::ToolResponse;
use crate::error::ToolError;
use crate::tools::{act, mangle, observe, reason};

/// Everything a tool handler needs: the fact store, the reasoning engine
/// built over it, and the session manager. Cheap to clone — every field is
/// an `Arc`.
#[derive(Clone)]
pub struct ToolContext {
    pub facts: Arc<FactStore>,
    pub reasoning: Arc<ReasoningEngine>,
    pub sessions: Arc<SessionManager>,
    pub gate_ttl_ms: i64,
    /// Opens new browser targets for `act`'s `session_create`/
    /// `session_attach` operations. `None` in contexts that never need to
    /// mint new sessions (most test setups), in which case those
    /// operations fail with a validation error rather than panicking.
    pub launcher: Option<Arc<dyn PageLauncher>>,
    /// Poll interval for `wait`/`await_*` operations, config `poll_interval_ms`.
    pub poll_interval_ms: u64,
}

impl ToolContext {
    pub fn new(facts: Arc<FactStore>, reasoning: Arc<ReasoningEngine>, sessions: Arc<SessionManager>) -> Self {
        Self {
            facts,
            reasoning,
            sessions,
            gate_ttl_ms: 600_000,
            launcher: None,
            poll_interval_ms: 200,
        }
    }

    pub fn with_gate_ttl_ms(mut self, ttl_ms: i64) -> Self {
        self.gate_ttl_ms = ttl_ms;
        self
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn PageLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    pub fn with_poll_interval_ms(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }
}

/// One of the four progressive tools (`observe`, `act`, `reason`, `mangle`).
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn input_schema(&self) -> Value;
    async fn call(&self, ctx: &ToolContext, args: Value) -> ToolResponse;
}

/// Renders any `Tool::call` result to the JSON shape transported back over
/// MCP, folding `ToolError`s produced before an envelope could be built.
pub async fn dispatch_to_value(tool: &dyn Tool, ctx: &ToolContext, args: Value) -> Value {
    let response = tool.call(ctx, args).await;
    serde_json::to_value(&response).unwrap_or_else(|err| {
        warn!(tool = tool.name(), %err, "failed to serialize tool response");
        ToolError::Internal("failed to serialize tool response".to_string()).to_envelope()
    })
}

/// Owns the four tool implementations and dispatches `tools/call` by name.
pub struct ToolRegistry {
    ctx: ToolContext,
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new(ctx: ToolContext) -> Self {
        Self {
            ctx,
            tools: vec![
                Box::new(observe::ObserveTool),
                Box::new(act::ActTool),
                Box::new(reason::ReasonTool),
                Box::new(mangle::MangleTool),
            ],
        }
    }

    pub fn definitions(&self) -> Vec<(String, String, Value)> {
        self.tools
            .iter()
            .map(|t| (t.name().to_string(), t.description().to_string(), t.input_schema()))
            .collect()
    }

    pub async fn execute(&self, name: &str, arguments: &HashMap<String, Value>) -> Value {
        let args = Value::Object(serde_json::Map::from_iter(arguments.clone()));
        match self.tools.iter().find(|t| t.name() == name) {
            Some(tool) => dispatch_to_value(tool.as_ref(), &self.ctx, args).await,
            None => ToolError::Validation(format!("unknown tool: {name}")).to_envelope(),
        }
    }
}
