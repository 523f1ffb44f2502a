//! `mangle` — direct pass-through to Fact Store and Reasoning Engine
//! operations, for callers that need the raw substrate rather than one of
//! the other three tools' curated views.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use tern_facts::{Atom, Fact};
use tern_reason::Row;

use crate::dispatcher::{Tool, ToolContext};
use crate::envelope::{truncate_vec, Status, ToolResponse, View};
use crate::error::ToolError;
use crate::tools::{str_arg, str_arg_required, str_array_arg, u64_arg, view_arg};

const DEFAULT_LIMIT: usize = 200;
const DEFAULT_TIMEOUT_MS: u64 = 5_000;

fn atom_from_json(value: &Value) -> Option<Atom> {
    match value {
        Value::String(s) => Some(Atom::Str(s.clone())),
        Value::Bool(b) => Some(Atom::Bool(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Atom::Int(i))
            } else {
                n.as_f64().map(Atom::Float)
            }
        }
        _ => None,
    }
}

fn row_to_json(row: &Row) -> Value {
    Value::Object(row.iter().map(|(k, v)| (k.clone(), atom_to_json(v))).collect())
}

fn atom_to_json(atom: &Atom) -> Value {
    match atom {
        Atom::Str(s) => json!(s),
        Atom::Int(i) => json!(i),
        Atom::Float(f) => json!(f),
        Atom::Bool(b) => json!(b),
    }
}

fn fact_to_json(fact: &Fact) -> Value {
    json!({
        "predicate": fact.predicate,
        "args": fact.args.iter().map(atom_to_json).collect::<Vec<_>>(),
        "timestamp": fact.timestamp,
        "seq": fact.seq,
    })
}

/// A raw evidence handle's trailing key, decoded back to the predicate or
/// fact-store query it denotes. `reason`'s and `observe`'s handles follow
/// `<tool>:<session>:<key>`; `read` resolves `key` against the predicates
/// those tools are known to compose (`failed_requests` → `failed_request`,
/// `root_causes` → `root_cause`, anything else is tried as a literal
/// predicate name).
fn handle_predicate(key: &str) -> &str {
    match key {
        "failed_requests" => "failed_request",
        "root_causes" => "root_cause",
        "action_candidates" => "action_candidate",
        other => other,
    }
}

pub struct MangleTool;

#[async_trait]
impl Tool for MangleTool {
    fn name(&self) -> &'static str {
        "browser-mangle"
    }

    fn description(&self) -> &'static str {
        "Direct pass-through to fact-store and reasoning-engine operations: \
         query, temporal, evaluate, read, submit_rule, subscribe, push, \
         await_fact, await_conditions."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "op": { "type": "string", "enum": ["query","temporal","evaluate","read","submit_rule","subscribe","push","await_fact","await_conditions"] },
                "goal": { "type": "string" },
                "predicate": { "type": "string" },
                "predicates": { "type": "array", "items": { "type": "string" } },
                "since_ms": { "type": "integer" },
                "until_ms": { "type": "integer" },
                "handle": { "type": "string" },
                "rule": { "type": "string" },
                "facts": { "type": "array", "items": { "type": "object" } },
                "timeout_ms": { "type": "integer" },
                "limit": { "type": "integer", "minimum": 1 },
                "view": { "type": "string", "enum": ["summary","compact","full"] }
            },
            "required": ["op"]
        })
    }

    async fn call(&self, ctx: &ToolContext, args: Value) -> ToolResponse {
        let view = view_arg(&args);
        match self.handle(ctx, &args).await {
            Ok(response) => response,
            Err(err) => err.into_response(view),
        }
    }
}

impl MangleTool {
    async fn handle(&self, ctx: &ToolContext, args: &Value) -> Result<ToolResponse, ToolError> {
        let view = view_arg(args);
        let limit = u64_arg(args, "limit", DEFAULT_LIMIT as u64) as usize;
        let op = str_arg_required(args, "op")?;

        match op.as_str() {
            "query" => self.query(ctx, args, view, limit),
            "temporal" => self.temporal(ctx, args, view, limit),
            "evaluate" => self.evaluate(ctx, args, view, limit),
            "read" => self.read(ctx, args, view, limit),
            "submit_rule" => self.submit_rule(ctx, args, view),
            "subscribe" => self.subscribe(ctx, args, view, limit),
            "push" => self.push(ctx, args, view),
            "await_fact" => self.await_fact(ctx, args, view).await,
            "await_conditions" => self.await_conditions(ctx, args, view).await,
            other => Err(ToolError::Validation(format!("unknown mangle op: {other}"))),
        }
    }

    fn query(&self, ctx: &ToolContext, args: &Value, view: View, limit: usize) -> Result<ToolResponse, ToolError> {
        let goal = str_arg_required(args, "goal")?;
        let rows = ctx.reasoning.query(&goal)?;
        let (items, truncated) = truncate_vec(rows.iter().map(row_to_json).collect::<Vec<_>>(), limit);
        Ok(ToolResponse {
            success: true,
            status: Status::Ok,
            summary: format!("{} row(s) matched", rows.len()),
            view,
            data: Some(json!({ "rows": items, "rows_truncated": truncated })),
            evidence_handles: Vec::new(),
            truncated,
            next_step: None,
        })
    }

    fn temporal(&self, ctx: &ToolContext, args: &Value, view: View, limit: usize) -> Result<ToolResponse, ToolError> {
        let predicate = str_arg_required(args, "predicate")?;
        let since = args.get("since_ms").and_then(Value::as_i64);
        let until = args.get("until_ms").and_then(Value::as_i64);
        let facts = ctx.facts.temporal(&predicate, since, until);
        let (items, truncated) = truncate_vec(facts.iter().map(fact_to_json).collect::<Vec<_>>(), limit);
        Ok(ToolResponse {
            success: true,
            status: Status::Ok,
            summary: format!("{} fact(s) in window", facts.len()),
            view,
            data: Some(json!({ "facts": items, "facts_truncated": truncated })),
            evidence_handles: Vec::new(),
            truncated,
            next_step: None,
        })
    }

    fn evaluate(&self, ctx: &ToolContext, args: &Value, view: View, limit: usize) -> Result<ToolResponse, ToolError> {
        let predicate = str_arg_required(args, "predicate")?;
        let facts = ctx.reasoning.evaluate(&predicate);
        let (items, truncated) = truncate_vec(facts.iter().map(fact_to_json).collect::<Vec<_>>(), limit);
        Ok(ToolResponse {
            success: true,
            status: Status::Ok,
            summary: format!("{} derived fact(s) for {predicate}", facts.len()),
            view,
            data: Some(json!({ "facts": items, "facts_truncated": truncated })),
            evidence_handles: Vec::new(),
            truncated,
            next_step: None,
        })
    }

    /// Resolves an evidence handle of the form `<tool>:<session>:<key>`
    /// back to the facts it refers to, scoped to the session segment.
    fn read(&self, ctx: &ToolContext, args: &Value, view: View, limit: usize) -> Result<ToolResponse, ToolError> {
        let handle = str_arg_required(args, "handle")?;
        let mut parts = handle.splitn(3, ':');
        let (_tool, session_id, key) = match (parts.next(), parts.next(), parts.next()) {
            (Some(tool), Some(session), Some(key)) => (tool, session, key),
            _ => return Err(ToolError::Validation(format!("malformed evidence handle: {handle}"))),
        };
        let predicate = handle_predicate(key);
        let facts: Vec<Fact> = ctx
            .reasoning
            .evaluate(predicate)
            .into_iter()
            .filter(|f| f.args.first().and_then(Atom::as_str) == Some(session_id))
            .collect();
        let (items, truncated) = truncate_vec(facts.iter().map(fact_to_json).collect::<Vec<_>>(), limit);
        Ok(ToolResponse {
            success: true,
            status: Status::Ok,
            summary: format!("{} fact(s) behind handle {handle}", facts.len()),
            view,
            data: Some(json!({ "handle": handle, "facts": items, "facts_truncated": truncated })),
            evidence_handles: Vec::new(),
            truncated,
            next_step: None,
        })
    }

    fn submit_rule(&self, ctx: &ToolContext, args: &Value, view: View) -> Result<ToolResponse, ToolError> {
        let rule = str_arg_required(args, "rule")?;
        let added = ctx.reasoning.add_rule(&rule)?;
        Ok(ToolResponse::ok(format!("{added} rule statement(s) compiled"), view)
            .with_data(json!({ "added": added })))
    }

    /// MCP's request/response transport has no standing subscription
    /// channel, so `subscribe` returns the current snapshot a caller would
    /// otherwise have to poll for via repeated `evaluate` calls, rather
    /// than registering a persistent callback.
    fn subscribe(&self, ctx: &ToolContext, args: &Value, view: View, limit: usize) -> Result<ToolResponse, ToolError> {
        let predicate = str_arg_required(args, "predicate")?;
        let facts = ctx.reasoning.evaluate(&predicate);
        let (items, truncated) = truncate_vec(facts.iter().map(fact_to_json).collect::<Vec<_>>(), limit);
        Ok(ToolResponse {
            success: true,
            status: Status::Ok,
            summary: format!("snapshot of {} current match(es) for {predicate}", facts.len()),
            view,
            data: Some(json!({ "facts": items, "facts_truncated": truncated, "note": "point-in-time snapshot; re-subscribe to refresh" })),
            evidence_handles: Vec::new(),
            truncated,
            next_step: None,
        })
    }

    fn push(&self, ctx: &ToolContext, args: &Value, view: View) -> Result<ToolResponse, ToolError> {
        let raw = args
            .get("facts")
            .and_then(Value::as_array)
            .ok_or_else(|| ToolError::Validation("missing required field: facts".to_string()))?;
        let mut facts = Vec::with_capacity(raw.len());
        for entry in raw {
            let predicate = entry
                .get("predicate")
                .and_then(Value::as_str)
                .ok_or_else(|| ToolError::Validation("fact missing predicate".to_string()))?;
            let timestamp = entry.get("timestamp").and_then(Value::as_i64).unwrap_or_else(crate::tools::now_ms);
            let args = entry
                .get("args")
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(atom_from_json).collect())
                .unwrap_or_default();
            facts.push(Fact::new(predicate, args, timestamp));
        }
        let pushed = facts.len();
        ctx.reasoning.push_facts(facts);
        Ok(ToolResponse::ok(format!("{pushed} fact(s) pushed"), view).with_data(json!({ "pushed": pushed })))
    }

    async fn await_fact(&self, ctx: &ToolContext, args: &Value, view: View) -> Result<ToolResponse, ToolError> {
        let predicate = str_arg_required(args, "predicate")?;
        let timeout_ms = u64_arg(args, "timeout_ms", DEFAULT_TIMEOUT_MS);
        let matched = poll_until(ctx, &[predicate.clone()], timeout_ms).await;
        Ok(ToolResponse::ok(
            if matched { format!("{predicate} matched") } else { format!("timed out waiting for {predicate}") },
            view,
        )
        .with_data(json!({ "matched": matched })))
    }

    async fn await_conditions(&self, ctx: &ToolContext, args: &Value, view: View) -> Result<ToolResponse, ToolError> {
        let predicates = str_array_arg(args, "predicates");
        if predicates.is_empty() {
            return Err(ToolError::Validation("missing required field: predicates".to_string()));
        }
        let timeout_ms = u64_arg(args, "timeout_ms", DEFAULT_TIMEOUT_MS);
        let matched = poll_until(ctx, &predicates, timeout_ms).await;
        Ok(ToolResponse::ok(
            if matched { "all conditions matched".to_string() } else { "timed out waiting for conditions".to_string() },
            view,
        )
        .with_data(json!({ "matched": matched, "predicates": predicates })))
    }
}

async fn poll_until(ctx: &ToolContext, predicates: &[String], timeout_ms: u64) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
    loop {
        if predicates.iter().all(|p| !ctx.reasoning.evaluate(p).is_empty()) {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(ctx.poll_interval_ms)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tern_facts::FactStore;
    use tern_reason::ReasoningEngine;
    use tern_session::SessionManager;

    fn ctx() -> ToolContext {
        let facts = Arc::new(FactStore::new(1_000));
        let reasoning = Arc::new(ReasoningEngine::new(facts.clone()));
        let sessions = Arc::new(SessionManager::new());
        ToolContext::new(facts, reasoning, sessions)
    }

    #[tokio::test]
    async fn push_then_evaluate_round_trips() {
        let ctx = ctx();
        let tool = MangleTool;
        let push_args = json!({
            "op": "push",
            "facts": [{ "predicate": "navigation_event", "args": ["s1", "https://x"], "timestamp": 100 }]
        });
        let pushed = tool.call(&ctx, push_args).await;
        assert!(pushed.success);

        let eval_args = json!({ "op": "evaluate", "predicate": "current_url" });
        let response = tool.call(&ctx, eval_args).await;
        assert!(response.success);
        assert_eq!(response.data.unwrap()["facts"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn query_rejects_missing_goal() {
        let ctx = ctx();
        let tool = MangleTool;
        let response = tool.call(&ctx, json!({ "op": "query" })).await;
        assert!(!response.success);
    }

    #[tokio::test]
    async fn await_fact_times_out_when_never_satisfied() {
        let ctx = ctx();
        let tool = MangleTool;
        let response = tool
            .call(&ctx, json!({ "op": "await_fact", "predicate": "current_url", "timeout_ms": 50 }))
            .await;
        assert!(response.success);
        assert_eq!(response.data.unwrap()["matched"], json!(false));
    }
}
