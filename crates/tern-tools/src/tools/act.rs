//! `act` — executes an ordered sequence of browser operations against a
//! session, emitting the facts each operation produces so subsequent
//! observations and derivations see its effect.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use tern_facts::Fact;
use tern_session::{Fingerprint, PageController, Session};

use crate::dispatcher::{Tool, ToolContext};
use crate::envelope::{Status, ToolResponse, View};
use crate::error::{ScriptErrorKind, ToolError};
use crate::gate::{check_gate, GateReason, GateRequest};
use crate::tools::{now_ms, session_id_arg, suggested_input_value, view_arg, DEFAULT_QUIET_MS};

const DEFAULT_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Operation {
    Navigate {
        url: String,
    },
    Interact {
        #[serde(rename = "ref")]
        r: String,
        #[serde(default)]
        action: Option<String>,
    },
    Fill {
        #[serde(rename = "ref")]
        #[serde(default)]
        r: Option<String>,
        #[serde(default)]
        value: Option<String>,
        #[serde(default)]
        fields: Vec<FieldFill>,
        #[serde(default)]
        submit_button: Option<String>,
    },
    Key {
        key: String,
        #[serde(default)]
        modifiers: Vec<String>,
    },
    History {
        direction: String,
    },
    Sleep {
        ms: u64,
    },
    SessionCreate {},
    SessionAttach {
        target_id: String,
    },
    SessionFork {
        #[serde(default)]
        source_session_id: Option<String>,
    },
    Wait {
        #[serde(default)]
        condition: Option<String>,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
    AwaitStable {
        #[serde(default)]
        quiet_ms: Option<u64>,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
    AwaitFact {
        predicate: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
    AwaitConditions {
        predicates: Vec<String>,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
    Js {
        script: String,
        #[serde(default)]
        gate_reason: Option<String>,
        #[serde(default)]
        approved_by_handle: Option<String>,
    },
    Plan {
        #[serde(rename = "ref")]
        #[serde(default)]
        r: Option<String>,
    },
}

#[derive(Debug, Clone, serde::Deserialize)]
struct FieldFill {
    #[serde(rename = "ref")]
    r: String,
    #[serde(default)]
    value: Option<String>,
}

fn escape_attr(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Resolves an element reference to a CSS selector, walking the priority
/// list: `testid:`/`aria:` prefixes, then the fingerprint's
/// `data-testid` / `aria-label` / `id` / `name`, then the raw ref as a
/// literal selector.
fn resolve_selector(session: &Session, raw_ref: &str) -> (String, Option<Fingerprint>) {
    if let Some(testid) = raw_ref.strip_prefix("testid:") {
        return (format!("[data-testid=\"{}\"]", escape_attr(testid)), None);
    }
    if let Some(aria) = raw_ref.strip_prefix("aria:") {
        return (format!("[aria-label=\"{}\"]", escape_attr(aria)), None);
    }
    match session.registry.get_current(raw_ref) {
        Ok(fp) => {
            let selector = if let Some(testid) = &fp.data_testid {
                format!("[data-testid=\"{}\"]", escape_attr(testid))
            } else if let Some(aria) = &fp.aria_label {
                format!("[aria-label=\"{}\"]", escape_attr(aria))
            } else if let Some(id) = &fp.id {
                format!("#{}", escape_attr(id))
            } else if let Some(name) = &fp.name {
                format!("[name=\"{}\"]", escape_attr(name))
            } else {
                raw_ref.to_string()
            };
            (selector, Some(fp))
        }
        Err(_) => (raw_ref.to_string(), None),
    }
}

/// What a `describe` query reports back about a live element, trimmed to
/// the fields a [`Fingerprint`] diff needs.
#[derive(Debug, Default, serde::Deserialize)]
struct DescribedElement {
    #[serde(default)]
    tag_name: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    classes: Vec<String>,
    #[serde(default)]
    text_content: String,
    #[serde(default)]
    bounding_box: DescribedBoundingBox,
}

#[derive(Debug, Default, serde::Deserialize)]
struct DescribedBoundingBox {
    #[serde(default)]
    x: f64,
    #[serde(default)]
    y: f64,
    #[serde(default)]
    width: f64,
    #[serde(default)]
    height: f64,
}

/// Re-fetches `selector` and diffs it against `stored`, reporting drift
/// without treating it as fatal (mismatches become a warning, not an
/// abort).
async fn validate_drift(page: &dyn PageController, selector: &str, stored: &Fingerprint) -> Option<tern_session::DriftReport> {
    let query = json!({ "op": "describe", "selector": selector }).to_string();
    let value = page.evaluate(&query).await.ok()?;
    let described: DescribedElement = serde_json::from_value(value).ok()?;
    let observed = Fingerprint {
        tag_name: described.tag_name,
        id: described.id,
        name: stored.name.clone(),
        aria_label: stored.aria_label.clone(),
        data_testid: stored.data_testid.clone(),
        role: stored.role.clone(),
        classes: described.classes,
        bounding_box: tern_session::BoundingBox {
            x: described.bounding_box.x,
            y: described.bounding_box.y,
            width: described.bounding_box.width,
            height: described.bounding_box.height,
        },
        text_content: described.text_content,
        alt_selectors: stored.alt_selectors.clone(),
        generated_at: chrono::Utc::now(),
        generation_id: stored.generation_id,
    };
    Some(stored.diff(&observed))
}

pub struct ActTool;

#[async_trait]
impl Tool for ActTool {
    fn name(&self) -> &'static str {
        "browser-act"
    }

    fn description(&self) -> &'static str {
        "Executes an ordered sequence of browser operations (navigate, \
         interact, fill, key, history, sleep, session management, waits, \
         and gated raw script evaluation) against a session."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "session_id": { "type": "string", "description": "Required unless the first operation is session_create" },
                "operations": { "type": "array", "items": { "type": "object" } },
                "stop_on_error": { "type": "boolean", "default": true },
                "view": { "type": "string", "enum": ["summary","compact","full"] }
            },
            "required": ["operations"]
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

impl ActTool {
    async fn handle(&self, ctx: &ToolContext, args: &Value) -> Result<ToolResponse, ToolError> {
        let view = view_arg(args);
        let stop_on_error = args.get("stop_on_error").and_then(Value::as_bool).unwrap_or(true);
        let operations: Vec<Operation> = args
            .get("operations")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| ToolError::Validation(format!("invalid operations: {e}")))?
            .ok_or_else(|| ToolError::Validation("missing required field: operations".to_string()))?;

        let mut session_id = session_id_arg(args).ok();
        let mut results = Vec::with_capacity(operations.len());
        let mut any_failed = false;
        let mut any_warning = false;

        for (index, op) in operations.into_iter().enumerate() {
            let outcome = self.execute(ctx, &mut session_id, &op).await;
            let failed = !outcome.success;
            if matches!(outcome.status, OutcomeStatus::Warning) {
                any_warning = true;
            }
            results.push(json!({
                "index": index,
                "type": op_type_name(&op),
                "success": outcome.success,
                "detail": outcome.detail,
            }));
            if failed {
                any_failed = true;
                if stop_on_error {
                    break;
                }
            }
        }

        let status = if any_failed {
            Status::Error
        } else if any_warning {
            Status::Warning
        } else {
            Status::Ok
        };
        let summary = format!("{} operation(s) executed", results.len());
        Ok(ToolResponse {
            success: !any_failed,
            status,
            summary,
            view,
            data: Some(json!({ "session_id": session_id, "operations": results })),
            evidence_handles: Vec::new(),
            truncated: false,
            next_step: None,
        })
    }

    async fn execute(&self, ctx: &ToolContext, session_id: &mut Option<String>, op: &Operation) -> Outcome {
        match op {
            Operation::SessionCreate {} => self.session_create(ctx, session_id).await,
            Operation::SessionAttach { target_id } => self.session_attach(ctx, session_id, target_id).await,
            Operation::SessionFork { source_session_id } => {
                self.session_fork(ctx, session_id, source_session_id.as_deref()).await
            }
            other => {
                let Some(sid) = session_id.clone() else {
                    return Outcome::error("operation requires an active session_id");
                };
                let session = match ctx.sessions.get(&sid) {
                    Ok(s) => s,
                    Err(e) => return Outcome::error(&e.to_string()),
                };
                match other {
                    Operation::Navigate { url } => self.navigate(ctx, &session, &sid, url).await,
                    Operation::Interact { r, action } => self.interact(ctx, &session, &sid, r, action.as_deref()).await,
                    Operation::Fill { r, value, fields, submit_button } => {
                        if !fields.is_empty() || submit_button.is_some() {
                            self.fill_many(ctx, &session, &sid, fields, submit_button.as_deref()).await
                        } else {
                            let Some(r) = r else {
                                return Outcome::error("fill requires either ref or fields");
                            };
                            self.fill(ctx, &session, &sid, r, value.as_deref()).await
                        }
                    }
                    Operation::Key { key, modifiers } => self.key(ctx, &session, &sid, key, modifiers).await,
                    Operation::History { direction } => self.history(&session, direction).await,
                    Operation::Sleep { ms } => {
                        tokio::time::sleep(Duration::from_millis(*ms)).await;
                        Outcome::ok(json!({ "slept_ms": ms }))
                    }
                    Operation::Wait { condition, timeout_ms } => self.wait(ctx, &sid, condition.as_deref(), *timeout_ms).await,
                    Operation::AwaitStable { quiet_ms, timeout_ms } => {
                        self.await_stable(ctx, &sid, *quiet_ms, *timeout_ms).await
                    }
                    Operation::AwaitFact { predicate, timeout_ms } => {
                        self.await_fact(ctx, &sid, predicate, *timeout_ms).await
                    }
                    Operation::AwaitConditions { predicates, timeout_ms } => {
                        self.await_conditions(ctx, &sid, predicates, *timeout_ms).await
                    }
                    Operation::Js { script, gate_reason, approved_by_handle } => {
                        self.js(ctx, &session, &sid, script, gate_reason.as_deref(), approved_by_handle.as_deref())
                            .await
                    }
                    Operation::Plan { r } => self.plan(ctx, &session, &sid, r.as_deref()).await,
                    Operation::SessionCreate {} | Operation::SessionAttach { .. } | Operation::SessionFork { .. } => {
                        unreachable!("handled above")
                    }
                }
            }
        }
    }

    async fn session_create(&self, ctx: &ToolContext, session_id: &mut Option<String>) -> Outcome {
        let Some(launcher) = &ctx.launcher else {
            return Outcome::error("no page launcher configured for this process");
        };
        match launcher.launch().await {
            Ok(page) => {
                let session = ctx.sessions.create(Arc::from(page));
                *session_id = Some(session.id.clone());
                Outcome::ok(json!({ "session_id": session.id }))
            }
            Err(e) => Outcome::error(&e.to_string()),
        }
    }

    async fn session_attach(&self, ctx: &ToolContext, session_id: &mut Option<String>, target_id: &str) -> Outcome {
        let Some(launcher) = &ctx.launcher else {
            return Outcome::error("no page launcher configured for this process");
        };
        match launcher.attach(target_id).await {
            Ok(page) => {
                let session = ctx.sessions.attach(Arc::from(page));
                *session_id = Some(session.id.clone());
                Outcome::ok(json!({ "session_id": session.id }))
            }
            Err(e) => Outcome::error(&e.to_string()),
        }
    }

    async fn session_fork(&self, ctx: &ToolContext, session_id: &mut Option<String>, source: Option<&str>) -> Outcome {
        let Some(source_id) = source.map(str::to_string).or_else(|| session_id.clone()) else {
            return Outcome::error("session_fork requires a source session");
        };
        match ctx.sessions.fork(&source_id).await {
            Ok(forked) => {
                *session_id = Some(forked.id.clone());
                Outcome::ok(json!({ "session_id": forked.id, "forked_from": source_id }))
            }
            Err(e) => Outcome::error(&e.to_string()),
        }
    }

    async fn navigate(&self, ctx: &ToolContext, session: &Session, session_id: &str, url: &str) -> Outcome {
        if let Err(e) = session.page().navigate(url).await {
            return Outcome::error(&e.to_string());
        }
        ctx.facts.push(vec![Fact::new(
            "navigation_event",
            vec![session_id.into(), url.into()],
            now_ms(),
        )]);
        Outcome::ok(json!({ "url": url }))
    }

    async fn interact(&self, ctx: &ToolContext, session: &Session, session_id: &str, raw_ref: &str, action: Option<&str>) -> Outcome {
        let (selector, fingerprint) = resolve_selector(session, raw_ref);
        let action = action.unwrap_or("click");

        if action == "submit" {
            if let Ok(rows) = ctx.reasoning.query("current_url(S, Url)") {
                if let Some(url) = rows
                    .into_iter()
                    .find(|r| r.get("S").and_then(|a| a.as_str()) == Some(session_id))
                    .and_then(|r| r.get("Url").map(|a| a.to_string()))
                {
                    let t = now_ms();
                    ctx.facts.push(vec![Fact::new(
                        "url_before_submit",
                        vec![session_id.into(), url.into(), t.into()],
                        t,
                    )]);
                }
            }
        }

        let script = json!({ "op": "interact", "selector": selector, "action": action }).to_string();
        if let Err(e) = session.page().evaluate(&script).await {
            return Outcome::error(&e.to_string());
        }

        let t = now_ms();
        let mut emitted = vec![Fact::new("user_click", vec![session_id.into(), raw_ref.into()], t)];
        if action == "submit" {
            emitted.push(Fact::new("form_submitted", vec![session_id.into(), raw_ref.into()], t));
        }
        ctx.facts.push(emitted);

        if let Some(fp) = fingerprint {
            if let Some(drift) = validate_drift(session.page().as_ref(), &selector, &fp).await {
                if !drift.changes.is_empty() {
                    return Outcome {
                        success: true,
                        status: OutcomeStatus::Warning,
                        detail: json!({ "ref": raw_ref, "action": action, "drift": drift }),
                    };
                }
            }
        }

        Outcome::ok(json!({ "ref": raw_ref, "action": action }))
    }

    async fn fill(&self, ctx: &ToolContext, session: &Session, session_id: &str, raw_ref: &str, value: Option<&str>) -> Outcome {
        let (selector, fingerprint) = resolve_selector(session, raw_ref);
        let value = match value {
            Some(v) => v.to_string(),
            None => {
                let label = fingerprint
                    .as_ref()
                    .map(|fp| {
                        if fp.text_content.is_empty() {
                            fp.aria_label.clone().unwrap_or_default()
                        } else {
                            fp.text_content.clone()
                        }
                    })
                    .unwrap_or_default();
                suggested_input_value(&label).0
            }
        };

        let script = json!({ "op": "fill", "selector": selector, "value": value }).to_string();
        if let Err(e) = session.page().evaluate(&script).await {
            return Outcome::error(&e.to_string());
        }

        ctx.facts.push(vec![
            Fact::new("user_type", vec![session_id.into(), raw_ref.into(), (value.len() as i64).into()], now_ms()),
            Fact::new("form_field_filled", vec![session_id.into(), raw_ref.into()], now_ms()),
        ]);
        Outcome::ok(json!({ "ref": raw_ref }))
    }

    /// Fills each of `fields` in order, then — if `submit_button` is given —
    /// interacts with it as a `submit`, which itself captures
    /// `url_before_submit` and emits `form_submitted` + `user_click`.
    async fn fill_many(
        &self,
        ctx: &ToolContext,
        session: &Session,
        session_id: &str,
        fields: &[FieldFill],
        submit_button: Option<&str>,
    ) -> Outcome {
        let mut succeeded = 0usize;
        let mut failures = Vec::new();
        for field in fields {
            let outcome = self.fill(ctx, session, session_id, &field.r, field.value.as_deref()).await;
            if outcome.success {
                succeeded += 1;
            } else {
                failures.push(json!({ "ref": field.r, "detail": outcome.detail }));
            }
        }

        if !failures.is_empty() {
            return Outcome {
                success: false,
                status: OutcomeStatus::Error,
                detail: json!({ "succeeded": succeeded, "failed": failures }),
            };
        }

        if let Some(submit_ref) = submit_button {
            let outcome = self.interact(ctx, session, session_id, submit_ref, Some("submit")).await;
            if !outcome.success {
                return Outcome {
                    success: false,
                    status: outcome.status,
                    detail: json!({ "succeeded": succeeded, "submit": outcome.detail }),
                };
            }
        }

        Outcome::ok(json!({ "succeeded": succeeded, "submit_button": submit_button }))
    }

    async fn key(&self, ctx: &ToolContext, session: &Session, session_id: &str, key: &str, modifiers: &[String]) -> Outcome {
        let script = json!({ "op": "key", "key": key, "modifiers": modifiers }).to_string();
        if let Err(e) = session.page().evaluate(&script).await {
            return Outcome::error(&e.to_string());
        }
        ctx.facts.push(vec![Fact::new(
            "user_key",
            vec![session_id.into(), key.into()],
            now_ms(),
        )]);
        Outcome::ok(json!({ "key": key }))
    }

    async fn history(&self, session: &Session, direction: &str) -> Outcome {
        let script = json!({ "op": "history", "direction": direction }).to_string();
        match session.page().evaluate(&script).await {
            Ok(_) => Outcome::ok(json!({ "direction": direction })),
            Err(e) => Outcome::error(&e.to_string()),
        }
    }

    async fn wait(&self, ctx: &ToolContext, session_id: &str, condition: Option<&str>, timeout_ms: Option<u64>) -> Outcome {
        let timeout = Duration::from_millis(timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS));
        let Some(condition) = condition else {
            tokio::time::sleep(timeout).await;
            return Outcome::ok(json!({ "waited_ms": timeout.as_millis() }));
        };
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Ok(rows) = ctx.reasoning.query(condition) {
                if rows.iter().any(|r| r.get("S").map(|a| a.as_str() == Some(session_id)).unwrap_or(true)) {
                    return Outcome::ok(json!({ "matched": true }));
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Outcome::error("wait timed out");
            }
            tokio::time::sleep(Duration::from_millis(ctx.poll_interval_ms)).await;
        }
    }

    async fn await_stable(&self, ctx: &ToolContext, session_id: &str, quiet_ms: Option<u64>, timeout_ms: Option<u64>) -> Outcome {
        let quiet_ms = quiet_ms.map(|v| v as i64).unwrap_or(DEFAULT_QUIET_MS);
        let timeout = Duration::from_millis(timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS));
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let last_update = ctx
                .facts
                .by_predicate_and_key("dom_updated", session_id)
                .into_iter()
                .map(|f| f.timestamp)
                .max();
            let stable = match last_update {
                Some(ts) => now_ms() - ts >= quiet_ms,
                None => true,
            };
            if stable {
                return Outcome::ok(json!({ "stable": true }));
            }
            if tokio::time::Instant::now() >= deadline {
                return Outcome::error("await_stable timed out");
            }
            tokio::time::sleep(Duration::from_millis(ctx.poll_interval_ms)).await;
        }
    }

    async fn await_fact(&self, ctx: &ToolContext, session_id: &str, predicate: &str, timeout_ms: Option<u64>) -> Outcome {
        let predicates = vec![predicate.to_string()];
        self.await_conditions(ctx, session_id, &predicates, timeout_ms).await
    }

    async fn await_conditions(&self, ctx: &ToolContext, session_id: &str, predicates: &[String], timeout_ms: Option<u64>) -> Outcome {
        let timeout = Duration::from_millis(timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS));
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let all_present = predicates.iter().all(|predicate| {
                ctx.reasoning
                    .evaluate(predicate)
                    .iter()
                    .any(|f| f.args.first().and_then(|a| a.as_str()) == Some(session_id))
            });
            if all_present {
                return Outcome::ok(json!({ "matched": predicates }));
            }
            if tokio::time::Instant::now() >= deadline {
                return Outcome::error(&format!("timed out waiting for {predicates:?}"));
            }
            tokio::time::sleep(Duration::from_millis(ctx.poll_interval_ms)).await;
        }
    }

    async fn js(
        &self,
        ctx: &ToolContext,
        session: &Session,
        session_id: &str,
        script: &str,
        gate_reason: Option<&str>,
        approved_by_handle: Option<&str>,
    ) -> Outcome {
        let request = GateRequest {
            gate_reason: gate_reason.and_then(GateReason::parse),
            approved_by_handle: approved_by_handle.map(str::to_string),
        };
        if let Err(denied) = check_gate(&ctx.facts, session_id, &request, ctx.gate_ttl_ms) {
            return Outcome {
                success: false,
                status: OutcomeStatus::Error,
                detail: json!({
                    "gated": true,
                    "required_reasons": denied.required_reasons,
                    "recommended_tool": denied.recommended_tool,
                }),
            };
        }

        match session.page().evaluate(script).await {
            Ok(result) => Outcome::ok(json!({ "result": result })),
            Err(e) => {
                let message = e.to_string();
                let kind = if message.to_lowercase().contains("timeout") {
                    ScriptErrorKind::Timeout
                } else if message.to_lowercase().contains("syntax") {
                    ScriptErrorKind::Syntax
                } else {
                    ScriptErrorKind::Runtime
                };
                let err = ToolError::Script { kind, message };
                Outcome {
                    success: false,
                    status: OutcomeStatus::Error,
                    detail: err.to_envelope(),
                }
            }
        }
    }

    async fn plan(&self, ctx: &ToolContext, session: &Session, session_id: &str, requested_ref: Option<&str>) -> Outcome {
        let candidates = crate::tools::dedup_action_candidates(crate::tools::action_candidates(&ctx.reasoning, session_id));
        let chosen = match requested_ref {
            Some(r) => candidates.into_iter().find(|c| c.ref_id == r),
            None => candidates.into_iter().max_by_key(|c| c.priority),
        };
        let Some(candidate) = chosen else {
            return Outcome::error("no action candidate available to plan");
        };
        match candidate.action.as_str() {
            "fill" => {
                let (value, requires_user_input) = suggested_input_value(&candidate.label);
                let outcome = self.fill(ctx, session, session_id, &candidate.ref_id, Some(value.as_str())).await;
                if requires_user_input {
                    return Outcome {
                        success: outcome.success,
                        status: OutcomeStatus::Warning,
                        detail: json!({ "ref": candidate.ref_id, "requires_user_input": true }),
                    };
                }
                outcome
            }
            _ => self.interact(ctx, session, session_id, &candidate.ref_id, Some(candidate.action.as_str())).await,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutcomeStatus {
    Ok,
    Warning,
    Error,
}

struct Outcome {
    success: bool,
    status: OutcomeStatus,
    detail: Value,
}

impl Outcome {
    fn ok(detail: Value) -> Self {
        Self { success: true, status: OutcomeStatus::Ok, detail }
    }

    fn error(message: &str) -> Self {
        Self {
            success: false,
            status: OutcomeStatus::Error,
            detail: json!({ "error": message }),
        }
    }
}

fn op_type_name(op: &Operation) -> &'static str {
    match op {
        Operation::Navigate { .. } => "navigate",
        Operation::Interact { .. } => "interact",
        Operation::Fill { .. } => "fill",
        Operation::Key { .. } => "key",
        Operation::History { .. } => "history",
        Operation::Sleep { .. } => "sleep",
        Operation::SessionCreate {} => "session_create",
        Operation::SessionAttach { .. } => "session_attach",
        Operation::SessionFork { .. } => "session_fork",
        Operation::Wait { .. } => "wait",
        Operation::AwaitStable { .. } => "await_stable",
        Operation::AwaitFact { .. } => "await_fact",
        Operation::AwaitConditions { .. } => "await_conditions",
        Operation::Js { .. } => "js",
        Operation::Plan { .. } => "plan",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tern_facts::FactStore;
    use tern_reason::ReasoningEngine;
    use tern_session::{PageError, SessionManager};

    struct FakePage {
        navigations: AtomicUsize,
    }

    #[async_trait]
    impl PageController for FakePage {
        fn target_id(&self) -> &str {
            "t1"
        }
        async fn navigate(&self, _url: &str) -> Result<(), PageError> {
            self.navigations.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn evaluate(&self, _script: &str) -> Result<Value, PageError> {
            Ok(Value::Null)
        }
        async fn fork(&self) -> Result<Box<dyn PageController>, PageError> {
            Ok(Box::new(FakePage { navigations: AtomicUsize::new(0) }))
        }
        async fn close(&self) -> Result<(), PageError> {
            Ok(())
        }
        async fn screenshot(&self) -> Result<Vec<u8>, PageError> {
            Ok(Vec::new())
        }
    }

    fn test_ctx() -> (ToolContext, String) {
        let facts = Arc::new(FactStore::new(1_000));
        let reasoning = Arc::new(ReasoningEngine::new(facts.clone()));
        let sessions = Arc::new(SessionManager::new());
        let session = sessions.create(Arc::new(FakePage { navigations: AtomicUsize::new(0) }));
        let session_id = session.id.clone();
        (ToolContext::new(facts, reasoning, sessions), session_id)
    }

    #[tokio::test]
    async fn navigate_pushes_navigation_event() {
        let (ctx, session_id) = test_ctx();
        let tool = ActTool;
        let args = json!({
            "session_id": session_id,
            "operations": [{ "type": "navigate", "url": "https://example.com" }]
        });
        let response = tool.call(&ctx, args).await;
        assert!(response.success);
        assert_eq!(ctx.facts.by_predicate("navigation_event").len(), 1);
    }

    #[tokio::test]
    async fn stop_on_error_halts_remaining_operations() {
        let (ctx, _session_id) = test_ctx();
        let tool = ActTool;
        let args = json!({
            "operations": [
                { "type": "interact", "ref": "btn-1" },
                { "type": "navigate", "url": "https://example.com" }
            ]
        });
        let response = tool.call(&ctx, args).await;
        assert!(!response.success);
        let ops = response.data.unwrap()["operations"].as_array().unwrap().len();
        assert_eq!(ops, 1);
    }

    #[tokio::test]
    async fn js_denied_without_gate_reason() {
        let (ctx, session_id) = test_ctx();
        let tool = ActTool;
        let args = json!({
            "session_id": session_id,
            "operations": [{ "type": "js", "script": "1+1" }]
        });
        let response = tool.call(&ctx, args).await;
        assert!(!response.success);
    }

    #[tokio::test]
    async fn batch_fill_with_submit_button_fills_all_fields_then_submits() {
        let (ctx, session_id) = test_ctx();
        let tool = ActTool;
        let args = json!({
            "session_id": session_id,
            "operations": [{
                "type": "fill",
                "fields": [
                    { "ref": "input-email", "value": "u@e.com" },
                    { "ref": "input-pass", "value": "p" }
                ],
                "submit_button": "btn-login"
            }]
        });
        let response = tool.call(&ctx, args).await;
        assert!(response.success);
        assert_eq!(ctx.facts.by_predicate("form_field_filled").len(), 2);
        assert_eq!(ctx.facts.by_predicate("form_submitted").len(), 1);
        assert_eq!(ctx.facts.by_predicate("user_click").len(), 1);
        let ops = response.data.unwrap()["operations"].clone();
        assert_eq!(ops[0]["detail"]["succeeded"], json!(2));
    }

    #[tokio::test]
    async fn submit_interaction_emits_user_click_and_form_submitted() {
        let (ctx, session_id) = test_ctx();
        let tool = ActTool;
        let args = json!({
            "session_id": session_id,
            "operations": [{ "type": "interact", "ref": "btn-login", "action": "submit" }]
        });
        let response = tool.call(&ctx, args).await;
        assert!(response.success);
        assert_eq!(ctx.facts.by_predicate("user_click").len(), 1);
        assert_eq!(ctx.facts.by_predicate("form_submitted").len(), 1);
    }

    #[tokio::test]
    async fn fill_without_explicit_value_uses_suggested_placeholder() {
        let (ctx, session_id) = test_ctx();
        let tool = ActTool;
        let args = json!({
            "session_id": session_id,
            "operations": [{ "type": "fill", "ref": "email-1" }]
        });
        let response = tool.call(&ctx, args).await;
        assert!(response.success);
        assert_eq!(ctx.facts.by_predicate("form_field_filled").len(), 1);
    }
}
