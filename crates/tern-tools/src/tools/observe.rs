//! `observe` — read-only inspection of a session's state, navigation
//! history, interactive/hidden elements, active sessions, or a screenshot.

use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};

use tern_facts::Fact;
use tern_session::{BoundingBox, Fingerprint, Session};

use crate::dispatcher::{Tool, ToolContext};
use crate::envelope::{evidence_handle, truncate_vec, NextStep, Status, ToolResponse, View};
use crate::error::ToolError;
use crate::gate::{check_gate, GateReason, GateRequest};
use crate::tools::{
    action_candidates, bool_arg, dedup_action_candidates, dedup_global_actions, global_actions,
    is_loading, now_ms, session_id_arg, str_arg, u64_arg, view_arg,
};

const MIN_PLANNING_SNAPSHOT: usize = 80;
const DEFAULT_ELEMENT_LIMIT: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    State,
    Nav,
    Interactive,
    Hidden,
    Composite,
    Sessions,
    Screenshot,
    React,
    DomSnapshot,
}

impl Mode {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "state" => Some(Mode::State),
            "nav" => Some(Mode::Nav),
            "interactive" => Some(Mode::Interactive),
            "hidden" => Some(Mode::Hidden),
            "composite" => Some(Mode::Composite),
            "sessions" => Some(Mode::Sessions),
            "screenshot" => Some(Mode::Screenshot),
            "react" => Some(Mode::React),
            "dom_snapshot" => Some(Mode::DomSnapshot),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Mode::State => "state",
            Mode::Nav => "nav",
            Mode::Interactive => "interactive",
            Mode::Hidden => "hidden",
            Mode::Composite => "composite",
            Mode::Sessions => "sessions",
            Mode::Screenshot => "screenshot",
            Mode::React => "react",
            Mode::DomSnapshot => "dom_snapshot",
        }
    }

    fn is_gated(self) -> bool {
        matches!(self, Mode::React | Mode::DomSnapshot)
    }

    fn wants_elements(self) -> bool {
        matches!(self, Mode::Interactive | Mode::Hidden | Mode::Composite)
    }
}

/// `intent` presets: `(mode, view, diagnostics, plan_actions)` defaults,
/// overridden field-by-field by whatever the caller explicitly supplied.
fn intent_defaults(intent: &str) -> Option<(Mode, View, bool, bool)> {
    match intent {
        "quick_status" => Some((Mode::State, View::Summary, true, false)),
        "find_actions" => Some((Mode::Interactive, View::Compact, false, true)),
        "map_navigation" => Some((Mode::Nav, View::Compact, false, false)),
        "hidden_content" => Some((Mode::Hidden, View::Compact, false, false)),
        "deep_audit" => Some((Mode::Composite, View::Full, true, true)),
        "check_sessions" => Some((Mode::Sessions, View::Compact, false, false)),
        "visual_check" => Some((Mode::Screenshot, View::Summary, false, false)),
        _ => None,
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct RawBoundingBox {
    #[serde(default)]
    x: f64,
    #[serde(default)]
    y: f64,
    #[serde(default)]
    width: f64,
    #[serde(default)]
    height: f64,
}

/// One element as reported by the page controller's snapshot query.
/// `tag_type` is the semantic classification the reasoning engine's
/// `interactive` facts join on (`button`, `submit`, `a`, `input`, or
/// anything else for non-actionable elements) — distinct from `tag_name`,
/// the raw DOM tag, which is only used for fingerprint display/diffing.
#[derive(Debug, Clone, Default, serde::Deserialize)]
struct RawElement {
    #[serde(default)]
    tag_name: String,
    #[serde(default)]
    tag_type: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    aria_label: Option<String>,
    #[serde(default)]
    data_testid: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    classes: Vec<String>,
    #[serde(default)]
    bounding_box: RawBoundingBox,
    #[serde(default)]
    text_content: String,
    #[serde(default)]
    alt_selectors: Vec<String>,
    #[serde(default)]
    href: Option<String>,
    #[serde(default)]
    hidden: bool,
    #[serde(default = "default_true")]
    enabled: bool,
}

fn default_true() -> bool {
    true
}

fn action_for_tag_type(tag_type: &str) -> Option<&'static str> {
    match tag_type {
        "button" => Some("click"),
        "submit" => Some("submit"),
        "a" => Some("navigate"),
        "input" => Some("fill"),
        _ => None,
    }
}

fn label_for(el: &RawElement, action: &str) -> String {
    if action == "navigate" {
        return el.href.clone().unwrap_or_else(|| el.text_content.clone());
    }
    if !el.text_content.is_empty() {
        return el.text_content.clone();
    }
    el.aria_label
        .clone()
        .or_else(|| el.data_testid.clone())
        .or_else(|| el.name.clone())
        .or_else(|| el.id.clone())
        .unwrap_or_default()
}

fn fingerprint_of(el: &RawElement) -> Fingerprint {
    Fingerprint {
        tag_name: if el.tag_name.is_empty() {
            el.tag_type.clone()
        } else {
            el.tag_name.clone()
        },
        id: el.id.clone(),
        name: el.name.clone(),
        aria_label: el.aria_label.clone(),
        data_testid: el.data_testid.clone(),
        role: el.role.clone(),
        classes: el.classes.clone(),
        bounding_box: BoundingBox {
            x: el.bounding_box.x,
            y: el.bounding_box.y,
            width: el.bounding_box.width,
            height: el.bounding_box.height,
        },
        text_content: el.text_content.clone(),
        alt_selectors: el.alt_selectors.clone(),
        generated_at: chrono::Utc::now(),
        generation_id: 0,
    }
}

/// Queries the page controller for a snapshot of DOM elements. The "query"
/// sent to `evaluate` is opaque to this crate — constructing and running
/// the actual in-page script is the browser driver's job (see
/// `tern_session::PageController`, an explicit non-goal boundary).
async fn fetch_snapshot(session: &Session, filter: &str, limit: usize) -> Result<Vec<RawElement>, ToolError> {
    let query = json!({ "op": "snapshot", "filter": filter, "limit": limit }).to_string();
    let value = session
        .page()
        .evaluate(&query)
        .await
        .map_err(|e| ToolError::Element(e.to_string()))?;
    let elements = match value {
        Value::Array(_) => serde_json::from_value::<Vec<RawElement>>(value).unwrap_or_default(),
        Value::Object(ref map) => map
            .get("elements")
            .cloned()
            .and_then(|v| serde_json::from_value::<Vec<RawElement>>(v).ok())
            .unwrap_or_default(),
        _ => Vec::new(),
    };
    Ok(elements)
}

/// Fetches a snapshot, registers every element's fingerprint (rewriting the
/// registry wholesale), and asserts `interactive`/`element_enabled` facts
/// for every actionable, visible element so `action_candidate` rules can
/// see them. Returns the new registry generation and the raw elements
/// paired with the refs they were registered under.
async fn snapshot_and_register(
    ctx: &ToolContext,
    session: &Session,
    session_id: &str,
    limit: usize,
) -> Result<(u64, Vec<(String, RawElement)>), ToolError> {
    let elements = fetch_snapshot(session, "all", limit.max(MIN_PLANNING_SNAPSHOT)).await?;
    let mut entries = Vec::with_capacity(elements.len());
    let mut interactive_facts = Vec::new();
    let mut refs = Vec::with_capacity(elements.len());
    let t = now_ms();

    for (idx, el) in elements.into_iter().enumerate() {
        let ref_id = format!("el-{idx}");
        entries.push((ref_id.clone(), fingerprint_of(&el)));
        if !el.hidden {
            if let Some(action) = action_for_tag_type(&el.tag_type) {
                let label = label_for(&el, action);
                interactive_facts.push(Fact::new(
                    "interactive",
                    vec![
                        session_id.into(),
                        ref_id.clone().into(),
                        el.tag_type.clone().into(),
                        label.into(),
                        action.into(),
                    ],
                    t,
                ));
                if el.enabled {
                    interactive_facts.push(Fact::new(
                        "element_enabled",
                        vec![session_id.into(), ref_id.clone().into()],
                        t,
                    ));
                }
            }
        }
        refs.push((ref_id, el));
    }

    let generation = session.registry.replace_all(entries);
    ctx.facts.push(interactive_facts);
    Ok((generation, refs))
}

fn element_summary(ref_id: &str, el: &RawElement) -> Value {
    json!({
        "ref": ref_id,
        "tag_type": el.tag_type,
        "label": if el.text_content.is_empty() { el.aria_label.clone().unwrap_or_default() } else { el.text_content.clone() },
        "enabled": el.enabled,
        "href": el.href,
    })
}

pub struct ObserveTool;

#[async_trait]
impl Tool for ObserveTool {
    fn name(&self) -> &'static str {
        "browser-observe"
    }

    fn description(&self) -> &'static str {
        "Inspect a session's state, navigation history, interactive or hidden \
         elements, active sessions, or a screenshot, with optional health \
         diagnostics and next-action planning."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "session_id": { "type": "string", "description": "Session to observe; ignored for mode=sessions" },
                "mode": { "type": "string", "enum": ["state","nav","interactive","hidden","composite","sessions","screenshot","react","dom_snapshot"] },
                "intent": { "type": "string", "enum": ["quick_status","find_actions","map_navigation","hidden_content","deep_audit","check_sessions","visual_check"] },
                "view": { "type": "string", "enum": ["summary","compact","full"] },
                "diagnostics": { "type": "boolean" },
                "plan_actions": { "type": "boolean" },
                "limit": { "type": "integer", "minimum": 1 },
                "save_path": { "type": "string", "description": "Where to write a mode=screenshot capture; defaults to ./screenshots/<session>_<unix>.png" },
                "gate_reason": { "type": "string", "enum": ["explicit_user_intent","low_confidence","contradiction_detected","no_matching_tool"] },
                "approved_by_handle": { "type": "string" }
            },
            "required": ["session_id"]
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

impl ObserveTool {
    async fn handle(&self, ctx: &ToolContext, args: &Value) -> Result<ToolResponse, ToolError> {
        let intent = str_arg(args, "intent").and_then(intent_defaults);
        let (mode_default, view_default, diag_default, plan_default) =
            intent.unwrap_or((Mode::Composite, View::Compact, false, false));
        let mode = str_arg(args, "mode").and_then(Mode::parse).unwrap_or(mode_default);
        let view = str_arg(args, "view").and_then(View::parse).unwrap_or(view_default);
        let diagnostics = args.get("diagnostics").map(|_| bool_arg(args, "diagnostics", diag_default)).unwrap_or(diag_default);
        let plan_actions = args.get("plan_actions").map(|_| bool_arg(args, "plan_actions", plan_default)).unwrap_or(plan_default);
        let limit = u64_arg(args, "limit", DEFAULT_ELEMENT_LIMIT as u64) as usize;

        if mode == Mode::Sessions {
            return Ok(self.observe_sessions(ctx, view));
        }

        let session_id = session_id_arg(args)?;

        if mode.is_gated() {
            let request = GateRequest {
                gate_reason: str_arg(args, "gate_reason").and_then(GateReason::parse),
                approved_by_handle: str_arg(args, "approved_by_handle").map(str::to_string),
            };
            if let Err(denied) = check_gate(&ctx.facts, &session_id, &request, ctx.gate_ttl_ms) {
                return Ok(denied.into_response(view));
            }
        }

        let session = ctx.sessions.get(&session_id)?;

        match mode {
            Mode::Screenshot => {
                let save_path = str_arg(args, "save_path").map(str::to_string);
                self.observe_screenshot(&session, view, save_path).await
            }
            Mode::React | Mode::DomSnapshot => self.observe_raw(&session, mode, view).await,
            _ => {
                self.observe_elements(ctx, &session, &session_id, mode, view, diagnostics, plan_actions, limit)
                    .await
            }
        }
    }

    fn observe_sessions(&self, ctx: &ToolContext, view: View) -> ToolResponse {
        let ids = ctx.sessions.list_ids();
        let summary = format!("{} active session(s)", ids.len());
        ToolResponse::ok(summary, view).with_data(json!({ "mode": "sessions", "sessions": ids }))
    }

    async fn observe_screenshot(
        &self,
        session: &Session,
        view: View,
        save_path: Option<String>,
    ) -> Result<ToolResponse, ToolError> {
        let bytes = session
            .page()
            .screenshot()
            .await
            .map_err(|e| ToolError::Element(e.to_string()))?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
        let path = save_path.unwrap_or_else(|| {
            format!("./screenshots/{}_{}.png", session.id, now_ms() / 1000)
        });
        if let Some(parent) = std::path::Path::new(&path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ToolError::Internal(format!("failed to create {parent:?}: {e}")))?;
            }
        }
        std::fs::write(&path, &bytes)
            .map_err(|e| ToolError::Internal(format!("failed to write screenshot {path:?}: {e}")))?;
        let handle = evidence_handle("browser-observe", &session.id, "screenshot");
        Ok(ToolResponse::ok(
            format!("captured {} byte screenshot, saved to {path}", bytes.len()),
            view,
        )
        .with_data(json!({
            "mode": "screenshot",
            "image_base64": encoded,
            "bytes": bytes.len(),
            "saved_path": path,
        }))
        .with_evidence(vec![handle]))
    }

    /// `react` and `dom_snapshot` pass the raw evaluate() result straight
    /// through; both are gated because they can expose arbitrary page
    /// internals the agent hasn't been told to look at.
    async fn observe_raw(&self, session: &Session, mode: Mode, view: View) -> Result<ToolResponse, ToolError> {
        let query = json!({ "op": mode.as_str() }).to_string();
        let value = session
            .page()
            .evaluate(&query)
            .await
            .map_err(|e| ToolError::Element(e.to_string()))?;
        Ok(ToolResponse::ok(format!("{} snapshot captured", mode.as_str()), view)
            .with_data(json!({ "mode": mode.as_str(), "snapshot": value })))
    }

    #[allow(clippy::too_many_arguments)]
    async fn observe_elements(
        &self,
        ctx: &ToolContext,
        session: &Session,
        session_id: &str,
        mode: Mode,
        view: View,
        diagnostics: bool,
        plan_actions: bool,
        limit: usize,
    ) -> Result<ToolResponse, ToolError> {
        let mut data = serde_json::Map::new();
        data.insert("mode".to_string(), json!(mode.as_str()));

        let loading = is_loading(&ctx.facts, session_id);
        data.insert("loading".to_string(), json!(loading));

        let current_url = ctx
            .reasoning
            .query("current_url(S, Url)")
            .ok()
            .into_iter()
            .flatten()
            .find(|row| row.get("S").and_then(|a| a.as_str()) == Some(session_id))
            .and_then(|row| row.get("Url").map(|a| a.to_string()));
        if let Some(url) = &current_url {
            data.insert("current_url".to_string(), json!(url));
        }

        let mut interactive_count = 0usize;
        let mut truncated = false;
        if mode.wants_elements() || plan_actions {
            let (_generation, refs) = snapshot_and_register(ctx, session, session_id, limit).await?;
            interactive_count = refs
                .iter()
                .filter(|(_, el)| !el.hidden && action_for_tag_type(&el.tag_type).is_some())
                .count();

            match mode {
                Mode::Interactive => {
                    let visible: Vec<Value> = refs
                        .iter()
                        .filter(|(_, el)| !el.hidden && action_for_tag_type(&el.tag_type).is_some())
                        .map(|(r, el)| element_summary(r, el))
                        .collect();
                    let (items, was_truncated) = truncate_vec(visible, limit);
                    truncated = was_truncated;
                    data.insert("elements".to_string(), json!(items));
                }
                Mode::Hidden => {
                    let hidden: Vec<Value> = refs
                        .iter()
                        .filter(|(_, el)| el.hidden)
                        .map(|(r, el)| element_summary(r, el))
                        .collect();
                    let (items, was_truncated) = truncate_vec(hidden, limit);
                    truncated = was_truncated;
                    data.insert("hidden_elements".to_string(), json!(items));
                }
                Mode::Composite => {
                    let visible: Vec<Value> = refs
                        .iter()
                        .filter(|(_, el)| !el.hidden && action_for_tag_type(&el.tag_type).is_some())
                        .map(|(r, el)| element_summary(r, el))
                        .collect();
                    let hidden: Vec<Value> = refs.iter().filter(|(_, el)| el.hidden).map(|(r, el)| element_summary(r, el)).collect();
                    let (visible, vt) = truncate_vec(visible, limit);
                    let (hidden, ht) = truncate_vec(hidden, limit);
                    truncated = vt || ht;
                    data.insert("elements".to_string(), json!(visible));
                    data.insert("hidden_elements".to_string(), json!(hidden));
                }
                _ => {}
            }
        }

        let mut diag_status = None;
        if diagnostics {
            let diag_args = json!({ "session_id": session_id, "topic": "health", "view": "summary" });
            let diag = super::reason::ReasonTool.call(ctx, diag_args).await;
            diag_status = Some(diag.status);
            data.insert("diagnostics".to_string(), serde_json::to_value(&diag).unwrap_or(Value::Null));

            let toasts = ctx.facts.by_predicate_and_key("toast_notification", session_id);
            data.insert(
                "toast_summary".to_string(),
                json!({ "count": toasts.len() }),
            );
        }

        let mut evidence = Vec::new();
        if plan_actions {
            let candidates = dedup_action_candidates(action_candidates(&ctx.reasoning, session_id));
            let known_refs: std::collections::HashSet<String> =
                session.registry.all().into_iter().map(|(r, _)| r).collect();
            let candidates: Vec<&crate::tools::ActionCandidate> = candidates
                .iter()
                .filter(|c| known_refs.contains(&c.ref_id))
                .collect();
            let globals = dedup_global_actions(global_actions(&ctx.reasoning, session_id));
            data.insert(
                "action_candidates".to_string(),
                json!(candidates
                    .iter()
                    .map(|c| json!({ "ref": c.ref_id, "label": c.label, "action": c.action, "priority": c.priority, "reason": c.reason }))
                    .collect::<Vec<_>>()),
            );
            data.insert(
                "global_actions".to_string(),
                json!(globals
                    .iter()
                    .map(|g| json!({ "action": g.action, "priority": g.priority, "reason": g.reason }))
                    .collect::<Vec<_>>()),
            );
            if !candidates.is_empty() || !globals.is_empty() {
                evidence.push(evidence_handle("browser-observe", session_id, "action_candidates"));
            }
        }

        let next_step = next_step_hint(mode, diag_status, interactive_count, mode.wants_elements() || plan_actions, loading);

        let status = if diag_status == Some(Status::Error) {
            Status::Warning
        } else {
            Status::Ok
        };
        let summary = match mode {
            Mode::State => format!("session {session_id} observed"),
            Mode::Nav => format!("navigation state for {session_id}"),
            _ => format!("{interactive_count} interactive element(s) found"),
        };

        let mut response = ToolResponse {
            success: true,
            status,
            summary,
            view,
            data: Some(Value::Object(data)),
            evidence_handles: evidence,
            truncated,
            next_step: None,
        };
        if let Some(next_step) = next_step {
            response = response.with_next_step(next_step);
        }
        Ok(response)
    }
}

fn next_step_hint(
    mode: Mode,
    diag_status: Option<Status>,
    interactive_count: usize,
    fetched_elements: bool,
    loading: bool,
) -> Option<NextStep> {
    if loading {
        return Some(NextStep {
            tool: "browser-act".to_string(),
            args: json!({ "operations": [{ "type": "await_stable" }] }),
            reason: "the page is still settling after a recent DOM mutation".to_string(),
        });
    }
    if diag_status == Some(Status::Error) {
        return Some(NextStep {
            tool: "browser-reason".to_string(),
            args: json!({ "topic": "why_failed" }),
            reason: "diagnostics reported a failure".to_string(),
        });
    }
    if fetched_elements && interactive_count == 0 && mode != Mode::Hidden {
        return Some(NextStep {
            tool: "browser-observe".to_string(),
            args: json!({ "mode": "hidden" }),
            reason: "no interactive elements found in the visible snapshot".to_string(),
        });
    }
    if !fetched_elements && mode == Mode::State {
        return Some(NextStep {
            tool: "browser-observe".to_string(),
            args: json!({ "mode": "screenshot" }),
            reason: "no further structured signal available".to_string(),
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait as at;
    use tern_facts::FactStore;
    use tern_reason::ReasoningEngine;
    use tern_session::{PageController, PageError, SessionManager};

    struct FakePage {
        snapshot: Value,
    }

    #[at]
    impl PageController for FakePage {
        fn target_id(&self) -> &str {
            "t1"
        }
        async fn navigate(&self, _url: &str) -> Result<(), PageError> {
            Ok(())
        }
        async fn evaluate(&self, _script: &str) -> Result<Value, PageError> {
            Ok(self.snapshot.clone())
        }
        async fn fork(&self) -> Result<Box<dyn PageController>, PageError> {
            Ok(Box::new(FakePage { snapshot: self.snapshot.clone() }))
        }
        async fn close(&self) -> Result<(), PageError> {
            Ok(())
        }
        async fn screenshot(&self) -> Result<Vec<u8>, PageError> {
            Ok(vec![1, 2, 3])
        }
    }

    fn ctx_with(snapshot: Value) -> (ToolContext, String) {
        let facts = Arc::new(FactStore::new(1_000));
        let reasoning = Arc::new(ReasoningEngine::new(facts.clone()));
        let sessions = Arc::new(SessionManager::new());
        let session = sessions.create(Arc::new(FakePage { snapshot }));
        let session_id = session.id.clone();
        (ToolContext::new(facts, reasoning, sessions), session_id)
    }

    #[tokio::test]
    async fn interactive_mode_lists_enabled_buttons() {
        let snapshot = json!([
            { "tag_name": "button", "tag_type": "button", "text_content": "Save", "enabled": true },
            { "tag_name": "div", "tag_type": "other", "text_content": "noise", "hidden": true }
        ]);
        let (ctx, session_id) = ctx_with(snapshot);
        let tool = ObserveTool;
        let args = json!({ "session_id": session_id, "mode": "interactive" });
        let response = tool.call(&ctx, args).await;
        assert!(response.success);
        let elements = response.data.unwrap()["elements"].as_array().unwrap().len();
        assert_eq!(elements, 1);
    }

    #[tokio::test]
    async fn screenshot_mode_writes_to_save_path() {
        let (ctx, session_id) = ctx_with(json!([]));
        let tool = ObserveTool;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.png");
        let args = json!({
            "session_id": session_id,
            "mode": "screenshot",
            "save_path": path.to_str().unwrap(),
        });
        let response = tool.call(&ctx, args).await;
        assert!(response.success);
        let data = response.data.unwrap();
        assert_eq!(data["saved_path"], json!(path.to_str().unwrap()));
        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn sessions_mode_lists_active_sessions_without_requiring_one() {
        let (ctx, _session_id) = ctx_with(json!([]));
        let tool = ObserveTool;
        let response = tool.call(&ctx, json!({ "mode": "sessions", "session_id": "" })).await;
        assert!(response.success);
        assert_eq!(response.data.unwrap()["sessions"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_session_surfaces_as_error_response() {
        let (ctx, _) = ctx_with(json!([]));
        let tool = ObserveTool;
        let response = tool.call(&ctx, json!({ "session_id": "missing", "mode": "state" })).await;
        assert!(!response.success);
    }

    #[tokio::test]
    async fn loading_state_steers_toward_await_stable() {
        let (ctx, session_id) = ctx_with(json!([]));
        ctx.facts.push(vec![Fact::new("dom_updated", vec![session_id.clone().into()], now_ms())]);
        let tool = ObserveTool;
        let response = tool.call(&ctx, json!({ "session_id": session_id, "mode": "state" })).await;
        assert!(response.success);
        assert_eq!(response.data.as_ref().unwrap()["loading"], json!(true));
        let next_step = response.next_step.expect("expected a next_step hint while loading");
        assert_eq!(next_step.tool, "browser-act");
        assert_eq!(next_step.args["operations"][0]["type"], json!("await_stable"));
    }

    #[tokio::test]
    async fn react_mode_denied_without_gate_reason() {
        let (ctx, session_id) = ctx_with(json!([]));
        let tool = ObserveTool;
        let response = tool.call(&ctx, json!({ "session_id": session_id, "mode": "react" })).await;
        assert!(!response.success);
        assert_eq!(response.data.unwrap()["gated"], json!(true));
    }
}
