//! HTTP transport for the MCP server.
//!
//! An axum-based alternative to [`crate::server::McpServer::run`]'s stdio
//! loop, for the cases where a process per agent connection isn't wanted.
//! Both transports dispatch through [`McpServer::handle`], so behaviour is
//! identical regardless of which one is in front of it.

use std::sync::Arc;

use axum::extract::State;
use axum::{
    Json, Router,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use tracing::debug;

use crate::{
    protocol::{JsonRpcRequest, JsonRpcResponse},
    server::McpServer,
};

/// Builds the router: `POST /mcp` for JSON-RPC, `GET /health` for
/// liveness probes. The server is wrapped in `Arc` so handlers run
/// concurrently without a mutex around tool dispatch.
pub fn create_router(server: Arc<McpServer>) -> Router {
    Router::new()
        .route("/mcp", post(handle_mcp))
        .route("/health", get(handle_health))
        .with_state(server)
}

pub async fn run_server(server: McpServer, port: u16) -> Result<(), std::io::Error> {
    let router = create_router(Arc::new(server));
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    axum::serve(listener, router).await
}

async fn handle_mcp(
    State(server): State<Arc<McpServer>>,
    Json(request): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    debug!(method = %request.method, "received MCP request");

    match server.handle(request).await {
        Some(resp) => (StatusCode::OK, Json(resp)),
        None => (
            StatusCode::NO_CONTENT,
            Json(JsonRpcResponse {
                jsonrpc: "2.0".to_string(),
                id: None,
                result: None,
                error: None,
            }),
        ),
    }
}

async fn handle_health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use std::sync::Arc as StdArc;

    use tern_facts::FactStore;
    use tern_reason::ReasoningEngine;
    use tern_session::SessionManager;
    use tern_tools::{ToolContext, ToolRegistry};

    fn test_server() -> Arc<McpServer> {
        let facts = StdArc::new(FactStore::new(100));
        let reasoning = StdArc::new(ReasoningEngine::new(facts.clone()));
        let sessions = StdArc::new(SessionManager::new());
        let ctx = ToolContext::new(facts, reasoning, sessions);
        Arc::new(McpServer::new(ToolRegistry::new(ctx)))
    }

    #[tokio::test]
    async fn health_check_ok() {
        let router = create_router(test_server());
        let response = router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn tools_list_over_http() {
        let router = create_router(test_server());
        let body = json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"});
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/mcp")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_string(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["result"]["tools"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn notification_yields_no_content() {
        let router = create_router(test_server());
        let body = json!({"jsonrpc": "2.0", "method": "notifications/initialized"});
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/mcp")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_string(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn unknown_method_is_an_error_response_not_a_transport_failure() {
        let router = create_router(test_server());
        let body = json!({"jsonrpc": "2.0", "id": 1, "method": "unknown/method"});
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/mcp")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_string(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(json["error"]["message"].as_str().unwrap().contains("Unknown method"));
    }
}
