//! MCP (Model Context Protocol) transport for tern.
//!
//! Exposes a [`tern_tools::ToolRegistry`] to an external agent over
//! JSON-RPC, either on stdio ([`server::McpServer::run`]) or HTTP/SSE
//! ([`http::run_server`]). The transport is a thin collaborator: all of
//! it lives in `protocol` (wire types) and `server`/`http` (the two ways
//! to carry them); none of the fact store, reasoning engine, or tool
//! logic lives in this crate.

pub mod http;
pub mod protocol;
pub mod server;

pub use server::McpServer;
