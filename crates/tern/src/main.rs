//! tern: browser-automation MCP server.
//!
//! Assembles the core — fact store, reasoning engine, session manager —
//! and exposes it to an external agent through the four progressive tools
//! over either transport `tern-mcp` offers.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;
use tern_facts::FactStore;
use tern_mcp::McpServer;
use tern_reason::ReasoningEngine;
use tern_session::SessionManager;
use tern_tools::{ToolContext, ToolRegistry};

#[derive(Parser)]
#[command(name = "tern")]
#[command(about = "Browser-automation MCP server", long_about = None)]
struct Cli {
    /// Path to a TOML config file. Defaults to the platform config
    /// directory's `tern/tern.toml` when omitted. Missing files fall
    /// back to defaults silently; malformed ones are an error.
    #[arg(long, global = true, env = "TERN_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve tools over line-delimited JSON-RPC on stdio (the default
    /// transport an agent spawns this process with).
    Stdio,

    /// Serve tools over HTTP/SSE on the given port instead of stdio.
    Http {
        #[arg(long, default_value = "8787")]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "tern=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).into_diagnostic()?;

    let tools = build_tool_registry(&config)?;

    match cli.command {
        Commands::Stdio => {
            tracing::info!("tern MCP server starting on stdio");
            let server = McpServer::new(tools);
            server.run().await.into_diagnostic()?;
        }
        Commands::Http { port } => {
            tracing::info!(port, "tern MCP server starting on HTTP");
            let server = McpServer::new(tools);
            tern_mcp::http::run_server(server, port).await.into_diagnostic()?;
        }
    }

    Ok(())
}

/// Wires the Fact Store, Reasoning Engine, and Session Manager into one
/// [`ToolRegistry`]: one fact store, one reasoning engine built over it,
/// one session manager, all shared by reference across every tool
/// invocation.
///
/// No [`tern_session::PageLauncher`] is installed here — opening real
/// browser targets means speaking CDP, which this repository explicitly
/// treats as out of scope. An embedder that owns a CDP client wires one
/// in via `ToolContext::with_launcher` before handing the context to a
/// `ToolRegistry`; this binary runs the core with `act`'s
/// `session_create`/`session_attach` operations returning a validation
/// error, same as the test harnesses do.
fn build_tool_registry(config: &Config) -> Result<ToolRegistry> {
    let facts = Arc::new(FactStore::new(config.fact_buffer_limit));
    let reasoning = ReasoningEngine::new(facts.clone());

    if let Some(schema_path) = &config.mangle.schema_path {
        let program = std::fs::read_to_string(schema_path)
            .map_err(|e| miette::miette!("failed to read mangle.schema_path {schema_path:?}: {e}"))?;
        reasoning
            .add_rule(&program)
            .map_err(|e| miette::miette!("failed to load rule program {schema_path:?}: {e}"))?;
        tracing::info!(path = %schema_path.display(), "loaded initial rule program");
    }

    let sessions = Arc::new(SessionManager::new());
    let ctx = ToolContext::new(facts, Arc::new(reasoning), sessions)
        .with_gate_ttl_ms(config.js_gate_ttl_ms)
        .with_poll_interval_ms(config.poll_interval_ms);

    Ok(ToolRegistry::new(ctx))
}
