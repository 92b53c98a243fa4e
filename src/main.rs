//! mcp-conductor: JSON-RPC 2.0 capability server for LLM tool use
//!
//! Serves the built-in tools, resources and prompts over MCP stdio, or prints
//! the tool catalog in a provider's function-calling dialect.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{debug, error, info, Level};
use tracing_subscriber::EnvFilter;

use mcp_conductor::config;
use mcp_conductor::mcp::server::{McpServer, McpService};
use mcp_conductor::orchestrator::{Dialect, FunctionCallOrchestrator};

/// JSON-RPC 2.0 capability server and function-call orchestrator.
///
/// Without flags the server speaks MCP over stdin/stdout. Logs go to stderr.
#[derive(Parser, Debug)]
#[command(name = "mcp-conductor")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (defaults to ~/.mcp-conductor/config.json)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,

    /// Print the tool schemas for a provider (mcp, anthropic, openai, gemini) and exit
    #[arg(long, value_name = "DIALECT")]
    print_schemas: Option<String>,

    /// Print human-readable tool documentation and exit
    #[arg(long, conflicts_with = "print_schemas")]
    print_docs: bool,
}

/// Determines the log level from CLI arguments.
#[allow(clippy::match_same_arms)] // Explicit "warn" arm for clarity
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN,
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber for logging.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Writes the tool catalog to stdout instead of serving.
fn print_catalog(service: &McpService, cfg: &config::Config, args: &Args) -> ExitCode {
    let orchestrator =
        FunctionCallOrchestrator::new(Arc::clone(service.router()), cfg.orchestrator.clone());

    if args.print_docs {
        println!("{}", orchestrator.documentation());
        return ExitCode::SUCCESS;
    }

    let dialect = Dialect::parse(args.print_schemas.as_deref().unwrap_or_default());
    match serde_json::to_string_pretty(orchestrator.tools_for(dialect).as_slice()) {
        Ok(text) => {
            println!("{text}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Failed to serialise tool schemas");
            ExitCode::FAILURE
        }
    }
}

/// Entry point for the mcp-conductor server.
fn main() -> ExitCode {
    let args = Args::parse();

    // Load configuration
    let config_path = args.config.as_deref();
    let cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            if config_path.is_none() {
                if let Some(default_path) = config::default_config_path() {
                    eprintln!("\nExpected config at: {}", default_path.display());
                    eprintln!("Create one based on config/example-config.json");
                }
            }
            return ExitCode::FAILURE;
        }
    };

    // Initialise logging
    let log_level = get_log_level(args.verbose, args.quiet, &cfg.logging.level);
    init_tracing(log_level);

    match &args.config {
        Some(path) => debug!(path = %path.display(), "Loaded configuration"),
        None => debug!("Using default configuration location"),
    }

    let service = Arc::new(McpService::with_builtins(&cfg));

    if args.print_schemas.is_some() || args.print_docs {
        return print_catalog(&service, &cfg, &args);
    }

    // Display GPL license notice (required by GPLv3 Section 5d)
    eprintln!(
        "mcp-conductor {}  Copyright (C) 2026  The Embedded Society",
        env!("CARGO_PKG_VERSION")
    );
    eprintln!("This program comes with ABSOLUTELY NO WARRANTY.");
    eprintln!("This is free software, licensed under GPL-3.0-or-later.");
    eprintln!();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        server = %cfg.server.name,
        require_initialize = cfg.session.require_initialize,
        "Starting mcp-conductor server"
    );

    let mut server = McpServer::new(service);

    info!("MCP server ready, waiting for client connection...");

    // Run the server
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to create Tokio runtime");

    let result = runtime.block_on(server.run());

    match result {
        Ok(()) => {
            info!("Server shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}
