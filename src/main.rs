//! sky-gateway - tool gateway for materials discovery
//!
//! Usage:
//!   sky-gateway serve                      Serve tools on stdio (MCP, JSON-RPC fallback)
//!   sky-gateway serve --transport json-rpc Serve with one transport only
//!   sky-gateway tools                      List registered tools
//!   sky-gateway call read_cif --args '{}'  Invoke one tool
//!   sky-gateway self-check                 Readiness report
//!   sky-gateway --help                     Show all commands

use anyhow::Result;
use clap::Parser;

use sky_gateway::cli::output::OutputMode;
use sky_gateway::cli::{Cli, Commands};
use sky_gateway::init::AppContext;
use sky_gateway::mcp::{bind, default_backends};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Tracing to stderr (stdout carries the protocol)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sky_gateway=info".parse()?),
        )
        .init();

    let mode = OutputMode::from_json_flag(cli.json);
    let ctx = AppContext::new()?;

    match &cli.command {
        Commands::Serve { transport } => {
            let backend = bind(&ctx.registry, default_backends(*transport))?;
            backend.serve().await?;
        }
        cmd => {
            sky_gateway::cli::execute(cmd, &ctx, mode).await?;
        }
    }

    Ok(())
}
