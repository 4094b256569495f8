//! CLI interface for sky-gateway.

pub mod handlers;
pub mod output;

use clap::{Parser, Subcommand};

use crate::mcp::TransportKind;
use output::OutputMode;

/// sky-gateway - tool gateway for materials discovery
#[derive(Parser)]
#[command(name = "sky-gateway", version, about, long_about = None)]
pub struct Cli {
    /// Output as JSON instead of human-readable format
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the tools on stdio (MCP, falling back to framed JSON-RPC)
    Serve {
        /// Use only this transport instead of the preference order
        #[arg(long, value_enum)]
        transport: Option<TransportKind>,
    },

    /// List registered tools
    Tools,

    /// Invoke one tool and print its envelope
    Call {
        /// Tool name
        tool: String,
        /// JSON object of arguments
        #[arg(long)]
        args: Option<String>,
    },

    /// Deterministic readiness report
    SelfCheck,
}

/// Execute a non-server command.
pub async fn execute(
    command: &Commands,
    ctx: &crate::init::AppContext,
    mode: OutputMode,
) -> anyhow::Result<()> {
    match command {
        Commands::Serve { .. } => unreachable!("serve handled in main"),
        Commands::Tools => handlers::tools::handle_list(ctx, mode),
        Commands::Call { tool, args } => {
            handlers::tools::handle_call(ctx, tool, args.as_deref(), mode).await?
        }
        Commands::SelfCheck => handlers::tools::handle_self_check(ctx, mode).await?,
    }
    Ok(())
}
