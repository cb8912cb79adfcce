use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about = "Transparent security gateway for MCP tool traffic")]
pub struct Cli {
    /// Path to `config.toml`. When omitted, built-in defaults apply and
    /// may still be overridden by `MCP_SENTINEL_*` environment variables.
    #[arg(long = "config", short = 'c', value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Agent identity to stamp on every envelope from this connection.
    /// The gateway does not authenticate this value; it is an operator
    /// convenience for filtering audit records and dashboard events.
    #[arg(long = "agent-id", default_value = "")]
    pub agent_id: String,
}
