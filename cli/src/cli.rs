//! CLI argument parsing with clap derive

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands;
use crate::infra::management_client::HttpManagementClient;
use crate::output::OutputContext;

/// Default management API address for client commands.
pub const DEFAULT_MANAGER_URL: &str = "http://127.0.0.1:4443";

/// Per-user agent containers behind an authenticating reverse proxy
#[derive(Parser)]
#[command(
    name = "dispatch",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Management API base URL
    #[arg(
        long,
        global = true,
        env = "DISPATCH_MANAGER_URL",
        default_value = DEFAULT_MANAGER_URL
    )]
    pub manager_url: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Serve the authenticating reverse proxy (DISPATCH_PROXY_*)
    Proxy,

    /// Serve the management API over Docker (DISPATCH_MANAGER_*)
    Manager,

    /// Manage agents through the management API
    #[command(subcommand)]
    Agents(commands::agents::AgentsCommand),

    /// Show memory used by running agents
    Memory,

    /// Show version
    Version,
}

impl Cli {
    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn run(self) -> Result<()> {
        let Cli {
            json,
            quiet,
            no_color,
            manager_url,
            command,
        } = self;
        match command {
            Command::Version => {
                commands::version::run(json);
                Ok(())
            }
            Command::Proxy => commands::proxy::run().await,
            Command::Manager => commands::manager::run().await,
            Command::Agents(cmd) => {
                let ctx = OutputContext::new(no_color, quiet);
                let client = HttpManagementClient::new(&manager_url, None)?;
                commands::agents::run(&ctx, &client, cmd, json).await
            }
            Command::Memory => {
                let ctx = OutputContext::new(no_color, quiet);
                let client = HttpManagementClient::new(&manager_url, None)?;
                commands::memory::run(&ctx, &client, json).await
            }
        }
    }
}
