//! Agents command

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use dispatch_common::AgentRuntime;

use crate::application::ports::ManagementApi;
use crate::domain::agent::validate_agent_name;
use crate::output::{OutputContext, json};

/// Agents subcommands.
#[derive(Subcommand)]
pub enum AgentsCommand {
    /// List registered agents
    List,
    /// Show agent state
    Show(NameArg),
    /// Register a new agent
    Add(AddArgs),
    /// Start an agent's container
    Start(NameArg),
    /// Stop an agent's container
    Stop(NameArg),
    /// Show runtime state and port
    Runtime(NameArg),
}

#[derive(Args)]
pub struct NameArg {
    /// Agent name
    pub name: String,
}

#[derive(Args)]
pub struct AddArgs {
    /// Agent name
    pub name: String,

    /// Password (prompted when omitted)
    #[arg(long, env = "DISPATCH_AGENT_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

/// Run an agents subcommand against the management API.
///
/// # Errors
///
/// Returns an error when the management API call fails or the password
/// prompt cannot be shown.
pub async fn run(
    ctx: &OutputContext,
    api: &dyn ManagementApi,
    cmd: AgentsCommand,
    json: bool,
) -> Result<()> {
    match cmd {
        AgentsCommand::List => list(ctx, api, json).await,
        AgentsCommand::Show(arg) => show(ctx, api, &arg.name, json).await,
        AgentsCommand::Add(args) => add(ctx, api, args, json).await,
        AgentsCommand::Start(arg) => {
            let runtime = api.start_agent(&arg.name).await?;
            report_runtime(ctx, &arg.name, &runtime, json)
        }
        AgentsCommand::Stop(arg) => {
            let runtime = api.stop_agent(&arg.name).await?;
            report_runtime(ctx, &arg.name, &runtime, json)
        }
        AgentsCommand::Runtime(arg) => {
            let runtime = api.agent_runtime(&arg.name).await?;
            report_runtime(ctx, &arg.name, &runtime, json)
        }
    }
}

async fn list(ctx: &OutputContext, api: &dyn ManagementApi, json: bool) -> Result<()> {
    let list = api.list_agents().await?;
    if json {
        return json::print(&list);
    }
    if list.agents.is_empty() {
        ctx.info("No agents registered.");
        ctx.info("Register one with: dispatch agents add <name>");
        return Ok(());
    }
    ctx.header("Agents");
    for name in &list.agents {
        if !ctx.quiet {
            println!("  {name}");
        }
    }
    Ok(())
}

async fn show(ctx: &OutputContext, api: &dyn ManagementApi, name: &str, json: bool) -> Result<()> {
    let agent = api.get_agent(name).await?;
    if json {
        return json::print(&agent);
    }
    ctx.kv("name ", &agent.name);
    ctx.kv("state", &ctx.state(agent.state));
    Ok(())
}

async fn add(ctx: &OutputContext, api: &dyn ManagementApi, args: AddArgs, json: bool) -> Result<()> {
    validate_agent_name(&args.name)?;
    let password = match args.password {
        Some(password) => password,
        None => dialoguer::Password::new()
            .with_prompt(format!("Password for '{}'", args.name))
            .with_confirmation("Confirm password", "Passwords do not match")
            .interact()
            .context("cannot read password")?,
    };
    api.add_agent(&args.name, &password).await?;
    if json {
        return json::print(&serde_json::json!({ "name": args.name, "created": true }));
    }
    ctx.success(&format!("Agent '{}' registered", args.name));
    Ok(())
}

fn report_runtime(ctx: &OutputContext, name: &str, runtime: &AgentRuntime, json: bool) -> Result<()> {
    if json {
        return json::print(runtime);
    }
    ctx.kv("agent", name);
    ctx.kv("state", &ctx.state(runtime.state));
    if let Some(port) = runtime.port {
        ctx.kv("port ", &port.to_string());
    }
    Ok(())
}
