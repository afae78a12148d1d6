//! Memory command

use anyhow::Result;

use crate::application::ports::ManagementApi;
use crate::output::{OutputContext, json};

const MIB: f64 = 1024.0 * 1024.0;

/// Print the memory usage of every running agent.
///
/// # Errors
///
/// Returns an error when the management API call fails.
pub async fn run(ctx: &OutputContext, api: &dyn ManagementApi, json: bool) -> Result<()> {
    let report = api.memory_usage().await?;
    if json {
        return json::print(&report);
    }
    if report.agents.is_empty() {
        ctx.info("No agents running.");
        return Ok(());
    }
    ctx.header("Memory usage");
    for agent in &report.agents {
        ctx.kv(&format!("{:<24}", agent.name), &format_mib(agent.memory_usage));
    }
    ctx.kv(&format!("{:<24}", "total"), &format_mib(report.total_usage));
    ctx.kv(&format!("{:<24}", "average"), &format_mib(report.average_usage));
    Ok(())
}

#[allow(clippy::cast_precision_loss)]
fn format_mib(bytes: u64) -> String {
    format!("{:.1} MiB", bytes as f64 / MIB)
}
