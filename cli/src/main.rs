//! Dispatch - per-user agent containers behind an authenticating proxy

use clap::Parser;
use dispatch_cli::cli::Cli;
use dispatch_cli::output::json;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // stderr keeps stdout free for command output
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let as_json = cli.json;
    if let Err(e) = cli.run().await {
        match json::format_error(&format!("{e:#}"), "command_failed") {
            Ok(text) if as_json => println!("{text}"),
            _ => eprintln!("Error: {e:#}"),
        }
        std::process::exit(1);
    }
}
