//! scaledown — replay scale-down plans through the group deletion scheduler.
//!
//! # Usage
//!
//! ```text
//! scaledown simulate --plan plan.toml --config scaledown.toml --format json
//! scaledown config > scaledown.toml
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod plan;

#[derive(Parser)]
#[command(
    name = "scaledown",
    about = "Scale-down actuation simulator",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Log output format: text or json.
    #[arg(long, global = true, default_value = "text")]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a deletion plan against in-memory node groups.
    ///
    /// Nodes within one plan step are scheduled (or aborted) concurrently;
    /// steps run in order.
    Simulate {
        /// Plan file describing node groups and steps.
        #[arg(short, long)]
        plan: PathBuf,
        /// scaledown.toml with eviction and batching settings.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
        /// Seconds to wait for in-flight deletions before reporting.
        #[arg(long, default_value = "30")]
        timeout_secs: u64,
    },
    /// Print the default scaledown.toml.
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_format)?;

    match cli.command {
        Commands::Simulate {
            plan,
            config,
            format,
            timeout_secs,
        } => commands::simulate::simulate(&plan, config.as_deref(), &format, timeout_secs).await,
        Commands::Config => commands::config::print_default(),
    }
}

fn init_tracing(format: &str) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info,scaledown=debug"))?;

    match format {
        "json" => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
        "text" => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
        other => anyhow::bail!("unsupported log format: {other}"),
    }
    Ok(())
}
