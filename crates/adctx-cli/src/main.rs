//! adctx CLI: operator commands and the stub trainer over an in-process
//! memory kernel.
//!
//! Every invocation boots the kernel against the configured SQLite log,
//! which replays all namespaces before the command runs.

mod cli;
mod cmd;
mod ui;

use crate::cli::*;
use adctx_kernel::config::load_config;
use adctx_kernel::MemoryKernel;
use adctx_types::config::AdctxConfig;
use anyhow::Context;
use clap::Parser;

/// Logs go to stderr so command output on stdout stays pipeable.
fn init_tracing_stderr(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref());
    if let Commands::Query {
        no_autosave: true, ..
    } = cli.command
    {
        config.autosave.enabled = false;
    }
    init_tracing_stderr(&config.log_level);

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            ui::error(&format!("Failed to start async runtime: {e}"));
            std::process::exit(1);
        }
    };
    if let Err(e) = rt.block_on(run(cli.command, config)) {
        ui::error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run(command: Commands, config: AdctxConfig) -> anyhow::Result<()> {
    let default_k = config.search.default_top_k;
    let default_batch = config.training.default_batch_size;
    let kernel = MemoryKernel::boot(config)
        .await
        .context("booting memory kernel")?;

    match command {
        Commands::Add { text, ns } => cmd::memory::cmd_add(&kernel, &ns, &text).await,
        Commands::Update {
            question,
            answer,
            ns,
        } => cmd::memory::cmd_update(&kernel, &ns, &question, &answer).await,
        Commands::Query {
            query, ns, k, json, ..
        } => cmd::memory::cmd_query(&kernel, &ns, &query, k.unwrap_or(default_k), json).await,
        Commands::Defrag { ns } => cmd::memory::cmd_defrag(&kernel, &ns).await,
        Commands::Claim { ns, batch } => {
            cmd::trainer::cmd_claim(&kernel, &ns, batch.unwrap_or(default_batch)).await
        }
        Commands::Export { ns, format, output } => {
            cmd::memory::cmd_export(&kernel, &ns, format.into(), output.as_deref()).await
        }
        Commands::Import { path, ns, format } => {
            cmd::memory::cmd_import(&kernel, &ns, &path, format.into()).await
        }
        Commands::Stats { ns } => cmd::memory::cmd_stats(&kernel, &ns).await,
        Commands::Namespaces => {
            cmd::memory::cmd_namespaces(&kernel);
            Ok(())
        }
    }
}
