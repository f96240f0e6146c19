#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! `levin` binary: runs the seeding daemon, fetches the manifest once, or
//! prints the effective settings.

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use levin_app::{AppError, DaemonOptions, render_config, run_daemon, run_populate};
use levin_fetch::FetchProgress;

#[derive(Parser)]
#[command(name = "levin", version, about = "Background seeding daemon")]
struct Cli {
    /// Settings file (defaults to the per-user config directory).
    #[arg(long, global = true, env = "LEVIN_CONFIG")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daemon until interrupted.
    Run {
        /// Fetch the manifest in the background after startup.
        #[arg(long)]
        populate: bool,
    },
    /// Fetch every manifest item missing from the watch directory.
    Populate,
    /// Print the effective settings as TOML.
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            process::exit(err.downcast_ref::<AppError>().map_or(2, AppError::exit_code));
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Run { populate } => {
            run_daemon(DaemonOptions {
                config_path: cli.config,
                populate,
            })
            .await
            .context("daemon failed")?;
            Ok(0)
        }
        Command::Populate => {
            let summary = run_populate(cli.config.as_deref(), |progress: &FetchProgress| {
                println!("{progress}");
            })
            .await
            .context("populate failed")?;
            println!(
                "downloaded {}, skipped {}, failed {}{}",
                summary.downloaded,
                summary.skipped,
                summary.failed,
                if summary.cancelled { " (cancelled)" } else { "" }
            );
            Ok(i32::from(summary.failed > 0))
        }
        Command::Config => {
            let rendered = render_config(cli.config.as_deref()).context("config failed")?;
            print!("{rendered}");
            Ok(0)
        }
    }
}
