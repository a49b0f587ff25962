// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! rc - resource constraint CLI
//!
//! Every invocation opens the store directory, does its work under the
//! store's file lock and exits. Workers on the same machine (or sharing the
//! directory) coordinate purely through the store.

mod commands;
mod completions;
mod env;
mod exit;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{consumer, inspect, maintain, run};
use completions::CompletionsArgs;
use std::path::PathBuf;
use std::process::ExitCode;

use crate::env::Env;

#[derive(Parser)]
#[command(
    name = "rc",
    version,
    about = "rc serializes access to scarce resources across independent workers"
)]
struct Cli {
    /// Store directory [default: <data dir>/rc]
    #[arg(long, global = true, env = "RC_STORE")]
    store: Option<PathBuf>,

    /// Configuration file [default: ./rc.toml if present]
    #[arg(long, global = true, env = "RC_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a consumer on a unit
    Register(consumer::RegisterArgs),
    /// Release an active consumer and promote the queue
    Release(consumer::ConsumerArgs),
    /// Show one consumer
    Query(consumer::QueryArgs),
    /// Abandon a blocked consumer
    Cancel(consumer::ConsumerArgs),
    /// List consumers of a unit
    List(inspect::ListArgs),
    /// List known units
    Units,
    /// Highest order assigned on a unit
    MaxOrder(inspect::UnitArgs),
    /// Run a command while holding permits on a unit
    Run(run::RunArgs),
    /// Promote blocked consumers that already fit
    Reconcile,
    /// Run the maintenance sweep until interrupted
    Maintain(maintain::MaintainArgs),
    /// Snapshot the store and truncate its log
    Compact(maintain::CompactArgs),
    /// Truncate a corrupted log tail
    Repair,
    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging();

    match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(exit::code_for(&err))
        }
    }
}

async fn dispatch(cli: Cli) -> Result<ExitCode> {
    // Completions need neither config nor store
    if let Commands::Completions(args) = &cli.command {
        completions::write_completions::<Cli>(args.shell, &mut std::io::stdout());
        return Ok(ExitCode::SUCCESS);
    }

    let env = Env::load(cli.store, cli.config)?;

    match cli.command {
        Commands::Register(args) => consumer::register(&env, args).await,
        Commands::Release(args) => consumer::release(&env, args).await,
        Commands::Query(args) => consumer::query(&env, args),
        Commands::Cancel(args) => consumer::cancel(&env, args).await,
        Commands::List(args) => inspect::list(&env, args),
        Commands::Units => inspect::units(&env),
        Commands::MaxOrder(args) => inspect::max_order(&env, args),
        Commands::Run(args) => run::run(&env, args).await,
        Commands::Reconcile => maintain::reconcile(&env).await,
        Commands::Maintain(args) => maintain::maintain(&env, args).await,
        Commands::Compact(args) => maintain::compact(&env, args),
        Commands::Repair => maintain::repair(&env),
        Commands::Completions(_) => Ok(ExitCode::SUCCESS),
    }
}

fn setup_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_env("RC_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
