// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store upkeep: reconcile, maintain, compact, repair

use crate::env::Env;
use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use rc_engine::{spawn_maintenance, MaintenanceConfig, MaintenanceTask};
use rc_storage::WalStore;
use std::process::ExitCode;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Args, Debug)]
pub struct MaintainArgs {
    /// Sweep interval [default: from config, 30s]
    #[arg(long, value_parser = humantime::parse_duration)]
    pub interval: Option<Duration>,

    /// Run a single sweep and exit
    #[arg(long)]
    pub once: bool,
}

#[derive(Args, Debug)]
pub struct CompactArgs {
    /// Archive finished and rejected consumers older than this [default: from config, 24h]
    #[arg(long, value_parser = humantime::parse_duration, conflicts_with = "keep_all")]
    pub retain: Option<Duration>,

    /// Keep every consumer, only fold the log into the snapshot
    #[arg(long)]
    pub keep_all: bool,
}

pub async fn reconcile(env: &Env) -> Result<ExitCode> {
    let report = env.constraints()?.reconcile().await?;
    println!(
        "Scanned {} units, promoted {} consumers",
        report.units_scanned, report.promoted
    );
    Ok(ExitCode::SUCCESS)
}

pub async fn maintain(env: &Env, args: MaintainArgs) -> Result<ExitCode> {
    let config = MaintenanceConfig {
        interval: args.interval.unwrap_or(env.config.maintenance.interval),
        ..env.config.maintenance.clone()
    };
    anyhow::ensure!(!config.interval.is_zero(), "--interval must be positive");
    let task = MaintenanceTask::new(env.constraints()?).with_config(config);

    if args.once {
        let report = task.tick().await?;
        println!(
            "Scanned {} units, promoted {}, pruned {}",
            report.units_scanned, report.promoted, report.pruned
        );
        return Ok(ExitCode::SUCCESS);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = spawn_maintenance(task, shutdown_rx);
    eprintln!("Maintaining {} (Ctrl-C to stop)", env.store_dir.display());

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    let _ = shutdown_tx.send(true);
    sweeper.await.context("maintenance task failed")?;
    Ok(ExitCode::SUCCESS)
}

pub fn compact(env: &Env, args: CompactArgs) -> Result<ExitCode> {
    let retain = if args.keep_all {
        None
    } else {
        args.retain.or(env.config.maintenance.retain_terminal)
    };
    let cutoff = match retain {
        Some(window) => {
            let window = chrono::Duration::from_std(window).context("--retain is too large")?;
            Some(
                Utc::now()
                    .checked_sub_signed(window)
                    .context("--retain is too large")?,
            )
        }
        None => None,
    };

    let result = env.open_store()?.compact(cutoff)?;
    println!(
        "Removed {} log entries, archived {} consumers, reclaimed {} bytes",
        result.entries_removed, result.consumers_pruned, result.bytes_reclaimed
    );
    Ok(ExitCode::SUCCESS)
}

pub fn repair(env: &Env) -> Result<ExitCode> {
    let removed = WalStore::repair_wal(&env.store_dir)?;
    if removed == 0 {
        println!("Log is intact");
    } else {
        println!("Truncated {} bytes of corrupted log", removed);
    }
    Ok(ExitCode::SUCCESS)
}
