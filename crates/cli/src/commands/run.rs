// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `rc run`: hold permits on a unit for the lifetime of a command

use super::{context_map, give_up, parse_key_val, Interrupt};
use crate::env::Env;
use anyhow::{Context, Result};
use clap::Args;
use rc_core::{ConsumerId, IdGen, UuidIdGen};
use rc_engine::{GateConfig, GateRequest};
use std::process::ExitCode;
use std::time::Duration;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Constraint unit to hold while the command runs
    pub unit: String,

    /// Consumer id [default: random uuid]
    #[arg(long)]
    pub id: Option<String>,

    /// Permits to hold while the command runs
    #[arg(long, default_value_t = 1)]
    pub permits: u32,

    /// Opaque key=value stored with the registration (repeatable)
    #[arg(long = "context", value_parser = parse_key_val)]
    pub context: Vec<(String, String)>,

    /// Give up waiting for admission after this long (e.g. `90s`, `5m`)
    #[arg(long, value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,

    /// Command and arguments, after `--`
    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}

pub async fn run(env: &Env, args: RunArgs) -> Result<ExitCode> {
    let Some((program, program_args)) = args.command.split_first() else {
        anyhow::bail!("no command given");
    };

    let gate_config = GateConfig {
        wait_timeout: args.timeout.or(env.config.gate.wait_timeout),
        ..env.config.gate.clone()
    };
    let gate = env.gate()?.with_config(gate_config);
    let consumer_id = args
        .id
        .map(ConsumerId::from)
        .unwrap_or_else(|| UuidIdGen.next());
    let mut request = GateRequest::new(args.unit, consumer_id).with_permits(args.permits);
    request.context = context_map(args.context);

    let mut interrupt = Interrupt::install().context("failed to install signal handlers")?;
    let outcome = tokio::select! {
        result = gate.run(&request, || async {
            tracing::info!(
                unit = %request.unit,
                consumer_id = %request.consumer_id,
                %program,
                "admitted; running"
            );
            tokio::process::Command::new(program)
                .args(program_args)
                .kill_on_drop(true)
                .status()
                .await
        }) => Some(result),
        () = interrupt.recv() => None,
    };
    // The command, if it started, was killed with the dropped future
    let Some(result) = outcome else {
        return give_up(&gate, &request).await;
    };
    let status = result?.with_context(|| format!("failed to run {}", program))?;

    Ok(match status.code() {
        Some(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        None => ExitCode::FAILURE,
    })
}
