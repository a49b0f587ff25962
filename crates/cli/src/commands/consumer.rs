// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Consumer lifecycle commands: register, release, query, cancel

use super::{context_map, give_up, parse_key_val, Interrupt};
use crate::env::Env;
use crate::exit;
use crate::output::{self, ConsumerDetail, OutputFormat};
use anyhow::{Context, Result};
use clap::Args;
use rc_core::{ConstraintUnit, ConsumerId, ConsumerState, IdGen, UuidIdGen};
use rc_engine::{GateConfig, GateRequest};
use std::process::ExitCode;
use std::time::Duration;

#[derive(Args, Debug)]
pub struct RegisterArgs {
    /// Constraint unit, e.g. `git:acct-1:token-1`
    pub unit: String,

    /// Consumer id [default: random uuid]
    #[arg(long)]
    pub id: Option<String>,

    /// Permits to hold while active
    #[arg(long, default_value_t = 1)]
    pub permits: u32,

    /// Opaque key=value stored with the registration (repeatable)
    #[arg(long = "context", value_parser = parse_key_val)]
    pub context: Vec<(String, String)>,

    /// Wait until admitted instead of exiting while blocked
    #[arg(long)]
    pub wait: bool,

    /// Cancel the registration after waiting this long (e.g. `90s`, `5m`)
    #[arg(long, value_parser = humantime::parse_duration, requires = "wait")]
    pub timeout: Option<Duration>,
}

#[derive(Args, Debug)]
pub struct ConsumerArgs {
    pub unit: String,
    pub id: String,
}

#[derive(Args, Debug)]
pub struct QueryArgs {
    pub unit: String,
    pub id: String,

    /// Print the stored record as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn register(env: &Env, args: RegisterArgs) -> Result<ExitCode> {
    let unit = ConstraintUnit::from(args.unit);
    let consumer_id = args
        .id
        .map(ConsumerId::from)
        .unwrap_or_else(|| UuidIdGen.next());

    if args.wait {
        let gate_config = GateConfig {
            wait_timeout: args.timeout.or(env.config.gate.wait_timeout),
            ..env.config.gate.clone()
        };
        let gate = env.gate()?.with_config(gate_config);
        let mut request = GateRequest::new(unit, consumer_id).with_permits(args.permits);
        request.context = context_map(args.context);

        let mut interrupt = Interrupt::install().context("failed to install signal handlers")?;
        let outcome = tokio::select! {
            result = gate.acquire(&request) => Some(result),
            () = interrupt.recv() => None,
        };
        let Some(result) = outcome else {
            return give_up(&gate, &request).await;
        };
        let permit = result?;
        println!("{} {}", permit.consumer_id, ConsumerState::Active);
        return Ok(ExitCode::SUCCESS);
    }

    let constraints = env.constraints()?;
    let state = constraints
        .register(&unit, &consumer_id, args.permits, &context_map(args.context))
        .await?;
    println!("{} {}", consumer_id, state);

    Ok(match state {
        ConsumerState::Blocked => ExitCode::from(exit::BLOCKED),
        _ => ExitCode::SUCCESS,
    })
}

pub async fn release(env: &Env, args: ConsumerArgs) -> Result<ExitCode> {
    let promoted = env
        .constraints()?
        .release(&args.unit.into(), &args.id.into())
        .await?;
    for id in promoted {
        println!("{}", id);
    }
    Ok(ExitCode::SUCCESS)
}

pub fn query(env: &Env, args: QueryArgs) -> Result<ExitCode> {
    let consumer = env
        .constraints()?
        .query(&args.unit.into(), &args.id.into())?;
    output::print(
        &ConsumerDetail(consumer),
        OutputFormat::from_json_flag(args.json),
    )?;
    Ok(ExitCode::SUCCESS)
}

pub async fn cancel(env: &Env, args: ConsumerArgs) -> Result<ExitCode> {
    let unit = ConstraintUnit::from(args.unit);
    let consumer_id = ConsumerId::from(args.id);
    let constraints = env.constraints()?;

    if constraints.cancel(&unit, &consumer_id).await? {
        println!("{} {}", consumer_id, ConsumerState::Rejected);
    } else {
        let state = constraints.query(&unit, &consumer_id)?.state;
        println!("{} {} (not blocked, unchanged)", consumer_id, state);
    }
    Ok(ExitCode::SUCCESS)
}
