// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Read-only views of the store

use crate::env::Env;
use crate::output::{self, ConsumerRow, OutputFormat, CONSUMER_HEADER};
use anyhow::Result;
use clap::Args;
use rc_core::ConstraintUnit;
use rc_storage::ConsumerStore;
use std::process::ExitCode;

#[derive(Args, Debug)]
pub struct UnitArgs {
    pub unit: String,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    pub unit: String,

    /// Include finished and rejected consumers
    #[arg(long)]
    pub all: bool,

    #[arg(long)]
    pub json: bool,
}

pub fn list(env: &Env, args: ListArgs) -> Result<ExitCode> {
    let unit = ConstraintUnit::from(args.unit);
    let constraints = env.constraints()?;
    let consumers = if args.all {
        constraints.consumers(&unit)?
    } else {
        constraints.store().list_by_unit(&unit)?
    };

    let rows: Vec<_> = consumers.into_iter().map(ConsumerRow).collect();
    let format = OutputFormat::from_json_flag(args.json);
    if rows.is_empty() && format == OutputFormat::Text {
        println!("No consumers on {}", unit);
        return Ok(ExitCode::SUCCESS);
    }
    output::print_list(&rows, CONSUMER_HEADER, format)?;
    Ok(ExitCode::SUCCESS)
}

pub fn units(env: &Env) -> Result<ExitCode> {
    for unit in env.constraints()?.units()? {
        println!("{}", unit);
    }
    Ok(ExitCode::SUCCESS)
}

pub fn max_order(env: &Env, args: UnitArgs) -> Result<ExitCode> {
    println!("{}", env.constraints()?.max_order(&args.unit.into())?);
    Ok(ExitCode::SUCCESS)
}
