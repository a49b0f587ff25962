// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI command implementations

pub mod consumer;
pub mod inspect;
pub mod maintain;
pub mod run;

use crate::env::CliGate;
use crate::exit;
use anyhow::Result;
use rc_engine::GateRequest;
use std::collections::BTreeMap;
use std::process::ExitCode;

#[cfg(unix)]
use tokio::signal::unix::{signal, Signal, SignalKind};

/// SIGINT or SIGTERM, whichever arrives first.
///
/// Handlers are installed by `install`, so once it returns neither signal
/// kills the process before the registration is given up.
pub struct Interrupt {
    #[cfg(unix)]
    int: Signal,
    #[cfg(unix)]
    term: Signal,
}

impl Interrupt {
    #[cfg(unix)]
    pub fn install() -> std::io::Result<Self> {
        Ok(Self {
            int: signal(SignalKind::interrupt())?,
            term: signal(SignalKind::terminate())?,
        })
    }

    #[cfg(not(unix))]
    pub fn install() -> std::io::Result<Self> {
        Ok(Self {})
    }

    #[cfg(unix)]
    pub async fn recv(&mut self) {
        tokio::select! {
            _ = self.int.recv() => {}
            _ = self.term.recv() => {}
        }
    }

    #[cfg(not(unix))]
    pub async fn recv(&mut self) {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Parse a `key=value` pair
pub fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    if key.is_empty() {
        return Err(format!("empty key in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Cancel or release an interrupted caller's registration, then exit 130
pub async fn give_up(gate: &CliGate, request: &GateRequest) -> Result<ExitCode> {
    let GateRequest { unit, consumer_id, .. } = request;
    let promoted = gate.abandon(unit, consumer_id).await?;
    let state = gate.constraints().query(unit, consumer_id).map(|c| c.state);
    match state {
        Ok(state) => eprintln!("interrupted; {} {}", consumer_id, state),
        Err(_) => eprintln!("interrupted; {} not registered", consumer_id),
    }
    if !promoted.is_empty() {
        tracing::info!(%unit, ?promoted, "released on interrupt");
    }
    Ok(ExitCode::from(exit::INTERRUPTED))
}

pub fn context_map(pairs: Vec<(String, String)>) -> BTreeMap<String, String> {
    pairs.into_iter().collect()
}
