// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resolving the store directory and configuration for a command

use anyhow::{Context, Result};
use rc_core::SystemClock;
use rc_engine::{Config, Constraints, EventBus, StepGate, TracedNotifier};
use rc_storage::{WalStore, WalStoreConfig};
use std::path::{Path, PathBuf};

/// Config file picked up from the working directory when `--config` is absent
const LOCAL_CONFIG: &str = "rc.toml";

pub type CliConstraints = Constraints<WalStore, TracedNotifier<EventBus>, SystemClock>;
pub type CliGate = StepGate<WalStore, TracedNotifier<EventBus>, SystemClock>;

pub struct Env {
    pub config: Config,
    pub store_dir: PathBuf,
}

impl Env {
    /// Precedence: flag or env var, then the config file, then the data dir
    pub fn load(store: Option<PathBuf>, config: Option<PathBuf>) -> Result<Self> {
        let config = match config {
            Some(path) => Config::load(&path)?,
            None if Path::new(LOCAL_CONFIG).exists() => Config::load(Path::new(LOCAL_CONFIG))?,
            None => Config::default(),
        };

        let store_dir = store
            .or_else(|| config.store.dir.clone())
            .or_else(|| dirs::data_local_dir().map(|dir| dir.join("rc")))
            .context("no store directory: pass --store or set RC_STORE")?;

        Ok(Self { config, store_dir })
    }

    pub fn open_store(&self) -> Result<WalStore> {
        let mut store_config = WalStoreConfig::default();
        if let Some(machine_id) = &self.config.store.machine_id {
            store_config = store_config.with_machine_id(machine_id);
        }
        WalStore::open(&self.store_dir, store_config)
            .with_context(|| format!("failed to open store at {}", self.store_dir.display()))
    }

    pub fn constraints(&self) -> Result<CliConstraints> {
        Ok(Constraints::new(
            self.open_store()?,
            TracedNotifier::new(EventBus::new()),
            SystemClock,
            self.config.clone(),
        ))
    }

    pub fn gate(&self) -> Result<CliGate> {
        Ok(StepGate::new(self.constraints()?))
    }
}
