// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Output formatting for CLI commands

use rc_core::Consumer;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

/// Print output in the specified format
pub fn print<T: Serialize + fmt::Display>(value: &T, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => println!("{}", value),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}

/// Print a list of items, with `header` above text output
pub fn print_list<T: Serialize + fmt::Display>(
    items: &[T],
    header: &str,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => {
            println!("{}", header);
            for item in items {
                println!("{}", item);
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(items)?),
    }
    Ok(())
}

/// One consumer as a table row
#[derive(Serialize)]
#[serde(transparent)]
pub struct ConsumerRow(pub Consumer);

pub const CONSUMER_HEADER: &str = "ORDER    CONSUMER                         STATE     PERMITS";

impl fmt::Display for ConsumerRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<8} {:<32} {:<9} {}",
            self.0.order,
            self.0.consumer_id.as_str(),
            self.0.state.as_str(),
            self.0.permits
        )
    }
}

/// One consumer in full
#[derive(Serialize)]
#[serde(transparent)]
pub struct ConsumerDetail(pub Consumer);

impl fmt::Display for ConsumerDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.0;
        writeln!(f, "Consumer: {}", c.consumer_id)?;
        writeln!(f, "  Unit: {}", c.unit)?;
        writeln!(f, "  State: {}", c.state)?;
        writeln!(f, "  Order: {}", c.order)?;
        writeln!(f, "  Permits: {}", c.permits)?;
        write!(f, "  Created: {}", c.created_at.to_rfc3339())?;
        if !c.context.is_empty() {
            write!(f, "\n  Context:")?;
            for (key, value) in &c.context {
                write!(f, "\n    {}: {}", key, value)?;
            }
        }
        Ok(())
    }
}
