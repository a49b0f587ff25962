// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process exit codes
//!
//! - 0: success
//! - 1: any other failure
//! - 2: the unit refused the request (rejected, timed out, or never fits)
//! - 3: registered but still blocked
//! - 130: interrupted; the registration was given up

use rc_engine::{ConstraintError, GateError};

pub const FAILURE: u8 = 1;
pub const REFUSED: u8 = 2;
pub const BLOCKED: u8 = 3;
pub const INTERRUPTED: u8 = 130;

pub fn code_for(err: &anyhow::Error) -> u8 {
    if err.chain().any(is_refusal) {
        REFUSED
    } else {
        FAILURE
    }
}

fn is_refusal(cause: &(dyn std::error::Error + 'static)) -> bool {
    if let Some(err) = cause.downcast_ref::<ConstraintError>() {
        return matches!(err, ConstraintError::PermanentlyBlocked { .. });
    }
    match cause.downcast_ref::<GateError>() {
        Some(GateError::Rejected { .. } | GateError::TimedOut { .. }) => true,
        Some(GateError::Constraint(inner)) => {
            matches!(inner, ConstraintError::PermanentlyBlocked { .. })
        }
        _ => false,
    }
}
