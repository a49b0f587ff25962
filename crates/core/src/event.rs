// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Events emitted as consumers move through their lifecycle

use crate::consumer::ConsumerState;
use crate::unit::{ConstraintUnit, ConsumerId};
use serde::{Deserialize, Serialize};

/// Notifications published by the admission engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConstraintEvent {
    /// A consumer was admitted or queued at registration
    Registered {
        unit: ConstraintUnit,
        consumer_id: ConsumerId,
        state: ConsumerState,
        order: u64,
    },
    /// A blocked consumer became active
    Promoted {
        unit: ConstraintUnit,
        consumer_id: ConsumerId,
    },
    /// An active consumer released its permits
    Finished {
        unit: ConstraintUnit,
        consumer_id: ConsumerId,
    },
    /// A blocked consumer was abandoned
    Rejected {
        unit: ConstraintUnit,
        consumer_id: ConsumerId,
    },
}

impl ConstraintEvent {
    /// Event name for pattern matching, e.g. `constraint:promoted`
    pub fn name(&self) -> String {
        match self {
            ConstraintEvent::Registered { .. } => "constraint:registered".to_string(),
            ConstraintEvent::Promoted { .. } => "constraint:promoted".to_string(),
            ConstraintEvent::Finished { .. } => "constraint:finished".to_string(),
            ConstraintEvent::Rejected { .. } => "constraint:rejected".to_string(),
        }
    }

    pub fn unit(&self) -> &ConstraintUnit {
        match self {
            ConstraintEvent::Registered { unit, .. }
            | ConstraintEvent::Promoted { unit, .. }
            | ConstraintEvent::Finished { unit, .. }
            | ConstraintEvent::Rejected { unit, .. } => unit,
        }
    }

    pub fn consumer_id(&self) -> &ConsumerId {
        match self {
            ConstraintEvent::Registered { consumer_id, .. }
            | ConstraintEvent::Promoted { consumer_id, .. }
            | ConstraintEvent::Finished { consumer_id, .. }
            | ConstraintEvent::Rejected { consumer_id, .. } => consumer_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_share_constraint_prefix() {
        let event = ConstraintEvent::Promoted {
            unit: "u".into(),
            consumer_id: "b".into(),
        };
        assert_eq!(event.name(), "constraint:promoted");
        assert_eq!(event.unit().as_str(), "u");
        assert_eq!(event.consumer_id().as_str(), "b");
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let event = ConstraintEvent::Registered {
            unit: "u".into(),
            consumer_id: "a".into(),
            state: ConsumerState::Blocked,
            order: 2,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "registered");
        assert_eq!(json["state"], "blocked");
        assert_eq!(json["order"], 2);
    }
}
