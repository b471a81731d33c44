//! Incident lifecycle: the escalation state machine, per-incident ack timers
//! and the manager that ties them to notification dispatch.

pub mod incident;
pub mod manager;
pub mod timer;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::triage::{IncidentId, IncidentReport, TriageDecision};

pub use incident::{Effect, Incident, TimelineEvent};
pub use manager::IncidentManager;
pub use timer::EscalationTimers;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Created,
    Notified,
    Acknowledged,
    Escalated,
    Resolved,
    Closed,
}

impl IncidentStatus {
    pub const ALL: [IncidentStatus; 6] = [
        IncidentStatus::Created,
        IncidentStatus::Notified,
        IncidentStatus::Acknowledged,
        IncidentStatus::Escalated,
        IncidentStatus::Resolved,
        IncidentStatus::Closed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            IncidentStatus::Created => "created",
            IncidentStatus::Notified => "notified",
            IncidentStatus::Acknowledged => "acknowledged",
            IncidentStatus::Escalated => "escalated",
            IncidentStatus::Resolved => "resolved",
            IncidentStatus::Closed => "closed",
        }
    }

    pub fn is_terminal(self) -> bool {
        self == IncidentStatus::Closed
    }
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum IncidentEvent {
    TriageComplete,
    Acknowledge {
        actor: String,
    },
    AckTimeout,
    Resolve {
        actor: String,
        note: String,
    },
    Close {
        actor: String,
    },
    /// Replace the report and decision after a reassessment.
    Retriage {
        report: Box<IncidentReport>,
        decision: TriageDecision,
        actor: String,
    },
}

impl IncidentEvent {
    pub fn name(&self) -> &'static str {
        match self {
            IncidentEvent::TriageComplete => "triage_complete",
            IncidentEvent::Acknowledge { .. } => "acknowledge",
            IncidentEvent::AckTimeout => "ack_timeout",
            IncidentEvent::Resolve { .. } => "resolve",
            IncidentEvent::Close { .. } => "close",
            IncidentEvent::Retriage { .. } => "retriage",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EscalationError {
    #[error("incident {0} not found")]
    NotFound(IncidentId),
    #[error("incident {0} already exists")]
    AlreadyExists(IncidentId),
    #[error("cannot apply '{event}' to incident {incident_id} in state {from}")]
    InvalidTransition {
        incident_id: IncidentId,
        from: IncidentStatus,
        event: &'static str,
    },
    #[error("incident {0} is closed")]
    TerminalState(IncidentId),
}
