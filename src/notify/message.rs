//! Human-readable notification text.

use serde::Serialize;

use super::Audience;
use crate::triage::{IncidentId, SeverityLevel, TriageDecision};

/// How many suggested actions go into a message body.
const ACTIONS_IN_MESSAGE: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationMessage {
    pub channel: String,
    pub title: String,
    pub body: String,
    pub incident_id: IncidentId,
    pub severity: SeverityLevel,
    pub priority: Priority,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Normal,
    Urgent,
}

impl NotificationMessage {
    pub fn render(
        channel: impl Into<String>,
        audience: &Audience,
        decision: &TriageDecision,
        incident_id: &IncidentId,
    ) -> Self {
        let severity = decision.severity;
        let title = match audience {
            Audience::Team(_) => format!("[{}] New incident {incident_id}", severity.as_str().to_uppercase()),
            Audience::Broader => format!("[{}] Incident escalated: {incident_id}", severity.as_str().to_uppercase()),
        };

        let teams = decision
            .assigned_teams
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        let mut body = format!("Incident: {incident_id}\nSeverity: {severity}\nAssigned teams: {teams}\n");
        if !decision.suggested_actions.is_empty() {
            body.push_str("Suggested actions:\n");
            for action in decision.suggested_actions.iter().take(ACTIONS_IN_MESSAGE) {
                body.push_str("  - ");
                body.push_str(action);
                body.push('\n');
            }
            let rest = decision.suggested_actions.len().saturating_sub(ACTIONS_IN_MESSAGE);
            if rest > 0 {
                body.push_str(&format!("  ... and {rest} more\n"));
            }
        }

        let priority = if severity.needs_escalation() || *audience == Audience::Broader {
            Priority::Urgent
        } else {
            Priority::Normal
        };

        Self {
            channel: channel.into(),
            title,
            body,
            incident_id: incident_id.clone(),
            severity,
            priority,
        }
    }
}
