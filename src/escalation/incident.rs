//! The incident aggregate and its transition function.
//!
//! [`Incident::apply`] is pure: it validates the event against the current
//! status, mutates the aggregate and returns the [`Effect`]s the caller must
//! carry out (notifications, timer changes). A rejected event leaves the
//! incident exactly as it was.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{EscalationError, IncidentEvent, IncidentStatus};
use crate::catalog::TeamId;
use crate::notify::Audience;
use crate::triage::{IncidentId, IncidentReport, SeverityLevel, TriageDecision};

/// Actor recorded for transitions the system makes on its own.
pub const SYSTEM_ACTOR: &str = "system";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineEvent {
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Work the caller owes after a successful transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Notify(Audience),
    /// Start (or restart) the ack timer for an incident of this severity.
    ScheduleAckTimeout(SeverityLevel),
    CancelAckTimeout,
}

#[derive(Debug, Clone, Serialize)]
pub struct Incident {
    id: IncidentId,
    status: IncidentStatus,
    report: IncidentReport,
    decision: TriageDecision,
    timeline: Vec<TimelineEvent>,
    opened_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Incident {
    /// A new incident in `Created`, keyed by the decision's id.
    pub fn new(report: IncidentReport, decision: TriageDecision, at: DateTime<Utc>) -> Self {
        let mut incident = Self {
            id: decision.incident_id.clone(),
            status: IncidentStatus::Created,
            timeline: Vec::new(),
            opened_at: at,
            updated_at: at,
            report,
            decision,
        };
        let reporter = incident.report.reporter.clone();
        let note = format!("severity {}", incident.decision.severity);
        incident.push(reporter, "created", Some(note), at);
        incident
    }

    pub fn id(&self) -> &IncidentId {
        &self.id
    }

    pub fn status(&self) -> IncidentStatus {
        self.status
    }

    pub fn report(&self) -> &IncidentReport {
        &self.report
    }

    pub fn decision(&self) -> &TriageDecision {
        &self.decision
    }

    pub fn severity(&self) -> SeverityLevel {
        self.decision.severity
    }

    pub fn is_security_incident(&self) -> bool {
        self.decision.security_incident
    }

    pub fn priority_score(&self) -> u64 {
        self.decision.priority_score
    }

    pub fn timeline(&self) -> &[TimelineEvent] {
        &self.timeline
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Apply one event. On error nothing has changed.
    pub fn apply(
        &mut self,
        event: IncidentEvent,
        at: DateTime<Utc>,
    ) -> Result<Vec<Effect>, EscalationError> {
        use IncidentStatus::*;

        if self.status.is_terminal() {
            return Err(EscalationError::TerminalState(self.id.clone()));
        }

        let event_name = event.name();
        match (self.status, event) {
            (Created, IncidentEvent::TriageComplete) => Ok(self.complete_triage(at)),
            (Notified, IncidentEvent::Acknowledge { actor }) => {
                self.transition(Acknowledged, actor, "acknowledged", None, at);
                Ok(vec![Effect::CancelAckTimeout])
            }
            (Notified, IncidentEvent::AckTimeout) => {
                self.transition(
                    Escalated,
                    SYSTEM_ACTOR,
                    "escalated",
                    Some("not acknowledged before timeout".to_string()),
                    at,
                );
                Ok(vec![Effect::Notify(Audience::Broader)])
            }
            (Acknowledged | Escalated, IncidentEvent::Resolve { actor, note }) => {
                self.transition(Resolved, actor, "resolved", Some(note), at);
                Ok(vec![Effect::CancelAckTimeout])
            }
            (Resolved, IncidentEvent::Close { actor }) => {
                self.transition(Closed, actor, "closed", None, at);
                Ok(vec![Effect::CancelAckTimeout])
            }
            (_, IncidentEvent::Retriage { report, decision, actor }) => {
                Ok(self.retriage(*report, decision, actor, at))
            }
            (from, _) => Err(EscalationError::InvalidTransition {
                incident_id: self.id.clone(),
                from,
                event: event_name,
            }),
        }
    }

    /// Append a note that does not change status, such as a dispatch outcome.
    pub fn record(
        &mut self,
        actor: impl Into<String>,
        action: impl Into<String>,
        note: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<(), EscalationError> {
        if self.status.is_terminal() {
            return Err(EscalationError::TerminalState(self.id.clone()));
        }
        self.push(actor, action, note, at);
        Ok(())
    }

    fn complete_triage(&mut self, at: DateTime<Utc>) -> Vec<Effect> {
        let mut effects = team_notifications(&self.decision.assigned_teams);
        if self.decision.severity == SeverityLevel::Critical {
            self.transition(
                IncidentStatus::Escalated,
                SYSTEM_ACTOR,
                "escalated",
                Some("critical severity".to_string()),
                at,
            );
            effects.push(Effect::Notify(Audience::Broader));
        } else {
            let note = format!("{} team(s) notified", self.decision.assigned_teams.len());
            self.transition(IncidentStatus::Notified, SYSTEM_ACTOR, "notified", Some(note), at);
            effects.push(Effect::ScheduleAckTimeout(self.decision.severity));
        }
        effects
    }

    fn retriage(
        &mut self,
        report: IncidentReport,
        mut decision: TriageDecision,
        actor: String,
        at: DateTime<Utc>,
    ) -> Vec<Effect> {
        decision.incident_id = self.id.clone();
        let old = self.decision.severity;
        let new = decision.severity;
        let added: BTreeSet<TeamId> = decision
            .assigned_teams
            .difference(&self.decision.assigned_teams)
            .cloned()
            .collect();

        self.report = report;
        self.decision = decision;
        self.push(actor, "retriaged", Some(format!("severity {old} -> {new}")), at);

        let mut effects = team_notifications(&added);
        if new > old {
            self.transition(
                IncidentStatus::Escalated,
                SYSTEM_ACTOR,
                "escalated",
                Some(format!("severity raised from {old} to {new}")),
                at,
            );
            effects.insert(0, Effect::CancelAckTimeout);
            effects.push(Effect::Notify(Audience::Broader));
        } else if self.status == IncidentStatus::Created {
            // Not yet notified: triage completion will notify everyone.
            effects.clear();
        }
        effects
    }

    fn transition(
        &mut self,
        to: IncidentStatus,
        actor: impl Into<String>,
        action: &str,
        note: Option<String>,
        at: DateTime<Utc>,
    ) {
        self.status = to;
        self.push(actor, action, note, at);
    }

    /// Timeline timestamps never go backwards, whatever the caller's clock does.
    fn push(
        &mut self,
        actor: impl Into<String>,
        action: impl Into<String>,
        note: Option<String>,
        at: DateTime<Utc>,
    ) {
        let timestamp = self
            .timeline
            .last()
            .map_or(at, |last| at.max(last.timestamp));
        self.updated_at = timestamp;
        self.timeline.push(TimelineEvent {
            timestamp,
            actor: actor.into(),
            action: action.into(),
            note,
        });
    }

    #[cfg(test)]
    pub(crate) fn force_status(&mut self, status: IncidentStatus) {
        self.status = status;
    }
}

fn team_notifications(teams: &BTreeSet<TeamId>) -> Vec<Effect> {
    teams
        .iter()
        .map(|t| Effect::Notify(Audience::Team(t.clone())))
        .collect()
}
