//! Dispatcher that writes notifications to the structured log.

use std::sync::Arc;

use tracing::info;

use super::message::NotificationMessage;
use super::{Audience, DispatchError, Dispatcher};
use crate::catalog::TeamCatalog;
use crate::triage::{IncidentId, TriageDecision};

/// Resolves the channel for an audience from the team catalog.
pub(crate) fn channel_for(teams: &TeamCatalog, audience: &Audience) -> Result<String, DispatchError> {
    match audience {
        Audience::Team(team) => teams
            .channel(team)
            .map(str::to_string)
            .ok_or_else(|| DispatchError::UnknownTeam(team.clone())),
        Audience::Broader => Ok(teams.broader_channel().to_string()),
    }
}

/// Default dispatcher when no webhook is configured.
#[derive(Debug, Clone)]
pub struct LogDispatcher {
    teams: Arc<TeamCatalog>,
}

impl LogDispatcher {
    pub fn new(teams: Arc<TeamCatalog>) -> Self {
        Self { teams }
    }
}

#[async_trait::async_trait]
impl Dispatcher for LogDispatcher {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(
        &self,
        audience: &Audience,
        decision: &TriageDecision,
        incident_id: &IncidentId,
    ) -> Result<(), DispatchError> {
        let channel = channel_for(&self.teams, audience)?;
        let message = NotificationMessage::render(channel, audience, decision, incident_id);
        info!(
            channel = %message.channel,
            incident_id = %message.incident_id,
            severity = %message.severity,
            priority = ?message.priority,
            title = %message.title,
            "notification"
        );
        Ok(())
    }
}
