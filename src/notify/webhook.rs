//! Dispatcher that POSTs rendered messages to an HTTP webhook.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use super::log::channel_for;
use super::message::NotificationMessage;
use super::{Audience, DispatchError, Dispatcher};
use crate::catalog::TeamCatalog;
use crate::triage::{IncidentId, TriageDecision};

#[derive(Debug, Clone)]
pub struct WebhookDispatcher {
    client: reqwest::Client,
    url: String,
    teams: Arc<TeamCatalog>,
}

impl WebhookDispatcher {
    /// `request_timeout` bounds the HTTP exchange; the retry policy's send
    /// timeout still applies on top of it.
    pub fn new(
        url: impl Into<String>,
        teams: Arc<TeamCatalog>,
        request_timeout: Duration,
    ) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("incidentmedic/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            teams,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl Dispatcher for WebhookDispatcher {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn send(
        &self,
        audience: &Audience,
        decision: &TriageDecision,
        incident_id: &IncidentId,
    ) -> Result<(), DispatchError> {
        let channel = channel_for(&self.teams, audience)?;
        let message = NotificationMessage::render(channel, audience, decision, incident_id);

        let response = self
            .client
            .post(&self.url)
            .json(&json!({
                "channel": message.channel,
                "text": format!("{}\n{}", message.title, message.body),
                "incident_id": message.incident_id,
                "severity": message.severity,
                "priority": message.priority,
                "audience": audience,
            }))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(DispatchError::Rejected(format!("webhook returned {status}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, TeamId};
    use crate::triage::SeverityLevel;
    use std::collections::BTreeSet;

    #[tokio::test]
    async fn test_unknown_team_fails_before_any_request() {
        // Nothing listens on this address; the catalog check must fail first.
        let dispatcher = WebhookDispatcher::new(
            "http://127.0.0.1:9/hook",
            Arc::new(Catalog::builtin().teams),
            Duration::from_secs(1),
        )
        .unwrap();
        let d = TriageDecision {
            incident_id: IncidentId::from("INC-20260101-00000003"),
            severity: SeverityLevel::Medium,
            assigned_teams: BTreeSet::new(),
            suggested_actions: vec![],
            escalation_needed: false,
            security_incident: false,
            priority_score: 0,
        };
        let err = dispatcher
            .send(&Audience::Team(TeamId::new("Nobody")), &d, &d.incident_id)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::UnknownTeam(_)));
    }

    #[tokio::test]
    async fn test_posts_to_local_listener() {
        use axum::{routing::post, Json, Router};
        use tokio::sync::mpsc;

        let (tx, mut rx) = mpsc::unbounded_channel::<serde_json::Value>();
        let app = Router::new().route(
            "/hook",
            post(move |Json(body): Json<serde_json::Value>| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(body);
                    "ok"
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let dispatcher = WebhookDispatcher::new(
            format!("http://{addr}/hook"),
            Arc::new(Catalog::builtin().teams),
            Duration::from_secs(5),
        )
        .unwrap();
        let d = TriageDecision {
            incident_id: IncidentId::from("INC-20260101-00000004"),
            severity: SeverityLevel::High,
            assigned_teams: BTreeSet::from([TeamId::new("Database")]),
            suggested_actions: vec!["Check replicas".into()],
            escalation_needed: true,
            security_incident: false,
            priority_score: 0,
        };
        dispatcher
            .send(&Audience::Team(TeamId::new("Database")), &d, &d.incident_id)
            .await
            .unwrap();

        let body = rx.recv().await.unwrap();
        assert_eq!(body["channel"], "#dba-oncall");
        assert_eq!(body["severity"], "high");
        assert_eq!(body["priority"], "urgent");
        assert!(body["text"].as_str().unwrap().contains("Check replicas"));
    }
}
