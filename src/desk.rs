//! The incident desk: triage and escalation behind one handle.
//!
//! This is what the API and CLI talk to. Reports are triaged by the
//! [`TriageEngine`] and the resulting incidents are handed to the
//! [`IncidentManager`].

use std::sync::Arc;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::info;

use crate::catalog::{Catalog, TeamCatalog};
use crate::config::AppConfig;
use crate::escalation::{EscalationError, Incident, IncidentManager};
use crate::notify::log::LogDispatcher;
use crate::notify::webhook::WebhookDispatcher;
use crate::notify::Dispatcher;
use crate::triage::{IncidentId, IncidentReport, TriageDecision, TriageEngine, TriageError};

#[derive(Debug, Error)]
pub enum DeskError {
    #[error(transparent)]
    Triage(#[from] TriageError),
    #[error(transparent)]
    Escalation(#[from] EscalationError),
}

#[derive(Clone)]
pub struct IncidentDesk {
    engine: Arc<TriageEngine>,
    manager: IncidentManager,
}

impl IncidentDesk {
    pub fn new(engine: Arc<TriageEngine>, manager: IncidentManager) -> Self {
        Self { engine, manager }
    }

    /// Build the desk described by `config`, notifying through `dispatcher`.
    pub fn with_dispatcher(config: &AppConfig, dispatcher: Arc<dyn Dispatcher>) -> Result<Self> {
        let engine = build_engine(config)?;
        let manager = IncidentManager::new(
            dispatcher,
            config.escalation.clone(),
            config.dispatch.retry_policy(),
        );
        Ok(Self::new(Arc::new(engine), manager))
    }

    /// Build the desk with the dispatcher the config asks for: a webhook when
    /// `dispatch.webhook_url` is set, the log otherwise.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let engine = Arc::new(build_engine(config)?);
        let dispatcher = build_dispatcher(config, engine.teams().clone())?;
        info!(dispatcher = dispatcher.name(), "notification dispatcher ready");
        let manager = IncidentManager::new(
            dispatcher,
            config.escalation.clone(),
            config.dispatch.retry_policy(),
        );
        Ok(Self::new(engine, manager))
    }

    pub fn engine(&self) -> &TriageEngine {
        &self.engine
    }

    pub fn manager(&self) -> &IncidentManager {
        &self.manager
    }

    pub fn teams(&self) -> &TeamCatalog {
        self.engine.teams()
    }

    /// Triage without opening an incident.
    pub fn preview(&self, report: &IncidentReport) -> Result<TriageDecision, DeskError> {
        Ok(self.engine.triage(report)?)
    }

    /// Triage a report and open an incident for it.
    pub async fn submit(&self, report: IncidentReport) -> Result<Incident, DeskError> {
        let decision = self.engine.triage(&report)?;
        Ok(self.manager.open(report, decision).await?)
    }

    /// Re-run triage on an updated report for an existing incident.
    pub async fn retriage(
        &self,
        id: &IncidentId,
        report: IncidentReport,
        actor: impl Into<String>,
    ) -> Result<Incident, DeskError> {
        // Fail fast on unknown ids before spending a triage pass.
        self.manager.get(id).await?;
        let decision = self.engine.assess(&report, id.clone())?;
        Ok(self.manager.retriage(id, report, decision, actor).await?)
    }

    pub async fn acknowledge(&self, id: &IncidentId, actor: impl Into<String>) -> Result<Incident, DeskError> {
        Ok(self.manager.acknowledge(id, actor).await?)
    }

    pub async fn resolve(
        &self,
        id: &IncidentId,
        actor: impl Into<String>,
        note: impl Into<String>,
    ) -> Result<Incident, DeskError> {
        Ok(self.manager.resolve(id, actor, note).await?)
    }

    pub async fn close(&self, id: &IncidentId, actor: impl Into<String>) -> Result<Incident, DeskError> {
        Ok(self.manager.close(id, actor).await?)
    }

    pub async fn get(&self, id: &IncidentId) -> Result<Incident, DeskError> {
        Ok(self.manager.get(id).await?)
    }

    pub async fn list(&self) -> Vec<Incident> {
        self.manager.list().await
    }
}

/// Triage engine from the `[catalog]` and `[classifier]` sections.
pub fn build_engine(config: &AppConfig) -> Result<TriageEngine> {
    let catalog = Catalog::from_config(&config.catalog).context("invalid [catalog] configuration")?;
    TriageEngine::with_classifier(catalog, config.classifier.build())
        .context("routing table references an unknown team")
}

fn build_dispatcher(config: &AppConfig, teams: Arc<TeamCatalog>) -> Result<Arc<dyn Dispatcher>> {
    match &config.dispatch.webhook_url {
        Some(url) => {
            let timeout = config.dispatch.retry_policy().send_timeout;
            let webhook = WebhookDispatcher::new(url.clone(), teams, timeout)
                .context("failed to build webhook client")?;
            info!(url = webhook.url(), "posting notifications to webhook");
            Ok(Arc::new(webhook))
        }
        None => Ok(Arc::new(LogDispatcher::new(teams))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escalation::IncidentStatus;
    use crate::notify::memory::MemoryDispatcher;
    use crate::triage::SeverityLevel;

    fn desk() -> (IncidentDesk, Arc<MemoryDispatcher>) {
        let dispatcher = Arc::new(MemoryDispatcher::new());
        let desk = IncidentDesk::with_dispatcher(&AppConfig::default(), dispatcher.clone()).unwrap();
        (desk, dispatcher)
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_rejects_blank_reports() {
        let (desk, _) = desk();
        let err = desk.submit(IncidentReport::new("  ", "something")).await.unwrap_err();
        assert!(matches!(err, DeskError::Triage(TriageError::Validation(_))));
        assert!(desk.list().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_preview_does_not_open_incident() {
        let (desk, dispatcher) = desk();
        let decision = desk
            .preview(&IncidentReport::new("Login page slow", "p95 latency up").with_systems(["auth"]))
            .unwrap();
        assert_eq!(decision.severity, SeverityLevel::High);
        assert!(desk.list().await.is_empty());
        assert_eq!(dispatcher.attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retriage_with_worse_report_escalates() {
        let (desk, _) = desk();
        let inc = desk
            .submit(IncidentReport::new("Checkout errors", "Some users see an issue").with_systems(["payments"]))
            .await
            .unwrap();
        assert_eq!(inc.severity(), SeverityLevel::Medium);
        assert_eq!(inc.status(), IncidentStatus::Notified);

        let worse = IncidentReport::new("Checkout down", "Payments unavailable for everyone")
            .with_systems(["payments", "database"]);
        let inc = desk.retriage(inc.id(), worse, "oncall").await.unwrap();
        assert_eq!(inc.severity(), SeverityLevel::Critical);
        assert_eq!(inc.status(), IncidentStatus::Escalated);
        assert!(!desk.manager().ack_timer_pending(inc.id()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retriage_unknown_incident() {
        let (desk, _) = desk();
        let err = desk
            .retriage(&IncidentId::from("INC-nope"), IncidentReport::new("a", "b"), "x")
            .await
            .unwrap_err();
        assert!(matches!(err, DeskError::Escalation(EscalationError::NotFound(_))));
    }

    #[test]
    fn test_from_config_picks_log_dispatcher_by_default() {
        assert!(IncidentDesk::from_config(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_webhook_url_selects_webhook_dispatcher() {
        let mut config = AppConfig::default();
        config.dispatch.webhook_url = Some("http://127.0.0.1:9/hooks".into());
        let teams = build_engine(&config).unwrap().teams().clone();
        assert_eq!(build_dispatcher(&config, teams).unwrap().name(), "webhook");

        let teams = build_engine(&AppConfig::default()).unwrap().teams().clone();
        assert_eq!(build_dispatcher(&AppConfig::default(), teams).unwrap().name(), "log");
    }

    #[test]
    fn test_invalid_catalog_is_reported() {
        let mut config = AppConfig::default();
        config.catalog.default_team = "Nobody".into();
        assert!(build_engine(&config).is_err());
    }
}
