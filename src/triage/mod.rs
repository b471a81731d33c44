//! Triage pipeline: signal extraction, severity classification, team routing
//! and action recommendation.
//!
//! Every stage is a pure function of its input and the injected catalogs, so
//! a [`TriageEngine`] can be shared across tasks and run for many incidents
//! in parallel.

pub mod classify;
pub mod extract;
pub mod priority;
pub mod recommend;
pub mod route;

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use self::classify::SeverityClassifier;
use self::extract::SignalExtractor;
use self::recommend::{categorize, ActionRecommender};
use self::route::TeamRouter;
use crate::catalog::{Catalog, CatalogError, TeamCatalog, TeamId};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TriageError {
    #[error("invalid incident report: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// Incident severity, totally ordered with `Critical` as the maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl SeverityLevel {
    pub const ALL: [SeverityLevel; 4] = [
        SeverityLevel::Low,
        SeverityLevel::Medium,
        SeverityLevel::High,
        SeverityLevel::Critical,
    ];

    /// High and critical incidents need escalation handling.
    pub fn needs_escalation(self) -> bool {
        self >= SeverityLevel::High
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SeverityLevel::Low => "low",
            SeverityLevel::Medium => "medium",
            SeverityLevel::High => "high",
            SeverityLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for SeverityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeverityLevel {
    type Err = TriageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(SeverityLevel::Low),
            "medium" => Ok(SeverityLevel::Medium),
            "high" => Ok(SeverityLevel::High),
            "critical" => Ok(SeverityLevel::Critical),
            other => Err(TriageError::Validation(format!("unknown severity '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportSource {
    Monitoring,
    UserReport,
    #[default]
    Api,
    Chat,
}

/// Raw incident input. Only `title` and `description` are required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentReport {
    pub title: String,
    pub description: String,
    #[serde(default = "default_reporter")]
    pub reporter: String,
    #[serde(default)]
    pub source: ReportSource,
    #[serde(default)]
    pub affected_systems: BTreeSet<String>,
    #[serde(default)]
    pub severity_indicators: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_logs: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_reporter() -> String {
    "unknown".to_string()
}

impl IncidentReport {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            reporter: default_reporter(),
            source: ReportSource::default(),
            affected_systems: BTreeSet::new(),
            severity_indicators: BTreeSet::new(),
            error_logs: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_systems<I, S>(mut self, systems: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.affected_systems.extend(systems.into_iter().map(Into::into));
        self
    }

    pub fn with_indicators<I, S>(mut self, indicators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.severity_indicators
            .extend(indicators.into_iter().map(Into::into));
        self
    }

    pub fn with_reporter(mut self, reporter: impl Into<String>) -> Self {
        self.reporter = reporter.into();
        self
    }

    pub fn with_source(mut self, source: ReportSource) -> Self {
        self.source = source;
        self
    }

    /// Reject reports with a blank title or description.
    pub fn validate(&self) -> Result<(), TriageError> {
        if self.title.trim().is_empty() {
            return Err(TriageError::Validation("title must not be empty".into()));
        }
        if self.description.trim().is_empty() {
            return Err(TriageError::Validation("description must not be empty".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Identifiers and decisions
// ---------------------------------------------------------------------------

/// Incident identifier of the form `INC-<YYYYMMDD>-<8 hex>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IncidentId(String);

impl IncidentId {
    pub fn generate(at: DateTime<Utc>) -> Self {
        let random = Uuid::new_v4().simple().to_string();
        Self(format!("INC-{}-{}", at.format("%Y%m%d"), &random[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IncidentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IncidentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for IncidentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Output of the triage pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriageDecision {
    pub incident_id: IncidentId,
    pub severity: SeverityLevel,
    pub assigned_teams: BTreeSet<TeamId>,
    pub suggested_actions: Vec<String>,
    pub escalation_needed: bool,
    #[serde(default)]
    pub security_incident: bool,
    /// Severity weighted by impact scope; higher sorts first.
    #[serde(default)]
    pub priority_score: u64,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The four pipeline stages bundled together.
#[derive(Debug, Clone)]
pub struct TriageEngine {
    extractor: SignalExtractor,
    classifier: SeverityClassifier,
    router: TeamRouter,
    recommender: ActionRecommender,
}

impl TriageEngine {
    /// Engine with the default lexicon and rule table over `catalog`.
    pub fn new(catalog: Catalog) -> Result<Self, CatalogError> {
        Self::with_classifier(catalog, SeverityClassifier::default())
    }

    pub fn with_classifier(
        catalog: Catalog,
        classifier: SeverityClassifier,
    ) -> Result<Self, CatalogError> {
        let router = TeamRouter::new(Arc::new(catalog.teams), catalog.routes)?;
        Ok(Self {
            extractor: SignalExtractor::default(),
            classifier,
            router,
            recommender: ActionRecommender::new(catalog.runbooks),
        })
    }

    pub fn teams(&self) -> &Arc<TeamCatalog> {
        self.router.teams()
    }

    /// Triage a new report under a freshly generated incident id.
    pub fn triage(&self, report: &IncidentReport) -> Result<TriageDecision, TriageError> {
        self.assess(report, IncidentId::generate(Utc::now()))
    }

    /// Triage `report` for an existing incident id. Deterministic: the same
    /// report and id always produce the same decision.
    pub fn assess(
        &self,
        report: &IncidentReport,
        incident_id: IncidentId,
    ) -> Result<TriageDecision, TriageError> {
        report.validate()?;

        let features = self.extractor.extract(report);
        let rule = self.classifier.winning_rule(&features);
        let severity = rule.map(|r| r.severity).unwrap_or(SeverityLevel::Low);
        let assigned_teams = self.router.route(severity, features.systems());
        let categories = categorize(&features);
        let suggested_actions =
            self.recommender
                .recommend_for(severity, features.systems(), &categories);
        let security_incident = priority::is_security_incident(&features);
        let priority_score = priority::priority_score(severity, features.systems().len(), security_incident);

        debug!(
            incident_id = %incident_id,
            %severity,
            rule = rule.map(|r| r.name.as_str()).unwrap_or("none"),
            teams = assigned_teams.len(),
            actions = suggested_actions.len(),
            security_incident,
            priority_score,
            "triage complete"
        );

        Ok(TriageDecision {
            incident_id,
            severity,
            assigned_teams,
            suggested_actions,
            escalation_needed: severity.needs_escalation(),
            security_incident,
            priority_score,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> TriageEngine {
        TriageEngine::new(Catalog::builtin()).unwrap()
    }

    #[test]
    fn test_severity_order() {
        assert!(SeverityLevel::Critical > SeverityLevel::High);
        assert!(SeverityLevel::High > SeverityLevel::Medium);
        assert!(SeverityLevel::Medium > SeverityLevel::Low);
        assert_eq!(SeverityLevel::ALL.iter().max(), Some(&SeverityLevel::Critical));
    }

    #[test]
    fn test_severity_parse() {
        assert_eq!("HIGH".parse::<SeverityLevel>().unwrap(), SeverityLevel::High);
        assert!("sev0".parse::<SeverityLevel>().is_err());
    }

    #[test]
    fn test_incident_id_format() {
        let at = DateTime::parse_from_rfc3339("2026-03-04T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let id = IncidentId::generate(at);
        let s = id.as_str();
        assert!(s.starts_with("INC-20260304-"), "{s}");
        let suffix = &s["INC-20260304-".len()..];
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(IncidentId::generate(at), id);
    }

    #[test]
    fn test_validation_rejects_blank_fields() {
        let engine = engine();
        let err = engine.triage(&IncidentReport::new("  ", "body")).unwrap_err();
        assert!(matches!(err, TriageError::Validation(ref m) if m.contains("title")));
        let err = engine.triage(&IncidentReport::new("title", "")).unwrap_err();
        assert!(matches!(err, TriageError::Validation(ref m) if m.contains("description")));
    }

    #[test]
    fn test_report_defaults_from_json() {
        let report: IncidentReport =
            serde_json::from_str(r#"{"title": "API slow", "description": "p95 up"}"#).unwrap();
        assert_eq!(report.reporter, "unknown");
        assert_eq!(report.source, ReportSource::Api);
        assert!(report.affected_systems.is_empty());
        assert!(report.severity_indicators.is_empty());
    }

    #[test]
    fn test_escalation_needed_tracks_severity() {
        let engine = engine();
        let report = IncidentReport::new("Search is slow", "Latency doubled").with_systems(["api"]);
        let decision = engine.triage(&report).unwrap();
        assert_eq!(decision.severity, SeverityLevel::High);
        assert!(decision.escalation_needed);

        let report = IncidentReport::new("Typo on pricing page", "Minor cosmetic fix").with_systems(["web"]);
        let decision = engine.triage(&report).unwrap();
        assert_eq!(decision.severity, SeverityLevel::Low);
        assert!(!decision.escalation_needed);
    }

    fn database_outage() -> IncidentReport {
        IncidentReport::new("Database connection failure", "Pool exhausted")
            .with_systems(["database", "api"])
            .with_indicators(["critical", "outage"])
    }

    #[test]
    fn test_database_outage_is_critical() {
        let decision = engine().triage(&database_outage()).unwrap();
        assert_eq!(decision.severity, SeverityLevel::Critical);
        assert!(decision.assigned_teams.contains(&TeamId::new("SRE")));
        assert!(decision.escalation_needed);
        assert!(!decision.security_incident);
        assert_eq!(decision.priority_score, 2000);
    }

    #[test]
    fn test_security_incident_doubles_priority() {
        let report = IncidentReport::new("Unauthorized access", "Admin tokens leaked").with_systems(["auth"]);
        let decision = engine().triage(&report).unwrap();
        assert!(decision.security_incident);
        assert_eq!(
            decision.priority_score,
            priority::priority_score(decision.severity, 1, true)
        );
    }

    #[test]
    fn test_assess_is_idempotent() {
        let engine = engine();
        let report = database_outage();
        let id = IncidentId::from("INC-20260101-deadbeef");
        assert_eq!(
            engine.assess(&report, id.clone()).unwrap(),
            engine.assess(&report, id).unwrap()
        );
    }
}
