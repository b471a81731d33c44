//! End-to-end incident flows: report in, triage, escalation, notifications.
//!
//! Timer-driven flows run on tokio's paused clock, so a 15 minute ack
//! timeout completes instantly and deterministically.

use std::sync::Arc;
use std::time::Duration;

use incidentmedic::catalog::TeamId;
use incidentmedic::config::AppConfig;
use incidentmedic::desk::IncidentDesk;
use incidentmedic::escalation::IncidentStatus;
use incidentmedic::notify::memory::MemoryDispatcher;
use incidentmedic::notify::Audience;
use incidentmedic::triage::{IncidentReport, SeverityLevel};

fn desk_with(dispatcher: MemoryDispatcher, config: AppConfig) -> (IncidentDesk, Arc<MemoryDispatcher>) {
    let dispatcher = Arc::new(dispatcher);
    let desk = IncidentDesk::with_dispatcher(&config, dispatcher.clone()).unwrap();
    (desk, dispatcher)
}

fn desk() -> (IncidentDesk, Arc<MemoryDispatcher>) {
    desk_with(MemoryDispatcher::new(), AppConfig::default())
}

fn database_outage() -> IncidentReport {
    IncidentReport::new(
        "Primary database outage",
        "Database cluster is down, API requests failing",
    )
    .with_systems(["database", "api"])
    .with_indicators(["critical", "outage"])
    .with_reporter("pagerduty")
}

fn frontend_glitch() -> IncidentReport {
    IncidentReport::new(
        "Button misaligned on settings page",
        "The save button overlaps the footer on narrow screens",
    )
    .with_systems(["frontend"])
}

fn actions(incident: &incidentmedic::escalation::Incident) -> Vec<&str> {
    incident.timeline().iter().map(|e| e.action.as_str()).collect()
}

#[tokio::test(start_paused = true)]
async fn test_critical_outage_escalates_on_intake() {
    let (desk, dispatcher) = desk();
    let incident = desk.submit(database_outage()).await.unwrap();

    let decision = incident.decision();
    assert_eq!(decision.severity, SeverityLevel::Critical);
    assert!(decision.escalation_needed);
    assert!(decision.assigned_teams.contains(&TeamId::new("SRE")));
    assert!(decision.assigned_teams.contains(&TeamId::new("Database")));
    assert_eq!(
        decision.suggested_actions[0],
        "Notify primary on-call engineer immediately"
    );

    assert_eq!(incident.status(), IncidentStatus::Escalated);
    assert_eq!(actions(&incident), ["created", "escalated"]);
    assert!(!desk.manager().ack_timer_pending(incident.id()));

    desk.manager().flush_notifications().await;
    let sent = dispatcher.sent();
    assert!(sent.iter().any(|n| n.audience == Audience::Broader));
    assert!(sent
        .iter()
        .any(|n| n.audience == Audience::Team(TeamId::new("SRE"))));
    assert_eq!(sent.len(), decision.assigned_teams.len() + 1);
}

#[tokio::test(start_paused = true)]
async fn test_cosmetic_frontend_issue_settles_at_notified() {
    let (desk, dispatcher) = desk();
    let incident = desk.submit(frontend_glitch()).await.unwrap();

    let decision = incident.decision();
    assert_eq!(decision.severity, SeverityLevel::Low);
    assert!(!decision.escalation_needed);
    assert_eq!(
        decision.assigned_teams.iter().map(|t| t.as_str()).collect::<Vec<_>>(),
        ["Frontend"]
    );
    assert_eq!(incident.status(), IncidentStatus::Notified);
    assert!(desk.manager().ack_timer_pending(incident.id()));

    desk.manager().flush_notifications().await;
    assert_eq!(
        dispatcher.sent()[0].audience,
        Audience::Team(TeamId::new("Frontend"))
    );
}

#[tokio::test(start_paused = true)]
async fn test_triage_is_idempotent_for_an_unchanged_report() {
    let (desk, _) = desk();
    let report = database_outage();
    let id = incidentmedic::triage::IncidentId::from("INC-20260101-cafef00d");
    let first = desk.engine().assess(&report, id.clone()).unwrap();
    let second = desk.engine().assess(&report, id).unwrap();
    assert_eq!(first, second);
}

#[tokio::test(start_paused = true)]
async fn test_ack_before_timeout_prevents_escalation() {
    let (desk, dispatcher) = desk();
    let incident = desk.submit(frontend_glitch()).await.unwrap();
    let id = incident.id().clone();

    // Low severity waits 30 minutes; ack at 29.
    tokio::time::sleep(Duration::from_secs(29 * 60)).await;
    desk.acknowledge(&id, "frontend-oncall").await.unwrap();

    tokio::time::sleep(Duration::from_secs(2 * 3600)).await;
    desk.manager().flush_notifications().await;

    let incident = desk.get(&id).await.unwrap();
    assert_eq!(incident.status(), IncidentStatus::Acknowledged);
    assert!(!actions(&incident).contains(&"escalated"));
    assert!(!dispatcher
        .sent()
        .iter()
        .any(|n| n.audience == Audience::Broader));
}

#[tokio::test(start_paused = true)]
async fn test_unacknowledged_incident_escalates_after_timeout() {
    let (desk, dispatcher) = desk();
    let report = IncidentReport::new("Search is slow", "Latency doubled since the deploy")
        .with_systems(["api"]);
    let incident = desk.submit(report).await.unwrap();
    assert_eq!(incident.severity(), SeverityLevel::High);
    let id = incident.id().clone();

    // High severity waits 5 minutes.
    tokio::time::sleep(Duration::from_secs(5 * 60 + 1)).await;
    desk.manager().flush_notifications().await;

    let incident = desk.get(&id).await.unwrap();
    assert_eq!(incident.status(), IncidentStatus::Escalated);
    let escalated = incident
        .timeline()
        .iter()
        .find(|e| e.action == "escalated")
        .unwrap();
    assert_eq!(escalated.actor, "system");
    assert!(dispatcher
        .sent()
        .iter()
        .any(|n| n.audience == Audience::Broader));

    // A late ack is no longer valid once escalated.
    assert!(desk.acknowledge(&id, "late").await.is_err());
    desk.resolve(&id, "backend-oncall", "rolled back deploy")
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_ack_and_timeout_have_one_winner() {
    for _ in 0..20 {
        let (desk, _) = desk();
        let incident = desk.submit(frontend_glitch()).await.unwrap();
        let id = incident.id().clone();

        let ack = {
            let desk = desk.clone();
            let id = id.clone();
            tokio::spawn(async move { desk.acknowledge(&id, "racer").await })
        };
        let timeout = {
            let manager = desk.manager().clone();
            let id = id.clone();
            tokio::spawn(async move { manager.ack_timeout(&id).await })
        };
        let ack = ack.await.unwrap();
        let timeout = timeout.await.unwrap();

        assert!(ack.is_ok() ^ timeout.is_ok(), "exactly one of ack/timeout must win");
        let incident = desk.get(&id).await.unwrap();
        let expected = if ack.is_ok() {
            IncidentStatus::Acknowledged
        } else {
            IncidentStatus::Escalated
        };
        assert_eq!(incident.status(), expected);
        desk.manager().shutdown().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_dispatch_retries_then_records_failure() {
    let mut config = AppConfig::default();
    config.dispatch.max_attempts = 3;
    config.dispatch.initial_backoff_ms = 100;
    let (desk, dispatcher) = desk_with(MemoryDispatcher::new().always_fail(), config);

    let incident = desk.submit(frontend_glitch()).await.unwrap();
    let id = incident.id().clone();

    // State progression does not wait for delivery.
    desk.acknowledge(&id, "frontend-oncall").await.unwrap();
    desk.manager().flush_notifications().await;

    assert_eq!(dispatcher.attempts(), 3);
    let incident = desk.get(&id).await.unwrap();
    assert_eq!(incident.status(), IncidentStatus::Acknowledged);
    let failed = incident
        .timeline()
        .iter()
        .find(|e| e.action == "dispatch_failed")
        .unwrap();
    assert_eq!(failed.actor, "dispatcher");
    assert!(failed.note.as_deref().unwrap().contains("3 attempt(s)"));
}

#[tokio::test(start_paused = true)]
async fn test_flaky_channel_recovers_within_retry_budget() {
    let (desk, dispatcher) = desk_with(MemoryDispatcher::new().fail_first(1), AppConfig::default());
    let incident = desk.submit(frontend_glitch()).await.unwrap();
    desk.manager().flush_notifications().await;

    assert_eq!(dispatcher.sent().len(), 1);
    let incident = desk.get(incident.id()).await.unwrap();
    let sent = incident
        .timeline()
        .iter()
        .find(|e| e.action == "notification_sent")
        .unwrap();
    assert!(sent.note.as_deref().unwrap().contains("2 attempt(s)"));
}

#[tokio::test(start_paused = true)]
async fn test_retriage_lower_severity_keeps_status() {
    let (desk, dispatcher) = desk();
    let incident = desk.submit(database_outage()).await.unwrap();
    let id = incident.id().clone();
    desk.manager().flush_notifications().await;
    let before = dispatcher.sent().len();

    let calmer = IncidentReport::new(
        "Database replica lag",
        "Minor lag on one replica, primary healthy",
    )
    .with_systems(["database"]);
    let incident = desk.retriage(&id, calmer, "dba").await.unwrap();
    assert!(incident.severity() < SeverityLevel::Critical);
    assert_eq!(incident.status(), IncidentStatus::Escalated);

    desk.manager().flush_notifications().await;
    // No team was added, so nobody new is paged.
    assert_eq!(dispatcher.sent().len(), before);
}

#[tokio::test(start_paused = true)]
async fn test_full_lifecycle_to_closed() {
    let (desk, _) = desk();
    let incident = desk.submit(frontend_glitch()).await.unwrap();
    let id = incident.id().clone();

    desk.acknowledge(&id, "fe").await.unwrap();
    desk.resolve(&id, "fe", "css fix shipped").await.unwrap();
    desk.close(&id, "fe-lead").await.unwrap();
    desk.manager().flush_notifications().await;

    let incident = desk.get(&id).await.unwrap();
    assert_eq!(incident.status(), IncidentStatus::Closed);
    assert!(desk.acknowledge(&id, "again").await.is_err());

    let stamps: Vec<_> = incident.timeline().iter().map(|e| e.timestamp).collect();
    assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
}
