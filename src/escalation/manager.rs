//! Owns live incidents and drives their state machines.
//!
//! Every incident sits behind its own `tokio::sync::Mutex`, so events for
//! one incident are serialized while different incidents proceed in
//! parallel. Timer effects are applied while the incident lock is held;
//! notifications are handed to a spawned task after it is released, and that
//! task re-locks only to append the delivery outcome.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::{Mutex, RwLock};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::incident::{Effect, Incident};
use super::timer::EscalationTimers;
use super::{EscalationError, IncidentEvent};
use crate::config::EscalationConfig;
use crate::notify::{self, Audience, Dispatcher, RetryPolicy};
use crate::triage::{IncidentId, IncidentReport, TriageDecision};

/// Actor recorded for dispatch outcomes.
const DISPATCH_ACTOR: &str = "dispatcher";

type IncidentHandle = Arc<Mutex<Incident>>;

struct Inner {
    incidents: RwLock<HashMap<IncidentId, IncidentHandle>>,
    timers: EscalationTimers,
    notifications: TaskTracker,
    stopped: AtomicBool,
    dispatcher: Arc<dyn Dispatcher>,
    retry: RetryPolicy,
    config: EscalationConfig,
}

/// Cheap to clone; all clones share the same incidents.
#[derive(Clone)]
pub struct IncidentManager {
    inner: Arc<Inner>,
}

impl IncidentManager {
    pub fn new(dispatcher: Arc<dyn Dispatcher>, config: EscalationConfig, retry: RetryPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                incidents: RwLock::new(HashMap::new()),
                timers: EscalationTimers::new(),
                notifications: TaskTracker::new(),
                stopped: AtomicBool::new(false),
                dispatcher,
                retry,
                config,
            }),
        }
    }

    /// Register a triaged incident and complete intake. Returns the snapshot
    /// after the intake transition.
    pub async fn open(
        &self,
        report: IncidentReport,
        decision: TriageDecision,
    ) -> Result<Incident, EscalationError> {
        let id = decision.incident_id.clone();
        let handle: IncidentHandle = Arc::new(Mutex::new(Incident::new(report, decision, Utc::now())));

        // Hold the incident lock across registration so no other event can
        // observe it before intake completes.
        let mut incident = handle.lock().await;
        {
            let mut incidents = self.inner.incidents.write().await;
            if incidents.contains_key(&id) {
                return Err(EscalationError::AlreadyExists(id));
            }
            incidents.insert(id.clone(), handle.clone());
        }
        info!(
            incident_id = %id,
            severity = %incident.severity(),
            teams = incident.decision().assigned_teams.len(),
            "incident opened"
        );
        let (snapshot, audiences) = self.apply_locked(&mut incident, IncidentEvent::TriageComplete)?;
        drop(incident);

        self.spawn_notifications(&handle, &snapshot, audiences);
        Ok(snapshot)
    }

    pub async fn acknowledge(&self, id: &IncidentId, actor: impl Into<String>) -> Result<Incident, EscalationError> {
        self.dispatch_event(id, IncidentEvent::Acknowledge { actor: actor.into() })
            .await
    }

    pub async fn resolve(
        &self,
        id: &IncidentId,
        actor: impl Into<String>,
        note: impl Into<String>,
    ) -> Result<Incident, EscalationError> {
        self.dispatch_event(
            id,
            IncidentEvent::Resolve {
                actor: actor.into(),
                note: note.into(),
            },
        )
        .await
    }

    pub async fn close(&self, id: &IncidentId, actor: impl Into<String>) -> Result<Incident, EscalationError> {
        self.dispatch_event(id, IncidentEvent::Close { actor: actor.into() })
            .await
    }

    /// Replace the report and decision of a live incident.
    pub async fn retriage(
        &self,
        id: &IncidentId,
        report: IncidentReport,
        decision: TriageDecision,
        actor: impl Into<String>,
    ) -> Result<Incident, EscalationError> {
        self.dispatch_event(
            id,
            IncidentEvent::Retriage {
                report: Box::new(report),
                decision,
                actor: actor.into(),
            },
        )
        .await
    }

    /// Escalate an incident that is still waiting for an ack. Called by the
    /// ack timer; an incident that was acknowledged first rejects it.
    pub async fn ack_timeout(&self, id: &IncidentId) -> Result<Incident, EscalationError> {
        self.dispatch_event(id, IncidentEvent::AckTimeout).await
    }

    pub async fn get(&self, id: &IncidentId) -> Result<Incident, EscalationError> {
        let handle = self.handle(id).await?;
        let incident = handle.lock().await;
        Ok(incident.clone())
    }

    /// Snapshots ordered by priority score (highest first), then severity,
    /// then opening time.
    pub async fn list(&self) -> Vec<Incident> {
        let handles: Vec<IncidentHandle> = self.inner.incidents.read().await.values().cloned().collect();
        let mut snapshots = Vec::with_capacity(handles.len());
        for handle in handles {
            snapshots.push(handle.lock().await.clone());
        }
        snapshots.sort_by(|a, b| {
            b.priority_score()
                .cmp(&a.priority_score())
                .then(b.severity().cmp(&a.severity()))
                .then(a.opened_at().cmp(&b.opened_at()))
                .then_with(|| a.id().as_str().cmp(b.id().as_str()))
        });
        snapshots
    }

    pub async fn len(&self) -> usize {
        self.inner.incidents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Whether an ack timer is pending for `id`.
    pub fn ack_timer_pending(&self, id: &IncidentId) -> bool {
        self.inner.timers.is_pending(id)
    }

    /// Wait until every notification spawned so far has finished and
    /// recorded its outcome. The tracker stays closed once shut down.
    pub async fn flush_notifications(&self) {
        let tracker = &self.inner.notifications;
        tracker.close();
        tracker.wait().await;
        if !self.inner.stopped.load(Ordering::Acquire) {
            tracker.reopen();
        }
    }

    /// Stop all timers and wait for in-flight notifications.
    pub async fn shutdown(&self) {
        self.inner.stopped.store(true, Ordering::Release);
        self.inner.timers.cancel_all();
        self.inner.notifications.close();
        self.inner.notifications.wait().await;
        info!("incident manager stopped");
    }

    async fn handle(&self, id: &IncidentId) -> Result<IncidentHandle, EscalationError> {
        self.inner
            .incidents
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| EscalationError::NotFound(id.clone()))
    }

    async fn dispatch_event(&self, id: &IncidentId, event: IncidentEvent) -> Result<Incident, EscalationError> {
        let handle = self.handle(id).await?;
        let (snapshot, audiences) = {
            let mut incident = handle.lock().await;
            self.apply_locked(&mut incident, event)?
        };
        self.spawn_notifications(&handle, &snapshot, audiences);
        Ok(snapshot)
    }

    /// Apply `event` and carry out its timer effects. Returns the snapshot and
    /// the audiences still to be notified.
    fn apply_locked(
        &self,
        incident: &mut Incident,
        event: IncidentEvent,
    ) -> Result<(Incident, Vec<Audience>), EscalationError> {
        let from = incident.status();
        let event_name = event.name();
        let effects = match incident.apply(event, Utc::now()) {
            Ok(effects) => effects,
            Err(e) => {
                debug!(incident_id = %incident.id(), %from, event = event_name, error = %e, "event rejected");
                return Err(e);
            }
        };
        info!(
            incident_id = %incident.id(),
            %from,
            to = %incident.status(),
            event = event_name,
            "incident transitioned"
        );

        let mut audiences = Vec::new();
        for effect in effects {
            match effect {
                Effect::Notify(audience) => audiences.push(audience),
                Effect::ScheduleAckTimeout(severity) => {
                    let delay = self.inner.config.ack_timeout(severity);
                    let manager = self.clone();
                    let id = incident.id().clone();
                    self.inner.timers.schedule(id.clone(), delay, async move {
                        if let Err(e) = manager.ack_timeout(&id).await {
                            debug!(incident_id = %id, error = %e, "ack timeout ignored");
                        }
                    });
                }
                Effect::CancelAckTimeout => {
                    self.inner.timers.cancel(incident.id());
                }
            }
        }

        Ok((incident.clone(), audiences))
    }

    fn spawn_notifications(&self, handle: &IncidentHandle, snapshot: &Incident, audiences: Vec<Audience>) {
        if audiences.is_empty() {
            return;
        }
        let handle = handle.clone();
        let dispatcher = self.inner.dispatcher.clone();
        let retry = self.inner.retry.clone();
        let id = snapshot.id().clone();
        let decision = snapshot.decision().clone();

        self.inner.notifications.spawn(async move {
            let outcomes = join_all(
                audiences
                    .iter()
                    .map(|audience| notify::deliver(dispatcher.as_ref(), audience, &decision, &id, &retry)),
            )
            .await;

            let mut incident = handle.lock().await;
            for (audience, outcome) in audiences.iter().zip(outcomes) {
                let (action, note) = match outcome {
                    Ok(attempts) => ("notification_sent", format!("{audience} after {attempts} attempt(s)")),
                    Err(failure) => {
                        warn!(incident_id = %id, %audience, attempts = failure.attempts, error = %failure.last_error, "notification failed");
                        ("dispatch_failed", failure.to_string())
                    }
                };
                if let Err(e) = incident.record(DISPATCH_ACTOR, action, Some(note), Utc::now()) {
                    debug!(incident_id = %id, %audience, error = %e, "dispatch outcome not recorded");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TeamId;
    use crate::escalation::IncidentStatus;
    use crate::notify::memory::MemoryDispatcher;
    use crate::triage::priority::priority_score;
    use crate::triage::SeverityLevel;
    use std::time::Duration;

    fn manager_with(dispatcher: MemoryDispatcher) -> (IncidentManager, Arc<MemoryDispatcher>) {
        let dispatcher = Arc::new(dispatcher);
        let retry = RetryPolicy {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(50),
            send_timeout: Duration::from_secs(1),
        };
        let manager = IncidentManager::new(dispatcher.clone(), EscalationConfig::default(), retry);
        (manager, dispatcher)
    }

    fn decision(id: &str, severity: SeverityLevel) -> TriageDecision {
        TriageDecision {
            incident_id: IncidentId::from(id),
            severity,
            assigned_teams: [TeamId::new("SRE")].into_iter().collect(),
            suggested_actions: vec![],
            escalation_needed: severity.needs_escalation(),
            security_incident: false,
            priority_score: priority_score(severity, 1, false),
        }
    }

    fn report() -> IncidentReport {
        IncidentReport::new("Queue backlog", "Consumers lagging").with_reporter("pager")
    }

    fn actions(incident: &Incident) -> Vec<String> {
        incident.timeline().iter().map(|e| e.action.clone()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_notifies_and_records_delivery() {
        let (manager, dispatcher) = manager_with(MemoryDispatcher::new());
        let id = IncidentId::from("INC-A");
        let inc = manager.open(report(), decision("INC-A", SeverityLevel::Medium)).await.unwrap();
        assert_eq!(inc.status(), IncidentStatus::Notified);
        assert!(manager.ack_timer_pending(&id));

        manager.flush_notifications().await;
        assert_eq!(dispatcher.sent().len(), 1);
        let inc = manager.get(&id).await.unwrap();
        assert_eq!(actions(&inc), ["created", "notified", "notification_sent"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_and_missing_ids() {
        let (manager, _) = manager_with(MemoryDispatcher::new());
        manager.open(report(), decision("INC-B", SeverityLevel::Low)).await.unwrap();
        assert_eq!(
            manager.open(report(), decision("INC-B", SeverityLevel::Low)).await.unwrap_err(),
            EscalationError::AlreadyExists(IncidentId::from("INC-B"))
        );
        let missing = IncidentId::from("INC-missing");
        assert_eq!(
            manager.acknowledge(&missing, "x").await.unwrap_err(),
            EscalationError::NotFound(missing)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unacknowledged_incident_escalates() {
        let (manager, dispatcher) = manager_with(MemoryDispatcher::new());
        let id = IncidentId::from("INC-C");
        manager.open(report(), decision("INC-C", SeverityLevel::Medium)).await.unwrap();

        tokio::time::sleep(Duration::from_secs(15 * 60 + 1)).await;
        let inc = manager.get(&id).await.unwrap();
        assert_eq!(inc.status(), IncidentStatus::Escalated);
        assert!(!manager.ack_timer_pending(&id));

        manager.flush_notifications().await;
        assert!(dispatcher.sent().iter().any(|n| n.audience == Audience::Broader));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_before_timeout_prevents_escalation() {
        let (manager, dispatcher) = manager_with(MemoryDispatcher::new());
        let id = IncidentId::from("INC-D");
        manager.open(report(), decision("INC-D", SeverityLevel::High)).await.unwrap();

        tokio::time::sleep(Duration::from_secs(60)).await;
        let inc = manager.acknowledge(&id, "erin").await.unwrap();
        assert_eq!(inc.status(), IncidentStatus::Acknowledged);
        assert!(!manager.ack_timer_pending(&id));

        tokio::time::sleep(Duration::from_secs(3600)).await;
        manager.flush_notifications().await;
        assert_eq!(manager.get(&id).await.unwrap().status(), IncidentStatus::Acknowledged);
        assert!(!dispatcher.sent().iter().any(|n| n.audience == Audience::Broader));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_timeout_after_ack_is_rejected() {
        let (manager, _) = manager_with(MemoryDispatcher::new());
        let id = IncidentId::from("INC-E");
        manager.open(report(), decision("INC-E", SeverityLevel::Low)).await.unwrap();
        manager.acknowledge(&id, "frank").await.unwrap();

        let err = manager.ack_timeout(&id).await.unwrap_err();
        assert!(matches!(
            err,
            EscalationError::InvalidTransition { from: IncidentStatus::Acknowledged, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_dispatch_is_recorded_and_does_not_block() {
        let (manager, _) = manager_with(MemoryDispatcher::new().always_fail());
        let id = IncidentId::from("INC-F");
        manager.open(report(), decision("INC-F", SeverityLevel::Medium)).await.unwrap();
        manager.acknowledge(&id, "gina").await.unwrap();

        manager.flush_notifications().await;
        let inc = manager.get(&id).await.unwrap();
        assert_eq!(inc.status(), IncidentStatus::Acknowledged);
        let failure = inc.timeline().iter().find(|e| e.action == "dispatch_failed").unwrap();
        assert!(failure.note.as_deref().unwrap().contains("2 attempt(s)"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_incident_rejects_everything() {
        let (manager, _) = manager_with(MemoryDispatcher::new());
        let id = IncidentId::from("INC-G");
        manager.open(report(), decision("INC-G", SeverityLevel::Critical)).await.unwrap();
        manager.resolve(&id, "hank", "failover complete").await.unwrap();
        manager.close(&id, "hank").await.unwrap();

        let before = manager.get(&id).await.unwrap();
        assert_eq!(
            manager.acknowledge(&id, "x").await.unwrap_err(),
            EscalationError::TerminalState(id.clone())
        );
        assert_eq!(
            manager
                .retriage(&id, report(), decision("INC-G", SeverityLevel::Low), "x")
                .await
                .unwrap_err(),
            EscalationError::TerminalState(id.clone())
        );
        manager.flush_notifications().await;
        assert_eq!(manager.get(&id).await.unwrap().timeline(), before.timeline());
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_orders_by_severity_then_age() {
        let (manager, _) = manager_with(MemoryDispatcher::new());
        manager.open(report(), decision("INC-1", SeverityLevel::Low)).await.unwrap();
        manager.open(report(), decision("INC-2", SeverityLevel::Critical)).await.unwrap();
        manager.open(report(), decision("INC-3", SeverityLevel::Low)).await.unwrap();

        let ids: Vec<String> = manager
            .list()
            .await
            .iter()
            .map(|i| i.id().to_string())
            .collect();
        assert_eq!(ids[0], "INC-2");
        assert_eq!(ids.len(), 3);
        assert_eq!(manager.len().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_prefers_wide_security_incidents() {
        let (manager, _) = manager_with(MemoryDispatcher::new());
        let mut narrow = decision("INC-narrow", SeverityLevel::High);
        narrow.priority_score = priority_score(SeverityLevel::High, 1, false);
        let mut wide = decision("INC-wide", SeverityLevel::High);
        wide.security_incident = true;
        wide.priority_score = priority_score(SeverityLevel::High, 3, true);
        manager.open(report(), narrow).await.unwrap();
        manager.open(report(), wide).await.unwrap();
        manager.open(report(), decision("INC-low", SeverityLevel::Low)).await.unwrap();

        let listed = manager.list().await;
        let ids: Vec<&str> = listed.iter().map(|i| i.id().as_str()).collect();
        assert_eq!(ids, ["INC-wide", "INC-narrow", "INC-low"]);
        assert!(listed[0].is_security_incident());
        assert_eq!(listed[0].priority_score(), 600);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_timers() {
        let (manager, _) = manager_with(MemoryDispatcher::new());
        let id = IncidentId::from("INC-H");
        manager.open(report(), decision("INC-H", SeverityLevel::Low)).await.unwrap();
        manager.shutdown().await;
        assert!(!manager.ack_timer_pending(&id));

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(manager.get(&id).await.unwrap().status(), IncidentStatus::Notified);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_after_shutdown_keeps_tracker_closed() {
        let (manager, _) = manager_with(MemoryDispatcher::new());
        manager.open(report(), decision("INC-I", SeverityLevel::Medium)).await.unwrap();

        manager.flush_notifications().await;
        assert!(!manager.inner.notifications.is_closed());

        manager.shutdown().await;
        manager.flush_notifications().await;
        assert!(manager.inner.notifications.is_closed());
    }
}
