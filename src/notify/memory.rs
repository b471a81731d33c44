//! In-memory dispatcher.
//!
//! Records every delivered notification. Can be told to fail or stall so the
//! retry path and the escalation manager can be exercised without a network.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{Audience, DispatchError, Dispatcher};
use crate::triage::{IncidentId, SeverityLevel, TriageDecision};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotification {
    pub audience: Audience,
    pub incident_id: IncidentId,
    pub severity: SeverityLevel,
}

#[derive(Debug, Default)]
pub struct MemoryDispatcher {
    sent: Mutex<Vec<SentNotification>>,
    attempts: AtomicU32,
    /// Remaining sends to reject; `u32::MAX` rejects forever.
    failures_left: AtomicU32,
    latency: Option<Duration>,
}

impl MemoryDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `n` sends, then succeed.
    pub fn fail_first(self, n: u32) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    pub fn always_fail(self) -> Self {
        self.fail_first(u32::MAX)
    }

    /// Sleep before every send.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Successful deliveries, in arrival order.
    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Every call to `send`, failed ones included.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Dispatcher for MemoryDispatcher {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn send(
        &self,
        audience: &Audience,
        decision: &TriageDecision,
        incident_id: &IncidentId,
    ) -> Result<(), DispatchError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let rejected = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                0 => None,
                u32::MAX => Some(u32::MAX),
                n => Some(n - 1),
            })
            .is_ok();
        if rejected {
            return Err(DispatchError::Rejected(format!("{audience} unavailable")));
        }

        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(SentNotification {
                audience: audience.clone(),
                incident_id: incident_id.clone(),
                severity: decision.severity,
            });
        Ok(())
    }
}
