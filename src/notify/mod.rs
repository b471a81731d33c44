//! Notification dispatch.
//!
//! The escalation manager only knows the [`Dispatcher`] trait. Delivery goes
//! through [`deliver`], which bounds every attempt with a send timeout and
//! retries with capped exponential backoff. A delivery that exhausts its
//! attempts is reported as a [`DispatchFailure`]; callers record it and move
//! on, it is never fatal.

pub mod log;
pub mod memory;
pub mod message;
pub mod webhook;

use std::fmt;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::catalog::TeamId;
use crate::triage::{IncidentId, TriageDecision};

/// Who a notification is for.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    /// One of the assigned response teams.
    Team(TeamId),
    /// The wider escalation audience (leads, incident managers).
    Broader,
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Audience::Team(team) => write!(f, "team:{team}"),
            Audience::Broader => f.write_str("broader"),
        }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("send timed out after {0:?}")]
    Timeout(Duration),
    #[error("rejected by channel: {0}")]
    Rejected(String),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("no channel configured for team '{0}'")]
    UnknownTeam(TeamId),
}

impl DispatchError {
    /// Whether another attempt could succeed. An unknown team stays unknown.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, DispatchError::UnknownTeam(_))
    }
}

/// Outbound notification channel.
#[async_trait::async_trait]
pub trait Dispatcher: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Deliver one notification about `decision` to `audience`.
    async fn send(
        &self,
        audience: &Audience,
        decision: &TriageDecision,
        incident_id: &IncidentId,
    ) -> Result<(), DispatchError>;
}

/// Retry and timeout settings for one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Values below 1 are treated as 1.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub send_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            send_timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): doubling from the
    /// initial backoff, capped, plus up to 25% jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let base = self
            .initial_backoff
            .saturating_mul(1u32 << exp)
            .min(self.max_backoff);
        let jitter_ms = (base.as_millis() / 4) as u64;
        if jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}

/// A delivery that failed on every attempt.
#[derive(Debug, Error)]
#[error("delivery to {audience} failed after {attempts} attempt(s): {last_error}")]
pub struct DispatchFailure {
    pub audience: Audience,
    pub attempts: u32,
    pub last_error: DispatchError,
}

/// Deliver with retries. Returns the number of attempts used on success.
pub async fn deliver(
    dispatcher: &dyn Dispatcher,
    audience: &Audience,
    decision: &TriageDecision,
    incident_id: &IncidentId,
    policy: &RetryPolicy,
) -> Result<u32, DispatchFailure> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let result = tokio::time::timeout(
            policy.send_timeout,
            dispatcher.send(audience, decision, incident_id),
        )
        .await
        .unwrap_or(Err(DispatchError::Timeout(policy.send_timeout)));

        match result {
            Ok(()) => {
                debug!(
                    dispatcher = dispatcher.name(),
                    incident_id = %incident_id,
                    %audience,
                    attempt,
                    "notification delivered"
                );
                return Ok(attempt);
            }
            Err(e) if attempt < max_attempts && e.is_retryable() => {
                let delay = policy.backoff(attempt);
                warn!(
                    dispatcher = dispatcher.name(),
                    incident_id = %incident_id,
                    %audience,
                    attempt,
                    error = %e,
                    retry_in_ms = delay.as_millis() as u64,
                    "notification failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                return Err(DispatchFailure {
                    audience: audience.clone(),
                    attempts: attempt,
                    last_error: e,
                });
            }
        }
    }
}
