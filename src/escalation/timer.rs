//! Cancellable per-incident ack timers.
//!
//! Each pending timer is a spawned task racing a `CancellationToken` against
//! `tokio::time::sleep`. Timers are keyed by incident id with a generation
//! counter, so a rescheduled timer can never be removed by its predecessor.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::triage::IncidentId;

#[derive(Debug)]
struct PendingTimer {
    generation: u64,
    token: CancellationToken,
}

type PendingMap = Arc<Mutex<HashMap<IncidentId, PendingTimer>>>;

#[derive(Debug, Default)]
pub struct EscalationTimers {
    pending: PendingMap,
    next_generation: AtomicU64,
}

fn lock(pending: &PendingMap) -> MutexGuard<'_, HashMap<IncidentId, PendingTimer>> {
    // The map holds no invariant a panicking holder could break.
    pending.lock().unwrap_or_else(|e| e.into_inner())
}

impl EscalationTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `on_fire` after `delay` unless cancelled first. Replaces (and
    /// cancels) any timer already pending for `id`.
    pub fn schedule<F>(&self, id: IncidentId, delay: Duration, on_fire: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();

        let previous = lock(&self.pending).insert(
            id.clone(),
            PendingTimer {
                generation,
                token: token.clone(),
            },
        );
        if let Some(previous) = previous {
            previous.token.cancel();
        }
        debug!(incident_id = %id, delay_secs = delay.as_secs(), "ack timer scheduled");

        let pending = self.pending.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!(incident_id = %id, "ack timer cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    let current = {
                        let mut map = lock(&pending);
                        match map.get(&id) {
                            Some(t) if t.generation == generation => {
                                map.remove(&id);
                                true
                            }
                            _ => false,
                        }
                    };
                    if current {
                        debug!(incident_id = %id, "ack timer fired");
                        on_fire.await;
                    }
                }
            }
        });
    }

    /// Cancel the pending timer for `id`. Returns whether one was pending;
    /// cancelling an absent, fired or already cancelled timer is a no-op.
    pub fn cancel(&self, id: &IncidentId) -> bool {
        match lock(&self.pending).remove(id) {
            Some(timer) => {
                timer.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, id: &IncidentId) -> bool {
        lock(&self.pending).contains_key(id)
    }

    pub fn len(&self) -> usize {
        lock(&self.pending).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn cancel_all(&self) {
        for (_, timer) in lock(&self.pending).drain() {
            timer.token.cancel();
        }
    }
}
