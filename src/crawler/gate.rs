//! Rate-limited request gate shared by every walk in a process
//!
//! All gated calls run on a single timeline: a permit holds the gate's lock
//! for the duration of the call it guards, and the next permit is only
//! granted once `interval` has elapsed since the previous call completed.

use crate::config::GateConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;

#[derive(Debug)]
struct GateState {
    /// Wait applied before the next permit
    interval: Duration,

    /// When the last permitted call finished
    last_completed: Option<Instant>,
}

/// Process-wide minimum-interval gate with exponential backoff
#[derive(Debug, Clone)]
pub struct RateGate {
    state: Arc<Mutex<GateState>>,
    baseline: Duration,
    ceiling: Duration,
}

impl RateGate {
    /// Creates a gate
    ///
    /// # Arguments
    ///
    /// * `min_interval` - Baseline wait between the end of one call and the start of the next
    /// * `max_interval` - Ceiling for the backoff interval
    pub fn new(min_interval: Duration, max_interval: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(GateState {
                interval: min_interval,
                last_completed: None,
            })),
            baseline: min_interval,
            ceiling: max_interval.max(min_interval),
        }
    }

    pub fn from_config(config: &GateConfig) -> Self {
        Self::new(config.min_interval(), config.max_interval())
    }

    pub fn baseline(&self) -> Duration {
        self.baseline
    }

    /// The wait the next `acquire` will apply
    pub async fn current_interval(&self) -> Duration {
        self.state.lock().await.interval
    }

    /// Waits for the gate and returns a permit for exactly one outbound call
    ///
    /// Concurrent callers queue on the gate's lock, so they are served one
    /// at a time in arrival order.
    pub async fn acquire(&self) -> GatePermit {
        let state = Arc::clone(&self.state).lock_owned().await;

        if let Some(last) = state.last_completed {
            let ready_at = last + state.interval;
            let now = Instant::now();
            if ready_at > now {
                tracing::debug!(
                    wait_ms = (ready_at - now).as_millis() as u64,
                    "Waiting for rate gate"
                );
                tokio::time::sleep_until(ready_at).await;
            }
        }

        GatePermit {
            state,
            baseline: self.baseline,
            ceiling: self.ceiling,
        }
    }
}

/// Exclusive right to issue one call through the gate
///
/// Dropping the permit marks the call as completed and starts the next
/// interval.
#[derive(Debug)]
pub struct GatePermit {
    state: OwnedMutexGuard<GateState>,
    baseline: Duration,
    ceiling: Duration,
}

impl GatePermit {
    /// Ends the permit after a successful call, resetting the interval to baseline
    pub fn record_success(mut self) {
        if self.state.interval != self.baseline {
            tracing::debug!(
                interval_ms = self.baseline.as_millis() as u64,
                "Rate gate back to baseline"
            );
        }
        self.state.interval = self.baseline;
    }

    /// Ends the permit after a throttling signal, doubling the interval up to the ceiling
    ///
    /// # Returns
    ///
    /// The interval the next `acquire` will wait
    pub fn record_throttled(mut self) -> Duration {
        let doubled = self
            .state
            .interval
            .checked_mul(2)
            .unwrap_or(self.ceiling)
            .min(self.ceiling);
        // A zero baseline would never grow by doubling
        let next = if doubled.is_zero() {
            self.ceiling
        } else {
            doubled
        };

        tracing::warn!(
            interval_ms = next.as_millis() as u64,
            "Throttled by counterparty, backing off"
        );
        self.state.interval = next;
        next
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.state.last_completed = Some(Instant::now());
    }
}
