use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::info;

use crate::provider_policy::ProviderPolicy;
use crate::remote::RemoteOperation;

/// Per-operation call budget over a rolling time window.
///
/// Each operation keeps the instants of its calls inside the window. When the
/// budget is spent, [`CallWindow::acquire`] sleeps until the oldest call falls
/// out of the window, so no window of `quota_window` ever holds more than
/// `quota_limit` calls of one operation.
#[derive(Debug)]
pub struct CallWindow {
    quota_window: Duration,
    quota_limit: usize,
    calls: HashMap<RemoteOperation, VecDeque<Instant>>,
}

impl CallWindow {
    pub fn new(quota_window: Duration, quota_limit: u32) -> Self {
        Self {
            quota_window,
            quota_limit: usize::try_from(quota_limit.max(1)).unwrap_or(usize::MAX),
            calls: HashMap::new(),
        }
    }

    pub fn from_policy(policy: &ProviderPolicy) -> Self {
        Self::new(policy.quota_window, policy.quota_limit)
    }

    /// Take one slot for `operation`, blocking while the window is full.
    pub async fn acquire(&mut self, operation: RemoteOperation) {
        let quota_window = self.quota_window;
        let quota_limit = self.quota_limit;
        let calls = self.calls.entry(operation).or_default();

        let now = Instant::now();
        expire(calls, now, quota_window);

        if calls.len() >= quota_limit {
            if let Some(oldest) = calls.front().copied() {
                let wait = (oldest + quota_window).saturating_duration_since(now);
                info!(
                    operation = %operation,
                    wait_ms = wait.as_millis() as u64,
                    "call budget exhausted, waiting for rate window"
                );
                sleep(wait).await;
            }
            expire(calls, Instant::now(), quota_window);
        }

        calls.push_back(Instant::now());
    }

    /// Time until the oldest call of `operation` leaves the window.
    pub fn remaining(&self, operation: RemoteOperation) -> Duration {
        let now = Instant::now();
        self.calls
            .get(&operation)
            .and_then(|calls| {
                calls
                    .iter()
                    .find(|at| now.saturating_duration_since(**at) < self.quota_window)
            })
            .map_or(Duration::ZERO, |oldest| {
                (*oldest + self.quota_window).saturating_duration_since(now)
            })
    }

    /// Calls of `operation` still inside the window.
    pub fn in_window(&self, operation: RemoteOperation) -> usize {
        let now = Instant::now();
        self.calls.get(&operation).map_or(0, |calls| {
            calls
                .iter()
                .filter(|at| now.saturating_duration_since(**at) < self.quota_window)
                .count()
        })
    }
}

fn expire(calls: &mut VecDeque<Instant>, now: Instant, quota_window: Duration) {
    while let Some(oldest) = calls.front() {
        if now.saturating_duration_since(*oldest) >= quota_window {
            calls.pop_front();
        } else {
            break;
        }
    }
}
