use std::env;
use std::time::Duration;

use crate::retry::RetryPolicy;

pub const DEFAULT_TUSHARE_ENDPOINT: &str = "http://api.tushare.pro";

/// Connection, quota and retry settings for the remote provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderPolicy {
    pub endpoint: String,
    pub request_timeout: Duration,
    pub quota_window: Duration,
    pub quota_limit: u32,
    pub retry: RetryPolicy,
}

impl ProviderPolicy {
    /// Defaults for the provider's standard account tier: 200 calls per
    /// operation per minute, waiting out the window on any transient failure.
    pub fn tushare_default() -> Self {
        Self {
            endpoint: DEFAULT_TUSHARE_ENDPOINT.to_string(),
            request_timeout: Duration::from_secs(30),
            quota_window: Duration::from_secs(60),
            quota_limit: 200,
            retry: RetryPolicy::default(),
        }
    }

    /// Defaults with the endpoint overridden by `STOCKDB_TUSHARE_URL` when set.
    pub fn from_env() -> Self {
        let mut policy = Self::tushare_default();
        if let Ok(endpoint) = env::var("STOCKDB_TUSHARE_URL") {
            if !endpoint.trim().is_empty() {
                policy.endpoint = endpoint.trim().to_string();
            }
        }
        policy
    }

    pub fn with_quota(mut self, quota_limit: u32, quota_window: Duration) -> Self {
        self.quota_limit = quota_limit;
        self.quota_window = quota_window;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}
