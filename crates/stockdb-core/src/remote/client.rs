use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::provider_policy::ProviderPolicy;
use crate::remote::{ProviderTransport, RemoteCall, RemoteError, RemoteRequest, RemoteTable};
use crate::retry::RetryPolicy;
use crate::sync::CancelFlag;
use crate::throttling::CallWindow;

/// How often a backoff sleep looks at the cancel flag.
const CANCEL_POLL: Duration = Duration::from_secs(1);

/// Rate-limited, retrying client for provider operations.
///
/// One client is meant to be owned by one sync job; the call window is not
/// shared between instances.
pub struct RemoteClient {
    transport: Arc<dyn ProviderTransport>,
    token: Option<String>,
    window: CallWindow,
    retry: RetryPolicy,
    cancel: CancelFlag,
}

impl RemoteClient {
    pub fn new(transport: Arc<dyn ProviderTransport>, policy: &ProviderPolicy) -> Self {
        Self {
            transport,
            token: None,
            window: CallWindow::from_policy(policy),
            retry: policy.retry.clone(),
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.set_cancel_flag(cancel);
        self
    }

    /// Share the owning job's flag so pending retries stop with it.
    pub fn set_cancel_flag(&mut self, cancel: CancelFlag) {
        self.cancel = cancel;
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.set_token(token);
        self
    }

    pub fn set_token(&mut self, token: impl Into<String>) {
        let token = token.into();
        self.token = (!token.trim().is_empty()).then_some(token);
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    pub fn window(&self) -> &CallWindow {
        &self.window
    }

    /// Invoke one provider operation and decode its rows.
    ///
    /// A single malformed row fails the call; use [`RemoteClient::call_table`]
    /// to decode rows one by one.
    pub async fn call<R: RemoteRequest>(
        &mut self,
        request: &R,
    ) -> Result<Vec<R::Row>, RemoteError> {
        self.call_table(request).await?.decode_rows::<R::Row>()
    }

    /// Invoke one provider operation and return its raw table.
    ///
    /// Every attempt takes a slot from the call window. Failures the retry
    /// policy accepts are retried after its backoff; anything else is returned.
    ///
    /// # Errors
    /// Returns a `MissingToken` error without calling the provider when no
    /// token is configured, a `Cancelled` error once the cancel flag is seen
    /// between attempts, or the last error once the policy gives up.
    pub async fn call_table<R: RemoteRequest>(
        &mut self,
        request: &R,
    ) -> Result<RemoteTable, RemoteError> {
        let token = self.token.clone().ok_or_else(RemoteError::missing_token)?;
        let call = RemoteCall::from_request(request);
        let mut attempts = 0_u32;

        loop {
            if self.cancel.is_cancelled() {
                return Err(RemoteError::cancelled());
            }
            self.window.acquire(call.operation).await;
            attempts = attempts.saturating_add(1);
            debug!(operation = %call.operation, attempt = attempts, "calling provider");

            match self.transport.fetch(token.as_str(), &call).await {
                Ok(table) => return Ok(table),
                Err(error) if self.retry.should_retry(&error, attempts) => {
                    let delay = self
                        .retry
                        .delay_for_attempt(attempts - 1, self.window.remaining(call.operation));
                    warn!(
                        operation = %call.operation,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "provider call failed, retrying"
                    );
                    self.backoff(delay).await?;
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// Sleep for `delay`, waking early with `Cancelled` if the flag is raised.
    async fn backoff(&self, delay: Duration) -> Result<(), RemoteError> {
        let deadline = Instant::now() + delay;
        loop {
            if self.cancel.is_cancelled() {
                info!("retry abandoned after cancellation");
                return Err(RemoteError::cancelled());
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            sleep(CANCEL_POLL.min(deadline - now)).await;
        }
    }
}
