//! Behavior-driven tests for the rate-limited remote client.
//!
//! These tests verify how the client spends its call budget, when it retries
//! and what it surfaces once it gives up.

mod support;

use std::time::Duration;

use stockdb_core::remote::{DailyRequest, TradeCalendarRequest};
use stockdb_core::{
    Backoff, RemoteClient, RemoteError, RemoteErrorKind, RemoteOperation, RetryPolicy,
};
use support::{date, policy, ScriptedTransport};
use tokio::time::Instant;

fn daily(day: &str) -> DailyRequest {
    DailyRequest {
        trade_date: date(day),
        ts_codes: Vec::new(),
    }
}

// =============================================================================
// Remote Client: Call Window
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_budget_is_spent_calls_wait_for_the_oldest_to_leave_the_window() {
    // Given: A budget of two daily calls per minute
    let transport = ScriptedTransport::new();
    transport.trade("20230103", &[("600000.SH", 10.0)]);
    let policy = policy().with_quota(2, Duration::from_secs(60));
    let mut client = RemoteClient::new(transport.clone(), &policy).with_token("t");
    let started = Instant::now();

    // When: Five calls are made back to back
    for _ in 0..5 {
        client.call(&daily("20230103")).await.expect("call");
    }

    // Then: Calls three and five each waited out a full window
    assert_eq!(transport.calls(RemoteOperation::Daily).len(), 5);
    assert_eq!(started.elapsed(), Duration::from_secs(120));
    assert_eq!(client.window().in_window(RemoteOperation::Daily), 1);
}

#[tokio::test(start_paused = true)]
async fn operations_have_independent_budgets() {
    // Given: A budget of two calls per operation
    let transport = ScriptedTransport::new();
    transport.open_dates(&["20230103"]);
    let policy = policy().with_quota(2, Duration::from_secs(60));
    let mut client = RemoteClient::new(transport.clone(), &policy).with_token("t");
    let started = Instant::now();

    // When: Two daily and two calendar calls are made
    for _ in 0..2 {
        client.call(&daily("20230103")).await.expect("daily");
        client
            .call(&TradeCalendarRequest {
                exchange: "SSE".to_string(),
                start_date: date("20230101"),
                end_date: date("20230105"),
                open_only: true,
            })
            .await
            .expect("calendar");
    }

    // Then: Nobody waited
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(client.window().in_window(RemoteOperation::TradeCalendar), 2);
}

// =============================================================================
// Remote Client: Retries
// =============================================================================

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_until_the_call_succeeds() {
    // Given: A provider that drops the first two calls
    let transport = ScriptedTransport::new();
    transport.trade("20230103", &[("600000.SH", 10.0)]);
    transport.fail_next(RemoteOperation::Daily, RemoteError::transport("reset"));
    transport.fail_next(RemoteOperation::Daily, RemoteError::provider(-2, "busy"));
    let policy = policy().with_retry(RetryPolicy::default().with_backoff(Backoff::Fixed {
        delay: Duration::from_secs(1),
    }));
    let mut client = RemoteClient::new(transport.clone(), &policy).with_token("t");

    // When: One call is made
    let rows = client.call(&daily("20230103")).await.expect("eventually ok");

    // Then: The third attempt answered
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].ts_code, "600000.SH");
    assert_eq!(transport.calls(RemoteOperation::Daily).len(), 3);
}

#[tokio::test(start_paused = true)]
async fn bounded_retries_surface_the_last_error() {
    // Given: A provider that keeps failing and a three-attempt policy
    let transport = ScriptedTransport::new();
    for _ in 0..5 {
        transport.fail_next(RemoteOperation::Daily, RemoteError::provider(-2, "busy"));
    }
    let policy = policy().with_retry(RetryPolicy::bounded(3).with_backoff(Backoff::Fixed {
        delay: Duration::from_millis(10),
    }));
    let mut client = RemoteClient::new(transport.clone(), &policy).with_token("t");

    // When: One call is made
    let error = client.call(&daily("20230103")).await.expect_err("gives up");

    // Then: Exactly three attempts reached the provider
    assert_eq!(error.kind(), RemoteErrorKind::Provider);
    assert_eq!(transport.calls(RemoteOperation::Daily).len(), 3);
}

#[tokio::test]
async fn malformed_payloads_fail_without_retry() {
    // Given: A provider answering with a payload of the wrong shape
    let transport = ScriptedTransport::new();
    transport.fail_next(RemoteOperation::Daily, RemoteError::decode("not a table"));
    let policy = policy().with_retry(RetryPolicy::default());
    let mut client = RemoteClient::new(transport.clone(), &policy).with_token("t");

    // When: One call is made
    let error = client.call(&daily("20230103")).await.expect_err("fatal");

    // Then: The error is returned after a single attempt
    assert_eq!(error.kind(), RemoteErrorKind::Decode);
    assert_eq!(transport.calls(RemoteOperation::Daily).len(), 1);
}

#[tokio::test]
async fn calls_without_a_token_never_reach_the_provider() {
    // Given: A client with no token
    let transport = ScriptedTransport::new();
    let mut client = RemoteClient::new(transport.clone(), &policy());

    // When: A call is made
    let error = client.call(&daily("20230103")).await.expect_err("no token");

    // Then: It fails as a configuration problem
    assert_eq!(error.kind(), RemoteErrorKind::MissingToken);
    assert!(transport.calls(RemoteOperation::Daily).is_empty());
}
