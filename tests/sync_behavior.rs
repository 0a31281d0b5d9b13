//! Behavior-driven tests for the entity and time-series synchronizers.
//!
//! These tests drive a full engine against a scripted provider and a real
//! DuckDB warehouse, asserting on what ends up stored.

mod support;

use std::time::Duration;

use serde_json::json;
use stockdb_core::{
    DailySyncOptions, IndexSyncOptions, RemoteError, RemoteOperation, RetryPolicy,
    StockSyncOptions, SyncError, ValidationError,
};
use support::{
    bar_row, date, engine, engine_with_policy, policy, seed_listing, stock_row, ScriptedTransport,
};
use tempfile::tempdir;

fn xshg_daily() -> DailySyncOptions {
    DailySyncOptions {
        market: Some("XSHG".to_string()),
        ..DailySyncOptions::default()
    }
}

// =============================================================================
// Entity Synchronizer: Stocks
// =============================================================================

#[tokio::test]
async fn when_listing_is_synced_twice_the_second_run_only_updates() {
    // Given: A provider listing three stocks
    let temp = tempdir().expect("tempdir");
    let transport = ScriptedTransport::new();
    seed_listing(&transport);
    let mut engine = engine(&temp, &transport);

    // When: The listing is synced twice
    let first = engine
        .sync_stocks(&StockSyncOptions::default())
        .await
        .expect("first sync");
    let stored = engine
        .warehouse()
        .get_stock("XSHG600000")
        .expect("query")
        .expect("stored");
    let second = engine
        .sync_stocks(&StockSyncOptions::default())
        .await
        .expect("second sync");

    // Then: Nothing new is created and identity is preserved
    assert_eq!(first.created, 3);
    assert_eq!(second.created, 0);
    assert_eq!(second.updated, 3);
    let again = engine
        .warehouse()
        .get_stock("XSHG600000")
        .expect("query")
        .expect("stored");
    assert_eq!(again.id, stored.id);
    assert_eq!(again.created_at, stored.created_at);
    assert_eq!(again.record.subject.as_deref(), Some("XSHG.MAIN"));
    assert_eq!(again.record.listed_on.as_deref(), Some("1999-11-10"));
}

#[tokio::test]
async fn incomplete_and_unmapped_rows_are_skipped_with_a_reason() {
    // Given: A listing with one good row and three unusable ones
    let temp = tempdir().expect("tempdir");
    let transport = ScriptedTransport::new();
    let mut nameless = stock_row("600036.SH", "", "主板", "L");
    nameless[2] = json!("  ");
    let mut foreign = stock_row("AAPL.O", "Apple", "", "L");
    foreign[6] = json!("NASDAQ");
    let mut no_exchange = stock_row("00700.HK", "腾讯控股", "", "L");
    no_exchange[6] = serde_json::Value::Null;
    transport.list_stocks(
        "L",
        vec![
            stock_row("600000.SH", "浦发银行", "主板", "L"),
            nameless,
            foreign,
            no_exchange,
        ],
    );
    let mut engine = engine(&temp, &transport);

    // When: The listing is synced
    let report = engine
        .sync_stocks(&StockSyncOptions::default())
        .await
        .expect("sync");

    // Then: Only the complete, mapped row is stored
    assert_eq!(report.created, 1);
    let reasons: Vec<_> = report.skipped.iter().map(|row| row.reason.as_str()).collect();
    assert_eq!(
        reasons,
        vec!["missing symbol or name", "unmapped market", "missing market"]
    );
    assert!(engine
        .warehouse()
        .get_stock("XSHG600036")
        .expect("query")
        .is_none());
}

#[tokio::test]
async fn delisted_partition_marks_stocks_as_not_listed() {
    // Given: A stock that only appears among delisted instruments
    let temp = tempdir().expect("tempdir");
    let transport = ScriptedTransport::new();
    let mut row = stock_row("600001.SH", "邯郸钢铁", "主板", "D");
    row[7] = serde_json::Value::Null;
    row[9] = json!("20091229");
    transport.list_stocks("D", vec![row]);
    let mut engine = engine(&temp, &transport);

    // When: The listing is synced
    engine
        .sync_stocks(&StockSyncOptions::default())
        .await
        .expect("sync");

    // Then: Its status comes from the partition it was listed under
    let stored = engine
        .warehouse()
        .get_stock("XSHG600001")
        .expect("query")
        .expect("stored");
    assert_eq!(stored.record.status, "delisted");
    assert!(!stored.record.is_listed);
    assert_eq!(stored.record.delisted_on.as_deref(), Some("2009-12-29"));
}

#[tokio::test]
async fn market_filter_asks_the_provider_for_one_exchange() {
    // Given: A listing spanning two exchanges
    let temp = tempdir().expect("tempdir");
    let transport = ScriptedTransport::new();
    seed_listing(&transport);
    let mut engine = engine(&temp, &transport);

    // When: Only Shenzhen is synced
    let report = engine
        .sync_stocks(&StockSyncOptions {
            market: Some("XSHE".to_string()),
            ..StockSyncOptions::default()
        })
        .await
        .expect("sync");

    // Then: Every partition call named the exchange and only its stock landed
    assert_eq!(report.created, 1);
    let calls = transport.calls(RemoteOperation::StockBasic);
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|call| call.param("exchange") == Some("SZSE")));
}

#[tokio::test]
async fn unknown_market_filter_is_rejected() {
    let temp = tempdir().expect("tempdir");
    let transport = ScriptedTransport::new();
    let mut engine = engine(&temp, &transport);

    let error = engine
        .sync_stocks(&StockSyncOptions {
            market: Some("XNYS".to_string()),
            ..StockSyncOptions::default()
        })
        .await
        .expect_err("unknown market");

    assert!(matches!(
        error,
        SyncError::Validation(ValidationError::UnknownMarket { .. })
    ));
    assert!(transport.calls(RemoteOperation::StockBasic).is_empty());
}

// =============================================================================
// Entity Synchronizer: Indexes
// =============================================================================

#[tokio::test]
async fn index_listing_is_upserted_by_code() {
    // Given: Two indexes, one published on a local market
    let temp = tempdir().expect("tempdir");
    let transport = ScriptedTransport::new();
    transport.list_indexes(vec![
        vec![
            json!("000001.SH"),
            json!("上证指数"),
            json!("SSE"),
            json!("中证公司"),
            json!("综合指数"),
            json!("19901219"),
            json!("19910715"),
        ],
        vec![
            json!("000300.CSI"),
            json!("沪深300"),
            json!("CSI"),
            json!("中证公司"),
            json!("规模指数"),
            json!("20041231"),
            json!("20050408"),
        ],
    ]);
    let mut engine = engine(&temp, &transport);

    // When: The listing is synced twice
    let first = engine
        .sync_indexes(&IndexSyncOptions::default())
        .await
        .expect("first");
    let second = engine
        .sync_indexes(&IndexSyncOptions::default())
        .await
        .expect("second");

    // Then: Codes are stable and the second run only updates
    assert_eq!((first.created, first.updated), (2, 0));
    assert_eq!((second.created, second.updated), (0, 2));
    let codes = engine.warehouse().index_codes().expect("codes");
    assert!(codes.contains(&"XSHG000001".to_string()));
    assert!(codes.contains(&"000300.CSI".to_string()));
}

// =============================================================================
// Time-Series Synchronizer: Daily Bars
// =============================================================================

#[tokio::test]
async fn daily_sync_resumes_after_the_latest_stored_date() {
    // Given: Four open days, the first two already synced
    let temp = tempdir().expect("tempdir");
    let transport = ScriptedTransport::new();
    seed_listing(&transport);
    transport.open_dates(&["20230103", "20230104", "20230105", "20230106"]);
    for day in ["20230103", "20230104", "20230105", "20230106"] {
        transport.trade(day, &[("600000.SH", 10.0), ("600036.SH", 30.0)]);
    }
    let mut engine = engine(&temp, &transport);
    engine
        .sync_stocks(&StockSyncOptions::default())
        .await
        .expect("stocks");
    let first = engine
        .sync_daily(&DailySyncOptions {
            end: Some(date("20230104")),
            ..xshg_daily()
        })
        .await
        .expect("first pass");
    transport.clear_calls();

    // When: A sync runs without a date window
    let second = engine.sync_daily(&xshg_daily()).await.expect("second pass");

    // Then: It starts the day after the latest bar and stops at today
    assert_eq!((first.dates, first.created), (2, 4));
    assert_eq!((second.dates, second.created), (2, 4));
    let calendar = transport.calls(RemoteOperation::TradeCalendar);
    assert_eq!(calendar.len(), 1);
    assert_eq!(calendar[0].param("start_date"), Some("20230105"));
    assert_eq!(calendar[0].param("end_date"), Some(support::TODAY));
}

#[tokio::test]
async fn stored_dates_are_only_rewritten_when_update_is_requested() {
    // Given: One synced day whose provider prices later change
    let temp = tempdir().expect("tempdir");
    let transport = ScriptedTransport::new();
    seed_listing(&transport);
    transport.trade("20230103", &[("600000.SH", 10.0), ("600036.SH", 30.0)]);
    let mut engine = engine(&temp, &transport);
    engine
        .sync_stocks(&StockSyncOptions::default())
        .await
        .expect("stocks");
    let on_day = || DailySyncOptions {
        dates: vec![date("20230103")],
        ..xshg_daily()
    };
    engine.sync_daily(&on_day()).await.expect("initial");
    transport.trade("20230103", &[("600000.SH", 11.0), ("600036.SH", 31.0)]);

    // When: The day is synced again, first without and then with update
    let gated = engine.sync_daily(&on_day()).await.expect("gated");
    let close_after_gated = engine
        .warehouse()
        .get_stock_period("XSHG600000", "DAILY", "2023-01-03")
        .expect("query")
        .expect("bar")
        .record
        .close;
    let updated = engine
        .sync_daily(&DailySyncOptions {
            update: true,
            ..on_day()
        })
        .await
        .expect("updated");

    // Then: Only the update run touched stored bars
    assert_eq!((gated.created, gated.updated, gated.untouched), (0, 0, 2));
    assert_eq!(close_after_gated, Some(10.0));
    assert_eq!((updated.created, updated.updated), (0, 2));
    let bar = engine
        .warehouse()
        .get_stock_period("XSHG600000", "DAILY", "2023-01-03")
        .expect("query")
        .expect("bar");
    assert_eq!(bar.record.close, Some(11.0));
}

#[tokio::test]
async fn requested_symbols_are_fetched_in_provider_sized_chunks() {
    // Given: 250 listed Shanghai stocks
    let temp = tempdir().expect("tempdir");
    let transport = ScriptedTransport::new();
    let symbols: Vec<String> = (0..250).map(|n| format!("600{n:03}.SH")).collect();
    transport.list_stocks(
        "L",
        symbols
            .iter()
            .map(|symbol| stock_row(symbol, "测试", "主板", "L"))
            .collect(),
    );
    let closes: Vec<(&str, f64)> = symbols.iter().map(|symbol| (symbol.as_str(), 5.0)).collect();
    transport.trade("20230103", &closes);
    let mut engine = engine(&temp, &transport);
    engine
        .sync_stocks(&StockSyncOptions::default())
        .await
        .expect("stocks");

    // When: All of them are synced for one date
    let report = engine
        .sync_daily(&DailySyncOptions {
            dates: vec![date("20230103")],
            stocks: (0..250).map(|n| format!("XSHG600{n:03}")).collect(),
            ..xshg_daily()
        })
        .await
        .expect("daily");

    // Then: The provider saw calls of 100, 100 and 50 symbols
    let sizes: Vec<usize> = transport
        .calls(RemoteOperation::Daily)
        .iter()
        .map(|call| call.param("ts_code").map_or(0, |codes| codes.split(',').count()))
        .collect();
    assert_eq!(sizes, vec![100, 100, 50]);
    assert_eq!(report.created, 250);
}

#[tokio::test]
async fn bars_for_unknown_symbols_are_reported_not_written() {
    // Given: A day with a bar for a stock the warehouse does not know
    let temp = tempdir().expect("tempdir");
    let transport = ScriptedTransport::new();
    seed_listing(&transport);
    transport.trade("20230103", &[("600000.SH", 10.0), ("688999.SH", 50.0)]);
    let mut engine = engine(&temp, &transport);
    engine
        .sync_stocks(&StockSyncOptions::default())
        .await
        .expect("stocks");

    // When: The day is synced
    let report = engine
        .sync_daily(&DailySyncOptions {
            dates: vec![date("20230103")],
            ..xshg_daily()
        })
        .await
        .expect("daily");

    // Then: The known bar is stored and the unknown one is listed as skipped
    assert_eq!(report.created, 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].remote_code, "688999.SH");
    assert_eq!(report.skipped[0].reason, "no local stock for symbol");
}

#[tokio::test]
async fn bars_from_other_exchanges_are_ignored() {
    // Given: A full-market answer containing a Shenzhen bar
    let temp = tempdir().expect("tempdir");
    let transport = ScriptedTransport::new();
    seed_listing(&transport);
    transport.trade("20230103", &[("600000.SH", 10.0), ("000001.SZ", 12.0)]);
    let mut engine = engine(&temp, &transport);
    engine
        .sync_stocks(&StockSyncOptions::default())
        .await
        .expect("stocks");

    // When: Shanghai is synced
    let report = engine
        .sync_daily(&DailySyncOptions {
            dates: vec![date("20230103")],
            ..xshg_daily()
        })
        .await
        .expect("daily");

    // Then: Only the Shanghai bar counts
    assert_eq!(report.created, 1);
    assert!(report.skipped.is_empty());
    assert!(engine
        .warehouse()
        .get_stock_period("XSHE000001", "DAILY", "2023-01-03")
        .expect("query")
        .is_none());
}

#[tokio::test]
async fn cancelled_runs_stop_before_calling_the_provider_and_are_logged() {
    // Given: An engine whose cancel flag is already raised
    let temp = tempdir().expect("tempdir");
    let transport = ScriptedTransport::new();
    transport.open_dates(&["20230103"]);
    let mut engine = engine(&temp, &transport);
    engine.cancel_flag().cancel();

    // When: A daily sync is started
    let report = engine.sync_daily(&xshg_daily()).await.expect("daily");

    // Then: It reports cancellation without work and the run is recorded
    assert!(report.cancelled);
    assert_eq!(report.created, 0);
    assert!(transport.calls(RemoteOperation::TradeCalendar).is_empty());
    let history = engine.warehouse().sync_history(5).expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].run.job, "daily");
    assert!(history[0].run.cancelled);
}

#[tokio::test]
async fn inverted_date_windows_are_rejected() {
    let temp = tempdir().expect("tempdir");
    let transport = ScriptedTransport::new();
    let mut engine = engine(&temp, &transport);

    let error = engine
        .sync_daily(&DailySyncOptions {
            start: Some(date("20230110")),
            end: Some(date("20230103")),
            ..xshg_daily()
        })
        .await
        .expect_err("inverted");

    assert!(matches!(
        error,
        SyncError::Validation(ValidationError::InvertedDateRange { .. })
    ));
}

#[tokio::test]
async fn provider_failures_abort_the_daily_run() {
    // Given: A provider that rejects the bar request
    let temp = tempdir().expect("tempdir");
    let transport = ScriptedTransport::new();
    seed_listing(&transport);
    transport.trade("20230103", &[("600000.SH", 10.0)]);
    let mut engine = engine(&temp, &transport);
    engine
        .sync_stocks(&StockSyncOptions::default())
        .await
        .expect("stocks");
    transport.fail_next(
        RemoteOperation::Daily,
        RemoteError::provider(40203, "quota exceeded"),
    );

    // When: The day is synced
    let error = engine
        .sync_daily(&DailySyncOptions {
            dates: vec![date("20230103")],
            ..xshg_daily()
        })
        .await
        .expect_err("aborts");

    // Then: The provider error surfaces and nothing was written
    assert!(matches!(error, SyncError::Remote(_)));
    assert!(engine
        .warehouse()
        .get_stock_period("XSHG600000", "DAILY", "2023-01-03")
        .expect("query")
        .is_none());
}

#[tokio::test]
async fn malformed_provider_rows_are_skipped_without_losing_the_date() {
    // Given: A day where one provider row carries a non-numeric price
    let temp = tempdir().expect("tempdir");
    let transport = ScriptedTransport::new();
    seed_listing(&transport);
    let mut garbled = bar_row("600036.SH", "20230103", 30.0);
    garbled[2] = json!("N/A");
    transport.trade_rows(
        "20230103",
        vec![bar_row("600000.SH", "20230103", 10.0), garbled],
    );
    let mut engine = engine(&temp, &transport);
    engine
        .sync_stocks(&StockSyncOptions::default())
        .await
        .expect("stocks");

    // When: The day is synced
    let report = engine
        .sync_daily(&DailySyncOptions {
            dates: vec![date("20230103")],
            ..xshg_daily()
        })
        .await
        .expect("bad row stays local to the date");

    // Then: The good bar is stored and the bad row is reported by symbol
    assert_eq!(report.created, 1);
    assert_eq!(report.dates, 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].remote_code, "600036.SH");
    assert_eq!(report.skipped[0].date, "20230103");
    assert!(report.skipped[0].reason.starts_with("malformed provider row"));
    let warehouse = engine.warehouse();
    assert!(warehouse
        .get_stock_period("XSHG600000", "DAILY", "2023-01-03")
        .expect("query")
        .is_some());
    assert!(warehouse
        .get_stock_period("XSHG600036", "DAILY", "2023-01-03")
        .expect("query")
        .is_none());
}

#[tokio::test]
async fn rejected_bar_writes_are_reported_and_the_rest_of_the_date_is_kept() {
    // Given: A day where one bar decodes but violates the bar constraints
    let temp = tempdir().expect("tempdir");
    let transport = ScriptedTransport::new();
    seed_listing(&transport);
    let mut negative = bar_row("600036.SH", "20230103", 30.0);
    negative[9] = json!(-1.0);
    transport.trade_rows(
        "20230103",
        vec![bar_row("600000.SH", "20230103", 10.0), negative],
    );
    let mut engine = engine(&temp, &transport);
    engine
        .sync_stocks(&StockSyncOptions::default())
        .await
        .expect("stocks");

    // When: The day is synced
    let report = engine
        .sync_daily(&DailySyncOptions {
            dates: vec![date("20230103")],
            ..xshg_daily()
        })
        .await
        .expect("write failures do not abort");

    // Then: The failure is listed per bar and logged with the run
    assert_eq!(report.created, 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].stock, "XSHG600036");
    assert_eq!(report.failed[0].date, "2023-01-03");
    assert!(report.skipped.is_empty());
    let history = engine.warehouse().sync_history(5).expect("history");
    assert_eq!(history[0].run.job, "daily");
    assert_eq!(history[0].run.failed, 1);
}

#[tokio::test]
async fn named_stocks_outside_the_synced_market_are_reported() {
    // Given: A Shanghai run that also names a Shenzhen stock
    let temp = tempdir().expect("tempdir");
    let transport = ScriptedTransport::new();
    seed_listing(&transport);
    transport.trade("20230103", &[("600000.SH", 10.0), ("000001.SZ", 12.0)]);
    let mut engine = engine(&temp, &transport);
    engine
        .sync_stocks(&StockSyncOptions::default())
        .await
        .expect("stocks");

    // When: Both stocks are requested
    let report = engine
        .sync_daily(&DailySyncOptions {
            dates: vec![date("20230103")],
            stocks: vec!["XSHG600000".to_string(), "XSHE000001".to_string()],
            ..xshg_daily()
        })
        .await
        .expect("daily");

    // Then: The Shenzhen stock is skipped with its market named
    assert_eq!(report.created, 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].remote_code, "000001.SZ");
    assert!(report.skipped[0].reason.contains("XSHE"));
}

// =============================================================================
// Cancellation during provider retries
// =============================================================================

#[tokio::test(start_paused = true)]
async fn cancelling_during_endless_retries_returns_a_partial_report() {
    // Given: A provider that rejects every call and a policy that never gives up
    let temp = tempdir().expect("tempdir");
    let transport = ScriptedTransport::new();
    for _ in 0..10_000 {
        transport.fail_next(
            RemoteOperation::StockBasic,
            RemoteError::provider(40101, "token invalid"),
        );
    }
    let mut engine = engine_with_policy(
        &temp,
        &transport,
        &policy().with_retry(RetryPolicy::default()),
    );
    let cancel = engine.cancel_flag();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        cancel.cancel();
    });

    // When: A stock sync runs for at most a simulated day
    let report = tokio::time::timeout(
        Duration::from_secs(24 * 60 * 60),
        engine.sync_stocks(&StockSyncOptions::default()),
    )
    .await
    .expect("cancellation ends the retry loop")
    .expect("cancelled runs are not errors");

    // Then: The run stops as cancelled and is logged that way
    assert!(report.cancelled);
    assert_eq!(report.created, 0);
    let history = engine.warehouse().sync_history(5).expect("history");
    assert_eq!(history.len(), 1);
    assert!(history[0].run.cancelled);
}
