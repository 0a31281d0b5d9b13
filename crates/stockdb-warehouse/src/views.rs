//! Database views for coverage and audit queries.

use ::duckdb::Connection;

/// Create database views used by the reporting commands.
///
/// Creates the following views:
/// - `vw_period_coverage`: stored bar count per period, market and date
/// - `vw_listing_summary`: instrument count per market and listing status
/// - `vw_sync_history`: sync runs with their wall-clock duration
///
/// # Errors
/// Returns an error if the view creation SQL fails to execute.
pub fn create_views(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch(
        r"
CREATE OR REPLACE VIEW vw_period_coverage AS
SELECT
    period,
    market,
    date,
    COUNT(*) AS row_count
FROM stock_periods
GROUP BY period, market, date;

CREATE OR REPLACE VIEW vw_listing_summary AS
SELECT
    market,
    status,
    COUNT(*) AS instrument_count,
    SUM(CASE WHEN is_listed THEN 1 ELSE 0 END) AS listed_count
FROM stocks
GROUP BY market, status;

CREATE OR REPLACE VIEW vw_sync_history AS
SELECT
    run_id,
    job,
    market,
    created,
    updated,
    skipped,
    failed,
    cancelled,
    started_at,
    finished_at,
    date_diff('millisecond', started_at, finished_at) AS duration_ms
FROM sync_log;
",
    )?;

    Ok(())
}
