use ::duckdb::{params, Connection};

struct Migration {
    version: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "0001_reference_tables",
        sql: r#"
CREATE TABLE IF NOT EXISTS configs (
    code TEXT PRIMARY KEY,
    name TEXT,
    value TEXT NOT NULL,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS currencies (
    code TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS regions (
    code TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    level INTEGER,
    parent TEXT,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS firms (
    code TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    region TEXT,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS markets (
    code TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    acronym TEXT UNIQUE,
    region TEXT,
    currency TEXT,
    website TEXT,
    opened_on DATE,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS subjects (
    code TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    level INTEGER NOT NULL DEFAULT 1,
    market TEXT NOT NULL,
    parent TEXT,
    opened_on DATE,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS periods (
    code TEXT PRIMARY KEY,
    name TEXT NOT NULL
);
"#,
    },
    Migration {
        version: "0002_instrument_tables",
        sql: r#"
CREATE SEQUENCE IF NOT EXISTS seq_stocks_id START 1;

CREATE TABLE IF NOT EXISTS stocks (
    id BIGINT PRIMARY KEY DEFAULT nextval('seq_stocks_id'),
    code TEXT NOT NULL UNIQUE,
    native_code TEXT NOT NULL,
    remote_code TEXT NOT NULL,
    isin TEXT,
    name TEXT NOT NULL,
    market TEXT NOT NULL,
    subject TEXT,
    firm TEXT,
    status TEXT NOT NULL,
    is_listed BOOLEAN NOT NULL DEFAULT TRUE,
    listed_on DATE,
    delisted_on DATE,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS stock_periods (
    stock TEXT NOT NULL,
    period TEXT NOT NULL,
    date DATE NOT NULL,
    market TEXT NOT NULL,
    open DOUBLE,
    high DOUBLE,
    low DOUBLE,
    close DOUBLE,
    pre_close DOUBLE,
    change DOUBLE,
    percent DOUBLE,
    volume DOUBLE,
    amount DOUBLE,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY(stock, period, date),
    CHECK (volume IS NULL OR volume >= 0),
    CHECK (amount IS NULL OR amount >= 0)
);

CREATE TABLE IF NOT EXISTS indexes (
    code TEXT PRIMARY KEY,
    native_code TEXT NOT NULL,
    remote_code TEXT NOT NULL,
    name TEXT NOT NULL,
    market TEXT,
    publisher TEXT,
    category TEXT,
    base_date DATE,
    listed_on DATE,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS sync_log (
    run_id TEXT NOT NULL,
    job TEXT NOT NULL,
    market TEXT,
    created BIGINT NOT NULL,
    updated BIGINT NOT NULL,
    skipped BIGINT NOT NULL,
    failed BIGINT NOT NULL,
    cancelled BOOLEAN NOT NULL DEFAULT FALSE,
    started_at TIMESTAMP NOT NULL,
    finished_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    },
    Migration {
        version: "0003_indexes",
        sql: r#"
CREATE INDEX IF NOT EXISTS idx_stocks_market ON stocks(market);
CREATE INDEX IF NOT EXISTS idx_stock_periods_period_market_date
    ON stock_periods(period, market, date);
CREATE INDEX IF NOT EXISTS idx_sync_log_job_started ON sync_log(job, started_at);
"#,
    },
];

pub fn apply_migrations(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    )?;

    for migration in MIGRATIONS {
        let applied_count: i64 = connection.query_row(
            "SELECT COUNT(*) FROM schema_migrations WHERE version = ?",
            params![migration.version],
            |row| row.get(0),
        )?;

        if applied_count == 0 {
            connection.execute_batch(migration.sql)?;
            connection.execute(
                "INSERT INTO schema_migrations (version) VALUES (?)",
                params![migration.version],
            )?;
        }
    }

    Ok(())
}
