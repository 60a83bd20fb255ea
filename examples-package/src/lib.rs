//! Shared setup for the runnable demos

use anyhow::Result;
use sqlcache::{DataType, SqliteSource, TableDef};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install a formatting subscriber honoring `RUST_LOG`, `info` otherwise
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

pub fn users_table() -> TableDef {
    TableDef::new("users")
        .column("id", DataType::Int64, false)
        .column("username", DataType::Utf8, false)
        .column("signed_up", DataType::Date32, false)
}

pub fn records_table() -> TableDef {
    TableDef::new("records")
        .column("id", DataType::Uuid, false)
        .column("user_id", DataType::Int64, false)
        .column("amount", DataType::Float64, false)
        .column("created_at", DataType::Timestamp, false)
}

/// An in-memory primary store with a few users and their records
pub fn seeded_source() -> Result<SqliteSource> {
    let source = SqliteSource::open_in_memory()?;
    source.execute_batch(
        "CREATE TABLE users (
             id INTEGER PRIMARY KEY,
             username TEXT NOT NULL UNIQUE,
             signed_up TEXT NOT NULL
         );
         CREATE TABLE records (
             id TEXT PRIMARY KEY,
             user_id INTEGER NOT NULL REFERENCES users(id),
             amount REAL NOT NULL,
             created_at TEXT NOT NULL
         );
         INSERT INTO users VALUES
             (1, 'alice', '2024-01-15'),
             (2, 'bob', '2024-02-01'),
             (3, 'carol', '2024-03-10');
         INSERT INTO records VALUES
             ('0b7c6a52-31d4-4f0e-8d8a-6f3c1e2b9a01', 1, 12.5, '2024-04-01 09:30:00'),
             ('1c8d7b63-42e5-4a1f-9e9b-7a4d2f3cab12', 1, 30.0, '2024-04-02 14:00:00'),
             ('2d9e8c74-53f6-4b20-8fac-8b5e3a4dbc23', 2, 7.25, '2024-04-03T08:15:00+02:00'),
             ('3eaf9d85-6407-4c31-9abd-9c6f4b5ecd34', 3, 99.0, '2024-04-05 18:45:00');",
    )?;
    Ok(source)
}
