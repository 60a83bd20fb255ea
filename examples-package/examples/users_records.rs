//! Users and Records Example
//!
//! Caches two tables from a SQLite primary store and joins them through the
//! analytical store without going back to the source.

use anyhow::Result;
use arrow::util::pretty::print_batches;
use sqlcache::{CacheConfig, SelectQuery, SqlCache};
use sqlcache_examples::{init_tracing, records_table, seeded_source, users_table};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    println!("=== Users and Records Example ===\n");

    let source = seeded_source()?;
    let cache = SqlCache::new(CacheConfig::default());
    let users = users_table();
    let records = records_table();

    // Materialize both tables
    let cached_users = cache.query_db(&users.select(), &source).await?;
    let cached_records = cache.query_db(&records.select(), &source).await?;
    info!(
        "Cached {} users and {} records",
        cached_users.num_rows(),
        cached_records.num_rows()
    );

    println!("Users (from cache):");
    print_batches(cache.get("users")?.batches())?;
    println!();

    // Join across the cached tables
    let session = cache.begin();
    let totals = session
        .sql(
            "SELECT u.username, COUNT(*) AS records, SUM(r.amount) AS total, MAX(r.created_at) AS last_seen \
             FROM users u JOIN records r ON r.user_id = u.id \
             GROUP BY u.username \
             ORDER BY total DESC",
        )
        .await?;
    println!("Totals per user:");
    print_batches(&totals)?;
    println!();
    drop(session);

    // Refresh users with a filtered query; the cached table is replaced
    let recent = users
        .select()
        .filter(users.col("signed_up")?.gt_eq("2024-02-01"))
        .order_by(users.col("id")?, true);
    let refreshed = cache.query_db(&recent, &source).await?;
    println!("Users after refresh: {} rows", refreshed.num_rows());
    print_batches(&cache.begin().sql("SELECT * FROM users").await?)?;
    println!();

    // A selection spanning both tables has no single name and is rejected
    let mixed = SelectQuery::new()
        .column(users.col("username")?)
        .column(records.col("amount")?);
    match cache.query_db(&mixed, &source).await {
        Ok(_) => println!("Unexpectedly cached a multi-table selection"),
        Err(e) => println!("Rejected: {}", e),
    }

    let stats = cache.stats();
    println!("\nCache statistics:");
    println!("  Tables: {:?}", cache.table_names());
    println!("  Registrations: {}", stats.registrations());
    println!("  Directory hits: {}", stats.hits());
    println!("  Memory: {} bytes", stats.memory_bytes());

    println!("\n=== Example completed! ===");
    Ok(())
}
