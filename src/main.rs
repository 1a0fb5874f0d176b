//! Demonstration binary: watch optimistic locking and pool backpressure in
//! action against a real database file.
//!
//! Process glue only - it wires up the pool, store, and service the way any
//! embedding process would, then races two writers from the same snapshot
//! and over-asks the pool to show both failure modes.

use clap::Parser;
use occ_store::config::Config;
use occ_store::db::{ConnectionPool, StatementLoader};
use occ_store::retry::{RetryPolicy, retry_on_conflict};
use occ_store::service::{ProductService, UpdateOutcome};
use occ_store::store::ProductStore;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();
    init_tracing(&config);
    config.validate()?;

    info!(
        database_url = %config.database_url,
        min = config.pool_min_connections,
        max = config.pool_max_connections,
        "Starting occ-store demo v{}",
        env!("CARGO_PKG_VERSION")
    );

    let pool = Arc::new(ConnectionPool::new(config.connect_options()?));
    pool.initialize(config.pool_min_connections, config.pool_max_connections)
        .await?;

    let statements = Arc::new(StatementLoader::new(config.sql_dir.clone()));
    let store = ProductStore::new(Arc::clone(&pool), statements);
    store.init_schema().await?;
    let service = ProductService::new(store);

    demonstrate_lost_update_prevention(&service).await?;
    demonstrate_pool_exhaustion(&pool).await;

    pool.close().await;
    info!("Demo complete");
    Ok(())
}

/// Two writers load the same snapshot and both submit version 0. Exactly one
/// wins; the loser re-reads and retries through the caller-side combinator.
async fn demonstrate_lost_update_prevention(
    service: &ProductService,
) -> Result<(), Box<dyn std::error::Error>> {
    let product = service
        .create_product(
            "Demo Product",
            Some("Product for demonstrating concurrency".to_string()),
            100.0,
            50,
        )
        .await?;
    info!(
        id = product.id,
        version = product.version,
        price = product.price,
        "Created demo product"
    );

    let snapshot_a = product.clone();
    let snapshot_b = product.clone();
    let service_a = service.clone();
    let service_b = service.clone();

    let writer_a = tokio::spawn(async move {
        service_a
            .update_product(
                snapshot_a.id,
                snapshot_a.name.clone(),
                Some("Updated by writer A".to_string()),
                snapshot_a.price + 10.0,
                snapshot_a.stock_quantity,
                snapshot_a.version,
            )
            .await
    });
    let writer_b = tokio::spawn(async move {
        service_b
            .update_product(
                snapshot_b.id,
                snapshot_b.name.clone(),
                Some("Updated by writer B".to_string()),
                snapshot_b.price + 20.0,
                snapshot_b.stock_quantity,
                snapshot_b.version,
            )
            .await
    });

    let outcome_a = writer_a.await??;
    let outcome_b = writer_b.await??;

    for (label, outcome) in [("A", &outcome_a), ("B", &outcome_b)] {
        match outcome {
            UpdateOutcome::Updated(p) => {
                info!(writer = label, version = p.version, price = p.price, "Update won")
            }
            UpdateOutcome::Conflict {
                submitted_version, ..
            } => warn!(
                writer = label,
                submitted_version, "Update lost: version was already advanced"
            ),
        }
    }

    // The loser's recovery path: re-read, reapply, resubmit.
    let loser = if outcome_a.is_updated() { "B" } else { "A" };
    let service_retry = service.clone();
    let id = product.id;
    let outcome = retry_on_conflict(&RetryPolicy::default(), |attempt| {
        let service = service_retry.clone();
        async move {
            let current = service.get_product(id).await?.ok_or_else(|| {
                occ_store::StoreError::internal("demo product vanished mid-demo")
            })?;
            info!(attempt, version = current.version, "Retrying from fresh read");
            service
                .update_product(
                    current.id,
                    current.name.clone(),
                    current.description.clone(),
                    current.price + 5.0,
                    current.stock_quantity,
                    current.version,
                )
                .await
        }
    })
    .await?;
    match outcome {
        UpdateOutcome::Updated(p) => info!(
            writer = loser,
            version = p.version,
            price = p.price,
            "Retry after conflict succeeded"
        ),
        UpdateOutcome::Conflict { .. } => warn!("Retry attempts exhausted"),
    }

    service.delete_product(product.id).await?;
    Ok(())
}

/// Hold every connection, then ask for one more: the pool reports
/// exhaustion immediately instead of queueing the caller.
async fn demonstrate_pool_exhaustion(pool: &Arc<ConnectionPool>) {
    let max = pool.max_connections();
    let mut held = Vec::new();
    for _ in 0..max {
        match pool.acquire().await {
            Ok(conn) => held.push(conn),
            Err(e) => {
                warn!(error = %e, "Could not saturate the pool");
                return;
            }
        }
    }
    info!(held = held.len(), max, "Holding every connection");

    match pool.acquire().await {
        Err(e) => info!(error = %e, "Over-limit acquire failed fast, as designed"),
        Ok(_) => warn!("Acquire beyond max unexpectedly succeeded"),
    }

    for conn in held {
        conn.release();
    }
    info!(free = pool.free_count(), "All connections returned");
}
