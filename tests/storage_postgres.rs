//! PostgreSQL storage integration tests using testcontainers.
//!
//! Run with: cargo test --test storage_postgres -- --ignored --nocapture
//!
//! These tests spin up PostgreSQL in a container using testcontainers-rs and
//! run the RowStore contract against it.

mod storage;

use std::time::Duration;

use chrono::Utc;
use eventslog::storage::PostgresRowStore;
use eventslog::RowStore;
use testcontainers::{
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    GenericImage, ImageExt,
};

/// Start PostgreSQL container.
///
/// Returns (container, connection_string) where connection_string is suitable
/// for sqlx PgPool connection.
async fn start_postgres() -> (testcontainers::ContainerAsync<GenericImage>, String) {
    // PostgreSQL prints "database system is ready to accept connections" twice:
    // once during initial setup and once when fully ready.
    // We wait for the message but add a small delay to ensure full readiness.
    let image = GenericImage::new("postgres", "16")
        .with_exposed_port(5432.tcp())
        .with_wait_for(WaitFor::message_on_stdout(
            "database system is ready to accept connections",
        ));

    let container = image
        .with_env_var("POSTGRES_USER", "eventslog")
        .with_env_var("POSTGRES_PASSWORD", "eventslog")
        .with_env_var("POSTGRES_DB", "eventslog")
        .with_startup_timeout(Duration::from_secs(60))
        .start()
        .await
        .expect("Failed to start postgres container");

    // Brief delay to ensure PostgreSQL is fully ready to accept connections
    tokio::time::sleep(Duration::from_secs(1)).await;

    let host_port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("Failed to get mapped port");

    let host = container
        .get_host()
        .await
        .expect("Failed to get container host");

    let connection_string = format!(
        "postgres://eventslog:eventslog@{}:{}/eventslog",
        host, host_port
    );

    println!("PostgreSQL available at: {}", connection_string);

    (container, connection_string)
}

async fn connect(connection_string: &str) -> PostgresRowStore {
    let pool = sqlx::PgPool::connect(connection_string)
        .await
        .expect("Failed to connect to PostgreSQL");
    PostgresRowStore::new(pool)
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_postgres_row_store() {
    println!("=== PostgreSQL RowStore Tests ===");
    println!("Starting PostgreSQL container...");

    let (_container, connection_string) = start_postgres().await;
    let store = connect(&connection_string).await;

    assert!(!store.exists().await.unwrap(), "fresh database has no table");
    run_row_store_tests!(&store);
    store.close().await;

    println!("=== All PostgreSQL RowStore tests PASSED ===");
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_postgres_snapshot_is_unsupported() {
    let (_container, connection_string) = start_postgres().await;
    let store = connect(&connection_string).await;
    store.ensure_schema().await.unwrap();
    store.insert("p", Utc::now(), "x").await.unwrap();

    assert!(store.snapshot().await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_postgres_stopped_server_is_transient() {
    let (container, connection_string) = start_postgres().await;
    let store = connect(&connection_string).await;
    store.ensure_schema().await.unwrap();

    container.stop().await.expect("Failed to stop container");

    let err = store
        .insert("p", Utc::now(), "x")
        .await
        .expect_err("insert against a stopped server should fail");
    assert!(err.is_transient(), "unexpected error: {err}");
}
