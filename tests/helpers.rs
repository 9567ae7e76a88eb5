#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Once;
use std::time::Duration;

use relq::{DbJob, PoolConfig};
use sqlx::postgres::PgConnectOptions;
use sqlx::PgPool;
use tokio::time::{sleep, Instant};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// A throwaway database created for one test and dropped afterwards.
#[derive(Clone, Debug)]
pub struct TestDatabase {
    pub source_pool: PgPool,
    pub test_pool: PgPool,
    pub url: String,
    pub name: String,
}

impl TestDatabase {
    /// Pool config pointing at the throwaway database; this is what queues
    /// and workers under test connect through.
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::new(&self.url)
            .max_connections(4)
            .application_name("__test_relq")
    }

    pub async fn get_jobs(&self, queue_name: &str) -> Vec<DbJob> {
        sqlx::query_as(&format!(r#"select * from "{queue_name}" order by id asc"#))
            .fetch_all(&self.test_pool)
            .await
            .expect("Failed to get jobs")
    }

    pub async fn get_job(&self, queue_name: &str, id: i64) -> DbJob {
        sqlx::query_as(&format!(r#"select * from "{queue_name}" where id = $1"#))
            .bind(id)
            .fetch_one(&self.test_pool)
            .await
            .expect("Failed to get job")
    }

    /// Forces a job into a state directly, bypassing the lease protocol.
    pub async fn set_job_state(&self, queue_name: &str, id: i64, state: &str) {
        sqlx::query(&format!(
            r#"update "{queue_name}" set state = $2::job_state where id = $1"#
        ))
        .bind(id)
        .bind(state)
        .execute(&self.test_pool)
        .await
        .expect("Failed to set job state");
    }

    async fn drop_database(&self) {
        self.test_pool.close().await;
        sqlx::query(&format!("DROP DATABASE {} WITH (FORCE)", self.name))
            .execute(&self.source_pool)
            .await
            .expect("Failed to drop test database");
    }
}

fn test_database_url(base_url: &str, db_name: &str) -> String {
    let (without_query, query) = match base_url.split_once('?') {
        Some((url, query)) => (url, Some(query)),
        None => (base_url, None),
    };

    let (base, _) = without_query
        .rsplit_once('/')
        .expect("DATABASE_URL must contain a database path");

    match query {
        Some(query) => format!("{base}/{db_name}?{query}"),
        None => format!("{base}/{db_name}"),
    }
}

pub async fn create_test_database() -> TestDatabase {
    let db_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let mut pg_conn_options: PgConnectOptions =
        db_url.parse().expect("Failed to parse DATABASE_URL");
    pg_conn_options = pg_conn_options.application_name("__test_relq");

    let source_pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(4)
        .connect_with(pg_conn_options.clone())
        .await
        .expect("Failed to connect to database");

    let db_id = uuid::Uuid::now_v7();
    let db_name = format!("__test_relq_{}", db_id.simple());

    sqlx::query(&format!("CREATE DATABASE {}", db_name))
        .execute(&source_pool)
        .await
        .expect("Failed to create test database");

    let test_url = test_database_url(&db_url, &db_name);

    let test_pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(4)
        .connect_with(pg_conn_options.database(&db_name))
        .await
        .expect("Failed to connect to test database");

    TestDatabase {
        source_pool,
        test_pool,
        url: test_url,
        name: db_name,
    }
}

/// Runs a test against a fresh database, dropping it afterwards even when
/// the test panics.
pub async fn with_test_db<F, Fut>(test_fn: F)
where
    F: FnOnce(TestDatabase) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    let test_db = create_test_database().await;
    let test_db_2 = test_db.clone();

    let result = tokio::spawn(async move {
        test_fn(test_db_2).await;
    })
    .await;

    test_db.drop_database().await;
    result.expect("Test failed");
}

/// Queue names double as table names and must be process-unique, so every
/// test mints its own.
pub fn unique_queue_name(prefix: &str) -> String {
    format!("{prefix}_{}", uuid::Uuid::now_v7().simple())
}

pub struct StaticCounter {
    count: AtomicU32,
}

impl StaticCounter {
    pub const fn new() -> Self {
        Self {
            count: AtomicU32::new(0),
        }
    }

    pub fn increment(&self) -> u32 {
        self.count.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn get(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }
}

/// Polls `condition` until it holds, panicking after `timeout`.
pub async fn wait_until(what: &str, timeout: Duration, mut condition: impl FnMut() -> bool) {
    let start = Instant::now();

    while !condition() {
        if start.elapsed() > timeout {
            panic!("Timed out waiting for {what}");
        }
        sleep(Duration::from_millis(25)).await;
    }
}

pub fn enable_logs() {
    static ONCE: Once = Once::new();

    ONCE.call_once(|| {
        let fmt_layer = tracing_subscriber::fmt::layer();
        // Log level set to debug except for sqlx set at warn (to not show all sql requests)
        let filter_layer = EnvFilter::try_new("debug,sqlx=warn").unwrap();

        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .init();
    });
}
