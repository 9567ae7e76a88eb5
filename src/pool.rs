use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;

use crate::client::Client;
use crate::errors::Result;
use crate::utils::escape_identifier;

/// Connection settings shared by every pool a queue (or one of its
/// workers) builds.
///
/// Each `Queue` and each `Worker` connect their own `Pool` from the same
/// config, so worker connection demand never starves enqueuers.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    database_url: String,
    max_connections: u32,
    application_name: Option<String>,
}

impl PoolConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: 20,
            application_name: None,
        }
    }

    pub fn max_connections(mut self, value: u32) -> Self {
        self.max_connections = value;
        self
    }

    pub fn application_name(mut self, value: &str) -> Self {
        self.application_name = Some(value.into());
        self
    }
}

/// Owns backend connections and hands out short-lived [`Client`]s.
///
/// The pool holds no job state.
pub struct Pool {
    pg_pool: PgPool,
}

impl Pool {
    /// Connects a new pool from the given config.
    pub async fn connect(config: &PoolConfig) -> Result<Pool> {
        let mut connect_options: PgConnectOptions = config.database_url.parse()?;
        if let Some(application_name) = &config.application_name {
            connect_options = connect_options.application_name(application_name);
        }

        let pg_pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(connect_options)
            .await?;

        Ok(Pool { pg_pool })
    }

    /// Acquires one connection and binds it to a queue name.
    ///
    /// The returned [`Client`] owns the connection until released.
    pub async fn get_client(&self, queue_name: &str) -> Result<Client> {
        let table = escape_identifier(&self.pg_pool, queue_name).await?;
        let conn = self.pg_pool.acquire().await?;

        Ok(Client::new(conn, queue_name.to_string(), table))
    }

    /// Drains and closes all connections.
    pub async fn close(&self) {
        self.pg_pool.close().await;
    }
}
