use std::collections::HashMap;

use sqlx::pool::PoolConnection;
use sqlx::{Executor, Postgres};

use crate::errors::{RelqError, Result};
use crate::job::{DbJob, JobState};
use crate::sql;

/// One pooled connection bound to one queue.
///
/// A `Client` is short-lived: acquire it from a [`Pool`](crate::Pool) for
/// one logical operation and [`release`](Client::release) it on every exit
/// path. Every SQL interaction of the crate goes through here.
pub struct Client {
    conn: PoolConnection<Postgres>,
    queue_name: String,
    table: String,
}

impl Client {
    pub(crate) fn new(conn: PoolConnection<Postgres>, queue_name: String, table: String) -> Self {
        Self {
            conn,
            queue_name,
            table,
        }
    }

    /// Ensures the queue's DDL exists: enum type, table, dequeue index, and
    /// `updated_at` trigger. Idempotent.
    pub async fn init_queue_data(&mut self) -> Result<()> {
        sql::init_queue::init_queue_data(&mut *self.conn, &self.queue_name, &self.table).await
    }

    /// Inserts a job, returning the fully populated row.
    pub async fn insert_job(
        &mut self,
        payload: &serde_json::Value,
        state: JobState,
        priority: i32,
    ) -> Result<DbJob> {
        sql::insert_job::insert_job(&mut *self.conn, &self.table, payload, state, priority).await
    }

    /// Atomically leases the highest-priority waiting job and flips it to
    /// `active`.
    ///
    /// The whole protocol runs in one transaction: select the first
    /// eligible row with `for update skip locked`, flip it, commit. The row
    /// lock is released at commit, before the processor runs, so a
    /// long-running processor never holds a database lock.
    ///
    /// Fails with [`RelqError::AcquirableJobNotFound`] when no waiting job
    /// is available.
    #[tracing::instrument(
        skip_all,
        fields(otel.kind = "client", db.system = "postgresql", queue_name = %self.queue_name)
    )]
    pub async fn acquire_job(&mut self) -> Result<DbJob> {
        self.begin_transaction().await?;

        let selected = match sql::acquire_job::select_waiting_job(&mut *self.conn, &self.table)
            .await
        {
            Ok(selected) => selected,
            Err(e) => {
                self.rollback_transaction().await?;
                return Err(e);
            }
        };

        let Some(job) = selected else {
            self.rollback_transaction().await?;
            return Err(RelqError::AcquirableJobNotFound);
        };

        match sql::acquire_job::activate_job(&mut *self.conn, &self.table, *job.id()).await {
            Ok(job) => {
                self.commit_transaction().await?;
                Ok(job)
            }
            Err(e) => {
                self.rollback_transaction().await?;
                Err(e)
            }
        }
    }

    /// Moves a job to a new state, returning the updated row.
    ///
    /// Not wrapped in its own transaction; callers supply transactional
    /// context when they need one.
    pub async fn update_job_state_by_id(
        &mut self,
        id: i64,
        state: JobState,
        error_message: Option<&str>,
    ) -> Result<DbJob> {
        sql::update_job::update_job_state_by_id(
            &mut *self.conn,
            &self.table,
            id,
            state,
            error_message,
        )
        .await
    }

    /// Counts jobs per requested state in a single query.
    pub async fn count_jobs_by_state(
        &mut self,
        states: &[JobState],
    ) -> Result<HashMap<JobState, i64>> {
        sql::count_jobs::count_jobs_by_state(&mut *self.conn, &self.table, states).await
    }

    /// Deletes every job in the given states.
    pub async fn delete_jobs_by_state(&mut self, states: &[JobState]) -> Result<u64> {
        sql::delete_jobs::delete_jobs_by_state(&mut *self.conn, &self.table, states).await
    }

    pub async fn begin_transaction(&mut self) -> Result<()> {
        (&mut *self.conn).execute("begin").await?;
        Ok(())
    }

    pub async fn commit_transaction(&mut self) -> Result<()> {
        (&mut *self.conn).execute("commit").await?;
        Ok(())
    }

    pub async fn rollback_transaction(&mut self) -> Result<()> {
        (&mut *self.conn).execute("rollback").await?;
        Ok(())
    }

    /// Returns the connection to the pool.
    pub fn release(self) {
        drop(self.conn);
    }
}
