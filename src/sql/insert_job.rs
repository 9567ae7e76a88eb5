use indoc::formatdoc;
use sqlx::{query_as, PgExecutor};
use tracing::info;

use crate::errors::Result;
use crate::job::{DbJob, JobState};

/// Inserts a job row, returning it fully populated (id and timestamps
/// filled by the database).
pub async fn insert_job<'e>(
    executor: impl PgExecutor<'e>,
    table: &str,
    payload: &serde_json::Value,
    state: JobState,
    priority: i32,
) -> Result<DbJob> {
    let sql = formatdoc!(
        r#"
            insert into {table} (payload, state, priority)
                values ($1::json, $2::job_state, $3::int)
                returning *
        "#
    );

    let job: DbJob = query_as(&sql)
        .bind(payload)
        .bind(state)
        .bind(priority)
        .fetch_one(executor)
        .await?;

    info!(job_id = job.id(), priority, "Job added to queue");

    Ok(job)
}
