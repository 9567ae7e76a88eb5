use indoc::formatdoc;
use sqlx::{query, PgExecutor};
use tracing::debug;

use crate::errors::Result;
use crate::job::JobState;

/// Deletes every job in the given states, returning how many rows went.
pub async fn delete_jobs_by_state<'e>(
    executor: impl PgExecutor<'e>,
    table: &str,
    states: &[JobState],
) -> Result<u64> {
    let sql = formatdoc!(
        r#"
            delete from {table}
                where state = any($1::job_state[])
        "#
    );

    let result = query(&sql).bind(states).execute(executor).await?;

    debug!(deleted = result.rows_affected(), "Deleted jobs by state");

    Ok(result.rows_affected())
}
