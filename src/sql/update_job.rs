use indoc::formatdoc;
use sqlx::{query_as, PgExecutor};

use crate::errors::{RelqError, Result};
use crate::job::{DbJob, JobState};

/// Moves a job to a new state by id, returning the updated row.
///
/// `error_message` is always bound, so non-failed transitions clear any
/// message left over from earlier attempts.
#[tracing::instrument(skip_all, err, fields(job_id = id, state = %state))]
pub async fn update_job_state_by_id<'e>(
    executor: impl PgExecutor<'e>,
    table: &str,
    id: i64,
    state: JobState,
    error_message: Option<&str>,
) -> Result<DbJob> {
    let sql = formatdoc!(
        r#"
            update {table}
                set state = $2::job_state, error_message = $3::text
                where id = $1::bigint
                returning *
        "#
    );

    let job: Option<DbJob> = query_as(&sql)
        .bind(id)
        .bind(state)
        .bind(error_message)
        .fetch_optional(executor)
        .await?;

    job.ok_or(RelqError::JobNotFound { id })
}
