use indoc::formatdoc;
use sqlx::postgres::PgConnection;
use sqlx::query_as;

use crate::errors::Result;
use crate::job::{DbJob, JobState};

/// Selects the first eligible waiting job, skipping rows locked by other
/// transactions.
///
/// Two workers polling concurrently never receive the same row and neither
/// blocks on the other. Must run inside an open transaction: the row lock
/// taken here is what keeps the `waiting -> active` flip exclusive, and it
/// is released at commit.
pub async fn select_waiting_job(conn: &mut PgConnection, table: &str) -> Result<Option<DbJob>> {
    let sql = formatdoc!(
        r#"
            select * from {table}
                where state = 'waiting'
                order by priority desc, created_at asc, id asc
                limit 1
                for update
                skip locked
        "#
    );

    let job = query_as(&sql).fetch_optional(conn).await?;

    Ok(job)
}

/// Flips a selected job to `active`, returning the updated row.
pub async fn activate_job(conn: &mut PgConnection, table: &str, id: i64) -> Result<DbJob> {
    let sql = formatdoc!(
        r#"
            update {table}
                set state = $2::job_state
                where id = $1::bigint
                returning *
        "#
    );

    let job = query_as(&sql)
        .bind(id)
        .bind(JobState::Active)
        .fetch_one(conn)
        .await?;

    Ok(job)
}
