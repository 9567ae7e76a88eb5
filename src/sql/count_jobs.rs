use std::collections::HashMap;

use indoc::formatdoc;
use sqlx::{query_as, PgExecutor};

use crate::errors::Result;
use crate::job::JobState;

/// Counts jobs per state in a single aggregate query.
///
/// Every requested state appears in the result, zero-filled when the table
/// holds no rows in that state.
pub async fn count_jobs_by_state<'e>(
    executor: impl PgExecutor<'e>,
    table: &str,
    states: &[JobState],
) -> Result<HashMap<JobState, i64>> {
    let sql = formatdoc!(
        r#"
            select state, count(*) as count
                from {table}
                where state = any($1::job_state[])
                group by state
        "#
    );

    let rows: Vec<(JobState, i64)> = query_as(&sql).bind(states).fetch_all(executor).await?;

    let mut counts: HashMap<JobState, i64> = states.iter().map(|state| (*state, 0)).collect();
    for (state, count) in rows {
        counts.insert(state, count);
    }

    Ok(counts)
}
