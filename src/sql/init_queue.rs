use indoc::formatdoc;
use sqlx::postgres::{PgConnection, PgQueryResult};
use sqlx::query;
use tracing::debug;

use crate::errors::{RelqError, Result};
use crate::utils::escape_identifier;

/// PostgreSQL error codes that signal "object already exists":
/// `duplicate_object` and `unique_violation` (the latter shows up when two
/// connections race the same `create type` / `create trigger`).
const DUPLICATE_OBJECT_CODES: [&str; 2] = ["42710", "23505"];

/// Ensures the DDL for one queue exists: the `job_state` enum, the queue
/// table, the dequeue index, and the `updated_at` trigger.
///
/// Idempotent: re-running against an already-initialized queue is a no-op.
/// Exactly the duplicate-object error codes are swallowed; everything else
/// propagates.
pub async fn init_queue_data(conn: &mut PgConnection, queue_name: &str, table: &str) -> Result<()> {
    create_job_state_enum(conn).await?;
    create_queue_table(conn, table).await?;
    create_dequeue_index(conn, queue_name, table).await?;
    create_updated_at_trigger(conn, table).await?;

    debug!(queue_name, "Queue data initialized");

    Ok(())
}

async fn create_job_state_enum(conn: &mut PgConnection) -> Result<()> {
    let result = query("create type job_state as enum ('waiting', 'active', 'completed', 'failed')")
        .execute(&mut *conn)
        .await;

    swallow_duplicate_object(result)
}

async fn create_queue_table(conn: &mut PgConnection, table: &str) -> Result<()> {
    let sql = formatdoc!(
        r#"
            create table if not exists {table} (
                id            bigserial primary key,
                payload       json not null,
                state         job_state not null default 'waiting',
                priority      integer not null default 5,
                error_message text,
                created_at    timestamptz(3) not null default now(),
                updated_at    timestamptz(3) not null default now()
            );
        "#
    );

    query(&sql).execute(&mut *conn).await?;

    Ok(())
}

async fn create_dequeue_index(
    conn: &mut PgConnection,
    queue_name: &str,
    table: &str,
) -> Result<()> {
    let index = escape_identifier(&mut *conn, &format!("{queue_name}_dequeue_idx")).await?;

    let sql = formatdoc!(
        r#"
            create index if not exists {index}
                on {table} (state, priority desc, created_at asc, id asc);
        "#
    );

    query(&sql).execute(&mut *conn).await?;

    Ok(())
}

async fn create_updated_at_trigger(conn: &mut PgConnection, table: &str) -> Result<()> {
    let create_function = formatdoc!(
        r#"
            create or replace function update_modified_column() returns trigger as $$
            begin
                new.updated_at = now();
                return new;
            end;
            $$ language plpgsql;
        "#
    );

    query(&create_function).execute(&mut *conn).await?;

    let create_trigger = formatdoc!(
        r#"
            create trigger update_modified_column_trigger
                before update on {table}
                for each row
                execute procedure update_modified_column();
        "#
    );

    let result = query(&create_trigger).execute(&mut *conn).await;

    swallow_duplicate_object(result)
}

fn swallow_duplicate_object(result: sqlx::Result<PgQueryResult>) -> Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(e))
            if e.code()
                .is_some_and(|code| DUPLICATE_OBJECT_CODES.contains(&code.as_ref())) =>
        {
            Ok(())
        }
        Err(e) => Err(RelqError::Sql(e)),
    }
}
