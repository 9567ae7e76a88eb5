use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use getset::Getters;
use serde::de::DeserializeOwned;
use sqlx::FromRow;

use crate::errors::Result;

/// Priority assigned to jobs enqueued without an explicit one.
pub const DEFAULT_PRIORITY: i32 = 5;

/// The lifecycle state of a job.
///
/// Maps to the PostgreSQL enum type `job_state`. Transitions are
/// `Waiting -> Active -> Completed` or `Waiting -> Active -> Failed`;
/// `Completed` and `Failed` are terminal.
#[derive(sqlx::Type, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "job_state", rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Active,
    Completed,
    Failed,
}

impl JobState {
    /// All four states, in lifecycle order.
    pub const ALL: [JobState; 4] = [
        JobState::Waiting,
        JobState::Active,
        JobState::Completed,
        JobState::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `DbJob` represents a job as stored in the queue table.
///
/// The payload is kept as raw JSON; `Job` carries the deserialized form
/// handed to processors and event handlers.
#[derive(FromRow, Getters, Debug, Clone, PartialEq, Eq)]
#[getset(get = "pub")]
pub struct DbJob {
    /// Unique identifier for this job, assigned by the database
    id: i64,
    /// The JSON payload of the job
    payload: serde_json::Value,
    state: JobState,
    /// Higher number means it should run sooner
    priority: i32,
    /// Why the job failed, populated on the failed transition only
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl DbJob {
    /// Compares two jobs by dequeue order: priority descending, then
    /// `created_at` ascending, then id ascending.
    ///
    /// This is the same total order the dequeue select and its index use;
    /// a single worker completes jobs exactly in this order.
    pub fn dequeue_cmp(&self, other: &DbJob) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| self.created_at.cmp(&other.created_at))
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// A job with its payload deserialized to the queue's payload type.
#[derive(Getters, Debug, Clone, PartialEq, Eq)]
#[getset(get = "pub")]
pub struct Job<T> {
    id: i64,
    payload: T,
    state: JobState,
    priority: i32,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<T: DeserializeOwned> Job<T> {
    /// Creates a `Job` from a database row, deserializing the payload.
    pub fn from_db_job(db_job: DbJob) -> Result<Job<T>> {
        let payload = serde_json::from_value(db_job.payload)?;
        Ok(Job {
            id: db_job.id,
            payload,
            state: db_job.state,
            priority: db_job.priority,
            error_message: db_job.error_message,
            created_at: db_job.created_at,
            updated_at: db_job.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn job(id: i64, priority: i32, created_at_ms: i64) -> DbJob {
        DbJob {
            id,
            payload: serde_json::json!({}),
            state: JobState::Waiting,
            priority,
            error_message: None,
            created_at: Utc.timestamp_millis_opt(created_at_ms).unwrap(),
            updated_at: Utc.timestamp_millis_opt(created_at_ms).unwrap(),
        }
    }

    #[test]
    fn higher_priority_dequeues_first() {
        let low = job(1, 3, 0);
        let high = job(2, 5, 10);

        assert_eq!(high.dequeue_cmp(&low), Ordering::Less);
        assert_eq!(low.dequeue_cmp(&high), Ordering::Greater);
    }

    #[test]
    fn equal_priority_breaks_ties_by_created_at_then_id() {
        let older = job(7, 5, 0);
        let newer = job(3, 5, 10);
        assert_eq!(older.dequeue_cmp(&newer), Ordering::Less);

        let first = job(1, 5, 0);
        let second = job(2, 5, 0);
        assert_eq!(first.dequeue_cmp(&second), Ordering::Less);
    }

    #[test]
    fn sorting_by_dequeue_cmp_matches_the_documented_order() {
        let mut jobs = vec![job(1, 3, 0), job(2, 5, 10), job(3, 4, 20), job(4, 5, 30)];
        jobs.sort_by(|a, b| a.dequeue_cmp(b));

        let ids: Vec<i64> = jobs.iter().map(|j| *j.id()).collect();
        assert_eq!(ids, vec![2, 4, 3, 1]);
    }

    #[test]
    fn payload_deserializes_into_the_target_type() {
        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct Payload {
            a: u32,
        }

        let mut db_job = job(1, 5, 0);
        db_job.payload = serde_json::json!({ "a": 42 });

        let typed: Job<Payload> = Job::from_db_job(db_job).expect("Failed to deserialize payload");
        assert_eq!(typed.payload(), &Payload { a: 42 });
    }

    #[test]
    fn state_renders_lowercase() {
        assert_eq!(JobState::Waiting.to_string(), "waiting");
        assert_eq!(JobState::Failed.as_str(), "failed");
    }
}
