use thiserror::Error;

/// Errors that can occur while interacting with a queue.
///
/// The worker loop treats `AcquirableJobNotFound` as control flow (an empty
/// queue triggers the `Waiting` event and a backoff sleep); every other
/// variant either surfaces on the queue's `Error` channel or propagates to
/// the caller.
#[derive(Error, Debug)]
pub enum RelqError {
    /// An error occurred while executing an SQL query
    #[error("Error occurred while querying: {0}")]
    Sql(#[from] sqlx::Error),

    /// An error occurred while serializing or deserializing a job payload
    #[error("Error while serializing payload: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// An update or select by id matched no row
    #[error("Job with id '{id}' not found")]
    JobNotFound { id: i64 },

    /// No waiting job was available to lease
    #[error("No acquirable job found")]
    AcquirableJobNotFound,

    /// The processor failed on every attempt
    #[error("Function failed after {attempts} retries: {message}")]
    MaxRetries { attempts: u32, message: String },

    /// A live queue with this name already exists in the process
    #[error("Queue with name '{name}' already exists")]
    DuplicateQueue { name: String },
}

/// A Result type alias for RelqError.
pub type Result<T> = core::result::Result<T, RelqError>;
