//! Postgres-backed, priority-ordered job queue with transactional job
//! leasing.
//!
//! The database is the single source of truth: durability, ordering, and
//! concurrency control are delegated to SQL primitives (row locking with
//! `skip locked`, transactions, enum types). Callers enqueue typed payloads
//! on a [`Queue`]; [`Worker`]s poll, lease, and process them with bounded
//! retries, at-least-once.
//!
//! ```no_run
//! use relq::{PoolConfig, Queue, QueueOptions, Worker, WorkerOptions};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, Clone)]
//! struct SendEmail {
//!     to: String,
//! }
//!
//! # async fn example() -> relq::Result<()> {
//! let config = PoolConfig::new("postgres://localhost/app");
//! let queue: Queue<SendEmail> =
//!     Queue::create("emails", config, QueueOptions::default()).await?;
//!
//! let _worker = Worker::create(
//!     &queue,
//!     |job| async move {
//!         println!("sending to {}", job.payload().to);
//!         Ok::<_, String>(())
//!     },
//!     WorkerOptions::default(),
//! )
//! .await?;
//!
//! queue.add(SendEmail { to: "user@example.com".into() }).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod errors;
pub mod events;
pub mod job;
pub mod pool;
pub mod queue;
pub mod retry;
mod sql;
mod utils;
pub mod worker;

pub use client::Client;
pub use errors::{RelqError, Result};
pub use events::{QueueEvent, WorkerEvent};
pub use job::{DbJob, Job, JobState, DEFAULT_PRIORITY};
pub use pool::{Pool, PoolConfig};
pub use queue::{Queue, QueueOptions};
pub use retry::retry;
pub use worker::{Worker, WorkerOptions};
