use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::join_all;
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::errors::{RelqError, Result};
use crate::events::{EventDispatcher, QueueEvent};
use crate::job::{Job, JobState, DEFAULT_PRIORITY};
use crate::pool::{Pool, PoolConfig};
use crate::worker::Worker;

/// Within one process a queue name identifies at most one live queue;
/// closing the queue frees the name.
static QUEUE_REGISTRY: Lazy<Mutex<HashSet<String>>> = Lazy::new(|| Mutex::new(HashSet::new()));

fn register_queue_name(name: &str) -> Result<()> {
    let mut registry = QUEUE_REGISTRY
        .lock()
        .unwrap_or_else(PoisonError::into_inner);

    if !registry.insert(name.to_string()) {
        return Err(RelqError::DuplicateQueue {
            name: name.to_string(),
        });
    }

    Ok(())
}

fn unregister_queue_name(name: &str) {
    QUEUE_REGISTRY
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(name);
}

/// Options accepted by [`Queue::create`].
#[derive(Debug, Clone)]
pub struct QueueOptions {
    autostart: bool,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self { autostart: true }
    }
}

impl QueueOptions {
    /// Whether the queue starts in the running state. Defaults to true.
    pub fn autostart(mut self, value: bool) -> Self {
        self.autostart = value;
        self
    }
}

pub(crate) struct QueueCore<T> {
    pub(crate) name: String,
    pub(crate) pool: Pool,
    pub(crate) pool_config: PoolConfig,
    pub(crate) workers: tokio::sync::Mutex<Vec<Worker<T>>>,
    pub(crate) running: AtomicBool,
    closed: AtomicBool,
    pub(crate) events: EventDispatcher<QueueEvent<T>>,
}

impl<T> QueueCore<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn emit(&self, event: &QueueEvent<T>) {
        self.events.emit(event);
    }

    pub(crate) async fn deregister_worker(&self, worker_id: &str) {
        self.workers
            .lock()
            .await
            .retain(|worker| worker.worker_id() != worker_id);
    }
}

/// A named, process-unique handle over one queue table.
///
/// Owns a [`Pool`], registers [`Worker`]s, and emits queue-level
/// [`QueueEvent`]s. Cloning the handle is cheap and shares the same queue.
pub struct Queue<T> {
    core: Arc<QueueCore<T>>,
}

impl<T> Clone for Queue<T> {
    fn clone(&self) -> Self {
        Queue {
            core: self.core.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Queue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue").field("name", &self.core.name).finish()
    }
}

impl<T> Queue<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Creates a queue: registers the name, connects the pool, and runs the
    /// DDL setup on a temporary client so the schema lands before any
    /// enqueue.
    ///
    /// Fails synchronously with [`RelqError::DuplicateQueue`] when a live
    /// queue with this name already exists in the process.
    pub async fn create(
        name: &str,
        pool_config: PoolConfig,
        options: QueueOptions,
    ) -> Result<Queue<T>> {
        register_queue_name(name)?;

        match Self::initialize(name, pool_config, &options).await {
            Ok(queue) => {
                info!(queue_name = name, "Queue created");
                Ok(queue)
            }
            Err(e) => {
                unregister_queue_name(name);
                Err(e)
            }
        }
    }

    async fn initialize(
        name: &str,
        pool_config: PoolConfig,
        options: &QueueOptions,
    ) -> Result<Queue<T>> {
        let pool = Pool::connect(&pool_config).await?;

        let mut client = pool.get_client(name).await?;
        let init_result = client.init_queue_data().await;
        client.release();
        init_result?;

        Ok(Queue {
            core: Arc::new(QueueCore {
                name: name.to_string(),
                pool,
                pool_config,
                workers: tokio::sync::Mutex::new(Vec::new()),
                running: AtomicBool::new(options.autostart),
                closed: AtomicBool::new(false),
                events: EventDispatcher::new(),
            }),
        })
    }

    /// Enqueues a payload with the default priority of 5.
    pub async fn add(&self, payload: T) -> Result<Job<T>> {
        self.add_with_priority(payload, DEFAULT_PRIORITY).await
    }

    /// Enqueues a payload as a `waiting` job. Higher priority dequeues
    /// earlier.
    #[tracing::instrument(skip_all, err, fields(queue_name = %self.core.name, priority))]
    pub async fn add_with_priority(&self, payload: T, priority: i32) -> Result<Job<T>> {
        let payload = serde_json::to_value(&payload)?;

        let mut client = self.core.pool.get_client(&self.core.name).await?;
        let result = client
            .insert_job(&payload, JobState::Waiting, priority)
            .await;
        client.release();

        Job::from_db_job(result?)
    }

    /// Counts jobs per state. An empty slice counts all four states.
    pub async fn get_job_counts(&self, states: &[JobState]) -> Result<HashMap<JobState, i64>> {
        let all_states = JobState::ALL;
        let states = if states.is_empty() {
            &all_states[..]
        } else {
            states
        };

        let mut client = self.core.pool.get_client(&self.core.name).await?;
        let result = client.count_jobs_by_state(states).await;
        client.release();

        result
    }

    /// Deletes all `waiting` jobs. Jobs in other states are untouched.
    pub async fn drain(&self) -> Result<()> {
        let mut client = self.core.pool.get_client(&self.core.name).await?;
        let result = client.delete_jobs_by_state(&[JobState::Waiting]).await;
        client.release();

        let deleted = result?;
        debug!(queue_name = %self.core.name, deleted, "Queue drained");

        Ok(())
    }

    /// Deletes jobs in all four states.
    ///
    /// Stop the workers first: an `empty` racing an in-flight lease makes
    /// that worker's final state update fail with `JobNotFound`, which
    /// surfaces on the queue's `Error` channel.
    pub async fn empty(&self) -> Result<()> {
        let mut client = self.core.pool.get_client(&self.core.name).await?;
        let result = client.delete_jobs_by_state(&JobState::ALL).await;
        client.release();

        let deleted = result?;
        debug!(queue_name = %self.core.name, deleted, "Queue emptied");

        Ok(())
    }

    /// Marks the queue running and starts every attached worker in
    /// parallel. Idempotent.
    pub async fn start(&self) {
        if self.core.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let workers = self.workers_snapshot().await;
        join_all(workers.iter().map(|worker| worker.start())).await;

        info!(queue_name = %self.core.name, "Queue started");
    }

    /// Clears the running flag and stops every attached worker in
    /// parallel, awaiting their loops. Idempotent.
    pub async fn stop(&self) {
        if !self.core.running.swap(false, Ordering::SeqCst) {
            return;
        }

        let workers = self.workers_snapshot().await;
        join_all(workers.iter().map(|worker| worker.stop())).await;

        info!(queue_name = %self.core.name, "Queue stopped");
    }

    /// Stops the queue, closes every worker and the pool, and frees the
    /// queue name. The handle is unusable afterwards.
    pub async fn close(&self) {
        if self.core.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.stop().await;

        let workers: Vec<Worker<T>> = self.core.workers.lock().await.drain(..).collect();
        join_all(workers.iter().map(|worker| worker.close())).await;

        self.core.pool.close().await;
        unregister_queue_name(&self.core.name);

        info!(queue_name = %self.core.name, "Queue closed");
    }

    /// Registers a handler for queue-level events.
    pub fn on(&self, handler: impl Fn(&QueueEvent<T>) + Send + Sync + 'static) {
        self.core.events.on(handler);
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn is_running(&self) -> bool {
        self.core.is_running()
    }

    pub(crate) fn core(&self) -> &Arc<QueueCore<T>> {
        &self.core
    }

    pub(crate) fn pool_config(&self) -> &PoolConfig {
        &self.core.pool_config
    }

    pub(crate) async fn register_worker(&self, worker: Worker<T>) {
        self.core.workers.lock().await.push(worker);
    }

    async fn workers_snapshot(&self) -> Vec<Worker<T>> {
        self.core.workers.lock().await.clone()
    }
}
