use std::fmt::Debug;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::FutureExt;
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::errors::{RelqError, Result};
use crate::events::{EventDispatcher, QueueEvent, WorkerEvent};
use crate::job::{Job, JobState};
use crate::pool::Pool;
use crate::queue::{Queue, QueueCore};
use crate::retry::retry;
use crate::utils::panic_message;

type ProcessorFn<T> = Box<
    dyn Fn(Job<T>) -> Pin<Box<dyn Future<Output = std::result::Result<(), String>> + Send>>
        + Send
        + Sync,
>;

/// Options accepted by [`Worker::create`].
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    autostart: bool,
    processing_interval: Duration,
    waiting_interval: Duration,
    max_retries: u32,
    retry_interval: Duration,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            autostart: true,
            processing_interval: Duration::ZERO,
            waiting_interval: Duration::from_millis(1000),
            max_retries: 3,
            retry_interval: Duration::from_millis(500),
        }
    }
}

impl WorkerOptions {
    /// Start immediately if the queue is running. Defaults to true.
    pub fn autostart(mut self, value: bool) -> Self {
        self.autostart = value;
        self
    }

    /// Sleep between successful acquire+process cycles. Defaults to 0 ms.
    pub fn processing_interval(mut self, value: Duration) -> Self {
        self.processing_interval = value;
        self
    }

    /// Sleep after a cycle that found no job or errored. Defaults to 1 s.
    pub fn waiting_interval(mut self, value: Duration) -> Self {
        self.waiting_interval = value;
        self
    }

    /// Total attempts the processor gets per lease, first call included.
    /// Defaults to 3.
    pub fn max_retries(mut self, value: u32) -> Self {
        self.max_retries = value;
        self
    }

    /// Sleep between processor attempts. Defaults to 500 ms.
    pub fn retry_interval(mut self, value: Duration) -> Self {
        self.retry_interval = value;
        self
    }
}

pub(crate) struct WorkerCore<T> {
    worker_id: String,
    queue: Weak<QueueCore<T>>,
    queue_name: String,
    pool: Pool,
    processor: ProcessorFn<T>,
    processing_interval: Duration,
    waiting_interval: Duration,
    max_retries: u32,
    retry_interval: Duration,
    running: AtomicBool,
    loop_handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    events: EventDispatcher<WorkerEvent<T>>,
}

/// Drives the processing loop for one queue: lease, run, retry, finalize.
///
/// Each worker connects its own [`Pool`] from the queue's config, so worker
/// connection demand never starves enqueuers. Cloning the handle is cheap
/// and shares the same worker.
pub struct Worker<T> {
    core: Arc<WorkerCore<T>>,
}

impl<T> Clone for Worker<T> {
    fn clone(&self) -> Self {
        Worker {
            core: self.core.clone(),
        }
    }
}

impl<T> Worker<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Creates a worker attached to `queue` and registers it into the
    /// queue's worker set. Starts immediately when `autostart` is set and
    /// the queue is running.
    ///
    /// The processor runs once per leased job, wrapped in the bounded-retry
    /// helper; its error type is captured in `Debug` form. A panicking
    /// processor counts as a failed attempt.
    pub async fn create<F, Fut, E>(
        queue: &Queue<T>,
        processor: F,
        options: WorkerOptions,
    ) -> Result<Worker<T>>
    where
        F: Fn(Job<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
        E: Debug,
    {
        let processor = Arc::new(processor);
        let processor: ProcessorFn<T> = Box::new(move |job| {
            let processor = processor.clone();
            async move {
                match AssertUnwindSafe(processor(job)).catch_unwind().await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(format!("{:?}", e)),
                    Err(payload) => Err(panic_message(&*payload)),
                }
            }
            .boxed()
        });

        let pool = Pool::connect(queue.pool_config()).await?;

        let mut random_bytes = [0u8; 9];
        rand::thread_rng().fill_bytes(&mut random_bytes);
        let worker_id = format!("relq_worker_{}", hex::encode(random_bytes));

        let worker = Worker {
            core: Arc::new(WorkerCore {
                worker_id,
                queue: Arc::downgrade(queue.core()),
                queue_name: queue.name().to_string(),
                pool,
                processor,
                processing_interval: options.processing_interval,
                waiting_interval: options.waiting_interval,
                max_retries: options.max_retries,
                retry_interval: options.retry_interval,
                running: AtomicBool::new(false),
                loop_handle: tokio::sync::Mutex::new(None),
                events: EventDispatcher::new(),
            }),
        };

        queue.register_worker(worker.clone()).await;

        info!(
            worker_id = %worker.core.worker_id,
            queue_name = %worker.core.queue_name,
            "Worker created"
        );

        if options.autostart {
            worker.start().await;
        }

        Ok(worker)
    }

    /// Launches the polling loop. Does nothing when the queue is not
    /// running (workers cannot outrun their queue) or the worker already
    /// is.
    pub async fn start(&self) {
        let Some(queue) = self.core.queue.upgrade() else {
            return;
        };
        if !queue.is_running() {
            return;
        }
        if self.core.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let core = self.core.clone();
        let handle = tokio::spawn(run_loop(core));
        *self.core.loop_handle.lock().await = Some(handle);

        debug!(worker_id = %self.core.worker_id, "Worker started");
    }

    /// Clears the running flag and awaits the loop, which observes the flag
    /// between cycles (worst case one `waiting_interval`). Idempotent.
    pub async fn stop(&self) {
        self.core.running.store(false, Ordering::SeqCst);

        let handle = self.core.loop_handle.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(worker_id = %self.core.worker_id, error = %e, "Worker loop task panicked");
            }
            debug!(worker_id = %self.core.worker_id, "Worker stopped");
        }
    }

    /// Stops the worker, closes its pool, and deregisters it from the
    /// queue.
    pub async fn close(&self) {
        self.stop().await;
        self.core.pool.close().await;

        if let Some(queue) = self.core.queue.upgrade() {
            queue.deregister_worker(&self.core.worker_id).await;
        }
    }

    /// Registers a handler for this worker's events.
    pub fn on(&self, handler: impl Fn(&WorkerEvent<T>) + Send + Sync + 'static) {
        self.core.events.on(handler);
    }

    pub fn worker_id(&self) -> &str {
        &self.core.worker_id
    }

    pub fn is_running(&self) -> bool {
        self.core.running.load(Ordering::SeqCst)
    }
}

/// The polling loop. Never dies: acquire misses emit `Waiting`, any other
/// error lands on the queue's `Error` channel, and both are followed by a
/// `waiting_interval` backoff.
async fn run_loop<T>(core: Arc<WorkerCore<T>>)
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    while core.running.load(Ordering::SeqCst) {
        sleep(core.processing_interval).await;

        match process_one_job(&core).await {
            Ok(()) => {}
            Err(RelqError::AcquirableJobNotFound) => {
                core.events.emit(&WorkerEvent::Waiting);
                sleep(core.waiting_interval).await;
            }
            Err(e) => {
                warn!(worker_id = %core.worker_id, error = %e, "Worker cycle failed");
                if let Some(queue) = core.queue.upgrade() {
                    queue.emit(&QueueEvent::Error(e));
                }
                sleep(core.waiting_interval).await;
            }
        }
    }

    debug!(worker_id = %core.worker_id, "Worker loop exited");
}

async fn process_one_job<T>(core: &WorkerCore<T>) -> Result<()>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    let mut client = core.pool.get_client(&core.queue_name).await?;
    let result = lease_and_run(core, &mut client).await;
    client.release();

    result
}

async fn lease_and_run<T>(core: &WorkerCore<T>, client: &mut Client) -> Result<()>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    let job: Job<T> = Job::from_db_job(client.acquire_job().await?)?;

    core.events.emit(&WorkerEvent::Activated(job.clone()));
    if let Some(queue) = core.queue.upgrade() {
        queue.emit(&QueueEvent::Activated(job.clone()));
    }

    let attempt = job.clone();
    let outcome = retry(
        || (core.processor)(attempt.clone()),
        core.max_retries,
        core.retry_interval,
    )
    .await;

    match outcome {
        Ok(()) => {
            let updated = client
                .update_job_state_by_id(*job.id(), JobState::Completed, None)
                .await?;
            let updated: Job<T> = Job::from_db_job(updated)?;

            info!(
                worker_id = %core.worker_id,
                job_id = updated.id(),
                "Completed job with success"
            );

            core.events.emit(&WorkerEvent::Completed(updated.clone()));
            if let Some(queue) = core.queue.upgrade() {
                queue.emit(&QueueEvent::Completed(updated));
            }
        }
        Err(RelqError::MaxRetries { attempts, message }) => {
            let error = RelqError::MaxRetries {
                attempts,
                message: message.clone(),
            };
            let error_message = error.to_string();

            let updated = client
                .update_job_state_by_id(*job.id(), JobState::Failed, Some(&error_message))
                .await?;
            let updated: Job<T> = Job::from_db_job(updated)?;

            warn!(
                worker_id = %core.worker_id,
                job_id = updated.id(),
                error = %error_message,
                "Job failed"
            );

            core.events
                .emit(&WorkerEvent::Failed(updated.clone(), error));
            if let Some(queue) = core.queue.upgrade() {
                queue.emit(&QueueEvent::Failed(
                    updated,
                    RelqError::MaxRetries { attempts, message },
                ));
            }
        }
        Err(e) => return Err(e),
    }

    Ok(())
}
