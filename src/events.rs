use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{PoisonError, RwLock};

use tracing::error;

use crate::errors::RelqError;
use crate::job::Job;
use crate::utils::panic_message;

/// Events emitted on the queue channel.
pub enum QueueEvent<T> {
    /// A worker leased the job and flipped it to `active`
    Activated(Job<T>),
    /// The processor succeeded and the job reached `completed`
    Completed(Job<T>),
    /// The processor exhausted its attempts and the job reached `failed`
    Failed(Job<T>, RelqError),
    /// A loop-level error (connection failure, lost row, ...); the worker
    /// backs off and keeps polling
    Error(RelqError),
}

/// Events emitted on a single worker's channel.
pub enum WorkerEvent<T> {
    /// A poll found no waiting job
    Waiting,
    Activated(Job<T>),
    Completed(Job<T>),
    Failed(Job<T>, RelqError),
}

type Handler<E> = Box<dyn Fn(&E) + Send + Sync>;

/// Fans events out synchronously to registered handlers.
///
/// A panicking handler is caught and logged at the emitter boundary so it
/// can never break the worker loop.
pub(crate) struct EventDispatcher<E> {
    handlers: RwLock<Vec<Handler<E>>>,
}

impl<E> EventDispatcher<E> {
    pub(crate) fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn on(&self, handler: impl Fn(&E) + Send + Sync + 'static) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(handler));
    }

    pub(crate) fn emit(&self, event: &E) {
        let handlers = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        for handler in handlers.iter() {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler(event))) {
                error!(
                    message = panic_message(&*payload),
                    "Event handler panicked"
                );
            }
        }
    }
}
