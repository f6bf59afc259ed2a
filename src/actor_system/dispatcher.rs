//! Dispatch policies deciding where ready workers run.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::runtime::{Builder, Handle, Runtime};

use crate::actor_system::Worker;

/// Runs workers handed out by the event loop.
///
/// Implementations must run every worker exactly once, on any thread. They must not start an
/// actor's next worker from inside the current one.
#[async_trait]
pub trait Dispatcher: Send + Sync + 'static {
    async fn dispatch(&self, worker: Worker);

    /// Release any threads owned by the dispatcher.
    fn shutdown(&self) {}
}

/// Runs each worker inline on the event-loop thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialDispatcher;

#[async_trait]
impl Dispatcher for SerialDispatcher {
    async fn dispatch(&self, worker: Worker) {
        worker.run().await;
    }
}

/// Submits workers to a dedicated multi-threaded runtime.
pub struct PooledDispatcher {
    handle: Handle,
    runtime: Mutex<Option<Runtime>>,
    threads: usize,
}

impl PooledDispatcher {
    pub fn new(threads: usize) -> std::io::Result<Self> {
        let threads = threads.max(1);
        let runtime = Builder::new_multi_thread()
            .worker_threads(threads)
            .thread_name("courier-worker")
            .enable_all()
            .build()?;
        log::debug!("Worker pool started with {threads} thread(s)");
        Ok(PooledDispatcher {
            handle: runtime.handle().clone(),
            runtime: Mutex::new(Some(runtime)),
            threads,
        })
    }

    /// A pool with one thread per available processor.
    pub fn with_available_parallelism() -> std::io::Result<Self> {
        Self::new(available_parallelism())
    }

    pub fn threads(&self) -> usize {
        self.threads
    }
}

pub(crate) fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

#[async_trait]
impl Dispatcher for PooledDispatcher {
    async fn dispatch(&self, worker: Worker) {
        log::trace!("Submitting worker of '{}' to the worker pool", worker.actor());
        self.handle.spawn(worker.run());
    }

    fn shutdown(&self) {
        let runtime = self
            .runtime
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(runtime) = runtime {
            runtime.shutdown_background();
            log::debug!("Worker pool shut down");
        }
    }
}

impl Drop for PooledDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for PooledDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledDispatcher")
            .field("threads", &self.threads)
            .finish()
    }
}
