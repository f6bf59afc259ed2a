//! Process-wide pool running deferred bodies and chain links.

use std::sync::OnceLock;

use tokio::runtime::{Builder, Runtime};

use crate::config::RuntimeConfig;
use crate::promise::PromiseError;

static EXECUTOR: OnceLock<Result<Runtime, String>> = OnceLock::new();

fn runtime() -> Result<&'static Runtime, PromiseError> {
    EXECUTOR
        .get_or_init(|| {
            let config = RuntimeConfig::from_env();
            log::debug!(
                "Starting promise executor with up to {} thread(s)",
                config.promise_threads
            );
            Builder::new_multi_thread()
                .worker_threads(1)
                .max_blocking_threads(config.promise_threads)
                .thread_name("courier-promise")
                .enable_all()
                .build()
                .map_err(|error| error.to_string())
        })
        .as_ref()
        .map_err(|error| PromiseError::Executor(error.clone()))
}

/// Run `job` on the blocking pool. Never runs it on the calling thread.
pub(crate) fn execute<F>(job: F) -> Result<(), PromiseError>
where
    F: FnOnce() + Send + 'static,
{
    runtime()?.spawn_blocking(job);
    Ok(())
}
