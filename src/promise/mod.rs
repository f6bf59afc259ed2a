//! One-shot asynchronous results.
//!
//! A [`Promise`] is settled exactly once, through its paired [`Deferred`], with either a value or
//! a [`Rejection`]. Handlers registered with `then`/`error`/`finalize`/`delegate` fire exactly
//! once each: at settlement when registered before it, immediately when registered after. A
//! panicking handler is contained and logged.
//!
//! ```no_run
//! use std::time::Duration;
//! use courier::promise::Promise;
//!
//! let answer = Promise::of(|deferred| Ok(deferred.resolve(42)?))
//!     .chain(|value| Promise::resolved_by(value * 2));
//! assert_eq!(answer.get(Duration::from_secs(1)).unwrap(), 84);
//! ```

mod error;
mod executor;

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;

pub use error::{PromiseError, Rejection};

use crate::util::panic_message;

type Outcome<T> = Result<T, Rejection>;
type Listener<T> = Box<dyn FnOnce(&Outcome<T>) + Send>;

struct Slot<T> {
    outcome: Option<Outcome<T>>,
    listeners: Vec<Listener<T>>,
}

struct Shared<T> {
    slot: Mutex<Slot<T>>,
    settled: Condvar,
}

impl<T: Clone + Send + 'static> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn settle(&self, outcome: Outcome<T>) -> Result<(), PromiseError> {
        let listeners = {
            let mut slot = self.lock();
            match &slot.outcome {
                Some(Ok(_)) => return Err(PromiseError::AlreadyResolved),
                Some(Err(_)) => return Err(PromiseError::AlreadyRejected),
                None => {}
            }
            slot.outcome = Some(outcome.clone());
            std::mem::take(&mut slot.listeners)
        };
        self.settled.notify_all();
        for listener in listeners {
            notify(listener, &outcome);
        }
        Ok(())
    }

    fn listen(&self, listener: Listener<T>) {
        let outcome = {
            let mut slot = self.lock();
            match slot.outcome.clone() {
                None => {
                    slot.listeners.push(listener);
                    return;
                }
                Some(outcome) => outcome,
            }
        };
        notify(listener, &outcome);
    }
}

/// A panicking handler is logged and never keeps the other handlers from firing.
fn notify<T>(listener: Listener<T>, outcome: &Outcome<T>) {
    if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| listener(outcome))) {
        log::warn!("Promise handler panicked: {}", panic_message(panic.as_ref()));
    }
}

/// Control surface settling a [`Promise`].
pub struct Deferred<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Deferred {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone + Send + 'static> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> Deferred<T> {
    pub fn new() -> Self {
        Deferred {
            shared: Arc::new(Shared {
                slot: Mutex::new(Slot {
                    outcome: None,
                    listeners: Vec::new(),
                }),
                settled: Condvar::new(),
            }),
        }
    }

    /// The promise settled by this deferred.
    pub fn promise(&self) -> Promise<T> {
        Promise {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn resolve(&self, value: T) -> Result<(), PromiseError> {
        self.shared.settle(Ok(value))
    }

    pub fn reject(&self, error: impl Into<anyhow::Error>) -> Result<(), PromiseError> {
        self.reject_with(Rejection::new(error))
    }

    /// Reject with an existing cause, e.g. one forwarded from another promise.
    pub fn reject_with(&self, rejection: Rejection) -> Result<(), PromiseError> {
        self.shared.settle(Err(rejection))
    }

    pub fn is_settled(&self) -> bool {
        self.shared.lock().outcome.is_some()
    }

    fn run<F>(&self, body: F)
    where
        F: FnOnce(&Deferred<T>) -> anyhow::Result<()>,
    {
        let failure = match panic::catch_unwind(AssertUnwindSafe(|| body(self))) {
            Ok(Ok(())) => return,
            Ok(Err(error)) => Rejection::new(error),
            Err(panic) => Rejection::new(PromiseError::Panicked(panic_message(panic.as_ref()))),
        };
        if let Err(conflict) = self.reject_with(failure.clone()) {
            log::warn!("Deferred body failed after settlement ({conflict}): {failure}");
        }
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Deferred")
    }
}

/// Handle to a value that becomes available asynchronously, exactly once.
pub struct Promise<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Promise {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone + Send + 'static> Promise<T> {
    /// Run `body` on the promise executor, never on the calling thread.
    ///
    /// An `Err` returned by the body, or a panic inside it, rejects the promise.
    pub fn of<F>(body: F) -> Self
    where
        F: FnOnce(&Deferred<T>) -> anyhow::Result<()> + Send + 'static,
    {
        let deferred = Deferred::new();
        let promise = deferred.promise();
        let runner = deferred.clone();
        if let Err(error) = executor::execute(move || runner.run(body)) {
            let _ = deferred.reject(error);
        }
        promise
    }

    pub fn resolved_by(value: T) -> Self {
        let deferred = Deferred::new();
        let _ = deferred.resolve(value);
        deferred.promise()
    }

    pub fn rejected_by(error: impl Into<anyhow::Error>) -> Self {
        let deferred = Deferred::new();
        let _ = deferred.reject(error);
        deferred.promise()
    }

    /// Called with the value once resolved.
    pub fn then<F>(&self, handler: F) -> Self
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.shared.listen(Box::new(move |outcome| {
            if let Ok(value) = outcome {
                handler(value.clone());
            }
        }));
        self.clone()
    }

    /// Called once rejected, only when the cause is an `E`.
    pub fn error<E, F>(&self, handler: F) -> Self
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
        F: FnOnce(&E) + Send + 'static,
    {
        self.shared.listen(Box::new(move |outcome| {
            if let Some(error) = outcome
                .as_ref()
                .err()
                .and_then(|rejection| rejection.downcast_ref::<E>())
            {
                handler(error);
            }
        }));
        self.clone()
    }

    /// Called once rejected, whatever the cause.
    pub fn error_any<F>(&self, handler: F) -> Self
    where
        F: FnOnce(Rejection) + Send + 'static,
    {
        self.shared.listen(Box::new(move |outcome| {
            if let Err(rejection) = outcome {
                handler(rejection.clone());
            }
        }));
        self.clone()
    }

    /// Called once settled, either way.
    pub fn finalize<F>(&self, handler: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.listen(Box::new(move |_| handler()));
        self.clone()
    }

    /// Forward this promise's settlement into `deferred`.
    pub fn delegate(&self, deferred: &Deferred<T>) -> Self {
        let deferred = deferred.clone();
        self.shared.listen(Box::new(move |outcome| {
            let forwarded = match outcome {
                Ok(value) => deferred.resolve(value.clone()),
                Err(rejection) => deferred.reject_with(rejection.clone()),
            };
            if let Err(conflict) = forwarded {
                log::warn!("Delegated settlement dropped: {conflict}");
            }
        }));
        self.clone()
    }

    /// A promise of whatever `next` promises for this promise's value.
    ///
    /// `next` runs on the promise executor. A rejection skips `next` and is forwarded as is.
    pub fn chain<U, F>(&self, next: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Promise<U> + Send + 'static,
    {
        let deferred = Deferred::new();
        let derived = deferred.promise();
        self.shared.listen(Box::new(move |outcome| match outcome {
            Ok(value) => {
                let value = value.clone();
                let link = deferred.clone();
                let scheduled = executor::execute(move || {
                    match panic::catch_unwind(AssertUnwindSafe(|| next(value))) {
                        Ok(promise) => {
                            promise.delegate(&link);
                        }
                        Err(panic) => {
                            let _ = link.reject(PromiseError::Panicked(panic_message(
                                panic.as_ref(),
                            )));
                        }
                    }
                });
                if let Err(error) = scheduled {
                    let _ = deferred.reject(error);
                }
            }
            Err(rejection) => {
                let _ = deferred.reject_with(rejection.clone());
            }
        }));
        derived
    }

    /// `chain` for a plain fallible transformation.
    pub fn map<U, F>(&self, transform: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> anyhow::Result<U> + Send + 'static,
    {
        self.chain(move |value| match transform(value) {
            Ok(mapped) => Promise::resolved_by(mapped),
            Err(error) => Promise::rejected_by(error),
        })
    }

    /// Block the calling thread until settlement or `timeout`.
    ///
    /// The timeout only stops the waiting; the computation carries on.
    pub fn get(&self, timeout: Duration) -> Result<T, PromiseError> {
        let slot = self.shared.lock();
        let (slot, _) = self
            .shared
            .settled
            .wait_timeout_while(slot, timeout, |slot| slot.outcome.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        match &slot.outcome {
            Some(Ok(value)) => Ok(value.clone()),
            Some(Err(rejection)) => Err(PromiseError::Rejected(rejection.clone())),
            None => Err(PromiseError::Timeout(timeout)),
        }
    }

    /// Wait for settlement without blocking a thread.
    pub async fn outcome(&self) -> Result<T, PromiseError> {
        let (tx, rx) = oneshot::channel();
        self.shared.listen(Box::new(move |outcome| {
            let _ = tx.send(outcome.clone());
        }));
        match rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(rejection)) => Err(PromiseError::Rejected(rejection)),
            Err(_) => Err(PromiseError::Abandoned),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.shared.lock().outcome.is_none()
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self.shared.lock().outcome, Some(Ok(_)))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self.shared.lock().outcome, Some(Err(_)))
    }
}

impl<T: Clone + Send + 'static> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.shared.lock().outcome {
            None => "pending",
            Some(Ok(_)) => "resolved",
            Some(Err(_)) => "rejected",
        };
        write!(f, "Promise({state})")
    }
}
