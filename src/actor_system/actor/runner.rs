//! Actor runner - one live actor instance with its mailbox and scheduling state.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use futures::FutureExt;
use tokio::sync::{Mutex, MutexGuard};

use crate::actor_system::ActorsCoordinator;
use crate::util::panic_message;

use super::{
    Actor, ActorContext, ActorError, ActorName, ActorState, FaultResolution, Mailbox, Payload,
    SupervisionStrategy, Worker,
};

pub(crate) struct Incarnation<B: Payload> {
    actor: Box<dyn Actor<B>>,
    ctx: ActorContext<B>,
}

pub(crate) struct ActorRunner<B: Payload> {
    name: ActorName,
    state: AtomicU8,
    mailbox: Mailbox<B>,
    incarnation: Mutex<Incarnation<B>>,
}

impl<B: Payload> ActorRunner<B> {
    pub fn create(
        name: ActorName,
        actor: Box<dyn Actor<B>>,
        coordinator: ActorsCoordinator<B>,
    ) -> Arc<Self> {
        let ctx = ActorContext::new(name.clone(), coordinator);
        Arc::new(ActorRunner {
            name,
            state: AtomicU8::new(ActorState::New as u8),
            mailbox: Mailbox::new(),
            incarnation: Mutex::new(Incarnation { actor, ctx }),
        })
    }

    pub fn name(&self) -> &ActorName {
        &self.name
    }

    pub fn state(&self) -> ActorState {
        ActorState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ActorState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn mailbox(&self) -> &Mailbox<B> {
        &self.mailbox
    }

    /// Asleep with something to do.
    pub fn is_ready(&self) -> bool {
        self.state() == ActorState::Asleep && !self.mailbox.is_empty()
    }

    /// Flip ASLEEP to BUSY and hand out the only worker allowed to drain this actor.
    pub fn checkout(self: &Arc<Self>) -> Option<Worker> {
        self.state
            .compare_exchange(
                ActorState::Asleep as u8,
                ActorState::Busy as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .ok()?;
        let runner = Arc::clone(self);
        Some(Worker::new(
            self.name.clone(),
            Box::pin(runner.handle_next()),
        ))
    }

    async fn handle_next(self: Arc<Self>) {
        let mut incarnation = self.incarnation.lock().await;
        let Some(message) = self.mailbox.pop() else {
            drop(incarnation);
            self.set_state(ActorState::Asleep);
            return;
        };

        let Incarnation { actor, ctx } = &mut *incarnation;
        let key = message.correlation_key();
        ctx.begin(key);
        log::trace!("Actor '{}' handling message {}", &self.name, key);

        let outcome = match AssertUnwindSafe(actor.receive(message, ctx))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => Err(ActorError::Panicked(panic_message(panic.as_ref()))),
        };

        let requested = ctx.finish();
        let coordinator = ctx.coordinator().clone();
        let (resolution, cause) = match outcome {
            Ok(()) => (requested.unwrap_or_default(), None),
            Err(error) => {
                self.set_state(ActorState::Failed);
                let resolution = requested.unwrap_or_else(|| actor.resolve_fault(&error));
                log::warn!(
                    "Actor '{}' failed on message {}: {} ({:?})",
                    &self.name,
                    key,
                    error,
                    resolution
                );
                (resolution, Some(error))
            }
        };
        drop(incarnation);

        match resolution {
            FaultResolution::Resume => {
                self.set_state(ActorState::Asleep);
                coordinator.wake();
            }
            FaultResolution::Restart => {
                if let Err(error) = coordinator.reincarnate(self, cause).await {
                    log::error!("Failed to restart actor: {error}");
                }
            }
            FaultResolution::Stop => {
                coordinator.retire(&self).await;
            }
        }
    }

    /// Run `before_start` under the actor's supervision strategy, then mark it ASLEEP.
    ///
    /// Returns the stop or restart the start-up hooks requested through the context.
    pub async fn start(&self) -> Result<Option<FaultResolution>, ActorError> {
        log::debug!("Starting actor '{}'...", &self.name);

        let mut incarnation = self.incarnation.lock().await;
        let Incarnation { actor, ctx } = &mut *incarnation;

        let mut start_error = actor.before_start(ctx).await.err();

        if start_error.is_some() {
            let mut retries = 0;
            match actor.supervision_strategy() {
                SupervisionStrategy::Stop => {
                    log::error!("Actor '{}' failed to start!", &self.name);
                }
                SupervisionStrategy::Retry(mut retry_strategy) => {
                    log::debug!(
                        "Restarting actor with retry strategy: {:?}",
                        &retry_strategy
                    );
                    while retries < retry_strategy.max_retries() && start_error.is_some() {
                        log::debug!("retries: {}", &retries);
                        if let Some(duration) = retry_strategy.next_backoff() {
                            log::debug!("Backoff for {:?}", &duration);
                            tokio::time::sleep(duration).await;
                        }
                        retries += 1;
                        start_error = actor.before_start(ctx).await.err();
                    }
                }
            }
        }
        let requested = ctx.finish();
        drop(incarnation);

        match start_error {
            None => {
                // a pending stop or restart keeps the instance out of checkout
                if requested.is_none() {
                    self.set_state(ActorState::Asleep);
                }
                log::debug!("Actor '{}' has started successfully.", &self.name);
                Ok(requested)
            }
            Some(error) => {
                self.set_state(ActorState::Failed);
                Err(ActorError::StartFailed {
                    name: self.name.clone(),
                    reason: error.to_string(),
                })
            }
        }
    }

    /// Wait for any in-flight `receive` and keep the instance locked.
    pub async fn lock(&self) -> MutexGuard<'_, Incarnation<B>> {
        self.incarnation.lock().await
    }

    pub async fn after_restart(&self) -> Result<(), ActorError> {
        let mut incarnation = self.incarnation.lock().await;
        let Incarnation { actor, ctx } = &mut *incarnation;
        actor.after_restart(ctx).await
    }

    pub async fn after_stop(&self) {
        let mut incarnation = self.incarnation.lock().await;
        let Incarnation { actor, ctx } = &mut *incarnation;
        actor.after_stop(ctx).await;
    }
}

impl<B: Payload> Incarnation<B> {
    pub async fn before_restart(&mut self, error: Option<&ActorError>) {
        self.actor.before_restart(&mut self.ctx, error).await;
    }
}

impl<B: Payload> fmt::Debug for ActorRunner<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorRunner")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("mailbox", &self.mailbox)
            .finish()
    }
}
