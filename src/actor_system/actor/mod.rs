//! Actor module - core actor types and traits.

pub(crate) mod mailbox;
pub(crate) mod runner;
pub(crate) mod supervision;

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

mod name;
pub use name::ActorName;

pub use mailbox::{Mailbox, Worker};
pub use supervision::{
    ExponentialBackoffStrategy, FaultResolution, FixedIntervalStrategy, NoIntervalStrategy,
    RetryStrategy, SupervisionStrategy,
};

use crate::actor_system::{ActorAddress, ActorsCoordinator, CorrelationKey, Message};

/// Anything that can travel as a message body.
pub trait Payload: Send + 'static {}

impl<T: Send + 'static> Payload for T {}

/// Scheduling state of a live actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ActorState {
    /// Registered, `before_start` not finished yet.
    New = 0,
    /// Idle; eligible for checkout once its mailbox is non-empty.
    Asleep = 1,
    /// Checked out; exactly one worker owns it.
    Busy = 2,
    /// The last `receive` failed and fault resolution is under way.
    Failed = 3,
}

impl ActorState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => ActorState::New,
            1 => ActorState::Asleep,
            2 => ActorState::Busy,
            _ => ActorState::Failed,
        }
    }
}

/// The actor context gives a running actor access to its name and the coordinator.
pub struct ActorContext<B: Payload> {
    name: ActorName,
    coordinator: ActorsCoordinator<B>,
    current: CorrelationKey,
    requested: Option<FaultResolution>,
}

impl<B: Payload> ActorContext<B> {
    pub(crate) fn new(name: ActorName, coordinator: ActorsCoordinator<B>) -> Self {
        ActorContext {
            name,
            coordinator,
            current: CorrelationKey::uncorrelated(),
            requested: None,
        }
    }

    pub fn name(&self) -> &ActorName {
        &self.name
    }

    /// Address of the actor owning this context.
    pub fn myself(&self) -> ActorAddress {
        ActorAddress::of(&self.name)
    }

    /// Address of a (possibly not yet created) child of this actor.
    pub fn child(&self, name: &str) -> ActorAddress {
        ActorAddress::of(self.name.derive_with(name))
    }

    /// Correlation key of the message currently being handled.
    pub fn correlation_key(&self) -> CorrelationKey {
        self.current
    }

    /// Fire and forget sending of messages.
    ///
    /// Uncorrelated messages inherit the key of the message being handled, and messages without
    /// a sender are sent from this actor.
    pub fn tell(&self, message: Message<B>) -> CorrelationKey {
        let message = if message.sender().is_dead_letter() {
            message.with_sender(self.myself())
        } else {
            message
        };
        self.coordinator.tell(message.correlate_by(self.current))
    }

    /// Ask the coordinator to stop this actor once the current message is handled.
    pub fn stop(&mut self) {
        self.requested = Some(FaultResolution::Stop);
    }

    /// Ask the coordinator to restart this actor once the current message is handled.
    pub fn restart(&mut self) {
        self.requested = Some(FaultResolution::Restart);
    }

    /// Create a child actor named `<self>.<name>`.
    pub async fn actor_of<A, F>(&self, name: &str, factory: F) -> Result<ActorAddress, ActorError>
    where
        A: Actor<B>,
        F: Fn() -> A + Send + Sync + 'static,
    {
        self.coordinator
            .actor_of(self.name.derive_with(name), factory)
            .await
    }

    /// Stops the child actor.
    pub async fn stop_child(&self, name: &str) -> Result<(), ActorError> {
        self.coordinator.stop(&self.name.derive_with(name)).await
    }

    pub(crate) fn coordinator(&self) -> &ActorsCoordinator<B> {
        &self.coordinator
    }

    pub(crate) fn begin(&mut self, key: CorrelationKey) {
        self.current = key;
        self.requested = None;
    }

    pub(crate) fn finish(&mut self) -> Option<FaultResolution> {
        self.current = CorrelationKey::uncorrelated();
        self.requested.take()
    }
}

impl<B: Payload> fmt::Debug for ActorContext<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorContext")
            .field("name", &self.name)
            .field("current", &self.current)
            .finish()
    }
}

/// Basic trait for actors.
#[async_trait]
pub trait Actor<B: Payload>: Send + 'static {
    /// Handle one message. An error hands the actor to [`Actor::resolve_fault`].
    async fn receive(
        &mut self,
        message: Message<B>,
        ctx: &mut ActorContext<B>,
    ) -> Result<(), ActorError>;

    /// Decide what happens after `receive` failed. Defaults to resuming with the next message.
    fn resolve_fault(&mut self, _error: &ActorError) -> FaultResolution {
        FaultResolution::Resume
    }

    /// Defines what to do when `before_start` fails.
    fn supervision_strategy(&self) -> SupervisionStrategy {
        SupervisionStrategy::Stop
    }

    /// Override this function to perform initialization of the actor.
    async fn before_start(&mut self, _ctx: &mut ActorContext<B>) -> Result<(), ActorError> {
        Ok(())
    }

    /// Called on the instance being replaced.
    async fn before_restart(&mut self, _ctx: &mut ActorContext<B>, _error: Option<&ActorError>) {}

    /// Called on the fresh instance, before it is started.
    async fn after_restart(&mut self, _ctx: &mut ActorContext<B>) -> Result<(), ActorError> {
        Ok(())
    }

    /// Override this function to perform work when the actor is stopped.
    async fn after_stop(&mut self, _ctx: &mut ActorContext<B>) {}
}

#[derive(Error, Debug)]
pub enum ActorError {
    #[error("Actor '{0}' exists")]
    Exists(ActorName),

    #[error("Actor '{0}' not found")]
    NotFound(ActorName),

    #[error("Invalid actor name '{0}'")]
    InvalidName(String),

    #[error("Actor '{name}' failed to start: {reason}")]
    StartFailed { name: ActorName, reason: String },

    #[error("Actor panicked: {0}")]
    Panicked(String),

    #[error("Actor system is already running")]
    AlreadyRunning,

    #[error("Actor system has been shut down")]
    Terminated,

    #[error("Actor runtime i/o error")]
    Io(#[from] std::io::Error),

    #[error("Actor runtime error: {0}")]
    RuntimeError(#[from] anyhow::Error),
}

impl ActorError {
    pub fn new<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::RuntimeError(anyhow::Error::new(error))
    }

    pub fn msg(message: impl fmt::Display + fmt::Debug + Send + Sync + 'static) -> Self {
        Self::RuntimeError(anyhow::Error::msg(message))
    }
}
