//! Actor runtime.
//!
//! Addressable actors with private mailboxes, driven by an event loop that checks out ready
//! actors and hands their workers to a [`Dispatcher`]. Messages are routed with `tell`
//! (fire-and-forget); lifecycle is owned by the [`ActorsCoordinator`].

mod actor;
mod address;
mod coordinator;
mod correlation;
pub(crate) mod dispatcher;
mod event_loop;
mod message;
mod system;

pub use actor::{
    Actor, ActorContext, ActorError, ActorName, ActorState, ExponentialBackoffStrategy,
    FaultResolution, FixedIntervalStrategy, Mailbox, NoIntervalStrategy, Payload, RetryStrategy,
    SupervisionStrategy, Worker,
};
pub use address::{ActorAddress, AddressError};
pub use coordinator::{ActorDescriptor, ActorsCoordinator};
pub use correlation::{CorrelationKey, KeyGenerator, RandomKeys};
pub use dispatcher::{Dispatcher, PooledDispatcher, SerialDispatcher};
pub use event_loop::{Alarm, EventLoop};
pub use message::Message;
pub use system::{ActorSystem, ActorSystemBuilder};

pub use async_trait::async_trait;
