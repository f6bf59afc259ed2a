//! Courier - an in-process concurrency core.
//!
//! Two independent pieces:
//! - [`actor_system`]: addressable actors with private mailboxes, an event loop checking out
//!   ready actors, serial or pooled dispatch, and restart/stop supervision.
//! - [`promise`]: one-shot asynchronous results with chaining and delegation, used to sequence
//!   I/O pipelines.

pub mod actor_system;
pub mod config;
pub mod promise;

mod util;

pub use actor_system::{
    Actor, ActorAddress, ActorContext, ActorError, ActorName, ActorSystem, CorrelationKey,
    FaultResolution, Message, async_trait,
};
pub use config::RuntimeConfig;
pub use promise::{Deferred, Promise, PromiseError, Rejection};
