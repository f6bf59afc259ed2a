//! Actor system facade and its builder.

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::Notify;

use crate::actor_system::{
    Actor, ActorAddress, ActorError, ActorName, ActorsCoordinator, CorrelationKey, Dispatcher,
    EventLoop, KeyGenerator, Message, Payload, PooledDispatcher, RandomKeys, SerialDispatcher,
};
use crate::config::{DispatcherKind, RuntimeConfig};

const DEFAULT_IDLE_WAIT: Duration = Duration::from_millis(50);
const MIN_IDLE_WAIT: Duration = Duration::from_millis(1);

/// Configures an [`ActorSystem`] before any actor exists.
///
/// `build` consumes the builder, so the configuration cannot change afterwards.
pub struct ActorSystemBuilder<B: Payload> {
    dispatcher: Arc<dyn Dispatcher>,
    keys: Arc<dyn KeyGenerator>,
    idle_wait: Duration,
    _payload: PhantomData<fn() -> B>,
}

impl<B: Payload> Default for ActorSystemBuilder<B> {
    fn default() -> Self {
        ActorSystemBuilder {
            dispatcher: Arc::new(SerialDispatcher),
            keys: Arc::new(RandomKeys),
            idle_wait: DEFAULT_IDLE_WAIT,
            _payload: PhantomData,
        }
    }
}

impl<B: Payload> ActorSystemBuilder<B> {
    /// Builder following a [`RuntimeConfig`]; a pooled dispatcher gets its threads here.
    pub fn from_config(config: &RuntimeConfig) -> Result<Self, ActorError> {
        let builder = Self::default().idle_wait(config.idle_wait());
        Ok(match config.dispatcher {
            DispatcherKind::Serial => builder.dispatcher(SerialDispatcher),
            DispatcherKind::Pooled => builder.dispatcher(PooledDispatcher::new(config.pool_size)?),
        })
    }

    pub fn dispatcher(mut self, dispatcher: impl Dispatcher) -> Self {
        self.dispatcher = Arc::new(dispatcher);
        self
    }

    pub fn key_generator(mut self, keys: impl KeyGenerator) -> Self {
        self.keys = Arc::new(keys);
        self
    }

    /// How long an idle event loop parks before scanning again.
    ///
    /// Clamped to at least one millisecond, so an idle loop never spins.
    pub fn idle_wait(mut self, idle_wait: Duration) -> Self {
        self.idle_wait = idle_wait.max(MIN_IDLE_WAIT);
        self
    }

    pub fn build(self) -> ActorSystem<B> {
        let wakeup = Arc::new(Notify::new());
        let coordinator = ActorsCoordinator::new(self.keys, Arc::clone(&wakeup));
        let event_loop = EventLoop::new(
            coordinator.clone(),
            self.dispatcher,
            wakeup,
            self.idle_wait,
        );
        ActorSystem {
            inner: Arc::new(SystemInner {
                coordinator,
                event_loop: Arc::new(event_loop),
                running: Arc::new(AtomicBool::new(false)),
                terminated: AtomicBool::new(false),
                thread: Mutex::new(None),
            }),
        }
    }
}

struct SystemInner<B: Payload> {
    coordinator: ActorsCoordinator<B>,
    event_loop: Arc<EventLoop<B>>,
    running: Arc<AtomicBool>,
    terminated: AtomicBool,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl<B: Payload> Drop for SystemInner<B> {
    fn drop(&mut self) {
        if self.terminated.swap(true, Ordering::AcqRel) {
            return;
        }
        log::debug!("Actor system dropped without shutdown");
        self.running.store(false, Ordering::Release);
        self.event_loop.interrupt();
        // contexts point back at the registry; clearing it lets both go
        self.coordinator.clear();
        self.event_loop.dispatcher().shutdown();
    }
}

/// Entry point of the actor runtime. Clones share the same system.
pub struct ActorSystem<B: Payload> {
    inner: Arc<SystemInner<B>>,
}

impl<B: Payload> Clone for ActorSystem<B> {
    fn clone(&self) -> Self {
        ActorSystem {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: Payload> Default for ActorSystem<B> {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl<B: Payload> ActorSystem<B> {
    pub fn builder() -> ActorSystemBuilder<B> {
        ActorSystemBuilder::default()
    }

    pub fn from_config(config: &RuntimeConfig) -> Result<Self, ActorError> {
        Ok(ActorSystemBuilder::from_config(config)?.build())
    }

    /// Fire and forget: returns the message's correlation key, freshly generated when the
    /// message had none. Messages to unknown actors are dropped.
    pub fn tell(&self, message: Message<B>) -> CorrelationKey {
        self.inner.coordinator.tell(message)
    }

    /// Register and start an actor; fails with [`ActorError::Exists`] on a duplicate name.
    pub async fn actor_of<A, F>(
        &self,
        name: impl Into<ActorName>,
        factory: F,
    ) -> Result<ActorAddress, ActorError>
    where
        A: Actor<B>,
        F: Fn() -> A + Send + Sync + 'static,
    {
        self.inner.coordinator.actor_of(name, factory).await
    }

    pub async fn restart(&self, name: impl Into<ActorName>) -> Result<(), ActorError> {
        self.inner.coordinator.restart(&name.into()).await
    }

    pub async fn stop(&self, name: impl Into<ActorName>) -> Result<(), ActorError> {
        self.inner.coordinator.stop(&name.into()).await
    }

    /// Run a single scheduling round on the calling task.
    pub async fn tick(&self) -> usize {
        self.inner.event_loop.tick().await
    }

    /// Start the event-loop thread.
    pub fn start(&self) -> Result<(), ActorError> {
        if self.inner.terminated.load(Ordering::Acquire) {
            return Err(ActorError::Terminated);
        }
        let mut thread = self
            .inner
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if thread.is_some() {
            return Err(ActorError::AlreadyRunning);
        }
        self.inner.running.store(true, Ordering::Release);
        let handle = Arc::clone(&self.inner.event_loop).spawn(Arc::clone(&self.inner.running));
        match handle {
            Ok(handle) => {
                *thread = Some(handle);
                log::info!("Actor system started");
                Ok(())
            }
            Err(error) => {
                self.inner.running.store(false, Ordering::Release);
                Err(ActorError::Io(error))
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Stop the event loop, stop every actor and release the dispatcher.
    pub async fn shutdown(&self) {
        if self.inner.terminated.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.running.store(false, Ordering::Release);
        self.inner.event_loop.interrupt();

        let thread = self
            .inner
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(thread) = thread {
            match tokio::task::spawn_blocking(move || thread.join()).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => log::error!("Event loop thread panicked"),
                Err(error) => log::error!("Failed to join the event loop: {error}"),
            }
        }

        self.inner.coordinator.stop_all().await;
        self.inner.event_loop.dispatcher().shutdown();
        log::info!("Actor system shut down");
    }

    pub fn coordinator(&self) -> &ActorsCoordinator<B> {
        &self.inner.coordinator
    }
}

impl<B: Payload> fmt::Debug for ActorSystem<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorSystem")
            .field("running", &self.is_running())
            .field("coordinator", &self.inner.coordinator)
            .finish()
    }
}
