//! Actors coordinator - owns actor lifecycle and message routing.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::Notify;

use crate::actor_system::actor::runner::ActorRunner;
use crate::actor_system::{
    Actor, ActorAddress, ActorError, ActorName, ActorState, CorrelationKey, FaultResolution,
    KeyGenerator, Message, Payload,
};

type ActorFactory<B> = Arc<dyn Fn() -> Box<dyn Actor<B>> + Send + Sync>;

/// A registered `name -> factory` binding, kept apart from the live instance so the actor can be
/// rebuilt on restart.
pub struct ActorDescriptor<B: Payload> {
    name: ActorName,
    factory: ActorFactory<B>,
}

impl<B: Payload> ActorDescriptor<B> {
    pub fn new<A, F>(name: impl Into<ActorName>, factory: F) -> Self
    where
        A: Actor<B>,
        F: Fn() -> A + Send + Sync + 'static,
    {
        ActorDescriptor {
            name: name.into(),
            factory: Arc::new(move || Box::new(factory()) as Box<dyn Actor<B>>),
        }
    }

    pub fn name(&self) -> &ActorName {
        &self.name
    }

    fn create(&self) -> Box<dyn Actor<B>> {
        (self.factory)()
    }
}

impl<B: Payload> Clone for ActorDescriptor<B> {
    fn clone(&self) -> Self {
        ActorDescriptor {
            name: self.name.clone(),
            factory: Arc::clone(&self.factory),
        }
    }
}

impl<B: Payload> fmt::Debug for ActorDescriptor<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActorDescriptor({})", self.name)
    }
}

struct Registry<B: Payload> {
    actors: DashMap<ActorName, Arc<ActorRunner<B>>>,
    factories: DashMap<ActorName, ActorDescriptor<B>>,
    keys: Arc<dyn KeyGenerator>,
    wakeup: Arc<Notify>,
}

/// Registry of live actors and their factories.
///
/// Cheap to clone; every clone shares the same registries.
pub struct ActorsCoordinator<B: Payload>(Arc<Registry<B>>);

impl<B: Payload> Clone for ActorsCoordinator<B> {
    fn clone(&self) -> Self {
        ActorsCoordinator(Arc::clone(&self.0))
    }
}

impl<B: Payload> ActorsCoordinator<B> {
    pub(crate) fn new(keys: Arc<dyn KeyGenerator>, wakeup: Arc<Notify>) -> Self {
        ActorsCoordinator(Arc::new(Registry {
            actors: DashMap::new(),
            factories: DashMap::new(),
            keys,
            wakeup,
        }))
    }

    /// Route a message to its destination's mailbox.
    ///
    /// Uncorrelated messages get a fresh key. Unknown destinations drop the message; no error
    /// ever reaches the sender.
    pub fn tell(&self, message: Message<B>) -> CorrelationKey {
        let message = if message.is_correlated() {
            message
        } else {
            message.correlate_by(self.0.keys.generate())
        };
        let key = message.correlation_key();
        self.route(message);
        key
    }

    fn route(&self, mut message: Message<B>) {
        loop {
            let Some(runner) = message.destination().name().and_then(|name| self.runner(name))
            else {
                log::debug!(
                    "Dropping message {} for unknown destination {}",
                    message.correlation_key(),
                    message.destination()
                );
                return;
            };
            match runner.mailbox().put(message) {
                Ok(()) => {
                    log::trace!("Message queued for '{}'", runner.name());
                    self.wake();
                    return;
                }
                // sealed by a concurrent restart or stop; the registry already moved on
                Err(returned) => message = returned,
            }
        }
    }

    /// Register a factory under `name` and start the actor.
    ///
    /// A name that is already registered is a configuration defect and fails immediately with
    /// [`ActorError::Exists`].
    pub async fn actor_of<A, F>(
        &self,
        name: impl Into<ActorName>,
        factory: F,
    ) -> Result<ActorAddress, ActorError>
    where
        A: Actor<B>,
        F: Fn() -> A + Send + Sync + 'static,
    {
        self.register(ActorDescriptor::new(name, factory)).await
    }

    pub async fn register(&self, descriptor: ActorDescriptor<B>) -> Result<ActorAddress, ActorError> {
        let name = descriptor.name().clone();
        if name.is_empty() {
            return Err(ActorError::InvalidName(name.to_string()));
        }
        match self.0.factories.entry(name.clone()) {
            Entry::Occupied(_) => {
                log::error!("Actor '{}' is already registered", &name);
                return Err(ActorError::Exists(name));
            }
            Entry::Vacant(entry) => {
                entry.insert(descriptor);
            }
        }
        self.start(&name).await
    }

    /// Build the actor from its factory, register it and run its start-up.
    pub async fn start(&self, name: &ActorName) -> Result<ActorAddress, ActorError> {
        let descriptor = self
            .descriptor(name)
            .ok_or_else(|| ActorError::NotFound(name.clone()))?;
        let runner = ActorRunner::create(name.clone(), descriptor.create(), self.clone());
        match self.0.actors.entry(name.clone()) {
            Entry::Occupied(_) => return Err(ActorError::Exists(name.clone())),
            Entry::Vacant(entry) => {
                entry.insert(Arc::clone(&runner));
            }
        }
        self.launch(&runner).await?;
        Ok(ActorAddress::of(name))
    }

    /// Start the runner, then apply a stop or restart its start-up hooks asked for.
    async fn launch(&self, runner: &Arc<ActorRunner<B>>) -> Result<(), ActorError> {
        let mut runner = Arc::clone(runner);
        loop {
            let requested = match runner.start().await {
                Ok(requested) => requested,
                Err(error) => {
                    log::error!("{error}");
                    self.unregister(&runner);
                    return Err(error);
                }
            };
            match requested.unwrap_or_default() {
                FaultResolution::Resume => {
                    self.wake();
                    return Ok(());
                }
                FaultResolution::Stop => {
                    log::debug!("Actor '{}' asked to stop while starting", runner.name());
                    self.retire(&runner).await;
                    return Ok(());
                }
                FaultResolution::Restart => match self.replace(runner, None).await? {
                    Some(fresh) => runner = fresh,
                    None => return Ok(()),
                },
            }
        }
    }

    /// Replace the actor with a fresh instance from the same factory, keeping its pending
    /// messages.
    pub async fn restart(&self, name: &ActorName) -> Result<(), ActorError> {
        let runner = self
            .runner(name)
            .ok_or_else(|| ActorError::NotFound(name.clone()))?;
        self.reincarnate(runner, None).await
    }

    pub(crate) async fn reincarnate(
        &self,
        old: Arc<ActorRunner<B>>,
        cause: Option<ActorError>,
    ) -> Result<(), ActorError> {
        match self.replace(old, cause).await? {
            Some(fresh) => self.launch(&fresh).await,
            None => Ok(()),
        }
    }

    /// Swap `old` for a fresh instance holding its pending messages. `None` when `old` was
    /// already replaced or stopped.
    async fn replace(
        &self,
        old: Arc<ActorRunner<B>>,
        cause: Option<ActorError>,
    ) -> Result<Option<Arc<ActorRunner<B>>>, ActorError> {
        let name = old.name().clone();
        let descriptor = self
            .descriptor(&name)
            .ok_or_else(|| ActorError::NotFound(name.clone()))?;
        let fresh = ActorRunner::create(name.clone(), descriptor.create(), self.clone());

        let mut incarnation = old.lock().await;
        if !self.is_current(&old) {
            log::debug!("Actor '{}' was replaced before its restart", &name);
            return Ok(None);
        }
        log::warn!("Restarting actor '{}'", &name);
        incarnation.before_restart(cause.as_ref()).await;

        let swapped = match self.0.actors.get_mut(&name) {
            Some(mut current) if Arc::ptr_eq(current.value(), &old) => {
                *current.value_mut() = Arc::clone(&fresh);
                true
            }
            _ => false,
        };
        if !swapped {
            return Ok(None);
        }
        let pending = old.mailbox().seal();
        log::debug!(
            "Migrating {} pending message(s) of '{}'",
            pending.len(),
            &name
        );
        fresh.mailbox().prepend(pending);
        drop(incarnation);

        if let Err(error) = fresh.after_restart().await {
            log::error!("Actor '{}' failed after restart: {}", &name, error);
            self.unregister(&fresh);
            return Err(error);
        }
        Ok(Some(fresh))
    }

    /// Unregister the actor, discarding its pending messages.
    pub async fn stop(&self, name: &ActorName) -> Result<(), ActorError> {
        let runner = self
            .runner(name)
            .ok_or_else(|| ActorError::NotFound(name.clone()))?;
        if self.retire(&runner).await {
            Ok(())
        } else {
            Err(ActorError::NotFound(name.clone()))
        }
    }

    pub(crate) async fn retire(&self, runner: &Arc<ActorRunner<B>>) -> bool {
        if !self.unregister(runner) {
            return false;
        }
        let discarded = runner.mailbox().seal();
        if !discarded.is_empty() {
            log::debug!(
                "Discarding {} pending message(s) of '{}'",
                discarded.len(),
                runner.name()
            );
        }
        runner.after_stop().await;
        log::debug!("Actor '{}' stopped.", runner.name());
        true
    }

    /// Stop every actor, children before their parents.
    pub(crate) async fn stop_all(&self) {
        let mut runners = self.runners();
        runners.sort_by_key(|runner| std::cmp::Reverse(runner.name().level()));
        for runner in runners {
            self.retire(&runner).await;
        }
    }

    /// Drop every registration without running `after_stop`; pending messages are discarded.
    pub(crate) fn clear(&self) {
        for runner in self.runners() {
            runner.mailbox().seal();
        }
        self.0.actors.clear();
        self.0.factories.clear();
    }

    fn unregister(&self, runner: &Arc<ActorRunner<B>>) -> bool {
        let removed = self
            .0
            .actors
            .remove_if(runner.name(), |_, current| Arc::ptr_eq(current, runner))
            .is_some();
        if removed {
            self.0.factories.remove(runner.name());
        }
        removed
    }

    fn is_current(&self, runner: &Arc<ActorRunner<B>>) -> bool {
        self.0
            .actors
            .get(runner.name())
            .is_some_and(|current| Arc::ptr_eq(current.value(), runner))
    }

    fn runner(&self, name: &ActorName) -> Option<Arc<ActorRunner<B>>> {
        self.0.actors.get(name).map(|entry| Arc::clone(entry.value()))
    }

    fn descriptor(&self, name: &ActorName) -> Option<ActorDescriptor<B>> {
        self.0.factories.get(name).map(|entry| entry.value().clone())
    }

    /// Snapshot of the live actors.
    pub(crate) fn runners(&self) -> Vec<Arc<ActorRunner<B>>> {
        self.0
            .actors
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub(crate) fn wake(&self) {
        self.0.wakeup.notify_one();
    }

    pub fn contains(&self, name: &ActorName) -> bool {
        self.0.actors.contains_key(name)
    }

    pub fn state_of(&self, name: &ActorName) -> Option<ActorState> {
        self.runner(name).map(|runner| runner.state())
    }

    /// Number of messages waiting in the actor's mailbox.
    pub fn queued(&self, name: &ActorName) -> Option<usize> {
        self.runner(name).map(|runner| runner.mailbox().len())
    }

    pub fn names(&self) -> Vec<ActorName> {
        let mut names: Vec<ActorName> =
            self.0.actors.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.0.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.actors.is_empty()
    }
}

impl<B: Payload> fmt::Debug for ActorsCoordinator<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorsCoordinator")
            .field("actors", &self.names())
            .finish()
    }
}
