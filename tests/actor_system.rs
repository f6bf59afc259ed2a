use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use courier::actor_system::{
    Actor, ActorAddress, ActorContext, ActorError, ActorName, ActorState, ActorSystem,
    CorrelationKey, FaultResolution, Message, NoIntervalStrategy, PooledDispatcher,
    SupervisionStrategy, async_trait,
};
use uuid::Uuid;

type Log = Arc<Mutex<Vec<String>>>;

fn log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

fn to(name: &str, body: &str) -> Message<String> {
    Message::new(ActorAddress::of(name), body.to_string())
}

async fn eventually<F: Fn() -> bool>(check: F) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

/// Records bodies; fails (or panics) on selected ones.
struct Recorder {
    log: Log,
    fail_on: &'static str,
    panic_on: &'static str,
    resolution: FaultResolution,
}

impl Recorder {
    fn new(log: &Log) -> Self {
        Recorder {
            log: Arc::clone(log),
            fail_on: "fail",
            panic_on: "panic",
            resolution: FaultResolution::Resume,
        }
    }
}

#[async_trait]
impl Actor<String> for Recorder {
    async fn receive(
        &mut self,
        message: Message<String>,
        ctx: &mut ActorContext<String>,
    ) -> Result<(), ActorError> {
        match message.body().as_str() {
            body if body == self.fail_on => Err(ActorError::msg("boom")),
            body if body == self.panic_on => panic!("kaboom"),
            "quit" => {
                ctx.stop();
                Ok(())
            }
            body => {
                self.log.lock().unwrap().push(body.to_string());
                Ok(())
            }
        }
    }

    fn resolve_fault(&mut self, _error: &ActorError) -> FaultResolution {
        self.resolution
    }
}

/// Numbers each instance and records every lifecycle step.
struct Lifecycle {
    id: usize,
    log: Log,
}

impl Lifecycle {
    fn factory(log: &Log) -> impl Fn() -> Lifecycle + Send + Sync + 'static {
        let log = Arc::clone(log);
        let instances = Arc::new(AtomicUsize::new(0));
        move || Lifecycle {
            id: instances.fetch_add(1, Ordering::SeqCst) + 1,
            log: Arc::clone(&log),
        }
    }

    fn push(&self, step: &str) {
        self.log.lock().unwrap().push(format!("{}:{}", self.id, step));
    }
}

#[async_trait]
impl Actor<String> for Lifecycle {
    async fn receive(
        &mut self,
        message: Message<String>,
        _ctx: &mut ActorContext<String>,
    ) -> Result<(), ActorError> {
        if message.body() == "fail" {
            return Err(ActorError::msg("failed on purpose"));
        }
        self.push(message.body());
        Ok(())
    }

    fn resolve_fault(&mut self, _error: &ActorError) -> FaultResolution {
        FaultResolution::Restart
    }

    async fn before_start(&mut self, _ctx: &mut ActorContext<String>) -> Result<(), ActorError> {
        self.push("before_start");
        Ok(())
    }

    async fn before_restart(&mut self, _ctx: &mut ActorContext<String>, error: Option<&ActorError>) {
        self.push(if error.is_some() { "before_restart(error)" } else { "before_restart" });
    }

    async fn after_restart(&mut self, _ctx: &mut ActorContext<String>) -> Result<(), ActorError> {
        self.push("after_restart");
        Ok(())
    }

    async fn after_stop(&mut self, _ctx: &mut ActorContext<String>) {
        self.push("after_stop");
    }
}

#[tokio::test]
async fn failed_message_is_dropped_and_actor_resumes() {
    let log = log();
    let system = ActorSystem::<String>::default();
    let recorder = Arc::clone(&log);
    system
        .actor_of("root", move || Recorder {
            fail_on: "ping",
            ..Recorder::new(&recorder)
        })
        .await
        .unwrap();
    let root = ActorName::from("root");

    system.tell(to("root", "ping"));
    assert_eq!(system.tick().await, 1);
    assert_eq!(system.coordinator().state_of(&root), Some(ActorState::Asleep));
    assert!(entries(&log).is_empty());

    system.tell(to("root", "after"));
    assert_eq!(system.tick().await, 1);
    assert_eq!(system.tick().await, 0);
    assert_eq!(entries(&log), vec!["after"]);
}

#[tokio::test]
async fn panicking_receive_is_contained() {
    let log = log();
    let system = ActorSystem::<String>::default();
    let recorder = Arc::clone(&log);
    system
        .actor_of("fragile", move || Recorder::new(&recorder))
        .await
        .unwrap();

    system.tell(to("fragile", "panic"));
    system.tell(to("fragile", "still here"));
    system.tick().await;
    system.tick().await;

    assert_eq!(entries(&log), vec!["still here"]);
}

#[tokio::test]
async fn tell_generates_keys_only_for_uncorrelated_messages() {
    let system = ActorSystem::<String>::default();

    let first = system.tell(to("nobody", "a"));
    let second = system.tell(to("nobody", "b"));
    assert!(first.is_correlated());
    assert!(second.is_correlated());
    assert_ne!(first, second);

    let existing = CorrelationKey::random();
    assert_eq!(system.tell(to("nobody", "c").correlate_by(existing)), existing);
}

#[tokio::test]
async fn configured_key_generator_is_used() {
    let issued = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&issued);
    let system = ActorSystem::<String>::builder()
        .key_generator(move || {
            CorrelationKey::from(Uuid::from_u128(counter.fetch_add(1, Ordering::SeqCst) as u128 + 1))
        })
        .build();

    let key = system.tell(to("nobody", "x"));
    assert_eq!(key.as_uuid(), &Uuid::from_u128(1));
    assert_eq!(issued.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unknown_destinations_are_silently_dropped() {
    let log = log();
    let system = ActorSystem::<String>::default();
    let recorder = Arc::clone(&log);
    system
        .actor_of("known", move || Recorder::new(&recorder))
        .await
        .unwrap();

    system.tell(to("unknown", "lost"));
    system.tell(Message::new(ActorAddress::dead_letter(), "lost".to_string()));
    assert_eq!(system.tick().await, 0);
    assert_eq!(system.coordinator().queued(&ActorName::from("known")), Some(0));
}

#[tokio::test]
async fn duplicate_registration_fails_immediately() {
    let log = log();
    let system = ActorSystem::<String>::default();
    let first = Arc::clone(&log);
    system
        .actor_of("files", move || Recorder::new(&first))
        .await
        .unwrap();

    let second = Arc::clone(&log);
    let error = system
        .actor_of("files", move || Recorder::new(&second))
        .await
        .unwrap_err();
    assert!(matches!(error, ActorError::Exists(name) if name == ActorName::from("files")));
}

/// Creates a child on demand and reports the child's address.
struct Parent {
    children: Log,
}

#[async_trait]
impl Actor<String> for Parent {
    async fn receive(
        &mut self,
        _message: Message<String>,
        ctx: &mut ActorContext<String>,
    ) -> Result<(), ActorError> {
        let log = Arc::clone(&self.children);
        let address = ctx
            .actor_of("child", move || Recorder::new(&log))
            .await?;
        self.children.lock().unwrap().push(address.to_string());
        Ok(())
    }
}

#[tokio::test]
async fn child_created_from_context_gets_derived_name() {
    let children = log();
    let system = ActorSystem::<String>::default();
    let reported = Arc::clone(&children);
    system
        .actor_of("parent", move || Parent {
            children: Arc::clone(&reported),
        })
        .await
        .unwrap();

    system.tell(to("parent", "spawn"));
    system.tick().await;

    assert_eq!(entries(&children), vec!["urn:actor:parent.child"]);
    assert!(system.coordinator().contains(&ActorName::from("parent.child")));

    system.tell(to("parent.child", "hello"));
    system.tick().await;
    assert_eq!(entries(&children), vec!["urn:actor:parent.child", "hello"]);
}

#[tokio::test]
async fn restart_migrates_pending_messages_to_a_fresh_instance() {
    let log = log();
    let system = ActorSystem::<String>::default();
    system
        .actor_of("worker", Lifecycle::factory(&log))
        .await
        .unwrap();
    let worker = ActorName::from("worker");

    for body in ["a", "b", "c"] {
        system.tell(to("worker", body));
    }
    system.restart("worker").await.unwrap();

    assert_eq!(system.coordinator().queued(&worker), Some(3));
    assert_eq!(system.coordinator().state_of(&worker), Some(ActorState::Asleep));

    while system.tick().await > 0 {}
    assert_eq!(
        entries(&log),
        vec![
            "1:before_start",
            "1:before_restart",
            "2:after_restart",
            "2:before_start",
            "2:a",
            "2:b",
            "2:c",
        ]
    );
}

#[tokio::test]
async fn restart_resolution_rebuilds_without_redelivery() {
    let log = log();
    let system = ActorSystem::<String>::default();
    system
        .actor_of("worker", Lifecycle::factory(&log))
        .await
        .unwrap();

    system.tell(to("worker", "fail"));
    system.tell(to("worker", "next"));
    while system.tick().await > 0 {}

    assert_eq!(
        entries(&log),
        vec![
            "1:before_start",
            "1:before_restart(error)",
            "2:after_restart",
            "2:before_start",
            "2:next",
        ]
    );
}

#[tokio::test]
async fn stop_discards_pending_messages() {
    let log = log();
    let system = ActorSystem::<String>::default();
    system
        .actor_of("worker", Lifecycle::factory(&log))
        .await
        .unwrap();

    system.tell(to("worker", "a"));
    system.tell(to("worker", "b"));
    system.stop("worker").await.unwrap();

    assert!(!system.coordinator().contains(&ActorName::from("worker")));
    system.tell(to("worker", "c"));
    assert_eq!(system.tick().await, 0);
    assert_eq!(entries(&log), vec!["1:before_start", "1:after_stop"]);

    // the name is free again
    system
        .actor_of("worker", Lifecycle::factory(&log))
        .await
        .unwrap();
    assert!(matches!(
        system.stop("missing").await,
        Err(ActorError::NotFound(_))
    ));
}

#[tokio::test]
async fn stop_resolution_and_stop_request_unregister() {
    let log = log();
    let system = ActorSystem::<String>::default();
    let recorder = Arc::clone(&log);
    system
        .actor_of("strict", move || Recorder {
            resolution: FaultResolution::Stop,
            ..Recorder::new(&recorder)
        })
        .await
        .unwrap();
    let quitter = Arc::clone(&log);
    system
        .actor_of("quitter", move || Recorder::new(&quitter))
        .await
        .unwrap();

    system.tell(to("strict", "fail"));
    system.tell(to("strict", "never"));
    system.tell(to("quitter", "quit"));
    system.tell(to("quitter", "never"));
    system.tick().await;

    assert!(system.coordinator().is_empty());
    assert!(entries(&log).is_empty());
}

/// Forwards every message to `sink`.
struct Forwarder;

#[async_trait]
impl Actor<String> for Forwarder {
    async fn receive(
        &mut self,
        message: Message<String>,
        ctx: &mut ActorContext<String>,
    ) -> Result<(), ActorError> {
        ctx.tell(Message::new(ActorAddress::of("sink"), message.into_body()));
        Ok(())
    }
}

/// Records sender and correlation key of what it receives.
struct Sink {
    log: Log,
}

#[async_trait]
impl Actor<String> for Sink {
    async fn receive(
        &mut self,
        message: Message<String>,
        _ctx: &mut ActorContext<String>,
    ) -> Result<(), ActorError> {
        self.log.lock().unwrap().push(format!(
            "{} {} {}",
            message.sender(),
            message.correlation_key(),
            message.body()
        ));
        Ok(())
    }
}

#[tokio::test]
async fn forwarded_messages_keep_the_causal_key() {
    let log = log();
    let system = ActorSystem::<String>::default();
    system.actor_of("forwarder", || Forwarder).await.unwrap();
    let sink = Arc::clone(&log);
    system
        .actor_of("sink", move || Sink {
            log: Arc::clone(&sink),
        })
        .await
        .unwrap();

    let key = system.tell(to("forwarder", "payload"));
    while system.tick().await > 0 {}

    assert_eq!(
        entries(&log),
        vec![format!("urn:actor:forwarder {key} payload")]
    );
}

/// Fails `before_start` a given number of times.
struct Flaky {
    failures_left: Arc<AtomicUsize>,
    retries: usize,
}

#[async_trait]
impl Actor<String> for Flaky {
    async fn receive(
        &mut self,
        _message: Message<String>,
        _ctx: &mut ActorContext<String>,
    ) -> Result<(), ActorError> {
        Ok(())
    }

    fn supervision_strategy(&self) -> SupervisionStrategy {
        if self.retries == 0 {
            SupervisionStrategy::Stop
        } else {
            SupervisionStrategy::Retry(Box::new(NoIntervalStrategy::new(self.retries)))
        }
    }

    async fn before_start(&mut self, _ctx: &mut ActorContext<String>) -> Result<(), ActorError> {
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            Err(ActorError::msg("not ready"))
        } else {
            Ok(())
        }
    }
}

#[tokio::test]
async fn start_failures_follow_the_supervision_strategy() {
    let system = ActorSystem::<String>::default();

    let failures = Arc::new(AtomicUsize::new(2));
    let left = Arc::clone(&failures);
    system
        .actor_of("patient", move || Flaky {
            failures_left: Arc::clone(&left),
            retries: 3,
        })
        .await
        .unwrap();
    assert_eq!(
        system.coordinator().state_of(&ActorName::from("patient")),
        Some(ActorState::Asleep)
    );

    let failures = Arc::new(AtomicUsize::new(1));
    let left = Arc::clone(&failures);
    let error = system
        .actor_of("impatient", move || Flaky {
            failures_left: Arc::clone(&left),
            retries: 0,
        })
        .await
        .unwrap_err();
    assert!(matches!(error, ActorError::StartFailed { .. }));
    assert!(!system.coordinator().contains(&ActorName::from("impatient")));
}

/// Tracks how many workers run `receive` concurrently.
struct Exclusive {
    in_flight: Arc<AtomicUsize>,
    max_seen: Arc<AtomicUsize>,
    handled: Arc<AtomicUsize>,
}

#[async_trait]
impl Actor<String> for Exclusive {
    async fn receive(
        &mut self,
        _message: Message<String>,
        _ctx: &mut ActorContext<String>,
    ) -> Result<(), ActorError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_seen.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(1)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.handled.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pooled_dispatch_runs_at_most_one_worker_per_actor() {
    let system = ActorSystem::<String>::builder()
        .dispatcher(PooledDispatcher::new(4).unwrap())
        .idle_wait(Duration::from_millis(5))
        .build();

    let handled = Arc::new(AtomicUsize::new(0));
    let mut maxima = Vec::new();
    for name in ["one", "two", "three"] {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        maxima.push(Arc::clone(&max_seen));
        let handled = Arc::clone(&handled);
        system
            .actor_of(name, move || Exclusive {
                in_flight: Arc::clone(&in_flight),
                max_seen: Arc::clone(&max_seen),
                handled: Arc::clone(&handled),
            })
            .await
            .unwrap();
    }
    system.start().unwrap();
    assert!(matches!(system.start(), Err(ActorError::AlreadyRunning)));

    for i in 0..40 {
        for name in ["one", "two", "three"] {
            system.tell(to(name, &i.to_string()));
        }
    }
    eventually(|| handled.load(Ordering::SeqCst) == 120).await;

    for max_seen in maxima {
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }
    system.shutdown().await;
}

#[tokio::test]
async fn shutdown_stops_children_before_parents() {
    let log = log();
    let system = ActorSystem::<String>::default();
    system
        .actor_of("a", Lifecycle::factory(&log))
        .await
        .unwrap();
    system
        .actor_of("a.b", Lifecycle::factory(&log))
        .await
        .unwrap();
    system.start().unwrap();

    system.tell(to("a.b", "hello"));
    eventually(|| entries(&log).contains(&"1:hello".to_string())).await;

    system.shutdown().await;
    assert!(system.coordinator().is_empty());
    let stops: Vec<String> = entries(&log)
        .into_iter()
        .filter(|entry| entry.ends_with("after_stop"))
        .collect();
    assert_eq!(stops.len(), 2);
    assert!(!system.is_running());
    assert!(matches!(system.start(), Err(ActorError::Terminated)));
}

#[derive(Clone, Copy)]
enum StartupRequest {
    Stop,
    RestartFirstInstance,
    StopAfterRestart,
}

/// Asks its context for a stop or restart from a start-up hook.
struct Hooked {
    id: usize,
    log: Log,
    request: StartupRequest,
}

impl Hooked {
    fn factory(log: &Log, request: StartupRequest) -> impl Fn() -> Hooked + Send + Sync + 'static {
        let log = Arc::clone(log);
        let instances = Arc::new(AtomicUsize::new(0));
        move || Hooked {
            id: instances.fetch_add(1, Ordering::SeqCst) + 1,
            log: Arc::clone(&log),
            request,
        }
    }

    fn push(&self, step: &str) {
        self.log.lock().unwrap().push(format!("{}:{}", self.id, step));
    }
}

#[async_trait]
impl Actor<String> for Hooked {
    async fn receive(
        &mut self,
        message: Message<String>,
        _ctx: &mut ActorContext<String>,
    ) -> Result<(), ActorError> {
        self.push(message.body());
        Ok(())
    }

    async fn before_start(&mut self, ctx: &mut ActorContext<String>) -> Result<(), ActorError> {
        self.push("before_start");
        match self.request {
            StartupRequest::Stop => ctx.stop(),
            StartupRequest::RestartFirstInstance if self.id == 1 => ctx.restart(),
            _ => {}
        }
        Ok(())
    }

    async fn before_restart(&mut self, _ctx: &mut ActorContext<String>, _error: Option<&ActorError>) {
        self.push("before_restart");
    }

    async fn after_restart(&mut self, ctx: &mut ActorContext<String>) -> Result<(), ActorError> {
        self.push("after_restart");
        if let StartupRequest::StopAfterRestart = self.request {
            ctx.stop();
        }
        Ok(())
    }

    async fn after_stop(&mut self, _ctx: &mut ActorContext<String>) {
        self.push("after_stop");
    }
}

#[tokio::test]
async fn stop_requested_while_starting_unregisters() {
    let log = log();
    let system = ActorSystem::<String>::default();
    system
        .actor_of("short", Hooked::factory(&log, StartupRequest::Stop))
        .await
        .unwrap();

    assert!(!system.coordinator().contains(&ActorName::from("short")));
    system.tell(to("short", "hello"));
    assert_eq!(system.tick().await, 0);
    assert_eq!(entries(&log), vec!["1:before_start", "1:after_stop"]);
}

#[tokio::test]
async fn restart_requested_while_starting_uses_a_fresh_instance() {
    let log = log();
    let system = ActorSystem::<String>::default();
    system
        .actor_of(
            "phoenix",
            Hooked::factory(&log, StartupRequest::RestartFirstInstance),
        )
        .await
        .unwrap();

    system.tell(to("phoenix", "hello"));
    while system.tick().await > 0 {}
    assert_eq!(
        entries(&log),
        vec![
            "1:before_start",
            "1:before_restart",
            "2:after_restart",
            "2:before_start",
            "2:hello",
        ]
    );
}

#[tokio::test]
async fn stop_requested_after_restart_unregisters() {
    let log = log();
    let system = ActorSystem::<String>::default();
    system
        .actor_of("fading", Hooked::factory(&log, StartupRequest::StopAfterRestart))
        .await
        .unwrap();

    system.tell(to("fading", "pending"));
    system.restart("fading").await.unwrap();

    assert!(!system.coordinator().contains(&ActorName::from("fading")));
    assert_eq!(system.tick().await, 0);
    assert_eq!(
        entries(&log),
        vec![
            "1:before_start",
            "1:before_restart",
            "2:after_restart",
            "2:before_start",
            "2:after_stop",
        ]
    );
}
