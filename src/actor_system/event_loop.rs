//! Event loop - finds ready actors and hands their workers to the dispatcher.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::Notify;

use crate::actor_system::{ActorsCoordinator, Dispatcher, Payload, Worker};

/// Identifies actors ready to run: ASLEEP with a non-empty mailbox.
pub struct Alarm<B: Payload> {
    coordinator: ActorsCoordinator<B>,
}

impl<B: Payload> Alarm<B> {
    pub fn new(coordinator: ActorsCoordinator<B>) -> Self {
        Alarm { coordinator }
    }

    /// Check out every ready actor. Each returned worker already owns its actor.
    pub fn wakeup_asleep_workers(&self) -> Vec<Worker> {
        self.coordinator
            .runners()
            .into_iter()
            .filter(|runner| runner.is_ready())
            .filter_map(|runner| runner.checkout())
            .collect()
    }
}

pub struct EventLoop<B: Payload> {
    alarm: Alarm<B>,
    dispatcher: Arc<dyn Dispatcher>,
    wakeup: Arc<Notify>,
    idle_wait: Duration,
}

impl<B: Payload> EventLoop<B> {
    pub(crate) fn new(
        coordinator: ActorsCoordinator<B>,
        dispatcher: Arc<dyn Dispatcher>,
        wakeup: Arc<Notify>,
        idle_wait: Duration,
    ) -> Self {
        EventLoop {
            alarm: Alarm::new(coordinator),
            dispatcher,
            wakeup,
            idle_wait,
        }
    }

    /// One scheduling round. Returns how many workers were dispatched.
    pub async fn tick(&self) -> usize {
        let workers = self.alarm.wakeup_asleep_workers();
        let dispatched = workers.len();
        for worker in workers {
            self.dispatcher.dispatch(worker).await;
        }
        dispatched
    }

    async fn run(&self, running: &AtomicBool) {
        log::debug!("Event loop started");
        while running.load(Ordering::Acquire) {
            if self.tick().await == 0 {
                let _ = tokio::time::timeout(self.idle_wait, self.wakeup.notified()).await;
            }
        }
        log::debug!("Event loop stopped");
    }

    /// Drive `tick` on a dedicated thread until `running` is cleared.
    pub(crate) fn spawn(
        self: Arc<Self>,
        running: Arc<AtomicBool>,
    ) -> std::io::Result<JoinHandle<()>> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        std::thread::Builder::new()
            .name("courier-event-loop".to_string())
            .spawn(move || runtime.block_on(self.run(&running)))
    }

    pub(crate) fn interrupt(&self) {
        self.wakeup.notify_one();
    }

    pub(crate) fn dispatcher(&self) -> &Arc<dyn Dispatcher> {
        &self.dispatcher
    }
}
