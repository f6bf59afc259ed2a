//! Actor mailbox and the worker handed out on checkout.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use futures::future::BoxFuture;

use crate::actor_system::Message;
use crate::actor_system::actor::ActorName;

struct MailboxQueue<B> {
    messages: VecDeque<Message<B>>,
    sealed: bool,
}

/// FIFO queue of pending messages owned by exactly one actor.
pub struct Mailbox<B> {
    queue: Mutex<MailboxQueue<B>>,
}

impl<B> Default for Mailbox<B> {
    fn default() -> Self {
        Mailbox {
            queue: Mutex::new(MailboxQueue {
                messages: VecDeque::new(),
                sealed: false,
            }),
        }
    }
}

impl<B> Mailbox<B> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MailboxQueue<B>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue a message. A sealed mailbox hands the message back.
    pub fn put(&self, message: Message<B>) -> Result<(), Message<B>> {
        let mut queue = self.lock();
        if queue.sealed {
            return Err(message);
        }
        queue.messages.push_back(message);
        Ok(())
    }

    pub fn pop(&self) -> Option<Message<B>> {
        self.lock().messages.pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().messages.is_empty()
    }

    /// Close the mailbox and take everything still pending, oldest first.
    pub(crate) fn seal(&self) -> Vec<Message<B>> {
        let mut queue = self.lock();
        queue.sealed = true;
        queue.messages.drain(..).collect()
    }

    /// Put migrated messages ahead of anything enqueued since.
    pub(crate) fn prepend(&self, messages: Vec<Message<B>>) {
        let mut queue = self.lock();
        for message in messages.into_iter().rev() {
            queue.messages.push_front(message);
        }
    }
}

impl<B> fmt::Debug for Mailbox<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let queue = self.lock();
        f.debug_struct("Mailbox")
            .field("pending", &queue.messages.len())
            .field("sealed", &queue.sealed)
            .finish()
    }
}

/// Drain permission for one actor: running it handles at most one message.
pub struct Worker {
    actor: ActorName,
    task: BoxFuture<'static, ()>,
}

impl Worker {
    pub(crate) fn new(actor: ActorName, task: BoxFuture<'static, ()>) -> Self {
        Worker { actor, task }
    }

    pub fn actor(&self) -> &ActorName {
        &self.actor
    }

    pub async fn run(self) {
        self.task.await
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Worker({})", self.actor)
    }
}
