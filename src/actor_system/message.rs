//! Message envelope exchanged between actors.

use serde::{Deserialize, Serialize};

use crate::actor_system::{ActorAddress, CorrelationKey};

/// Immutable envelope carrying a body from a sender to a destination.
///
/// Every derivation returns a new envelope; there are no setters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message<B> {
    correlation_key: CorrelationKey,
    sender: ActorAddress,
    destination: ActorAddress,
    body: B,
}

impl<B> Message<B> {
    /// An uncorrelated message from the dead-letter address.
    pub fn new(destination: ActorAddress, body: B) -> Self {
        Message {
            correlation_key: CorrelationKey::uncorrelated(),
            sender: ActorAddress::dead_letter(),
            destination,
            body,
        }
    }

    pub fn correlation_key(&self) -> CorrelationKey {
        self.correlation_key
    }

    pub fn is_correlated(&self) -> bool {
        self.correlation_key.is_correlated()
    }

    pub fn sender(&self) -> &ActorAddress {
        &self.sender
    }

    pub fn destination(&self) -> &ActorAddress {
        &self.destination
    }

    pub fn body(&self) -> &B {
        &self.body
    }

    pub fn into_body(self) -> B {
        self.body
    }

    /// Same envelope around a transformed body.
    pub fn map<C, F>(self, f: F) -> Message<C>
    where
        F: FnOnce(B) -> C,
    {
        Message {
            correlation_key: self.correlation_key,
            sender: self.sender,
            destination: self.destination,
            body: f(self.body),
        }
    }

    /// Attach a correlation key. A message that already carries one keeps it.
    pub fn correlate_by(self, key: CorrelationKey) -> Self {
        if self.is_correlated() {
            self
        } else {
            Message {
                correlation_key: key,
                ..self
            }
        }
    }

    /// A reply travelling back to this message's sender under the same key.
    pub fn reply_with<C>(&self, body: C) -> Message<C> {
        Message {
            correlation_key: self.correlation_key,
            sender: self.destination.clone(),
            destination: self.sender.clone(),
            body,
        }
    }

    pub fn with_sender(self, sender: ActorAddress) -> Self {
        Message { sender, ..self }
    }

    pub fn with_destination(self, destination: ActorAddress) -> Self {
        Message {
            destination,
            ..self
        }
    }
}
