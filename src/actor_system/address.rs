//! Actor addresses - URN wrappers around actor names.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::actor_system::actor::ActorName;

const URN_PREFIX: &str = "urn:actor:";
const DEAD_LETTER_URN: &str = "urn:actor:$dead-letter";

/// Address of an actor in the form `urn:actor:<name>`.
///
/// The dead-letter address stands for "unknown": messages sent to it are dropped.
#[derive(Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ActorAddress(Option<ActorName>);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("'{0}' is not an actor URN")]
    NotAnActorUrn(String),

    #[error("actor URN '{0}' carries an empty name")]
    EmptyName(String),
}

impl ActorAddress {
    pub fn of(name: impl Into<ActorName>) -> Self {
        let name = name.into();
        if name.is_empty() {
            Self::dead_letter()
        } else {
            ActorAddress(Some(name))
        }
    }

    pub fn dead_letter() -> Self {
        ActorAddress(None)
    }

    pub fn is_dead_letter(&self) -> bool {
        self.0.is_none()
    }

    /// Name of the addressed actor, `None` for the dead-letter address.
    pub fn name(&self) -> Option<&ActorName> {
        self.0.as_ref()
    }

    pub fn urn(&self) -> String {
        self.to_string()
    }
}

impl Default for ActorAddress {
    fn default() -> Self {
        Self::dead_letter()
    }
}

impl From<ActorName> for ActorAddress {
    fn from(name: ActorName) -> Self {
        ActorAddress::of(name)
    }
}

impl FromStr for ActorAddress {
    type Err = AddressError;

    fn from_str(urn: &str) -> Result<Self, Self::Err> {
        if urn == DEAD_LETTER_URN {
            return Ok(Self::dead_letter());
        }
        let name = urn
            .strip_prefix(URN_PREFIX)
            .ok_or_else(|| AddressError::NotAnActorUrn(urn.to_string()))?;
        let name = ActorName::from(name);
        if name.is_empty() {
            Err(AddressError::EmptyName(urn.to_string()))
        } else {
            Ok(ActorAddress(Some(name)))
        }
    }
}

impl TryFrom<String> for ActorAddress {
    type Error = AddressError;

    fn try_from(urn: String) -> Result<Self, Self::Error> {
        urn.parse()
    }
}

impl From<ActorAddress> for String {
    fn from(address: ActorAddress) -> Self {
        address.to_string()
    }
}

impl fmt::Display for ActorAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(name) => write!(f, "{URN_PREFIX}{name}"),
            None => f.write_str(DEAD_LETTER_URN),
        }
    }
}

impl fmt::Debug for ActorAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}
