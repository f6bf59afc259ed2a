//! Actor name - hierarchical identifier of registered actors.

use std::fmt::{Error, Formatter};

use serde::{Deserialize, Serialize};

const SEPARATOR: char = '.';

/// Hierarchical, dotted identifier of an actor (`parent.child`).
#[derive(Clone, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ActorName(Vec<String>);

impl ActorName {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Compose the name of a child actor: `self.child`.
    pub fn derive_with(&self, child: &str) -> Self {
        let mut segments = self.0.clone();
        segments.extend(Self::from(child).0);
        ActorName(segments)
    }

    pub fn parent(&self) -> Self {
        if self.0.len() > 1 {
            let mut segments = self.0.clone();
            segments.truncate(segments.len() - 1);
            ActorName(segments)
        } else {
            ActorName(Vec::new())
        }
    }

    pub fn level(&self) -> usize {
        self.0.len()
    }
}

impl From<&str> for ActorName {
    fn from(str: &str) -> Self {
        let segments: Vec<String> = str
            .split(SEPARATOR)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();
        ActorName(segments)
    }
}

impl From<String> for ActorName {
    fn from(string: String) -> Self {
        ActorName::from(string.as_str())
    }
}

impl From<&String> for ActorName {
    fn from(string: &String) -> Self {
        ActorName::from(string.as_str())
    }
}

impl From<&ActorName> for ActorName {
    fn from(name: &ActorName) -> Self {
        name.clone()
    }
}

impl From<ActorName> for String {
    fn from(name: ActorName) -> Self {
        name.to_string()
    }
}

impl std::fmt::Display for ActorName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "{}", self.0.join("."))
    }
}

impl std::fmt::Debug for ActorName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "ActorName({self})")
    }
}
