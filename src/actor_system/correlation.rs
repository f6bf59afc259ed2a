//! Correlation keys linking causally related messages.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque token shared by causally related messages.
///
/// The nil key means "uncorrelated".
#[derive(Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationKey(Uuid);

impl CorrelationKey {
    pub fn uncorrelated() -> Self {
        CorrelationKey(Uuid::nil())
    }

    pub fn random() -> Self {
        CorrelationKey(Uuid::new_v4())
    }

    pub fn is_correlated(&self) -> bool {
        !self.0.is_nil()
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CorrelationKey {
    fn default() -> Self {
        Self::uncorrelated()
    }
}

impl From<Uuid> for CorrelationKey {
    fn from(uuid: Uuid) -> Self {
        CorrelationKey(uuid)
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_correlated() {
            write!(f, "{}", self.0)
        } else {
            f.write_str("uncorrelated")
        }
    }
}

impl fmt::Debug for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CorrelationKey({self})")
    }
}

/// Source of fresh correlation keys used by `tell`.
pub trait KeyGenerator: Send + Sync + 'static {
    fn generate(&self) -> CorrelationKey;
}

/// Generates random (v4 UUID) keys.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomKeys;

impl KeyGenerator for RandomKeys {
    fn generate(&self) -> CorrelationKey {
        CorrelationKey::random()
    }
}

impl<F> KeyGenerator for F
where
    F: Fn() -> CorrelationKey + Send + Sync + 'static,
{
    fn generate(&self) -> CorrelationKey {
        self()
    }
}
