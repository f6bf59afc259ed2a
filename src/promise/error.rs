use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Shared cause of a rejected promise.
///
/// The same cause travels unchanged through `chain` links and `delegate` bridges and is handed
/// back by `get`.
#[derive(Clone)]
pub struct Rejection(Arc<anyhow::Error>);

impl Rejection {
    pub fn new(error: impl Into<anyhow::Error>) -> Self {
        Rejection(Arc::new(error.into()))
    }

    /// The cause as `E`, if that is what it is (context layers included).
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.0.downcast_ref::<E>()
    }

    pub fn is<E>(&self) -> bool
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.0.is::<E>()
    }

    pub fn error(&self) -> &anyhow::Error {
        &self.0
    }

    /// Whether both rejections share the very same cause.
    pub fn same_cause(&self, other: &Rejection) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rejection({:?})", self.0)
    }
}

impl std::error::Error for Rejection {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

#[derive(Error, Debug, Clone)]
pub enum PromiseError {
    #[error("Promise rejected: {0}")]
    Rejected(Rejection),

    #[error("Promise not settled within {0:?}")]
    Timeout(Duration),

    #[error("Promise already resolved")]
    AlreadyResolved,

    #[error("Promise already rejected")]
    AlreadyRejected,

    #[error("Deferred body panicked: {0}")]
    Panicked(String),

    #[error("Promise executor unavailable: {0}")]
    Executor(String),

    #[error("Promise abandoned before settlement")]
    Abandoned,
}

impl PromiseError {
    /// The rejection cause, when the promise was rejected.
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            PromiseError::Rejected(rejection) => Some(rejection),
            _ => None,
        }
    }
}
