use thiserror::Error;

/// Errors surfaced by provider backends.
///
/// The transient/permanent split is the contract the retry layer is built
/// on: only `Transient` is ever retried.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Throttling, timeouts, eventual consistency. Safe to retry.
    #[error("transient provider error: {0}")]
    Transient(String),

    /// Validation failures, conflicts, quota. Retrying cannot help.
    #[error("permanent provider error: {0}")]
    Permanent(String),

    #[error("stack not found: {0}")]
    NotFound(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    /// The backend could not read or write its own state.
    #[error("provider state error: {0}")]
    State(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<std::io::Error> for ProviderError {
    fn from(e: std::io::Error) -> Self {
        Self::State(e.to_string())
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(e: serde_json::Error) -> Self {
        Self::State(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;
