use skystack_cloud::ProviderError;
use skystack_core::CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid reference '{reference}': {message}")]
    InvalidReference { reference: String, message: String },

    #[error("cyclic reference: {}", cycle.join(" -> "))]
    CyclicReference { cycle: Vec<String> },

    #[error("stack '{stack}' is change-protected; refusing to {action} it")]
    ProtectedResourceViolation { stack: String, action: String },

    #[error("provisioning failed for stack '{stack}': {source}")]
    ProvisionFailure {
        stack: String,
        #[source]
        source: ProviderError,
    },

    #[error("provisioning timed out for stack '{stack}' after {elapsed_secs}s")]
    ProvisionTimeout { stack: String, elapsed_secs: u64 },

    #[error("no recorded output '{key}' of stack '{stack}' (needed by '{reference}')")]
    OutputMissing {
        stack: String,
        key: String,
        reference: String,
    },

    #[error("stack '{0}' is still in progress; wait for it to reach a terminal state")]
    StackInProgress(String),

    #[error("no member named '{name}' in stack group '{group}'")]
    UnknownMember { group: String, name: String },

    #[error("hook '{name}' failed for stack '{stack}': {source}")]
    HookFailed {
        stack: String,
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("unknown provider backend: {0}")]
    UnknownProvider(String),

    #[error("unknown controller domain: {0}")]
    UnknownDomain(String),

    #[error("no controller for '{0}'")]
    UnknownController(String),

    #[error("state store error: {0}")]
    StateStore(String),

    #[error("configuration error: {0}")]
    Config(#[from] CoreError),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        Self::StateStore(e.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        Self::StateStore(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
