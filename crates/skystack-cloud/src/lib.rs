//! Cloud provider abstraction for skystack.
//!
//! The orchestration engine talks to clouds exclusively through the
//! [`ProviderClient`] trait defined here. Two backends ship with the tool:
//! [`MemoryProvider`] for tests and [`LocalProvider`] for file-backed runs;
//! real cloud backends implement the same trait out of tree.

pub mod error;
pub mod local;
pub mod memory;
pub mod provider;
pub mod retry;

pub use error::{ProviderError, Result};
pub use local::LocalProvider;
pub use memory::MemoryProvider;
pub use provider::{
    ObservedStack, ProviderClient, StackIdentity, StackOutputs, declared_output_keys,
};
pub use retry::{RetryConfig, with_retry};
