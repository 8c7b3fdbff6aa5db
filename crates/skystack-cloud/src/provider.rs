//! The provider client trait.
//!
//! Everything the orchestration engine needs from a cloud backend fits in
//! four calls: create, update, delete, describe. Payloads are opaque JSON
//! documents produced by the render layer; the engine never inspects them
//! beyond equality, and a backend never sees configuration or references.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

use crate::error::Result;

/// Where a stack lives, as a provider sees it.
///
/// The name is the stack's dotted logical path; together with account and
/// region it is globally unique.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StackIdentity {
    pub account: String,
    pub region: String,
    pub name: String,
}

impl StackIdentity {
    pub fn new(
        account: impl Into<String>,
        region: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            account: account.into(),
            region: region.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for StackIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.account, self.region, self.name)
    }
}

/// Output values a backend hands back after create or update.
pub type StackOutputs = HashMap<String, Value>;

/// A backend's view of one stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservedStack {
    pub identity: StackIdentity,
    /// The payload the backend last applied.
    pub payload: Value,
    pub outputs: StackOutputs,
    pub updated_at: DateTime<Utc>,
}

/// A cloud backend.
///
/// Implementations must be idempotent-friendly: `delete` on an absent stack
/// returns [`crate::ProviderError::NotFound`] and callers treat that as
/// success, and `describe` never invents state.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Backend name as used in account configuration.
    fn name(&self) -> &str;

    /// Creates the stack. Fails `Permanent` if it already exists.
    async fn create(&self, identity: &StackIdentity, payload: &Value) -> Result<StackOutputs>;

    /// Replaces the stack's payload. Output values stay stable for keys
    /// that survive the update.
    async fn update(&self, identity: &StackIdentity, payload: &Value) -> Result<StackOutputs>;

    /// Deletes the stack. Absent stacks fail with `NotFound`.
    async fn delete(&self, identity: &StackIdentity) -> Result<()>;

    /// Fetches the backend's view of the stack, `None` when it does not
    /// exist.
    async fn describe(&self, identity: &StackIdentity) -> Result<Option<ObservedStack>>;
}

/// Pulls the declared output keys out of a rendered payload.
///
/// Payloads carry their output declarations inline under `"outputs"`, the
/// same way a template format would; backends mint one value per key.
pub fn declared_output_keys(payload: &Value) -> Vec<String> {
    payload
        .get("outputs")
        .and_then(Value::as_array)
        .map(|keys| {
            keys.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
