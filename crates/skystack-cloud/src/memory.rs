//! In-memory provider backend.
//!
//! The default backend for tests and throwaway runs. Holds everything in
//! process memory, mints deterministic-looking output values, records every
//! call, and can be scripted to fail specific operations so retry and
//! skip behavior can be exercised without a real cloud.

use crate::error::{ProviderError, Result};
use crate::provider::{
    ObservedStack, ProviderClient, StackIdentity, StackOutputs, declared_output_keys,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
struct StoredStack {
    payload: Value,
    outputs: StackOutputs,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct FailurePlan {
    remaining: u32,
    transient: bool,
}

#[derive(Debug, Default)]
pub struct MemoryProvider {
    stacks: Mutex<HashMap<StackIdentity, StoredStack>>,
    failures: Mutex<HashMap<(String, &'static str), FailurePlan>>,
    calls: Mutex<Vec<String>>,
    sequence: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the next `times` calls of `operation` on `stack_name` to fail
    /// with a transient error.
    pub fn fail_transient(&self, stack_name: &str, operation: &'static str, times: u32) {
        lock(&self.failures).insert(
            (stack_name.to_string(), operation),
            FailurePlan {
                remaining: times,
                transient: true,
            },
        );
    }

    /// Scripts the next `times` calls of `operation` on `stack_name` to fail
    /// with a permanent error.
    pub fn fail_permanent(&self, stack_name: &str, operation: &'static str, times: u32) {
        lock(&self.failures).insert(
            (stack_name.to_string(), operation),
            FailurePlan {
                remaining: times,
                transient: false,
            },
        );
    }

    /// Seeds a stack as if an earlier run had created it. Advances the id
    /// sequence past the seeded outputs so fresh mints never collide.
    pub fn seed(&self, identity: StackIdentity, payload: Value, outputs: StackOutputs) {
        self.sequence
            .fetch_add(outputs.len() as u64, Ordering::SeqCst);
        lock(&self.stacks).insert(
            identity,
            StoredStack {
                payload,
                outputs,
                updated_at: Utc::now(),
            },
        );
    }

    /// Every call made so far, in order, as `"<operation> <identity>"`.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    pub fn stack_names(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.stacks).keys().map(|id| id.name.clone()).collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.stacks).is_empty()
    }

    fn record(&self, operation: &str, identity: &StackIdentity) {
        lock(&self.calls).push(format!("{operation} {identity}"));
    }

    fn planted_failure(
        &self,
        identity: &StackIdentity,
        operation: &'static str,
    ) -> Option<ProviderError> {
        let mut failures = lock(&self.failures);
        let key = (identity.name.clone(), operation);
        let plan = failures.get_mut(&key)?;
        if plan.remaining == 0 {
            return None;
        }
        plan.remaining -= 1;
        let message = format!("scripted {operation} failure for {}", identity.name);
        Some(if plan.transient {
            ProviderError::Transient(message)
        } else {
            ProviderError::Permanent(message)
        })
    }

    fn mint_outputs(&self, payload: &Value) -> StackOutputs {
        declared_output_keys(payload)
            .into_iter()
            .map(|key| {
                let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
                let value = json!(format!("mem-{key}-{seq:04}"));
                (key, value)
            })
            .collect()
    }
}

#[async_trait]
impl ProviderClient for MemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    async fn create(&self, identity: &StackIdentity, payload: &Value) -> Result<StackOutputs> {
        self.record("create", identity);
        if let Some(err) = self.planted_failure(identity, "create") {
            return Err(err);
        }

        let mut stacks = lock(&self.stacks);
        if stacks.contains_key(identity) {
            return Err(ProviderError::Permanent(format!(
                "stack already exists: {identity}"
            )));
        }
        let outputs = self.mint_outputs(payload);
        stacks.insert(
            identity.clone(),
            StoredStack {
                payload: payload.clone(),
                outputs: outputs.clone(),
                updated_at: Utc::now(),
            },
        );
        Ok(outputs)
    }

    async fn update(&self, identity: &StackIdentity, payload: &Value) -> Result<StackOutputs> {
        self.record("update", identity);
        if let Some(err) = self.planted_failure(identity, "update") {
            return Err(err);
        }

        let mut stacks = lock(&self.stacks);
        let stored = stacks
            .get_mut(identity)
            .ok_or_else(|| ProviderError::NotFound(identity.to_string()))?;

        // Output values stay stable across updates for keys that survive.
        let mut outputs = StackOutputs::new();
        for key in declared_output_keys(payload) {
            let value = match stored.outputs.get(&key) {
                Some(existing) => existing.clone(),
                None => {
                    let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
                    json!(format!("mem-{key}-{seq:04}"))
                }
            };
            outputs.insert(key, value);
        }
        stored.payload = payload.clone();
        stored.outputs = outputs.clone();
        stored.updated_at = Utc::now();
        Ok(outputs)
    }

    async fn delete(&self, identity: &StackIdentity) -> Result<()> {
        self.record("delete", identity);
        if let Some(err) = self.planted_failure(identity, "delete") {
            return Err(err);
        }

        lock(&self.stacks)
            .remove(identity)
            .map(|_| ())
            .ok_or_else(|| ProviderError::NotFound(identity.to_string()))
    }

    async fn describe(&self, identity: &StackIdentity) -> Result<Option<ObservedStack>> {
        self.record("describe", identity);
        if let Some(err) = self.planted_failure(identity, "describe") {
            return Err(err);
        }

        Ok(lock(&self.stacks).get(identity).map(|stored| ObservedStack {
            identity: identity.clone(),
            payload: stored.payload.clone(),
            outputs: stored.outputs.clone(),
            updated_at: stored.updated_at,
        }))
    }
}
