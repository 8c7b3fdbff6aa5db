//! Reference resolution.
//!
//! A reference either lands on a static configuration attribute, on a stack
//! output value that is already known, or on a stack output that will only
//! exist once its stack has provisioned. The registry owns the last two
//! cases: controllers declare where each output will land when they build
//! their stacks, and the executor registers concrete values as stacks
//! complete. Resolution never blocks; a not-yet-available output comes back
//! as a [`DeferredHandle`] and it is the planner's job to order things so
//! the value exists by the time it is needed.

use crate::error::{EngineError, Result};
use serde_json::Value;
use skystack_cloud::StackIdentity;
use skystack_core::{Project, Ref};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, trace};

/// Outcome of resolving one reference.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The reference resolved to a concrete value.
    Value(Value),
    /// The reference is valid but its value does not exist yet.
    Deferred(DeferredHandle),
}

impl Resolution {
    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred(_))
    }
}

/// A promise that a stack output will exist after its stack provisions.
#[derive(Debug, Clone, PartialEq)]
pub struct DeferredHandle {
    /// Stack that produces the value.
    pub stack: StackIdentity,
    /// Output key on that stack.
    pub key: String,
    /// The reference that asked for it.
    pub reference: Ref,
}

#[derive(Debug, Clone)]
struct DeclaredOutput {
    stack: StackIdentity,
    key: String,
}

/// Shared table of declared and resolved stack outputs.
///
/// Shared via `Arc` between controllers, planner and executor; interior
/// locking keeps `register_output` safe from concurrently executing stacks.
#[derive(Debug, Default)]
pub struct OutputRegistry {
    declared: RwLock<HashMap<String, DeclaredOutput>>,
    values: RwLock<HashMap<String, Value>>,
    generation: AtomicU64,
}

fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl OutputRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares that `stack` will produce output `key` at reference `path`.
    /// Re-declaring a path overwrites; controllers re-declare identically on
    /// every init.
    pub fn declare(&self, path: &str, stack: StackIdentity, key: impl Into<String>) {
        trace!(path, stack = %stack, "Declaring stack output");
        write_lock(&self.declared).insert(
            path.to_string(),
            DeclaredOutput {
                stack,
                key: key.into(),
            },
        );
    }

    /// The stack declared to produce the output at `path`, if any.
    pub fn declared_source(&self, path: &str) -> Option<(StackIdentity, String)> {
        read_lock(&self.declared)
            .get(path)
            .map(|d| (d.stack.clone(), d.key.clone()))
    }

    /// Records a concrete output value.
    ///
    /// Idempotent: registering the same value again is a no-op. A changed
    /// value bumps the generation counter, which the executor uses to catch
    /// mid-run drift of already-planned stacks.
    pub fn register_output(&self, path: &str, value: Value) {
        let mut values = write_lock(&self.values);
        match values.get(path) {
            Some(existing) if *existing == value => {}
            Some(_) => {
                debug!(path, "Stack output changed value");
                values.insert(path.to_string(), value);
                self.generation.fetch_add(1, Ordering::SeqCst);
            }
            None => {
                values.insert(path.to_string(), value);
                self.generation.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    /// Drops a known value, typically after its stack is deleted. Later
    /// resolutions of `path` defer again.
    pub fn forget_output(&self, path: &str) {
        let mut values = write_lock(&self.values);
        if values.remove(path).is_some() {
            self.generation.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Bulk-loads output values recorded by earlier runs. Does not bump the
    /// generation counter; hydration is the baseline, not drift.
    pub fn hydrate(&self, entries: impl IntoIterator<Item = (String, Value)>) {
        let mut values = write_lock(&self.values);
        for (path, value) in entries {
            values.insert(path, value);
        }
    }

    pub fn value(&self, path: &str) -> Option<Value> {
        read_lock(&self.values).get(path).cloned()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Resolves a reference against static configuration first, then known
    /// output values, then output declarations.
    pub fn resolve(&self, project: &Project, reference: &Ref) -> Result<Resolution> {
        if let Some(value) = project.get(reference) {
            return Ok(Resolution::Value(value));
        }

        let path = reference.path();
        if let Some(value) = self.value(path) {
            return Ok(Resolution::Value(value));
        }

        if let Some((stack, key)) = self.declared_source(path) {
            return Ok(Resolution::Deferred(DeferredHandle {
                stack,
                key,
                reference: reference.clone(),
            }));
        }

        Err(EngineError::InvalidReference {
            reference: reference.to_string(),
            message: "does not match any configuration attribute or declared stack output"
                .to_string(),
        })
    }
}
