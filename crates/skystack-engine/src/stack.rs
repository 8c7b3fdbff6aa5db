//! Stacks: the unit of provisioning.
//!
//! A stack pairs a rendered payload with an identity, parameters (literal
//! or reference-valued), declared outputs, tags and hooks. It carries its
//! lifecycle state through a run and owns the plan decision table: given
//! the provider's view of the stack, what has to happen to converge it.

use crate::error::{EngineError, Result};
use crate::refs::{DeferredHandle, OutputRegistry, Resolution};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use skystack_cloud::{ObservedStack, StackIdentity, StackOutputs};
use skystack_core::{Project, Ref};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// What a plan decided to do with one stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Update,
    Delete,
    NoOp,
}

impl Action {
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Self::NoOp)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::NoOp => "no-op",
        };
        write!(f, "{}", s)
    }
}

/// Lifecycle of a stack within one engine run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackState {
    Unprovisioned,
    Planned(Action),
    InProgress,
    Complete,
    Failed,
    /// Not executed because a dependency failed or was itself skipped.
    Skipped,
}

impl StackState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Skipped)
    }
}

impl fmt::Display for StackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unprovisioned => write!(f, "unprovisioned"),
            Self::Planned(action) => write!(f, "planned({action})"),
            Self::InProgress => write!(f, "in-progress"),
            Self::Complete => write!(f, "complete"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// When a hook fires relative to its operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookTiming {
    Pre,
    Post,
}

impl fmt::Display for HookTiming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pre => write!(f, "pre"),
            Self::Post => write!(f, "post"),
        }
    }
}

/// What a hook gets to see when it runs.
pub struct HookContext<'a> {
    pub identity: &'a StackIdentity,
    pub action: Action,
    pub timing: HookTiming,
    /// Fresh outputs; present for post hooks of create and update.
    pub outputs: Option<&'a StackOutputs>,
}

/// User-supplied side effect attached to a stack operation.
///
/// Hooks may perform auxiliary provider work of their own; a hook error
/// fails the stack the same way a provider error would.
#[async_trait::async_trait]
pub trait StackHook: Send + Sync {
    fn name(&self) -> &str;
    async fn run(&self, ctx: HookContext<'_>) -> anyhow::Result<()>;
}

/// Hooks grouped by operation and timing, run in registration order.
#[derive(Default, Clone)]
pub struct StackHooks {
    hooks: HashMap<(Action, HookTiming), Vec<Arc<dyn StackHook>>>,
}

impl StackHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, action: Action, timing: HookTiming, hook: Arc<dyn StackHook>) {
        self.hooks.entry((action, timing)).or_default().push(hook);
    }

    /// Appends every hook from `other`, keeping both registration orders.
    pub fn merge(&mut self, other: &StackHooks) {
        for (slot, hooks) in &other.hooks {
            self.hooks.entry(*slot).or_default().extend(hooks.iter().cloned());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.values().all(Vec::is_empty)
    }

    pub(crate) async fn run(
        &self,
        action: Action,
        timing: HookTiming,
        identity: &StackIdentity,
        outputs: Option<&StackOutputs>,
    ) -> Result<()> {
        let Some(hooks) = self.hooks.get(&(action, timing)) else {
            return Ok(());
        };
        for hook in hooks {
            debug!(
                stack = %identity,
                hook = hook.name(),
                action = %action,
                timing = %timing,
                "Running stack hook"
            );
            hook.run(HookContext {
                identity,
                action,
                timing,
                outputs,
            })
            .await
            .map_err(|source| EngineError::HookFailed {
                stack: identity.to_string(),
                name: hook.name().to_string(),
                source,
            })?;
        }
        Ok(())
    }
}

impl fmt::Debug for StackHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for ((action, timing), hooks) in &self.hooks {
            map.entry(&format!("{action}:{timing}"), &hooks.len());
        }
        map.finish()
    }
}

/// Declares that payload output `key` lands at reference path `path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputBinding {
    pub key: String,
    pub path: String,
}

impl OutputBinding {
    pub fn new(key: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            path: path.into(),
        }
    }
}

/// Tags stamped into every desired document. Ordered so serialization is
/// canonical.
pub type StackTags = BTreeMap<String, String>;

/// One stack parameter; references stay symbolic until execution.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub key: String,
    pub value: ParamValue,
}

impl Parameter {
    pub fn literal(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value: ParamValue::Literal(value),
        }
    }

    pub fn reference(key: impl Into<String>, reference: Ref) -> Self {
        Self {
            key: key.into(),
            value: ParamValue::Reference(reference),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Literal(Value),
    Reference(Ref),
}

/// Parameters after a resolution pass. Unresolvable references keep a
/// marker in `values` and surface in `deferred`.
#[derive(Debug, Clone)]
pub struct ResolvedParameters {
    pub values: BTreeMap<String, Value>,
    pub deferred: Vec<DeferredHandle>,
}

impl ResolvedParameters {
    pub fn is_fully_resolved(&self) -> bool {
        self.deferred.is_empty()
    }
}

/// The unit of provisioning.
#[derive(Debug)]
pub struct Stack {
    identity: StackIdentity,
    payload: Value,
    parameters: Vec<Parameter>,
    bindings: Vec<OutputBinding>,
    tags: StackTags,
    hooks: StackHooks,
    enabled: bool,
    change_protected: bool,
    best_effort: bool,
    always_update: bool,
    state: RwLock<StackState>,
}

impl Stack {
    pub fn new(identity: StackIdentity, payload: Value) -> Self {
        Self {
            identity,
            payload,
            parameters: Vec::new(),
            bindings: Vec::new(),
            tags: StackTags::new(),
            hooks: StackHooks::new(),
            enabled: true,
            change_protected: false,
            best_effort: false,
            always_update: false,
            state: RwLock::new(StackState::Unprovisioned),
        }
    }

    pub fn with_parameters(mut self, parameters: Vec<Parameter>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_bindings(mut self, bindings: Vec<OutputBinding>) -> Self {
        self.bindings = bindings;
        self
    }

    pub fn with_tags(mut self, tags: StackTags) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_hooks(mut self, hooks: StackHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn change_protected(mut self, protected: bool) -> Self {
        self.change_protected = protected;
        self
    }

    pub fn best_effort(mut self, best_effort: bool) -> Self {
        self.best_effort = best_effort;
        self
    }

    /// Forces an update whenever the stack exists, even with an unchanged
    /// payload.
    pub fn always_update(mut self, always: bool) -> Self {
        self.always_update = always;
        self
    }

    pub fn identity(&self) -> &StackIdentity {
        &self.identity
    }

    /// Dotted logical name, unique across the project.
    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn bindings(&self) -> &[OutputBinding] {
        &self.bindings
    }

    pub fn tags(&self) -> &StackTags {
        &self.tags
    }

    pub fn hooks(&self) -> &StackHooks {
        &self.hooks
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_change_protected(&self) -> bool {
        self.change_protected
    }

    pub fn is_best_effort(&self) -> bool {
        self.best_effort
    }

    pub fn is_always_update(&self) -> bool {
        self.always_update
    }

    pub fn state(&self) -> StackState {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub(crate) fn set_state(&self, state: StackState) {
        let mut guard = self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        debug!(stack = %self.identity, from = %*guard, to = %state, "Stack state transition");
        *guard = state;
    }

    /// References used by this stack's parameters.
    pub fn references(&self) -> Vec<&Ref> {
        self.parameters
            .iter()
            .filter_map(|p| match &p.value {
                ParamValue::Reference(r) => Some(r),
                ParamValue::Literal(_) => None,
            })
            .collect()
    }

    /// Resolves all parameters. References without a value yet keep a
    /// marker in the result and surface as deferred handles.
    pub fn resolve_parameters(
        &self,
        project: &Project,
        registry: &OutputRegistry,
    ) -> Result<ResolvedParameters> {
        let mut values = BTreeMap::new();
        let mut deferred = Vec::new();
        for parameter in &self.parameters {
            let value = match &parameter.value {
                ParamValue::Literal(v) => v.clone(),
                ParamValue::Reference(r) => match registry.resolve(project, r)? {
                    Resolution::Value(v) => v,
                    Resolution::Deferred(handle) => {
                        let marker = json!({ "$deferred": r.path() });
                        deferred.push(handle);
                        marker
                    }
                },
            };
            values.insert(parameter.key.clone(), value);
        }
        Ok(ResolvedParameters { values, deferred })
    }

    /// The document handed to the provider: template, parameter values and
    /// tags. Built from sorted maps, so serialization is canonical and
    /// equality ignores object key order.
    pub fn desired_document(&self, parameters: &BTreeMap<String, Value>) -> Value {
        json!({
            "template": self.payload,
            "parameters": parameters,
            "tags": self.tags,
        })
    }

    /// The plan decision table.
    ///
    /// | observed | enabled | payload     | action                  |
    /// |----------|---------|-------------|-------------------------|
    /// | absent   | yes     | -           | create                  |
    /// | absent   | no      | -           | no-op                   |
    /// | present  | no      | -           | delete (error if protected) |
    /// | present  | yes     | equal       | no-op (update if always_update) |
    /// | present  | yes     | differs     | update (no-op + warn if protected) |
    pub fn decide(&self, observed: Option<&ObservedStack>, desired: &Value) -> Result<Action> {
        match observed {
            None => {
                if self.enabled {
                    Ok(Action::Create)
                } else {
                    Ok(Action::NoOp)
                }
            }
            Some(_) if !self.enabled => {
                if self.change_protected {
                    return Err(EngineError::ProtectedResourceViolation {
                        stack: self.identity.to_string(),
                        action: "delete".to_string(),
                    });
                }
                Ok(Action::Delete)
            }
            Some(observed) => {
                let differs = &observed.payload != desired;
                if self.change_protected {
                    if differs {
                        warn!(
                            stack = %self.identity,
                            "Change-protected stack has drifted from its configuration; leaving it untouched"
                        );
                    }
                    Ok(Action::NoOp)
                } else if self.always_update || differs {
                    Ok(Action::Update)
                } else {
                    Ok(Action::NoOp)
                }
            }
        }
    }
}
