//! Stack orchestration engine for skystack.
//!
//! The engine turns a loaded project into provider operations. Controllers
//! render configuration domains into [`Stack`]s grouped for ordering and
//! failure scope; the [`Planner`] observes what exists and decides an action
//! per stack; the [`Executor`] applies the plan in dependency waves, feeding
//! each stack's outputs to the stacks that reference them. Recorded outputs
//! persist under the project's state directory so later runs resolve
//! references without touching the provider.
//!
//! The usual entry point is [`ControllerRegistry`]: build one from an
//! [`EngineContext`] and call `validate`, `plan`, `provision` or `delete`
//! with a [`Scope`](skystack_core::Scope).

pub mod context;
pub mod controller;
pub mod controllers;
pub mod error;
pub mod executor;
pub mod group;
pub mod outputs;
pub mod planner;
pub mod refs;
pub mod render;
pub mod stack;

pub use context::{EngineContext, EngineOptions, ProviderFactory};
pub use controller::{Controller, ControllerRegistry, ValidationReport};
pub use controllers::{DnsController, NetEnvController};
pub use error::{EngineError, Result};
pub use executor::{ExecutionReport, Executor, FailedStack, SkippedStack};
pub use group::{Child, GroupStatus, StackGroup};
pub use outputs::{OutputRecord, OutputStore, StackRecord, StoreLock, StoredOutputs, payload_digest};
pub use planner::{Direction, Plan, PlanEntry, PlanSummary, Planner};
pub use refs::{DeferredHandle, OutputRegistry, Resolution};
pub use stack::{
    Action, HookContext, HookTiming, OutputBinding, ParamValue, Parameter, ResolvedParameters,
    Stack, StackHook, StackHooks, StackState, StackTags,
};
