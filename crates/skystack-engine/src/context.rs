//! Shared engine state for one run: the project, the output registry and
//! store, provider backends and tuning knobs.

use crate::error::{EngineError, Result};
use crate::outputs::OutputStore;
use crate::refs::{OutputRegistry, Resolution};
use crate::stack::Stack;
use skystack_cloud::{LocalProvider, MemoryProvider, ProviderClient, RetryConfig};
use skystack_core::{CoreError, Project, Ref};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

/// Maps provider backend names (as used in account config) to clients.
#[derive(Default)]
pub struct ProviderFactory {
    backends: HashMap<String, Arc<dyn ProviderClient>>,
}

impl ProviderFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard backends: `memory` for throwaway runs and tests,
    /// `local` persisting under `<state_dir>/provider`.
    pub fn with_defaults(state_dir: impl AsRef<Path>) -> Self {
        let mut factory = Self::new();
        factory.register("memory", Arc::new(MemoryProvider::new()));
        factory.register(
            "local",
            Arc::new(LocalProvider::new(state_dir.as_ref().join("provider"))),
        );
        factory
    }

    pub fn register(&mut self, name: impl Into<String>, client: Arc<dyn ProviderClient>) {
        self.backends.insert(name.into(), client);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn ProviderClient>> {
        self.backends
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownProvider(name.to_string()))
    }
}

/// Tuning knobs for planning and execution.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Upper bound on stacks provisioned at once. 1 means strictly serial.
    pub max_concurrency: usize,
    /// Per-operation deadline, including retries.
    pub provision_timeout: Duration,
    pub retry: RetryConfig,
    /// Ask the provider about every stack even when the recorded digest
    /// says nothing changed. Catches out-of-band drift.
    pub refresh: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_concurrency: 1,
            provision_timeout: Duration::from_secs(600),
            retry: RetryConfig::default(),
            refresh: false,
        }
    }
}

/// Everything a run needs in one place. Construction hydrates the output
/// registry from the durable store, so references to outputs of earlier
/// runs resolve immediately.
pub struct EngineContext {
    project: Arc<Project>,
    registry: Arc<OutputRegistry>,
    store: Arc<OutputStore>,
    providers: Arc<ProviderFactory>,
    options: EngineOptions,
    interrupt_tx: Arc<watch::Sender<bool>>,
    interrupt_rx: watch::Receiver<bool>,
}

impl EngineContext {
    pub async fn new(
        project: Project,
        providers: ProviderFactory,
        options: EngineOptions,
    ) -> Result<Self> {
        let store = OutputStore::new(project.state_path());
        let registry = OutputRegistry::new();
        let stored = store.load().await?;
        let known = stored.all_values();
        if !known.is_empty() {
            info!(outputs = known.len(), "Hydrating output registry from state");
        }
        registry.hydrate(known);

        let (interrupt_tx, interrupt_rx) = watch::channel(false);
        Ok(Self {
            project: Arc::new(project),
            registry: Arc::new(registry),
            store: Arc::new(store),
            providers: Arc::new(providers),
            options,
            interrupt_tx: Arc::new(interrupt_tx),
            interrupt_rx,
        })
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn registry(&self) -> &OutputRegistry {
        &self.registry
    }

    pub fn store(&self) -> &OutputStore {
        &self.store
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// The provider client for a named account.
    pub fn client_for_account(&self, account: &str) -> Result<Arc<dyn ProviderClient>> {
        let account = self
            .project
            .account(account)
            .ok_or_else(|| CoreError::UnknownAccount(account.to_string()))?;
        self.providers.get(&account.provider)
    }

    /// Declares every output binding of `stack` in the registry.
    pub fn declare_stack(&self, stack: &Stack) {
        for binding in stack.bindings() {
            self.registry
                .declare(&binding.path, stack.identity().clone(), &binding.key);
        }
    }

    pub fn resolve(&self, reference: &Ref) -> Result<Resolution> {
        self.registry.resolve(&self.project, reference)
    }

    /// Requests a graceful stop: in-flight operations finish, nothing new
    /// starts.
    pub fn interrupt(&self) {
        let _ = self.interrupt_tx.send(true);
    }

    pub fn is_interrupted(&self) -> bool {
        *self.interrupt_rx.borrow()
    }

    /// A handle that can interrupt this run from another task.
    pub fn interrupt_handle(&self) -> Arc<watch::Sender<bool>> {
        self.interrupt_tx.clone()
    }
}
