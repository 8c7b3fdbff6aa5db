//! Runs a plan against the providers.
//!
//! Entries execute in waves: a stack is ready once every dependency has
//! completed, and at most `max_concurrency` ready stacks run at a time.
//! Results are applied between waves on a single thread, so output
//! registration and the durable record stay deterministic, and the record
//! is saved after every wave so an aborted run resumes where it stopped.
//!
//! A failed stack takes its dependents with it as `Skipped`. Unless the
//! failed stack was best-effort, the whole run stops and everything not
//! yet started is skipped as well. An interrupt lets the current wave
//! finish, then drains the rest as pending.

use crate::context::EngineContext;
use crate::error::{EngineError, Result};
use crate::outputs::payload_digest;
use crate::planner::{Direction, Plan, PlanEntry};
use crate::stack::{Action, HookTiming, Stack, StackState};
use futures_util::future::join_all;
use serde_json::Value;
use skystack_cloud::{StackOutputs, with_retry};
use std::fmt;
use std::time::Instant;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// A stack that failed, with the rendered error.
#[derive(Debug, Clone)]
pub struct FailedStack {
    pub stack: String,
    pub error: String,
}

/// A stack that never ran because something upstream went wrong.
#[derive(Debug, Clone)]
pub struct SkippedStack {
    pub stack: String,
    pub blocked_by: String,
}

/// What happened to every stack in a run.
#[derive(Debug, Default)]
pub struct ExecutionReport {
    pub completed: Vec<String>,
    pub failed: Vec<FailedStack>,
    pub skipped: Vec<SkippedStack>,
    /// Planned but never started; left as-is for a later resume.
    pub pending: Vec<String>,
    pub interrupted: bool,
    /// A non-best-effort failure cut the run short.
    pub stopped: bool,
}

impl ExecutionReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
            && self.skipped.is_empty()
            && self.pending.is_empty()
            && !self.interrupted
    }

    pub fn merge(&mut self, other: ExecutionReport) {
        self.completed.extend(other.completed);
        self.failed.extend(other.failed);
        self.skipped.extend(other.skipped);
        self.pending.extend(other.pending);
        self.interrupted |= other.interrupted;
        self.stopped |= other.stopped;
    }
}

impl fmt::Display for ExecutionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} completed, {} failed, {} skipped, {} pending",
            self.completed.len(),
            self.failed.len(),
            self.skipped.len(),
            self.pending.len()
        )
    }
}

enum EntryOutcome {
    /// Nothing to do; the stack is already converged.
    Unchanged,
    /// Created or updated; carries the fresh outputs and what was applied.
    Applied {
        outputs: StackOutputs,
        digest: String,
    },
    Deleted,
}

pub struct Executor<'a> {
    ctx: &'a EngineContext,
}

impl<'a> Executor<'a> {
    pub fn new(ctx: &'a EngineContext) -> Self {
        Self { ctx }
    }

    #[tracing::instrument(skip_all, fields(entries = plan.len(), direction = ?plan.direction))]
    pub async fn execute(&self, plan: &Plan) -> Result<ExecutionReport> {
        let lock = self.ctx.store().acquire_lock().await?;
        let mut stored = self.ctx.store().load().await?;

        let n = plan.entries.len();
        let mut done = vec![false; n];
        let mut dead = vec![false; n];
        let mut report = ExecutionReport::default();
        let concurrency = self.ctx.options().max_concurrency.max(1);

        loop {
            // Cascade: anything waiting on a failed or skipped entry is
            // itself skipped.
            let mut changed = true;
            while changed {
                changed = false;
                for i in 0..n {
                    if done[i] || dead[i] {
                        continue;
                    }
                    let blocker = plan.entries[i].depends_on.iter().find(|&&d| dead[d]);
                    if let Some(&blocker) = blocker {
                        dead[i] = true;
                        changed = true;
                        let entry = &plan.entries[i];
                        entry.stack.set_state(StackState::Skipped);
                        report.skipped.push(SkippedStack {
                            stack: entry.stack.name().to_string(),
                            blocked_by: plan.entries[blocker].stack.name().to_string(),
                        });
                    }
                }
            }

            if (0..n).all(|i| done[i] || dead[i]) {
                break;
            }

            if self.ctx.is_interrupted() {
                info!("Interrupt requested; draining remaining stacks");
                report.interrupted = true;
                for i in 0..n {
                    if !done[i] && !dead[i] {
                        report.pending.push(plan.entries[i].stack.name().to_string());
                    }
                }
                break;
            }

            let wave: Vec<usize> = (0..n)
                .filter(|&i| {
                    !done[i] && !dead[i] && plan.entries[i].depends_on.iter().all(|&d| done[d])
                })
                .take(concurrency)
                .collect();
            if wave.is_empty() {
                // Unsatisfiable dependencies; the plan should have caught
                // this as a cycle.
                for i in 0..n {
                    if !done[i] && !dead[i] {
                        report.pending.push(plan.entries[i].stack.name().to_string());
                    }
                }
                break;
            }

            let outcomes = join_all(
                wave.iter()
                    .map(|&i| self.run_entry(&plan.entries[i], plan.direction)),
            )
            .await;

            let mut fail_fast: Option<String> = None;
            for (&i, outcome) in wave.iter().zip(outcomes) {
                let entry = &plan.entries[i];
                let identity = entry.stack.identity();
                match outcome {
                    Ok(EntryOutcome::Unchanged) => {
                        done[i] = true;
                        entry.stack.set_state(StackState::Complete);
                        report.completed.push(entry.stack.name().to_string());
                        if plan.direction == Direction::Delete {
                            // Nothing to delete; drop any stale record.
                            stored.remove(identity);
                        }
                    }
                    Ok(EntryOutcome::Applied { outputs, digest }) => {
                        done[i] = true;
                        let record = stored.record(identity);
                        record.outputs.clear();
                        for binding in entry.stack.bindings() {
                            match outputs.get(&binding.key) {
                                Some(value) => {
                                    record.insert_output(
                                        &binding.key,
                                        &binding.path,
                                        value.clone(),
                                    );
                                    self.ctx
                                        .registry()
                                        .register_output(&binding.path, value.clone());
                                }
                                None => warn!(
                                    stack = %identity,
                                    key = binding.key,
                                    "Provider returned no value for a declared output"
                                ),
                            }
                        }
                        record.applied_digest = Some(digest);
                        entry.stack.set_state(StackState::Complete);
                        report.completed.push(entry.stack.name().to_string());
                    }
                    Ok(EntryOutcome::Deleted) => {
                        done[i] = true;
                        stored.remove(identity);
                        for binding in entry.stack.bindings() {
                            self.ctx.registry().forget_output(&binding.path);
                        }
                        entry.stack.set_state(StackState::Complete);
                        report.completed.push(entry.stack.name().to_string());
                    }
                    Err(err) => {
                        dead[i] = true;
                        entry.stack.set_state(StackState::Failed);
                        error!(stack = %identity, error = %err, "Stack failed");
                        report.failed.push(FailedStack {
                            stack: entry.stack.name().to_string(),
                            error: err.to_string(),
                        });
                        if !entry.stack.is_best_effort() {
                            fail_fast = Some(entry.stack.name().to_string());
                        }
                    }
                }
            }

            self.ctx.store().save(&stored).await?;

            if let Some(blocker) = fail_fast {
                report.stopped = true;
                for i in 0..n {
                    if !done[i] && !dead[i] {
                        dead[i] = true;
                        plan.entries[i].stack.set_state(StackState::Skipped);
                        report.skipped.push(SkippedStack {
                            stack: plan.entries[i].stack.name().to_string(),
                            blocked_by: blocker.clone(),
                        });
                    }
                }
                break;
            }
        }

        lock.release().await?;
        info!(report = %report, "Execution finished");
        Ok(report)
    }

    async fn run_entry(&self, entry: &PlanEntry, direction: Direction) -> Result<EntryOutcome> {
        let stack = &entry.stack;
        match entry.action {
            Action::NoOp if direction == Direction::Provision => {
                self.maybe_escalate(entry).await
            }
            Action::NoOp => Ok(EntryOutcome::Unchanged),
            Action::Delete => self.delete(stack).await,
            Action::Create | Action::Update => {
                let desired = self.resolve_desired(stack)?;
                stack.set_state(StackState::InProgress);
                let hooks = stack.hooks();
                hooks
                    .run(entry.action, HookTiming::Pre, stack.identity(), None)
                    .await?;
                let outputs = self.apply(stack, entry.action, &desired).await?;
                hooks
                    .run(entry.action, HookTiming::Post, stack.identity(), Some(&outputs))
                    .await?;
                Ok(EntryOutcome::Applied {
                    outputs,
                    digest: payload_digest(&desired),
                })
            }
        }
    }

    /// A planned no-op can stop being one: when an upstream stack re-ran
    /// earlier in this execution and its outputs changed, this stack's
    /// desired document no longer matches what the plan saw.
    async fn maybe_escalate(&self, entry: &PlanEntry) -> Result<EntryOutcome> {
        let stack = &entry.stack;
        let resolved = stack.resolve_parameters(self.ctx.project(), self.ctx.registry())?;
        if !resolved.is_fully_resolved() {
            return Ok(EntryOutcome::Unchanged);
        }
        let desired = stack.desired_document(&resolved.values);
        if desired == entry.desired {
            return Ok(EntryOutcome::Unchanged);
        }

        info!(stack = %stack.identity(), "Upstream outputs changed; updating a stack planned as unchanged");
        stack.set_state(StackState::InProgress);
        let hooks = stack.hooks();
        hooks
            .run(Action::Update, HookTiming::Pre, stack.identity(), None)
            .await?;
        let outputs = self.apply(stack, Action::Update, &desired).await?;
        hooks
            .run(Action::Update, HookTiming::Post, stack.identity(), Some(&outputs))
            .await?;
        Ok(EntryOutcome::Applied {
            outputs,
            digest: payload_digest(&desired),
        })
    }

    /// Resolves the final desired document. Every dependency has completed
    /// by now, so a still-deferred reference means the producer never
    /// minted the output.
    fn resolve_desired(&self, stack: &Stack) -> Result<Value> {
        let resolved = stack.resolve_parameters(self.ctx.project(), self.ctx.registry())?;
        if let Some(handle) = resolved.deferred.first() {
            return Err(EngineError::OutputMissing {
                stack: handle.stack.name.clone(),
                key: handle.key.clone(),
                reference: handle.reference.path().to_string(),
            });
        }
        Ok(stack.desired_document(&resolved.values))
    }

    async fn apply(&self, stack: &Stack, action: Action, desired: &Value) -> Result<StackOutputs> {
        let client = self.ctx.client_for_account(&stack.identity().account)?;
        let identity = stack.identity().clone();
        let label = format!("{action} {identity}");
        let started = Instant::now();

        let attempt = with_retry(&self.ctx.options().retry, &label, || {
            let client = client.clone();
            let identity = identity.clone();
            let desired = desired.clone();
            async move {
                match action {
                    Action::Update => client.update(&identity, &desired).await,
                    _ => client.create(&identity, &desired).await,
                }
            }
        });

        match timeout(self.ctx.options().provision_timeout, attempt).await {
            Ok(Ok(outputs)) => Ok(outputs),
            Ok(Err(source)) => Err(EngineError::ProvisionFailure {
                stack: identity.to_string(),
                source,
            }),
            Err(_) => Err(EngineError::ProvisionTimeout {
                stack: identity.to_string(),
                elapsed_secs: started.elapsed().as_secs(),
            }),
        }
    }

    async fn delete(&self, stack: &Stack) -> Result<EntryOutcome> {
        stack.set_state(StackState::InProgress);
        let hooks = stack.hooks();
        hooks
            .run(Action::Delete, HookTiming::Pre, stack.identity(), None)
            .await?;

        let client = self.ctx.client_for_account(&stack.identity().account)?;
        let identity = stack.identity().clone();
        let label = format!("delete {identity}");
        let started = Instant::now();

        let attempt = with_retry(&self.ctx.options().retry, &label, || {
            let client = client.clone();
            let identity = identity.clone();
            async move { client.delete(&identity).await }
        });

        match timeout(self.ctx.options().provision_timeout, attempt).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.is_not_found() => {
                debug!(stack = %identity, "Already absent");
            }
            Ok(Err(source)) => {
                return Err(EngineError::ProvisionFailure {
                    stack: identity.to_string(),
                    source,
                });
            }
            Err(_) => {
                return Err(EngineError::ProvisionTimeout {
                    stack: identity.to_string(),
                    elapsed_secs: started.elapsed().as_secs(),
                });
            }
        }

        hooks
            .run(Action::Delete, HookTiming::Post, stack.identity(), None)
            .await?;
        Ok(EntryOutcome::Deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{EngineOptions, ProviderFactory};
    use crate::planner::Planner;
    use crate::stack::{HookContext, OutputBinding, Parameter, StackHook};
    use async_trait::async_trait;
    use serde_json::json;
    use skystack_cloud::{
        MemoryProvider, ObservedStack, ProviderClient, RetryConfig, StackIdentity,
    };
    use skystack_core::{Account, Project, Ref};
    use std::collections::BTreeMap;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::watch;

    fn project(root: &Path) -> Project {
        Project {
            root: root.to_path_buf(),
            name: "test".to_string(),
            state_dir: ".skystack".to_string(),
            accounts: vec![Account {
                name: "prod".to_string(),
                provider: "memory".to_string(),
                account_id: None,
                default_region: "us-west-2".to_string(),
                enabled: true,
            }],
            netenvs: vec![],
            zone_sets: vec![],
        }
    }

    fn fast_options() -> EngineOptions {
        EngineOptions {
            retry: RetryConfig {
                max_attempts: 3,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(10),
                backoff_multiplier: 2.0,
            },
            ..EngineOptions::default()
        }
    }

    async fn context(root: &Path, options: EngineOptions) -> (EngineContext, Arc<MemoryProvider>) {
        let memory = Arc::new(MemoryProvider::new());
        let mut providers = ProviderFactory::new();
        providers.register("memory", memory.clone());
        let ctx = EngineContext::new(project(root), providers, options)
            .await
            .unwrap();
        (ctx, memory)
    }

    fn identity(name: &str) -> StackIdentity {
        StackIdentity::new("prod", "us-west-2", name)
    }

    fn vpc_stack() -> Stack {
        Stack::new(
            identity("netenv.prod.network.vpc"),
            json!({"resources": {"vpc": {}}, "outputs": ["vpc_id"]}),
        )
        .with_bindings(vec![OutputBinding::new(
            "vpc_id",
            "netenv.prod.network.vpc.id",
        )])
    }

    fn subnet_stack() -> Stack {
        Stack::new(
            identity("netenv.prod.network.segments.public"),
            json!({"resources": {"segment": {}}, "outputs": ["subnet_id"]}),
        )
        .with_parameters(vec![Parameter::reference(
            "vpc_id",
            Ref::parse("ref:netenv.prod.network.vpc.id").unwrap(),
        )])
        .with_bindings(vec![OutputBinding::new(
            "subnet_id",
            "netenv.prod.network.segments.public.subnet_id",
        )])
    }

    fn service_stack() -> Stack {
        Stack::new(
            identity("netenv.prod.applications.site.resources.web"),
            json!({"resources": {"service": {}}, "outputs": ["endpoint"]}),
        )
        .with_parameters(vec![Parameter::reference(
            "subnet_id",
            Ref::parse("ref:netenv.prod.network.segments.public.subnet_id").unwrap(),
        )])
        .with_bindings(vec![OutputBinding::new(
            "endpoint",
            "netenv.prod.applications.site.resources.web.endpoint",
        )])
    }

    async fn provision(ctx: &EngineContext, stacks: &[Arc<Stack>]) -> (Plan, ExecutionReport) {
        let plan = Planner::new(ctx)
            .plan(stacks, Direction::Provision)
            .await
            .unwrap();
        let report = Executor::new(ctx).execute(&plan).await.unwrap();
        (plan, report)
    }

    fn create_order(memory: &MemoryProvider) -> Vec<String> {
        memory
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("create "))
            .collect()
    }

    #[tokio::test]
    async fn test_provision_runs_in_order_and_records_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, memory) = context(dir.path(), fast_options()).await;

        let stacks: Vec<Arc<Stack>> = vec![
            Arc::new(service_stack()),
            Arc::new(vpc_stack()),
            Arc::new(subnet_stack()),
        ];
        for stack in &stacks {
            ctx.declare_stack(stack);
        }

        let (_plan, report) = provision(&ctx, &stacks).await;
        assert!(report.is_success());
        assert_eq!(report.completed.len(), 3);

        let creates = create_order(&memory);
        assert!(creates[0].contains("netenv.prod.network.vpc"));
        assert!(creates[1].contains("segments.public"));
        assert!(creates[2].contains("resources.web"));

        // Outputs are resolvable and durably recorded.
        assert!(ctx
            .registry()
            .value("netenv.prod.applications.site.resources.web.endpoint")
            .is_some());
        let stored = ctx.store().load().await.unwrap();
        let record = stored.get(stacks[1].identity()).unwrap();
        assert!(record.applied_digest.is_some());
        assert!(record.outputs.contains_key("vpc_id"));

        for stack in &stacks {
            assert_eq!(stack.state(), StackState::Complete);
        }
    }

    #[tokio::test]
    async fn test_rerun_is_all_noops() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, memory) = context(dir.path(), fast_options()).await;

        let stacks: Vec<Arc<Stack>> = vec![Arc::new(vpc_stack()), Arc::new(subnet_stack())];
        for stack in &stacks {
            ctx.declare_stack(stack);
        }
        provision(&ctx, &stacks).await;
        let first_calls = memory.calls().len();

        let (plan, report) = provision(&ctx, &stacks).await;
        assert!(!plan.has_changes());
        assert!(report.is_success());
        // Digest short-circuit: the second round trips nothing to the provider.
        assert_eq!(memory.calls().len(), first_calls);
    }

    #[tokio::test]
    async fn test_failure_fails_fast_and_skips_dependents() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, memory) = context(dir.path(), fast_options()).await;

        memory.fail_permanent("netenv.prod.network.vpc", "create", 1);

        let vpc = Arc::new(vpc_stack());
        let subnet = Arc::new(subnet_stack());
        let service = Arc::new(service_stack());
        for stack in [&vpc, &subnet, &service] {
            ctx.declare_stack(stack);
        }

        let (_plan, report) =
            provision(&ctx, &[vpc.clone(), subnet.clone(), service.clone()]).await;
        assert!(!report.is_success());
        assert!(report.stopped);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].stack, "netenv.prod.network.vpc");
        assert_eq!(report.skipped.len(), 2);
        for skipped in &report.skipped {
            assert_eq!(skipped.blocked_by, "netenv.prod.network.vpc");
        }
        assert_eq!(vpc.state(), StackState::Failed);
        assert_eq!(subnet.state(), StackState::Skipped);
        assert_eq!(service.state(), StackState::Skipped);
    }

    #[tokio::test]
    async fn test_best_effort_failure_keeps_going() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, memory) = context(dir.path(), fast_options()).await;

        // `flaky` fails; its dependent is skipped; an unrelated stack
        // still provisions.
        let flaky = Arc::new(
            Stack::new(
                identity("apps.flaky"),
                json!({"resources": {}, "outputs": ["id"]}),
            )
            .with_bindings(vec![OutputBinding::new("id", "apps.flaky.id")])
            .best_effort(true),
        );
        let dependent = Arc::new(
            Stack::new(identity("apps.dependent"), json!({"resources": {}}))
                .with_parameters(vec![Parameter::reference(
                    "id",
                    Ref::parse("ref:apps.flaky.id").unwrap(),
                )]),
        );
        let unrelated = Arc::new(Stack::new(identity("apps.unrelated"), json!({"resources": {}})));

        memory.fail_permanent("apps.flaky", "create", 1);
        ctx.declare_stack(&flaky);
        ctx.declare_stack(&dependent);
        ctx.declare_stack(&unrelated);

        let (_plan, report) = provision(
            &ctx,
            &[flaky.clone(), dependent.clone(), unrelated.clone()],
        )
        .await;

        assert_eq!(report.failed.len(), 1);
        assert!(!report.stopped);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].stack, "apps.dependent");
        assert_eq!(report.skipped[0].blocked_by, "apps.flaky");
        assert!(report.completed.contains(&"apps.unrelated".to_string()));
        assert_eq!(unrelated.state(), StackState::Complete);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, memory) = context(dir.path(), fast_options()).await;

        memory.fail_transient("netenv.prod.network.vpc", "create", 2);
        let vpc = Arc::new(vpc_stack());
        ctx.declare_stack(&vpc);

        let (_plan, report) = provision(&ctx, &[vpc.clone()]).await;
        assert!(report.is_success());
        assert_eq!(create_order(&memory).len(), 3);
        assert_eq!(vpc.state(), StackState::Complete);
    }

    #[tokio::test]
    async fn test_resume_after_failure_converges() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, memory) = context(dir.path(), fast_options()).await;

        memory.fail_permanent("netenv.prod.network.vpc", "create", 1);
        let vpc = Arc::new(vpc_stack());
        let subnet = Arc::new(subnet_stack());
        ctx.declare_stack(&vpc);
        ctx.declare_stack(&subnet);

        let (_plan, report) = provision(&ctx, &[vpc.clone(), subnet.clone()]).await;
        assert!(!report.is_success());

        // Second run: the injected failure is exhausted.
        let (_plan, report) = provision(&ctx, &[vpc.clone(), subnet.clone()]).await;
        assert!(report.is_success());
        assert_eq!(vpc.state(), StackState::Complete);
        assert_eq!(subnet.state(), StackState::Complete);

        let creates = create_order(&memory);
        assert_eq!(creates.len(), 2);
        assert!(creates[0].contains("network.vpc"));
        assert!(creates[1].contains("segments.public"));
    }

    struct InterruptHook {
        tx: Arc<watch::Sender<bool>>,
    }

    #[async_trait]
    impl StackHook for InterruptHook {
        fn name(&self) -> &str {
            "interrupt"
        }

        async fn run(&self, _ctx: HookContext<'_>) -> anyhow::Result<()> {
            let _ = self.tx.send(true);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_interrupt_finishes_current_and_drains_pending() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _memory) = context(dir.path(), fast_options()).await;

        let mut hooks = crate::stack::StackHooks::new();
        hooks.add(
            Action::Create,
            HookTiming::Post,
            Arc::new(InterruptHook {
                tx: ctx.interrupt_handle(),
            }),
        );
        let vpc = Arc::new(vpc_stack().with_hooks(hooks));
        let subnet = Arc::new(subnet_stack());
        ctx.declare_stack(&vpc);
        ctx.declare_stack(&subnet);

        let (_plan, report) = provision(&ctx, &[vpc.clone(), subnet.clone()]).await;
        assert!(report.interrupted);
        assert_eq!(report.completed, ["netenv.prod.network.vpc"]);
        assert_eq!(report.pending, ["netenv.prod.network.segments.public"]);
        // The pending stack keeps its planned state for a later resume.
        assert_eq!(subnet.state(), StackState::Planned(Action::Create));
        assert_eq!(vpc.state(), StackState::Complete);
    }

    #[tokio::test]
    async fn test_noop_escalates_when_upstream_output_changes() {
        let dir = tempfile::tempdir().unwrap();

        // First run provisions both stacks.
        let old_vpc_id;
        let old_subnet_id;
        {
            let (ctx, _memory) = context(dir.path(), fast_options()).await;
            let vpc = Arc::new(vpc_stack());
            let subnet = Arc::new(subnet_stack());
            ctx.declare_stack(&vpc);
            ctx.declare_stack(&subnet);
            let (_plan, report) = provision(&ctx, &[vpc, subnet]).await;
            assert!(report.is_success());
            old_vpc_id = ctx.registry().value("netenv.prod.network.vpc.id").unwrap();
            old_subnet_id = ctx
                .registry()
                .value("netenv.prod.network.segments.public.subnet_id")
                .unwrap();
        }

        // The VPC vanished out-of-band; the subnet survived with the old
        // parameter value baked in.
        let memory = Arc::new(MemoryProvider::new());
        let subnet_desired = subnet_stack().desired_document(&BTreeMap::from([(
            "vpc_id".to_string(),
            old_vpc_id.clone(),
        )]));
        memory.seed(
            identity("netenv.prod.network.segments.public"),
            subnet_desired,
            StackOutputs::from([("subnet_id".to_string(), old_subnet_id)]),
        );

        let mut providers = ProviderFactory::new();
        providers.register("memory", memory.clone());
        let ctx = EngineContext::new(
            project(dir.path()),
            providers,
            EngineOptions {
                refresh: true,
                ..fast_options()
            },
        )
        .await
        .unwrap();

        let vpc = Arc::new(vpc_stack());
        let subnet = Arc::new(subnet_stack());
        ctx.declare_stack(&vpc);
        ctx.declare_stack(&subnet);

        let plan = Planner::new(&ctx)
            .plan(&[vpc.clone(), subnet.clone()], Direction::Provision)
            .await
            .unwrap();
        assert_eq!(plan.entries[0].action, Action::Create);
        // At plan time the subnet still matches what the provider holds.
        assert_eq!(plan.entries[1].action, Action::NoOp);

        let report = Executor::new(&ctx).execute(&plan).await.unwrap();
        assert!(report.is_success());
        // Recreating the VPC minted a new id, so the subnet was updated
        // even though it was planned as unchanged.
        let new_vpc_id = ctx.registry().value("netenv.prod.network.vpc.id").unwrap();
        assert_ne!(new_vpc_id, old_vpc_id);
        assert!(memory
            .calls()
            .iter()
            .any(|c| c.starts_with("update ") && c.contains("segments.public")));
    }

    #[tokio::test]
    async fn test_missing_upstream_output_fails_at_execution() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _memory) = context(dir.path(), fast_options()).await;

        // The producer is declared but not part of the plan and has no
        // recorded value.
        let vpc = Arc::new(vpc_stack());
        let subnet = Arc::new(subnet_stack());
        ctx.declare_stack(&vpc);
        ctx.declare_stack(&subnet);

        let (_plan, report) = provision(&ctx, &[subnet.clone()]).await;
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].error.contains("no recorded output"));
        assert!(report.failed[0].error.contains("vpc_id"));
        assert_eq!(subnet.state(), StackState::Failed);
    }

    #[tokio::test]
    async fn test_delete_runs_reversed_and_purges_state() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, memory) = context(dir.path(), fast_options()).await;

        let vpc = Arc::new(vpc_stack());
        let subnet = Arc::new(subnet_stack());
        ctx.declare_stack(&vpc);
        ctx.declare_stack(&subnet);
        provision(&ctx, &[vpc.clone(), subnet.clone()]).await;

        let plan = Planner::new(&ctx)
            .plan(&[vpc.clone(), subnet.clone()], Direction::Delete)
            .await
            .unwrap();
        let report = Executor::new(&ctx).execute(&plan).await.unwrap();
        assert!(report.is_success());

        let deletes: Vec<String> = memory
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("delete "))
            .collect();
        assert_eq!(deletes.len(), 2);
        assert!(deletes[0].contains("segments.public"));
        assert!(deletes[1].contains("network.vpc"));

        assert!(memory.is_empty());
        let stored = ctx.store().load().await.unwrap();
        assert!(stored.stacks.is_empty());
        assert_eq!(ctx.registry().value("netenv.prod.network.vpc.id"), None);
    }

    #[tokio::test]
    async fn test_delete_tolerates_already_absent_stack() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _memory) = context(dir.path(), fast_options()).await;

        let vpc = Arc::new(vpc_stack());
        vpc.set_state(StackState::Planned(Action::Delete));
        let plan = Plan {
            direction: Direction::Delete,
            entries: vec![PlanEntry {
                stack: vpc.clone(),
                action: Action::Delete,
                depends_on: vec![],
                desired: Value::Null,
                digest: None,
            }],
        };

        let report = Executor::new(&ctx).execute(&plan).await.unwrap();
        assert!(report.is_success());
        assert_eq!(vpc.state(), StackState::Complete);
    }

    /// Provider that answers describe instantly but never finishes creating.
    struct StuckProvider;

    #[async_trait]
    impl ProviderClient for StuckProvider {
        fn name(&self) -> &str {
            "stuck"
        }

        async fn create(
            &self,
            _stack: &StackIdentity,
            _payload: &Value,
        ) -> skystack_cloud::Result<StackOutputs> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(StackOutputs::new())
        }

        async fn update(
            &self,
            stack: &StackIdentity,
            payload: &Value,
        ) -> skystack_cloud::Result<StackOutputs> {
            self.create(stack, payload).await
        }

        async fn delete(&self, _stack: &StackIdentity) -> skystack_cloud::Result<()> {
            Ok(())
        }

        async fn describe(
            &self,
            _stack: &StackIdentity,
        ) -> skystack_cloud::Result<Option<ObservedStack>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_provision_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let mut providers = ProviderFactory::new();
        providers.register("memory", Arc::new(StuckProvider));
        let ctx = EngineContext::new(
            project(dir.path()),
            providers,
            EngineOptions {
                provision_timeout: Duration::from_millis(20),
                ..fast_options()
            },
        )
        .await
        .unwrap();

        let vpc = Arc::new(vpc_stack());
        ctx.declare_stack(&vpc);
        let (_plan, report) = provision(&ctx, &[vpc.clone()]).await;

        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].error.contains("timed out"));
        assert_eq!(vpc.state(), StackState::Failed);
    }

    struct FailingHook;

    #[async_trait]
    impl StackHook for FailingHook {
        fn name(&self) -> &str {
            "guard"
        }

        async fn run(&self, _ctx: HookContext<'_>) -> anyhow::Result<()> {
            anyhow::bail!("precondition not met");
        }
    }

    #[tokio::test]
    async fn test_pre_hook_failure_fails_stack_before_provider_call() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, memory) = context(dir.path(), fast_options()).await;

        let mut hooks = crate::stack::StackHooks::new();
        hooks.add(Action::Create, HookTiming::Pre, Arc::new(FailingHook));
        let vpc = Arc::new(vpc_stack().with_hooks(hooks));
        ctx.declare_stack(&vpc);

        let (_plan, report) = provision(&ctx, &[vpc.clone()]).await;
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].error.contains("guard"));
        assert_eq!(vpc.state(), StackState::Failed);
        assert!(create_order(&memory).is_empty());
    }

    #[tokio::test]
    async fn test_bounded_concurrency_preserves_causal_order() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, memory) = context(
            dir.path(),
            EngineOptions {
                max_concurrency: 2,
                ..fast_options()
            },
        )
        .await;

        let vpc = Arc::new(vpc_stack());
        let subnet_a = Arc::new(subnet_stack());
        let subnet_b = Arc::new(
            Stack::new(
                identity("netenv.prod.network.segments.private"),
                json!({"resources": {"segment": {}}, "outputs": ["subnet_id"]}),
            )
            .with_parameters(vec![Parameter::reference(
                "vpc_id",
                Ref::parse("ref:netenv.prod.network.vpc.id").unwrap(),
            )])
            .with_bindings(vec![OutputBinding::new(
                "subnet_id",
                "netenv.prod.network.segments.private.subnet_id",
            )]),
        );
        let service = Arc::new(service_stack());
        for stack in [&vpc, &subnet_a, &subnet_b, &service] {
            ctx.declare_stack(stack);
        }

        let (_plan, report) = provision(
            &ctx,
            &[vpc.clone(), subnet_a.clone(), subnet_b.clone(), service.clone()],
        )
        .await;
        assert!(report.is_success());

        let creates = create_order(&memory);
        let pos = |needle: &str| {
            creates
                .iter()
                .position(|c| c.contains(needle))
                .unwrap_or_else(|| panic!("no create for {needle}"))
        };
        assert!(pos("network.vpc") < pos("segments.public"));
        assert!(pos("network.vpc") < pos("segments.private"));
        assert!(pos("segments.public") < pos("resources.web"));
    }

    #[test]
    fn test_report_merge() {
        let mut left = ExecutionReport {
            completed: vec!["a".into()],
            ..ExecutionReport::default()
        };
        let right = ExecutionReport {
            completed: vec!["b".into()],
            failed: vec![FailedStack {
                stack: "c".into(),
                error: "x".into(),
            }],
            interrupted: true,
            ..ExecutionReport::default()
        };
        left.merge(right);
        assert_eq!(left.completed, ["a", "b"]);
        assert_eq!(left.failed.len(), 1);
        assert!(left.interrupted);
        assert!(!left.is_success());
        assert_eq!(left.to_string(), "2 completed, 1 failed, 0 skipped, 0 pending");
    }
}
