//! Controllers and the registry that drives them.
//!
//! A controller owns one configuration domain instance (a network
//! environment, a zone set) and turns it into a stack group. The registry
//! is the engine's front door: it builds every controller on first use,
//! which declares every output up front, so references across controllers
//! resolve no matter which direction they point.

use crate::context::EngineContext;
use crate::controllers::build_controllers;
use crate::error::{EngineError, Result};
use crate::executor::{ExecutionReport, Executor, SkippedStack};
use crate::group::GroupStatus;
use crate::planner::{Direction, Plan, Planner};
use crate::stack::Stack;
use skystack_core::Scope;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

/// Outcome of configuration-level validation. Errors block provisioning;
/// warnings do not.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} error(s), {} warning(s)",
            self.errors.len(),
            self.warnings.len()
        )
    }
}

/// Checks shared by every controller: every account must map to a
/// configured provider backend, references must resolve, and a
/// change-protected stack must not also be disabled.
pub(crate) fn validate_stacks(
    stacks: &[Arc<Stack>],
    ctx: &EngineContext,
    report: &mut ValidationReport,
) {
    let mut checked_accounts = HashSet::new();
    for stack in stacks {
        let account = &stack.identity().account;
        if checked_accounts.insert(account.clone())
            && let Err(err) = ctx.client_for_account(account)
        {
            report.error(format!("account '{account}': {err}"));
        }
        for reference in stack.references() {
            if let Err(err) = ctx.resolve(reference) {
                report.error(format!("{}: {}", stack.name(), err));
            }
        }
        if stack.is_change_protected() && !stack.is_enabled() {
            report.warning(format!(
                "{}: change-protected and disabled; provisioning will fail while it exists",
                stack.name()
            ));
        }
    }
}

/// One configuration domain instance, rendered into stacks.
pub trait Controller: Send + Sync {
    /// The domain this controller serves, e.g. `netenv`.
    fn domain(&self) -> &str;

    /// Full instance name, e.g. `netenv.prod`.
    fn name(&self) -> &str;

    /// All stacks in provisioning order.
    fn stacks(&self) -> Vec<Arc<Stack>>;

    /// Aggregate status of this controller's stack group.
    fn status(&self) -> GroupStatus;

    /// Config checks that need no provider round-trip.
    fn validate(&self, ctx: &EngineContext) -> ValidationReport {
        let mut report = ValidationReport::default();
        validate_stacks(&self.stacks(), ctx, &mut report);
        report
    }
}

const DOMAINS: &[&str] = &["netenv", "dns"];

fn scoped_stacks(controller: &dyn Controller, scope: &Scope) -> Vec<Arc<Stack>> {
    controller
        .stacks()
        .into_iter()
        .filter(|stack| scope.matches(stack.name()))
        .collect()
}

/// Owns the engine context and every controller built from the project.
///
/// Controllers are built lazily on first use and exactly once; repeated
/// operations reuse the same instances, so stack lifecycle state carries
/// across plan, provision and resume within a process.
pub struct ControllerRegistry {
    ctx: EngineContext,
    controllers: OnceCell<Vec<Arc<dyn Controller>>>,
}

impl ControllerRegistry {
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            ctx,
            controllers: OnceCell::new(),
        }
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    async fn controllers(&self) -> Result<&Vec<Arc<dyn Controller>>> {
        self.controllers
            .get_or_try_init(|| async { build_controllers(&self.ctx) })
            .await
    }

    /// Looks up a controller by instance name, building the set on first
    /// call.
    pub async fn controller(&self, name: &str) -> Result<Arc<dyn Controller>> {
        let domain = name.split('.').next().unwrap_or(name);
        if !DOMAINS.contains(&domain) {
            return Err(EngineError::UnknownDomain(domain.to_string()));
        }
        let controllers = self.controllers().await?;
        controllers
            .iter()
            .find(|c| c.name() == name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownController(name.to_string()))
    }

    /// Validates project configuration and every controller. Build
    /// problems land in the report instead of aborting it.
    pub async fn validate(&self) -> Result<ValidationReport> {
        let mut report = ValidationReport::default();
        if let Err(err) = self.ctx.project().validate() {
            report.error(err.to_string());
        }
        match self.controllers().await {
            Ok(controllers) => {
                for controller in controllers {
                    report.merge(controller.validate(&self.ctx));
                }
            }
            Err(err) => report.error(err.to_string()),
        }
        Ok(report)
    }

    /// Plans every controller the scope touches, without executing.
    pub async fn plan(&self, scope: &Scope, direction: Direction) -> Result<Vec<(String, Plan)>> {
        let controllers = self.controllers().await?;
        let ordered = Self::ordered(controllers, direction);

        let mut plans = Vec::new();
        for controller in ordered {
            let stacks = scoped_stacks(controller.as_ref(), scope);
            if stacks.is_empty() {
                continue;
            }
            let plan = Planner::new(&self.ctx).plan(&stacks, direction).await?;
            plans.push((controller.name().to_string(), plan));
        }
        Ok(plans)
    }

    pub async fn provision(&self, scope: &Scope) -> Result<ExecutionReport> {
        self.run(scope, Direction::Provision).await
    }

    pub async fn delete(&self, scope: &Scope) -> Result<ExecutionReport> {
        self.run(scope, Direction::Delete).await
    }

    /// Controllers run one after another; network environments before DNS
    /// on the way up, DNS first on the way down.
    fn ordered(
        controllers: &[Arc<dyn Controller>],
        direction: Direction,
    ) -> Vec<&Arc<dyn Controller>> {
        match direction {
            Direction::Provision => controllers.iter().collect(),
            Direction::Delete => controllers.iter().rev().collect(),
        }
    }

    async fn run(&self, scope: &Scope, direction: Direction) -> Result<ExecutionReport> {
        let controllers = self.controllers().await?;
        let ordered = Self::ordered(controllers, direction);

        let mut report = ExecutionReport::default();
        for (pos, controller) in ordered.iter().enumerate() {
            let stacks = scoped_stacks(controller.as_ref(), scope);
            if stacks.is_empty() {
                continue;
            }
            info!(
                controller = controller.name(),
                stacks = stacks.len(),
                "Running controller"
            );
            let plan = Planner::new(&self.ctx).plan(&stacks, direction).await?;
            let run = Executor::new(&self.ctx).execute(&plan).await?;
            let interrupted = run.interrupted;
            let stopped = run.stopped;
            let blocker = run.failed.last().map(|f| f.stack.clone());
            report.merge(run);
            info!(
                controller = controller.name(),
                status = %controller.status(),
                "Controller finished"
            );

            if interrupted {
                for later in &ordered[pos + 1..] {
                    for stack in scoped_stacks(later.as_ref(), scope) {
                        report.pending.push(stack.name().to_string());
                    }
                }
                break;
            }
            if stopped {
                let blocker = blocker.unwrap_or_else(|| "earlier failure".to_string());
                for later in &ordered[pos + 1..] {
                    for stack in scoped_stacks(later.as_ref(), scope) {
                        report.skipped.push(SkippedStack {
                            stack: stack.name().to_string(),
                            blocked_by: blocker.clone(),
                        });
                    }
                }
                break;
            }
        }
        Ok(report)
    }
}
