//! Turns a set of stacks into an ordered, executable plan.
//!
//! Edges come from references: a stack that consumes another stack's
//! declared output runs after it. Declaration alone creates the edge,
//! whether or not the value is already known, so causal order survives
//! re-runs. Producers outside the plan contribute no edge; their outputs
//! resolve from the record or stay pending until execution. Ties break by
//! registration order, which keeps plans deterministic.
//!
//! Observed state is lazy. A stack whose fully resolved desired document
//! digests to what was last applied is planned as a no-op without asking
//! the provider; everything else gets a describe round-trip first.

use crate::context::EngineContext;
use crate::error::{EngineError, Result};
use crate::outputs::payload_digest;
use crate::stack::{Action, Stack, StackState};
use serde_json::Value;
use skystack_cloud::{ObservedStack, with_retry};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Which way a plan runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Converge configuration onto the provider.
    Provision,
    /// Tear down, dependents first.
    Delete,
}

/// One stack inside a plan.
#[derive(Debug)]
pub struct PlanEntry {
    pub stack: Arc<Stack>,
    pub action: Action,
    /// Indices into the plan that must settle before this entry runs.
    pub depends_on: Vec<usize>,
    /// Desired document at plan time. May contain `$deferred` markers for
    /// outputs that do not exist yet.
    pub desired: Value,
    /// Digest of `desired`, present only when fully resolved.
    pub digest: Option<String>,
}

/// An ordered plan. Entries are topologically sorted; every entry's
/// dependencies appear at smaller indices.
#[derive(Debug)]
pub struct Plan {
    pub direction: Direction,
    pub entries: Vec<PlanEntry>,
}

impl Plan {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_changes(&self) -> bool {
        self.entries.iter().any(|e| e.action.is_mutating())
    }

    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary::default();
        for entry in &self.entries {
            match entry.action {
                Action::Create => summary.create += 1,
                Action::Update => summary.update += 1,
                Action::Delete => summary.delete += 1,
                Action::NoOp => summary.unchanged += 1,
            }
        }
        summary
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    pub unchanged: usize,
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to delete, {} unchanged",
            self.create, self.update, self.delete, self.unchanged
        )
    }
}

pub struct Planner<'a> {
    ctx: &'a EngineContext,
}

impl<'a> Planner<'a> {
    pub fn new(ctx: &'a EngineContext) -> Self {
        Self { ctx }
    }

    #[tracing::instrument(skip_all, fields(stacks = stacks.len(), direction = ?direction))]
    pub async fn plan(&self, stacks: &[Arc<Stack>], direction: Direction) -> Result<Plan> {
        for stack in stacks {
            if stack.state() == StackState::InProgress {
                return Err(EngineError::StackInProgress(stack.name().to_string()));
            }
        }

        let edges = self.reference_edges(stacks)?;
        let order = topo_order(stacks, &edges)?;

        let plan = match direction {
            Direction::Provision => self.plan_provision(stacks, &edges, &order).await?,
            Direction::Delete => self.plan_delete(stacks, &edges, &order).await?,
        };

        info!(summary = %plan.summary(), "Plan ready");
        Ok(plan)
    }

    /// Dependency edges from parameter references. `edges[i]` lists the
    /// input indices stack `i` depends on.
    fn reference_edges(&self, stacks: &[Arc<Stack>]) -> Result<Vec<Vec<usize>>> {
        let registry = self.ctx.registry();
        let index_of: HashMap<_, _> = stacks
            .iter()
            .enumerate()
            .map(|(i, s)| (s.identity().clone(), i))
            .collect();

        let mut edges = vec![Vec::new(); stacks.len()];
        for (i, stack) in stacks.iter().enumerate() {
            let mut seen = HashSet::new();
            for reference in stack.references() {
                let Some((producer, _)) = registry.declared_source(reference.path()) else {
                    // Not a declared output; resolution will classify it
                    // as static config or an invalid reference.
                    continue;
                };
                // A producer outside this plan contributes no edge. If its
                // output is on record the value resolves; if not, the
                // desired document keeps a marker and execution raises
                // OutputMissing when the value is actually needed.
                if let Some(&p) = index_of.get(&producer)
                    && p != i
                    && seen.insert(p)
                {
                    edges[i].push(p);
                }
            }
        }
        Ok(edges)
    }

    async fn plan_provision(
        &self,
        stacks: &[Arc<Stack>],
        edges: &[Vec<usize>],
        order: &[usize],
    ) -> Result<Plan> {
        let stored = self.ctx.store().load().await?;
        let registry = self.ctx.registry();
        let refresh = self.ctx.options().refresh;

        let position: HashMap<usize, usize> =
            order.iter().enumerate().map(|(pos, &i)| (i, pos)).collect();

        let mut entries = Vec::with_capacity(stacks.len());
        for &i in order {
            let stack = &stacks[i];
            let resolved = stack.resolve_parameters(self.ctx.project(), registry)?;
            let desired = stack.desired_document(&resolved.values);
            let digest = resolved
                .is_fully_resolved()
                .then(|| payload_digest(&desired));

            let action = if !refresh
                && stack.is_enabled()
                && !stack.is_always_update()
                && let Some(digest) = digest.as_deref()
                && let Some(record) = stored.get(stack.identity())
                && record.applied_digest.as_deref() == Some(digest)
            {
                debug!(stack = %stack.identity(), "Unchanged since last apply; skipping describe");
                Action::NoOp
            } else {
                let observed = self.describe(stack).await?;
                if let Some(observed) = &observed {
                    self.adopt_outputs(stack, observed);
                }
                stack.decide(observed.as_ref(), &desired)?
            };

            stack.set_state(StackState::Planned(action));
            entries.push(PlanEntry {
                stack: stack.clone(),
                action,
                depends_on: edges[i].iter().map(|dep| position[dep]).collect(),
                desired,
                digest,
            });
        }

        Ok(Plan {
            direction: Direction::Provision,
            entries,
        })
    }

    /// Delete plans run the graph backwards: the entry order is the exact
    /// reverse of the provision order and every edge is flipped.
    async fn plan_delete(
        &self,
        stacks: &[Arc<Stack>],
        edges: &[Vec<usize>],
        order: &[usize],
    ) -> Result<Plan> {
        let mut dependents = vec![Vec::new(); stacks.len()];
        for (consumer, deps) in edges.iter().enumerate() {
            for &producer in deps {
                dependents[producer].push(consumer);
            }
        }

        let reversed: Vec<usize> = order.iter().rev().copied().collect();
        let position: HashMap<usize, usize> = reversed
            .iter()
            .enumerate()
            .map(|(pos, &i)| (i, pos))
            .collect();

        let mut entries = Vec::with_capacity(stacks.len());
        for &i in &reversed {
            let stack = &stacks[i];
            let observed = self.describe(stack).await?;
            let action = match observed {
                Some(_) if stack.is_change_protected() => {
                    return Err(EngineError::ProtectedResourceViolation {
                        stack: stack.identity().to_string(),
                        action: "delete".to_string(),
                    });
                }
                Some(_) => Action::Delete,
                None => Action::NoOp,
            };

            stack.set_state(StackState::Planned(action));
            entries.push(PlanEntry {
                stack: stack.clone(),
                action,
                depends_on: dependents[i].iter().map(|dep| position[dep]).collect(),
                desired: Value::Null,
                digest: None,
            });
        }

        Ok(Plan {
            direction: Direction::Delete,
            entries,
        })
    }

    async fn describe(&self, stack: &Stack) -> Result<Option<ObservedStack>> {
        let client = self.ctx.client_for_account(&stack.identity().account)?;
        let identity = stack.identity().clone();
        let label = format!("describe {identity}");
        let observed = with_retry(&self.ctx.options().retry, &label, || {
            let client = client.clone();
            let identity = identity.clone();
            async move { client.describe(&identity).await }
        })
        .await?;
        Ok(observed)
    }

    /// Makes an existing stack's outputs resolvable before anything runs.
    fn adopt_outputs(&self, stack: &Stack, observed: &ObservedStack) {
        let registry = self.ctx.registry();
        for binding in stack.bindings() {
            if let Some(value) = observed.outputs.get(&binding.key) {
                registry.register_output(&binding.path, value.clone());
            }
        }
    }
}

/// Stable topological order over `edges`: among ready nodes, the smallest
/// input index goes first.
fn topo_order(stacks: &[Arc<Stack>], edges: &[Vec<usize>]) -> Result<Vec<usize>> {
    let n = stacks.len();
    let mut in_degree = vec![0usize; n];
    let mut dependents = vec![Vec::new(); n];
    for (consumer, deps) in edges.iter().enumerate() {
        in_degree[consumer] = deps.len();
        for &producer in deps {
            dependents[producer].push(consumer);
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
        .filter(|&i| in_degree[i] == 0)
        .map(Reverse)
        .collect();

    let mut order = Vec::with_capacity(n);
    while let Some(Reverse(i)) = ready.pop() {
        order.push(i);
        for &dependent in &dependents[i] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.push(Reverse(dependent));
            }
        }
    }

    if order.len() < n {
        let ordered: HashSet<usize> = order.iter().copied().collect();
        let stuck: HashSet<usize> = (0..n).filter(|i| !ordered.contains(i)).collect();
        let cycle = find_cycle(edges, &stuck)
            .into_iter()
            .map(|i| stacks[i].name().to_string())
            .collect();
        return Err(EngineError::CyclicReference { cycle });
    }
    Ok(order)
}

/// Walks dependency edges among `stuck` nodes until one repeats; returns
/// the cycle with the entry node at both ends.
fn find_cycle(edges: &[Vec<usize>], stuck: &HashSet<usize>) -> Vec<usize> {
    fn walk(
        node: usize,
        edges: &[Vec<usize>],
        stuck: &HashSet<usize>,
        path: &mut Vec<usize>,
        visited: &mut HashSet<usize>,
    ) -> Option<Vec<usize>> {
        if let Some(start) = path.iter().position(|&n| n == node) {
            let mut cycle = path[start..].to_vec();
            cycle.push(node);
            return Some(cycle);
        }
        if !visited.insert(node) {
            return None;
        }
        path.push(node);
        for &dep in &edges[node] {
            if stuck.contains(&dep)
                && let Some(cycle) = walk(dep, edges, stuck, path, visited)
            {
                return Some(cycle);
            }
        }
        path.pop();
        None
    }

    let mut visited = HashSet::new();
    for &start in stuck {
        let mut path = Vec::new();
        if let Some(cycle) = walk(start, edges, stuck, &mut path, &mut visited) {
            return cycle;
        }
    }
    Vec::new()
}
