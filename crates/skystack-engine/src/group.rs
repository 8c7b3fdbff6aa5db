//! Stack groups: ordered composites of stacks and nested groups.
//!
//! Groups exist to express ordering and failure scope. Flattening a group
//! yields its stacks depth-first in insertion order, and that order is the
//! baseline the planner refines with reference edges.

use crate::error::{EngineError, Result};
use crate::stack::{Stack, StackState};
use std::fmt;
use std::sync::Arc;

/// One member of a group.
#[derive(Debug, Clone)]
pub enum Child {
    Stack(Arc<Stack>),
    Group(StackGroup),
}

impl Child {
    fn name(&self) -> &str {
        match self {
            Self::Stack(stack) => stack.name(),
            Self::Group(group) => group.name(),
        }
    }
}

/// Aggregate status of a group, derived from its enabled stacks' states.
/// Disabled stacks do not count; a best-effort stack's failure degrades
/// the group to `Incomplete` instead of `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupStatus {
    /// Nothing has run yet.
    Pending,
    InProgress,
    /// Every enabled stack reached `Complete`.
    Complete,
    /// An enabled, non-best-effort stack failed.
    Failed,
    /// No hard failure inside this group, but not every stack converged.
    Incomplete,
}

impl fmt::Display for GroupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in-progress"),
            Self::Complete => write!(f, "complete"),
            Self::Failed => write!(f, "failed"),
            Self::Incomplete => write!(f, "incomplete"),
        }
    }
}

/// An ordered composite of stacks and nested groups.
#[derive(Debug, Clone, Default)]
pub struct StackGroup {
    name: String,
    best_effort: bool,
    children: Vec<Child>,
}

impl StackGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            best_effort: false,
            children: Vec::new(),
        }
    }

    /// A best-effort group lets the run continue past its members'
    /// failures. The flag is stamped onto stacks as they are added.
    pub fn best_effort(mut self, best_effort: bool) -> Self {
        self.best_effort = best_effort;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_best_effort(&self) -> bool {
        self.best_effort
    }

    /// Appends a stack and returns the shared handle the engine works with.
    pub fn add_stack(&mut self, stack: Stack) -> Arc<Stack> {
        let stack = if self.best_effort {
            Arc::new(stack.best_effort(true))
        } else {
            Arc::new(stack)
        };
        self.children.push(Child::Stack(stack.clone()));
        stack
    }

    /// Appends a nested group. Fill groups before attaching them; a parent's
    /// best-effort flag reaches only stacks added after attachment.
    pub fn add_group(&mut self, mut group: StackGroup) {
        group.best_effort = group.best_effort || self.best_effort;
        self.children.push(Child::Group(group));
    }

    /// Inserts a stack immediately before the direct child named `target`.
    pub fn insert_stack_before(&mut self, target: &str, stack: Stack) -> Result<Arc<Stack>> {
        let position = self
            .children
            .iter()
            .position(|child| child.name() == target)
            .ok_or_else(|| EngineError::UnknownMember {
                group: self.name.clone(),
                name: target.to_string(),
            })?;
        let stack = if self.best_effort {
            Arc::new(stack.best_effort(true))
        } else {
            Arc::new(stack)
        };
        self.children.insert(position, Child::Stack(stack.clone()));
        Ok(stack)
    }

    pub fn children(&self) -> &[Child] {
        &self.children
    }

    /// All stacks, depth-first in insertion order.
    pub fn stacks(&self) -> Vec<Arc<Stack>> {
        let mut out = Vec::new();
        self.collect_stacks(&mut out);
        out
    }

    fn collect_stacks(&self, out: &mut Vec<Arc<Stack>>) {
        for child in &self.children {
            match child {
                Child::Stack(stack) => out.push(stack.clone()),
                Child::Group(group) => group.collect_stacks(out),
            }
        }
    }

    /// Finds a stack by its logical name anywhere in the tree.
    pub fn find(&self, name: &str) -> Option<Arc<Stack>> {
        for child in &self.children {
            match child {
                Child::Stack(stack) if stack.name() == name => return Some(stack.clone()),
                Child::Stack(_) => {}
                Child::Group(group) => {
                    if let Some(found) = group.find(name) {
                        return Some(found);
                    }
                }
            }
        }
        None
    }

    /// Number of stacks in the tree.
    pub fn len(&self) -> usize {
        self.children
            .iter()
            .map(|child| match child {
                Child::Stack(_) => 1,
                Child::Group(group) => group.len(),
            })
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn status(&self) -> GroupStatus {
        let states: Vec<(StackState, bool)> = self
            .stacks()
            .iter()
            .filter(|s| s.is_enabled())
            .map(|s| (s.state(), s.is_best_effort()))
            .collect();
        if states.is_empty() {
            return GroupStatus::Complete;
        }
        if states
            .iter()
            .any(|(s, best_effort)| matches!(s, StackState::Failed) && !best_effort)
        {
            GroupStatus::Failed
        } else if states.iter().any(|(s, _)| matches!(s, StackState::InProgress)) {
            GroupStatus::InProgress
        } else if states.iter().all(|(s, _)| matches!(s, StackState::Complete)) {
            GroupStatus::Complete
        } else if states.iter().any(|(s, _)| {
            matches!(s, StackState::Complete | StackState::Skipped | StackState::Failed)
        }) {
            GroupStatus::Incomplete
        } else {
            GroupStatus::Pending
        }
    }
}
