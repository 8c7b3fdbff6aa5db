//! Scope expressions used to narrow commands to a subtree of the project.
//!
//! `sky provision netenv.prod.applications.web` plans exactly the stacks
//! whose logical path sits under `netenv.prod.applications.web`. An empty
//! scope selects everything.

use crate::error::{CoreError, Result};
use std::fmt;

/// A dotted path selecting a subtree of the project, or everything when empty.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Scope {
    segments: Vec<String>,
}

impl Scope {
    /// Parses a dotted scope expression. `*` and the empty string select
    /// everything.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() || raw == "*" {
            return Ok(Self::everything());
        }

        let segments: Vec<String> = raw.split('.').map(str::to_string).collect();
        for segment in &segments {
            if segment.is_empty()
                || !segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            {
                return Err(CoreError::UnknownScope(raw.to_string()));
            }
        }
        Ok(Self { segments })
    }

    pub fn everything() -> Self {
        Self::default()
    }

    pub fn is_everything(&self) -> bool {
        self.segments.is_empty()
    }

    /// First segment, selecting the controller domain.
    pub fn domain(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Whether a dotted logical path falls inside this scope.
    ///
    /// A path matches when the scope is a segment-wise prefix of it; the
    /// empty scope matches every path.
    pub fn matches(&self, path: &str) -> bool {
        if self.segments.is_empty() {
            return true;
        }
        let path_segments: Vec<&str> = path.split('.').collect();
        if path_segments.len() < self.segments.len() {
            return false;
        }
        self.segments
            .iter()
            .zip(path_segments.iter())
            .all(|(scope_seg, path_seg)| scope_seg == path_seg)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            write!(f, "*")
        } else {
            write!(f, "{}", self.segments.join("."))
        }
    }
}
