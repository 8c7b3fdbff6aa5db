//! The `ref:` notation.
//!
//! Configuration values may point at other parts of the project instead of
//! carrying a literal: `ref:netenv.prod.network.vpc.id`. A reference is a
//! dotted path; whether it lands on a static configuration attribute or on a
//! stack output is decided at resolution time, not here.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix that marks a string value as a reference.
pub const REF_PREFIX: &str = "ref:";

/// A parsed dotted reference path.
///
/// Parsing validates the grammar only: at least two segments, each made of
/// ASCII alphanumerics, `_` or `-`. The path is kept both joined and split so
/// callers can match prefixes without re-splitting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ref {
    path: String,
    segments: Vec<String>,
}

impl Ref {
    /// Parses a reference, including its `ref:` prefix.
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = |message: &str| CoreError::InvalidReference {
            reference: raw.to_string(),
            message: message.to_string(),
        };

        let path = raw
            .strip_prefix(REF_PREFIX)
            .ok_or_else(|| invalid("missing 'ref:' prefix"))?;
        if path.is_empty() {
            return Err(invalid("empty path"));
        }

        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        if segments.len() < 2 {
            return Err(invalid("a reference needs at least two segments"));
        }
        for segment in &segments {
            if segment.is_empty() {
                return Err(invalid("empty path segment"));
            }
            if !segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            {
                return Err(invalid(
                    "path segments may only contain alphanumerics, '_' and '-'",
                ));
            }
        }

        Ok(Self {
            path: path.to_string(),
            segments,
        })
    }

    /// Whether a raw configuration value is a reference.
    pub fn is_ref(value: &str) -> bool {
        value.starts_with(REF_PREFIX)
    }

    /// The dotted path without the `ref:` prefix.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The first segment, which selects the controller domain
    /// (`netenv`, `dns`, `accounts`, ...).
    pub fn domain(&self) -> &str {
        &self.segments[0]
    }

    /// The last segment, conventionally the attribute or output key.
    pub fn attribute(&self) -> &str {
        &self.segments[self.segments.len() - 1]
    }

    /// The path with the attribute segment removed, dotted.
    pub fn parent_path(&self) -> String {
        self.segments[..self.segments.len() - 1].join(".")
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", REF_PREFIX, self.path)
    }
}

impl TryFrom<String> for Ref {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Ref::parse(&value)
    }
}

impl From<Ref> for String {
    fn from(r: Ref) -> Self {
        r.to_string()
    }
}
