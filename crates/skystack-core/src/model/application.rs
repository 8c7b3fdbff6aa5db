//! Application and resource definitions.

use super::default_true;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// A named group of resources deployed together inside an environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Application {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Best-effort applications do not abort the run when one of their
    /// stacks fails; later siblings still execute.
    #[serde(default)]
    pub best_effort: bool,
    #[serde(default)]
    pub resources: Vec<Resource>,
}

/// One provisionable resource. The `kind` field selects the variant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Resource {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Protected resources are never updated or deleted by a plan.
    #[serde(default)]
    pub change_protected: bool,
    #[serde(default)]
    pub best_effort: bool,
    #[serde(flatten)]
    pub spec: ResourceSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceSpec {
    Bucket(BucketSpec),
    Service(ServiceSpec),
}

impl ResourceSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bucket(_) => "bucket",
            Self::Service(_) => "service",
        }
    }
}

/// Object storage bucket.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BucketSpec {
    #[serde(default)]
    pub versioning: bool,
    #[serde(default)]
    pub public: bool,
}

/// A long-running service placed into a network segment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceSpec {
    /// Name of the network segment the service is attached to.
    pub segment: String,
    #[serde(default = "default_instances")]
    pub instances: u32,
    #[serde(default)]
    pub image: Option<String>,
}

fn default_instances() -> u32 {
    1
}

impl Application {
    pub fn resource(&self, name: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.name == name)
    }

    pub(crate) fn get(&self, path: &[String]) -> Option<Value> {
        match path {
            [field] => match field.as_str() {
                "name" => Some(json!(self.name)),
                "enabled" => Some(json!(self.enabled)),
                _ => None,
            },
            [head, res, rest @ ..] if head == "resources" => self.resource(res)?.get(rest),
            _ => None,
        }
    }
}

impl Resource {
    pub(crate) fn get(&self, path: &[String]) -> Option<Value> {
        let [field] = path else {
            return None;
        };
        match (field.as_str(), &self.spec) {
            ("name", _) => Some(json!(self.name)),
            ("kind", spec) => Some(json!(spec.kind())),
            ("enabled", _) => Some(json!(self.enabled)),
            ("versioning", ResourceSpec::Bucket(b)) => Some(json!(b.versioning)),
            ("public", ResourceSpec::Bucket(b)) => Some(json!(b.public)),
            ("segment", ResourceSpec::Service(s)) => Some(json!(s.segment)),
            ("instances", ResourceSpec::Service(s)) => Some(json!(s.instances)),
            ("image", ResourceSpec::Service(s)) => s.image.as_ref().map(|i| json!(i)),
            _ => None,
        }
    }
}
