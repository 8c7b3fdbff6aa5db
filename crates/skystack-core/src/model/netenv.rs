//! Network environment definitions.

use super::application::Application;
use super::default_true;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// One deployable environment: an account/region pairing, a network and the
/// applications that live inside it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkEnvironment {
    pub name: String,
    /// Account the environment is provisioned into.
    pub account: String,
    /// Region override; falls back to the account's default region.
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub network: Network,
    #[serde(default)]
    pub applications: Vec<Application>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Network {
    /// Address block for the whole environment, e.g. `10.0.0.0/16`.
    pub cidr: String,
    #[serde(default)]
    pub vpc: Vpc,
    #[serde(default)]
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vpc {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Whether to attach an internet gateway.
    #[serde(default)]
    pub internet_gateway: bool,
}

impl Default for Vpc {
    fn default() -> Self {
        Self {
            enabled: true,
            internet_gateway: false,
        }
    }
}

/// A subnet-level slice of the network.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Segment {
    pub name: String,
    pub cidr: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Public segments get a route to the internet gateway.
    #[serde(default)]
    pub public: bool,
}

impl NetworkEnvironment {
    pub fn application(&self, name: &str) -> Option<&Application> {
        self.applications.iter().find(|a| a.name == name)
    }

    pub fn segment(&self, name: &str) -> Option<&Segment> {
        self.network.segments.iter().find(|s| s.name == name)
    }

    /// Static attribute lookup by dotted path relative to the environment.
    pub fn get(&self, path: &[String]) -> Option<Value> {
        match path {
            [field] => match field.as_str() {
                "name" => Some(json!(self.name)),
                "account" => Some(json!(self.account)),
                "enabled" => Some(json!(self.enabled)),
                _ => None,
            },
            [head, rest @ ..] if head == "network" => self.network.get(rest),
            [head, app, rest @ ..] if head == "applications" => {
                self.application(app)?.get(rest)
            }
            _ => None,
        }
    }
}

impl Network {
    fn get(&self, path: &[String]) -> Option<Value> {
        match path {
            [field] if field == "cidr" => Some(json!(self.cidr)),
            [head, seg, field] if head == "segments" => {
                let segment = self.segments.iter().find(|s| &s.name == seg)?;
                match field.as_str() {
                    "name" => Some(json!(segment.name)),
                    "cidr" => Some(json!(segment.cidr)),
                    "public" => Some(json!(segment.public)),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}
