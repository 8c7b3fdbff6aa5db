//! The project: accounts plus everything loaded from the configuration tree.

use super::default_true;
use super::dns::ZoneSet;
use super::netenv::NetworkEnvironment;
use crate::error::{CoreError, Result};
use crate::reference::Ref;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// A cloud account stacks can be provisioned into.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub name: String,
    /// Provider backend name, e.g. `local` or `memory`.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Provider-side account identifier, when known.
    #[serde(default)]
    pub account_id: Option<String>,
    pub default_region: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_provider() -> String {
    "local".to_string()
}

/// The fully loaded project tree.
#[derive(Debug, Clone)]
pub struct Project {
    /// Directory containing `skystack.yaml`.
    pub root: PathBuf,
    pub name: String,
    /// Directory (relative to the root) that holds durable tool state.
    pub state_dir: String,
    pub accounts: Vec<Account>,
    pub netenvs: Vec<NetworkEnvironment>,
    pub zone_sets: Vec<ZoneSet>,
}

impl Project {
    pub fn account(&self, name: &str) -> Option<&Account> {
        self.accounts.iter().find(|a| a.name == name)
    }

    pub fn netenv(&self, name: &str) -> Option<&NetworkEnvironment> {
        self.netenvs.iter().find(|n| n.name == name)
    }

    pub fn zone_set(&self, name: &str) -> Option<&ZoneSet> {
        self.zone_sets.iter().find(|z| z.name == name)
    }

    /// Absolute path of the durable state directory.
    pub fn state_path(&self) -> PathBuf {
        self.root.join(&self.state_dir)
    }

    /// Region an environment lands in: its own override or the account
    /// default.
    pub fn region_for(&self, netenv: &NetworkEnvironment) -> Result<String> {
        match &netenv.region {
            Some(region) => Ok(region.clone()),
            None => {
                let account = self
                    .account(&netenv.account)
                    .ok_or_else(|| CoreError::UnknownAccount(netenv.account.clone()))?;
                Ok(account.default_region.clone())
            }
        }
    }

    /// Static attribute lookup for a reference path.
    ///
    /// Returns `None` when the path does not land on a configuration
    /// attribute; the caller decides whether that means "stack output" or
    /// "invalid".
    pub fn get(&self, reference: &Ref) -> Option<Value> {
        let segments = reference.segments();
        match segments {
            [head, account, field] if head == "accounts" => {
                let account = self.account(account)?;
                match field.as_str() {
                    "name" => Some(json!(account.name)),
                    "provider" => Some(json!(account.provider)),
                    "default_region" => Some(json!(account.default_region)),
                    "account_id" => account.account_id.as_ref().map(|id| json!(id)),
                    _ => None,
                }
            }
            [head, netenv, rest @ ..] if head == "netenv" => self.netenv(netenv)?.get(rest),
            [head, set, rest @ ..] if head == "dns" => self.zone_set(set)?.get(rest),
            _ => None,
        }
    }

    /// Structural validation run after loading: unique names and resolvable
    /// cross-references between configuration sections.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for account in &self.accounts {
            if !seen.insert(account.name.clone()) {
                return Err(CoreError::DuplicateName(format!(
                    "account '{}'",
                    account.name
                )));
            }
        }

        seen.clear();
        for netenv in &self.netenvs {
            if !seen.insert(netenv.name.clone()) {
                return Err(CoreError::DuplicateName(format!("netenv '{}'", netenv.name)));
            }
            if self.account(&netenv.account).is_none() {
                return Err(CoreError::UnknownAccount(netenv.account.clone()));
            }
            validate_netenv(netenv)?;
        }

        seen.clear();
        for set in &self.zone_sets {
            if !seen.insert(set.name.clone()) {
                return Err(CoreError::DuplicateName(format!("dns '{}'", set.name)));
            }
            if self.account(&set.account).is_none() {
                return Err(CoreError::UnknownAccount(set.account.clone()));
            }
            let mut zones = HashSet::new();
            for zone in &set.zones {
                if !zones.insert(zone.name.clone()) {
                    return Err(CoreError::DuplicateName(format!(
                        "zone '{}' in dns '{}'",
                        zone.name, set.name
                    )));
                }
            }
        }

        Ok(())
    }
}

fn validate_netenv(netenv: &NetworkEnvironment) -> Result<()> {
    let mut segments = HashSet::new();
    for segment in &netenv.network.segments {
        if !segments.insert(segment.name.clone()) {
            return Err(CoreError::DuplicateName(format!(
                "segment '{}' in netenv '{}'",
                segment.name, netenv.name
            )));
        }
    }

    let mut apps = HashSet::new();
    for app in &netenv.applications {
        if !apps.insert(app.name.clone()) {
            return Err(CoreError::DuplicateName(format!(
                "application '{}' in netenv '{}'",
                app.name, netenv.name
            )));
        }
        let mut resources = HashSet::new();
        for resource in &app.resources {
            if !resources.insert(resource.name.clone()) {
                return Err(CoreError::DuplicateName(format!(
                    "resource '{}' in application '{}'",
                    resource.name, app.name
                )));
            }
            if let super::application::ResourceSpec::Service(service) = &resource.spec
                && netenv.segment(&service.segment).is_none()
            {
                return Err(CoreError::InvalidConfig(format!(
                    "service '{}' in netenv '{}' uses unknown segment '{}'",
                    resource.name, netenv.name, service.segment
                )));
            }
        }
    }
    Ok(())
}

/// Consumed by the loader; `Project` itself carries the resolved root path.
#[derive(Debug, Deserialize)]
pub(crate) struct ProjectFile {
    pub name: String,
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
    #[serde(default)]
    pub accounts: Vec<Account>,
}

fn default_state_dir() -> String {
    ".skystack".to_string()
}

impl ProjectFile {
    pub(crate) fn into_project(
        self,
        root: &Path,
        netenvs: Vec<NetworkEnvironment>,
        zone_sets: Vec<ZoneSet>,
    ) -> Project {
        Project {
            root: root.to_path_buf(),
            name: self.name,
            state_dir: self.state_dir,
            accounts: self.accounts,
            netenvs,
            zone_sets,
        }
    }
}
