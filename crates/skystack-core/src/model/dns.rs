//! DNS zone definitions.

use super::default_true;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;

/// A file-level grouping of hosted zones provisioned into one account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ZoneSet {
    pub name: String,
    pub account: String,
    /// DNS is a global service for most providers.
    #[serde(default = "default_dns_region")]
    pub region: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub zones: Vec<DnsZone>,
}

fn default_dns_region() -> String {
    "global".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DnsZone {
    pub name: String,
    /// Apex domain of the zone, e.g. `example.com`.
    pub domain: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub records: Vec<DnsRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DnsRecord {
    /// Record name relative to the zone apex; `@` for the apex itself.
    pub name: String,
    pub kind: DnsRecordKind,
    /// Literal value or a `ref:` to another stack's output.
    pub value: String,
    #[serde(default = "default_ttl")]
    pub ttl: u32,
}

fn default_ttl() -> u32 {
    300
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DnsRecordKind {
    A,
    Aaaa,
    Cname,
    Txt,
    Mx,
}

impl fmt::Display for DnsRecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::A => "A",
            Self::Aaaa => "AAAA",
            Self::Cname => "CNAME",
            Self::Txt => "TXT",
            Self::Mx => "MX",
        };
        write!(f, "{}", s)
    }
}

impl ZoneSet {
    pub fn zone(&self, name: &str) -> Option<&DnsZone> {
        self.zones.iter().find(|z| z.name == name)
    }

    /// Static attribute lookup relative to the zone set.
    pub fn get(&self, path: &[String]) -> Option<Value> {
        match path {
            [field] => match field.as_str() {
                "name" => Some(json!(self.name)),
                "account" => Some(json!(self.account)),
                "enabled" => Some(json!(self.enabled)),
                _ => None,
            },
            [head, zone, field] if head == "zones" => {
                let zone = self.zone(zone)?;
                match field.as_str() {
                    "name" => Some(json!(zone.name)),
                    "domain" => Some(json!(zone.domain)),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}
