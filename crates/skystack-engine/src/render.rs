//! Renders config model resources into stack payloads.
//!
//! A payload is a provider-neutral JSON document with a `resources` object
//! and an `outputs` array naming the keys the provider must mint. Static
//! configuration is inlined; anything that crosses a stack boundary
//! becomes a reference-valued parameter.

use crate::error::Result;
use crate::stack::{OutputBinding, Parameter};
use serde_json::{Value, json};
use skystack_core::{
    BucketSpec, DnsZone, NetworkEnvironment, Ref, Resource, Segment, ServiceSpec, ZoneSet,
    REF_PREFIX,
};

/// A rendered stack body: the payload plus the parameters and output
/// bindings that go with it.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub payload: Value,
    pub parameters: Vec<Parameter>,
    pub bindings: Vec<OutputBinding>,
}

/// The VPC stack for a network environment. Declares `vpc_id`.
pub fn vpc_stack(netenv: &NetworkEnvironment) -> Result<Rendered> {
    let payload = json!({
        "resources": {
            "vpc": {
                "kind": "vpc",
                "cidr": netenv.network.cidr,
                "internet_gateway": netenv.network.vpc.internet_gateway,
            }
        },
        "outputs": ["vpc_id"],
    });
    Ok(Rendered {
        payload,
        parameters: Vec::new(),
        bindings: vec![OutputBinding::new(
            "vpc_id",
            format!("netenv.{}.network.vpc.id", netenv.name),
        )],
    })
}

/// A network segment stack. Consumes the environment's `vpc_id` and
/// declares `subnet_id`.
pub fn segment_stack(netenv: &NetworkEnvironment, segment: &Segment) -> Result<Rendered> {
    let payload = json!({
        "resources": {
            "segment": {
                "kind": "segment",
                "cidr": segment.cidr,
                "public": segment.public,
            }
        },
        "outputs": ["subnet_id"],
    });
    let vpc_ref = Ref::parse(&format!("ref:netenv.{}.network.vpc.id", netenv.name))?;
    Ok(Rendered {
        payload,
        parameters: vec![Parameter::reference("vpc_id", vpc_ref)],
        bindings: vec![OutputBinding::new(
            "subnet_id",
            format!(
                "netenv.{}.network.segments.{}.subnet_id",
                netenv.name, segment.name
            ),
        )],
    })
}

/// A bucket stack. Declares `bucket_name` and `bucket_url`.
pub fn bucket_stack(
    netenv: &NetworkEnvironment,
    app_name: &str,
    resource: &Resource,
    spec: &BucketSpec,
) -> Result<Rendered> {
    let payload = json!({
        "resources": {
            "bucket": {
                "kind": "bucket",
                "versioning": spec.versioning,
                "public": spec.public,
            }
        },
        "outputs": ["bucket_name", "bucket_url"],
    });
    let base = format!(
        "netenv.{}.applications.{}.resources.{}",
        netenv.name, app_name, resource.name
    );
    Ok(Rendered {
        payload,
        parameters: Vec::new(),
        bindings: vec![
            OutputBinding::new("bucket_name", format!("{base}.name")),
            OutputBinding::new("bucket_url", format!("{base}.url")),
        ],
    })
}

/// A service stack. Consumes the environment's `vpc_id` and its segment's
/// `subnet_id`; declares `service_id` and `endpoint`.
pub fn service_stack(
    netenv: &NetworkEnvironment,
    app_name: &str,
    resource: &Resource,
    spec: &ServiceSpec,
) -> Result<Rendered> {
    let payload = json!({
        "resources": {
            "service": {
                "kind": "service",
                "instances": spec.instances,
                "image": spec.image,
            }
        },
        "outputs": ["service_id", "endpoint"],
    });
    let vpc_ref = Ref::parse(&format!("ref:netenv.{}.network.vpc.id", netenv.name))?;
    let subnet_ref = Ref::parse(&format!(
        "ref:netenv.{}.network.segments.{}.subnet_id",
        netenv.name, spec.segment
    ))?;
    let base = format!(
        "netenv.{}.applications.{}.resources.{}",
        netenv.name, app_name, resource.name
    );
    Ok(Rendered {
        payload,
        parameters: vec![
            Parameter::reference("vpc_id", vpc_ref),
            Parameter::reference("subnet_id", subnet_ref),
        ],
        bindings: vec![
            OutputBinding::new("service_id", format!("{base}.id")),
            OutputBinding::new("endpoint", format!("{base}.endpoint")),
        ],
    })
}

/// A DNS zone stack. Record values may be references (for example to a
/// service endpoint); those become parameters and leave a `$param` marker
/// in the payload. Declares `zone_id` and `name_servers`.
pub fn zone_stack(set: &ZoneSet, zone: &DnsZone) -> Result<Rendered> {
    let mut parameters = Vec::new();
    let mut records = Vec::new();
    for record in &zone.records {
        let value = if record.value.starts_with(REF_PREFIX) {
            let key = format!("record.{}.value", record.name);
            parameters.push(Parameter::reference(&key, Ref::parse(&record.value)?));
            json!({ "$param": key })
        } else {
            json!(record.value)
        };
        records.push(json!({
            "name": record.name,
            "kind": record.kind.to_string(),
            "value": value,
            "ttl": record.ttl,
        }));
    }

    let payload = json!({
        "resources": {
            "zone": {
                "kind": "zone",
                "domain": zone.domain,
                "records": records,
            }
        },
        "outputs": ["zone_id", "name_servers"],
    });
    let base = format!("dns.{}.zones.{}", set.name, zone.name);
    Ok(Rendered {
        payload,
        parameters,
        bindings: vec![
            OutputBinding::new("zone_id", format!("{base}.id")),
            OutputBinding::new("name_servers", format!("{base}.name_servers")),
        ],
    })
}
