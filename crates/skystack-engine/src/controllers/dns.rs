//! Controller for one zone set.

use crate::context::EngineContext;
use crate::controller::{Controller, ValidationReport, validate_stacks};
use crate::error::Result;
use crate::group::{GroupStatus, StackGroup};
use crate::render;
use crate::stack::{Stack, StackTags};
use skystack_cloud::StackIdentity;
use skystack_core::ZoneSet;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

pub struct DnsController {
    name: String,
    set: ZoneSet,
    group: StackGroup,
}

impl DnsController {
    /// One stack per zone. Record values that are references become stack
    /// parameters, so a zone naturally waits for the services its records
    /// point at.
    pub(crate) fn build(ctx: &EngineContext, set: &ZoneSet) -> Result<Self> {
        let name = format!("dns.{}", set.name);
        let mut group = StackGroup::new(&name);

        let mut tags = StackTags::new();
        tags.insert("skystack:project".to_string(), ctx.project().name.clone());
        tags.insert("skystack:zone-set".to_string(), set.name.clone());

        for zone in &set.zones {
            let rendered = render::zone_stack(set, zone)?;
            let stack = Stack::new(
                StackIdentity::new(
                    &set.account,
                    &set.region,
                    format!("{name}.zones.{}", zone.name),
                ),
                rendered.payload,
            )
            .with_parameters(rendered.parameters)
            .with_bindings(rendered.bindings)
            .with_tags(tags.clone())
            .enabled(set.enabled && zone.enabled);
            ctx.declare_stack(&group.add_stack(stack));
        }

        debug!(set = set.name, zones = group.len(), "Built DNS controller");
        Ok(Self {
            name,
            set: set.clone(),
            group,
        })
    }

    pub fn group(&self) -> &StackGroup {
        &self.group
    }
}

impl Controller for DnsController {
    fn domain(&self) -> &str {
        "dns"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn stacks(&self) -> Vec<Arc<Stack>> {
        self.group.stacks()
    }

    fn status(&self) -> GroupStatus {
        self.group.status()
    }

    /// Adds a duplicate-record check on top of the shared stack checks:
    /// two records with the same name and kind in one zone would fight
    /// over the same entry.
    fn validate(&self, ctx: &EngineContext) -> ValidationReport {
        let mut report = ValidationReport::default();
        validate_stacks(&self.stacks(), ctx, &mut report);

        for zone in &self.set.zones {
            let mut seen = HashSet::new();
            for record in &zone.records {
                if !seen.insert(format!("{}/{}", record.name, record.kind)) {
                    report.error(format!(
                        "{}.zones.{}: duplicate {} record '{}'",
                        self.name, zone.name, record.kind, record.name
                    ));
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{EngineOptions, ProviderFactory};
    use skystack_core::{Account, Project};
    use std::path::Path;

    fn zone_set(yaml: &str) -> ZoneSet {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn sample_yaml() -> &'static str {
        r#"
        name: public
        account: prod
        zones:
          - name: example
            domain: example.com
            records:
              - name: www
                kind: cname
                value: "app.example.net"
              - name: info
                kind: txt
                value: "hello"
          - name: internal
            domain: example.internal
            enabled: false
        "#
    }

    async fn context(root: &Path, set: ZoneSet) -> EngineContext {
        let project = Project {
            root: root.to_path_buf(),
            name: "demo".to_string(),
            state_dir: ".skystack".to_string(),
            accounts: vec![Account {
                name: "prod".to_string(),
                provider: "memory".to_string(),
                account_id: None,
                default_region: "us-west-2".to_string(),
                enabled: true,
            }],
            netenvs: vec![],
            zone_sets: vec![set],
        };
        EngineContext::new(
            project,
            ProviderFactory::with_defaults(root),
            EngineOptions::default(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_one_stack_per_zone_in_the_global_region() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), zone_set(sample_yaml())).await;
        let controller = DnsController::build(&ctx, &ctx.project().zone_sets[0]).unwrap();

        let names: Vec<_> = controller
            .stacks()
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(
            names,
            ["dns.public.zones.example", "dns.public.zones.internal"]
        );
        assert_eq!(controller.stacks()[0].identity().region, "global");
        assert_eq!(controller.name(), "dns.public");
        assert_eq!(controller.domain(), "dns");
    }

    #[tokio::test]
    async fn test_disabled_zone_yields_a_disabled_stack() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), zone_set(sample_yaml())).await;
        let controller = DnsController::build(&ctx, &ctx.project().zone_sets[0]).unwrap();

        let internal = controller.group().find("dns.public.zones.internal").unwrap();
        assert!(!internal.is_enabled());
        let example = controller.group().find("dns.public.zones.example").unwrap();
        assert!(example.is_enabled());
    }

    #[tokio::test]
    async fn test_build_declares_zone_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), zone_set(sample_yaml())).await;
        let _controller = DnsController::build(&ctx, &ctx.project().zone_sets[0]).unwrap();

        let source = ctx
            .registry()
            .declared_source("dns.public.zones.example.id")
            .expect("zone output declared");
        assert_eq!(source.1, "zone_id");
        assert!(ctx
            .registry()
            .declared_source("dns.public.zones.example.name_servers")
            .is_some());
    }

    #[tokio::test]
    async fn test_duplicate_records_fail_validation() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = r#"
        name: public
        account: prod
        zones:
          - name: example
            domain: example.com
            records:
              - name: www
                kind: cname
                value: "one.example.net"
              - name: www
                kind: cname
                value: "two.example.net"
              - name: www
                kind: txt
                value: "not a duplicate; different kind"
        "#;
        let ctx = context(dir.path(), zone_set(yaml)).await;
        let controller = DnsController::build(&ctx, &ctx.project().zone_sets[0]).unwrap();

        let report = controller.validate(&ctx);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("duplicate CNAME record 'www'"));
    }

    #[tokio::test]
    async fn test_validation_passes_for_distinct_records() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), zone_set(sample_yaml())).await;
        let controller = DnsController::build(&ctx, &ctx.project().zone_sets[0]).unwrap();

        let report = controller.validate(&ctx);
        assert!(report.is_ok(), "unexpected errors: {:?}", report.errors);
    }
}
