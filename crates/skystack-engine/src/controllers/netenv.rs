//! Controller for one network environment.
//!
//! Renders the environment into a stack group: the VPC first, then its
//! segments, then one nested group per application holding that
//! application's resource stacks. Insertion order is the provisioning
//! baseline; the planner only tightens it where references demand.

use crate::context::EngineContext;
use crate::controller::Controller;
use crate::error::Result;
use crate::group::{GroupStatus, StackGroup};
use crate::render;
use crate::stack::{Stack, StackTags};
use skystack_cloud::StackIdentity;
use skystack_core::{NetworkEnvironment, ResourceSpec};
use std::sync::Arc;
use tracing::debug;

pub struct NetEnvController {
    name: String,
    group: StackGroup,
}

impl NetEnvController {
    /// Builds the stack group for `netenv` and declares every output it
    /// will produce.
    pub(crate) fn build(ctx: &EngineContext, netenv: &NetworkEnvironment) -> Result<Self> {
        let region = ctx.project().region_for(netenv)?;
        let name = format!("netenv.{}", netenv.name);
        let mut group = StackGroup::new(&name);

        let mut tags = StackTags::new();
        tags.insert("skystack:project".to_string(), ctx.project().name.clone());
        tags.insert("skystack:netenv".to_string(), netenv.name.clone());

        let identity = |stack_name: String| StackIdentity::new(&netenv.account, &region, stack_name);

        let rendered = render::vpc_stack(netenv)?;
        let vpc = Stack::new(identity(format!("{name}.network.vpc")), rendered.payload)
            .with_parameters(rendered.parameters)
            .with_bindings(rendered.bindings)
            .with_tags(tags.clone())
            .enabled(netenv.enabled && netenv.network.vpc.enabled);
        ctx.declare_stack(&group.add_stack(vpc));

        for segment in &netenv.network.segments {
            let rendered = render::segment_stack(netenv, segment)?;
            let stack = Stack::new(
                identity(format!("{name}.network.segments.{}", segment.name)),
                rendered.payload,
            )
            .with_parameters(rendered.parameters)
            .with_bindings(rendered.bindings)
            .with_tags(tags.clone())
            .enabled(netenv.enabled && segment.enabled);
            ctx.declare_stack(&group.add_stack(stack));
        }

        for app in &netenv.applications {
            let mut app_tags = tags.clone();
            app_tags.insert("skystack:application".to_string(), app.name.clone());
            let mut app_group = StackGroup::new(format!("{name}.applications.{}", app.name))
                .best_effort(app.best_effort);

            for resource in &app.resources {
                let rendered = match &resource.spec {
                    ResourceSpec::Bucket(spec) => {
                        render::bucket_stack(netenv, &app.name, resource, spec)?
                    }
                    ResourceSpec::Service(spec) => {
                        render::service_stack(netenv, &app.name, resource, spec)?
                    }
                };
                let stack = Stack::new(
                    identity(format!(
                        "{name}.applications.{}.resources.{}",
                        app.name, resource.name
                    )),
                    rendered.payload,
                )
                .with_parameters(rendered.parameters)
                .with_bindings(rendered.bindings)
                .with_tags(app_tags.clone())
                .enabled(netenv.enabled && app.enabled && resource.enabled)
                .change_protected(resource.change_protected)
                .best_effort(resource.best_effort);
                ctx.declare_stack(&app_group.add_stack(stack));
            }
            group.add_group(app_group);
        }

        debug!(
            netenv = netenv.name,
            stacks = group.len(),
            "Built network environment controller"
        );
        Ok(Self { name, group })
    }

    pub fn group(&self) -> &StackGroup {
        &self.group
    }
}

impl Controller for NetEnvController {
    fn domain(&self) -> &str {
        "netenv"
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
}
