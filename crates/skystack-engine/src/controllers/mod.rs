//! Built-in controllers, one per configuration domain.

mod dns;
mod netenv;

pub use dns::DnsController;
pub use netenv::NetEnvController;

use crate::context::EngineContext;
use crate::controller::Controller;
use crate::error::Result;
use std::sync::Arc;

/// Builds every controller the project configures: network environments
/// first, then DNS, which is also the provisioning order. Building
/// declares every stack output, so cross-controller references resolve
/// before anything is planned.
pub(crate) fn build_controllers(ctx: &EngineContext) -> Result<Vec<Arc<dyn Controller>>> {
    let mut controllers: Vec<Arc<dyn Controller>> = Vec::new();
    for netenv in &ctx.project().netenvs {
        controllers.push(Arc::new(NetEnvController::build(ctx, netenv)?));
    }
    for set in &ctx.project().zone_sets {
        controllers.push(Arc::new(DnsController::build(ctx, set)?));
    }
    Ok(controllers)
}
