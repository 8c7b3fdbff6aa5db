use colored::Colorize;
use skystack_core::{Project, Scope};
use skystack_engine::ControllerRegistry;

pub async fn handle(
    project: Project,
    scope: &Scope,
    refresh: bool,
    concurrency: usize,
) -> anyhow::Result<()> {
    println!(
        "{}",
        format!("Provisioning scope {scope}...").green().bold()
    );

    let ctx = super::engine_context(project, refresh, concurrency).await?;
    super::listen_for_interrupt(&ctx);
    let registry = ControllerRegistry::new(ctx);

    let report = registry.provision(scope).await?;
    super::print_report(&report);
    super::finish(&report)
}
