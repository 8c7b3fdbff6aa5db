use colored::Colorize;
use skystack_core::{Project, Scope};
use skystack_engine::{ControllerRegistry, Direction};

pub async fn handle(
    project: Project,
    scope: &Scope,
    yes: bool,
    concurrency: usize,
) -> anyhow::Result<()> {
    let ctx = super::engine_context(project, false, concurrency).await?;

    if !yes {
        // Dry-run first: show what would go away, then stop.
        let registry = ControllerRegistry::new(ctx);
        let plans = registry.plan(scope, Direction::Delete).await?;
        if plans.iter().all(|(_, plan)| !plan.has_changes()) {
            println!("{}", "Nothing to delete in scope.".green());
            return Ok(());
        }
        for (name, plan) in &plans {
            super::print_plan(name, plan);
        }
        println!();
        println!(
            "{}",
            "Warning: this removes the stacks above from the provider.".yellow()
        );
        println!("Re-run with {} to delete them", "--yes".cyan());
        return Ok(());
    }

    println!("{}", format!("Deleting scope {scope}...").red().bold());
    super::listen_for_interrupt(&ctx);
    let registry = ControllerRegistry::new(ctx);

    let report = registry.delete(scope).await?;
    super::print_report(&report);
    super::finish(&report)
}
