use colored::Colorize;
use skystack_core::{Project, Scope};
use skystack_engine::{ControllerRegistry, Direction};

pub async fn handle(
    project: Project,
    scope: &Scope,
    refresh: bool,
    delete: bool,
) -> anyhow::Result<()> {
    let direction = if delete {
        Direction::Delete
    } else {
        Direction::Provision
    };
    let verb = if delete { "delete" } else { "provision" };
    println!(
        "{}",
        format!("Planning {verb} for scope {scope}...").blue()
    );

    let ctx = super::engine_context(project, refresh, 1).await?;
    let registry = ControllerRegistry::new(ctx);
    let plans = registry.plan(scope, direction).await?;

    if plans.is_empty() {
        println!("{}", "Nothing in scope.".yellow());
        return Ok(());
    }

    let mut changes = false;
    for (name, plan) in &plans {
        super::print_plan(name, plan);
        changes |= plan.has_changes();
    }

    println!();
    if changes {
        println!("Apply with: {}", format!("sky {verb} {scope}").cyan());
    } else {
        println!("{}", "No changes. Everything is up to date.".green());
    }
    Ok(())
}
