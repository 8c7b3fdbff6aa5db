use colored::Colorize;
use skystack_engine::ControllerRegistry;

pub async fn handle() -> anyhow::Result<()> {
    println!("{}", "Validating project configuration...".blue());

    let root = match skystack_core::find_project_root() {
        Ok(root) => root,
        Err(err) => {
            eprintln!();
            eprintln!("{}", "✗ No project found".red().bold());
            eprintln!("  {err}");
            eprintln!();
            eprintln!("Run inside a directory tree containing skystack.yaml");
            std::process::exit(1);
        }
    };
    println!("Project root: {}", root.display().to_string().cyan());

    let project = match skystack_core::load_project(&root) {
        Ok(project) => project,
        Err(err) => {
            eprintln!();
            eprintln!("{}", "✗ Configuration error".red().bold());
            eprintln!("  {err}");
            std::process::exit(1);
        }
    };

    println!();
    println!("Summary:");
    println!("  accounts: {}", project.accounts.len());
    for account in &project.accounts {
        println!(
            "    - {} ({}, {})",
            account.name.cyan(),
            account.provider,
            account.default_region
        );
    }
    println!("  network environments: {}", project.netenvs.len());
    for netenv in &project.netenvs {
        println!(
            "    - {} ({} segments, {} applications)",
            netenv.name.cyan(),
            netenv.network.segments.len(),
            netenv.applications.len()
        );
    }
    println!("  zone sets: {}", project.zone_sets.len());
    for set in &project.zone_sets {
        println!("    - {} ({} zones)", set.name.cyan(), set.zones.len());
    }

    // Controller-level checks: references must resolve, flags must be
    // consistent, account backends must be registered. No provider call
    // is made.
    let ctx = super::engine_context(project, false, 1).await?;
    let registry = ControllerRegistry::new(ctx);
    let report = registry.validate().await?;

    println!();
    for warning in &report.warnings {
        println!("  {} {}", "!".yellow(), warning);
    }
    if report.is_ok() {
        println!("{}", "✓ Configuration is valid".green().bold());
        Ok(())
    } else {
        for error in &report.errors {
            eprintln!("  {} {}", "✗".red(), error);
        }
        eprintln!();
        eprintln!("{}", format!("✗ {report}").red().bold());
        std::process::exit(1);
    }
}
