pub mod delete;
pub mod outputs;
pub mod plan;
pub mod provision;
pub mod validate;

use colored::Colorize;
use skystack_core::Project;
use skystack_engine::{
    Action, EngineContext, EngineOptions, ExecutionReport, Plan, ProviderFactory,
};

/// Builds the engine context every provisioning command starts from.
pub(crate) async fn engine_context(
    project: Project,
    refresh: bool,
    concurrency: usize,
) -> anyhow::Result<EngineContext> {
    let providers = ProviderFactory::with_defaults(project.state_path());
    let options = EngineOptions {
        max_concurrency: concurrency.max(1),
        refresh,
        ..EngineOptions::default()
    };
    Ok(EngineContext::new(project, providers, options).await?)
}

/// Flips the context's interrupt flag on Ctrl-C so the executor can stop
/// at the next wave boundary instead of mid-operation.
pub(crate) fn listen_for_interrupt(ctx: &EngineContext) {
    let interrupt = ctx.interrupt_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!();
            eprintln!(
                "{}",
                "Interrupt received; finishing in-flight stacks...".yellow()
            );
            let _ = interrupt.send(true);
        }
    });
}

/// Prints one controller's plan, one line per stack.
pub(crate) fn print_plan(name: &str, plan: &Plan) {
    println!();
    println!("{}", name.bold());
    for entry in &plan.entries {
        let line = match entry.action {
            Action::Create => format!("  {} {}", "+".green(), entry.stack.name()),
            Action::Update => format!("  {} {}", "~".yellow(), entry.stack.name()),
            Action::Delete => format!("  {} {}", "-".red(), entry.stack.name()),
            Action::NoOp => format!("  {} {}", "=".dimmed(), entry.stack.name().dimmed()),
        };
        println!("{line}");
    }
    println!("  {}", plan.summary().to_string().dimmed());
}

/// Prints what happened to every stack, then the one-line summary.
pub(crate) fn print_report(report: &ExecutionReport) {
    println!();
    for stack in &report.completed {
        println!("  {} {}", "✓".green(), stack);
    }
    for failed in &report.failed {
        println!("  {} {}", "✗".red(), failed.stack.red());
        println!("      {}", failed.error);
    }
    for skipped in &report.skipped {
        println!(
            "  {} {} {}",
            "→".yellow(),
            skipped.stack,
            format!("(blocked by {})", skipped.blocked_by).dimmed()
        );
    }
    for stack in &report.pending {
        println!("  {} {} {}", "•".dimmed(), stack, "(not started)".dimmed());
    }
    println!();
    println!("{report}");
    if report.interrupted {
        println!(
            "{}",
            "Run interrupted; pending stacks resume on the next provision.".yellow()
        );
    }
}

/// Exit code contract: any failed or skipped stack, best-effort included,
/// and any interrupt that left the run unfinished make the process exit
/// non-zero. Every problem was already printed by [`print_report`].
pub(crate) fn exit_code(report: &ExecutionReport) -> i32 {
    if report.is_success() { 0 } else { 1 }
}

pub(crate) fn finish(report: &ExecutionReport) -> anyhow::Result<()> {
    match exit_code(report) {
        0 => Ok(()),
        code => std::process::exit(code),
    }
}
