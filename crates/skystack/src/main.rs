mod commands;

use anyhow::Context;
use clap::{Parser, Subcommand};
use skystack_core::Scope;

#[derive(Parser)]
#[command(name = "sky")]
#[command(version)]
#[command(about = "Declarative cloud infrastructure: plan first, then converge", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the project configuration without talking to any provider
    Validate,
    /// Show what provision would do, without doing it
    Plan {
        /// Scope expression, e.g. `netenv.prod` or `dns.public` (`*` for everything)
        #[arg(default_value = "*")]
        scope: String,
        /// Ask the provider about every stack, ignoring recorded digests
        #[arg(long)]
        refresh: bool,
        /// Plan the teardown instead of the build-out
        #[arg(long)]
        delete: bool,
    },
    /// Create or update every stack the scope touches
    Provision {
        /// Scope expression, e.g. `netenv.prod` or `dns.public` (`*` for everything)
        #[arg(default_value = "*")]
        scope: String,
        /// Ask the provider about every stack, ignoring recorded digests
        #[arg(long)]
        refresh: bool,
        /// Upper bound on stacks provisioned at once
        #[arg(short = 'j', long, default_value_t = 1)]
        concurrency: usize,
    },
    /// Delete every stack the scope touches, dependents first
    Delete {
        /// Scope expression, e.g. `netenv.prod` or `dns.public` (`*` for everything)
        #[arg(default_value = "*")]
        scope: String,
        /// Skip the confirmation step
        #[arg(short, long)]
        yes: bool,
        /// Upper bound on stacks deleted at once
        #[arg(short = 'j', long, default_value_t = 1)]
        concurrency: usize,
    },
    /// Show recorded stack outputs
    Outputs {
        /// Scope expression narrowing which stacks to show
        #[arg(default_value = "*")]
        scope: String,
        /// Print machine-readable JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Human-facing output goes to stdout via `colored`; diagnostics go to
    // stderr via tracing, opt-in through RUST_LOG.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Validate owns its own loading, so configuration problems print as
    // findings instead of a bare error.
    if matches!(cli.command, Commands::Validate) {
        return commands::validate::handle().await;
    }

    let root = skystack_core::find_project_root()?;
    let project = skystack_core::load_project(&root)
        .with_context(|| format!("failed to load project at {}", root.display()))?;

    match cli.command {
        Commands::Validate => {
            unreachable!("Validate is handled before project loading");
        }
        Commands::Plan {
            scope,
            refresh,
            delete,
        } => {
            let scope = Scope::parse(&scope)?;
            commands::plan::handle(project, &scope, refresh, delete).await
        }
        Commands::Provision {
            scope,
            refresh,
            concurrency,
        } => {
            let scope = Scope::parse(&scope)?;
            commands::provision::handle(project, &scope, refresh, concurrency).await
        }
        Commands::Delete {
            scope,
            yes,
            concurrency,
        } => {
            let scope = Scope::parse(&scope)?;
            commands::delete::handle(project, &scope, yes, concurrency).await
        }
        Commands::Outputs { scope, json } => {
            let scope = Scope::parse(&scope)?;
            commands::outputs::handle(project, &scope, json).await
        }
    }
}
