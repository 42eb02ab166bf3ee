mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, hook::HookEvent, queue::QueueSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "devkit",
    about = "Developer tooling: serialize test runs across shells, record agent-session hooks",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .devkit/ or .git/)
    #[arg(long, global = true, env = "DEVKIT_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run commands one at a time through a named queue
    Queue {
        #[command(subcommand)]
        subcommand: QueueSubcommand,
    },

    /// Handle an agent-session hook event (JSON payload on stdin)
    Hook {
        #[command(subcommand)]
        event: HookEvent,
    },

    /// Inspect the project configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Queue { subcommand } => cmd::queue::run(&root, subcommand, cli.json),
        Commands::Hook { event } => cmd::hook::run(&root, event),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        if let Some(exit) = e.downcast_ref::<cmd::queue::QueueExit>() {
            if let Some(msg) = exit.message() {
                eprintln!("error: {msg}");
            }
            std::process::exit(exit.code());
        }
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
