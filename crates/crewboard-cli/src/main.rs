use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod agent_cmd;
mod auth;
mod config;
mod init_cmd;
mod peers_cmd;
mod serve_cmd;
mod status_cmd;
mod task_cmd;
mod tui;
mod util;

#[derive(Parser)]
#[command(name = "crewboard", version)]
#[command(about = "Collaborative kanban board for coordinating coding agents across a team")]
struct Cli {
    /// Connect to a remote hub (e.g. 127.0.0.1:8080 or a tunnel URL)
    #[arg(long, global = true)]
    connect: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize project configuration under .crewboard/
    Init,
    /// Run as a dedicated hub server (no TUI)
    Serve(serve_cmd::ServeArgs),
    /// Manage tasks programmatically
    Task {
        #[command(subcommand)]
        action: task_cmd::TaskCommand,
    },
    /// Agent lifecycle commands
    Agent {
        #[command(subcommand)]
        action: agent_cmd::AgentCommand,
    },
    /// Show a board summary
    Status(status_cmd::StatusArgs),
    /// Show the locally advertised hub, if any
    Peers(peers_cmd::PeersArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Some(Commands::Init) => {
            init_logging(false);
            init_cmd::run()
        }
        Some(Commands::Serve(args)) => {
            init_logging(false);
            serve_cmd::run(args).await
        }
        Some(Commands::Task { action }) => {
            init_logging(true);
            task_cmd::run(action)
        }
        Some(Commands::Agent { action }) => {
            init_logging(true);
            agent_cmd::run(action)
        }
        Some(Commands::Status(args)) => {
            init_logging(true);
            status_cmd::run(args)
        }
        Some(Commands::Peers(args)) => {
            init_logging(true);
            peers_cmd::run(args)
        }
        // No subcommand: the interactive board.
        None => tui::run(cli.connect).await,
    }
}

/// One-shot commands keep logging quiet so their stdout stays parseable;
/// the server logs at info by default. `CREWBOARD_LOG` overrides both.
fn init_logging(quiet: bool) {
    let default = if quiet { "warn" } else { "info" };
    let filter = EnvFilter::try_from_env("CREWBOARD_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
