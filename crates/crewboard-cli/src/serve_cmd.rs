use crate::util::db_path;
use anyhow::{Context, Result};
use clap::Args;
use crewboard_agent::{Supervisor, SupervisorConfig};
use crewboard_hub::{GithubVerifier, Server, ServerConfig};
use crewboard_mux::WindowManager;
use crewboard_store::{BoardService, Store};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Port to listen on (0 for a random free port)
    #[arg(short, long, default_value_t = 0)]
    pub port: u16,
    /// Address to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub bind: String,
    /// Skip the loopback Origin check (for exposure through a tunnel);
    /// bearer-token auth remains in force
    #[arg(long)]
    pub public: bool,
}

pub async fn run(args: ServeArgs) -> Result<()> {
    let store = Store::open(db_path()).context("opening board database")?;
    let service = BoardService::new(Arc::new(store));

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", args.bind, args.port))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let server = Server::start(
        service.clone(),
        Arc::new(GithubVerifier::new()),
        ServerConfig {
            addr,
            public: args.public,
        },
        shutdown_rx.clone(),
    )
    .await?;

    // The serving machine owns the agent fleet: reconcile windows here.
    let (supervisor, mut events) =
        Supervisor::new(service, WindowManager::new(), SupervisorConfig::default());
    let supervisor_task = tokio::spawn(supervisor.run(shutdown_rx));
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            info!(event = "supervisor_event", detail = ?event);
        }
    });

    let local_addr = server.local_addr.to_string();
    if let Err(err) = crewboard_peer::write_server_info_in(Path::new("."), &local_addr) {
        eprintln!("Warning: could not write server info: {err}");
    }

    eprintln!("crewboard hub listening on {local_addr}");
    eprintln!("Peers can join with: crewboard --connect {local_addr}");

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!(event = "shutdown_requested");

    let _ = shutdown_tx.send(true);
    let _ = crewboard_peer::remove_server_info_in(Path::new("."));
    server.wait().await;
    let _ = supervisor_task.await;
    Ok(())
}
