//! Leader-or-client startup. A peer first tries the hub other processes
//! advertised through the discovery file; when none answers it opens the
//! store itself, starts a hub, and advertises its own address.

use crate::connector::{Connection, Connector};
use crate::discovery;
use crewboard_hub::{Server, ServerConfig, TokenVerifier};
use crewboard_store::{BoardService, Store};
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Leader,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Leader => "leader",
            Role::Client => "client",
        })
    }
}

#[derive(Debug, Error)]
pub enum PeerError {
    #[error(transparent)]
    Connector(#[from] crate::connector::ConnectorError),
    #[error(transparent)]
    Store(#[from] crewboard_store::StoreError),
    #[error(transparent)]
    Server(#[from] crewboard_hub::ServerError),
}

/// What `start_or_connect` resolved to. A client holds a live connection; a
/// leader holds the store service and the hub it is serving from.
pub struct PeerState {
    pub role: Role,
    pub server_addr: String,
    pub connection: Option<Connection>,
    pub server: Option<Server>,
    pub service: Option<BoardService>,
}

/// Resolve this peer's place in the topology. An explicit connect address
/// always wins; otherwise a discovered local hub is tried, and a stale entry
/// promotes this process to leader.
pub async fn start_or_connect(
    base: &Path,
    connect_addr: Option<&str>,
    token: &str,
    db_path: &Path,
    verifier: Arc<dyn TokenVerifier>,
    shutdown: watch::Receiver<bool>,
) -> Result<PeerState, PeerError> {
    if let Some(addr) = connect_addr {
        let connection = Connector::new(addr, token).connect(shutdown).await?;
        return Ok(PeerState {
            role: Role::Client,
            server_addr: addr.to_string(),
            connection: Some(connection),
            server: None,
            service: None,
        });
    }

    if let Ok(info) = discovery::read_server_info_in(base) {
        match Connector::new(&info.addr, token).connect(shutdown.clone()).await {
            Ok(connection) => {
                return Ok(PeerState {
                    role: Role::Client,
                    server_addr: info.addr,
                    connection: Some(connection),
                    server: None,
                    service: None,
                });
            }
            Err(err) => {
                info!(event = "stale_server_info", addr = %info.addr, error = %err);
            }
        }
    }

    // Nobody home: become the leader.
    let store = Arc::new(Store::open(db_path)?);
    let service = BoardService::new(store);
    let server = Server::start(
        service.clone(),
        verifier,
        ServerConfig {
            addr: "127.0.0.1:0".parse::<SocketAddr>().expect("loopback addr"),
            public: false,
        },
        shutdown,
    )
    .await?;

    let addr = server.local_addr.to_string();
    if let Err(err) = discovery::write_server_info_in(base, &addr) {
        tracing::warn!(event = "server_info_write_failed", error = %err);
    }
    info!(event = "promoted_to_leader", addr = %addr);

    Ok(PeerState {
        role: Role::Leader,
        server_addr: addr,
        connection: None,
        server: Some(server),
        service: Some(service),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crewboard_hub::StaticVerifier;

    #[tokio::test]
    async fn becomes_leader_when_nothing_is_advertised() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let verifier = Arc::new(StaticVerifier::new([("t".to_string(), "mira".to_string())]));

        let state = start_or_connect(
            dir.path(),
            None,
            "",
            &dir.path().join("board.db"),
            verifier,
            shutdown_rx,
        )
        .await
        .expect("start");

        assert_eq!(state.role, Role::Leader);
        assert!(state.service.is_some());
        assert!(state.server.is_some());
        // The leader advertises itself for later peers.
        let info = discovery::read_server_info_in(dir.path()).expect("advertised");
        assert_eq!(info.addr, state.server_addr);
    }

    #[tokio::test]
    async fn joins_an_advertised_hub_as_client() {
        let dir = tempfile::tempdir().expect("tempdir");
        let verifier = Arc::new(StaticVerifier::new([("tok".to_string(), "mira".to_string())]));

        let (_leader_tx, leader_rx) = watch::channel(false);
        let leader = start_or_connect(
            dir.path(),
            None,
            "",
            &dir.path().join("board.db"),
            verifier.clone(),
            leader_rx,
        )
        .await
        .expect("leader");
        assert_eq!(leader.role, Role::Leader);

        let (_client_tx, client_rx) = watch::channel(false);
        let client = start_or_connect(
            dir.path(),
            None,
            "tok",
            &dir.path().join("board.db"),
            verifier,
            client_rx,
        )
        .await
        .expect("client");
        assert_eq!(client.role, Role::Client);
        assert_eq!(client.server_addr, leader.server_addr);
        assert!(client.connection.is_some());
    }

    #[tokio::test]
    async fn stale_advertisement_promotes_to_leader() {
        let dir = tempfile::tempdir().expect("tempdir");
        // Advertise a hub that is not actually listening.
        discovery::write_server_info_in(dir.path(), "127.0.0.1:9").expect("stale info");

        let (_tx, rx) = watch::channel(false);
        let verifier = Arc::new(StaticVerifier::new([("t".to_string(), "mira".to_string())]));
        let state = start_or_connect(
            dir.path(),
            None,
            "",
            &dir.path().join("board.db"),
            verifier,
            rx,
        )
        .await
        .expect("promote");
        assert_eq!(state.role, Role::Leader);
    }
}
