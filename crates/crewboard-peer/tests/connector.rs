//! Connector behavior against a real hub: handshake, snapshot, offline
//! queue replay after reconnect.

use crewboard_core::protocol::{self, Message};
use crewboard_hub::{Server, ServerConfig, StaticVerifier};
use crewboard_peer::{Connector, OfflineQueue};
use crewboard_store::{BoardService, Store};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

async fn start_server(service: BoardService) -> (Server, watch::Sender<bool>) {
    let verifier = Arc::new(StaticVerifier::new([(
        "tok-mira".to_string(),
        "mira".to_string(),
    )]));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = Server::start(
        service,
        verifier,
        ServerConfig {
            addr: "127.0.0.1:0".parse::<SocketAddr>().unwrap(),
            public: false,
        },
        shutdown_rx,
    )
    .await
    .expect("server start");
    (server, shutdown_tx)
}

async fn recv_kind(conn: &mut crewboard_peer::Connection, kind: &str) -> Message {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), conn.incoming.recv())
            .await
            .expect("recv deadline")
            .expect("connection open");
        if msg.kind == kind {
            return msg;
        }
    }
}

#[tokio::test]
async fn connect_receives_snapshot_then_broadcasts() {
    let store = Arc::new(Store::open_in_memory().expect("store"));
    let service = BoardService::new(store);
    service.create_task("pre-existing", "").expect("seed");
    let (server, shutdown) = start_server(service.clone()).await;

    let (_tx, peer_shutdown) = {
        let (tx, rx) = watch::channel(false);
        (tx, rx)
    };
    let connector = Connector::new(server.local_addr.to_string(), "tok-mira");
    let mut conn = connector.connect(peer_shutdown).await.expect("connect");

    let sync = recv_kind(&mut conn, protocol::MSG_SYNC_FULL).await;
    let tasks: Vec<crewboard_core::Task> = sync.decode_payload().expect("tasks");
    assert_eq!(tasks.len(), 1);

    conn.send(
        Message::new(
            protocol::MSG_TASK_CREATE,
            "",
            &protocol::TaskCreatePayload {
                title: "from the peer".to_string(),
                description: String::new(),
            },
        )
        .unwrap(),
    )
    .expect("send");

    // The join broadcast took seq 1; the create is 2.
    let broadcast = recv_kind(&mut conn, protocol::MSG_TASK_CREATE).await;
    assert_eq!(broadcast.seq, 2);
    assert_eq!(broadcast.sender, "mira");
    assert_eq!(service.list_tasks().expect("list").len(), 2);

    shutdown.send(true).expect("shutdown");
    server.wait().await;
}

#[tokio::test]
async fn offline_queue_replays_in_order_on_reconnect() {
    let store = Arc::new(Store::open_in_memory().expect("store"));
    let service = BoardService::new(store);
    let (server, shutdown) = start_server(service.clone()).await;

    // Messages composed while no connection existed.
    let queue = OfflineQueue::new();
    for i in 0..3 {
        queue.enqueue(
            Message::new(
                protocol::MSG_TASK_CREATE,
                "",
                &protocol::TaskCreatePayload {
                    title: format!("queued {i}"),
                    description: String::new(),
                },
            )
            .unwrap(),
        );
    }

    let (_tx, peer_shutdown) = {
        let (tx, rx) = watch::channel(false);
        (tx, rx)
    };
    let connector = Connector::new(server.local_addr.to_string(), "tok-mira");
    let mut conn = connector
        .connect_with_retry(3, peer_shutdown)
        .await
        .expect("connect");
    recv_kind(&mut conn, protocol::MSG_SYNC_FULL).await;

    assert_eq!(conn.replay(&queue), 3);
    assert!(queue.is_empty(), "drain is all-or-nothing");

    // All three replayed mutations land, in order, after the join's seq 1.
    let mut seqs = Vec::new();
    for _ in 0..3 {
        let msg = recv_kind(&mut conn, protocol::MSG_TASK_CREATE).await;
        seqs.push(msg.seq);
    }
    assert_eq!(seqs, vec![2, 3, 4]);

    let tasks = service.list_tasks().expect("list");
    let titles: Vec<_> = tasks.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, vec!["queued 0", "queued 1", "queued 2"]);

    shutdown.send(true).expect("shutdown");
    server.wait().await;
}
