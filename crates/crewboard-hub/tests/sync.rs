//! End-to-end hub behavior over real sockets: handshake, snapshot on join,
//! sequence totality under concurrent writers, and typed rejects.

use crewboard_core::protocol::{self, Message};
use crewboard_core::Task;
use crewboard_hub::{Server, ServerConfig, StaticVerifier};
use crewboard_store::{BoardService, Store};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server(service: BoardService) -> (Server, watch::Sender<bool>) {
    let verifier = Arc::new(StaticVerifier::new([
        ("tok-mira".to_string(), "mira".to_string()),
        ("tok-lee".to_string(), "lee".to_string()),
        ("tok-ana".to_string(), "ana".to_string()),
    ]));
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

async fn connect(addr: SocketAddr, token: &str) -> WsClient {
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("connect");
    ws.send(WsMessage::Text(format!("{{\"token\": \"{token}\"}}")))
        .await
        .expect("send auth");
    ws
}

async fn recv_message(ws: &mut WsClient) -> Message {
    loop {
        let frame = tokio::time::timeout(std::time::Duration::from_secs(5), ws.next())
            .await
            .expect("frame deadline")
            .expect("stream open")
            .expect("frame ok");
        match frame {
            WsMessage::Text(text) => return serde_json::from_str(&text).expect("decode"),
            WsMessage::Ping(_) | WsMessage::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

async fn recv_kind(ws: &mut WsClient, kind: &str) -> Message {
    loop {
        let msg = recv_message(ws).await;
        if msg.kind == kind {
            return msg;
        }
    }
}

#[tokio::test]
async fn snapshot_on_join_carries_current_sequence_and_all_tasks() {
    let store = Arc::new(Store::open_in_memory().expect("store"));
    let service = BoardService::new(store);
    for i in 0..5 {
        service.create_task(&format!("task {i}"), "").expect("seed");
    }
    let (server, shutdown) = start_server(service.clone()).await;

    // Drive the sequencer forward with a few accepted mutations first.
    let mut first = connect(server.local_addr, "tok-mira").await;
    recv_kind(&mut first, protocol::MSG_SYNC_FULL).await;
    for i in 0..3 {
        let msg = Message::new(
            protocol::MSG_TASK_CREATE,
            "",
            &protocol::TaskCreatePayload {
                title: format!("extra {i}"),
                description: String::new(),
            },
        )
        .unwrap();
        first
            .send(WsMessage::Text(serde_json::to_string(&msg).unwrap()))
            .await
            .expect("send");
        recv_kind(&mut first, protocol::MSG_TASK_CREATE).await;
    }

    // The first join's peer.join broadcast took seq 1; the creates took
    // 2, 3 and 4. The snapshot must carry the current sequence, 4.
    let mut second = connect(server.local_addr, "tok-lee").await;
    let sync = recv_message(&mut second).await;
    assert_eq!(sync.kind, protocol::MSG_SYNC_FULL);
    assert_eq!(sync.seq, 4, "snapshot must carry the current sequence");

    let tasks: Vec<Task> = sync.decode_payload().expect("tasks payload");
    assert_eq!(tasks.len(), 8);
    // Snapshot order is the board order: status first, then position.
    for pair in tasks.windows(2) {
        let ordered = (pair[0].status.as_str(), pair[0].position)
            <= (pair[1].status.as_str(), pair[1].position);
        assert!(ordered, "snapshot out of board order");
    }

    shutdown.send(true).expect("shutdown");
    server.wait().await;
}

#[tokio::test]
async fn concurrent_creates_get_distinct_sequences_and_rows() {
    let store = Arc::new(Store::open_in_memory().expect("store"));
    let service = BoardService::new(store);
    let (server, shutdown) = start_server(service.clone()).await;
    let addr = server.local_addr;

    const PER_PEER: usize = 40;
    let tokens = ["tok-mira", "tok-lee", "tok-ana"];

    // Connect every peer before the first create so each one observes the
    // complete broadcast stream.
    let mut connections = Vec::new();
    for token in tokens {
        let mut ws = connect(addr, token).await;
        recv_kind(&mut ws, protocol::MSG_SYNC_FULL).await;
        connections.push((token, ws));
    }

    let mut handles = Vec::new();
    for (token, mut ws) in connections {
        handles.push(tokio::spawn(async move {
            let mut seqs = Vec::new();
            for i in 0..PER_PEER {
                let msg = Message::new(
                    protocol::MSG_TASK_CREATE,
                    "",
                    &protocol::TaskCreatePayload {
                        title: format!("{token} {i}"),
                        description: String::new(),
                    },
                )
                .unwrap();
                ws.send(WsMessage::Text(serde_json::to_string(&msg).unwrap()))
                    .await
                    .expect("send");
            }
            // Collect every create broadcast (our own and the other peers').
            while seqs.len() < PER_PEER * 3 {
                let msg = recv_kind(&mut ws, protocol::MSG_TASK_CREATE).await;
                seqs.push(msg.seq);
            }
            seqs
        }));
    }

    let mut all_seqs: HashSet<i64> = HashSet::new();
    for handle in handles {
        let seqs = handle.await.expect("peer task");
        // Each peer observed every broadcast exactly once.
        assert_eq!(seqs.len(), PER_PEER * 3);
        all_seqs.extend(seqs);
    }

    assert_eq!(all_seqs.len(), PER_PEER * 3, "sequence numbers must be unique");
    assert_eq!(
        service.list_tasks().expect("list").len(),
        PER_PEER * 3,
        "store must hold exactly one row per accepted create"
    );

    shutdown.send(true).expect("shutdown");
    server.wait().await;
}

#[tokio::test]
async fn invalid_move_rejects_only_the_originator() {
    let store = Arc::new(Store::open_in_memory().expect("store"));
    let service = BoardService::new(store);
    let task = service.create_task("target", "").expect("seed");
    let (server, shutdown) = start_server(service).await;

    let mut sender = connect(server.local_addr, "tok-mira").await;
    recv_kind(&mut sender, protocol::MSG_SYNC_FULL).await;
    let mut observer = connect(server.local_addr, "tok-lee").await;
    recv_kind(&mut observer, protocol::MSG_SYNC_FULL).await;

    let msg = Message::new(
        protocol::MSG_TASK_MOVE,
        "",
        &protocol::TaskMovePayload {
            task_id: task.id.clone(),
            from_column: "backlog".to_string(),
            to_column: "warp_speed".to_string(),
        },
    )
    .unwrap();
    sender
        .send(WsMessage::Text(serde_json::to_string(&msg).unwrap()))
        .await
        .expect("send");

    let reject = recv_kind(&mut sender, protocol::MSG_SYNC_REJECT).await;
    let payload: protocol::SyncRejectPayload = reject.decode_payload().expect("reason");
    assert_eq!(payload.reason, "invalid status");
    assert_eq!(reject.seq, 0, "rejects carry no sequence");

    // The observer sees the valid move that follows, not the reject.
    let good = Message::new(
        protocol::MSG_TASK_MOVE,
        "",
        &protocol::TaskMovePayload {
            task_id: task.id.clone(),
            from_column: "backlog".to_string(),
            to_column: "planning".to_string(),
        },
    )
    .unwrap();
    sender
        .send(WsMessage::Text(serde_json::to_string(&good).unwrap()))
        .await
        .expect("send");
    // Two joins consumed seqs 1 and 2; the accepted move is 3.
    let seen = recv_kind(&mut observer, protocol::MSG_TASK_MOVE).await;
    assert_eq!(seen.seq, 3);
    assert_eq!(seen.sender, "mira");

    shutdown.send(true).expect("shutdown");
    server.wait().await;
}

#[tokio::test]
async fn claim_uses_authenticated_username() {
    let store = Arc::new(Store::open_in_memory().expect("store"));
    let service = BoardService::new(store);
    let task = service.create_task("claim me", "").expect("seed");
    let (server, shutdown) = start_server(service.clone()).await;

    let mut ws = connect(server.local_addr, "tok-mira").await;
    recv_kind(&mut ws, protocol::MSG_SYNC_FULL).await;

    let msg = Message::new(
        protocol::MSG_TASK_CLAIM,
        "",
        &protocol::TaskClaimPayload {
            task_id: task.id.clone(),
            assignee: "somebody-else".to_string(),
        },
    )
    .unwrap();
    ws.send(WsMessage::Text(serde_json::to_string(&msg).unwrap()))
        .await
        .expect("send");
    recv_kind(&mut ws, protocol::MSG_TASK_CLAIM).await;

    let task = service.get_task(&task.id).expect("get");
    assert_eq!(task.assignee, "mira");

    shutdown.send(true).expect("shutdown");
    server.wait().await;
}

#[tokio::test]
async fn bad_token_is_refused_with_error_frame() {
    let store = Arc::new(Store::open_in_memory().expect("store"));
    let (server, shutdown) = start_server(BoardService::new(store)).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", server.local_addr))
        .await
        .expect("connect");
    ws.send(WsMessage::Text("{\"token\": \"bogus\"}".to_string()))
        .await
        .expect("send auth");

    let frame = tokio::time::timeout(std::time::Duration::from_secs(5), ws.next())
        .await
        .expect("deadline")
        .expect("open")
        .expect("frame");
    match frame {
        WsMessage::Text(text) => assert!(text.contains("authentication failed")),
        other => panic!("unexpected frame: {other:?}"),
    }

    shutdown.send(true).expect("shutdown");
    server.wait().await;
}
