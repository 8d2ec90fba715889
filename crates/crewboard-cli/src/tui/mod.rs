//! The interactive board. Owns the terminal and drives three inputs into the
//! app: keyboard events, the supervisor's notifications (local mode), and
//! hub frames (remote mode).

mod app;
mod theme;
mod ui;

use crate::config;
use crate::util::db_path;
use anyhow::{Context, Result};
use app::{App, Backend, RemoteEvent, RemoteState};
use crewboard_agent::{Supervisor, SupervisorConfig, SupervisorEvent};
use crewboard_core::protocol::Message;
use crewboard_hub::GithubVerifier;
use crewboard_mux::WindowManager;
use crewboard_peer::{start_or_connect, BoardReducer, Connector, OfflineQueue, Role};
use crossterm::event::EventStream;
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use futures_util::StreamExt;
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use theme::Theme;
use tokio::sync::{mpsc, watch};
use tracing::warn;

const RENDER_TICK: Duration = Duration::from_millis(200);
const RELOAD_TICK: Duration = Duration::from_millis(2500);

pub async fn run(connect: Option<String>) -> Result<()> {
    let cfg = config::load();
    let theme = Theme::from_config(&cfg.theme);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut supervisor_events: Option<mpsc::Receiver<SupervisorEvent>> = None;
    let mut remote_events: Option<mpsc::Receiver<RemoteEvent>> = None;

    // A token is only needed when a hub is (or may be) on the other side.
    let base = std::path::Path::new(".");
    let needs_token =
        connect.is_some() || crewboard_peer::read_server_info_in(base).is_ok();
    let token = if needs_token {
        crate::auth::get_token().context("a GitHub token is required to join a hub")?
    } else {
        String::new()
    };

    let peer = start_or_connect(
        base,
        connect.as_deref(),
        &token,
        &db_path(),
        Arc::new(GithubVerifier::new()),
        shutdown_rx.clone(),
    )
    .await
    .context("resolving board topology")?;

    // The probe connection is dropped; the remote loop owns dialing so a
    // drop mid-session reconnects with backoff and an offline queue.
    drop(peer.connection);
    let leader_server = peer.server;

    let backend = match peer.role {
        Role::Leader => {
            let service = peer.service.expect("leader carries the store service");
            let (supervisor, events) = Supervisor::new(
                service.clone(),
                WindowManager::new(),
                SupervisorConfig::default(),
            );
            tokio::spawn(supervisor.run(shutdown_rx.clone()));
            supervisor_events = Some(events);
            Backend::Local(service)
        }
        Role::Client => {
            let (event_tx, event_rx) = mpsc::channel(256);
            let (cmd_tx, cmd_rx) = mpsc::channel(256);
            tokio::spawn(remote_loop(
                peer.server_addr.clone(),
                token,
                event_tx,
                cmd_rx,
                shutdown_rx.clone(),
            ));
            remote_events = Some(event_rx);

            Backend::Remote(RemoteState {
                addr: peer.server_addr.clone(),
                username: cfg.username.clone(),
                connected: false,
                reducer: BoardReducer::new(),
                commands: cmd_tx,
            })
        }
    };

    let mut app = App::new(backend, theme, cfg.username);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let outcome = event_loop(
        &mut terminal,
        &mut app,
        &mut supervisor_events,
        &mut remote_events,
    )
    .await;

    let _ = shutdown_tx.send(true);
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Some(server) = leader_server {
        let _ = crewboard_peer::remove_server_info_in(base);
        server.wait().await;
    }

    outcome
}

async fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    supervisor_events: &mut Option<mpsc::Receiver<SupervisorEvent>>,
    remote_events: &mut Option<mpsc::Receiver<RemoteEvent>>,
) -> Result<()> {
    let mut events = EventStream::new();
    let mut render = tokio::time::interval(RENDER_TICK);
    let mut reload = tokio::time::interval(RELOAD_TICK);

    loop {
        terminal.draw(|frame| ui::render(frame, app))?;

        tokio::select! {
            _ = render.tick() => app.expire_notification(),
            _ = reload.tick() => app.reload(),
            maybe_event = events.next() => {
                match maybe_event {
                    Some(Ok(event)) => app.handle_event(event),
                    Some(Err(err)) => warn!(event = "terminal_event_error", error = %err),
                    None => break,
                }
            }
            event = recv_opt(supervisor_events) => {
                if let Some(event) = event {
                    app.on_supervisor_event(event);
                }
            }
            event = recv_opt(remote_events) => {
                if let Some(event) = event {
                    app.on_remote_event(event);
                }
            }
        }

        // A requested attach suspends the TUI, hands the terminal to tmux,
        // and resumes when the user detaches.
        if let Some(mut attach) = app.pending_attach.take() {
            disable_raw_mode()?;
            execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
            let status = attach.status();
            enable_raw_mode()?;
            execute!(terminal.backend_mut(), EnterAlternateScreen)?;
            terminal.clear()?;
            if let Err(err) = status {
                app.notify(format!("Attach failed: {err}"));
            }
            app.reload();
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}

/// Awaitable over an optional receiver: pends forever when absent, so the
/// select arm simply never fires in the other mode.
async fn recv_opt<T>(rx: &mut Option<mpsc::Receiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Remote-mode connection task: dial with backoff, replay whatever queued
/// up while offline, pump frames in and commands out, and start over when
/// the link drops.
async fn remote_loop(
    addr: String,
    token: String,
    events: mpsc::Sender<RemoteEvent>,
    mut commands: mpsc::Receiver<Message>,
    mut shutdown: watch::Receiver<bool>,
) {
    let connector = Connector::new(addr, token);
    let queue = OfflineQueue::new();

    loop {
        let shutdown_clone = shutdown.clone();
        let mut conn = tokio::select! {
            _ = shutdown.changed() => return,
            conn = connector.connect_with_retry(u32::MAX, shutdown_clone) => {
                match conn {
                    Ok(conn) => conn,
                    Err(_) => return,
                }
            }
        };

        let _ = events.send(RemoteEvent::Connected).await;
        conn.replay(&queue);

        loop {
            tokio::select! {
                _ = shutdown.changed() => return,
                frame = conn.incoming.recv() => {
                    match frame {
                        Some(msg) => {
                            if events.send(RemoteEvent::Frame(msg)).await.is_err() {
                                return;
                            }
                        }
                        None => break,
                    }
                }
                cmd = commands.recv() => {
                    let Some(cmd) = cmd else { return };
                    if conn.send(cmd.clone()).is_err() {
                        // Link just dropped; keep the command for replay.
                        queue.enqueue(cmd);
                        break;
                    }
                }
            }
        }

        let _ = events.send(RemoteEvent::Disconnected).await;

        // While reconnecting, keep accepting commands into the queue.
        loop {
            tokio::select! {
                _ = shutdown.changed() => return,
                cmd = commands.recv() => {
                    match cmd {
                        Some(cmd) => queue.enqueue(cmd),
                        None => return,
                    }
                }
                _ = tokio::time::sleep(Duration::from_millis(100)) => break,
            }
        }
    }
}
