//! Board state and key handling. Rendering lives in `ui`; the async event
//! loop in `mod` owns the terminal and the background tasks.

use crate::tui::theme::Theme;
use crewboard_agent::{available_runners, get_runner, AgentRunner, SupervisorEvent};
use crewboard_core::protocol::{self, Message};
use crewboard_core::{AgentStatus, Comment, Suggestion, Task, TaskStatus, COLUMN_ORDER};
use crewboard_mux::WindowManager;
use crewboard_peer::BoardReducer;
use crewboard_store::BoardService;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

const NOTIFICATION_TTL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overlay {
    None,
    Form,
    Detail,
    Help,
    ConfirmDelete,
    AgentPicker,
    Suggestions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    Title,
    Description,
}

#[derive(Debug, Default)]
pub struct TaskForm {
    pub title: String,
    pub description: String,
    pub field: Option<FormField>,
}

impl TaskForm {
    pub fn reset(&mut self) {
        self.title.clear();
        self.description.clear();
        self.field = Some(FormField::Title);
    }
}

/// Column-major view of the task list with a cursor.
#[derive(Debug, Default)]
pub struct Kanban {
    pub columns: Vec<Vec<Task>>,
    pub focused: usize,
    pub selected: Vec<usize>,
}

impl Kanban {
    pub fn new() -> Self {
        Self {
            columns: vec![Vec::new(); COLUMN_ORDER.len()],
            focused: 0,
            selected: vec![0; COLUMN_ORDER.len()],
        }
    }

    pub fn load(&mut self, tasks: &[Task]) {
        for column in &mut self.columns {
            column.clear();
        }
        for task in tasks {
            self.columns[column_index(task.status)].push(task.clone());
        }
        for column in &mut self.columns {
            column.sort_by_key(|t| t.position);
        }
        for (idx, selected) in self.selected.iter_mut().enumerate() {
            let len = self.columns[idx].len();
            if *selected >= len {
                *selected = len.saturating_sub(1);
            }
        }
    }

    pub fn selected_task(&self) -> Option<&Task> {
        self.columns[self.focused].get(self.selected[self.focused])
    }

    pub fn focus_status(&mut self, status: TaskStatus) {
        self.focused = column_index(status);
    }

    pub fn select_task_by_id(&mut self, id: &str) {
        for (col, tasks) in self.columns.iter().enumerate() {
            if let Some(row) = tasks.iter().position(|t| t.id == id) {
                self.focused = col;
                self.selected[col] = row;
                return;
            }
        }
    }

    pub fn move_focus(&mut self, delta: i32) {
        let max = (self.columns.len() - 1) as i32;
        self.focused = (self.focused as i32 + delta).clamp(0, max) as usize;
    }

    pub fn move_selection(&mut self, delta: i32) {
        let len = self.columns[self.focused].len();
        if len == 0 {
            return;
        }
        let current = self.selected[self.focused] as i32;
        self.selected[self.focused] = (current + delta).clamp(0, len as i32 - 1) as usize;
    }
}

pub fn column_index(status: TaskStatus) -> usize {
    COLUMN_ORDER.iter().position(|s| *s == status).unwrap_or(0)
}

#[derive(Debug)]
pub struct Notification {
    pub text: String,
    pub expires: Instant,
}

/// Everything the detail overlay shows for one task.
#[derive(Debug)]
pub struct TaskDetail {
    pub task: Task,
    pub comments: Vec<Comment>,
    pub suggestions: Vec<Suggestion>,
    pub scroll: u16,
}

#[derive(Debug)]
pub enum RemoteEvent {
    Connected,
    Disconnected,
    Frame(Message),
}

/// Remote-mode handle: commands flow to the connection task, frames fold
/// into the reducer.
pub struct RemoteState {
    pub addr: String,
    pub username: String,
    pub connected: bool,
    pub reducer: BoardReducer,
    pub commands: mpsc::Sender<Message>,
}

pub enum Backend {
    Local(BoardService),
    Remote(RemoteState),
}

pub struct App {
    pub backend: Backend,
    pub board: Kanban,
    pub overlay: Overlay,
    pub form: TaskForm,
    pub detail: Option<TaskDetail>,
    pub suggestions: Vec<Suggestion>,
    pub suggestion_cursor: usize,
    pub picker_cursor: usize,
    pub runners: Vec<&'static dyn AgentRunner>,
    pub notification: Option<Notification>,
    pub theme: Theme,
    pub username: String,
    pub should_quit: bool,
    /// Attach command requested from the board; the event loop suspends the
    /// terminal and runs it.
    pub pending_attach: Option<std::process::Command>,
    mux: WindowManager,
}

impl App {
    pub fn new(backend: Backend, theme: Theme, username: String) -> Self {
        let mut app = Self {
            backend,
            board: Kanban::new(),
            overlay: Overlay::None,
            form: TaskForm::default(),
            detail: None,
            suggestions: Vec::new(),
            suggestion_cursor: 0,
            picker_cursor: 0,
            runners: available_runners(),
            notification: None,
            theme,
            username,
            should_quit: false,
            pending_attach: None,
            mux: WindowManager::new(),
        };
        app.reload();
        app
    }

    /// Clone of the local service handle, `None` in remote mode.
    fn service(&self) -> Option<BoardService> {
        match &self.backend {
            Backend::Local(service) => Some(service.clone()),
            Backend::Remote(_) => None,
        }
    }

    /// Command sender for remote mode, `None` locally.
    fn remote_commands(&self) -> Option<mpsc::Sender<Message>> {
        match &self.backend {
            Backend::Remote(remote) => Some(remote.commands.clone()),
            Backend::Local(_) => None,
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self.backend, Backend::Remote(_))
    }

    pub fn remote_status(&self) -> Option<(String, bool)> {
        match &self.backend {
            Backend::Remote(remote) => Some((remote.addr.clone(), remote.connected)),
            Backend::Local(_) => None,
        }
    }

    pub fn notify(&mut self, text: impl Into<String>) {
        self.notification = Some(Notification {
            text: text.into(),
            expires: Instant::now() + NOTIFICATION_TTL,
        });
    }

    pub fn expire_notification(&mut self) {
        if let Some(notification) = &self.notification {
            if Instant::now() >= notification.expires {
                self.notification = None;
            }
        }
    }

    /// Refresh the board from the authoritative side of the backend.
    pub fn reload(&mut self) {
        let loaded: Result<Vec<Task>, String> = match &self.backend {
            Backend::Local(service) => service.list_tasks().map_err(|err| err.to_string()),
            Backend::Remote(remote) => Ok(remote.reducer.tasks().to_vec()),
        };
        match loaded {
            Ok(tasks) => self.board.load(&tasks),
            Err(err) => self.notify(format!("Error: {err}")),
        }
    }

    pub fn on_supervisor_event(&mut self, event: SupervisorEvent) {
        let text = match event {
            SupervisorEvent::AgentCompleted { title, .. } => format!("Agent finished: {title}"),
            SupervisorEvent::AgentCrashed { title, .. } => format!("Agent crashed: {title}"),
            SupervisorEvent::AgentReset { title, .. } => {
                format!("Agent reset: {title} (ready for respawn)")
            }
            SupervisorEvent::AgentRespawned { title, column, .. } => {
                format!("Agent respawned for {column}: {title}")
            }
            SupervisorEvent::EnrichmentStarted { .. } => "Enrichment started".to_string(),
            SupervisorEvent::EnrichmentFailed { .. } => "Enrichment failed".to_string(),
            SupervisorEvent::EnrichmentSkipped { .. } => "Enrichment skipped".to_string(),
        };
        self.notify(text);
        self.reload();
    }

    pub fn on_remote_event(&mut self, event: RemoteEvent) {
        match event {
            RemoteEvent::Connected => {
                if let Backend::Remote(remote) = &mut self.backend {
                    remote.connected = true;
                }
                self.notify("Connected to hub");
            }
            RemoteEvent::Disconnected => {
                if let Backend::Remote(remote) = &mut self.backend {
                    remote.connected = false;
                }
                self.notify("Hub connection lost; queuing changes");
            }
            RemoteEvent::Frame(msg) => self.on_remote_frame(msg),
        }
    }

    fn on_remote_frame(&mut self, msg: Message) {
        let notice = match msg.kind.as_str() {
            protocol::MSG_SYNC_REJECT => msg
                .decode_payload::<protocol::SyncRejectPayload>()
                .ok()
                .map(|p| format!("Rejected: {}", p.reason)),
            protocol::MSG_PEER_JOIN => msg
                .decode_payload::<protocol::PeerPayload>()
                .ok()
                .map(|p| format!("{} joined", p.username)),
            protocol::MSG_PEER_LEAVE => msg
                .decode_payload::<protocol::PeerPayload>()
                .ok()
                .map(|p| format!("{} left", p.username)),
            _ => None,
        };

        let changed = match &mut self.backend {
            Backend::Remote(remote) => remote.reducer.apply(&msg),
            Backend::Local(_) => false,
        };
        if changed {
            self.reload();
        }
        if let Some(notice) = notice {
            self.notify(notice);
        }
    }

    pub fn handle_event(&mut self, event: Event) {
        if let Event::Key(key) = event {
            if key.kind == KeyEventKind::Press {
                self.handle_key(key);
            }
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        match self.overlay {
            Overlay::Form => self.handle_form_key(key),
            Overlay::Detail => self.handle_detail_key(key),
            Overlay::Help => self.overlay = Overlay::None,
            Overlay::ConfirmDelete => self.handle_confirm_key(key),
            Overlay::AgentPicker => self.handle_picker_key(key),
            Overlay::Suggestions => self.handle_suggestions_key(key),
            Overlay::None => self.handle_board_key(key),
        }
    }

    fn handle_board_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('?') => self.overlay = Overlay::Help,
            KeyCode::Left | KeyCode::Char('h') => self.board.move_focus(-1),
            KeyCode::Right | KeyCode::Char('l') => self.board.move_focus(1),
            KeyCode::Up | KeyCode::Char('k') => self.board.move_selection(-1),
            KeyCode::Down | KeyCode::Char('j') => self.board.move_selection(1),
            KeyCode::Char('n') => {
                self.form.reset();
                self.overlay = Overlay::Form;
            }
            KeyCode::Enter => self.open_detail(),
            KeyCode::Char(']') | KeyCode::Char('L') => self.move_selected(1),
            KeyCode::Char('[') | KeyCode::Char('H') => self.move_selected(-1),
            KeyCode::Char('c') => self.claim_selected(),
            KeyCode::Char('u') => self.unclaim_selected(),
            KeyCode::Char('d') => {
                if self.board.selected_task().is_some() {
                    self.overlay = Overlay::ConfirmDelete;
                }
            }
            KeyCode::Char('s') => self.spawn_selected(),
            KeyCode::Char('K') => self.kill_selected(),
            KeyCode::Char('v') => self.view_selected(),
            KeyCode::Char('r') => self.request_reset_selected(),
            KeyCode::Char('S') => self.open_suggestions(),
            _ => {}
        }
    }

    fn handle_form_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.overlay = Overlay::None;
                self.form.reset();
            }
            KeyCode::Tab => {
                self.form.field = Some(match self.form.field {
                    Some(FormField::Title) => FormField::Description,
                    _ => FormField::Title,
                });
            }
            KeyCode::Enter => self.submit_form(),
            KeyCode::Backspace => {
                match self.form.field {
                    Some(FormField::Description) => self.form.description.pop(),
                    _ => self.form.title.pop(),
                };
            }
            KeyCode::Char(c) => match self.form.field {
                Some(FormField::Description) => self.form.description.push(c),
                _ => self.form.title.push(c),
            },
            _ => {}
        }
    }

    fn handle_detail_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => {
                self.overlay = Overlay::None;
                self.detail = None;
            }
            KeyCode::Up | KeyCode::Char('k') => {
                if let Some(detail) = &mut self.detail {
                    detail.scroll = detail.scroll.saturating_sub(1);
                }
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if let Some(detail) = &mut self.detail {
                    detail.scroll = detail.scroll.saturating_add(1);
                }
            }
            _ => {}
        }
    }

    fn handle_confirm_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => {
                self.overlay = Overlay::None;
                self.delete_selected();
            }
            KeyCode::Esc | KeyCode::Char('n') | KeyCode::Char('N') => {
                self.overlay = Overlay::None;
            }
            _ => {}
        }
    }

    fn handle_picker_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => self.overlay = Overlay::None,
            KeyCode::Up | KeyCode::Char('k') => {
                self.picker_cursor = self.picker_cursor.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.picker_cursor + 1 < self.runners.len() {
                    self.picker_cursor += 1;
                }
            }
            KeyCode::Enter => {
                self.overlay = Overlay::None;
                if let Some(runner) = self.runners.get(self.picker_cursor).copied() {
                    let task = self.board.selected_task().cloned();
                    if let Some(task) = task {
                        self.spawn_task_with(&task, runner);
                    }
                }
            }
            _ => {}
        }
    }

    fn handle_suggestions_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => self.overlay = Overlay::None,
            KeyCode::Up | KeyCode::Char('k') => {
                self.suggestion_cursor = self.suggestion_cursor.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.suggestion_cursor + 1 < self.suggestions.len() {
                    self.suggestion_cursor += 1;
                }
            }
            KeyCode::Char('a') => self.resolve_suggestion(true),
            KeyCode::Char('x') => self.resolve_suggestion(false),
            _ => {}
        }
    }

    fn submit_form(&mut self) {
        let title = self.form.title.trim().to_string();
        if title.is_empty() {
            self.notify("Title must not be empty");
            return;
        }
        let description = self.form.description.trim().to_string();
        self.overlay = Overlay::None;
        self.form.reset();

        if let Some(service) = self.service() {
            match service.create_task(&title, &description) {
                Ok(task) => {
                    self.notify(format!("Created: {}", task.title));
                    self.reload();
                }
                Err(err) => self.notify(format!("Error: {err}")),
            }
        } else {
            self.send_remote(
                protocol::MSG_TASK_CREATE,
                &protocol::TaskCreatePayload { title, description },
            );
        }
    }

    fn move_selected(&mut self, delta: i32) {
        let Some(task) = self.board.selected_task().cloned() else {
            return;
        };
        let target = if delta > 0 {
            task.status.next()
        } else {
            task.status.prev()
        };
        if target == task.status {
            return;
        }

        if let Some(service) = self.service() {
            if let Err(err) = service.move_task(&task.id, target) {
                self.notify(format!("Error: {err}"));
                return;
            }
            // A stale terminal agent state should not follow the card into
            // its next column when no window is alive anymore.
            if (task.agent_status == AgentStatus::Completed
                || task.agent_status == AgentStatus::Error)
                && !self.mux.is_window_alive(&crewboard_agent::window_name(&task))
            {
                if let Ok(mut fresh) = service.get_task(&task.id) {
                    fresh.agent_status = AgentStatus::Idle;
                    fresh.agent_started_at = String::new();
                    fresh.agent_spawned_status = String::new();
                    fresh.reset_requested = false;
                    let _ = service.update_task(&fresh);
                }
            }
            self.reload();
            self.board.focus_status(target);
            self.board.select_task_by_id(&task.id);
            self.notify(format!("Moved to {target}"));
        } else {
            self.send_remote(
                protocol::MSG_TASK_MOVE,
                &protocol::TaskMovePayload {
                    task_id: task.id.clone(),
                    from_column: task.status.as_str().to_string(),
                    to_column: target.as_str().to_string(),
                },
            );
        }
    }

    fn claim_selected(&mut self) {
        let Some(task) = self.board.selected_task().cloned() else {
            return;
        };
        if let Some(service) = self.service() {
            if self.username.is_empty() {
                self.notify("Set user.github_username in config to claim tasks");
                return;
            }
            match service.claim_task(&task.id, &self.username) {
                Ok(()) => {
                    let username = self.username.clone();
                    self.reload();
                    self.board.focus_status(TaskStatus::Brainstorm);
                    self.board.select_task_by_id(&task.id);
                    self.notify(format!("Claimed by {username}"));
                }
                Err(err) => self.notify(format!("Error: {err}")),
            }
        } else {
            self.send_remote(
                protocol::MSG_TASK_CLAIM,
                &protocol::TaskClaimPayload {
                    task_id: task.id.clone(),
                    assignee: String::new(),
                },
            );
        }
    }

    fn unclaim_selected(&mut self) {
        let Some(task) = self.board.selected_task().cloned() else {
            return;
        };
        if let Some(service) = self.service() {
            match service.unclaim_task(&task.id) {
                Ok(()) => {
                    self.reload();
                    self.notify("Task unclaimed");
                }
                Err(err) => self.notify(format!("Error: {err}")),
            }
        } else {
            self.send_remote(
                protocol::MSG_TASK_UNCLAIM,
                &protocol::TaskUnclaimPayload {
                    task_id: task.id.clone(),
                },
            );
        }
    }

    fn delete_selected(&mut self) {
        let Some(task) = self.board.selected_task().cloned() else {
            return;
        };
        if let Some(service) = self.service() {
            if task.agent_status == AgentStatus::Active {
                self.mux.kill_window(&crewboard_agent::window_name(&task));
            }
            match service.delete_task(&task.id) {
                Ok(()) => {
                    self.reload();
                    self.notify("Task deleted");
                }
                Err(err) => self.notify(format!("Error: {err}")),
            }
        } else {
            self.send_remote(
                protocol::MSG_TASK_DELETE,
                &protocol::TaskDeletePayload {
                    task_id: task.id.clone(),
                },
            );
        }
    }

    fn spawn_selected(&mut self) {
        if self.is_remote() {
            self.notify("Agents run on the hub machine; not available remotely");
            return;
        }
        let Some(task) = self.board.selected_task().cloned() else {
            return;
        };
        // Prefer the runner the task used before.
        if !task.agent_name.is_empty() {
            if let Some(runner) = get_runner(&task.agent_name).filter(|r| r.available()) {
                self.spawn_task_with(&task, runner);
                return;
            }
        }
        match self.runners.len() {
            0 => self.notify("No agent CLIs detected on PATH"),
            1 => {
                let runner = self.runners[0];
                self.spawn_task_with(&task, runner);
            }
            _ => {
                self.picker_cursor = 0;
                self.overlay = Overlay::AgentPicker;
            }
        }
    }

    fn spawn_task_with(&mut self, task: &Task, runner: &'static dyn AgentRunner) {
        let Some(service) = self.service() else {
            return;
        };
        match crewboard_agent::spawn(&service, &self.mux, task, runner) {
            Ok(()) => {
                self.reload();
                self.notify(format!("{} spawned", runner.display_name()));
            }
            Err(err) => self.notify(format!("Error: {err}")),
        }
    }

    fn kill_selected(&mut self) {
        let Some(service) = self.service() else {
            self.notify("Agents run on the hub machine; not available remotely");
            return;
        };
        let Some(task) = self.board.selected_task().cloned() else {
            return;
        };
        match crewboard_agent::kill(&service, &self.mux, &task) {
            Ok(()) => {
                self.reload();
                self.notify("Agent killed");
            }
            Err(err) => self.notify(format!("Error: {err}")),
        }
    }

    fn view_selected(&mut self) {
        if self.is_remote() {
            self.notify("Agents run on the hub machine; not available remotely");
            return;
        }
        let Some(task) = self.board.selected_task() else {
            return;
        };
        let name = crewboard_agent::window_name(task);
        if !self.mux.is_window_alive(&name) {
            self.notify("No live agent window for this task");
            return;
        }
        if crewboard_mux::in_tmux() {
            if let Err(err) = self.mux.split_view(&name) {
                self.notify(format!("Split view: {err}"));
            }
        } else {
            // Full-screen attach; the event loop suspends the TUI around it.
            self.pending_attach = Some(self.mux.attach_command(&name));
        }
    }

    fn request_reset_selected(&mut self) {
        let Some(service) = self.service() else {
            self.notify("Not available remotely");
            return;
        };
        let Some(task) = self.board.selected_task().cloned() else {
            return;
        };
        let outcome = service.get_task(&task.id).and_then(|mut fresh| {
            fresh.reset_requested = true;
            service.update_task(&fresh)
        });
        match outcome {
            Ok(()) => self.notify("Reset requested; agent respawns after exit"),
            Err(err) => self.notify(format!("Error: {err}")),
        }
    }

    fn open_detail(&mut self) {
        let Some(task) = self.board.selected_task().cloned() else {
            return;
        };
        let (comments, suggestions, blocked_by) = match self.service() {
            Some(service) => (
                service.list_comments(&task.id).unwrap_or_default(),
                service.list_suggestions_by_task(&task.id).unwrap_or_default(),
                service.list_dependencies(&task.id).unwrap_or_default(),
            ),
            None => (Vec::new(), Vec::new(), task.blocked_by.clone()),
        };
        let mut task = task;
        task.blocked_by = blocked_by;
        self.detail = Some(TaskDetail {
            task,
            comments,
            suggestions,
            scroll: 0,
        });
        self.overlay = Overlay::Detail;
    }

    fn open_suggestions(&mut self) {
        let Some(service) = self.service() else {
            self.notify("Suggestions are managed on the hub machine");
            return;
        };
        match service.list_pending_suggestions() {
            Ok(suggestions) => {
                if suggestions.is_empty() {
                    self.notify("No pending suggestions");
                    return;
                }
                self.suggestions = suggestions;
                self.suggestion_cursor = 0;
                self.overlay = Overlay::Suggestions;
            }
            Err(err) => self.notify(format!("Error: {err}")),
        }
    }

    fn resolve_suggestion(&mut self, accept: bool) {
        let Some(service) = self.service() else {
            return;
        };
        let Some(suggestion) = self.suggestions.get(self.suggestion_cursor).cloned() else {
            return;
        };
        let outcome = if accept {
            service.accept_suggestion(&suggestion.id)
        } else {
            service.dismiss_suggestion(&suggestion.id)
        };
        match outcome {
            Ok(()) => {
                self.notify(if accept {
                    "Suggestion accepted"
                } else {
                    "Suggestion dismissed"
                });
                self.suggestions.remove(self.suggestion_cursor);
                if self.suggestion_cursor >= self.suggestions.len() {
                    self.suggestion_cursor = self.suggestions.len().saturating_sub(1);
                }
                if self.suggestions.is_empty() {
                    self.overlay = Overlay::None;
                }
                self.reload();
            }
            Err(err) => self.notify(format!("Error: {err}")),
        }
    }

    fn send_remote<P: serde::Serialize>(&mut self, kind: &str, payload: &P) {
        let username = self.username.clone();
        let Some(commands) = self.remote_commands() else {
            return;
        };
        match Message::new(kind, &username, payload) {
            Ok(msg) => {
                if commands.try_send(msg).is_err() {
                    self.notify("Hub command queue is full");
                }
            }
            Err(_) => self.notify("Failed to encode message"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crewboard_core::EnrichmentStatus;

    fn task(id: &str, status: TaskStatus, position: i64) -> Task {
        Task {
            id: id.to_string(),
            title: format!("task {id}"),
            description: String::new(),
            status,
            assignee: String::new(),
            branch_name: String::new(),
            pr_url: String::new(),
            pr_number: 0,
            agent_name: String::new(),
            agent_status: AgentStatus::Idle,
            agent_started_at: String::new(),
            agent_spawned_status: String::new(),
            reset_requested: false,
            skip_permissions: false,
            enrichment_status: EnrichmentStatus::None,
            enrichment_agent_name: String::new(),
            agent_activity: String::new(),
            position,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            blocked_by: Vec::new(),
        }
    }

    #[test]
    fn kanban_buckets_tasks_by_column_in_position_order() {
        let mut board = Kanban::new();
        board.load(&[
            task("b", TaskStatus::Backlog, 1),
            task("a", TaskStatus::Backlog, 0),
            task("c", TaskStatus::Review, 0),
        ]);
        assert_eq!(board.columns[column_index(TaskStatus::Backlog)].len(), 2);
        assert_eq!(board.columns[column_index(TaskStatus::Backlog)][0].id, "a");
        assert_eq!(board.columns[column_index(TaskStatus::Review)].len(), 1);
    }

    #[test]
    fn cursor_follows_a_task_across_columns() {
        let mut board = Kanban::new();
        board.load(&[
            task("a", TaskStatus::Backlog, 0),
            task("b", TaskStatus::Planning, 0),
        ]);
        board.select_task_by_id("b");
        assert_eq!(board.focused, column_index(TaskStatus::Planning));
        assert_eq!(board.selected_task().map(|t| t.id.as_str()), Some("b"));
    }

    #[test]
    fn selection_clamps_when_column_shrinks() {
        let mut board = Kanban::new();
        board.load(&[
            task("a", TaskStatus::Backlog, 0),
            task("b", TaskStatus::Backlog, 1),
        ]);
        board.move_selection(1);
        assert_eq!(board.selected[0], 1);
        board.load(&[task("a", TaskStatus::Backlog, 0)]);
        assert_eq!(board.selected[0], 0);
    }

    #[test]
    fn focus_stays_inside_the_board() {
        let mut board = Kanban::new();
        board.move_focus(-5);
        assert_eq!(board.focused, 0);
        board.move_focus(50);
        assert_eq!(board.focused, COLUMN_ORDER.len() - 1);
    }
}
