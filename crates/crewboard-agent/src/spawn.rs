//! Spawning and killing agent windows, and the couple of filesystem touches
//! that go with a respawn.

use crate::runner::{AgentRunner, SpawnOpts};
use chrono::Utc;
use crewboard_core::{AgentStatus, EnrichmentStatus, Task, TaskPatch};
use crewboard_mux::WindowManager;
use crewboard_store::BoardService;
use thiserror::Error;
use tracing::info;

const MAX_SLUG_LEN: usize = 50;

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("multiplexer: {0}")]
    Mux(#[from] crewboard_mux::MuxError),
    #[error("store: {0}")]
    Store(#[from] crewboard_store::StoreError),
    #[error("runner {0} does not support enrichment")]
    EnrichmentUnsupported(String),
}

/// Window name a task's work agent runs under: fixed prefix plus the first
/// eight id characters. One task, one window.
pub fn window_name(task: &Task) -> String {
    format!("agent-{}", task.short_id())
}

/// Window name for a task's enrichment agent, kept apart from the work
/// agent's window.
pub fn enrichment_window_name(task: &Task) -> String {
    format!("enrich-{}", task.short_id())
}

/// Filesystem-safe slug derived from a task title, used as the worktree
/// directory name. Lowercase, runs of non-alphanumerics collapsed to a
/// single dash, at most 50 characters.
pub fn task_slug(title: &str) -> String {
    let mut slug = String::new();
    let mut last_dash = true;
    for c in title.trim().to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
        if slug.len() >= MAX_SLUG_LEN {
            break;
        }
    }
    let slug = slug.trim_matches('-').to_string();
    if slug.is_empty() {
        "task".to_string()
    } else {
        slug
    }
}

/// Single-quote `s` for the shell, escaping embedded quotes.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\"'\"'"))
}

/// Launch an agent for `task` in a managed window, then record the spawn on
/// the task: runner id, active status, the column the agent was spawned
/// into, and the start time. A failed record kills the window again so no
/// ghost agent survives.
pub fn spawn(
    service: &BoardService,
    mux: &WindowManager,
    task: &Task,
    runner: &dyn AgentRunner,
) -> Result<(), SpawnError> {
    mux.ensure_session()?;

    let slug = task_slug(&task.title);
    let win_name = window_name(task);

    // Handles respawn: any previous window for this task goes away first.
    mux.kill_window(&win_name);

    let opts = SpawnOpts {
        workdir: slug.clone(),
        task: task.clone(),
    };
    let command = runner.build_command(&opts);

    // Claude receives its working directory as a flag; other runners start
    // in the worktree via the window's own cwd.
    let window_dir = if runner.id() == "claude" { "" } else { slug.as_str() };
    mux.new_window(&win_name, window_dir, &command)?;

    let mut updated = task.clone();
    updated.agent_name = runner.id().to_string();
    updated.agent_status = AgentStatus::Active;
    updated.agent_spawned_status = task.status.as_str().to_string();
    updated.agent_started_at = Utc::now().to_rfc3339();
    if let Err(err) = service.update_task(&updated) {
        mux.kill_window(&win_name);
        return Err(err.into());
    }

    info!(event = "agent_spawned", task = %task.short_id(), runner = runner.id(), column = %task.status);
    Ok(())
}

/// Launch a short-lived enrichment agent. Unlike [`spawn`] this never
/// touches the work agent's fields; only the enrichment columns move, via a
/// partial update so concurrent edits survive.
pub fn spawn_enrichment(
    service: &BoardService,
    mux: &WindowManager,
    task: &Task,
    runner: &dyn AgentRunner,
) -> Result<(), SpawnError> {
    let opts = SpawnOpts {
        workdir: ".".to_string(),
        task: task.clone(),
    };
    let Some(command) = runner.build_enrichment_command(&opts) else {
        return Err(SpawnError::EnrichmentUnsupported(runner.id().to_string()));
    };

    mux.ensure_session()?;

    let win_name = enrichment_window_name(task);
    mux.kill_window(&win_name);
    mux.new_window(&win_name, ".", &command)?;

    let patch = TaskPatch {
        enrichment_status: Some(EnrichmentStatus::Enriching),
        enrichment_agent_name: Some(runner.id().to_string()),
        ..Default::default()
    };
    if let Err(err) = service.update_task_fields(&task.id, &patch) {
        mux.kill_window(&win_name);
        return Err(err.into());
    }

    info!(event = "enrichment_spawned", task = %task.short_id(), runner = runner.id());
    Ok(())
}

/// Kill a task's agent window and mark the agent idle. `agent_name` is kept
/// so the next spawn reuses the same runner.
pub fn kill(service: &BoardService, mux: &WindowManager, task: &Task) -> Result<(), SpawnError> {
    mux.kill_window(&window_name(task));

    let mut updated = task.clone();
    updated.agent_status = AgentStatus::Idle;
    service.update_task(&updated)?;

    info!(event = "agent_killed", task = %task.short_id());
    Ok(())
}

/// Flip `active: true` to `active: false` in the task worktree's loop-state
/// sidecar, so a respawned agent runs a single pass instead of resuming a
/// loop. Missing file means nothing to deactivate.
pub fn deactivate_loop_state(task: &Task) -> std::io::Result<()> {
    deactivate_loop_state_in(std::path::Path::new("."), task)
}

pub(crate) fn deactivate_loop_state_in(
    base: &std::path::Path,
    task: &Task,
) -> std::io::Result<()> {
    let path = base
        .join(task_slug(&task.title))
        .join(".crewboard")
        .join("loop-state.md");
    let Ok(data) = std::fs::read_to_string(&path) else {
        return Ok(());
    };
    let updated = data.replacen("active: true", "active: false", 1);
    std::fs::write(&path, updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crewboard_core::TaskStatus;

    fn task_titled(title: &str) -> Task {
        Task {
            id: "0123456789abcdef".to_string(),
            title: title.to_string(),
            description: String::new(),
            status: TaskStatus::Backlog,
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
            position: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            blocked_by: Vec::new(),
        }
    }

    #[test]
    fn window_names_derive_from_short_id() {
        let task = task_titled("anything");
        assert_eq!(window_name(&task), "agent-01234567");
        assert_eq!(enrichment_window_name(&task), "enrich-01234567");
    }

    #[test]
    fn slug_normalizes_titles() {
        assert_eq!(task_slug("Add hub metrics"), "add-hub-metrics");
        assert_eq!(task_slug("  Fix: WAL / busy_timeout!  "), "fix-wal-busy-timeout");
        assert_eq!(task_slug("___"), "task");
        assert_eq!(task_slug(""), "task");

        let long = "x".repeat(80);
        assert!(task_slug(&long).len() <= MAX_SLUG_LEN);
    }

    #[test]
    fn shell_quote_wraps_and_escapes() {
        assert_eq!(shell_quote("plain"), "'plain'");
        assert_eq!(shell_quote("it's"), "'it'\"'\"'s'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn deactivate_loop_state_flips_the_flag_once() {
        let dir = tempfile::tempdir().expect("tempdir");

        let task = task_titled("loop task");
        let state_dir = dir.path().join("loop-task").join(".crewboard");
        std::fs::create_dir_all(&state_dir).expect("mkdir");
        let state_file = state_dir.join("loop-state.md");
        std::fs::write(&state_file, "active: true\nrounds: 3\nactive: true\n").expect("write");

        deactivate_loop_state_in(dir.path(), &task).expect("deactivate");
        let data = std::fs::read_to_string(&state_file).expect("read");
        assert!(data.starts_with("active: false"));
        assert!(data.ends_with("active: true\n"), "only the first flag flips");

        // Missing file is a no-op, not an error.
        let other = task_titled("no loop here");
        deactivate_loop_state_in(dir.path(), &other).expect("missing file ok");
    }
}
