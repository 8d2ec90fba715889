use crate::{ClaudeRunner, CursorRunner};
use crewboard_core::Task;
use std::path::Path;

/// Context handed to a runner when building its launch command.
#[derive(Debug, Clone)]
pub struct SpawnOpts {
    /// Working directory for the agent, usually the task's worktree slug.
    pub workdir: String,
    pub task: Task,
}

/// An AI coding CLI the board can drive. Implementations decide how the
/// stage prompt and working directory are passed to the binary.
pub trait AgentRunner: Send + Sync {
    /// Canonical identifier persisted in `agent_name` (e.g. "claude").
    fn id(&self) -> &'static str;
    /// Human-facing name for pickers.
    fn display_name(&self) -> &'static str;
    /// Executable looked up on PATH.
    fn binary(&self) -> &'static str;
    /// Detected and usable on this machine?
    fn available(&self) -> bool;
    /// Full shell command for working a task at its current column.
    fn build_command(&self, opts: &SpawnOpts) -> String;
    /// Command for a short-lived description-enrichment pass, or `None` when
    /// the runner does not support enrichment.
    fn build_enrichment_command(&self, opts: &SpawnOpts) -> Option<String>;
}

static CLAUDE: ClaudeRunner = ClaudeRunner;
static CURSOR: CursorRunner = CursorRunner;

static RUNNERS: [&(dyn AgentRunner); 2] = [&CLAUDE, &CURSOR];

/// Look a runner up by its canonical id, regardless of availability.
pub fn get_runner(id: &str) -> Option<&'static dyn AgentRunner> {
    RUNNERS.iter().copied().find(|r| r.id() == id)
}

/// Runners whose CLI is detected on this machine.
pub fn available_runners() -> Vec<&'static dyn AgentRunner> {
    RUNNERS.iter().copied().filter(|r| r.available()).collect()
}

/// PATH probe shared by the runners.
pub(crate) fn binary_on_path(name: &str) -> bool {
    let Some(path) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&path).any(|dir| is_executable(&dir.join(name)))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runner_lookup_by_id() {
        assert_eq!(get_runner("claude").map(|r| r.id()), Some("claude"));
        assert_eq!(get_runner("cursor").map(|r| r.id()), Some("cursor"));
        assert!(get_runner("vim").is_none());
    }

    #[test]
    fn path_probe_finds_a_shell() {
        // Practically every test environment has sh on PATH.
        assert!(binary_on_path("sh"));
        assert!(!binary_on_path("definitely-not-a-real-binary-name"));
    }
}
