//! Shells out to tmux for agent window management. Everything targets a
//! dedicated control socket (`-L crewboard`) so user sessions and agent
//! windows cannot close each other, and one named session holds every agent
//! window.

use std::collections::HashSet;
use std::process::Command;
use thiserror::Error;
use tracing::debug;

/// Socket name passed to every tmux invocation via `-L`.
pub const SOCKET: &str = "crewboard";

/// The single session holding all agent windows.
pub const SESSION: &str = "crewboard";

const CAPTURE_LINES: u32 = 500;

#[derive(Debug, Error)]
pub enum MuxError {
    #[error("tmux not runnable: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("tmux {command} failed: {detail}")]
    Command { command: &'static str, detail: String },
}

pub type Result<T> = std::result::Result<T, MuxError>;

/// Strip anything outside `[A-Za-z0-9_-]` from a window name.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// True when the current process already runs inside tmux.
pub fn in_tmux() -> bool {
    std::env::var_os("TMUX").is_some_and(|v| !v.is_empty())
}

#[derive(Debug, Clone, Default)]
pub struct WindowManager;

impl WindowManager {
    pub fn new() -> Self {
        Self
    }

    /// Create the control session if it does not exist. Also binds C-q to
    /// detach so an attached agent pane can be left without the prefix key.
    pub fn ensure_session(&self) -> Result<()> {
        let alive = Command::new("tmux")
            .args(["-L", SOCKET, "has-session", "-t", SESSION])
            .status()?;
        if alive.success() {
            return Ok(());
        }

        let created = Command::new("tmux")
            .args(["-L", SOCKET, "new-session", "-d", "-s", SESSION])
            .status()?;
        if !created.success() {
            return Err(MuxError::Command {
                command: "new-session",
                detail: format!("exit status {created}"),
            });
        }
        let _ = Command::new("tmux")
            .args(["-L", SOCKET, "bind", "-n", "C-q", "detach-client"])
            .status();
        debug!(event = "mux_session_created", session = SESSION);
        Ok(())
    }

    /// Launch `command` in a named window of the control session. `dir` may
    /// be empty when the command manages its own working directory.
    pub fn new_window(&self, name: &str, dir: &str, command: &str) -> Result<()> {
        let safe = sanitize_name(name);
        let mut args: Vec<&str> = vec!["-L", SOCKET, "new-window", "-t", SESSION, "-n", &safe];
        if !dir.is_empty() {
            args.push("-c");
            args.push(dir);
        }
        args.push(command);

        let status = Command::new("tmux").args(&args).status()?;
        if !status.success() {
            return Err(MuxError::Command {
                command: "new-window",
                detail: format!("window {safe}: exit status {status}"),
            });
        }
        debug!(event = "mux_window_created", window = %safe);
        Ok(())
    }

    /// Kill a window by name. Best-effort: a missing window or a dead tmux
    /// is not an error.
    pub fn kill_window(&self, name: &str) {
        let safe = sanitize_name(name);
        let target = format!("{SESSION}:{safe}");
        let _ = Command::new("tmux")
            .args(["-L", SOCKET, "kill-window", "-t", &target])
            .status();
    }

    /// Names of live windows in the control session. An empty set on any
    /// failure: a dead multiplexer is indistinguishable from no agents.
    pub fn list_windows(&self) -> HashSet<String> {
        let output = Command::new("tmux")
            .args(["-L", SOCKET, "list-windows", "-t", SESSION, "-F", "#{window_name}"])
            .output();
        let Ok(output) = output else {
            return HashSet::new();
        };
        if !output.status.success() {
            return HashSet::new();
        }
        String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn is_window_alive(&self, name: &str) -> bool {
        self.list_windows().contains(name)
    }

    /// Last `CAPTURE_LINES` lines of a window's active pane.
    pub fn capture_pane(&self, name: &str) -> Result<String> {
        let safe = sanitize_name(name);
        let target = format!("{SESSION}:{safe}");
        let output = Command::new("tmux")
            .args([
                "-L",
                SOCKET,
                "capture-pane",
                "-t",
                &target,
                "-p",
                "-S",
                &format!("-{CAPTURE_LINES}"),
            ])
            .output()?;
        if !output.status.success() {
            return Err(MuxError::Command {
                command: "capture-pane",
                detail: format!("window {safe}: exit status {}", output.status),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Split the caller's tmux pane horizontally and attach to the control
    /// session with `name` focused. Requires the caller to be inside tmux.
    pub fn split_view(&self, name: &str) -> Result<()> {
        let safe = sanitize_name(name);
        let target = format!("{SESSION}:{safe}");
        let _ = Command::new("tmux")
            .args(["-L", SOCKET, "select-window", "-t", &target])
            .status();
        let attach = format!("tmux -L {SOCKET} attach-session -t {SESSION}");
        let status = Command::new("tmux")
            .args(["split-window", "-h", "-l", "50%", &attach])
            .status()?;
        if !status.success() {
            return Err(MuxError::Command {
                command: "split-window",
                detail: format!("exit status {status}"),
            });
        }
        Ok(())
    }

    /// Command that attaches full-screen to the control session with `name`
    /// focused; the TUI runs this as a subprocess and resumes afterwards.
    pub fn attach_command(&self, name: &str) -> Command {
        let safe = sanitize_name(name);
        let target = format!("{SESSION}:{safe}");
        let mut cmd = Command::new("tmux");
        cmd.args([
            "-L",
            SOCKET,
            "select-window",
            "-t",
            &target,
            ";",
            "attach-session",
            "-t",
            SESSION,
        ]);
        cmd
    }
}
