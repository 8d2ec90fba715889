//! Agent lifecycle: which CLI to run, how to start it in a managed window,
//! and the supervisor that reconciles task state with window liveness.

mod claude;
mod cursor;
mod runner;
mod spawn;
mod supervisor;

pub use claude::ClaudeRunner;
pub use cursor::CursorRunner;
pub use runner::{available_runners, get_runner, AgentRunner, SpawnOpts};
pub use spawn::{
    deactivate_loop_state, enrichment_window_name, kill, shell_quote, spawn, spawn_enrichment,
    task_slug, window_name, SpawnError,
};
pub use supervisor::{Supervisor, SupervisorConfig, SupervisorEvent};
