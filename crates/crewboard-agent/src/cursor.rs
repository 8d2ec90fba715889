use crate::runner::{binary_on_path, AgentRunner, SpawnOpts};
use crate::spawn::shell_quote;
use crewboard_core::TaskStatus;
use std::fmt::Write;
use std::process::Command;

/// Cursor CLI, shipped as an `agent` binary. The generic name makes the PATH
/// probe ambiguous, so availability additionally checks the version banner.
pub struct CursorRunner;

impl AgentRunner for CursorRunner {
    fn id(&self) -> &'static str {
        "cursor"
    }

    fn display_name(&self) -> &'static str {
        "Cursor"
    }

    fn binary(&self) -> &'static str {
        "agent"
    }

    fn available(&self) -> bool {
        if !binary_on_path(self.binary()) {
            return false;
        }
        version_banner_mentions_cursor(self.binary())
    }

    fn build_command(&self, opts: &SpawnOpts) -> String {
        format!("agent {}", shell_quote(&stage_prompt(opts)))
    }

    fn build_enrichment_command(&self, _opts: &SpawnOpts) -> Option<String> {
        None
    }
}

fn version_banner_mentions_cursor(binary: &str) -> bool {
    Command::new(binary)
        .arg("--version")
        .output()
        .map(|out| {
            String::from_utf8_lossy(&out.stdout)
                .to_lowercase()
                .contains("cursor")
        })
        .unwrap_or(false)
}

fn stage_prompt(opts: &SpawnOpts) -> String {
    let task = &opts.task;
    let short_id = task.short_id();

    let mut prompt = String::new();
    prompt.push_str("You are working on a crewboard task.\n");
    let _ = writeln!(prompt, "Task: {}  |  ID: {}", task.title, short_id);
    if !task.description.is_empty() {
        let _ = writeln!(prompt, "Description: {}", task.description);
    }
    prompt.push('\n');

    match task.status {
        TaskStatus::Backlog => {
            prompt.push_str("STAGE: Backlog\n");
            let _ = writeln!(prompt, "Pick the task up:\n  crewboard task move {short_id} brainstorm");
        }
        TaskStatus::Brainstorm => {
            prompt.push_str("STAGE: Brainstorm\n");
            let _ = writeln!(
                prompt,
                "Explore approaches. When done:\n  crewboard task move {short_id} planning"
            );
        }
        TaskStatus::Planning => {
            prompt.push_str("STAGE: Planning\n");
            let _ = writeln!(
                prompt,
                "Design the implementation. When ready:\n  crewboard task move {short_id} in_progress"
            );
        }
        TaskStatus::InProgress => {
            prompt.push_str("STAGE: In Progress\n");
            let _ = writeln!(
                prompt,
                "Implement the plan. When a PR is open:\n  crewboard task move {short_id} review"
            );
        }
        TaskStatus::Review => {
            prompt.push_str("STAGE: Review\n");
            let _ = writeln!(
                prompt,
                "Address review feedback. When merged:\n  crewboard task move {short_id} done"
            );
        }
        TaskStatus::Done => {
            prompt.push_str("STAGE: Done\n");
            prompt.push_str("Verify the pull request is merged and clean up the worktree.\n");
        }
    }

    prompt.push_str("\nTASK METADATA:\n");
    let _ = writeln!(prompt, "  crewboard task update {short_id} --branch \"<branch-name>\"");
    let _ = writeln!(prompt, "  crewboard task update {short_id} --pr-url \"<url>\"");
    prompt.push_str("\nDEPENDENCIES:\n");
    let _ = writeln!(prompt, "  crewboard task block {short_id} <blocker-id>");
    let _ = writeln!(prompt, "  crewboard task unblock {short_id} <blocker-id>");
    prompt.push_str("\nACTIVITY REPORTING:\n");
    let _ = writeln!(prompt, "  crewboard agent status {short_id} \"<brief description>\"");

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crewboard_core::{AgentStatus, EnrichmentStatus, Task};

    fn task_in(status: TaskStatus) -> Task {
        Task {
            id: "abcdef1234567890".to_string(),
            title: "Port the poller".to_string(),
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
            position: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            blocked_by: Vec::new(),
        }
    }

    #[test]
    fn command_wraps_the_prompt() {
        let cmd = CursorRunner.build_command(&SpawnOpts {
            workdir: "w".to_string(),
            task: task_in(TaskStatus::Brainstorm),
        });
        assert!(cmd.starts_with("agent '"));
        assert!(cmd.contains("STAGE: Brainstorm"));
        assert!(cmd.contains("crewboard task move abcdef12 planning"));
        assert!(cmd.contains("ACTIVITY REPORTING"));
    }

    #[test]
    fn enrichment_is_unsupported() {
        assert!(CursorRunner
            .build_enrichment_command(&SpawnOpts {
                workdir: ".".to_string(),
                task: task_in(TaskStatus::Backlog),
            })
            .is_none());
    }
}
