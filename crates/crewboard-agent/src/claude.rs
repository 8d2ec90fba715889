use crate::runner::{binary_on_path, AgentRunner, SpawnOpts};
use crate::spawn::shell_quote;
use crewboard_core::TaskStatus;
use std::fmt::Write;

/// Claude Code CLI. The working directory is passed with `-w` inside the
/// command, so the window itself starts in the project root.
pub struct ClaudeRunner;

impl AgentRunner for ClaudeRunner {
    fn id(&self) -> &'static str {
        "claude"
    }

    fn display_name(&self) -> &'static str {
        "Claude Code"
    }

    fn binary(&self) -> &'static str {
        "claude"
    }

    fn available(&self) -> bool {
        binary_on_path(self.binary())
    }

    fn build_command(&self, opts: &SpawnOpts) -> String {
        let system_prompt = stage_system_prompt(opts);
        let initial_prompt = stage_initial_prompt(opts.task.status);
        let skip_flag = if opts.task.skip_permissions {
            "--dangerously-skip-permissions "
        } else {
            ""
        };
        format!(
            "claude {skip_flag}-w {} --append-system-prompt {} {}",
            shell_quote(&opts.workdir),
            shell_quote(&system_prompt),
            shell_quote(&initial_prompt),
        )
    }

    fn build_enrichment_command(&self, opts: &SpawnOpts) -> Option<String> {
        let task = &opts.task;
        let prompt = format!(
            "Expand the description of board task {id}.\n\
             Title: {title}\n\
             Current description: {desc}\n\
             Research the codebase, then write a concrete description with acceptance \
             criteria and update the task:\n\
             crewboard task update {id} --description \"<expanded description>\"\n\
             Finally record the result:\n\
             crewboard task update {id} --enrichment done",
            id = task.short_id(),
            title = task.title,
            desc = if task.description.is_empty() {
                "(none)"
            } else {
                &task.description
            },
        );
        Some(format!("claude -p {}", shell_quote(&prompt)))
    }
}

fn stage_system_prompt(opts: &SpawnOpts) -> String {
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
            prompt.push_str("This task has not been picked up yet. Move it to brainstorm to begin:\n");
            let _ = writeln!(prompt, "  crewboard task move {short_id} brainstorm");
        }
        TaskStatus::Brainstorm => {
            prompt.push_str("STAGE: Brainstorm\n");
            prompt.push_str("Explore approaches for this task. When done, move to planning:\n");
            let _ = writeln!(prompt, "  crewboard task move {short_id} planning");
        }
        TaskStatus::Planning => {
            prompt.push_str("STAGE: Planning\n");
            prompt.push_str("Design the implementation. When the plan is ready, move on:\n");
            let _ = writeln!(prompt, "  crewboard task move {short_id} in_progress");
        }
        TaskStatus::InProgress => {
            prompt.push_str("STAGE: In Progress\n");
            prompt.push_str("Implement the plan. When a PR is open, move to review:\n");
            let _ = writeln!(prompt, "  crewboard task move {short_id} review");
        }
        TaskStatus::Review => {
            prompt.push_str("STAGE: Review\n");
            prompt.push_str("Address review feedback. When the PR is merged, move to done:\n");
            let _ = writeln!(prompt, "  crewboard task move {short_id} done");
        }
        TaskStatus::Done => {
            prompt.push_str("STAGE: Done\n");
            prompt.push_str("Verify the pull request is merged and clean up the worktree.\n");
        }
    }

    prompt.push_str("\nReport what you are doing as you work:\n");
    let _ = writeln!(prompt, "  crewboard agent status {short_id} \"<brief description>\"");
    prompt.push_str("If you need a fresh context for the next stage, run:\n");
    let _ = writeln!(prompt, "  crewboard agent request-reset {short_id}");

    prompt
}

fn stage_initial_prompt(status: TaskStatus) -> String {
    match status {
        TaskStatus::Backlog => "Review this task and move it to brainstorm when you pick it up.",
        TaskStatus::Brainstorm => "Brainstorm approaches for this task.",
        TaskStatus::Planning => "Create a detailed implementation plan for this task.",
        TaskStatus::InProgress => "Implement this task based on the plan.",
        TaskStatus::Review => "Address outstanding review feedback on the pull request.",
        TaskStatus::Done => "Verify the pull request is merged and clean up the worktree.",
    }
    .to_string()
}
