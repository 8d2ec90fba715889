use crate::config;
use crate::util::{open_service, resolve_task_id};
use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use crewboard_core::{SuggestionStatus, SuggestionType, Task, TaskPatch, TaskStatus};
use serde_json::json;

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
pub enum TaskCommand {
    List(TaskListArgs),
    Get(TaskTargetArgs),
    Create(TaskCreateArgs),
    Move(TaskMoveArgs),
    Update(TaskUpdateArgs),
    Delete(TaskTargetArgs),
    Claim(TaskClaimArgs),
    Unclaim(TaskTargetArgs),
    Comment(TaskCommentArgs),
    Block(TaskEdgeArgs),
    Unblock(TaskEdgeArgs),
    Suggest(TaskSuggestArgs),
    Propose(TaskProposeArgs),
    Suggestions(SuggestionListArgs),
    Suggestion {
        #[command(subcommand)]
        action: SuggestionCommand,
    },
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
pub enum SuggestionCommand {
    Accept(SuggestionTargetArgs),
    Dismiss(SuggestionTargetArgs),
}

#[derive(Args, Debug)]
pub struct TaskListArgs {
    #[arg(long)]
    pub status: Option<TaskStatus>,
    #[arg(long)]
    pub assignee: Option<String>,
    #[arg(long)]
    pub search: Option<String>,
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct TaskTargetArgs {
    pub id: String,
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct TaskCreateArgs {
    pub title: String,
    #[arg(long, alias = "desc")]
    pub description: Option<String>,
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct TaskMoveArgs {
    pub id: String,
    pub column: TaskStatus,
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct TaskUpdateArgs {
    pub id: String,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long, alias = "desc")]
    pub description: Option<String>,
    #[arg(long)]
    pub assignee: Option<String>,
    #[arg(long)]
    pub branch: Option<String>,
    #[arg(long)]
    pub pr_url: Option<String>,
    #[arg(long)]
    pub pr_number: Option<i64>,
    #[arg(long)]
    pub enrichment: Option<crewboard_core::EnrichmentStatus>,
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct TaskClaimArgs {
    pub id: String,
    #[arg(long)]
    pub assignee: Option<String>,
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct TaskCommentArgs {
    pub id: String,
    pub body: String,
    #[arg(long)]
    pub author: Option<String>,
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct TaskEdgeArgs {
    pub id: String,
    pub blocker_id: String,
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct TaskSuggestArgs {
    pub id: String,
    pub title: String,
    #[arg(long, default_value = "")]
    pub message: String,
    #[arg(long, default_value = "hint")]
    pub kind: String,
    #[arg(long)]
    pub author: Option<String>,
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct TaskProposeArgs {
    pub title: String,
    #[arg(long, default_value = "")]
    pub message: String,
    #[arg(long)]
    pub author: Option<String>,
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct SuggestionListArgs {
    #[arg(long, default_value = "pending")]
    pub status: String,
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct SuggestionTargetArgs {
    pub id: String,
    #[arg(long)]
    pub json: bool,
}

pub fn run(command: TaskCommand) -> Result<()> {
    let service = open_service()?;
    let cfg = config::load();

    match command {
        TaskCommand::List(args) => {
            let mut tasks = service.list_tasks()?;
            if let Some(status) = args.status {
                tasks.retain(|t| t.status == status);
            }
            if let Some(assignee) = &args.assignee {
                tasks.retain(|t| &t.assignee == assignee);
            }
            if let Some(search) = &args.search {
                tasks = filter_tasks_by_search(tasks, search);
            }
            if args.json {
                println!("{}", serde_json::to_string_pretty(&tasks)?);
            } else {
                print_task_table(&tasks);
            }
        }
        TaskCommand::Get(args) => {
            let id = resolve_task_id(&service, &args.id)?;
            let mut task = service.get_task(&id)?;
            task.blocked_by = service.list_dependencies(&id)?;
            let comments = service.list_comments(&id)?;
            if args.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({
                        "task": task,
                        "comments": comments,
                    }))?
                );
            } else {
                print_task_detail(&task);
                if !comments.is_empty() {
                    println!("\nComments:");
                    for comment in comments {
                        println!(
                            "  [{}] {}: {}",
                            comment.created_at.format("%Y-%m-%d %H:%M"),
                            comment.author,
                            comment.body
                        );
                    }
                }
            }
        }
        TaskCommand::Create(args) => {
            let task = service.create_task(&args.title, args.description.as_deref().unwrap_or(""))?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&task)?);
            } else {
                println!("Created {}: {}", task.short_id(), task.title);
            }
        }
        TaskCommand::Move(args) => {
            let id = resolve_task_id(&service, &args.id)?;
            service.move_task(&id, args.column)?;
            if args.json {
                println!("{}", json!({"task_id": id, "status": args.column}));
            } else {
                println!("Moved {} to {}", &id[..8], args.column);
            }
        }
        TaskCommand::Update(args) => {
            let id = resolve_task_id(&service, &args.id)?;
            let patch = TaskPatch {
                title: args.title,
                description: args.description,
                assignee: args.assignee,
                branch_name: args.branch,
                pr_url: args.pr_url,
                pr_number: args.pr_number,
                enrichment_status: args.enrichment,
                ..Default::default()
            };
            if patch.is_empty() {
                bail!("nothing to update; pass at least one field flag");
            }
            service.update_task_fields(&id, &patch)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&service.get_task(&id)?)?);
            } else {
                println!("Updated {}", &id[..8]);
            }
        }
        TaskCommand::Delete(args) => {
            let id = resolve_task_id(&service, &args.id)?;
            // A live agent window must not outlive its task.
            let task = service.get_task(&id)?;
            if task.agent_status == crewboard_core::AgentStatus::Active {
                crewboard_mux::WindowManager::new().kill_window(&crewboard_agent::window_name(&task));
            }
            service.delete_task(&id)?;
            if args.json {
                println!("{}", json!({"deleted": id}));
            } else {
                println!("Deleted {}", &id[..8]);
            }
        }
        TaskCommand::Claim(args) => {
            let id = resolve_task_id(&service, &args.id)?;
            let assignee = args.assignee.unwrap_or(cfg.username);
            if assignee.is_empty() {
                bail!("no assignee: pass --assignee or set user.github_username in config");
            }
            service.claim_task(&id, &assignee)?;
            if args.json {
                println!("{}", json!({"task_id": id, "assignee": assignee}));
            } else {
                println!("Claimed {} for {}", &id[..8], assignee);
            }
        }
        TaskCommand::Unclaim(args) => {
            let id = resolve_task_id(&service, &args.id)?;
            service.unclaim_task(&id)?;
            if args.json {
                println!("{}", json!({"task_id": id}));
            } else {
                println!("Unclaimed {}", &id[..8]);
            }
        }
        TaskCommand::Comment(args) => {
            let id = resolve_task_id(&service, &args.id)?;
            let author = args.author.unwrap_or(cfg.username);
            let comment = service.add_comment(&id, &author, &args.body)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&comment)?);
            } else {
                println!("Comment added to {}", &id[..8]);
            }
        }
        TaskCommand::Block(args) => {
            let id = resolve_task_id(&service, &args.id)?;
            let blocker = resolve_task_id(&service, &args.blocker_id)?;
            service.add_dependency(&id, &blocker)?;
            if args.json {
                println!("{}", json!({"task_id": id, "depends_on": blocker}));
            } else {
                println!("{} is now blocked by {}", &id[..8], &blocker[..8]);
            }
        }
        TaskCommand::Unblock(args) => {
            let id = resolve_task_id(&service, &args.id)?;
            let blocker = resolve_task_id(&service, &args.blocker_id)?;
            service.remove_dependency(&id, &blocker)?;
            if args.json {
                println!("{}", json!({"task_id": id, "removed": blocker}));
            } else {
                println!("{} is no longer blocked by {}", &id[..8], &blocker[..8]);
            }
        }
        TaskCommand::Suggest(args) => {
            let id = resolve_task_id(&service, &args.id)?;
            let kind: SuggestionType = args
                .kind
                .parse()
                .map_err(|err: String| anyhow::anyhow!(err))?;
            let author = args.author.unwrap_or(cfg.username);
            let suggestion = service.create_suggestion(&id, kind, &author, &args.title, &args.message)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&suggestion)?);
            } else {
                println!("Suggestion {} created", &suggestion.id[..8]);
            }
        }
        TaskCommand::Propose(args) => {
            let author = args.author.unwrap_or(cfg.username);
            let suggestion = service.create_suggestion(
                "",
                SuggestionType::Proposal,
                &author,
                &args.title,
                &args.message,
            )?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&suggestion)?);
            } else {
                println!("Proposal {} created", &suggestion.id[..8]);
            }
        }
        TaskCommand::Suggestions(args) => {
            let status: SuggestionStatus = args
                .status
                .parse()
                .map_err(|err: String| anyhow::anyhow!(err))?;
            let suggestions = service.list_suggestions(status)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&suggestions)?);
            } else if suggestions.is_empty() {
                println!("No {status} suggestions");
            } else {
                for s in suggestions {
                    let target = if s.task_id.is_empty() {
                        "board".to_string()
                    } else {
                        s.task_id[..8].to_string()
                    };
                    println!("{}  {:<10} {:<10} {}", &s.id[..8], s.kind, target, s.title);
                }
            }
        }
        TaskCommand::Suggestion { action } => match action {
            SuggestionCommand::Accept(args) => {
                let id = resolve_suggestion_id(&service, &args.id)?;
                service.accept_suggestion(&id)?;
                if args.json {
                    println!("{}", json!({"suggestion_id": id, "status": "accepted"}));
                } else {
                    println!("Accepted {}", &id[..8]);
                }
            }
            SuggestionCommand::Dismiss(args) => {
                let id = resolve_suggestion_id(&service, &args.id)?;
                service.dismiss_suggestion(&id)?;
                if args.json {
                    println!("{}", json!({"suggestion_id": id, "status": "dismissed"}));
                } else {
                    println!("Dismissed {}", &id[..8]);
                }
            }
        },
    }
    Ok(())
}

fn resolve_suggestion_id(service: &crewboard_store::BoardService, prefix: &str) -> Result<String> {
    let pending = service.list_pending_suggestions()?;
    let matches: Vec<_> = pending.iter().filter(|s| s.id.starts_with(prefix)).collect();
    match matches.as_slice() {
        [] => {
            // Fall back to an exact id for already-resolved suggestions.
            service.get_suggestion(prefix)?;
            Ok(prefix.to_string())
        }
        [one] => Ok(one.id.clone()),
        _ => bail!("ambiguous suggestion id: {prefix}"),
    }
}

pub fn filter_tasks_by_search(tasks: Vec<Task>, query: &str) -> Vec<Task> {
    let query = query.to_lowercase();
    tasks
        .into_iter()
        .filter(|t| {
            t.title.to_lowercase().contains(&query)
                || t.description.to_lowercase().contains(&query)
        })
        .collect()
}

fn print_task_table(tasks: &[Task]) {
    if tasks.is_empty() {
        println!("No tasks");
        return;
    }
    println!("{:<10} {:<12} {:<10} {:<10} TITLE", "ID", "STATUS", "ASSIGNEE", "AGENT");
    for task in tasks {
        let agent = if task.agent_name.is_empty() {
            "-".to_string()
        } else {
            format!("{} ({})", task.agent_name, task.agent_status)
        };
        println!(
            "{:<10} {:<12} {:<10} {:<10} {}",
            task.short_id(),
            task.status,
            if task.assignee.is_empty() { "-" } else { &task.assignee },
            agent,
            task.title
        );
    }
}

fn print_task_detail(task: &Task) {
    println!("{}  {}", task.short_id(), task.title);
    println!("Status:      {}", task.status);
    if !task.description.is_empty() {
        println!("Description: {}", task.description);
    }
    if !task.assignee.is_empty() {
        println!("Assignee:    {}", task.assignee);
    }
    if !task.branch_name.is_empty() {
        println!("Branch:      {}", task.branch_name);
    }
    if !task.pr_url.is_empty() {
        println!("PR:          {} (#{})", task.pr_url, task.pr_number);
    }
    if !task.agent_name.is_empty() {
        println!("Agent:       {} ({})", task.agent_name, task.agent_status);
    }
    if !task.agent_activity.is_empty() {
        println!("Activity:    {}", task.agent_activity);
    }
    if task.enrichment_status != crewboard_core::EnrichmentStatus::None {
        println!("Enrichment:  {}", task.enrichment_status.as_str());
    }
    if !task.blocked_by.is_empty() {
        let short: Vec<_> = task.blocked_by.iter().map(|id| &id[..8.min(id.len())]).collect();
        println!("Blocked by:  {}", short.join(", "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crewboard_core::{AgentStatus, EnrichmentStatus};

    fn task_titled(title: &str, description: &str) -> Task {
        Task {
            id: "0123456789abcdef".to_string(),
            title: title.to_string(),
            description: description.to_string(),
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
    fn search_matches_title_and_description_case_insensitively() {
        let tasks = vec![
            task_titled("Fix WAL mode", ""),
            task_titled("other", "mentions wal somewhere"),
            task_titled("unrelated", "nothing here"),
        ];
        let found = filter_tasks_by_search(tasks, "WaL");
        assert_eq!(found.len(), 2);
    }
}
