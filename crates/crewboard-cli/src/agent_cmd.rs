use crate::config;
use crate::util::{open_service, resolve_task_id};
use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use crewboard_agent::{available_runners, get_runner, kill, spawn};
use crewboard_core::MAX_ACTIVITY_LEN;
use crewboard_mux::WindowManager;
use serde_json::json;

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
pub enum AgentCommand {
    /// Spawn an agent for a task
    Start(AgentStartArgs),
    /// Kill a running agent for a task
    Kill(AgentTargetArgs),
    /// Update the agent activity line shown on the board
    Status(AgentStatusArgs),
    /// Request a fresh context: the supervisor respawns the agent after the
    /// current window exits
    RequestReset(AgentTargetArgs),
}

#[derive(Args, Debug)]
pub struct AgentStartArgs {
    pub id: String,
    /// Agent runner (claude, cursor); defaults to the configured runner
    #[arg(long)]
    pub runner: Option<String>,
    /// Skip permission prompts in the agent CLI
    #[arg(long)]
    pub skip_permissions: bool,
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct AgentTargetArgs {
    pub id: String,
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct AgentStatusArgs {
    pub id: String,
    /// Activity text; multiple words are joined
    #[arg(required = true, num_args = 1..)]
    pub message: Vec<String>,
    #[arg(long)]
    pub json: bool,
}

pub fn run(command: AgentCommand) -> Result<()> {
    let service = open_service()?;
    let mux = WindowManager::new();

    match command {
        AgentCommand::Start(args) => {
            let id = resolve_task_id(&service, &args.id)?;
            let mut task = service.get_task(&id)?;

            let runner_id = args
                .runner
                .unwrap_or_else(|| {
                    if task.agent_name.is_empty() {
                        config::load().default_runner
                    } else {
                        // The task remembers which runner it last used.
                        task.agent_name.clone()
                    }
                });
            let Some(runner) = get_runner(&runner_id) else {
                bail!("unknown runner: {runner_id}");
            };
            if !runner.available() {
                let names: Vec<_> = available_runners().iter().map(|r| r.id()).collect();
                bail!(
                    "runner {runner_id} is not installed (available: {})",
                    if names.is_empty() { "none".to_string() } else { names.join(", ") }
                );
            }

            if args.skip_permissions && !task.skip_permissions {
                task.skip_permissions = true;
                service.update_task(&task)?;
                task = service.get_task(&id)?;
            }

            spawn(&service, &mux, &task, runner)?;
            if args.json {
                println!("{}", json!({"task_id": id, "runner": runner.id(), "status": "active"}));
            } else {
                println!("Spawned {} on {}", runner.display_name(), &id[..8]);
            }
        }
        AgentCommand::Kill(args) => {
            let id = resolve_task_id(&service, &args.id)?;
            let task = service.get_task(&id)?;
            kill(&service, &mux, &task)?;
            if args.json {
                println!("{}", json!({"task_id": id, "status": "idle"}));
            } else {
                println!("Killed agent for {}", &id[..8]);
            }
        }
        AgentCommand::Status(args) => {
            let id = resolve_task_id(&service, &args.id)?;
            let joined = args.message.join(" ");
            let activity: String = joined.chars().take(MAX_ACTIVITY_LEN).collect();
            service.update_agent_activity(&id, &activity)?;
            if args.json {
                println!("{}", json!({"task_id": id, "activity": activity}));
            } else {
                println!("Activity updated for {}", &id[..8]);
            }
        }
        AgentCommand::RequestReset(args) => {
            let id = resolve_task_id(&service, &args.id)?;
            let mut task = service.get_task(&id)?;
            task.reset_requested = true;
            service.update_task(&task)?;
            if args.json {
                println!("{}", json!({"task_id": id, "reset_requested": true}));
            } else {
                println!(
                    "Reset requested for {}; the agent will be respawned after it exits",
                    &id[..8]
                );
            }
        }
    }
    Ok(())
}
