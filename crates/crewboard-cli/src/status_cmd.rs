use crate::util::open_service;
use anyhow::Result;
use clap::Args;
use crewboard_core::{AgentStatus, EnrichmentStatus, TaskStatus, COLUMN_ORDER};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct AgentInfo {
    task_id: String,
    task_title: String,
    agent: String,
    agent_status: String,
    column: String,
}

#[derive(Serialize)]
struct EnrichmentInfo {
    task_id: String,
    task_title: String,
    enrichment_status: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    enrichment_agent: String,
}

#[derive(Serialize)]
struct BoardSummary {
    columns: HashMap<String, usize>,
    total: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    agents: Vec<AgentInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    enrichments: Vec<EnrichmentInfo>,
    pending_suggestions: usize,
}

pub fn run(args: StatusArgs) -> Result<()> {
    let service = open_service()?;
    let tasks = service.list_tasks()?;

    let mut columns: HashMap<String, usize> = COLUMN_ORDER
        .iter()
        .map(|status| (status.as_str().to_string(), 0))
        .collect();
    let mut agents = Vec::new();
    let mut enrichments = Vec::new();

    for task in &tasks {
        *columns.entry(task.status.as_str().to_string()).or_insert(0) += 1;

        if task.agent_status == AgentStatus::Active {
            agents.push(AgentInfo {
                task_id: task.short_id().to_string(),
                task_title: task.title.clone(),
                agent: task.agent_name.clone(),
                agent_status: task.agent_status.to_string(),
                column: task.status.to_string(),
            });
        }

        if task.enrichment_status != EnrichmentStatus::None {
            enrichments.push(EnrichmentInfo {
                task_id: task.short_id().to_string(),
                task_title: task.title.clone(),
                enrichment_status: task.enrichment_status.as_str().to_string(),
                enrichment_agent: task.enrichment_agent_name.clone(),
            });
        }
    }

    let pending_suggestions = service.list_pending_suggestions().map(|s| s.len()).unwrap_or(0);

    let summary = BoardSummary {
        total: tasks.len(),
        columns,
        agents,
        enrichments,
        pending_suggestions,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Crewboard Status");
    println!("----------------");
    for status in COLUMN_ORDER {
        println!("{:<12} {}", label(status), summary.columns[status.as_str()]);
    }
    println!("----------------");
    println!("{:<12} {}", "Total:", summary.total);

    if !summary.agents.is_empty() {
        println!("\nActive Agents:");
        for agent in &summary.agents {
            println!(
                "  {}: {} ({}) in {}",
                agent.task_id, agent.agent, agent.agent_status, agent.column
            );
        }
    }

    if !summary.enrichments.is_empty() {
        println!("\nEnrichment:");
        for e in &summary.enrichments {
            println!("  {}: {} ({})", e.task_id, e.task_title, e.enrichment_status);
        }
    }

    if summary.pending_suggestions > 0 {
        println!("\nPending Suggestions: {}", summary.pending_suggestions);
    }

    Ok(())
}

fn label(status: TaskStatus) -> String {
    let name = match status {
        TaskStatus::Backlog => "Backlog",
        TaskStatus::Brainstorm => "Brainstorm",
        TaskStatus::Planning => "Planning",
        TaskStatus::InProgress => "In Progress",
        TaskStatus::Review => "Review",
        TaskStatus::Done => "Done",
    };
    format!("{name}:")
}
