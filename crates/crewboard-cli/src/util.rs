use anyhow::{bail, Context, Result};
use crewboard_core::Task;
use crewboard_store::{BoardService, Store};
use std::path::PathBuf;
use std::sync::Arc;

pub fn db_path() -> PathBuf {
    PathBuf::from(".crewboard").join("board.db")
}

pub fn open_service() -> Result<BoardService> {
    let store = Store::open(db_path()).context("opening board database")?;
    Ok(BoardService::new(Arc::new(store)))
}

/// Resolve a task id prefix (usually the 8-character short id) to a full id.
/// Ambiguity is an error rather than a guess.
pub fn find_by_prefix(tasks: &[Task], prefix: &str) -> Result<String> {
    let matches: Vec<&Task> = tasks.iter().filter(|t| t.id.starts_with(prefix)).collect();
    match matches.as_slice() {
        [] => bail!("task not found: {prefix}"),
        [task] => Ok(task.id.clone()),
        _ => bail!("ambiguous task id: {prefix} matches {} tasks", matches.len()),
    }
}

/// Resolve a prefix against the live task list.
pub fn resolve_task_id(service: &BoardService, prefix: &str) -> Result<String> {
    let tasks = service.list_tasks()?;
    find_by_prefix(&tasks, prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service_with(titles: &[&str]) -> (BoardService, Vec<Task>) {
        let service = BoardService::new(Arc::new(Store::open_in_memory().expect("store")));
        let tasks = titles
            .iter()
            .map(|t| service.create_task(t, "").expect("create"))
            .collect();
        (service, tasks)
    }

    #[test]
    fn prefix_resolves_unique_match() {
        let (_service, tasks) = service_with(&["a", "b"]);
        let prefix = &tasks[0].id[..8];
        assert_eq!(find_by_prefix(&tasks, prefix).unwrap(), tasks[0].id);
    }

    #[test]
    fn missing_prefix_errors() {
        let (_service, tasks) = service_with(&["a"]);
        assert!(find_by_prefix(&tasks, "zzzzzzzz").is_err());
    }

    #[test]
    fn empty_prefix_is_ambiguous_with_many_tasks() {
        let (_service, tasks) = service_with(&["a", "b"]);
        assert!(find_by_prefix(&tasks, "").is_err());
    }
}
