use crate::{Result, Store, StoreError};
use crewboard_core::{
    Comment, EnrichmentStatus, Suggestion, SuggestionStatus, SuggestionType, Task, TaskPatch,
    TaskStatus,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Board-level orchestration above the raw store: claim/unclaim rules and
/// suggestion acceptance with its side effects. Everything else passes
/// through so callers hold one handle.
#[derive(Clone)]
pub struct BoardService {
    store: Arc<Store>,
}

impl BoardService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn list_tasks(&self) -> Result<Vec<Task>> {
        self.store.list_tasks()
    }

    pub fn list_tasks_by_status(&self, status: TaskStatus) -> Result<Vec<Task>> {
        self.store.list_tasks_by_status(status)
    }

    pub fn get_task(&self, id: &str) -> Result<Task> {
        self.store.get_task(id)
    }

    pub fn create_task(&self, title: &str, description: &str) -> Result<Task> {
        self.store.create_task(title, description)
    }

    pub fn update_task(&self, task: &Task) -> Result<()> {
        self.store.update_task(task)
    }

    pub fn update_task_fields(&self, id: &str, patch: &TaskPatch) -> Result<()> {
        self.store.update_task_fields(id, patch)
    }

    pub fn update_agent_activity(&self, id: &str, activity: &str) -> Result<()> {
        self.store.update_agent_activity(id, activity)
    }

    pub fn move_task(&self, id: &str, new_status: TaskStatus) -> Result<()> {
        self.store.move_task(id, new_status)
    }

    pub fn delete_task(&self, id: &str) -> Result<()> {
        self.store.delete_task(id)
    }

    /// Claim a task for `assignee`: rejected when someone already holds it,
    /// otherwise the task moves to the end of the brainstorm column.
    pub fn claim_task(&self, id: &str, assignee: &str) -> Result<()> {
        let mut task = self.store.get_task(id)?;
        if !task.assignee.is_empty() {
            return Err(StoreError::Conflict(format!(
                "task already claimed by {}",
                task.assignee
            )));
        }
        task.assignee = assignee.to_string();
        task.status = TaskStatus::Brainstorm;
        task.position = self.store.next_position(TaskStatus::Brainstorm)?;
        self.store.update_task(&task)?;
        info!(event = "task_claimed", task = %task.short_id(), assignee);
        Ok(())
    }

    /// Release a task back to the backlog, clearing ownership and branch
    /// state and resetting the agent to idle.
    pub fn unclaim_task(&self, id: &str) -> Result<()> {
        let mut task = self.store.get_task(id)?;
        task.assignee = String::new();
        task.agent_name = String::new();
        task.agent_status = crewboard_core::AgentStatus::Idle;
        task.branch_name = String::new();
        task.status = TaskStatus::Backlog;
        task.position = self.store.next_position(TaskStatus::Backlog)?;
        self.store.update_task(&task)?;
        info!(event = "task_unclaimed", task = %task.short_id());
        Ok(())
    }

    pub fn add_comment(&self, task_id: &str, author: &str, body: &str) -> Result<Comment> {
        self.store.add_comment(task_id, author, body)
    }

    pub fn add_comment_with_id(
        &self,
        id: &str,
        task_id: &str,
        author: &str,
        body: &str,
    ) -> Result<Comment> {
        self.store.add_comment_with_id(id, task_id, author, body)
    }

    pub fn list_comments(&self, task_id: &str) -> Result<Vec<Comment>> {
        self.store.list_comments(task_id)
    }

    pub fn add_dependency(&self, task_id: &str, depends_on: &str) -> Result<()> {
        self.store.add_dependency(task_id, depends_on)
    }

    pub fn remove_dependency(&self, task_id: &str, depends_on: &str) -> Result<()> {
        self.store.remove_dependency(task_id, depends_on)
    }

    pub fn list_dependencies(&self, task_id: &str) -> Result<Vec<String>> {
        self.store.list_dependencies(task_id)
    }

    pub fn list_dependents(&self, task_id: &str) -> Result<Vec<String>> {
        self.store.list_dependents(task_id)
    }

    pub fn list_all_dependencies(&self) -> Result<HashMap<String, Vec<String>>> {
        self.store.list_all_dependencies()
    }

    pub fn create_suggestion(
        &self,
        task_id: &str,
        kind: SuggestionType,
        author: &str,
        title: &str,
        message: &str,
    ) -> Result<Suggestion> {
        self.store.create_suggestion(task_id, kind, author, title, message)
    }

    pub fn get_suggestion(&self, id: &str) -> Result<Suggestion> {
        self.store.get_suggestion(id)
    }

    pub fn list_pending_suggestions(&self) -> Result<Vec<Suggestion>> {
        self.store.list_pending_suggestions()
    }

    pub fn list_suggestions(&self, status: SuggestionStatus) -> Result<Vec<Suggestion>> {
        self.store.list_suggestions(status)
    }

    pub fn list_suggestions_by_task(&self, task_id: &str) -> Result<Vec<Suggestion>> {
        self.store.list_suggestions_by_task(task_id)
    }

    /// Accept a pending suggestion. Proposals additionally spawn a new task
    /// from the suggestion's title and message, flagged for enrichment so an
    /// agent fleshes the description out. The two store writes are not one
    /// transaction; acceptance is idempotent at the semantic level because a
    /// re-run fails the pending check before creating a second task.
    pub fn accept_suggestion(&self, id: &str) -> Result<()> {
        let suggestion = self.store.get_suggestion(id)?;
        if suggestion.status != SuggestionStatus::Pending {
            return Err(StoreError::Conflict(format!(
                "suggestion is not pending (status: {})",
                suggestion.status
            )));
        }

        if suggestion.kind == SuggestionType::Proposal {
            let task = self.store.create_task(&suggestion.title, &suggestion.message)?;
            self.store.update_task_fields(
                &task.id,
                &TaskPatch {
                    enrichment_status: Some(EnrichmentStatus::Pending),
                    ..Default::default()
                },
            )?;
            info!(event = "proposal_accepted", suggestion = %suggestion.id, task = %task.short_id());
        }

        self.store.update_suggestion_status(id, SuggestionStatus::Accepted)
    }

    /// Dismiss a pending suggestion. Never touches tasks.
    pub fn dismiss_suggestion(&self, id: &str) -> Result<()> {
        let suggestion = self.store.get_suggestion(id)?;
        if suggestion.status != SuggestionStatus::Pending {
            return Err(StoreError::Conflict(format!(
                "suggestion is not pending (status: {})",
                suggestion.status
            )));
        }
        self.store.update_suggestion_status(id, SuggestionStatus::Dismissed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crewboard_core::AgentStatus;

    fn service() -> BoardService {
        BoardService::new(Arc::new(Store::open_in_memory().expect("open store")))
    }

    #[test]
    fn claim_moves_to_brainstorm() {
        let svc = service();
        let task = svc.create_task("claim me", "").expect("create");

        svc.claim_task(&task.id, "mira").expect("claim");

        let task = svc.get_task(&task.id).expect("get");
        assert_eq!(task.assignee, "mira");
        assert_eq!(task.status, TaskStatus::Brainstorm);
        assert_eq!(task.position, 0);
    }

    #[test]
    fn claim_already_claimed_conflicts() {
        let svc = service();
        let task = svc.create_task("claim me", "").expect("create");
        svc.claim_task(&task.id, "mira").expect("claim");

        let err = svc.claim_task(&task.id, "lee").unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let task = svc.get_task(&task.id).expect("get");
        assert_eq!(task.assignee, "mira");
    }

    #[test]
    fn unclaim_resets_to_backlog() {
        let svc = service();
        let task = svc.create_task("claim me", "").expect("create");
        svc.claim_task(&task.id, "mira").expect("claim");

        let mut claimed = svc.get_task(&task.id).expect("get");
        claimed.agent_name = "claude".to_string();
        claimed.agent_status = AgentStatus::Active;
        claimed.branch_name = "feat/x".to_string();
        svc.update_task(&claimed).expect("update");

        svc.unclaim_task(&task.id).expect("unclaim");

        let task = svc.get_task(&task.id).expect("get");
        assert_eq!(task.assignee, "");
        assert_eq!(task.agent_name, "");
        assert_eq!(task.agent_status, AgentStatus::Idle);
        assert_eq!(task.branch_name, "");
        assert_eq!(task.status, TaskStatus::Backlog);
    }

    #[test]
    fn accept_proposal_creates_enrichment_pending_task() {
        let svc = service();
        let suggestion = svc
            .create_suggestion("", SuggestionType::Proposal, "mira", "add dark mode", "users asked")
            .expect("suggest");

        svc.accept_suggestion(&suggestion.id).expect("accept");

        let suggestion = svc.get_suggestion(&suggestion.id).expect("get");
        assert_eq!(suggestion.status, SuggestionStatus::Accepted);

        let tasks = svc.list_tasks().expect("list");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "add dark mode");
        assert_eq!(tasks[0].description, "users asked");
        assert_eq!(tasks[0].enrichment_status, EnrichmentStatus::Pending);
    }

    #[test]
    fn accept_hint_creates_no_task() {
        let svc = service();
        let task = svc.create_task("target", "").expect("create");
        let suggestion = svc
            .create_suggestion(&task.id, SuggestionType::Hint, "mira", "hint", "")
            .expect("suggest");

        svc.accept_suggestion(&suggestion.id).expect("accept");
        assert_eq!(svc.list_tasks().expect("list").len(), 1);
    }

    #[test]
    fn accept_non_pending_conflicts() {
        let svc = service();
        let suggestion = svc
            .create_suggestion("", SuggestionType::Hint, "mira", "hint", "")
            .expect("suggest");
        svc.dismiss_suggestion(&suggestion.id).expect("dismiss");

        let err = svc.accept_suggestion(&suggestion.id).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn dismiss_leaves_tasks_alone() {
        let svc = service();
        let task = svc.create_task("target", "").expect("create");
        let suggestion = svc
            .create_suggestion(&task.id, SuggestionType::Enrichment, "mira", "expand", "")
            .expect("suggest");

        svc.dismiss_suggestion(&suggestion.id).expect("dismiss");

        let after = svc.get_task(&task.id).expect("get");
        assert_eq!(after.enrichment_status, EnrichmentStatus::None);
        let suggestion = svc.get_suggestion(&suggestion.id).expect("get");
        assert_eq!(suggestion.status, SuggestionStatus::Dismissed);
    }
}
