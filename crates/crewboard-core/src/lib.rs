use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod protocol;

/// Maximum accepted task title length, enforced both in the store schema and
/// at validation boundaries.
pub const MAX_TITLE_LEN: usize = 500;

/// Maximum length of the free-text agent activity line shown on the board.
pub const MAX_ACTIVITY_LEN: usize = 200;

/// Workflow column a task resides in. A task is always in exactly one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Backlog,
    Brainstorm,
    Planning,
    InProgress,
    Review,
    Done,
}

/// Column traversal order used by the board and the stage prompts.
pub const COLUMN_ORDER: [TaskStatus; 6] = [
    TaskStatus::Backlog,
    TaskStatus::Brainstorm,
    TaskStatus::Planning,
    TaskStatus::InProgress,
    TaskStatus::Review,
    TaskStatus::Done,
];

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Backlog
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Backlog => "backlog",
            TaskStatus::Brainstorm => "brainstorm",
            TaskStatus::Planning => "planning",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Review => "review",
            TaskStatus::Done => "done",
        }
    }

    /// The next column in board order, or the current one at the end.
    pub fn next(&self) -> TaskStatus {
        let idx = COLUMN_ORDER.iter().position(|s| s == self).unwrap_or(0);
        COLUMN_ORDER[(idx + 1).min(COLUMN_ORDER.len() - 1)]
    }

    /// The previous column in board order, or the current one at the start.
    pub fn prev(&self) -> TaskStatus {
        let idx = COLUMN_ORDER.iter().position(|s| s == self).unwrap_or(0);
        COLUMN_ORDER[idx.saturating_sub(1)]
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "backlog" => Ok(TaskStatus::Backlog),
            "brainstorm" => Ok(TaskStatus::Brainstorm),
            "planning" => Ok(TaskStatus::Planning),
            "in_progress" | "in-progress" | "inprogress" => Ok(TaskStatus::InProgress),
            "review" => Ok(TaskStatus::Review),
            "done" => Ok(TaskStatus::Done),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

/// Lifecycle state of the agent supervising a task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Active,
    Completed,
    Error,
}

impl Default for AgentStatus {
    fn default() -> Self {
        Self::Idle
    }
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Idle => "idle",
            AgentStatus::Active => "active",
            AgentStatus::Completed => "completed",
            AgentStatus::Error => "error",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentStatus {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "idle" => Ok(AgentStatus::Idle),
            "active" => Ok(AgentStatus::Active),
            "completed" => Ok(AgentStatus::Completed),
            "error" => Ok(AgentStatus::Error),
            other => Err(format!("unknown agent status: {other}")),
        }
    }
}

/// State of the optional description-enrichment pass over a task. `None`
/// serializes as the empty string so older rows and wire payloads keep their
/// meaning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentStatus {
    #[serde(rename = "")]
    None,
    Pending,
    Enriching,
    Done,
    Error,
    Skipped,
}

impl Default for EnrichmentStatus {
    fn default() -> Self {
        Self::None
    }
}

impl EnrichmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrichmentStatus::None => "",
            EnrichmentStatus::Pending => "pending",
            EnrichmentStatus::Enriching => "enriching",
            EnrichmentStatus::Done => "done",
            EnrichmentStatus::Error => "error",
            EnrichmentStatus::Skipped => "skipped",
        }
    }
}

impl FromStr for EnrichmentStatus {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim() {
            "" => Ok(EnrichmentStatus::None),
            "pending" => Ok(EnrichmentStatus::Pending),
            "enriching" => Ok(EnrichmentStatus::Enriching),
            "done" => Ok(EnrichmentStatus::Done),
            "error" => Ok(EnrichmentStatus::Error),
            "skipped" => Ok(EnrichmentStatus::Skipped),
            other => Err(format!("unknown enrichment status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub assignee: String,
    #[serde(default)]
    pub branch_name: String,
    #[serde(default)]
    pub pr_url: String,
    #[serde(default)]
    pub pr_number: i64,
    #[serde(default)]
    pub agent_name: String,
    #[serde(default)]
    pub agent_status: AgentStatus,
    /// RFC 3339 timestamp of the last spawn, empty when no agent ran.
    #[serde(default)]
    pub agent_started_at: String,
    /// Column the agent was spawned into; the reconciliation baseline.
    #[serde(default)]
    pub agent_spawned_status: String,
    #[serde(default)]
    pub reset_requested: bool,
    #[serde(default)]
    pub skip_permissions: bool,
    #[serde(default)]
    pub enrichment_status: EnrichmentStatus,
    #[serde(default)]
    pub enrichment_agent_name: String,
    #[serde(default)]
    pub agent_activity: String,
    pub position: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Ids of tasks this one depends on; populated at read time, never stored
    /// in the tasks table itself.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocked_by: Vec<String>,
}

impl Task {
    /// First eight characters of the id, the human-facing short form.
    pub fn short_id(&self) -> &str {
        let end = self.id.len().min(8);
        &self.id[..end]
    }
}

/// Per-field optional update. `None` means "leave the column alone"; an
/// update with every field `None` is a no-op that does not touch the row.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_number: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrichment_status: Option<EnrichmentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrichment_agent_name: Option<String>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.assignee.is_none()
            && self.branch_name.is_none()
            && self.pr_url.is_none()
            && self.pr_number.is_none()
            && self.enrichment_status.is_none()
            && self.enrichment_agent_name.is_none()
    }
}

/// Append-only task comment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Comment {
    pub id: String,
    pub task_id: String,
    pub author: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionType {
    Enrichment,
    Proposal,
    Hint,
}

impl SuggestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionType::Enrichment => "enrichment",
            SuggestionType::Proposal => "proposal",
            SuggestionType::Hint => "hint",
        }
    }
}

impl fmt::Display for SuggestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SuggestionType {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "enrichment" => Ok(SuggestionType::Enrichment),
            "proposal" => Ok(SuggestionType::Proposal),
            "hint" => Ok(SuggestionType::Hint),
            other => Err(format!("unknown suggestion type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionStatus {
    Pending,
    Accepted,
    Dismissed,
}

impl SuggestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionStatus::Pending => "pending",
            SuggestionStatus::Accepted => "accepted",
            SuggestionStatus::Dismissed => "dismissed",
        }
    }
}

impl fmt::Display for SuggestionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SuggestionStatus {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "pending" => Ok(SuggestionStatus::Pending),
            "accepted" => Ok(SuggestionStatus::Accepted),
            "dismissed" => Ok(SuggestionStatus::Dismissed),
            other => Err(format!("unknown suggestion status: {other}")),
        }
    }
}

/// A reviewable suggestion: created pending, transitions exactly once to
/// accepted or dismissed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Suggestion {
    pub id: String,
    #[serde(default)]
    pub task_id: String,
    #[serde(rename = "type")]
    pub kind: SuggestionType,
    pub author: String,
    pub title: String,
    pub message: String,
    pub status: SuggestionStatus,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for status in COLUMN_ORDER {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
    }

    #[test]
    fn status_accepts_dash_variant() {
        assert_eq!(
            "in-progress".parse::<TaskStatus>().unwrap(),
            TaskStatus::InProgress
        );
    }

    #[test]
    fn status_rejects_unknown() {
        assert!("shipping".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn column_order_walks_forward_and_back() {
        assert_eq!(TaskStatus::Backlog.next(), TaskStatus::Brainstorm);
        assert_eq!(TaskStatus::Done.next(), TaskStatus::Done);
        assert_eq!(TaskStatus::Backlog.prev(), TaskStatus::Backlog);
        assert_eq!(TaskStatus::Review.prev(), TaskStatus::InProgress);
    }

    #[test]
    fn enrichment_none_is_empty_string() {
        assert_eq!(EnrichmentStatus::None.as_str(), "");
        assert_eq!("".parse::<EnrichmentStatus>().unwrap(), EnrichmentStatus::None);
    }

    #[test]
    fn empty_patch_reports_empty() {
        assert!(TaskPatch::default().is_empty());
        let patch = TaskPatch {
            assignee: Some("mira".to_string()),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }

    #[test]
    fn short_id_truncates_to_eight() {
        let mut task = sample_task();
        task.id = "0123456789abcdef".to_string();
        assert_eq!(task.short_id(), "01234567");
        task.id = "abc".to_string();
        assert_eq!(task.short_id(), "abc");
    }

    fn sample_task() -> Task {
        Task {
            id: "t".to_string(),
            title: "t".to_string(),
            description: String::new(),
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
}
