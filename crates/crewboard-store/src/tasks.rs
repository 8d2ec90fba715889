use crate::{Result, Store, StoreError};
use chrono::{DateTime, Utc};
use crewboard_core::{AgentStatus, EnrichmentStatus, Task, TaskPatch, TaskStatus, MAX_TITLE_LEN};
use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};
use uuid::Uuid;

const TASK_COLUMNS: &str = "id, title, description, status, assignee, branch_name, pr_url, pr_number, \
     agent_name, agent_status, agent_started_at, agent_spawned_status, \
     reset_requested, skip_permissions, enrichment_status, enrichment_agent_name, \
     agent_activity, position, created_at, updated_at";

fn scan_task(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        status: parse_col(row, 3)?,
        assignee: row.get(4)?,
        branch_name: row.get(5)?,
        pr_url: row.get(6)?,
        pr_number: row.get(7)?,
        agent_name: row.get(8)?,
        agent_status: parse_col(row, 9)?,
        agent_started_at: row.get(10)?,
        agent_spawned_status: row.get(11)?,
        reset_requested: row.get::<_, i64>(12)? != 0,
        skip_permissions: row.get::<_, i64>(13)? != 0,
        enrichment_status: parse_col(row, 14)?,
        enrichment_agent_name: row.get(15)?,
        agent_activity: row.get(16)?,
        position: row.get(17)?,
        created_at: parse_timestamp_col(row, 18)?,
        updated_at: parse_timestamp_col(row, 19)?,
        blocked_by: Vec::new(),
    })
}

fn parse_col<T: std::str::FromStr<Err = String>>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, err)),
        )
    })
}

fn parse_timestamp_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                rusqlite::types::Type::Text,
                Box::new(err),
            )
        })
}

fn validate_title(title: &str) -> Result<()> {
    if title.is_empty() {
        return Err(StoreError::Validation("title must not be empty".to_string()));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(StoreError::Validation(format!(
            "title exceeds {MAX_TITLE_LEN} characters"
        )));
    }
    Ok(())
}

fn bool_to_int(value: bool) -> i64 {
    i64::from(value)
}

impl Store {
    /// Create a task in the backlog column, assigning the next free position
    /// inside the same transaction that inserts the row.
    pub fn create_task(&self, title: &str, description: &str) -> Result<Task> {
        validate_title(title)?;

        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let max_pos: Option<i64> = tx.query_row(
            "SELECT MAX(position) FROM tasks WHERE status = ?1",
            [TaskStatus::Backlog.as_str()],
            |row| row.get(0),
        )?;
        let position = max_pos.map_or(0, |p| p + 1);

        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4().to_string(),
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
            position,
            created_at: now,
            updated_at: now,
            blocked_by: Vec::new(),
        };

        tx.execute(
            "INSERT INTO tasks (id, title, description, status, assignee, branch_name, pr_url, pr_number, \
             agent_name, agent_status, agent_started_at, agent_spawned_status, reset_requested, \
             skip_permissions, enrichment_status, enrichment_agent_name, agent_activity, \
             position, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
            params![
                task.id,
                task.title,
                task.description,
                task.status.as_str(),
                task.assignee,
                task.branch_name,
                task.pr_url,
                task.pr_number,
                task.agent_name,
                task.agent_status.as_str(),
                task.agent_started_at,
                task.agent_spawned_status,
                bool_to_int(task.reset_requested),
                bool_to_int(task.skip_permissions),
                task.enrichment_status.as_str(),
                task.enrichment_agent_name,
                task.agent_activity,
                task.position,
                task.created_at.to_rfc3339(),
                task.updated_at.to_rfc3339(),
            ],
        )?;
        tx.commit()?;

        Ok(task)
    }

    pub fn get_task(&self, id: &str) -> Result<Task> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
            [id],
            scan_task,
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("task {id}")))
    }

    /// All tasks in board order (status, then position within the column).
    pub fn list_tasks(&self) -> Result<Vec<Task>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare(&format!("SELECT {TASK_COLUMNS} FROM tasks ORDER BY status, position"))?;
        let rows = stmt.query_map([], scan_task)?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row?);
        }
        Ok(tasks)
    }

    pub fn list_tasks_by_status(&self, status: TaskStatus) -> Result<Vec<Task>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE status = ?1 ORDER BY position"
        ))?;
        let rows = stmt.query_map([status.as_str()], scan_task)?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row?);
        }
        Ok(tasks)
    }

    /// Write every mutable column of `task` back. `updated_at` is stamped
    /// here, not by the caller.
    pub fn update_task(&self, task: &Task) -> Result<()> {
        validate_title(&task.title)?;

        let updated_at = Utc::now();
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE tasks SET title=?1, description=?2, status=?3, assignee=?4, branch_name=?5, \
             pr_url=?6, pr_number=?7, agent_name=?8, agent_status=?9, agent_started_at=?10, \
             agent_spawned_status=?11, reset_requested=?12, skip_permissions=?13, \
             enrichment_status=?14, enrichment_agent_name=?15, agent_activity=?16, \
             position=?17, updated_at=?18 WHERE id=?19",
            params![
                task.title,
                task.description,
                task.status.as_str(),
                task.assignee,
                task.branch_name,
                task.pr_url,
                task.pr_number,
                task.agent_name,
                task.agent_status.as_str(),
                task.agent_started_at,
                task.agent_spawned_status,
                bool_to_int(task.reset_requested),
                bool_to_int(task.skip_permissions),
                task.enrichment_status.as_str(),
                task.enrichment_agent_name,
                task.agent_activity,
                task.position,
                updated_at.to_rfc3339(),
                task.id,
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("task {}", task.id)));
        }
        Ok(())
    }

    /// Apply only the fields set in `patch`. Column names are fixed literals
    /// assembled here, never caller input. An empty patch touches nothing,
    /// not even `updated_at`.
    pub fn update_task_fields(&self, id: &str, patch: &TaskPatch) -> Result<()> {
        if patch.is_empty() {
            return Ok(());
        }
        if let Some(title) = &patch.title {
            validate_title(title)?;
        }

        let mut clauses: Vec<&'static str> = Vec::new();
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(value) = &patch.title {
            clauses.push("title=?");
            args.push(Box::new(value.clone()));
        }
        if let Some(value) = &patch.description {
            clauses.push("description=?");
            args.push(Box::new(value.clone()));
        }
        if let Some(value) = &patch.status {
            clauses.push("status=?");
            args.push(Box::new(value.as_str()));
        }
        if let Some(value) = &patch.assignee {
            clauses.push("assignee=?");
            args.push(Box::new(value.clone()));
        }
        if let Some(value) = &patch.branch_name {
            clauses.push("branch_name=?");
            args.push(Box::new(value.clone()));
        }
        if let Some(value) = &patch.pr_url {
            clauses.push("pr_url=?");
            args.push(Box::new(value.clone()));
        }
        if let Some(value) = &patch.pr_number {
            clauses.push("pr_number=?");
            args.push(Box::new(*value));
        }
        if let Some(value) = &patch.enrichment_status {
            clauses.push("enrichment_status=?");
            args.push(Box::new(value.as_str()));
        }
        if let Some(value) = &patch.enrichment_agent_name {
            clauses.push("enrichment_agent_name=?");
            args.push(Box::new(value.clone()));
        }

        clauses.push("updated_at=?");
        args.push(Box::new(Utc::now().to_rfc3339()));
        args.push(Box::new(id.to_string()));

        let sql = format!("UPDATE tasks SET {} WHERE id=?", clauses.join(", "));
        let conn = self.conn();
        let changed = conn.execute(&sql, rusqlite::params_from_iter(args))?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("task {id}")));
        }
        Ok(())
    }

    pub fn update_agent_activity(&self, id: &str, activity: &str) -> Result<()> {
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE tasks SET agent_activity=?1, updated_at=?2 WHERE id=?3",
            params![activity, Utc::now().to_rfc3339(), id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("task {id}")));
        }
        Ok(())
    }

    /// Move a task to `new_status`, assigning max+1 within the target column
    /// (0 when empty). Position read and status write share one immediate
    /// transaction.
    pub fn move_task(&self, id: &str, new_status: TaskStatus) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let max_pos: Option<i64> = tx.query_row(
            "SELECT MAX(position) FROM tasks WHERE status = ?1",
            [new_status.as_str()],
            |row| row.get(0),
        )?;
        let position = max_pos.map_or(0, |p| p + 1);

        let changed = tx.execute(
            "UPDATE tasks SET status=?1, position=?2, updated_at=?3 WHERE id=?4",
            params![new_status.as_str(), position, Utc::now().to_rfc3339(), id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("task {id}")));
        }
        tx.commit()?;
        Ok(())
    }

    /// Delete a task; comments, dependency edges and suggestions referencing
    /// it cascade away.
    pub fn delete_task(&self, id: &str) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let changed = tx.execute("DELETE FROM tasks WHERE id=?1", [id])?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("task {id}")));
        }
        // A suggestion's task reference is optional (empty when board-wide),
        // so the column carries no FK; sweep referencing rows by hand.
        tx.execute("DELETE FROM suggestions WHERE task_id=?1", [id])?;
        tx.commit()?;
        Ok(())
    }

    /// Next free position in a column.
    pub fn next_position(&self, status: TaskStatus) -> Result<i64> {
        let conn = self.conn();
        let max_pos: Option<i64> = conn.query_row(
            "SELECT MAX(position) FROM tasks WHERE status = ?1",
            [status.as_str()],
            |row| row.get(0),
        )?;
        Ok(max_pos.map_or(0, |p| p + 1))
    }
}
