use crate::{Result, Store, StoreError};
use chrono::{DateTime, Utc};
use crewboard_core::{Suggestion, SuggestionStatus, SuggestionType};
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

fn scan_suggestion(row: &Row<'_>) -> rusqlite::Result<Suggestion> {
    let kind: String = row.get(2)?;
    let status: String = row.get(6)?;
    let created_at: String = row.get(7)?;

    let parse_err = |idx: usize, err: String| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, err)),
        )
    };

    Ok(Suggestion {
        id: row.get(0)?,
        task_id: row.get(1)?,
        kind: kind.parse::<SuggestionType>().map_err(|e| parse_err(2, e))?,
        author: row.get(3)?,
        title: row.get(4)?,
        message: row.get(5)?,
        status: status.parse::<SuggestionStatus>().map_err(|e| parse_err(6, e))?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|err| {
                rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(err))
            })?,
    })
}

const SUGGESTION_COLUMNS: &str = "id, task_id, type, author, title, message, status, created_at";

impl Store {
    /// Create a pending suggestion. `task_id` may be empty for board-wide
    /// proposals.
    pub fn create_suggestion(
        &self,
        task_id: &str,
        kind: SuggestionType,
        author: &str,
        title: &str,
        message: &str,
    ) -> Result<Suggestion> {
        if title.is_empty() {
            return Err(StoreError::Validation("suggestion title must not be empty".to_string()));
        }
        if !task_id.is_empty() {
            self.get_task(task_id)?;
        }

        let suggestion = Suggestion {
            id: Uuid::new_v4().to_string(),
            task_id: task_id.to_string(),
            kind,
            author: author.to_string(),
            title: title.to_string(),
            message: message.to_string(),
            status: SuggestionStatus::Pending,
            created_at: Utc::now(),
        };

        let conn = self.conn();
        conn.execute(
            "INSERT INTO suggestions (id, task_id, type, author, title, message, status, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                suggestion.id,
                suggestion.task_id,
                suggestion.kind.as_str(),
                suggestion.author,
                suggestion.title,
                suggestion.message,
                suggestion.status.as_str(),
                suggestion.created_at.to_rfc3339(),
            ],
        )?;
        Ok(suggestion)
    }

    pub fn get_suggestion(&self, id: &str) -> Result<Suggestion> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {SUGGESTION_COLUMNS} FROM suggestions WHERE id=?1"),
            [id],
            scan_suggestion,
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("suggestion {id}")))
    }

    pub fn list_pending_suggestions(&self) -> Result<Vec<Suggestion>> {
        self.list_suggestions(SuggestionStatus::Pending)
    }

    pub fn list_suggestions(&self, status: SuggestionStatus) -> Result<Vec<Suggestion>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SUGGESTION_COLUMNS} FROM suggestions WHERE status=?1 ORDER BY created_at"
        ))?;
        let rows = stmt.query_map([status.as_str()], scan_suggestion)?;
        let mut suggestions = Vec::new();
        for row in rows {
            suggestions.push(row?);
        }
        Ok(suggestions)
    }

    pub fn list_suggestions_by_task(&self, task_id: &str) -> Result<Vec<Suggestion>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SUGGESTION_COLUMNS} FROM suggestions WHERE task_id=?1 ORDER BY created_at"
        ))?;
        let rows = stmt.query_map([task_id], scan_suggestion)?;
        let mut suggestions = Vec::new();
        for row in rows {
            suggestions.push(row?);
        }
        Ok(suggestions)
    }

    pub fn update_suggestion_status(&self, id: &str, status: SuggestionStatus) -> Result<()> {
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE suggestions SET status=?1 WHERE id=?2",
            params![status.as_str(), id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("suggestion {id}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggestion_crud() {
        let db = Store::open_in_memory().expect("open store");
        let task = db.create_task("target", "").expect("create");

        let created = db
            .create_suggestion(&task.id, SuggestionType::Hint, "mira", "try smaller steps", "details")
            .expect("suggest");
        assert_eq!(created.status, SuggestionStatus::Pending);

        let loaded = db.get_suggestion(&created.id).expect("get");
        assert_eq!(loaded, created);
    }

    #[test]
    fn board_wide_suggestion_needs_no_task() {
        let db = Store::open_in_memory().expect("open store");
        let created = db
            .create_suggestion("", SuggestionType::Proposal, "mira", "new feature", "build it")
            .expect("suggest");
        assert_eq!(created.task_id, "");
    }

    #[test]
    fn list_filters_by_status_and_task() {
        let db = Store::open_in_memory().expect("open store");
        let task = db.create_task("target", "").expect("create");

        let a = db
            .create_suggestion(&task.id, SuggestionType::Hint, "mira", "a", "")
            .expect("a");
        let b = db
            .create_suggestion("", SuggestionType::Proposal, "lee", "b", "")
            .expect("b");
        db.update_suggestion_status(&b.id, SuggestionStatus::Dismissed)
            .expect("dismiss");

        let pending = db.list_pending_suggestions().expect("pending");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, a.id);

        let dismissed = db.list_suggestions(SuggestionStatus::Dismissed).expect("dismissed");
        assert_eq!(dismissed.len(), 1);
        assert_eq!(dismissed[0].id, b.id);

        let by_task = db.list_suggestions_by_task(&task.id).expect("by task");
        assert_eq!(by_task.len(), 1);
        assert_eq!(by_task[0].id, a.id);
    }

    #[test]
    fn suggestions_swept_on_task_delete() {
        let db = Store::open_in_memory().expect("open store");
        let task = db.create_task("target", "").expect("create");
        let kept = db
            .create_suggestion("", SuggestionType::Hint, "mira", "board-wide", "")
            .expect("kept");
        db.create_suggestion(&task.id, SuggestionType::Hint, "mira", "doomed", "")
            .expect("doomed");

        db.delete_task(&task.id).expect("delete");
        assert!(db.list_suggestions_by_task(&task.id).expect("by task").is_empty());
        db.get_suggestion(&kept.id).expect("board-wide survives");
    }

    #[test]
    fn update_missing_suggestion_is_not_found() {
        let db = Store::open_in_memory().expect("open store");
        assert!(matches!(
            db.update_suggestion_status("ghost", SuggestionStatus::Accepted),
            Err(StoreError::NotFound(_))
        ));
    }
}
