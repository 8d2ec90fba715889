use crate::{Result, Store, StoreError};
use chrono::{DateTime, Utc};
use crewboard_core::Comment;
use rusqlite::{params, Row};
use uuid::Uuid;

fn scan_comment(row: &Row<'_>) -> rusqlite::Result<Comment> {
    let created_at: String = row.get(4)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(err))
        })?;
    Ok(Comment {
        id: row.get(0)?,
        task_id: row.get(1)?,
        author: row.get(2)?,
        body: row.get(3)?,
        created_at,
    })
}

impl Store {
    pub fn add_comment(&self, task_id: &str, author: &str, body: &str) -> Result<Comment> {
        self.add_comment_with_id(&Uuid::new_v4().to_string(), task_id, author, body)
    }

    /// Insert a comment under a caller-supplied id. Re-inserting an existing
    /// id is a no-op, which makes offline-queue replay safe: the comment is
    /// content-addressed by the id its author minted.
    pub fn add_comment_with_id(
        &self,
        id: &str,
        task_id: &str,
        author: &str,
        body: &str,
    ) -> Result<Comment> {
        if author.is_empty() {
            return Err(StoreError::Validation("author must not be empty".to_string()));
        }
        if body.is_empty() {
            return Err(StoreError::Validation("comment body must not be empty".to_string()));
        }
        self.get_task(task_id)?;

        let comment = Comment {
            id: id.to_string(),
            task_id: task_id.to_string(),
            author: author.to_string(),
            body: body.to_string(),
            created_at: Utc::now(),
        };

        let conn = self.conn();
        conn.execute(
            "INSERT OR IGNORE INTO comments (id, task_id, author, body, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                comment.id,
                comment.task_id,
                comment.author,
                comment.body,
                comment.created_at.to_rfc3339(),
            ],
        )?;
        Ok(comment)
    }

    pub fn list_comments(&self, task_id: &str) -> Result<Vec<Comment>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, task_id, author, body, created_at FROM comments \
             WHERE task_id = ?1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map([task_id], scan_comment)?;
        let mut comments = Vec::new();
        for row in rows {
            comments.push(row?);
        }
        Ok(comments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comment_round_trip() {
        let db = Store::open_in_memory().expect("open store");
        let task = db.create_task("commented", "").expect("create");

        let comment = db.add_comment(&task.id, "mira", "ship it").expect("comment");
        let listed = db.list_comments(&task.id).expect("list");
        assert_eq!(listed, vec![comment]);
    }

    #[test]
    fn empty_author_and_body_rejected() {
        let db = Store::open_in_memory().expect("open store");
        let task = db.create_task("commented", "").expect("create");

        assert!(matches!(
            db.add_comment(&task.id, "", "body"),
            Err(StoreError::Validation(_))
        ));
        assert!(matches!(
            db.add_comment(&task.id, "mira", ""),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn replayed_comment_id_inserts_once() {
        let db = Store::open_in_memory().expect("open store");
        let task = db.create_task("commented", "").expect("create");

        db.add_comment_with_id("c-1", &task.id, "mira", "once").expect("first");
        db.add_comment_with_id("c-1", &task.id, "mira", "once").expect("replay");

        assert_eq!(db.list_comments(&task.id).expect("list").len(), 1);
    }

    #[test]
    fn comments_cascade_on_task_delete() {
        let db = Store::open_in_memory().expect("open store");
        let task = db.create_task("commented", "").expect("create");
        db.add_comment(&task.id, "mira", "first").expect("comment");
        db.add_comment(&task.id, "lee", "second").expect("comment");

        db.delete_task(&task.id).expect("delete");
        assert!(db.list_comments(&task.id).expect("list").is_empty());
    }
}
