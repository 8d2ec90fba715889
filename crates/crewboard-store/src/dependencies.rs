use crate::{Result, Store, StoreError};
use chrono::Utc;
use rusqlite::params;
use std::collections::{HashMap, HashSet};

impl Store {
    /// Record that `task_id` depends on `depends_on`. Rejected when the edge
    /// would be a self-loop, already exists, or closes a cycle.
    pub fn add_dependency(&self, task_id: &str, depends_on: &str) -> Result<()> {
        if task_id == depends_on {
            return Err(StoreError::Validation(
                "a task cannot depend on itself".to_string(),
            ));
        }
        // Both endpoints must exist; the FK would catch this too, but a typed
        // not-found beats a constraint error at the CLI.
        self.get_task(task_id)?;
        self.get_task(depends_on)?;

        if self.dependency_exists(task_id, depends_on)? {
            return Err(StoreError::Conflict(format!(
                "dependency {task_id} -> {depends_on} already exists"
            )));
        }
        if self.would_create_cycle(task_id, depends_on)? {
            return Err(StoreError::Conflict(
                "dependency would create a cycle".to_string(),
            ));
        }

        let conn = self.conn();
        conn.execute(
            "INSERT INTO task_dependencies (task_id, depends_on, created_at) VALUES (?1, ?2, ?3)",
            params![task_id, depends_on, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn remove_dependency(&self, task_id: &str, depends_on: &str) -> Result<()> {
        let conn = self.conn();
        let changed = conn.execute(
            "DELETE FROM task_dependencies WHERE task_id=?1 AND depends_on=?2",
            params![task_id, depends_on],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!(
                "dependency {task_id} -> {depends_on}"
            )));
        }
        Ok(())
    }

    /// Ids of tasks that `task_id` depends on.
    pub fn list_dependencies(&self, task_id: &str) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT depends_on FROM task_dependencies WHERE task_id=?1")?;
        let rows = stmt.query_map([task_id], |row| row.get(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    /// Ids of tasks that depend on `task_id`.
    pub fn list_dependents(&self, task_id: &str) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT task_id FROM task_dependencies WHERE depends_on=?1")?;
        let rows = stmt.query_map([task_id], |row| row.get(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    /// The whole edge set as task -> its dependencies.
    pub fn list_all_dependencies(&self) -> Result<HashMap<String, Vec<String>>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT task_id, depends_on FROM task_dependencies")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        let mut deps: HashMap<String, Vec<String>> = HashMap::new();
        for row in rows {
            let (task_id, depends_on) = row?;
            deps.entry(task_id).or_default().push(depends_on);
        }
        Ok(deps)
    }

    fn dependency_exists(&self, task_id: &str, depends_on: &str) -> Result<bool> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM task_dependencies WHERE task_id=?1 AND depends_on=?2",
            params![task_id, depends_on],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Would inserting (task_id depends on depends_on) close a cycle? Loads
    /// the full edge set in one query, then walks depends_on's dependency
    /// chain depth-first; reaching task_id means the new edge loops back.
    /// O(V+E) per insertion.
    fn would_create_cycle(&self, task_id: &str, depends_on: &str) -> Result<bool> {
        let graph = self.list_all_dependencies()?;

        let mut visited: HashSet<String> = HashSet::new();
        let mut stack = vec![depends_on.to_string()];
        while let Some(node) = stack.pop() {
            if node == task_id {
                return Ok(true);
            }
            if !visited.insert(node.clone()) {
                continue;
            }
            if let Some(next) = graph.get(&node) {
                stack.extend(next.iter().cloned());
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crewboard_core::Task;

    fn store_with(titles: &[&str]) -> (Store, Vec<Task>) {
        let db = Store::open_in_memory().expect("open store");
        let tasks = titles
            .iter()
            .map(|t| db.create_task(t, "").expect("create"))
            .collect();
        (db, tasks)
    }

    #[test]
    fn dependency_crud() {
        let (db, tasks) = store_with(&["a", "b"]);
        db.add_dependency(&tasks[0].id, &tasks[1].id).expect("add");

        assert_eq!(db.list_dependencies(&tasks[0].id).expect("deps"), vec![tasks[1].id.clone()]);
        assert_eq!(db.list_dependents(&tasks[1].id).expect("dependents"), vec![tasks[0].id.clone()]);

        db.remove_dependency(&tasks[0].id, &tasks[1].id).expect("remove");
        assert!(db.list_dependencies(&tasks[0].id).expect("deps").is_empty());
    }

    #[test]
    fn self_dependency_rejected() {
        let (db, tasks) = store_with(&["a"]);
        let err = db.add_dependency(&tasks[0].id, &tasks[0].id).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn duplicate_dependency_rejected() {
        let (db, tasks) = store_with(&["a", "b"]);
        db.add_dependency(&tasks[0].id, &tasks[1].id).expect("add");
        let err = db.add_dependency(&tasks[0].id, &tasks[1].id).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn dependency_on_missing_task_rejected() {
        let (db, tasks) = store_with(&["a"]);
        let err = db.add_dependency(&tasks[0].id, "ghost").unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn cycle_rejected() {
        let (db, tasks) = store_with(&["a", "b", "c"]);
        db.add_dependency(&tasks[0].id, &tasks[1].id).expect("a->b");
        db.add_dependency(&tasks[1].id, &tasks[2].id).expect("b->c");

        let err = db.add_dependency(&tasks[2].id, &tasks[0].id).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        // Only the accepted edges remain.
        let map = db.list_all_dependencies().expect("map");
        assert_eq!(map.len(), 2);
        assert_eq!(map[&tasks[0].id], vec![tasks[1].id.clone()]);
        assert_eq!(map[&tasks[1].id], vec![tasks[2].id.clone()]);
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        let (db, tasks) = store_with(&["a", "b", "c", "d"]);
        db.add_dependency(&tasks[0].id, &tasks[1].id).expect("a->b");
        db.add_dependency(&tasks[0].id, &tasks[2].id).expect("a->c");
        db.add_dependency(&tasks[1].id, &tasks[3].id).expect("b->d");
        db.add_dependency(&tasks[2].id, &tasks[3].id).expect("c->d");
    }

    #[test]
    fn dependencies_cascade_on_task_delete() {
        let (db, tasks) = store_with(&["a", "b"]);
        db.add_dependency(&tasks[0].id, &tasks[1].id).expect("add");

        db.delete_task(&tasks[1].id).expect("delete");
        assert!(db.list_dependencies(&tasks[0].id).expect("deps").is_empty());
    }
}
