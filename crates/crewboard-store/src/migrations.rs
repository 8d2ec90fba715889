//! Versioned schema migrations. A fresh database receives the full current
//! schema in one shot; an existing one is walked up the chain step by step,
//! each step committing its DDL and the version bump atomically.

use crate::{Result, StoreError};
use rusqlite::{Connection, TransactionBehavior};
use tracing::info;

/// Highest migration in the chain.
pub const SCHEMA_VERSION: i64 = 7;

/// Current schema, applied verbatim to fresh databases.
const CURRENT_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL CHECK(length(title) > 0 AND length(title) <= 500),
    description TEXT DEFAULT '',
    status TEXT NOT NULL DEFAULT 'backlog'
        CHECK(status IN ('backlog','brainstorm','planning','in_progress','review','done')),
    assignee TEXT DEFAULT '',
    branch_name TEXT DEFAULT '',
    pr_url TEXT DEFAULT '',
    pr_number INTEGER DEFAULT 0,
    agent_name TEXT DEFAULT '',
    agent_status TEXT DEFAULT 'idle'
        CHECK(agent_status IN ('idle','active','completed','error')),
    agent_started_at TEXT DEFAULT '',
    agent_spawned_status TEXT DEFAULT '',
    reset_requested INTEGER DEFAULT 0,
    skip_permissions INTEGER DEFAULT 0,
    enrichment_status TEXT DEFAULT ''
        CHECK(enrichment_status IN ('','pending','enriching','done','error','skipped')),
    enrichment_agent_name TEXT DEFAULT '',
    agent_activity TEXT DEFAULT '',
    position INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS comments (
    id TEXT PRIMARY KEY,
    task_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    author TEXT NOT NULL CHECK(length(author) > 0),
    body TEXT NOT NULL CHECK(length(body) > 0),
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS task_dependencies (
    task_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    depends_on TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (task_id, depends_on),
    CHECK(task_id != depends_on)
);

CREATE TABLE IF NOT EXISTS suggestions (
    id TEXT PRIMARY KEY,
    task_id TEXT DEFAULT '',
    type TEXT NOT NULL CHECK(type IN ('enrichment','proposal','hint')),
    author TEXT NOT NULL,
    title TEXT NOT NULL,
    message TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK(status IN ('pending','accepted','dismissed')),
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
CREATE INDEX IF NOT EXISTS idx_tasks_assignee ON tasks(assignee);
CREATE UNIQUE INDEX IF NOT EXISTS idx_tasks_status_position ON tasks(status, position);
CREATE INDEX IF NOT EXISTS idx_comments_task_id ON comments(task_id);
CREATE INDEX IF NOT EXISTS idx_task_deps_depends_on ON task_dependencies(depends_on);
CREATE INDEX IF NOT EXISTS idx_suggestions_status ON suggestions(status);
";

const MIGRATE_TO_V2: &str = "
ALTER TABLE tasks ADD COLUMN agent_started_at TEXT DEFAULT '';
ALTER TABLE tasks ADD COLUMN agent_spawned_status TEXT DEFAULT '';
ALTER TABLE tasks ADD COLUMN reset_requested INTEGER DEFAULT 0;
";

const MIGRATE_TO_V3: &str = "
ALTER TABLE tasks ADD COLUMN skip_permissions INTEGER DEFAULT 0;
";

const MIGRATE_TO_V4: &str = "
CREATE TABLE task_dependencies (
    task_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    depends_on TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (task_id, depends_on),
    CHECK(task_id != depends_on)
);
CREATE INDEX idx_task_deps_depends_on ON task_dependencies(depends_on);
";

// v5 widens the status CHECK with 'brainstorm' and the agent_status CHECK
// with 'completed'. CHECK constraints cannot be altered in place, so the
// table is rebuilt at its v4-era shape and the rows copied over.
const MIGRATE_TO_V5: &str = "
CREATE TABLE tasks_new (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL CHECK(length(title) > 0 AND length(title) <= 500),
    description TEXT DEFAULT '',
    status TEXT NOT NULL DEFAULT 'backlog'
        CHECK(status IN ('backlog','brainstorm','planning','in_progress','review','done')),
    assignee TEXT DEFAULT '',
    branch_name TEXT DEFAULT '',
    pr_url TEXT DEFAULT '',
    pr_number INTEGER DEFAULT 0,
    agent_name TEXT DEFAULT '',
    agent_status TEXT DEFAULT 'idle'
        CHECK(agent_status IN ('idle','active','completed','error')),
    agent_started_at TEXT DEFAULT '',
    agent_spawned_status TEXT DEFAULT '',
    reset_requested INTEGER DEFAULT 0,
    skip_permissions INTEGER DEFAULT 0,
    position INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
INSERT INTO tasks_new
    SELECT id, title, description, status, assignee, branch_name, pr_url, pr_number,
           agent_name, agent_status, agent_started_at, agent_spawned_status,
           reset_requested, skip_permissions, position, created_at, updated_at
    FROM tasks;
DROP TABLE tasks;
ALTER TABLE tasks_new RENAME TO tasks;
CREATE INDEX idx_tasks_status ON tasks(status);
CREATE INDEX idx_tasks_assignee ON tasks(assignee);
CREATE UNIQUE INDEX idx_tasks_status_position ON tasks(status, position);
";

const MIGRATE_TO_V6: &str = "
ALTER TABLE tasks ADD COLUMN agent_activity TEXT DEFAULT '';
";

const MIGRATE_TO_V7_ENRICHMENT: &str = "
ALTER TABLE tasks ADD COLUMN enrichment_status TEXT DEFAULT ''
    CHECK(enrichment_status IN ('','pending','enriching','done','error','skipped'));
ALTER TABLE tasks ADD COLUMN enrichment_agent_name TEXT DEFAULT '';
";

const MIGRATE_TO_V7_SUGGESTIONS: &str = "
CREATE TABLE suggestions (
    id TEXT PRIMARY KEY,
    task_id TEXT DEFAULT '',
    type TEXT NOT NULL CHECK(type IN ('enrichment','proposal','hint')),
    author TEXT NOT NULL,
    title TEXT NOT NULL,
    message TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK(status IN ('pending','accepted','dismissed')),
    created_at TEXT NOT NULL
);
CREATE INDEX idx_suggestions_status ON suggestions(status);
";

// One historical branch recorded edges as (task_id, blocks_id), meaning
// "this task blocks that one". Canonical direction is (task_id, depends_on),
// so the rewrite swaps the columns while copying.
const MIGRATE_TO_V7_CONVERT_DEPS: &str = "
CREATE TABLE task_dependencies_new (
    task_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    depends_on TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (task_id, depends_on),
    CHECK(task_id != depends_on)
);
INSERT OR IGNORE INTO task_dependencies_new (task_id, depends_on, created_at)
    SELECT blocks_id, task_id, created_at FROM task_dependencies;
DROP TABLE task_dependencies;
ALTER TABLE task_dependencies_new RENAME TO task_dependencies;
CREATE INDEX idx_task_deps_depends_on ON task_dependencies(depends_on);
";

pub(crate) fn current_version(conn: &Connection) -> Result<i64> {
    if !table_exists(conn, "schema_version")? {
        return Ok(0);
    }
    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

pub(crate) fn migrate(conn: &mut Connection) -> Result<()> {
    let current = current_version(conn)?;

    if current == 0 {
        conn.execute_batch(CURRENT_SCHEMA)?;
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [SCHEMA_VERSION],
        )?;
        return Ok(());
    }

    if current > SCHEMA_VERSION {
        return Err(StoreError::Validation(format!(
            "database schema version {current} is newer than supported {SCHEMA_VERSION}"
        )));
    }

    if current < 2 {
        apply_step(conn, 2, MIGRATE_TO_V2)?;
    }
    if current < 3 {
        apply_step(conn, 3, MIGRATE_TO_V3)?;
    }
    if current < 4 {
        apply_step(conn, 4, MIGRATE_TO_V4)?;
    }
    if current < 5 {
        apply_rebuild_step(conn, 5, MIGRATE_TO_V5)?;
    }
    if current < 6 {
        apply_step(conn, 6, MIGRATE_TO_V6)?;
    }
    if current < 7 {
        converge_to_v7(conn)?;
    }

    Ok(())
}

fn apply_step(conn: &mut Connection, version: i64, sql: &str) -> Result<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    tx.execute_batch(sql)?;
    tx.execute(
        "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    tx.commit()?;
    info!(event = "schema_migrated", version);
    Ok(())
}

/// Like [`apply_step`] but for table rebuilds that would otherwise trip
/// foreign-key enforcement. The pragma must be issued outside the
/// transaction: SQLite silently ignores it inside one.
fn apply_rebuild_step(conn: &mut Connection, version: i64, sql: &str) -> Result<()> {
    conn.pragma_update(None, "foreign_keys", false)?;
    let outcome = apply_step(conn, version, sql);
    conn.pragma_update(None, "foreign_keys", true)?;
    outcome
}

/// Convergence migration. Databases reach v7 from two divergent histories:
/// one branch already carries enrichment columns and depends_on edges, the
/// other has agent_activity plus blocks_id edges. Every inspection happens
/// before the transaction begins; with a single-connection pool a query
/// against the base connection while the transaction holds it would
/// deadlock.
fn converge_to_v7(conn: &mut Connection) -> Result<()> {
    let has_enrichment = has_column(conn, "tasks", "enrichment_status")?;
    let has_suggestions = table_exists(conn, "suggestions")?;
    let has_deps_table = table_exists(conn, "task_dependencies")?;
    let has_blocks_id = if has_deps_table {
        has_column(conn, "task_dependencies", "blocks_id")?
    } else {
        false
    };

    conn.pragma_update(None, "foreign_keys", false)?;
    let outcome = (|| -> Result<()> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if !has_enrichment {
            tx.execute_batch(MIGRATE_TO_V7_ENRICHMENT)?;
        }
        if !has_suggestions {
            tx.execute_batch(MIGRATE_TO_V7_SUGGESTIONS)?;
        }
        if has_deps_table {
            if has_blocks_id {
                tx.execute_batch(MIGRATE_TO_V7_CONVERT_DEPS)?;
            }
        } else {
            tx.execute_batch(MIGRATE_TO_V4)?;
        }
        tx.execute("INSERT OR REPLACE INTO schema_version (version) VALUES (7)", [])?;
        tx.commit()?;
        Ok(())
    })();
    conn.pragma_update(None, "foreign_keys", true)?;

    if outcome.is_ok() {
        info!(event = "schema_migrated", version = 7, convergence = true);
    }
    outcome
}

pub(crate) fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub(crate) fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
