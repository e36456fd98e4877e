use rusqlite::Connection;

/// Run all pending migrations on the store.
///
/// Uses `PRAGMA user_version` to track which migrations have been applied.
pub fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    let version: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if version < 1 {
        migrate_v0_to_v1(conn)?;
    }

    Ok(())
}

fn migrate_v0_to_v1(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE works (
            id                  TEXT PRIMARY KEY,
            branch              TEXT NOT NULL,
            base_branch         TEXT NOT NULL,
            worktree_path       TEXT,
            root_issue          TEXT,
            auto                INTEGER NOT NULL DEFAULT 0,
            status              TEXT NOT NULL,
            pr_url              TEXT,
            pr_head_sha         TEXT,
            ci_status           TEXT NOT NULL DEFAULT 'pending',
            approval_status     TEXT NOT NULL DEFAULT 'pending',
            approvers           TEXT NOT NULL DEFAULT '[]',
            has_unseen_changes  INTEGER NOT NULL DEFAULT 0,
            mergeable           TEXT,
            last_task_seq       INTEGER NOT NULL DEFAULT 0,
            created_at          TEXT NOT NULL
        );

        CREATE TABLE tasks (
            id                  TEXT PRIMARY KEY,
            work_id             TEXT NOT NULL REFERENCES works,
            seq                 INTEGER NOT NULL,
            task_type           TEXT NOT NULL,
            status              TEXT NOT NULL,
            budget              INTEGER,
            params              TEXT,
            error               TEXT,
            created_at          TEXT NOT NULL,
            updated_at          TEXT NOT NULL,
            UNIQUE(work_id, seq)
        );

        CREATE TABLE bead_assignments (
            bead_id             TEXT PRIMARY KEY,
            work_id             TEXT NOT NULL REFERENCES works,
            task_id             TEXT REFERENCES tasks,
            status              TEXT NOT NULL DEFAULT 'pending',
            assigned_at         TEXT NOT NULL
        );

        CREATE TABLE heartbeats (
            work_id             TEXT PRIMARY KEY REFERENCES works,
            beat_at             TEXT NOT NULL
        );

        CREATE TABLE processes (
            work_id             TEXT PRIMARY KEY REFERENCES works,
            pid                 INTEGER NOT NULL,
            started_at          TEXT NOT NULL
        );

        CREATE INDEX idx_tasks_work ON tasks(work_id, seq);
        CREATE INDEX idx_tasks_status ON tasks(status, created_at);
        CREATE INDEX idx_assignments_work ON bead_assignments(work_id);
        CREATE INDEX idx_assignments_task ON bead_assignments(task_id);

        PRAGMA user_version = 1;
        ",
    )?;
    Ok(())
}
