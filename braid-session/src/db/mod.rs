pub mod assignments;
pub mod heartbeats;
pub mod migrations;
pub mod processes;
pub mod tasks;
pub mod works;

use std::path::Path;

use rusqlite::Connection;

/// Open or create the SQLite store at the given path.
///
/// Sets WAL journal mode and enables foreign keys.
/// Creates parent directories if needed.
pub fn open_or_create(path: &Path) -> rusqlite::Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN),
                Some(format!("Cannot create directory {}: {}", parent.display(), e)),
            )
        })?;
    }

    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(conn)
}

/// Open the store and run pending migrations.
pub fn open_and_migrate(path: &Path) -> rusqlite::Result<Connection> {
    let conn = open_or_create(path)?;
    migrations::migrate(&conn)?;
    Ok(conn)
}

/// Extension trait to convert rusqlite::Error to Option for query_row.
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> rusqlite::Result<Option<T>>;
}

impl<T> OptionalExt<T> for rusqlite::Result<T> {
    fn optional(self) -> rusqlite::Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Create an in-memory store with migrations applied, for testing.
#[cfg(test)]
pub fn test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    conn.pragma_update(None, "foreign_keys", "ON").expect("enable foreign keys");
    migrations::migrate(&conn).expect("run migrations");
    conn
}
