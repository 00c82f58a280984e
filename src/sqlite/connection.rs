use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Params, Row};

/// One open SQLite connection. Statements run in autocommit mode unless
/// [`begin`](Self::begin) opened an explicit transaction.
pub struct SqliteConnection {
    conn: rusqlite::Connection,
    path: PathBuf,
}

impl SqliteConnection {
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self, rusqlite::Error> {
        let conn = rusqlite::Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        Ok(SqliteConnection {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn execute<P: Params>(&self, sql: &str, params: P) -> Result<usize, rusqlite::Error> {
        self.conn.execute(sql, params)
    }

    pub fn execute_batch(&self, sql: &str) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch(sql)
    }

    pub fn query_rows<T, P, F>(&self, sql: &str, params: P, map: F) -> Result<Vec<T>, rusqlite::Error>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> Result<T, rusqlite::Error>,
    {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, map)?;
        rows.collect()
    }

    pub fn last_insert_rowid(&self) -> i64 {
        self.conn.last_insert_rowid()
    }

    pub fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    pub fn begin(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch("BEGIN")
    }

    /// No-op when no transaction is open.
    pub fn commit(&self) -> Result<(), rusqlite::Error> {
        if self.in_transaction() {
            self.conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    pub fn rollback(&self) -> Result<(), rusqlite::Error> {
        if self.in_transaction() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    pub fn close(self) -> Result<(), rusqlite::Error> {
        self.conn.close().map_err(|(_, err)| err)
    }
}
