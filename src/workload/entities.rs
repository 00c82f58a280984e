use chrono::{Local, NaiveDate};
use rusqlite::params;
use tracing::warn;

use crate::error::WorkloadError;
use crate::sqlite::{SqliteConnection, SqlitePool};

const CREATE_ENTITIES: &str = "
    CREATE TABLE IF NOT EXISTS entities (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        description TEXT,
        created_at DATE NOT NULL
    )";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: NaiveDate,
}

/// Table operations over a shared pool. Each call borrows one connection,
/// commits and gives it back.
#[derive(Debug, Clone)]
pub struct EntityRepository {
    pool: SqlitePool,
}

impl EntityRepository {
    pub fn new(pool: SqlitePool) -> Self {
        EntityRepository { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn create_schema(&self) -> Result<(), WorkloadError> {
        self.pool
            .with_connection(|conn| -> Result<_, WorkloadError> {
                conn.execute_batch(CREATE_ENTITIES)?;
                conn.commit()?;
                Ok(())
            })
            .await
    }

    pub async fn insert(&self, name: &str, description: &str) -> Result<i64, WorkloadError> {
        let today = Local::now().date_naive();
        self.pool
            .with_connection(|conn| {
                transact(conn, |conn| {
                    conn.execute(
                        "INSERT INTO entities (name, description, created_at) VALUES (?1, ?2, ?3)",
                        params![name, description, today],
                    )?;
                    Ok(conn.last_insert_rowid())
                })
            })
            .await
    }

    /// Returns the number of rows changed, 0 when `id` does not exist.
    pub async fn update_description(&self, id: i64, description: &str) -> Result<usize, WorkloadError> {
        self.pool
            .with_connection(|conn| {
                transact(conn, |conn| {
                    conn.execute(
                        "UPDATE entities SET description = ?1 WHERE id = ?2",
                        params![description, id],
                    )
                })
            })
            .await
    }

    pub async fn select_all(&self) -> Result<Vec<Entity>, WorkloadError> {
        self.pool
            .with_connection(|conn| -> Result<_, WorkloadError> {
                let rows = conn.query_rows(
                    "SELECT id, name, description, created_at FROM entities ORDER BY id",
                    [],
                    |row| {
                        Ok(Entity {
                            id: row.get(0)?,
                            name: row.get(1)?,
                            description: row.get(2)?,
                            created_at: row.get(3)?,
                        })
                    },
                )?;
                Ok(rows)
            })
            .await
    }
}

/// Runs `f` inside an explicit transaction; rolls back if it fails so the
/// connection goes back to the pool clean.
fn transact<T, F>(conn: &SqliteConnection, f: F) -> Result<T, WorkloadError>
where
    F: FnOnce(&SqliteConnection) -> Result<T, rusqlite::Error>,
{
    conn.begin()?;
    match f(conn) {
        Ok(value) => {
            conn.commit()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = conn.rollback() {
                warn!(error = %rollback_err, "rollback failed");
            }
            Err(err.into())
        }
    }
}
