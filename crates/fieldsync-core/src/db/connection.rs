//! Opening the device-local libSQL store

use crate::error::Result;
use libsql::{Builder, Connection, Database as LibSqlDatabase};
use std::path::Path;

use super::migrations;

/// Device-local libSQL store.
///
/// The database handle is kept alive alongside its single connection.
pub struct Database {
    _db: LibSqlDatabase,
    conn: Connection,
}

impl Database {
    /// Open (or create) the store file at `path` and bring its schema up to date.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_local(&path.as_ref().to_string_lossy()).await
    }

    /// Open a throwaway in-memory store.
    pub async fn open_in_memory() -> Result<Self> {
        Self::open_local(":memory:").await
    }

    async fn open_local(target: &str) -> Result<Self> {
        let db = Builder::new_local(target).build().await?;
        let conn = db.connect()?;
        apply_pragmas(&conn).await?;
        migrations::run(&conn).await?;
        tracing::debug!("Local store ready at {target}");
        Ok(Self { _db: db, conn })
    }

    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// Single-writer device settings. WAL is best effort: in-memory stores refuse it.
async fn apply_pragmas(conn: &Connection) -> Result<()> {
    for pragma in ["PRAGMA journal_mode = WAL;", "PRAGMA synchronous = NORMAL;"] {
        if let Err(error) = conn.execute(pragma, ()).await {
            tracing::debug!("Skipped `{pragma}`: {error}");
        }
    }
    conn.execute("PRAGMA foreign_keys = ON;", ()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_open_in_memory() {
        let db = Database::open_in_memory().await.unwrap();
        let mut rows = db.connection().query("SELECT 1", ()).await.unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<i64>(0).unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_open_on_disk_survives_reopen() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("fieldsync.db");

        {
            let db = Database::open(&path).await.unwrap();
            db.connection()
                .execute(
                    "INSERT INTO id_mappings (local_key, remote_id, created_at) VALUES ('a', 'srv-1', 0)",
                    (),
                )
                .await
                .unwrap();
        }

        let db = Database::open(&path).await.unwrap();
        let mut rows = db
            .connection()
            .query("SELECT remote_id FROM id_mappings WHERE local_key = 'a'", ())
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<String>(0).unwrap(), "srv-1");
    }
}
