//! Database migrations

use crate::error::{Error, Result};
use libsql::Connection;

/// Current schema version
pub const CURRENT_VERSION: i64 = 3;

/// Run all pending migrations
///
/// A store written by a newer build is refused rather than reinterpreted.
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version > CURRENT_VERSION {
        return Err(Error::IncompatibleSchema {
            found: version,
            supported: CURRENT_VERSION,
        });
    }
    if version < 1 {
        migrate_v1(conn).await?;
    }
    if version < 2 {
        migrate_v2(conn).await?;
    }
    if version < 3 {
        migrate_v3(conn).await?;
    }

    Ok(())
}

/// Get the current schema version
pub async fn get_version(conn: &Connection) -> Result<i64> {
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i64>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i64 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Migration to version 1: records, media blobs, and the sync queue
async fn migrate_v1(conn: &Connection) -> Result<()> {
    let statements = [
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        // Domain records created on this device
        "CREATE TABLE IF NOT EXISTS local_records (
            local_id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            parent_id TEXT,
            scope_id TEXT,
            sync_status TEXT NOT NULL,
            data TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_local_records_kind_scope ON local_records(kind, scope_id)",
        "CREATE INDEX IF NOT EXISTS idx_local_records_parent ON local_records(parent_id)",
        "CREATE INDEX IF NOT EXISTS idx_local_records_status ON local_records(sync_status)",
        // Binary media pending upload
        "CREATE TABLE IF NOT EXISTS media_blobs (
            blob_id TEXT PRIMARY KEY,
            record_local_id TEXT NOT NULL,
            filename TEXT NOT NULL,
            mime_type TEXT NOT NULL,
            size_bytes INTEGER NOT NULL,
            bytes BLOB NOT NULL,
            created_at INTEGER NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_media_blobs_record ON media_blobs(record_local_id)",
        // Write-ahead queue of remote mutations
        "CREATE TABLE IF NOT EXISTS sync_queue (
            id TEXT PRIMARY KEY,
            action TEXT NOT NULL,
            payload TEXT NOT NULL,
            depends_on TEXT NOT NULL DEFAULT '[]',
            target_local_id TEXT NOT NULL,
            status TEXT NOT NULL,
            retry_count INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_sync_queue_status ON sync_queue(status)",
        "CREATE INDEX IF NOT EXISTS idx_sync_queue_created ON sync_queue(created_at)",
        "CREATE INDEX IF NOT EXISTS idx_sync_queue_target ON sync_queue(target_local_id)",
        "INSERT INTO schema_version (version) VALUES (1)",
    ];

    apply(conn, &statements).await?;
    tracing::info!("Migrated local store to version 1");
    Ok(())
}

/// Migration to version 2: id mappings and page snapshots
async fn migrate_v2(conn: &Connection) -> Result<()> {
    let statements = [
        "CREATE TABLE IF NOT EXISTS id_mappings (
            local_key TEXT PRIMARY KEY,
            remote_id TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )",
        "CREATE TABLE IF NOT EXISTS page_snapshots (
            page_id TEXT PRIMARY KEY,
            page_type TEXT NOT NULL,
            data TEXT NOT NULL,
            data_version TEXT NOT NULL,
            snapshot_at INTEGER NOT NULL,
            schema_version INTEGER NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_page_snapshots_type ON page_snapshots(page_type)",
        "INSERT INTO schema_version (version) VALUES (2)",
    ];

    apply(conn, &statements).await?;
    tracing::info!("Migrated local store to version 2");
    Ok(())
}

/// Migration to version 3: reverse lookup of id mappings by remote id
async fn migrate_v3(conn: &Connection) -> Result<()> {
    let statements = [
        "CREATE INDEX IF NOT EXISTS idx_id_mappings_remote ON id_mappings(remote_id)",
        "INSERT INTO schema_version (version) VALUES (3)",
    ];

    apply(conn, &statements).await?;
    tracing::info!("Migrated local store to version {CURRENT_VERSION}");
    Ok(())
}

/// Run statements in one transaction, rolling back on the first failure
async fn apply(conn: &Connection, statements: &[&str]) -> Result<()> {
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }
    Ok(())
}
