//! SQLite-backed storage.
//!
//! rusqlite is synchronous; one connection behind a mutex is enough here.
//! The engine serializes delta writes itself, and vacuum only deletes rows
//! strictly older than the oldest retained recovery point, so it can run
//! concurrently with ongoing mutation.

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use super::types::{ClientRecord, DeltaRecord, SnapshotRecord};
use super::SyncStorage;
use crate::error::{EngineError, EngineResult};
use crate::state::{Version, WorkspaceId};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS deltas (
    version INTEGER PRIMARY KEY,
    workspace_id TEXT NOT NULL,
    previous_version INTEGER NOT NULL,
    payload BLOB NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_deltas_workspace ON deltas (workspace_id, version);

CREATE TABLE IF NOT EXISTS snapshots (
    workspace_id TEXT NOT NULL,
    version INTEGER NOT NULL,
    payload BLOB NOT NULL,
    PRIMARY KEY (workspace_id, version)
);

CREATE TABLE IF NOT EXISTS clients (
    client_id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL,
    last_ack_version INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_clients_workspace ON clients (workspace_id);
";

pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> EngineResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                EngineError::Storage(format!(
                    "failed to create database directory {}: {error}",
                    parent.display()
                ))
            })?;
        }
        let conn = Connection::open(path)?;
        Self::initialize(conn)
    }

    /// An in-memory database, mainly for tests.
    pub fn memory() -> EngineResult<Self> {
        Self::initialize(Connection::open_in_memory()?)
    }

    fn initialize(conn: Connection) -> EngineResult<Self> {
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        conn.execute_batch(SCHEMA)?;
        debug!("sync database initialized");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

impl SyncStorage for SqliteStorage {
    fn store_delta(
        &self,
        workspace_id: &str,
        version: Version,
        previous_version: Version,
        payload: &[u8],
    ) -> EngineResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO deltas (version, workspace_id, previous_version, payload)
             VALUES (?1, ?2, ?3, ?4)",
            params![version as i64, workspace_id, previous_version as i64, payload],
        )?;
        Ok(())
    }

    fn deltas_since(
        &self,
        workspace_id: &str,
        since_version: Version,
    ) -> EngineResult<Vec<DeltaRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT version, previous_version, payload FROM deltas
             WHERE workspace_id = ?1 AND version > ?2 ORDER BY version ASC",
        )?;
        let rows = stmt.query_map(params![workspace_id, since_version as i64], |row| {
            Ok(DeltaRecord {
                workspace_id: workspace_id.to_string(),
                version: row.get::<_, i64>(0)? as Version,
                previous_version: row.get::<_, i64>(1)? as Version,
                payload: row.get(2)?,
            })
        })?;
        let mut deltas = Vec::new();
        for row in rows {
            deltas.push(row?);
        }
        Ok(deltas)
    }

    fn store_snapshot(
        &self,
        workspace_id: &str,
        version: Version,
        payload: &[u8],
    ) -> EngineResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO snapshots (workspace_id, version, payload)
             VALUES (?1, ?2, ?3)",
            params![workspace_id, version as i64, payload],
        )?;
        Ok(())
    }

    fn snapshot_at(
        &self,
        workspace_id: &str,
        version: Version,
    ) -> EngineResult<Option<SnapshotRecord>> {
        let conn = self.conn.lock();
        let record = conn
            .query_row(
                "SELECT payload FROM snapshots WHERE workspace_id = ?1 AND version = ?2",
                params![workspace_id, version as i64],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?
            .map(|payload| SnapshotRecord {
                workspace_id: workspace_id.to_string(),
                version,
                payload,
            });
        Ok(record)
    }

    fn snapshot_at_or_before(
        &self,
        workspace_id: &str,
        version: Version,
    ) -> EngineResult<Option<SnapshotRecord>> {
        let conn = self.conn.lock();
        let record = conn
            .query_row(
                "SELECT version, payload FROM snapshots
                 WHERE workspace_id = ?1 AND version <= ?2
                 ORDER BY version DESC LIMIT 1",
                params![workspace_id, version as i64],
                |row| {
                    Ok(SnapshotRecord {
                        workspace_id: workspace_id.to_string(),
                        version: row.get::<_, i64>(0)? as Version,
                        payload: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    fn latest_snapshot(&self, workspace_id: &str) -> EngineResult<Option<SnapshotRecord>> {
        self.snapshot_at_or_before(workspace_id, Version::MAX)
    }

    fn latest_version(&self) -> EngineResult<Version> {
        let conn = self.conn.lock();
        let version: Option<i64> =
            conn.query_row("SELECT MAX(version) FROM deltas", [], |row| row.get(0))?;
        Ok(version.unwrap_or(0) as Version)
    }

    fn workspace_ids(&self) -> EngineResult<Vec<WorkspaceId>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT workspace_id FROM deltas
             UNION SELECT workspace_id FROM snapshots
             ORDER BY workspace_id",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    fn register_client(&self, client_id: &str, workspace_id: &str) -> EngineResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO clients (client_id, workspace_id, last_ack_version)
             VALUES (?1, ?2, 0)
             ON CONFLICT (client_id) DO UPDATE
             SET workspace_id = excluded.workspace_id, last_ack_version = 0",
            params![client_id, workspace_id],
        )?;
        Ok(())
    }

    fn update_client_ack(&self, client_id: &str, version: Version) -> EngineResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE clients SET last_ack_version = ?2
             WHERE client_id = ?1 AND last_ack_version < ?2",
            params![client_id, version as i64],
        )?;
        Ok(())
    }

    fn remove_client(&self, client_id: &str) -> EngineResult<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM clients WHERE client_id = ?1", params![client_id])?;
        Ok(())
    }

    fn workspace_clients(&self, workspace_id: &str) -> EngineResult<Vec<ClientRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT client_id, last_ack_version FROM clients
             WHERE workspace_id = ?1 ORDER BY client_id",
        )?;
        let rows = stmt.query_map(params![workspace_id], |row| {
            Ok(ClientRecord {
                client_id: row.get(0)?,
                workspace_id: workspace_id.to_string(),
                last_ack_version: row.get::<_, i64>(1)? as Version,
            })
        })?;
        let mut clients = Vec::new();
        for row in rows {
            clients.push(row?);
        }
        Ok(clients)
    }

    fn vacuum(&self, keep_snapshots: usize, keep_delta_generations: u64) -> EngineResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut workspaces_stmt =
                tx.prepare("SELECT DISTINCT workspace_id FROM snapshots")?;
            let workspaces: Vec<String> = workspaces_stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<_, _>>()?;

            for workspace_id in workspaces {
                let mut versions_stmt = tx.prepare(
                    "SELECT version FROM snapshots WHERE workspace_id = ?1
                     ORDER BY version DESC",
                )?;
                let versions: Vec<i64> = versions_stmt
                    .query_map(params![workspace_id], |row| row.get(0))?
                    .collect::<Result<_, _>>()?;
                let Some(&oldest_retained) = versions.iter().take(keep_snapshots).last()
                else {
                    continue;
                };

                tx.execute(
                    "DELETE FROM snapshots WHERE workspace_id = ?1 AND version < ?2",
                    params![workspace_id, oldest_retained],
                )?;
                let cutoff = (oldest_retained as Version).saturating_sub(keep_delta_generations);
                tx.execute(
                    "DELETE FROM deltas WHERE workspace_id = ?1 AND version <= ?2",
                    params![workspace_id, cutoff as i64],
                )?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store_n_deltas(storage: &SqliteStorage, workspace_id: &str, n: u64) {
        for version in 1..=n {
            storage
                .store_delta(workspace_id, version, version - 1, b"{}")
                .expect("store delta");
        }
    }

    #[test]
    fn delta_roundtrip_on_disk() {
        let dir = tempdir().expect("tempdir");
        let storage = SqliteStorage::open(&dir.path().join("sync.db")).expect("open");

        storage
            .store_delta("ws-1", 1, 0, b"payload-bytes")
            .expect("store");
        let deltas = storage.deltas_since("ws-1", 0).expect("deltas");
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].version, 1);
        assert_eq!(deltas[0].previous_version, 0);
        assert_eq!(deltas[0].payload, b"payload-bytes");
    }

    #[test]
    fn duplicate_version_is_rejected() {
        let storage = SqliteStorage::memory().expect("open");
        storage.store_delta("ws-1", 1, 0, b"a").expect("store");
        assert!(storage.store_delta("ws-2", 1, 0, b"b").is_err());
    }

    #[test]
    fn deltas_since_orders_ascending() {
        let storage = SqliteStorage::memory().expect("open");
        store_n_deltas(&storage, "ws-1", 4);

        let deltas = storage.deltas_since("ws-1", 1).expect("deltas");
        let versions: Vec<Version> = deltas.iter().map(|delta| delta.version).collect();
        assert_eq!(versions, vec![2, 3, 4]);
    }

    #[test]
    fn snapshot_lookups() {
        let storage = SqliteStorage::memory().expect("open");
        storage.store_snapshot("ws-1", 100, b"s100").expect("store");
        storage.store_snapshot("ws-1", 200, b"s200").expect("store");

        assert!(storage.snapshot_at("ws-1", 150).expect("exact").is_none());
        assert_eq!(
            storage
                .snapshot_at_or_before("ws-1", 150)
                .expect("before")
                .unwrap()
                .version,
            100
        );
        assert_eq!(
            storage.latest_snapshot("ws-1").expect("latest").unwrap().version,
            200
        );
        assert!(storage.latest_snapshot("ws-2").expect("none").is_none());
    }

    #[test]
    fn snapshot_overwrite_at_same_version() {
        let storage = SqliteStorage::memory().expect("open");
        storage.store_snapshot("ws-1", 10, b"old").expect("store");
        storage.store_snapshot("ws-1", 10, b"new").expect("replace");
        assert_eq!(
            storage.snapshot_at("ws-1", 10).expect("exact").unwrap().payload,
            b"new"
        );
    }

    #[test]
    fn client_lifecycle_and_monotonic_ack() {
        let storage = SqliteStorage::memory().expect("open");
        storage.register_client("client-1", "ws-1").expect("register");
        storage.update_client_ack("client-1", 8).expect("ack");
        storage.update_client_ack("client-1", 2).expect("stale ack");

        let clients = storage.workspace_clients("ws-1").expect("clients");
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].last_ack_version, 8);

        // Re-registering resets the position for a fresh catch-up cycle.
        storage.register_client("client-1", "ws-1").expect("re-register");
        let clients = storage.workspace_clients("ws-1").expect("clients");
        assert_eq!(clients[0].last_ack_version, 0);

        storage.remove_client("client-1").expect("remove");
        assert!(storage.workspace_clients("ws-1").expect("clients").is_empty());
    }

    #[test]
    fn workspace_ids_spans_deltas_and_snapshots() {
        let storage = SqliteStorage::memory().expect("open");
        storage.store_delta("ws-b", 1, 0, b"{}").expect("store");
        storage.store_snapshot("ws-a", 5, b"s").expect("store");

        assert_eq!(
            storage.workspace_ids().expect("ids"),
            vec!["ws-a".to_string(), "ws-b".to_string()]
        );
    }

    #[test]
    fn vacuum_respects_recovery_horizon() {
        let storage = SqliteStorage::memory().expect("open");
        store_n_deltas(&storage, "ws-1", 30);
        storage.store_snapshot("ws-1", 10, b"s10").expect("store");
        storage.store_snapshot("ws-1", 20, b"s20").expect("store");
        storage.store_snapshot("ws-1", 30, b"s30").expect("store");

        storage.vacuum(2, 5).expect("vacuum");

        assert!(storage.snapshot_at("ws-1", 10).expect("s10").is_none());
        assert!(storage.snapshot_at("ws-1", 20).expect("s20").is_some());

        let deltas = storage.deltas_since("ws-1", 0).expect("deltas");
        assert_eq!(deltas.first().unwrap().version, 16);
        assert_eq!(deltas.last().unwrap().version, 30);
    }

    #[test]
    fn vacuum_without_snapshots_deletes_nothing() {
        let storage = SqliteStorage::memory().expect("open");
        store_n_deltas(&storage, "ws-1", 10);
        storage.vacuum(3, 5).expect("vacuum");
        assert_eq!(storage.deltas_since("ws-1", 0).expect("deltas").len(), 10);
    }
}
