use crate::error::{Error, Result};
use crate::schema::{self, ENTRY_COLUMNS};
use facesync_core::{
    EntryMetadata, Fingerprint, IndexEntry, IndexStore, NewIndexEntry, StoreError,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

/// SQLite-backed face index.
///
/// One instance holds one connection; the daemon opens a store per run and
/// drops it when the run ends.
pub struct SqliteIndexStore {
    conn: Connection,
}

impl SqliteIndexStore {
    /// Open or create the index at `path` with WAL mode.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory index (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn get(&self, id: i64) -> Result<Option<IndexEntry>> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM indexed_faces WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id], map_entry)
            .optional()?)
    }

    fn load_active(&self, identity: Option<&str>) -> Result<Vec<IndexEntry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM indexed_faces
             WHERE active = 1 AND (?1 IS NULL OR identity = ?1)
             ORDER BY id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let entries = stmt
            .query_map(params![identity], map_entry)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn insert(&mut self, entry: &NewIndexEntry) -> Result<i64> {
        let metadata = serde_json::to_string(&entry.metadata)?;
        let now = now();
        self.conn.execute(
            "INSERT INTO indexed_faces
                (identity, face_id, external_id, collection_id, image_url, confidence,
                 fingerprint, metadata, active, indexed_by, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?9, ?10, ?10)",
            params![
                entry.identity,
                entry.face_id,
                entry.external_id,
                entry.collection_id,
                entry.image_url,
                entry.confidence.map(f64::from),
                entry.fingerprint.to_string(),
                metadata,
                entry.indexed_by,
                now,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_row(&self, id: i64, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<()> {
        let changed = self.conn.execute(sql, params)?;
        if changed == 0 {
            return Err(Error::NotFound(id));
        }
        Ok(())
    }

    fn collapse(&mut self) -> Result<Vec<IndexEntry>> {
        const SUPERSEDED: &str = "active = 1 AND EXISTS (
            SELECT 1 FROM indexed_faces newer
            WHERE TRIM(newer.identity) = TRIM(indexed_faces.identity)
              AND newer.active = 1
              AND newer.id > indexed_faces.id)";

        let tx = self.conn.transaction()?;
        let collapsed = {
            let sql = format!("SELECT {ENTRY_COLUMNS} FROM indexed_faces WHERE {SUPERSEDED} ORDER BY id");
            let mut stmt = tx.prepare(&sql)?;
            let rows = stmt
                .query_map([], map_entry)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        };
        if !collapsed.is_empty() {
            tx.execute(
                &format!("UPDATE indexed_faces SET active = 0, updated_at = ?1 WHERE {SUPERSEDED}"),
                params![now()],
            )?;
        }
        tx.commit()?;

        Ok(collapsed
            .into_iter()
            .map(|mut e| {
                e.active = false;
                e
            })
            .collect())
    }
}

impl IndexStore for SqliteIndexStore {
    fn active_entries(&self, identity: Option<&str>) -> std::result::Result<Vec<IndexEntry>, StoreError> {
        Ok(self.load_active(identity)?)
    }

    fn insert_entry(&mut self, entry: &NewIndexEntry) -> std::result::Result<i64, StoreError> {
        Ok(self.insert(entry)?)
    }

    fn update_source(
        &mut self,
        id: i64,
        image_url: &str,
        metadata: &EntryMetadata,
    ) -> std::result::Result<(), StoreError> {
        let metadata = serde_json::to_string(metadata).map_err(Error::from)?;
        Ok(self.update_row(
            id,
            "UPDATE indexed_faces SET image_url = ?1, metadata = ?2, updated_at = ?3 WHERE id = ?4",
            params![image_url, metadata, now(), id],
        )?)
    }

    fn set_fingerprint(
        &mut self,
        id: i64,
        fingerprint: Fingerprint,
    ) -> std::result::Result<(), StoreError> {
        Ok(self.update_row(
            id,
            "UPDATE indexed_faces SET fingerprint = ?1, updated_at = ?2 WHERE id = ?3",
            params![fingerprint.to_string(), now(), id],
        )?)
    }

    fn deactivate(&mut self, id: i64) -> std::result::Result<(), StoreError> {
        Ok(self.update_row(
            id,
            "UPDATE indexed_faces SET active = 0, updated_at = ?1 WHERE id = ?2",
            params![now(), id],
        )?)
    }

    fn collapse_duplicates(&mut self) -> std::result::Result<Vec<IndexEntry>, StoreError> {
        Ok(self.collapse()?)
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Map a row selected with `ENTRY_COLUMNS`.
///
/// Unreadable fingerprints or metadata are logged and treated as absent so a
/// single bad row cannot fail a whole run; the next pass rewrites them.
fn map_entry(row: &Row<'_>) -> rusqlite::Result<IndexEntry> {
    let id: i64 = row.get(0)?;
    let fingerprint: Option<String> = row.get(7)?;
    let metadata: String = row.get(8)?;

    let fingerprint = fingerprint.and_then(|raw| match raw.parse::<Fingerprint>() {
        Ok(fp) => Some(fp),
        Err(err) => {
            tracing::warn!(id, raw = %raw, error = %err, "ignoring unreadable fingerprint");
            None
        }
    });

    let metadata = serde_json::from_str::<EntryMetadata>(&metadata).unwrap_or_else(|err| {
        tracing::warn!(id, error = %err, "ignoring unreadable entry metadata");
        EntryMetadata::default()
    });

    Ok(IndexEntry {
        id,
        identity: row.get(1)?,
        face_id: row.get(2)?,
        external_id: row.get(3)?,
        collection_id: row.get(4)?,
        image_url: row.get(5)?,
        confidence: row.get::<_, Option<f64>>(6)?.map(|v| v as f32),
        fingerprint,
        metadata,
        active: row.get::<_, i64>(9)? != 0,
        indexed_by: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}
