use rusqlite::Connection;

/// Face index schema. `active` rows are authoritative; superseded rows stay
/// with `active = 0`.
const INDEX_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS indexed_faces (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    identity      TEXT    NOT NULL,
    face_id       TEXT,
    external_id   TEXT    NOT NULL,
    collection_id TEXT    NOT NULL,
    image_url     TEXT    NOT NULL DEFAULT '',
    confidence    REAL,
    fingerprint   TEXT,
    metadata      TEXT    NOT NULL DEFAULT '{}',
    active        INTEGER NOT NULL DEFAULT 1,
    indexed_by    TEXT    NOT NULL,
    created_at    TEXT    NOT NULL,
    updated_at    TEXT    NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_indexed_faces_identity_active
    ON indexed_faces (identity, active);
";

/// Columns selected for every `IndexEntry` read, in mapping order.
pub(crate) const ENTRY_COLUMNS: &str = "id, identity, face_id, external_id, collection_id, \
     image_url, confidence, fingerprint, metadata, active, indexed_by, created_at, updated_at";

pub fn initialize(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(INDEX_SCHEMA)
}

/// Shape the directory reader expects. The directory is owned by another
/// system; this is only used to build fixtures and local test databases.
pub const DIRECTORY_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS employees (
    id_number TEXT NOT NULL,
    photo     TEXT,
    status    TEXT NOT NULL
);
";
