use crate::error::Result;
use facesync_core::{SourceDirectory, SourceRecord, StoreError};
use rusqlite::{params, Connection, OpenFlags};
use std::path::Path;

/// Latest row per identity among active employees with a non-empty photo.
/// `rowid` is the last-writer-wins ordering key.
const ACTIVE_EMPLOYEES: &str = "
SELECT e.rowid, CAST(e.id_number AS TEXT), TRIM(e.photo), e.status
FROM employees e
WHERE e.status = ?1
  AND TRIM(COALESCE(e.photo, '')) != ''
  AND e.rowid = (
      SELECT MAX(x.rowid) FROM employees x
      WHERE x.id_number = e.id_number
        AND x.status = ?1
        AND TRIM(COALESCE(x.photo, '')) != '')
ORDER BY e.id_number";

/// Read-only view of the employee directory (`employees` table).
pub struct SqliteDirectory {
    conn: Connection,
    active_status: String,
}

impl SqliteDirectory {
    /// Open the directory database read-only.
    pub fn open(path: &Path, active_status: impl Into<String>) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self::from_connection(conn, active_status))
    }

    pub fn from_connection(conn: Connection, active_status: impl Into<String>) -> Self {
        Self {
            conn,
            active_status: active_status.into(),
        }
    }

    fn load(&self) -> Result<Vec<SourceRecord>> {
        let mut stmt = self.conn.prepare(ACTIVE_EMPLOYEES)?;
        let records = stmt
            .query_map(params![self.active_status], |row| {
                Ok(SourceRecord {
                    revision: row.get(0)?,
                    identity: row.get::<_, String>(1)?.trim().to_string(),
                    image_reference: row.get(2)?,
                    status: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

impl SourceDirectory for SqliteDirectory {
    fn active_records(&self) -> std::result::Result<Vec<SourceRecord>, StoreError> {
        let records = self.load()?;
        tracing::debug!(count = records.len(), "loaded active employees");
        Ok(records)
    }
}
