//! Seams between the reconciler and the outside world.
//!
//! All traits are synchronous: the reconciler runs on a dedicated engine
//! thread and processes one record at a time.

use crate::fingerprint::Fingerprint;
use crate::types::{EntryMetadata, IndexEntry, NewIndexEntry, ResourceMetadata, SourceRecord};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(String),
    #[error("serialization: {0}")]
    Serialization(String),
    #[error("entry {0} not found")]
    NotFound(i64),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("response too small: {0} bytes")]
    TooSmall(u64),
    #[error("response too large: more than {0} bytes")]
    TooLarge(u64),
    #[error("network error: {0}")]
    Network(String),
}

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("no face detected in image")]
    NoFaceDetected,
    #[error("face service rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("face service request timed out")]
    Timeout,
    #[error("face service unreachable: {0}")]
    Network(String),
    #[error("malformed face service response: {0}")]
    BadResponse(String),
}

/// Read-only employee directory.
pub trait SourceDirectory {
    /// Active employees with a non-empty image reference.
    fn active_records(&self) -> Result<Vec<SourceRecord>, StoreError>;
}

/// Persisted face index. Entries are deactivated, never deleted.
pub trait IndexStore {
    /// Active entries ordered by id, optionally restricted to one identity.
    fn active_entries(&self, identity: Option<&str>) -> Result<Vec<IndexEntry>, StoreError>;

    /// Insert a new active entry, returning its id.
    fn insert_entry(&mut self, entry: &NewIndexEntry) -> Result<i64, StoreError>;

    fn update_source(
        &mut self,
        id: i64,
        image_url: &str,
        metadata: &EntryMetadata,
    ) -> Result<(), StoreError>;

    fn set_fingerprint(&mut self, id: i64, fingerprint: Fingerprint) -> Result<(), StoreError>;

    fn deactivate(&mut self, id: i64) -> Result<(), StoreError>;

    /// Deactivate every active entry that is not the newest (highest id) for
    /// its identity. Returns the entries that were deactivated.
    fn collapse_duplicates(&mut self) -> Result<Vec<IndexEntry>, StoreError>;
}

/// HTTP access to employee photos.
pub trait ImageFetcher {
    /// Cheap metadata probe (HEAD). Callers treat failure as "unknown".
    fn probe(&self, url: &str) -> Result<ResourceMetadata, FetchError>;

    /// Download the full image. Implementations reject bodies below the
    /// fingerprint floor and enforce a timeout.
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Face returned by a successful registration.
#[derive(Debug, Clone)]
pub struct RegisteredFace {
    pub face_id: String,
    pub confidence: Option<f32>,
    /// Raw provider record, stored verbatim in the entry metadata.
    pub details: serde_json::Value,
}

/// Remote face-recognition collection.
pub trait FaceIndexer {
    fn register(
        &self,
        image: &[u8],
        external_id: &str,
        collection_id: &str,
    ) -> Result<RegisteredFace, RemoteError>;

    /// Unknown face ids are not an error.
    fn deregister(&self, face_id: &str, collection_id: &str) -> Result<(), RemoteError>;
}
