//! facesync-core: Face index reconciliation engine.
//!
//! Decides, per employee, whether a reference photo changed since the last
//! sync (URL identity, HTTP metadata, dHash equality) and drives the face
//! service and index store accordingly.

pub mod change;
pub mod collaborators;
pub mod fingerprint;
pub mod reconcile;
pub mod types;

#[cfg(test)]
pub(crate) mod testutil;

pub use change::{Classification, ChangeReason};
pub use collaborators::{
    FaceIndexer, FetchError, ImageFetcher, IndexStore, RegisteredFace, RemoteError,
    SourceDirectory, StoreError,
};
pub use fingerprint::{compute_fingerprint, Fingerprint, FingerprintError};
pub use reconcile::{backfill_fingerprints, ReconcileError, ReconcileOptions, Reconciler};
pub use types::{
    BackfillSummary, EntryMetadata, IndexEntry, NewIndexEntry, Outcome, ResourceMetadata,
    RunSummary, SourceRecord,
};
