//! Reconciliation pass: source directory → change detection → face service → index store.
//!
//! One `Reconciler` borrows its collaborators for the duration of a pass.
//! Records are processed strictly one at a time; per-record failures are
//! counted and never abort the pass, while store failures during the initial
//! load and duplicate collapse are fatal.

use crate::change::{self, ChangeReason, Classification};
use crate::collaborators::{
    FaceIndexer, FetchError, ImageFetcher, IndexStore, RemoteError, SourceDirectory, StoreError,
};
use crate::fingerprint::{compute_fingerprint, Fingerprint, FingerprintError};
use crate::types::{
    BackfillSummary, EntryMetadata, IndexEntry, NewIndexEntry, Outcome, ResourceMetadata,
    RunSummary, SourceRecord,
};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

const DEFAULT_EXTERNAL_ID_PREFIX: &str = "employee_";
const DEFAULT_INDEXED_BY: &str = "SYNC";
const DEFAULT_ACTIVE_STATUS: &str = "ACTIVO";
const BACKFILL_PROGRESS_EVERY: usize = 10;

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("image fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("fingerprint failed: {0}")]
    Fingerprint(#[from] FingerprintError),
    #[error("face service: {0}")]
    Remote(#[from] RemoteError),
    #[error("index store: {0}")]
    Store(#[from] StoreError),
}

/// Per-deployment settings for a reconciliation pass.
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Face collection new registrations go to.
    pub collection_id: String,
    /// Prefix joined with a record's image reference to form its URL.
    pub image_base_url: String,
    pub external_id_prefix: String,
    /// Actor tag written on inserted entries.
    pub indexed_by: String,
    /// Source status value marking a record as active; other records are ignored.
    pub active_status: String,
}

impl ReconcileOptions {
    pub fn new(collection_id: impl Into<String>, image_base_url: impl Into<String>) -> Self {
        Self {
            collection_id: collection_id.into(),
            image_base_url: image_base_url.into(),
            external_id_prefix: DEFAULT_EXTERNAL_ID_PREFIX.to_string(),
            indexed_by: DEFAULT_INDEXED_BY.to_string(),
            active_status: DEFAULT_ACTIVE_STATUS.to_string(),
        }
    }

    pub fn is_active(&self, record: &SourceRecord) -> bool {
        record.status.trim() == self.active_status
    }

    pub fn image_url(&self, image_reference: &str) -> String {
        format!("{}{}", self.image_base_url, image_reference.trim())
    }

    pub fn external_id(&self, identity: &str) -> String {
        format!("{}{}", self.external_id_prefix, identity)
    }
}

pub struct Reconciler<'a> {
    directory: &'a dyn SourceDirectory,
    store: &'a mut dyn IndexStore,
    fetcher: &'a dyn ImageFetcher,
    faces: &'a dyn FaceIndexer,
    options: &'a ReconcileOptions,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        directory: &'a dyn SourceDirectory,
        store: &'a mut dyn IndexStore,
        fetcher: &'a dyn ImageFetcher,
        faces: &'a dyn FaceIndexer,
        options: &'a ReconcileOptions,
    ) -> Self {
        Self {
            directory,
            store,
            fetcher,
            faces,
            options,
        }
    }

    /// Run one full reconciliation pass over every active source record.
    pub fn run(&mut self) -> Result<RunSummary, ReconcileError> {
        let span = tracing::info_span!("reconcile", run_id = %Uuid::new_v4());
        let _enter = span.enter();
        let mut summary = RunSummary::default();

        // Pre-pass: restore the single-active-entry invariant left by partial runs.
        let collapsed = self.store.collapse_duplicates()?;
        if !collapsed.is_empty() {
            tracing::info!(count = collapsed.len(), "collapsed duplicate active entries");
        }
        for entry in &collapsed {
            self.release_remote(entry);
        }
        summary.collapsed = collapsed.len();

        let mut by_identity: HashMap<String, Vec<IndexEntry>> = HashMap::new();
        let mut indexed = 0usize;
        for entry in self.store.active_entries(None)? {
            indexed += 1;
            by_identity
                .entry(entry.identity.trim().to_string())
                .or_default()
                .push(entry);
        }

        let (active, inactive): (Vec<_>, Vec<_>) = self
            .directory
            .active_records()?
            .into_iter()
            .partition(|r| self.options.is_active(r));
        if !inactive.is_empty() {
            tracing::debug!(count = inactive.len(), "skipping records without active status");
        }
        let records = SourceRecord::reduce_by_identity(active);
        summary.total = records.len();
        tracing::info!(sources = records.len(), indexed, "reconciliation started");

        for record in &records {
            // Reduction leaves one record per identity, so each identity is visited once.
            let existing = by_identity.remove(&record.identity).unwrap_or_default();
            let outcome = self.reconcile_record(record, &existing);

            match &outcome {
                Outcome::Errored(err) => {
                    tracing::warn!(identity = %record.identity, error = %err, "record failed")
                }
                Outcome::Unchanged => {}
                other => tracing::info!(identity = %record.identity, outcome = ?other, "record reconciled"),
            }
            summary.record(&outcome);
        }

        tracing::info!(
            new = summary.new,
            updated = summary.updated,
            ignored = summary.ignored,
            errored = summary.errored,
            "reconciliation finished"
        );
        Ok(summary)
    }

    fn reconcile_record(&mut self, record: &SourceRecord, existing: &[IndexEntry]) -> Outcome {
        let url = self.options.image_url(&record.image_reference);

        let current = match self.fetcher.probe(&url) {
            Ok(meta) => meta,
            Err(err) => {
                tracing::debug!(url = %url, error = %err, "metadata probe failed");
                ResourceMetadata::unknown()
            }
        };

        let classification = change::classify(&url, existing, &current);
        let Some(reason) = classification.reason() else {
            return Outcome::Unchanged;
        };
        tracing::debug!(identity = %record.identity, ?reason, "change detected");

        match self.apply_change(record, &url, existing, classification, reason, current) {
            Ok(outcome) => outcome,
            Err(err) => Outcome::Errored(err),
        }
    }

    fn apply_change(
        &mut self,
        record: &SourceRecord,
        url: &str,
        existing: &[IndexEntry],
        classification: Classification,
        reason: ChangeReason,
        current: ResourceMetadata,
    ) -> Result<Outcome, ReconcileError> {
        let image = self.fetcher.fetch(url)?;
        let fingerprint = compute_fingerprint(&image)?;

        if let Some(matched) = change::second_chance(fingerprint, existing) {
            let metadata = matched.metadata.with_http(current);
            self.store.update_source(matched.id, url, &metadata)?;
            self.supersede(existing.iter().filter(|e| e.id != matched.id))?;

            return Ok(if classification.url_match() == Some(matched.id) {
                Outcome::MetadataRefreshed
            } else {
                Outcome::MergedDuplicate
            });
        }

        if !existing.is_empty() {
            tracing::info!(identity = %record.identity, count = existing.len(), "replacing previous entries");
        }
        self.supersede(existing.iter())?;

        let options = self.options;
        let external_id = options.external_id(&record.identity);
        let collection_id = &options.collection_id;
        let face = self.faces.register(&image, &external_id, collection_id)?;

        let entry = NewIndexEntry {
            identity: record.identity.clone(),
            face_id: face.face_id.clone(),
            external_id,
            collection_id: collection_id.clone(),
            image_url: url.to_string(),
            confidence: face.confidence,
            fingerprint,
            metadata: EntryMetadata {
                http: current,
                provider: face.details,
            },
            indexed_by: options.indexed_by.clone(),
        };

        if let Err(err) = self.store.insert_entry(&entry) {
            // Nothing local owns the new face; drop it rather than leak it.
            self.release_face(&face.face_id, collection_id);
            return Err(err.into());
        }

        Ok(Outcome::NewlyIndexed { reason })
    }

    /// Deactivate entries, then best-effort deregister their remote faces.
    fn supersede<'e>(
        &mut self,
        entries: impl Iterator<Item = &'e IndexEntry>,
    ) -> Result<(), ReconcileError> {
        for entry in entries {
            self.store.deactivate(entry.id)?;
            self.release_remote(entry);
        }
        Ok(())
    }

    fn release_remote(&self, entry: &IndexEntry) {
        if let Some(face_id) = entry.face_id.as_deref() {
            self.release_face(face_id, &entry.collection_id);
        }
    }

    fn release_face(&self, face_id: &str, collection_id: &str) {
        match self.faces.deregister(face_id, collection_id) {
            Ok(()) => tracing::debug!(face_id, collection_id, "remote face deregistered"),
            Err(err) => {
                tracing::warn!(face_id, collection_id, error = %err, "remote face deregistration failed")
            }
        }
    }
}

/// Compute and store fingerprints for active entries that have none.
///
/// Only needs the index and the image fetcher; the directory and face
/// service are never touched.
pub fn backfill_fingerprints(
    store: &mut dyn IndexStore,
    fetcher: &dyn ImageFetcher,
) -> Result<BackfillSummary, ReconcileError> {
    let span = tracing::info_span!("backfill", run_id = %Uuid::new_v4());
    let _enter = span.enter();

    let pending: Vec<IndexEntry> = store
        .active_entries(None)?
        .into_iter()
        .filter(|e| e.fingerprint.is_none())
        .collect();

    let mut summary = BackfillSummary {
        total: pending.len(),
        ..Default::default()
    };
    tracing::info!(count = pending.len(), "fingerprint backfill started");

    for (i, entry) in pending.iter().enumerate() {
        if entry.image_url.trim().is_empty() {
            tracing::warn!(id = entry.id, identity = %entry.identity, "entry has no image URL; skipping");
            summary.skipped += 1;
            continue;
        }

        let result = fingerprint_url(fetcher, &entry.image_url)
            .and_then(|fp| Ok(store.set_fingerprint(entry.id, fp)?));

        match result {
            Ok(()) => summary.updated += 1,
            Err(err) => {
                tracing::warn!(id = entry.id, url = %entry.image_url, error = %err, "backfill failed");
                summary.errored += 1;
            }
        }

        if (i + 1) % BACKFILL_PROGRESS_EVERY == 0 {
            tracing::info!(
                processed = i + 1,
                total = summary.total,
                updated = summary.updated,
                errored = summary.errored,
                "backfill progress"
            );
        }
    }

    tracing::info!(
        updated = summary.updated,
        skipped = summary.skipped,
        errored = summary.errored,
        "fingerprint backfill finished"
    );
    Ok(summary)
}

fn fingerprint_url(fetcher: &dyn ImageFetcher, url: &str) -> Result<Fingerprint, ReconcileError> {
    let image = fetcher.fetch(url)?;
    Ok(compute_fingerprint(&image)?)
}
