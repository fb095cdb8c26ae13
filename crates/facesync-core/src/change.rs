//! Change detection: decide whether a source record needs reconciliation work.
//!
//! Pure decision logic. Callers pass in the probed HTTP metadata and, later,
//! the freshly computed fingerprint; nothing here touches the network or store.

use crate::fingerprint::Fingerprint;
use crate::types::{IndexEntry, ResourceMetadata};
use serde::Serialize;

/// Why a record needs a download + fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    /// Same URL, but HTTP metadata differs or no fingerprint is stored yet.
    MetadataChanged,
    /// No active entry exists for the identity.
    NewIdentity,
    /// An active entry exists but was produced from a different URL.
    UrlChanged,
}

/// Verdict for one source record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// The entry with this id is current; no work.
    Unchanged { entry_id: i64 },
    /// Download and re-hash; `entry_id` is the entry whose URL matched.
    MetadataRefresh { entry_id: i64 },
    NewIdentity,
    UrlChanged,
}

impl Classification {
    /// `None` for `Unchanged`.
    pub fn reason(&self) -> Option<ChangeReason> {
        match self {
            Classification::Unchanged { .. } => None,
            Classification::MetadataRefresh { .. } => Some(ChangeReason::MetadataChanged),
            Classification::NewIdentity => Some(ChangeReason::NewIdentity),
            Classification::UrlChanged => Some(ChangeReason::UrlChanged),
        }
    }

    /// Id of the entry whose URL equals the source URL, if any.
    pub fn url_match(&self) -> Option<i64> {
        match self {
            Classification::Unchanged { entry_id }
            | Classification::MetadataRefresh { entry_id } => Some(*entry_id),
            _ => None,
        }
    }
}

/// Classify a source record against the existing entries for its identity.
///
/// First match wins:
/// 1. an active entry with exactly `source_url` → `Unchanged` when its stored
///    metadata matches `current` and it has a fingerprint, else `MetadataRefresh`;
/// 2. no active entry → `NewIdentity`;
/// 3. otherwise → `UrlChanged`.
pub fn classify(
    source_url: &str,
    existing: &[IndexEntry],
    current: &ResourceMetadata,
) -> Classification {
    let active = || existing.iter().filter(|e| e.active);

    if let Some(entry) = active().find(|e| e.image_url == source_url) {
        if entry.metadata.http.matches(current) && entry.fingerprint.is_some() {
            return Classification::Unchanged { entry_id: entry.id };
        }
        return Classification::MetadataRefresh { entry_id: entry.id };
    }

    if active().next().is_none() {
        return Classification::NewIdentity;
    }

    Classification::UrlChanged
}

/// Second-chance match: the first existing entry (creation order) whose stored
/// fingerprint equals `fingerprint`.
pub fn second_chance<'a>(
    fingerprint: Fingerprint,
    existing: &'a [IndexEntry],
) -> Option<&'a IndexEntry> {
    existing
        .iter()
        .find(|e| e.fingerprint == Some(fingerprint))
}
