use crate::change::ChangeReason;
use crate::fingerprint::Fingerprint;
use crate::reconcile::ReconcileError;
use serde::{Deserialize, Serialize};

/// One employee row from the source directory. Read-only, reloaded every run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub identity: String,
    /// Source-relative image path, appended to the configured base URL.
    pub image_reference: String,
    pub status: String,
    /// Ordering key for last-writer-wins reduction (directory row id).
    pub revision: i64,
}

impl SourceRecord {
    /// Keep one record per identity: the highest revision wins.
    ///
    /// Output is ordered by identity so a run visits employees deterministically.
    pub fn reduce_by_identity(records: Vec<SourceRecord>) -> Vec<SourceRecord> {
        let mut latest: std::collections::BTreeMap<String, SourceRecord> =
            std::collections::BTreeMap::new();

        for mut record in records {
            record.identity = record.identity.trim().to_string();
            let key = record.identity.clone();
            match latest.get(&key) {
                Some(current) if current.revision >= record.revision => {}
                _ => {
                    latest.insert(key, record);
                }
            }
        }

        latest.into_values().collect()
    }
}

/// Cheap proxies for "did the file change", read from a HEAD response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMetadata {
    #[serde(rename = "http_size", default)]
    pub size: Option<u64>,
    #[serde(rename = "http_mtime", default)]
    pub modified_at: Option<String>,
}

impl ResourceMetadata {
    pub fn unknown() -> Self {
        Self::default()
    }

    /// Both fields present on both sides and equal. Absence never matches.
    pub fn matches(&self, other: &ResourceMetadata) -> bool {
        let size_equal = matches!((self.size, other.size), (Some(a), Some(b)) if a == b);
        let mtime_equal = matches!(
            (&self.modified_at, &other.modified_at),
            (Some(a), Some(b)) if a == b
        );
        size_equal && mtime_equal
    }
}

/// Typed metadata persisted alongside an index entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
    #[serde(flatten)]
    pub http: ResourceMetadata,
    /// Opaque registration response from the face service, passed through as-is.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub provider: serde_json::Value,
}

impl EntryMetadata {
    /// Same provider payload, new HTTP observation.
    pub fn with_http(&self, http: ResourceMetadata) -> Self {
        Self {
            http,
            provider: self.provider.clone(),
        }
    }
}

/// A row in the local face index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: i64,
    pub identity: String,
    /// Remote face id, set once registered with the face service.
    pub face_id: Option<String>,
    pub external_id: String,
    pub collection_id: String,
    /// Exact URL that produced this entry.
    pub image_url: String,
    pub confidence: Option<f32>,
    pub fingerprint: Option<Fingerprint>,
    pub metadata: EntryMetadata,
    pub active: bool,
    pub indexed_by: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields needed to insert a freshly registered face.
#[derive(Debug, Clone)]
pub struct NewIndexEntry {
    pub identity: String,
    pub face_id: String,
    pub external_id: String,
    pub collection_id: String,
    pub image_url: String,
    pub confidence: Option<f32>,
    pub fingerprint: Fingerprint,
    pub metadata: EntryMetadata,
    pub indexed_by: String,
}

/// What happened to one source record during a run.
#[derive(Debug)]
pub enum Outcome {
    Unchanged,
    MetadataRefreshed,
    MergedDuplicate,
    NewlyIndexed { reason: ChangeReason },
    Errored(ReconcileError),
}

/// Counts reported for one reconciliation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub new: usize,
    pub updated: usize,
    pub ignored: usize,
    pub errored: usize,
    /// Entries deactivated by the duplicate-collapse pre-pass.
    pub collapsed: usize,
}

impl RunSummary {
    pub fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Unchanged | Outcome::MetadataRefreshed | Outcome::MergedDuplicate => {
                self.ignored += 1
            }
            Outcome::NewlyIndexed {
                reason: ChangeReason::NewIdentity,
            } => self.new += 1,
            Outcome::NewlyIndexed { .. } => self.updated += 1,
            Outcome::Errored(_) => self.errored += 1,
        }
    }
}

/// Counts reported for a fingerprint backfill pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillSummary {
    pub total: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errored: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(size: Option<u64>, mtime: Option<&str>) -> ResourceMetadata {
        ResourceMetadata {
            size,
            modified_at: mtime.map(String::from),
        }
    }

    #[test]
    fn test_metadata_matches_when_complete_and_equal() {
        let a = meta(Some(2048), Some("Tue, 01 Oct 2024 10:00:00 GMT"));
        assert!(a.matches(&a.clone()));
    }

    #[test]
    fn test_metadata_absence_never_matches() {
        let full = meta(Some(2048), Some("x"));
        assert!(!meta(None, Some("x")).matches(&meta(None, Some("x"))));
        assert!(!meta(Some(2048), None).matches(&meta(Some(2048), None)));
        assert!(!full.matches(&ResourceMetadata::unknown()));
        assert!(!full.matches(&meta(Some(4096), Some("x"))));
    }

    #[test]
    fn test_entry_metadata_json_shape() {
        let m = EntryMetadata {
            http: meta(Some(5120), Some("Mon")),
            provider: serde_json::json!({ "FaceId": "abc" }),
        };
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v["http_size"], 5120);
        assert_eq!(v["http_mtime"], "Mon");
        assert_eq!(v["provider"]["FaceId"], "abc");

        let back: EntryMetadata = serde_json::from_value(v).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn test_entry_metadata_tolerates_empty_object() {
        let m: EntryMetadata = serde_json::from_str("{}").unwrap();
        assert_eq!(m, EntryMetadata::default());
    }

    #[test]
    fn test_reduce_keeps_highest_revision() {
        let rows = vec![
            SourceRecord {
                identity: "001".into(),
                image_reference: "/old.jpg".into(),
                status: "ACTIVO".into(),
                revision: 3,
            },
            SourceRecord {
                identity: "001 ".into(),
                image_reference: "/new.jpg".into(),
                status: "ACTIVO".into(),
                revision: 9,
            },
            SourceRecord {
                identity: "000".into(),
                image_reference: "/a.jpg".into(),
                status: "ACTIVO".into(),
                revision: 1,
            },
        ];

        let reduced = SourceRecord::reduce_by_identity(rows.clone());
        assert_eq!(reduced.len(), 2);
        assert_eq!(reduced[0].identity, "000");
        assert_eq!(reduced[1].image_reference, "/new.jpg");

        // Input order does not matter.
        let mut reversed = rows;
        reversed.reverse();
        assert_eq!(SourceRecord::reduce_by_identity(reversed), reduced);
    }

    #[test]
    fn test_summary_buckets() {
        let mut s = RunSummary::default();
        s.record(&Outcome::Unchanged);
        s.record(&Outcome::MetadataRefreshed);
        s.record(&Outcome::MergedDuplicate);
        s.record(&Outcome::NewlyIndexed {
            reason: ChangeReason::NewIdentity,
        });
        s.record(&Outcome::NewlyIndexed {
            reason: ChangeReason::UrlChanged,
        });
        s.record(&Outcome::NewlyIndexed {
            reason: ChangeReason::MetadataChanged,
        });
        assert_eq!((s.new, s.updated, s.ignored, s.errored), (1, 2, 3, 0));
    }
}
