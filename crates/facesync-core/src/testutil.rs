//! Shared fixtures: synthetic images and in-memory collaborators.

use crate::collaborators::{
    FaceIndexer, FetchError, ImageFetcher, IndexStore, RegisteredFace, RemoteError,
    SourceDirectory, StoreError,
};
use crate::fingerprint::Fingerprint;
use crate::types::{EntryMetadata, IndexEntry, NewIndexEntry, ResourceMetadata, SourceRecord};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Cursor;

/// Encode a grayscale pattern as an uncompressed 24-bit BMP.
pub fn bmp_bytes(width: u32, height: u32, luma: impl Fn(u32, u32) -> u8) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        let v = luma(x, y);
        Rgb([v, v, v])
    });
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Bmp)
        .unwrap();
    buf
}

/// Deterministic pseudo-random BMP; different seeds give structurally different images.
pub fn noise_bmp(width: u32, height: u32, seed: u32) -> Vec<u8> {
    bmp_bytes(width, height, |x, y| {
        let mut v = seed
            .wrapping_mul(2_654_435_761)
            .wrapping_add(x.wrapping_mul(40_503))
            .wrapping_add(y.wrapping_mul(9_973));
        v ^= v >> 13;
        v = v.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        (v >> 16) as u8
    })
}

// ── Directory ────────────────────────────────────────────────────

pub struct FakeDirectory {
    pub records: Vec<SourceRecord>,
    pub fail: bool,
}

impl FakeDirectory {
    pub fn new(records: Vec<SourceRecord>) -> Self {
        Self { records, fail: false }
    }
}

impl SourceDirectory for FakeDirectory {
    fn active_records(&self) -> Result<Vec<SourceRecord>, StoreError> {
        if self.fail {
            return Err(StoreError::Unavailable("directory offline".into()));
        }
        Ok(self.records.clone())
    }
}

pub fn record(identity: &str, image_reference: &str, revision: i64) -> SourceRecord {
    SourceRecord {
        identity: identity.into(),
        image_reference: image_reference.into(),
        status: "ACTIVO".into(),
        revision,
    }
}

// ── Index store ──────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryStore {
    pub entries: Vec<IndexEntry>,
    pub mutations: usize,
    pub fail_loads: bool,
    pub fail_inserts: bool,
}

impl MemoryStore {
    pub fn seed(&mut self, entry: IndexEntry) {
        self.entries.push(entry);
    }

    pub fn active_for(&self, identity: &str) -> Vec<&IndexEntry> {
        self.entries
            .iter()
            .filter(|e| e.active && e.identity == identity)
            .collect()
    }

    fn get_mut(&mut self, id: i64) -> Result<&mut IndexEntry, StoreError> {
        self.entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(StoreError::NotFound(id))
    }
}

impl IndexStore for MemoryStore {
    fn active_entries(&self, identity: Option<&str>) -> Result<Vec<IndexEntry>, StoreError> {
        if self.fail_loads {
            return Err(StoreError::Unavailable("index store offline".into()));
        }
        let mut out: Vec<IndexEntry> = self
            .entries
            .iter()
            .filter(|e| e.active && identity.map_or(true, |i| e.identity == i))
            .cloned()
            .collect();
        out.sort_by_key(|e| e.id);
        Ok(out)
    }

    fn insert_entry(&mut self, entry: &NewIndexEntry) -> Result<i64, StoreError> {
        if self.fail_inserts {
            return Err(StoreError::Unavailable("insert rejected".into()));
        }
        self.mutations += 1;
        let id = self.entries.iter().map(|e| e.id).max().unwrap_or(0) + 1;
        self.entries.push(IndexEntry {
            id,
            identity: entry.identity.clone(),
            face_id: Some(entry.face_id.clone()),
            external_id: entry.external_id.clone(),
            collection_id: entry.collection_id.clone(),
            image_url: entry.image_url.clone(),
            confidence: entry.confidence,
            fingerprint: Some(entry.fingerprint),
            metadata: entry.metadata.clone(),
            active: true,
            indexed_by: entry.indexed_by.clone(),
            created_at: String::new(),
            updated_at: String::new(),
        });
        Ok(id)
    }

    fn update_source(
        &mut self,
        id: i64,
        image_url: &str,
        metadata: &EntryMetadata,
    ) -> Result<(), StoreError> {
        self.mutations += 1;
        let entry = self.get_mut(id)?;
        entry.image_url = image_url.to_string();
        entry.metadata = metadata.clone();
        Ok(())
    }

    fn set_fingerprint(&mut self, id: i64, fingerprint: Fingerprint) -> Result<(), StoreError> {
        self.mutations += 1;
        self.get_mut(id)?.fingerprint = Some(fingerprint);
        Ok(())
    }

    fn deactivate(&mut self, id: i64) -> Result<(), StoreError> {
        self.mutations += 1;
        self.get_mut(id)?.active = false;
        Ok(())
    }

    fn collapse_duplicates(&mut self) -> Result<Vec<IndexEntry>, StoreError> {
        if self.fail_loads {
            return Err(StoreError::Unavailable("index store offline".into()));
        }
        let mut newest: HashMap<String, i64> = HashMap::new();
        for e in self.entries.iter().filter(|e| e.active) {
            let id = newest.entry(e.identity.trim().to_string()).or_insert(e.id);
            *id = (*id).max(e.id);
        }
        let mut collapsed = Vec::new();
        for e in self.entries.iter_mut() {
            if e.active && newest.get(e.identity.trim()) != Some(&e.id) {
                e.active = false;
                collapsed.push(e.clone());
            }
        }
        self.mutations += collapsed.len();
        Ok(collapsed)
    }
}

pub fn entry(id: i64, identity: &str, url: &str) -> IndexEntry {
    IndexEntry {
        id,
        identity: identity.into(),
        face_id: Some(format!("face-{id}")),
        external_id: format!("employee_{identity}"),
        collection_id: "staff".into(),
        image_url: url.into(),
        confidence: Some(99.5),
        fingerprint: None,
        metadata: EntryMetadata::default(),
        active: true,
        indexed_by: "SYNC".into(),
        created_at: String::new(),
        updated_at: String::new(),
    }
}

// ── Image fetcher ────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeFetcher {
    pub images: HashMap<String, Vec<u8>>,
    pub metadata: HashMap<String, ResourceMetadata>,
    pub timeouts: Vec<String>,
    pub fetches: RefCell<Vec<String>>,
}

impl FakeFetcher {
    pub fn serve(&mut self, url: &str, bytes: Vec<u8>, meta: ResourceMetadata) {
        self.images.insert(url.to_string(), bytes);
        self.metadata.insert(url.to_string(), meta);
    }
}

impl ImageFetcher for FakeFetcher {
    fn probe(&self, url: &str) -> Result<ResourceMetadata, FetchError> {
        self.metadata
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Status(404))
    }

    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.fetches.borrow_mut().push(url.to_string());
        if self.timeouts.iter().any(|u| u == url) {
            return Err(FetchError::Timeout);
        }
        self.images
            .get(url)
            .cloned()
            .ok_or(FetchError::Status(404))
    }
}

// ── Face service ─────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeFaceIndexer {
    pub registered: RefCell<Vec<String>>,
    pub deregistered: RefCell<Vec<String>>,
    pub reject_register: bool,
    pub reject_deregister: bool,
}

impl FaceIndexer for FakeFaceIndexer {
    fn register(
        &self,
        _image: &[u8],
        external_id: &str,
        _collection_id: &str,
    ) -> Result<RegisteredFace, RemoteError> {
        if self.reject_register {
            return Err(RemoteError::NoFaceDetected);
        }
        let mut registered = self.registered.borrow_mut();
        registered.push(external_id.to_string());
        Ok(RegisteredFace {
            face_id: format!("remote-{}", registered.len()),
            confidence: Some(99.9),
            details: serde_json::json!({ "ExternalImageId": external_id }),
        })
    }

    fn deregister(&self, face_id: &str, _collection_id: &str) -> Result<(), RemoteError> {
        if self.reject_deregister {
            return Err(RemoteError::Rejected {
                status: 500,
                message: "collection unavailable".into(),
            });
        }
        self.deregistered.borrow_mut().push(face_id.to_string());
        Ok(())
    }
}
