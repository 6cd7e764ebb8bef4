//! Contracts for the collaborators around the pipeline, plus file-backed and in-memory adapters.

use crate::{
    aggregate::AggregatedResult,
    error::{Result, TilingError},
};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs::{self, OpenOptions},
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

/// Resolves an opaque file identifier to an image on disk.
pub trait ImageRepository: Send + Sync {
    fn resolve(&self, file_id: &str) -> Result<PathBuf>;
}

/// Images stored flat as `{root}/{file_id}.{ext}`.
#[derive(Debug, Clone)]
pub struct MediaDirectory {
    root: PathBuf,
}

impl MediaDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ImageRepository for MediaDirectory {
    fn resolve(&self, file_id: &str) -> Result<PathBuf> {
        if file_id.is_empty() || file_id.contains(['/', '\\']) || file_id.starts_with('.') {
            return Err(TilingError::FileNotFound(file_id.to_string()));
        }

        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(root = %self.root.display(), "Media directory does not exist");
                return Err(TilingError::FileNotFound(file_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let mut candidates: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file() && path.file_stem().is_some_and(|stem| stem == file_id)
            })
            .collect();
        candidates.sort();

        candidates
            .into_iter()
            .next()
            .ok_or_else(|| TilingError::FileNotFound(file_id.to_string()))
    }
}

/// One row per processed file: the aggregated result plus where its report lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub file_id: String,
    #[serde(flatten)]
    pub result: AggregatedResult,
    pub report_name: String,
    pub report_url: String,
    pub created_at: DateTime<Utc>,
}

pub trait DetectionStore: Send + Sync {
    fn save(&self, record: &DetectionRecord) -> anyhow::Result<()>;
}

/// Appends records as JSON lines.
#[derive(Debug)]
pub struct JsonLinesStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonLinesStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn load_all(&self) -> anyhow::Result<Vec<DetectionRecord>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = fs::File::open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        BufReader::new(file)
            .lines()
            .filter(|line| line.as_ref().map_or(true, |l| !l.trim().is_empty()))
            .map(|line| Ok(serde_json::from_str(&line?)?))
            .collect()
    }
}

impl DetectionStore for JsonLinesStore {
    fn save(&self, record: &DetectionRecord) -> anyhow::Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        file.write_all(&line)?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryDetectionStore {
    records: Mutex<Vec<DetectionRecord>>,
}

impl MemoryDetectionStore {
    pub fn records(&self) -> Vec<DetectionRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl DetectionStore for MemoryDetectionStore {
    fn save(&self, record: &DetectionRecord) -> anyhow::Result<()> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }
}

/// Object storage with public URLs of the form `{base_url}/{bucket}/{object}`.
pub trait BlobStore: Send + Sync {
    fn put(&self, object: &str, bytes: &[u8]) -> anyhow::Result<()>;

    fn public_url(&self, object: &str) -> String;
}

fn join_url(base_url: &str, bucket: &str, object: &str) -> String {
    format!("{}/{}/{}", base_url.trim_end_matches('/'), bucket, object)
}

/// Writes objects under `{root}/{bucket}/`.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    bucket: String,
    base_url: String,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>, bucket: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            bucket: bucket.into(),
            base_url: base_url.into(),
        }
    }

    pub fn object_path(&self, object: &str) -> PathBuf {
        self.root.join(&self.bucket).join(object)
    }
}

impl BlobStore for LocalBlobStore {
    fn put(&self, object: &str, bytes: &[u8]) -> anyhow::Result<()> {
        let path = self.object_path(object);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    fn public_url(&self, object: &str) -> String {
        join_url(&self.base_url, &self.bucket, object)
    }
}

#[derive(Debug)]
pub struct MemoryBlobStore {
    bucket: String,
    base_url: String,
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new(bucket: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            base_url: base_url.into(),
            objects: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn get(&self, object: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(object)
            .cloned()
    }

    pub fn object_names(&self) -> Vec<String> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, object: &str, bytes: &[u8]) -> anyhow::Result<()> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(object.to_string(), bytes.to_vec());
        Ok(())
    }

    fn public_url(&self, object: &str) -> String {
        join_url(&self.base_url, &self.bucket, object)
    }
}

/// 32 lowercase hex characters.
pub fn generate_report_name() -> String {
    format!("{:016x}{:016x}", fastrand::u64(..), fastrand::u64(..))
}

pub fn report_object_name(report_name: &str) -> String {
    format!("{report_name}.pdf")
}
