use std::collections::BTreeMap;
use std::fs::File;
use std::io::{
    BufReader,
    BufWriter,
    Write
};
use std::path::{
    Path,
    PathBuf
};
use std::sync::{
    Mutex,
    PoisonError
};

use serde::{
    Deserialize,
    Serialize
};
use tempfile::NamedTempFile;
use tracing::info;

use crate::error::Result;
use crate::norm::normpoint::NormPoint;

/// Persisted form of one norm.
///
/// `points` is optional only so that a `null` or missing list can be reported
/// as a malformed entry instead of a parse failure of the whole document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormRecord {
    #[serde(default)]
    pub points: Option<Vec<NormPoint>>,
    #[serde(rename = "normType", default)]
    pub norm_type: String,
    #[serde(default)]
    pub description: String,
}

impl NormRecord {
    pub fn new(points: Vec<NormPoint>, norm_type: &str, description: &str) -> NormRecord {
        NormRecord {
            points: Some(points),
            norm_type: norm_type.to_owned(),
            description: description.to_owned(),
        }
    }
}

/// `{normId: {points: [[load, energy], ...], normType, description}}`
pub type NormDocument = BTreeMap<String, NormRecord>;

pub trait NormPersistence {
    fn load_all(&self) -> Result<NormDocument>;

    fn save_all(&self, document: &NormDocument) -> Result<()>;
}

// ─────────────────────────────────────────────────────────────────────────────
// JSON file
// ─────────────────────────────────────────────────────────────────────────────

pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> JsonFilePersistence {
        JsonFilePersistence { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl NormPersistence for JsonFilePersistence {
    /// A missing file is an empty document.
    fn load_all(&self) -> Result<NormDocument> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "norm file not found, starting empty");
            return Ok(NormDocument::new());
        }
        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);
        let document: NormDocument = serde_json::from_reader(reader)?;
        info!(path = %self.path.display(), norms = document.len(), "loaded norms");
        Ok(document)
    }

    /// Writes a sibling temp file and renames it over the target, so a failed
    /// save leaves the previous file as it was.
    fn save_all(&self, document: &NormDocument) -> Result<()> {
        let directory = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut staged = NamedTempFile::new_in(directory)?;
        {
            let mut writer = BufWriter::new(staged.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, document)?;
            writer.flush()?;
        }
        staged.as_file().sync_all()?;
        // persist 失敗時 temp 檔隨 PersistError 一起被刪掉
        staged.persist(&self.path).map_err(|error| error.error)?;
        info!(path = %self.path.display(), norms = document.len(), "saved norms");
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryPersistence {
    document: Mutex<NormDocument>,
}

impl MemoryPersistence {
    pub fn new(document: NormDocument) -> MemoryPersistence {
        MemoryPersistence { document: Mutex::new(document) }
    }

    pub fn snapshot(&self) -> NormDocument {
        self.document.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl NormPersistence for MemoryPersistence {
    fn load_all(&self) -> Result<NormDocument> {
        Ok(self.snapshot())
    }

    fn save_all(&self, document: &NormDocument) -> Result<()> {
        *self.document.lock().unwrap_or_else(PoisonError::into_inner) = document.clone();
        Ok(())
    }
}
