//! Append-only accumulation of combined records.
//!
//! Two parallel stores hold the same data: a CSV table with one row per
//! listing ever captured, and a JSON array with one entry per run. Both are
//! rewritten in full on each append through a temp file and rename, so a
//! crash leaves either the old or the new file, never a truncated one.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;

use crate::types::{CombinedRecord, ListingError, ListingResult, Source};

pub const TABULAR_FILENAME: &str = "continuous_p2p_data.csv";
pub const STRUCTURED_FILENAME: &str = "continuous_p2p_data.json";

/// Directory layout under the storage root.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn screenshots_dir(&self) -> PathBuf {
        self.root.join("screenshots")
    }

    pub fn json_dir(&self) -> PathBuf {
        self.root.join("json")
    }

    pub fn tabular_dir(&self) -> PathBuf {
        self.root.join("tabular")
    }

    /// Create the root and every subdirectory.
    pub fn ensure_dirs(&self) -> ListingResult<()> {
        for dir in [
            self.logs_dir(),
            self.screenshots_dir(),
            self.json_dir(),
            self.tabular_dir(),
        ] {
            fs::create_dir_all(&dir)?;
        }
        Ok(())
    }
}

/// One row of the tabular store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabularRow {
    pub price: f64,
    pub timestamp: String,
    pub available_amount: String,
    pub payment_methods: String,
    pub merchant_name: String,
    pub source: String,
}

impl TabularRow {
    fn tagged(listing: &crate::types::Listing, source: Source) -> Self {
        Self {
            price: listing.price,
            timestamp: listing.timestamp.to_rfc3339(),
            available_amount: listing.available_amount.clone(),
            payment_methods: listing.payment_methods.clone(),
            merchant_name: listing.merchant_name.clone(),
            source: source.name().to_string(),
        }
    }
}

/// Where a save landed. `None` means that store was not written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SavedPaths {
    pub tabular: Option<PathBuf>,
    pub structured: Option<PathBuf>,
}

/// Writes combined records to the tabular and structured stores.
#[derive(Debug, Clone)]
pub struct PersistenceSink {
    tabular_path: PathBuf,
    structured_path: PathBuf,
}

impl PersistenceSink {
    /// Sink writing to the default file names inside `layout`.
    pub fn new(layout: &StorageLayout) -> Self {
        Self {
            tabular_path: layout.tabular_dir().join(TABULAR_FILENAME),
            structured_path: layout.json_dir().join(STRUCTURED_FILENAME),
        }
    }

    pub fn tabular_path(&self) -> &Path {
        &self.tabular_path
    }

    pub fn structured_path(&self) -> &Path {
        &self.structured_path
    }

    /// Append a record to both stores.
    ///
    /// Records without any listings are skipped. A failure in one store is
    /// logged and reported as `None` without affecting the other.
    pub fn save(&self, record: &CombinedRecord) -> SavedPaths {
        if !record.success {
            tracing::warn!("no source contributed listings, nothing to save");
            return SavedPaths::default();
        }

        let tabular = match self.append_tabular(record) {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::error!("error saving to tabular store {}: {e}", self.tabular_path.display());
                None
            }
        };

        let structured = match self.append_structured(record) {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::error!(
                    "error saving to structured store {}: {e}",
                    self.structured_path.display()
                );
                None
            }
        };

        SavedPaths { tabular, structured }
    }

    /// Read every row of the tabular store. A missing file has no rows.
    pub fn read_tabular(&self) -> ListingResult<Vec<TabularRow>> {
        let file = match File::open(&self.tabular_path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut reader = csv::Reader::from_reader(file);
        let mut rows = Vec::new();
        for row in reader.deserialize() {
            rows.push(row?);
        }
        Ok(rows)
    }

    /// Concatenate the record's rows onto the tabular store and rewrite it.
    pub fn append_tabular(&self, record: &CombinedRecord) -> ListingResult<PathBuf> {
        let mut rows = match self.read_tabular() {
            Ok(rows) => rows,
            Err(ListingError::Csv(e)) if !matches!(e.kind(), csv::ErrorKind::Io(_)) => {
                tracing::warn!(
                    "tabular store {} is corrupt ({e}), starting a new table",
                    self.tabular_path.display()
                );
                quarantine(&self.tabular_path);
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        let existed = self.tabular_path.exists();
        let before = rows.len();

        for source in [Source::Bybit, Source::Binance] {
            rows.extend(
                record
                    .listings_for(source)
                    .iter()
                    .map(|l| TabularRow::tagged(l, source)),
            );
        }

        write_atomic(&self.tabular_path, |file| {
            let mut writer = csv::Writer::from_writer(file);
            for row in &rows {
                writer.serialize(row)?;
            }
            writer.flush()?;
            Ok(())
        })?;

        tracing::info!(
            "{} {} rows {} tabular store {}",
            if existed { "appended" } else { "wrote" },
            rows.len() - before,
            if existed { "to" } else { "into new" },
            self.tabular_path.display()
        );
        Ok(self.tabular_path.clone())
    }

    /// Append the record to the structured store and rewrite it.
    ///
    /// Existing entries are carried over as raw JSON so that entries of any
    /// shape survive. A missing, empty, or corrupt file starts a new sequence.
    pub fn append_structured(&self, record: &CombinedRecord) -> ListingResult<PathBuf> {
        let mut entries = self.read_structured_entries()?;
        entries.push(serde_json::to_value(record)?);

        write_atomic(&self.structured_path, |file| {
            serde_json::to_writer_pretty(&mut *file, &entries)?;
            file.write_all(b"\n")?;
            Ok(())
        })?;

        tracing::info!(
            "structured store {} now holds {} records",
            self.structured_path.display(),
            entries.len()
        );
        Ok(self.structured_path.clone())
    }

    /// Cold-read every combined record from the structured store.
    ///
    /// Entries that do not parse as a record are skipped.
    pub fn load_records(&self) -> ListingResult<Vec<CombinedRecord>> {
        let bytes = match fs::read(&self.structured_path) {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        let entries: Vec<Value> = serde_json::from_slice(&bytes).map_err(|e| {
            ListingError::Storage(format!(
                "{} is not a JSON array of records: {e}",
                self.structured_path.display()
            ))
        })?;

        let mut records = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            match serde_json::from_value::<CombinedRecord>(entry) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("skipping structured entry {index}: {e}"),
            }
        }
        Ok(records)
    }

    fn read_structured_entries(&self) -> ListingResult<Vec<Value>> {
        let bytes = match fs::read(&self.structured_path) {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        match serde_json::from_slice::<Vec<Value>>(&bytes) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                tracing::warn!(
                    "structured store {} is corrupt ({e}), starting a new sequence",
                    self.structured_path.display()
                );
                quarantine(&self.structured_path);
                Ok(Vec::new())
            }
        }
    }

}

/// Move a corrupt store aside to `<path>.corrupt-<ts>` instead of overwriting it.
fn quarantine(path: &Path) {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".corrupt-{}", Utc::now().format("%Y%m%dT%H%M%S")));
    let target = PathBuf::from(name);
    match fs::rename(path, &target) {
        Ok(()) => tracing::warn!("corrupt store moved to {}", target.display()),
        Err(e) => tracing::warn!("could not move corrupt store {} aside: {e}", path.display()),
    }
}

/// Write `path` by filling a temp file in the same directory and renaming it.
fn write_atomic<F>(path: &Path, fill: F) -> ListingResult<()>
where
    F: FnOnce(&mut File) -> ListingResult<()>,
{
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;

    let mut tmp = NamedTempFile::new_in(&dir)?;
    fill(tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| ListingError::Io(e.error))?;
    Ok(())
}
