use crate::storage::row::{self, encode_record, record_from_row};
use crate::storage::{OwnerPaths, Record, RecordStore, StorageError, StorageResult};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Append-only, identifier-deduplicated record file for one owner
///
/// The identifier set is loaded once when the ledger is opened and kept in
/// step with every append, so membership checks never rescan the file.
/// Every append opens, writes one whole row, flushes and closes the file.
/// Nothing is created on disk until the first write.
#[derive(Debug)]
pub struct Ledger {
    paths: OwnerPaths,
    ids: HashSet<String>,
}

impl Ledger {
    /// Opens an owner's ledger, reading the identifiers already stored
    pub fn open(paths: OwnerPaths) -> StorageResult<Self> {
        let ids = load_ids(&paths.ledger)?;
        tracing::debug!(
            "Opened ledger {} with {} records",
            paths.ledger.display(),
            ids.len()
        );
        Ok(Self { paths, ids })
    }

    pub fn paths(&self) -> &OwnerPaths {
        &self.paths
    }

    /// Writes a snapshot image for an identifier, replacing any older one
    ///
    /// The image is written to a temporary name and renamed into place so a
    /// reader never sees a half-written file.
    pub fn save_snapshot(&self, id: &str, png: &[u8]) -> StorageResult<PathBuf> {
        self.paths.ensure_dirs()?;
        let target = self.paths.snapshot(id);
        let partial = target.with_extension("png.part");

        let mut file = File::create(&partial)?;
        file.write_all(png)?;
        file.sync_all()?;
        drop(file);

        std::fs::rename(&partial, &target)?;
        Ok(target)
    }

    /// Returns true if a snapshot file exists for the identifier
    pub fn has_snapshot(&self, id: &str) -> bool {
        self.paths.snapshot(id).is_file()
    }
}

impl RecordStore for Ledger {
    fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    fn append(&mut self, record: &Record) -> StorageResult<bool> {
        if self.ids.contains(&record.id) {
            return Ok(false);
        }

        let line = encode_record(record)?;

        std::fs::create_dir_all(&self.paths.root)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.paths.ledger)?;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        file.sync_data()?;

        self.ids.insert(record.id.clone());
        Ok(true)
    }

    fn records(&self) -> StorageResult<Vec<Record>> {
        let Some(file) = open_existing(&self.paths.ledger)? else {
            return Ok(Vec::new());
        };

        let mut records = Vec::new();
        for result in row::reader(file).records() {
            let row = result?;
            let line = row
                .position()
                .map(|p| p.line() as usize)
                .unwrap_or(records.len() + 1);
            let record =
                record_from_row(&row).map_err(|reason| StorageError::MalformedRow { line, reason })?;
            records.push(record);
        }
        Ok(records)
    }

    fn len(&self) -> usize {
        self.ids.len()
    }
}

fn open_existing(path: &Path) -> StorageResult<Option<File>> {
    match File::open(path) {
        Ok(f) => Ok(Some(f)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Reads the identifier column of an existing ledger file
fn load_ids(path: &Path) -> StorageResult<HashSet<String>> {
    let Some(file) = open_existing(path)? else {
        return Ok(HashSet::new());
    };

    let mut ids = HashSet::new();
    for result in row::reader(file).records() {
        let row = result?;
        if let Some(id) = row.get(0).filter(|id| !id.is_empty()) {
            ids.insert(id.to_string());
        }
    }
    Ok(ids)
}
