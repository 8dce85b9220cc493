use crate::state::DATE_FORMAT;
use crate::storage::{StorageError, StorageResult};
use chrono::NaiveDate;
use std::io::Write;
use std::path::{Path, PathBuf};

/// The last calendar day an owner's crawl fully processed
///
/// Stored as a single `YYYY-MM-DD` line. Saving overwrites the previous
/// value through a rename, so the file always holds one complete date.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    path: PathBuf,
}

impl Checkpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the checkpoint, or `None` if none was written yet
    pub fn load(&self) -> StorageResult<Option<NaiveDate>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        NaiveDate::parse_from_str(content.trim(), DATE_FORMAT)
            .map(Some)
            .map_err(|_| StorageError::InvalidCheckpoint {
                path: self.path.display().to_string(),
                content: content.trim().to_string(),
            })
    }

    /// Overwrites the checkpoint with `day`
    pub fn save(&self, day: NaiveDate) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let partial = self.path.with_extension("lock.part");

        let mut file = std::fs::File::create(&partial)?;
        write!(file, "{}", day.format(DATE_FORMAT))?;
        file.sync_all()?;
        drop(file);

        std::fs::rename(&partial, &self.path)?;
        Ok(())
    }
}
