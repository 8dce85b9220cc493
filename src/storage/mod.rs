//! Storage module for persisting archived records
//!
//! This module handles everything written under the data directory:
//! - Owner names and their on-disk layout
//! - The pipe-delimited, append-only ledger of records
//! - Visual snapshots keyed by identifier
//! - The single-line checkpoint used to resume a crawl

mod checkpoint;
mod ledger;
mod row;
mod traits;

pub use checkpoint::Checkpoint;
pub use ledger::Ledger;
pub use row::{decode_record, encode_record};
pub use traits::{RecordStore, StorageError, StorageResult};

use crate::ArchiveError;
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::{Path, PathBuf};

/// The account whose posts are archived, normalized to lowercase
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Owner(String);

impl Owner {
    /// Parses and normalizes an owner name
    ///
    /// A leading `@` is dropped; the rest must be ASCII letters, digits or `_`.
    pub fn parse(input: &str) -> Result<Self, ArchiveError> {
        let name = input.trim().trim_start_matches('@').to_ascii_lowercase();

        if name.is_empty() {
            return Err(ArchiveError::InvalidInput("owner cannot be empty".to_string()));
        }

        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ArchiveError::InvalidInput(format!(
                "owner '{}' may only contain letters, digits and '_'",
                input
            )));
        }

        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether an item was posted on its own or as a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Original,
    Reply,
}

impl Kind {
    /// Single-letter code stored in the ledger
    pub fn to_code(&self) -> &'static str {
        match self {
            Self::Original => "T",
            Self::Reply => "C",
        }
    }

    /// Parses a ledger code
    pub fn from_code(s: &str) -> Option<Self> {
        match s {
            "T" => Some(Self::Original),
            "C" => Some(Self::Reply),
            _ => None,
        }
    }
}

/// One archived item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: Kind,
    pub text: String,
}

/// Per-owner file layout under the data directory
///
/// ```text
/// {data_dir}/{owner}/{owner}.csv
/// {data_dir}/{owner}/{owner}.lock
/// {data_dir}/{owner}/screenshots/{id}.png
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerPaths {
    pub root: PathBuf,
    pub ledger: PathBuf,
    pub checkpoint: PathBuf,
    pub screenshots: PathBuf,
}

impl OwnerPaths {
    pub fn new(data_dir: &Path, owner: &Owner) -> Self {
        let root = data_dir.join(owner.as_str());
        Self {
            ledger: root.join(format!("{}.csv", owner)),
            checkpoint: root.join(format!("{}.lock", owner)),
            screenshots: root.join("screenshots"),
            root,
        }
    }

    /// Path of the snapshot for one identifier
    pub fn snapshot(&self, id: &str) -> PathBuf {
        self.screenshots.join(format!("{}.png", id))
    }

    /// Creates the owner and screenshot directories if missing
    pub fn ensure_dirs(&self) -> StorageResult<()> {
        std::fs::create_dir_all(&self.screenshots)?;
        Ok(())
    }
}

/// Lists owners that already have an archive under `data_dir`
///
/// An owner counts once its directory holds a ledger or a checkpoint, so
/// an empty directory left behind by a mistyped owner is ignored, as are
/// directories whose names are not valid owners. A missing data directory
/// yields an empty list.
pub fn discover_owners(data_dir: &Path) -> StorageResult<Vec<Owner>> {
    let entries = match std::fs::read_dir(data_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut owners = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        match name.to_str().map(Owner::parse) {
            Some(Ok(owner)) if owner.as_str() == name.to_str().unwrap_or_default() => {
                let paths = OwnerPaths::new(data_dir, &owner);
                if paths.ledger.is_file() || paths.checkpoint.is_file() {
                    owners.push(owner);
                } else {
                    tracing::debug!("Skipping @{}: no ledger or checkpoint", owner);
                }
            }
            _ => tracing::debug!("Skipping non-owner directory {:?}", name),
        }
    }

    owners.sort();
    Ok(owners)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_owner_normalization() {
        assert_eq!(Owner::parse("Alice").unwrap().as_str(), "alice");
        assert_eq!(Owner::parse("@Bob_42").unwrap().as_str(), "bob_42");
        assert_eq!(Owner::parse("  carol \n").unwrap().as_str(), "carol");

        assert!(Owner::parse("").is_err());
        assert!(Owner::parse("@").is_err());
        assert!(Owner::parse("../etc").is_err());
        assert!(Owner::parse("a b").is_err());
    }

    #[test]
    fn test_kind_codes() {
        assert_eq!(Kind::from_code(Kind::Original.to_code()), Some(Kind::Original));
        assert_eq!(Kind::from_code(Kind::Reply.to_code()), Some(Kind::Reply));
        assert_eq!(Kind::from_code("reply"), None);
        assert_eq!(Kind::from_code("X"), None);
    }

    #[test]
    fn test_owner_paths_layout() {
        let owner = Owner::parse("alice").unwrap();
        let paths = OwnerPaths::new(Path::new("data"), &owner);

        assert_eq!(paths.ledger, Path::new("data/alice/alice.csv"));
        assert_eq!(paths.checkpoint, Path::new("data/alice/alice.lock"));
        assert_eq!(paths.snapshot("111"), Path::new("data/alice/screenshots/111.png"));
    }

    #[test]
    fn test_discover_owners() {
        let dir = TempDir::new().unwrap();
        for name in ["bob", "alice", "Not Valid", "Upper"] {
            std::fs::create_dir(dir.path().join(name)).unwrap();
            std::fs::write(dir.path().join(name).join(format!("{}.lock", name)), "2021-01-01")
                .unwrap();
        }
        std::fs::write(dir.path().join("stray.txt"), "x").unwrap();

        let owners = discover_owners(dir.path()).unwrap();
        let names: Vec<&str> = owners.iter().map(|o| o.as_str()).collect();
        assert_eq!(names, vec!["alice", "bob"]);
    }

    #[test]
    fn test_discover_owners_needs_ledger_or_checkpoint() {
        let dir = TempDir::new().unwrap();
        let with_ledger = Owner::parse("carol").unwrap();
        let paths = OwnerPaths::new(dir.path(), &with_ledger);
        paths.ensure_dirs().unwrap();
        std::fs::write(&paths.ledger, "").unwrap();

        // Opening a ledger for an owner that was never crawled, as --stats
        // does, must not make that owner discoverable.
        let typo = Owner::parse("aaa_typo").unwrap();
        Ledger::open(OwnerPaths::new(dir.path(), &typo)).unwrap();
        std::fs::create_dir_all(dir.path().join("dave/screenshots")).unwrap();

        let owners = discover_owners(dir.path()).unwrap();
        assert_eq!(owners, vec![with_ledger]);
    }

    #[test]
    fn test_discover_owners_missing_dir() {
        let dir = TempDir::new().unwrap();
        let owners = discover_owners(&dir.path().join("absent")).unwrap();
        assert!(owners.is_empty());
    }
}
