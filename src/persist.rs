use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The durable `(current_term, voted_for)` pair.
///
/// Always written as a single record so a crash can never leave the term and
/// the vote out of sync with each other.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermRecord {
    pub current_term: u64,
    pub voted_for: Option<String>,
}

/// File-backed store for the term/vote record.
///
/// Exclusively owned by one node; access is serialized through its event
/// loop, so there is never a concurrent writer.
#[derive(Debug)]
pub struct TermStore {
    path: PathBuf,
}

impl TermStore {
    /// Opens the store at `path`, creating an empty file if none exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the last durably written record, or the zero-value default if
    /// nothing has been written yet. A malformed record is an error, not a
    /// default: silently dropping a vote could let the node vote twice.
    pub fn load(&self) -> Result<TermRecord> {
        let mut contents = String::new();
        File::open(&self.path)?.read_to_string(&mut contents)?;
        if contents.trim().is_empty() {
            return Ok(TermRecord::default());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    /// Atomically replaces the record: write a sibling temp file, flush it to
    /// disk, then rename it over the original.
    pub fn save(&self, record: &TermRecord) -> Result<()> {
        let tmp = self.path.with_extension("tmp");
        let mut file = File::create(&tmp)?;
        file.write_all(&serde_json::to_vec(record)?)?;
        file.sync_all()?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, TermStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = TermStore::open(dir.path().join("term.json")).unwrap();
        (dir, store)
    }

    #[test]
    fn fresh_store_loads_default() {
        let (_dir, store) = temp_store();
        assert_eq!(store.load().unwrap(), TermRecord::default());
    }

    #[test]
    fn save_then_load_round_trips() {
        let (_dir, store) = temp_store();
        let record = TermRecord {
            current_term: 3,
            voted_for: Some("node-a".into()),
        };
        store.save(&record).unwrap();
        assert_eq!(store.load().unwrap(), record);
    }

    #[test]
    fn save_overwrites_previous_record() {
        let (_dir, store) = temp_store();
        store
            .save(&TermRecord {
                current_term: 1,
                voted_for: Some("a".into()),
            })
            .unwrap();
        store
            .save(&TermRecord {
                current_term: 2,
                voted_for: None,
            })
            .unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.current_term, 2);
        assert_eq!(loaded.voted_for, None);
    }

    #[test]
    fn reopen_preserves_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("term.json");
        {
            let store = TermStore::open(&path).unwrap();
            store
                .save(&TermRecord {
                    current_term: 9,
                    voted_for: Some("b".into()),
                })
                .unwrap();
        }
        let store = TermStore::open(&path).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.current_term, 9);
        assert_eq!(loaded.voted_for.as_deref(), Some("b"));
    }

    #[test]
    fn corrupt_record_is_an_error() {
        let (_dir, store) = temp_store();
        std::fs::write(store.path(), b"{\"current_term\": 4, \"voted").unwrap();
        assert!(matches!(store.load(), Err(Error::Corrupt(_))));
    }

    #[test]
    fn unopenable_path_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = TermStore::open(dir.path().join("missing").join("term.json"));
        assert!(matches!(result, Err(Error::Storage(_))));
    }
}
