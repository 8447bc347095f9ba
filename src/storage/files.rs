//! Counts file pair
//!
//! Two files, `{base}.a` and `{base}.b`, alternate as the live file. The one
//! with the higher `(tx id, minor version)` header wins on startup; rotation
//! always writes the other one.
//!
//! ## Responsibilities
//! - Create both files for a fresh store
//! - Select the live file on startup
//! - Remove temp files left by a crash mid-rotation

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{CountsError, Result};

use super::reader::DurableStore;
use super::writer::{temp_path, WriterOptions};

/// Which of the two files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    A,
    B,
}

impl Slot {
    /// The file rotation writes next
    pub fn other(self) -> Slot {
        match self {
            Slot::A => Slot::B,
            Slot::B => Slot::A,
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            Slot::A => "a",
            Slot::B => "b",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Outcome of startup file selection
#[derive(Debug)]
pub struct FileSelection {
    /// The live file
    pub store: DurableStore,
    /// Which slot it lives in
    pub slot: Slot,
    /// Both files were created just now
    pub created: bool,
}

/// Naming and selection for the `.a`/`.b` pair
#[derive(Debug, Clone)]
pub struct StoreFiles {
    dir: PathBuf,
    base_name: String,
}

impl StoreFiles {
    pub fn new(dir: impl Into<PathBuf>, base_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            base_name: base_name.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `{dir}/{base}.a` or `{dir}/{base}.b`
    pub fn path(&self, slot: Slot) -> PathBuf {
        self.dir.join(format!("{}.{}", self.base_name, slot.suffix()))
    }

    /// Whether either file exists
    pub fn any_exists(&self) -> bool {
        self.path(Slot::A).exists() || self.path(Slot::B).exists()
    }

    /// Open the live file, creating a fresh pair if neither file exists
    ///
    /// On startup:
    /// 1. Remove temp files from an interrupted rotation
    /// 2. Create both files if none exist (unless read-only)
    /// 3. Open both; keep the valid one with the higher (tx, minor)
    /// 4. Fail if neither opens
    pub fn open_or_create(&self, read_only: bool, records_per_page: usize) -> Result<FileSelection> {
        if !read_only {
            self.remove_temp_files();
        }

        if !self.any_exists() {
            if read_only {
                return Err(CountsError::ReadOnly(format!(
                    "no counts files in {}",
                    self.dir.display()
                )));
            }
            return self.create_fresh(records_per_page);
        }

        let a = DurableStore::open(&self.path(Slot::A));
        let b = DurableStore::open(&self.path(Slot::B));

        let (store, slot) = match (a, b) {
            (Ok(a), Ok(b)) => {
                if b.header().version() > a.header().version() {
                    (b, Slot::B)
                } else {
                    if a.header().version() == b.header().version() {
                        tracing::warn!(
                            tx_id = a.tx_id(),
                            minor_version = a.minor_version(),
                            "Both counts files carry the same version, using .a"
                        );
                    }
                    (a, Slot::A)
                }
            }
            (Ok(a), Err(e)) => {
                tracing::warn!(
                    file = %self.path(Slot::B).display(),
                    error = %e,
                    "Counts file could not be opened, continuing with .a"
                );
                (a, Slot::A)
            }
            (Err(e), Ok(b)) => {
                tracing::warn!(
                    file = %self.path(Slot::A).display(),
                    error = %e,
                    "Counts file could not be opened, continuing with .b"
                );
                (b, Slot::B)
            }
            (Err(ea), Err(eb)) => {
                tracing::error!(error_a = %ea, error_b = %eb, "No usable counts file");
                return Err(CountsError::NoValidStoreFile {
                    first: self.path(Slot::A),
                    second: self.path(Slot::B),
                });
            }
        };

        tracing::info!(
            file = %store.path().display(),
            tx_id = store.tx_id(),
            minor_version = store.minor_version(),
            records = store.record_count(),
            "Selected live counts file"
        );
        Ok(FileSelection {
            store,
            slot,
            created: false,
        })
    }

    /// Create an empty pair: `.a` (tx 0, minor 1) is live, `.b` (tx 0, minor 0)
    fn create_fresh(&self, records_per_page: usize) -> Result<FileSelection> {
        fs::create_dir_all(&self.dir)?;

        let mut secondary = WriterOptions::new(0, 0);
        secondary.records_per_page = records_per_page;
        DurableStore::create_empty(&self.path(Slot::B), secondary)?;

        let mut live = WriterOptions::new(0, 1);
        live.records_per_page = records_per_page;
        let store = DurableStore::create_empty(&self.path(Slot::A), live)?;

        tracing::info!(dir = %self.dir.display(), "Created new counts files");
        Ok(FileSelection {
            store,
            slot: Slot::A,
            created: true,
        })
    }

    fn remove_temp_files(&self) {
        for slot in [Slot::A, Slot::B] {
            let temp = temp_path(&self.path(slot));
            if temp.exists() {
                tracing::warn!(file = %temp.display(), "Removing unfinished counts file");
                let _ = fs::remove_file(&temp);
            }
        }
    }
}
