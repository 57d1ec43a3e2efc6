//! # quorum-storage
//!
//! why: provide durable persistence for raft state using standard rust fs apis
//! relations: used by quorum-node to flush quorum-core's HardState on every change
//! what: Storage trait, FileStorage implementation, InMemoryStorage for testing,
//! codec for the persisted blob

pub mod codec;
pub mod error;

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::PathBuf;

use quorum_core::HardState;

pub use codec::{decode_state, encode_state};
pub use error::StorageError;

/// trait for durable storage of raft state
///
/// the store only knows about one opaque blob; what goes inside it is the
/// codec's business. `save` must be atomic: after a crash `load` returns
/// either the previous blob or the new one, never a mix.
pub trait Storage: Send {
    /// replace the persisted blob
    fn save(&mut self, blob: &[u8]) -> Result<(), StorageError>;

    /// the last saved blob, `None` if nothing was ever saved
    fn load(&self) -> Result<Option<Vec<u8>>, StorageError>;

    /// clear all persisted state (for testing)
    fn clear(&mut self) -> Result<(), StorageError>;

    /// encode and persist term, vote and log
    fn save_state(&mut self, state: &HardState) -> Result<(), StorageError> {
        let blob = encode_state(state)?;
        self.save(&blob)
    }

    /// load and decode term, vote and log; a blob that does not decode is an error
    fn load_state(&self) -> Result<Option<HardState>, StorageError> {
        match self.load()? {
            Some(blob) if !blob.is_empty() => decode_state(&blob).map(Some),
            _ => Ok(None),
        }
    }
}

// -- file storage implementation --

/// file-based storage implementation using std::fs
///
/// stores the blob in `state.json` inside the given directory
pub struct FileStorage {
    /// directory path for storing state files
    dir: PathBuf,
}

impl FileStorage {
    /// create a new filestorage at the given directory
    /// creates the directory if it doesn't exist
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// get the path to the state file
    pub fn state_path(&self) -> PathBuf {
        self.dir.join("state.json")
    }

    fn temp_path(&self) -> PathBuf {
        self.dir.join("state.tmp")
    }
}

impl Storage for FileStorage {
    fn save(&mut self, blob: &[u8]) -> Result<(), StorageError> {
        // atomic write: write to temp file then rename
        let temp_path = self.temp_path();
        let mut file = File::create(&temp_path)?;
        file.write_all(blob)?;
        file.sync_all()?;
        fs::rename(&temp_path, self.state_path())?;
        Ok(())
    }

    fn load(&self) -> Result<Option<Vec<u8>>, StorageError> {
        let mut file = match File::open(self.state_path()) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;
        Ok(Some(contents))
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        for path in [self.state_path(), self.temp_path()] {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

// -- in-memory storage implementation --

/// in-memory storage for testing
///
/// nothing survives the process, but a blob can be carried over to a new
/// instance with `with_blob` to simulate a restart
#[derive(Debug, Default, Clone)]
pub struct InMemoryStorage {
    blob: Option<Vec<u8>>,
}

impl InMemoryStorage {
    /// create a new in-memory storage
    pub fn new() -> Self {
        Self::default()
    }

    /// storage pre-loaded with a previously saved blob
    pub fn with_blob(blob: Vec<u8>) -> Self {
        Self { blob: Some(blob) }
    }

    /// size of the saved blob in bytes
    pub fn state_size(&self) -> usize {
        self.blob.as_ref().map_or(0, Vec::len)
    }
}

impl Storage for InMemoryStorage {
    fn save(&mut self, blob: &[u8]) -> Result<(), StorageError> {
        self.blob = Some(blob.to_vec());
        Ok(())
    }

    fn load(&self) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.blob.clone())
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        self.blob = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quorum_core::{Log, LogEntry};
    use tempfile::tempdir;

    fn sample_state() -> HardState {
        HardState {
            current_term: 5,
            voted_for: Some(2),
            log: Log::from_entries(vec![
                LogEntry::new(1, b"set key1 value1".to_vec()),
                LogEntry::new(5, b"set key2 value2".to_vec()),
            ]),
        }
    }

    #[test]
    fn in_memory_storage_persists_state() {
        let mut storage = InMemoryStorage::new();

        storage.save_state(&sample_state()).unwrap();

        assert_eq!(storage.load_state().unwrap(), Some(sample_state()));
        assert!(storage.state_size() > 0);
    }

    #[test]
    fn in_memory_storage_starts_empty() {
        let storage = InMemoryStorage::new();
        assert_eq!(storage.load_state().unwrap(), None);
    }

    #[test]
    fn file_storage_survives_restart() {
        let dir = tempdir().unwrap();

        // first "session"
        {
            let mut storage = FileStorage::new(dir.path()).unwrap();
            storage.save_state(&sample_state()).unwrap();
        }

        // "restart" - new storage instance
        {
            let storage = FileStorage::new(dir.path()).unwrap();
            assert_eq!(storage.load_state().unwrap(), Some(sample_state()));
        }
    }

    #[test]
    fn empty_blob_counts_as_fresh_node() {
        let storage = InMemoryStorage::with_blob(Vec::new());
        assert_eq!(storage.load_state().unwrap(), None);
    }
}
