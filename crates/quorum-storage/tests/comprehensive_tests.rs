//! # comprehensive storage tests
//!
//! why: verify all storage scenarios work correctly
//! relations: tests quorum-storage crate
//! what: persistence, crash recovery, atomic writes, corrupt state, edge cases

use quorum_core::{HardState, Log, LogEntry};
use quorum_storage::{decode_state, encode_state, FileStorage, InMemoryStorage, Storage, StorageError};
use std::fs;
use tempfile::tempdir;

fn state(term: u64, voted_for: Option<usize>, entries: &[(u64, &[u8])]) -> HardState {
    HardState {
        current_term: term,
        voted_for,
        log: Log::from_entries(
            entries
                .iter()
                .map(|(t, cmd)| LogEntry::new(*t, cmd.to_vec()))
                .collect(),
        ),
    }
}

// =============================================================================
// SECTION 1: IN-MEMORY STORAGE TESTS
// =============================================================================

mod in_memory_basic {
    use super::*;

    #[test]
    fn new_storage_has_no_state() {
        let storage = InMemoryStorage::new();
        assert_eq!(storage.load().unwrap(), None);
        assert_eq!(storage.load_state().unwrap(), None);
    }

    #[test]
    fn save_and_load_state() {
        let mut storage = InMemoryStorage::new();
        let saved = state(5, Some(3), &[(1, b"cmd1"), (5, b"cmd2")]);

        storage.save_state(&saved).unwrap();

        assert_eq!(storage.load_state().unwrap(), Some(saved));
    }

    #[test]
    fn save_voted_for_none() {
        let mut storage = InMemoryStorage::new();

        storage.save_state(&state(10, None, &[])).unwrap();
        let loaded = storage.load_state().unwrap().unwrap();

        assert_eq!(loaded.current_term, 10);
        assert_eq!(loaded.voted_for, None);
    }

    #[test]
    fn later_save_replaces_earlier() {
        let mut storage = InMemoryStorage::new();

        storage.save_state(&state(1, Some(1), &[(1, b"a")])).unwrap();
        storage.save_state(&state(5, Some(3), &[])).unwrap();

        let loaded = storage.load_state().unwrap().unwrap();
        assert_eq!(loaded.current_term, 5);
        assert_eq!(loaded.voted_for, Some(3));
        assert!(loaded.log.is_empty());
    }

    #[test]
    fn clear_resets_all_state() {
        let mut storage = InMemoryStorage::new();
        storage.save_state(&state(5, Some(1), &[(5, b"x")])).unwrap();

        storage.clear().unwrap();

        assert_eq!(storage.load_state().unwrap(), None);
    }

    #[test]
    fn blob_carries_over_to_new_instance() {
        let mut first = InMemoryStorage::new();
        first.save_state(&state(7, Some(0), &[(7, b"cmd")])).unwrap();

        let second = InMemoryStorage::with_blob(first.load().unwrap().unwrap());

        assert_eq!(second.load_state().unwrap(), first.load_state().unwrap());
    }
}

// =============================================================================
// SECTION 2: FILE STORAGE TESTS
// =============================================================================

mod file_storage_basic {
    use super::*;

    #[test]
    fn create_storage_creates_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("node-0");

        FileStorage::new(&path).unwrap();

        assert!(path.is_dir());
    }

    #[test]
    fn new_storage_has_no_state() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();

        assert_eq!(storage.load_state().unwrap(), None);
    }

    #[test]
    fn save_creates_state_file() {
        let dir = tempdir().unwrap();
        let mut storage = FileStorage::new(dir.path()).unwrap();

        storage.save_state(&state(1, None, &[])).unwrap();

        assert!(storage.state_path().exists());
    }

    #[test]
    fn save_and_load_entries() {
        let dir = tempdir().unwrap();
        let mut storage = FileStorage::new(dir.path()).unwrap();
        let saved = state(1, Some(0), &[(1, b"set key1 value1"), (1, b"set key2 value2")]);

        storage.save_state(&saved).unwrap();

        let loaded = storage.load_state().unwrap().unwrap();
        assert_eq!(loaded.log.len(), 2);
        assert_eq!(loaded.log.get(0).unwrap().command, b"set key1 value1".to_vec());
    }
}

// =============================================================================
// SECTION 3: CRASH RECOVERY TESTS
// =============================================================================

mod crash_recovery {
    use super::*;

    #[test]
    fn term_vote_and_log_survive_restart() {
        let dir = tempdir().unwrap();
        let saved = state(5, Some(2), &[(1, b"a"), (3, b"b"), (5, b"c")]);

        {
            let mut storage = FileStorage::new(dir.path()).unwrap();
            storage.save_state(&saved).unwrap();
        }

        let storage = FileStorage::new(dir.path()).unwrap();
        let loaded = storage.load_state().unwrap().unwrap();
        assert_eq!(loaded.current_term, 5);
        assert_eq!(loaded.voted_for, Some(2));
        assert_eq!(loaded.log, saved.log);
    }

    #[test]
    fn multiple_restarts_preserve_latest_state() {
        let dir = tempdir().unwrap();

        for term in 1..=3u64 {
            let mut storage = FileStorage::new(dir.path()).unwrap();
            let mut current = storage.load_state().unwrap().unwrap_or_default();
            current.current_term = term;
            current.log.append(LogEntry::new(term, format!("cmd{term}").into_bytes()));
            storage.save_state(&current).unwrap();
        }

        let storage = FileStorage::new(dir.path()).unwrap();
        let loaded = storage.load_state().unwrap().unwrap();
        assert_eq!(loaded.current_term, 3);
        assert_eq!(loaded.log.len(), 3);
        assert_eq!(loaded.log.get(2).unwrap().command, b"cmd3".to_vec());
    }

    #[test]
    fn clear_removes_state_file() {
        let dir = tempdir().unwrap();
        let mut storage = FileStorage::new(dir.path()).unwrap();
        storage.save_state(&state(1, None, &[])).unwrap();

        storage.clear().unwrap();

        assert!(!storage.state_path().exists());
        assert_eq!(storage.load_state().unwrap(), None);
    }

    #[test]
    fn clear_on_fresh_directory_is_fine() {
        let dir = tempdir().unwrap();
        let mut storage = FileStorage::new(dir.path()).unwrap();
        assert!(storage.clear().is_ok());
    }
}

// =============================================================================
// SECTION 4: ATOMIC WRITES AND CORRUPTION
// =============================================================================

mod atomic_writes {
    use super::*;

    #[test]
    fn state_file_is_valid_json() {
        let dir = tempdir().unwrap();
        let mut storage = FileStorage::new(dir.path()).unwrap();
        storage.save_state(&state(4, Some(1), &[(4, b"x")])).unwrap();

        let contents = fs::read_to_string(storage.state_path()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&contents).unwrap();

        assert_eq!(parsed["current_term"], 4);
        assert_eq!(parsed["voted_for"], 1);
    }

    #[test]
    fn no_temp_files_remain() {
        let dir = tempdir().unwrap();
        let mut storage = FileStorage::new(dir.path()).unwrap();
        storage.save_state(&state(1, None, &[])).unwrap();
        storage.save_state(&state(2, None, &[])).unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();

        assert_eq!(names, vec!["state.json".to_string()]);
    }

    #[test]
    fn corrupt_file_is_reported_not_defaulted() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();
        fs::write(storage.state_path(), b"{\"current_term\": 3, \"voted_for\"").unwrap();

        let err = storage.load_state().unwrap_err();

        assert!(matches!(err, StorageError::Corrupt(_)));
    }

    #[test]
    fn corrupt_in_memory_blob_is_reported() {
        let storage = InMemoryStorage::with_blob(b"garbage".to_vec());
        assert!(matches!(storage.load_state(), Err(StorageError::Corrupt(_))));
    }
}

// =============================================================================
// SECTION 5: EDGE CASES
// =============================================================================

mod edge_cases {
    use super::*;

    #[test]
    fn large_log_entry() {
        let mut storage = InMemoryStorage::new();
        let big = vec![0xAB; 1024 * 1024];
        storage.save_state(&state(1, None, &[(1, big.as_slice())])).unwrap();

        let loaded = storage.load_state().unwrap().unwrap();
        assert_eq!(loaded.log.get(0).unwrap().command.len(), 1024 * 1024);
    }

    #[test]
    fn many_log_entries_keep_order() {
        let dir = tempdir().unwrap();
        let mut storage = FileStorage::new(dir.path()).unwrap();
        let mut saved = HardState::default();
        for i in 0..1000u64 {
            saved.log.append(LogEntry::new(i / 100, i.to_be_bytes().to_vec()));
        }

        storage.save_state(&saved).unwrap();

        let loaded = storage.load_state().unwrap().unwrap();
        assert_eq!(loaded.log, saved.log);
        assert_eq!(loaded.log.get(999).unwrap().command, 999u64.to_be_bytes().to_vec());
    }

    #[test]
    fn binary_command_data() {
        let binary: Vec<u8> = (0..=255).collect();
        let blob = encode_state(&state(1, None, &[(1, binary.as_slice())])).unwrap();

        let loaded = decode_state(&blob).unwrap();

        assert_eq!(loaded.log.get(0).unwrap().command, binary);
    }

    #[test]
    fn very_high_term_number() {
        let blob = encode_state(&state(u64::MAX, Some(usize::MAX), &[])).unwrap();

        let loaded = decode_state(&blob).unwrap();

        assert_eq!(loaded.current_term, u64::MAX);
        assert_eq!(loaded.voted_for, Some(usize::MAX));
    }
}

// =============================================================================
// SECTION 6: TRAIT POLYMORPHISM
// =============================================================================

mod trait_polymorphism {
    use super::*;

    fn test_storage_impl(storage: &mut dyn Storage) {
        assert_eq!(storage.load_state().unwrap(), None);

        let saved = state(3, Some(1), &[(2, b"a"), (3, b"b")]);
        storage.save_state(&saved).unwrap();
        assert_eq!(storage.load_state().unwrap(), Some(saved));

        storage.clear().unwrap();
        assert_eq!(storage.load_state().unwrap(), None);
    }

    #[test]
    fn in_memory_implements_trait() {
        let mut storage = InMemoryStorage::new();
        test_storage_impl(&mut storage);
    }

    #[test]
    fn file_storage_implements_trait() {
        let dir = tempdir().unwrap();
        let mut storage = FileStorage::new(dir.path()).unwrap();
        test_storage_impl(&mut storage);
    }
}
