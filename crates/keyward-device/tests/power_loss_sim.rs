//! Recovery interrupted by power loss, simulated by dropping and reopening
//! the file-backed store between share entries.

use std::path::Path;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::TempDir;

use keyward_crypto::slip39::split_master_secret;
use keyward_device::{recover_device, seed_from_storage, RecoveryOutcome, RecoveryRequest};
use keyward_storage::{DeviceStorage, FileStore};

fn open(path: &Path) -> DeviceStorage<FileStore> {
    DeviceStorage::new(FileStore::open(path).unwrap())
}

fn submit(path: &Path, mnemonic: &str) -> RecoveryOutcome {
    let mut storage = open(path);
    let words: Vec<&str> = mnemonic.split_whitespace().collect();
    recover_device(&mut storage, &RecoveryRequest::default(), &words).unwrap()
}

#[test]
fn recovery_survives_restart_between_shares() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("device.json");
    let master = [0x24u8; 16];
    let set = split_master_secret(&mut StdRng::seed_from_u64(1), &master, 4, 3, 0, b"").unwrap();

    assert_eq!(
        submit(&path, &set.mnemonics[3]),
        RecoveryOutcome::InProgress {
            remaining: 2,
            word_count: 20
        }
    );
    assert_eq!(
        submit(&path, &set.mnemonics[1]),
        RecoveryOutcome::InProgress {
            remaining: 1,
            word_count: 20
        }
    );

    let storage = open(&path);
    assert!(!storage.is_initialized());
    let state = storage.load_share_set().unwrap().unwrap();
    assert_eq!(state.indices(), vec![3, 1]);
    drop(storage);

    assert_eq!(submit(&path, &set.mnemonics[0]), RecoveryOutcome::Recovered);

    let storage = open(&path);
    assert!(storage.is_initialized());
    assert!(storage.load_share_set().unwrap().is_none());
    assert_eq!(seed_from_storage(&storage, "").unwrap().as_bytes(), &master);
}

#[test]
fn interrupted_write_keeps_previous_share_state() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("device.json");
    let set = split_master_secret(&mut StdRng::seed_from_u64(2), &[1u8; 16], 3, 2, 0, b"").unwrap();

    submit(&path, &set.mnemonics[0]);

    // the next batch was written to the temp file but never renamed
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    std::fs::write(&tmp, b"{\"entries\": [").unwrap();

    let storage = open(&path);
    let state = storage.load_share_set().unwrap().unwrap();
    assert_eq!(state.indices(), vec![0]);
    assert_eq!(state.remaining(), 1);
    drop(storage);

    assert_eq!(submit(&path, &set.mnemonics[2]), RecoveryOutcome::Recovered);
}
