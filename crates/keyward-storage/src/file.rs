//! File-backed `SecretStore`.
//!
//! The whole store is kept in memory and written out as JSON (values
//! base64-encoded) after every batch: serialize to `<path>.tmp`, fsync,
//! rename over `<path>`. A crash leaves either the old or the new file,
//! never a mixture.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use base64::{engine::general_purpose::STANDARD as B64, Engine};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use zeroize::{Zeroize, Zeroizing};

use keyward_core::{KeywardError, KeywardResult};

use crate::store::{Counter, EntryKey, SecretStore, StoreState, WriteBatch};

#[derive(Serialize, Deserialize, Default)]
struct OnDisk {
    #[serde(default)]
    entries: Vec<DiskEntry>,
    #[serde(default)]
    counters: Vec<DiskCounter>,
}

#[derive(Serialize, Deserialize)]
struct DiskEntry {
    namespace: u8,
    key: u8,
    #[serde(default)]
    public: bool,
    /// Base64 value
    value: String,
}

impl Drop for DiskEntry {
    fn drop(&mut self) {
        self.value.zeroize();
    }
}

#[derive(Serialize, Deserialize)]
struct DiskCounter {
    namespace: u8,
    key: u8,
    value: u32,
    #[serde(default)]
    writable_when_locked: bool,
}

impl OnDisk {
    fn from_state(state: &StoreState) -> Self {
        OnDisk {
            entries: state
                .entries
                .iter()
                .map(|(k, v)| DiskEntry {
                    namespace: k.namespace,
                    key: k.key,
                    public: k.public,
                    value: B64.encode(v.as_slice()),
                })
                .collect(),
            counters: state
                .counters
                .iter()
                .map(|(&(namespace, key), c)| DiskCounter {
                    namespace,
                    key,
                    value: c.value,
                    writable_when_locked: c.writable_when_locked,
                })
                .collect(),
        }
    }

    fn into_state(self) -> KeywardResult<StoreState> {
        let mut state = StoreState::default();
        for entry in &self.entries {
            let value = B64.decode(&entry.value).map_err(|e| {
                KeywardError::Storage(format!(
                    "entry {:#04x}/{:#04x}: invalid base64: {e}",
                    entry.namespace, entry.key
                ))
            })?;
            state.entries.insert(
                EntryKey {
                    namespace: entry.namespace,
                    key: entry.key,
                    public: entry.public,
                },
                Zeroizing::new(value),
            );
        }
        for counter in &self.counters {
            state.counters.insert(
                (counter.namespace, counter.key),
                Counter {
                    value: counter.value,
                    writable_when_locked: counter.writable_when_locked,
                },
            );
        }
        Ok(state)
    }
}

/// Store persisted to a single JSON file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    state: StoreState,
}

impl FileStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    ///
    /// A leftover temp file from an interrupted write is discarded; the
    /// rename never happened, so `path` still holds the last complete state.
    pub fn open(path: &Path) -> KeywardResult<Self> {
        let tmp_path = tmp_path(path);
        if tmp_path.exists() {
            warn!(path = %tmp_path.display(), "discarding incomplete store write");
            std::fs::remove_file(&tmp_path)
                .with_context(|| format!("removing stale temp file: {}", tmp_path.display()))?;
        }

        let state = if path.exists() {
            let content = Zeroizing::new(
                std::fs::read_to_string(path)
                    .with_context(|| format!("reading store: {}", path.display()))?,
            );
            let on_disk: OnDisk = serde_json::from_str(&content)
                .with_context(|| format!("parsing store: {}", path.display()))?;
            on_disk.into_state()?
        } else {
            StoreState::default()
        };

        debug!(
            path = %path.display(),
            entries = state.entries.len(),
            counters = state.counters.len(),
            "opened file store"
        );
        Ok(FileStore {
            path: path.to_path_buf(),
            state,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `state` to disk atomically.
    fn persist(&self, state: &StoreState) -> KeywardResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating store dir: {}", parent.display()))?;
            }
        }

        let json = Zeroizing::new(
            serde_json::to_string_pretty(&OnDisk::from_state(state)).context("serializing store")?,
        );

        let tmp_path = tmp_path(&self.path);
        {
            let mut file = std::fs::File::create(&tmp_path)
                .with_context(|| format!("creating store temp: {}", tmp_path.display()))?;
            file.write_all(json.as_bytes())
                .with_context(|| format!("writing store temp: {}", tmp_path.display()))?;
            file.sync_all()
                .with_context(|| format!("syncing store temp: {}", tmp_path.display()))?;
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))
                .with_context(|| format!("restricting store temp: {}", tmp_path.display()))?;
        }
        std::fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("renaming store: {}", self.path.display()))?;

        if let Some(parent) = self.path.parent() {
            if let Ok(dir) = std::fs::File::open(parent) {
                let _ = dir.sync_all();
            }
        }
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

impl SecretStore for FileStore {
    fn get(&self, namespace: u8, key: u8, public: bool) -> Option<Zeroizing<Vec<u8>>> {
        self.state.get(namespace, key, public)
    }

    fn counter(&self, namespace: u8, key: u8) -> Option<u32> {
        self.state.counter(namespace, key)
    }

    fn apply(&mut self, batch: WriteBatch) -> KeywardResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let ops = batch.len();
        let mut next = self.state.clone();
        next.apply(batch);
        self.persist(&next)?;
        self.state = next;
        debug!(ops, "applied store batch");
        Ok(())
    }

    fn wipe(&mut self) -> KeywardResult<()> {
        let empty = StoreState::default();
        self.persist(&empty)?;
        self.state = empty;
        info!(path = %self.path.display(), "store wiped");
        Ok(())
    }
}
