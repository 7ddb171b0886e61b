//! The `SecretStore` interface and its in-memory backend.

use std::collections::BTreeMap;

use zeroize::Zeroizing;

use keyward_core::{KeywardError, KeywardResult};

/// Address of one stored value. Public and private entries with the same
/// `(namespace, key)` are distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct EntryKey {
    pub namespace: u8,
    pub key: u8,
    pub public: bool,
}

/// A monotonic counter slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Counter {
    pub value: u32,
    pub writable_when_locked: bool,
}

/// One mutation inside a [`WriteBatch`].
pub enum WriteOp {
    Set {
        namespace: u8,
        key: u8,
        value: Zeroizing<Vec<u8>>,
        public: bool,
    },
    Delete {
        namespace: u8,
        key: u8,
        public: bool,
    },
    SetCounter {
        namespace: u8,
        key: u8,
        value: u32,
        writable_when_locked: bool,
    },
}

impl std::fmt::Debug for WriteOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteOp::Set {
                namespace,
                key,
                value,
                public,
            } => f
                .debug_struct("Set")
                .field("namespace", namespace)
                .field("key", key)
                .field("len", &value.len())
                .field("public", public)
                .finish(),
            WriteOp::Delete {
                namespace,
                key,
                public,
            } => f
                .debug_struct("Delete")
                .field("namespace", namespace)
                .field("key", key)
                .field("public", public)
                .finish(),
            WriteOp::SetCounter {
                namespace,
                key,
                value,
                writable_when_locked,
            } => f
                .debug_struct("SetCounter")
                .field("namespace", namespace)
                .field("key", key)
                .field("value", value)
                .field("writable_when_locked", writable_when_locked)
                .finish(),
        }
    }
}

/// An ordered group of writes applied all-or-nothing by [`SecretStore::apply`].
#[derive(Debug, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, namespace: u8, key: u8, value: &[u8], public: bool) -> &mut Self {
        self.ops.push(WriteOp::Set {
            namespace,
            key,
            value: Zeroizing::new(value.to_vec()),
            public,
        });
        self
    }

    pub fn delete(&mut self, namespace: u8, key: u8, public: bool) -> &mut Self {
        self.ops.push(WriteOp::Delete {
            namespace,
            key,
            public,
        });
        self
    }

    pub fn set_counter(
        &mut self,
        namespace: u8,
        key: u8,
        value: u32,
        writable_when_locked: bool,
    ) -> &mut Self {
        self.ops.push(WriteOp::SetCounter {
            namespace,
            key,
            value,
            writable_when_locked,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub(crate) fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

/// Key-value store holding the device secret record.
///
/// Implementations must make [`apply`](SecretStore::apply) atomic: after a
/// crash the store holds either every write of the batch or none of them.
pub trait SecretStore {
    /// Read an entry. `public` selects the public or the private entry.
    fn get(&self, namespace: u8, key: u8, public: bool) -> Option<Zeroizing<Vec<u8>>>;

    /// Current value of a counter, `None` if it was never set.
    fn counter(&self, namespace: u8, key: u8) -> Option<u32>;

    /// Apply every write of `batch`, in order, as one atomic update.
    fn apply(&mut self, batch: WriteBatch) -> KeywardResult<()>;

    /// Erase every entry and counter.
    fn wipe(&mut self) -> KeywardResult<()>;

    fn set(&mut self, namespace: u8, key: u8, value: &[u8], public: bool) -> KeywardResult<()> {
        let mut batch = WriteBatch::new();
        batch.set(namespace, key, value, public);
        self.apply(batch)
    }

    fn delete(&mut self, namespace: u8, key: u8, public: bool) -> KeywardResult<()> {
        let mut batch = WriteBatch::new();
        batch.delete(namespace, key, public);
        self.apply(batch)
    }

    fn set_counter(
        &mut self,
        namespace: u8,
        key: u8,
        value: u32,
        writable_when_locked: bool,
    ) -> KeywardResult<()> {
        let mut batch = WriteBatch::new();
        batch.set_counter(namespace, key, value, writable_when_locked);
        self.apply(batch)
    }

    /// Increment a counter and return the new value. A counter that was
    /// never set starts at 0.
    fn next_counter(
        &mut self,
        namespace: u8,
        key: u8,
        writable_when_locked: bool,
    ) -> KeywardResult<u32> {
        let next = match self.counter(namespace, key) {
            None => 0,
            Some(current) => current.checked_add(1).ok_or_else(|| {
                KeywardError::Storage(format!("counter {namespace:#04x}/{key:#04x} exhausted"))
            })?,
        };
        self.set_counter(namespace, key, next, writable_when_locked)?;
        Ok(next)
    }
}

/// Entries and counters of a store, shared by the backends.
#[derive(Clone, Default)]
pub(crate) struct StoreState {
    pub entries: BTreeMap<EntryKey, Zeroizing<Vec<u8>>>,
    pub counters: BTreeMap<(u8, u8), Counter>,
}

impl std::fmt::Debug for StoreState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreState")
            .field("entries", &self.entries.len())
            .field("counters", &self.counters.len())
            .finish()
    }
}

impl StoreState {
    pub fn get(&self, namespace: u8, key: u8, public: bool) -> Option<Zeroizing<Vec<u8>>> {
        self.entries
            .get(&EntryKey {
                namespace,
                key,
                public,
            })
            .cloned()
    }

    pub fn counter(&self, namespace: u8, key: u8) -> Option<u32> {
        self.counters.get(&(namespace, key)).map(|c| c.value)
    }

    pub fn apply(&mut self, batch: WriteBatch) {
        for op in batch.into_ops() {
            match op {
                WriteOp::Set {
                    namespace,
                    key,
                    value,
                    public,
                } => {
                    self.entries.insert(
                        EntryKey {
                            namespace,
                            key,
                            public,
                        },
                        value,
                    );
                }
                WriteOp::Delete {
                    namespace,
                    key,
                    public,
                } => {
                    self.entries.remove(&EntryKey {
                        namespace,
                        key,
                        public,
                    });
                }
                WriteOp::SetCounter {
                    namespace,
                    key,
                    value,
                    writable_when_locked,
                } => {
                    self.counters.insert(
                        (namespace, key),
                        Counter {
                            value,
                            writable_when_locked,
                        },
                    );
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.counters.clear();
    }
}

/// Volatile store; contents vanish with the value.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: StoreState,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, counters excluded.
    pub fn len(&self) -> usize {
        self.state.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.entries.is_empty() && self.state.counters.is_empty()
    }
}

impl SecretStore for MemoryStore {
    fn get(&self, namespace: u8, key: u8, public: bool) -> Option<Zeroizing<Vec<u8>>> {
        self.state.get(namespace, key, public)
    }

    fn counter(&self, namespace: u8, key: u8) -> Option<u32> {
        self.state.counter(namespace, key)
    }

    fn apply(&mut self, batch: WriteBatch) -> KeywardResult<()> {
        self.state.apply(batch);
        Ok(())
    }

    fn wipe(&mut self) -> KeywardResult<()> {
        self.state.clear();
        Ok(())
    }
}
