//! keyward-storage: persistence for the device secret record
//!
//! [`SecretStore`] is the key-value interface the device logic runs against:
//! `(namespace, key)` addressed entries with public/private visibility,
//! monotonic counters and an atomic multi-write ([`WriteBatch`]).
//! [`MemoryStore`] backs tests and ephemeral sessions, [`FileStore`] persists
//! to a JSON file replaced atomically on every batch.
//!
//! [`DeviceStorage`] layers the typed device record on top: mnemonic and
//! standard, backup flags, settings, the U2F counter and the in-progress
//! SLIP-39 share set.

pub mod device;
pub mod file;
pub mod layout;
pub mod store;

pub use device::{DeviceSettings, DeviceStorage, SecretRecord, ShareSetState, Slip39Parameters};
pub use file::FileStore;
pub use store::{MemoryStore, SecretStore, WriteBatch, WriteOp};
