//! Namespaces, keys and encodings of the persisted device record.
//!
//! Key numbers and byte encodings are part of the on-disk format: the
//! schema upgrade relies on them, so never renumber.

/// Application namespace: device record fields.
pub const APP: u8 = 0x01;
pub const DEVICE_ID: u8 = 0x00;
pub const VERSION: u8 = 0x01;
pub const MNEMONIC: u8 = 0x02;
// 0x03 is reserved (display language).
pub const LABEL: u8 = 0x04;
pub const USE_PASSPHRASE: u8 = 0x05;
pub const HOMESCREEN: u8 = 0x06;
pub const NEEDS_BACKUP: u8 = 0x07;
pub const FLAGS: u8 = 0x08;
pub const U2F_COUNTER: u8 = 0x09;
pub const PASSPHRASE_SOURCE: u8 = 0x0A;
pub const UNFINISHED_BACKUP: u8 = 0x0B;
pub const AUTOLOCK_DELAY_MS: u8 = 0x0C;
pub const NO_BACKUP: u8 = 0x0D;
pub const MNEMONIC_STANDARD: u8 = 0x0E;
/// SLIP-39 identifier of the committed encrypted master secret.
pub const SLIP39_IDENTIFIER: u8 = 0x0F;
/// SLIP-39 iteration exponent of the committed encrypted master secret.
pub const SLIP39_ITERATION_EXPONENT: u8 = 0x10;

/// SLIP-39 namespace: in-progress share set.
pub const SLIP39: u8 = 0x02;
pub const SLIP39_IN_PROGRESS: u8 = 0x00;
pub const SLIP39_ID: u8 = 0x01;
pub const SLIP39_THRESHOLD: u8 = 0x02;
pub const SLIP39_REMAINING: u8 = 0x03;
pub const SLIP39_SHARES: u8 = 0x04;
pub const SLIP39_SHARE_ITERATION_EXPONENT: u8 = 0x05;
/// Member index per slot of the shares blob, `EMPTY_SLOT` when unfilled.
pub const SLIP39_INDICES: u8 = 0x06;

pub const STORAGE_VERSION: u8 = 0x02;
/// Layout whose U2F counter lived in a private entry.
pub const LEGACY_STORAGE_VERSION: u8 = 0x01;

pub const TRUE_BYTE: u8 = 0x01;
pub const FALSE_BYTE: u8 = 0x00;

/// Filler for share slots and indices not yet received.
pub const EMPTY_SLOT: u8 = 0xFF;

pub const HOMESCREEN_MAXSIZE: usize = 16384;
pub const HOMESCREEN_HEADER: &[u8; 8] = b"TOIf\x90\x00\x90\x00";

pub const DEFAULT_AUTOLOCK_DELAY_MS: u32 = 10 * 60 * 1000;
pub const MIN_AUTOLOCK_DELAY_MS: u32 = 60 * 1000;

pub const DEVICE_ID_BYTES: usize = 12;
