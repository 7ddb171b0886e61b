//! Typed access to the device record kept in a [`SecretStore`].

use rand::RngCore;
use tracing::{debug, info};
use zeroize::Zeroizing;

use keyward_core::{share_word_count, KeywardError, KeywardResult, MnemonicStandard};

use crate::layout::*;
use crate::store::{SecretStore, WriteBatch};

/// Optional settings applied together, e.g. at the end of reset or recovery.
#[derive(Debug, Clone, Default)]
pub struct DeviceSettings {
    pub label: Option<String>,
    pub use_passphrase: Option<bool>,
    pub homescreen: Option<Vec<u8>>,
    pub passphrase_source: Option<u8>,
}

/// The secret a device is initialized with.
pub enum SecretRecord<'a> {
    Bip39 {
        mnemonic: &'a [u8],
    },
    Slip39 {
        encrypted_master_secret: &'a [u8],
        identifier: u16,
        iteration_exponent: u8,
    },
}

impl SecretRecord<'_> {
    pub fn standard(&self) -> MnemonicStandard {
        match self {
            SecretRecord::Bip39 { .. } => MnemonicStandard::Bip39,
            SecretRecord::Slip39 { .. } => MnemonicStandard::Slip39,
        }
    }
}

/// Identifier and iteration exponent of a committed SLIP-39 secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slip39Parameters {
    pub identifier: u16,
    pub iteration_exponent: u8,
}

/// Partial SLIP-39 share set, as persisted between share entries.
///
/// Slots are filled in arrival order; each filled slot remembers the
/// member index of its share. `remaining` always equals the number of
/// empty slots.
pub struct ShareSetState {
    pub identifier: u16,
    pub iteration_exponent: u8,
    pub threshold: u8,
    share_len: usize,
    slots: Vec<Option<(u8, Zeroizing<Vec<u8>>)>>,
}

impl std::fmt::Debug for ShareSetState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShareSetState")
            .field("identifier", &self.identifier)
            .field("iteration_exponent", &self.iteration_exponent)
            .field("threshold", &self.threshold)
            .field("share_len", &self.share_len)
            .field("indices", &self.indices())
            .finish()
    }
}

impl ShareSetState {
    /// Empty set for shares of `share_len` bytes.
    pub fn new(
        identifier: u16,
        iteration_exponent: u8,
        threshold: u8,
        share_len: usize,
    ) -> KeywardResult<Self> {
        if threshold == 0 {
            return Err(KeywardError::InvalidShare("threshold must be at least 1".into()));
        }
        if share_word_count(share_len).is_none() {
            return Err(KeywardError::InvalidShare(format!(
                "unsupported share length {share_len}"
            )));
        }
        Ok(ShareSetState {
            identifier,
            iteration_exponent,
            threshold,
            share_len,
            slots: (0..threshold).map(|_| None).collect(),
        })
    }

    pub fn share_len(&self) -> usize {
        self.share_len
    }

    /// Shares still needed.
    pub fn remaining(&self) -> u8 {
        self.slots.iter().filter(|s| s.is_none()).count() as u8
    }

    pub fn is_complete(&self) -> bool {
        self.remaining() == 0
    }

    /// Member indices of the stored shares, in arrival order.
    pub fn indices(&self) -> Vec<u8> {
        self.slots.iter().flatten().map(|(i, _)| *i).collect()
    }

    pub fn contains(&self, index: u8) -> bool {
        self.slots.iter().flatten().any(|(i, _)| *i == index)
    }

    /// Stored shares as `(member index, value)`.
    pub fn shares(&self) -> Vec<(u8, &[u8])> {
        self.slots
            .iter()
            .flatten()
            .map(|(i, v)| (*i, v.as_slice()))
            .collect()
    }

    /// Word count of every share in this set.
    pub fn word_count(&self) -> KeywardResult<usize> {
        share_word_count(self.share_len).ok_or_else(|| {
            KeywardError::CorruptShareSet(format!("unknown share length {}", self.share_len))
        })
    }

    /// Store `value` as member `index`.
    ///
    /// An index already present is overwritten in place; a new index takes
    /// the first empty slot. Returns whether a new slot was filled. A new
    /// index on a full set is an error.
    pub fn put(&mut self, index: u8, value: &[u8]) -> KeywardResult<bool> {
        if value.len() != self.share_len {
            return Err(KeywardError::CorruptShareSet(format!(
                "share length {} does not match the stored share length {}",
                value.len(),
                self.share_len
            )));
        }
        if index == EMPTY_SLOT {
            return Err(KeywardError::InvalidShare(format!("member index {index} out of range")));
        }

        if let Some(slot) = self
            .slots
            .iter_mut()
            .find(|s| matches!(s, Some((i, _)) if *i == index))
        {
            *slot = Some((index, Zeroizing::new(value.to_vec())));
            return Ok(false);
        }
        match self.slots.iter_mut().find(|s| s.is_none()) {
            Some(slot) => {
                *slot = Some((index, Zeroizing::new(value.to_vec())));
                Ok(true)
            }
            None => Err(KeywardError::InvalidShare(format!(
                "share set already holds {} shares, cannot add member {index}",
                self.slots.len()
            ))),
        }
    }

    /// Shares blob: `threshold * share_len` bytes, empty slots padded with `0xFF`.
    pub fn pack_shares(&self) -> Zeroizing<Vec<u8>> {
        let mut blob = Zeroizing::new(Vec::with_capacity(self.slots.len() * self.share_len));
        for slot in &self.slots {
            match slot {
                Some((_, v)) => blob.extend_from_slice(v),
                None => blob.extend(std::iter::repeat(EMPTY_SLOT).take(self.share_len)),
            }
        }
        blob
    }

    /// One member index per slot, `0xFF` for empty slots.
    pub fn pack_indices(&self) -> Vec<u8> {
        self.slots
            .iter()
            .map(|s| s.as_ref().map_or(EMPTY_SLOT, |(i, _)| *i))
            .collect()
    }

    /// Rebuild from the persisted blob and index list.
    pub fn unpack(
        identifier: u16,
        iteration_exponent: u8,
        threshold: u8,
        blob: &[u8],
        indices: &[u8],
    ) -> KeywardResult<Self> {
        if threshold == 0 {
            return Err(KeywardError::CorruptShareSet("stored threshold is zero".into()));
        }
        if blob.len() % threshold as usize != 0 {
            return Err(KeywardError::CorruptShareSet(format!(
                "shares blob of {} bytes is not a multiple of threshold {threshold}",
                blob.len()
            )));
        }
        let share_len = blob.len() / threshold as usize;
        if share_word_count(share_len).is_none() {
            return Err(KeywardError::CorruptShareSet(format!(
                "unknown share length {share_len}"
            )));
        }
        if indices.len() != threshold as usize {
            return Err(KeywardError::CorruptShareSet(format!(
                "{} slot indices for threshold {threshold}",
                indices.len()
            )));
        }

        let mut slots = Vec::with_capacity(threshold as usize);
        for (chunk, &index) in blob.chunks(share_len).zip(indices) {
            if index == EMPTY_SLOT {
                if chunk.iter().any(|&b| b != EMPTY_SLOT) {
                    return Err(KeywardError::CorruptShareSet(
                        "empty slot holds share data".into(),
                    ));
                }
                slots.push(None);
            } else {
                if slots.iter().flatten().any(|(i, _)| *i == index) {
                    return Err(KeywardError::CorruptShareSet(format!(
                        "member index {index} stored twice"
                    )));
                }
                slots.push(Some((index, Zeroizing::new(chunk.to_vec()))));
            }
        }

        Ok(ShareSetState {
            identifier,
            iteration_exponent,
            threshold,
            share_len,
            slots,
        })
    }
}

/// Device record accessors over a [`SecretStore`].
pub struct DeviceStorage<S> {
    store: S,
}

impl<S: SecretStore> DeviceStorage<S> {
    pub fn new(store: S) -> Self {
        DeviceStorage { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_inner(self) -> S {
        self.store
    }

    fn get_bool(&self, namespace: u8, key: u8) -> bool {
        matches!(self.store.get(namespace, key, false), Some(v) if v.as_slice() == [TRUE_BYTE])
    }

    fn get_u8(&self, namespace: u8, key: u8) -> Option<u8> {
        self.store
            .get(namespace, key, false)
            .and_then(|v| v.first().copied())
    }

    // ── record state ────────────────────────────────────────────────────

    pub fn version(&self) -> Option<u8> {
        self.get_u8(APP, VERSION)
    }

    /// A version marker is stored and no share set is mid-accumulation.
    pub fn is_initialized(&self) -> bool {
        self.version().is_some() && !self.is_slip39_in_progress()
    }

    pub fn is_slip39_in_progress(&self) -> bool {
        self.get_bool(SLIP39, SLIP39_IN_PROGRESS)
    }

    pub fn mnemonic(&self) -> Option<Zeroizing<Vec<u8>>> {
        self.store.get(APP, MNEMONIC, false)
    }

    /// Stored standard; `None` when no secret was committed.
    pub fn mnemonic_standard(&self) -> KeywardResult<Option<MnemonicStandard>> {
        self.get_u8(APP, MNEMONIC_STANDARD)
            .map(MnemonicStandard::from_byte)
            .transpose()
    }

    pub fn slip39_parameters(&self) -> KeywardResult<Option<Slip39Parameters>> {
        let Some(id) = self.store.get(APP, SLIP39_IDENTIFIER, false) else {
            return Ok(None);
        };
        let identifier = u16::from_be_bytes(id.as_slice().try_into().map_err(|_| {
            KeywardError::Storage(format!("SLIP-39 identifier has {} bytes", id.len()))
        })?);
        Ok(Some(Slip39Parameters {
            identifier,
            iteration_exponent: self.get_u8(APP, SLIP39_ITERATION_EXPONENT).unwrap_or(0),
        }))
    }

    /// Persist `secret` as the device secret together with the version
    /// marker and backup flags. A SLIP-39 commit also drops the share set.
    /// Everything lands in one batch.
    pub fn store_secret(
        &mut self,
        secret: &SecretRecord<'_>,
        needs_backup: bool,
        no_backup: bool,
    ) -> KeywardResult<()> {
        let mut batch = WriteBatch::new();
        match secret {
            SecretRecord::Bip39 { mnemonic } => {
                batch
                    .set(APP, MNEMONIC, mnemonic, false)
                    .delete(APP, SLIP39_IDENTIFIER, false)
                    .delete(APP, SLIP39_ITERATION_EXPONENT, false);
            }
            SecretRecord::Slip39 {
                encrypted_master_secret,
                identifier,
                iteration_exponent,
            } => {
                batch
                    .set(APP, MNEMONIC, encrypted_master_secret, false)
                    .set(APP, SLIP39_IDENTIFIER, &identifier.to_be_bytes(), false)
                    .set(APP, SLIP39_ITERATION_EXPONENT, &[*iteration_exponent], false);
                clear_share_set_ops(&mut batch);
            }
        }
        batch
            .set(APP, MNEMONIC_STANDARD, &[secret.standard().to_byte()], false)
            .set(APP, VERSION, &[STORAGE_VERSION], false)
            .set(APP, NO_BACKUP, &[bool_byte(no_backup)], false);
        if !no_backup {
            batch.set(APP, NEEDS_BACKUP, &[bool_byte(needs_backup)], false);
        }
        self.store.apply(batch)
    }

    // ── share set ───────────────────────────────────────────────────────

    /// The in-progress share set, `None` if no recovery is running.
    pub fn load_share_set(&self) -> KeywardResult<Option<ShareSetState>> {
        if !self.is_slip39_in_progress() {
            return Ok(None);
        }
        let missing = |what: &str| KeywardError::CorruptShareSet(format!("{what} missing"));

        let id = self.store.get(SLIP39, SLIP39_ID, false).ok_or_else(|| missing("identifier"))?;
        let identifier = u16::from_be_bytes(id.as_slice().try_into().map_err(|_| {
            KeywardError::CorruptShareSet(format!("identifier has {} bytes", id.len()))
        })?);
        let threshold = self
            .get_u8(SLIP39, SLIP39_THRESHOLD)
            .ok_or_else(|| missing("threshold"))?;
        let remaining = self
            .get_u8(SLIP39, SLIP39_REMAINING)
            .ok_or_else(|| missing("remaining count"))?;
        let iteration_exponent = self.get_u8(SLIP39, SLIP39_SHARE_ITERATION_EXPONENT).unwrap_or(0);
        let blob = self
            .store
            .get(SLIP39, SLIP39_SHARES, false)
            .ok_or_else(|| missing("shares"))?;
        let indices = self
            .store
            .get(SLIP39, SLIP39_INDICES, false)
            .ok_or_else(|| missing("slot indices"))?;

        let state =
            ShareSetState::unpack(identifier, iteration_exponent, threshold, &blob, &indices)?;
        if state.remaining() != remaining {
            return Err(KeywardError::CorruptShareSet(format!(
                "stored remaining {remaining} but {} slots are empty",
                state.remaining()
            )));
        }
        Ok(Some(state))
    }

    /// Persist the full share set in one batch.
    pub fn store_share_set(&mut self, state: &ShareSetState) -> KeywardResult<()> {
        let mut batch = WriteBatch::new();
        batch
            .set(SLIP39, SLIP39_IN_PROGRESS, &[TRUE_BYTE], false)
            .set(SLIP39, SLIP39_ID, &state.identifier.to_be_bytes(), false)
            .set(SLIP39, SLIP39_THRESHOLD, &[state.threshold], false)
            .set(SLIP39, SLIP39_REMAINING, &[state.remaining()], false)
            .set(SLIP39, SLIP39_SHARE_ITERATION_EXPONENT, &[state.iteration_exponent], false)
            .set(SLIP39, SLIP39_SHARES, &state.pack_shares(), false)
            .set(SLIP39, SLIP39_INDICES, &state.pack_indices(), false);
        self.store.apply(batch)?;
        debug!(
            remaining = state.remaining(),
            threshold = state.threshold,
            "share set stored"
        );
        Ok(())
    }

    /// Delete every share set field.
    pub fn clear_share_set(&mut self) -> KeywardResult<()> {
        let mut batch = WriteBatch::new();
        clear_share_set_ops(&mut batch);
        self.store.apply(batch)
    }

    // ── identity and settings ───────────────────────────────────────────

    /// Public device id, created on first use: 12 random bytes in upper-case hex.
    pub fn device_id(&mut self) -> KeywardResult<String> {
        if let Some(id) = self.store.get(APP, DEVICE_ID, true) {
            if !id.is_empty() {
                return String::from_utf8(id.to_vec())
                    .map_err(|e| KeywardError::Storage(format!("device id is not UTF-8: {e}")));
            }
        }
        let mut raw = [0u8; DEVICE_ID_BYTES];
        rand::thread_rng().fill_bytes(&mut raw);
        let id: String = raw.iter().map(|b| format!("{b:02X}")).collect();
        self.store.set(APP, DEVICE_ID, id.as_bytes(), true)?;
        Ok(id)
    }

    pub fn label(&self) -> Option<String> {
        self.store
            .get(APP, LABEL, true)
            .and_then(|v| String::from_utf8(v.to_vec()).ok())
    }

    pub fn has_passphrase(&self) -> bool {
        self.get_bool(APP, USE_PASSPHRASE)
    }

    pub fn homescreen(&self) -> Option<Vec<u8>> {
        self.store.get(APP, HOMESCREEN, true).map(|v| v.to_vec())
    }

    /// 0 = ask on device, 1 = device, 2 = host.
    pub fn passphrase_source(&self) -> u8 {
        match self.get_u8(APP, PASSPHRASE_SOURCE) {
            Some(1) => 1,
            Some(2) => 2,
            _ => 0,
        }
    }

    /// Apply the given settings in one batch.
    ///
    /// A homescreen without the `TOIf` header clears the stored one; a valid
    /// one above [`HOMESCREEN_MAXSIZE`] is ignored. Passphrase sources other
    /// than 0, 1 and 2 are ignored.
    pub fn load_settings(&mut self, settings: &DeviceSettings) -> KeywardResult<()> {
        let mut batch = WriteBatch::new();
        if let Some(label) = &settings.label {
            batch.set(APP, LABEL, label.as_bytes(), true);
        }
        if let Some(use_passphrase) = settings.use_passphrase {
            batch.set(APP, USE_PASSPHRASE, &[bool_byte(use_passphrase)], false);
        }
        if let Some(homescreen) = &settings.homescreen {
            if homescreen.starts_with(HOMESCREEN_HEADER) {
                if homescreen.len() <= HOMESCREEN_MAXSIZE {
                    batch.set(APP, HOMESCREEN, homescreen, true);
                }
            } else {
                batch.set(APP, HOMESCREEN, b"", true);
            }
        }
        if let Some(source) = settings.passphrase_source {
            if source <= 2 {
                batch.set(APP, PASSPHRASE_SOURCE, &[source], false);
            }
        }
        self.store.apply(batch)
    }

    // ── backup flags ────────────────────────────────────────────────────

    pub fn needs_backup(&self) -> bool {
        self.get_bool(APP, NEEDS_BACKUP)
    }

    pub fn set_backed_up(&mut self) -> KeywardResult<()> {
        self.store.set(APP, NEEDS_BACKUP, b"", false)
    }

    pub fn unfinished_backup(&self) -> bool {
        self.get_bool(APP, UNFINISHED_BACKUP)
    }

    pub fn set_unfinished_backup(&mut self, state: bool) -> KeywardResult<()> {
        self.store.set(APP, UNFINISHED_BACKUP, &[bool_byte(state)], false)
    }

    pub fn no_backup(&self) -> bool {
        self.get_bool(APP, NO_BACKUP)
    }

    // ── flags, autolock, counter ────────────────────────────────────────

    pub fn flags(&self) -> u32 {
        self.store
            .get(APP, FLAGS, false)
            .map_or(0, |v| be_u32(&v))
    }

    /// OR `flags` into the stored flags. Flags are never cleared.
    pub fn set_flags(&mut self, flags: u32) -> KeywardResult<()> {
        let current = self.flags();
        let merged = current | flags;
        if merged != current {
            self.store.set(APP, FLAGS, &merged.to_be_bytes(), false)?;
        }
        Ok(())
    }

    pub fn autolock_delay_ms(&self) -> u32 {
        self.store
            .get(APP, AUTOLOCK_DELAY_MS, false)
            .map_or(DEFAULT_AUTOLOCK_DELAY_MS, |v| be_u32(&v))
    }

    /// Delays shorter than one minute are raised to one minute.
    pub fn set_autolock_delay_ms(&mut self, delay_ms: u32) -> KeywardResult<()> {
        let delay_ms = delay_ms.max(MIN_AUTOLOCK_DELAY_MS);
        self.store.set(APP, AUTOLOCK_DELAY_MS, &delay_ms.to_be_bytes(), false)
    }

    pub fn next_u2f_counter(&mut self) -> KeywardResult<u32> {
        self.store.next_counter(APP, U2F_COUNTER, true)
    }

    pub fn set_u2f_counter(&mut self, value: u32) -> KeywardResult<()> {
        self.store.set_counter(APP, U2F_COUNTER, value, true)
    }

    pub fn u2f_counter(&self) -> Option<u32> {
        self.store.counter(APP, U2F_COUNTER)
    }

    // ── maintenance ─────────────────────────────────────────────────────

    /// Bring a legacy record to the current layout. Returns whether anything
    /// changed; a current record is left untouched.
    pub fn upgrade(&mut self) -> KeywardResult<bool> {
        if self.version() != Some(LEGACY_STORAGE_VERSION) {
            return Ok(false);
        }
        let mut batch = WriteBatch::new();
        if let Some(counter) = self.store.get(APP, U2F_COUNTER, false) {
            let value = be_u32(&counter);
            batch
                .set_counter(APP, U2F_COUNTER, value, true)
                .delete(APP, U2F_COUNTER, false);
            debug!(value, "moved U2F counter to a lock-writable counter");
        }
        batch.set(APP, VERSION, &[STORAGE_VERSION], false);
        self.store.apply(batch)?;
        info!(
            from = LEGACY_STORAGE_VERSION,
            to = STORAGE_VERSION,
            "storage schema upgraded"
        );
        Ok(true)
    }

    pub fn wipe(&mut self) -> KeywardResult<()> {
        self.store.wipe()
    }
}

fn clear_share_set_ops(batch: &mut WriteBatch) {
    for key in [
        SLIP39_IN_PROGRESS,
        SLIP39_ID,
        SLIP39_THRESHOLD,
        SLIP39_REMAINING,
        SLIP39_SHARES,
        SLIP39_SHARE_ITERATION_EXPONENT,
        SLIP39_INDICES,
    ] {
        batch.delete(SLIP39, key, false);
    }
}

fn bool_byte(value: bool) -> u8 {
    if value {
        TRUE_BYTE
    } else {
        FALSE_BYTE
    }
}

/// Big-endian integer of up to four bytes; longer values keep the low 32 bits.
fn be_u32(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(0u32, |acc, &b| acc.wrapping_shl(8) | b as u32)
}
