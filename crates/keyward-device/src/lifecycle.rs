//! Whole-device secret state transitions.

use tracing::info;

use keyward_core::{KeywardError, KeywardResult};
use keyward_storage::{DeviceStorage, SecretRecord, SecretStore};

pub struct SecretLifecycleManager<'a, S> {
    storage: &'a mut DeviceStorage<S>,
}

impl<'a, S: SecretStore> SecretLifecycleManager<'a, S> {
    pub fn new(storage: &'a mut DeviceStorage<S>) -> Self {
        SecretLifecycleManager { storage }
    }

    /// True iff a version marker is stored and no share set is in progress.
    pub fn is_initialized(&self) -> bool {
        self.storage.is_initialized()
    }

    fn ensure_uninitialized(&self) -> KeywardResult<()> {
        if self.storage.is_initialized() {
            return Err(KeywardError::AlreadyInitialized);
        }
        Ok(())
    }

    /// Commit a BIP-39 mnemonic as the device secret.
    pub fn commit_bip39(
        &mut self,
        mnemonic: &[u8],
        needs_backup: bool,
        no_backup: bool,
    ) -> KeywardResult<()> {
        self.ensure_uninitialized()?;
        self.storage
            .store_secret(&SecretRecord::Bip39 { mnemonic }, needs_backup, no_backup)?;
        info!(needs_backup, no_backup, "BIP-39 secret committed");
        Ok(())
    }

    /// Commit a combined SLIP-39 secret. Clears the share set in the same write.
    pub fn commit_slip39(
        &mut self,
        encrypted_master_secret: &[u8],
        identifier: u16,
        iteration_exponent: u8,
    ) -> KeywardResult<()> {
        self.ensure_uninitialized()?;
        self.storage.store_secret(
            &SecretRecord::Slip39 {
                encrypted_master_secret,
                identifier,
                iteration_exponent,
            },
            false,
            false,
        )?;
        info!(identifier, "SLIP-39 secret committed");
        Ok(())
    }

    /// Migrate a legacy record layout. No-op on a current one.
    pub fn upgrade_schema(&mut self) -> KeywardResult<bool> {
        self.storage.upgrade()
    }

    /// Erase the device record, share set and counters.
    pub fn wipe(&mut self) -> KeywardResult<()> {
        self.storage.wipe()?;
        info!("device wiped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyward_core::MnemonicStandard;
    use keyward_storage::{MemoryStore, ShareSetState};

    fn storage() -> DeviceStorage<MemoryStore> {
        DeviceStorage::new(MemoryStore::new())
    }

    #[test]
    fn test_commit_bip39_once() {
        let mut storage = storage();
        let mut manager = SecretLifecycleManager::new(&mut storage);
        assert!(!manager.is_initialized());
        manager.commit_bip39(b"abandon about", true, false).unwrap();
        assert!(manager.is_initialized());
        assert!(matches!(
            manager.commit_bip39(b"other words", false, false),
            Err(KeywardError::AlreadyInitialized)
        ));
        assert!(matches!(
            manager.commit_slip39(&[0u8; 16], 1, 0),
            Err(KeywardError::AlreadyInitialized)
        ));
        assert_eq!(storage.mnemonic().unwrap().as_slice(), b"abandon about");
        assert!(storage.needs_backup());
    }

    #[test]
    fn test_commit_slip39_clears_share_set() {
        let mut storage = storage();
        let mut set = ShareSetState::new(7, 0, 1, 16).unwrap();
        set.put(0, &[3u8; 16]).unwrap();
        storage.store_share_set(&set).unwrap();

        let mut manager = SecretLifecycleManager::new(&mut storage);
        assert!(!manager.is_initialized());
        manager.commit_slip39(&[3u8; 16], 7, 0).unwrap();
        assert!(manager.is_initialized());

        assert!(!storage.is_slip39_in_progress());
        assert_eq!(
            storage.mnemonic_standard().unwrap(),
            Some(MnemonicStandard::Slip39)
        );
        assert!(!storage.needs_backup());
    }

    #[test]
    fn test_upgrade_is_idempotent() {
        let mut storage = storage();
        let mut manager = SecretLifecycleManager::new(&mut storage);
        manager.commit_bip39(b"m", false, false).unwrap();
        assert!(!manager.upgrade_schema().unwrap());
        assert!(!manager.upgrade_schema().unwrap());
        assert!(manager.is_initialized());
    }

    #[test]
    fn test_wipe_resets_to_uninitialized() {
        let mut storage = storage();
        let mut manager = SecretLifecycleManager::new(&mut storage);
        manager.commit_bip39(b"m", false, true).unwrap();
        manager.wipe().unwrap();
        assert!(!manager.is_initialized());
        manager.commit_bip39(b"m2", false, false).unwrap();
        assert!(manager.is_initialized());
    }
}
