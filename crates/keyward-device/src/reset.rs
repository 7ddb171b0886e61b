//! Device initialization with a freshly generated secret.

use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};
use tracing::info;
use zeroize::Zeroizing;

use keyward_core::{KeywardError, KeywardResult};
use keyward_crypto::generate_bip39;
use keyward_crypto::slip39::{split_master_secret, SLIP39_STRENGTHS};
use keyward_storage::{DeviceSettings, DeviceStorage, SecretStore};

use crate::lifecycle::SecretLifecycleManager;

/// Share count and threshold of a SLIP-39 reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slip39Split {
    pub count: u8,
    pub threshold: u8,
    pub iteration_exponent: u8,
}

#[derive(Debug, Clone)]
pub struct ResetRequest {
    pub strength: u32,
    /// `Some` for a SLIP-39 share set, `None` for a BIP-39 mnemonic.
    pub slip39: Option<Slip39Split>,
    /// Show the internal entropy to the user.
    pub display_random: bool,
    /// Initialize now, back up later.
    pub skip_backup: bool,
    /// Initialize without ever showing a backup.
    pub no_backup: bool,
    pub passphrase_protection: bool,
    pub label: Option<String>,
}

impl Default for ResetRequest {
    fn default() -> Self {
        ResetRequest {
            strength: 256,
            slip39: None,
            display_random: false,
            skip_backup: false,
            no_backup: false,
            passphrase_protection: false,
            label: None,
        }
    }
}

/// What the user has to write down. Empty when backup was skipped or
/// disabled.
pub struct ResetOutcome {
    pub mnemonics: Vec<Zeroizing<String>>,
}

impl std::fmt::Debug for ResetOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResetOutcome")
            .field("mnemonics", &self.mnemonics.len())
            .finish()
    }
}

fn validate<S: SecretStore>(
    storage: &DeviceStorage<S>,
    request: &ResetRequest,
) -> KeywardResult<()> {
    let is_slip39 = request.slip39.is_some();
    if !SLIP39_STRENGTHS.contains(&request.strength) && (is_slip39 || request.strength != 192) {
        return Err(KeywardError::InvalidStrength(request.strength));
    }
    let backup_deferred = request.skip_backup || request.no_backup;
    if request.display_random && backup_deferred {
        return Err(KeywardError::InvalidArgument(
            "cannot show internal entropy when backup is skipped".into(),
        ));
    }
    if storage.is_initialized() {
        return Err(KeywardError::AlreadyInitialized);
    }
    if backup_deferred && is_slip39 {
        return Err(KeywardError::InvalidArgument(
            "SLIP-39 shares cannot be created with skip or no backup".into(),
        ));
    }
    Ok(())
}

/// Initialize the device.
///
/// `internal` is device entropy, `external` entropy supplied by the host.
/// The BIP-39 entropy, or the SLIP-39 master secret, is
/// `SHA-256(internal || external)` truncated to the strength. `rng` drives
/// the SLIP-39 identifier and polynomial coefficients.
pub fn reset_device<S: SecretStore, R: RngCore + CryptoRng>(
    storage: &mut DeviceStorage<S>,
    request: &ResetRequest,
    internal: &[u8],
    external: &[u8],
    rng: &mut R,
) -> KeywardResult<ResetOutcome> {
    validate(storage, request)?;

    let show_backup = !request.skip_backup && !request.no_backup;
    let settings = DeviceSettings {
        label: request.label.clone(),
        use_passphrase: Some(request.passphrase_protection),
        ..Default::default()
    };

    let mnemonics = match request.slip39 {
        None => {
            let mnemonic = generate_bip39(request.strength, internal, external)?;
            storage.load_settings(&settings)?;
            SecretLifecycleManager::new(storage).commit_bip39(
                mnemonic.as_bytes(),
                request.skip_backup,
                request.no_backup,
            )?;
            let phrase = String::from_utf8(mnemonic.as_bytes().to_vec()).map_err(|e| {
                KeywardError::InvalidMnemonic(format!("generated mnemonic is not UTF-8: {e}"))
            })?;
            vec![Zeroizing::new(phrase)]
        }
        Some(split) => {
            let mut hasher = Sha256::new();
            hasher.update(internal);
            hasher.update(external);
            let digest = Zeroizing::new(hasher.finalize().to_vec());
            let master_secret = &digest[..(request.strength / 8) as usize];

            let set = split_master_secret(
                rng,
                master_secret,
                split.count,
                split.threshold,
                split.iteration_exponent,
                b"",
            )?;
            storage.load_settings(&settings)?;
            SecretLifecycleManager::new(storage).commit_slip39(
                set.encrypted_master_secret.as_bytes(),
                set.identifier,
                set.iteration_exponent,
            )?;
            set.mnemonics.into_iter().map(Zeroizing::new).collect()
        }
    };

    info!(
        slip39 = request.slip39.is_some(),
        strength = request.strength,
        "device initialized"
    );
    Ok(ResetOutcome {
        mnemonics: if show_backup { mnemonics } else { Vec::new() },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyward_core::MnemonicStandard;
    use keyward_crypto::check_bip39;
    use keyward_storage::MemoryStore;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn storage() -> DeviceStorage<MemoryStore> {
        DeviceStorage::new(MemoryStore::new())
    }

    fn reset(
        storage: &mut DeviceStorage<MemoryStore>,
        request: &ResetRequest,
    ) -> KeywardResult<ResetOutcome> {
        reset_device(storage, request, &[1u8; 32], &[2u8; 32], &mut StdRng::seed_from_u64(0))
    }

    #[test]
    fn test_bip39_reset() {
        let mut storage = storage();
        let req = ResetRequest {
            strength: 128,
            label: Some("main".into()),
            ..Default::default()
        };
        let out = reset(&mut storage, &req).unwrap();
        assert_eq!(out.mnemonics.len(), 1);
        assert_eq!(out.mnemonics[0].split(' ').count(), 12);
        assert!(check_bip39(out.mnemonics[0].as_bytes()));

        assert!(storage.is_initialized());
        assert_eq!(storage.mnemonic().unwrap().as_slice(), out.mnemonics[0].as_bytes());
        assert_eq!(storage.label().as_deref(), Some("main"));
        assert!(!storage.needs_backup());
    }

    #[test]
    fn test_skip_backup_sets_needs_backup() {
        let mut storage = storage();
        let req = ResetRequest {
            skip_backup: true,
            ..Default::default()
        };
        let out = reset(&mut storage, &req).unwrap();
        assert!(out.mnemonics.is_empty());
        assert!(storage.needs_backup());
        assert!(!storage.no_backup());
    }

    #[test]
    fn test_no_backup() {
        let mut storage = storage();
        let req = ResetRequest {
            no_backup: true,
            ..Default::default()
        };
        let out = reset(&mut storage, &req).unwrap();
        assert!(out.mnemonics.is_empty());
        assert!(storage.no_backup());
        assert!(!storage.needs_backup());
    }

    #[test]
    fn test_slip39_reset() {
        let mut storage = storage();
        let req = ResetRequest {
            strength: 128,
            slip39: Some(Slip39Split {
                count: 5,
                threshold: 3,
                iteration_exponent: 0,
            }),
            ..Default::default()
        };
        let out = reset(&mut storage, &req).unwrap();
        assert_eq!(out.mnemonics.len(), 5);
        assert!(out.mnemonics.iter().all(|m| m.split(' ').count() == 20));
        assert!(storage.is_initialized());
        assert_eq!(
            storage.mnemonic_standard().unwrap(),
            Some(MnemonicStandard::Slip39)
        );
        assert!(storage.slip39_parameters().unwrap().is_some());
    }

    #[test]
    fn test_validation() {
        let mut storage = storage();
        let cases = [
            ResetRequest {
                strength: 160,
                ..Default::default()
            },
            ResetRequest {
                strength: 192,
                slip39: Some(Slip39Split {
                    count: 2,
                    threshold: 2,
                    iteration_exponent: 0,
                }),
                ..Default::default()
            },
            ResetRequest {
                display_random: true,
                skip_backup: true,
                ..Default::default()
            },
            ResetRequest {
                no_backup: true,
                slip39: Some(Slip39Split {
                    count: 2,
                    threshold: 2,
                    iteration_exponent: 0,
                }),
                ..Default::default()
            },
        ];
        for req in &cases {
            assert!(reset(&mut storage, req).is_err(), "{req:?}");
        }
        assert!(!storage.is_initialized());
        assert!(storage.store().is_empty());

        reset(
            &mut storage,
            &ResetRequest {
                strength: 192,
                ..Default::default()
            },
        )
        .unwrap();
        assert!(matches!(
            reset(&mut storage, &ResetRequest::default()),
            Err(KeywardError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_same_entropy_same_mnemonic() {
        let mut a = storage();
        let mut b = storage();
        let req = ResetRequest::default();
        let out_a = reset(&mut a, &req).unwrap();
        let out_b = reset(&mut b, &req).unwrap();
        assert_eq!(out_a.mnemonics[0].as_str(), out_b.mnemonics[0].as_str());
    }
}
