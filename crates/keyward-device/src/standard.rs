//! Mnemonic standards used by the recovery workflow.

use sha2::{Digest, Sha256};
use tracing::warn;

use keyward_core::{KeywardError, KeywardResult, SHARE_LENGTHS};
use keyward_crypto::{check_bip39, constant_time_eq, SecretBytes, Share};
use keyward_storage::{DeviceStorage, SecretStore};

use crate::accumulator::{AccumulationResult, ShareAccumulator};
use crate::lifecycle::SecretLifecycleManager;

/// Secret recovered from user input, before it is committed.
#[derive(Debug)]
pub enum Premaster {
    /// Space-joined mnemonic words.
    Bip39(SecretBytes),
    Slip39 {
        encrypted_master_secret: SecretBytes,
        identifier: u16,
        iteration_exponent: u8,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Standard {
    Bip39,
    Slip39,
}

impl Standard {
    /// Standard implied by a mnemonic length: SLIP-39 share lengths select
    /// SLIP-39, anything else BIP-39.
    pub fn for_word_count(words: usize) -> Self {
        if SHARE_LENGTHS.contains(&words) {
            Standard::Slip39
        } else {
            Standard::Bip39
        }
    }

    /// Turn entered words into a premaster secret.
    ///
    /// SLIP-39 words are one share; `None` means more shares are needed.
    pub fn process_mnemonic<S: SecretStore>(
        self,
        storage: &mut DeviceStorage<S>,
        words: &[&str],
    ) -> KeywardResult<Option<Premaster>> {
        match self {
            Standard::Bip39 => Ok(Some(Premaster::Bip39(SecretBytes::from_vec(
                words.join(" ").into_bytes(),
            )))),
            Standard::Slip39 => {
                let share = Share::parse(&words.join(" "))?;
                let mut accumulator = ShareAccumulator::new(storage);
                match accumulator.begin_or_continue(&share)? {
                    AccumulationResult::Incomplete(_) => Ok(None),
                    AccumulationResult::Complete => {
                        let combined = match accumulator.combine() {
                            Err(KeywardError::ShareDigestMismatch) => {
                                // a wrong share filled the set; start over
                                warn!("share digest mismatch, clearing share set");
                                accumulator.abort_and_clear()?;
                                return Err(KeywardError::ShareDigestMismatch);
                            }
                            other => other?,
                        };
                        Ok(Some(Premaster::Slip39 {
                            encrypted_master_secret: combined.encrypted_master_secret,
                            identifier: combined.identifier,
                            iteration_exponent: combined.iteration_exponent,
                        }))
                    }
                }
            }
        }
    }

    /// Wordlist and checksum validation. SLIP-39 shares are already
    /// checksummed when parsed.
    pub fn check(self, premaster: &Premaster) -> bool {
        match premaster {
            Premaster::Bip39(mnemonic) => check_bip39(mnemonic.as_bytes()),
            Premaster::Slip39 { .. } => true,
        }
    }

    /// Compare `premaster` with the stored secret without modifying anything.
    pub fn dry_run<S: SecretStore>(
        self,
        storage: &DeviceStorage<S>,
        premaster: &Premaster,
    ) -> KeywardResult<()> {
        let entered = match premaster {
            Premaster::Bip39(mnemonic) => mnemonic.as_bytes(),
            Premaster::Slip39 { .. } => {
                return Err(KeywardError::InvalidArgument(
                    "dry run is not supported for SLIP-39 shares".into(),
                ))
            }
        };
        let stored = storage.mnemonic().ok_or(KeywardError::NotInitialized)?;
        let entered_digest = Sha256::digest(entered);
        let stored_digest = Sha256::digest(stored.as_slice());
        if constant_time_eq(&entered_digest, &stored_digest) {
            Ok(())
        } else {
            Err(KeywardError::MnemonicMismatch)
        }
    }

    /// Commit `premaster` as the device secret.
    pub fn save<S: SecretStore>(
        self,
        storage: &mut DeviceStorage<S>,
        premaster: &Premaster,
    ) -> KeywardResult<()> {
        let mut manager = SecretLifecycleManager::new(storage);
        match premaster {
            Premaster::Bip39(mnemonic) => manager.commit_bip39(mnemonic.as_bytes(), false, false),
            Premaster::Slip39 {
                encrypted_master_secret,
                identifier,
                iteration_exponent,
            } => manager.commit_slip39(
                encrypted_master_secret.as_bytes(),
                *identifier,
                *iteration_exponent,
            ),
        }
    }
}
