//! Device recovery from a BIP-39 mnemonic or SLIP-39 shares.
//!
//! One call handles one mnemonic. A SLIP-39 recovery therefore spans several
//! calls; the share set in the store carries the progress between them.

use tracing::{info, warn};

use keyward_core::{KeywardError, KeywardResult};
use keyward_storage::{DeviceSettings, DeviceStorage, SecretStore};

use crate::accumulator::ShareAccumulator;
use crate::standard::Standard;

/// Options of a recovery.
#[derive(Debug, Clone, Default)]
pub struct RecoveryRequest {
    /// Check the mnemonic against the stored one instead of restoring it.
    pub dry_run: bool,
    /// Reject BIP-39 mnemonics with unknown words or a bad checksum.
    pub enforce_wordlist: bool,
    pub passphrase_protection: bool,
    pub label: Option<String>,
    pub u2f_counter: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// Share accepted; `remaining` more shares of `word_count` words needed.
    InProgress { remaining: u8, word_count: usize },
    Recovered,
    /// Dry run: the mnemonic matches the stored secret.
    DryRunMatched,
}

/// Run one recovery step with the entered `words`.
pub fn recover_device<S: SecretStore>(
    storage: &mut DeviceStorage<S>,
    request: &RecoveryRequest,
    words: &[&str],
) -> KeywardResult<RecoveryOutcome> {
    if !request.dry_run && storage.is_initialized() {
        return Err(KeywardError::AlreadyInitialized);
    }

    let standard = match ShareAccumulator::new(storage).word_count()? {
        Some(expected) => {
            if words.len() != expected {
                return Err(KeywardError::InvalidShare(format!(
                    "recovery in progress expects {expected}-word shares, got {} words",
                    words.len()
                )));
            }
            Standard::Slip39
        }
        None => Standard::for_word_count(words.len()),
    };
    if request.dry_run && standard == Standard::Slip39 {
        return Err(KeywardError::InvalidArgument(
            "dry run is not supported for SLIP-39 shares".into(),
        ));
    }

    let Some(premaster) = standard.process_mnemonic(storage, words)? else {
        let state = storage
            .load_share_set()?
            .ok_or_else(|| KeywardError::CorruptShareSet("share set vanished".into()))?;
        return Ok(RecoveryOutcome::InProgress {
            remaining: state.remaining(),
            word_count: state.word_count()?,
        });
    };

    if standard == Standard::Bip39
        && (request.enforce_wordlist || request.dry_run)
        && !standard.check(&premaster)
    {
        warn!("entered mnemonic failed wordlist or checksum validation");
        return Err(KeywardError::InvalidMnemonic("mnemonic is not valid".into()));
    }

    if request.dry_run {
        standard.dry_run(storage, &premaster)?;
        info!("dry run: mnemonic matches the stored secret");
        return Ok(RecoveryOutcome::DryRunMatched);
    }

    storage.set_u2f_counter(request.u2f_counter)?;
    storage.load_settings(&DeviceSettings {
        label: request.label.clone(),
        use_passphrase: Some(request.passphrase_protection),
        ..Default::default()
    })?;
    standard.save(storage, &premaster)?;
    info!(?standard, "device recovered");
    Ok(RecoveryOutcome::Recovered)
}
