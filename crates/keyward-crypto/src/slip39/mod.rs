//! SLIP-39 threshold shares (single group).
//!
//! Generation: random master secret → passphrase encryption (Feistel) →
//! Shamir split → one mnemonic per member share. Recovery runs the same
//! pipeline backwards; [`combine_shares`] yields the encrypted master
//! secret, which is what the device stores. The master secret itself (the
//! BIP-32 seed) is only produced by [`slip39_seed`] once the passphrase is
//! known.

pub mod cipher;
pub mod shamir;
pub mod share;
pub mod wordlist;

use rand::{CryptoRng, Rng, RngCore};

use keyward_core::{share_word_count, KeywardError, KeywardResult};

use crate::secret::SecretBytes;

pub use shamir::MAX_SHARE_COUNT;
pub use keyward_core::SHARE_LENGTHS;
pub use share::Share;

/// Entropy strengths (in bits) accepted for SLIP-39 master secrets.
pub const SLIP39_STRENGTHS: [u32; 2] = [128, 256];

/// Output of a share-set generation.
#[derive(Debug)]
pub struct GeneratedShareSet {
    pub identifier: u16,
    pub iteration_exponent: u8,
    /// The value split across the shares; what recovery reconstructs.
    pub encrypted_master_secret: SecretBytes,
    pub mnemonics: Vec<String>,
}

/// Generate `count` share mnemonics of a fresh random master secret.
pub fn generate_share_set(count: u8, threshold: u8, strength: u32) -> KeywardResult<Vec<String>> {
    let set = generate_share_set_with(&mut rand::thread_rng(), count, threshold, strength, 0, b"")?;
    Ok(set.mnemonics)
}

/// [`generate_share_set`] with an explicit RNG, iteration exponent and passphrase.
pub fn generate_share_set_with<R: RngCore + CryptoRng>(
    rng: &mut R,
    count: u8,
    threshold: u8,
    strength: u32,
    iteration_exponent: u8,
    passphrase: &[u8],
) -> KeywardResult<GeneratedShareSet> {
    if !SLIP39_STRENGTHS.contains(&strength) {
        return Err(KeywardError::InvalidStrength(strength));
    }
    let mut master_secret = vec![0u8; (strength / 8) as usize];
    rng.fill_bytes(&mut master_secret);
    let master_secret = SecretBytes::from_vec(master_secret);

    split_master_secret(
        rng,
        master_secret.as_bytes(),
        count,
        threshold,
        iteration_exponent,
        passphrase,
    )
}

/// Encrypt `master_secret` under `passphrase` and split it into `count` shares.
pub fn split_master_secret<R: RngCore + CryptoRng>(
    rng: &mut R,
    master_secret: &[u8],
    count: u8,
    threshold: u8,
    iteration_exponent: u8,
    passphrase: &[u8],
) -> KeywardResult<GeneratedShareSet> {
    if threshold == 0 || threshold > count {
        return Err(KeywardError::InvalidArgument(format!(
            "threshold {threshold} must be between 1 and the share count {count}"
        )));
    }
    if count > MAX_SHARE_COUNT {
        return Err(KeywardError::InvalidArgument(format!(
            "share count {count} exceeds {MAX_SHARE_COUNT}"
        )));
    }
    if share_word_count(master_secret.len()).is_none() {
        return Err(KeywardError::InvalidStrength((master_secret.len() * 8) as u32));
    }

    let identifier: u16 = rng.gen::<u16>() & 0x7FFF;
    let ems = cipher::encrypt(master_secret, passphrase, iteration_exponent, identifier)?;

    let mnemonics = shamir::split_secret(rng, threshold, count, ems.as_bytes())?
        .into_iter()
        .map(|(index, value)| {
            Share {
                identifier,
                iteration_exponent,
                group_index: 0,
                group_threshold: 1,
                group_count: 1,
                index,
                threshold,
                value,
            }
            .to_mnemonic()
        })
        .collect::<KeywardResult<Vec<_>>>()?;

    Ok(GeneratedShareSet {
        identifier,
        iteration_exponent,
        encrypted_master_secret: ems,
        mnemonics,
    })
}

/// Combine `threshold` member shares `(index, value)` into the encrypted master secret.
pub fn combine_shares(threshold: u8, shares: &[(u8, &[u8])]) -> KeywardResult<SecretBytes> {
    shamir::recover_secret(threshold, shares)
}

/// Master secret (the BIP-32 seed) from a stored encrypted master secret.
pub fn slip39_seed(
    encrypted_master_secret: &[u8],
    identifier: u16,
    iteration_exponent: u8,
    passphrase: &str,
) -> KeywardResult<SecretBytes> {
    cipher::decrypt(
        encrypted_master_secret,
        passphrase.as_bytes(),
        iteration_exponent,
        identifier,
    )
}
