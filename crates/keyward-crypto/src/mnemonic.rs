//! BIP-39 mnemonic generation, validation and seed derivation
//!
//! New wallets mix device-internal entropy with entropy supplied by the host:
//! `SHA-256(internal || external)` truncated to the requested strength, so
//! neither side alone controls the resulting mnemonic.

use bip39::Mnemonic;
use hmac::Hmac;
use sha2::{Digest, Sha256, Sha512};
use zeroize::Zeroize;

use keyward_core::{KeywardError, KeywardResult};

use crate::secret::SecretBytes;

/// Entropy strengths (in bits) accepted for BIP-39 mnemonics.
pub const BIP39_STRENGTHS: [u32; 3] = [128, 192, 256];

const SEED_ROUNDS: u32 = 2048;

/// Generate a BIP-39 mnemonic from internal and external entropy.
///
/// Returns the space-separated mnemonic as UTF-8 bytes.
pub fn generate_bip39(
    strength: u32,
    internal: &[u8],
    external: &[u8],
) -> KeywardResult<SecretBytes> {
    if !BIP39_STRENGTHS.contains(&strength) {
        return Err(KeywardError::InvalidStrength(strength));
    }

    let mut hasher = Sha256::new();
    hasher.update(internal);
    hasher.update(external);
    let mut entropy = [0u8; 32];
    entropy.copy_from_slice(&hasher.finalize());

    let mnemonic = Mnemonic::from_entropy(&entropy[..(strength / 8) as usize]).map_err(|e| {
        KeywardError::InvalidMnemonic(format!("BIP-39 mnemonic generation failed: {e}"))
    });
    entropy.zeroize();

    Ok(SecretBytes::from_vec(mnemonic?.to_string().into_bytes()))
}

/// Whether `mnemonic` is a valid English BIP-39 phrase (wordlist and checksum).
pub fn check_bip39(mnemonic: &[u8]) -> bool {
    std::str::from_utf8(mnemonic)
        .ok()
        .and_then(|words| words.parse::<Mnemonic>().ok())
        .is_some()
}

/// BIP-39 seed: PBKDF2-HMAC-SHA512, 2048 rounds, salt `"mnemonic" || passphrase`.
///
/// The phrase is used as stored; no wordlist validation happens here.
pub fn bip39_seed(mnemonic: &[u8], passphrase: &str) -> KeywardResult<SecretBytes> {
    let mut salt = Vec::with_capacity(8 + passphrase.len());
    salt.extend_from_slice(b"mnemonic");
    salt.extend_from_slice(passphrase.as_bytes());

    let mut output = vec![0u8; 64];
    let result = pbkdf2::pbkdf2::<Hmac<Sha512>>(mnemonic, &salt, SEED_ROUNDS, &mut output);
    salt.zeroize();
    result.map_err(|e| KeywardError::Derivation(format!("PBKDF2-HMAC-SHA512 failed: {e}")))?;

    Ok(SecretBytes::from_vec(output))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word_count(m: &SecretBytes) -> usize {
        std::str::from_utf8(m.as_bytes()).unwrap().split_whitespace().count()
    }

    #[test]
    fn test_generate_is_deterministic() {
        let a = generate_bip39(128, &[0u8; 32], &[0u8; 32]).unwrap();
        let b = generate_bip39(128, &[0u8; 32], &[0u8; 32]).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
        assert_eq!(word_count(&a), 12);
        assert!(check_bip39(a.as_bytes()));
    }

    #[test]
    fn test_both_entropy_sources_matter() {
        let base = generate_bip39(256, &[1u8; 32], &[2u8; 32]).unwrap();
        let other_internal = generate_bip39(256, &[3u8; 32], &[2u8; 32]).unwrap();
        let other_external = generate_bip39(256, &[1u8; 32], &[4u8; 32]).unwrap();
        assert_ne!(base.as_bytes(), other_internal.as_bytes());
        assert_ne!(base.as_bytes(), other_external.as_bytes());
    }

    #[test]
    fn test_strength_word_counts() {
        for (strength, words) in [(128, 12), (192, 18), (256, 24)] {
            let m = generate_bip39(strength, b"internal", b"external").unwrap();
            assert_eq!(word_count(&m), words, "strength {strength}");
        }
    }

    #[test]
    fn test_invalid_strength() {
        assert!(matches!(
            generate_bip39(160, &[0u8; 32], &[0u8; 32]),
            Err(KeywardError::InvalidStrength(160))
        ));
    }

    #[test]
    fn test_check_rejects_bad_mnemonics() {
        assert!(!check_bip39(b"not a valid mnemonic at all"));
        assert!(!check_bip39(&[0xff, 0xfe]));
        // valid words, broken checksum
        assert!(!check_bip39(
            b"abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon"
        ));
        assert!(check_bip39(
            b"abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about"
        ));
    }

    #[test]
    fn test_seed_known_vector() {
        // BIP-39 reference vector, passphrase "TREZOR"
        let seed = bip39_seed(
            b"abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about",
            "TREZOR",
        )
        .unwrap();
        let hex: String = seed.as_bytes()[..8].iter().map(|b| format!("{b:02x}")).collect();
        assert_eq!(hex, "c55257c360c07c72");
    }

    #[test]
    fn test_passphrase_changes_seed() {
        let m = generate_bip39(128, b"a", b"b").unwrap();
        let plain = bip39_seed(m.as_bytes(), "").unwrap();
        let with_pass = bip39_seed(m.as_bytes(), "hunter2").unwrap();
        assert_eq!(plain.len(), 64);
        assert_ne!(plain.as_bytes(), with_pass.as_bytes());
    }
}
