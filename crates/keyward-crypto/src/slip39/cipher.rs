//! SLIP-39 passphrase encryption of the master secret.
//!
//! Four-round Feistel network; the round function is
//! `PBKDF2-HMAC-SHA256(password = i || passphrase, salt = "shamir" || id || R,
//! iterations = (10000 << e) / 4)`.

use hmac::Hmac;
use sha2::Sha256;
use zeroize::Zeroize;

use keyward_core::{KeywardError, KeywardResult};

use crate::secret::SecretBytes;

const ROUND_COUNT: u8 = 4;
const BASE_ITERATION_COUNT: u32 = 10_000;
const CUSTOMIZATION: &[u8] = b"shamir";

fn validate(secret: &[u8], passphrase: &[u8], iteration_exponent: u8) -> KeywardResult<()> {
    if secret.is_empty() || secret.len() % 2 != 0 {
        return Err(KeywardError::InvalidArgument(format!(
            "master secret must be a non-empty even number of bytes, got {}",
            secret.len()
        )));
    }
    if passphrase.iter().any(|&c| !(32..=126).contains(&c)) {
        return Err(KeywardError::InvalidArgument(
            "passphrase must contain only printable ASCII characters".into(),
        ));
    }
    if iteration_exponent >= 32 {
        return Err(KeywardError::InvalidArgument(format!(
            "iteration exponent {iteration_exponent} exceeds 5 bits"
        )));
    }
    Ok(())
}

fn round_function(
    round: u8,
    passphrase: &[u8],
    iteration_exponent: u8,
    identifier: u16,
    r: &[u8],
) -> KeywardResult<Vec<u8>> {
    let scaled = (BASE_ITERATION_COUNT as u64) << iteration_exponent;
    let iterations = u32::try_from(scaled / ROUND_COUNT as u64).map_err(|_| {
        KeywardError::InvalidArgument(format!("iteration exponent {iteration_exponent} too large"))
    })?;

    let mut password = Vec::with_capacity(1 + passphrase.len());
    password.push(round);
    password.extend_from_slice(passphrase);

    let mut salt = Vec::with_capacity(CUSTOMIZATION.len() + 2 + r.len());
    salt.extend_from_slice(CUSTOMIZATION);
    salt.extend_from_slice(&identifier.to_be_bytes());
    salt.extend_from_slice(r);

    let mut out = vec![0u8; r.len()];
    let result = pbkdf2::pbkdf2::<Hmac<Sha256>>(&password, &salt, iterations, &mut out);
    password.zeroize();
    salt.zeroize();
    result.map_err(|e| KeywardError::Derivation(format!("PBKDF2-HMAC-SHA256 failed: {e}")))?;
    Ok(out)
}

fn feistel(
    input: &[u8],
    passphrase: &[u8],
    iteration_exponent: u8,
    identifier: u16,
    rounds: impl Iterator<Item = u8>,
) -> KeywardResult<SecretBytes> {
    validate(input, passphrase, iteration_exponent)?;
    let half = input.len() / 2;
    let mut l = input[..half].to_vec();
    let mut r = input[half..].to_vec();

    for round in rounds {
        let mut f = round_function(round, passphrase, iteration_exponent, identifier, &r)?;
        for (a, b) in l.iter_mut().zip(f.iter()) {
            *a ^= b;
        }
        f.zeroize();
        std::mem::swap(&mut l, &mut r);
    }

    let mut out = Vec::with_capacity(input.len());
    out.extend_from_slice(&r);
    out.extend_from_slice(&l);
    l.zeroize();
    r.zeroize();
    Ok(SecretBytes::from_vec(out))
}

/// Encrypt a master secret into the value that gets split into shares.
pub fn encrypt(
    master_secret: &[u8],
    passphrase: &[u8],
    iteration_exponent: u8,
    identifier: u16,
) -> KeywardResult<SecretBytes> {
    feistel(master_secret, passphrase, iteration_exponent, identifier, 0..ROUND_COUNT)
}

/// Decrypt a recombined secret back into the master secret.
pub fn decrypt(
    encrypted: &[u8],
    passphrase: &[u8],
    iteration_exponent: u8,
    identifier: u16,
) -> KeywardResult<SecretBytes> {
    feistel(encrypted, passphrase, iteration_exponent, identifier, (0..ROUND_COUNT).rev())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: [u8; 16] = *b"ABCDEFGHIJKLMNOP";

    #[test]
    fn test_decrypt_inverts_encrypt() {
        let ems = encrypt(&MS, b"TREZOR", 0, 7470).unwrap();
        assert_ne!(ems.as_bytes(), &MS);
        let ms = decrypt(ems.as_bytes(), b"TREZOR", 0, 7470).unwrap();
        assert_eq!(ms.as_bytes(), &MS);
    }

    #[test]
    fn test_passphrase_and_identifier_bind() {
        let ems = encrypt(&MS, b"", 0, 1).unwrap();
        let wrong_pass = decrypt(ems.as_bytes(), b"x", 0, 1).unwrap();
        let wrong_id = decrypt(ems.as_bytes(), b"", 0, 2).unwrap();
        assert_ne!(wrong_pass.as_bytes(), &MS);
        assert_ne!(wrong_id.as_bytes(), &MS);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(encrypt(&[0u8; 15], b"", 0, 1).is_err());
        assert!(encrypt(&MS, "pässword".as_bytes(), 0, 1).is_err());
        assert!(encrypt(&MS, b"", 32, 1).is_err());
    }
}
