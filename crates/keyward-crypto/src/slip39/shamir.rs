//! Shamir secret sharing over GF(256) as used by SLIP-39.
//!
//! Field: GF(2^8) with the Rijndael polynomial x^8 + x^4 + x^3 + x + 1,
//! exp/log tables over generator 3. For thresholds above one, the secret
//! sits at x = 255 and a digest share `D || R` at x = 254, where
//! `D = HMAC-SHA256(key = R, msg = secret)[..4]`. The digest lets
//! recovery detect a share that does not belong to the set.

use std::sync::OnceLock;

use hmac::{Hmac, Mac};
use rand::{CryptoRng, RngCore};
use sha2::Sha256;
use zeroize::Zeroize;

use keyward_core::{KeywardError, KeywardResult};

use crate::secret::{constant_time_eq, SecretBytes};

/// Largest number of member shares a 4-bit index can address.
pub const MAX_SHARE_COUNT: u8 = 16;
/// Smallest secret accepted, in bytes (128 bits).
pub const MIN_SECRET_LENGTH: usize = 16;
pub const DIGEST_LENGTH: usize = 4;

const SECRET_INDEX: u8 = 255;
const DIGEST_INDEX: u8 = 254;

struct Tables {
    exp: [u8; 255],
    log: [u8; 256],
}

fn tables() -> &'static Tables {
    static TABLES: OnceLock<Tables> = OnceLock::new();
    TABLES.get_or_init(|| {
        let mut exp = [0u8; 255];
        let mut log = [0u8; 256];
        let mut poly: u16 = 1;
        for (i, slot) in exp.iter_mut().enumerate() {
            *slot = poly as u8;
            log[poly as usize] = i as u8;
            // multiply by the generator (x + 1), reduce mod 0x11B
            poly = (poly << 1) ^ poly;
            if poly & 0x100 != 0 {
                poly ^= 0x11B;
            }
        }
        Tables { exp, log }
    })
}

/// Evaluate at `x` the polynomial passing through `points`.
fn interpolate(points: &[(u8, &[u8])], x: u8) -> KeywardResult<Vec<u8>> {
    let Some(&(_, first)) = points.first() else {
        return Err(KeywardError::InvalidArgument("no shares to interpolate".into()));
    };
    let len = first.len();
    if points.iter().any(|(_, v)| v.len() != len) {
        return Err(KeywardError::InvalidShare("share values differ in length".into()));
    }
    for (i, (xi, _)) in points.iter().enumerate() {
        if points[..i].iter().any(|(xj, _)| xj == xi) {
            return Err(KeywardError::InvalidShare(format!("duplicate share index {xi}")));
        }
    }
    if let Some((_, v)) = points.iter().find(|(xi, _)| *xi == x) {
        return Ok(v.to_vec());
    }

    let t = tables();
    let log = |v: u8| t.log[v as usize] as i32;
    let log_prod: i32 = points.iter().map(|(xi, _)| log(xi ^ x)).sum();

    let mut result = vec![0u8; len];
    for (i, (xi, value)) in points.iter().enumerate() {
        let denominator: i32 = points
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(_, (xj, _))| log(xi ^ xj))
            .sum();
        let log_basis = (log_prod - log(xi ^ x) - denominator).rem_euclid(255);

        for (out, &v) in result.iter_mut().zip(value.iter()) {
            if v != 0 {
                *out ^= t.exp[((log(v) + log_basis) % 255) as usize];
            }
        }
    }
    Ok(result)
}

fn digest(random_part: &[u8], secret: &[u8]) -> KeywardResult<[u8; DIGEST_LENGTH]> {
    let mut mac = Hmac::<Sha256>::new_from_slice(random_part)
        .map_err(|e| KeywardError::Derivation(format!("HMAC-SHA256 key init failed: {e}")))?;
    mac.update(secret);
    let full = mac.finalize().into_bytes();
    let mut out = [0u8; DIGEST_LENGTH];
    out.copy_from_slice(&full[..DIGEST_LENGTH]);
    Ok(out)
}

/// Split `secret` into `count` shares, any `threshold` of which recover it.
///
/// Shares are returned as `(x, value)` with `x` in `0..count`.
pub fn split_secret<R: RngCore + CryptoRng>(
    rng: &mut R,
    threshold: u8,
    count: u8,
    secret: &[u8],
) -> KeywardResult<Vec<(u8, SecretBytes)>> {
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
    if secret.len() < MIN_SECRET_LENGTH || secret.len() % 2 != 0 {
        return Err(KeywardError::InvalidArgument(format!(
            "secret must be an even number of bytes, at least {MIN_SECRET_LENGTH} (got {})",
            secret.len()
        )));
    }

    if threshold == 1 {
        return Ok((0..count).map(|x| (x, SecretBytes::from_slice(secret))).collect());
    }

    let random_count = threshold - 2;
    let mut base: Vec<(u8, Vec<u8>)> = (0..random_count)
        .map(|x| {
            let mut value = vec![0u8; secret.len()];
            rng.fill_bytes(&mut value);
            (x, value)
        })
        .collect();

    let mut digest_share = vec![0u8; secret.len()];
    rng.fill_bytes(&mut digest_share[DIGEST_LENGTH..]);
    let d = digest(&digest_share[DIGEST_LENGTH..], secret)?;
    digest_share[..DIGEST_LENGTH].copy_from_slice(&d);

    let mut shares: Vec<(u8, SecretBytes)> = base
        .iter()
        .map(|(x, v)| (*x, SecretBytes::from_slice(v)))
        .collect();

    base.push((DIGEST_INDEX, digest_share));
    base.push((SECRET_INDEX, secret.to_vec()));
    let points: Vec<(u8, &[u8])> = base.iter().map(|(x, v)| (*x, v.as_slice())).collect();
    for x in random_count..count {
        shares.push((x, SecretBytes::from_vec(interpolate(&points, x)?)));
    }

    for (_, v) in base.iter_mut() {
        v.zeroize();
    }
    Ok(shares)
}

/// Recover the secret from exactly `threshold` distinct shares.
pub fn recover_secret(threshold: u8, shares: &[(u8, &[u8])]) -> KeywardResult<SecretBytes> {
    if threshold == 0 || shares.len() != threshold as usize {
        return Err(KeywardError::InvalidArgument(format!(
            "expected {threshold} shares, got {}",
            shares.len()
        )));
    }

    if threshold == 1 {
        return Ok(SecretBytes::from_slice(shares[0].1));
    }

    let secret = SecretBytes::from_vec(interpolate(shares, SECRET_INDEX)?);
    let mut digest_share = interpolate(shares, DIGEST_INDEX)?;
    let expected = digest(&digest_share[DIGEST_LENGTH..], secret.as_bytes())?;
    let matches = constant_time_eq(&digest_share[..DIGEST_LENGTH], &expected);
    digest_share.zeroize();

    if !matches {
        return Err(KeywardError::ShareDigestMismatch);
    }
    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn secret16() -> Vec<u8> {
        (0u8..16).map(|i| i.wrapping_mul(17).wrapping_add(3)).collect()
    }

    fn as_points(shares: &[(u8, SecretBytes)]) -> Vec<(u8, &[u8])> {
        shares.iter().map(|(x, v)| (*x, v.as_bytes())).collect()
    }

    #[test]
    fn test_field_tables() {
        let t = tables();
        assert_eq!(t.exp[0], 1);
        assert_eq!(t.exp[1], 3);
        // every non-zero element appears exactly once in exp
        let mut seen = [false; 256];
        for &e in t.exp.iter() {
            assert!(!seen[e as usize]);
            seen[e as usize] = true;
        }
        assert!(!seen[0]);
    }

    #[test]
    fn test_threshold_one_copies_secret() {
        let mut rng = StdRng::seed_from_u64(1);
        let shares = split_secret(&mut rng, 1, 3, &secret16()).unwrap();
        assert_eq!(shares.len(), 3);
        for (_, v) in &shares {
            assert_eq!(v.as_bytes(), &secret16()[..]);
        }
        let recovered = recover_secret(1, &as_points(&shares[2..])).unwrap();
        assert_eq!(recovered.as_bytes(), &secret16()[..]);
    }

    #[test]
    fn test_wrong_share_detected_by_digest() {
        let mut rng = StdRng::seed_from_u64(2);
        let a = split_secret(&mut rng, 2, 3, &secret16()).unwrap();
        let b = split_secret(&mut rng, 2, 3, &[9u8; 16]).unwrap();

        let mixed = vec![(a[0].0, a[0].1.as_bytes()), (b[1].0, b[1].1.as_bytes())];
        assert!(matches!(
            recover_secret(2, &mixed),
            Err(KeywardError::ShareDigestMismatch)
        ));
    }

    #[test]
    fn test_too_few_shares() {
        let mut rng = StdRng::seed_from_u64(3);
        let shares = split_secret(&mut rng, 3, 5, &secret16()).unwrap();
        assert!(matches!(
            recover_secret(3, &as_points(&shares[..2])),
            Err(KeywardError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_duplicate_indices_rejected() {
        let mut rng = StdRng::seed_from_u64(4);
        let shares = split_secret(&mut rng, 2, 2, &secret16()).unwrap();
        let dup = vec![(0u8, shares[0].1.as_bytes()), (0u8, shares[0].1.as_bytes())];
        assert!(matches!(recover_secret(2, &dup), Err(KeywardError::InvalidShare(_))));
    }

    #[test]
    fn test_split_parameter_validation() {
        let mut rng = StdRng::seed_from_u64(5);
        assert!(split_secret(&mut rng, 4, 3, &secret16()).is_err());
        assert!(split_secret(&mut rng, 0, 3, &secret16()).is_err());
        assert!(split_secret(&mut rng, 2, 17, &secret16()).is_err());
        assert!(split_secret(&mut rng, 2, 3, &[0u8; 15]).is_err());
        assert!(split_secret(&mut rng, 2, 3, &[0u8; 8]).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn any_threshold_subset_recovers(
            seed in any::<u64>(),
            threshold in 1u8..=5,
            extra in 0u8..=3,
            long in any::<bool>(),
            pick in any::<u64>(),
        ) {
            let count = threshold + extra;
            let len = if long { 32 } else { 16 };
            let mut rng = StdRng::seed_from_u64(seed);
            let mut secret = vec![0u8; len];
            rng.fill_bytes(&mut secret);

            let shares = split_secret(&mut rng, threshold, count, &secret).unwrap();

            // choose `threshold` shares by rotating the list by `pick`
            let offset = (pick % count as u64) as usize;
            let subset: Vec<(u8, &[u8])> = (0..threshold as usize)
                .map(|k| {
                    let (x, v) = &shares[(offset + k) % count as usize];
                    (*x, v.as_bytes())
                })
                .collect();

            let recovered = recover_secret(threshold, &subset).unwrap();
            prop_assert_eq!(recovered.as_bytes(), &secret[..]);
        }
    }
}
