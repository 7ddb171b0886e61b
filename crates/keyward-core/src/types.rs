use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{KeywardError, KeywardResult};

/// Offset marking a hardened child index (BIP-32 / SLIP-0010).
pub const HARDENED: u32 = 0x8000_0000;

/// Elliptic curve an HD key tree is derived on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Curve {
    Secp256k1,
    Ed25519,
}

impl Curve {
    pub fn name(&self) -> &'static str {
        match self {
            Curve::Secp256k1 => "secp256k1",
            Curve::Ed25519 => "ed25519",
        }
    }
}

impl fmt::Display for Curve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Curve {
    type Err = KeywardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "secp256k1" => Ok(Curve::Secp256k1),
            "ed25519" => Ok(Curve::Ed25519),
            other => Err(KeywardError::UnknownCurve(other.to_string())),
        }
    }
}

/// An authorized key-space: a curve plus a path prefix.
///
/// A derivation request is permitted by a namespace when its curve is equal
/// and its path starts with exactly this prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    pub curve: Curve,
    pub path: Vec<u32>,
}

impl Namespace {
    pub fn new(curve: Curve, path: impl Into<Vec<u32>>) -> Self {
        Self {
            curve,
            path: path.into(),
        }
    }

    /// Exact-prefix match on curve and path.
    pub fn matches(&self, curve: Curve, path: &[u32]) -> bool {
        self.curve == curve
            && path.len() >= self.path.len()
            && path[..self.path.len()] == self.path[..]
    }
}

/// How the stored mnemonic bytes are turned into a seed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MnemonicStandard {
    Bip39,
    Slip39,
}

impl MnemonicStandard {
    pub fn to_byte(self) -> u8 {
        match self {
            MnemonicStandard::Bip39 => 0x00,
            MnemonicStandard::Slip39 => 0x01,
        }
    }

    pub fn from_byte(b: u8) -> KeywardResult<Self> {
        match b {
            0x00 => Ok(MnemonicStandard::Bip39),
            0x01 => Ok(MnemonicStandard::Slip39),
            other => Err(KeywardError::UnknownStandard(other)),
        }
    }
}

/// Mnemonic lengths (in words) of a 128-bit and a 256-bit SLIP-39 share.
pub const SHARE_LENGTHS: [usize; 2] = [20, 33];

/// Word count of a SLIP-39 share whose value is `len` bytes.
pub fn share_word_count(len: usize) -> Option<usize> {
    match len {
        16 => Some(SHARE_LENGTHS[0]),
        32 => Some(SHARE_LENGTHS[1]),
        _ => None,
    }
}

/// Parse a BIP-32 style path such as `m/44'/0'/0/1`.
///
/// Hardened components take a `'` or `h` suffix. The leading `m` is optional;
/// `m` on its own is the empty path.
pub fn parse_path(s: &str) -> KeywardResult<Vec<u32>> {
    let trimmed = s.trim();
    let rest = match trimmed.strip_prefix('m') {
        Some(r) => r,
        None => trimmed,
    };
    let rest = rest.strip_prefix('/').unwrap_or(rest);
    if rest.is_empty() {
        return Ok(Vec::new());
    }

    rest.split('/')
        .map(|component| {
            let (digits, hardened) = match component
                .strip_suffix('\'')
                .or_else(|| component.strip_suffix('h'))
            {
                Some(d) => (d, true),
                None => (component, false),
            };
            let index: u32 = digits.parse().map_err(|_| {
                KeywardError::InvalidPath(format!("bad component '{component}' in {s}"))
            })?;
            if index >= HARDENED {
                return Err(KeywardError::InvalidPath(format!(
                    "component '{component}' out of range in {s}"
                )));
            }
            Ok(if hardened { index | HARDENED } else { index })
        })
        .collect()
}

/// Render a path back to `m/44'/0'/0` form.
pub fn format_path(path: &[u32]) -> String {
    let mut out = String::from("m");
    for &i in path {
        if i & HARDENED != 0 {
            out.push_str(&format!("/{}'", i & !HARDENED));
        } else {
            out.push_str(&format!("/{i}"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_path_hardened_and_plain() {
        let path = parse_path("m/44'/0h/0/7").unwrap();
        assert_eq!(path, vec![44 | HARDENED, HARDENED, 0, 7]);
        assert_eq!(format_path(&path), "m/44'/0'/0/7");
    }

    #[test]
    fn test_parse_path_root() {
        assert!(parse_path("m").unwrap().is_empty());
        assert!(parse_path("m/").unwrap().is_empty());
    }

    #[test]
    fn test_parse_path_rejects_garbage() {
        assert!(matches!(parse_path("m/x'"), Err(KeywardError::InvalidPath(_))));
        assert!(matches!(
            parse_path("m/2147483648"),
            Err(KeywardError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_curve_names() {
        assert_eq!("secp256k1".parse::<Curve>().unwrap(), Curve::Secp256k1);
        assert_eq!("ed25519".parse::<Curve>().unwrap(), Curve::Ed25519);
        assert!(matches!(
            "nist256p1".parse::<Curve>(),
            Err(KeywardError::UnknownCurve(_))
        ));
    }

    #[test]
    fn test_namespace_exact_prefix() {
        let ns = Namespace::new(Curve::Secp256k1, vec![44 | HARDENED]);
        assert!(ns.matches(Curve::Secp256k1, &[44 | HARDENED, HARDENED, 0]));
        assert!(ns.matches(Curve::Secp256k1, &[44 | HARDENED]));
        assert!(!ns.matches(Curve::Secp256k1, &[45 | HARDENED, 0]));
        assert!(!ns.matches(Curve::Ed25519, &[44 | HARDENED, 0]));
        assert!(!ns.matches(Curve::Secp256k1, &[]));
    }

    #[test]
    fn test_standard_bytes() {
        assert_eq!(MnemonicStandard::from_byte(0).unwrap(), MnemonicStandard::Bip39);
        assert_eq!(MnemonicStandard::from_byte(1).unwrap(), MnemonicStandard::Slip39);
        assert!(matches!(
            MnemonicStandard::from_byte(7),
            Err(KeywardError::UnknownStandard(7))
        ));
    }
}
