//! SLIP-0010 hierarchical deterministic nodes for secp256k1 and ed25519.
//!
//! ```text
//! master:  I = HMAC-SHA512(key = curve seed string, data = seed)
//! child:   I = HMAC-SHA512(key = chain_code, data = 0x00 || k || ser32(i))   (hardened)
//!          I = HMAC-SHA512(key = chain_code, data = serP(K) || ser32(i))    (normal, secp256k1 only)
//! ```
//!
//! For secp256k1 an out-of-range `I_L` is retried as SLIP-0010 prescribes;
//! ed25519 keys are `I_L` directly and only hardened children exist.

use hmac::{Hmac, Mac};
use keyward_core::{Curve, KeywardError, KeywardResult, HARDENED};
use secp256k1::{PublicKey, Scalar, Secp256k1, SecretKey};
use sha2::Sha512;
use zeroize::Zeroize;

type HmacSha512 = Hmac<Sha512>;

/// A node in an HD key tree. Private key and chain code are zeroized on drop.
#[derive(Clone)]
pub struct HdNode {
    curve: Curve,
    depth: u8,
    child_num: u32,
    chain_code: [u8; 32],
    private_key: [u8; 32],
    public_key: Vec<u8>,
}

impl HdNode {
    /// Derive the master node for `curve` from a raw seed.
    pub fn from_seed(seed: &[u8], curve: Curve) -> KeywardResult<Self> {
        let hmac_key: &[u8] = match curve {
            Curve::Secp256k1 => b"Bitcoin seed",
            Curve::Ed25519 => b"ed25519 seed",
        };

        let mut i = hmac_sha512(hmac_key, seed)?;
        if curve == Curve::Secp256k1 {
            while SecretKey::from_slice(&i[..32]).is_err() {
                let next = hmac_sha512(hmac_key, &i)?;
                i.zeroize();
                i = next;
            }
        }

        let node = Self::from_parts(curve, 0, 0, &i)?;
        i.zeroize();
        Ok(node)
    }

    fn from_parts(curve: Curve, depth: u8, child_num: u32, i: &[u8; 64]) -> KeywardResult<Self> {
        let mut private_key = [0u8; 32];
        let mut chain_code = [0u8; 32];
        private_key.copy_from_slice(&i[..32]);
        chain_code.copy_from_slice(&i[32..]);
        let public_key = public_key_for(curve, &private_key)?;
        Ok(Self {
            curve,
            depth,
            child_num,
            chain_code,
            private_key,
            public_key,
        })
    }

    /// Advance this node to its child at `index`.
    pub fn derive(&mut self, index: u32) -> KeywardResult<()> {
        let hardened = index & HARDENED != 0;
        if self.curve == Curve::Ed25519 && !hardened {
            return Err(KeywardError::Derivation(format!(
                "ed25519 supports hardened derivation only (index {index})"
            )));
        }

        let mut data = Vec::with_capacity(37);
        if hardened {
            data.push(0x00);
            data.extend_from_slice(&self.private_key);
        } else {
            data.extend_from_slice(&self.public_key);
        }
        data.extend_from_slice(&index.to_be_bytes());

        let mut i = hmac_sha512(&self.chain_code, &data)?;
        data.zeroize();

        let depth = self.depth.saturating_add(1);
        let child = match self.curve {
            Curve::Ed25519 => Self::from_parts(self.curve, depth, index, &i)?,
            Curve::Secp256k1 => loop {
                if let Some(key) = secp256k1_tweak(&self.private_key, &i[..32]) {
                    let mut parts = [0u8; 64];
                    parts[..32].copy_from_slice(&key.secret_bytes());
                    parts[32..].copy_from_slice(&i[32..]);
                    let node = Self::from_parts(self.curve, depth, index, &parts);
                    parts.zeroize();
                    break node?;
                }
                // I_L >= n or the child key is zero: retry with 0x01 || I_R || ser32(i)
                let mut retry = Vec::with_capacity(37);
                retry.push(0x01);
                retry.extend_from_slice(&i[32..]);
                retry.extend_from_slice(&index.to_be_bytes());
                let next = hmac_sha512(&self.chain_code, &retry)?;
                retry.zeroize();
                i.zeroize();
                i = next;
            },
        };
        i.zeroize();

        *self = child;
        Ok(())
    }

    /// Advance along every index of `path` in order.
    pub fn derive_path(&mut self, path: &[u32]) -> KeywardResult<()> {
        for &index in path {
            self.derive(index)?;
        }
        Ok(())
    }

    pub fn curve(&self) -> Curve {
        self.curve
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    pub fn child_num(&self) -> u32 {
        self.child_num
    }

    pub fn chain_code(&self) -> &[u8; 32] {
        &self.chain_code
    }

    pub fn private_key(&self) -> &[u8; 32] {
        &self.private_key
    }

    /// Compressed SEC1 point for secp256k1; `0x00 || A` for ed25519.
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }
}

impl Drop for HdNode {
    fn drop(&mut self) {
        self.private_key.zeroize();
        self.chain_code.zeroize();
    }
}

impl std::fmt::Debug for HdNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HdNode")
            .field("curve", &self.curve)
            .field("depth", &self.depth)
            .field("child_num", &self.child_num)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

/// `parse256(I_L) + k_par (mod n)`, or `None` when the child is invalid.
fn secp256k1_tweak(parent: &[u8; 32], il: &[u8]) -> Option<SecretKey> {
    let mut il_bytes = [0u8; 32];
    il_bytes.copy_from_slice(il);
    let tweak = Scalar::from_be_bytes(il_bytes).ok();
    il_bytes.zeroize();
    let parent_key = SecretKey::from_slice(parent).ok()?;
    parent_key.add_tweak(&tweak?).ok()
}

fn public_key_for(curve: Curve, private_key: &[u8; 32]) -> KeywardResult<Vec<u8>> {
    match curve {
        Curve::Secp256k1 => {
            let secp = Secp256k1::signing_only();
            let secret = SecretKey::from_slice(private_key)
                .map_err(|e| KeywardError::Derivation(format!("invalid secp256k1 key: {e}")))?;
            Ok(PublicKey::from_secret_key(&secp, &secret).serialize().to_vec())
        }
        Curve::Ed25519 => {
            let signing = ed25519_dalek::SigningKey::from_bytes(private_key);
            let mut out = Vec::with_capacity(33);
            out.push(0x00);
            out.extend_from_slice(signing.verifying_key().as_bytes());
            Ok(out)
        }
    }
}

fn hmac_sha512(key: &[u8], data: &[u8]) -> KeywardResult<[u8; 64]> {
    let mut mac = HmacSha512::new_from_slice(key)
        .map_err(|e| KeywardError::Derivation(format!("HMAC-SHA512 key init failed: {e}")))?;
    mac.update(data);
    let result = mac.finalize().into_bytes();

    let mut output = [0u8; 64];
    output.copy_from_slice(&result);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unhex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    fn seed() -> Vec<u8> {
        unhex("000102030405060708090a0b0c0d0e0f")
    }

    #[test]
    fn test_secp256k1_master_vector() {
        let node = HdNode::from_seed(&seed(), Curve::Secp256k1).unwrap();
        assert_eq!(
            node.chain_code().to_vec(),
            unhex("873dff81c02f525623fd1fe5167eac3a55a049de3d314bb42ee227ffed37d508")
        );
        assert_eq!(
            node.private_key().to_vec(),
            unhex("e8f32e723decf4051aefac8e2c93c9c5b214313817cdb01a1494b917c8436b35")
        );
        assert_eq!(
            node.public_key().to_vec(),
            unhex("0339a36013301597daef41fbe593a02cc513d0b55527ec2df1050e2e8ff49c85c2")
        );
    }

    #[test]
    fn test_secp256k1_hardened_child_vector() {
        let mut node = HdNode::from_seed(&seed(), Curve::Secp256k1).unwrap();
        node.derive(HARDENED).unwrap();
        assert_eq!(node.depth(), 1);
        assert_eq!(node.child_num(), HARDENED);
        assert_eq!(
            node.private_key().to_vec(),
            unhex("edb2e14f9ee77d26dd93b4ecede8d16ed408ce149b6cd80b0715a2d911a0afea")
        );
        assert_eq!(
            node.chain_code().to_vec(),
            unhex("47fdacbd0f1097043b78c63c20c34ef4ed9a111d980047ad16282c7ae6236141")
        );
    }

    #[test]
    fn test_ed25519_master_vector() {
        let node = HdNode::from_seed(&seed(), Curve::Ed25519).unwrap();
        assert_eq!(
            node.chain_code().to_vec(),
            unhex("90046a93de5380a72b5e45010748567d5ea02bbf6522f979e05c0d8d8ca9fffb")
        );
        assert_eq!(
            node.private_key().to_vec(),
            unhex("2b4be7f19ee27bbf30c667b642d5f4aa69fd169872f8fc3059c08ebae2eb19e7")
        );
        assert_eq!(node.public_key().len(), 33);
        assert_eq!(node.public_key()[0], 0x00);
    }

    #[test]
    fn test_ed25519_rejects_normal_child() {
        let mut node = HdNode::from_seed(&seed(), Curve::Ed25519).unwrap();
        assert!(matches!(node.derive(0), Err(KeywardError::Derivation(_))));
        node.derive(HARDENED | 1).unwrap();
        assert_eq!(node.depth(), 1);
    }

    #[test]
    fn test_clone_is_independent() {
        let root = HdNode::from_seed(&seed(), Curve::Secp256k1).unwrap();
        let before = root.private_key().to_vec();

        let mut child = root.clone();
        child.derive_path(&[44 | HARDENED, 0, 1]).unwrap();

        assert_eq!(root.private_key().to_vec(), before);
        assert_eq!(root.depth(), 0);
        assert_eq!(child.depth(), 3);
        assert_ne!(child.private_key().to_vec(), before);
    }

    #[test]
    fn test_derive_path_matches_stepwise() {
        let path = [44 | HARDENED, HARDENED, 0, 5];
        let mut a = HdNode::from_seed(&seed(), Curve::Secp256k1).unwrap();
        a.derive_path(&path).unwrap();

        let mut b = HdNode::from_seed(&seed(), Curve::Secp256k1).unwrap();
        b.derive_path(&path[..2]).unwrap();
        b.derive_path(&path[2..]).unwrap();

        assert_eq!(a.private_key(), b.private_key());
        assert_eq!(a.public_key(), b.public_key());
    }

    #[test]
    fn test_debug_is_redacted() {
        let node = HdNode::from_seed(&seed(), Curve::Ed25519).unwrap();
        assert!(format!("{node:?}").contains("REDACTED"));
    }
}
