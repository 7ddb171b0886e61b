//! keyward-crypto: key material for the keyward device
//!
//! Seed sources:
//! ```text
//! BIP-39 mnemonic ──PBKDF2-HMAC-SHA512(passphrase)──┐
//!                                                    ├── seed ── Keychain ── HdNode (SLIP-0010)
//! SLIP-39 shares ──Shamir combine── EMS ──Feistel(passphrase)┘
//! ```
//!
//! The keychain only hands out nodes under an allow-listed namespace and
//! caches one root node per namespace.

pub mod hd;
pub mod keychain;
pub mod mnemonic;
pub mod secret;
pub mod slip39;

pub use hd::HdNode;
pub use keychain::Keychain;
pub use mnemonic::{bip39_seed, check_bip39, generate_bip39, BIP39_STRENGTHS};
pub use secret::{constant_time_eq, SecretBytes};
pub use slip39::{combine_shares, generate_share_set, slip39_seed, Share, SHARE_LENGTHS};

