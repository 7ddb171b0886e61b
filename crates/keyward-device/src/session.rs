//! Unlocked-session context: cached passphrase and seed.
//!
//! A `Session` is created on unlock and passed by reference to whatever needs
//! keys. `lock()` (or dropping the session) erases the cached material.

use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use keyward_core::{Curve, KeywardError, KeywardResult, MnemonicStandard, Namespace};
use keyward_crypto::{bip39_seed, slip39_seed, HdNode, Keychain, SecretBytes};
use keyward_storage::{DeviceStorage, SecretStore};

/// Where the passphrase comes from when the device has passphrase
/// protection enabled.
pub trait PassphraseSource {
    fn passphrase(&mut self) -> KeywardResult<SecretString>;
}

/// A passphrase known up front.
pub struct FixedPassphrase {
    passphrase: SecretString,
}

impl FixedPassphrase {
    pub fn new(passphrase: &str) -> Self {
        FixedPassphrase {
            passphrase: SecretString::from(passphrase.to_owned()),
        }
    }
}

impl PassphraseSource for FixedPassphrase {
    fn passphrase(&mut self) -> KeywardResult<SecretString> {
        Ok(SecretString::from(self.passphrase.expose_secret().to_owned()))
    }
}

#[derive(Default)]
pub struct Session {
    passphrase: Option<SecretString>,
    seed: Option<SecretBytes>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("passphrase_cached", &self.passphrase.is_some())
            .field("seed_cached", &self.seed.is_some())
            .finish()
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_unlocked(&self) -> bool {
        self.seed.is_some()
    }

    /// Keychain over the device seed, restricted to `namespaces`.
    ///
    /// The seed is computed on first use and cached for the session; the
    /// passphrase is requested from `source` only if the device has
    /// passphrase protection and none is cached yet.
    pub fn keychain<S: SecretStore>(
        &mut self,
        storage: &DeviceStorage<S>,
        namespaces: Vec<Namespace>,
        source: &mut dyn PassphraseSource,
    ) -> KeywardResult<Keychain> {
        if !storage.is_initialized() {
            return Err(KeywardError::NotInitialized);
        }
        let seed = match &self.seed {
            Some(seed) => seed.clone(),
            None => {
                let seed = self.compute_seed(storage, source)?;
                self.seed = Some(seed.clone());
                seed
            }
        };
        Ok(Keychain::new(seed, namespaces))
    }

    fn compute_seed<S: SecretStore>(
        &mut self,
        storage: &DeviceStorage<S>,
        source: &mut dyn PassphraseSource,
    ) -> KeywardResult<SecretBytes> {
        if self.passphrase.is_none() {
            let passphrase = if storage.has_passphrase() {
                source.passphrase()?
            } else {
                SecretString::from(String::new())
            };
            self.passphrase = Some(passphrase);
        }
        let passphrase = self.passphrase.as_ref().map_or("", |p| p.expose_secret());
        debug!("computing seed");
        seed_from_storage(storage, passphrase)
    }

    /// Forget the cached passphrase and seed.
    pub fn lock(&mut self) {
        self.passphrase = None;
        self.seed = None;
        debug!("session locked");
    }
}

/// Seed of the stored secret under `passphrase`.
pub fn seed_from_storage<S: SecretStore>(
    storage: &DeviceStorage<S>,
    passphrase: &str,
) -> KeywardResult<SecretBytes> {
    let mnemonic = storage.mnemonic().ok_or(KeywardError::NotInitialized)?;
    match storage.mnemonic_standard()? {
        Some(MnemonicStandard::Bip39) => bip39_seed(&mnemonic, passphrase),
        Some(MnemonicStandard::Slip39) => {
            let params = storage.slip39_parameters()?.ok_or_else(|| {
                KeywardError::Storage("SLIP-39 secret without identifier".into())
            })?;
            slip39_seed(
                &mnemonic,
                params.identifier,
                params.iteration_exponent,
                passphrase,
            )
        }
        None => Err(KeywardError::Storage("no mnemonic standard stored".into())),
    }
}

/// Node at `path` derived with the empty passphrase, bypassing namespaces.
pub fn derive_node_without_passphrase<S: SecretStore>(
    storage: &DeviceStorage<S>,
    path: &[u32],
    curve: Curve,
) -> KeywardResult<HdNode> {
    if !storage.is_initialized() {
        return Err(KeywardError::NotInitialized);
    }
    let seed = seed_from_storage(storage, "")?;
    let mut node = HdNode::from_seed(seed.as_bytes(), curve)?;
    node.derive_path(path)?;
    Ok(node)
}
