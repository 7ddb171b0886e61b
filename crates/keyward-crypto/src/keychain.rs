//! Keychain: HD key derivation restricted to previously allowed key-spaces.
//!
//! The namespace list is policy. A request is served by the *first*
//! namespace (in list order) whose curve matches and whose path is an exact
//! prefix of the requested path, even when a later namespace has a longer
//! matching prefix. Requests no namespace allows fail with `ForbiddenPath`.
//!
//! Each namespace root (seed → master → prefix) is derived once and cached
//! for the lifetime of the keychain; leaf requests clone the cached root and
//! derive only the suffix.

use keyward_core::{format_path, Curve, KeywardError, KeywardResult, Namespace};
use tracing::debug;

use crate::hd::HdNode;
use crate::secret::SecretBytes;

pub struct Keychain {
    seed: SecretBytes,
    namespaces: Vec<Namespace>,
    roots: Vec<Option<HdNode>>,
    root_derivations: usize,
}

impl Keychain {
    pub fn new(seed: SecretBytes, namespaces: Vec<Namespace>) -> Self {
        let roots = namespaces.iter().map(|_| None).collect();
        Self {
            seed,
            namespaces,
            roots,
            root_derivations: 0,
        }
    }

    /// Derive the node at `path` on `curve`.
    pub fn derive(&mut self, path: &[u32], curve: Curve) -> KeywardResult<HdNode> {
        let index = self
            .namespaces
            .iter()
            .position(|ns| ns.matches(curve, path))
            .ok_or_else(|| KeywardError::ForbiddenPath {
                path: format!("{} ({curve})", format_path(path)),
            })?;
        let (prefix, suffix) = path.split_at(self.namespaces[index].path.len());

        if self.roots[index].is_none() {
            let mut root = HdNode::from_seed(self.seed.as_bytes(), curve)?;
            root.derive_path(prefix)?;
            self.root_derivations += 1;
            debug!(
                namespace = index,
                prefix = %format_path(prefix),
                %curve,
                "cached keychain root"
            );
            self.roots[index] = Some(root);
        }

        let mut node = match &self.roots[index] {
            Some(root) => root.clone(),
            None => {
                return Err(KeywardError::Derivation(format!(
                    "keychain root {index} missing after population"
                )))
            }
        };
        node.derive_path(suffix)?;
        Ok(node)
    }

    pub fn namespaces(&self) -> &[Namespace] {
        &self.namespaces
    }

    /// Number of namespace roots derived from the seed so far.
    pub fn root_derivations(&self) -> usize {
        self.root_derivations
    }
}

impl std::fmt::Debug for Keychain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keychain")
            .field("namespaces", &self.namespaces)
            .field("cached_roots", &self.roots.iter().filter(|r| r.is_some()).count())
            .field("seed", &"[REDACTED]")
            .finish()
    }
}
