use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::KeywardResult;
use crate::types::{parse_path, Curve, Namespace};

/// Top-level configuration (loaded from keyward.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywardConfig {
    pub store: StoreConfig,
    pub logging: LoggingConfig,
    pub keychain: KeychainConfig,
    pub reset: ResetConfig,
    pub recovery: RecoveryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the file-backed secret store
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

/// Authorized key-spaces, in policy order
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeychainConfig {
    pub namespaces: Vec<NamespaceConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceConfig {
    pub curve: Curve,
    /// Path prefix, e.g. "m/44'"
    pub path: String,
}

impl KeychainConfig {
    /// Resolve the configured namespaces, keeping their order.
    pub fn namespaces(&self) -> KeywardResult<Vec<Namespace>> {
        self.namespaces
            .iter()
            .map(|ns| Ok(Namespace::new(ns.curve, parse_path(&ns.path)?)))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResetConfig {
    /// Default entropy strength in bits for new wallets
    pub strength: u32,
    /// SLIP-39 passphrase-encryption iteration exponent
    pub slip39_iteration_exponent: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Reject BIP-39 mnemonics that fail wordlist/checksum validation
    pub enforce_wordlist: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("~/.local/share/keyward/store.json"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl Default for KeychainConfig {
    fn default() -> Self {
        Self {
            namespaces: vec![
                NamespaceConfig {
                    curve: Curve::Secp256k1,
                    path: "m/44'".into(),
                },
                NamespaceConfig {
                    curve: Curve::Secp256k1,
                    path: "m/49'".into(),
                },
                NamespaceConfig {
                    curve: Curve::Secp256k1,
                    path: "m/84'".into(),
                },
                NamespaceConfig {
                    curve: Curve::Ed25519,
                    path: "m/44'".into(),
                },
            ],
        }
    }
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            strength: 256,
            slip39_iteration_exponent: 0,
        }
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            enforce_wordlist: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HARDENED;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[store]
path = "/var/lib/keyward/store.json"

[logging]
level = "debug"
format = "json"

[[keychain.namespaces]]
curve = "ed25519"
path = "m/44'/1729'"

[[keychain.namespaces]]
curve = "secp256k1"
path = "m/44'"

[reset]
strength = 128
slip39_iteration_exponent = 2

[recovery]
enforce_wordlist = false
"#;
        let config: KeywardConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.store.path, PathBuf::from("/var/lib/keyward/store.json"));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.reset.strength, 128);
        assert_eq!(config.reset.slip39_iteration_exponent, 2);
        assert!(!config.recovery.enforce_wordlist);

        let namespaces = config.keychain.namespaces().unwrap();
        assert_eq!(namespaces.len(), 2);
        assert_eq!(namespaces[0].curve, Curve::Ed25519);
        assert_eq!(namespaces[0].path, vec![44 | HARDENED, 1729 | HARDENED]);
        assert_eq!(namespaces[1].curve, Curve::Secp256k1);
    }

    #[test]
    fn test_parse_defaults() {
        let config: KeywardConfig = toml::from_str("").unwrap();

        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "text");
        assert_eq!(config.reset.strength, 256);
        assert!(config.recovery.enforce_wordlist);
        assert_eq!(config.keychain.namespaces().unwrap().len(), 4);
    }

    #[test]
    fn test_bad_namespace_path() {
        let toml_str = r#"
[[keychain.namespaces]]
curve = "secp256k1"
path = "m/not-a-number"
"#;
        let config: KeywardConfig = toml::from_str(toml_str).unwrap();
        assert!(config.keychain.namespaces().is_err());
    }

    #[test]
    fn test_unknown_curve_rejected_at_parse() {
        let toml_str = r#"
[[keychain.namespaces]]
curve = "nist256p1"
path = "m/44'"
"#;
        assert!(toml::from_str::<KeywardConfig>(toml_str).is_err());
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = KeywardConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: KeywardConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.store.path, parsed.store.path);
        assert_eq!(config.keychain.namespaces, parsed.keychain.namespaces);
        assert_eq!(config.reset.strength, parsed.reset.strength);
    }
}
